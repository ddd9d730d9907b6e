//! MCP wire layer
//!
//! JSON-RPC 2.0 message types, the codec that builds, validates and decodes
//! them, and the transports that carry them to a server.
//!
//! # Module Layout
//!
//! - `types`     -- JSON-RPC primitives, MCP method names, error-code registry
//! - `codec`     -- Message records, id allocation, serialize/parse/validate
//! - `transport` -- `Transport` trait, factory, and the http, websocket, sse,
//!   stdio and fake strategies

pub mod codec;
pub mod transport;
pub mod types;

pub use codec::{MessageRecord, ProtocolCodec, RecordState};
pub use types::*;
