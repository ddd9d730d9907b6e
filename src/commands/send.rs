//! `send`: one exchange, optionally checked with assertion expressions

use std::time::Instant;

use colored::Colorize;
use serde_json::Value;

use crate::assertions::{parse_expressions, run_suite, ExchangeMeta};
use crate::commands::{close_transport, connect_transport, print_assertion_results};
use crate::config::Config;
use crate::error::{ProbeError, Result};
use crate::mcp::codec::{self, ProtocolCodec};
use crate::mcp::types::RequestId;

/// Options for [`run_send`].
#[derive(Debug, Clone, Default)]
pub struct SendArgs {
    /// JSON-RPC method
    pub method: String,
    /// Raw JSON parameters
    pub params: Option<String>,
    /// Explicit request id
    pub id: Option<String>,
    /// Send as a notification
    pub notify: bool,
    /// Assertion expressions
    pub expect: Vec<String>,
}

/// Numbers become numeric ids, anything else a string id.
pub fn parse_request_id(text: &str) -> RequestId {
    match text.trim().parse::<i64>() {
        Ok(n) => RequestId::Number(n),
        Err(_) => RequestId::String(text.to_string()),
    }
}

/// Send one message and print the reply.
///
/// Structurally invalid messages are reported and not sent.
pub async fn run_send(config: &Config, args: SendArgs) -> Result<bool> {
    let params = args
        .params
        .as_deref()
        .map(serde_json::from_str::<Value>)
        .transpose()
        .map_err(|e| ProbeError::Config(format!("--params is not valid JSON: {}", e)))?;
    let suite = parse_expressions(&args.expect.join("\n"))?;

    let codec = ProtocolCodec::new();
    let mut record = if args.notify {
        codec.build_notification(args.method.as_str(), params)
    } else {
        codec.build_request(
            args.method.as_str(),
            params,
            args.id.as_deref().map(parse_request_id),
        )
    };

    let violations = codec::validate_request(&record.to_value());
    if !violations.is_empty() {
        println!("{}", "Message is not a valid JSON-RPC request:".red());
        for v in &violations {
            println!("  - {}", v);
        }
        return Ok(false);
    }

    let transport = connect_transport(config).await?;
    let started = Instant::now();
    let outcome = transport.send(&mut record).await;
    let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
    close_transport(&transport).await;

    let reply = outcome?;
    println!("{} {}", "->".cyan(), record.raw().unwrap_or_default());

    let Some(reply) = reply else {
        println!("{}", "(notification sent, no response expected)".dimmed());
        return Ok(true);
    };

    let response = reply.to_value();
    println!(
        "{} {}",
        "<-".cyan(),
        serde_json::to_string_pretty(&response)?
    );
    println!("{}", format!("{:.1} ms via {}", duration_ms, transport.kind()).dimmed());

    let mut passed = true;
    if let Some(error) = reply.response().and_then(|r| r.error()) {
        println!("{} {}", "error response:".yellow(), error);
    }
    if !suite.is_empty() {
        let meta = ExchangeMeta {
            duration_ms,
            transport: Some(transport.kind().to_string()),
        };
        let results = run_suite(&suite, &response, Some(&meta));
        passed = print_assertion_results(&results);
    }
    Ok(passed)
}
