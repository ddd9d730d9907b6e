//! Multi-step sequences with variable threading
//!
//! A [`Sequence`] is an ordered list of [`Step`]s run against one
//! [`Transport`]. Each run owns a fresh variable scope. Per step:
//!
//! 1. String parameters of the exact form `{{name}}` are replaced by the
//!    bound value of `name` (unbound names are left as written). Nested
//!    objects are searched; arrays are not.
//! 2. The optional delay elapses.
//! 3. The step is sent as a request or a notification.
//! 4. Each extraction evaluates its path against the response and, when the
//!    result is defined, binds it under the extraction's variable name.
//! 5. A [`StepResult`] is recorded.
//!
//! Steps never overlap. The first failing step (transport failure, error
//! response, missing reply) ends the run; earlier results are kept.
//!
//! Sequences load from YAML or JSON:
//!
//! ```yaml
//! name: tool discovery
//! steps:
//!   - id: init
//!     method: initialize
//!     params: {protocolVersion: "2024-11-05", capabilities: {}}
//!   - id: list
//!     method: tools/list
//!     extract:
//!       - {variable: tool, path: "$.result.tools[0].name"}
//!     expect:
//!       - "$.result.tools length >= 1"
//!   - id: call
//!     method: tools/call
//!     params: {name: "{{tool}}", arguments: {}}
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProbeError, Result};
use crate::history::{ExchangeRecord, HistorySink};
use crate::mcp::codec::ProtocolCodec;
use crate::mcp::transport::Transport;
use crate::path;

/// Variable scope of one run.
pub type Variables = BTreeMap<String, Value>;

/// Bind the value at `path` in a step's response to `variable`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extraction {
    /// Name later steps refer to as `{{variable}}`
    pub variable: String,
    /// Path evaluated against the whole response document
    pub path: String,
}

/// One exchange in a sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Identifier unique within the sequence
    pub id: String,
    /// JSON-RPC method
    pub method: String,
    /// Parameters, possibly containing `{{name}}` placeholders
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Send as a notification (no id, no reply)
    #[serde(default)]
    pub notification: bool,
    /// Values to capture from the response
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extract: Vec<Extraction>,
    /// Pause before dispatch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
    /// Free text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Assertion expressions checked against the response
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expect: Vec<String>,
}

impl Step {
    /// Request step with no params.
    pub fn request(id: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            params: None,
            notification: false,
            extract: Vec::new(),
            delay_ms: None,
            description: None,
            expect: Vec::new(),
        }
    }

    /// Notification step with no params.
    pub fn notification(id: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            notification: true,
            ..Self::request(id, method)
        }
    }

    /// Set the parameters.
    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    /// Add an extraction.
    pub fn extracting(mut self, variable: impl Into<String>, path: impl Into<String>) -> Self {
        self.extract.push(Extraction {
            variable: variable.into(),
            path: path.into(),
        });
        self
    }

    /// Set the pre-dispatch delay.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay_ms = Some(delay.as_millis() as u64);
        self
    }
}

/// An ordered list of steps plus metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    /// Display name
    pub name: String,
    /// Free text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Steps, in execution order
    pub steps: Vec<Step>,
}

impl Sequence {
    /// Build a sequence in code.
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            description: None,
            steps,
        }
    }

    /// Load from a `.json`, `.yaml` or `.yml` file and validate it.
    ///
    /// Files with any other extension are read as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ProbeError::Sequence(format!("cannot read {}: {}", path.display(), e))
        })?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let sequence: Sequence = if is_json {
            serde_json::from_str(&text)?
        } else {
            serde_yaml::from_str(&text)?
        };
        sequence.validate()?;
        Ok(sequence)
    }

    /// Reject empty sequences, blank methods, duplicate step ids and blank
    /// extraction names.
    pub fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(ProbeError::Sequence(format!("sequence `{}` has no steps", self.name)).into());
        }
        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.id.trim().is_empty() {
                return Err(ProbeError::Sequence("step with an empty id".to_string()).into());
            }
            if !seen.insert(step.id.as_str()) {
                return Err(ProbeError::Sequence(format!("duplicate step id `{}`", step.id)).into());
            }
            if step.method.trim().is_empty() {
                return Err(
                    ProbeError::Sequence(format!("step `{}` has an empty method", step.id)).into(),
                );
            }
            if step.extract.iter().any(|x| x.variable.trim().is_empty()) {
                return Err(ProbeError::Sequence(format!(
                    "step `{}` has an extraction without a variable name",
                    step.id
                ))
                .into());
            }
        }
        Ok(())
    }
}

fn placeholder(text: &str) -> Option<&str> {
    let name = text
        .trim()
        .strip_prefix("{{")?
        .strip_suffix("}}")?;
    (!name.is_empty() && !name.contains(|c: char| c.is_whitespace() || c == '{' || c == '}'))
        .then_some(name)
}

/// Replace `{{name}}` string values with their bindings.
///
/// # Examples
///
/// ```
/// use mcp_probe::sequence::{substitute, Variables};
/// use serde_json::json;
///
/// let mut vars = Variables::new();
/// vars.insert("tool".into(), json!("echo"));
///
/// let params = json!({"name": "{{tool}}", "args": ["{{tool}}"], "other": "{{nope}}"});
/// assert_eq!(
///     substitute(&params, &vars),
///     json!({"name": "echo", "args": ["{{tool}}"], "other": "{{nope}}"})
/// );
/// ```
pub fn substitute(value: &Value, vars: &Variables) -> Value {
    match value {
        Value::String(s) => placeholder(s)
            .and_then(|name| vars.get(name))
            .cloned()
            .unwrap_or_else(|| value.clone()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute(v, vars)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepResult {
    /// Id of the step
    pub step_id: String,
    /// Method sent
    pub method: String,
    /// Parameters after substitution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Whole response document; `None` for notifications and failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    /// Time from dispatch to reply, excluding the delay
    pub elapsed_ms: f64,
    /// Why the step failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepResult {
    /// True when the step did not fail.
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SequenceRun {
    /// Name of the sequence
    pub sequence: String,
    /// One entry per attempted step, in order
    pub results: Vec<StepResult>,
    /// Every step succeeded
    pub completed: bool,
    /// Id of the step that stopped the run
    pub failed_step: Option<String>,
    /// Scope at the end of the run
    pub variables: Variables,
    /// Wall time of the run
    pub elapsed_ms: f64,
}

/// Runs sequences against one transport.
pub struct SequenceRunner {
    transport: Arc<dyn Transport>,
    codec: ProtocolCodec,
    history: Option<Arc<dyn HistorySink>>,
}

impl std::fmt::Debug for SequenceRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceRunner")
            .field("transport", &self.transport)
            .field("codec", &self.codec)
            .field("history", &self.history.is_some())
            .finish()
    }
}

impl SequenceRunner {
    /// Runner over an already-connected transport.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            codec: ProtocolCodec::new(),
            history: None,
        }
    }

    /// Append every exchange to `sink`.
    pub fn with_history(mut self, sink: Arc<dyn HistorySink>) -> Self {
        self.history = Some(sink);
        self
    }

    /// Codec used to build step messages.
    pub fn codec(&self) -> &ProtocolCodec {
        &self.codec
    }

    /// Run every step in order, stopping at the first failure.
    ///
    /// Step failures are reported in the returned [`SequenceRun`]; this
    /// method does not fail.
    pub async fn run(&self, sequence: &Sequence) -> SequenceRun {
        let started = Instant::now();
        let mut variables = Variables::new();
        let mut results = Vec::with_capacity(sequence.steps.len());
        let mut failed_step = None;

        tracing::info!(sequence = %sequence.name, steps = sequence.steps.len(), "sequence started");

        for step in &sequence.steps {
            let result = self.run_step(step, &mut variables).await;
            let failed = !result.succeeded();
            if failed {
                tracing::warn!(
                    sequence = %sequence.name,
                    step = %step.id,
                    error = result.error.as_deref().unwrap_or_default(),
                    "step failed, stopping sequence"
                );
                failed_step = Some(step.id.clone());
            }
            results.push(result);
            if failed {
                break;
            }
        }

        let completed = failed_step.is_none();
        tracing::info!(
            sequence = %sequence.name,
            completed,
            executed = results.len(),
            "sequence finished"
        );

        SequenceRun {
            sequence: sequence.name.clone(),
            results,
            completed,
            failed_step,
            variables,
            elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
        }
    }

    async fn run_step(&self, step: &Step, variables: &mut Variables) -> StepResult {
        let params = step.params.as_ref().map(|p| substitute(p, variables));

        if let Some(delay) = step.delay_ms.filter(|d| *d > 0) {
            tracing::debug!(step = %step.id, delay_ms = delay, "delaying step");
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let mut record = if step.notification {
            self.codec.build_notification(step.method.as_str(), params.clone())
        } else {
            self.codec
                .build_request(step.method.as_str(), params.clone(), None)
        };

        tracing::debug!(step = %step.id, method = %step.method, "running step");
        let started = Instant::now();
        let outcome = self.transport.send(&mut record).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        let (response, error) = match outcome {
            Ok(Some(reply)) => {
                let error = reply
                    .response()
                    .and_then(|r| r.error())
                    .map(|e| format!("error response: {}", e));
                (Some(reply.to_value()), error)
            }
            Ok(None) if step.notification => (None, None),
            Ok(None) => (None, Some("no response received for request".to_string())),
            Err(e) => (None, Some(e.to_string())),
        };

        if let Some(sink) = &self.history {
            sink.append(ExchangeRecord::new(
                step.method.as_str(),
                record.to_value(),
                response.clone(),
                // Error responses are visible through the stored response.
                if response.is_none() { error.clone() } else { None },
                elapsed_ms,
            ));
        }

        if error.is_none() {
            if let Some(doc) = &response {
                for extraction in &step.extract {
                    match path::extract(doc, &extraction.path) {
                        Some(value) => {
                            tracing::debug!(
                                step = %step.id,
                                variable = %extraction.variable,
                                "bound variable"
                            );
                            variables.insert(extraction.variable.clone(), value);
                        }
                        None => tracing::debug!(
                            step = %step.id,
                            variable = %extraction.variable,
                            path = %extraction.path,
                            "extraction path undefined, variable left unchanged"
                        ),
                    }
                }
            }
        }

        StepResult {
            step_id: step.id.clone(),
            method: step.method.clone(),
            params,
            response,
            elapsed_ms,
            error,
        }
    }
}
