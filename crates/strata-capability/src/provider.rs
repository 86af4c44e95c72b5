use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strata_core::{ModelTier, StrataResult};
use uuid::Uuid;

/// Metadata describing a capability's interface.
///
/// `keywords` drive capability resolution in the decomposer: a task
/// segment is matched against each registered capability's keywords, and
/// longer matches count as more specific.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    /// Stable identifier, unique within a registry.
    pub id: String,
    /// Human-readable description of what the capability does.
    pub description: String,
    /// Keywords this capability claims, matched against task text.
    pub keywords: Vec<String>,
}

/// A single invocation request handed to a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityRequest {
    /// The capability being invoked.
    pub capability_id: String,
    /// The task this invocation serves.
    pub task_id: Uuid,
    /// What the provider should do.
    pub task_description: String,
    /// Accumulated context (e.g. gate failure detail from a reflection
    /// cycle, outputs of dependency tasks).
    pub context_hints: HashMap<String, String>,
    /// Model weight hint from the tier profile. Advisory only.
    pub model_hint: ModelTier,
}

/// Outcome of a single capability invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationStatus {
    /// The provider completed the task.
    Ok,
    /// The provider could not complete the task.
    Error,
}

/// The response returned by a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityResponse {
    /// Whether the invocation succeeded.
    pub status: InvocationStatus,
    /// The produced output, empty on error.
    pub output: String,
    /// Error detail when `status` is [`InvocationStatus::Error`].
    pub error: Option<String>,
    /// Tokens consumed by this invocation, charged to the request budget.
    pub tokens_used: u64,
}

impl CapabilityResponse {
    /// Creates a successful response.
    pub fn ok(output: impl Into<String>, tokens_used: u64) -> Self {
        Self {
            status: InvocationStatus::Ok,
            output: output.into(),
            error: None,
            tokens_used,
        }
    }

    /// Creates an error response.
    pub fn error(detail: impl Into<String>, tokens_used: u64) -> Self {
        Self {
            status: InvocationStatus::Error,
            output: String::new(),
            error: Some(detail.into()),
            tokens_used,
        }
    }

    /// Whether the invocation succeeded.
    pub fn is_ok(&self) -> bool {
        self.status == InvocationStatus::Ok
    }
}

/// Trait all capability providers implement.
///
/// The engine treats providers as opaque: invocations may be
/// long-running blocking calls, so the coordinator wraps each one with a
/// timeout and cancellation, never the provider itself.
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    /// The provider's descriptor.
    fn descriptor(&self) -> &CapabilityDescriptor;

    /// Performs the work described by `request`.
    async fn invoke(&self, request: CapabilityRequest) -> StrataResult<CapabilityResponse>;
}
