//! Tool bindings: how one endpoint step reaches one tool.

use super::{BindingId, EndpointId, Expression, GatewayDomainError};
use crate::tool_registry::domain::{CatalogEntryId, ServerId};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Root name under which the caller payload is visible to expressions.
pub const INPUT_ROOT: &str = "input";

const RESERVED_ALIASES: [&str; 4] = [INPUT_ROOT, "true", "false", "null"];

/// Tool a binding invokes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BindingTarget {
    /// A cataloged tool.
    Catalog {
        /// Catalog entry.
        entry_id: CatalogEntryId,
        /// Server owning the entry.
        server_id: ServerId,
    },
    /// A server/tool pair not yet present in the catalog.
    Raw {
        /// Target server.
        server_id: ServerId,
        /// Tool name on that server.
        tool_name: String,
    },
}

impl BindingTarget {
    /// Returns the server the target lives on.
    #[must_use]
    pub const fn server_id(&self) -> ServerId {
        match self {
            Self::Catalog { server_id, .. } | Self::Raw { server_id, .. } => *server_id,
        }
    }
}

/// What happens when a binding ultimately fails.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "on_error", rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Stop the endpoint execution and mark it failed.
    #[default]
    Abort,
    /// Record the failure and continue.
    Skip,
    /// Place a fallback output in the context and continue.
    Substitute {
        /// Output used in place of the tool's.
        fallback: Value,
    },
}

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    /// Creates a validated retry policy.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayDomainError::InvalidRetryPolicy`] when
    /// `max_attempts` is zero or `initial_backoff` exceeds `max_backoff`.
    pub fn new(
        max_attempts: u32,
        initial_backoff: Duration,
        max_backoff: Duration,
    ) -> Result<Self, GatewayDomainError> {
        if max_attempts == 0 {
            return Err(GatewayDomainError::InvalidRetryPolicy(
                "max_attempts must be at least 1".to_owned(),
            ));
        }
        if initial_backoff > max_backoff {
            return Err(GatewayDomainError::InvalidRetryPolicy(
                "initial_backoff must not exceed max_backoff".to_owned(),
            ));
        }
        Ok(Self {
            max_attempts,
            initial_backoff,
            max_backoff,
        })
    }

    /// A single attempt with no retries.
    #[must_use]
    pub const fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
        }
    }

    /// Returns the attempt budget, including the first attempt.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the delay before the first retry.
    #[must_use]
    pub const fn initial_backoff(&self) -> Duration {
        self.initial_backoff
    }

    /// Returns the delay ceiling.
    #[must_use]
    pub const fn max_backoff(&self) -> Duration {
        self.max_backoff
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::no_retry()
    }
}

/// Validated inputs for a new binding.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBinding {
    /// Owning endpoint.
    pub endpoint_id: EndpointId,
    /// Tool to invoke.
    pub target: BindingTarget,
    /// Alias under which the output enters the context.
    pub alias: String,
    /// Tool field to expression mapping.
    pub mapping: BTreeMap<String, Expression>,
    /// Execution order; ties run in insertion order.
    pub order: i32,
    /// Optional guard.
    pub condition: Option<Expression>,
    /// Failure handling.
    pub error_policy: ErrorPolicy,
    /// Retry handling.
    pub retry: RetryPolicy,
    /// Whether failure of this binding fails the endpoint.
    pub required: bool,
    /// Overrides the endpoint's per-binding timeout.
    pub timeout: Option<Duration>,
}

/// One step of an endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    id: BindingId,
    endpoint_id: EndpointId,
    target: BindingTarget,
    alias: String,
    mapping: BTreeMap<String, Expression>,
    order: i32,
    sequence: u64,
    enabled: bool,
    required: bool,
    condition: Option<Expression>,
    error_policy: ErrorPolicy,
    retry: RetryPolicy,
    timeout: Option<Duration>,
    created_at: DateTime<Utc>,
}

impl Binding {
    /// Creates an enabled binding.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayDomainError`] when the alias is invalid or reserved,
    /// a mapping key is blank, or the timeout override is zero.
    pub fn new(spec: NewBinding, clock: &impl Clock) -> Result<Self, GatewayDomainError> {
        let alias = validate_alias(&spec.alias)?;
        if spec.mapping.keys().any(|field| field.trim().is_empty()) {
            return Err(GatewayDomainError::EmptyMappingField);
        }
        if spec.timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(GatewayDomainError::InvalidPolicy(
                "binding timeout must be positive".to_owned(),
            ));
        }
        Ok(Self {
            id: BindingId::new(),
            endpoint_id: spec.endpoint_id,
            target: spec.target,
            alias,
            mapping: spec.mapping,
            order: spec.order,
            sequence: 0,
            enabled: true,
            required: spec.required,
            condition: spec.condition,
            error_policy: spec.error_policy,
            retry: spec.retry,
            timeout: spec.timeout,
            created_at: clock.utc(),
        })
    }

    /// Returns the binding identifier.
    #[must_use]
    pub const fn id(&self) -> BindingId {
        self.id
    }

    /// Returns the owning endpoint.
    #[must_use]
    pub const fn endpoint_id(&self) -> EndpointId {
        self.endpoint_id
    }

    /// Returns the target tool.
    #[must_use]
    pub const fn target(&self) -> &BindingTarget {
        &self.target
    }

    /// Returns the alias.
    #[must_use]
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Returns the parameter mapping.
    #[must_use]
    pub const fn mapping(&self) -> &BTreeMap<String, Expression> {
        &self.mapping
    }

    /// Returns the execution order.
    #[must_use]
    pub const fn order(&self) -> i32 {
        self.order
    }

    /// Returns the insertion sequence used to break order ties.
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Returns whether the binding runs.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns whether failure of this binding fails the endpoint.
    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.required
    }

    /// Returns the optional guard.
    #[must_use]
    pub const fn condition(&self) -> Option<&Expression> {
        self.condition.as_ref()
    }

    /// Returns the failure policy.
    #[must_use]
    pub const fn error_policy(&self) -> &ErrorPolicy {
        &self.error_policy
    }

    /// Returns the retry policy.
    #[must_use]
    pub const fn retry(&self) -> RetryPolicy {
        self.retry
    }

    /// Returns the timeout override.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Every expression the binding holds.
    pub fn expressions(&self) -> impl Iterator<Item = &Expression> {
        self.mapping.values().chain(self.condition.iter())
    }

    pub(super) const fn set_sequence(&mut self, sequence: u64) {
        self.sequence = sequence;
    }

    pub(super) const fn set_order(&mut self, order: i32) {
        self.order = order;
    }

    pub(super) const fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Points the binding at a cataloged entry.
    pub(super) fn resolve_target(&mut self, entry_id: CatalogEntryId, server_id: ServerId) {
        self.target = BindingTarget::Catalog {
            entry_id,
            server_id,
        };
    }
}

fn validate_alias(alias: &str) -> Result<String, GatewayDomainError> {
    let trimmed = alias.trim();
    let mut chars = trimmed.chars();
    let valid_start = chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_');
    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(GatewayDomainError::InvalidAlias(alias.to_owned()));
    }
    if RESERVED_ALIASES.contains(&trimmed) {
        return Err(GatewayDomainError::ReservedAlias(trimmed.to_owned()));
    }
    Ok(trimmed.to_owned())
}
