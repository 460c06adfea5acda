//! Endpoint aggregate root: a named composite operation over ordered bindings.

use super::{
    Binding, BindingId, EndpointId, ExecutionStatus, GatewayDomainError,
    ParseEndpointStatusError, binding::INPUT_ROOT,
};
use crate::tool_registry::domain::{CatalogEntryId, ServerId};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

/// Endpoint lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointStatus {
    /// Being composed; not invocable.
    Draft,
    /// Invocable.
    Active,
    /// Taken offline by an operator.
    Inactive,
    /// Taken offline after a fault.
    Error,
}

impl EndpointStatus {
    /// Returns the storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Error => "error",
        }
    }

    /// Returns whether the lifecycle permits moving to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Draft | Self::Inactive | Self::Error, Self::Active)
                | (Self::Active | Self::Error, Self::Inactive)
                | (Self::Active, Self::Error)
        )
    }
}

impl fmt::Display for EndpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for EndpointStatus {
    type Error = ParseEndpointStatusError;

    fn try_from(value: &str) -> Result<Self, ParseEndpointStatusError> {
        match value {
            "draft" => Ok(Self::Draft),
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "error" => Ok(Self::Error),
            other => Err(ParseEndpointStatusError(other.to_owned())),
        }
    }
}

/// Who may see the endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Listed for every caller.
    Public,
    /// Known only to its owners.
    #[default]
    Private,
}

/// Maximum invocations per fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    max_requests: u32,
    window: Duration,
}

impl RateLimitPolicy {
    /// Creates a validated rate limit.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayDomainError::InvalidPolicy`] when either bound is
    /// zero.
    pub fn new(max_requests: u32, window: Duration) -> Result<Self, GatewayDomainError> {
        if max_requests == 0 || window.is_zero() {
            return Err(GatewayDomainError::InvalidPolicy(
                "rate limit requires a positive request count and window".to_owned(),
            ));
        }
        Ok(Self {
            max_requests,
            window,
        })
    }

    /// Returns the request budget per window.
    #[must_use]
    pub const fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Returns the window length.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }
}

/// Deadlines applied during execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutPolicy {
    total: Duration,
    per_binding: Duration,
}

impl TimeoutPolicy {
    /// Creates a validated timeout policy.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayDomainError::InvalidPolicy`] when either timeout is
    /// zero.
    pub fn new(total: Duration, per_binding: Duration) -> Result<Self, GatewayDomainError> {
        if total.is_zero() || per_binding.is_zero() {
            return Err(GatewayDomainError::InvalidPolicy(
                "timeouts must be positive".to_owned(),
            ));
        }
        Ok(Self { total, per_binding })
    }

    /// Returns the deadline for the whole invocation.
    #[must_use]
    pub const fn total(&self) -> Duration {
        self.total
    }

    /// Returns the default deadline for one binding attempt.
    #[must_use]
    pub const fn per_binding(&self) -> Duration {
        self.per_binding
    }
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            total: Duration::from_secs(30),
            per_binding: Duration::from_secs(10),
        }
    }
}

/// Health derived from recent invocation outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointHealth {
    /// No invocations yet.
    #[default]
    Unknown,
    /// At least 90% of invocations completed.
    Healthy,
    /// At least half of invocations completed.
    Degraded,
    /// Fewer than half of invocations completed.
    Unhealthy,
}

/// Usage analytics for an endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointUsage {
    /// Total invocations that reached execution.
    pub invocations: u64,
    /// Invocations with status `completed`.
    pub completed: u64,
    /// Invocations with status `failed`.
    pub failed: u64,
    /// Invocations with status `timeout`.
    pub timed_out: u64,
    /// Mean invocation latency.
    pub avg_latency_ms: f64,
    /// Last invocation time.
    pub last_invoked_at: Option<DateTime<Utc>>,
}

impl EndpointUsage {
    /// Folds one invocation into the analytics.
    #[expect(
        clippy::cast_precision_loss,
        reason = "invocation counts and latencies stay far below 2^52"
    )]
    #[must_use]
    pub fn record(self, status: ExecutionStatus, latency_ms: u64, at: DateTime<Utc>) -> Self {
        let previous = self.invocations as f64;
        let mut next = Self {
            invocations: self.invocations.saturating_add(1),
            avg_latency_ms: self.avg_latency_ms.mul_add(previous, latency_ms as f64)
                / (previous + 1.0),
            last_invoked_at: Some(at),
            ..self
        };
        match status {
            ExecutionStatus::Completed => next.completed = next.completed.saturating_add(1),
            ExecutionStatus::Failed => next.failed = next.failed.saturating_add(1),
            ExecutionStatus::Timeout => next.timed_out = next.timed_out.saturating_add(1),
        }
        next
    }

    /// Derives endpoint health from the completion ratio.
    #[must_use]
    pub const fn health(&self) -> EndpointHealth {
        if self.invocations == 0 {
            return EndpointHealth::Unknown;
        }
        let completed = self.completed.saturating_mul(10);
        if completed >= self.invocations.saturating_mul(9) {
            EndpointHealth::Healthy
        } else if completed >= self.invocations.saturating_mul(5) {
            EndpointHealth::Degraded
        } else {
            EndpointHealth::Unhealthy
        }
    }
}

/// Gateway endpoint with its ordered bindings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    id: EndpointId,
    name: String,
    path: String,
    description: String,
    visibility: Visibility,
    auth_required: bool,
    rate_limit: Option<RateLimitPolicy>,
    timeouts: TimeoutPolicy,
    input_shape: Option<Value>,
    status: EndpointStatus,
    usage: EndpointUsage,
    bindings: Vec<Binding>,
    next_sequence: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Endpoint {
    /// Creates a draft endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayDomainError::EmptyEndpointName`] or
    /// [`GatewayDomainError::InvalidEndpointPath`].
    pub fn new(
        name: impl Into<String>,
        path: &str,
        clock: &impl Clock,
    ) -> Result<Self, GatewayDomainError> {
        let trimmed_name = name.into().trim().to_owned();
        if trimmed_name.is_empty() {
            return Err(GatewayDomainError::EmptyEndpointName);
        }
        let timestamp = clock.utc();
        Ok(Self {
            id: EndpointId::new(),
            name: trimmed_name,
            path: normalize_path(path)?,
            description: String::new(),
            visibility: Visibility::default(),
            auth_required: false,
            rate_limit: None,
            timeouts: TimeoutPolicy::default(),
            input_shape: None,
            status: EndpointStatus::Draft,
            usage: EndpointUsage::default(),
            bindings: Vec::new(),
            next_sequence: 0,
            created_at: timestamp,
            updated_at: timestamp,
        })
    }

    /// Sets a description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into().trim().to_owned();
        self
    }

    /// Sets visibility.
    #[must_use]
    pub const fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Sets whether callers must authenticate.
    #[must_use]
    pub const fn with_auth_required(mut self, auth_required: bool) -> Self {
        self.auth_required = auth_required;
        self
    }

    /// Sets a rate limit.
    #[must_use]
    pub const fn with_rate_limit(mut self, rate_limit: RateLimitPolicy) -> Self {
        self.rate_limit = Some(rate_limit);
        self
    }

    /// Sets timeouts.
    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: TimeoutPolicy) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Declares the caller input shape.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayDomainError::InvalidInputShape`] unless the shape is
    /// an object with an object-valued `properties` member.
    pub fn with_input_shape(mut self, shape: Value) -> Result<Self, GatewayDomainError> {
        if !shape.get("properties").is_some_and(Value::is_object) {
            return Err(GatewayDomainError::InvalidInputShape);
        }
        self.input_shape = Some(shape);
        Ok(self)
    }

    /// Carries over usage analytics already stored for this endpoint.
    #[must_use]
    pub const fn with_usage(mut self, usage: EndpointUsage) -> Self {
        self.usage = usage;
        self
    }

    /// Returns the endpoint identifier.
    #[must_use]
    pub const fn id(&self) -> EndpointId {
        self.id
    }

    /// Returns the unique name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the normalized path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns visibility.
    #[must_use]
    pub const fn visibility(&self) -> Visibility {
        self.visibility
    }

    /// Returns whether callers must authenticate.
    #[must_use]
    pub const fn auth_required(&self) -> bool {
        self.auth_required
    }

    /// Returns the rate limit.
    #[must_use]
    pub const fn rate_limit(&self) -> Option<RateLimitPolicy> {
        self.rate_limit
    }

    /// Returns timeouts.
    #[must_use]
    pub const fn timeouts(&self) -> TimeoutPolicy {
        self.timeouts
    }

    /// Returns the declared input shape.
    #[must_use]
    pub const fn input_shape(&self) -> Option<&Value> {
        self.input_shape.as_ref()
    }

    /// Returns the lifecycle status.
    #[must_use]
    pub const fn status(&self) -> EndpointStatus {
        self.status
    }

    /// Returns usage analytics.
    #[must_use]
    pub const fn usage(&self) -> EndpointUsage {
        self.usage
    }

    /// Returns health derived from usage.
    #[must_use]
    pub const fn health(&self) -> EndpointHealth {
        self.usage.health()
    }

    /// Returns bindings in execution order.
    #[must_use]
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Returns one binding.
    #[must_use]
    pub fn binding(&self, binding_id: BindingId) -> Option<&Binding> {
        self.bindings.iter().find(|binding| binding.id() == binding_id)
    }

    /// Counts bindings targeting the server.
    #[must_use]
    pub fn count_bindings_for_server(&self, server_id: ServerId) -> usize {
        self.bindings
            .iter()
            .filter(|binding| binding.target().server_id() == server_id)
            .count()
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the latest update timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Caller fields declared by the input shape; `None` accepts any field.
    #[must_use]
    pub fn declared_input_fields(&self) -> Option<BTreeSet<String>> {
        self.input_shape
            .as_ref()
            .and_then(|shape| shape.get("properties"))
            .and_then(Value::as_object)
            .map(|properties| properties.keys().cloned().collect())
    }

    /// Appends a binding after validating alias and references.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayDomainError::DuplicateAlias`] or a reference error;
    /// the endpoint is left unchanged on failure.
    pub fn add_binding(
        &mut self,
        mut binding: Binding,
        clock: &impl Clock,
    ) -> Result<BindingId, GatewayDomainError> {
        if self.bindings.iter().any(|existing| existing.alias() == binding.alias()) {
            return Err(GatewayDomainError::DuplicateAlias(binding.alias().to_owned()));
        }
        binding.set_sequence(self.next_sequence);
        let binding_id = binding.id();
        self.edit(clock, |bindings| bindings.push(binding))?;
        self.next_sequence = self.next_sequence.saturating_add(1);
        Ok(binding_id)
    }

    /// Moves a binding to a new execution order.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayDomainError::BindingNotFound`] or a reference error
    /// when the new order creates a forward reference.
    pub fn reorder_binding(
        &mut self,
        binding_id: BindingId,
        order: i32,
        clock: &impl Clock,
    ) -> Result<(), GatewayDomainError> {
        let index = self.binding_index(binding_id)?;
        self.edit(clock, |bindings| {
            if let Some(binding) = bindings.get_mut(index) {
                binding.set_order(order);
            }
        })
    }

    /// Enables or disables a binding.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayDomainError::BindingNotFound`].
    pub fn set_binding_enabled(
        &mut self,
        binding_id: BindingId,
        enabled: bool,
        clock: &impl Clock,
    ) -> Result<(), GatewayDomainError> {
        let index = self.binding_index(binding_id)?;
        self.edit(clock, |bindings| {
            if let Some(binding) = bindings.get_mut(index) {
                binding.set_enabled(enabled);
            }
        })
    }

    /// Removes a binding.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayDomainError::BindingNotFound`], or a reference error
    /// when a remaining binding reads the removed alias.
    pub fn remove_binding(
        &mut self,
        binding_id: BindingId,
        clock: &impl Clock,
    ) -> Result<Binding, GatewayDomainError> {
        let index = self.binding_index(binding_id)?;
        let mut removed = None;
        self.edit(clock, |bindings| {
            if index < bindings.len() {
                removed = Some(bindings.remove(index));
            }
        })?;
        removed.ok_or(GatewayDomainError::BindingNotFound(binding_id))
    }

    /// Points a raw binding at its cataloged entry.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayDomainError::BindingNotFound`].
    pub fn resolve_binding_target(
        &mut self,
        binding_id: BindingId,
        entry_id: CatalogEntryId,
        server_id: ServerId,
        clock: &impl Clock,
    ) -> Result<(), GatewayDomainError> {
        let index = self.binding_index(binding_id)?;
        self.edit(clock, |bindings| {
            if let Some(binding) = bindings.get_mut(index) {
                binding.resolve_target(entry_id, server_id);
            }
        })
    }

    /// Moves the endpoint to `active`.
    ///
    /// Target resolution against the catalog is checked by the caller.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayDomainError::NoEnabledBindings`] or
    /// [`GatewayDomainError::InvalidStatusTransition`].
    pub fn activate(&mut self, clock: &impl Clock) -> Result<(), GatewayDomainError> {
        if !self.bindings.iter().any(Binding::is_enabled) {
            return Err(GatewayDomainError::NoEnabledBindings);
        }
        self.transition(EndpointStatus::Active, clock)
    }

    /// Moves the endpoint to `inactive`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayDomainError::InvalidStatusTransition`].
    pub fn deactivate(&mut self, clock: &impl Clock) -> Result<(), GatewayDomainError> {
        self.transition(EndpointStatus::Inactive, clock)
    }

    /// Moves the endpoint to `error`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayDomainError::InvalidStatusTransition`].
    pub fn mark_error(&mut self, clock: &impl Clock) -> Result<(), GatewayDomainError> {
        self.transition(EndpointStatus::Error, clock)
    }

    /// Folds one invocation into usage analytics.
    pub fn record_invocation(&mut self, status: ExecutionStatus, latency_ms: u64, at: DateTime<Utc>) {
        self.usage = self.usage.record(status, latency_ms, at);
    }

    fn transition(
        &mut self,
        next: EndpointStatus,
        clock: &impl Clock,
    ) -> Result<(), GatewayDomainError> {
        if !self.status.can_transition_to(next) {
            return Err(GatewayDomainError::InvalidStatusTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = clock.utc();
        Ok(())
    }

    fn binding_index(&self, binding_id: BindingId) -> Result<usize, GatewayDomainError> {
        self.bindings
            .iter()
            .position(|binding| binding.id() == binding_id)
            .ok_or(GatewayDomainError::BindingNotFound(binding_id))
    }

    /// Applies a change to a copy of the bindings and commits it only when
    /// every reference still resolves.
    fn edit(
        &mut self,
        clock: &impl Clock,
        change: impl FnOnce(&mut Vec<Binding>),
    ) -> Result<(), GatewayDomainError> {
        let mut candidate = self.bindings.clone();
        change(&mut candidate);
        candidate.sort_by_key(|binding| (binding.order(), binding.sequence()));
        validate_references(&candidate, self.declared_input_fields().as_ref())?;
        self.bindings = candidate;
        self.updated_at = clock.utc();
        Ok(())
    }
}

/// Checks that every expression reads only declared input fields or the
/// aliases of bindings with a strictly smaller execution order.
fn validate_references(
    bindings: &[Binding],
    declared: Option<&BTreeSet<String>>,
) -> Result<(), GatewayDomainError> {
    for binding in bindings {
        for reference in binding.expressions().flat_map(super::Expression::references) {
            if reference.root == INPUT_ROOT {
                let undeclared = reference
                    .field
                    .as_ref()
                    .filter(|field| declared.is_some_and(|fields| !fields.contains(*field)));
                if let Some(field) = undeclared {
                    return Err(GatewayDomainError::UndeclaredInputField {
                        alias: binding.alias().to_owned(),
                        field: field.clone(),
                    });
                }
                continue;
            }
            match bindings.iter().find(|other| other.alias() == reference.root) {
                Some(source) if source.order() < binding.order() => {}
                Some(_) => {
                    return Err(GatewayDomainError::ForwardReference {
                        alias: binding.alias().to_owned(),
                        referenced: reference.root,
                    });
                }
                None => {
                    return Err(GatewayDomainError::UnknownReference {
                        alias: binding.alias().to_owned(),
                        referenced: reference.root,
                    });
                }
            }
        }
    }
    Ok(())
}

/// Trims slashes and validates path segments.
///
/// # Errors
///
/// Returns [`GatewayDomainError::InvalidEndpointPath`] for empty paths,
/// empty segments or characters outside `[A-Za-z0-9._-]`.
pub fn normalize_path(path: &str) -> Result<String, GatewayDomainError> {
    let trimmed = path.trim().trim_matches('/');
    let valid = !trimmed.is_empty()
        && trimmed.split('/').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        });
    if valid {
        Ok(trimmed.to_owned())
    } else {
        Err(GatewayDomainError::InvalidEndpointPath(path.to_owned()))
    }
}
