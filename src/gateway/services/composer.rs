//! Endpoint composition: definitions, bindings and lifecycle.

use crate::gateway::{
    domain::{
        Binding, BindingId, BindingTarget, Endpoint, EndpointId, ErrorPolicy, Expression,
        GatewayDomainError, NewBinding, RateLimitPolicy, RetryPolicy, TimeoutPolicy, Visibility,
    },
    ports::{EndpointRepository, EndpointRepositoryError},
};
use crate::tool_registry::{
    domain::{CatalogEntryId, ServerId},
    ports::{CatalogError, CatalogRepository},
};
use mockable::Clock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Request payload for creating an endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateEndpointRequest {
    /// Unique endpoint name.
    pub name: String,
    /// Unique path, slashes optional.
    pub path: String,
    /// Free-form description.
    pub description: String,
    /// Visibility.
    pub visibility: Visibility,
    /// Whether callers must authenticate.
    pub auth_required: bool,
    /// Optional rate limit.
    pub rate_limit: Option<RateLimitPolicy>,
    /// Optional timeouts; defaults apply when absent.
    pub timeouts: Option<TimeoutPolicy>,
    /// Optional JSON schema declaring caller fields under `properties`.
    pub input_shape: Option<Value>,
}

impl CreateEndpointRequest {
    /// Creates a private endpoint request with default policies.
    #[must_use]
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            description: String::new(),
            visibility: Visibility::default(),
            auth_required: false,
            rate_limit: None,
            timeouts: None,
            input_shape: None,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets visibility.
    #[must_use]
    pub const fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Requires caller authentication.
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
        self.timeouts = Some(timeouts);
        self
    }

    /// Declares the caller input shape.
    #[must_use]
    pub fn with_input_shape(mut self, input_shape: Value) -> Self {
        self.input_shape = Some(input_shape);
        self
    }
}

/// Tool a new binding should target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSpec {
    /// An available catalog entry.
    Catalog(CatalogEntryId),
    /// A server/tool pair resolved against the catalog at activation.
    Raw {
        /// Target server.
        server_id: ServerId,
        /// Tool name on that server.
        tool_name: String,
    },
}

/// Request payload for adding a binding.
#[derive(Debug, Clone, PartialEq)]
pub struct AddBindingRequest {
    /// Tool to invoke.
    pub target: TargetSpec,
    /// Alias unique within the endpoint.
    pub alias: String,
    /// Tool field to expression source.
    pub mapping: BTreeMap<String, String>,
    /// Execution order.
    pub order: i32,
    /// Optional condition source.
    pub condition: Option<String>,
    /// Failure handling.
    pub error_policy: ErrorPolicy,
    /// Retry handling.
    pub retry: RetryPolicy,
    /// Whether failure of this binding fails the endpoint.
    pub required: bool,
    /// Timeout override.
    pub timeout: Option<Duration>,
}

impl AddBindingRequest {
    /// Creates a required, unconditional binding request with no retries.
    #[must_use]
    pub fn new(target: TargetSpec, alias: impl Into<String>, order: i32) -> Self {
        Self {
            target,
            alias: alias.into(),
            mapping: BTreeMap::new(),
            order,
            condition: None,
            error_policy: ErrorPolicy::Abort,
            retry: RetryPolicy::no_retry(),
            required: true,
            timeout: None,
        }
    }

    /// Maps a tool field from an expression.
    #[must_use]
    pub fn map(mut self, field: impl Into<String>, expression: impl Into<String>) -> Self {
        self.mapping.insert(field.into(), expression.into());
        self
    }

    /// Guards the binding with a condition.
    #[must_use]
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Sets the failure policy.
    #[must_use]
    pub fn with_error_policy(mut self, error_policy: ErrorPolicy) -> Self {
        self.error_policy = error_policy;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Marks the binding optional.
    #[must_use]
    pub const fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Overrides the per-binding timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Service-level errors for composition.
#[derive(Debug, Error)]
pub enum EndpointComposerError {
    /// Composition rule violated.
    #[error(transparent)]
    Validation(#[from] GatewayDomainError),
    /// Endpoint repository operation failed.
    #[error(transparent)]
    Repository(#[from] EndpointRepositoryError),
    /// Catalog lookup failed.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    /// No endpoint exists with the given identifier.
    #[error("endpoint {0} not found")]
    NotFound(EndpointId),
}

impl EndpointComposerError {
    /// Returns whether the request itself was invalid.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::Repository(
                    EndpointRepositoryError::DuplicateName(_)
                        | EndpointRepositoryError::DuplicatePath(_)
                )
        )
    }
}

/// Result type for composer operations.
pub type EndpointComposerResult<T> = Result<T, EndpointComposerError>;

/// Endpoint composition service.
pub struct EndpointComposer<E, K, C>
where
    E: EndpointRepository,
    K: CatalogRepository,
    C: Clock + Send + Sync,
{
    endpoints: Arc<E>,
    catalog: Arc<K>,
    clock: Arc<C>,
}

impl<E, K, C> Clone for EndpointComposer<E, K, C>
where
    E: EndpointRepository,
    K: CatalogRepository,
    C: Clock + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            endpoints: Arc::clone(&self.endpoints),
            catalog: Arc::clone(&self.catalog),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<E, K, C> EndpointComposer<E, K, C>
where
    E: EndpointRepository,
    K: CatalogRepository,
    C: Clock + Send + Sync,
{
    /// Creates a composer.
    #[must_use]
    pub const fn new(endpoints: Arc<E>, catalog: Arc<K>, clock: Arc<C>) -> Self {
        Self {
            endpoints,
            catalog,
            clock,
        }
    }

    async fn load(&self, endpoint_id: EndpointId) -> EndpointComposerResult<Endpoint> {
        self.endpoints
            .find_by_id(endpoint_id)
            .await?
            .ok_or(EndpointComposerError::NotFound(endpoint_id))
    }

    /// Creates a draft endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointComposerError`] when validation fails or the name
    /// or path is taken.
    pub async fn create_endpoint(
        &self,
        request: CreateEndpointRequest,
    ) -> EndpointComposerResult<Endpoint> {
        let mut endpoint = Endpoint::new(request.name, &request.path, &*self.clock)?
            .with_description(request.description)
            .with_visibility(request.visibility)
            .with_auth_required(request.auth_required);
        if let Some(rate_limit) = request.rate_limit {
            endpoint = endpoint.with_rate_limit(rate_limit);
        }
        if let Some(timeouts) = request.timeouts {
            endpoint = endpoint.with_timeouts(timeouts);
        }
        if let Some(shape) = request.input_shape {
            endpoint = endpoint.with_input_shape(shape)?;
        }
        self.endpoints.create(&endpoint).await?;
        info!(endpoint = endpoint.name(), path = endpoint.path(), "created endpoint");
        Ok(endpoint)
    }

    /// Adds a binding to an endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointComposerError::Validation`] when the alias is taken,
    /// the catalog target is missing or unavailable, an expression does not
    /// parse, or a reference is forward, unknown or undeclared.
    pub async fn add_binding(
        &self,
        endpoint_id: EndpointId,
        request: AddBindingRequest,
    ) -> EndpointComposerResult<Binding> {
        let mut endpoint = self.load(endpoint_id).await?;
        let target = self.resolve_target_spec(request.target).await?;
        let mapping = request
            .mapping
            .into_iter()
            .map(|(field, source)| parse_mapping(&source).map(|expression| (field, expression)))
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        let condition = request
            .condition
            .as_deref()
            .map(parse_condition)
            .transpose()?;
        let binding = Binding::new(
            NewBinding {
                endpoint_id,
                target,
                alias: request.alias,
                mapping,
                order: request.order,
                condition,
                error_policy: request.error_policy,
                retry: request.retry,
                required: request.required,
                timeout: request.timeout,
            },
            &*self.clock,
        )?;
        let binding_id = endpoint.add_binding(binding, &*self.clock)?;
        self.endpoints.update(&endpoint).await?;
        let stored = endpoint
            .binding(binding_id)
            .cloned()
            .ok_or(GatewayDomainError::BindingNotFound(binding_id))?;
        info!(
            endpoint = endpoint.name(),
            alias = stored.alias(),
            order = stored.order(),
            "added binding"
        );
        Ok(stored)
    }

    /// Changes a binding's execution order, re-validating every binding.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointComposerError::Validation`] when the new order
    /// creates a forward reference.
    pub async fn update_binding_order(
        &self,
        endpoint_id: EndpointId,
        binding_id: BindingId,
        order: i32,
    ) -> EndpointComposerResult<Endpoint> {
        let mut endpoint = self.load(endpoint_id).await?;
        endpoint.reorder_binding(binding_id, order, &*self.clock)?;
        self.endpoints.update(&endpoint).await?;
        Ok(endpoint)
    }

    /// Enables or disables a binding.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointComposerError`] when the endpoint or binding is
    /// missing.
    pub async fn set_binding_enabled(
        &self,
        endpoint_id: EndpointId,
        binding_id: BindingId,
        enabled: bool,
    ) -> EndpointComposerResult<Endpoint> {
        let mut endpoint = self.load(endpoint_id).await?;
        endpoint.set_binding_enabled(binding_id, enabled, &*self.clock)?;
        self.endpoints.update(&endpoint).await?;
        Ok(endpoint)
    }

    /// Removes a binding.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointComposerError::Validation`] when another binding
    /// still reads its alias.
    pub async fn remove_binding(
        &self,
        endpoint_id: EndpointId,
        binding_id: BindingId,
    ) -> EndpointComposerResult<Endpoint> {
        let mut endpoint = self.load(endpoint_id).await?;
        let removed = endpoint.remove_binding(binding_id, &*self.clock)?;
        self.endpoints.update(&endpoint).await?;
        info!(endpoint = endpoint.name(), alias = removed.alias(), "removed binding");
        Ok(endpoint)
    }

    /// Activates an endpoint.
    ///
    /// Raw targets that now exist in the catalog are resolved to their
    /// entries.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointComposerError::Validation`] when no binding is
    /// enabled, a required binding's target is not an available catalog
    /// entry, or the status does not allow activation.
    pub async fn activate(&self, endpoint_id: EndpointId) -> EndpointComposerResult<Endpoint> {
        let mut endpoint = self.load(endpoint_id).await?;
        let enabled: Vec<_> = endpoint
            .bindings()
            .iter()
            .filter(|binding| binding.is_enabled())
            .cloned()
            .collect();
        for binding in enabled {
            let resolved = self.lookup_available(binding.target()).await?;
            match resolved {
                Some((entry_id, server_id)) => {
                    endpoint.resolve_binding_target(binding.id(), entry_id, server_id, &*self.clock)?;
                }
                None if binding.is_required() => {
                    return Err(GatewayDomainError::UnavailableTarget(describe(binding.target())).into());
                }
                None => {}
            }
        }
        endpoint.activate(&*self.clock)?;
        self.endpoints.update(&endpoint).await?;
        info!(endpoint = endpoint.name(), "activated endpoint");
        Ok(endpoint)
    }

    /// Takes an endpoint offline.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointComposerError::Validation`] for disallowed
    /// transitions.
    pub async fn deactivate(&self, endpoint_id: EndpointId) -> EndpointComposerResult<Endpoint> {
        let mut endpoint = self.load(endpoint_id).await?;
        endpoint.deactivate(&*self.clock)?;
        self.endpoints.update(&endpoint).await?;
        info!(endpoint = endpoint.name(), "deactivated endpoint");
        Ok(endpoint)
    }

    /// Moves an active endpoint to `error`.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointComposerError::Validation`] for disallowed
    /// transitions.
    pub async fn mark_error(&self, endpoint_id: EndpointId) -> EndpointComposerResult<Endpoint> {
        let mut endpoint = self.load(endpoint_id).await?;
        endpoint.mark_error(&*self.clock)?;
        self.endpoints.update(&endpoint).await?;
        info!(endpoint = endpoint.name(), "marked endpoint as errored");
        Ok(endpoint)
    }

    /// Fetches an endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointComposerError::NotFound`].
    pub async fn get(&self, endpoint_id: EndpointId) -> EndpointComposerResult<Endpoint> {
        self.load(endpoint_id).await
    }

    /// Finds an endpoint by path; slashes are normalized.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointComposerError`] when the lookup fails.
    pub async fn find_by_path(&self, path: &str) -> EndpointComposerResult<Option<Endpoint>> {
        let normalized = crate::gateway::domain::normalize_path(path)?;
        Ok(self.endpoints.find_by_path(&normalized).await?)
    }

    /// Lists every endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointComposerError`] when the lookup fails.
    pub async fn list(&self) -> EndpointComposerResult<Vec<Endpoint>> {
        Ok(self.endpoints.list_all().await?)
    }

    async fn resolve_target_spec(
        &self,
        spec: TargetSpec,
    ) -> EndpointComposerResult<BindingTarget> {
        match spec {
            TargetSpec::Catalog(entry_id) => {
                let entry = self
                    .catalog
                    .find_by_id(entry_id)
                    .await?
                    .filter(|entry| entry.is_available())
                    .ok_or_else(|| GatewayDomainError::UnavailableTarget(entry_id.to_string()))?;
                Ok(BindingTarget::Catalog {
                    entry_id,
                    server_id: entry.server_id(),
                })
            }
            TargetSpec::Raw {
                server_id,
                tool_name,
            } => Ok(BindingTarget::Raw {
                server_id,
                tool_name,
            }),
        }
    }

    async fn lookup_available(
        &self,
        target: &BindingTarget,
    ) -> EndpointComposerResult<Option<(CatalogEntryId, ServerId)>> {
        let entry = match target {
            BindingTarget::Catalog { entry_id, .. } => self.catalog.find_by_id(*entry_id).await?,
            BindingTarget::Raw {
                server_id,
                tool_name,
            } => self.catalog.find_by_tool(*server_id, tool_name).await?,
        };
        Ok(entry
            .filter(|entry| entry.is_available())
            .map(|entry| (entry.id(), entry.server_id())))
    }
}

fn describe(target: &BindingTarget) -> String {
    match target {
        BindingTarget::Catalog { entry_id, .. } => entry_id.to_string(),
        BindingTarget::Raw {
            server_id,
            tool_name,
        } => format!("{server_id}/{tool_name}"),
    }
}

fn parse_mapping(source: &str) -> Result<Expression, GatewayDomainError> {
    Expression::parse(source).map_err(|error| GatewayDomainError::Expression {
        source_text: source.to_owned(),
        error,
    })
}

fn parse_condition(source: &str) -> Result<Expression, GatewayDomainError> {
    Expression::parse_condition(source).map_err(|error| GatewayDomainError::Expression {
        source_text: source.to_owned(),
        error,
    })
}
