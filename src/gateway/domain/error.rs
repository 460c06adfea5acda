//! Error types for gateway composition and parsing.

use super::{BindingId, EndpointStatus, ExpressionError};
use thiserror::Error;

/// Composition-time validation failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayDomainError {
    /// The endpoint name is empty after trimming.
    #[error("endpoint name must not be empty")]
    EmptyEndpointName,

    /// The endpoint path is empty or contains invalid segments.
    #[error("invalid endpoint path '{0}'")]
    InvalidEndpointPath(String),

    /// The binding alias is not a valid identifier.
    #[error("invalid binding alias '{0}', expected [A-Za-z_][A-Za-z0-9_]*")]
    InvalidAlias(String),

    /// The alias collides with the reserved caller-input root.
    #[error("binding alias '{0}' is reserved")]
    ReservedAlias(String),

    /// Another binding of the endpoint already uses the alias.
    #[error("binding alias '{0}' is already used in this endpoint")]
    DuplicateAlias(String),

    /// A mapped tool field name is empty.
    #[error("parameter mapping keys must not be empty")]
    EmptyMappingField,

    /// An expression failed to parse or violated the grammar.
    #[error("expression '{source_text}' is invalid: {error}")]
    Expression {
        /// Offending expression text.
        source_text: String,
        /// Underlying parse failure.
        error: ExpressionError,
    },

    /// An expression reads a binding that does not run strictly earlier.
    #[error("binding '{alias}' references '{referenced}', which does not run before it")]
    ForwardReference {
        /// Alias of the binding holding the expression.
        alias: String,
        /// Alias being referenced.
        referenced: String,
    },

    /// An expression references an unknown root name.
    #[error("binding '{alias}' references unknown name '{referenced}'")]
    UnknownReference {
        /// Alias of the binding holding the expression.
        alias: String,
        /// Unknown root name.
        referenced: String,
    },

    /// An expression reads a caller field absent from the input shape.
    #[error("binding '{alias}' reads undeclared input field '{field}'")]
    UndeclaredInputField {
        /// Alias of the binding holding the expression.
        alias: String,
        /// Undeclared field.
        field: String,
    },

    /// Retry policy bounds are inconsistent.
    #[error("invalid retry policy: {0}")]
    InvalidRetryPolicy(String),

    /// A timeout or rate-limit value is zero.
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    /// The binding does not exist on the endpoint.
    #[error("binding {0} does not belong to this endpoint")]
    BindingNotFound(BindingId),

    /// The catalog target is missing or unavailable.
    #[error("binding target is not an available catalog entry: {0}")]
    UnavailableTarget(String),

    /// The requested status change is not permitted.
    #[error("endpoint cannot move from {from} to {to}")]
    InvalidStatusTransition {
        /// Current status.
        from: EndpointStatus,
        /// Requested status.
        to: EndpointStatus,
    },

    /// Activation requires at least one enabled binding.
    #[error("endpoint has no enabled bindings")]
    NoEnabledBindings,

    /// The expected input shape is not a JSON object schema.
    #[error("expected input shape must be a JSON object with a 'properties' object")]
    InvalidInputShape,
}

/// Error returned while parsing endpoint status from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown endpoint status: {0}")]
pub struct ParseEndpointStatusError(pub String);

/// Error returned while parsing a record status from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown execution record status: {0}")]
pub struct ParseRecordStatusError(pub String);
