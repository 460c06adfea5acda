//! Identifier newtypes for the gateway domain.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random ", $label, " identifier.")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Creates a ", $label, " identifier from an existing UUID.")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the wrapped UUID.
            #[must_use]
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl AsRef<Uuid> for $name {
            fn as_ref(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_identifier!(
    /// Unique identifier for a gateway endpoint.
    EndpointId,
    "endpoint"
);
uuid_identifier!(
    /// Unique identifier for a tool binding within an endpoint.
    BindingId,
    "binding"
);
uuid_identifier!(
    /// Identifier shared by every record produced by one endpoint invocation.
    ExecutionId,
    "execution"
);
uuid_identifier!(
    /// Unique identifier for one execution record.
    ExecutionRecordId,
    "execution record"
);
uuid_identifier!(
    /// Unique identifier for a tool test result.
    TestResultId,
    "test result"
);
