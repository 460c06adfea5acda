//! Catalog entries: the gateway's local record of one discovered tool.

use super::{CatalogEntryId, ServerId, ToolDefinition, ToolRegistryDomainError};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// One observed tool invocation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UsageSample {
    latency_ms: f64,
    success: bool,
}

impl UsageSample {
    /// Creates a validated usage sample.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::InvalidLatency`] when the latency is
    /// negative, NaN or infinite.
    pub fn new(latency_ms: f64, success: bool) -> Result<Self, ToolRegistryDomainError> {
        if !latency_ms.is_finite() || latency_ms < 0.0 {
            return Err(ToolRegistryDomainError::InvalidLatency(
                latency_ms.to_string(),
            ));
        }
        Ok(Self {
            latency_ms,
            success,
        })
    }

    /// Returns the observed latency in milliseconds.
    #[must_use]
    pub const fn latency_ms(&self) -> f64 {
        self.latency_ms
    }

    /// Returns whether the invocation succeeded.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.success
    }
}

/// Rolling usage statistics for a catalog entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageStats {
    /// Number of recorded invocations.
    pub usage_count: u64,
    /// Percentage of successful invocations, `0.0..=100.0`.
    pub success_rate: f64,
    /// Mean latency across recorded invocations.
    pub avg_latency_ms: f64,
}

impl UsageStats {
    /// Folds one sample into the running averages.
    #[expect(
        clippy::cast_precision_loss,
        reason = "usage counts stay far below 2^52 in practice"
    )]
    #[must_use]
    pub fn record(self, sample: UsageSample) -> Self {
        let previous = self.usage_count as f64;
        let next = previous + 1.0;
        let outcome = if sample.success() { 100.0 } else { 0.0 };
        Self {
            usage_count: self.usage_count.saturating_add(1),
            success_rate: self.success_rate.mul_add(previous, outcome) / next,
            avg_latency_ms: self.avg_latency_ms.mul_add(previous, sample.latency_ms()) / next,
        }
    }
}

/// Discovered tool owned by one server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    id: CatalogEntryId,
    server_id: ServerId,
    tool_name: String,
    description: String,
    input_schema: Value,
    output_schema: Option<Value>,
    capabilities: Vec<String>,
    available: bool,
    stats: UsageStats,
    schema_digest: String,
    last_discovered: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

/// Parameter object for reconstructing persisted catalog entries.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedCatalogEntryData {
    /// Persisted entry identifier.
    pub id: CatalogEntryId,
    /// Owning server.
    pub server_id: ServerId,
    /// Tool name, unique per server.
    pub tool_name: String,
    /// Tool description.
    pub description: String,
    /// Input schema.
    pub input_schema: Value,
    /// Optional output schema.
    pub output_schema: Option<Value>,
    /// Capability tags.
    pub capabilities: Vec<String>,
    /// Availability flag.
    pub available: bool,
    /// Rolling statistics.
    pub stats: UsageStats,
    /// Last discovery timestamp.
    pub last_discovered: DateTime<Utc>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl CatalogEntry {
    /// Creates an available entry from a freshly listed tool.
    #[must_use]
    pub fn discovered(server_id: ServerId, definition: &ToolDefinition, clock: &impl Clock) -> Self {
        let timestamp = clock.utc();
        Self {
            id: CatalogEntryId::new(),
            server_id,
            tool_name: definition.name().to_owned(),
            description: definition.description().to_owned(),
            input_schema: definition.input_schema().clone(),
            output_schema: definition.output_schema().cloned(),
            capabilities: definition.capabilities().to_vec(),
            available: true,
            stats: UsageStats::default(),
            schema_digest: schema_digest(definition.input_schema(), definition.output_schema()),
            last_discovered: timestamp,
            created_at: timestamp,
        }
    }

    /// Reconstructs an entry from persistence.
    #[must_use]
    pub fn from_persisted(data: PersistedCatalogEntryData) -> Self {
        let schema_digest = schema_digest(&data.input_schema, data.output_schema.as_ref());
        Self {
            id: data.id,
            server_id: data.server_id,
            tool_name: data.tool_name,
            description: data.description,
            input_schema: data.input_schema,
            output_schema: data.output_schema,
            capabilities: data.capabilities,
            available: data.available,
            stats: data.stats,
            schema_digest,
            last_discovered: data.last_discovered,
            created_at: data.created_at,
        }
    }

    /// Applies the latest listing for this tool and marks it available.
    ///
    /// Returns `true` when the input or output schema changed.
    pub fn refresh(&mut self, definition: &ToolDefinition, clock: &impl Clock) -> bool {
        let digest = schema_digest(definition.input_schema(), definition.output_schema());
        let schema_changed = digest != self.schema_digest;
        self.description = definition.description().to_owned();
        self.input_schema = definition.input_schema().clone();
        self.output_schema = definition.output_schema().cloned();
        self.capabilities = definition.capabilities().to_vec();
        self.schema_digest = digest;
        self.available = true;
        self.last_discovered = clock.utc();
        schema_changed
    }

    /// Marks the entry as absent from the latest listing.
    pub fn mark_unavailable(&mut self, clock: &impl Clock) {
        self.available = false;
        self.last_discovered = clock.utc();
    }

    /// Folds a usage sample into the rolling statistics.
    pub fn record_usage(&mut self, sample: UsageSample) {
        self.stats = self.stats.record(sample);
    }

    /// Carries over statistics already stored for this entry.
    #[must_use]
    pub const fn with_stats(mut self, stats: UsageStats) -> Self {
        self.stats = stats;
        self
    }

    /// Returns the entry identifier.
    #[must_use]
    pub const fn id(&self) -> CatalogEntryId {
        self.id
    }

    /// Returns the owning server.
    #[must_use]
    pub const fn server_id(&self) -> ServerId {
        self.server_id
    }

    /// Returns the tool name.
    #[must_use]
    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    /// Returns the tool description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the input schema.
    #[must_use]
    pub const fn input_schema(&self) -> &Value {
        &self.input_schema
    }

    /// Returns the optional output schema.
    #[must_use]
    pub const fn output_schema(&self) -> Option<&Value> {
        self.output_schema.as_ref()
    }

    /// Returns capability tags.
    #[must_use]
    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    /// Returns whether the latest listing included this tool.
    #[must_use]
    pub const fn is_available(&self) -> bool {
        self.available
    }

    /// Returns rolling usage statistics.
    #[must_use]
    pub const fn stats(&self) -> UsageStats {
        self.stats
    }

    /// Returns the hex SHA-256 digest of the input and output schemas.
    #[must_use]
    pub fn schema_digest(&self) -> &str {
        &self.schema_digest
    }

    /// Returns the last discovery timestamp.
    #[must_use]
    pub const fn last_discovered(&self) -> DateTime<Utc> {
        self.last_discovered
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

fn schema_digest(input_schema: &Value, output_schema: Option<&Value>) -> String {
    let canonical = serde_json::json!([input_schema, output_schema]).to_string();
    let digest = Sha256::digest(canonical.as_bytes());
    digest
        .iter()
        .fold(String::with_capacity(64), |mut encoded, byte| {
            encoded.push_str(&format!("{byte:02x}"));
            encoded
        })
}
