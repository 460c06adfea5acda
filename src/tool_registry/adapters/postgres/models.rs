//! Diesel row models for tool server and catalog persistence.

use super::schema::{catalog_entries, tool_servers};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;

/// Query result row for tool server records.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = tool_servers)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ToolServerRow {
    /// Internal server identifier.
    pub id: uuid::Uuid,
    /// Unique server name.
    pub name: String,
    /// Unique base address.
    pub address: String,
    /// Transport configuration payload.
    pub transport: Value,
    /// Credential payload.
    pub auth: Value,
    /// Capability tags.
    pub capabilities: Value,
    /// Health status.
    pub health_status: String,
    /// Optional health message.
    pub health_message: Option<String>,
    /// Health check timestamp.
    pub health_checked_at: DateTime<Utc>,
    /// Active flag.
    pub active: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Query result row for catalog entries.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = catalog_entries)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CatalogEntryRow {
    /// Entry identifier.
    pub id: uuid::Uuid,
    /// Owning server.
    pub server_id: uuid::Uuid,
    /// Tool name.
    pub tool_name: String,
    /// Tool description.
    pub description: String,
    /// Input schema.
    pub input_schema: Value,
    /// Optional output schema.
    pub output_schema: Option<Value>,
    /// Capability tags.
    pub capabilities: Value,
    /// Availability flag.
    pub available: bool,
    /// Number of recorded invocations.
    pub usage_count: i64,
    /// Percentage of successful invocations.
    pub success_rate: f64,
    /// Mean latency.
    pub avg_latency_ms: f64,
    /// Last discovery timestamp.
    pub last_discovered: DateTime<Utc>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Statistics returned by the atomic usage update.
#[derive(Debug, Clone, Copy, QueryableByName)]
pub struct UsageStatsRow {
    /// Number of recorded invocations.
    #[diesel(sql_type = diesel::sql_types::Int8)]
    pub usage_count: i64,
    /// Percentage of successful invocations.
    #[diesel(sql_type = diesel::sql_types::Float8)]
    pub success_rate: f64,
    /// Mean latency.
    #[diesel(sql_type = diesel::sql_types::Float8)]
    pub avg_latency_ms: f64,
}
