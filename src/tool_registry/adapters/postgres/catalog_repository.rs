//! `PostgreSQL` repository implementation for the tool catalog.

use super::{
    ToolRegistryPgPool,
    models::{CatalogEntryRow, UsageStatsRow},
    schema::catalog_entries,
};
use crate::tool_registry::{
    domain::{
        CatalogEntry, CatalogEntryId, PersistedCatalogEntryData, ServerId, UsageSample, UsageStats,
    },
    ports::{CatalogError, CatalogRepository, CatalogResult},
};
use async_trait::async_trait;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sql_types::{Double, Uuid as SqlUuid};
use diesel::upsert::excluded;

/// Folds one sample into the stored averages in a single statement so
/// concurrent recorders never lose an update.
const RECORD_USAGE_SQL: &str = "\
UPDATE catalog_entries SET \
    avg_latency_ms = (avg_latency_ms * usage_count + $1) / (usage_count + 1), \
    success_rate = (success_rate * usage_count + $2) / (usage_count + 1), \
    usage_count = usage_count + 1 \
WHERE id = $3 \
RETURNING usage_count, success_rate, avg_latency_ms";

/// `PostgreSQL`-backed catalog repository.
#[derive(Debug, Clone)]
pub struct PostgresCatalog {
    pool: ToolRegistryPgPool,
}

impl PostgresCatalog {
    /// Creates a new repository from a `PostgreSQL` pool.
    #[must_use]
    pub const fn new(pool: ToolRegistryPgPool) -> Self {
        Self { pool }
    }

    async fn run_blocking<F, T>(&self, operation: F) -> CatalogResult<T>
    where
        F: FnOnce(&mut PgConnection) -> CatalogResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(CatalogError::persistence)?;
            operation(&mut connection)
        })
        .await
        .map_err(CatalogError::persistence)?
    }
}

#[async_trait]
impl CatalogRepository for PostgresCatalog {
    async fn upsert(&self, entry: &CatalogEntry) -> CatalogResult<()> {
        let server_id = entry.server_id();
        let tool_name = entry.tool_name().to_owned();
        let row = to_row(entry)?;

        self.run_blocking(move |connection| {
            diesel::insert_into(catalog_entries::table)
                .values(&row)
                .on_conflict(catalog_entries::id)
                .do_update()
                .set((
                    catalog_entries::description.eq(excluded(catalog_entries::description)),
                    catalog_entries::input_schema.eq(excluded(catalog_entries::input_schema)),
                    catalog_entries::output_schema.eq(excluded(catalog_entries::output_schema)),
                    catalog_entries::capabilities.eq(excluded(catalog_entries::capabilities)),
                    catalog_entries::available.eq(excluded(catalog_entries::available)),
                    catalog_entries::last_discovered
                        .eq(excluded(catalog_entries::last_discovered)),
                ))
                .execute(connection)
                .map_err(|err| match err {
                    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                        CatalogError::DuplicateTool {
                            server_id,
                            tool_name: tool_name.clone(),
                        }
                    }
                    _ => CatalogError::persistence(err),
                })?;
            Ok(())
        })
        .await
    }

    async fn find_by_id(&self, entry_id: CatalogEntryId) -> CatalogResult<Option<CatalogEntry>> {
        self.run_blocking(move |connection| {
            let row = catalog_entries::table
                .filter(catalog_entries::id.eq(entry_id.into_inner()))
                .select(CatalogEntryRow::as_select())
                .first::<CatalogEntryRow>(connection)
                .optional()
                .map_err(CatalogError::persistence)?;
            row.map(row_to_entry).transpose()
        })
        .await
    }

    async fn find_by_tool(
        &self,
        server_id: ServerId,
        tool_name: &str,
    ) -> CatalogResult<Option<CatalogEntry>> {
        let name = tool_name.to_owned();
        self.run_blocking(move |connection| {
            let row = catalog_entries::table
                .filter(catalog_entries::server_id.eq(server_id.into_inner()))
                .filter(catalog_entries::tool_name.eq(&name))
                .select(CatalogEntryRow::as_select())
                .first::<CatalogEntryRow>(connection)
                .optional()
                .map_err(CatalogError::persistence)?;
            row.map(row_to_entry).transpose()
        })
        .await
    }

    async fn list_for_server(&self, server_id: ServerId) -> CatalogResult<Vec<CatalogEntry>> {
        self.run_blocking(move |connection| {
            let rows = catalog_entries::table
                .filter(catalog_entries::server_id.eq(server_id.into_inner()))
                .order(catalog_entries::tool_name.asc())
                .select(CatalogEntryRow::as_select())
                .load::<CatalogEntryRow>(connection)
                .map_err(CatalogError::persistence)?;
            rows.into_iter().map(row_to_entry).collect()
        })
        .await
    }

    async fn remove_for_server(&self, server_id: ServerId) -> CatalogResult<usize> {
        self.run_blocking(move |connection| {
            diesel::delete(
                catalog_entries::table
                    .filter(catalog_entries::server_id.eq(server_id.into_inner())),
            )
            .execute(connection)
            .map_err(CatalogError::persistence)
        })
        .await
    }

    async fn record_usage(
        &self,
        entry_id: CatalogEntryId,
        sample: UsageSample,
    ) -> CatalogResult<UsageStats> {
        let outcome = if sample.success() { 100.0 } else { 0.0 };
        let latency_ms = sample.latency_ms();

        self.run_blocking(move |connection| {
            let row = diesel::sql_query(RECORD_USAGE_SQL)
                .bind::<Double, _>(latency_ms)
                .bind::<Double, _>(outcome)
                .bind::<SqlUuid, _>(entry_id.into_inner())
                .get_result::<UsageStatsRow>(connection)
                .optional()
                .map_err(CatalogError::persistence)?
                .ok_or(CatalogError::NotFound(entry_id))?;
            stats_from_row(row)
        })
        .await
    }
}

fn to_row(entry: &CatalogEntry) -> CatalogResult<CatalogEntryRow> {
    let stats = entry.stats();
    let usage_count = i64::try_from(stats.usage_count).map_err(CatalogError::persistence)?;
    let capabilities =
        serde_json::to_value(entry.capabilities()).map_err(CatalogError::persistence)?;

    Ok(CatalogEntryRow {
        id: entry.id().into_inner(),
        server_id: entry.server_id().into_inner(),
        tool_name: entry.tool_name().to_owned(),
        description: entry.description().to_owned(),
        input_schema: entry.input_schema().clone(),
        output_schema: entry.output_schema().cloned(),
        capabilities,
        available: entry.is_available(),
        usage_count,
        success_rate: stats.success_rate,
        avg_latency_ms: stats.avg_latency_ms,
        last_discovered: entry.last_discovered(),
        created_at: entry.created_at(),
    })
}

fn stats_from_row(row: UsageStatsRow) -> CatalogResult<UsageStats> {
    Ok(UsageStats {
        usage_count: u64::try_from(row.usage_count)
            .map_err(CatalogError::invalid_persisted_data)?,
        success_rate: row.success_rate,
        avg_latency_ms: row.avg_latency_ms,
    })
}

fn row_to_entry(row: CatalogEntryRow) -> CatalogResult<CatalogEntry> {
    let stats = stats_from_row(UsageStatsRow {
        usage_count: row.usage_count,
        success_rate: row.success_rate,
        avg_latency_ms: row.avg_latency_ms,
    })?;
    let capabilities: Vec<String> = serde_json::from_value(row.capabilities)
        .map_err(CatalogError::invalid_persisted_data)?;

    Ok(CatalogEntry::from_persisted(PersistedCatalogEntryData {
        id: CatalogEntryId::from_uuid(row.id),
        server_id: ServerId::from_uuid(row.server_id),
        tool_name: row.tool_name,
        description: row.description,
        input_schema: row.input_schema,
        output_schema: row.output_schema,
        capabilities,
        available: row.available,
        stats,
        last_discovered: row.last_discovered,
        created_at: row.created_at,
    }))
}
