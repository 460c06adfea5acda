//! `PostgreSQL` repository implementation for tool server registrations.

use super::{ToolRegistryPgPool, models::ToolServerRow, schema::tool_servers};
use crate::tool_registry::{
    domain::{
        AuthConfig, PersistedToolServerData, ServerHealthSnapshot, ServerHealthStatus, ServerId,
        ServerName, ServerTransport, ToolServer,
    },
    ports::{ServerRegistryError, ServerRegistryResult, ServerRepository},
};
use async_trait::async_trait;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};

const NAME_CONSTRAINT: &str = "idx_tool_servers_name";
const ADDRESS_CONSTRAINT: &str = "idx_tool_servers_address";

/// `PostgreSQL`-backed repository for tool server records.
#[derive(Debug, Clone)]
pub struct PostgresServerRegistry {
    pool: ToolRegistryPgPool,
}

impl PostgresServerRegistry {
    /// Creates a new repository from a `PostgreSQL` pool.
    #[must_use]
    pub const fn new(pool: ToolRegistryPgPool) -> Self {
        Self { pool }
    }

    async fn run_blocking<F, T>(&self, operation: F) -> ServerRegistryResult<T>
    where
        F: FnOnce(&mut PgConnection) -> ServerRegistryResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(ServerRegistryError::persistence)?;
            operation(&mut connection)
        })
        .await
        .map_err(ServerRegistryError::persistence)?
    }
}

#[async_trait]
impl ServerRepository for PostgresServerRegistry {
    async fn register(&self, server: &ToolServer) -> ServerRegistryResult<()> {
        let server_id = server.id();
        let server_name = server.name().clone();
        let address = server.address();
        let row = to_row(server)?;

        self.run_blocking(move |connection| {
            diesel::insert_into(tool_servers::table)
                .values(&row)
                .execute(connection)
                .map_err(|err| match err {
                    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, ref info)
                        if violates(info.as_ref(), NAME_CONSTRAINT) =>
                    {
                        ServerRegistryError::DuplicateServerName(server_name.clone())
                    }
                    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, ref info)
                        if violates(info.as_ref(), ADDRESS_CONSTRAINT) =>
                    {
                        ServerRegistryError::DuplicateServerAddress(address.clone())
                    }
                    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                        ServerRegistryError::DuplicateServer(server_id)
                    }
                    _ => ServerRegistryError::persistence(err),
                })?;
            Ok(())
        })
        .await
    }

    async fn update(&self, server: &ToolServer) -> ServerRegistryResult<()> {
        let server_id = server.id().into_inner();
        let row = to_row(server)?;

        self.run_blocking(move |connection| {
            let updated_count =
                diesel::update(tool_servers::table.filter(tool_servers::id.eq(server_id)))
                    .set((
                        tool_servers::transport.eq(&row.transport),
                        tool_servers::auth.eq(&row.auth),
                        tool_servers::capabilities.eq(&row.capabilities),
                        tool_servers::health_status.eq(&row.health_status),
                        tool_servers::health_message.eq(&row.health_message),
                        tool_servers::health_checked_at.eq(row.health_checked_at),
                        tool_servers::active.eq(row.active),
                        tool_servers::updated_at.eq(row.updated_at),
                    ))
                    .execute(connection)
                    .map_err(ServerRegistryError::persistence)?;

            if updated_count == 0 {
                return Err(ServerRegistryError::NotFound(ServerId::from_uuid(server_id)));
            }
            Ok(())
        })
        .await
    }

    async fn update_health(
        &self,
        server_id: ServerId,
        snapshot: &ServerHealthSnapshot,
    ) -> ServerRegistryResult<ToolServer> {
        let id = server_id.into_inner();
        let status = snapshot.status().as_str().to_owned();
        let message = snapshot.message().map(str::to_owned);
        let checked_at = snapshot.checked_at();

        self.run_blocking(move |connection| {
            let updated = diesel::update(
                tool_servers::table
                    .filter(tool_servers::id.eq(id))
                    .filter(tool_servers::active.eq(true)),
            )
            .set((
                tool_servers::health_status.eq(&status),
                tool_servers::health_message.eq(&message),
                tool_servers::health_checked_at.eq(checked_at),
            ))
            .returning(ToolServerRow::as_returning())
            .get_result::<ToolServerRow>(connection)
            .optional()
            .map_err(ServerRegistryError::persistence)?;

            let row = match updated {
                Some(row) => row,
                None => tool_servers::table
                    .filter(tool_servers::id.eq(id))
                    .select(ToolServerRow::as_select())
                    .first::<ToolServerRow>(connection)
                    .optional()
                    .map_err(ServerRegistryError::persistence)?
                    .ok_or(ServerRegistryError::NotFound(server_id))?,
            };
            row_to_server(row)
        })
        .await
    }

    async fn remove(&self, server_id: ServerId) -> ServerRegistryResult<()> {
        self.run_blocking(move |connection| {
            let removed =
                diesel::delete(tool_servers::table.filter(tool_servers::id.eq(server_id.into_inner())))
                    .execute(connection)
                    .map_err(ServerRegistryError::persistence)?;
            if removed == 0 {
                return Err(ServerRegistryError::NotFound(server_id));
            }
            Ok(())
        })
        .await
    }

    async fn find_by_id(&self, server_id: ServerId) -> ServerRegistryResult<Option<ToolServer>> {
        self.run_blocking(move |connection| {
            let row = tool_servers::table
                .filter(tool_servers::id.eq(server_id.into_inner()))
                .select(ToolServerRow::as_select())
                .first::<ToolServerRow>(connection)
                .optional()
                .map_err(ServerRegistryError::persistence)?;
            row.map(row_to_server).transpose()
        })
        .await
    }

    async fn find_by_name(
        &self,
        server_name: &ServerName,
    ) -> ServerRegistryResult<Option<ToolServer>> {
        let name = server_name.as_str().to_owned();
        self.run_blocking(move |connection| {
            let row = tool_servers::table
                .filter(tool_servers::name.eq(&name))
                .select(ToolServerRow::as_select())
                .first::<ToolServerRow>(connection)
                .optional()
                .map_err(ServerRegistryError::persistence)?;
            row.map(row_to_server).transpose()
        })
        .await
    }

    async fn list_all(&self) -> ServerRegistryResult<Vec<ToolServer>> {
        self.run_blocking(move |connection| {
            let rows = tool_servers::table
                .order(tool_servers::name.asc())
                .select(ToolServerRow::as_select())
                .load::<ToolServerRow>(connection)
                .map_err(ServerRegistryError::persistence)?;
            rows.into_iter().map(row_to_server).collect()
        })
        .await
    }
}

fn to_row(server: &ToolServer) -> ServerRegistryResult<ToolServerRow> {
    let transport =
        serde_json::to_value(server.transport()).map_err(ServerRegistryError::persistence)?;
    let auth = serde_json::to_value(server.auth()).map_err(ServerRegistryError::persistence)?;
    let capabilities =
        serde_json::to_value(server.capabilities()).map_err(ServerRegistryError::persistence)?;
    let health = server.health();

    Ok(ToolServerRow {
        id: server.id().into_inner(),
        name: server.name().as_str().to_owned(),
        address: server.address(),
        transport,
        auth,
        capabilities,
        health_status: health.status().as_str().to_owned(),
        health_message: health.message().map(str::to_owned),
        health_checked_at: health.checked_at(),
        active: server.is_active(),
        created_at: server.created_at(),
        updated_at: server.updated_at(),
    })
}

fn row_to_server(row: ToolServerRow) -> ServerRegistryResult<ToolServer> {
    let ToolServerRow {
        id,
        name,
        transport,
        auth,
        capabilities,
        health_status,
        health_message,
        health_checked_at,
        active,
        created_at,
        updated_at,
        ..
    } = row;

    let parsed_name =
        ServerName::new(&name).map_err(ServerRegistryError::invalid_persisted_data)?;
    let parsed_transport: ServerTransport = serde_json::from_value(transport)
        .map_err(ServerRegistryError::invalid_persisted_data)?;
    let parsed_auth: AuthConfig =
        serde_json::from_value(auth).map_err(ServerRegistryError::invalid_persisted_data)?;
    let parsed_capabilities: Vec<String> = serde_json::from_value(capabilities)
        .map_err(ServerRegistryError::invalid_persisted_data)?;
    let parsed_status = ServerHealthStatus::try_from(health_status.as_str())
        .map_err(ServerRegistryError::invalid_persisted_data)?;
    let snapshot = ServerHealthSnapshot::new(parsed_status, health_checked_at);
    let health = match health_message {
        Some(message) => snapshot.with_message(message),
        None => snapshot,
    };

    Ok(ToolServer::from_persisted(PersistedToolServerData {
        id: ServerId::from_uuid(id),
        name: parsed_name,
        transport: parsed_transport,
        auth: parsed_auth,
        capabilities: parsed_capabilities,
        health,
        active,
        created_at,
        updated_at,
    }))
}

fn violates(info: &dyn diesel::result::DatabaseErrorInformation, constraint: &str) -> bool {
    info.constraint_name().is_some_and(|name| name == constraint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool_registry::domain::ServerHealthSnapshot;
    use mockable::{Clock, DefaultClock};
    use std::collections::BTreeMap;

    #[test]
    fn rows_round_trip_through_domain_server() {
        let clock = DefaultClock;
        let mut server = ToolServer::new(
            ServerName::new("weather_tools").expect("valid name"),
            ServerTransport::server_push_stream("https://weather.example/mcp").expect("valid url"),
            &clock,
        )
        .with_auth(AuthConfig::Headers {
            headers: BTreeMap::from([("x-api-key".to_owned(), "k".to_owned())]),
        })
        .with_capabilities(["forecast".to_owned()])
        .expect("valid capabilities");
        server.update_health(ServerHealthSnapshot::degraded(clock.utc(), "slow"));

        let row = to_row(&server).expect("serializes");
        assert_eq!(row.address, "https://weather.example/mcp");
        assert_eq!(row.health_status, "degraded");

        let restored = row_to_server(row).expect("deserializes");
        assert_eq!(restored, server);
    }

    #[test]
    fn unknown_health_status_is_invalid_persisted_data() {
        let clock = DefaultClock;
        let server = ToolServer::new(
            ServerName::new("weather_tools").expect("valid name"),
            ServerTransport::request_response("https://weather.example").expect("valid url"),
            &clock,
        );
        let mut row = to_row(&server).expect("serializes");
        row.health_status = "sleepy".to_owned();

        assert!(matches!(
            row_to_server(row),
            Err(ServerRegistryError::InvalidPersistedData(_))
        ));
    }
}
