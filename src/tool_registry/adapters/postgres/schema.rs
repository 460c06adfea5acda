//! Diesel schema for tool server and catalog persistence.

diesel::table! {
    /// Registered tool-provider servers.
    tool_servers (id) {
        /// Internal server identifier.
        id -> Uuid,
        /// Unique server name.
        #[max_length = 100]
        name -> Varchar,
        /// Unique base address (URL or command line).
        address -> Text,
        /// Transport configuration as JSONB.
        transport -> Jsonb,
        /// Credential configuration as JSONB.
        auth -> Jsonb,
        /// Declared capability tags as a JSONB array.
        capabilities -> Jsonb,
        /// Health status (`unknown`, `healthy`, `degraded`, `unhealthy`).
        #[max_length = 50]
        health_status -> Varchar,
        /// Optional health message.
        health_message -> Nullable<Text>,
        /// Timestamp of the last health change.
        health_checked_at -> Timestamptz,
        /// Whether the server is probed and routed to.
        active -> Bool,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// Last update timestamp.
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Tools discovered on registered servers.
    catalog_entries (id) {
        /// Entry identifier.
        id -> Uuid,
        /// Owning server.
        server_id -> Uuid,
        /// Tool name, unique per server.
        #[max_length = 255]
        tool_name -> Varchar,
        /// Tool description.
        description -> Text,
        /// Input schema.
        input_schema -> Jsonb,
        /// Optional output schema.
        output_schema -> Nullable<Jsonb>,
        /// Capability tags as a JSONB array.
        capabilities -> Jsonb,
        /// Whether the latest listing included the tool.
        available -> Bool,
        /// Number of recorded invocations.
        usage_count -> Int8,
        /// Percentage of successful invocations.
        success_rate -> Float8,
        /// Mean invocation latency.
        avg_latency_ms -> Float8,
        /// Last discovery timestamp.
        last_discovered -> Timestamptz,
        /// Creation timestamp.
        created_at -> Timestamptz,
    }
}

diesel::joinable!(catalog_entries -> tool_servers (server_id));
diesel::allow_tables_to_appear_in_same_query!(catalog_entries, tool_servers);
