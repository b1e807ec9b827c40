//! # PostgreSQL Backend
//!
//! The durable backend. Events live in a single `events` table (see
//! [`crate::schema`]); the interesting part is the append protocol: a single
//! statement both evaluates the consistency boundary and performs the insert,
//! so the check and the write share one snapshot.
//!
//! ## Why the check-and-insert is safe at READ COMMITTED
//!
//! The `EXISTS` subquery and the `INSERT ... SELECT` live in one statement
//! and therefore one snapshot. Two writers racing on the same boundary
//! serialise through the table itself: whichever commits second either sees
//! the first writer's rows in its `EXISTS` (same predicate) or collides on
//! the unique `id` index. Higher isolation levels keep the protocol correct;
//! lower ones do not.
//!
//! ## Bulk vs sequential
//!
//! Batches at or above the configured threshold are inserted with one
//! multi-row `VALUES`; smaller batches insert row by row inside the same
//! transaction, where only the first row carries the boundary check — after
//! one row of ours is in, the boundary trivially contains it. A bulk failure
//! that is not a concurrency conflict is retried once in sequential mode on a
//! fresh transaction (PostgreSQL aborts the failed one).
//!
//! ## Dynamic SQL
//!
//! Statement text is assembled at runtime (predicates vary with the query
//! shape, `VALUES` rows with the batch size). All splice points are either
//! numbered bind parameters or the schema name, which is validated as a bare
//! identifier at construction. No user data is ever interpolated.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgPool, Postgres, Row};
use uuid::Uuid;

use crate::backend::EventStoreBackend;
use crate::error::{Error, Result};
use crate::query::StreamQuery;
use crate::schema;
use crate::scope::TransactionScope;
use crate::types::{EventEnvelope, EventTag, EventToPersist, EventType, Tenant, POSITION_KEY};

// =============================================================================
// Configuration
// =============================================================================

/// Default batch size at which appends switch to one multi-row insert.
pub const DEFAULT_BULK_INSERT_THRESHOLD: usize = 5;

/// Default schema the `events` table lives in.
pub const DEFAULT_SCHEMA: &str = "app";

/// Configuration for [`PostgresBackend`].
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// PostgreSQL connection URL. May contain credentials — never logged.
    pub connection_string: String,

    /// Schema holding the `events` table. Must be a bare identifier.
    pub schema: String,

    /// Batch size at which appends use one multi-row `VALUES` insert.
    /// Zero falls back to the default; the effective minimum is 1.
    pub bulk_insert_threshold: usize,

    /// Pool size cap.
    pub max_connections: u32,

    /// How long to wait for a pooled connection before failing fast.
    pub acquire_timeout: Duration,
}

impl PostgresConfig {
    /// Creates a configuration with defaults for everything but the URL.
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            schema: DEFAULT_SCHEMA.to_string(),
            bulk_insert_threshold: DEFAULT_BULK_INSERT_THRESHOLD,
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
        }
    }

    /// Replaces the schema name (builder pattern).
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// Replaces the bulk-insert threshold (builder pattern).
    pub fn with_bulk_insert_threshold(mut self, threshold: usize) -> Self {
        self.bulk_insert_threshold = threshold;
        self
    }

    fn effective_bulk_threshold(&self) -> usize {
        if self.bulk_insert_threshold == 0 {
            DEFAULT_BULK_INSERT_THRESHOLD
        } else {
            self.bulk_insert_threshold
        }
    }
}

// =============================================================================
// SQL Assembly
// =============================================================================
// Free functions so the generated statement text is unit-testable without a
// database. Parameters are collected positionally; `$1` is always the tenant
// in append statements.

/// A bind parameter for dynamically assembled statements.
#[derive(Debug, Clone)]
enum SqlParam {
    Text(String),
    TextArray(Vec<String>),
    Uuid(Uuid),
    UuidArray(Vec<Uuid>),
    Json(serde_json::Value),
    Timestamp(DateTime<Utc>),
    BigInt(i64),
}

fn apply_params<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    params: &[SqlParam],
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    params.iter().fold(query, |q, param| match param {
        SqlParam::Text(v) => q.bind(v.clone()),
        SqlParam::TextArray(v) => q.bind(v.clone()),
        SqlParam::Uuid(v) => q.bind(*v),
        SqlParam::UuidArray(v) => q.bind(v.clone()),
        SqlParam::Json(v) => q.bind(v.clone()),
        SqlParam::Timestamp(v) => q.bind(*v),
        SqlParam::BigInt(v) => q.bind(*v),
    })
}

fn sorted_tags(tags: &BTreeSet<EventTag>) -> Vec<String> {
    tags.iter().map(ToString::to_string).collect()
}

fn metadata_json(metadata: &BTreeMap<String, String>) -> serde_json::Value {
    serde_json::Value::Object(
        metadata
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect(),
    )
}

/// Appends the tag/type restrictions of `query` to a WHERE clause.
///
/// - tags: `@>` (containment) when all tags are required, `&&` (overlap)
///   otherwise;
/// - types: equality for a single type, `= ANY(...)` for a set; a wildcard
///   in the set disables the type restriction entirely.
///
/// The caller has already excluded unsatisfiable queries.
fn push_query_predicate(sql: &mut String, params: &mut Vec<SqlParam>, query: &StreamQuery) {
    if !query.tags().is_empty() {
        let operator = if query.require_all_tags() { "@>" } else { "&&" };
        params.push(SqlParam::TextArray(sorted_tags(query.tags())));
        sql.push_str(&format!(" AND tags {operator} ${}", params.len()));
    }

    if !query.event_types().is_empty() && !query.has_wildcard_type() {
        if query.event_types().len() == 1 {
            let only = query.event_types().iter().next().expect("len checked");
            params.push(SqlParam::Text(only.as_str().to_string()));
            sql.push_str(&format!(" AND event_type = ${}", params.len()));
        } else {
            let types: Vec<String> = query
                .event_types()
                .iter()
                .map(|t| t.as_str().to_string())
                .collect();
            params.push(SqlParam::TextArray(types));
            sql.push_str(&format!(" AND event_type = ANY(${})", params.len()));
        }
    }
}

/// Builds the `stream` statement, or `None` when the query can never match.
fn stream_sql(
    table: &str,
    tenant: &Tenant,
    query: &StreamQuery,
    max_count: Option<usize>,
) -> Option<(String, Vec<SqlParam>)> {
    if query.is_unsatisfiable() {
        return None;
    }

    let mut params = vec![SqlParam::Text(tenant.as_str().to_string())];
    let mut sql = format!(
        "SELECT position, id, event_type, data, metadata, created_at \
         FROM {table} WHERE tenant_id = $1"
    );
    push_query_predicate(&mut sql, &mut params, query);
    sql.push_str(" ORDER BY position ASC");

    if let Some(limit) = max_count.filter(|n| *n > 0) {
        params.push(SqlParam::BigInt(limit as i64));
        sql.push_str(&format!(" LIMIT ${}", params.len()));
    }

    Some((sql, params))
}

/// Builds the consistency predicate over the stored events.
///
/// With an expected last event id the fence is that event's position (-1 when
/// the id is unknown, degenerating to "no matching events at all"); without
/// one, any matching event at all is a conflict, so no position clause is
/// emitted.
fn push_boundary_predicate(
    sql: &mut String,
    params: &mut Vec<SqlParam>,
    table: &str,
    boundary: &StreamQuery,
    expected_last_event_id: Option<Uuid>,
) {
    sql.push_str("tenant_id = $1");
    push_query_predicate(sql, params, boundary);

    if let Some(id) = expected_last_event_id {
        params.push(SqlParam::Uuid(id));
        sql.push_str(&format!(
            " AND position > COALESCE((SELECT position FROM {table} \
             WHERE tenant_id = $1 AND id = ${}), -1)",
            params.len()
        ));
    }
}

/// Builds one `($n::uuid, $n+1::text, ...)` row per event for a `VALUES`
/// list, pushing six parameters per event. Casts pin the types PostgreSQL
/// cannot infer inside a bare `VALUES` context.
fn push_values_rows(params: &mut Vec<SqlParam>, events: &[EventToPersist]) -> String {
    let mut rows = Vec::with_capacity(events.len());
    for event in events {
        let base = params.len();
        params.push(SqlParam::Uuid(event.id));
        params.push(SqlParam::Text(event.event_type.as_str().to_string()));
        params.push(SqlParam::TextArray(sorted_tags(&event.tags)));
        params.push(SqlParam::Json(event.payload.clone()));
        params.push(SqlParam::Json(metadata_json(&event.metadata)));
        params.push(SqlParam::Timestamp(event.created));
        rows.push(format!(
            "(${}::uuid, ${}::text, ${}::text[], ${}::jsonb, ${}::jsonb, ${}::timestamptz)",
            base + 1,
            base + 2,
            base + 3,
            base + 4,
            base + 5,
            base + 6
        ));
    }
    rows.join(", ")
}

/// Builds the atomic append statement.
///
/// With a boundary, the statement is the check-and-insert CTE: the insert
/// branch only runs when the `EXISTS` over the boundary predicate is false,
/// and the final select reports one `has_conflicts` row (conflict) or one row
/// per inserted position. Without a boundary the consistency CTE is omitted
/// entirely — the insert is unconditional.
fn append_sql(
    table: &str,
    tenant: &Tenant,
    events: &[EventToPersist],
    boundary: Option<(&StreamQuery, Option<Uuid>)>,
) -> (String, Vec<SqlParam>) {
    let mut params = vec![SqlParam::Text(tenant.as_str().to_string())];

    match boundary {
        Some((query, expected_last_event_id)) => {
            let mut predicate = String::new();
            push_boundary_predicate(
                &mut predicate,
                &mut params,
                table,
                query,
                expected_last_event_id,
            );
            let rows = push_values_rows(&mut params, events);
            let sql = format!(
                "WITH consistency_check AS ( \
                   SELECT EXISTS (SELECT 1 FROM {table} WHERE {predicate}) AS has_conflicts \
                 ), \
                 inserted AS ( \
                   INSERT INTO {table} (id, tenant_id, event_type, tags, data, metadata, created_at) \
                   SELECT v.id, $1, v.event_type, v.tags, v.data, v.metadata, v.created_at \
                   FROM (VALUES {rows}) AS v(id, event_type, tags, data, metadata, created_at) \
                   WHERE (SELECT has_conflicts FROM consistency_check) = FALSE \
                   RETURNING position \
                 ) \
                 SELECT inserted.position AS position, consistency_check.has_conflicts AS has_conflicts \
                 FROM consistency_check \
                 LEFT JOIN inserted ON consistency_check.has_conflicts = FALSE \
                 ORDER BY inserted.position"
            );
            (sql, params)
        }
        None => {
            let rows = push_values_rows(&mut params, events);
            let sql = format!(
                "WITH inserted AS ( \
                   INSERT INTO {table} (id, tenant_id, event_type, tags, data, metadata, created_at) \
                   SELECT v.id, $1, v.event_type, v.tags, v.data, v.metadata, v.created_at \
                   FROM (VALUES {rows}) AS v(id, event_type, tags, data, metadata, created_at) \
                   RETURNING position \
                 ) \
                 SELECT inserted.position AS position, FALSE AS has_conflicts \
                 FROM inserted ORDER BY inserted.position"
            );
            (sql, params)
        }
    }
}

// =============================================================================
// Backend
// =============================================================================

/// PostgreSQL-backed event store.
///
/// `stream` uses pooled connections without an explicit transaction; `append`
/// runs inside a READ COMMITTED transaction — its own, or an ambient
/// [`TransactionScope`] when one is entered on the calling task.
pub struct PostgresBackend {
    pool: PgPool,
    table: String,
    bulk_insert_threshold: usize,
}

impl PostgresBackend {
    /// Connects, applies the schema, and returns a ready backend.
    ///
    /// Pool limits are taken from the configuration; failing fast on a
    /// saturated pool beats hanging. The connection URL may contain
    /// credentials and is never logged.
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        let options = PgConnectOptions::from_str(&config.connection_string)
            .map_err(|err| Error::Config(format!("invalid connection string: {err}")))?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(options)
            .await?;
        schema::bootstrap(&pool, &config.schema).await?;
        Self::with_pool(pool, config)
    }

    /// Adopts an existing pool. Does not apply the schema.
    pub fn with_pool(pool: PgPool, config: &PostgresConfig) -> Result<Self> {
        if !schema::is_safe_identifier(&config.schema) {
            return Err(Error::Config(format!(
                "invalid schema name '{}'",
                config.schema
            )));
        }
        Ok(Self {
            pool,
            table: format!("{}.events", config.schema),
            bulk_insert_threshold: config.effective_bulk_threshold(),
        })
    }

    /// The underlying pool, e.g. for opening a [`TransactionScope`].
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn envelope_from_row(&self, row: &PgRow) -> Result<EventEnvelope> {
        let position: i64 = row.try_get("position")?;
        let id: Uuid = row.try_get("id")?;
        let event_type: String = row.try_get("event_type")?;
        let payload: serde_json::Value = row.try_get("data")?;
        let metadata: sqlx::types::Json<BTreeMap<String, String>> = row.try_get("metadata")?;
        let created: DateTime<Utc> = row.try_get("created_at")?;

        let mut metadata = metadata.0;
        metadata.insert(POSITION_KEY.to_string(), position.to_string());
        Ok(EventEnvelope {
            id,
            event_type: EventType::new(event_type)?,
            payload,
            metadata,
            created,
        })
    }

    /// Executes one assembled append statement and extracts the positions.
    async fn execute_append(
        conn: &mut PgConnection,
        sql: &str,
        params: &[SqlParam],
        boundary: Option<(&StreamQuery, Option<Uuid>)>,
        expected_rows: usize,
    ) -> Result<Vec<i64>> {
        let rows = apply_params(sqlx::query(sql), params)
            .fetch_all(&mut *conn)
            .await?;

        if let Some(row) = rows.first() {
            if row.try_get::<bool, _>("has_conflicts")? {
                let (query, expected_last_event_id) =
                    boundary.expect("conflict only possible with a boundary");
                return Err(Error::ConcurrencyConflict {
                    query: query.to_string(),
                    expected_last_event_id,
                });
            }
        }

        let mut positions = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(position) = row.try_get::<Option<i64>, _>("position")? {
                positions.push(position);
            }
        }
        if positions.len() != expected_rows {
            return Err(Error::Backend(sqlx::Error::Protocol(format!(
                "append returned {} positions for {} events",
                positions.len(),
                expected_rows
            ))));
        }
        Ok(positions)
    }

    /// Runs the insert work on an open connection: one bulk statement, or row
    /// by row where only the first row carries the boundary check.
    async fn run_append(
        &self,
        conn: &mut PgConnection,
        tenant: &Tenant,
        events: &[EventToPersist],
        boundary: Option<(&StreamQuery, Option<Uuid>)>,
        bulk: bool,
    ) -> Result<Vec<i64>> {
        if bulk {
            let (sql, params) = append_sql(&self.table, tenant, events, boundary);
            return Self::execute_append(conn, &sql, &params, boundary, events.len()).await;
        }

        let mut positions = Vec::with_capacity(events.len());
        for (index, event) in events.iter().enumerate() {
            // Once our first row is in, it is itself inside the boundary; the
            // check would trivially fail, so subsequent rows drop it.
            let row_boundary = if index == 0 { boundary } else { None };
            let (sql, params) =
                append_sql(&self.table, tenant, std::slice::from_ref(event), row_boundary);
            let assigned =
                Self::execute_append(conn, &sql, &params, row_boundary, 1).await?;
            positions.extend(assigned);
        }
        Ok(positions)
    }

    /// Appends in a transaction this backend owns: commit on success, roll
    /// back on any failure.
    async fn append_owned(
        &self,
        tenant: &Tenant,
        events: &[EventToPersist],
        boundary: Option<(&StreamQuery, Option<Uuid>)>,
        bulk: bool,
    ) -> Result<Vec<i64>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL READ COMMITTED")
            .execute(&mut *tx)
            .await?;

        match self.run_append(&mut tx, tenant, events, boundary, bulk).await {
            Ok(positions) => {
                tx.commit().await?;
                Ok(positions)
            }
            Err(err) => {
                // The transaction is aborted either way; rollback returns the
                // connection to a clean state.
                let _ = tx.rollback().await;
                Err(err)
            }
        }
    }

    /// Reclassifies a unique-violation into `DuplicateEventId`, recovering
    /// the offending id with a follow-up lookup on a fresh connection.
    async fn classify_append_error(&self, err: Error, events: &[EventToPersist]) -> Error {
        let Error::Backend(sql_err) = &err else {
            return err;
        };
        if !is_unique_violation(sql_err) {
            return err;
        }

        let ids: Vec<Uuid> = events.iter().map(|event| event.id).collect();
        match self.find_existing_id(&ids).await {
            Ok(Some(id)) => Error::DuplicateEventId { id },
            _ => err,
        }
    }

    async fn find_existing_id(&self, ids: &[Uuid]) -> Result<Option<Uuid>> {
        let sql = format!(
            "SELECT id FROM {} WHERE id = ANY($1) ORDER BY position LIMIT 1",
            self.table
        );
        let row = apply_params(sqlx::query(&sql), &[SqlParam::UuidArray(ids.to_vec())])
            .fetch_optional(&self.pool)
            .await?;
        Ok(match row {
            Some(row) => Some(row.try_get("id")?),
            None => None,
        })
    }
}

#[async_trait]
impl EventStoreBackend for PostgresBackend {
    async fn stream(
        &self,
        tenant: &Tenant,
        query: &StreamQuery,
        max_count: Option<usize>,
    ) -> Result<Vec<EventEnvelope>> {
        let Some((sql, params)) = stream_sql(&self.table, tenant, query, max_count) else {
            return Ok(Vec::new());
        };

        let rows = apply_params(sqlx::query(&sql), &params)
            .fetch_all(&self.pool)
            .await
            .inspect_err(|err| tracing::error!(error = %err, "stream query failed"))?;

        rows.iter().map(|row| self.envelope_from_row(row)).collect()
    }

    async fn append(
        &self,
        tenant: &Tenant,
        events: Vec<EventToPersist>,
        consistency_boundary: Option<&StreamQuery>,
        expected_last_event_id: Option<Uuid>,
    ) -> Result<Vec<EventEnvelope>> {
        if events.is_empty() {
            return Ok(Vec::new());
        }

        // Intra-batch duplicates never reach the database.
        let mut seen = HashSet::with_capacity(events.len());
        for event in &events {
            if !seen.insert(event.id) {
                return Err(Error::DuplicateEventId { id: event.id });
            }
        }

        // A boundary that cannot match any event fences nothing.
        let boundary = consistency_boundary
            .filter(|query| !query.is_unsatisfiable())
            .map(|query| (query, expected_last_event_id));

        let bulk = events.len() >= self.bulk_insert_threshold;

        let positions = if let Some(slot) = TransactionScope::current() {
            // Ambient scope: reuse its transaction, never settle it here. A
            // conflict propagates without rollback; the scope owner decides.
            let mut guard = slot.lock().await;
            let tx = guard.as_mut().ok_or(Error::ScopeCompleted)?;
            match self.run_append(&mut **tx, tenant, &events, boundary, bulk).await {
                Ok(positions) => positions,
                Err(err) => return Err(self.classify_append_error(err, &events).await),
            }
        } else {
            match self.append_owned(tenant, &events, boundary, bulk).await {
                Ok(positions) => positions,
                Err(Error::ConcurrencyConflict {
                    query,
                    expected_last_event_id,
                }) => {
                    return Err(Error::ConcurrencyConflict {
                        query,
                        expected_last_event_id,
                    })
                }
                Err(err) if bulk => {
                    // Defensive fallback: anything else out of the bulk path
                    // gets one sequential retry on a fresh transaction.
                    tracing::warn!(error = %err, "bulk insert failed, retrying sequentially");
                    match self.append_owned(tenant, &events, boundary, false).await {
                        Ok(positions) => positions,
                        Err(err) => return Err(self.classify_append_error(err, &events).await),
                    }
                }
                Err(err) => return Err(self.classify_append_error(err, &events).await),
            }
        };

        Ok(events
            .iter()
            .zip(positions)
            .map(|(event, position)| envelope_for(event, position))
            .collect())
    }
}

/// Builds the returned envelope: input identity fields verbatim, assigned
/// position injected into metadata.
fn envelope_for(event: &EventToPersist, position: i64) -> EventEnvelope {
    let mut metadata = event.metadata.clone();
    metadata.insert(POSITION_KEY.to_string(), position.to_string());
    EventEnvelope {
        id: event.id,
        event_type: event.event_type.clone(),
        payload: event.payload.clone(),
        metadata,
        created: event.created,
    }
}

/// SQLSTATE 23505: unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code().map(|code| code == "23505").unwrap_or(false);
    }
    false
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventTag, EventType};

    fn tag(s: &str) -> EventTag {
        EventTag::parse(s).unwrap()
    }

    fn ty(s: &str) -> EventType {
        EventType::new(s).unwrap()
    }

    const TABLE: &str = "app.events";

    #[test]
    fn test_stream_sql_tags_overlap_vs_containment() {
        let tenant = Tenant::new("acme");
        let overlap = StreamQuery::new().with_tags([tag("order:123"), tag("product:456")]);
        let (sql, params) = stream_sql(TABLE, &tenant, &overlap, None).unwrap();
        assert!(sql.contains("tags && $2"), "{sql}");
        assert!(sql.ends_with("ORDER BY position ASC"), "{sql}");
        assert_eq!(params.len(), 2);

        let containment = overlap.requiring_all_tags();
        let (sql, _) = stream_sql(TABLE, &tenant, &containment, None).unwrap();
        assert!(sql.contains("tags @> $2"), "{sql}");
    }

    #[test]
    fn test_stream_sql_type_forms() {
        let tenant = Tenant::new("acme");

        let single = StreamQuery::new().with_event_type(ty("order-created"));
        let (sql, _) = stream_sql(TABLE, &tenant, &single, None).unwrap();
        assert!(sql.contains("event_type = $2"), "{sql}");

        let set = StreamQuery::new().with_event_types([ty("order-created"), ty("order-shipped")]);
        let (sql, _) = stream_sql(TABLE, &tenant, &set, None).unwrap();
        assert!(sql.contains("event_type = ANY($2)"), "{sql}");

        // A wildcard disables the type restriction entirely.
        let wild = StreamQuery::new().with_event_type(EventType::wildcard());
        let (sql, params) = stream_sql(TABLE, &tenant, &wild, None).unwrap();
        assert!(!sql.contains("event_type ="), "{sql}");
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_stream_sql_limit() {
        let tenant = Tenant::new("acme");
        let query = StreamQuery::new().with_event_type(EventType::wildcard());

        let (sql, params) = stream_sql(TABLE, &tenant, &query, Some(3)).unwrap();
        assert!(sql.ends_with("LIMIT $2"), "{sql}");
        assert_eq!(params.len(), 2);

        // Zero means no truncation.
        let (sql, _) = stream_sql(TABLE, &tenant, &query, Some(0)).unwrap();
        assert!(!sql.contains("LIMIT"), "{sql}");
    }

    #[test]
    fn test_stream_sql_unmatchable_queries() {
        let tenant = Tenant::new("acme");
        assert!(stream_sql(TABLE, &tenant, &StreamQuery::new(), None).is_none());

        let unsatisfiable = StreamQuery::new()
            .with_event_types([ty("order-created"), ty("order-shipped")])
            .requiring_all_event_types();
        assert!(stream_sql(TABLE, &tenant, &unsatisfiable, None).is_none());
    }

    #[test]
    fn test_append_sql_without_boundary_has_no_check() {
        let tenant = Tenant::new("acme");
        let events =
            vec![EventToPersist::new(ty("order-created"), serde_json::json!({})).with_tag(tag("order:123"))];
        let (sql, params) = append_sql(TABLE, &tenant, &events, None);

        assert!(!sql.contains("consistency_check"), "{sql}");
        assert!(sql.contains("RETURNING position"), "{sql}");
        // Tenant plus six parameters per event.
        assert_eq!(params.len(), 7);
    }

    #[test]
    fn test_append_sql_with_boundary_checks_and_inserts_in_one_statement() {
        let tenant = Tenant::new("acme");
        let events: Vec<_> = (0..2)
            .map(|_| EventToPersist::new(ty("order-created"), serde_json::json!({})))
            .collect();
        let boundary = StreamQuery::new().with_tag(tag("order:123"));
        let expected = Uuid::new_v4();
        let (sql, params) = append_sql(TABLE, &tenant, &events, Some((&boundary, Some(expected))));

        assert!(sql.contains("WITH consistency_check"), "{sql}");
        assert!(sql.contains("tags && $2"), "{sql}");
        assert!(
            sql.contains("position > COALESCE((SELECT position FROM app.events"),
            "{sql}"
        );
        assert!(
            sql.contains("WHERE (SELECT has_conflicts FROM consistency_check) = FALSE"),
            "{sql}"
        );
        // Tenant, boundary tags, expected id, then 6 per event.
        assert_eq!(params.len(), 3 + 12);
    }

    #[test]
    fn test_append_sql_expect_none_has_no_position_clause() {
        let tenant = Tenant::new("acme");
        let events = vec![EventToPersist::new(ty("order-created"), serde_json::json!({}))];
        let boundary = StreamQuery::new().with_tag(tag("order:123"));
        let (sql, _) = append_sql(TABLE, &tenant, &events, Some((&boundary, None)));

        assert!(!sql.contains("COALESCE"), "{sql}");
        assert!(!sql.contains("position >="), "{sql}");
    }

    #[test]
    fn test_config_threshold_fallback() {
        let config = PostgresConfig::new("postgres://localhost/db").with_bulk_insert_threshold(0);
        assert_eq!(config.effective_bulk_threshold(), DEFAULT_BULK_INSERT_THRESHOLD);

        let config = PostgresConfig::new("postgres://localhost/db").with_bulk_insert_threshold(1);
        assert_eq!(config.effective_bulk_threshold(), 1);
    }
}
