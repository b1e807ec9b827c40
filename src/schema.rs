//! # PostgreSQL Schema
//!
//! DDL for the single `events` table and the indexes that serve the two hot
//! paths: tenant-scoped ordered scans and tag-containment lookups. Everything
//! is `IF NOT EXISTS` so [`bootstrap`] is idempotent and safe to call at
//! every startup; a full migration runner is the host application's concern.
//!
//! ## Table Overview
//!
//! ```text
//! events
//! ┌────────────┬─────────────┬──────────────────────────────────────────┐
//! │ position   │ BIGSERIAL   │ global order, PK, shared by all tenants  │
//! │ id         │ UUID UNIQUE │ writer-supplied, globally unique         │
//! │ tenant_id  │ VARCHAR     │ isolation boundary                       │
//! │ event_type │ TEXT        │ classification, [a-z-]+                  │
//! │ data       │ JSONB       │ opaque payload                           │
//! │ tags       │ TEXT[]      │ canonical 'concept:id' strings           │
//! │ created_at │ TIMESTAMPTZ │ writer-supplied instant                  │
//! │ metadata   │ JSONB       │ flat string map                          │
//! └────────────┴─────────────┴──────────────────────────────────────────┘
//! ```
//!
//! ## Why TEXT[] for tags?
//!
//! Array containment (`@>`) and overlap (`&&`) translate the two tag-match
//! modes directly into operators a GIN index accelerates. The canonical
//! `concept:id` string form keeps the array scalar and the index small.

use sqlx::PgPool;

use crate::error::{Error, Result};

// =============================================================================
// DDL Statements
// =============================================================================
// One constant per statement; `{schema}` is substituted by `ddl_statements`.
// The schema name is validated as a bare identifier before substitution.

/// The `events` table.
///
/// - `position`: BIGSERIAL primary key. Strictly increasing across the whole
///   store; gaps from aborted transactions are allowed, committed order
///   equals position order.
/// - `id`: writer-supplied UUID, unique across all tenants. The unique index
///   is what breaks ties between two racing writers with the same boundary.
/// - `tenant_id`: every query and append is scoped to one tenant.
/// - `tags`: canonical `concept:id` strings, the write-side index for
///   consistency boundaries.
/// - `data` / `metadata`: opaque JSONB payload and flat string-map metadata.
const CREATE_EVENTS: &str = r#"
CREATE TABLE IF NOT EXISTS {schema}.events (
    position   BIGSERIAL PRIMARY KEY,
    id         UUID NOT NULL UNIQUE,
    tenant_id  VARCHAR NOT NULL,
    event_type TEXT NOT NULL,
    data       JSONB NOT NULL,
    tags       TEXT[] NOT NULL DEFAULT '{}',
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    metadata   JSONB NOT NULL DEFAULT '{}'::jsonb
)
"#;

/// Tenant scan in reverse position order (latest-first reads).
const IDX_TENANT_POSITION_DESC: &str = r#"
CREATE INDEX IF NOT EXISTS events_tenant_position_desc
ON {schema}.events (tenant_id, position DESC)
"#;

/// Tag containment and overlap (`@>` / `&&`).
const IDX_TAGS_GIN: &str = r#"
CREATE INDEX IF NOT EXISTS events_tags_gin
ON {schema}.events USING GIN (tags)
"#;

/// Covering tenant index: filter predicates can be answered index-only.
const IDX_TENANT_COVERING: &str = r#"
CREATE INDEX IF NOT EXISTS events_tenant_covering
ON {schema}.events (tenant_id) INCLUDE (tags, event_type, position)
"#;

/// Type-within-tenant lookups.
const IDX_TENANT_TYPE: &str = r#"
CREATE INDEX IF NOT EXISTS events_tenant_type
ON {schema}.events (tenant_id, event_type) INCLUDE (position, tags)
"#;

/// Boundary scans: position-fenced checks within a tenant.
const IDX_TENANT_POSITION_BOUNDARY: &str = r#"
CREATE INDEX IF NOT EXISTS events_tenant_position_boundary
ON {schema}.events (tenant_id, position) WHERE position > 0
"#;

/// Time-range queries within a tenant.
const IDX_TENANT_CREATED: &str = r#"
CREATE INDEX IF NOT EXISTS events_tenant_created
ON {schema}.events (tenant_id, created_at)
"#;

/// Global-order scan covering every column (cross-tenant catch-up readers).
const IDX_POSITION_COVERING: &str = r#"
CREATE INDEX IF NOT EXISTS events_position_covering
ON {schema}.events (position)
INCLUDE (id, tenant_id, event_type, tags, data, metadata, created_at)
"#;

// =============================================================================
// Bootstrap
// =============================================================================

/// True when `name` is a bare SQL identifier we are willing to splice into
/// DDL and query text. The schema name is configuration, not user input, but
/// it still only ever comes from this allowlist shape.
pub(crate) fn is_safe_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit())
}

/// The full DDL for one schema, in execution order.
pub fn ddl_statements(schema: &str) -> Result<Vec<String>> {
    if !is_safe_identifier(schema) {
        return Err(Error::Config(format!("invalid schema name '{schema}'")));
    }

    let statements = [
        format!("CREATE SCHEMA IF NOT EXISTS {schema}"),
        CREATE_EVENTS.replace("{schema}", schema),
        IDX_TENANT_POSITION_DESC.replace("{schema}", schema),
        IDX_TAGS_GIN.replace("{schema}", schema),
        IDX_TENANT_COVERING.replace("{schema}", schema),
        IDX_TENANT_TYPE.replace("{schema}", schema),
        IDX_TENANT_POSITION_BOUNDARY.replace("{schema}", schema),
        IDX_TENANT_CREATED.replace("{schema}", schema),
        IDX_POSITION_COVERING.replace("{schema}", schema),
    ];
    Ok(statements.to_vec())
}

/// Applies the schema to a database, idempotently.
///
/// Runs the `CREATE SCHEMA` / `CREATE TABLE` / `CREATE INDEX` statements in
/// order. Safe to call at every startup before serving requests.
pub async fn bootstrap(pool: &PgPool, schema: &str) -> Result<()> {
    for statement in ddl_statements(schema)? {
        sqlx::query(&statement).execute(pool).await?;
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_identifier() {
        assert!(is_safe_identifier("app"));
        assert!(is_safe_identifier("event_store_2"));
        assert!(!is_safe_identifier(""));
        assert!(!is_safe_identifier("2app"));
        assert!(!is_safe_identifier("app-schema"));
        assert!(!is_safe_identifier("app.events"));
        assert!(!is_safe_identifier("app; DROP TABLE"));
    }

    #[test]
    fn test_ddl_is_schema_qualified() {
        let statements = ddl_statements("app").unwrap();
        // One CREATE SCHEMA, one table, seven indexes.
        assert_eq!(statements.len(), 9);
        for statement in &statements[1..] {
            assert!(statement.contains("app.events"), "{statement}");
            assert!(!statement.contains("{schema}"), "{statement}");
        }
    }

    #[test]
    fn test_ddl_rejects_unsafe_schema() {
        assert!(ddl_statements("bad-name").is_err());
    }
}
