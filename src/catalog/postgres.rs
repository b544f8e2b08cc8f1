//! PostgreSQL catalog adapter
//!
//! Reads pg_catalog / information_schema into the flat row shapes the
//! normalizer expects. All row sets come from one read-only
//! REPEATABLE READ transaction.

use super::{
    CatalogRows, CatalogSource, CheckRow, ColumnRow, EnumLabelRow, ForeignKeyColumnRow,
    IndexColumnRow, KeyColumnRow, TableRow, ViewColumnRow, ViewRow,
};
use crate::config::DatabaseConfig;
use crate::error::AppError;
use crate::model::{CaptureFilters, EngineInfo, EngineKind};
use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::{IsolationLevel, NoTls, Transaction};
use tracing::{debug, info};

/// Catalog source backed by a PostgreSQL connection pool
pub struct PostgresCatalog {
    pool: Pool,
    host: String,
    database: String,
}

impl PostgresCatalog {
    /// Create the pool for the configured database (lazily connected)
    pub fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        let mut cfg = Config::new();
        cfg.host = Some(config.host.clone());
        cfg.port = Some(config.port);
        cfg.user = Some(config.user.clone());
        cfg.password = Some(config.password.clone());
        cfg.dbname = Some(config.database.clone());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(PoolConfig::new(config.max_pool_size));

        let pool = if config.require_tls {
            let certs = rustls_native_certs::load_native_certs();
            let mut root_store = rustls::RootCertStore::empty();
            for cert in certs.certs {
                root_store.add(cert).ok();
            }

            let tls_config = rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth();

            let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);
            cfg.create_pool(Some(Runtime::Tokio1), tls)
        } else {
            cfg.create_pool(Some(Runtime::Tokio1), NoTls)
        }
        .map_err(|e| AppError::Config(format!("Failed to create pool: {}", e)))?;

        info!(
            "Catalog pool ready for {}@{} (TLS: {})",
            config.database, config.host, config.require_tls
        );

        Ok(Self {
            pool,
            host: config.host.clone(),
            database: config.database.clone(),
        })
    }
}

#[async_trait]
impl CatalogSource for PostgresCatalog {
    async fn fetch(&self, filters: &CaptureFilters) -> Result<CatalogRows, AppError> {
        let mut client = self.pool.get().await?;
        let tx = client
            .build_transaction()
            .isolation_level(IsolationLevel::RepeatableRead)
            .read_only(true)
            .start()
            .await?;

        let version: String = tx.query_one("SHOW server_version", &[]).await?.get(0);
        let database: String = tx
            .query_one("SELECT current_database()::text", &[])
            .await?
            .get(0);

        let mut rows = CatalogRows::empty(EngineInfo {
            kind: EngineKind::Postgres,
            version,
            host: self.host.clone(),
            database: if database.is_empty() {
                self.database.clone()
            } else {
                database
            },
        });

        let schemas = &filters.schemas;
        rows.tables = fetch_tables(&tx, schemas).await?;
        rows.columns = fetch_columns(&tx, schemas).await?;
        rows.primary_keys = fetch_key_columns(&tx, schemas, "PRIMARY KEY").await?;
        rows.unique_constraints = fetch_key_columns(&tx, schemas, "UNIQUE").await?;
        rows.check_constraints = fetch_checks(&tx, schemas).await?;
        rows.foreign_keys = fetch_foreign_keys(&tx, schemas).await?;
        rows.indexes = fetch_indexes(&tx, schemas).await?;
        rows.enum_labels = fetch_enum_labels(&tx, schemas).await?;
        rows.views = fetch_views(&tx, schemas).await?;
        rows.view_columns = fetch_view_columns(&tx, schemas).await?;

        tx.commit().await?;

        debug!(
            "Fetched catalog rows: {} tables, {} columns, {} fk columns, {} index columns",
            rows.tables.len(),
            rows.columns.len(),
            rows.foreign_keys.len(),
            rows.indexes.len()
        );

        Ok(rows)
    }
}

/// `$1` is the requested schema list; an empty list means every user schema.
fn schema_predicate(column: &str) -> String {
    format!(
        "(cardinality($1::text[]) = 0 OR {col} = ANY($1::text[])) \
         AND {col} NOT IN ('information_schema') AND {col} NOT LIKE 'pg\\_%'",
        col = column
    )
}

async fn fetch_tables(tx: &Transaction<'_>, schemas: &[String]) -> Result<Vec<TableRow>, AppError> {
    let query = format!(
        r#"
        SELECT
            n.nspname::text AS schema_name,
            c.relname::text AS table_name,
            obj_description(c.oid, 'pg_class') AS comment,
            CASE WHEN c.reltuples < 0 THEN NULL ELSE c.reltuples::bigint END AS row_estimate
        FROM pg_class c
        JOIN pg_namespace n ON n.oid = c.relnamespace
        WHERE c.relkind IN ('r', 'p') AND {}
        ORDER BY n.nspname, c.relname
        "#,
        schema_predicate("n.nspname")
    );

    let rows = tx.query(query.as_str(), &[&schemas]).await?;
    Ok(rows
        .iter()
        .map(|row| TableRow {
            schema: row.get("schema_name"),
            name: row.get("table_name"),
            comment: row.get("comment"),
            row_estimate: row.get("row_estimate"),
        })
        .collect())
}

/// Domain columns report their base type; enum and composite columns keep
/// the user-defined marker so the type name comes from `udt_name`.
fn columns_query() -> String {
    format!(
        r#"
        SELECT
            n.nspname::text AS schema_name,
            c.relname::text AS table_name,
            a.attname::text AS column_name,
            CASE
                WHEN t.typtype = 'd' THEN format_type(t.typbasetype, t.typtypmod)
                WHEN t.typtype = 'e' OR t.typtype = 'c' THEN 'USER-DEFINED'
                ELSE format_type(a.atttypid, a.atttypmod)
            END AS data_type,
            t.typname::text AS udt_name,
            NOT a.attnotnull AS nullable,
            pg_get_expr(d.adbin, d.adrelid) AS default_value,
            (a.attgenerated <> '') AS is_generated,
            col_description(c.oid, a.attnum) AS comment,
            a.attnum::int AS ordinal
        FROM pg_attribute a
        JOIN pg_class c ON c.oid = a.attrelid
        JOIN pg_namespace n ON n.oid = c.relnamespace
        JOIN pg_type t ON t.oid = a.atttypid
        LEFT JOIN pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
        WHERE c.relkind IN ('r', 'p') AND a.attnum > 0 AND NOT a.attisdropped AND {}
        ORDER BY n.nspname, c.relname, a.attnum
        "#,
        schema_predicate("n.nspname")
    )
}

async fn fetch_columns(tx: &Transaction<'_>, schemas: &[String]) -> Result<Vec<ColumnRow>, AppError> {
    let query = columns_query();
    let rows = tx.query(query.as_str(), &[&schemas]).await?;
    Ok(rows
        .iter()
        .map(|row| ColumnRow {
            schema: row.get("schema_name"),
            table: row.get("table_name"),
            name: row.get("column_name"),
            data_type: row.get("data_type"),
            udt_name: row.get("udt_name"),
            nullable: row.get("nullable"),
            default_value: row.get("default_value"),
            is_generated: row.get("is_generated"),
            comment: row.get("comment"),
            ordinal: row.get("ordinal"),
        })
        .collect())
}

async fn fetch_key_columns(
    tx: &Transaction<'_>,
    schemas: &[String],
    constraint_type: &str,
) -> Result<Vec<KeyColumnRow>, AppError> {
    let query = format!(
        r#"
        SELECT
            tc.table_schema::text AS schema_name,
            tc.table_name::text AS table_name,
            tc.constraint_name::text AS constraint_name,
            kcu.column_name::text AS column_name,
            kcu.ordinal_position::int AS ordinal
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
            ON tc.constraint_name = kcu.constraint_name
            AND tc.table_schema = kcu.table_schema
            AND tc.table_name = kcu.table_name
        WHERE tc.constraint_type::text = $2::text AND {}
        ORDER BY tc.table_schema, tc.table_name, tc.constraint_name, kcu.ordinal_position
        "#,
        schema_predicate("tc.table_schema")
    );

    let rows = tx.query(query.as_str(), &[&schemas, &constraint_type]).await?;
    Ok(rows
        .iter()
        .map(|row| KeyColumnRow {
            schema: row.get("schema_name"),
            table: row.get("table_name"),
            constraint: row.get("constraint_name"),
            column: row.get("column_name"),
            ordinal: row.get("ordinal"),
        })
        .collect())
}

async fn fetch_checks(tx: &Transaction<'_>, schemas: &[String]) -> Result<Vec<CheckRow>, AppError> {
    let query = format!(
        r#"
        SELECT
            n.nspname::text AS schema_name,
            cl.relname::text AS table_name,
            con.conname::text AS constraint_name,
            pg_get_constraintdef(con.oid) AS expression
        FROM pg_constraint con
        JOIN pg_class cl ON cl.oid = con.conrelid
        JOIN pg_namespace n ON n.oid = cl.relnamespace
        WHERE con.contype = 'c' AND {}
        ORDER BY n.nspname, cl.relname, con.conname
        "#,
        schema_predicate("n.nspname")
    );

    let rows = tx.query(query.as_str(), &[&schemas]).await?;
    Ok(rows
        .iter()
        .map(|row| CheckRow {
            schema: row.get("schema_name"),
            table: row.get("table_name"),
            constraint: row.get("constraint_name"),
            expression: row.get("expression"),
        })
        .collect())
}

async fn fetch_foreign_keys(
    tx: &Transaction<'_>,
    schemas: &[String],
) -> Result<Vec<ForeignKeyColumnRow>, AppError> {
    let query = format!(
        r#"
        SELECT
            n.nspname::text AS schema_name,
            cl.relname::text AS table_name,
            con.conname::text AS constraint_name,
            a.attname::text AS column_name,
            rn.nspname::text AS referenced_schema,
            rcl.relname::text AS referenced_table,
            ra.attname::text AS referenced_column,
            k.ord::int AS ordinal,
            con.confupdtype::text AS on_update,
            con.confdeltype::text AS on_delete
        FROM pg_constraint con
        JOIN pg_class cl ON cl.oid = con.conrelid
        JOIN pg_namespace n ON n.oid = cl.relnamespace
        JOIN pg_class rcl ON rcl.oid = con.confrelid
        JOIN pg_namespace rn ON rn.oid = rcl.relnamespace
        CROSS JOIN LATERAL unnest(con.conkey, con.confkey) WITH ORDINALITY AS k(attnum, refattnum, ord)
        JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum
        JOIN pg_attribute ra ON ra.attrelid = con.confrelid AND ra.attnum = k.refattnum
        WHERE con.contype = 'f' AND {}
        ORDER BY n.nspname, cl.relname, con.conname, k.ord
        "#,
        schema_predicate("n.nspname")
    );

    let rows = tx.query(query.as_str(), &[&schemas]).await?;
    Ok(rows
        .iter()
        .map(|row| ForeignKeyColumnRow {
            schema: row.get("schema_name"),
            table: row.get("table_name"),
            constraint: row.get("constraint_name"),
            column: row.get("column_name"),
            referenced_schema: row.get("referenced_schema"),
            referenced_table: row.get("referenced_table"),
            referenced_column: row.get("referenced_column"),
            ordinal: row.get("ordinal"),
            on_update: row.get("on_update"),
            on_delete: row.get("on_delete"),
        })
        .collect())
}

async fn fetch_indexes(
    tx: &Transaction<'_>,
    schemas: &[String],
) -> Result<Vec<IndexColumnRow>, AppError> {
    let query = format!(
        r#"
        SELECT
            n.nspname::text AS schema_name,
            t.relname::text AS table_name,
            i.relname::text AS index_name,
            a.attname::text AS column_name,
            k.ord::int AS ordinal,
            ix.indisunique AS is_unique,
            ix.indisprimary AS is_primary,
            am.amname::text AS method,
            pg_get_indexdef(ix.indexrelid) AS definition
        FROM pg_index ix
        JOIN pg_class t ON t.oid = ix.indrelid
        JOIN pg_class i ON i.oid = ix.indexrelid
        JOIN pg_namespace n ON n.oid = t.relnamespace
        JOIN pg_am am ON am.oid = i.relam
        CROSS JOIN LATERAL unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
        JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
        WHERE t.relkind IN ('r', 'p') AND {}
        ORDER BY n.nspname, t.relname, i.relname, k.ord
        "#,
        schema_predicate("n.nspname")
    );

    let rows = tx.query(query.as_str(), &[&schemas]).await?;
    Ok(rows
        .iter()
        .map(|row| IndexColumnRow {
            schema: row.get("schema_name"),
            table: row.get("table_name"),
            index: row.get("index_name"),
            column: row.get("column_name"),
            ordinal: row.get("ordinal"),
            is_unique: row.get("is_unique"),
            is_primary: row.get("is_primary"),
            method: row.get("method"),
            definition: row.get("definition"),
        })
        .collect())
}

async fn fetch_enum_labels(
    tx: &Transaction<'_>,
    schemas: &[String],
) -> Result<Vec<EnumLabelRow>, AppError> {
    let query = format!(
        r#"
        SELECT
            n.nspname::text AS schema_name,
            t.typname::text AS type_name,
            e.enumlabel::text AS label,
            e.enumsortorder::float8 AS sort_order,
            obj_description(t.oid, 'pg_type') AS comment
        FROM pg_type t
        JOIN pg_enum e ON e.enumtypid = t.oid
        JOIN pg_namespace n ON n.oid = t.typnamespace
        WHERE {}
        ORDER BY n.nspname, t.typname, e.enumsortorder
        "#,
        schema_predicate("n.nspname")
    );

    let rows = tx.query(query.as_str(), &[&schemas]).await?;
    Ok(rows
        .iter()
        .map(|row| EnumLabelRow {
            schema: row.get("schema_name"),
            type_name: row.get("type_name"),
            label: row.get("label"),
            sort_order: row.get("sort_order"),
            comment: row.get("comment"),
        })
        .collect())
}

async fn fetch_views(tx: &Transaction<'_>, schemas: &[String]) -> Result<Vec<ViewRow>, AppError> {
    let query = format!(
        r#"
        SELECT
            n.nspname::text AS schema_name,
            c.relname::text AS view_name,
            COALESCE(pg_get_viewdef(c.oid, true), '') AS definition
        FROM pg_class c
        JOIN pg_namespace n ON n.oid = c.relnamespace
        WHERE c.relkind IN ('v', 'm') AND {}
        ORDER BY n.nspname, c.relname
        "#,
        schema_predicate("n.nspname")
    );

    let rows = tx.query(query.as_str(), &[&schemas]).await?;
    Ok(rows
        .iter()
        .map(|row| ViewRow {
            schema: row.get("schema_name"),
            name: row.get("view_name"),
            definition: row.get("definition"),
        })
        .collect())
}

async fn fetch_view_columns(
    tx: &Transaction<'_>,
    schemas: &[String],
) -> Result<Vec<ViewColumnRow>, AppError> {
    let query = format!(
        r#"
        SELECT
            n.nspname::text AS schema_name,
            c.relname::text AS view_name,
            a.attname::text AS column_name,
            format_type(a.atttypid, a.atttypmod) AS data_type,
            a.attnum::int AS ordinal
        FROM pg_attribute a
        JOIN pg_class c ON c.oid = a.attrelid
        JOIN pg_namespace n ON n.oid = c.relnamespace
        WHERE c.relkind IN ('v', 'm') AND a.attnum > 0 AND NOT a.attisdropped AND {}
        ORDER BY n.nspname, c.relname, a.attnum
        "#,
        schema_predicate("n.nspname")
    );

    let rows = tx.query(query.as_str(), &[&schemas]).await?;
    Ok(rows
        .iter()
        .map(|row| ViewColumnRow {
            schema: row.get("schema_name"),
            view: row.get("view_name"),
            name: row.get("column_name"),
            data_type: row.get("data_type"),
            ordinal: row.get("ordinal"),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_predicate_binds_first_parameter() {
        let predicate = schema_predicate("n.nspname");
        assert!(predicate.contains("n.nspname = ANY($1::text[])"));
        assert!(predicate.contains("cardinality($1::text[]) = 0"));
    }

    #[test]
    fn test_domain_columns_resolve_to_base_type() {
        let query = columns_query();
        assert!(query.contains("WHEN t.typtype = 'd' THEN format_type(t.typbasetype, t.typtypmod)"));
        let domain_branch = query.find("t.typtype = 'd'").unwrap();
        let marker_branch = query.find("THEN 'USER-DEFINED'").unwrap();
        assert!(domain_branch < marker_branch);
        assert!(!query.contains("t.typtype = 'c' OR t.typtype = 'd'"));
    }
}
