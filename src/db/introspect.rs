//! Schema introspection over the live database catalogs.
//!
//! information_schema drives the client/server dialects; sqlite is walked
//! through its PRAGMA interface. Everything is computed on demand — callers
//! that want fresh data simply introspect again.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::db::pool::DbPool;
use crate::db::Dialect;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub primary_key: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignKeyInfo {
    pub constrained_columns: Vec<String>,
    pub referred_table: String,
    pub referred_columns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableInfo {
    pub columns: Vec<ColumnInfo>,
    pub foreign_keys: Vec<ForeignKeyInfo>,
    pub indexes: Vec<IndexInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaInfo {
    pub tables: BTreeMap<String, TableInfo>,
    pub database_type: Dialect,
}

fn catalog_err(err: impl std::fmt::Display) -> AppError {
    AppError::SchemaIntrospection(err.to_string())
}

pub async fn introspect(pool: &DbPool, dialect: Dialect) -> AppResult<SchemaInfo> {
    let tables = match pool {
        DbPool::MySql(pool) => mysql::walk(pool).await?,
        DbPool::Postgres(pool) => postgres::walk(pool).await?,
        DbPool::Sqlite(pool) => sqlite::walk(pool).await?,
    };

    Ok(SchemaInfo {
        tables,
        database_type: dialect,
    })
}

mod mysql {
    use super::*;
    use sqlx::MySqlPool;

    // CONVERT(... USING utf8) keeps information_schema text columns from
    // arriving as raw byte blobs.
    const LIST_TABLES: &str = r#"
        SELECT CONVERT(TABLE_NAME USING utf8) AS table_name
        FROM information_schema.tables
        WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE'
        ORDER BY table_name
    "#;

    const LIST_COLUMNS: &str = r#"
        SELECT
            CONVERT(COLUMN_NAME USING utf8) AS column_name,
            CONVERT(COLUMN_TYPE USING utf8) AS column_type,
            CONVERT(IS_NULLABLE USING utf8) AS is_nullable,
            CONVERT(COLUMN_DEFAULT USING utf8) AS column_default,
            CONVERT(COLUMN_KEY USING utf8) AS column_key
        FROM information_schema.columns
        WHERE table_schema = DATABASE() AND table_name = ?
        ORDER BY ordinal_position
    "#;

    const LIST_FOREIGN_KEYS: &str = r#"
        SELECT
            CONVERT(CONSTRAINT_NAME USING utf8) AS constraint_name,
            CONVERT(COLUMN_NAME USING utf8) AS column_name,
            CONVERT(REFERENCED_TABLE_NAME USING utf8) AS referred_table,
            CONVERT(REFERENCED_COLUMN_NAME USING utf8) AS referred_column
        FROM information_schema.key_column_usage
        WHERE table_schema = DATABASE()
          AND table_name = ?
          AND referenced_table_name IS NOT NULL
        ORDER BY constraint_name, ordinal_position
    "#;

    const LIST_INDEXES: &str = r#"
        SELECT
            CONVERT(INDEX_NAME USING utf8) AS index_name,
            CONVERT(COLUMN_NAME USING utf8) AS column_name,
            NON_UNIQUE AS non_unique
        FROM information_schema.statistics
        WHERE table_schema = DATABASE() AND table_name = ?
        ORDER BY index_name, seq_in_index
    "#;

    pub async fn walk(pool: &MySqlPool) -> AppResult<BTreeMap<String, TableInfo>> {
        let table_names: Vec<(String,)> = sqlx::query_as(LIST_TABLES)
            .fetch_all(pool)
            .await
            .map_err(catalog_err)?;

        let mut tables = BTreeMap::new();
        for (table_name,) in table_names {
            let columns: Vec<(String, String, String, Option<String>, String)> =
                sqlx::query_as(LIST_COLUMNS)
                    .bind(&table_name)
                    .fetch_all(pool)
                    .await
                    .map_err(catalog_err)?;

            let columns = columns
                .into_iter()
                .map(
                    |(name, data_type, is_nullable, default, column_key)| ColumnInfo {
                        name,
                        data_type,
                        nullable: is_nullable == "YES",
                        default,
                        primary_key: column_key == "PRI",
                    },
                )
                .collect();

            let fk_rows: Vec<(String, String, String, String)> =
                sqlx::query_as(LIST_FOREIGN_KEYS)
                    .bind(&table_name)
                    .fetch_all(pool)
                    .await
                    .map_err(catalog_err)?;

            let mut foreign_keys: Vec<(String, ForeignKeyInfo)> = Vec::new();
            for (constraint, column, referred_table, referred_column) in fk_rows {
                match foreign_keys.last_mut() {
                    Some((name, fk)) if *name == constraint => {
                        fk.constrained_columns.push(column);
                        fk.referred_columns.push(referred_column);
                    }
                    _ => foreign_keys.push((
                        constraint,
                        ForeignKeyInfo {
                            constrained_columns: vec![column],
                            referred_table,
                            referred_columns: vec![referred_column],
                        },
                    )),
                }
            }

            let index_rows: Vec<(String, String, i64)> = sqlx::query_as(LIST_INDEXES)
                .bind(&table_name)
                .fetch_all(pool)
                .await
                .map_err(catalog_err)?;

            let mut indexes: Vec<IndexInfo> = Vec::new();
            for (index_name, column, non_unique) in index_rows {
                match indexes.last_mut() {
                    Some(index) if index.name == index_name => index.columns.push(column),
                    _ => indexes.push(IndexInfo {
                        name: index_name,
                        columns: vec![column],
                        unique: non_unique == 0,
                    }),
                }
            }

            tables.insert(
                table_name,
                TableInfo {
                    columns,
                    foreign_keys: foreign_keys.into_iter().map(|(_, fk)| fk).collect(),
                    indexes,
                },
            );
        }

        Ok(tables)
    }
}

mod postgres {
    use super::*;
    use sqlx::PgPool;

    const LIST_TABLES: &str = r#"
        SELECT table_name
        FROM information_schema.tables
        WHERE table_schema = 'public' AND table_type = 'BASE TABLE'
        ORDER BY table_name
    "#;

    const LIST_COLUMNS: &str = r#"
        SELECT
            c.column_name,
            c.data_type,
            c.is_nullable,
            c.column_default,
            CASE WHEN pk.column_name IS NOT NULL THEN true ELSE false END AS is_primary_key
        FROM information_schema.columns c
        LEFT JOIN (
            SELECT kcu.column_name
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
            WHERE tc.table_name = $1
              AND tc.table_schema = 'public'
              AND tc.constraint_type = 'PRIMARY KEY'
        ) pk ON c.column_name = pk.column_name
        WHERE c.table_name = $1 AND c.table_schema = 'public'
        ORDER BY c.ordinal_position
    "#;

    const LIST_FOREIGN_KEYS: &str = r#"
        SELECT
            tc.constraint_name,
            kcu.column_name,
            ccu.table_name AS referred_table,
            ccu.column_name AS referred_column
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
            ON tc.constraint_name = kcu.constraint_name
            AND tc.table_schema = kcu.table_schema
        JOIN information_schema.constraint_column_usage ccu
            ON ccu.constraint_name = tc.constraint_name
            AND ccu.table_schema = tc.table_schema
        WHERE tc.table_name = $1
          AND tc.table_schema = 'public'
          AND tc.constraint_type = 'FOREIGN KEY'
        ORDER BY tc.constraint_name, kcu.ordinal_position
    "#;

    const LIST_INDEXES: &str = r#"
        SELECT
            i.relname AS index_name,
            array_agg(a.attname::text ORDER BY array_position(ix.indkey, a.attnum)) AS column_names,
            ix.indisunique AS is_unique
        FROM pg_index ix
        JOIN pg_class i ON i.oid = ix.indexrelid
        JOIN pg_class t ON t.oid = ix.indrelid
        JOIN pg_namespace n ON n.oid = t.relnamespace
        JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey)
        WHERE t.relname = $1 AND n.nspname = 'public'
        GROUP BY i.relname, ix.indisunique
        ORDER BY i.relname
    "#;

    pub async fn walk(pool: &PgPool) -> AppResult<BTreeMap<String, TableInfo>> {
        let table_names: Vec<(String,)> = sqlx::query_as(LIST_TABLES)
            .fetch_all(pool)
            .await
            .map_err(catalog_err)?;

        let mut tables = BTreeMap::new();
        for (table_name,) in table_names {
            let columns: Vec<(String, String, String, Option<String>, bool)> =
                sqlx::query_as(LIST_COLUMNS)
                    .bind(&table_name)
                    .fetch_all(pool)
                    .await
                    .map_err(catalog_err)?;

            let columns = columns
                .into_iter()
                .map(
                    |(name, data_type, is_nullable, default, primary_key)| ColumnInfo {
                        name,
                        data_type,
                        nullable: is_nullable == "YES",
                        default,
                        primary_key,
                    },
                )
                .collect();

            let fk_rows: Vec<(String, String, String, String)> =
                sqlx::query_as(LIST_FOREIGN_KEYS)
                    .bind(&table_name)
                    .fetch_all(pool)
                    .await
                    .map_err(catalog_err)?;

            let mut foreign_keys: Vec<(String, ForeignKeyInfo)> = Vec::new();
            for (constraint, column, referred_table, referred_column) in fk_rows {
                match foreign_keys.last_mut() {
                    Some((name, fk)) if *name == constraint => {
                        fk.constrained_columns.push(column);
                        fk.referred_columns.push(referred_column);
                    }
                    _ => foreign_keys.push((
                        constraint,
                        ForeignKeyInfo {
                            constrained_columns: vec![column],
                            referred_table,
                            referred_columns: vec![referred_column],
                        },
                    )),
                }
            }

            let index_rows: Vec<(String, Vec<String>, bool)> = sqlx::query_as(LIST_INDEXES)
                .bind(&table_name)
                .fetch_all(pool)
                .await
                .map_err(catalog_err)?;

            let indexes = index_rows
                .into_iter()
                .map(|(name, columns, unique)| IndexInfo {
                    name,
                    columns,
                    unique,
                })
                .collect();

            tables.insert(
                table_name,
                TableInfo {
                    columns,
                    foreign_keys: foreign_keys.into_iter().map(|(_, fk)| fk).collect(),
                    indexes,
                },
            );
        }

        Ok(tables)
    }
}

mod sqlite {
    use super::*;
    use sqlx::SqlitePool;

    const LIST_TABLES: &str = r#"
        SELECT name FROM sqlite_master
        WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
        ORDER BY name
    "#;

    // PRAGMA statements cannot take bind parameters; the table name is
    // interpolated with quote doubling.
    fn quoted(table: &str) -> String {
        table.replace('"', "\"\"")
    }

    pub async fn walk(pool: &SqlitePool) -> AppResult<BTreeMap<String, TableInfo>> {
        let table_names: Vec<(String,)> = sqlx::query_as(LIST_TABLES)
            .fetch_all(pool)
            .await
            .map_err(catalog_err)?;

        let mut tables = BTreeMap::new();
        for (table_name,) in table_names {
            // cid, name, type, notnull, dflt_value, pk
            let column_rows: Vec<(i64, String, String, i64, Option<String>, i64)> =
                sqlx::query_as(&format!("PRAGMA table_info(\"{}\")", quoted(&table_name)))
                    .fetch_all(pool)
                    .await
                    .map_err(catalog_err)?;

            let columns = column_rows
                .into_iter()
                .map(|(_, name, data_type, notnull, default, pk)| ColumnInfo {
                    name,
                    data_type,
                    nullable: notnull == 0,
                    default,
                    primary_key: pk > 0,
                })
                .collect();

            // id, seq, table, from, to
            let fk_rows: Vec<(i64, i64, String, String, Option<String>)> = sqlx::query_as(
                &format!("PRAGMA foreign_key_list(\"{}\")", quoted(&table_name)),
            )
            .fetch_all(pool)
            .await
            .map_err(catalog_err)?;

            let mut foreign_keys: Vec<(i64, ForeignKeyInfo)> = Vec::new();
            for (id, _, referred_table, from, to) in fk_rows {
                let referred_column = to.unwrap_or_default();
                match foreign_keys.last_mut() {
                    Some((fk_id, fk)) if *fk_id == id => {
                        fk.constrained_columns.push(from);
                        fk.referred_columns.push(referred_column);
                    }
                    _ => foreign_keys.push((
                        id,
                        ForeignKeyInfo {
                            constrained_columns: vec![from],
                            referred_table,
                            referred_columns: vec![referred_column],
                        },
                    )),
                }
            }

            // seq, name, unique, origin, partial
            let index_rows: Vec<(i64, String, i64, String, i64)> = sqlx::query_as(&format!(
                "PRAGMA index_list(\"{}\")",
                quoted(&table_name)
            ))
            .fetch_all(pool)
            .await
            .map_err(catalog_err)?;

            let mut indexes = Vec::new();
            for (_, index_name, unique, _, _) in index_rows {
                if index_name.starts_with("sqlite_autoindex") {
                    continue;
                }
                // seqno, cid, name
                let info_rows: Vec<(i64, i64, Option<String>)> = sqlx::query_as(&format!(
                    "PRAGMA index_info(\"{}\")",
                    quoted(&index_name)
                ))
                .fetch_all(pool)
                .await
                .map_err(catalog_err)?;

                indexes.push(IndexInfo {
                    name: index_name,
                    columns: info_rows.into_iter().filter_map(|(_, _, name)| name).collect(),
                    unique: unique != 0,
                });
            }

            tables.insert(
                table_name,
                TableInfo {
                    columns,
                    foreign_keys: foreign_keys.into_iter().map(|(_, fk)| fk).collect(),
                    indexes,
                },
            );
        }

        Ok(tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ConnectionSpec, Dialect};

    fn temp_db_path() -> String {
        std::env::temp_dir()
            .join(format!("nl_lens_introspect_{}.db", uuid::Uuid::new_v4()))
            .to_string_lossy()
            .into_owned()
    }

    #[tokio::test]
    async fn walks_sqlite_catalog() {
        let path = temp_db_path();
        let spec = ConnectionSpec {
            dialect: Dialect::Sqlite,
            host: None,
            port: None,
            database: path.clone(),
            username: None,
            password: None,
            connection_string: None,
        };
        let pool = DbPool::connect(&spec).await.unwrap();

        if let DbPool::Sqlite(raw) = &pool {
            sqlx::query(
                "CREATE TABLE customers (
                    id INTEGER PRIMARY KEY,
                    name TEXT NOT NULL,
                    region TEXT DEFAULT 'emea'
                )",
            )
            .execute(raw)
            .await
            .unwrap();
            sqlx::query(
                "CREATE TABLE orders (
                    id INTEGER PRIMARY KEY,
                    customer_id INTEGER REFERENCES customers(id),
                    total REAL
                )",
            )
            .execute(raw)
            .await
            .unwrap();
            sqlx::query("CREATE INDEX idx_orders_customer ON orders(customer_id)")
                .execute(raw)
                .await
                .unwrap();
        }

        let schema = introspect(&pool, Dialect::Sqlite).await.unwrap();
        assert_eq!(schema.database_type, Dialect::Sqlite);
        assert_eq!(schema.tables.len(), 2);

        let customers = &schema.tables["customers"];
        assert_eq!(customers.columns.len(), 3);
        assert!(customers.columns[0].primary_key);
        assert!(!customers.columns[1].nullable);
        assert_eq!(customers.columns[2].default.as_deref(), Some("'emea'"));

        let orders = &schema.tables["orders"];
        assert_eq!(orders.foreign_keys.len(), 1);
        assert_eq!(orders.foreign_keys[0].referred_table, "customers");
        assert_eq!(orders.foreign_keys[0].constrained_columns, vec!["customer_id"]);
        assert_eq!(orders.indexes.len(), 1);
        assert_eq!(orders.indexes[0].columns, vec!["customer_id"]);
        assert!(!orders.indexes[0].unique);

        pool.close().await;
        let _ = std::fs::remove_file(&path);
    }
}
