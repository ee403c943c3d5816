//! PostgreSQL cluster pools
//!
//! Concrete [`Connector`] using `deadpool-postgres` over tokio-postgres.

use crate::config::{ClusterConfig, SslMode};
use crate::db::pool::{ClusterPool, Connector};
use crate::db::types::{CellValue, DataType, Record};
use crate::error::{DbError, DbResult};
use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use rust_decimal::Decimal;
use std::time::Duration;
use tokio_postgres::types::{ToSql, Type};

/// Builds one deadpool per cluster
pub struct PostgresConnector {
    /// Server-side statement timeout and pool wait/create timeout
    query_timeout: Duration,
}

impl PostgresConnector {
    pub fn new(query_timeout: Duration) -> Self {
        Self { query_timeout }
    }
}

/// A deadpool-backed cluster pool
pub struct PostgresPool {
    pool: Pool,
}

#[async_trait]
impl Connector for PostgresConnector {
    async fn connect(&self, config: &ClusterConfig) -> DbResult<Box<dyn ClusterPool>> {
        let route = config.route();
        let init_err = |reason: String| DbError::ConnectionInit {
            route: route.clone(),
            reason,
        };

        tracing::debug!(target_db = %config.connection_string(), ssl = ?config.ssl_mode, "Creating cluster pool");
        let pg_config = config.pg_config(self.query_timeout.as_millis() as u64);

        let manager_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let manager = match config.ssl_mode {
            SslMode::Disable => {
                Manager::from_config(pg_config, tokio_postgres::NoTls, manager_config)
            }
            SslMode::Prefer | SslMode::Require => {
                let tls = tokio_postgres_rustls::MakeRustlsConnect::new(make_tls_config());
                Manager::from_config(pg_config, tls, manager_config)
            }
        };

        let pool = Pool::builder(manager)
            .max_size(config.max_connections)
            .runtime(Runtime::Tokio1)
            .wait_timeout(Some(self.query_timeout))
            .create_timeout(Some(self.query_timeout))
            .build()
            .map_err(|e| init_err(format!("Failed to create pool: {}", e)))?;

        if config.verify_on_connect {
            pool.get()
                .await
                .map_err(|e| init_err(e.to_string()))?;
        }

        Ok(Box::new(PostgresPool { pool }))
    }
}

#[async_trait]
impl ClusterPool for PostgresPool {
    async fn query(&self, sql: &str, params: &[&str]) -> DbResult<Vec<Record>> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| DbError::QueryFailed(format!("Pool checkout failed: {}", e)))?;

        let stmt = client
            .prepare_cached(sql)
            .await
            .map_err(|e| DbError::QueryFailed(e.to_string()))?;

        let columns: Vec<(String, DataType)> = stmt
            .columns()
            .iter()
            .map(|col| (col.name().to_string(), pg_type_to_datatype(col.type_())))
            .collect();

        let bind: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        let pg_rows = client
            .query(&stmt, &bind)
            .await
            .map_err(|e| DbError::QueryFailed(e.to_string()))?;

        let mut rows = Vec::with_capacity(pg_rows.len());
        for pg_row in &pg_rows {
            let mut record = Record::new();
            for (i, (name, data_type)) in columns.iter().enumerate() {
                record.push(name.clone(), extract_cell_value(pg_row, i, data_type));
            }
            rows.push(record);
        }
        Ok(rows)
    }

    async fn close(&self) -> DbResult<()> {
        self.pool.close();
        Ok(())
    }
}

/// Map tokio_postgres Type to our DataType enum
fn pg_type_to_datatype(pg_type: &Type) -> DataType {
    match *pg_type {
        Type::INT2 => DataType::SmallInt,
        Type::INT4 => DataType::Integer,
        Type::INT8 => DataType::BigInt,
        Type::FLOAT4 => DataType::Real,
        Type::FLOAT8 => DataType::Double,
        Type::NUMERIC => DataType::Numeric,
        Type::TEXT | Type::NAME | Type::VARCHAR | Type::CHAR | Type::BPCHAR => DataType::Text,
        Type::BOOL => DataType::Boolean,
        Type::DATE => DataType::Date,
        Type::TIME => DataType::Time,
        Type::TIMESTAMP => DataType::Timestamp,
        Type::TIMESTAMPTZ => DataType::TimestampTz,
        Type::JSON | Type::JSONB => DataType::Json,
        Type::UUID => DataType::Uuid,
        _ => DataType::Unknown(pg_type.name().to_string()),
    }
}

/// Build a rustls ClientConfig that trusts OS certificates (with Mozilla roots as fallback)
fn make_tls_config() -> rustls::ClientConfig {
    let mut root_store = rustls::RootCertStore::empty();

    let native_certs = rustls_native_certs::load_native_certs();
    let mut loaded = 0;
    for cert in native_certs.certs {
        if root_store.add(cert).is_ok() {
            loaded += 1;
        }
    }
    if loaded == 0 {
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }

    rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth()
}

/// Extract a cell value from a tokio_postgres Row based on the column's DataType.
///
/// Tries the expected type first and falls back to the text representation.
fn extract_cell_value(row: &tokio_postgres::Row, idx: usize, data_type: &DataType) -> CellValue {
    match data_type {
        DataType::SmallInt => match row.try_get::<_, Option<i16>>(idx) {
            Ok(Some(v)) => CellValue::Integer(v as i64),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        DataType::Integer => match row.try_get::<_, Option<i32>>(idx) {
            Ok(Some(v)) => CellValue::Integer(v as i64),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        DataType::BigInt => match row.try_get::<_, Option<i64>>(idx) {
            Ok(Some(v)) => CellValue::Integer(v),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        DataType::Real => match row.try_get::<_, Option<f32>>(idx) {
            Ok(Some(v)) => CellValue::Float(v as f64),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        DataType::Double => match row.try_get::<_, Option<f64>>(idx) {
            Ok(Some(v)) => CellValue::Float(v),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        DataType::Numeric => match row.try_get::<_, Option<Decimal>>(idx) {
            Ok(Some(v)) => CellValue::Text(v.to_string()),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        DataType::Boolean => match row.try_get::<_, Option<bool>>(idx) {
            Ok(Some(v)) => CellValue::Boolean(v),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        DataType::Json => match row.try_get::<_, Option<serde_json::Value>>(idx) {
            Ok(Some(v)) => CellValue::Json(v),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        DataType::Uuid => match row.try_get::<_, Option<uuid::Uuid>>(idx) {
            Ok(Some(v)) => CellValue::Text(v.to_string()),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        DataType::Timestamp => match row.try_get::<_, Option<chrono::NaiveDateTime>>(idx) {
            Ok(Some(v)) => CellValue::DateTime(v.to_string()),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        DataType::TimestampTz => {
            match row.try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx) {
                Ok(Some(v)) => CellValue::DateTime(v.to_string()),
                Ok(None) => CellValue::Null,
                Err(_) => try_as_string(row, idx),
            }
        }
        DataType::Date => match row.try_get::<_, Option<chrono::NaiveDate>>(idx) {
            Ok(Some(v)) => CellValue::DateTime(v.to_string()),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        DataType::Time => match row.try_get::<_, Option<chrono::NaiveTime>>(idx) {
            Ok(Some(v)) => CellValue::DateTime(v.to_string()),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        // Text types and fallback for unknown types
        DataType::Text | DataType::Unknown(_) => try_as_string(row, idx),
    }
}

/// Try to extract a value as a string (fallback for type mismatches).
///
/// When even the string fallback fails, includes the postgres type name
/// in the value so the report shows what couldn't be decoded.
fn try_as_string(row: &tokio_postgres::Row, idx: usize) -> CellValue {
    match row.try_get::<_, Option<String>>(idx) {
        Ok(Some(v)) => CellValue::Text(v),
        Ok(None) => CellValue::Null,
        Err(_) => {
            let type_name = row
                .columns()
                .get(idx)
                .map_or("unknown", |c| c.type_().name());
            CellValue::Text(format!("<unable to display: {}>", type_name))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pg_type_mapping() {
        assert_eq!(pg_type_to_datatype(&Type::INT8), DataType::BigInt);
        assert_eq!(pg_type_to_datatype(&Type::BPCHAR), DataType::Text);
        assert_eq!(pg_type_to_datatype(&Type::JSONB), DataType::Json);
        assert_eq!(
            pg_type_to_datatype(&Type::BYTEA),
            DataType::Unknown("bytea".to_string())
        );
    }

    #[tokio::test]
    async fn test_connect_without_verification_is_lazy() {
        let connector = PostgresConnector::new(Duration::from_millis(200));
        let mut config = ClusterConfig::new("127.0.0.1", 1);
        config.ssl_mode = SslMode::Disable;
        config.verify_on_connect = false;
        let pool = connector.connect(&config).await;
        assert!(pool.is_ok());
    }

    #[tokio::test]
    async fn test_connect_verification_reports_unreachable_cluster() {
        let connector = PostgresConnector::new(Duration::from_millis(200));
        let mut config = ClusterConfig::new("127.0.0.1", 1);
        config.ssl_mode = SslMode::Disable;
        let result = connector.connect(&config).await;
        assert!(
            matches!(result, Err(DbError::ConnectionInit { ref route, .. }) if route == "127.0.0.1:1")
        );
    }
}
