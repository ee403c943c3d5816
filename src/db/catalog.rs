//! Tenant schema discovery
//!
//! Lists every schema on a cluster and keeps the ones that follow the
//! tenant naming convention. Nothing is cached: each run asks the catalog
//! again.

use crate::db::pool::PoolManager;
use crate::db::types::CellValue;
use crate::error::{DbError, DbResult};

/// Catalog listing, one schema name per row in the first column
pub const CATALOG_QUERY: &str =
    "SELECT schema_name::text AS schema_name FROM information_schema.schemata ORDER BY schema_name";

/// Schema used for the shared test clinic
pub const SHARED_TEST_SCHEMA: &str = "amelia";

/// Tenant naming heuristic: the shared test schema, or six characters
/// starting with `c` (e.g. `c00052`).
///
/// Any unrelated six-character schema starting with `c` also matches; the
/// rule is kept as-is until a canonical tenant registry exists.
pub fn is_tenant_schema(name: &str) -> bool {
    name == SHARED_TEST_SCHEMA || (name.chars().count() == 6 && name.starts_with('c'))
}

/// Keep tenant schemas, preserving catalog order
pub fn filter_tenant_schemas<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    names
        .into_iter()
        .map(Into::into)
        .filter(|name| is_tenant_schema(name))
        .collect()
}

/// List tenant schemas on the cluster behind `route`.
///
/// # Errors
/// Returns `DbError::SchemaDiscovery` if the catalog query fails
pub async fn list_schemas(pools: &PoolManager, route: &str) -> DbResult<Vec<String>> {
    let rows = pools
        .execute_query(route, CATALOG_QUERY, &[])
        .await
        .map_err(|e| DbError::SchemaDiscovery {
            route: route.to_string(),
            reason: e.to_string(),
        })?;

    let names = rows.iter().filter_map(|row| match row.iter().next() {
        Some((_, CellValue::Text(name))) => Some(name.clone()),
        _ => None,
    });

    let tenants = filter_tenant_schemas(names);
    tracing::debug!(route = %route, count = tenants.len(), "Tenant schemas discovered");
    Ok(tenants)
}
