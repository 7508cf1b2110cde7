//! Search execution - runs compiled search queries against the database

use crate::{models::StoredResource, Result};
use ehr_fhir_rest::{BindValue, CompiledQuery};
use sqlx::PgConnection;

/// Total rows matching a compiled `COUNT(*)` query.
pub async fn count_total(conn: &mut PgConnection, query: &CompiledQuery) -> Result<i64> {
    let mut q = sqlx::query_scalar::<_, i64>(&query.sql);
    for value in &query.binds {
        q = match value {
            BindValue::Text(v) => q.bind(v.as_str()),
            BindValue::BigInt(v) => q.bind(*v),
        };
    }

    Ok(q.fetch_one(&mut *conn).await?)
}

/// One page of rows for a compiled data query.
pub async fn fetch_page(
    conn: &mut PgConnection,
    query: &CompiledQuery,
) -> Result<Vec<StoredResource>> {
    let mut q = sqlx::query_as::<_, StoredResource>(&query.sql);
    for value in &query.binds {
        q = match value {
            BindValue::Text(v) => q.bind(v.as_str()),
            BindValue::BigInt(v) => q.bind(*v),
        };
    }

    Ok(q.fetch_all(&mut *conn).await?)
}
