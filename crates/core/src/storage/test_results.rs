use crate::domain::test_result::NewTestResult;
use anyhow::Context;
use sqlx::PgConnection;

pub async fn insert(conn: &mut PgConnection, result: &NewTestResult) -> anyhow::Result<i32> {
    let id: i32 = sqlx::query_scalar(
        "INSERT INTO test_results (test_name, test_type, status, details) \
         VALUES ($1, $2, $3, $4) \
         RETURNING id",
    )
    .bind(&result.test_name)
    .bind(result.test_type.as_str())
    .bind(result.status.as_str())
    .bind(&result.details)
    .fetch_one(&mut *conn)
    .await
    .context("insert test_results failed")?;

    Ok(id)
}
