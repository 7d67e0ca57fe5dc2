use crate::domain::recommendation::{
    NewRecommendation, Recommendation, RecommendationPage, RecommendationQuery,
};
use anyhow::Context;
use sqlx::PgConnection;

pub async fn insert(conn: &mut PgConnection, rec: &NewRecommendation) -> anyhow::Result<i32> {
    let id: i32 = sqlx::query_scalar(
        "INSERT INTO recommendations (name, risk_score, portfolio_type) \
         VALUES ($1, $2, $3) \
         RETURNING id",
    )
    .bind(&rec.name)
    .bind(rec.risk_score)
    .bind(rec.portfolio_type.as_str())
    .fetch_one(&mut *conn)
    .await
    .context("insert recommendations failed")?;

    Ok(id)
}

/// Newest first. An empty filter string means "no filter".
pub async fn list(
    conn: &mut PgConnection,
    query: &RecommendationQuery,
) -> anyhow::Result<RecommendationPage> {
    let filter = query.portfolio_type.as_deref().filter(|s| !s.is_empty());

    // `$1 IS NULL` keeps a single statement for the filtered and unfiltered cases.
    let recommendations = sqlx::query_as::<_, Recommendation>(
        "SELECT id, name, risk_score, portfolio_type, timestamp \
         FROM recommendations \
         WHERE ($1::text IS NULL OR portfolio_type = $1) \
         ORDER BY timestamp DESC, id DESC \
         LIMIT $2 OFFSET $3",
    )
    .bind(filter)
    .bind(query.limit)
    .bind(query.offset)
    .fetch_all(&mut *conn)
    .await
    .context("select recommendations failed")?;

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM recommendations \
         WHERE ($1::text IS NULL OR portfolio_type = $1)",
    )
    .bind(filter)
    .fetch_one(&mut *conn)
    .await
    .context("count recommendations failed")?;

    Ok(RecommendationPage {
        recommendations,
        total,
    })
}
