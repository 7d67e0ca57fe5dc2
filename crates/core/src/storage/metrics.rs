use crate::domain::test_result::RecentTestResult;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;

pub const RECENT_TESTS_LIMIT: i64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metrics {
    pub total_tests: i64,
    pub passed_tests: i64,
    pub failed_tests: i64,
    pub total_recommendations: i64,
    pub recent_tests: Vec<RecentTestResult>,
    pub portfolio_distribution: Vec<PortfolioDistribution>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PortfolioDistribution {
    pub portfolio_type: String,
    pub count: i64,
    pub avg_risk_score: f64,
}

pub async fn collect(conn: &mut PgConnection) -> anyhow::Result<Metrics> {
    let (total_tests, passed_tests, failed_tests): (i64, i64, i64) = sqlx::query_as(
        "SELECT \
             COUNT(*), \
             COUNT(*) FILTER (WHERE status = 'passed'), \
             COUNT(*) FILTER (WHERE status = 'failed') \
         FROM test_results",
    )
    .fetch_one(&mut *conn)
    .await
    .context("aggregate test_results failed")?;

    let total_recommendations: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM recommendations")
        .fetch_one(&mut *conn)
        .await
        .context("count recommendations failed")?;

    let recent_tests = sqlx::query_as::<_, RecentTestResult>(
        "SELECT test_name, test_type, status, timestamp \
         FROM test_results \
         ORDER BY timestamp DESC, id DESC \
         LIMIT $1",
    )
    .bind(RECENT_TESTS_LIMIT)
    .fetch_all(&mut *conn)
    .await
    .context("select recent test_results failed")?;

    let portfolio_distribution = sqlx::query_as::<_, PortfolioDistribution>(
        "SELECT portfolio_type, COUNT(*) AS count, AVG(risk_score)::float8 AS avg_risk_score \
         FROM recommendations \
         GROUP BY portfolio_type \
         ORDER BY portfolio_type",
    )
    .fetch_all(&mut *conn)
    .await
    .context("aggregate recommendations by portfolio_type failed")?;

    Ok(Metrics {
        total_tests,
        passed_tests,
        failed_tests,
        total_recommendations,
        recent_tests,
        portfolio_distribution,
    })
}
