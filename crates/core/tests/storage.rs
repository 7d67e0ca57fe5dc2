//! Postgres round-trips. The database test is ignored by default; run it with
//! `--ignored` and `TEST_DATABASE_URL` pointing at a disposable database.

use finsecure_core::domain::contract::RecommendRequest;
use finsecure_core::domain::recommendation::RecommendationQuery;
use finsecure_core::domain::test_result::{NewTestResult, TestStatus, TestType};
use finsecure_core::storage::{self, PgStore, Store};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;

async fn test_store() -> PgStore {
    let url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await
        .expect("connect TEST_DATABASE_URL");
    storage::migrate(&pool).await.expect("migrate");
    sqlx::query("TRUNCATE recommendations, test_results RESTART IDENTITY")
        .execute(&pool)
        .await
        .expect("truncate");
    PgStore::new(Some(pool))
}

fn recommendation(name: &str, risk_score: i64) -> finsecure_core::domain::recommendation::NewRecommendation {
    RecommendRequest {
        name: name.to_string(),
        risk_score: Some(json!(risk_score)),
    }
    .validate_and_into_recommendation()
    .unwrap()
}

// Everything touching the shared tables lives in one test so nothing truncates mid-run.
#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn store_round_trips() {
    let store = test_store().await;

    store.ping().await.unwrap();

    for (name, score) in [("a", 10), ("b", 60), ("c", 90)] {
        store.insert_recommendation(&recommendation(name, score)).await.unwrap();
    }

    let page = store
        .list_recommendations(&RecommendationQuery {
            limit: 1,
            offset: 0,
            portfolio_type: None,
        })
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.recommendations.len(), 1);
    assert_eq!(page.recommendations[0].name, "c");

    let stocks = store
        .list_recommendations(&RecommendationQuery {
            portfolio_type: Some("Stocks".to_string()),
            ..RecommendationQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(stocks.total, 2);
    assert!(stocks.recommendations.iter().all(|r| r.portfolio_type == "Stocks"));

    store
        .insert_test_result(&NewTestResult::new(
            TestType::Compliance,
            TestStatus::Passed,
            "RESULT: PASSED",
        ))
        .await
        .unwrap();
    store
        .insert_test_result(&NewTestResult::new(
            TestType::Security,
            TestStatus::Failed,
            "RESULT: FAILED",
        ))
        .await
        .unwrap();

    let metrics = store.metrics().await.unwrap();
    assert_eq!(metrics.total_tests, 2);
    assert_eq!(metrics.passed_tests, 1);
    assert_eq!(metrics.failed_tests, 1);
    assert_eq!(metrics.total_recommendations, 3);
    assert_eq!(metrics.recent_tests[0].test_name, "security_test");

    let stocks = metrics
        .portfolio_distribution
        .iter()
        .find(|d| d.portfolio_type == "Stocks")
        .unwrap();
    assert_eq!(stocks.count, 2);
    assert!((stocks.avg_risk_score - 75.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn unconfigured_store_is_unavailable() {
    let store = PgStore::new(None);
    assert!(matches!(
        store.ping().await,
        Err(storage::StoreError::Unavailable(_))
    ));
    assert!(matches!(
        store.metrics().await,
        Err(storage::StoreError::Unavailable(_))
    ));
}
