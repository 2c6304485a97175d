use cura_config::Postgres;
use cura_storage::{Error, db::Db, documents};
use cura_testkit::TestDatabase;

async fn bootstrap(test_db: &TestDatabase) -> Db {
	let cfg = Postgres { dsn: test_db.dsn().to_string(), pool_max_conns: 2 };
	let db = Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");

	db
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set CURA_PG_DSN to run."]
async fn db_connects_and_bootstraps_twice() {
	let Some(base_dsn) = cura_testkit::env_dsn() else {
		eprintln!("Skipping db_connects_and_bootstraps_twice; set CURA_PG_DSN to run this test.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = bootstrap(&test_db).await;

	db.ensure_schema().await.expect("Second bootstrap failed.");

	let count: i64 = sqlx::query_scalar(
		"SELECT count(*) FROM information_schema.tables WHERE table_name = 'documents'",
	)
	.fetch_one(&db.pool)
	.await
	.expect("Failed to query schema tables.");

	assert_eq!(count, 1);

	drop(db);
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set CURA_PG_DSN to run."]
async fn search_text_ranks_within_one_collection() {
	let Some(base_dsn) = cura_testkit::env_dsn() else {
		eprintln!("Skipping search_text_ranks_within_one_collection; set CURA_PG_DSN to run.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = bootstrap(&test_db).await;

	cura_testkit::insert_document(
		&db.pool,
		"conditions",
		"ckd",
		"Chronic kidney disease",
		"Chronic kidney disease treatment focuses on blood pressure control and slowing kidney damage.",
		serde_json::json!({ "section": "overview" }),
	)
	.await
	.expect("Failed to insert document.");
	cura_testkit::insert_document(
		&db.pool,
		"conditions",
		"aki",
		"Acute kidney injury",
		"Acute kidney injury is a sudden loss of kidney function.",
		serde_json::json!({}),
	)
	.await
	.expect("Failed to insert document.");
	cura_testkit::insert_document(
		&db.pool,
		"medications",
		"ace-inhibitors",
		"ACE inhibitors",
		"ACE inhibitors are used in chronic kidney disease treatment.",
		serde_json::json!({}),
	)
	.await
	.expect("Failed to insert document.");

	let hits = documents::search_text(&db.pool, "conditions", "chronic kidney disease treatment", 5)
		.await
		.expect("Keyword search failed.");

	assert_eq!(hits.len(), 1);
	assert_eq!(hits[0].doc_id, "ckd");
	assert!(hits[0].score > 0.0);
	assert_eq!(hits[0].metadata["section"], "overview");

	let hits = documents::search_text(&db.pool, "conditions", "kidney", 1)
		.await
		.expect("Keyword search failed.");

	assert_eq!(hits.len(), 1);

	let hits = documents::search_text(&db.pool, "conditions", "migraine aura", 5)
		.await
		.expect("Keyword search failed.");

	assert!(hits.is_empty());

	drop(db);
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set CURA_PG_DSN to run."]
async fn search_text_rejects_zero_limit() {
	let Some(base_dsn) = cura_testkit::env_dsn() else {
		eprintln!("Skipping search_text_rejects_zero_limit; set CURA_PG_DSN to run this test.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = bootstrap(&test_db).await;
	let err = documents::search_text(&db.pool, "conditions", "kidney", 0)
		.await
		.expect_err("Expected invalid argument.");

	assert!(matches!(err, Error::InvalidArgument(_)));

	drop(db);
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
