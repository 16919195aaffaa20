use std::{collections::HashSet, sync::Arc, time::Duration};

use serde_json::Value;

use casemig_domain::{CaseRecord, CaseValue, MigrationDefinition, QueryClause};
use casemig_service::{
	Error, EventSettings, ExecutionStrategy, MigrationOrchestrator, MigrationRequest,
	MigrationTarget, RunOptions, rename_field,
};
use casemig_testkit::{Harness, InMemoryCaseStore, seed_cases};

const CASE_TYPE: &str = "T1";

fn rename() -> Arc<MigrationDefinition> {
	Arc::new(rename_field("rename-name", "applicantName", "applicantFullName").expect("definition"))
}

fn request(definition: Arc<MigrationDefinition>, target: MigrationTarget) -> MigrationRequest {
	MigrationRequest {
		definition,
		case_type: Some(CASE_TYPE.to_string()),
		jurisdiction: None,
		target,
		username: Some(Harness::USERNAME.to_string()),
		password: Some(Harness::PASSWORD.to_string()),
		event: EventSettings {
			id: "migrateCase".to_string(),
			summary: "Migrate case".to_string(),
			description: "Migrate case".to_string(),
		},
	}
}

fn sequential(page_size: u32) -> RunOptions {
	RunOptions { page_size, strategy: ExecutionStrategy::Sequential, max_cases: None }
}

fn parallel(page_size: u32, workers: usize) -> RunOptions {
	RunOptions { page_size, strategy: ExecutionStrategy::Parallel { workers }, max_cases: None }
}

fn named_cases(count: usize) -> InMemoryCaseStore {
	InMemoryCaseStore::with_cases(seed_cases(1_001, count, CASE_TYPE, "applicantName", "Jo"))
}

fn sorted(mut ids: Vec<i64>) -> Vec<i64> {
	ids.sort_unstable();

	ids
}

#[tokio::test]
async fn three_single_record_pages_make_one_start_and_submit_per_case() {
	let harness = Harness::new(named_cases(3));
	let orchestrator = MigrationOrchestrator::new(harness.collaborators(), sequential(1));
	let result =
		orchestrator.run(request(rename(), MigrationTarget::Query)).await.expect("run failed");

	assert_eq!(sorted(result.migrated_ids.clone()), vec![1_001, 1_002, 1_003]);
	assert!(result.failed_ids.is_empty());
	assert!(result.is_clean());
	assert_eq!(harness.store.starts(), 3);
	assert_eq!(harness.store.submits(), 3);
	assert_eq!(harness.identity.authentications(), 1);

	let bodies = harness.store.search_bodies();

	// Sizing probe, three full pages, then the empty page that ends the cursor.
	assert_eq!(bodies.len(), 5);
	assert_eq!(bodies[0]["size"], 0);
	assert!(bodies[1].get("search_after").is_none());
	assert_eq!(bodies[1]["sort"], serde_json::json!([{ "reference.keyword": "asc" }]));
	assert_eq!(bodies[2]["search_after"], serde_json::json!(["1001"]));
	assert_eq!(bodies[3]["search_after"], serde_json::json!(["1002"]));
	assert_eq!(bodies[4]["search_after"], serde_json::json!(["1003"]));

	let migrated = harness.store.case(1_001).expect("case");

	assert_eq!(migrated.field("applicantFullName"), Some(&CaseValue::from("Jo")));
	assert_eq!(migrated.field("migrationId"), Some(&CaseValue::from("rename-name")));
}

#[tokio::test]
async fn every_store_call_presents_a_fresh_service_token() {
	let harness = Harness::new(named_cases(2));
	let orchestrator = MigrationOrchestrator::new(harness.collaborators(), sequential(10));

	orchestrator.run(request(rename(), MigrationTarget::Query)).await.expect("run failed");

	let tokens = harness.store.service_tokens();
	let unique = tokens.iter().collect::<HashSet<_>>();

	assert_eq!(tokens.len(), harness.tokens.count());
	assert_eq!(unique.len(), tokens.len());
}

#[tokio::test]
async fn second_run_over_migrated_cases_submits_nothing() {
	let harness = Harness::new(named_cases(4));
	let orchestrator = MigrationOrchestrator::new(harness.collaborators(), sequential(2));

	orchestrator.run(request(rename(), MigrationTarget::Query)).await.expect("first run failed");

	let second =
		orchestrator.run(request(rename(), MigrationTarget::Query)).await.expect("second run");

	assert_eq!(second.total, 0);
	assert!(second.migrated_ids.is_empty());
	assert_eq!(harness.store.submits(), 4);
}

#[tokio::test]
async fn predicate_guards_records_the_query_still_matches() {
	let store = named_cases(2);

	store.insert(
		CaseRecord::new(1_003, "PUBLICLAW", CASE_TYPE)
			.with_field("applicantName", "Al")
			.with_field("applicantFullName", "Al Smith"),
	);

	let rename = rename_field("rename-name", "applicantName", "applicantFullName")
		.expect("definition");
	let broad = Arc::new(MigrationDefinition { query: QueryClause::match_all(), ..rename });
	let harness = Harness::new(store);
	let orchestrator = MigrationOrchestrator::new(harness.collaborators(), sequential(10));
	let result = orchestrator.run(request(broad, MigrationTarget::Query)).await.expect("run");

	assert_eq!(result.skipped_ids, vec![1_003]);
	assert_eq!(harness.store.submits(), 2);
	assert_eq!(
		harness.store.case(1_003).expect("case").field("applicantName"),
		Some(&CaseValue::from("Al"))
	);
}

#[tokio::test]
async fn record_failures_are_isolated_sequentially() {
	let store = named_cases(5);

	store.fail_submit(1_002);
	store.fail_start(1_004);

	let harness = Harness::new(store);
	let orchestrator = MigrationOrchestrator::new(harness.collaborators(), sequential(2));
	let result = orchestrator.run(request(rename(), MigrationTarget::Query)).await.expect("run");

	assert_eq!(sorted(result.migrated_ids.clone()), vec![1_001, 1_003, 1_005]);
	assert_eq!(sorted(result.failed_ids.clone()), vec![1_002, 1_004]);
	assert_eq!(result.processed(), 5);
	assert!(!result.is_clean());
}

#[tokio::test]
async fn record_failures_are_isolated_in_parallel() {
	let store = named_cases(6);

	store.fail_submit(1_002);
	store.fail_submit(1_005);

	let harness = Harness::new(store);
	let orchestrator = MigrationOrchestrator::new(harness.collaborators(), parallel(3, 3));
	let result = orchestrator.run(request(rename(), MigrationTarget::Query)).await.expect("run");
	let migrated = result.migrated_ids.iter().collect::<HashSet<_>>();

	assert_eq!(sorted(result.migrated_ids.clone()), vec![1_001, 1_003, 1_004, 1_006]);
	assert_eq!(sorted(result.failed_ids.clone()), vec![1_002, 1_005]);
	assert!(result.failed_ids.iter().all(|id| !migrated.contains(id)));
}

#[tokio::test]
async fn parallel_run_stays_within_worker_budget() {
	let store = named_cases(8);

	store.delay_starts(Duration::from_millis(20));

	let harness = Harness::new(store);
	let orchestrator = MigrationOrchestrator::new(harness.collaborators(), parallel(8, 2));
	let result = orchestrator.run(request(rename(), MigrationTarget::Query)).await.expect("run");

	assert_eq!(result.migrated_ids.len(), 8);
	assert_eq!(harness.store.max_in_flight(), 2);
}

#[tokio::test]
async fn parallel_pages_are_joined_before_the_next_search() {
	let store = named_cases(9);

	store.delay_starts(Duration::from_millis(10));

	let harness = Harness::new(store);
	let orchestrator = MigrationOrchestrator::new(harness.collaborators(), parallel(3, 3));
	let result = orchestrator.run(request(rename(), MigrationTarget::Query)).await.expect("run");

	assert_eq!(result.migrated_ids.len(), 9);
	assert_eq!(harness.store.searches(), 5);
	assert_eq!(harness.store.searches_during_starts(), 0);
}

#[tokio::test]
async fn candidate_added_after_sizing_is_still_migrated() {
	let store = named_cases(3);

	store.insert_after_search(
		1,
		CaseRecord::new(1_004, "PUBLICLAW", CASE_TYPE).with_field("applicantName", "Jo"),
	);

	let harness = Harness::new(store);
	let orchestrator = MigrationOrchestrator::new(harness.collaborators(), sequential(1));
	let result = orchestrator.run(request(rename(), MigrationTarget::Query)).await.expect("run");

	assert_eq!(result.migrated_ids, vec![1_001, 1_002, 1_003, 1_004]);
	assert_eq!(result.total, 4);
	assert!(result.is_clean());
}

#[tokio::test]
async fn repeated_cursor_hits_do_not_end_paging_early() {
	let store = named_cases(4);

	store.repeat_cursor_hit();

	let harness = Harness::new(store);
	let orchestrator = MigrationOrchestrator::new(harness.collaborators(), sequential(2));
	let result = orchestrator.run(request(rename(), MigrationTarget::Query)).await.expect("run");

	assert_eq!(result.migrated_ids, vec![1_001, 1_002, 1_003, 1_004]);
	assert_eq!(harness.store.starts(), 4);
	assert!(result.is_clean());
}

#[tokio::test]
async fn multiple_case_types_are_rejected_before_any_remote_call() {
	for case_type in [Some("A,B"), None, Some("  ")] {
		let harness = Harness::new(named_cases(2));
		let orchestrator = MigrationOrchestrator::new(harness.collaborators(), sequential(10));
		let mut request = request(rename(), MigrationTarget::Query);

		request.case_type = case_type.map(str::to_string);

		let err = orchestrator.run(request).await.expect_err("Expected configuration error.");

		assert!(err.is_configuration(), "{case_type:?} produced {err}");
		assert_eq!(harness.remote_calls(), 0);
	}
}

#[tokio::test]
async fn missing_credentials_are_rejected_before_any_remote_call() {
	let harness = Harness::new(named_cases(1));
	let orchestrator = MigrationOrchestrator::new(harness.collaborators(), sequential(10));
	let mut request = request(rename(), MigrationTarget::Query);

	request.password = Some(" ".to_string());

	let err = orchestrator.run(request).await.expect_err("Expected configuration error.");

	assert!(err.is_configuration());
	assert_eq!(harness.remote_calls(), 0);
}

#[tokio::test]
async fn zero_page_size_is_a_configuration_error() {
	let harness = Harness::new(named_cases(1));
	let orchestrator = MigrationOrchestrator::new(harness.collaborators(), parallel(0, 2));
	let err = orchestrator
		.run(request(rename(), MigrationTarget::Query))
		.await
		.expect_err("Expected configuration error.");

	assert!(err.is_configuration());
	assert_eq!(harness.remote_calls(), 0);
}

#[tokio::test]
async fn explicit_id_rejected_by_predicate_is_never_submitted() {
	let migrated =
		CaseRecord::new(101, "PUBLICLAW", CASE_TYPE).with_field("applicantFullName", "Jo Smith");
	let harness = Harness::new(InMemoryCaseStore::with_cases([migrated]));
	let orchestrator = MigrationOrchestrator::new(harness.collaborators(), sequential(10));
	let result = orchestrator
		.run(request(rename(), MigrationTarget::CaseIds(vec!["101".to_string()])))
		.await
		.expect("run");

	assert_eq!(result.skipped_ids, vec![101]);
	assert_eq!(harness.store.submits(), 0);
	assert_eq!(harness.store.searches(), 0);
	assert_eq!(harness.store.lookups(), 1);
}

#[tokio::test]
async fn explicit_ids_bypass_the_cursor() {
	let harness = Harness::new(named_cases(3));
	let orchestrator = MigrationOrchestrator::new(harness.collaborators(), sequential(2));
	let ids = ["1003", "1001", "9999"].map(str::to_string).to_vec();
	let result = orchestrator.run(request(rename(), MigrationTarget::CaseIds(ids))).await;
	let result = result.expect("run");

	assert_eq!(result.total, 3);
	assert_eq!(sorted(result.migrated_ids.clone()), vec![1_001, 1_003]);
	assert_eq!(result.failed_ids, vec![9_999]);
	assert_eq!(harness.store.searches(), 0);
}

#[tokio::test]
async fn empty_id_list_makes_no_remote_calls() {
	let harness = Harness::new(named_cases(3));
	let orchestrator = MigrationOrchestrator::new(harness.collaborators(), sequential(10));
	let result = orchestrator
		.run(request(rename(), MigrationTarget::CaseIds(Vec::new())))
		.await
		.expect("run");

	assert_eq!(result.total, 0);
	assert_eq!(result.processed(), 0);
	assert_eq!(harness.remote_calls(), 0);
}

#[tokio::test]
async fn non_numeric_case_id_is_a_configuration_error() {
	let harness = Harness::new(named_cases(1));
	let orchestrator = MigrationOrchestrator::new(harness.collaborators(), sequential(10));
	let err = orchestrator
		.run(request(rename(), MigrationTarget::CaseIds(vec!["12ab".to_string()])))
		.await
		.expect_err("Expected configuration error.");

	assert!(err.is_configuration());
	assert_eq!(harness.remote_calls(), 0);
}

#[tokio::test]
async fn sizing_probe_failure_aborts_the_run() {
	let store = named_cases(2);

	store.fail_search_call(1);

	let harness = Harness::new(store);
	let orchestrator = MigrationOrchestrator::new(harness.collaborators(), sequential(10));
	let err = orchestrator
		.run(request(rename(), MigrationTarget::Query))
		.await
		.expect_err("Expected search error.");

	assert!(matches!(err, Error::Search { .. }));
	assert_eq!(harness.store.starts(), 0);
}

#[tokio::test]
async fn later_page_search_failure_keeps_prior_outcomes() {
	let store = named_cases(3);

	// Probe, first page, then the failing next page.
	store.fail_search_call(3);

	let harness = Harness::new(store);
	let orchestrator = MigrationOrchestrator::new(harness.collaborators(), sequential(1));
	let result = orchestrator.run(request(rename(), MigrationTarget::Query)).await.expect("run");

	assert_eq!(result.migrated_ids, vec![1_001]);
	assert_eq!(result.total, 3);
	assert!(result.interruption.is_some());
	assert!(!result.is_clean());
	assert_eq!(harness.store.submits(), 1);
}

#[tokio::test]
async fn empty_candidate_set_is_success() {
	let harness = Harness::new(InMemoryCaseStore::new());
	let orchestrator = MigrationOrchestrator::new(harness.collaborators(), sequential(10));
	let result = orchestrator.run(request(rename(), MigrationTarget::Query)).await.expect("run");

	assert_eq!(result.total, 0);
	assert!(result.is_clean());
	assert_eq!(harness.store.searches(), 1);
}

#[tokio::test]
async fn max_cases_caps_attempted_records() {
	let harness = Harness::new(named_cases(5));
	let options = RunOptions { max_cases: Some(3), ..sequential(2) };
	let orchestrator = MigrationOrchestrator::new(harness.collaborators(), options);
	let result = orchestrator.run(request(rename(), MigrationTarget::Query)).await.expect("run");

	assert_eq!(sorted(result.migrated_ids.clone()), vec![1_001, 1_002, 1_003]);
	assert_eq!(harness.store.starts(), 3);
	assert_eq!(harness.store.searches(), 3);
}

#[tokio::test]
async fn rollback_restores_the_original_field() {
	let harness = Harness::new(named_cases(2));
	let orchestrator = MigrationOrchestrator::new(harness.collaborators(), sequential(10));

	orchestrator.run(request(rename(), MigrationTarget::Query)).await.expect("forward run");

	let rollback = rename_field("rename-name-rollback", "applicantFullName", "applicantName")
		.expect("definition")
		.rollback();
	let result = orchestrator
		.run(request(Arc::new(rollback), MigrationTarget::Query))
		.await
		.expect("rollback run");
	let restored = harness.store.case(1_002).expect("case");

	assert_eq!(result.migrated_ids.len(), 2);
	assert!(result.to_string().contains("Rolled back cases: 1001, 1002"));
	assert_eq!(restored.field("applicantName"), Some(&CaseValue::from("Jo")));
	assert!(restored.field("applicantFullName").is_none());
}

#[tokio::test]
async fn search_requests_serialize_the_wire_contract() {
	let harness = Harness::new(named_cases(1));
	let orchestrator = MigrationOrchestrator::new(harness.collaborators(), sequential(50));

	orchestrator.run(request(rename(), MigrationTarget::Query)).await.expect("run");

	let page = &harness.store.search_bodies()[1];
	let mut keys = page.as_object().expect("object").keys().cloned().collect::<Vec<_>>();

	keys.sort();

	assert_eq!(keys, ["_source", "from", "query", "size", "sort", "track_total_hits"]);
	assert_eq!(page["_source"], serde_json::json!(["reference", "jurisdiction"]));
	assert_eq!(page["size"], Value::from(50));
	assert_eq!(page["track_total_hits"], Value::Bool(true));
}
