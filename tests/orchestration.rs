mod support;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::Utc;

use group_harvester::models::{FailureKind, GroupOutcome, SessionOutcome};
use group_harvester::orchestrator::{PlatformManager, RunMode, RunSource, ScraperRunner};
use group_harvester::session::SessionState;
use group_harvester::store::{MemoryStore, SqliteStore, Store};

use support::{document, post_item, FlakyStore, Harness};

const TWO_GROUPS: &str = r#"{
    "global": {"fetch_interval": 0, "fetch_backoff_ms": 1, "store_backoff_ms": 1},
    "facebook": {
        "enabled": true,
        "users": [{
            "email": "a@x.com",
            "password": "pw",
            "groups": [
                {"group_id": "g1", "config": {"batch_size": 2}},
                {"group_id": "g2", "config": {"batch_size": 2}}
            ]
        }]
    }
}"#;

fn three_posts(harness: &Harness) {
    harness.driver.set_posts(
        "g1",
        vec![
            post_item("101", "g1 דירה להשכרה 1"),
            post_item("102", "g1 דירה להשכרה 2"),
            post_item("103", "g1 דירה להשכרה 3"),
        ],
    );
}

#[tokio::test]
async fn batches_new_posts_and_marks_them_processed() {
    let store = Arc::new(MemoryStore::new());
    let harness = Harness::new(store.clone(), document(TWO_GROUPS));
    three_posts(&harness);

    let sync = harness.manager.init_users_from_config().await.unwrap();
    assert_eq!(sync.users, 1);
    assert_eq!(sync.groups.added, 2);

    let report = harness.manager.run_db_users().await;
    let user = report.user("a@x.com").unwrap();
    assert_eq!(user.session, SessionOutcome::LoggedIn);

    let g1 = user.group("g1").unwrap();
    let g2 = user.group("g2").unwrap();
    assert_eq!(g1.classify_calls, 2);
    assert_eq!(g1.classified, 3);
    assert_eq!(g1.saved, 3);
    assert_eq!(g2.classify_calls, 0);
    assert_eq!(g2.fetched, 0);

    assert_eq!(harness.classifier.calls_containing("g1 "), 2);
    assert_eq!(store.processed_count("g1"), 3);
    assert_eq!(store.listing_count("g1"), 3);
    assert_eq!(store.processed_count("g2"), 0);
}

#[tokio::test]
async fn second_cycle_reuses_session_and_skips_processed_posts() {
    let store = Arc::new(MemoryStore::new());
    let harness = Harness::new(store.clone(), document(TWO_GROUPS));
    three_posts(&harness);
    harness.manager.init_users_from_config().await.unwrap();

    harness.manager.run_db_users().await;
    let report = harness.manager.run_db_users().await;

    let user = report.user("a@x.com").unwrap();
    assert_eq!(user.session, SessionOutcome::Restored);
    let g1 = user.group("g1").unwrap();
    assert_eq!(g1.deduped, 3);
    assert_eq!(g1.classify_calls, 0);

    assert_eq!(harness.classifier.call_count(), 2);
    assert_eq!(harness.driver.state.logins.load(Ordering::SeqCst), 1);
    assert_eq!(harness.driver.state.restores.load(Ordering::SeqCst), 1);
    assert_eq!(store.listing_count("g1"), 3);
}

#[tokio::test]
async fn rejected_session_expires_aborts_groups_and_logs_in_again() {
    let config = r#"{
        "global": {"fetch_interval": 0, "fetch_backoff_ms": 1, "store_backoff_ms": 1},
        "facebook": {
            "enabled": true,
            "users": [{
                "email": "a@x.com",
                "password": "pw",
                "settings": {"group_concurrency": 1},
                "groups": [{"group_id": "g1"}, {"group_id": "g2"}]
            }]
        }
    }"#;
    let store = Arc::new(MemoryStore::new());
    let harness = Harness::new(store.clone(), document(config));
    harness.manager.init_users_from_config().await.unwrap();
    store
        .save_session("facebook", "a@x.com", "stored-cookies", Utc::now())
        .await
        .unwrap();

    three_posts(&harness);
    harness.driver.set_posts("g2", vec![post_item("201", "g2 דירה")]);
    harness.driver.reject_group("g1");

    let report = harness.manager.run_db_users().await;
    let user = report.user("a@x.com").unwrap();

    let g1 = user.group("g1").unwrap();
    let g2 = user.group("g2").unwrap();
    assert_eq!(g1.outcome, GroupOutcome::SessionRejected);
    assert!(g1.has_failure(FailureKind::SessionRejected));
    assert_eq!(g2.outcome, GroupOutcome::SessionRejected);
    assert_eq!(harness.classifier.call_count(), 0);
    assert_eq!(store.processed_count("g2"), 0);

    assert_eq!(user.session, SessionOutcome::Renewed);
    let transitions = harness.manager.browsers().session_transitions("a@x.com");
    assert_eq!(
        transitions,
        vec![
            SessionState::Active,
            SessionState::Expired,
            SessionState::Pending,
            SessionState::Active
        ]
    );

    // 下个周期正常抓取
    harness.driver.accept_all();
    let report = harness.manager.run_db_users().await;
    let user = report.user("a@x.com").unwrap();
    assert_eq!(user.group("g1").unwrap().outcome, GroupOutcome::Completed);
    assert_eq!(store.processed_count("g1"), 3);
    assert_eq!(store.processed_count("g2"), 1);
}

#[tokio::test]
async fn failed_item_is_retried_next_cycle_then_poisoned() {
    let config = r#"{
        "global": {"fetch_interval": 0, "fetch_backoff_ms": 1, "store_backoff_ms": 1},
        "facebook": {
            "enabled": true,
            "users": [{
                "email": "a@x.com",
                "groups": [{"group_id": "g1", "config": {"batch_size": 3, "max_classify_attempts": 1}}]
            }]
        }
    }"#;
    let store = Arc::new(MemoryStore::new());
    let harness = Harness::new(store.clone(), document(config));
    harness.manager.init_users_from_config().await.unwrap();
    harness.driver.set_posts(
        "g1",
        vec![
            post_item("1", "דירה להשכרה ברמת גן"),
            post_item("2", "דירה FAIL"),
            post_item("3", "חדר בשכונה"),
        ],
    );

    let report = harness.manager.run_db_users().await;
    let g1 = report.user("a@x.com").unwrap().group("g1").unwrap().clone();
    assert_eq!(g1.classified, 2);
    assert_eq!(g1.failed, 1);
    assert_eq!(g1.failures[0].kind, FailureKind::ClassificationFailure);
    assert_eq!(g1.failures[0].post_id.as_deref(), Some("2"));
    assert_eq!(store.processed_count("g1"), 2);
    assert_eq!(store.failure_count("g1", "2"), 1);

    // 第二个周期只重试失败的那条，失败次数超过上限后按已处理放弃
    let report = harness.manager.run_db_users().await;
    let g1 = report.user("a@x.com").unwrap().group("g1").unwrap().clone();
    assert_eq!(harness.classifier.call_count(), 2);
    assert_eq!(harness.classifier.calls.lock()[1], vec!["דירה FAIL".to_string()]);
    assert_eq!(g1.poisoned, 1);
    assert_eq!(store.failure_count("g1", "2"), 2);
    assert_eq!(store.processed_count("g1"), 3);
    assert_eq!(store.listing_count("g1"), 2);

    harness.manager.run_db_users().await;
    assert_eq!(harness.classifier.call_count(), 2);
}

#[tokio::test]
async fn crash_before_mark_reprocesses_without_duplicate_listings() {
    let memory = Arc::new(MemoryStore::new());
    let flaky = Arc::new(FlakyStore::new(memory.clone()));
    let harness = Harness::new(flaky.clone(), document(TWO_GROUPS));
    harness.manager.init_users_from_config().await.unwrap();
    three_posts(&harness);

    flaky.fail_marks.store(true, Ordering::SeqCst);
    let report = harness.manager.run_db_users().await;
    let g1 = report.user("a@x.com").unwrap().group("g1").unwrap().clone();
    assert_eq!(g1.classified, 0);
    assert!(g1.has_failure(FailureKind::StoreWriteFailure));
    assert_eq!(memory.processed_count("g1"), 0);
    assert_eq!(memory.listing_count("g1"), 3);

    flaky.fail_marks.store(false, Ordering::SeqCst);
    let report = harness.manager.run_db_users().await;
    let g1 = report.user("a@x.com").unwrap().group("g1").unwrap().clone();
    assert_eq!(g1.classified, 3);
    assert_eq!(memory.processed_count("g1"), 3);
    assert_eq!(memory.listing_count("g1"), 3);
    assert_eq!(harness.classifier.call_count(), 4);
}

#[tokio::test]
async fn one_session_per_user_and_one_tab_per_group() {
    let config = r#"{
        "global": {"fetch_interval": 0},
        "facebook": {
            "enabled": true,
            "defaults": {"max_concurrent_users": 2},
            "users": [
                {"email": "a@x.com", "groups": [{"group_id": "a1"}, {"group_id": "a2"}, {"group_id": "a3"}]},
                {"email": "b@x.com", "groups": [{"group_id": "b1"}, {"group_id": "b2"}]}
            ]
        }
    }"#;
    let store = Arc::new(MemoryStore::new());
    let harness = Harness::new(store, document(config));
    harness.manager.init_users_from_config().await.unwrap();
    for (i, group) in ["a1", "a2", "a3", "b1", "b2"].into_iter().enumerate() {
        harness
            .driver
            .set_posts(group, vec![post_item(&format!("{}", 500 + i), "דירה")]);
    }

    let report = harness.manager.run_db_users().await;
    assert_eq!(report.users.len(), 2);
    assert_eq!(report.totals().saved, 5);

    let driver = &harness.driver;
    assert_eq!(driver.peak_sessions("a@x.com"), 1);
    assert_eq!(driver.peak_sessions("b@x.com"), 1);
    assert!(driver.peak_tabs("a@x.com") <= 3);
    assert!(driver.peak_tabs("b@x.com") <= 2);
    assert_eq!(driver.open_sessions("a@x.com"), 0);
    assert_eq!(driver.open_tabs("a@x.com"), 0);
    assert_eq!(driver.open_tabs("b@x.com"), 0);

    let browsers = harness.manager.browsers();
    assert!(browsers.peak_session_count() <= 2);
    assert_eq!(browsers.open_session_count(), 0);
}

#[tokio::test]
async fn login_failure_is_reported_and_not_fatal() {
    let store = Arc::new(MemoryStore::new());
    let harness = Harness::new(store.clone(), document(TWO_GROUPS));
    harness.manager.init_users_from_config().await.unwrap();
    harness.driver.fail_logins(true);
    three_posts(&harness);

    let report = harness.manager.run_db_users().await;
    let user = report.user("a@x.com").unwrap();
    assert!(matches!(user.session, SessionOutcome::LoginFailed(_)));
    assert!(user
        .groups
        .iter()
        .all(|g| g.outcome == GroupOutcome::Skipped && g.has_failure(FailureKind::LoginFailure)));
    assert_eq!(report.totals().login_failures, 1);

    assert_eq!(
        harness.manager.browsers().session_transitions("a@x.com"),
        vec![SessionState::Absent, SessionState::Pending, SessionState::Absent]
    );
    assert_eq!(harness.driver.open_sessions("a@x.com"), 0);
    assert!(store.get_session("facebook", "a@x.com").await.unwrap().map_or(true, |r| r.blob.is_none()));

    // 下个周期重新尝试
    harness.driver.fail_logins(false);
    let report = harness.manager.run_db_users().await;
    assert_eq!(report.user("a@x.com").unwrap().session, SessionOutcome::LoggedIn);
    assert_eq!(store.processed_count("g1"), 3);
}

#[tokio::test]
async fn user_filter_and_users_without_groups() {
    let config = r#"{
        "facebook": {
            "enabled": true,
            "users": [
                {"email": "a@x.com", "groups": [{"group_id": "g1"}]},
                {"email": "b@x.com", "groups": [{"group_id": "g2"}]},
                {"email": "c@x.com", "groups": []}
            ]
        }
    }"#;
    let store = Arc::new(MemoryStore::new());
    let everyone = Harness::new(store.clone(), document(config));
    everyone.manager.init_users_from_config().await.unwrap();
    let report = everyone.manager.run_db_users().await;
    assert_eq!(report.users.len(), 2);
    assert!(report.user("c@x.com").is_none());

    let only_b = Harness::with_filter(store, document(config), Some("b@x.com"));
    let report = only_b.manager.run_db_users().await;
    assert_eq!(report.users.len(), 1);
    assert!(report.user("b@x.com").is_some());
}

#[tokio::test]
async fn config_sync_removes_unlisted_groups() {
    let store = Arc::new(MemoryStore::new());
    let harness = Harness::new(store.clone(), document(TWO_GROUPS));
    harness.manager.init_users_from_config().await.unwrap();

    let trimmed = r#"{
        "facebook": {
            "enabled": true,
            "users": [{
                "email": "a@x.com",
                "groups": [
                    {"group_id": "g2", "config": {"batch_size": 2}},
                    {"group_id": "g3"}
                ]
            }]
        }
    }"#;
    let resync = Harness::new(store.clone(), document(trimmed));
    let sync = resync.manager.init_users_from_config().await.unwrap();
    assert_eq!(sync.groups.added, 1);
    assert_eq!(sync.groups.updated, 0);
    assert_eq!(sync.groups.removed, 1);

    // 覆盖配置变化算作更新
    let retuned = trimmed.replace(r#""batch_size": 2"#, r#""batch_size": 5"#);
    let sync = Harness::new(store.clone(), document(&retuned))
        .manager
        .init_users_from_config()
        .await
        .unwrap();
    assert_eq!(sync.groups.added, 0);
    assert_eq!(sync.groups.updated, 1);
    assert_eq!(sync.groups.removed, 0);

    let groups = store.get_groups("facebook", "a@x.com").await.unwrap();
    let ids: Vec<&str> = groups.iter().map(|g| g.group_id.as_str()).collect();
    assert_eq!(ids, vec!["g2", "g3"]);

    // 同步不会清掉已有的会话
    store
        .save_session("facebook", "a@x.com", "cookies", Utc::now())
        .await
        .unwrap();
    resync.manager.init_users_from_config().await.unwrap();
    let session = store.get_session("facebook", "a@x.com").await.unwrap().unwrap();
    assert_eq!(session.blob.as_deref(), Some("cookies"));
}

#[tokio::test]
async fn runner_runs_bounded_cycles_from_config_and_cleans_up() {
    let store = Arc::new(MemoryStore::new());
    let doc = document(TWO_GROUPS);
    let harness = Harness::new(store.clone(), doc.clone());
    three_posts(&harness);

    let managers: Vec<Arc<dyn PlatformManager>> = vec![harness.manager.clone()];
    let runner = ScraperRunner::from_managers(doc, managers);
    let summary = runner
        .run(RunMode {
            source: RunSource::Config,
            cycles: Some(2),
            sync: false,
        })
        .await;

    assert_eq!(summary.cycles, 2);
    assert_eq!(summary.totals.saved, 3);
    assert_eq!(summary.totals.groups, 4);
    assert_eq!(summary.last_reports.len(), 1);
    assert_eq!(store.processed_count("g1"), 3);
    assert_eq!(harness.manager.browsers().open_session_count(), 0);
}

#[tokio::test]
async fn sqlite_store_keeps_dedup_state_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("harvester.db");
    let url = path.to_str().unwrap().to_string();

    {
        let store = Arc::new(SqliteStore::open(&url).unwrap());
        let harness = Harness::new(store, document(TWO_GROUPS));
        harness.manager.init_users_from_config().await.unwrap();
        three_posts(&harness);
        let report = harness.manager.run_db_users().await;
        assert_eq!(report.user("a@x.com").unwrap().group("g1").unwrap().saved, 3);
    }

    // 重启：新的存储实例、新的进程内状态
    let store = Arc::new(SqliteStore::open(&url).unwrap());
    let harness = Harness::new(store.clone(), document(TWO_GROUPS));
    three_posts(&harness);
    let report = harness.manager.run_db_users().await;
    let user = report.user("a@x.com").unwrap();
    assert_eq!(user.session, SessionOutcome::Restored);
    assert_eq!(user.group("g1").unwrap().deduped, 3);
    assert_eq!(harness.classifier.call_count(), 0);
    assert_eq!(store.get_processed_ids("g1").await.unwrap().len(), 3);
}

#[tokio::test]
async fn hung_fetch_is_abandoned_without_stalling_sibling_group() {
    let config = r#"{
        "global": {
            "fetch_interval": 0,
            "fetch_timeout_secs": 1,
            "fetch_attempts": 2,
            "fetch_backoff_ms": 1,
            "store_backoff_ms": 1
        },
        "facebook": {
            "enabled": true,
            "users": [{
                "email": "a@x.com",
                "password": "pw",
                "groups": [{"group_id": "slow"}, {"group_id": "g2"}]
            }]
        }
    }"#;
    let store = Arc::new(MemoryStore::new());
    let harness = Harness::new(store.clone(), document(config));
    harness.manager.init_users_from_config().await.unwrap();
    harness.driver.hang_group("slow");
    harness.driver.set_posts("g2", vec![post_item("201", "g2 דירה להשכרה")]);

    let started = std::time::Instant::now();
    let report = harness.manager.run_db_users().await;
    let elapsed = started.elapsed();

    let user = report.user("a@x.com").unwrap();
    let slow = user.group("slow").unwrap();
    assert_eq!(slow.outcome, GroupOutcome::Abandoned);
    assert!(slow.has_failure(FailureKind::TransientFetch));
    assert_eq!(slow.fetched, 0);

    let g2 = user.group("g2").unwrap();
    assert_eq!(g2.outcome, GroupOutcome::Completed);
    assert_eq!(g2.saved, 1);
    assert_eq!(store.processed_count("g2"), 1);

    // 两次各 1 秒的超时，之后放弃
    assert!(elapsed >= std::time::Duration::from_secs(2));
    assert!(elapsed < std::time::Duration::from_secs(30));
    assert_eq!(harness.driver.open_tabs("a@x.com"), 0);
}

#[tokio::test]
async fn classifier_timeout_counts_as_failure_for_each_post() {
    let config = r#"{
        "global": {"fetch_interval": 0, "classify_timeout_secs": 1, "store_backoff_ms": 1},
        "facebook": {
            "enabled": true,
            "users": [{
                "email": "a@x.com",
                "groups": [{"group_id": "g1", "config": {"batch_size": 2}}]
            }]
        }
    }"#;
    let store = Arc::new(MemoryStore::new());
    let harness = Harness::new(store.clone(), document(config));
    harness.manager.init_users_from_config().await.unwrap();
    harness.driver.set_posts(
        "g1",
        vec![post_item("11", "דירה להשכרה HANG 1"), post_item("12", "דירה להשכרה HANG 2")],
    );

    let report = harness.manager.run_db_users().await;
    let g1 = report.user("a@x.com").unwrap().group("g1").unwrap().clone();
    assert_eq!(g1.classify_calls, 1);
    assert_eq!(g1.failed, 2);
    assert_eq!(
        g1.failures
            .iter()
            .filter(|f| f.kind == FailureKind::ClassificationFailure)
            .count(),
        2
    );
    assert_eq!(store.failure_count("g1", "11"), 1);
    assert_eq!(store.failure_count("g1", "12"), 1);
    assert_eq!(store.processed_count("g1"), 0);
}

#[tokio::test]
async fn session_history_only_keeps_latest_session() {
    let store = Arc::new(MemoryStore::new());
    let harness = Harness::new(store, document(TWO_GROUPS));
    harness.manager.init_users_from_config().await.unwrap();
    three_posts(&harness);

    harness.manager.run_db_users().await;
    assert_eq!(
        harness.manager.browsers().session_transitions("a@x.com"),
        vec![SessionState::Absent, SessionState::Pending, SessionState::Active]
    );

    for _ in 0..10 {
        harness.manager.run_db_users().await;
    }
    assert_eq!(
        harness.manager.browsers().session_transitions("a@x.com"),
        vec![SessionState::Active]
    );
}

#[tokio::test]
async fn session_persist_uses_configured_store_retry() {
    let config = |attempts: u32| {
        format!(
            r#"{{
                "global": {{"fetch_interval": 0, "store_write_attempts": {attempts}, "store_backoff_ms": 1}},
                "facebook": {{
                    "enabled": true,
                    "users": [{{"email": "a@x.com", "password": "pw", "groups": [{{"group_id": "g1"}}]}}]
                }}
            }}"#
        )
    };

    // 重试 5 次能越过 3 次失败，下个周期直接恢复会话
    let flaky = Arc::new(FlakyStore::new(Arc::new(MemoryStore::new())));
    let harness = Harness::new(flaky.clone(), document(&config(5)));
    harness.manager.init_users_from_config().await.unwrap();
    flaky.failing_session_saves.store(3, Ordering::SeqCst);
    harness.manager.run_db_users().await;
    let report = harness.manager.run_db_users().await;
    assert_eq!(report.user("a@x.com").unwrap().session, SessionOutcome::Restored);
    assert_eq!(harness.driver.state.logins.load(Ordering::SeqCst), 1);

    // 只重试 2 次则保存失败，下个周期需要重新登录
    let flaky = Arc::new(FlakyStore::new(Arc::new(MemoryStore::new())));
    let harness = Harness::new(flaky.clone(), document(&config(2)));
    harness.manager.init_users_from_config().await.unwrap();
    flaky.failing_session_saves.store(3, Ordering::SeqCst);
    harness.manager.run_db_users().await;
    let report = harness.manager.run_db_users().await;
    assert_eq!(report.user("a@x.com").unwrap().session, SessionOutcome::LoggedIn);
    assert_eq!(harness.driver.state.logins.load(Ordering::SeqCst), 2);
}
