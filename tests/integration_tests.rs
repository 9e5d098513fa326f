use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use r_session::{
    FnLoader, IdentityLoader, KvStore, MemoryStore, RSessionBuilder, RSessionError,
    RSessionManager, RUser, StoreOp, UserLoader,
};

fn manager(store: &MemoryStore) -> RSessionManager {
    RSessionBuilder::new()
        .build(Arc::new(store.clone()))
        .expect("build failed")
}

fn counting_loader(calls: Arc<AtomicUsize>) -> Arc<dyn UserLoader> {
    Arc::new(FnLoader::new(move |id: &str| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(RUser::with_detail(id, "x".into())))
    }))
}

#[tokio::test]
async fn issue_then_check_returns_user() {
    let manager = manager(&MemoryStore::new());

    let token = manager.issue_token("u1", 60).await.expect("issue failed");
    assert!(token.starts_with("u1_"));

    let user = manager
        .check_token(&token)
        .await
        .expect("check failed")
        .expect("token should be live");
    assert_eq!(user.id, "u1");

    let lease = user.lease.expect("lease should be attached");
    assert_eq!(lease.token, token);
    assert!(lease.remaining_ttl <= 60 && lease.remaining_ttl > 55);
}

#[tokio::test]
async fn tokens_are_unique() {
    let manager = manager(&MemoryStore::new());
    let a = manager.issue_token("u1", 60).await.expect("issue failed");
    let b = manager.issue_token("u1", 60).await.expect("issue failed");
    assert_ne!(a, b);
    assert_eq!(a.len(), "u1_".len() + 32);
}

#[tokio::test]
async fn revoke_then_check_is_absent() {
    let manager = manager(&MemoryStore::new());
    let token = manager.issue_token("u1", 60).await.expect("issue failed");

    manager.revoke_token(&token).await.expect("revoke failed");
    assert!(manager.check_token(&token).await.expect("check failed").is_none());
    assert!(
        manager
            .list_user_tokens("u1")
            .await
            .expect("list failed")
            .is_empty()
    );

    // revoking again is fine
    manager.revoke_token(&token).await.expect("second revoke failed");
}

#[tokio::test]
async fn token_expires_after_ttl() {
    let manager = manager(&MemoryStore::new());
    let token = manager.issue_token("u1", 5).await.expect("issue failed");

    let user = manager
        .check_token(&token)
        .await
        .expect("check failed")
        .expect("token should be live");
    let lease = user.lease.expect("lease should be attached");
    assert!(lease.remaining_ttl <= 5);

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(manager.check_token(&token).await.expect("check failed").is_none());
}

#[tokio::test]
async fn token_with_one_second_left_is_treated_as_expired() {
    let store = MemoryStore::new();
    let manager = manager(&store);
    let token = manager.issue_token("u1", 1).await.expect("issue failed");

    assert!(manager.check_token(&token).await.expect("check failed").is_none());
    // the stale index entry is purged by the check
    assert_eq!(
        store.hget("go-t_u1", &token).await.expect("hget failed"),
        None
    );
}

#[tokio::test]
async fn single_mode_keeps_only_newest_token() {
    let store = MemoryStore::new();
    let manager = RSessionBuilder::new()
        .single_mode(true)
        .build(Arc::new(store.clone()))
        .expect("build failed");

    let first = manager.issue_token("u1", 60).await.expect("issue failed");
    let second = manager.issue_token("u1", 60).await.expect("issue failed");

    let tokens = manager.list_user_tokens("u1").await.expect("list failed");
    assert_eq!(tokens, vec![second.clone()]);
    assert!(manager.check_token(&first).await.expect("check failed").is_none());
    assert!(manager.check_token(&second).await.expect("check failed").is_some());
}

#[tokio::test]
async fn multi_mode_keeps_every_token() {
    let manager = manager(&MemoryStore::new());
    let short = manager.issue_token("u1", 30).await.expect("issue failed");
    let long = manager.issue_token("u1", 90).await.expect("issue failed");
    let middle = manager.issue_token("u1", 60).await.expect("issue failed");

    let tokens = manager.list_user_tokens("u1").await.expect("list failed");
    assert_eq!(tokens, vec![short, middle, long]);
}

#[tokio::test]
async fn list_sweeps_stale_index_entries() {
    let store = MemoryStore::new();
    let manager = manager(&store);
    let live = manager.issue_token("u1", 60).await.expect("issue failed");

    // an index entry whose recorded expiry has already passed
    store
        .exec_atomic(&[StoreOp::HSet {
            key: "go-t_u1".to_string(),
            field: "u1_stale".to_string(),
            value: "1000".to_string(),
        }])
        .await
        .expect("hset failed");

    let tokens = manager.list_user_tokens("u1").await.expect("list failed");
    assert_eq!(tokens, vec![live.clone()]);

    let index = store.hgetall("go-t_u1").await.expect("hgetall failed");
    assert_eq!(index.len(), 1);
    assert!(index.contains_key(&live));
}

#[tokio::test]
async fn refresh_pins_ttl_instead_of_accumulating() {
    let store = MemoryStore::new();
    let manager = manager(&store);
    let token = manager.issue_token("u1", 10).await.expect("issue failed");
    let token_key = format!("go-t_{token}");

    assert!(manager.refresh_token(&token, 100).await.expect("refresh failed"));
    let after_first = store
        .ttl(&token_key)
        .await
        .expect("ttl failed")
        .unwrap_or_default();
    assert!(after_first > 10 && after_first <= 100);

    assert!(manager.refresh_token(&token, 100).await.expect("refresh failed"));
    let after_second = store
        .ttl(&token_key)
        .await
        .expect("ttl failed")
        .unwrap_or_default();
    assert!(after_second <= 100, "ttl accumulated to {after_second}");

    let user = manager
        .check_token(&token)
        .await
        .expect("check failed")
        .expect("token should be live");
    let lease = user.lease.expect("lease should be attached");
    assert!(lease.expire_at > chrono::Utc::now().timestamp() + 90);
}

#[tokio::test]
async fn refresh_of_revoked_token_reports_false() {
    let manager = manager(&MemoryStore::new());
    let token = manager.issue_token("u1", 60).await.expect("issue failed");
    manager.revoke_token(&token).await.expect("revoke failed");

    assert!(!manager.refresh_token(&token, 60).await.expect("refresh failed"));
    assert!(manager.check_token(&token).await.expect("check failed").is_none());
}

#[tokio::test]
async fn loader_fills_cache_once() {
    let store = MemoryStore::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let manager = RSessionBuilder::new()
        .shared_loader(counting_loader(calls.clone()))
        .build(Arc::new(store.clone()))
        .expect("build failed");
    let token = manager.issue_token("u1", 60).await.expect("issue failed");

    let first = manager
        .check_token_and_load_user(&token, 60)
        .await
        .expect("check failed")
        .expect("token should be live");
    assert_eq!(first.detail, "x");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let cached = store
        .ttl("go-u_u1")
        .await
        .expect("ttl failed")
        .unwrap_or_default();
    assert!(cached > 55 && cached <= 60);

    let second = manager
        .check_token_and_load_user(&token, 60)
        .await
        .expect("check failed")
        .expect("token should be live");
    assert_eq!(second.detail, "x");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn negative_user_ttl_skips_cache() {
    let store = MemoryStore::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let manager = RSessionBuilder::new()
        .shared_loader(counting_loader(calls.clone()))
        .build(Arc::new(store.clone()))
        .expect("build failed");
    let token = manager.issue_token("u1", 60).await.expect("issue failed");

    let user = manager
        .check_token_and_load_user(&token, -1)
        .await
        .expect("check failed")
        .expect("token should be live");
    assert_eq!(user.detail, serde_json::Value::Null);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.ttl("go-u_u1").await.expect("ttl failed"), None);
}

#[tokio::test]
async fn revoke_user_tokens_removes_records_and_index() {
    let store = MemoryStore::new();
    let manager = manager(&store);
    let mut tokens = Vec::new();
    for _ in 0..3 {
        tokens.push(manager.issue_token("u1", 60).await.expect("issue failed"));
    }
    let other = manager.issue_token("u2", 60).await.expect("issue failed");

    manager.revoke_user_tokens("u1").await.expect("revoke failed");

    for token in &tokens {
        assert_eq!(
            store
                .get_with_ttl(&format!("go-t_{token}"))
                .await
                .expect("get failed"),
            None
        );
    }
    assert_eq!(store.ttl("go-t_u1").await.expect("ttl failed"), None);
    assert!(
        manager
            .list_user_tokens("u1")
            .await
            .expect("list failed")
            .is_empty()
    );
    assert!(manager.check_token(&other).await.expect("check failed").is_some());
}

#[tokio::test]
async fn revoke_user_tokens_without_tokens_is_ok() {
    let manager = manager(&MemoryStore::new());
    manager.revoke_user_tokens("nobody").await.expect("revoke failed");
}

#[tokio::test]
async fn add_refresh_and_forget_users() {
    let store = MemoryStore::new();
    let manager = RSessionBuilder::new()
        .loader(IdentityLoader)
        .build(Arc::new(store.clone()))
        .expect("build failed");

    let user = manager.add_user("u1", 60).await.expect("add failed");
    assert_eq!(user, RUser::new("u1"));

    manager
        .refresh_users(["u2", "u3"], 60)
        .await
        .expect("refresh failed");
    assert!(store.ttl("go-u_u2").await.expect("ttl failed").is_some());
    assert!(store.ttl("go-u_u3").await.expect("ttl failed").is_some());

    manager.forget_user("u1").await.expect("forget failed");
    assert_eq!(store.ttl("go-u_u1").await.expect("ttl failed"), None);
}

#[tokio::test]
async fn add_user_without_loader_is_not_configured() {
    let manager = manager(&MemoryStore::new());
    let err = manager.add_user("u1", 60).await.expect_err("should fail");
    assert!(matches!(err, RSessionError::NotConfigured(_)));
}

#[tokio::test]
async fn custom_prefixes_shape_keys() {
    let store = MemoryStore::new();
    let manager = RSessionBuilder::new()
        .token_prefix("app_t")
        .user_prefix("app_u")
        .loader(IdentityLoader)
        .build(Arc::new(store.clone()))
        .expect("build failed");

    let token = manager.issue_token("u1", 60).await.expect("issue failed");
    manager
        .check_token_and_load_user(&token, 60)
        .await
        .expect("check failed")
        .expect("token should be live");

    assert!(store.ttl(&format!("app-t_{token}")).await.expect("ttl failed").is_some());
    assert!(store.ttl("app-t_u1").await.expect("ttl failed").is_some());
    assert!(store.ttl("app-u_u1").await.expect("ttl failed").is_some());
}

#[tokio::test]
async fn sweeper_cleans_up_after_issue() {
    let store = MemoryStore::new();
    let (manager, sweeper) = RSessionBuilder::new()
        .sweep_on_issue(true)
        .build_with_sweeper(Arc::new(store.clone()))
        .expect("build failed");
    let handle = tokio::spawn(sweeper.run());

    store
        .exec_atomic(&[StoreOp::HSet {
            key: "go-t_u1".to_string(),
            field: "u1_stale".to_string(),
            value: "1000".to_string(),
        }])
        .await
        .expect("hset failed");
    let token = manager.issue_token("u1", 60).await.expect("issue failed");

    drop(manager);
    let purged = handle.await.expect("sweeper task panicked");
    assert_eq!(purged, 1);

    let index = store.hgetall("go-t_u1").await.expect("hgetall failed");
    assert_eq!(index.keys().collect::<Vec<_>>(), vec![&token]);
}

#[tokio::test]
async fn concurrent_issues_are_all_indexed() {
    let manager = manager(&MemoryStore::new());

    let mut handles = Vec::new();
    for _ in 0..10 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            manager.issue_token("u1", 60).await
        }));
    }
    for handle in handles {
        handle.await.expect("task panicked").expect("issue failed");
    }

    let tokens = manager.list_user_tokens("u1").await.expect("list failed");
    assert_eq!(tokens.len(), 10);
}
