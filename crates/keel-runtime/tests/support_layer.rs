//! End-to-end tests of the facilities over a file-backed `SQLite` handle.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use keel_audit::{AuditQuery, DecisionInput, DecisionType, LogOptions};
use keel_core::{ConfigStore, MemoryPersistence};
use keel_lifecycle::{
    HealthStatus, InitializeOptions, LifecycleHooks, OverallHealth, ServiceConfig,
    create_lifecycle_service, health_check_all, start_all,
};
use keel_runtime::SupportLayer;
use keel_settings::KeelSettings;
use keel_state::{LoadOptions, SaveOptions, StateSource, StateWarning};
use serde_json::json;

fn settings_in(dir: &tempfile::TempDir) -> KeelSettings {
    let mut settings = KeelSettings::default();
    settings.storage.db_path = dir.path().join("keel.db").to_string_lossy().into_owned();
    settings.storage.pool_size = 2;
    settings
}

#[tokio::test]
async fn state_survives_restart_through_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings_in(&dir);

    {
        let layer = SupportLayer::open(&settings).unwrap();
        let receipt = layer
            .state()
            .save_state(
                layer.config_store(),
                "v-1",
                json!({"orchestratorState": "PROCESSING"}),
                &SaveOptions::default(),
            )
            .await
            .unwrap();
        assert!(receipt.persisted());
    }

    let layer = SupportLayer::open(&settings).unwrap();
    let loaded = layer
        .state()
        .load_state(layer.config_store(), "v-1", &LoadOptions::default())
        .await
        .unwrap();
    assert_eq!(loaded.source, StateSource::Database);
    assert_eq!(loaded.state, Some(json!({"orchestratorState": "PROCESSING"})));

    let again = layer
        .state()
        .load_state(layer.config_store(), "v-1", &LoadOptions::default())
        .await
        .unwrap();
    assert_eq!(again.source, StateSource::Cache);
}

#[tokio::test]
async fn stale_state_in_sqlite_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let layer = SupportLayer::open(&settings_in(&dir)).unwrap();
    let saved_at = Utc::now() - chrono::Duration::hours(25);
    let document = json!({
        "entityId": "v-9",
        "fields": {"orchestratorState": "DONE"},
        "version": 4,
        "savedAt": saved_at,
    });
    layer
        .config_store()
        .unwrap()
        .upsert("orchestrator_state:v-9", &document, saved_at)
        .await
        .unwrap();

    let loaded = layer
        .state()
        .load_state(layer.config_store(), "v-9", &LoadOptions::default())
        .await
        .unwrap();
    assert_eq!(loaded.source, StateSource::None);
    assert!(matches!(loaded.warning, Some(StateWarning::Stale { .. })));
}

#[tokio::test]
async fn audit_round_trip_through_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let layer = SupportLayer::open(&settings_in(&dir)).unwrap();
    let audit = layer.audit();

    let _ = audit
        .log_decision(
            None,
            DecisionInput::new(DecisionType::RoutingDecision, "offline"),
            &LogOptions::default(),
        )
        .await;
    assert_eq!(audit.buffer_size(), 1);
    let offline = audit.buffered_entries().remove(0);

    let receipt = audit
        .log_decision(
            layer.event_log(),
            DecisionInput::new(DecisionType::StageTransition, "advance")
                .entity("v-1")
                .correlation("req-1")
                .context_field("from", json!(2))
                .context_field("to", json!(3)),
            &LogOptions::default(),
        )
        .await;
    assert!(receipt.logged());
    assert_eq!(audit.buffer_size(), 0);

    let all = audit
        .query_audit_trail(layer.event_log(), &AuditQuery::new())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
    let stored = all.iter().find(|e| e.entry_id == offline.entry_id).unwrap();
    assert_eq!(*stored, offline);

    let transitions = audit
        .query_audit_trail(
            layer.event_log(),
            &AuditQuery::new()
                .decision_type(DecisionType::StageTransition)
                .correlation("req-1"),
        )
        .await
        .unwrap();
    assert_eq!(transitions.len(), 1);
    assert_eq!(transitions[0].entry_id, receipt.entry_id);
    assert_eq!(transitions[0].context["to"], 3);
    assert_eq!(transitions[0].outcome, "recorded");
}

#[tokio::test]
async fn services_run_their_lifecycle_and_shut_down_in_reverse() {
    let db = Arc::new(MemoryPersistence::new());
    let layer = SupportLayer::from_settings(&KeelSettings::default()).with_persistence(db.clone());

    for name in ["router", "executor"] {
        let hooks = LifecycleHooks::new()
            .on_init(|ctx| async move {
                let store = ctx
                    .persistence
                    .ok_or_else(|| anyhow::anyhow!("no persistence"))?;
                store.upsert("service:ready", &json!(true), Utc::now()).await?;
                Ok(())
            })
            .on_health(|_| async { anyhow::Ok(HealthStatus::Healthy) });
        let service = create_lifecycle_service(
            ServiceConfig::new(name, |input| async move { anyhow::Ok(input) }).lifecycle(hooks),
        )
        .unwrap();
        let _ = layer.registry().register(service);
    }

    let init = layer.initialize_services(&InitializeOptions::default()).await;
    assert_eq!(init.initialized, ["router", "executor"]);
    assert!(db.config_record("service:ready").is_some());

    let started = start_all(layer.registry()).await;
    assert_eq!(started.started, ["router", "executor"]);

    let health = health_check_all(Some(layer.registry())).await;
    assert_eq!(health.overall, OverallHealth::Healthy);

    let report = layer.shutdown().await;
    assert_eq!(report.stop.stopped, ["executor", "router"]);
    assert!(report.is_clean());
    assert!(layer.registry().get("router").is_some_and(|s| !s.is_initialized()));
}

#[tokio::test(start_paused = true)]
async fn slow_service_does_not_block_others() {
    let layer = SupportLayer::from_settings(&KeelSettings::default());
    let slow = create_lifecycle_service(
        ServiceConfig::new("slow", |input| async move { anyhow::Ok(input) }).lifecycle(
            LifecycleHooks::new().on_init(|ctx| async move {
                ctx.cancel.cancelled().await;
                anyhow::bail!("cancelled")
            }),
        ),
    )
    .unwrap();
    let fast = create_lifecycle_service(
        ServiceConfig::new("fast", |input| async move { anyhow::Ok(input) })
            .lifecycle(LifecycleHooks::new().on_init(|_| async { anyhow::Ok(()) })),
    )
    .unwrap();
    let _ = layer.registry().register(slow);
    let _ = layer.registry().register(fast);

    let summary = layer
        .initialize_services(&InitializeOptions {
            timeout: Some(Duration::from_millis(200)),
        })
        .await;
    assert_eq!(summary.initialized, ["fast"]);
    assert_eq!(summary.failed.len(), 1);
    assert!(summary.failed[0].error.is_timeout());
}

#[tokio::test]
async fn outage_degrades_then_recovers() {
    let db = Arc::new(MemoryPersistence::new());
    let layer = SupportLayer::from_settings(&KeelSettings::default()).with_persistence(db.clone());
    db.set_available(false);

    let saved = layer
        .state()
        .save_state(layer.config_store(), "v-1", json!({"n": 1}), &SaveOptions::default())
        .await
        .unwrap();
    assert!(!saved.persisted());
    let logged = layer
        .audit()
        .log_decision(layer.event_log(), DecisionInput::default(), &LogOptions::default())
        .await;
    assert!(!logged.logged());
    assert_eq!(layer.audit().buffer_size(), 1);

    db.set_available(true);
    let logged = layer
        .audit()
        .log_decision(layer.event_log(), DecisionInput::default(), &LogOptions::default())
        .await;
    assert!(logged.logged());
    assert_eq!(layer.audit().buffer_size(), 0);
    assert_eq!(db.events().len(), 2);
}
