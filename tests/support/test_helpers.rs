//! Shared construction of configuration, databases, and services so test
//! modules can focus on behaviour rather than wiring.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use serde_json::json;

use workqueue::clock::{Clock, ManualClock};
use workqueue::config::GlobalConfig;
use workqueue::coordination::Services;
use workqueue::models::ingest::{IngestRequest, IngestResult, Templates};
use workqueue::models::item::{HandoffCondition, HandoffPlan};
use workqueue::persistence::db::{self, Database};
use workqueue::state::AppState;

/// Producer allowed to ingest.
pub const PRODUCER: &str = "producer-1";
/// Writers sharing the `writer` role preference.
pub const WRITER_A: &str = "writer-a";
/// Second writer.
pub const WRITER_B: &str = "writer-b";
/// Operator holding `admin`.
pub const OPS: &str = "ops-1";
/// Pull-based agent whose role has no preference.
pub const PULLER: &str = "puller-1";

/// Configuration shared by every test harness.
pub const TEST_TOML: &str = r#"
ipc_name = "workqueue-test"

[locks]
default_ttl_seconds = 60
cleanup_interval_seconds = 1

[claims]
candidate_batch_size = 2

[capabilities]
ingest = ["producer"]
work = ["*"]
admin = ["ops"]

[[agents]]
id = "producer-1"
role_key = "producer"
display_name = "Upstream producer"

[[agents]]
id = "writer-a"
role_key = "writer"
display_name = "Writer A"

[[agents]]
id = "writer-b"
role_key = "writer"
display_name = "Writer B"

[[agents]]
id = "ops-1"
role_key = "ops"
display_name = "Operator"

[[agents]]
id = "puller-1"
role_key = "puller"
display_name = "Puller"

[[preferences]]
role_key = "writer"
primary_segments = ["concept"]
fallback_segments = ["backlog"]
pickup_statuses = ["draft", "ready"]
active_statuses = ["in_review"]
accept_status = "in_review"
return_status = "ready"
max_in_progress_minutes = 30
"#;

/// Parsed [`TEST_TOML`].
pub fn test_config() -> GlobalConfig {
    GlobalConfig::from_toml_str(TEST_TOML).expect("valid test config")
}

/// Services over a private in-memory database and a manual clock.
pub struct Harness {
    pub db: Arc<Database>,
    pub clock: Arc<ManualClock>,
    pub config: GlobalConfig,
    pub services: Services,
}

impl Harness {
    /// Move the manual clock forward.
    pub fn advance(&self, seconds: i64) {
        self.clock.advance(Duration::seconds(seconds));
    }

    /// Shared state for the HTTP or IPC surfaces.
    pub fn app_state(&self) -> Arc<AppState> {
        Arc::new(AppState {
            config: Arc::new(self.config.clone()),
            services: self.services.clone(),
        })
    }

    /// Ingest a draft-style task, advancing the clock one second afterwards
    /// so creation order is strictly increasing.
    pub async fn ingest(&self, source_id: &str, segment: &str, status: &str) -> IngestResult {
        let result = self
            .services
            .ingestion
            .ingest(PRODUCER, ingest_request(source_id, segment, status))
            .await
            .expect("ingest");
        self.advance(1);
        result
    }

    /// Ingest a task without a handoff plan, so status changes never move it.
    pub async fn ingest_unplanned(
        &self,
        source_id: &str,
        segment: &str,
        status: &str,
    ) -> IngestResult {
        let mut request = ingest_request(source_id, segment, status);
        request.handoff_plan = None;
        let result = self
            .services
            .ingestion
            .ingest(PRODUCER, request)
            .await
            .expect("ingest");
        self.advance(1);
        result
    }

    /// Ingest with an explicit priority.
    pub async fn ingest_with_priority(
        &self,
        source_id: &str,
        segment: &str,
        priority: i64,
    ) -> IngestResult {
        let mut request = ingest_request(source_id, segment, "draft");
        request.priority = priority;
        let result = self
            .services
            .ingestion
            .ingest(PRODUCER, request)
            .await
            .expect("ingest");
        self.advance(1);
        result
    }

    /// Number of lease rows, expired ones included.
    pub async fn lock_rows(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM queue_lock")
            .fetch_one(self.db.as_ref())
            .await
            .expect("count locks")
    }
}

/// Fixed starting instant for the manual clock.
pub fn epoch() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).single().expect("valid epoch")
}

/// Build a harness from [`test_config`].
pub async fn harness() -> Harness {
    harness_with(test_config()).await
}

/// Build a harness from an explicit configuration.
pub async fn harness_with(config: GlobalConfig) -> Harness {
    let db = Arc::new(db::connect_memory().await.expect("memory db"));
    let clock = Arc::new(ManualClock::new(epoch()));
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    let services = Services::bootstrap(&db, &dyn_clock, &config)
        .await
        .expect("bootstrap services");
    Harness {
        db,
        clock,
        config,
        services,
    }
}

/// Minimal valid ingestion request.
pub fn ingest_request(source_id: &str, segment: &str, status: &str) -> IngestRequest {
    IngestRequest {
        source_id: source_id.to_owned(),
        segment: segment.to_owned(),
        initial_status: status.to_owned(),
        priority: 50,
        title: format!("Task {source_id}"),
        summary: None,
        payload: json!({ "brief": "write the vendor quest" }),
        knowledge_refs: vec!["knowledge/npc/vendor.md".to_owned()],
        templates: Templates::default(),
        handoff_plan: Some(HandoffPlan {
            next_segment: "archive".to_owned(),
            conditions: vec![HandoffCondition {
                status: "done".to_owned(),
                target_segment: "qa".to_owned(),
            }],
            notes: None,
        }),
    }
}
