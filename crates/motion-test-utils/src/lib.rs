//! Testing utilities for the PromptMotion workspace
//!
//! Scripted collaborators, renderer stand-ins and a fully wired service.

#![allow(missing_docs)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use motion_codegen::{CodeGenerator, GenerationError};
use motion_core::{
    sign_payload, BillingWebhook, Collaborators, InMemoryPlanStore, MotionService, PlanDirectory, StaticTokenIdentity,
};
use motion_ledger::{
    FixedClock, InMemoryJobLedger, InMemoryQuotaLedger, InMemoryStatsLedger, OwnerId, PlanTier, QuotaPolicy,
};
use motion_publish::{ArtifactPublisher, ObjectKey, ObjectStore, PublisherConfig, StoreError};
use motion_sandbox::{ManimRenderer, RendererConfig, WorkspaceRegistry};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const SCENE: &str = "from manim import *\n\nclass GeneratedScene(Scene):\n    def construct(self):\n        self.play(Create(Circle()))\n";

pub const EDITED_SCENE: &str = "from manim import *\n\nclass GeneratedScene(Scene):\n    def construct(self):\n        self.play(Create(Square()))\n";

pub const WRONG_CLASS_SCENE: &str = "from manim import *\n\nclass Intro(Scene):\n    def construct(self):\n        pass\n";

pub const WEBHOOK_SECRET: &str = "whsec_test";
pub const PRO_PLAN_ID: &str = "plan_pro";
pub const PLUS_PLAN_ID: &str = "plan_plus";
pub const ALICE_TOKEN: &str = "token-alice";
pub const PUBLIC_BASE: &str = "https://cdn.test";

/// Writes `<media>/videos/<job>/1080p60/GeneratedScene.mp4`
///
/// Positional parameters: `$1` quality flag, `$2` `--media_dir`, `$3` media
/// dir, `$4` source, `$5` scene.
pub const WRITES_VIDEO: &str =
    r#"stem=$(basename "$4" .py); out="$3/videos/$stem/1080p60"; mkdir -p "$out" && printf 'frames' > "$out/$5.mp4""#;

/// [`WRITES_VIDEO`] after a one second render
pub const SLOW_VIDEO: &str =
    r#"sleep 1; stem=$(basename "$4" .py); out="$3/videos/$stem/1080p60"; mkdir -p "$out" && printf 'frames' > "$out/$5.mp4""#;

pub const FAILS_WITH_TRACEBACK: &str = "echo \"NameError: name 'Circl' is not defined\" >&2; exit 1";

pub const PRODUCES_NOTHING: &str = "exit 0";

pub fn owner(name: &str) -> OwnerId {
    OwnerId::parse(name).unwrap()
}

/// Renderer config running `sh -c <script>` in place of the real binary
pub fn shell_renderer(script: &str, work_root: &Path) -> RendererConfig {
    RendererConfig {
        program: "sh".to_string(),
        extra_args: vec!["-c".to_string(), script.to_string(), "fake-renderer".to_string()],
        work_root: work_root.to_path_buf(),
        timeout_secs: 10,
        ..RendererConfig::default()
    }
}

/// Signed billing event body and its signature
pub fn signed_event(event: &str, plan_id: &str, uid: &str) -> (Vec<u8>, String) {
    let body = format!(
        r#"{{"event":"{event}","payload":{{"subscription":{{"entity":{{"id":"sub_1","plan_id":"{plan_id}","notes":{{"uid":"{uid}"}}}}}}}}}}"#
    )
    .into_bytes();
    let signature = sign_payload(WEBHOOK_SECRET.as_bytes(), &body).unwrap();
    (body, signature)
}

/// Code generator replaying queued replies, then [`SCENE`]
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<String, GenerationError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reply(&self, reply: Result<String, GenerationError>) {
        self.replies.lock().push_back(reply);
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl CodeGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        self.prompts.lock().push(prompt.to_string());
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(SCENE.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: String,
}

/// Object store held in memory, with injectable upload failures
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, StoredObject>>,
    fail_status: Mutex<Option<u16>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every upload with `status` until cleared
    pub fn fail_uploads(&self, status: Option<u16>) {
        *self.fail_status.lock() = status;
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_object(&self, key: &ObjectKey, body: Vec<u8>, content_type: &str) -> Result<(), StoreError> {
        if let Some(status) = *self.fail_status.lock() {
            return Err(StoreError::Http {
                status,
                body: "injected failure".to_string(),
            });
        }
        self.objects.lock().insert(
            key.as_str().to_string(),
            StoredObject {
                body,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    fn public_url(&self, key: &ObjectKey) -> String {
        format!("{PUBLIC_BASE}/{key}")
    }
}

/// Service wired with in-memory ledgers, a scripted generator and a shell
/// renderer, plus direct handles on every collaborator
pub struct TestHarness {
    pub service: MotionService,
    pub generator: Arc<ScriptedGenerator>,
    pub store: Arc<MemoryObjectStore>,
    pub jobs: Arc<InMemoryJobLedger>,
    pub quota: Arc<InMemoryQuotaLedger>,
    pub stats: Arc<InMemoryStatsLedger>,
    pub plans: PlanDirectory,
    pub workspaces: Arc<WorkspaceRegistry>,
    pub clock: Arc<FixedClock>,
    pub work_root: PathBuf,
}

impl TestHarness {
    /// Entries left under the work root
    pub fn leftover_workspaces(&self) -> usize {
        std::fs::read_dir(&self.work_root).map_or(0, |entries| entries.count())
    }
}

pub fn setup_test_service(root: &Path) -> TestHarness {
    setup_test_service_with(root, WRITES_VIDEO)
}

pub fn setup_test_service_with(root: &Path, renderer_script: &str) -> TestHarness {
    let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()));
    let work_root = root.join("jobs");

    let generator = Arc::new(ScriptedGenerator::new());
    let store = Arc::new(MemoryObjectStore::new());
    let jobs = Arc::new(InMemoryJobLedger::with_clock(clock.clone()));
    let quota = Arc::new(InMemoryQuotaLedger::with_clock(QuotaPolicy::default(), clock.clone()));
    let stats = Arc::new(InMemoryStatsLedger::with_clock(clock.clone()));
    let plans = PlanDirectory::new(Arc::new(InMemoryPlanStore::new()), 100, Duration::from_secs(60));
    let workspaces = WorkspaceRegistry::new(work_root.clone());

    let parts = Collaborators {
        generator: generator.clone(),
        renderer: Arc::new(ManimRenderer::new(shell_renderer(renderer_script, &work_root))),
        workspaces: Arc::clone(&workspaces),
        publisher: ArtifactPublisher::new(
            store.clone(),
            PublisherConfig {
                vanish_retry_delay_ms: 10,
            },
        ),
        jobs: jobs.clone(),
        quota: quota.clone(),
        stats: stats.clone(),
        plans: plans.clone(),
    };

    let identity = StaticTokenIdentity::new(&HashMap::new())
        .unwrap()
        .with_token(ALICE_TOKEN, owner("alice"));
    let billing = BillingWebhook::new(
        Some(WEBHOOK_SECRET.to_string()),
        HashMap::from([
            (PRO_PLAN_ID.to_string(), PlanTier::Pro),
            (PLUS_PLAN_ID.to_string(), PlanTier::Plus),
        ]),
        plans.clone(),
    );

    TestHarness {
        service: MotionService::new(parts, Arc::new(identity), billing),
        generator,
        store,
        jobs,
        quota,
        stats,
        plans,
        workspaces,
        clock,
        work_root,
    }
}
