//! End-to-end extraction flows against mock capabilities.
//!
//! Exercises the full submit -> admit -> retry -> normalize -> sink ->
//! events pipeline without a real browser or network.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use reviewharvest::{
    AdmitError, BrowserDriver, ChannelEventSink, DirectHttp, ExtractionRequest, ExtractorConfig,
    HttpBody, Orchestrator, ProgressStatus, ReadinessCriterion, SessionCookie, SessionState,
    SubmitError, TargetKey, TaskDeps, TaskEvent, TaskStatus,
};

/// HTTP capability that replays one canned body, or refuses everything.
struct MockHttp {
    /// Body returned with status 200; `None` means every request is a 403.
    body: Option<String>,
    calls: AtomicUsize,
}

impl MockHttp {
    fn serving(body: &str) -> Self {
        Self {
            body: Some(body.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    fn refusing() -> Self {
        Self {
            body: None,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl DirectHttp for MockHttp {
    async fn get(
        &self,
        _url: &str,
        _headers: &[(String, String)],
        _cookies: &[SessionCookie],
        _timeout: Duration,
    ) -> anyhow::Result<HttpBody> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(match &self.body {
            Some(body) => HttpBody {
                status: 200,
                body: body.clone(),
            },
            None => HttpBody {
                status: 403,
                body: String::new(),
            },
        })
    }
}

/// Browser capability that either hands out pre-captured bodies on the
/// first drain or fails every navigation.
struct MockBrowser {
    captured: Mutex<Vec<String>>,
    cookies: Vec<SessionCookie>,
    fail_navigation: bool,
    stall_navigation: bool,
}

impl MockBrowser {
    fn capturing(bodies: Vec<String>, cookies: Vec<SessionCookie>) -> Self {
        Self {
            captured: Mutex::new(bodies),
            cookies,
            fail_navigation: false,
            stall_navigation: false,
        }
    }

    fn broken() -> Self {
        Self {
            captured: Mutex::new(Vec::new()),
            cookies: Vec::new(),
            fail_navigation: true,
            stall_navigation: false,
        }
    }

    /// Never finishes a navigation; for cancellation tests.
    fn stalling() -> Self {
        Self {
            captured: Mutex::new(Vec::new()),
            cookies: Vec::new(),
            fail_navigation: false,
            stall_navigation: true,
        }
    }
}

#[async_trait]
impl BrowserDriver for MockBrowser {
    async fn navigate(
        &self,
        url: &str,
        _readiness: ReadinessCriterion,
        _timeout: Duration,
    ) -> anyhow::Result<()> {
        if self.stall_navigation {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.fail_navigation {
            anyhow::bail!("connection refused: {url}");
        }
        Ok(())
    }

    async fn query_selector(&self, _selector: &str, _timeout: Duration) -> anyhow::Result<bool> {
        Ok(false)
    }

    async fn click(&self, selector: &str) -> anyhow::Result<()> {
        anyhow::bail!("nothing to click at {selector}");
    }

    async fn scroll_by(&self, _pixels: i64) -> anyhow::Result<()> {
        Ok(())
    }

    async fn evaluate(&self, _script: &str) -> anyhow::Result<serde_json::Value> {
        Ok(serde_json::Value::Null)
    }

    async fn drain_captured(&self) -> Vec<String> {
        let mut captured = self.captured.lock().unwrap();
        std::mem::take(&mut *captured)
    }

    async fn cookies(&self) -> anyhow::Result<Vec<SessionCookie>> {
        Ok(self.cookies.clone())
    }

    async fn apply_session(&self, _state: &SessionState) -> anyhow::Result<()> {
        Ok(())
    }
}

fn test_config(session_root: &std::path::Path) -> ExtractorConfig {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let mut config = ExtractorConfig::without_delays();
    config.session_root = session_root.to_path_buf();
    config
}

fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<TaskEvent>) -> Vec<TaskEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

const TARGET_URL: &str = "https://item.example.com/100012043978.html";

#[tokio::test]
async fn direct_fetch_alone_completes_with_enveloped_payload() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::new(test_config(dir.path()));
    let (events, mut rx) = ChannelEventSink::channel();
    let deps = TaskDeps {
        browser: None,
        http: Arc::new(MockHttp::serving(
            r#"fetchJSON_comment98({"comments":[{"content":"Works great","nickname":"u1","score":5,"creationTime":"2023-01-02 03:04:05"},{"content":"Broke in a week","nickname":"u2","score":1}]});"#,
        )),
        events: Arc::new(events),
    };

    let submission = orchestrator
        .submit(
            ExtractionRequest {
                target_url: TARGET_URL.to_string(),
                key: None,
                display_name: None,
            },
            deps,
        )
        .unwrap();
    assert_eq!(submission.key, TargetKey::new("100012043978"));

    let report = submission.handle.await.unwrap();
    assert_eq!(report.status, TaskStatus::Completed);
    assert_eq!(report.records, 2);
    assert_eq!(report.retry.total_attempts(), 1);

    let reviews = submission.sink.snapshot();
    assert_eq!(reviews[0].content, "Works great");
    assert_eq!(reviews[0].author, "u1");
    assert_eq!(reviews[0].rating, Some(5.0));
    assert_eq!(reviews[1].content, "Broke in a week");

    let events = drain(&mut rx);
    assert!(matches!(
        events.first(),
        Some(TaskEvent::Progress {
            status: ProgressStatus::Starting,
            ..
        })
    ));
    let records: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            TaskEvent::Record { review } => Some(review.content.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(records, vec!["Works great", "Broke in a week"]);
    assert!(matches!(
        events.last(),
        Some(TaskEvent::Progress {
            status: ProgressStatus::Completed,
            count: 2,
        })
    ));
}

#[tokio::test]
async fn overlapping_captured_payloads_are_deduplicated() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::new(test_config(dir.path()));
    let (events, _rx) = ChannelEventSink::channel();

    // Two intercepted bodies share one record; the shared one must land
    // in the sink exactly once, in first-seen order.
    let browser = MockBrowser::capturing(
        vec![
            r#"{"comments":[{"content":"Solid","nickname":"a"},{"content":"Meh","nickname":"b"}]}"#
                .to_string(),
            r#"{"data":{"commentList":[{"commentData":"Meh","userName":"b"},{"commentData":"Late delivery","userName":"c"}]}}"#
                .to_string(),
        ],
        Vec::new(),
    );
    let deps = TaskDeps {
        browser: Some(Arc::new(browser)),
        http: Arc::new(MockHttp::refusing()),
        events: Arc::new(events),
    };

    let submission = orchestrator
        .submit(
            ExtractionRequest {
                target_url: TARGET_URL.to_string(),
                key: None,
                display_name: None,
            },
            deps,
        )
        .unwrap();
    let report = submission.handle.await.unwrap();

    assert_eq!(report.status, TaskStatus::Completed);
    assert_eq!(report.records, 3);
    let contents: Vec<_> = submission
        .sink
        .snapshot()
        .into_iter()
        .map(|r| r.content)
        .collect();
    assert_eq!(contents, vec!["Solid", "Meh", "Late delivery"]);
}

#[tokio::test]
async fn duplicate_submission_is_refused_until_first_finishes() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::new(test_config(dir.path()));

    let make_deps = || {
        let (events, _rx) = ChannelEventSink::channel();
        TaskDeps {
            browser: None,
            http: Arc::new(MockHttp::serving(
                r#"{"comments":[{"content":"fine","nickname":"x"}]}"#,
            )),
            events: Arc::new(events),
        }
    };
    let request = || ExtractionRequest {
        target_url: TARGET_URL.to_string(),
        key: None,
        display_name: None,
    };

    let first = orchestrator.submit(request(), make_deps()).unwrap();

    // Same key while the first is in flight: synchronous refusal.
    let rejected = orchestrator.submit(request(), make_deps());
    assert!(matches!(
        rejected,
        Err(SubmitError::AlreadyActive(AdmitError::AlreadyActive(ref k)))
            if k == &TargetKey::new("100012043978")
    ));

    first.handle.await.unwrap();
    assert!(!orchestrator.coordinator().is_active(&TargetKey::new("100012043978")));

    // Released key admits again.
    let second = orchestrator.submit(request(), make_deps()).unwrap();
    let report = second.handle.await.unwrap();
    assert_eq!(report.status, TaskStatus::Completed);
}

#[tokio::test]
async fn all_strategies_exhausted_fails_with_single_error_event() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.endpoint_variants = vec!["https://api.example.com/{key}".to_string()];
    let orchestrator = Orchestrator::new(config);
    let (events, mut rx) = ChannelEventSink::channel();
    let http = Arc::new(MockHttp::refusing());
    let deps = TaskDeps {
        browser: Some(Arc::new(MockBrowser::broken())),
        http: Arc::clone(&http) as Arc<dyn DirectHttp>,
        events: Arc::new(events),
    };

    let submission = orchestrator
        .submit(
            ExtractionRequest {
                target_url: TARGET_URL.to_string(),
                key: None,
                display_name: None,
            },
            deps,
        )
        .unwrap();
    let report = submission.handle.await.unwrap();

    assert_eq!(report.status, TaskStatus::Failed);
    assert_eq!(report.records, 0);
    assert!(submission.sink.is_empty());
    // Three rendered attempts plus three direct attempts.
    assert_eq!(report.retry.total_attempts(), 6);
    assert_eq!(http.calls.load(Ordering::SeqCst), 3);

    let events = drain(&mut rx);
    let errors: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, TaskEvent::Error { .. }))
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        events.last(),
        Some(TaskEvent::Progress {
            status: ProgressStatus::Error,
            count: 0,
        })
    ));
    // The key is free for a fresh run after the failure.
    assert!(!orchestrator.coordinator().is_active(&TargetKey::new("100012043978")));
}

#[tokio::test]
async fn browser_cookies_are_persisted_per_target() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::new(test_config(dir.path()));
    let (events, _rx) = ChannelEventSink::channel();

    let cookie = SessionCookie {
        name: "auth".to_string(),
        value: "token-1".to_string(),
        domain: ".example.com".to_string(),
        path: "/".to_string(),
    };
    let browser = MockBrowser::capturing(
        vec![r#"{"comments":[{"content":"ok","nickname":"n"}]}"#.to_string()],
        vec![cookie.clone()],
    );
    let deps = TaskDeps {
        browser: Some(Arc::new(browser)),
        http: Arc::new(MockHttp::refusing()),
        events: Arc::new(events),
    };

    let submission = orchestrator
        .submit(
            ExtractionRequest {
                target_url: TARGET_URL.to_string(),
                key: None,
                display_name: None,
            },
            deps,
        )
        .unwrap();
    let report = submission.handle.await.unwrap();
    assert_eq!(report.status, TaskStatus::Completed);

    let session_file = dir
        .path()
        .join("profile_100012043978")
        .join("session.json");
    let saved: SessionState =
        serde_json::from_str(&std::fs::read_to_string(session_file).unwrap()).unwrap();
    assert_eq!(saved.cookies, vec![cookie]);
}

#[tokio::test]
async fn failed_session_save_keeps_completed_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::new(test_config(dir.path()));
    let (events, mut rx) = ChannelEventSink::channel();

    // Occupy the session file path with a directory so the save fails.
    std::fs::create_dir_all(
        dir.path().join("profile_100012043978").join("session.json"),
    )
    .unwrap();

    let browser = MockBrowser::capturing(
        vec![r#"{"comments":[{"content":"ok","nickname":"n"}]}"#.to_string()],
        vec![SessionCookie {
            name: "auth".to_string(),
            value: "token-1".to_string(),
            domain: ".example.com".to_string(),
            path: "/".to_string(),
        }],
    );
    let deps = TaskDeps {
        browser: Some(Arc::new(browser)),
        http: Arc::new(MockHttp::refusing()),
        events: Arc::new(events),
    };

    let submission = orchestrator
        .submit(
            ExtractionRequest {
                target_url: TARGET_URL.to_string(),
                key: None,
                display_name: None,
            },
            deps,
        )
        .unwrap();
    let report = submission.handle.await.unwrap();

    // The save failure is a warning, never a task failure.
    assert_eq!(report.status, TaskStatus::Completed);
    assert_eq!(report.records, 1);

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        TaskEvent::Progress {
            status: ProgressStatus::Completed,
            count: 1,
        }
    )));
    let save_warnings: Vec<_> = events
        .iter()
        .filter(|e| matches!(
            e,
            TaskEvent::Error { message } if message.starts_with("session save failed")
        ))
        .collect();
    assert_eq!(save_warnings.len(), 1);
}

#[tokio::test]
async fn cancelled_task_releases_its_key() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::new(test_config(dir.path()));
    let make_deps = || {
        let (events, _rx) = ChannelEventSink::channel();
        TaskDeps {
            browser: Some(Arc::new(MockBrowser::stalling())),
            http: Arc::new(MockHttp::refusing()),
            events: Arc::new(events),
        }
    };
    let request = || ExtractionRequest {
        target_url: TARGET_URL.to_string(),
        key: None,
        display_name: None,
    };
    let key = TargetKey::new("100012043978");

    let submission = orchestrator.submit(request(), make_deps()).unwrap();
    assert!(orchestrator.coordinator().is_active(&key));

    submission.cancel();
    let err = submission.handle.await.unwrap_err();
    assert!(err.is_cancelled());

    // The aborted future dropped its admission guard.
    assert!(!orchestrator.coordinator().is_active(&key));
    let resubmitted = orchestrator.submit(request(), make_deps()).unwrap();
    resubmitted.cancel();
}

#[tokio::test]
async fn submission_without_derivable_key_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::new(test_config(dir.path()));
    let (events, _rx) = ChannelEventSink::channel();
    let deps = TaskDeps {
        browser: None,
        http: Arc::new(MockHttp::refusing()),
        events: Arc::new(events),
    };

    let result = orchestrator.submit(
        ExtractionRequest {
            target_url: "https://example.com/about".to_string(),
            key: None,
            display_name: None,
        },
        deps,
    );
    assert!(matches!(result, Err(SubmitError::InvalidTarget(_))));
}
