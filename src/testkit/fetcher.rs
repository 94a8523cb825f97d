//! Scripted metric fetcher.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::domain::{MetricValue, Subject, SubjectKind};
use crate::error::FetchError;
use crate::port::MetricFetcher;

type Scripted = Result<MetricValue, FetchError>;

/// Fetcher that replays queued results, then a default.
///
/// With an empty queue and no default every call fails transiently.
pub struct ScriptedFetcher {
    id: String,
    kinds: Option<Vec<SubjectKind>>,
    delay: Option<Duration>,
    script: Mutex<VecDeque<Scripted>>,
    default: Option<Scripted>,
    calls: AtomicUsize,
    healthy: AtomicBool,
}

impl ScriptedFetcher {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kinds: None,
            delay: None,
            script: Mutex::new(VecDeque::new()),
            default: None,
            calls: AtomicUsize::new(0),
            healthy: AtomicBool::new(true),
        }
    }

    /// Restrict capability to one subject kind.
    #[must_use]
    pub fn only(mut self, kind: SubjectKind) -> Self {
        self.kinds.get_or_insert_with(Vec::new).push(kind);
        self
    }

    /// Sleep before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Result returned once the queue is drained.
    #[must_use]
    pub fn always(mut self, result: Scripted) -> Self {
        self.default = Some(result);
        self
    }

    pub fn push_ok(&self, value: MetricValue) {
        self.script.lock().push_back(Ok(value));
    }

    pub fn push_err(&self, error: FetchError) {
        self.script.lock().push_back(Err(error));
    }

    /// Number of `fetch_metric` calls served.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }
}

#[async_trait]
impl MetricFetcher for ScriptedFetcher {
    fn id(&self) -> &str {
        &self.id
    }

    fn can_fetch(&self, subject: &Subject) -> bool {
        self.kinds
            .as_ref()
            .map_or(true, |kinds| kinds.contains(&subject.kind))
    }

    async fn fetch_metric(
        &self,
        _subject: &Subject,
        _at: DateTime<Utc>,
    ) -> Result<MetricValue, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().pop_front();
        match next.or_else(|| self.default.clone()) {
            Some(result) => result,
            None => Err(FetchError::Transient {
                source_id: self.id.clone(),
                message: "script exhausted".into(),
            }),
        }
    }

    async fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}
