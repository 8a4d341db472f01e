//! Acquisition session controller: drives one human-gated remote session
//! across a category list, persisting one raw snapshot per successful fetch.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bscout_core::{CanonicalBracket, CategoryDescriptor};
use bscout_extract::{extract_bracket, extract_category_list, ExtractError};
use bscout_storage::{BackoffPolicy, FetchError, HttpFetcher, SnapshotRef, SnapshotStore};
use chrono::Utc;
use thiserror::Error;
use tokio::sync::{watch, Semaphore};
use tracing::{info, warn};

pub const CRATE_NAME: &str = "bscout-session";

/// One page of remote content, challenge or draw markup.
#[derive(Debug, Clone)]
pub struct Page {
    pub body: String,
    pub final_url: String,
}

impl Page {
    /// Textual cue for the human-verification gate, matching what the draw
    /// service actually serves.
    pub fn is_challenge(&self) -> bool {
        let lower = self.body.to_ascii_lowercase();
        lower.contains("verify you are")
            || (lower.contains("recaptcha") && lower.contains("not a robot"))
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Remote side of a gated session. One implementation talks HTTP through a
/// cookie-scoped fetcher; tests plug in fakes.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Request the first protected resource (the event page).
    async fn open_event(&self, event_id: &str) -> Result<Page, TransportError>;

    /// Re-check the protected resource while the operator solves the gate.
    async fn poll(&self, event_id: &str) -> Result<Page, TransportError>;

    /// Fetch one category's draw page.
    async fn fetch_category(
        &self,
        event_id: &str,
        category_id: &str,
    ) -> Result<Page, TransportError>;
}

/// HTTP transport against the versioned draw-listing interface.
pub struct HttpTransport {
    fetcher: HttpFetcher,
    base_url: String,
}

impl HttpTransport {
    pub fn new(fetcher: HttpFetcher, base_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            base_url: base_url.into(),
        }
    }

    fn event_url(&self, event_id: &str) -> String {
        format!(
            "{}/veranstaltung_info_main.php?active_menu=calendar&vernr={}",
            self.base_url, event_id
        )
    }

    fn category_list_url(&self, event_id: &str) -> String {
        format!(
            "{}/veranstaltung_info_main.php?active_menu=calendar&vernr={}&ver_info_action=catauslist",
            self.base_url, event_id
        )
    }

    fn category_url(&self, event_id: &str, category_id: &str) -> String {
        format!(
            "{}/popup_mitschrift_main.php?popup_action=mitschriftcatxml&catid={}&verid={}",
            self.base_url, category_id, event_id
        )
    }
}

#[async_trait]
impl SessionTransport for HttpTransport {
    async fn open_event(&self, event_id: &str) -> Result<Page, TransportError> {
        let fetched = self.fetcher.fetch_text(&self.event_url(event_id)).await?;
        Ok(Page {
            body: fetched.body,
            final_url: fetched.final_url,
        })
    }

    async fn poll(&self, event_id: &str) -> Result<Page, TransportError> {
        let fetched = self
            .fetcher
            .fetch_text(&self.category_list_url(event_id))
            .await?;
        Ok(Page {
            body: fetched.body,
            final_url: fetched.final_url,
        })
    }

    async fn fetch_category(
        &self,
        event_id: &str,
        category_id: &str,
    ) -> Result<Page, TransportError> {
        let fetched = self
            .fetcher
            .fetch_text(&self.category_url(event_id, category_id))
            .await?;
        Ok(Page {
            body: fetched.body,
            final_url: fetched.final_url,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    ChallengePending,
    ChallengeCleared,
    Fetching(usize),
    Complete,
    Failed,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("challenge was not cleared within {0:?}")]
    ChallengeTimeout(Duration),
    #[error("acquisition cancelled before the session was usable")]
    Cancelled,
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Why one category ended up in the failed list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailReason {
    FetchFailure(String),
    Cancelled,
}

impl std::fmt::Display for FailReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailReason::FetchFailure(detail) => write!(f, "fetch failure: {detail}"),
            FailReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Default)]
pub struct AcquireReport {
    pub succeeded: Vec<CategoryDescriptor>,
    pub failed: Vec<(CategoryDescriptor, FailReason)>,
    /// Categories skipped because a fresh snapshot already exists.
    pub skipped: Vec<CategoryDescriptor>,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub force: bool,
    pub max_wait: Duration,
    pub poll_interval: Duration,
    pub retry: BackoffPolicy,
    pub staleness: chrono::Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            force: false,
            max_wait: Duration::from_secs(600),
            poll_interval: Duration::from_secs(3),
            retry: BackoffPolicy::default(),
            staleness: chrono::Duration::hours(24),
        }
    }
}

/// Owned state machine for one gated acquisition run. The challenge is solved
/// by a human at most once per `acquire` call; category fetches within the
/// session stay strictly sequential because the cleared state is cookie-scoped
/// and non-reentrant.
pub struct AcquisitionSession<T: SessionTransport> {
    transport: T,
    store: SnapshotStore,
    state: SessionState,
    cancel: watch::Receiver<bool>,
}

/// Cancellation handle for an acquisition run. Dropping the sender leaves the
/// session uncancellable, which is the default.
pub fn cancel_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

impl<T: SessionTransport> AcquisitionSession<T> {
    pub fn new(transport: T, store: SnapshotStore) -> Self {
        let (_tx, rx) = watch::channel(false);
        Self {
            transport,
            store,
            state: SessionState::Init,
            cancel: rx,
        }
    }

    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Acquire one raw snapshot per requested category. An empty category
    /// list means "discover": the draw listing is fetched inside the cleared
    /// session and its `catid=` links become the target list. A per-category
    /// failure never aborts the run; the report carries every outcome.
    pub async fn acquire(
        &mut self,
        event_id: &str,
        categories: &[CategoryDescriptor],
        options: &SessionOptions,
    ) -> Result<AcquireReport, SessionError> {
        self.state = SessionState::Init;

        let first = self.transport.open_event(event_id).await?;
        if first.is_challenge() {
            self.wait_for_gate(event_id, options).await?;
        }
        self.state = SessionState::ChallengeCleared;
        info!(event_id, "session gate cleared");

        let discovered;
        let categories: &[CategoryDescriptor] = if categories.is_empty() {
            discovered = self.discover_categories(event_id).await?;
            &discovered
        } else {
            categories
        };

        let mut report = AcquireReport::default();
        for (index, category) in categories.iter().enumerate() {
            self.state = SessionState::Fetching(index);
            if self.cancelled() {
                report
                    .failed
                    .extend(categories[index..].iter().cloned().map(|c| (c, FailReason::Cancelled)));
                break;
            }

            if !options.force && self.has_fresh_snapshot(category, options).await {
                report.skipped.push(category.clone());
                continue;
            }

            match self.fetch_with_retries(event_id, category, options).await {
                Ok(()) => report.succeeded.push(category.clone()),
                Err(reason) => {
                    warn!(
                        event_id,
                        category_id = %category.category_id,
                        %reason,
                        "category acquisition failed, continuing"
                    );
                    report.failed.push((category.clone(), reason));
                }
            }
        }

        self.state = if report.succeeded.is_empty() && report.skipped.is_empty() {
            SessionState::Failed
        } else {
            SessionState::Complete
        };
        Ok(report)
    }

    /// Category links from the event's draw listing, fetched inside the
    /// cleared session.
    async fn discover_categories(
        &mut self,
        event_id: &str,
    ) -> Result<Vec<CategoryDescriptor>, SessionError> {
        let listing = self.transport.poll(event_id).await?;
        let categories = extract_category_list(&listing.body, event_id).map_err(|err| {
            TransportError::Other(anyhow::anyhow!("draw listing unparseable: {err}"))
        })?;
        if categories.is_empty() {
            warn!(event_id, "draw listing carried no category links");
        } else {
            info!(
                event_id,
                count = categories.len(),
                "categories discovered from draw listing"
            );
        }
        Ok(categories)
    }

    /// Block on the human gate: poll at a fixed interval until the protected
    /// content becomes reachable or the bounded wait elapses.
    async fn wait_for_gate(
        &mut self,
        event_id: &str,
        options: &SessionOptions,
    ) -> Result<(), SessionError> {
        self.state = SessionState::ChallengePending;
        let started = tokio::time::Instant::now();
        info!(event_id, "challenge detected, waiting for operator");

        loop {
            if self.cancelled() {
                return Err(SessionError::Cancelled);
            }
            if started.elapsed() >= options.max_wait {
                self.state = SessionState::Failed;
                return Err(SessionError::ChallengeTimeout(options.max_wait));
            }
            tokio::time::sleep(options.poll_interval).await;

            match self.transport.poll(event_id).await {
                Ok(page) if !page.is_challenge() => return Ok(()),
                Ok(_) => {}
                // A navigating/transient page during the wait is still pending.
                Err(err) => warn!(event_id, error = %err, "gate poll failed, retrying"),
            }
        }
    }

    async fn has_fresh_snapshot(
        &self,
        category: &CategoryDescriptor,
        options: &SessionOptions,
    ) -> bool {
        match self
            .store
            .latest(&category.event_id, &category.category_id)
            .await
        {
            Ok(Some(existing)) => Utc::now() - existing.fetched_at < options.staleness,
            Ok(None) => false,
            Err(err) => {
                warn!(
                    category_id = %category.category_id,
                    error = %err,
                    "snapshot lookup failed, refetching"
                );
                false
            }
        }
    }

    /// Fetch one category with bounded exponential backoff. The snapshot is
    /// written only after the fetch fully completed; a challenge page served
    /// mid-run triggers one re-wait on the gate before the next attempt.
    async fn fetch_with_retries(
        &mut self,
        event_id: &str,
        category: &CategoryDescriptor,
        options: &SessionOptions,
    ) -> Result<(), FailReason> {
        let mut last_error = String::new();
        let mut regated = false;

        for attempt in 0..=options.retry.max_retries {
            if self.cancelled() {
                return Err(FailReason::Cancelled);
            }

            match self
                .transport
                .fetch_category(event_id, &category.category_id)
                .await
            {
                Ok(page) if page.is_challenge() => {
                    last_error = "challenge page served mid-session".to_string();
                    // One re-wait on the gate per category; a second challenge
                    // means the session is not coming back.
                    if regated || self.wait_for_gate(event_id, options).await.is_err() {
                        return Err(FailReason::FetchFailure(last_error));
                    }
                    regated = true;
                    self.state = SessionState::ChallengeCleared;
                    continue;
                }
                Ok(page) => {
                    return self
                        .store
                        .store_snapshot(event_id, &category.category_id, Utc::now(), &page.body)
                        .await
                        .map(|_| ())
                        .map_err(|err| FailReason::FetchFailure(err.to_string()));
                }
                Err(err) => {
                    last_error = err.to_string();
                    if attempt < options.retry.max_retries {
                        tokio::time::sleep(options.retry.delay_for_attempt(attempt)).await;
                    }
                }
            }
        }

        Err(FailReason::FetchFailure(last_error))
    }
}

/// Parse a batch of persisted snapshots on a bounded worker pool. Extraction
/// is pure, so categories parse concurrently while fetching stays sequential.
pub async fn extract_snapshots(
    store: &SnapshotStore,
    refs: Vec<SnapshotRef>,
    concurrency: usize,
) -> Vec<(SnapshotRef, Result<CanonicalBracket, ExtractError>)> {
    let limit = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut handles = Vec::with_capacity(refs.len());

    for snapshot_ref in refs {
        let limit = Arc::clone(&limit);
        let store = store.clone();
        let ref_for_join = snapshot_ref.clone();
        let handle = tokio::spawn(async move {
            let _permit = limit.acquire().await.expect("semaphore not closed");
            let result = match store.load(&snapshot_ref).await {
                Ok(snapshot) => extract_bracket(
                    &snapshot.raw_content,
                    &snapshot.event_id,
                    &snapshot.category_id,
                ),
                Err(err) => Err(ExtractError::MalformedBracket {
                    round_index: 0,
                    slot_index: 0,
                    detail: format!("snapshot unreadable: {err}"),
                }),
            };
            (snapshot_ref, result)
        });
        handles.push((ref_for_join, handle));
    }

    // Every input ref gets an entry; a worker that dies mid-parse reports as
    // that snapshot's failure instead of silently vanishing from the batch.
    let mut results = Vec::with_capacity(handles.len());
    for (snapshot_ref, handle) in handles {
        match handle.await {
            Ok(outcome) => results.push(outcome),
            Err(err) => results.push((
                snapshot_ref,
                Err(ExtractError::MalformedBracket {
                    round_index: 0,
                    slot_index: 0,
                    detail: format!("parse worker aborted: {err}"),
                }),
            )),
        }
    }
    results
}
