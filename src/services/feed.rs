//! News feed views
//!
//! One view per client: the current search query, the articles on
//! display, the inline error and the last successful update. Loads are
//! numbered; a response is committed only if no newer load was issued for
//! the same view in the meantime, so out-of-order completions never
//! overwrite fresher results.
//!
//! A mounted view re-issues its current query on a fixed interval until
//! it is unmounted.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{broadcast, OnceCell};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::news::{HeadlineQuery, NewsSource};
use super::session::SessionEvent;
use crate::models::{Article, ClientId, NewsResponse};

/// Message shown when a load fails
pub const LOAD_ERROR_MESSAGE: &str = "Failed to load news. Please try again later.";

/// What a view shows, as handed to templates and the JSON endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSnapshot {
    pub query: String,
    pub articles: Vec<Article>,
    pub loading: bool,
    pub error: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
    /// Number of the load whose result is on display
    pub generation: u64,
}

struct FeedState {
    query: String,
    articles: Vec<Article>,
    loading: bool,
    error: Option<String>,
    last_updated: Option<DateTime<Utc>>,
    committed: u64,
    last_seen: Instant,
}

pub struct FeedView {
    source: Arc<dyn NewsSource>,
    headlines: HeadlineQuery,
    /// Latest load number handed out
    issued: AtomicU64,
    state: RwLock<FeedState>,
    /// Set once the first load has completed
    initial: OnceCell<()>,
    cancel: CancellationToken,
}

impl FeedView {
    fn new(source: Arc<dyn NewsSource>, headlines: HeadlineQuery) -> Self {
        Self {
            source,
            headlines,
            issued: AtomicU64::new(0),
            state: RwLock::new(FeedState {
                query: String::new(),
                articles: Vec::new(),
                loading: false,
                error: None,
                last_updated: None,
                committed: 0,
                last_seen: Instant::now(),
            }),
            initial: OnceCell::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Reload the current query (headlines when the query is empty).
    ///
    /// Returns whether the result was committed.
    pub async fn load(&self) -> bool {
        let (generation, query) = {
            let mut state = write_lock(&self.state);
            state.loading = true;
            (self.next_generation(), state.query.clone())
        };
        self.run(generation, &query).await
    }

    /// Switch to `query` and load it. Blank means headlines.
    pub async fn search(&self, query: &str) -> bool {
        let (generation, query) = {
            let mut state = write_lock(&self.state);
            state.query = query.trim().to_string();
            state.loading = true;
            (self.next_generation(), state.query.clone())
        };
        self.run(generation, &query).await
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        let state = read_lock(&self.state);
        FeedSnapshot {
            query: state.query.clone(),
            articles: state.articles.clone(),
            loading: state.loading,
            error: state.error.clone(),
            last_updated: state.last_updated,
            generation: state.committed,
        }
    }

    /// Mark the view as in use
    pub fn touch(&self) {
        write_lock(&self.state).last_seen = Instant::now();
    }

    pub fn is_mounted(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Run the first load, or wait for the one already in flight
    async fn initial_load(&self) {
        self.initial
            .get_or_init(|| async {
                self.load().await;
            })
            .await;
    }

    fn next_generation(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn run(&self, generation: u64, query: &str) -> bool {
        let response = if query.is_empty() {
            self.source.fetch_headlines(&self.headlines).await
        } else {
            self.source.search(query, self.headlines.page_size).await
        };
        self.commit(generation, response)
    }

    fn commit(&self, generation: u64, response: NewsResponse) -> bool {
        let mut state = write_lock(&self.state);
        // Checked under the state lock so a newer commit cannot interleave
        if generation != self.issued.load(Ordering::SeqCst) {
            tracing::debug!(
                "Discarding stale news response #{} (latest #{})",
                generation,
                self.issued.load(Ordering::SeqCst)
            );
            return false;
        }

        state.loading = false;
        state.committed = generation;
        if response.is_error() {
            state.articles.clear();
            state.error = Some(LOAD_ERROR_MESSAGE.to_string());
        } else {
            state.articles = response.articles;
            state.error = None;
            state.last_updated = Some(Utc::now());
        }
        true
    }

    fn idle_for(&self) -> Duration {
        read_lock(&self.state).last_seen.elapsed()
    }
}

/// All mounted views, keyed by client
pub struct FeedRegistry {
    source: Arc<dyn NewsSource>,
    headlines: HeadlineQuery,
    refresh_interval: Duration,
    views: RwLock<HashMap<ClientId, Arc<FeedView>>>,
}

impl FeedRegistry {
    pub fn new(
        source: Arc<dyn NewsSource>,
        headlines: HeadlineQuery,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            source,
            headlines,
            refresh_interval,
            views: RwLock::new(HashMap::new()),
        }
    }

    /// Get the client's view, mounting it if needed.
    ///
    /// Mounting performs the initial load and starts the refresh timer.
    /// Every caller returns only after that first load has finished.
    pub async fn mount(&self, client_id: &ClientId) -> Arc<FeedView> {
        let (view, created) = {
            let mut views = write_lock(&self.views);
            match views.get(client_id) {
                Some(view) => (view.clone(), false),
                None => {
                    let view = Arc::new(FeedView::new(self.source.clone(), self.headlines.clone()));
                    views.insert(client_id.clone(), view.clone());
                    (view, true)
                }
            }
        };

        view.touch();
        if created {
            tracing::debug!("Mounted news view for client {}", client_id);
            spawn_refresh(view.clone(), self.refresh_interval);
        }
        view.initial_load().await;
        view
    }

    pub fn get(&self, client_id: &ClientId) -> Option<Arc<FeedView>> {
        read_lock(&self.views).get(client_id).cloned()
    }

    /// Remove the client's view and stop its timer
    pub fn unmount(&self, client_id: &ClientId) -> bool {
        let removed = write_lock(&self.views).remove(client_id);
        match removed {
            Some(view) => {
                view.cancel.cancel();
                tracing::debug!("Unmounted news view for client {}", client_id);
                true
            }
            None => false,
        }
    }

    /// Unmount views unused for longer than `max_idle`
    pub fn unmount_idle(&self, max_idle: Duration) -> usize {
        let idle: Vec<ClientId> = read_lock(&self.views)
            .iter()
            .filter(|(_, view)| view.idle_for() > max_idle)
            .map(|(client_id, _)| client_id.clone())
            .collect();

        idle.iter().filter(|client_id| self.unmount(client_id)).count()
    }

    pub fn len(&self) -> usize {
        read_lock(&self.views).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unmount every view
    pub fn clear(&self) {
        let views: Vec<Arc<FeedView>> = write_lock(&self.views).drain().map(|(_, v)| v).collect();
        for view in views {
            view.cancel.cancel();
        }
    }

    /// Unmount a client's view when its session ends
    pub fn spawn_session_watcher(
        self: Arc<Self>,
        mut events: broadcast::Receiver<SessionEvent>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = events.recv() => match received {
                        Ok(SessionEvent::Cleared { client_id }) => {
                            self.unmount(&client_id);
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!("Feed registry missed {} session events", skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        })
    }

    /// Periodically unmount idle views
    pub fn spawn_idle_sweep(
        self: Arc<Self>,
        max_idle: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let period = (max_idle / 4).max(Duration::from_secs(1));
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let removed = self.unmount_idle(max_idle);
                        if removed > 0 {
                            tracing::debug!("Unmounted {} idle news views", removed);
                        }
                    }
                }
            }
        })
    }
}

fn spawn_refresh(view: Arc<FeedView>, period: Duration) {
    let period = period.max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = view.cancel.cancelled() => break,
                _ = interval.tick() => {
                    view.load().await;
                }
            }
        }
    });
}

fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}
