use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::Backend;
use crate::error::Result;
use crate::schema::{Model, Server};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Models,
    Servers,
}

impl EntityKind {
    /// Query key the snapshot is cached under.
    pub fn key(&self) -> &'static str {
        match self {
            EntityKind::Models => "models",
            EntityKind::Servers => "servers",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A lifecycle-managed resource the store can list from the backend.
#[async_trait]
pub trait Entity: Clone + Send + Sync + 'static {
    const KIND: EntityKind;

    async fn fetch(backend: &dyn Backend) -> Result<Vec<Self>>;

    fn key(&self) -> &str;
}

#[async_trait]
impl Entity for Model {
    const KIND: EntityKind = EntityKind::Models;

    async fn fetch(backend: &dyn Backend) -> Result<Vec<Self>> {
        backend.list_models().await
    }

    fn key(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl Entity for Server {
    const KIND: EntityKind = EntityKind::Servers;

    async fn fetch(backend: &dyn Backend) -> Result<Vec<Self>> {
        backend.list_servers().await
    }

    fn key(&self) -> &str {
        &self.id
    }
}

/// Full list of one entity kind as last fetched. Never edited in place.
#[derive(Clone, Debug)]
pub struct Snapshot<T> {
    pub seq: u64,
    pub fetched_at: DateTime<Utc>,
    pub items: Arc<Vec<T>>,
}

#[derive(Clone, Debug)]
pub struct QueryState<T> {
    pub snapshot: Option<Snapshot<T>>,
    /// Message of the last failed refresh; cleared by the next success.
    pub error: Option<String>,
    pub is_fetching: bool,
    pub stale: bool,
    /// Sequence number of the newest applied response (success or failure).
    pub last_seq: u64,
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self {
            snapshot: None,
            error: None,
            is_fetching: false,
            stale: false,
            last_seq: 0,
        }
    }
}

impl<T: Entity> QueryState<T> {
    pub fn items(&self) -> &[T] {
        self.snapshot.as_ref().map(|s| s.items.as_slice()).unwrap_or(&[])
    }

    pub fn find(&self, key: &str) -> Option<&T> {
        self.items().iter().find(|e| e.key() == key)
    }

    /// True until the first response (success or failure) arrives.
    pub fn is_loading(&self) -> bool {
        self.snapshot.is_none() && self.error.is_none()
    }
}

#[derive(Default)]
struct Flight {
    running: bool,
    rerun: bool,
}

enum Entry<T> {
    Owner,
    Wait(watch::Receiver<QueryState<T>>),
}

/// Cached snapshot for one entity kind with at most one fetch in flight.
pub struct Query<T: Entity> {
    backend: Arc<dyn Backend>,
    state: watch::Sender<QueryState<T>>,
    flight: Mutex<Flight>,
    next_seq: AtomicU64,
    mounted: AtomicUsize,
    fetches: AtomicU64,
}

impl<T: Entity> Query<T> {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        let (state, _) = watch::channel(QueryState::default());
        Self {
            backend,
            state,
            flight: Mutex::new(Flight::default()),
            next_seq: AtomicU64::new(0),
            mounted: AtomicUsize::new(0),
            fetches: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> QueryState<T> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<QueryState<T>> {
        self.state.subscribe()
    }

    pub fn mounted(&self) -> usize {
        self.mounted.load(Ordering::SeqCst)
    }

    /// Number of list requests issued so far.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Fetches the list, or joins the fetch already in flight.
    pub async fn refresh(&self) {
        self.run(false).await
    }

    /// Marks the snapshot stale and, while a consumer is mounted, refetches now.
    /// A fetch already in flight gets exactly one trailing fetch instead of a
    /// concurrent one, so the result always postdates this call. That holds
    /// with no consumer mounted too: the in-flight owner picks up the rerun.
    pub async fn invalidate(&self) {
        let in_flight = self.mark_stale();
        if self.mounted() > 0 {
            self.run(true).await;
        } else if in_flight {
            debug!(kind = %T::KIND, "invalidate: no consumer mounted, trailing fetch scheduled");
        } else {
            debug!(kind = %T::KIND, "invalidate: no consumer mounted, deferring refetch");
        }
    }

    /// Read-through: refetches when nothing is cached yet or the cache is stale,
    /// and joins a fetch in flight so a pending trailing fetch is not skipped.
    pub async fn ensure(&self) -> QueryState<T> {
        let (needs, fetching) = {
            let s = self.state.borrow();
            (s.snapshot.is_none() || s.stale, s.is_fetching)
        };
        if needs {
            self.run(true).await;
        } else if fetching {
            self.run(false).await;
        }
        self.state()
    }

    /// Starts a polling consumer. The first fetch happens immediately; the
    /// poller stops when the handle is dropped or `parent` is cancelled.
    pub fn mount(self: &Arc<Self>, every: Duration, parent: &CancellationToken) -> Mounted<T> {
        self.mounted.fetch_add(1, Ordering::SeqCst);
        let token = parent.child_token();

        let q = self.clone();
        let t = token.clone();
        tokio::spawn(async move {
            debug!(kind = %T::KIND, every_ms = every.as_millis() as u64, "poller: mounted");
            while !t.is_cancelled() {
                q.refresh().await;
                tokio::select! {
                    _ = t.cancelled() => break,
                    _ = tokio::time::sleep(every) => {}
                }
            }
            debug!(kind = %T::KIND, "poller: stopped");
        });

        Mounted {
            query: self.clone(),
            rx: self.subscribe(),
            token,
        }
    }

    async fn run(&self, force: bool) {
        let mut rx = match self.enter(force) {
            Entry::Owner => {
                let mut guard = FlightGuard { query: self, done: false };
                loop {
                    let seq = self.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
                    self.fetches.fetch_add(1, Ordering::SeqCst);
                    let result = T::fetch(self.backend.as_ref()).await;
                    self.apply(seq, result);
                    if !self.rerun_or_finish() {
                        break;
                    }
                    debug!(kind = %T::KIND, "refresh: trailing fetch after invalidation");
                }
                guard.done = true;
                return;
            }
            Entry::Wait(rx) => rx,
        };
        let _ = rx.wait_for(|s| !s.is_fetching).await;
    }

    fn enter(&self, force: bool) -> Entry<T> {
        let mut f = self.flight.lock().unwrap_or_else(|e| e.into_inner());
        if f.running {
            if force {
                f.rerun = true;
            }
            return Entry::Wait(self.state.subscribe());
        }
        f.running = true;
        self.state.send_modify(|s| s.is_fetching = true);
        Entry::Owner
    }

    /// Sets `stale` and, when a fetch is running, requests a trailing one.
    /// Both happen under the flight lock so the owner cannot finish in between.
    fn mark_stale(&self) -> bool {
        let mut f = self.flight.lock().unwrap_or_else(|e| e.into_inner());
        self.state.send_modify(|s| s.stale = true);
        if f.running {
            f.rerun = true;
        }
        f.running
    }

    /// Returns true when another fetch was requested while this one ran.
    fn rerun_or_finish(&self) -> bool {
        let mut f = self.flight.lock().unwrap_or_else(|e| e.into_inner());
        if f.rerun {
            f.rerun = false;
            return true;
        }
        f.running = false;
        self.state.send_modify(|s| s.is_fetching = false);
        false
    }

    fn abandon(&self) {
        let mut f = self.flight.lock().unwrap_or_else(|e| e.into_inner());
        *f = Flight::default();
        self.state.send_modify(|s| s.is_fetching = false);
    }

    /// Applies a fetch result unless a newer one was already applied.
    /// Failures keep the previous snapshot.
    pub(crate) fn apply(&self, seq: u64, result: Result<Vec<T>>) -> bool {
        self.state.send_if_modified(|s| {
            if seq <= s.last_seq {
                debug!(kind = %T::KIND, seq, last_seq = s.last_seq, "refresh: dropping out-of-order response");
                return false;
            }
            s.last_seq = seq;
            match result {
                Ok(items) => {
                    debug!(kind = %T::KIND, seq, count = items.len(), "refresh: snapshot applied");
                    s.snapshot = Some(Snapshot {
                        seq,
                        fetched_at: Utc::now(),
                        items: Arc::new(items),
                    });
                    s.error = None;
                    s.stale = false;
                }
                Err(e) => {
                    warn!(kind = %T::KIND, seq, error = %e, "refresh failed, keeping previous snapshot");
                    s.error = Some(e.to_string());
                }
            }
            true
        })
    }
}

/// Releases the flight if the owning future is dropped mid-fetch.
struct FlightGuard<'a, T: Entity> {
    query: &'a Query<T>,
    done: bool,
}

impl<T: Entity> Drop for FlightGuard<'_, T> {
    fn drop(&mut self) {
        if !self.done {
            self.query.abandon();
        }
    }
}

/// A mounted consumer. Dropping it unmounts and stops its poller.
pub struct Mounted<T: Entity> {
    query: Arc<Query<T>>,
    rx: watch::Receiver<QueryState<T>>,
    token: CancellationToken,
}

impl<T: Entity> Mounted<T> {
    pub fn state(&self) -> QueryState<T> {
        self.rx.borrow().clone()
    }

    /// Waits for the next state change. Returns `None` once unmounted.
    pub async fn changed(&mut self) -> Option<QueryState<T>> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            res = self.rx.changed() => res.ok().map(|_| self.rx.borrow_and_update().clone()),
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl<T: Entity> Drop for Mounted<T> {
    fn drop(&mut self) {
        self.token.cancel();
        self.query.mounted.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Owned cache of the latest model and server snapshots.
pub struct LifecycleStore {
    models: Arc<Query<Model>>,
    servers: Arc<Query<Server>>,
    poll_interval: Duration,
    shutdown: CancellationToken,
}

impl LifecycleStore {
    pub fn new(backend: Arc<dyn Backend>, poll_interval: Duration) -> Self {
        Self {
            models: Arc::new(Query::new(backend.clone())),
            servers: Arc::new(Query::new(backend)),
            poll_interval,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn models(&self) -> &Arc<Query<Model>> {
        &self.models
    }

    pub fn servers(&self) -> &Arc<Query<Server>> {
        &self.servers
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn mount_models(&self) -> Mounted<Model> {
        self.models.mount(self.poll_interval, &self.shutdown)
    }

    pub fn mount_servers(&self) -> Mounted<Server> {
        self.servers.mount(self.poll_interval, &self.shutdown)
    }

    pub async fn invalidate(&self, kind: EntityKind) {
        info!(%kind, "store: invalidated");
        match kind {
            EntityKind::Models => self.models.invalidate().await,
            EntityKind::Servers => self.servers.invalidate().await,
        }
    }

    /// Stops every poller mounted through this store.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for LifecycleStore {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
