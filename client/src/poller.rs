//! # Ledger Poller
//!
//! Keeps a fresh copy of an append-only ledger (the DAO's regulation
//! history) by re-reading the whole thing on a fixed interval.
//!
//! ## Session Lifecycle
//!
//! ```text
//!   Idle ──start(scope)──> Active ──stop() / scope change / drop──> Idle
//! ```
//!
//! [`spawn_poll`] starts a session: one fetch immediately, then one every
//! period. It returns a [`PollHandle`]; the snapshot is read through a
//! cloneable [`LedgerView`]. [`LedgerPoller`] wraps that to guarantee at most
//! one session, stopping the old one before a new scope starts.
//!
//! ## Cancellation
//!
//! Stopping does two things: it flips the session's cancellation flag and it
//! signals the loop over a `watch` channel. The loop abandons any in-flight
//! fetch when the signal arrives, and independently checks the flag before
//! committing a result. Timer cancellation alone is not enough: a fetch that
//! was already awaiting the network when the timer was cleared must still
//! find the flag set when it lands.
//!
//! The flag is flipped and checked while holding the session state's write
//! lock, so once [`PollHandle::stop`] returns the snapshot is final.
//!
//! ## Failures
//!
//! A failed fetch never ends the session and never clears the snapshot. The
//! consecutive-failure count drives [`PollStatus::Degraded`]; the next good
//! fetch resets it. A response that is older than what is already committed
//! (fewer entries or a lower latest epoch) is dropped, so the committed
//! snapshot only ever grows.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chain::{Address, ChainClient, ChainError, ContractCall, ContractMethod};
use crate::config::PollerConfig;
use crate::error::ClientError;
use crate::regulation::{decode_ledger, latest_epoch, Regulation};

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// Where ledger entries come from. Returns the full current set every time.
#[async_trait]
pub trait LedgerSource: Send + Sync + 'static {
    async fn fetch(&self, scope: &Address) -> Result<Vec<Regulation>, ChainError>;
}

/// Reads the regulation ledger with the DAO's `getAllRegulations` view.
pub struct ChainLedgerSource<C: ChainClient> {
    chain: Arc<C>,
}

impl<C: ChainClient> ChainLedgerSource<C> {
    pub fn new(chain: Arc<C>) -> Self {
        Self { chain }
    }
}

#[async_trait]
impl<C: ChainClient> LedgerSource for ChainLedgerSource<C> {
    async fn fetch(&self, scope: &Address) -> Result<Vec<Regulation>, ChainError> {
        let call = ContractCall::new(scope, ContractMethod::GetAllRegulations, Vec::new());
        let value = self.chain.query(call).await?;
        decode_ledger(value).map_err(|e| ChainError::Decode(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Snapshot & View
// ---------------------------------------------------------------------------

/// What the presentation layer should show around the table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollStatus {
    /// Nothing committed yet.
    Loading,
    /// Showing a committed snapshot.
    Ready,
    /// The last `consecutive_failures` fetches failed. Any earlier snapshot
    /// is still available.
    Degraded { consecutive_failures: u32 },
}

/// One committed fetch result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub entries: Vec<Regulation>,
    /// Which poll cycle produced it (1 = the immediate fetch on start).
    pub cycle: u64,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct SessionState {
    snapshot: Option<LedgerSnapshot>,
    consecutive_failures: u32,
    last_error: Option<ClientError>,
}

/// Read access to a poll session's state. Cheap to clone.
#[derive(Clone, Debug)]
pub struct LedgerView {
    scope: Address,
    state: Arc<RwLock<SessionState>>,
    degraded_after: u32,
}

impl LedgerView {
    pub fn scope(&self) -> &Address {
        &self.scope
    }

    /// The latest committed snapshot.
    pub fn snapshot(&self) -> Option<LedgerSnapshot> {
        self.state.read().snapshot.clone()
    }

    /// Entries of the latest committed snapshot (empty while loading).
    pub fn entries(&self) -> Vec<Regulation> {
        self.state
            .read()
            .snapshot
            .as_ref()
            .map(|s| s.entries.clone())
            .unwrap_or_default()
    }

    pub fn status(&self) -> PollStatus {
        let state = self.state.read();
        if state.consecutive_failures >= self.degraded_after {
            PollStatus::Degraded {
                consecutive_failures: state.consecutive_failures,
            }
        } else if state.snapshot.is_none() {
            PollStatus::Loading
        } else {
            PollStatus::Ready
        }
    }

    /// The most recent fetch failure, cleared by the next success.
    pub fn last_error(&self) -> Option<ClientError> {
        self.state.read().last_error.clone()
    }

    /// Display rows for every committed entry.
    pub fn rows(&self, decimals: u8) -> Vec<[String; 5]> {
        self.state
            .read()
            .snapshot
            .as_ref()
            .map(|s| s.entries.iter().map(|e| e.render_row(decimals)).collect())
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Owner of a running poll session. Stops the session when dropped.
pub struct PollHandle {
    id: Uuid,
    view: LedgerView,
    cancelled: Arc<AtomicBool>,
    stop_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn scope(&self) -> &Address {
        self.view.scope()
    }

    pub fn view(&self) -> LedgerView {
        self.view.clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Halts future fetches and marks any in-flight result as discardable.
    /// Once this returns, the snapshot no longer changes. Idempotent.
    pub fn stop(&mut self) {
        {
            // Taken as writer so a commit in progress finishes first and any
            // later one sees the flag.
            let _state = self.view.state.write();
            if self.cancelled.swap(true, Ordering::AcqRel) {
                return;
            }
        }
        self.stop_tx.send_replace(true);
        // The loop exits on the signal; nothing to join.
        self.task.take();
        info!(session = %self.id, scope = %self.view.scope, "ledger poll stopped");
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Starts a poll session for `scope` on the current tokio runtime.
pub fn spawn_poll<S: LedgerSource>(source: Arc<S>, scope: Address, config: &PollerConfig) -> PollHandle {
    let id = Uuid::new_v4();
    let view = LedgerView {
        scope: scope.clone(),
        state: Arc::new(RwLock::new(SessionState::default())),
        degraded_after: config.degraded_after.max(1),
    };
    let cancelled = Arc::new(AtomicBool::new(false));
    let (stop_tx, stop_rx) = watch::channel(false);

    let worker = PollWorker {
        id,
        source,
        scope,
        interval: config.interval(),
        cancelled: Arc::clone(&cancelled),
        state: Arc::clone(&view.state),
        stop_rx,
    };

    info!(session = %id, scope = %view.scope, interval = ?worker.interval, "ledger poll started");
    let task = tokio::spawn(worker.run());

    PollHandle {
        id,
        view,
        cancelled,
        stop_tx,
        task: Some(task),
    }
}

struct PollWorker<S: LedgerSource> {
    id: Uuid,
    source: Arc<S>,
    scope: Address,
    interval: Duration,
    cancelled: Arc<AtomicBool>,
    state: Arc<RwLock<SessionState>>,
    stop_rx: watch::Receiver<bool>,
}

impl<S: LedgerSource> PollWorker<S> {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cycle: u64 = 0;

        loop {
            tokio::select! {
                biased;
                _ = self.stop_rx.changed() => break,
                _ = ticker.tick() => {}
            }
            if self.cancelled.load(Ordering::Acquire) {
                break;
            }

            cycle += 1;
            debug!(session = %self.id, cycle, "fetching ledger");

            let result = tokio::select! {
                biased;
                _ = self.stop_rx.changed() => {
                    debug!(session = %self.id, cycle, "in-flight fetch abandoned on stop");
                    break;
                }
                result = self.source.fetch(&self.scope) => result,
            };

            if !self.commit(cycle, result) {
                break;
            }
        }

        debug!(session = %self.id, "ledger poll loop exited");
    }

    /// Applies one fetch result. Returns `false`, leaving the state
    /// untouched, once the session has been stopped.
    fn commit(&self, cycle: u64, result: Result<Vec<Regulation>, ChainError>) -> bool {
        let mut state = self.state.write();
        // Checked under the lock `stop()` takes, not at schedule time.
        if self.cancelled.load(Ordering::Acquire) {
            debug!(session = %self.id, cycle, "discarding fetch that completed after stop");
            return false;
        }
        match result {
            Ok(entries) => {
                if let Some(previous) = &state.snapshot {
                    if entries.len() < previous.entries.len()
                        || latest_epoch(&entries) < latest_epoch(&previous.entries)
                    {
                        warn!(
                            session = %self.id,
                            cycle,
                            committed = previous.entries.len(),
                            received = entries.len(),
                            "ignoring stale ledger response"
                        );
                        return true;
                    }
                }
                debug!(session = %self.id, cycle, entries = entries.len(), "ledger snapshot committed");
                state.snapshot = Some(LedgerSnapshot {
                    entries,
                    cycle,
                    fetched_at: Utc::now(),
                });
                state.consecutive_failures = 0;
                state.last_error = None;
            }
            Err(e) => {
                state.consecutive_failures = state.consecutive_failures.saturating_add(1);
                warn!(
                    session = %self.id,
                    cycle,
                    consecutive_failures = state.consecutive_failures,
                    error = %e,
                    "ledger fetch failed"
                );
                state.last_error = Some(ClientError::FetchFailed(e.to_string()));
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// LedgerPoller
// ---------------------------------------------------------------------------

/// Whether a poller currently has a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Active { scope: Address },
}

/// Holds at most one poll session.
pub struct LedgerPoller<S: LedgerSource> {
    source: Arc<S>,
    config: PollerConfig,
    active: Option<PollHandle>,
}

impl<S: LedgerSource> LedgerPoller<S> {
    pub fn new(source: Arc<S>, config: PollerConfig) -> Self {
        Self {
            source,
            config,
            active: None,
        }
    }

    /// Starts polling `scope`. A session already running for the same scope
    /// is kept; one for another scope is stopped first.
    pub fn start(&mut self, scope: Address) -> LedgerView {
        if let Some(active) = &self.active {
            if active.scope() == &scope && !active.is_stopped() {
                return active.view();
            }
        }
        self.stop();
        let handle = spawn_poll(Arc::clone(&self.source), scope, &self.config);
        let view = handle.view();
        self.active = Some(handle);
        view
    }

    /// Stops the active session, if any.
    pub fn stop(&mut self) {
        if let Some(mut handle) = self.active.take() {
            handle.stop();
        }
    }

    pub fn state(&self) -> PollerState {
        match &self.active {
            Some(handle) => PollerState::Active {
                scope: handle.scope().clone(),
            },
            None => PollerState::Idle,
        }
    }

    /// View of the active session.
    pub fn view(&self) -> Option<LedgerView> {
        self.active.as_ref().map(PollHandle::view)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::AtomicUsize;

    use parking_lot::Mutex;
    use tokio::sync::Notify;
    use tokio::time::sleep;

    use super::*;
    use crate::devnet::DevnetChain;

    const PERIOD: Duration = Duration::from_secs(15);

    fn config(degraded_after: u32) -> PollerConfig {
        PollerConfig {
            interval_ms: PERIOD.as_millis() as u64,
            degraded_after,
        }
    }

    fn epochs(entries: &[Regulation]) -> Vec<u64> {
        entries.iter().map(Regulation::epoch).collect()
    }

    /// Lets the poll task run whatever is due at the current instant.
    async fn settle() {
        sleep(Duration::from_millis(1)).await;
    }

    /// One more epoch every fetch.
    #[derive(Default)]
    struct GrowingSource {
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl LedgerSource for GrowingSource {
        async fn fetch(&self, _scope: &Address) -> Result<Vec<Regulation>, ChainError> {
            let n = self.fetches.fetch_add(1, Ordering::SeqCst) as u64 + 1;
            Ok((1..=n).map(Regulation::neutral).collect())
        }
    }

    /// Plays back a fixed script of results, then repeats the last one.
    struct ScriptedSource {
        script: Mutex<VecDeque<Result<Vec<u64>, ChainError>>>,
        last: Mutex<Option<Result<Vec<u64>, ChainError>>>,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<Vec<u64>, ChainError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                last: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl LedgerSource for ScriptedSource {
        async fn fetch(&self, _scope: &Address) -> Result<Vec<Regulation>, ChainError> {
            let next = match self.script.lock().pop_front() {
                Some(next) => {
                    *self.last.lock() = Some(next.clone());
                    next
                }
                None => self
                    .last
                    .lock()
                    .clone()
                    .unwrap_or_else(|| Err(ChainError::Transport("empty script".into()))),
            };
            next.map(|epochs| epochs.into_iter().map(Regulation::neutral).collect())
        }
    }

    /// First fetch answers at once; later fetches wait for the gate.
    #[derive(Default)]
    struct GatedSource {
        started: AtomicUsize,
        completed: AtomicUsize,
        gate: Notify,
    }

    #[async_trait]
    impl LedgerSource for GatedSource {
        async fn fetch(&self, _scope: &Address) -> Result<Vec<Regulation>, ChainError> {
            let n = self.started.fetch_add(1, Ordering::SeqCst) as u64 + 1;
            if n > 1 {
                self.gate.notified().await;
            }
            self.completed.fetch_add(1, Ordering::SeqCst);
            Ok((1..=n).map(Regulation::neutral).collect())
        }
    }

    /// Counts fetches per scope.
    #[derive(Default)]
    struct ScopeCounter {
        counts: Mutex<HashMap<Address, usize>>,
    }

    impl ScopeCounter {
        fn count(&self, scope: &str) -> usize {
            self.counts.lock().get(&Address::new(scope)).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl LedgerSource for ScopeCounter {
        async fn fetch(&self, scope: &Address) -> Result<Vec<Regulation>, ChainError> {
            *self.counts.lock().entry(scope.clone()).or_default() += 1;
            Ok(vec![Regulation::neutral(1)])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fetches_immediately_then_on_interval() {
        let source = Arc::new(GrowingSource::default());
        let handle = spawn_poll(Arc::clone(&source), Address::new("dao"), &config(2));
        let view = handle.view();

        assert_eq!(view.status(), PollStatus::Loading);
        settle().await;
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(view.status(), PollStatus::Ready);
        assert_eq!(view.snapshot().unwrap().cycle, 1);

        sleep(PERIOD).await;
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
        assert_eq!(epochs(&view.entries()), vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn snapshots_only_grow_against_a_growing_source() {
        let source = Arc::new(GrowingSource::default());
        let handle = spawn_poll(source, Address::new("dao"), &config(2));
        let view = handle.view();
        settle().await;

        let mut previous = view.entries();
        for _ in 0..6 {
            sleep(PERIOD).await;
            let current = view.entries();
            assert!(current.len() >= previous.len());
            assert_eq!(&current[..previous.len()], &previous[..]);
            previous = current;
        }
        assert_eq!(previous.len(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn result_landing_after_stop_is_discarded() {
        let source = Arc::new(GatedSource::default());
        let mut handle = spawn_poll(Arc::clone(&source), Address::new("dao"), &config(2));
        let view = handle.view();
        settle().await;
        let before = view.snapshot().expect("first snapshot");

        // Second fetch starts and hangs on the gate.
        sleep(PERIOD).await;
        assert_eq!(source.started.load(Ordering::SeqCst), 2);
        assert_eq!(source.completed.load(Ordering::SeqCst), 1);

        handle.stop();
        source.gate.notify_waiters();
        source.gate.notify_one();
        settle().await;

        assert_eq!(view.snapshot(), Some(before));

        // And the timer is gone.
        sleep(PERIOD * 4).await;
        assert_eq!(source.started.load(Ordering::SeqCst), 2);
    }

    /// A worker that is never spawned, for driving `commit` directly.
    fn worker(source: Arc<GrowingSource>) -> (PollWorker<GrowingSource>, watch::Sender<bool>) {
        let (stop_tx, stop_rx) = watch::channel(false);
        let worker = PollWorker {
            id: Uuid::new_v4(),
            source,
            scope: Address::new("dao"),
            interval: PERIOD,
            cancelled: Arc::new(AtomicBool::new(false)),
            state: Arc::new(RwLock::new(SessionState::default())),
            stop_rx,
        };
        (worker, stop_tx)
    }

    #[tokio::test]
    async fn commit_checks_the_flag_under_the_state_lock() {
        let source = Arc::new(GrowingSource::default());
        let (worker, _stop_tx) = worker(Arc::clone(&source));

        let first = source.fetch(&worker.scope).await;
        assert!(worker.commit(1, first));
        assert_eq!(worker.state.read().snapshot.as_ref().map(|s| s.cycle), Some(1));

        // The fetch was already past any schedule-time check when the flag
        // flipped.
        let late = source.fetch(&worker.scope).await;
        worker.cancelled.store(true, Ordering::Release);
        assert!(!worker.commit(2, late));

        let state = worker.state.read();
        assert_eq!(state.snapshot.as_ref().map(|s| s.cycle), Some(1));
        assert_eq!(state.snapshot.as_ref().map(|s| s.entries.len()), Some(1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn snapshot_is_frozen_once_stop_returns() {
        let fast = PollerConfig {
            interval_ms: 1,
            degraded_after: 2,
        };
        for _ in 0..30 {
            let source = Arc::new(GrowingSource::default());
            let mut handle = spawn_poll(source, Address::new("dao"), &fast);
            let view = handle.view();
            sleep(Duration::from_millis(3)).await;

            handle.stop();
            let at_stop = view.snapshot();
            sleep(Duration::from_millis(20)).await;
            assert_eq!(view.snapshot(), at_stop);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failures_keep_last_snapshot_then_degrade() {
        let source = Arc::new(ScriptedSource::new(vec![
            Ok(vec![1]),
            Err(ChainError::Transport("timeout".into())),
            Err(ChainError::Transport("timeout".into())),
            Ok(vec![1, 2]),
        ]));
        let handle = spawn_poll(source, Address::new("dao"), &config(2));
        let view = handle.view();

        settle().await;
        assert_eq!(view.status(), PollStatus::Ready);

        sleep(PERIOD).await;
        assert_eq!(view.status(), PollStatus::Ready);
        assert_eq!(epochs(&view.entries()), vec![1]);
        assert!(matches!(view.last_error(), Some(ClientError::FetchFailed(_))));

        sleep(PERIOD).await;
        assert_eq!(
            view.status(),
            PollStatus::Degraded {
                consecutive_failures: 2
            }
        );
        assert_eq!(epochs(&view.entries()), vec![1]);

        sleep(PERIOD).await;
        assert_eq!(view.status(), PollStatus::Ready);
        assert_eq!(epochs(&view.entries()), vec![1, 2]);
        assert_eq!(view.last_error(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn stays_loading_until_first_success() {
        let source = Arc::new(ScriptedSource::new(vec![
            Err(ChainError::Transport("down".into())),
            Ok(vec![1]),
        ]));
        let handle = spawn_poll(source, Address::new("dao"), &config(2));
        let view = handle.view();

        settle().await;
        assert_eq!(view.status(), PollStatus::Loading);
        sleep(PERIOD).await;
        assert_eq!(view.status(), PollStatus::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_response_does_not_shrink_snapshot() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(vec![1, 2, 3]), Ok(vec![1, 2])]));
        let handle = spawn_poll(source, Address::new("dao"), &config(2));
        let view = handle.view();

        settle().await;
        sleep(PERIOD).await;
        assert_eq!(epochs(&view.entries()), vec![1, 2, 3]);
        assert_eq!(view.snapshot().unwrap().cycle, 1);
        assert_eq!(view.status(), PollStatus::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_stops_polling() {
        let source = Arc::new(GrowingSource::default());
        let handle = spawn_poll(Arc::clone(&source), Address::new("dao"), &config(2));
        settle().await;
        drop(handle);

        sleep(PERIOD * 3).await;
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn changing_scope_stops_the_previous_session() {
        let source = Arc::new(ScopeCounter::default());
        let mut poller = LedgerPoller::new(Arc::clone(&source), config(2));

        let first = poller.start(Address::new("a"));
        settle().await;
        assert_eq!(
            poller.state(),
            PollerState::Active {
                scope: Address::new("a")
            }
        );

        let second = poller.start(Address::new("b"));
        settle().await;
        sleep(PERIOD * 2).await;

        assert_eq!(source.count("a"), 1);
        assert_eq!(source.count("b"), 3);
        assert_eq!(first.scope(), &Address::new("a"));
        assert_eq!(second.scope(), &Address::new("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn restarting_the_same_scope_keeps_one_session() {
        let source = Arc::new(ScopeCounter::default());
        let mut poller = LedgerPoller::new(Arc::clone(&source), config(2));

        poller.start(Address::new("a"));
        settle().await;
        poller.start(Address::new("a"));
        settle().await;

        assert_eq!(source.count("a"), 1);

        poller.stop();
        assert_eq!(poller.state(), PollerState::Idle);
        assert!(poller.view().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn chain_source_reads_devnet_ledger() {
        let chain = Arc::new(DevnetChain::new());
        let dao = Address::new("dao");
        chain.push_regulation(&dao, Regulation::neutral(1));
        chain.push_regulation(&dao, Regulation::neutral(2));

        let source = Arc::new(ChainLedgerSource::new(Arc::clone(&chain)));
        let handle = spawn_poll(source, dao.clone(), &config(2));
        settle().await;
        assert_eq!(epochs(&handle.view().entries()), vec![1, 2]);

        chain.push_regulation(&dao, Regulation::neutral(3));
        sleep(PERIOD).await;
        assert_eq!(epochs(&handle.view().entries()), vec![1, 2, 3]);
        assert_eq!(handle.view().rows(18)[2][1], "1.00");
    }
}
