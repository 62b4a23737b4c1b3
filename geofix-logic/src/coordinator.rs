use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use chrono::Utc;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::{
    failure::{Failure, FailureCode},
    location::Fix,
    provider::{LocationProvider, SessionHandle, SessionId, SessionSink},
    settings::RequestConfig,
};

/// What every waiter of a session receives
pub type Outcome = Result<Fix, Failure>;

type WaiterId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoordinatorPhase {
    /// Provider stopped, nobody waiting
    Idle,
    /// Provider started, timer running, at least one waiter registered
    Awaiting,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Running totals since the coordinator was created
pub struct CoordinatorStats {
    /// Requests answered straight from the cached fix
    pub cache_hits: u64,
    /// Requests that joined a session someone else started
    pub coalesced: u64,
    pub sessions_started: u64,
    /// Sessions ended by a delivered fix
    pub fixes: u64,
    /// Sessions ended by a provider failure, including failed starts
    pub failures: u64,
    pub timeouts: u64,
    /// Sessions torn down through [LocationCoordinator::stop]
    pub stops: u64,
    /// Deliveries that arrived for a session that had already ended
    pub rejected_deliveries: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Snapshot of everything observable about a coordinator
pub struct CoordinatorStatus {
    pub phase: CoordinatorPhase,
    pub last_fix: Option<Fix>,
    pub last_failure: Option<Failure>,
    pub pending_waiters: usize,
    pub stats: CoordinatorStats,
}

/// How a session came to an end
enum Ending {
    Fix(Fix),
    ProviderFailure(Failure),
    TimedOut,
    Stopped,
}

/// One provider start/stop cycle and everyone waiting on it
struct Session {
    id: SessionId,
    waiters: Vec<(WaiterId, oneshot::Sender<Outcome>)>,
    timer: CancellationToken,
}

impl Session {
    /// Hand the outcome to every waiter in the order they registered, returns how many there were
    fn resolve(self, outcome: Outcome) -> usize {
        self.timer.cancel();
        let count = self.waiters.len();
        for (_, tx) in self.waiters {
            // Receiver gone means the waiter was dropped mid-resolution, nothing to do
            tx.send(outcome).ok();
        }
        count
    }
}

#[derive(Default)]
struct CoordinatorState {
    last_fix: Option<Fix>,
    last_failure: Option<Failure>,
    /// Some while the provider is running
    session: Option<Session>,
    last_session_id: u64,
    next_waiter_id: WaiterId,
    stats: CoordinatorStats,
}

impl CoordinatorState {
    fn phase(&self) -> CoordinatorPhase {
        if self.session.is_some() {
            CoordinatorPhase::Awaiting
        } else {
            CoordinatorPhase::Idle
        }
    }

    fn pending_waiters(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.waiters.len())
    }
}

struct CoordinatorInner<P: LocationProvider> {
    provider: P,
    state: Mutex<CoordinatorState>,
    this: Weak<CoordinatorInner<P>>,
}

enum Begin<P: LocationProvider> {
    Cached(Fix),
    Wait(Waiter<P>),
}

impl<P: LocationProvider> CoordinatorInner<P> {
    /// Everything [LocationCoordinator::fetch] does before it needs to suspend
    fn begin(&self, config: &RequestConfig) -> Begin<P> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if let Some(fix) = state
            .last_fix
            .filter(|fix| fix.is_fresh(Utc::now(), config.maximum_age))
        {
            state.stats.cache_hits += 1;
            return Begin::Cached(fix);
        }

        let waiter_id = state.next_waiter_id;
        state.next_waiter_id += 1;
        let (tx, rx) = oneshot::channel();

        if let Some(session) = state.session.as_mut() {
            session.waiters.push((waiter_id, tx));
            state.stats.coalesced += 1;
            debug!(
                "Joined location session {} ({} waiting)",
                session.id,
                session.waiters.len()
            );
        } else {
            self.start_session(state, config, (waiter_id, tx));
        }

        Begin::Wait(Waiter {
            id: waiter_id,
            rx,
            coordinator: self.this.clone(),
            done: false,
        })
    }

    fn start_session(
        &self,
        state: &mut CoordinatorState,
        config: &RequestConfig,
        first: (WaiterId, oneshot::Sender<Outcome>),
    ) {
        state.last_session_id += 1;
        let id = SessionId(state.last_session_id);
        let timer = CancellationToken::new();

        state.session = Some(Session {
            id,
            waiters: vec![first],
            timer: timer.clone(),
        });
        state.stats.sessions_started += 1;

        debug!(
            "Starting location session {id} (high accuracy: {}, timeout: {:?})",
            config.high_accuracy, config.timeout
        );

        self.provider.configure(config.high_accuracy);
        let sink: Weak<dyn SessionSink> = self.this.clone();

        if let Err(failure) = self.provider.start(SessionHandle::new(id, sink)) {
            warn!("Location provider failed to start: {failure}");
            self.finish(state, id, Ending::ProviderFailure(failure));
            return;
        }

        self.spawn_timer(id, config.timeout, timer);
    }

    fn spawn_timer(&self, id: SessionId, timeout: Duration, cancel: CancellationToken) {
        let coordinator = self.this.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {}

                _ = tokio::time::sleep(timeout) => {
                    if let Some(coordinator) = coordinator.upgrade() {
                        coordinator.timed_out(id);
                    }
                }
            }
        });
    }

    /// End session `id` if it's still the current one. Returns false when some other event
    /// already ended it.
    fn finish(&self, state: &mut CoordinatorState, id: SessionId, ending: Ending) -> bool {
        let Some(session) = state.session.take_if(|s| s.id == id) else {
            return false;
        };

        let outcome = match ending {
            Ending::Fix(fix) => {
                state.last_fix = Some(fix);
                state.last_failure = None;
                state.stats.fixes += 1;
                Ok(fix)
            }
            Ending::ProviderFailure(mut failure) => {
                // Only the coordinator's own timer may report a timeout
                if failure.code == FailureCode::TimedOut {
                    debug!("Provider reported a timeout for session {id}, using position-unknown");
                    failure = Failure::new(FailureCode::PositionUnknown);
                }
                state.last_failure = Some(failure);
                state.stats.failures += 1;
                Err(failure)
            }
            Ending::TimedOut => {
                state.stats.timeouts += 1;
                Err(Failure::timed_out())
            }
            Ending::Stopped => {
                state.stats.stops += 1;
                Err(Failure::provider_unavailable())
            }
        };

        self.provider.stop();
        let waiters = session.resolve(outcome);

        match outcome {
            Ok(fix) => debug!(
                "Location session {id} got a fix ({}, {} ±{}m) for {waiters} waiter(s)",
                fix.lat, fix.long, fix.accuracy
            ),
            Err(failure) => warn!("Location session {id} failed for {waiters} waiter(s): {failure}"),
        }

        true
    }

    fn timed_out(&self, id: SessionId) {
        let mut state = self.state.lock();
        self.finish(&mut state, id, Ending::TimedOut);
    }

    fn deliver(&self, id: SessionId, ending: Ending) -> bool {
        let mut state = self.state.lock();
        let accepted = self.finish(&mut state, id, ending);
        if !accepted {
            state.stats.rejected_deliveries += 1;
            debug!("Ignoring delivery for finished location session {id}");
        }
        accepted
    }

    fn stop(&self) -> bool {
        let mut state = self.state.lock();
        let Some(id) = state.session.as_ref().map(|s| s.id) else {
            return false;
        };
        info!("Tearing down location session {id}");
        self.finish(&mut state, id, Ending::Stopped)
    }

    /// A waiter gave up. The session keeps running for whoever else is (or will be) waiting.
    fn abandon(&self, waiter: WaiterId) {
        let mut state = self.state.lock();
        if let Some(session) = state.session.as_mut() {
            let before = session.waiters.len();
            session.waiters.retain(|(id, _)| *id != waiter);
            if session.waiters.len() != before {
                debug!(
                    "Waiter left location session {} ({} still waiting)",
                    session.id,
                    session.waiters.len()
                );
            }
        }
    }
}

impl<P: LocationProvider> SessionSink for CoordinatorInner<P> {
    fn fix_delivered(&self, session: SessionId, fix: Fix) -> bool {
        self.deliver(session, Ending::Fix(fix))
    }

    fn failure_delivered(&self, session: SessionId, failure: Failure) -> bool {
        self.deliver(session, Ending::ProviderFailure(failure))
    }
}

impl<P: LocationProvider> Drop for CoordinatorInner<P> {
    fn drop(&mut self) {
        if let Some(session) = self.state.get_mut().session.take() {
            session.timer.cancel();
            self.provider.stop();
        }
    }
}

/// A caller's place in a session. Dropping it before the outcome arrives removes the caller
/// from the session.
struct Waiter<P: LocationProvider> {
    id: WaiterId,
    rx: oneshot::Receiver<Outcome>,
    coordinator: Weak<CoordinatorInner<P>>,
    done: bool,
}

impl<P: LocationProvider> Waiter<P> {
    async fn wait(mut self) -> Outcome {
        let res = (&mut self.rx).await;
        self.done = true;
        // Sender only disappears without sending if the coordinator itself went away
        res.unwrap_or_else(|_| Err(Failure::provider_unavailable()))
    }
}

impl<P: LocationProvider> Drop for Waiter<P> {
    fn drop(&mut self) {
        if !self.done {
            if let Some(coordinator) = self.coordinator.upgrade() {
                coordinator.abandon(self.id);
            }
        }
    }
}

/// Turns a [LocationProvider]'s callbacks into "give me the current position" requests.
///
/// Keeps a single cached [Fix], merges concurrent requests onto one provider session, and
/// bounds every session with a timeout. Cloning is cheap and every clone drives the same
/// provider.
pub struct LocationCoordinator<P: LocationProvider> {
    inner: Arc<CoordinatorInner<P>>,
}

impl<P: LocationProvider> Clone for LocationCoordinator<P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P: LocationProvider> LocationCoordinator<P> {
    pub fn new(provider: P) -> Self {
        let inner = Arc::new_cyclic(|this| CoordinatorInner {
            provider,
            state: Mutex::new(CoordinatorState::default()),
            this: this.clone(),
        });
        Self { inner }
    }

    /// Get the current position.
    ///
    /// A cached fix younger than `config.maximum_age` is returned without suspending. Otherwise
    /// the caller waits on the running provider session, starting one if none is running, until
    /// a fix, a provider failure, `config.timeout`, or [Self::stop].
    ///
    /// Must be called from within a tokio runtime, the session timeout is a spawned task.
    pub async fn fetch(&self, config: RequestConfig) -> Result<Fix, Failure> {
        match self.inner.begin(&config) {
            Begin::Cached(fix) => Ok(fix),
            Begin::Wait(waiter) => waiter.wait().await,
        }
    }

    /// Stop the provider and fail everyone waiting with [crate::FailureCode::ProviderUnavailable].
    /// Returns whether a session was actually running.
    pub fn stop(&self) -> bool {
        self.inner.stop()
    }

    /// Forget the cached fix and failure
    pub fn clear_cache(&self) {
        let mut state = self.inner.state.lock();
        state.last_fix = None;
        state.last_failure = None;
    }

    pub fn last_fix(&self) -> Option<Fix> {
        self.inner.state.lock().last_fix
    }

    /// Most recent failure reported by the provider, timeouts and stops are never recorded
    pub fn last_failure(&self) -> Option<Failure> {
        self.inner.state.lock().last_failure
    }

    pub fn has_failed(&self) -> bool {
        self.last_failure().is_some()
    }

    pub fn phase(&self) -> CoordinatorPhase {
        self.inner.state.lock().phase()
    }

    pub fn is_running(&self) -> bool {
        self.phase() == CoordinatorPhase::Awaiting
    }

    pub fn pending_waiters(&self) -> usize {
        self.inner.state.lock().pending_waiters()
    }

    pub fn stats(&self) -> CoordinatorStats {
        self.inner.state.lock().stats
    }

    pub fn status(&self) -> CoordinatorStatus {
        let state = self.inner.state.lock();
        CoordinatorStatus {
            phase: state.phase(),
            last_fix: state.last_fix,
            last_failure: state.last_failure,
            pending_waiters: state.pending_waiters(),
            stats: state.stats,
        }
    }

    pub fn provider(&self) -> &P {
        &self.inner.provider
    }
}
