use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::NoisePolicy;
use crate::dispatch::AuthDispatcher;
use crate::trust::TrustGate;

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Counts live loops; decremented when the loop future is dropped, whether
/// it returned or was aborted.
struct LoopGuard(Arc<AtomicUsize>);

impl LoopGuard {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for LoopGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Background `/auth` traffic at randomized intervals, independent of user
/// activity. At most one loop runs per scheduler.
pub struct NoiseScheduler {
    gate: Arc<TrustGate>,
    dispatcher: Arc<AuthDispatcher>,
    policy: NoisePolicy,
    current: Mutex<Option<Running>>,
    active: Arc<AtomicUsize>,
}

impl NoiseScheduler {
    pub fn new(gate: Arc<TrustGate>, dispatcher: Arc<AuthDispatcher>, policy: NoisePolicy) -> Self {
        Self {
            gate,
            dispatcher,
            policy,
            current: Mutex::new(None),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Start the loop on a child of `scope`, replacing any running loop.
    /// Cancelling `scope` also ends it.
    pub fn start(&self, scope: &CancellationToken) {
        let mut current = self.current();
        if let Some(previous) = current.take() {
            previous.cancel.cancel();
            previous.handle.abort();
        }

        let cancel = scope.child_token();
        let guard = LoopGuard::new(&self.active);
        let handle = tokio::spawn(run(
            Arc::clone(&self.gate),
            Arc::clone(&self.dispatcher),
            self.policy.clone(),
            cancel.clone(),
            guard,
        ));
        *current = Some(Running { cancel, handle });
        tracing::info!("noise loop started");
    }

    /// Stop the loop. Safe to call repeatedly or before `start`.
    pub fn stop(&self) {
        if let Some(running) = self.current().take() {
            running.cancel.cancel();
            running.handle.abort();
            tracing::info!("noise loop stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.current()
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    /// Loops whose futures are still alive.
    pub fn active_loops(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    fn current(&self) -> MutexGuard<'_, Option<Running>> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for NoiseScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn next_interval(policy: &NoisePolicy) -> Duration {
    rand::thread_rng().gen_range(policy.min_interval()..=policy.max_interval())
}

async fn run(
    gate: Arc<TrustGate>,
    dispatcher: Arc<AuthDispatcher>,
    policy: NoisePolicy,
    cancel: CancellationToken,
    _guard: LoopGuard,
) {
    loop {
        let interval = next_interval(&policy);

        // Locked or proxied: keep the cadence, send nothing.
        if let Some(endpoint) = gate.background_endpoint() {
            let token = dispatcher.pool().pick_real();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = dispatcher.transport().authenticate(&endpoint, &token) => {
                    if let Err(e) = result {
                        tracing::trace!(error = %e, "noise attempt failed");
                    }
                }
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    tracing::debug!("noise loop exited");
}
