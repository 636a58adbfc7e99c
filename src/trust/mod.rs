/// Proxy, resolution and certificate checks in front of every request.
pub mod gate;

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use tokio::sync::watch;

pub use gate::TrustGate;

const TRUSTED: u8 = 0;
const LOCKED: u8 = 1;

/// Why the process stopped trusting the network path. Logged, never shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockReason {
    SuspiciousProxy,
    CertificateMismatch,
    ResolutionFailed,
}

impl fmt::Display for LockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SuspiciousProxy => f.write_str("suspicious proxy configuration"),
            Self::CertificateMismatch => f.write_str("certificate pin not satisfied"),
            Self::ResolutionFailed => f.write_str("endpoint resolution failed"),
        }
    }
}

/// One-way `Trusted -> Locked` flag.
#[derive(Debug)]
pub struct TrustState {
    state: AtomicU8,
    reason: OnceLock<LockReason>,
}

impl Default for TrustState {
    fn default() -> Self {
        Self::new()
    }
}

impl TrustState {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(TRUSTED),
            reason: OnceLock::new(),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.state.load(Ordering::Acquire) == LOCKED
    }

    /// Returns `true` only for the call that performed the transition.
    pub fn trip(&self, reason: LockReason) -> bool {
        let first = self
            .state
            .compare_exchange(TRUSTED, LOCKED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if first {
            let _ = self.reason.set(reason);
        }
        first
    }

    /// Reason recorded by the first trip.
    pub fn reason(&self) -> Option<LockReason> {
        self.reason.get().copied()
    }
}

/// What a locked surface must display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeniedNotice {
    pub message: &'static str,
    pub interactive: bool,
    pub dismissible: bool,
    pub capture_allowed: bool,
}

impl DeniedNotice {
    pub const fn standard() -> Self {
        Self {
            message: "Service unavailable.",
            interactive: false,
            dismissible: false,
            capture_allowed: false,
        }
    }
}

/// A user-facing surface that must be covered once trust is lost.
pub trait LockdownSurface: Send + Sync {
    /// Replace all interactive content with `notice` and block screen capture.
    fn present(&self, notice: &DeniedNotice);
}

/// Owns the process trust verdict and covers every surface when it trips.
pub struct LockdownController {
    state: TrustState,
    surfaces: Mutex<Vec<Arc<dyn LockdownSurface>>>,
    notice: DeniedNotice,
    signal: watch::Sender<bool>,
}

impl Default for LockdownController {
    fn default() -> Self {
        Self::new()
    }
}

impl LockdownController {
    pub fn new() -> Self {
        let (signal, _) = watch::channel(false);
        Self {
            state: TrustState::new(),
            surfaces: Mutex::new(Vec::new()),
            notice: DeniedNotice::standard(),
            signal,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.state.is_locked()
    }

    pub fn reason(&self) -> Option<LockReason> {
        self.state.reason()
    }

    pub fn notice(&self) -> &DeniedNotice {
        &self.notice
    }

    /// Enter `Locked`. Re-entering is a no-op.
    pub fn trip(&self, reason: LockReason) {
        if !self.state.trip(reason) {
            return;
        }
        tracing::warn!(%reason, "trust lost, locking down");
        self.signal.send_replace(true);

        let surfaces = match self.surfaces.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        for surface in surfaces {
            surface.present(&self.notice);
        }
    }

    /// Register a surface. One attached after the trip is covered immediately.
    pub fn attach(&self, surface: Arc<dyn LockdownSurface>) {
        {
            let mut surfaces = match self.surfaces.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            surfaces.push(Arc::clone(&surface));
        }
        if self.is_locked() {
            surface.present(&self.notice);
        }
    }

    /// Boolean lock signal for hosts that render reactively.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.signal.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingSurface {
        presented: AtomicUsize,
    }

    impl LockdownSurface for CountingSurface {
        fn present(&self, notice: &DeniedNotice) {
            assert!(!notice.interactive);
            assert!(!notice.dismissible);
            assert!(!notice.capture_allowed);
            self.presented.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn starts_trusted() {
        let controller = LockdownController::new();
        assert!(!controller.is_locked());
        assert_eq!(controller.reason(), None);
    }

    #[test]
    fn trip_is_one_way_and_keeps_first_reason() {
        let state = TrustState::new();
        assert!(state.trip(LockReason::SuspiciousProxy));
        assert!(!state.trip(LockReason::CertificateMismatch));
        assert!(state.is_locked());
        assert_eq!(state.reason(), Some(LockReason::SuspiciousProxy));
    }

    #[test]
    fn surfaces_are_covered_once() {
        let controller = LockdownController::new();
        let surface = Arc::new(CountingSurface::default());
        controller.attach(surface.clone());

        controller.trip(LockReason::CertificateMismatch);
        controller.trip(LockReason::CertificateMismatch);
        assert_eq!(surface.presented.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn late_surface_is_covered_on_attach() {
        let controller = LockdownController::new();
        controller.trip(LockReason::ResolutionFailed);

        let surface = Arc::new(CountingSurface::default());
        controller.attach(surface.clone());
        assert_eq!(surface.presented.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn subscribers_observe_the_lock() {
        let controller = LockdownController::new();
        let mut rx = controller.subscribe();
        assert!(!*rx.borrow());

        controller.trip(LockReason::SuspiciousProxy);
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }

    #[test]
    fn concurrent_trips_transition_once() {
        let state = Arc::new(TrustState::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let state = Arc::clone(&state);
                std::thread::spawn(move || state.trip(LockReason::SuspiciousProxy))
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
