//! Exclusive access to the audio device

use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// What holds the audio device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioKind {
    Capture,
    Playback,
}

/// Proof of holding the audio device.
///
/// The token is cancelled when another holder takes the device.
#[derive(Debug, Clone)]
pub struct AudioLease {
    id: u64,
    kind: AudioKind,
    token: CancellationToken,
}

impl AudioLease {
    pub fn kind(&self) -> AudioKind {
        self.kind
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_preempted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether both leases come from the same acquisition
    pub fn same_as(&self, other: &AudioLease) -> bool {
        self.id == other.id
    }
}

type Teardown = Box<dyn FnOnce() + Send>;

struct Holder {
    id: u64,
    kind: AudioKind,
    token: CancellationToken,
    teardown: Teardown,
}

#[derive(Default)]
struct ArbiterInner {
    next_id: u64,
    holder: Option<Holder>,
}

/// Hands out one audio lease at a time
#[derive(Clone, Default)]
pub struct AudioArbiter {
    inner: Arc<Mutex<ArbiterInner>>,
}

impl AudioArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the device, tearing down the current holder first.
    ///
    /// `teardown` runs if this lease is later preempted.
    pub fn acquire(&self, kind: AudioKind, teardown: impl FnOnce() + Send + 'static) -> AudioLease {
        let token = CancellationToken::new();
        let (lease, previous) = {
            let mut inner = self.inner.lock();
            inner.next_id += 1;
            let id = inner.next_id;
            let previous = inner.holder.replace(Holder {
                id,
                kind,
                token: token.clone(),
                teardown: Box::new(teardown),
            });
            (AudioLease { id, kind, token }, previous)
        };

        if let Some(previous) = previous {
            tracing::debug!(from = ?previous.kind, to = ?kind, "audio device preempted");
            previous.token.cancel();
            (previous.teardown)();
        }
        lease
    }

    /// Give the device back; returns false if the lease was already preempted
    pub fn release(&self, lease: &AudioLease) -> bool {
        let mut inner = self.inner.lock();
        if inner.holder.as_ref().is_some_and(|h| h.id == lease.id) {
            inner.holder = None;
            true
        } else {
            false
        }
    }

    /// Kind of the current holder
    pub fn current(&self) -> Option<AudioKind> {
        self.inner.lock().holder.as_ref().map(|h| h.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_acquire_preempts_previous_holder() {
        let arbiter = AudioArbiter::new();
        let torn_down = Arc::new(AtomicUsize::new(0));
        let counter = torn_down.clone();

        let playback = arbiter.acquire(AudioKind::Playback, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(arbiter.current(), Some(AudioKind::Playback));

        let capture = arbiter.acquire(AudioKind::Capture, || {});
        assert!(playback.is_preempted());
        assert!(!capture.is_preempted());
        assert_eq!(torn_down.load(Ordering::SeqCst), 1);
        assert_eq!(arbiter.current(), Some(AudioKind::Capture));

        assert!(!arbiter.release(&playback));
        assert!(arbiter.release(&capture));
        assert_eq!(arbiter.current(), None);
    }

    #[test]
    fn test_release_does_not_run_teardown() {
        let arbiter = AudioArbiter::new();
        let torn_down = Arc::new(AtomicUsize::new(0));
        let counter = torn_down.clone();

        let lease = arbiter.acquire(AudioKind::Capture, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(arbiter.release(&lease));
        let _next = arbiter.acquire(AudioKind::Playback, || {});

        assert_eq!(torn_down.load(Ordering::SeqCst), 0);
        assert!(!lease.is_preempted());
    }
}
