use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use tracing::trace;

use crate::error::ScanError;

pub use frame_scan_common::config::DEFAULT_MAX_CONCURRENT;

/// Counting gate bounding how many detector invocations run at once.
///
/// `acquire` blocks the calling thread until a slot frees up. This is the
/// scanner's backpressure point: a producer looping on `scan_image` stalls
/// here instead of queueing unbounded work.
pub struct AdmissionGate {
    in_flight: Mutex<usize>,
    slot_freed: Condvar,
    capacity: usize,
}

/// One admitted detector invocation. The slot is returned when this is dropped.
///
/// Permits can only be minted by the gate, so a release without a matching
/// acquire cannot be expressed.
#[must_use = "dropping the permit immediately frees the slot"]
pub struct AdmissionPermit {
    gate: Arc<AdmissionGate>,
}

impl AdmissionGate {
    pub fn new(capacity: usize) -> Result<Arc<Self>, ScanError> {
        if capacity == 0 {
            return Err(ScanError::InvalidConcurrency(capacity));
        }
        Ok(Arc::new(Self {
            in_flight: Mutex::new(0),
            slot_freed: Condvar::new(),
            capacity,
        }))
    }

    /// Block until a slot is available and take it.
    pub fn acquire(self: &Arc<Self>) -> AdmissionPermit {
        let mut in_flight = self.lock();
        while *in_flight >= self.capacity {
            in_flight = self
                .slot_freed
                .wait(in_flight)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *in_flight += 1;
        trace!(in_flight = *in_flight, capacity = self.capacity, "slot acquired");
        AdmissionPermit {
            gate: Arc::clone(self),
        }
    }

    /// Take a slot only if one is free right now.
    pub fn try_acquire(self: &Arc<Self>) -> Option<AdmissionPermit> {
        let mut in_flight = self.lock();
        if *in_flight >= self.capacity {
            return None;
        }
        *in_flight += 1;
        Some(AdmissionPermit {
            gate: Arc::clone(self),
        })
    }

    pub fn in_flight(&self) -> usize {
        *self.lock()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn release(&self) {
        let mut in_flight = self.lock();
        debug_assert!(*in_flight > 0, "admission slot released more times than acquired");
        *in_flight = in_flight.saturating_sub(1);
        trace!(in_flight = *in_flight, capacity = self.capacity, "slot released");
        drop(in_flight);
        self.slot_freed.notify_one();
    }

    // The counter stays consistent even if a holder panicked, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, usize> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.gate.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn zero_capacity_rejected() {
        assert!(matches!(
            AdmissionGate::new(0),
            Err(ScanError::InvalidConcurrency(0))
        ));
    }

    #[test]
    fn try_acquire_respects_capacity() {
        let gate = AdmissionGate::new(DEFAULT_MAX_CONCURRENT).unwrap();
        assert_eq!(gate.capacity(), 2);
        let a = gate.try_acquire().unwrap();
        let _b = gate.try_acquire().unwrap();
        assert!(gate.try_acquire().is_none());
        assert_eq!(gate.in_flight(), 2);

        drop(a);
        assert_eq!(gate.in_flight(), 1);
        assert!(gate.try_acquire().is_some());
    }

    #[test]
    fn acquire_blocks_until_release() {
        let gate = AdmissionGate::new(1).unwrap();
        let held = gate.acquire();

        let (tx, rx) = mpsc::channel();
        let waiter = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || {
                let _permit = gate.acquire();
                tx.send(()).unwrap();
            })
        };

        // Still blocked while the first permit is held.
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

        drop(held);
        rx.recv_timeout(Duration::from_secs(5))
            .expect("waiter should be admitted after release");
        waiter.join().unwrap();
        assert_eq!(gate.in_flight(), 0);
    }

    #[test]
    fn permit_released_on_panic() {
        let gate = AdmissionGate::new(1).unwrap();
        let worker = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || {
                let _permit = gate.acquire();
                panic!("detector blew up");
            })
        };
        assert!(worker.join().is_err());
        assert_eq!(gate.in_flight(), 0);
        assert!(gate.try_acquire().is_some());
    }

    #[test]
    fn permit_outlives_gate_handle() {
        let gate = AdmissionGate::new(1).unwrap();
        let permit = gate.acquire();
        let observer = Arc::clone(&gate);
        drop(gate);
        assert_eq!(observer.in_flight(), 1);
        drop(permit);
        assert_eq!(observer.in_flight(), 0);
    }
}
