//! Bounding the number of concurrently running detect/track operations.

use std::{
    fmt,
    sync::{Arc, Condvar, Mutex},
};

/// A counting pool of [`Permit`]s.
///
/// The only backpressure mechanism of the pipeline: once all permits are handed out,
/// [`ConcurrencyLimiter::acquire`] blocks the camera thread until an operation completes. Frames
/// arriving in the meantime are dropped by the camera (or the [`FrameRateGate`]), never queued.
///
/// Callers that would rather skip work than wait can use [`ConcurrencyLimiter::try_acquire`]
/// instead.
///
/// Cloning a [`ConcurrencyLimiter`] yields another handle to the same pool.
///
/// [`FrameRateGate`]: crate::gate::FrameRateGate
#[derive(Clone)]
pub struct ConcurrencyLimiter {
    shared: Arc<Shared>,
}

struct Shared {
    capacity: usize,
    /// Number of permits currently handed out.
    in_flight: Mutex<usize>,
    released: Condvar,
}

impl ConcurrencyLimiter {
    /// The default number of operations allowed to run at once.
    pub const DEFAULT_CAPACITY: usize = 2;

    /// Creates a pool of `capacity` permits.
    ///
    /// # Panics
    ///
    /// This method will panic if `capacity` is 0, since [`ConcurrencyLimiter::acquire`] could
    /// never return.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "concurrency limiter needs at least one permit");
        Self {
            shared: Arc::new(Shared {
                capacity,
                in_flight: Mutex::new(0),
                released: Condvar::new(),
            }),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Returns the number of permits that are currently acquired and not yet released.
    pub fn in_flight(&self) -> usize {
        *self.shared.in_flight.lock().unwrap()
    }

    /// Takes a permit out of the pool, blocking until one is available.
    ///
    /// Waiters are not woken in any particular order.
    pub fn acquire(&self) -> Permit {
        let mut in_flight = self.shared.in_flight.lock().unwrap();
        while *in_flight == self.shared.capacity {
            in_flight = self.shared.released.wait(in_flight).unwrap();
        }
        *in_flight += 1;
        drop(in_flight);

        Permit {
            shared: self.shared.clone(),
        }
    }

    /// Takes a permit out of the pool if one is available right now.
    pub fn try_acquire(&self) -> Option<Permit> {
        let mut in_flight = self.shared.in_flight.lock().unwrap();
        if *in_flight == self.shared.capacity {
            return None;
        }
        *in_flight += 1;
        drop(in_flight);

        Some(Permit {
            shared: self.shared.clone(),
        })
    }
}

impl fmt::Debug for ConcurrencyLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrencyLimiter")
            .field("capacity", &self.capacity())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

/// Permission to run one operation, obtained from [`ConcurrencyLimiter::acquire`].
///
/// The permit is returned to its pool when dropped, so it is released exactly once no matter how
/// the operation ends. Permits can be sent to other threads, and usually travel along with the
/// frame they were acquired for.
#[must_use = "dropping a `Permit` immediately releases it"]
pub struct Permit {
    shared: Arc<Shared>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        let mut in_flight = self.shared.in_flight.lock().unwrap();
        *in_flight -= 1;
        drop(in_flight);
        self.shared.released.notify_one();
    }
}

impl fmt::Debug for Permit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Permit").finish_non_exhaustive()
    }
}
