//! Fixed-window admission counter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

/// Lock-free fixed-window counter.
///
/// The window index and the admitted count are packed into one `AtomicU64`
/// (index in the high 32 bits, count in the low 32), so rolling over to a
/// new window and counting within it are a single compare-and-swap. The
/// invariant: the count for a window never exceeds the ceiling passed to
/// `try_admit`.
#[derive(Debug, Default)]
pub struct WindowCounter {
    state: AtomicU64,
}

impl WindowCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current time in milliseconds since the epoch.
    pub fn now_millis() -> i64 {
        SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64
    }

    fn pack(window_id: u32, count: u32) -> u64 {
        ((window_id as u64) << 32) | count as u64
    }

    fn unpack(state: u64) -> (u32, u32) {
        ((state >> 32) as u32, state as u32)
    }

    /// Try to admit one event. Returns `(admitted, used)` where `used` is
    /// the count in the current window after the call.
    pub fn try_admit(&self, limit: u32, window_ms: u64) -> (bool, u32) {
        let current_window = (Self::now_millis() as u64 / window_ms.max(1)) as u32;

        loop {
            let state = self.state.load(Ordering::Relaxed);
            let (window_id, count) = Self::unpack(state);

            let (new_state, admitted, used) = if window_id != current_window {
                // Window elapsed, reset the count
                (Self::pack(current_window, 1), true, 1)
            } else if count < limit {
                (Self::pack(window_id, count + 1), true, count + 1)
            } else {
                return (false, count);
            };

            if self
                .state
                .compare_exchange_weak(state, new_state, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return (admitted, used);
            }
            // CAS failed, retry
        }
    }

    /// Window index of the last admission, for staleness sweeps.
    pub fn last_window(&self) -> u32 {
        Self::unpack(self.state.load(Ordering::Relaxed)).0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_ceiling_enforced() {
        let counter = WindowCounter::new();
        let window_ms = 60_000;

        for _ in 0..5 {
            assert!(counter.try_admit(5, window_ms).0);
        }
        assert!(!counter.try_admit(5, window_ms).0);
    }

    #[test]
    fn test_window_reset() {
        let counter = WindowCounter::new();

        // 1ms windows elapse between iterations
        assert!(counter.try_admit(1, 1).0);
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(counter.try_admit(1, 1).0);
    }

    #[test]
    fn test_concurrent_admissions_respect_limit() {
        let counter = Arc::new(WindowCounter::new());
        let limit = 10;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counter = counter.clone();
                std::thread::spawn(move || {
                    let mut admitted = 0;
                    for _ in 0..10 {
                        if counter.try_admit(limit, 3_600_000).0 {
                            admitted += 1;
                        }
                    }
                    admitted
                })
            })
            .collect();

        let total: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, limit);
    }
}
