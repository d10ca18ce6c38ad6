use std::sync::Mutex;

use chrono::Utc;

/// Millisecond clock for patch timestamps.
///
/// Every value returned by [`PatchClock::tick`] is strictly greater than the
/// previous one, even when the wall clock stalls or steps backwards:
/// `next = max(wall, last + 1)`. A branch seeds its clock from the last patch
/// it recovered so timestamps keep increasing across restarts.
pub struct PatchClock {
    last: Mutex<u64>,
}

impl PatchClock {
    pub fn new() -> Self {
        Self::starting_after(0)
    }

    /// A clock whose first tick is strictly greater than `last`.
    pub fn starting_after(last: u64) -> Self {
        Self {
            last: Mutex::new(last),
        }
    }

    /// Next strictly increasing timestamp.
    pub fn tick(&self) -> u64 {
        let wall = wall_clock_ms();
        let mut last = self.last.lock().expect("clock mutex poisoned");
        let next = wall.max(*last + 1);
        *last = next;
        next
    }

    /// Ensure future ticks are strictly greater than `seen`.
    pub fn observe(&self, seen: u64) {
        let mut last = self.last.lock().expect("clock mutex poisoned");
        if seen > *last {
            *last = seen;
        }
    }

    /// The most recent value handed out (or observed).
    pub fn last(&self) -> u64 {
        *self.last.lock().expect("clock mutex poisoned")
    }
}

impl Default for PatchClock {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PatchClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatchClock").field("last", &self.last()).finish()
    }
}

/// Current wall-clock time in milliseconds since the UNIX epoch.
pub fn wall_clock_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}
