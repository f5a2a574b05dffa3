//! Time sources for deadlines and record timestamps.

use std::sync::OnceLock;
use std::time::Instant;

/// Monotonic and wall-clock time, in microseconds.
pub trait Clock: Send + Sync {
    /// Monotonic time since process start. Used for deadline arithmetic.
    fn boot_time_micros(&self) -> u64;

    /// Microseconds since the Unix epoch. Used for record timestamps.
    fn wall_time_micros(&self) -> i64;
}

/// The process clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

fn process_origin() -> Instant {
    static ORIGIN: OnceLock<Instant> = OnceLock::new();
    *ORIGIN.get_or_init(Instant::now)
}

impl Clock for SystemClock {
    fn boot_time_micros(&self) -> u64 {
        u64::try_from(process_origin().elapsed().as_micros()).unwrap_or(u64::MAX)
    }

    fn wall_time_micros(&self) -> i64 {
        chrono::Utc::now().timestamp_micros()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boot_time_is_monotonic() {
        let clock = SystemClock;
        let a = clock.boot_time_micros();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = clock.boot_time_micros();
        assert!(b > a);
    }

    #[test]
    fn test_wall_time_is_after_2020() {
        // 2020-01-01T00:00:00Z
        assert!(SystemClock.wall_time_micros() > 1_577_836_800_000_000);
    }
}
