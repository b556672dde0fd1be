//! Wall-clock millisecond timestamps.
//!
//! Timer deadlines are absolute millisecond timestamps so they can be
//! compared and subtracted directly when computing poll timeouts.

use chrono::Utc;

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms_advances() {
        let a = now_ms();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let b = now_ms();
        assert!(b > a);
    }
}
