use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rand::{thread_rng, Rng};

static SEQ_NO: AtomicU64 = AtomicU64::new(0);

/// Next value of the process-global sequence counter. Strictly increasing
/// across all destinations; the first call returns 1.
pub(crate) fn next_seq_no() -> u64 {
    SEQ_NO.fetch_add(1, Ordering::Relaxed) + 1
}

const BACKOFF_CAP_SECS: u64 = 120;

/// Random-exponent backoff: `2^rand(0..attempt)` seconds, capped at 120s,
/// and unconditionally 120s once the attempt count reaches 32.
///
/// The random *exponent* (rather than a random delay below a deterministic
/// exponential bound) is the intended schedule.
pub(crate) fn random_backoff(attempt: u32) -> Duration {
    if attempt >= 32 {
        return Duration::from_secs(BACKOFF_CAP_SECS);
    }
    let exponent = thread_rng().gen_range(0..attempt.max(1));
    Duration::from_secs(2u64.saturating_pow(exponent).min(BACKOFF_CAP_SECS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_no_is_strictly_increasing() {
        let a = next_seq_no();
        let b = next_seq_no();
        let c = next_seq_no();
        assert!(a < b && b < c);
    }

    #[test]
    fn test_backoff_first_attempt_is_one_second() {
        // attempt 1 only allows exponent 0
        assert_eq!(random_backoff(1), Duration::from_secs(1));
    }

    #[test]
    fn test_backoff_stays_within_cap() {
        for attempt in 1..40 {
            let delay = random_backoff(attempt);
            assert!(delay >= Duration::from_secs(1));
            assert!(delay <= Duration::from_secs(BACKOFF_CAP_SECS));
        }
    }

    #[test]
    fn test_backoff_saturates_after_attempt_32() {
        assert_eq!(random_backoff(32), Duration::from_secs(BACKOFF_CAP_SECS));
        assert_eq!(random_backoff(100), Duration::from_secs(BACKOFF_CAP_SECS));
    }
}
