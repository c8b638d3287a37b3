//! Single injectable clock (C1). Every component that needs "now" takes a
//! `&dyn Clock` rather than calling `Utc::now()` directly, so tests can
//! supply a fixed or stepped clock and so adjustment tokens are
//! deterministic under replay.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Capability interface for time and identifier generation.
pub trait Clock: Send + Sync {
    /// Current UTC instant, truncated to millisecond precision — the
    /// granularity used for every externally-visible timestamp.
    fn now_millis(&self) -> DateTime<Utc>;

    /// Current UTC instant in raw microseconds since the epoch, used only
    /// for internal sequencing (hash-chain / audit ordering).
    fn now_micros(&self) -> i64;

    fn new_uuid(&self) -> Uuid;
}

/// Production clock backed by the system clock and a random UUID source.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> DateTime<Utc> {
        let now = Utc::now();
        DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
    }

    fn now_micros(&self) -> i64 {
        Utc::now().timestamp_micros()
    }

    fn new_uuid(&self) -> Uuid {
        Uuid::new_v4()
    }
}

/// Deterministic clock for tests: each call to `now_*` advances by a fixed
/// step so event ordering is reproducible without real wall-clock waits.
pub struct StepClock {
    start: DateTime<Utc>,
    step: chrono::Duration,
    ticks: std::sync::atomic::AtomicI64,
    next_uuid: std::sync::Mutex<u64>,
}

impl StepClock {
    pub fn new(start: DateTime<Utc>, step: chrono::Duration) -> Self {
        StepClock {
            start,
            step,
            ticks: std::sync::atomic::AtomicI64::new(0),
            next_uuid: std::sync::Mutex::new(1),
        }
    }

    fn advance(&self) -> DateTime<Utc> {
        let n = self
            .ticks
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.start + self.step * n as i32
    }
}

impl Clock for StepClock {
    fn now_millis(&self) -> DateTime<Utc> {
        self.advance()
    }

    fn now_micros(&self) -> i64 {
        self.advance().timestamp_micros()
    }

    fn new_uuid(&self) -> Uuid {
        let mut guard = self.next_uuid.lock().expect("lock poisoned");
        let n = *guard;
        *guard += 1;
        Uuid::from_u128(n as u128)
    }
}

/// Default adjustment-token format per spec §4.1: `"{position_id}:adjust:{epoch_ms}"`.
/// Callers that need replay-safe idempotency (e.g. periodic trailing-stop
/// ticks keyed by candle close) should pass their own deterministic token
/// instead of relying on this helper — see §9 Open Questions.
pub fn default_adjustment_token(position_id: i64, clock: &dyn Clock) -> String {
    let epoch_ms = clock.now_millis().timestamp_millis();
    format!("{position_id}:adjust:{epoch_ms}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_clock_advances_monotonically() {
        let clock = StepClock::new(Utc::now(), chrono::Duration::seconds(1));
        let a = clock.now_millis();
        let b = clock.now_millis();
        assert!(b > a);
    }

    #[test]
    fn step_clock_uuids_are_deterministic_and_unique() {
        let clock = StepClock::new(Utc::now(), chrono::Duration::seconds(1));
        let a = clock.new_uuid();
        let b = clock.new_uuid();
        assert_ne!(a, b);
    }

    #[test]
    fn default_adjustment_token_format() {
        let clock = StepClock::new(
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            chrono::Duration::seconds(1),
        );
        let token = default_adjustment_token(42, &clock);
        assert!(token.starts_with("42:adjust:"));
    }
}
