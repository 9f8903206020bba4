use super::{PeriodClock, Validity};
use tokio::time::{Duration, Instant};

#[test]
fn test_period_clock_first_check_passes() {
    let mut clock = PeriodClock::new();
    assert!(!clock.is_defined());
    assert!(clock.check_update(Duration::from_secs(30)));
    assert!(clock.is_defined());
}

#[test]
fn test_period_clock_gates_until_period_elapsed() {
    let start = Instant::now();
    let mut clock = PeriodClock::new();
    clock.update_at(start);
    let period = Duration::from_secs(30);
    assert!(!clock.check_update_at(period, start + Duration::from_secs(10)));
    assert!(!clock.check_update_at(period, start + Duration::from_secs(29)));
    assert!(clock.check_update_at(period, start + Duration::from_secs(30)));
    // the successful check restarted the period
    assert!(!clock.check_update_at(period, start + Duration::from_secs(31)));
}

#[test]
fn test_validity_expires() {
    let start = Instant::now();
    let mut v = Validity::invalid();
    assert!(!v.is_fresh(start, Duration::from_secs(1)));
    v.update(start);
    assert!(v.is_fresh(start + Duration::from_millis(500), Duration::from_secs(1)));
    v.expire(start + Duration::from_secs(2), Duration::from_secs(1));
    assert!(!v.is_valid());
}
