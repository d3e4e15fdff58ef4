use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};

/// Default length of the signal, allocation and order histories.
pub const HISTORY_LEN: usize = 1_024;

/// Appends `item` and evicts from the front until at most `cap` remain.
pub fn push_bounded<T>(history: &mut VecDeque<T>, item: T, cap: usize) {
    history.push_back(item);
    while history.len() > cap.max(1) {
        history.pop_front();
    }
}

/// Absolute distance between two instants.
pub fn abs_gap(a: DateTime<Utc>, b: DateTime<Utc>) -> Duration {
    let gap = a - b;
    if gap < Duration::zero() { -gap } else { gap }
}

/// Floors `ts` to a multiple of `step` counted from the unix epoch.
pub fn floor_to(ts: DateTime<Utc>, step: Duration) -> DateTime<Utc> {
    let step_secs = step.num_seconds();
    if step_secs <= 0 {
        return ts;
    }
    let secs = ts.timestamp();
    let floored = secs - secs.rem_euclid(step_secs);
    DateTime::<Utc>::from_timestamp(floored, 0).unwrap_or(ts)
}

#[cfg(test)]
mod tests {
    use super::{abs_gap, floor_to, push_bounded};
    use chrono::{Duration, TimeZone, Utc};
    use std::collections::VecDeque;

    #[test]
    fn abs_gap_is_symmetric() {
        let a = Utc.with_ymd_and_hms(2024, 1, 2, 10, 0, 0).single().expect("valid dt");
        let b = a + Duration::seconds(90);
        assert_eq!(abs_gap(a, b), Duration::seconds(90));
        assert_eq!(abs_gap(b, a), Duration::seconds(90));
    }

    #[test]
    fn floor_to_hour() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 10, 37, 12).single().expect("valid dt");
        let floored = floor_to(ts, Duration::hours(1));
        assert_eq!(floored, Utc.with_ymd_and_hms(2024, 1, 2, 10, 0, 0).single().expect("valid dt"));
    }

    #[test]
    fn push_bounded_evicts_oldest() {
        let mut history = VecDeque::new();
        for i in 0..5 {
            push_bounded(&mut history, i, 3);
        }
        assert_eq!(history, [2, 3, 4]);
    }
}
