use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::constant::Action;
use crate::utils::{abs_gap, push_bounded, HISTORY_LEN};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: String,
    pub instrument_id: String,
    pub action: Action,
    /// Start time of the bar that produced the signal.
    pub signal_datetime: DateTime<Utc>,
    pub created_datetime: DateTime<Utc>,
    pub tag: String,
    pub is_valid: bool,
}

/// Time windows within which a signal may still be acted upon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalValidity {
    pub latency: Duration,
    pub survival: Duration,
}

impl SignalValidity {
    pub fn new(latency: Duration, survival: Duration) -> Self {
        Self { latency, survival }
    }

    /// A signal is live if it was created soon enough after its bar, or if the
    /// series has not moved on too far since it was created.
    pub fn is_valid(
        &self,
        signal_datetime: DateTime<Utc>,
        created_datetime: DateTime<Utc>,
        current_bar_datetime: DateTime<Utc>,
    ) -> bool {
        abs_gap(created_datetime, signal_datetime) <= self.latency
            || abs_gap(current_bar_datetime, created_datetime) <= self.survival
    }
}

pub trait SignalSink {
    fn publish(&mut self, signal: Signal);
}

/// In-process signal store. Every published signal is handed out once.
///
/// Consumed and discarded signals are kept as bounded histories.
#[derive(Debug)]
pub struct SignalBook {
    pending: Vec<Signal>,
    consumed: VecDeque<Signal>,
    discarded: VecDeque<Signal>,
    history_len: usize,
}

impl Default for SignalBook {
    fn default() -> Self {
        Self::with_history(HISTORY_LEN)
    }
}

impl SignalBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history(history_len: usize) -> Self {
        Self {
            pending: Vec::new(),
            consumed: VecDeque::new(),
            discarded: VecDeque::new(),
            history_len,
        }
    }

    /// Removes and returns pending signals carrying `tag`, oldest first.
    pub fn take_tagged(&mut self, tag: &str) -> Vec<Signal> {
        let (taken, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|s| s.tag == tag);
        self.pending = rest;
        for signal in &taken {
            push_bounded(&mut self.consumed, signal.clone(), self.history_len);
        }
        taken
    }

    /// Records taken signals that never reached an allocation. They are not
    /// handed out again.
    pub fn discard(&mut self, signals: Vec<Signal>) {
        for signal in signals {
            tracing::warn!(
                id = %signal.id,
                instrument = %signal.instrument_id,
                tag = %signal.tag,
                "signal discarded without allocation"
            );
            if let Some(idx) = self.consumed.iter().rposition(|s| s.id == signal.id) {
                self.consumed.remove(idx);
            }
            push_bounded(&mut self.discarded, signal, self.history_len);
        }
    }

    pub fn pending(&self) -> &[Signal] {
        &self.pending
    }

    pub fn consumed(&self) -> &VecDeque<Signal> {
        &self.consumed
    }

    pub fn discarded(&self) -> &VecDeque<Signal> {
        &self.discarded
    }
}

impl SignalSink for SignalBook {
    fn publish(&mut self, signal: Signal) {
        tracing::info!(
            id = %signal.id,
            instrument = %signal.instrument_id,
            action = %signal.action,
            tag = %signal.tag,
            "signal published"
        );
        self.pending.push(signal);
    }
}

#[cfg(test)]
mod tests {
    use super::{Signal, SignalBook, SignalSink, SignalValidity};
    use crate::constant::Action;
    use chrono::{Duration, TimeZone, Utc};

    fn signal(id: &str, tag: &str) -> Signal {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).single().expect("valid dt");
        Signal {
            id: id.to_string(),
            instrument_id: "EUR.USD".to_string(),
            action: Action::Buy,
            signal_datetime: ts,
            created_datetime: ts,
            tag: tag.to_string(),
            is_valid: true,
        }
    }

    #[test]
    fn zero_windows_only_accept_exact_matches() {
        let validity = SignalValidity::new(Duration::zero(), Duration::zero());
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).single().expect("valid dt");
        let t1 = t0 + Duration::minutes(1);

        assert!(validity.is_valid(t0, t0, t1));
        assert!(validity.is_valid(t0, t1, t1));
        assert!(!validity.is_valid(t0, t1, t1 + Duration::seconds(1)));
    }

    #[test]
    fn survival_window_keeps_late_signal_alive() {
        let validity = SignalValidity::new(Duration::minutes(1), Duration::days(1));
        let bar = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).single().expect("valid dt");
        let created = bar + Duration::hours(3);

        assert!(validity.is_valid(bar, created, created + Duration::hours(2)));
        assert!(!validity.is_valid(bar, created, created + Duration::days(2)));
    }

    #[test]
    fn tagged_signals_are_taken_once() {
        let mut book = SignalBook::new();
        book.publish(signal("a", "EW1"));
        book.publish(signal("b", "EW2"));
        book.publish(signal("c", "EW1"));

        let taken = book.take_tagged("EW1");
        assert_eq!(taken.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(), ["a", "c"]);
        assert!(book.take_tagged("EW1").is_empty());
        assert_eq!(book.pending().len(), 1);
        assert_eq!(book.consumed().len(), 2);
    }

    #[test]
    fn discarded_signals_leave_the_consumed_history() {
        let mut book = SignalBook::with_history(2);
        book.publish(signal("a", "EW1"));
        book.publish(signal("b", "EW1"));
        book.publish(signal("c", "EW1"));

        let taken = book.take_tagged("EW1");
        assert_eq!(taken.len(), 3);
        assert_eq!(book.consumed().iter().map(|s| s.id.as_str()).collect::<Vec<_>>(), ["b", "c"]);

        book.discard(taken);
        assert!(book.consumed().is_empty());
        assert_eq!(book.discarded().iter().map(|s| s.id.as_str()).collect::<Vec<_>>(), ["b", "c"]);
        assert!(book.take_tagged("EW1").is_empty());
    }
}
