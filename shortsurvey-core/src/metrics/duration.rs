//! Start/stop pairing for watch and comment-panel durations.

use crate::types::{Event, EventKind};
use chrono::{DateTime, Utc};

/// Whether a start is currently waiting for its end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum PairingState {
    #[default]
    Idle,
    Open(DateTime<Utc>),
}

/// Accumulates `end - start` over a timestamp-ordered stream of start and end
/// marks.
///
/// The first start wins: a second start while one is open is ignored. An end
/// with nothing open is ignored. A start left open when the stream ends adds
/// nothing.
#[derive(Debug, Clone, Default)]
pub struct DurationPairing {
    state: PairingState,
    total_ms: i64,
}

impl DurationPairing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, at: DateTime<Utc>) {
        if self.state == PairingState::Idle {
            self.state = PairingState::Open(at);
        }
    }

    pub fn end(&mut self, at: DateTime<Utc>) {
        if let PairingState::Open(started) = self.state {
            self.total_ms += (at - started).num_milliseconds();
            self.state = PairingState::Idle;
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, PairingState::Open(_))
    }

    /// Closed intervals so far, in seconds
    pub fn total_seconds(&self) -> f64 {
        self.total_ms as f64 / 1000.0
    }
}

/// Total seconds between paired `start`/`end` events.
///
/// `events` must already be in timestamp order; kinds other than `start` and
/// `end` are skipped.
pub fn sequential_duration<'a, I>(events: I, start: EventKind, end: EventKind) -> f64
where
    I: IntoIterator<Item = &'a Event>,
{
    let mut pairing = DurationPairing::new();
    for event in events {
        if event.kind == start {
            pairing.start(event.timestamp);
        } else if event.kind == end {
            pairing.end(event.timestamp);
        }
    }
    pairing.total_seconds()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn events(marks: &[(EventKind, i64)]) -> Vec<Event> {
        marks
            .iter()
            .enumerate()
            .map(|(i, (kind, secs))| Event {
                id: i as i64 + 1,
                user_id: "u1".to_string(),
                video_id: "v1".to_string(),
                timestamp: t(*secs),
                kind: *kind,
                session_id: "s1".to_string(),
            })
            .collect()
    }

    use EventKind::{WatchStart as S, WatchStop as E};

    #[test]
    fn test_two_closed_intervals() {
        let log = events(&[(S, 0), (E, 5), (S, 10), (E, 12)]);
        assert_eq!(sequential_duration(&log, S, E), 7.0);
    }

    #[test]
    fn test_first_start_wins() {
        let log = events(&[(S, 0), (S, 4), (E, 9)]);
        assert_eq!(sequential_duration(&log, S, E), 9.0);
    }

    #[test]
    fn test_lone_end_is_noop() {
        let log = events(&[(E, 3)]);
        assert_eq!(sequential_duration(&log, S, E), 0.0);
    }

    #[test]
    fn test_unmatched_end_then_fresh_start() {
        let log = events(&[(E, 1), (S, 2), (E, 6), (E, 8)]);
        assert_eq!(sequential_duration(&log, S, E), 4.0);
    }

    #[test]
    fn test_open_start_contributes_nothing() {
        let mut pairing = DurationPairing::new();
        pairing.start(t(0));
        pairing.end(t(2));
        pairing.start(t(10));
        assert!(pairing.is_open());
        assert_eq!(pairing.total_seconds(), 2.0);
    }

    #[test]
    fn test_other_kinds_ignored() {
        let log = events(&[
            (S, 0),
            (EventKind::CommentOpen, 1),
            (EventKind::Like, 2),
            (E, 3),
        ]);
        assert_eq!(sequential_duration(&log, S, E), 3.0);
        assert_eq!(
            sequential_duration(&log, EventKind::CommentOpen, EventKind::CommentClose),
            0.0
        );
    }

    #[test]
    fn test_subsecond_precision() {
        let mut pairing = DurationPairing::new();
        pairing.start(t(0));
        pairing.end(t(1) + Duration::milliseconds(250));
        assert_eq!(pairing.total_seconds(), 1.25);
    }
}
