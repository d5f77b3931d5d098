//! EventRecorder - fire counts and last payloads for controller events.
//!
//! The recorder hooks the controller's event bus, so counts are updated in
//! the controller's own dispatch order and read back only after the host
//! scheduler has returned.

use crate::error::RecorderError;
use crate::lock;
use lockstep_core::{EventBus, HandlerId};
use lockstep_env::Params;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// What has been seen for one observed event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordedEvent {
    /// Times the event was dispatched since `observe`
    pub count: u32,

    /// Parameters of the latest dispatch
    pub last_params: Option<Params>,
}

/// Records dispatches of named events on an `EventBus`.
#[derive(Default)]
pub struct EventRecorder {
    entries: Arc<Mutex<HashMap<String, RecordedEvent>>>,
    hooks: HashMap<String, HandlerId>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts (or restarts) recording `event`.
    ///
    /// Any earlier hook for `event` is removed first and the count is reset
    /// to zero, so observing twice never double counts.
    pub fn observe(&mut self, bus: &mut EventBus, event: &str) {
        if let Some(previous) = self.hooks.remove(event) {
            bus.remove_handler(event, previous);
        }
        lock(&self.entries).insert(event.to_string(), RecordedEvent::default());

        let entries = Arc::clone(&self.entries);
        let id = bus.add_handler(event, move |name, params| {
            if let Some(entry) = lock(&entries).get_mut(name) {
                entry.count += 1;
                entry.last_params = Some(params.clone());
            }
        });
        self.hooks.insert(event.to_string(), id);
    }

    /// Removes every hook from `bus`. Recorded counts are kept.
    pub fn detach_all(&mut self, bus: &mut EventBus) {
        for (event, id) in self.hooks.drain() {
            bus.remove_handler(&event, id);
        }
    }

    /// Returns true if `event` has been observed.
    pub fn is_observed(&self, event: &str) -> bool {
        lock(&self.entries).contains_key(event)
    }

    /// Fire count of an observed event.
    pub fn count(&self, event: &str) -> Option<u32> {
        lock(&self.entries).get(event).map(|e| e.count)
    }

    /// Parameters of the latest firing of an observed event.
    pub fn last_params(&self, event: &str) -> Option<Params> {
        lock(&self.entries).get(event).and_then(|e| e.last_params.clone())
    }

    /// Snapshot of one entry.
    pub fn entry(&self, event: &str) -> Option<RecordedEvent> {
        lock(&self.entries).get(event).cloned()
    }

    /// Sum of all recorded counts.
    pub fn total(&self) -> u64 {
        lock(&self.entries).values().map(|e| u64::from(e.count)).sum()
    }

    /// Fails unless `event` has never fired.
    pub fn assert_not_called(&self, event: &str) -> Result<(), RecorderError> {
        let observed = self.observed_count(event)?;
        if observed != 0 {
            return Err(RecorderError::CalledUnexpectedly {
                event: event.to_string(),
                observed,
            });
        }
        Ok(())
    }

    /// Fails if `event` never fired (unless `times` is `Some(0)`), or if
    /// `times` is given and differs from the observed count.
    pub fn assert_called(&self, event: &str, times: Option<u32>) -> Result<(), RecorderError> {
        let observed = self.observed_count(event)?;

        if observed == 0 && times != Some(0) {
            return Err(RecorderError::NotCalled {
                event: event.to_string(),
            });
        }

        if let Some(expected) = times {
            if observed != expected {
                return Err(RecorderError::CountMismatch {
                    event: event.to_string(),
                    observed,
                    expected,
                });
            }
        }

        Ok(())
    }

    fn observed_count(&self, event: &str) -> Result<u32, RecorderError> {
        self.count(event)
            .ok_or_else(|| RecorderError::NotObserved(event.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fire(bus: &mut EventBus, event: &str, times: usize) {
        for i in 0..times {
            let mut params = Params::new();
            params.insert("n".into(), json!(i));
            bus.post(event, params);
        }
        bus.process_queue();
    }

    #[test]
    fn test_observe_twice_counts_once() {
        let mut bus = EventBus::new();
        let mut recorder = EventRecorder::new();

        recorder.observe(&mut bus, "ball_started");
        recorder.observe(&mut bus, "ball_started");
        fire(&mut bus, "ball_started", 1);

        assert_eq!(recorder.count("ball_started"), Some(1));
        assert_eq!(bus.handler_count("ball_started"), 1);
    }

    #[test]
    fn test_reobserve_resets_count() {
        let mut bus = EventBus::new();
        let mut recorder = EventRecorder::new();
        recorder.observe(&mut bus, "e");
        fire(&mut bus, "e", 3);

        recorder.observe(&mut bus, "e");

        assert_eq!(recorder.count("e"), Some(0));
        assert!(recorder.last_params("e").is_none());
    }

    #[test]
    fn test_assert_called_matrix() {
        let mut bus = EventBus::new();
        let mut recorder = EventRecorder::new();
        recorder.observe(&mut bus, "e");

        assert_eq!(
            recorder.assert_called("e", None),
            Err(RecorderError::NotCalled { event: "e".into() })
        );
        assert!(recorder.assert_called("e", Some(0)).is_ok());

        fire(&mut bus, "e", 1);
        assert!(recorder.assert_called("e", None).is_ok());
        assert!(recorder.assert_called("e", Some(1)).is_ok());
        assert_eq!(
            recorder.assert_called("e", Some(0)),
            Err(RecorderError::CountMismatch {
                event: "e".into(),
                observed: 1,
                expected: 0
            })
        );

        fire(&mut bus, "e", 1);
        assert_eq!(
            recorder.assert_called("e", Some(1)),
            Err(RecorderError::CountMismatch {
                event: "e".into(),
                observed: 2,
                expected: 1
            })
        );
    }

    #[test]
    fn test_assert_not_called() {
        let mut bus = EventBus::new();
        let mut recorder = EventRecorder::new();
        recorder.observe(&mut bus, "tilt");

        assert!(recorder.assert_not_called("tilt").is_ok());
        fire(&mut bus, "tilt", 1);
        assert_eq!(
            recorder.assert_not_called("tilt"),
            Err(RecorderError::CalledUnexpectedly {
                event: "tilt".into(),
                observed: 1
            })
        );
    }

    #[test]
    fn test_unobserved_is_distinct_error() {
        let recorder = EventRecorder::new();

        let err = recorder.assert_called("ghost", Some(1)).unwrap_err();
        assert!(err.is_not_observed());
        let err = recorder.assert_not_called("ghost").unwrap_err();
        assert_eq!(err, RecorderError::NotObserved("ghost".into()));
    }

    #[test]
    fn test_last_params_tracks_latest_firing() {
        let mut bus = EventBus::new();
        let mut recorder = EventRecorder::new();
        recorder.observe(&mut bus, "score");

        fire(&mut bus, "score", 3);

        assert_eq!(recorder.last_params("score").unwrap().get("n"), Some(&json!(2)));
        assert_eq!(recorder.total(), 3);
    }

    #[test]
    fn test_detach_all_stops_recording() {
        let mut bus = EventBus::new();
        let mut recorder = EventRecorder::new();
        recorder.observe(&mut bus, "e");
        fire(&mut bus, "e", 1);

        recorder.detach_all(&mut bus);
        fire(&mut bus, "e", 1);

        assert_eq!(recorder.count("e"), Some(1));
        assert_eq!(bus.handler_count("e"), 0);
    }
}
