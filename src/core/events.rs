//! Phase events
//!
//! The compile pipeline reports phase boundaries to an [`EventSink`]. Emitting
//! is fire-and-forget: sinks never block the caller and never fail a build.

use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use crate::core::model::QualifiedName;

/// Whole-run phase
pub const PHASE_COMPILE: &str = "compile-packages";

/// Per-package phase prefix for waiting on a build slot
pub const PHASE_WAIT: &str = "compile-packages::wait";

/// Per-package phase prefix for the build itself
pub const PHASE_RUN: &str = "compile-packages::run";

/// Which side of a phase an event marks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    Start,
    Done,
}

impl Boundary {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Done => "done",
        }
    }
}

/// A timestamped phase boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseEvent {
    /// Phase prefix, e.g. [`PHASE_WAIT`]
    pub phase: &'static str,
    /// Package the phase belongs to; `None` for whole-run phases
    pub package: Option<QualifiedName>,
    pub boundary: Boundary,
    pub timestamp: SystemTime,
}

impl PhaseEvent {
    /// Event stamped with the current time
    pub fn now(phase: &'static str, package: Option<QualifiedName>, boundary: Boundary) -> Self {
        Self {
            phase,
            package,
            boundary,
            timestamp: SystemTime::now(),
        }
    }

    /// Full phase name, `<phase>::<release>/<package>` for per-package events
    pub fn phase_name(&self) -> String {
        match &self.package {
            Some(package) => format!("{}::{package}", self.phase),
            None => self.phase.to_string(),
        }
    }
}

/// Receiver of phase events
pub trait EventSink: Send + Sync {
    /// Record an event; must not block and must not fail
    fn emit(&self, event: PhaseEvent);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: PhaseEvent) {}
}

/// Logs every event at debug level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: PhaseEvent) {
        tracing::debug!(
            phase = %event.phase_name(),
            boundary = event.boundary.as_str(),
            "phase"
        );
    }
}

/// Forwards every event to several sinks
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink
    #[must_use]
    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: PhaseEvent) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.emit(event.clone());
            }
            last.emit(event);
        }
    }
}

/// Keeps every event in memory, in emission order
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<PhaseEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded events
    pub fn events(&self) -> Vec<PhaseEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Recorded `(phase name, boundary)` pairs
    pub fn phases(&self) -> Vec<(String, Boundary)> {
        self.events()
            .iter()
            .map(|e| (e.phase_name(), e.boundary))
            .collect()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: PhaseEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn package() -> QualifiedName {
        QualifiedName {
            release: "tor".into(),
            package: "libevent".into(),
        }
    }

    #[test]
    fn test_phase_name_includes_package() {
        let event = PhaseEvent::now(PHASE_WAIT, Some(package()), Boundary::Start);
        assert_eq!(event.phase_name(), "compile-packages::wait::tor/libevent");

        let run = PhaseEvent::now(PHASE_COMPILE, None, Boundary::Done);
        assert_eq!(run.phase_name(), "compile-packages");
    }

    #[test]
    fn test_fanout_reaches_every_sink() {
        let first = Arc::new(MemorySink::new());
        let second = Arc::new(MemorySink::new());
        let fanout = FanoutSink::new()
            .with(first.clone())
            .with(Arc::new(NullSink))
            .with(second.clone());

        fanout.emit(PhaseEvent::now(PHASE_COMPILE, None, Boundary::Start));

        assert_eq!(first.events().len(), 1);
        assert_eq!(second.phases(), vec![("compile-packages".to_string(), Boundary::Start)]);
    }

    #[test]
    fn test_empty_fanout_is_a_no_op() {
        FanoutSink::new().emit(PhaseEvent::now(PHASE_COMPILE, None, Boundary::Done));
    }
}
