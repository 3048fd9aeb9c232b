// src/events.rs

//! Install progress events
//!
//! The orchestrator reports progress through a caller-supplied [`EventSink`].
//! One event is emitted per phase transition and one per step entering
//! `planning`/`installing`/`done`. The sink is fire-and-forget: emitting
//! never fails and never blocks the pipeline on the consumer.
//!
//! Implementations:
//! - `LogSink`: relays events to tracing at info level
//! - `CallbackSink`: wraps an arbitrary closure

use std::fmt;
use tracing::info;

/// Pipeline phase an event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallPhase {
    Planning,
    Fetching,
    Installing,
    Done,
    Failed,
}

impl fmt::Display for InstallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Planning => "planning",
            Self::Fetching => "fetching",
            Self::Installing => "installing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// One progress event from the install pipeline
#[derive(Debug, Clone)]
pub struct InstallEvent {
    /// Phase the pipeline is in
    pub phase: InstallPhase,
    /// Step id (`name@version`) for per-step events, `None` for phase transitions
    pub step: Option<String>,
    /// Human-readable detail ("dry-run", error text, step description)
    pub message: String,
}

impl InstallEvent {
    /// Phase-transition event with no step attribution
    pub fn phase(phase: InstallPhase, message: impl Into<String>) -> Self {
        Self {
            phase,
            step: None,
            message: message.into(),
        }
    }

    /// Per-step event
    pub fn step(phase: InstallPhase, step: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            phase,
            step: Some(step.into()),
            message: message.into(),
        }
    }
}

/// Consumer of install events
///
/// Implementations must be thread-safe; events may be emitted from worker
/// threads. Emission is infallible by contract.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &InstallEvent);
}

/// Sink that relays every event to tracing
#[derive(Debug, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: &InstallEvent) {
        match &event.step {
            Some(step) => info!("[{}] {}: {}", event.phase, step, event.message),
            None => info!("[{}] {}", event.phase, event.message),
        }
    }
}

/// Sink backed by a caller-supplied closure
pub struct CallbackSink<F>
where
    F: Fn(&InstallEvent) + Send + Sync,
{
    callback: F,
}

impl<F> CallbackSink<F>
where
    F: Fn(&InstallEvent) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> EventSink for CallbackSink<F>
where
    F: Fn(&InstallEvent) + Send + Sync,
{
    fn emit(&self, event: &InstallEvent) {
        (self.callback)(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_phase_display() {
        assert_eq!(InstallPhase::Planning.to_string(), "planning");
        assert_eq!(InstallPhase::Done.to_string(), "done");
    }

    #[test]
    fn test_callback_sink_receives_events() {
        let seen: Mutex<Vec<String>> = Mutex::new(Vec::new());
        let sink = CallbackSink::new(|event: &InstallEvent| {
            seen.lock().unwrap().push(event.message.clone());
        });

        sink.emit(&InstallEvent::phase(InstallPhase::Planning, "start"));
        sink.emit(&InstallEvent::step(InstallPhase::Done, "demo@1.0.0", "installed"));

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen, vec!["start".to_string(), "installed".to_string()]);
    }

    #[test]
    fn test_step_event_carries_id() {
        let event = InstallEvent::step(InstallPhase::Installing, "demo@1.0.0", "extracting");
        assert_eq!(event.step.as_deref(), Some("demo@1.0.0"));
    }
}
