//! Observability subsystem
//!
//! - Structured, typed lifecycle events
//! - Passive atomic counters
//! - Begin/complete scopes around long-running work (replay)
//!
//! Observability is read-only: nothing here influences admission or apply.
//!
//! ```ignore
//! use tsconsensus::observability::{log_event_with_fields, Event};
//!
//! log_event_with_fields(Event::ReadTimeout, &[("group", "group-1")]);
//! ```

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use scope::ObservationScope;

fn severity_for(event: Event) -> Severity {
    if event.is_fatal() {
        Severity::Fatal
    } else if event.is_hot_path() {
        Severity::Trace
    } else {
        Severity::Info
    }
}

/// Log a lifecycle event
pub fn log_event(event: Event) {
    Logger::log(severity_for(event), event.as_str(), &[]);
}

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(severity_for(event), event.as_str(), fields);
}

/// Log an event at an explicit severity
pub fn log_event_at(severity: Severity, event: Event, fields: &[(&str, &str)]) {
    Logger::log(severity, event.as_str(), fields);
}
