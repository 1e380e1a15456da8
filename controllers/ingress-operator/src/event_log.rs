//! Abnormal event logging.
//!
//! Functions that cannot be materialized (image pull back-off, crash loops,
//! container runtime failures) surface as Warning events on their Pods and
//! Deployments. Recent ones are logged at debug level.

use k8s_openapi::api::core::v1::Event;
use k8s_openapi::chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::cache::EventHandler;
use crate::keys::object_key;

/// Events older than this many seconds when first seen are not logged
pub const RECENT_WINDOW_SECS: i64 = 61;

#[derive(Debug, Default)]
pub struct AbnormalEventLogger;

impl AbnormalEventLogger {
    pub fn new() -> Self {
        Self
    }
}

/// When the event last occurred
fn last_seen(event: &Event) -> Option<DateTime<Utc>> {
    event
        .last_timestamp
        .as_ref()
        .map(|t| t.0)
        .or_else(|| event.event_time.as_ref().map(|t| t.0))
}

pub(crate) fn is_recent_warning(event: &Event, now: DateTime<Utc>) -> bool {
    let warning = event.type_.as_deref().is_some_and(|t| t.contains("Warning"));
    warning && last_seen(event).is_some_and(|at| now - at < Duration::seconds(RECENT_WINDOW_SECS))
}

impl EventHandler<Event> for AbnormalEventLogger {
    fn on_add(&self, event: &Event) {
        if !is_recent_warning(event, Utc::now()) {
            return;
        }
        debug!(
            at = ?last_seen(event),
            kind = ?event.involved_object.kind,
            object = ?event.involved_object.name,
            reason = ?event.reason,
            "Abnormal event detected on {}: {}",
            object_key(event),
            event.message.as_deref().unwrap_or_default()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ObjectReference;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{MicroTime, ObjectMeta, Time};

    fn event(type_: &str, age: Duration, now: DateTime<Utc>) -> Event {
        Event {
            metadata: ObjectMeta {
                name: Some("nodeinfo-7d4b9c.17a2".to_string()),
                namespace: Some("openfaas-fn".to_string()),
                ..Default::default()
            },
            involved_object: ObjectReference {
                kind: Some("Pod".to_string()),
                name: Some("nodeinfo-7d4b9c".to_string()),
                ..Default::default()
            },
            type_: Some(type_.to_string()),
            reason: Some("BackOff".to_string()),
            message: Some("Back-off pulling image \"functions/nodeinfo:missing\"".to_string()),
            last_timestamp: Some(Time(now - age)),
            ..Default::default()
        }
    }

    #[test]
    fn test_recent_warning_is_logged() {
        let now = Utc::now();
        assert!(is_recent_warning(&event("Warning", Duration::seconds(5), now), now));
        assert!(is_recent_warning(&event("Warning", Duration::seconds(60), now), now));
    }

    #[test]
    fn test_old_or_normal_events_are_skipped() {
        let now = Utc::now();
        assert!(!is_recent_warning(&event("Warning", Duration::seconds(61), now), now));
        assert!(!is_recent_warning(&event("Warning", Duration::minutes(30), now), now));
        assert!(!is_recent_warning(&event("Normal", Duration::seconds(5), now), now));
    }

    #[test]
    fn test_event_time_is_used_without_last_timestamp() {
        let now = Utc::now();
        let mut recent = event("Warning", Duration::zero(), now);
        recent.last_timestamp = None;
        recent.event_time = Some(MicroTime(now - Duration::seconds(10)));
        assert!(is_recent_warning(&recent, now));

        recent.event_time = None;
        assert!(!is_recent_warning(&recent, now));
    }

    #[test]
    fn test_logger_handles_any_event() {
        let logger = AbnormalEventLogger::new();
        let now = Utc::now();
        logger.on_add(&event("Warning", Duration::seconds(1), now));
        logger.on_add(&Event::default());
    }
}
