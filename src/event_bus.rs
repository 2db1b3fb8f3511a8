//! Event bus (spec §4.6): a process-wide broadcast channel nodes use to
//! request rebuild, clear, reconnect, or publish diagnostics. Grounded on
//! the "Global mutable state" design note in spec §9: the registry is an
//! explicit, owned component rather than a free static, so the embedding
//! application controls its lifetime the same way it owns the
//! `SamplerPool` and `GraphDescription`.

use std::sync::Arc;

use parking_lot::Mutex;

/// `"<node-type>/<identifier>/<event-name>"`, the address an event is sent
/// to and a listener pattern is matched against.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub node_type: String,
    pub identifier: String,
    pub event_name: String,
}

impl EventKey {
    pub fn new(
        node_type: impl Into<String>,
        identifier: impl Into<String>,
        event_name: impl Into<String>,
    ) -> Self {
        EventKey {
            node_type: node_type.into(),
            identifier: identifier.into(),
            event_name: event_name.into(),
        }
    }

    /// The two reserved identifiers that collect events not tied to a
    /// specific node (spec §4.6).
    pub fn user(event_name: impl Into<String>) -> Self {
        EventKey::new("", "user", event_name)
    }

    pub fn graph(event_name: impl Into<String>) -> Self {
        EventKey::new("", "graph", event_name)
    }
}

/// Payload carried by an event. `serde_json::Value` doubles as the generic
/// "data" slot (spec §4.6) and the diagnostic text channel (spec §11
/// supplemental `Properties::diagnostic`).
pub type EventData = serde_json::Value;

/// One field of a `"node-type/identifier/event-name"` pattern; an empty
/// field matches anything (spec §4.6: "pattern supports empty fields as
/// wildcards").
#[derive(Clone, Debug)]
struct PatternField(Option<String>);

impl PatternField {
    fn parse(field: &str) -> Self {
        if field.is_empty() {
            PatternField(None)
        } else {
            PatternField(Some(field.to_string()))
        }
    }

    fn matches(&self, value: &str) -> bool {
        match &self.0 {
            None => true,
            Some(expected) => expected == value,
        }
    }
}

#[derive(Clone, Debug)]
struct Pattern {
    node_type: PatternField,
    identifier: PatternField,
    event_name: PatternField,
}

impl Pattern {
    fn parse_one(pattern: &str) -> Self {
        let mut parts = pattern.splitn(3, '/');
        let node_type = PatternField::parse(parts.next().unwrap_or(""));
        let identifier = PatternField::parse(parts.next().unwrap_or(""));
        let event_name = PatternField::parse(parts.next().unwrap_or(""));
        Pattern {
            node_type,
            identifier,
            event_name,
        }
    }

    /// Comma-separated list of patterns (spec §4.6).
    fn parse_list(patterns: &str) -> Vec<Self> {
        patterns.split(',').map(str::trim).map(Pattern::parse_one).collect()
    }

    fn matches(&self, key: &EventKey) -> bool {
        self.node_type.matches(&key.node_type)
            && self.identifier.matches(&key.identifier)
            && self.event_name.matches(&key.event_name)
    }
}

pub type ListenerId = u64;

/// Returns `true` if the event was handled; a `notify_all=false` send
/// stops dispatching at the first listener to return `true`.
pub type Listener = dyn Fn(&EventKey, &EventData) -> bool + Send + Sync;

struct Registration {
    id: ListenerId,
    patterns: Vec<Pattern>,
    listener: Arc<Listener>,
}

/// The process-wide broadcast channel. Cheap to clone (an `Arc` around a
/// mutex-guarded listener list) so every node and the graph itself can
/// hold a handle to the same bus.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    listeners: Vec<Registration>,
    next_id: ListenerId,
}

impl EventBus {
    pub fn new() -> Self {
        EventBus::default()
    }

    /// Registers `listener` against `pattern` (comma-separated list of
    /// `"node-type/identifier/event-name"` patterns, empty fields as
    /// wildcards). Registration may occur before the matching node
    /// exists (spec §4.6); the builder re-binds listeners on every
    /// rebuild by calling this again, so callers should treat the
    /// returned id as valid only until the next `connect()`.
    pub fn register_event_listener(
        &self,
        pattern: &str,
        listener: impl Fn(&EventKey, &EventData) -> bool + Send + Sync + 'static,
    ) -> ListenerId {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.listeners.push(Registration {
            id,
            patterns: Pattern::parse_list(pattern),
            listener: Arc::new(listener),
        });
        id
    }

    pub fn unregister(&self, id: ListenerId) {
        let mut inner = self.inner.lock();
        inner.listeners.retain(|r| r.id != id);
    }

    /// Dispatches synchronously on the calling thread (spec §5: "event
    /// listeners are invoked synchronously on the sending thread").
    /// Returns whether any listener reported the event as handled.
    pub fn send_event(&self, info: &EventKey, data: &EventData, notify_all: bool) -> bool {
        let matching: Vec<Arc<Listener>> = {
            let inner = self.inner.lock();
            inner
                .listeners
                .iter()
                .filter(|r| r.patterns.iter().any(|p| p.matches(info)))
                .map(|r| r.listener.clone())
                .collect()
        };

        let mut handled = false;
        for listener in matching {
            if listener(info, data) {
                handled = true;
                if !notify_all {
                    break;
                }
            }
        }
        handled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn wildcard_field_matches_anything() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = hits.clone();
        bus.register_event_listener("/graph/", move |_, _| {
            hits2.fetch_add(1, Ordering::SeqCst);
            true
        });

        bus.send_event(&EventKey::graph("build_error"), &serde_json::json!(null), false);
        bus.send_event(&EventKey::graph("rebuild"), &serde_json::json!(null), false);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn notify_all_false_stops_at_first_handler() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c1 = calls.clone();
        let c2 = calls.clone();
        bus.register_event_listener("//", move |_, _| {
            c1.fetch_add(1, Ordering::SeqCst);
            true
        });
        bus.register_event_listener("//", move |_, _| {
            c2.fetch_add(1, Ordering::SeqCst);
            true
        });

        bus.send_event(&EventKey::user("clicked"), &serde_json::json!(null), false);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn comma_separated_patterns() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = hits.clone();
        bus.register_event_listener("Blit//reconnect,Tonemap//reconnect", move |_, _| {
            hits2.fetch_add(1, Ordering::SeqCst);
            true
        });

        bus.send_event(
            &EventKey::new("Blit", "b0", "reconnect"),
            &serde_json::json!(null),
            false,
        );
        bus.send_event(
            &EventKey::new("Tonemap", "t0", "reconnect"),
            &serde_json::json!(null),
            false,
        );
        bus.send_event(
            &EventKey::new("Bloom", "x0", "reconnect"),
            &serde_json::json!(null),
            false,
        );
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
