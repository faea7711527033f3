//! Stream lifecycle event listeners
//!
//! External collaborators (auth hooks, relay triggers, admin surfaces)
//! observe stream lifecycle changes through `StreamEventListener`.
//! Listeners register with an explicit order key; the dispatcher keeps
//! them sorted and invokes them synchronously, lowest order first. There
//! is no event bus: dispatch is a plain in-order loop.

use std::collections::HashMap;
use std::sync::Arc;

/// Callbacks fired on stream lifecycle changes
///
/// All methods default to no-ops. `stream_arguments` carries the query
/// parameters the client attached to the stream path.
pub trait StreamEventListener: Send + Sync {
    fn on_published(
        &self,
        _client_id: u64,
        _stream_path: &str,
        _stream_arguments: &HashMap<String, String>,
    ) {
    }

    fn on_unpublished(
        &self,
        _client_id: u64,
        _stream_path: &str,
        _stream_arguments: &HashMap<String, String>,
    ) {
    }

    fn on_subscribed(
        &self,
        _client_id: u64,
        _stream_path: &str,
        _stream_arguments: &HashMap<String, String>,
    ) {
    }

    fn on_unsubscribed(
        &self,
        _client_id: u64,
        _stream_path: &str,
        _stream_arguments: &HashMap<String, String>,
    ) {
    }

    fn on_metadata(
        &self,
        _client_id: u64,
        _stream_path: &str,
        _stream_arguments: &HashMap<String, String>,
    ) {
    }
}

/// Ordered, synchronous event fan-out
#[derive(Default)]
pub struct EventDispatcher {
    listeners: Vec<(i32, Arc<dyn StreamEventListener>)>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener with an order key; lower keys fire first
    ///
    /// Listeners with equal keys fire in registration order.
    pub fn register(&mut self, order: i32, listener: Arc<dyn StreamEventListener>) {
        let at = self
            .listeners
            .partition_point(|(existing, _)| *existing <= order);
        self.listeners.insert(at, (order, listener));
    }

    pub fn dispatch_published(
        &self,
        client_id: u64,
        stream_path: &str,
        stream_arguments: &HashMap<String, String>,
    ) {
        for (_, listener) in &self.listeners {
            listener.on_published(client_id, stream_path, stream_arguments);
        }
    }

    pub fn dispatch_unpublished(
        &self,
        client_id: u64,
        stream_path: &str,
        stream_arguments: &HashMap<String, String>,
    ) {
        for (_, listener) in &self.listeners {
            listener.on_unpublished(client_id, stream_path, stream_arguments);
        }
    }

    pub fn dispatch_subscribed(
        &self,
        client_id: u64,
        stream_path: &str,
        stream_arguments: &HashMap<String, String>,
    ) {
        for (_, listener) in &self.listeners {
            listener.on_subscribed(client_id, stream_path, stream_arguments);
        }
    }

    pub fn dispatch_unsubscribed(
        &self,
        client_id: u64,
        stream_path: &str,
        stream_arguments: &HashMap<String, String>,
    ) {
        for (_, listener) in &self.listeners {
            listener.on_unsubscribed(client_id, stream_path, stream_arguments);
        }
    }

    pub fn dispatch_metadata(
        &self,
        client_id: u64,
        stream_path: &str,
        stream_arguments: &HashMap<String, String>,
    ) {
        for (_, listener) in &self.listeners {
            listener.on_metadata(client_id, stream_path, stream_arguments);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Tagged {
        tag: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl StreamEventListener for Tagged {
        fn on_published(
            &self,
            _client_id: u64,
            _stream_path: &str,
            _stream_arguments: &HashMap<String, String>,
        ) {
            self.log.lock().unwrap().push(self.tag);
        }
    }

    #[test]
    fn test_listeners_fire_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = EventDispatcher::new();

        for (order, tag) in [(10, "b"), (5, "a"), (20, "c")] {
            dispatcher.register(
                order,
                Arc::new(Tagged {
                    tag,
                    log: Arc::clone(&log),
                }),
            );
        }

        dispatcher.dispatch_published(1, "live/a", &HashMap::new());
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_equal_orders_keep_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = EventDispatcher::new();

        for tag in ["first", "second"] {
            dispatcher.register(
                0,
                Arc::new(Tagged {
                    tag,
                    log: Arc::clone(&log),
                }),
            );
        }

        dispatcher.dispatch_published(1, "live/a", &HashMap::new());
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }
}
