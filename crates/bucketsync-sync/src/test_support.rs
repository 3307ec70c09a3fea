//! Log capture for unit tests

use std::sync::{Arc, Mutex};

use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

/// Messages of every event logged on this thread while the guard lives
pub(crate) type Messages = Arc<Mutex<Vec<String>>>;

struct MessageLayer(Messages);

impl<S: Subscriber> Layer<S> for MessageLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        struct Visitor(Option<String>);

        impl Visit for Visitor {
            fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
                if field.name() == "message" {
                    self.0 = Some(format!("{value:?}"));
                }
            }
        }

        let mut visitor = Visitor(None);
        event.record(&mut visitor);
        if let Some(message) = visitor.0 {
            self.0.lock().unwrap().push(message);
        }
    }
}

/// Installs a thread-local subscriber that records event messages
pub(crate) fn capture_messages() -> (Messages, DefaultGuard) {
    let messages = Messages::default();
    let subscriber = tracing_subscriber::registry().with(MessageLayer(Arc::clone(&messages)));
    (messages, tracing::subscriber::set_default(subscriber))
}
