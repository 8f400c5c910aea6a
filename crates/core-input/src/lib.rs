//! Terminal byte-stream parsing.
//!
//! [`parser::Parser`] turns raw bytes (as read by `core-terminal`'s blocking,
//! timed reader) into [`core_events::InputEvent`]s. There is no background
//! task here: the readline loop calls `Parser::feed` once per byte it reads
//! and reacts to whatever falls out.

pub mod parser;

pub use parser::{Parser, ESCAPE_TIMEOUT};

#[inline]
pub(crate) fn log_paste_chunk_flush(chunk_len: usize) {
    tracing::trace!(target: "input.paste", chunk_len, "chunk_flush");
}

#[cfg(test)]
mod tests {
    use std::fmt;
    use std::sync::{Arc, Mutex};
    use tracing::Subscriber;
    use tracing::dispatcher::Dispatch;
    use tracing::field::{Field, Visit};
    use tracing_subscriber::layer::Context;
    use tracing_subscriber::layer::Layer;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::registry::Registry;

    #[derive(Clone, Default)]
    struct Capture {
        events: Arc<Mutex<Vec<CapturedEvent>>>,
    }

    #[derive(Clone, Debug)]
    struct CapturedEvent {
        target: String,
        fields: Vec<(String, String)>,
    }

    #[derive(Default)]
    struct FieldCollector {
        fields: Vec<(String, String)>,
    }

    impl Visit for FieldCollector {
        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            self.fields
                .push((field.name().to_string(), format!("{:?}", value)));
        }
    }

    impl<S> Layer<S> for Capture
    where
        S: Subscriber,
    {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            let mut collector = FieldCollector::default();
            event.record(&mut collector);
            let meta = event.metadata();
            self.events.lock().unwrap().push(CapturedEvent {
                target: meta.target().to_string(),
                fields: collector.fields,
            });
        }
    }

    #[test]
    fn chunk_flush_log_carries_only_length() {
        let capture = Capture::default();
        let events = capture.events.clone();
        let subscriber = Registry::default().with(capture);
        let dispatch = Dispatch::new(subscriber);

        tracing::dispatcher::with_default(&dispatch, || {
            super::log_paste_chunk_flush(42);
        });

        let events = events.lock().unwrap();
        let event = events
            .iter()
            .find(|e| e.target == "input.paste")
            .expect("missing input.paste event");
        assert!(event.fields.iter().any(|(name, _)| name == "chunk_len"));
        for (name, _) in &event.fields {
            assert_ne!(name, "chunk"); // no field ever carries raw content
        }
    }
}
