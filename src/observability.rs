use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("aria.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("aria.client.request_errors");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("aria.client.request_duration_seconds");

pub(crate) static STREAM_CHUNKS: Counter = Counter::new("aria.stream.chunks");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("aria.stream.errors");
pub(crate) static STREAM_BYTES: Counter = Counter::new("aria.stream.bytes");
pub(crate) static STREAM_DURATION: Moments = Moments::new("aria.stream.duration_seconds");

pub(crate) static DIAGRAM_RENDERS: Counter = Counter::new("aria.diagram.renders");
pub(crate) static DIAGRAM_FAILURES: Counter = Counter::new("aria.diagram.failures");
pub(crate) static DIAGRAM_LIBRARY_TIMEOUTS: Counter =
    Counter::new("aria.diagram.library_timeouts");

pub(crate) static HISTORY_PAGE_LOADS: Counter = Counter::new("aria.history.page_loads");
pub(crate) static HISTORY_PAGE_ERRORS: Counter = Counter::new("aria.history.page_errors");

pub(crate) static CHAT_SENDS: Counter = Counter::new("aria.chat.sends");
pub(crate) static CHAT_SEND_ERRORS: Counter = Counter::new("aria.chat.send_errors");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_moments(&CLIENT_REQUEST_DURATION);

    collector.register_counter(&STREAM_CHUNKS);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_counter(&STREAM_BYTES);
    collector.register_moments(&STREAM_DURATION);

    collector.register_counter(&DIAGRAM_RENDERS);
    collector.register_counter(&DIAGRAM_FAILURES);
    collector.register_counter(&DIAGRAM_LIBRARY_TIMEOUTS);

    collector.register_counter(&HISTORY_PAGE_LOADS);
    collector.register_counter(&HISTORY_PAGE_ERRORS);

    collector.register_counter(&CHAT_SENDS);
    collector.register_counter(&CHAT_SEND_ERRORS);
}
