//! Helper macros enforcing consistent stream log fields.
//!
//! Every event emitted from a stream worker carries `stream` and `topic` so log
//! pipelines can group a worker's lifecycle without parsing the message text.

/// Log an event for a stream/topic pair plus any extra fields.
#[macro_export]
macro_rules! stream_event {
    ($level:ident, $target:expr, $event:expr, stream = $stream:expr, topic = $topic:expr $(, $field:ident = $value:expr )* $(,)?) => {
        tracing::$level!(
            target = $target,
            event = $event,
            stream = $stream,
            topic = %$topic,
            $($field = %$value,)*
        )
    };
}
