//! Events produced by sources and consumed by the serializer.

use bytes::Bytes;

/// One requested action against the sink.
///
/// Dispatched by a single exhaustive `match` in the serializer loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Append `payload` as one newline-terminated record.
    Write { payload: Bytes },
    /// Close the output file and open it again at the same path.
    Rotate,
    /// Stop the process without draining anything still queued.
    Quit,
}

impl Event {
    pub fn write(payload: impl Into<Bytes>) -> Self {
        Event::Write {
            payload: payload.into(),
        }
    }

    /// Short label used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Write { .. } => "write",
            Event::Rotate => "rotate",
            Event::Quit => "quit",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_takes_ownership_of_payload() {
        let event = Event::write(b"hello".to_vec());
        match &event {
            Event::Write { payload } => assert_eq!(&payload[..], b"hello"),
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(event.kind(), "write");
    }

    #[test]
    fn kinds_are_distinct() {
        let kinds = [Event::write(""), Event::Rotate, Event::Quit].map(|e| e.kind());
        assert_eq!(kinds, ["write", "rotate", "quit"]);
    }
}
