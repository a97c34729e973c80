//! drain core library: event model, the output-file sink, errors.
//!
//! - [`event`]: [`Event`], the unit of work handed to the serializer
//! - [`sink`]: [`FileSink`], the append-only output file
//! - [`error`]: [`SinkError`]

pub mod error;
pub mod event;
pub mod sink;

pub use error::SinkError;
pub use event::Event;
pub use sink::FileSink;
