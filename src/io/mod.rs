mod sink;

pub use sink::{MemSink, Sink, StreamSink};
