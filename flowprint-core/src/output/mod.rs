//! Record output: bounded JSON serialization, per-worker SPSC rings, and
//! the chronological merge writer.

mod json;
mod llq;
mod writer;

pub use json::{BufferStream, JsonArray, JsonObject};
pub use llq::{Backpressure, LlqProducer, LlqQueue, Timestamp, LLQ_DEPTH, LLQ_MAX_AGE, LLQ_MSG_SIZE};
pub use writer::{OutputFile, OutputWriter};
