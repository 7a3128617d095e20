pub mod jitter_analyzer;
pub mod jitter_buffer;

pub use jitter_analyzer::{BufferSizePolicy, FixedSizePolicy, JitterAnalyzer};
pub use jitter_buffer::{JitterBuffer, JitterBufferBuilder};
