//! Ready-made blocks
//!
//! Every block here names its ports `in_1..in_N` and `out_1..out_M`.

pub mod fft;
pub mod sink;
pub mod source;
pub mod transform;

pub use fft::{ComplexArray, Fft2Block};
pub use sink::{CollectSink, Collected, SinkBlock};
pub use source::SourceBlock;
pub use transform::TransformBlock;
