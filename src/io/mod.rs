//! Output I/O.

pub mod writer;

pub use writer::{PdfWriter, WriteOptions, WriteStatistics};
