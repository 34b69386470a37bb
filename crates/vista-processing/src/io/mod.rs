//! Input: encoding/delimiter sniffing and the chunked CSV reader.

mod reader;
pub mod sniff;

pub use reader::{CsvLoader, ReadOptions, SourceInfo};
pub use sniff::{Delimiter, Encoding};
