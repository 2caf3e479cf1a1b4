//! File formats on both ends of a conversion.
//!
//! - [`csv`] streams delimited input records
//! - [`compression`] decodes compressed inputs transparently
//! - [`glob`] expands input patterns
//! - [`parquet`] writes (and reads back) the columnar output

pub mod compression;
pub mod csv;
pub mod glob;
pub mod parquet;
