//! # skypelog
//!
//! A Rust library for extracting chat records from Skype `.dbb` chat history
//! files.
//!
//! ## Overview
//!
//! The `.dbb` files of a Skype profile hold chat messages as loosely
//! structured binary records with no length fields or checksums. Every field
//! is delimited by fixed marker bytes. This library provides:
//!
//! - A marker table describing the record layout
//! - A lazy record scanner over an in-memory buffer, with recovery from false
//!   marker alignments
//! - Decoding of the packed 5-byte message timestamp
//! - Loading of `.dbb` files and profile directories
//! - Writing well-formed records
//!
//! ## Example - Scanning a buffer
//!
//! ```rust
//! use skypelog::{scan, DbbWriteEntry};
//!
//! let data = DbbWriteEntry::new("alice", "bob", "hello")
//!     .with_timestamp(1_600_000_000)
//!     .encode()?;
//!
//! let records: Vec<_> = scan(&data).collect();
//! assert_eq!(records.len(), 1);
//! assert_eq!(records[0].message, "hello");
//! assert_eq!(records[0].timestamp, 1_600_000_000);
//! # Ok::<(), skypelog::Error>(())
//! ```
//!
//! ## Example - Reading a file
//!
//! ```rust,no_run
//! use skypelog::DbbFile;
//!
//! fn main() -> anyhow::Result<()> {
//!     let log = DbbFile::open("chat512.dbb")?;
//!
//!     for record in log.records() {
//!         println!("{} <-> {}: {}", record.caller, record.recipients, record.message);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod dbb;
pub mod dbb_utils;
pub mod error;
pub mod marker;
pub mod record;
pub mod scanner;
pub mod timestamp;
pub mod utils;
pub mod writer;

pub use dbb::{is_chat_log, is_dbb_path, DbbFile};
pub use error::{Error, Result};
pub use marker::{marker, Marker, MarkerRole, SenderVariant};
pub use record::{DecodedRecord, RawRecord};
pub use scanner::{scan, scan_all, scan_with, RecordScanner, ScanDiagnostic, ScanOptions, ScanReport};
pub use timestamp::{decode_time_block, decode_timestamp, encode_timestamp};
pub use utils::{collect_files, create_glob_matcher, format_size, format_timestamp, matches_filter};
pub use writer::{encode_entries, DbbWriteEntry, DbbWriter};
