//! `.dbb` file loading
//!
//! Skype profiles store chat history in files named `chat<N>.dbb` (the
//! number is the record size class). The whole file is read into memory and
//! handed to the scanner as one buffer.

use std::fs;
use std::io::Read;
use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};
use crate::scanner::{scan_all, scan_with, RecordScanner, ScanOptions, ScanReport};

/// A loaded `.dbb` chat log
#[derive(Debug, Clone)]
pub struct DbbFile {
    name: String,
    data: Vec<u8>,
}

impl DbbFile {
    /// Open a `.dbb` file for reading
    ///
    /// # Example
    /// ```no_run
    /// use skypelog::DbbFile;
    /// let log = DbbFile::open("chat512.dbb")?;
    /// for record in log.records() {
    ///     println!("{} -> {}: {}", record.caller, record.recipients, record.message);
    /// }
    /// # Ok::<(), skypelog::Error>(())
    /// ```
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !is_dbb_path(path) {
            return Err(Error::NotADbbFile(path.to_path_buf()));
        }
        let data = fs::read(path)?;
        debug!("Read {} bytes from {}", data.len(), path.display());

        Ok(Self {
            name: path.display().to_string(),
            data,
        })
    }

    /// Read a log from any reader (e.g. stdin)
    pub fn from_reader<R: Read>(name: impl Into<String>, mut reader: R) -> Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Ok(Self::from_bytes(name, data))
    }

    /// Wrap an already loaded buffer
    pub fn from_bytes(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Display name of the source (path or `-`)
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Size of the buffer in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Iterate over the records with default scan options
    pub fn records(&self) -> RecordScanner<'_> {
        self.records_with(ScanOptions::default())
    }

    pub fn records_with(&self, options: ScanOptions) -> RecordScanner<'_> {
        scan_with(&self.data, options)
    }

    /// Scan the whole log eagerly
    pub fn scan_report(&self, options: ScanOptions) -> ScanReport {
        scan_all(&self.data, options)
    }
}

/// Check if a path has the `.dbb` extension
pub fn is_dbb_path<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("dbb"))
        .unwrap_or(false)
}

/// Check if a path follows the profile chat log naming (`chat*.dbb`)
pub fn is_chat_log<P: AsRef<Path>>(path: P) -> bool {
    let path = path.as_ref();
    is_dbb_path(path)
        && path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.starts_with("chat"))
            .unwrap_or(false)
}
