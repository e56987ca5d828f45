//! `.dbb` record writing
//!
//! Produces well-formed chat records in the layout the scanner reads. Useful
//! for fixtures and for re-emitting filtered logs.

use std::io::Write;

use crate::error::{Error, Result};
use crate::marker::{MarkerRole, SenderVariant, RECORD_PADDING};
use crate::timestamp::encode_timestamp;

/// Entry to be written as one chat record
#[derive(Debug, Clone)]
pub struct DbbWriteEntry {
    pub caller: String,
    pub recipients: String,
    pub chat_id: String,
    /// Unix timestamp in seconds
    pub timestamp: i32,
    /// Sender username (defaults to the caller)
    pub sender: Option<String>,
    pub sender_display_name: Option<String>,
    pub message: String,
    /// Byte written after the member separator
    pub recipient_prefix: u8,
}

impl DbbWriteEntry {
    /// Create a new entry between two members
    pub fn new(
        caller: impl Into<String>,
        recipients: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            caller: caller.into(),
            recipients: recipients.into(),
            chat_id: String::new(),
            timestamp: 0,
            sender: None,
            sender_display_name: None,
            message: message.into(),
            recipient_prefix: MarkerRole::RecipientPrefix.bytes()[0],
        }
    }

    pub fn with_chat_id(mut self, chat_id: impl Into<String>) -> Self {
        self.chat_id = chat_id.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: i32) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.sender_display_name = Some(name.into());
        self
    }

    /// Set the byte written after the member separator
    pub fn with_recipient_prefix(mut self, prefix: u8) -> Self {
        self.recipient_prefix = prefix;
        self
    }

    /// Sender username as written
    pub fn sender(&self) -> &str {
        self.sender.as_deref().unwrap_or(&self.caller)
    }

    /// Check that no field contains the delimiter that terminates it
    fn validate(&self) -> Result<()> {
        let check = |field: &str, value: &str, forbidden: &[u8]| {
            if value.bytes().any(|b| forbidden.contains(&b)) {
                Err(Error::InvalidRecord(format!(
                    "{} {:?} contains a delimiter byte",
                    field, value
                )))
            } else {
                Ok(())
            }
        };

        check("caller", &self.caller, &[b'/', 0])?;
        check("recipients", &self.recipients, &[b';', 0])?;
        check("sender", self.sender(), &[0])?;
        if let Some(name) = &self.sender_display_name {
            check("display name", name, &[0])?;
        }
        check("message", &self.message, &[0])?;

        Ok(())
    }

    /// Encode the entry into a byte vector
    pub fn encode(&self) -> Result<Vec<u8>> {
        self.validate()?;

        let mut out = Vec::with_capacity(64 + self.message.len());
        out.extend_from_slice(MarkerRole::RecordStart.bytes());
        out.extend_from_slice(&[0u8; RECORD_PADDING]);
        out.extend_from_slice(MarkerRole::ChatFieldStart.bytes());
        out.extend_from_slice(MarkerRole::CallerPrefix.bytes());
        out.extend_from_slice(self.caller.as_bytes());
        out.extend_from_slice(MarkerRole::MemberSeparator.bytes());
        out.push(self.recipient_prefix);
        out.extend_from_slice(self.recipients.as_bytes());
        out.extend_from_slice(MarkerRole::MembersEnd.bytes());
        out.extend_from_slice(self.chat_id.as_bytes());
        out.extend_from_slice(MarkerRole::TimeFieldStart.bytes());
        out.extend_from_slice(&encode_timestamp(self.timestamp));
        out.extend_from_slice(SenderVariant::Username.bytes());
        out.extend_from_slice(self.sender().as_bytes());
        out.push(0);
        if let Some(name) = &self.sender_display_name {
            out.extend_from_slice(SenderVariant::ScreenName.bytes());
            out.extend_from_slice(name.as_bytes());
            out.push(0);
        }
        out.extend_from_slice(MarkerRole::MessageFieldStart.bytes());
        out.extend_from_slice(self.message.as_bytes());
        out.push(0);

        Ok(out)
    }
}

/// Writer producing a `.dbb` byte stream
pub struct DbbWriter<W: Write> {
    writer: W,
    records: usize,
}

impl<W: Write> DbbWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, records: 0 }
    }

    /// Append one record
    pub fn add_entry(&mut self, entry: &DbbWriteEntry) -> Result<()> {
        let bytes = entry.encode()?;
        self.writer.write_all(&bytes)?;
        self.records += 1;
        Ok(())
    }

    /// Number of records written so far
    pub fn records_written(&self) -> usize {
        self.records
    }

    /// Flush and return the underlying writer
    pub fn finish(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Encode a list of entries into one buffer
pub fn encode_entries(entries: &[DbbWriteEntry]) -> Result<Vec<u8>> {
    let mut writer = DbbWriter::new(Vec::new());
    for entry in entries {
        writer.add_entry(entry)?;
    }
    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let bytes = DbbWriteEntry::new("a", "b", "hi")
            .with_chat_id("c")
            .encode()
            .unwrap();

        assert!(bytes.starts_with(b"l33l"));
        assert_eq!(&bytes[18..20], &[0xE0, 0x03]);
        assert_eq!(&bytes[20..26], b"#a/4b;");
        assert_eq!(&bytes[26..27], b"c");
        assert_eq!(&bytes[27..29], &[0xE5, 0x03]);
        assert_eq!(&bytes[35..37], &[0xE8, 0x03]);
        assert_eq!(&bytes[37..39], b"a\0");
        assert_eq!(&bytes[39..41], &[0xFC, 0x03]);
        assert_eq!(&bytes[41..], b"hi\0");
    }

    #[test]
    fn test_rejects_delimiters() {
        assert!(DbbWriteEntry::new("a/b", "c", "m").encode().is_err());
        assert!(DbbWriteEntry::new("a", "b;c", "m").encode().is_err());
        assert!(DbbWriteEntry::new("a", "b", "m\0").encode().is_err());
        assert!(DbbWriteEntry::new("a", "b", "m")
            .with_display_name("x\0")
            .encode()
            .is_err());
    }

    #[test]
    fn test_writer_counts_records() {
        let mut writer = DbbWriter::new(Vec::new());
        writer.add_entry(&DbbWriteEntry::new("a", "b", "one")).unwrap();
        writer.add_entry(&DbbWriteEntry::new("b", "a", "two")).unwrap();
        assert_eq!(writer.records_written(), 2);
        let bytes = writer.finish().unwrap();
        assert_eq!(bytes.iter().filter(|&&b| b == 0x6C).count(), 4);
    }
}
