//! Chat record types

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::timestamp::decode_time_block;

/// Field spans of one record, borrowed from the source buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawRecord<'a> {
    /// Offset of the record start marker in the buffer
    pub offset: usize,
    pub caller: &'a [u8],
    pub recipients: &'a [u8],
    pub chat_id: &'a [u8],
    /// The full 6-byte time block
    pub time_block: &'a [u8],
    pub sender: &'a [u8],
    pub sender_display_name: Option<&'a [u8]>,
    pub message: &'a [u8],
}

impl RawRecord<'_> {
    /// Decode the spans into an owned record
    pub fn decode(&self) -> DecodedRecord {
        DecodedRecord {
            offset: self.offset,
            caller: lossy(self.caller),
            recipients: lossy(self.recipients),
            chat_id: lossy(self.chat_id),
            timestamp: decode_time_block(self.time_block).unwrap_or_default(),
            sender: lossy(self.sender),
            sender_display_name: self.sender_display_name.map(lossy),
            message: lossy(self.message),
        }
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// A decoded chat record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedRecord {
    /// Offset of the record start marker in the source buffer
    pub offset: usize,
    /// First chat member
    pub caller: String,
    /// Remaining chat members. For chats with more than two members this
    /// may hold several identifiers verbatim.
    pub recipients: String,
    /// Bytes between the members field and the time marker
    pub chat_id: String,
    /// Unix timestamp in seconds
    pub timestamp: i32,
    pub sender: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_display_name: Option<String>,
    pub message: String,
}

impl DecodedRecord {
    /// Caller and recipients as a pair
    pub fn participants(&self) -> (&str, &str) {
        (&self.caller, &self.recipients)
    }

    /// Timestamp as a UTC date time
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(i64::from(self.timestamp), 0)
    }

    /// Non-empty lines of the message
    pub fn message_lines(&self) -> impl Iterator<Item = &str> {
        self.message.split('\n').filter(|line| !line.is_empty())
    }
}
