//! Record scanner
//!
//! Walks a `.dbb` buffer front to back, locating each record by its markers
//! and slicing the fields between them. The buffer is never mutated; every
//! field is a borrowed slice and every lookup only searches the unconsumed
//! suffix.
//!
//! Markers are short and can recur inside message payloads. When the gap
//! between the sender field and the message marker is implausibly large the
//! match is treated as a false alignment: the scanner restarts one byte past
//! the rejected record start.

use std::iter::FusedIterator;

use tracing::{debug, warn};

use crate::marker::{
    find_bytes, find_marker, find_sender_marker, MarkerRole, SenderVariant, RECORD_PADDING,
    TIME_BLOCK_LEN,
};
use crate::record::{DecodedRecord, RawRecord};

/// Largest accepted distance between the end of the sender fields and the
/// message marker
pub const MAX_SENDER_GAP: usize = 50;

/// Tunables for the scanner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    /// Opaque bytes skipped after the record start marker
    pub record_padding: usize,
    /// Sender to message distance above which a record is rejected
    pub max_sender_gap: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            record_padding: RECORD_PADDING,
            max_sender_gap: MAX_SENDER_GAP,
        }
    }
}

/// Non-fatal report of a record that could not be completed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDiagnostic {
    /// A mandatory marker was not found after a record start
    MissingMarker {
        role: MarkerRole,
        /// Offset the search started from
        offset: usize,
        record_offset: usize,
    },
    /// Fewer than 6 bytes followed the time marker
    TruncatedTimeBlock { offset: usize, record_offset: usize },
}

impl ScanDiagnostic {
    /// Offset of the record start the diagnostic belongs to
    pub fn record_offset(&self) -> usize {
        match *self {
            ScanDiagnostic::MissingMarker { record_offset, .. } => record_offset,
            ScanDiagnostic::TruncatedTimeBlock { record_offset, .. } => record_offset,
        }
    }
}

impl std::fmt::Display for ScanDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanDiagnostic::MissingMarker {
                role,
                offset,
                record_offset,
            } => write!(
                f,
                "couldn't find {} after offset {} (record at {})",
                role, offset, record_offset
            ),
            ScanDiagnostic::TruncatedTimeBlock {
                offset,
                record_offset,
            } => write!(
                f,
                "time block at offset {} is truncated (record at {})",
                offset, record_offset
            ),
        }
    }
}

/// Why a record attempt did not produce a record
enum Stop {
    /// No further record start
    End,
    /// False alignment at the given record start
    Resync(usize),
    Truncated(ScanDiagnostic),
}

/// Lazy scanner over the records of one buffer
pub struct RecordScanner<'a> {
    buf: &'a [u8],
    cursor: usize,
    options: ScanOptions,
    diagnostics: Vec<ScanDiagnostic>,
    resyncs: usize,
    finished: bool,
}

/// Scan a buffer with the default options
pub fn scan(buf: &[u8]) -> RecordScanner<'_> {
    RecordScanner::new(buf, ScanOptions::default())
}

/// Scan a buffer with custom options
pub fn scan_with(buf: &[u8], options: ScanOptions) -> RecordScanner<'_> {
    RecordScanner::new(buf, options)
}

/// Result of scanning a whole buffer eagerly
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub records: Vec<DecodedRecord>,
    pub diagnostics: Vec<ScanDiagnostic>,
    /// Number of rejected alignments
    pub resyncs: usize,
}

/// Scan a whole buffer and collect records and diagnostics
pub fn scan_all(buf: &[u8], options: ScanOptions) -> ScanReport {
    let mut scanner = RecordScanner::new(buf, options);
    let records = scanner.by_ref().collect();
    ScanReport {
        records,
        diagnostics: scanner.diagnostics,
        resyncs: scanner.resyncs,
    }
}

impl<'a> RecordScanner<'a> {
    pub fn new(buf: &'a [u8], options: ScanOptions) -> Self {
        Self {
            buf,
            cursor: 0,
            options,
            diagnostics: Vec::new(),
            resyncs: 0,
            finished: false,
        }
    }

    /// Diagnostics reported so far
    pub fn diagnostics(&self) -> &[ScanDiagnostic] {
        &self.diagnostics
    }

    /// Number of false alignments recovered from so far
    pub fn resyncs(&self) -> usize {
        self.resyncs
    }

    /// Next record as borrowed field spans
    pub fn next_raw(&mut self) -> Option<RawRecord<'a>> {
        while !self.finished {
            match self.parse_record(self.cursor) {
                Ok((record, next)) => {
                    self.cursor = next;
                    return Some(record);
                }
                Err(Stop::Resync(start)) => {
                    debug!("Rejected record alignment at offset {}", start);
                    self.resyncs += 1;
                    self.cursor = start + 1;
                }
                Err(Stop::End) => {
                    self.finished = true;
                }
                Err(Stop::Truncated(diagnostic)) => {
                    warn!("Scan truncated: {}", diagnostic);
                    self.diagnostics.push(diagnostic);
                    self.finished = true;
                }
            }
        }
        None
    }

    /// Attempt one record starting the search at `from`
    ///
    /// Returns the record and the cursor position after its terminator.
    fn parse_record(&self, from: usize) -> Result<(RawRecord<'a>, usize), Stop> {
        let buf = self.buf;

        let start = find_marker(buf, from, MarkerRole::RecordStart).ok_or(Stop::End)?;
        let require = |role: MarkerRole, offset: usize| {
            find_marker(buf, offset, role).ok_or(Stop::Truncated(ScanDiagnostic::MissingMarker {
                role,
                offset,
                record_offset: start,
            }))
        };

        let pos = (start + MarkerRole::RecordStart.bytes().len() + self.options.record_padding)
            .min(buf.len());
        let chat = require(MarkerRole::ChatFieldStart, pos)?;
        let pos = chat + MarkerRole::ChatFieldStart.bytes().len();

        // Members: #caller/<prefix>recipients; the prefix byte is not checked
        let caller_start = require(MarkerRole::CallerPrefix, pos)? + 1;
        let separator = require(MarkerRole::MemberSeparator, caller_start)?;
        let recipients_start = (separator + 1 + MarkerRole::RecipientPrefix.bytes().len())
            .min(buf.len());
        let members_end = require(MarkerRole::MembersEnd, recipients_start)?;

        let chat_id_start = members_end + 1;
        let time = require(MarkerRole::TimeFieldStart, chat_id_start)?;
        let block_start = time + MarkerRole::TimeFieldStart.bytes().len();
        let time_block = buf
            .get(block_start..block_start + TIME_BLOCK_LEN)
            .ok_or(Stop::Truncated(ScanDiagnostic::TruncatedTimeBlock {
                offset: block_start,
                record_offset: start,
            }))?;
        let pos = block_start + TIME_BLOCK_LEN;

        let (sender_marker, variant) =
            find_sender_marker(buf, pos).ok_or(Stop::Truncated(ScanDiagnostic::MissingMarker {
                role: MarkerRole::SenderFieldStart,
                offset: pos,
                record_offset: start,
            }))?;
        let sender_start = sender_marker + variant.bytes().len();
        let message_marker = require(MarkerRole::MessageFieldStart, sender_start)?;

        let sender_end = field_end(buf, sender_start, message_marker);
        let mut fields_end = sender_end;
        let mut display_name = None;
        if variant == SenderVariant::Username {
            let screen_name = find_bytes(
                &buf[..message_marker],
                sender_end,
                SenderVariant::ScreenName.bytes(),
            );
            if let Some(marker_pos) = screen_name {
                let name_start = marker_pos + SenderVariant::ScreenName.bytes().len();
                let name_end = field_end(buf, name_start, message_marker);
                display_name = Some(&buf[name_start..name_end]);
                fields_end = name_end;
            }
        }

        if message_marker - fields_end > self.options.max_sender_gap {
            return Err(Stop::Resync(start));
        }

        let message_start = message_marker + MarkerRole::MessageFieldStart.bytes().len();
        let message_end = memchr::memchr(0, &buf[message_start..])
            .map(|p| message_start + p)
            .unwrap_or(buf.len());

        let record = RawRecord {
            offset: start,
            caller: &buf[caller_start..separator],
            recipients: &buf[recipients_start..members_end],
            chat_id: &buf[chat_id_start..time],
            time_block,
            sender: &buf[sender_start..sender_end],
            sender_display_name: display_name,
            message: &buf[message_start..message_end],
        };

        Ok((record, (message_end + 1).min(buf.len())))
    }
}

/// End of a NUL terminated field, bounded by `limit`
fn field_end(buf: &[u8], start: usize, limit: usize) -> usize {
    memchr::memchr(0, &buf[start..limit])
        .map(|p| start + p)
        .unwrap_or(limit)
}

impl Iterator for RecordScanner<'_> {
    type Item = DecodedRecord;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_raw().map(|raw| raw.decode())
    }
}

impl FusedIterator for RecordScanner<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::encode_timestamp;
    use crate::writer::{encode_entries, DbbWriteEntry};

    fn entry(n: i32) -> DbbWriteEntry {
        DbbWriteEntry::new("alice", "bob", format!("message {}", n))
            .with_chat_id(format!("chat{}", n))
            .with_timestamp(1_600_000_000 + n)
    }

    #[test]
    fn test_scan_back_to_back_records() {
        let entries: Vec<_> = (0..5).map(entry).collect();
        let buf = encode_entries(&entries).unwrap();

        let mut scanner = scan(&buf);
        let records: Vec<_> = scanner.by_ref().collect();
        assert_eq!(records.len(), 5);
        for (n, record) in records.iter().enumerate() {
            assert_eq!(record.caller, "alice");
            assert_eq!(record.recipients, "bob");
            assert_eq!(record.chat_id, format!("chat{}", n));
            assert_eq!(record.timestamp, 1_600_000_000 + n as i32);
            assert_eq!(record.sender, "alice");
            assert_eq!(record.message, format!("message {}", n));
        }
        assert!(records.windows(2).all(|w| w[0].offset < w[1].offset));
        assert!(scanner.diagnostics().is_empty());
        assert_eq!(scanner.resyncs(), 0);
    }

    #[test]
    fn test_short_buffer_is_clean_end() {
        for buf in [&b""[..], b"l", b"l33"] {
            let report = scan_all(buf, ScanOptions::default());
            assert!(report.records.is_empty());
            assert!(report.diagnostics.is_empty());
        }
    }

    #[test]
    fn test_missing_chat_field_reports_once() {
        let mut buf = b"l33l".to_vec();
        buf.extend_from_slice(&[0u8; 20]);

        let report = scan_all(&buf, ScanOptions::default());
        assert!(report.records.is_empty());
        assert_eq!(
            report.diagnostics,
            vec![ScanDiagnostic::MissingMarker {
                role: MarkerRole::ChatFieldStart,
                offset: 18,
                record_offset: 0,
            }]
        );
    }

    #[test]
    fn test_truncated_tail_keeps_earlier_records() {
        let mut buf = encode_entries(&[entry(1), entry(2)]).unwrap();
        let tail = entry(3).encode().unwrap();
        buf.extend_from_slice(&tail[..42]);

        let report = scan_all(&buf, ScanOptions::default());
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.diagnostics.len(), 1);
        assert!(matches!(
            report.diagnostics[0],
            ScanDiagnostic::TruncatedTimeBlock { .. }
        ));
    }

    #[test]
    fn test_resync_after_false_alignment() {
        // Decoy record whose message marker is only found inside the real
        // record that follows the junk.
        let mut buf = b"l33l".to_vec();
        buf.extend_from_slice(&[0u8; 14]);
        buf.extend_from_slice(&[0xE0, 0x03]);
        buf.extend_from_slice(b"#x/$y;");
        buf.extend_from_slice(&[0xE5, 0x03]);
        buf.extend_from_slice(&encode_timestamp(7));
        buf.extend_from_slice(&[0xE8, 0x03]);
        buf.extend_from_slice(b"s\0");
        buf.extend_from_slice(&[0u8; 60]);
        let real_offset = buf.len();
        buf.extend_from_slice(&entry(9).encode().unwrap());

        let mut scanner = scan(&buf);
        let records: Vec<_> = scanner.by_ref().collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].offset, real_offset);
        assert_eq!(records[0].caller, "alice");
        assert_eq!(records[0].message, "message 9");
        assert_eq!(records[0].timestamp, 1_600_000_009);
        assert_eq!(scanner.resyncs(), 1);
        assert!(scanner.diagnostics().is_empty());
    }

    #[test]
    fn test_sender_gap_threshold_is_configurable() {
        let mut buf = b"l33l".to_vec();
        buf.extend_from_slice(&[0u8; 14]);
        buf.extend_from_slice(&[0xE0, 0x03]);
        buf.extend_from_slice(b"#x/$y;");
        buf.extend_from_slice(&[0xE5, 0x03]);
        buf.extend_from_slice(&encode_timestamp(7));
        buf.extend_from_slice(&[0xE8, 0x03]);
        buf.extend_from_slice(b"s\0");
        buf.extend_from_slice(&[0u8; 20]);
        buf.extend_from_slice(&[0xFC, 0x03]);
        buf.extend_from_slice(b"hello\0");

        let strict = ScanOptions {
            max_sender_gap: 10,
            ..ScanOptions::default()
        };
        assert!(scan_with(&buf, strict).next().is_none());

        let records: Vec<_> = scan(&buf).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].recipients, "y");
        assert_eq!(records[0].message, "hello");
    }

    #[test]
    fn test_message_stops_at_first_nul() {
        let mut buf = entry(1).encode().unwrap();
        buf.extend_from_slice(b"trailing bytes");

        let report = scan_all(&buf, ScanOptions::default());
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].message, "message 1");
        assert!(report.diagnostics.is_empty());
    }

    #[test]
    fn test_unterminated_message_runs_to_end() {
        let mut buf = entry(1).encode().unwrap();
        buf.pop();

        let records: Vec<_> = scan(&buf).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "message 1");
    }

    #[test]
    fn test_recipient_prefix_byte_is_skipped() {
        let buf = encode_entries(&[entry(1), entry(2).with_recipient_prefix(b'$')]).unwrap();

        let records: Vec<_> = scan(&buf).collect();
        assert_eq!(records[0].recipients, "bob");
        assert_eq!(records[1].recipients, "bob");
    }

    #[test]
    fn test_dollar_prefixed_member_field() {
        let mut buf = b"l33l".to_vec();
        buf.extend_from_slice(&[0u8; 14]);
        buf.extend_from_slice(&[0xE0, 0x03]);
        buf.extend_from_slice(b"#alice/$bob;1a2b");
        buf.extend_from_slice(&[0xE5, 0x03]);
        buf.extend_from_slice(&encode_timestamp(1_234_567_890));
        buf.extend_from_slice(&[0xE8, 0x03]);
        buf.extend_from_slice(b"alice\0");
        buf.extend_from_slice(&[0xFC, 0x03]);
        buf.extend_from_slice(b"hello\0");

        let records: Vec<_> = scan(&buf).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].participants(), ("alice", "bob"));
        assert_eq!(records[0].chat_id, "1a2b");
        assert_eq!(records[0].timestamp, 1_234_567_890);
    }

    #[test]
    fn test_separator_at_buffer_end() {
        let mut buf = b"l33l".to_vec();
        buf.extend_from_slice(&[0u8; 14]);
        buf.extend_from_slice(&[0xE0, 0x03]);
        buf.extend_from_slice(b"#alice/");

        let report = scan_all(&buf, ScanOptions::default());
        assert!(report.records.is_empty());
        assert!(matches!(
            report.diagnostics[..],
            [ScanDiagnostic::MissingMarker {
                role: MarkerRole::MembersEnd,
                ..
            }]
        ));
    }

    #[test]
    fn test_screen_name_only_sender() {
        let mut buf = b"l33l".to_vec();
        buf.extend_from_slice(&[0u8; 14]);
        buf.extend_from_slice(&[0xE0, 0x03]);
        buf.extend_from_slice(b"#alice/$bob;");
        buf.extend_from_slice(&[0xE5, 0x03]);
        buf.extend_from_slice(&encode_timestamp(7));
        buf.extend_from_slice(&[0xEC, 0x03]);
        buf.extend_from_slice(b"Bob B.\0");
        buf.extend_from_slice(&[0xFC, 0x03]);
        buf.extend_from_slice(b"msg\0");

        let records: Vec<_> = scan(&buf).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].sender, "Bob B.");
        assert_eq!(records[0].sender_display_name, None);
        assert_eq!(records[0].message, "msg");
    }

    #[test]
    fn test_multi_member_recipients_kept_verbatim() {
        let buf = DbbWriteEntry::new("alice", "bob/carol", "hi")
            .encode()
            .unwrap();

        let records: Vec<_> = scan(&buf).collect();
        assert_eq!(records[0].participants(), ("alice", "bob/carol"));
    }

    #[test]
    fn test_sender_display_name() {
        let buf = entry(1)
            .with_sender("bob")
            .with_display_name("Bob B.")
            .encode()
            .unwrap();

        let records: Vec<_> = scan(&buf).collect();
        assert_eq!(records[0].sender, "bob");
        assert_eq!(records[0].sender_display_name.as_deref(), Some("Bob B."));
        assert_eq!(records[0].message, "message 1");
    }

    #[test]
    fn test_raw_spans_borrow_buffer() {
        let buf = entry(4).encode().unwrap();
        let mut scanner = scan(&buf);
        let raw = scanner.next_raw().unwrap();
        assert_eq!(raw.caller, b"alice");
        assert_eq!(raw.chat_id, b"chat4");
        assert_eq!(raw.time_block.len(), 6);
        assert!(scanner.next_raw().is_none());
        assert!(scanner.next_raw().is_none());
    }
}
