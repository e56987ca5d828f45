//! Marker table for the `.dbb` chat record layout
//!
//! Records carry no length fields or checksums. Every field is located by
//! searching for a short fixed byte sequence ("marker") that precedes or
//! terminates it:
//!
//! ```text
//! 6C 33 33 6C __ __ __ __ __ __ __ __ __ __ __ __ __ __
//! E0 03 23 <caller> 2F 34 <recipients> 3B <chat id>
//! E5 03 <6 byte timestamp>
//! E8 03 <sender> 00 [EC 03 <screen name> 00]
//! FC 03 <message> 00
//! ```
//!
//! Matching is byte exact. A single differing byte is a miss.

use memchr::memmem;

/// Number of opaque bytes following [`MarkerRole::RecordStart`]
pub const RECORD_PADDING: usize = 14;

/// Length of the packed timestamp block following [`MarkerRole::TimeFieldStart`]
pub const TIME_BLOCK_LEN: usize = 6;

const RECORD_START: &[u8] = &[0x6C, 0x33, 0x33, 0x6C];
const CHAT_FIELD_START: &[u8] = &[0xE0, 0x03];
const CALLER_PREFIX: &[u8] = &[0x23];
const MEMBER_SEPARATOR: &[u8] = &[0x2F];
const RECIPIENT_PREFIX: &[u8] = &[0x34];
const MEMBERS_END: &[u8] = &[0x3B];
const TIME_FIELD_START: &[u8] = &[0xE5, 0x03];
const SENDER_FIELD_START: &[u8] = &[0xE8, 0x03];
const SENDER_SCREEN_NAME_START: &[u8] = &[0xEC, 0x03];
const MESSAGE_FIELD_START: &[u8] = &[0xFC, 0x03];

/// Semantic role of a marker, in the order the scanner expects them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerRole {
    /// `l33l`, begins every record
    RecordStart,
    /// Begins the chat members field
    ChatFieldStart,
    /// `#`, prefixes the caller
    CallerPrefix,
    /// `/`, separates caller from recipients
    MemberSeparator,
    /// Prefixes the second member; the byte after the separator is skipped
    /// rather than matched
    RecipientPrefix,
    /// `;`, ends the members field
    MembersEnd,
    /// Begins the packed timestamp block
    TimeFieldStart,
    /// Begins the sender username field
    SenderFieldStart,
    /// Begins the message text
    MessageFieldStart,
}

impl MarkerRole {
    /// All roles in scan order
    pub const ALL: [MarkerRole; 9] = [
        MarkerRole::RecordStart,
        MarkerRole::ChatFieldStart,
        MarkerRole::CallerPrefix,
        MarkerRole::MemberSeparator,
        MarkerRole::RecipientPrefix,
        MarkerRole::MembersEnd,
        MarkerRole::TimeFieldStart,
        MarkerRole::SenderFieldStart,
        MarkerRole::MessageFieldStart,
    ];

    /// Literal byte sequence for this role
    ///
    /// For [`MarkerRole::SenderFieldStart`] this is the username variant
    /// (`E8 03`); see [`SenderVariant`] for the screen name variant.
    pub fn bytes(self) -> &'static [u8] {
        match self {
            MarkerRole::RecordStart => RECORD_START,
            MarkerRole::ChatFieldStart => CHAT_FIELD_START,
            MarkerRole::CallerPrefix => CALLER_PREFIX,
            MarkerRole::MemberSeparator => MEMBER_SEPARATOR,
            MarkerRole::RecipientPrefix => RECIPIENT_PREFIX,
            MarkerRole::MembersEnd => MEMBERS_END,
            MarkerRole::TimeFieldStart => TIME_FIELD_START,
            MarkerRole::SenderFieldStart => SENDER_FIELD_START,
            MarkerRole::MessageFieldStart => MESSAGE_FIELD_START,
        }
    }

    /// Human readable name, used in diagnostics
    pub fn name(self) -> &'static str {
        match self {
            MarkerRole::RecordStart => "record start",
            MarkerRole::ChatFieldStart => "chat field start",
            MarkerRole::CallerPrefix => "caller prefix",
            MarkerRole::MemberSeparator => "member separator",
            MarkerRole::RecipientPrefix => "recipient prefix",
            MarkerRole::MembersEnd => "members end",
            MarkerRole::TimeFieldStart => "time field start",
            MarkerRole::SenderFieldStart => "sender field start",
            MarkerRole::MessageFieldStart => "message field start",
        }
    }
}

impl std::fmt::Display for MarkerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A fixed byte sequence with its role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    pub role: MarkerRole,
    pub bytes: &'static [u8],
}

impl Marker {
    /// Length of the marker in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Look up the marker for a role
pub fn marker(role: MarkerRole) -> Marker {
    Marker {
        role,
        bytes: role.bytes(),
    }
}

/// Which sender field a sender marker introduced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderVariant {
    /// `E8 03`, sender username
    Username,
    /// `EC 03`, sender screen name
    ScreenName,
}

impl SenderVariant {
    pub fn bytes(self) -> &'static [u8] {
        match self {
            SenderVariant::Username => SENDER_FIELD_START,
            SenderVariant::ScreenName => SENDER_SCREEN_NAME_START,
        }
    }
}

/// Find the first occurrence of `needle` in `buf` at or after `from`
///
/// Returns the absolute offset of the match. `from` past the end of the
/// buffer is a miss, not a panic.
pub fn find_bytes(buf: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    let haystack = buf.get(from..)?;
    memmem::find(haystack, needle).map(|pos| from + pos)
}

/// Find the first marker of `role` at or after `from`
pub fn find_marker(buf: &[u8], from: usize, role: MarkerRole) -> Option<usize> {
    find_bytes(buf, from, role.bytes())
}

/// Find the earliest sender marker of either variant at or after `from`
///
/// The screen name variant is only searched for before the first username
/// marker.
pub fn find_sender_marker(buf: &[u8], from: usize) -> Option<(usize, SenderVariant)> {
    let screen_name = SenderVariant::ScreenName.bytes();
    match find_bytes(buf, from, SenderVariant::Username.bytes()) {
        Some(username) => {
            let before = find_bytes(&buf[..username], from, screen_name)
                .map(|pos| (pos, SenderVariant::ScreenName));
            Some(before.unwrap_or((username, SenderVariant::Username)))
        }
        None => find_bytes(buf, from, screen_name).map(|pos| (pos, SenderVariant::ScreenName)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_bytes() {
        assert_eq!(marker(MarkerRole::RecordStart).bytes, b"l33l");
        assert_eq!(marker(MarkerRole::CallerPrefix).bytes, b"#");
        assert_eq!(marker(MarkerRole::MemberSeparator).bytes, b"/");
        assert_eq!(marker(MarkerRole::MembersEnd).bytes, b";");
        assert_eq!(marker(MarkerRole::MessageFieldStart).bytes, &[0xFC, 0x03]);
        for role in MarkerRole::ALL {
            let m = marker(role);
            assert!((1..=4).contains(&m.len()), "{role} has bad length");
        }
    }

    #[test]
    fn test_find_bytes_is_anchored() {
        let buf = b"l33l....l33l";
        assert_eq!(find_marker(buf, 0, MarkerRole::RecordStart), Some(0));
        assert_eq!(find_marker(buf, 1, MarkerRole::RecordStart), Some(8));
        assert_eq!(find_marker(buf, 9, MarkerRole::RecordStart), None);
        assert_eq!(find_marker(buf, 100, MarkerRole::RecordStart), None);
    }

    #[test]
    fn test_find_bytes_exact_match_only() {
        let buf = [0x6C, 0x33, 0x34, 0x6C, 0xE0, 0x04];
        assert_eq!(find_marker(&buf, 0, MarkerRole::RecordStart), None);
        assert_eq!(find_marker(&buf, 0, MarkerRole::ChatFieldStart), None);
    }

    #[test]
    fn test_find_sender_marker_picks_earliest() {
        let buf = [0x00, 0xEC, 0x03, 0x41, 0xE8, 0x03];
        assert_eq!(find_sender_marker(&buf, 0), Some((1, SenderVariant::ScreenName)));
        assert_eq!(find_sender_marker(&buf, 2), Some((4, SenderVariant::Username)));
        assert_eq!(find_sender_marker(&buf, 5), None);
    }

    #[test]
    fn test_find_sender_marker_ignores_screen_name_after_username() {
        let buf = [0xE8, 0x03, 0x41, 0x00, 0xEC, 0x03, 0x42, 0x00];
        assert_eq!(find_sender_marker(&buf, 0), Some((0, SenderVariant::Username)));
        assert_eq!(find_sender_marker(&buf, 1), Some((4, SenderVariant::ScreenName)));
    }

    #[test]
    fn test_find_sender_marker_screen_name_only() {
        let buf = [0x00, 0x00, 0xEC, 0x03, 0x42];
        assert_eq!(find_sender_marker(&buf, 0), Some((2, SenderVariant::ScreenName)));
    }
}
