//! Timestamped media buffers.
//!
//! A [`Buffer`] is the unit of data exchanged between filters: a payload,
//! a presentation timestamp in stream-clock microseconds, an end-of-stream
//! marker, and a small list of key-value tags.

use bytes::Bytes;
use smallvec::SmallVec;

/// Sentinel for "no presentation timestamp".
pub const PTS_NONE: i64 = i64::MIN;

/// Possible values for buffer tags and filter parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    /// Integer value.
    Int(i64),
    /// Floating-point value.
    Float(f64),
    /// Boolean value.
    Bool(bool),
    /// String value.
    Str(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
}

impl TagValue {
    /// Get the integer value, if this tag holds one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            TagValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the boolean value, if this tag holds one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TagValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

/// A key-value tag attached to a buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    /// Tag name.
    pub key: String,
    /// Tag value.
    pub value: TagValue,
}

/// A timestamped unit of media payload.
///
/// Buffers are created by source filters, passed downstream by ownership
/// transfer, and consumed by sinks. The payload is a cheap-to-clone
/// [`Bytes`] handle, so duplicating a buffer for fan-out never copies data.
///
/// # Invariants
///
/// - An end-of-stream buffer carries no payload obligation.
/// - A zero-length non-EOS buffer is a valid but empty unit.
///
/// # Example
///
/// ```rust
/// use maestro::buffer::Buffer;
///
/// let buf = Buffer::from_bytes(vec![1, 2, 3]).with_pts(40_000);
/// assert_eq!(buf.len(), 3);
/// assert_eq!(buf.pts(), Some(40_000));
/// assert!(!buf.is_eos());
/// ```
#[derive(Debug, Clone)]
pub struct Buffer {
    /// Payload bytes.
    payload: Bytes,
    /// Presentation timestamp in stream-clock microseconds.
    pts: i64,
    /// End-of-stream marker.
    eos: bool,
    /// Key-value metadata tags. Empty or small for most buffers.
    tags: SmallVec<[Tag; 2]>,
}

impl Buffer {
    /// Create a buffer from payload bytes, with no timestamp.
    pub fn from_bytes(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            pts: PTS_NONE,
            eos: false,
            tags: SmallVec::new(),
        }
    }

    /// Create an empty, non-EOS buffer.
    pub fn empty() -> Self {
        Self::from_bytes(Bytes::new())
    }

    /// Create an end-of-stream marker buffer.
    pub fn eos() -> Self {
        Self {
            payload: Bytes::new(),
            pts: PTS_NONE,
            eos: true,
            tags: SmallVec::new(),
        }
    }

    /// Set the presentation timestamp (builder style).
    pub fn with_pts(mut self, pts: i64) -> Self {
        self.pts = pts;
        self
    }

    /// Attach a tag (builder style).
    pub fn with_tag(mut self, key: impl Into<String>, value: TagValue) -> Self {
        self.tags.push(Tag {
            key: key.into(),
            value,
        });
        self
    }

    /// Get the presentation timestamp, if set.
    pub fn pts(&self) -> Option<i64> {
        if self.pts == PTS_NONE {
            None
        } else {
            Some(self.pts)
        }
    }

    /// Set the presentation timestamp.
    pub fn set_pts(&mut self, pts: i64) {
        self.pts = pts;
    }

    /// Clear the presentation timestamp.
    pub fn clear_pts(&mut self) {
        self.pts = PTS_NONE;
    }

    /// Check if this buffer marks end of stream.
    pub fn is_eos(&self) -> bool {
        self.eos
    }

    /// Get the payload bytes.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Get the payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Check if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Get a tag value by key.
    pub fn tag(&self, key: &str) -> Option<&TagValue> {
        self.tags.iter().find(|t| t.key == key).map(|t| &t.value)
    }

    /// Get all tags.
    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_creation() {
        let buf = Buffer::from_bytes(vec![0u8; 16]).with_pts(1_000);
        assert_eq!(buf.len(), 16);
        assert_eq!(buf.pts(), Some(1_000));
        assert!(!buf.is_eos());
        assert!(!buf.is_empty());
    }

    #[test]
    fn test_empty_buffer_is_valid_unit() {
        let buf = Buffer::empty();
        assert!(buf.is_empty());
        assert!(!buf.is_eos());
        assert_eq!(buf.pts(), None);
    }

    #[test]
    fn test_eos_buffer_has_no_payload() {
        let buf = Buffer::eos();
        assert!(buf.is_eos());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_pts_sentinel_roundtrip() {
        let mut buf = Buffer::empty();
        assert_eq!(buf.pts(), None);

        buf.set_pts(-42);
        assert_eq!(buf.pts(), Some(-42));

        buf.clear_pts();
        assert_eq!(buf.pts(), None);
    }

    #[test]
    fn test_tags() {
        let buf = Buffer::empty()
            .with_tag("stream", TagValue::Str("audio".into()))
            .with_tag("track", TagValue::Int(2));

        assert_eq!(buf.tag("stream"), Some(&TagValue::Str("audio".into())));
        assert_eq!(buf.tag("track").and_then(TagValue::as_int), Some(2));
        assert_eq!(buf.tag("missing"), None);
        assert_eq!(buf.tags().len(), 2);
    }

    #[test]
    fn test_clone_shares_payload() {
        let buf = Buffer::from_bytes(vec![7u8; 64]);
        let other = buf.clone();
        assert_eq!(buf.payload().as_ptr(), other.payload().as_ptr());
    }
}
