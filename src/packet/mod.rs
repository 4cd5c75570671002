//! Information packets (IPs) and their structural validation.
//!
//! An IP travels as a multi-frame message made of (marker, payload) frame
//! pairs. The marker frame tags the pair as a data packet or as one side of a
//! bracket group:
//!
//! ```text
//! single data IP:     [ "=" ][ payload ]
//! streamed brackets:  [ "[" ][ label ]   ...data IPs...   [ "]" ][ label ]
//! grouped message:    [ "[" ][ label ][ "=" ][ a ][ "=" ][ b ][ "]" ][ label ]
//! ```
//!
//! Validation is a pure predicate. A message that fails it is not an IP: the
//! receiver discards it and keeps going, it is never handed to domain logic.

use bytes::Bytes;

/// A raw multi-frame message as it comes off (or goes onto) the wire.
pub type Frames = Vec<Bytes>;

/// Marker frame opening a bracket group.
pub const OPEN_BRACKET: &[u8] = b"[";
/// Marker frame closing a bracket group.
pub const CLOSE_BRACKET: &[u8] = b"]";
/// Marker frame for a plain data packet.
pub const DATA: &[u8] = b"=";

/// Structural kind of a marker/payload pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    /// Opens a bracket group; the payload is the group label.
    Open,
    /// Carries payload bytes.
    Data,
    /// Closes a bracket group; the payload is the group label.
    Close,
}

impl PacketKind {
    /// Parse a marker frame.
    pub fn from_marker(marker: &[u8]) -> Option<Self> {
        match marker {
            OPEN_BRACKET => Some(Self::Open),
            DATA => Some(Self::Data),
            CLOSE_BRACKET => Some(Self::Close),
            _ => None,
        }
    }

    /// Wire marker for this kind.
    pub fn marker(self) -> &'static [u8] {
        match self {
            Self::Open => OPEN_BRACKET,
            Self::Data => DATA,
            Self::Close => CLOSE_BRACKET,
        }
    }
}

/// Check whether a raw message is a well-formed IP.
///
/// Rules:
/// - At least 2 frames, and an even number of them (marker/payload pairs)
/// - Every marker frame is a recognised marker
/// - Data payloads are not empty
/// - In a message with more than one pair, brackets nest: no close without a
///   matching open, a close carries the label of the innermost open group, and
///   every group opened in the message is closed in it
///
/// A message consisting of a single open or close pair is a streamed bracket
/// and is valid on its own; matching it up is the job of [`BracketTracker`].
pub fn is_valid_packet(frames: &[Bytes]) -> bool {
    if frames.len() < 2 || frames.len() % 2 != 0 {
        return false;
    }

    let mut groups: Vec<&[u8]> = Vec::new();
    for pair in frames.chunks_exact(2) {
        let (marker, payload) = (&pair[0], &pair[1]);
        match PacketKind::from_marker(marker) {
            None => return false,
            Some(PacketKind::Data) => {
                if payload.is_empty() {
                    return false;
                }
            }
            Some(PacketKind::Open) => groups.push(payload.as_ref()),
            Some(PacketKind::Close) => {
                if frames.len() == 2 {
                    // Streamed close bracket; its open came in an earlier message.
                    continue;
                }
                match groups.pop() {
                    Some(label) if label == payload.as_ref() => {}
                    _ => return false,
                }
            }
        }
    }

    frames.len() == 2 || groups.is_empty()
}

/// Check whether a raw message is a valid IP carrying data.
///
/// True iff [`is_valid_packet`] holds and the leading marker is [`DATA`].
pub fn is_data_packet(frames: &[Bytes]) -> bool {
    is_valid_packet(frames) && frames[0].as_ref() == DATA
}

/// A single immutable information packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    kind: PacketKind,
    payload: Bytes,
}

impl Packet {
    /// Create a data packet.
    pub fn data(payload: impl Into<Bytes>) -> Self {
        Self {
            kind: PacketKind::Data,
            payload: payload.into(),
        }
    }

    /// Create an open bracket for the named group.
    pub fn open(label: impl Into<Bytes>) -> Self {
        Self {
            kind: PacketKind::Open,
            payload: label.into(),
        }
    }

    /// Create a close bracket for the named group.
    pub fn close(label: impl Into<Bytes>) -> Self {
        Self {
            kind: PacketKind::Close,
            payload: label.into(),
        }
    }

    /// Rebuild a packet from a two-frame message.
    ///
    /// Returns `None` for anything that is not a valid single-pair IP.
    pub fn from_frames(frames: &[Bytes]) -> Option<Self> {
        if frames.len() != 2 || !is_valid_packet(frames) {
            return None;
        }
        let kind = PacketKind::from_marker(&frames[0])?;
        Some(Self {
            kind,
            payload: frames[1].clone(),
        })
    }

    pub fn kind(&self) -> PacketKind {
        self.kind
    }

    pub fn is_data(&self) -> bool {
        self.kind == PacketKind::Data
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Payload decoded as UTF-8, replacing invalid sequences.
    pub fn payload_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }

    /// Encode as a wire message.
    pub fn to_frames(&self) -> Frames {
        vec![
            Bytes::from_static(self.kind.marker()),
            self.payload.clone(),
        ]
    }

    pub fn into_frames(self) -> Frames {
        vec![Bytes::from_static(self.kind.marker()), self.payload]
    }
}

impl From<Packet> for Frames {
    fn from(packet: Packet) -> Self {
        packet.into_frames()
    }
}

/// Bracket nesting violations across a stream of IPs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BracketError {
    #[error("message is not a valid IP")]
    Malformed,

    #[error("close bracket '{0}' without an open group")]
    Unopened(String),

    #[error("close bracket '{found}' does not match open group '{expected}'")]
    Mismatched { expected: String, found: String },
}

/// Tracks bracket nesting over the IPs arriving on one input port.
///
/// [`is_valid_packet`] only sees one message at a time; streamed brackets
/// (an open IP, data IPs, a close IP) need state carried between messages.
#[derive(Debug, Default)]
pub struct BracketTracker {
    open: Vec<Bytes>,
}

impl BracketTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current nesting depth.
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    /// Account for one received message and return the resulting depth.
    ///
    /// On error the tracker state is left unchanged.
    pub fn observe(&mut self, frames: &[Bytes]) -> Result<usize, BracketError> {
        if !is_valid_packet(frames) {
            return Err(BracketError::Malformed);
        }

        let mut open = self.open.clone();
        for pair in frames.chunks_exact(2) {
            match PacketKind::from_marker(&pair[0]) {
                Some(PacketKind::Open) => open.push(pair[1].clone()),
                Some(PacketKind::Close) => match open.pop() {
                    Some(label) if label == pair[1] => {}
                    Some(label) => {
                        return Err(BracketError::Mismatched {
                            expected: String::from_utf8_lossy(&label).into_owned(),
                            found: String::from_utf8_lossy(&pair[1]).into_owned(),
                        })
                    }
                    None => {
                        return Err(BracketError::Unopened(
                            String::from_utf8_lossy(&pair[1]).into_owned(),
                        ))
                    }
                },
                _ => {}
            }
        }

        self.open = open;
        Ok(self.open.len())
    }

    /// Forget any open groups (e.g. after the upstream peer went away).
    pub fn reset(&mut self) {
        self.open.clear();
    }
}

#[cfg(test)]
mod tests;
