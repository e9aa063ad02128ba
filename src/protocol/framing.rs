//! Header conventions prefixed to every LoRa payload
//!
//! Three conventions share the 255-byte FIFO with the payload:
//!
//! ```text
//! None          [payload]
//! FromOnly      [from][payload]
//! ToFromIdFlags [to][from][id][flags][payload]
//! ```
//!
//! Only `ToFromIdFlags` carries a destination, so address filtering applies to
//! that convention alone.

use crate::config::chip::FIFO_CAPACITY;
use crate::config::link::BROADCAST_ADDRESS;
use crate::lora::traits::RadioError;
use heapless::Vec;

/// Frame bytes as they sit in the FIFO
pub type FrameBuffer = Vec<u8, FIFO_CAPACITY>;

/// Addressing convention prefixed to each payload
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaderMode {
    /// No header, payload only
    #[default]
    None = 0,
    /// One byte: sender address
    FromOnly = 1,
    /// Four bytes: destination, sender, id, flags
    ToFromIdFlags = 2,
}

impl HeaderMode {
    /// Header length in bytes
    pub const fn header_len(self) -> usize {
        match self {
            Self::None => 0,
            Self::FromOnly => 1,
            Self::ToFromIdFlags => 4,
        }
    }

    /// Largest payload that fits in the FIFO after the header
    pub const fn max_payload_len(self) -> usize {
        FIFO_CAPACITY - self.header_len()
    }
}

impl TryFrom<u8> for HeaderMode {
    type Error = RadioError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::FromOnly),
            2 => Ok(Self::ToFromIdFlags),
            _ => Err(RadioError::InvalidConfig),
        }
    }
}

/// Header fields; unused fields of the active convention stay zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameHeader {
    /// Destination address (ToFromIdFlags only)
    pub to: u8,
    /// Sender address
    pub from: u8,
    /// Sequence / correlation id (ToFromIdFlags only)
    pub id: u8,
    /// Application flags (ToFromIdFlags only)
    pub flags: u8,
}

impl FrameHeader {
    /// Header addressed to every node
    pub fn broadcast(from: u8) -> Self {
        Self {
            to: BROADCAST_ADDRESS,
            from,
            ..Default::default()
        }
    }

    pub fn is_broadcast(&self) -> bool {
        self.to == BROADCAST_ADDRESS
    }
}

/// Receive-side destination filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressFilter {
    /// Own node address
    pub this_address: u8,
    /// Accept frames addressed to anyone
    pub promiscuous: bool,
}

impl AddressFilter {
    pub fn accepts(&self, to: u8) -> bool {
        self.promiscuous || to == self.this_address || to == BROADCAST_ADDRESS
    }
}

/// Result of interpreting received FIFO bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseOutcome {
    /// Frame is for this node; header is `None` under [`HeaderMode::None`]
    Accepted(Option<FrameHeader>),
    /// Fewer bytes than the header (or an empty frame)
    TooShort,
    /// Addressed to another node
    NotForUs,
}

/// Serialise the header fields of `mode` followed by `payload`.
///
/// Fails with [`RadioError::PayloadTooLarge`] if the payload does not fit
/// after the header.
pub fn build_frame(
    mode: HeaderMode,
    header: &FrameHeader,
    payload: &[u8],
) -> Result<FrameBuffer, RadioError> {
    if payload.len() > mode.max_payload_len() {
        return Err(RadioError::PayloadTooLarge);
    }

    let mut frame = FrameBuffer::new();
    let header_bytes = [header.to, header.from, header.id, header.flags];
    let header_slice: &[u8] = match mode {
        HeaderMode::None => &[],
        HeaderMode::FromOnly => &header_bytes[1..2],
        HeaderMode::ToFromIdFlags => &header_bytes,
    };

    frame
        .extend_from_slice(header_slice)
        .map_err(|_| RadioError::PayloadTooLarge)?;
    frame
        .extend_from_slice(payload)
        .map_err(|_| RadioError::PayloadTooLarge)?;

    Ok(frame)
}

/// Interpret received bytes under `mode`, applying `filter` to `ToFromIdFlags` frames.
///
/// The payload is `raw[mode.header_len()..]` for accepted frames.
pub fn parse_frame(mode: HeaderMode, raw: &[u8], filter: &AddressFilter) -> ParseOutcome {
    if raw.is_empty() || raw.len() < mode.header_len() {
        return ParseOutcome::TooShort;
    }

    match mode {
        HeaderMode::None => ParseOutcome::Accepted(None),
        HeaderMode::FromOnly => ParseOutcome::Accepted(Some(FrameHeader {
            from: raw[0],
            ..Default::default()
        })),
        HeaderMode::ToFromIdFlags => {
            let header = FrameHeader {
                to: raw[0],
                from: raw[1],
                id: raw[2],
                flags: raw[3],
            };
            if filter.accepts(header.to) {
                ParseOutcome::Accepted(Some(header))
            } else {
                ParseOutcome::NotForUs
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILTER: AddressFilter = AddressFilter {
        this_address: 0x05,
        promiscuous: false,
    };

    #[test]
    fn test_header_lengths() {
        for (mode, len) in [
            (HeaderMode::None, 0),
            (HeaderMode::FromOnly, 1),
            (HeaderMode::ToFromIdFlags, 4),
        ] {
            assert_eq!(mode.header_len(), len);
            assert_eq!(mode.max_payload_len(), FIFO_CAPACITY - len);
        }
    }

    #[test]
    fn test_header_mode_from_byte() {
        assert_eq!(HeaderMode::try_from(1), Ok(HeaderMode::FromOnly));
        assert_eq!(HeaderMode::try_from(3), Err(RadioError::InvalidConfig));
    }

    #[test]
    fn test_build_and_parse_each_mode() {
        let header = FrameHeader {
            to: 0x05,
            from: 0x22,
            id: 0x7A,
            flags: 0x81,
        };
        let payload = b"hello";

        let frame = build_frame(HeaderMode::None, &header, payload).unwrap();
        assert_eq!(frame.as_slice(), payload);
        assert_eq!(
            parse_frame(HeaderMode::None, &frame, &FILTER),
            ParseOutcome::Accepted(None)
        );

        let frame = build_frame(HeaderMode::FromOnly, &header, payload).unwrap();
        assert_eq!(&frame[..1], &[0x22]);
        assert_eq!(&frame[1..], payload);
        assert_eq!(
            parse_frame(HeaderMode::FromOnly, &frame, &FILTER),
            ParseOutcome::Accepted(Some(FrameHeader {
                from: 0x22,
                ..Default::default()
            }))
        );

        let frame = build_frame(HeaderMode::ToFromIdFlags, &header, payload).unwrap();
        assert_eq!(&frame[..4], &[0x05, 0x22, 0x7A, 0x81]);
        assert_eq!(&frame[4..], payload);
        assert_eq!(
            parse_frame(HeaderMode::ToFromIdFlags, &frame, &FILTER),
            ParseOutcome::Accepted(Some(header))
        );
    }

    #[test]
    fn test_build_rejects_oversized_payload() {
        let payload = [0u8; FIFO_CAPACITY];
        let header = FrameHeader::default();

        assert!(build_frame(HeaderMode::None, &header, &payload).is_ok());
        assert_eq!(
            build_frame(HeaderMode::FromOnly, &header, &payload),
            Err(RadioError::PayloadTooLarge)
        );
        assert_eq!(
            build_frame(HeaderMode::ToFromIdFlags, &header, &payload[..252]),
            Err(RadioError::PayloadTooLarge)
        );
        assert!(build_frame(HeaderMode::ToFromIdFlags, &header, &payload[..251]).is_ok());
    }

    #[test]
    fn test_parse_too_short() {
        assert_eq!(parse_frame(HeaderMode::None, &[], &FILTER), ParseOutcome::TooShort);
        assert_eq!(parse_frame(HeaderMode::FromOnly, &[], &FILTER), ParseOutcome::TooShort);
        assert_eq!(
            parse_frame(HeaderMode::ToFromIdFlags, &[0x05, 0x01, 0x02], &FILTER),
            ParseOutcome::TooShort
        );
    }

    #[test]
    fn test_header_only_frame_accepted() {
        assert!(matches!(
            parse_frame(HeaderMode::ToFromIdFlags, &[0x05, 0x01, 0x02, 0x03], &FILTER),
            ParseOutcome::Accepted(Some(_))
        ));
    }

    #[test]
    fn test_address_filtering() {
        let to_other = [0x09, 0x01, 0x00, 0x00, 0xAA];
        let to_broadcast = [BROADCAST_ADDRESS, 0x01, 0x00, 0x00, 0xAA];

        assert_eq!(
            parse_frame(HeaderMode::ToFromIdFlags, &to_other, &FILTER),
            ParseOutcome::NotForUs
        );
        assert!(matches!(
            parse_frame(HeaderMode::ToFromIdFlags, &to_broadcast, &FILTER),
            ParseOutcome::Accepted(_)
        ));

        let promiscuous = AddressFilter {
            promiscuous: true,
            ..FILTER
        };
        assert!(matches!(
            parse_frame(HeaderMode::ToFromIdFlags, &to_other, &promiscuous),
            ParseOutcome::Accepted(_)
        ));

        // FromOnly frames carry no destination
        assert!(matches!(
            parse_frame(HeaderMode::FromOnly, &to_other, &FILTER),
            ParseOutcome::Accepted(_)
        ));
    }

    #[test]
    fn test_broadcast_header() {
        let header = FrameHeader::broadcast(0x10);
        assert!(header.is_broadcast());
        assert_eq!(header.from, 0x10);
    }
}
