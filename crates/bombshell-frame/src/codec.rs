use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Data frame header: channel (2) + active flag (1) + length (4).
pub const DATA_HEADER_SIZE: usize = 7;

/// An EOF frame is a bare header: channel (2) + active flag (1).
pub const EOF_FRAME_SIZE: usize = 3;

/// Largest payload a single frame can carry. The length field is a u32, so
/// anything at or beyond 2^32 bytes must be split by the producer.
pub const MAX_PAYLOAD: u64 = u32::MAX as u64;

/// One decoded unit from the multiplexed stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    /// A payload chunk for a channel.
    Data { channel: u16, payload: Bytes },
    /// The channel will carry no further frames in this direction.
    Eof { channel: u16 },
}

impl FrameEvent {
    /// The channel this event belongs to.
    pub fn channel(&self) -> u16 {
        match self {
            FrameEvent::Data { channel, .. } | FrameEvent::Eof { channel } => *channel,
        }
    }
}

/// Encode a data frame. Rejects empty payloads (those are EOF markers, see
/// [`encode_eof`]) and payloads that overflow the length field.
pub fn encode_data(channel: u16, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.is_empty() {
        return Err(FrameError::EmptyPayload);
    }
    if payload.len() as u64 > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge(payload.len()));
    }
    dst.reserve(DATA_HEADER_SIZE + payload.len());
    dst.put_u16(channel);
    dst.put_u8(1);
    dst.put_u32(payload.len() as u32);
    dst.put_slice(payload);
    Ok(())
}

/// Encode an end-of-stream marker for a channel.
pub fn encode_eof(channel: u16, dst: &mut BytesMut) {
    dst.reserve(EOF_FRAME_SIZE);
    dst.put_u16(channel);
    dst.put_u8(0);
}

/// Decode the next frame from a buffer.
///
/// Returns `Ok(None)` when the buffer does not yet hold a complete frame.
/// On success the frame's bytes are consumed from the buffer.
pub fn decode_event(src: &mut BytesMut) -> Result<Option<FrameEvent>> {
    if src.len() < EOF_FRAME_SIZE {
        return Ok(None);
    }

    let channel = u16::from_be_bytes([src[0], src[1]]);
    match src[2] {
        0 => {
            src.advance(EOF_FRAME_SIZE);
            Ok(Some(FrameEvent::Eof { channel }))
        }
        1 => {
            if src.len() < DATA_HEADER_SIZE {
                return Ok(None);
            }
            let len = u32::from_be_bytes([src[3], src[4], src[5], src[6]]) as usize;
            if len == 0 {
                return Err(FrameError::EmptyPayload);
            }
            if src.len() < DATA_HEADER_SIZE + len {
                return Ok(None);
            }
            src.advance(DATA_HEADER_SIZE);
            let payload = src.split_to(len).freeze();
            Ok(Some(FrameEvent::Data { channel, payload }))
        }
        other => Err(FrameError::InvalidActiveFlag(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_frame_roundtrip() {
        let mut buf = BytesMut::new();
        encode_data(1, b"hello", &mut buf).unwrap();

        assert_eq!(buf.len(), DATA_HEADER_SIZE + 5);

        let event = decode_event(&mut buf).unwrap().unwrap();
        assert_eq!(
            event,
            FrameEvent::Data {
                channel: 1,
                payload: Bytes::from_static(b"hello"),
            }
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn eof_frame_roundtrip() {
        let mut buf = BytesMut::new();
        encode_eof(3, &mut buf);

        assert_eq!(buf.len(), EOF_FRAME_SIZE);

        let event = decode_event(&mut buf).unwrap().unwrap();
        assert_eq!(event, FrameEvent::Eof { channel: 3 });
        assert!(buf.is_empty());
    }

    #[test]
    fn wire_layout_is_network_order() {
        let mut buf = BytesMut::new();
        encode_data(0x0102, b"z", &mut buf).unwrap();
        assert_eq!(buf.as_ref(), &[0x01, 0x02, 0x01, 0x00, 0x00, 0x00, 0x01, b'z']);

        let mut buf = BytesMut::new();
        encode_eof(0x0102, &mut buf);
        assert_eq!(buf.as_ref(), &[0x01, 0x02, 0x00]);
    }

    #[test]
    fn empty_payload_rejected_on_encode() {
        let mut buf = BytesMut::new();
        let err = encode_data(0, b"", &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::EmptyPayload));
        assert!(buf.is_empty());
    }

    #[test]
    fn zero_length_data_frame_rejected_on_decode() {
        let mut buf = BytesMut::new();
        buf.put_u16(0);
        buf.put_u8(1);
        buf.put_u32(0);

        let err = decode_event(&mut buf).unwrap_err();
        assert!(matches!(err, FrameError::EmptyPayload));
    }

    #[test]
    fn unknown_active_flag_rejected() {
        let mut buf = BytesMut::from(&[0x00, 0x01, 0x07][..]);
        let err = decode_event(&mut buf).unwrap_err();
        assert!(matches!(err, FrameError::InvalidActiveFlag(0x07)));
    }

    #[test]
    fn incomplete_header_needs_more_data() {
        let mut buf = BytesMut::from(&[0x00, 0x01][..]);
        assert!(decode_event(&mut buf).unwrap().is_none());

        let mut buf = BytesMut::from(&[0x00, 0x01, 0x01, 0x00][..]);
        assert!(decode_event(&mut buf).unwrap().is_none());
    }

    #[test]
    fn incomplete_payload_needs_more_data() {
        let mut buf = BytesMut::new();
        encode_data(2, b"payload", &mut buf).unwrap();
        buf.truncate(DATA_HEADER_SIZE + 3);

        assert!(decode_event(&mut buf).unwrap().is_none());
    }

    #[test]
    fn frames_interleave_at_frame_granularity() {
        let mut buf = BytesMut::new();
        encode_data(0, b"first", &mut buf).unwrap();
        encode_eof(1, &mut buf);
        encode_data(0, b"second", &mut buf).unwrap();

        let e1 = decode_event(&mut buf).unwrap().unwrap();
        let e2 = decode_event(&mut buf).unwrap().unwrap();
        let e3 = decode_event(&mut buf).unwrap().unwrap();

        assert!(matches!(e1, FrameEvent::Data { channel: 0, ref payload } if payload.as_ref() == b"first"));
        assert_eq!(e2, FrameEvent::Eof { channel: 1 });
        assert!(matches!(e3, FrameEvent::Data { channel: 0, ref payload } if payload.as_ref() == b"second"));
        assert!(buf.is_empty());
    }
}
