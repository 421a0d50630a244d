//! Handshake-phase codec: the launch request and its confirmation.
//!
//! These two messages are exchanged once, before the multiplexed data phase
//! begins, and have their own layouts:
//! - Launch request: u32 big-endian length, then a JSON-serialized
//!   [`CommandRequest`].
//! - Confirmation: u16 big-endian status, u32 big-endian diagnostic length,
//!   then the UTF-8 diagnostic.
//!
//! Both peers are built from this crate, which is what makes the request
//! serialization a private contract rather than a public wire format.

use std::io::{ErrorKind, Read, Write};

use serde::{Deserialize, Serialize};

use crate::error::{FrameError, Result};

/// Ceiling for a serialized launch request.
pub const MAX_COMMAND_LEN: usize = 1024 * 1024;

/// Ceiling for a confirmation diagnostic.
pub const MAX_CONFIRMATION_LEN: usize = 64 * 1024;

/// Confirmation status: the child was spawned and the data phase follows.
pub const STATUS_LAUNCHED: u16 = 0;

/// Status reported locally when the transport produced no confirmation at
/// all, meaning the remote domain never came up.
pub const STATUS_UNREACHABLE: u16 = 125;

/// Diagnostic paired with [`STATUS_UNREACHABLE`].
pub const UNREACHABLE_MSG: &str = "domain does not exist";

/// Launch request sent from the local peer to the remote supervisor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandRequest {
    /// Argument vector for the child, command name first.
    pub argv: Vec<String>,
}

impl CommandRequest {
    pub fn new(argv: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
        }
    }
}

/// Serialize and send a launch request.
pub fn write_command<W: Write>(out: &mut W, request: &CommandRequest) -> Result<()> {
    let payload = serde_json::to_vec(request)?;
    if payload.len() > MAX_COMMAND_LEN {
        return Err(FrameError::ControlTooLarge {
            size: payload.len(),
            max: MAX_COMMAND_LEN,
        });
    }
    out.write_all(&(payload.len() as u32).to_be_bytes())?;
    out.write_all(&payload)?;
    out.flush()?;
    Ok(())
}

/// Read a launch request. A stream that ends mid-message is a fatal
/// protocol error.
pub fn read_command<R: Read>(input: &mut R) -> Result<CommandRequest> {
    let mut len_buf = [0u8; 4];
    read_exact_or_truncated(input, &mut len_buf)?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_COMMAND_LEN {
        return Err(FrameError::ControlTooLarge {
            size: len,
            max: MAX_COMMAND_LEN,
        });
    }

    let mut payload = vec![0u8; len];
    read_exact_or_truncated(input, &mut payload)?;
    Ok(serde_json::from_slice(&payload)?)
}

/// Send a launch confirmation: status plus UTF-8 diagnostic.
pub fn write_confirmation<W: Write>(out: &mut W, status: u16, message: &str) -> Result<()> {
    if message.len() > MAX_CONFIRMATION_LEN {
        return Err(FrameError::ControlTooLarge {
            size: message.len(),
            max: MAX_CONFIRMATION_LEN,
        });
    }
    out.write_all(&status.to_be_bytes())?;
    out.write_all(&(message.len() as u32).to_be_bytes())?;
    out.write_all(message.as_bytes())?;
    out.flush()?;
    Ok(())
}

/// Read a launch confirmation.
///
/// A stream that closes before delivering a single byte means the remote
/// domain never answered; that is reported as `(125, "domain does not
/// exist")` rather than an error. Any shorter-than-expected read after the
/// first byte is fatal.
pub fn read_confirmation<R: Read>(input: &mut R) -> Result<(u16, String)> {
    let mut status_buf = [0u8; 2];
    loop {
        match input.read(&mut status_buf[..1]) {
            Ok(0) => return Ok((STATUS_UNREACHABLE, UNREACHABLE_MSG.to_string())),
            Ok(_) => break,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(FrameError::Io(err)),
        }
    }
    read_exact_or_truncated(input, &mut status_buf[1..])?;
    let status = u16::from_be_bytes(status_buf);

    let mut len_buf = [0u8; 4];
    read_exact_or_truncated(input, &mut len_buf)?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_CONFIRMATION_LEN {
        return Err(FrameError::ControlTooLarge {
            size: len,
            max: MAX_CONFIRMATION_LEN,
        });
    }

    let mut message = vec![0u8; len];
    read_exact_or_truncated(input, &mut message)?;
    let message = String::from_utf8(message).map_err(|_| FrameError::ConfirmationEncoding)?;
    Ok((status, message))
}

fn read_exact_or_truncated<R: Read>(input: &mut R, buf: &mut [u8]) -> Result<()> {
    input.read_exact(buf).map_err(|err| {
        if err.kind() == ErrorKind::UnexpectedEof {
            FrameError::Truncated
        } else {
            FrameError::Io(err)
        }
    })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn command_roundtrip() {
        let request = CommandRequest::new(["sh", "-c", "printf hi"]);
        let mut wire = Vec::new();
        write_command(&mut wire, &request).unwrap();

        let decoded = read_command(&mut Cursor::new(wire)).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn command_preserves_argument_order_and_content() {
        let request = CommandRequest::new(["cmd", "--flag", "", "weird arg \"quoted\"", "-d"]);
        let mut wire = Vec::new();
        write_command(&mut wire, &request).unwrap();

        let decoded = read_command(&mut Cursor::new(wire)).unwrap();
        assert_eq!(
            decoded.argv,
            vec!["cmd", "--flag", "", "weird arg \"quoted\"", "-d"]
        );
    }

    #[test]
    fn command_truncated_stream_is_fatal() {
        let request = CommandRequest::new(["cat"]);
        let mut wire = Vec::new();
        write_command(&mut wire, &request).unwrap();
        wire.truncate(wire.len() - 2);

        let err = read_command(&mut Cursor::new(wire)).unwrap_err();
        assert!(matches!(err, FrameError::Truncated));
    }

    #[test]
    fn command_length_ceiling_enforced() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&(MAX_COMMAND_LEN as u32 + 1).to_be_bytes());

        let err = read_command(&mut Cursor::new(wire)).unwrap_err();
        assert!(matches!(err, FrameError::ControlTooLarge { .. }));
    }

    #[test]
    fn command_rejects_non_json_payload() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&9u32.to_be_bytes());
        wire.extend_from_slice(b"{not-json");

        let err = read_command(&mut Cursor::new(wire)).unwrap_err();
        assert!(matches!(err, FrameError::Command(_)));
    }

    #[test]
    fn confirmation_roundtrip() {
        let mut wire = Vec::new();
        write_confirmation(&mut wire, 127, "cannot execute /no/such/binary").unwrap();

        let (status, message) = read_confirmation(&mut Cursor::new(wire)).unwrap();
        assert_eq!(status, 127);
        assert_eq!(message, "cannot execute /no/such/binary");
    }

    #[test]
    fn launched_confirmation_has_empty_diagnostic() {
        let mut wire = Vec::new();
        write_confirmation(&mut wire, STATUS_LAUNCHED, "").unwrap();

        let (status, message) = read_confirmation(&mut Cursor::new(wire)).unwrap();
        assert_eq!(status, STATUS_LAUNCHED);
        assert!(message.is_empty());
    }

    #[test]
    fn silent_transport_maps_to_unreachable() {
        let (status, message) = read_confirmation(&mut Cursor::new(Vec::new())).unwrap();
        assert_eq!(status, STATUS_UNREACHABLE);
        assert_eq!(message, UNREACHABLE_MSG);
    }

    #[test]
    fn short_read_after_first_byte_is_fatal() {
        let err = read_confirmation(&mut Cursor::new(vec![0x00])).unwrap_err();
        assert!(matches!(err, FrameError::Truncated));
    }

    #[test]
    fn short_diagnostic_is_fatal() {
        let mut wire = Vec::new();
        write_confirmation(&mut wire, 126, "diagnostic").unwrap();
        wire.truncate(wire.len() - 4);

        let err = read_confirmation(&mut Cursor::new(wire)).unwrap_err();
        assert!(matches!(err, FrameError::Truncated));
    }

    #[test]
    fn oversized_diagnostic_rejected_before_allocation() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&1u16.to_be_bytes());
        wire.extend_from_slice(&u32::MAX.to_be_bytes());

        let err = read_confirmation(&mut Cursor::new(wire)).unwrap_err();
        assert!(matches!(err, FrameError::ControlTooLarge { .. }));
    }

    #[test]
    fn invalid_utf8_diagnostic_rejected() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&126u16.to_be_bytes());
        wire.extend_from_slice(&2u32.to_be_bytes());
        wire.extend_from_slice(&[0xFF, 0xFE]);

        let err = read_confirmation(&mut Cursor::new(wire)).unwrap_err();
        assert!(matches!(err, FrameError::ConfirmationEncoding));
    }

    #[test]
    fn confirmation_strictly_precedes_data_phase_bytes() {
        // The confirmation reader must consume exactly its own bytes so the
        // stream can be handed to the frame reader afterwards.
        let mut wire = Vec::new();
        write_confirmation(&mut wire, STATUS_LAUNCHED, "").unwrap();
        let mut data = bytes::BytesMut::new();
        crate::codec::encode_data(0, b"first-chunk", &mut data).unwrap();
        wire.extend_from_slice(&data);

        let mut cursor = Cursor::new(wire);
        let (status, _) = read_confirmation(&mut cursor).unwrap();
        assert_eq!(status, STATUS_LAUNCHED);

        let mut reader = crate::reader::FrameReader::new(cursor);
        let event = reader.read_event().unwrap().unwrap();
        assert!(matches!(
            event,
            crate::codec::FrameEvent::Data { channel: 0, ref payload } if payload.as_ref() == b"first-chunk"
        ));
    }
}
