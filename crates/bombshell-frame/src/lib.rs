//! Wire protocol for the bombshell transport.
//!
//! One full-duplex byte pipe carries several logical streams. During the
//! data phase every unit on the wire is a frame:
//! - A 2-byte big-endian channel id
//! - A 1-byte active flag: `1` means a payload chunk follows, `0` marks
//!   end-of-stream for that channel
//! - For active frames, a 4-byte big-endian payload length and the payload
//!
//! Before the data phase the peers exchange two control messages with their
//! own layouts: the launch request (length-prefixed JSON argv) and the
//! launch confirmation (status plus diagnostic). See [`control`].

pub mod channel;
pub mod codec;
pub mod control;
pub mod error;
pub mod reader;
pub mod writer;

pub use channel::{CH_SIGNAL, CH_STDERR, CH_STDIN, CH_STDOUT, CHANNELS_PER_DIRECTION};
pub use codec::{
    decode_event, encode_data, encode_eof, FrameEvent, DATA_HEADER_SIZE, EOF_FRAME_SIZE,
    MAX_PAYLOAD,
};
pub use control::{
    read_command, read_confirmation, write_command, write_confirmation, CommandRequest,
    MAX_COMMAND_LEN, MAX_CONFIRMATION_LEN, STATUS_LAUNCHED, STATUS_UNREACHABLE, UNREACHABLE_MSG,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
