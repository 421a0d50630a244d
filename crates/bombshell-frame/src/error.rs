/// Errors that can occur while encoding or decoding wire traffic.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The active flag was neither 0 (end-of-stream) nor 1 (payload).
    #[error("invalid frame active flag {0:#04x}")]
    InvalidActiveFlag(u8),

    /// A data frame may not carry an empty payload; a zero-length read
    /// means end-of-stream and must be sent as an EOF frame instead.
    #[error("zero-length payload is reserved for channel end-of-stream")]
    EmptyPayload,

    /// The payload does not fit in a single frame.
    #[error("payload too large for one frame ({0} bytes)")]
    PayloadTooLarge(usize),

    /// A control message exceeded its ceiling.
    #[error("control message too large ({size} bytes, max {max})")]
    ControlTooLarge { size: usize, max: usize },

    /// The stream ended in the middle of a frame or control message.
    #[error("stream closed mid-frame")]
    Truncated,

    /// An I/O error occurred on the underlying stream.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The launch request payload was not a valid serialized command.
    #[error("malformed launch request: {0}")]
    Command(#[from] serde_json::Error),

    /// The confirmation diagnostic was not valid UTF-8.
    #[error("confirmation diagnostic is not valid UTF-8")]
    ConfirmationEncoding,
}

pub type Result<T> = std::result::Result<T, FrameError>;
