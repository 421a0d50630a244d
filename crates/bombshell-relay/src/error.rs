/// Errors that can occur while relaying between streams and frames.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Stream capability error on a source or sink.
    #[error("stream error: {0}")]
    Stream(#[from] bombshell_stream::StreamError),

    /// Frame-level error on the shared transport.
    #[error("frame error: {0}")]
    Frame(#[from] bombshell_frame::FrameError),

    /// I/O error outside the framed transport.
    #[error("relay I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer violated the channel protocol. Fatal; no resynchronization
    /// is attempted.
    #[error("protocol violation: {0}")]
    Protocol(String),
}

pub type Result<T> = std::result::Result<T, RelayError>;
