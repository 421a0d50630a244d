/// Errors that can occur in stream capability operations.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Failed to duplicate a standard stream descriptor.
    #[error("failed to duplicate {name}: {source}")]
    Dup {
        name: &'static str,
        source: std::io::Error,
    },

    /// Failed to create an anonymous pipe.
    #[error("failed to create pipe: {0}")]
    Pipe(std::io::Error),

    /// Failed to change a descriptor's blocking mode.
    #[error("failed to change blocking mode: {0}")]
    Nonblocking(std::io::Error),

    /// An I/O error occurred on the stream.
    #[error("stream I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StreamError>;
