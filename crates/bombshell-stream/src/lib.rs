//! Byte-stream capability layer for the bombshell relay.
//!
//! The multiplexer and demultiplexer operate on capabilities, not on OS
//! descriptors directly: a [`Source`] is anything readable whose readiness
//! can be polled, a [`Sink`] is anything writable that closes when dropped.
//! Unix pipes, socket pairs, and child stdio handles all qualify, which is
//! also what makes the relay testable in-process.

pub mod error;
pub mod fd;
pub mod pipe;
pub mod traits;

pub use error::{Result, StreamError};
pub use fd::{set_nonblocking, FdStream};
pub use pipe::pipe_pair;
pub use traits::{Sink, Source};
