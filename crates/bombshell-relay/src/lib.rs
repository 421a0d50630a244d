//! Stream multiplexer and demultiplexer for the bombshell transport.
//!
//! The [`Multiplexer`] fans N local sources into one framed sink; the
//! [`Demultiplexer`] fans one framed source out to N local sinks. Source
//! and sink index doubles as the channel id, so the channel table for each
//! direction is simply the order the streams are handed over in.
//!
//! Bytes from one channel are delivered in production order; channels
//! interleave at frame granularity only.

pub mod demux;
pub mod error;
pub mod mux;

pub use demux::Demultiplexer;
pub use error::{RelayError, Result};
pub use mux::{Multiplexer, READ_CEILING};
