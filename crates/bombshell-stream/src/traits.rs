use std::io::{Read, Write};
use std::os::fd::AsFd;

/// A readable byte stream the multiplexer can poll for readiness.
///
/// End-of-stream is a successful zero-byte read, matching `Read`.
pub trait Source: Read + AsFd + Send {}

impl<T: Read + AsFd + Send> Source for T {}

/// A writable byte stream the demultiplexer can close.
///
/// Closing is dropping: every implementor releases its descriptor (and so
/// propagates EOF to the far end) when the boxed sink is dropped.
pub trait Sink: Write + Send {}

impl<T: Write + Send> Sink for T {}
