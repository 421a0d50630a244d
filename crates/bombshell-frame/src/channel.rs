//! Channel ids, fixed per direction for the lifetime of a session.
//!
//! Both directions number their channels from zero; a channel id is only
//! meaningful together with the direction it travels in. The relay derives
//! ids from stream order, so these constants fix the order supervisors
//! must wire their streams in.

/// Local to remote: the user's stdin bytes, destined for the child's stdin.
pub const CH_STDIN: u16 = 0;

/// Local to remote: forwarded signal events (2-byte big-endian signal
/// numbers, one event per signal).
pub const CH_SIGNAL: u16 = 1;

/// Remote to local: the child's stdout.
pub const CH_STDOUT: u16 = 0;

/// Remote to local: the child's stderr, delivered to the caller's original
/// stderr descriptor.
pub const CH_STDERR: u16 = 1;

/// How many channels each direction carries.
pub const CHANNELS_PER_DIRECTION: usize = 2;
