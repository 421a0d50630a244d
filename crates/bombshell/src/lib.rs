//! Transparent remote command execution between Qubes-style domains.
//!
//! The `bombshell` binary is the local peer: it acquires the handshake
//! lock, starts the inter-domain transport helper, ships a bootstrap line
//! plus the launch request, and then relays stdin, stdout, stderr, and
//! signals over the multiplexed transport. The `bombshell-agent` binary is
//! the remote peer: started by the bootstrap line, it spawns the requested
//! command with piped stdio, confirms the launch, and relays from its side
//! until the child exits.

pub mod agent;
pub mod exit;
pub mod launch;
pub mod lock;
pub mod logging;
pub mod signals;
