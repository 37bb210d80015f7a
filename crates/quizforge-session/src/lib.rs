//! Connection lifecycle for Quizforge.
//!
//! This crate sits between the transport and the room layer. It knows
//! which live connection speaks for which `(player, room)` identity and
//! turns transport events into room operations:
//!
//! 1. **Tagging**: a successful create/join tags the connection
//!    ([`ConnectionRegistry::tag`])
//! 2. **Reconnection grace**: a dropped connection starts a per-player
//!    timer; rejoining before it fires cancels it
//! 3. **Idle detection**: a periodic sweep pings every connection and
//!    terminates the ones that stopped answering
//! 4. **Maintenance**: idle rooms are closed and active rooms snapshotted
//!    on the same loop ([`ConnectionRegistry::run_maintenance`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Server / handler (above)  ← registers connections, tags identities
//!     ↕
//! Session Layer (this crate)  ← grace timers, ping sweep, maintenance
//!     ↕
//! Room Layer (below)  ← mark_disconnected, expire, prune, broadcast
//! ```

mod config;
mod error;
mod grace;
mod registry;

pub use config::RegistryConfig;
pub use error::SessionError;
pub use registry::{ConnectionRegistry, Identity};
