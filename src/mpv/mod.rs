//! MPV IPC module - spawns and controls external MPV player via JSON IPC.
//!
//! Architecture:
//! - `process.rs` - MPV binary detection, spawning and termination
//! - `ipc.rs` - Half-duplex IPC connection (Named Pipes on Windows, Unix Sockets on Linux/macOS)
//! - `protocol.rs` - JSON command/response types and serialization
//! - `client.rs` - High-level MPV client implementing the player's `Engine`

mod client;
mod ipc;
mod process;
mod protocol;
#[cfg(all(test, unix))]
pub(crate) mod testing;

pub use client::MpvClient;
pub use ipc::{IpcError, MpvIpc};
pub use process::{find_mpv, Session, SpawnError, Supervisor, SupervisorConfig};
pub use protocol::{MpvCommand, MpvResponse, PropertyValue, ENGINE_VOLUME_MAX};
