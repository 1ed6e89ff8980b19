//! Playback control: transport state, the control loop and cover art.
//!
//! Architecture:
//! - `transport.rs` - Queue, shuffle pool, history and toggles
//! - `engine.rs` - The loop's view of the playback engine
//! - `control.rs` - Fixed-cadence tick loop
//! - `snapshot.rs` - Input events in, per-tick snapshots out
//! - `art.rs` - Cancellable background cover-art fetch

mod art;
mod control;
mod engine;
mod snapshot;
mod transport;

pub use art::{ArtFetcher, ArtState, ArtTrigger, SharedArt};
pub use control::{ControlLoop, LoopPolicy, PlayerError};
pub(crate) use control::truncate;
pub use engine::{Engine, StartMode};
pub use snapshot::{InputEvent, LoopPhase, Snapshot, Telemetry};
pub use transport::{Track, TransportState, View, VOLUME_MAX};
