//! Playback
//!
//! Two independent transports share one engine seam: [`PlaybackController`]
//! plays generated versions from the artifact store, [`PreviewController`]
//! plays server-hosted background tracks for a fixed window.

pub mod controller;
pub mod headless;
pub mod preview;
pub mod probe;
pub mod ticker;
pub mod transport;

pub use controller::{PlaybackController, PlaybackInbox, PlaybackSession, PositionTick};
pub use headless::HeadlessBackend;
pub use preview::{PreviewController, PreviewInbox, PreviewTimeout};
pub use ticker::{Deadline, Ticker};
pub use transport::{
    transition, AudioBackend, EngineEvent, EngineMessage, EngineNotifier, MediaSource, Sound, SoundId,
    TransportInput,
};
