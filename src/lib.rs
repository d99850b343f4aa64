// Turns periodic now-playing samples into Last.fm and ListenBrainz
// now-playing updates and scrobbles

pub mod config;
pub mod orchestrator;
pub mod playback;
pub mod policy;
pub mod scrobbler;
pub mod text_cleanup;

pub use orchestrator::Orchestrator;
pub use playback::{PlaybackSample, TrackIdentity};
