//! Stream content inspection used by the probe transports

pub mod media;

pub use media::{MediaKind, PlaylistAnalysis, analyze_playlist, classify_media};
