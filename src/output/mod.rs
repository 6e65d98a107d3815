//! Playlist writers for a finished run
//!
//! Renderers only read the [`FailoverPlaylist`]; channels without any
//! reachable source are skipped because a playlist line needs a URL.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::errors::AppResult;
use crate::models::{FailoverPlaylist, RunOutcome};

pub mod m3u;
pub mod txt;

pub use m3u::render_m3u;
pub use txt::render_txt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum OutputFormat {
    /// The whole `RunOutcome` as pretty JSON
    #[default]
    Json,
    /// Extended M3U with `#EXTBURL` backup lines
    M3u,
    /// `name,primary,backup...` lines
    Txt,
}

/// Render a run outcome in the requested format
pub fn render(outcome: &RunOutcome, format: OutputFormat) -> AppResult<String> {
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(outcome)?,
        OutputFormat::M3u => render_m3u(&outcome.playlist),
        OutputFormat::Txt => render_txt(&outcome.playlist),
    })
}

/// Number of channels a playlist writer will emit
pub fn renderable_channels(playlist: &FailoverPlaylist) -> usize {
    playlist.channels().filter(|c| !c.is_empty()).count()
}
