//! Reading run inputs and persisting the score snapshot
//!
//! Entries come as a JSON array or as JSON lines, one [`RawSourceEntry`] per
//! line. The path `-` reads from stdin.

use std::path::Path;

use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use crate::errors::AppResult;
use crate::models::{RawSourceEntry, ScoreSnapshot};

/// Parse entries from a JSON array or JSON lines
pub fn parse_entries(contents: &str) -> AppResult<Vec<RawSourceEntry>> {
    let trimmed = contents.trim_start_matches('\u{FEFF}').trim();
    if trimmed.starts_with('[') {
        return Ok(serde_json::from_str(trimmed)?);
    }

    trimmed
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str(line).map_err(Into::into))
        .collect()
}

pub async fn read_entries(path: &Path) -> AppResult<Vec<RawSourceEntry>> {
    let contents = if path == Path::new("-") {
        let mut buffer = String::new();
        tokio::io::stdin().read_to_string(&mut buffer).await?;
        buffer
    } else {
        tokio::fs::read_to_string(path).await?
    };

    let entries = parse_entries(&contents)?;
    info!("Loaded {} entries from {}", entries.len(), path.display());
    Ok(entries)
}

/// Load the previous run's scores; a missing file means no history
pub async fn read_snapshot(path: &Path) -> AppResult<Option<ScoreSnapshot>> {
    if !tokio::fs::try_exists(path).await? {
        debug!("No score snapshot at {}", path.display());
        return Ok(None);
    }
    let contents = tokio::fs::read_to_string(path).await?;
    let snapshot: ScoreSnapshot = serde_json::from_str(&contents)?;
    info!("Loaded {} historical scores from {}", snapshot.len(), path.display());
    Ok(Some(snapshot))
}

pub async fn write_snapshot(path: &Path, snapshot: &ScoreSnapshot) -> AppResult<()> {
    let json = serde_json::to_string_pretty(snapshot)?;
    tokio::fs::write(path, json).await?;
    debug!("Wrote {} scores to {}", snapshot.len(), path.display());
    Ok(())
}
