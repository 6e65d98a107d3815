/*!
 * Media response classification
 * =============================
 *
 * Decides whether the first bytes of a probe response look like a live media
 * stream, without downloading the stream itself.
 *
 * Recognized:
 *   - HLS playlists (`#EXTM3U`): master playlists with at least one
 *     `#EXT-X-STREAM-INF` variant, or media playlists with at least one segment.
 *     An `#EXTM3U` body with neither is an empty channel list, not a stream.
 *   - MPEG-TS (0x47 sync byte, checked again one packet later when available).
 *   - FLV (`FLV` signature) and MP4/fMP4 (`ftyp` box).
 *   - Any `video/...` or `audio/...` content type the bytes did not contradict.
 *
 * Advertised bitrate comes from the highest `BANDWIDTH=` of a master playlist.
 */

use std::sync::LazyLock;

use regex::Regex;

/// Maximum bytes read from a playlist body
pub const MAX_PLAYLIST_BYTES: usize = 256 * 1024;

const TS_PACKET_SIZE: usize = 188;
const TS_SYNC_BYTE: u8 = 0x47;

static BANDWIDTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[:,])BANDWIDTH=(\d+)").expect("static bandwidth regex")
});

/// What kind of media a probe response carried
#[derive(Debug, Clone, PartialEq)]
pub enum MediaKind {
    HlsMaster {
        variant_count: usize,
        /// Highest advertised variant bandwidth, bits per second
        max_bandwidth_bps: Option<u64>,
    },
    HlsMedia {
        segment_count: usize,
        target_duration: Option<f32>,
    },
    MpegTs,
    Flv,
    Mp4,
    /// Accepted on content type alone
    Declared { content_type: String },
}

impl MediaKind {
    /// Advertised bitrate in kbps, when the container states one
    pub fn advertised_kbps(&self) -> Option<f64> {
        match self {
            MediaKind::HlsMaster {
                max_bandwidth_bps: Some(bps),
                ..
            } => Some(*bps as f64 / 1000.0),
            _ => None,
        }
    }

    /// Continuous byte streams whose throughput can be sampled
    pub fn is_continuous(&self) -> bool {
        matches!(
            self,
            MediaKind::MpegTs | MediaKind::Flv | MediaKind::Declared { .. }
        )
    }
}

/// Summary of an HLS playlist body
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PlaylistAnalysis {
    pub saw_extm3u: bool,
    pub is_master: bool,
    pub is_media: bool,
    pub variant_count: usize,
    pub segment_count: usize,
    pub target_duration: Option<f32>,
    pub max_bandwidth_bps: Option<u64>,
}

/// Whether a content type announces an HLS playlist
pub fn is_playlist_content_type(content_type: &str) -> bool {
    let ct = content_type.to_ascii_lowercase();
    ct.contains("mpegurl")
}

/// Whether the body starts like an HLS playlist
pub fn looks_like_playlist(head: &[u8]) -> bool {
    let head = head.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(head);
    let start = head
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(head.len());
    head[start..].starts_with(b"#EXTM3U")
}

pub fn analyze_playlist(text: &str) -> PlaylistAnalysis {
    let mut a = PlaylistAnalysis::default();

    for raw_line in text.lines() {
        let line = raw_line.trim().trim_start_matches('\u{FEFF}');
        if line.is_empty() {
            continue;
        }
        if line.starts_with("#EXTM3U") {
            a.saw_extm3u = true;
            continue;
        }
        if let Some(attrs) = line.strip_prefix("#EXT-X-STREAM-INF") {
            a.is_master = true;
            a.variant_count += 1;
            if let Some(bps) = BANDWIDTH
                .captures(attrs)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<u64>().ok())
            {
                a.max_bandwidth_bps = Some(a.max_bandwidth_bps.map_or(bps, |cur| cur.max(bps)));
            }
            continue;
        }
        if let Some(value) = line.strip_prefix("#EXT-X-TARGETDURATION:") {
            a.target_duration = value.trim().parse::<f32>().ok();
            continue;
        }
        if line.starts_with('#') {
            continue;
        }
        // URI line: a segment in a media playlist, a variant URI in a master
        if !a.is_master {
            a.is_media = true;
            a.segment_count += 1;
        }
    }

    a
}

/// Classify a response from its content type and leading bytes.
///
/// For playlists `head` should hold the whole (bounded) body.
pub fn classify_media(content_type: Option<&str>, head: &[u8]) -> Option<MediaKind> {
    let playlist_type = content_type.is_some_and(is_playlist_content_type);
    if looks_like_playlist(head) || playlist_type {
        let text = String::from_utf8_lossy(head);
        let analysis = analyze_playlist(&text);
        if analysis.is_master && analysis.variant_count > 0 {
            return Some(MediaKind::HlsMaster {
                variant_count: analysis.variant_count,
                max_bandwidth_bps: analysis.max_bandwidth_bps,
            });
        }
        if analysis.is_media && analysis.saw_extm3u {
            return Some(MediaKind::HlsMedia {
                segment_count: analysis.segment_count,
                target_duration: analysis.target_duration,
            });
        }
        return None;
    }

    if head.first() == Some(&TS_SYNC_BYTE)
        && (head.len() <= TS_PACKET_SIZE || head[TS_PACKET_SIZE] == TS_SYNC_BYTE)
    {
        return Some(MediaKind::MpegTs);
    }
    if head.starts_with(b"FLV") {
        return Some(MediaKind::Flv);
    }
    if head.len() >= 8 && &head[4..8] == b"ftyp" {
        return Some(MediaKind::Mp4);
    }

    let ct = content_type?.to_ascii_lowercase();
    if ct.starts_with("video/") || ct.starts_with("audio/") {
        return Some(MediaKind::Declared { content_type: ct });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASTER: &str = "#EXTM3U
#EXT-X-STREAM-INF:PROGRAM-ID=1,AVERAGE-BANDWIDTH=900000,BANDWIDTH=1280000,RESOLUTION=1280x720
720p.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=2560000,RESOLUTION=1920x1080
1080p.m3u8
";

    const MEDIA: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:6
#EXT-X-MEDIA-SEQUENCE:100
#EXTINF:6.0,
seg100.ts
#EXTINF:6.0,
seg101.ts
";

    #[test]
    fn test_master_playlist_bandwidth() {
        let kind = classify_media(Some("application/vnd.apple.mpegurl"), MASTER.as_bytes()).unwrap();
        assert_eq!(
            kind,
            MediaKind::HlsMaster {
                variant_count: 2,
                max_bandwidth_bps: Some(2_560_000)
            }
        );
        assert_eq!(kind.advertised_kbps(), Some(2560.0));
        assert!(!kind.is_continuous());
    }

    #[test]
    fn test_media_playlist() {
        let kind = classify_media(Some("text/plain"), MEDIA.as_bytes()).unwrap();
        assert_eq!(
            kind,
            MediaKind::HlsMedia {
                segment_count: 2,
                target_duration: Some(6.0)
            }
        );
    }

    #[test]
    fn test_empty_playlist_is_not_media() {
        assert_eq!(classify_media(Some("application/x-mpegurl"), b"#EXTM3U\n"), None);
        assert_eq!(classify_media(Some("application/x-mpegurl"), b"<html>gone</html>"), None);
    }

    #[test]
    fn test_binary_signatures() {
        let mut ts = vec![0u8; 376];
        ts[0] = 0x47;
        ts[188] = 0x47;
        assert_eq!(classify_media(Some("application/octet-stream"), &ts), Some(MediaKind::MpegTs));

        ts[188] = 0x00;
        assert_eq!(classify_media(None, &ts), None);

        assert_eq!(classify_media(None, b"FLV\x01\x05"), Some(MediaKind::Flv));
        assert_eq!(
            classify_media(None, b"\x00\x00\x00\x18ftypisom"),
            Some(MediaKind::Mp4)
        );
    }

    #[test]
    fn test_declared_content_type_and_html() {
        assert_eq!(
            classify_media(Some("video/MP2T"), b"\x00\x01"),
            Some(MediaKind::Declared {
                content_type: "video/mp2t".into()
            })
        );
        assert_eq!(classify_media(Some("text/html; charset=utf-8"), b"<!doctype html>"), None);
    }

    #[test]
    fn test_playlist_with_bom_and_leading_whitespace() {
        let body = format!("\u{FEFF}\n  {MEDIA}");
        assert!(looks_like_playlist(body.as_bytes()));
    }
}
