use crate::models::FailoverPlaylist;

pub const TXT_HEADER: &str = "# 标准IPTV直播源TXT格式：频道名称,主源URL,备用源URL(可选)";

/// Plain `name,primary,backup...` lines, one per channel with sources
pub fn render_txt(playlist: &FailoverPlaylist) -> String {
    let mut out = String::from(TXT_HEADER);
    out.push('\n');

    for channel in playlist.channels().filter(|c| !c.is_empty()) {
        // Commas separate fields
        out.push_str(&channel.display_name.replace([',', '\r', '\n'], " "));
        for source in &channel.ordered_sources {
            out.push(',');
            out.push_str(&source.url);
        }
        out.push('\n');
    }

    out
}
