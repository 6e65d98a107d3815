use crate::models::FailoverPlaylist;

/// Attribute values cannot contain double quotes
fn attribute(value: &str) -> String {
    value.replace('"', "'")
}

/// Extended M3U: one `#EXTINF` per channel, the primary source as the stream
/// line and every fallback as an `#EXTBURL:` line
pub fn render_m3u(playlist: &FailoverPlaylist) -> String {
    let mut out = String::from("#EXTM3U\n");

    for group in &playlist.groups {
        for channel in &group.channels {
            let Some((primary, fallbacks)) = channel.ordered_sources.split_first() else {
                continue;
            };

            out.push_str(&format!(
                "#EXTINF:-1 tvg-name=\"{}\" group-title=\"{}\",{}\n",
                attribute(&channel.display_name),
                attribute(&group.category),
                channel.display_name.replace(['\r', '\n'], " ")
            ));
            out.push_str(&primary.url);
            out.push('\n');
            for backup in fallbacks {
                out.push_str("#EXTBURL:");
                out.push_str(&backup.url);
                out.push('\n');
            }
        }
    }

    out
}
