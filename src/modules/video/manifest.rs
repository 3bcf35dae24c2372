use super::ladder::Rendition;
use std::fmt::Write;

pub const MASTER_PLAYLIST: &str = "master.m3u8";

/// Builds the master playlist that lets players pick a rendition by bandwidth.
/// Variant URIs are relative to the master's own directory.
pub fn master_playlist(renditions: &[Rendition]) -> String {
    let mut out = String::from("#EXTM3U\n#EXT-X-VERSION:3\n");
    for r in renditions {
        // Writing into a String cannot fail.
        let _ = writeln!(
            out,
            "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}",
            r.peak_bandwidth(),
            r.resolution()
        );
        let _ = writeln!(out, "{}", r.playlist_name());
    }
    out
}
