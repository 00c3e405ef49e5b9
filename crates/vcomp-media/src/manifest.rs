//! Master playlist generation.

use std::path::Path;

use vcomp_models::encoding::TIER_PLAYLIST_FILE;
use vcomp_models::QualityLadder;

use crate::error::MediaResult;

/// Render the multi-rendition master playlist.
///
/// Lines are joined with `\n` without a trailing newline; tiers appear in
/// ladder order.
pub fn render_master_playlist(ladder: &QualityLadder) -> String {
    let mut lines = vec!["#EXTM3U".to_string(), "#EXT-X-VERSION:3".to_string()];

    for profile in ladder.iter() {
        lines.push(format!(
            "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}",
            profile.bandwidth,
            profile.resolution()
        ));
        lines.push(format!("{}/{}", profile.tier, TIER_PLAYLIST_FILE));
    }

    lines.join("\n")
}

/// Render and write the master playlist.
pub async fn write_master_playlist(path: impl AsRef<Path>, ladder: &QualityLadder) -> MediaResult<()> {
    tokio::fs::write(path, render_master_playlist(ladder)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DEFAULT_MASTER: &str = "#EXTM3U\n\
#EXT-X-VERSION:3\n\
#EXT-X-STREAM-INF:BANDWIDTH=5000000,RESOLUTION=1920x1080\n\
high/playlist.m3u8\n\
#EXT-X-STREAM-INF:BANDWIDTH=2500000,RESOLUTION=854x480\n\
medium/playlist.m3u8\n\
#EXT-X-STREAM-INF:BANDWIDTH=1000000,RESOLUTION=640x360\n\
low/playlist.m3u8";

    #[test]
    fn test_default_master_playlist_is_exact() {
        assert_eq!(render_master_playlist(&QualityLadder::default()), DEFAULT_MASTER);
    }

    #[tokio::test]
    async fn test_write_master_playlist() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("master.m3u8");
        write_master_playlist(&path, &QualityLadder::default())
            .await
            .unwrap();
        let written = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(written, DEFAULT_MASTER);
    }
}
