//! Just-in-time stream resolution.
//!
//! Streaming-service page URLs expire minutes after extraction, so the
//! direct media URL is pulled with yt-dlp immediately before playback rather
//! than at catalog load time.

use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tunehub_core::config::ResolverConfig;
use tunehub_core::error::{ControlError, ControlResult};
use tunehub_core::platform;

/// Whether this catalog URL needs extraction before it can be streamed.
pub fn needs_resolution(url: &str) -> bool {
    url.contains("youtube.com/") || url.contains("youtu.be/")
}

/// Extract a short-lived direct stream URL. Bounded by the configured
/// timeout; any failure (missing binary, extractor error, timeout) is
/// `StreamResolutionFailed` and the caller aborts the play unchanged.
pub async fn resolve_stream_url(config: &ResolverConfig, url: &str) -> ControlResult<String> {
    let binary = find_binary(config)
        .ok_or_else(|| ControlError::StreamResolutionFailed("yt-dlp not found".into()))?;

    info!("resolver: extracting stream url for {}", url);
    let run = tokio::process::Command::new(&binary)
        .args(["-g", "-f", "bestaudio/best", url])
        .output();

    let output = tokio::time::timeout(Duration::from_secs(config.timeout_secs), run)
        .await
        .map_err(|_| {
            ControlError::StreamResolutionFailed(format!(
                "extraction timed out after {}s",
                config.timeout_secs
            ))
        })?
        .map_err(|e| ControlError::StreamResolutionFailed(e.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ControlError::StreamResolutionFailed(
            stderr.trim().to_string(),
        ));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout
        .lines()
        .map(str::trim)
        .find(|l| l.starts_with("http"))
        .map(str::to_string)
        .ok_or_else(|| ControlError::StreamResolutionFailed("extractor produced no URL".into()))
}

fn find_binary(config: &ResolverConfig) -> Option<PathBuf> {
    match &config.ytdlp_binary {
        Some(path) => path.is_file().then(|| path.clone()),
        None => platform::find_ytdlp_binary(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_resolution() {
        assert!(needs_resolution("https://www.youtube.com/watch?v=abc123"));
        assert!(needs_resolution("https://youtu.be/abc123"));
        assert!(!needs_resolution("https://ice6.somafm.com/fluid-128-mp3"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_resolution_failure() {
        let config = ResolverConfig {
            ytdlp_binary: Some(PathBuf::from("/nonexistent/yt-dlp")),
            timeout_secs: 1,
        };
        let err = resolve_stream_url(&config, "https://youtu.be/abc123")
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::StreamResolutionFailed(_)));
    }
}
