use std::path::PathBuf;

/// TCP port for the line-JSON command/event bus.
pub const BUS_TCP_PORT: u16 = 9007;

pub fn data_dir() -> PathBuf {
    // Use ~/.local/share/tunehub/ (XDG standard) on all unixes, including
    // macOS, so logs and the track history live in one predictable place.
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local")
            .join("share")
            .join("tunehub")
    }
    #[cfg(windows)]
    {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tunehub")
    }
}

pub fn config_dir() -> PathBuf {
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("tunehub")
    }
    #[cfg(windows)]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tunehub")
    }
}

#[cfg(unix)]
fn ytdlp_binary_names() -> &'static [&'static str] {
    &["yt-dlp", "youtube-dl"]
}

#[cfg(windows)]
fn ytdlp_binary_names() -> &'static [&'static str] {
    &["yt-dlp.exe", "youtube-dl.exe"]
}

/// Locate the stream-URL extractor on PATH. `yt-dlp` preferred, with the
/// legacy `youtube-dl` name as a fallback.
pub fn find_ytdlp_binary() -> Option<PathBuf> {
    for name in ytdlp_binary_names() {
        if let Some(path) = find_in_path(name) {
            return Some(path);
        }
    }
    None
}

#[cfg(unix)]
pub fn mpc_binary_name() -> &'static str {
    "mpc"
}

#[cfg(windows)]
pub fn mpc_binary_name() -> &'static str {
    "mpc.exe"
}

pub fn find_mpc_binary() -> Option<PathBuf> {
    find_in_path(mpc_binary_name())
}

fn find_in_path(binary: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(binary);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}
