//! Append-only track history.
//!
//! One tab-separated row per observed distinct track, keyed by observation
//! time. Rows are never rewritten or deleted; the monitor only ever appends
//! and reads the tail back for dedup seeding and the `now-playing` query.
//!
//! Schema:
//!
//!   observed_at  station  artist  title  album  program
//!
//! All fields except observed_at and station may be empty.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TrackRecord {
    pub station: String,
    pub artist: Option<String>,
    pub title: Option<String>,
    pub album: Option<String>,
    /// Show/program name for stations that report no per-track metadata.
    pub program: Option<String>,
    pub observed_at: Option<DateTime<Local>>,
}

impl TrackRecord {
    /// The identity used for change detection: a track "changed" when this
    /// pair differs from the last persisted one. Program-only stations have
    /// no title, so the program name stands in for it there.
    pub fn identity(&self) -> (&str, &str) {
        let title = self
            .title
            .as_deref()
            .filter(|t| !t.is_empty())
            .or(self.program.as_deref())
            .unwrap_or("");
        (self.artist.as_deref().unwrap_or(""), title)
    }

    pub fn display(&self) -> String {
        match (&self.artist, &self.title, &self.program) {
            (Some(a), Some(t), _) => format!("{} \u{2013} {}", a, t),
            (None, Some(t), _) => t.clone(),
            (_, None, Some(p)) => p.clone(),
            _ => "?".to_string(),
        }
    }
}

const HISTORY_HEADER: &str = "observed_at\tstation\tartist\ttitle\talbum\tprogram\n";

pub struct TrackLog {
    path: PathBuf,
}

impl TrackLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record. Creates parent directories and writes the header
    /// row on first use.
    pub async fn append(&self, record: &TrackRecord) -> anyhow::Result<()> {
        let exists = self.path.exists();
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut f = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        use tokio::io::AsyncWriteExt;
        if !exists {
            f.write_all(HISTORY_HEADER.as_bytes()).await?;
        }
        f.write_all(encode_row(record).as_bytes()).await?;
        // tokio::fs::File buffers writes and completes them in the background
        // on drop; flush so the row is on disk when this future resolves.
        f.flush().await?;
        debug!("history: appended {:?} on {}", record.display(), record.station);
        Ok(())
    }

    /// Load the last `limit` rows, oldest first.
    pub fn load_recent(&self, limit: usize) -> Vec<TrackRecord> {
        let Ok(content) = std::fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        let mut lines: Vec<&str> = content.lines().collect();
        if lines.first().map(|l| l.starts_with("observed_at\t")).unwrap_or(false) {
            lines.remove(0);
        }
        let start = lines.len().saturating_sub(limit);
        lines[start..].iter().filter_map(|line| parse_row(line)).collect()
    }

    /// The most recently persisted record, if any. Used to seed the
    /// monitor's dedup state across restarts.
    pub fn last(&self) -> Option<TrackRecord> {
        self.load_recent(1).into_iter().next()
    }
}

fn encode_row(r: &TrackRecord) -> String {
    let ts = r
        .observed_at
        .as_ref()
        .map(|t| t.format("%Y-%m-%dT%H:%M:%S").to_string())
        .unwrap_or_default();
    format!(
        "{}\t{}\t{}\t{}\t{}\t{}\n",
        ts,
        esc(&r.station),
        esc(r.artist.as_deref().unwrap_or("")),
        esc(r.title.as_deref().unwrap_or("")),
        esc(r.album.as_deref().unwrap_or("")),
        esc(r.program.as_deref().unwrap_or("")),
    )
}

fn esc(s: &str) -> String {
    s.replace('\t', " ").replace('\n', " ").replace('\r', "")
}

fn parse_row(line: &str) -> Option<TrackRecord> {
    let cols: Vec<&str> = line.splitn(7, '\t').collect();
    if cols.len() < 2 {
        return None;
    }
    Some(TrackRecord {
        observed_at: parse_ts(cols[0]),
        station: cols[1].trim().to_string(),
        artist: cols.get(2).and_then(|s| nn(s)),
        title: cols.get(3).and_then(|s| nn(s)),
        album: cols.get(4).and_then(|s| nn(s)),
        program: cols.get(5).and_then(|s| nn(s)),
    })
}

fn parse_ts(s: &str) -> Option<DateTime<Local>> {
    chrono::NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%dT%H:%M:%S")
        .ok()
        .and_then(|dt| dt.and_local_timezone(Local).earliest())
}

fn nn(s: &str) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}
