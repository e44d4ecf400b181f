//! Classification of the media daemon's now-playing status line.
//!
//! The daemon reports a single free-text line whose shape depends on the
//! station's provider. Classification is an ordered list of
//! `(predicate, extractor)` rules checked first-match; provider-specific
//! rules always run before the generic fallback, so the order of `RULES` is
//! load-bearing.

use tracing::warn;
use tunehub_core::history::TrackRecord;

#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutcome {
    /// Artist/title parsed directly from the status text.
    Track { artist: String, title: String },
    /// Station only reports a show/program name, no per-track data.
    Program(String),
    /// Authoritative data must be substituted from an external metadata API.
    Remote(Provider),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Provider {
    /// NTS live API channel: 0 for NTS 1, 1 for NTS 2.
    Nts { channel: usize },
}

struct Rule {
    name: &'static str,
    matches: fn(&str) -> bool,
    extract: fn(&str) -> RuleOutcome,
}

// Checked in order; first match wins. The fallback is appended implicitly by
// `classify`, never listed here.
const RULES: &[Rule] = &[
    Rule {
        name: "somafm",
        matches: |line| line.trim_start().starts_with("SomaFM"),
        extract: extract_somafm,
    },
    Rule {
        name: "nts",
        matches: |line| line.trim_start().starts_with("NTS"),
        extract: extract_nts,
    },
    Rule {
        name: "radio-paradise",
        matches: |line| line.trim_start().starts_with("Radio Paradise"),
        extract: extract_radio_paradise,
    },
];

pub fn classify(line: &str) -> RuleOutcome {
    for rule in RULES {
        if (rule.matches)(line) {
            tracing::debug!("rules: '{}' matched {}", line, rule.name);
            return (rule.extract)(line);
        }
    }
    extract_fallback(line)
}

/// "SomaFM presents: Artist - Title" — strip the station prefix up to the
/// colon, then split on the dash marker: left artist, right title.
fn extract_somafm(line: &str) -> RuleOutcome {
    let body = line.split_once(':').map(|(_, rest)| rest).unwrap_or(line);
    match body.split_once(" - ") {
        Some((artist, title)) => RuleOutcome::Track {
            artist: artist.trim().to_string(),
            title: title.trim().to_string(),
        },
        None => RuleOutcome::Program(body.trim().to_string()),
    }
}

/// NTS reports only a stream slug locally; the live API is authoritative.
fn extract_nts(line: &str) -> RuleOutcome {
    let channel = if line.contains('2') { 1 } else { 0 };
    RuleOutcome::Remote(Provider::Nts { channel })
}

/// Radio Paradise exposes the current show name after the colon, nothing
/// track-level.
fn extract_radio_paradise(line: &str) -> RuleOutcome {
    let body = line.split_once(':').map(|(_, rest)| rest).unwrap_or(line);
    RuleOutcome::Program(body.trim().to_string())
}

/// Generic rule: "Station: Artist - Title". Split once on the colon to drop
/// the station part, then once on the dash. A line with neither separator is
/// treated as a bare title.
fn extract_fallback(line: &str) -> RuleOutcome {
    let body = line.split_once(':').map(|(_, rest)| rest).unwrap_or(line);
    match body.split_once(" - ") {
        Some((artist, title)) => RuleOutcome::Track {
            artist: artist.trim().to_string(),
            title: title.trim().to_string(),
        },
        None => {
            let t = body.trim();
            RuleOutcome::Track {
                artist: String::new(),
                title: t.to_string(),
            }
        }
    }
}

/// Query the NTS live API for the current broadcast on `channel`. Returns a
/// program-only record; any failure yields None and the caller treats the
/// tick as "no new information".
pub async fn fetch_nts_live(channel: usize, station: &str) -> Option<TrackRecord> {
    let url = "https://www.nts.live/api/v2/live";
    let resp = reqwest::Client::new()
        .get(url)
        .timeout(std::time::Duration::from_secs(5))
        .send()
        .await
        .map_err(|e| warn!("nts: request error: {}", e))
        .ok()?;
    let json: serde_json::Value = resp
        .json()
        .await
        .map_err(|e| warn!("nts: JSON error: {}", e))
        .ok()?;

    let now = &json["results"][channel]["now"];
    let show = now["broadcast_title"]
        .as_str()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())?;

    Some(TrackRecord {
        station: station.to_string(),
        program: Some(show),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_somafm_rule_splits_artist_title() {
        let out = classify("SomaFM Fluid: Bonobo - Kerala");
        assert_eq!(
            out,
            RuleOutcome::Track {
                artist: "Bonobo".into(),
                title: "Kerala".into()
            }
        );
    }

    #[test]
    fn test_nts_rule_beats_fallback() {
        // Would parse fine under the generic colon/dash rule, but the NTS
        // rule is earlier in the list and must win.
        assert_eq!(
            classify("NTS 1: live - now"),
            RuleOutcome::Remote(Provider::Nts { channel: 0 })
        );
        assert_eq!(
            classify("NTS 2"),
            RuleOutcome::Remote(Provider::Nts { channel: 1 })
        );
    }

    #[test]
    fn test_radio_paradise_is_program_only() {
        assert_eq!(
            classify("Radio Paradise: Mellow Mix"),
            RuleOutcome::Program("Mellow Mix".into())
        );
    }

    #[test]
    fn test_fallback_colon_then_dash() {
        assert_eq!(
            classify("KEXP 90.3: Khruangbin - Maria Tambien"),
            RuleOutcome::Track {
                artist: "Khruangbin".into(),
                title: "Maria Tambien".into()
            }
        );
    }

    #[test]
    fn test_fallback_without_separators_is_bare_title() {
        assert_eq!(
            classify("Late Night Broadcast"),
            RuleOutcome::Track {
                artist: String::new(),
                title: "Late Night Broadcast".into()
            }
        );
    }

    #[test]
    fn test_somafm_without_dash_degrades_to_program() {
        assert_eq!(
            classify("SomaFM Drone Zone: station id"),
            RuleOutcome::Program("station id".into())
        );
    }
}
