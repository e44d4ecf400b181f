//! Wire types for the TCP command/event bus.
//!
//! Framing is newline-delimited JSON: one object per line in both
//! directions. Inbound commands use the compact vocabulary of the household
//! remotes (`{"station": 3, "room": "Kitchen"}`); outbound events are tagged
//! objects pushed to every subscriber.

use crate::history::TrackRecord;
use serde::{Deserialize, Serialize};

/// Commands accepted on the bus channel. The two payload shapes are
/// distinguished by their keys: a `station` index selects-and-plays, a `cmd`
/// string drives transport/volume.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum BusCommand {
    Play {
        station: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room: Option<String>,
    },
    Action {
        cmd: BusAction,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        minutes: Option<u64>,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum BusAction {
    Stop,
    Vup,
    Vdown,
    Sleep,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    #[default]
    Stopped,
    Playing,
}

/// Events pushed to bus subscribers. Not request/response: every subscriber
/// sees every event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    Play {
        station: Option<String>,
        station_idx: Option<usize>,
        zone: Option<String>,
        state: RunState,
    },
    Volume {
        zone: String,
        volume: u8,
    },
    /// Now-playing change observed by the monitor.
    Status {
        record: TrackRecord,
    },
    /// Backend identity + current station. Sent to each subscriber on
    /// connect and on lag resync.
    System {
        backend: String,
        station: Option<String>,
        state: RunState,
    },
    /// Auxiliary indicator hardware: illuminate the button for a station
    /// with a color for a bounded duration. Optional sink; subscribers that
    /// drive no hardware just ignore it.
    Indicator {
        station_idx: usize,
        color: String,
        duration_ms: u64,
    },
}

pub fn encode_line<T: Serialize>(value: &T) -> anyhow::Result<String> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    Ok(line)
}

pub fn decode_command(line: &str) -> anyhow::Result<BusCommand> {
    Ok(serde_json::from_str(line.trim())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_station_command() {
        let cmd = decode_command(r#"{"station": 2, "room": "Kitchen"}"#).unwrap();
        assert_eq!(
            cmd,
            BusCommand::Play {
                station: 2,
                room: Some("Kitchen".into())
            }
        );
    }

    #[test]
    fn test_decode_action_commands() {
        let cmd = decode_command(r#"{"cmd": "vup", "room": "Den"}"#).unwrap();
        match cmd {
            BusCommand::Action { cmd, room, minutes } => {
                assert_eq!(cmd, BusAction::Vup);
                assert_eq!(room.as_deref(), Some("Den"));
                assert!(minutes.is_none());
            }
            _ => panic!("wrong command shape"),
        }

        let cmd = decode_command(r#"{"cmd": "sleep", "minutes": 30}"#).unwrap();
        match cmd {
            BusCommand::Action { cmd, minutes, .. } => {
                assert_eq!(cmd, BusAction::Sleep);
                assert_eq!(minutes, Some(30));
            }
            _ => panic!("wrong command shape"),
        }
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_command("not json").is_err());
        assert!(decode_command(r#"{"volume": "loud"}"#).is_err());
    }

    #[test]
    fn test_event_round_trip_line() {
        let event = Event::Volume {
            zone: "Kitchen".into(),
            volume: 35,
        };
        let line = encode_line(&event).unwrap();
        assert!(line.ends_with('\n'));
        let back: Event = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_event_tag_names() {
        let line = encode_line(&Event::System {
            backend: "mpd".into(),
            station: None,
            state: RunState::Stopped,
        })
        .unwrap();
        assert!(line.contains(r#""event":"system""#));
        assert!(line.contains(r#""state":"stopped""#));
    }
}
