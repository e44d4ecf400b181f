use crate::error::{ControlError, ControlResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Station {
    pub name: String,
    pub url: String,
}

/// Reference to a station, either by name or by its position in the
/// catalog's declaration order.
#[derive(Debug, Clone, PartialEq)]
pub enum StationRef {
    Name(String),
    Index(usize),
}

impl StationRef {
    /// Gateway inputs arrive as strings; a string of digits is treated as an
    /// index, anything else as a name.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<usize>() {
            Ok(idx) => Self::Index(idx),
            Err(_) => Self::Name(raw.trim().to_string()),
        }
    }
}

/// Name → URL catalog with a stable declaration-order index used for numeric
/// selection and next/previous cycling.
#[derive(Debug, Clone, Default)]
pub struct StationCatalog {
    stations: Vec<Station>,
}

impl StationCatalog {
    pub fn new(stations: Vec<Station>) -> Self {
        Self { stations }
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    /// Replace the full station set. Callers only reach this with a
    /// fully-parsed list, so a failed fetch never leaves a partial catalog.
    pub fn replace(&mut self, stations: Vec<Station>) {
        info!("catalog: replaced with {} stations", stations.len());
        self.stations = stations;
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.stations.iter().position(|s| s.name == name)
    }

    pub fn resolve(&self, station: &StationRef) -> ControlResult<(usize, Station)> {
        match station {
            StationRef::Index(idx) => self
                .stations
                .get(*idx)
                .cloned()
                .map(|s| (*idx, s))
                .ok_or_else(|| ControlError::UnknownStation(format!("#{idx}"))),
            StationRef::Name(name) => self
                .index_of(name)
                .map(|idx| (idx, self.stations[idx].clone()))
                .ok_or_else(|| ControlError::UnknownStation(name.clone())),
        }
    }

    /// The station after `current`, wrapping circularly. When `current` is
    /// not in the catalog the cycle restarts at index 0.
    pub fn next(&self, current: &str) -> Option<(usize, Station)> {
        if self.stations.is_empty() {
            return None;
        }
        let idx = match self.index_of(current) {
            Some(i) => (i + 1) % self.stations.len(),
            None => 0,
        };
        Some((idx, self.stations[idx].clone()))
    }

    /// The station before `current`, wrapping circularly. When `current` is
    /// not in the catalog the cycle restarts at the last index.
    pub fn previous(&self, current: &str) -> Option<(usize, Station)> {
        if self.stations.is_empty() {
            return None;
        }
        let last = self.stations.len() - 1;
        let idx = match self.index_of(current) {
            Some(0) => last,
            Some(i) => i - 1,
            None => last,
        };
        Some((idx, self.stations[idx].clone()))
    }
}

/// Parse the spreadsheet TSV export. The first line is a column header and is
/// discarded. Each remaining row is `name \t url [\t notes…]`; rows without
/// two non-empty fields contribute nothing.
pub fn parse_station_tsv(body: &str) -> Vec<Station> {
    let mut stations = Vec::new();
    for line in body.lines().skip(1) {
        let mut fields = line.split('\t');
        let name = fields.next().map(str::trim).unwrap_or("");
        let url = fields.next().map(str::trim).unwrap_or("");
        if name.is_empty() || url.is_empty() {
            debug!("catalog: skipping malformed row: {:?}", line);
            continue;
        }
        stations.push(Station {
            name: name.to_string(),
            url: url.to_string(),
        });
    }
    stations
}

/// Fetch the authoritative station list. Any transport failure or non-success
/// status aborts the reload without touching the existing catalog.
pub async fn fetch_station_tsv(url: &str, timeout: Duration) -> ControlResult<Vec<Station>> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ControlError::UpstreamFetch(e.to_string()))?;

    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| ControlError::UpstreamFetch(e.to_string()))?;

    if !resp.status().is_success() {
        return Err(ControlError::UpstreamFetch(format!(
            "station list returned {}",
            resp.status()
        )));
    }

    let body = resp
        .text()
        .await
        .map_err(|e| ControlError::UpstreamFetch(e.to_string()))?;

    Ok(parse_station_tsv(&body))
}
