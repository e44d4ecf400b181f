//! Multi-zone speaker backend.
//!
//! Each operation targets one named zone; zones are the speakers discovered
//! by probing the configured device addresses for their description
//! documents. The SOAP plumbing is deliberately minimal — just enough
//! envelope to drive AVTransport and RenderingControl.

use crate::backend::{Backend, Zone};
use crate::resolver;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};
use tunehub_core::error::{ControlError, ControlResult};
use tunehub_core::history::TrackRecord;

const SONOS_PORT: u16 = 1400;
const AVTRANSPORT: &str = "urn:schemas-upnp-org:service:AVTransport:1";
const RENDERING: &str = "urn:schemas-upnp-org:service:RenderingControl:1";

pub struct SonosBackend {
    client: Client,
    /// Device addresses probed during discovery.
    devices: Vec<String>,
}

impl SonosBackend {
    pub fn new(devices: Vec<String>) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self { client, devices })
    }

    async fn soap(
        &self,
        zone: &Zone,
        control_url: &str,
        service: &str,
        action: &str,
        args: &str,
    ) -> ControlResult<String> {
        let url = format!("http://{}:{}{}", zone.address, SONOS_PORT, control_url);
        let body = format!(
            r#"<?xml version="1.0" encoding="utf-8"?><s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/"><s:Body><u:{action} xmlns:u="{service}"><InstanceID>0</InstanceID>{args}</u:{action}></s:Body></s:Envelope>"#
        );
        debug!("sonos: {} -> {}", action, url);

        let resp = self
            .client
            .post(&url)
            .header("Content-Type", "text/xml; charset=\"utf-8\"")
            .header("SOAPAction", format!("\"{service}#{action}\""))
            .body(body)
            .send()
            .await
            .map_err(|e| ControlError::BackendUnavailable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ControlError::BackendUnavailable(format!(
                "{} returned {}",
                action,
                resp.status()
            )));
        }

        resp.text()
            .await
            .map_err(|e| ControlError::BackendUnavailable(e.to_string()))
    }

    async fn av_transport(&self, zone: &Zone, action: &str, args: &str) -> ControlResult<String> {
        self.soap(
            zone,
            "/MediaRenderer/AVTransport/Control",
            AVTRANSPORT,
            action,
            args,
        )
        .await
    }

    async fn rendering(&self, zone: &Zone, action: &str, args: &str) -> ControlResult<String> {
        self.soap(
            zone,
            "/MediaRenderer/RenderingControl/Control",
            RENDERING,
            action,
            args,
        )
        .await
    }

    /// Read the room name from a device's description document.
    async fn probe_device(&self, address: &str) -> Option<Zone> {
        let url = format!("http://{}:{}/xml/device_description.xml", address, SONOS_PORT);
        let resp = self.client.get(&url).send().await.ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let body = resp.text().await.ok()?;
        let name = extract_tag(&body, "roomName")?;
        Some(Zone {
            name,
            address: address.to_string(),
        })
    }
}

#[async_trait]
impl Backend for SonosBackend {
    fn name(&self) -> &'static str {
        "sonos"
    }

    fn supports_transient_streams(&self) -> bool {
        // The radio-URI mechanism cannot carry expiring extracted streams.
        false
    }

    fn has_native_sleep(&self) -> bool {
        true
    }

    async fn list_zones(&self) -> ControlResult<Vec<Zone>> {
        let mut zones = Vec::new();
        for address in &self.devices {
            match self.probe_device(address).await {
                Some(zone) => {
                    debug!("sonos: discovered {} at {}", zone.name, zone.address);
                    zones.push(zone);
                }
                None => warn!("sonos: no response from {}", address),
            }
        }
        if zones.is_empty() {
            return Err(ControlError::BackendUnavailable(
                "no speakers answered discovery".into(),
            ));
        }
        Ok(zones)
    }

    async fn play(&self, zone: &Zone, stream_url: &str, title: &str) -> ControlResult<()> {
        if resolver::needs_resolution(stream_url) {
            return Err(ControlError::UnsupportedStream(stream_url.to_string()));
        }
        let uri = radio_uri(stream_url);
        let meta = didl_metadata(title);
        let args = format!(
            "<CurrentURI>{}</CurrentURI><CurrentURIMetaData>{}</CurrentURIMetaData>",
            escape_xml(&uri),
            escape_xml(&meta)
        );
        self.av_transport(zone, "SetAVTransportURI", &args).await?;
        self.av_transport(zone, "Play", "<Speed>1</Speed>").await?;
        Ok(())
    }

    async fn stop(&self, zone: &Zone) -> ControlResult<()> {
        self.av_transport(zone, "Stop", "").await?;
        Ok(())
    }

    async fn set_volume(&self, zone: &Zone, percent: u8) -> ControlResult<()> {
        let args = format!(
            "<Channel>Master</Channel><DesiredVolume>{}</DesiredVolume>",
            percent.min(100)
        );
        self.rendering(zone, "SetVolume", &args).await?;
        Ok(())
    }

    async fn get_volume(&self, zone: &Zone) -> ControlResult<u8> {
        let body = self
            .rendering(zone, "GetVolume", "<Channel>Master</Channel>")
            .await?;
        extract_tag(&body, "CurrentVolume")
            .and_then(|v| v.trim().parse::<u8>().ok())
            .ok_or_else(|| ControlError::BackendUnavailable("no volume in reply".into()))
    }

    async fn set_sleep_timer(&self, zone: &Zone, seconds: u64) -> ControlResult<()> {
        // Empty duration clears the timer.
        let duration = if seconds == 0 {
            String::new()
        } else {
            format!(
                "{:02}:{:02}:{:02}",
                seconds / 3600,
                (seconds / 60) % 60,
                seconds % 60
            )
        };
        let args = format!("<NewSleepTimerDuration>{duration}</NewSleepTimerDuration>");
        self.av_transport(zone, "ConfigureSleepTimer", &args).await?;
        Ok(())
    }

    async fn now_playing(&self, zone: &Zone) -> ControlResult<TrackRecord> {
        let body = self
            .av_transport(zone, "GetPositionInfo", "<Track>0</Track>")
            .await?;
        let meta = extract_tag(&body, "TrackMetaData")
            .map(|m| unescape_xml(&m))
            .unwrap_or_default();
        Ok(TrackRecord {
            station: String::new(),
            artist: extract_tag(&meta, "dc:creator"),
            title: extract_tag(&meta, "dc:title"),
            album: extract_tag(&meta, "upnp:album"),
            program: None,
            observed_at: None,
        })
    }
}

/// The radio scheme the zones accept for plain internet streams.
fn radio_uri(url: &str) -> String {
    let stripped = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    format!("x-rincon-mp3radio://{stripped}")
}

fn didl_metadata(title: &str) -> String {
    format!(
        r#"<DIDL-Lite xmlns="urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:upnp="urn:schemas-upnp-org:metadata-1-0/upnp/"><item id="R:0/0/0" parentID="R:0/0" restricted="true"><dc:title>{}</dc:title><upnp:class>object.item.audioItem.audioBroadcast</upnp:class></item></DIDL-Lite>"#,
        escape_xml(title)
    )
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn unescape_xml(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Pull the text content of the first `<tag>…</tag>` pair. The replies are
/// small, flat documents; a full XML parser buys nothing here.
fn extract_tag(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)? + start;
    let value = xml[start..end].trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radio_uri_strips_scheme() {
        assert_eq!(
            radio_uri("https://ice6.somafm.com/fluid-128-mp3"),
            "x-rincon-mp3radio://ice6.somafm.com/fluid-128-mp3"
        );
        assert_eq!(
            radio_uri("ice6.somafm.com/raw"),
            "x-rincon-mp3radio://ice6.somafm.com/raw"
        );
    }

    #[test]
    fn test_extract_tag() {
        let xml = "<root><roomName>Kitchen</roomName><other>x</other></root>";
        assert_eq!(extract_tag(xml, "roomName").as_deref(), Some("Kitchen"));
        assert!(extract_tag(xml, "missing").is_none());
        assert!(extract_tag("<roomName></roomName>", "roomName").is_none());
    }

    #[test]
    fn test_position_info_metadata_parse() {
        let meta = escape_xml(
            r#"<DIDL-Lite><item><dc:title>Kerala</dc:title><dc:creator>Bonobo</dc:creator><upnp:album>Migration</upnp:album></item></DIDL-Lite>"#,
        );
        let body = format!("<TrackMetaData>{meta}</TrackMetaData>");
        let unescaped = unescape_xml(&extract_tag(&body, "TrackMetaData").unwrap());
        assert_eq!(extract_tag(&unescaped, "dc:title").as_deref(), Some("Kerala"));
        assert_eq!(extract_tag(&unescaped, "dc:creator").as_deref(), Some("Bonobo"));
        assert_eq!(extract_tag(&unescaped, "upnp:album").as_deref(), Some("Migration"));
    }

    #[test]
    fn test_sleep_duration_format() {
        // 90 minutes -> 01:30:00
        let seconds = 90 * 60u64;
        let rendered = format!(
            "{:02}:{:02}:{:02}",
            seconds / 3600,
            (seconds / 60) % 60,
            seconds % 60
        );
        assert_eq!(rendered, "01:30:00");
    }
}
