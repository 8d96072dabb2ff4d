//! Plex XML parsing
//!
//! Streaming-safe parsing of the Plex media containers. Per-item metadata
//! is distilled into a [`MediaInfo`] holding exactly the fields the
//! capability record needs. Multiple `<Media>` variants per item are
//! resolved by taking the first in document order; within it, the first
//! valid `<Part>` and the first matching `<Stream>` per field.

use felarr_core::{CapabilityRecord, FelarrError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

const SERVICE: &str = "plex";

/// Raw extraction result for one `<Video>` element.
#[derive(Debug, Clone, Default)]
pub struct MediaInfo {
    pub rating_key: String,
    pub title: String,
    pub year: Option<i32>,
    pub dv_profile: Option<String>,
    pub dv_fel: bool,
    pub has_atmos: bool,
    pub file_size: Option<i64>,
    /// First video stream bitrate in kbps, as reported.
    pub video_bitrate_kbps: Option<i64>,
    pub audio_details: Vec<String>,
    /// Normalised resolution label ("2160p") from the media row.
    pub resolution: Option<String>,
}

impl MediaInfo {
    /// Convert to the store's capability record. FEL only survives on
    /// Profile 7 by construction of the record.
    pub fn into_record(self) -> CapabilityRecord {
        let video_bitrate = self
            .video_bitrate_kbps
            .map(|kbps| ((kbps as f64 / 1000.0) * 10.0).round() / 10.0);

        let audio_tracks = if self.audio_details.is_empty() {
            None
        } else {
            Some(self.audio_details.join(", "))
        };

        let mut record = CapabilityRecord::new(self.rating_key, self.title)
            .with_dolby_vision(self.dv_profile, self.dv_fel);
        record.year = self.year;
        record.has_atmos = self.has_atmos;
        record.file_size = self.file_size;
        record.video_bitrate = video_bitrate;
        record.audio_tracks = audio_tracks;
        record.extra = serde_json::json!({
            "resolution": self.resolution,
            "year": self.year,
            "video_bitrate_kbps": self.video_bitrate_kbps,
        });
        record
    }
}

/// One page of a media container listing.
#[derive(Debug, Clone, Default)]
pub struct ContainerPage {
    pub items: Vec<crate::client::PlexItem>,
    pub total_size: Option<usize>,
}

fn attr(element: &BytesStart<'_>, name: &str) -> Option<String> {
    element.attributes().flatten().find_map(|a| {
        if a.key.as_ref() == name.as_bytes() {
            a.unescape_value().ok().map(|v| v.into_owned())
        } else {
            None
        }
    })
}

fn malformed(err: impl std::fmt::Display) -> FelarrError {
    FelarrError::malformed(SERVICE, err)
}

/// `machineIdentifier` from the server root container.
pub fn parse_machine_identifier(body: &str) -> Option<String> {
    let mut reader = Reader::from_str(body);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e))
                if e.name().as_ref() == b"MediaContainer" =>
            {
                return attr(&e, "machineIdentifier");
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
    }
}

/// `(key, title)` of every `<Directory>` in a container. Collections carry
/// a `ratingKey`, which is preferred over the path-shaped `key`.
pub fn parse_directories(body: &str) -> Result<Vec<(String, String)>> {
    let mut reader = Reader::from_str(body);
    let mut out = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.name().as_ref() == b"Directory" => {
                let key = attr(&e, "ratingKey").or_else(|| attr(&e, "key"));
                let title = attr(&e, "title");
                if let (Some(key), Some(title)) = (key, title) {
                    out.push((key, title));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(malformed(e)),
            _ => {}
        }
    }
    Ok(out)
}

/// `<Video>` references of a listing page plus the container total.
pub fn parse_container_items(body: &str) -> Result<ContainerPage> {
    let mut reader = Reader::from_str(body);
    let mut page = ContainerPage::default();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"MediaContainer" => {
                    page.total_size = attr(&e, "totalSize").and_then(|v| v.parse().ok());
                }
                b"Video" => {
                    let rating_key = attr(&e, "ratingKey");
                    let title = attr(&e, "title");
                    if let (Some(rating_key), Some(title)) = (rating_key, title) {
                        page.items.push(crate::client::PlexItem {
                            rating_key,
                            title,
                            year: attr(&e, "year").and_then(|v| v.parse().ok()),
                        });
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(malformed(e)),
            _ => {}
        }
    }
    Ok(page)
}

/// Parse a per-item metadata document into one [`MediaInfo`] per `<Video>`.
pub fn parse_metadata(body: &str) -> Result<Vec<MediaInfo>> {
    let mut reader = Reader::from_str(body);
    let mut items = Vec::new();
    let mut current: Option<MediaInfo> = None;
    // 1-based index of the <Media> being read inside the current video;
    // only the first one contributes parts and streams.
    let mut media_index = 0usize;
    let mut in_first_media = false;

    loop {
        let event = reader.read_event().map_err(malformed)?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let self_closing = matches!(&event, Event::Empty(_));
                match e.name().as_ref() {
                    b"Video" => {
                        media_index = 0;
                        in_first_media = false;
                        let info = read_video_attrs(e);
                        if self_closing {
                            if let Some(info) = info {
                                items.push(info);
                            }
                        } else {
                            current = info;
                        }
                    }
                    b"Media" if current.is_some() => {
                        media_index += 1;
                        if media_index == 1 {
                            if !self_closing {
                                in_first_media = true;
                            }
                            if let (Some(info), Some(raw)) =
                                (current.as_mut(), attr(e, "videoResolution"))
                            {
                                info.resolution = normalize_video_resolution(&raw);
                            }
                        }
                    }
                    b"Part" if in_first_media => {
                        if let Some(info) = current.as_mut() {
                            read_part(info, e);
                        }
                    }
                    b"Stream" if in_first_media => {
                        if let Some(info) = current.as_mut() {
                            read_stream(info, e);
                        }
                    }
                    b"Release" => {
                        if let Some(info) = current.as_mut() {
                            if info.year.is_none() {
                                info.year = attr(e, "year").and_then(|v| v.parse().ok());
                            }
                        }
                    }
                    _ => {}
                }
            }
            Event::End(ref e) => match e.name().as_ref() {
                b"Video" => {
                    if let Some(info) = current.take() {
                        items.push(info);
                    }
                }
                b"Media" => {
                    in_first_media = false;
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(items)
}

fn read_video_attrs(e: &BytesStart<'_>) -> Option<MediaInfo> {
    let rating_key = attr(e, "ratingKey")?;
    let title = attr(e, "title")?;

    let year = attr(e, "year")
        .and_then(|v| v.parse().ok())
        .or_else(|| {
            attr(e, "originallyAvailableAt")
                .and_then(|date| date.split('-').next().and_then(|y| y.parse().ok()))
        });

    Some(MediaInfo {
        rating_key,
        title,
        year,
        ..MediaInfo::default()
    })
}

fn read_part(info: &mut MediaInfo, e: &BytesStart<'_>) {
    if info.file_size.is_none() {
        if let Some(size) = attr(e, "size").and_then(|v| v.parse::<i64>().ok()) {
            if size > 0 {
                info.file_size = Some(size);
            }
        }
    }
}

fn read_stream(info: &mut MediaInfo, e: &BytesStart<'_>) {
    match attr(e, "streamType").as_deref() {
        Some("1") => read_video_stream(info, e),
        Some("2") => read_audio_stream(info, e),
        _ => {}
    }
}

fn read_video_stream(info: &mut MediaInfo, e: &BytesStart<'_>) {
    if info.video_bitrate_kbps.is_none() {
        info.video_bitrate_kbps = attr(e, "bitrate").and_then(|v| v.parse().ok());
    }

    if info.dv_profile.is_none() {
        info.dv_profile = attr(e, "DOVIProfile");
    }

    // Canonical FEL test: Profile 7 with both layers flagged present.
    // Filename heuristics are deliberately not consulted.
    if !info.dv_fel
        && attr(e, "DOVIProfile").as_deref() == Some("7")
        && attr(e, "DOVIBLPresent").as_deref() == Some("1")
        && attr(e, "DOVIELPresent").as_deref() == Some("1")
    {
        info.dv_fel = true;
    }
}

fn read_audio_stream(info: &mut MediaInfo, e: &BytesStart<'_>) {
    let codec = attr(e, "codec").unwrap_or_default();
    let title = attr(e, "title").unwrap_or_default().to_lowercase();
    let channels = attr(e, "channels").unwrap_or_default();

    let is_truehd = codec.eq_ignore_ascii_case("truehd");

    if is_truehd && !info.has_atmos {
        let atmos_attrs = [
            attr(e, "title"),
            attr(e, "displayTitle"),
            attr(e, "extendedDisplayTitle"),
            attr(e, "audioChannelLayout"),
        ];
        info.has_atmos = atmos_attrs
            .iter()
            .flatten()
            .any(|value| value.to_lowercase().contains("atmos"));
    }

    let codec_upper = codec.to_uppercase();
    let format_tag = if is_truehd && title.contains("atmos") {
        "Atmos"
    } else if codec_upper == "DCA" && title.contains("ma") {
        "DTS-HD MA"
    } else if codec_upper == "AC3" && !channels.is_empty() {
        info.audio_details.push(format!("AC3 {}.1", channels));
        return;
    } else {
        ""
    };

    info.audio_details
        .push(format!("{} {}", codec_upper, format_tag).trim().to_string());
}

fn normalize_video_resolution(raw: &str) -> Option<String> {
    let label = match raw.to_ascii_lowercase().as_str() {
        "4k" | "2160" | "2160p" => "2160p",
        "1080" | "1080p" => "1080p",
        "720" | "720p" => "720p",
        "576" | "576p" | "480" | "480p" | "sd" => "480p",
        _ => return Some(raw.to_ascii_lowercase()),
    };
    Some(label.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const P7_FEL_ATMOS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<MediaContainer size="1">
  <Video ratingKey="101" title="Dune" year="2021">
    <Media videoResolution="4k" bitrate="62000">
      <Part size="72881203456">
        <Stream streamType="1" codec="hevc" bitrate="58000"
                DOVIProfile="7" DOVIBLPresent="1" DOVIELPresent="1"/>
        <Stream streamType="2" codec="truehd" channels="8"
                title="TrueHD Atmos 7.1" displayTitle="TrueHD 7.1 (Atmos)"/>
        <Stream streamType="2" codec="ac3" channels="6" title="Surround"/>
      </Part>
    </Media>
    <Media videoResolution="1080">
      <Part size="12000000000">
        <Stream streamType="1" codec="h264" bitrate="12000"/>
      </Part>
    </Media>
  </Video>
</MediaContainer>"#;

    #[test]
    fn extracts_p7_fel_and_atmos() {
        let items = parse_metadata(P7_FEL_ATMOS).unwrap();
        assert_eq!(items.len(), 1);
        let info = &items[0];
        assert_eq!(info.rating_key, "101");
        assert_eq!(info.title, "Dune");
        assert_eq!(info.year, Some(2021));
        assert_eq!(info.dv_profile.as_deref(), Some("7"));
        assert!(info.dv_fel);
        assert!(info.has_atmos);
        assert_eq!(info.file_size, Some(72_881_203_456));
        // first media wins over the 1080p variant
        assert_eq!(info.video_bitrate_kbps, Some(58_000));
        assert_eq!(info.resolution.as_deref(), Some("2160p"));
    }

    #[test]
    fn record_conversion_rounds_bitrate() {
        let record = parse_metadata(P7_FEL_ATMOS)
            .unwrap()
            .remove(0)
            .into_record();
        assert_eq!(record.video_bitrate, Some(58.0));
        assert!(record.is_p7_fel());
        assert_eq!(record.resolution(), Some("2160p"));
        assert!(record
            .audio_tracks
            .as_deref()
            .unwrap()
            .contains("TRUEHD Atmos"));
    }

    #[test]
    fn single_layer_profile_7_is_not_fel() {
        let xml = r#"<MediaContainer>
          <Video ratingKey="5" title="Movie" year="2020">
            <Media videoResolution="4k"><Part size="100">
              <Stream streamType="1" DOVIProfile="7" DOVIBLPresent="1" bitrate="40000"/>
            </Part></Media>
          </Video>
        </MediaContainer>"#;
        let info = &parse_metadata(xml).unwrap()[0];
        assert_eq!(info.dv_profile.as_deref(), Some("7"));
        assert!(!info.dv_fel);
    }

    #[test]
    fn missing_dovi_profile_means_no_dv() {
        let xml = r#"<MediaContainer>
          <Video ratingKey="6" title="Movie" year="2020">
            <Media videoResolution="1080"><Part size="100">
              <Stream streamType="1" codec="h264" bitrate="9000"/>
              <Stream streamType="2" codec="aac" channels="2"/>
            </Part></Media>
          </Video>
        </MediaContainer>"#;
        let info = &parse_metadata(xml).unwrap()[0];
        assert_eq!(info.dv_profile, None);
        assert!(!info.dv_fel);
        assert!(!info.has_atmos);

        let record = parse_metadata(xml).unwrap().remove(0).into_record();
        assert!(!record.dv_fel);
        assert_eq!(record.dv_profile, None);
    }

    #[test]
    fn atmos_requires_truehd_codec() {
        let xml = r#"<MediaContainer>
          <Video ratingKey="7" title="Movie" year="2020">
            <Media videoResolution="4k"><Part size="100">
              <Stream streamType="2" codec="eac3" title="Dolby Digital+ Atmos"/>
            </Part></Media>
          </Video>
        </MediaContainer>"#;
        let info = &parse_metadata(xml).unwrap()[0];
        assert!(!info.has_atmos);
    }

    #[test]
    fn atmos_found_in_channel_layout() {
        let xml = r#"<MediaContainer>
          <Video ratingKey="8" title="Movie" year="2020">
            <Media videoResolution="4k"><Part size="100">
              <Stream streamType="2" codec="truehd" audioChannelLayout="7.1 (Atmos)"/>
            </Part></Media>
          </Video>
        </MediaContainer>"#;
        assert!(parse_metadata(xml).unwrap()[0].has_atmos);
    }

    #[test]
    fn year_falls_back_to_release_then_date() {
        let xml = r#"<MediaContainer>
          <Video ratingKey="9" title="Movie">
            <Release year="1988"/>
          </Video>
        </MediaContainer>"#;
        assert_eq!(parse_metadata(xml).unwrap()[0].year, Some(1988));

        let xml = r#"<MediaContainer>
          <Video ratingKey="9" title="Movie" originallyAvailableAt="1977-05-25"/>
        </MediaContainer>"#;
        assert_eq!(parse_metadata(xml).unwrap()[0].year, Some(1977));
    }

    #[test]
    fn zero_sized_parts_are_skipped() {
        let xml = r#"<MediaContainer>
          <Video ratingKey="10" title="Movie" year="2020">
            <Media videoResolution="1080">
              <Part size="0"/>
              <Part size="4096"/>
            </Media>
          </Video>
        </MediaContainer>"#;
        assert_eq!(parse_metadata(xml).unwrap()[0].file_size, Some(4096));
    }

    #[test]
    fn machine_identifier_parses() {
        let xml = r#"<MediaContainer machineIdentifier="abc123" version="1.40"/>"#;
        assert_eq!(parse_machine_identifier(xml).as_deref(), Some("abc123"));
    }

    #[test]
    fn directories_prefer_rating_key() {
        let xml = r#"<MediaContainer>
          <Directory ratingKey="77" key="/library/collections/77/children" title="All DV"/>
          <Directory key="2" title="Movies"/>
        </MediaContainer>"#;
        let dirs = parse_directories(xml).unwrap();
        assert_eq!(dirs[0], ("77".to_string(), "All DV".to_string()));
        assert_eq!(dirs[1], ("2".to_string(), "Movies".to_string()));
    }
}
