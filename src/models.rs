use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;

/// Entity kinds the host can ask the provider to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Track,
    Album,
    Playlist,
    Artist,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Track => "track",
            MediaType::Album => "album",
            MediaType::Playlist => "playlist",
            MediaType::Artist => "artist",
        }
    }

    /// Resource/collection name as the API spells it.
    pub fn plural(&self) -> &'static str {
        match self {
            MediaType::Track => "tracks",
            MediaType::Album => "albums",
            MediaType::Playlist => "playlists",
            MediaType::Artist => "artists",
        }
    }
}

impl FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "track" | "tracks" => Ok(MediaType::Track),
            "album" | "albums" => Ok(MediaType::Album),
            "playlist" | "playlists" => Ok(MediaType::Playlist),
            "artist" | "artists" => Ok(MediaType::Artist),
            other => Err(format!("unknown media type: {}", other)),
        }
    }
}

/// A parsed deep link: entity type plus its opaque id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaIdentification {
    pub media_type: MediaType,
    pub media_id: String,
}

/// Host-requested quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Minimum,
    Low,
    Medium,
    High,
    Lossless,
    HiFi,
}

impl Quality {
    /// Target bitrate in kbps for this tier; `None` means unlimited
    /// (the lossless tiers).
    pub fn target_bitrate(&self) -> Option<u32> {
        match self {
            Quality::Minimum => Some(64),
            Quality::Low => Some(128),
            Quality::Medium => Some(192),
            Quality::High => Some(320),
            Quality::Lossless | Quality::HiFi => None,
        }
    }

    pub fn is_lossless(&self) -> bool {
        matches!(self, Quality::Lossless | Quality::HiFi)
    }
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "minimum" => Ok(Quality::Minimum),
            "low" => Ok(Quality::Low),
            "medium" => Ok(Quality::Medium),
            "high" => Ok(Quality::High),
            "lossless" => Ok(Quality::Lossless),
            "hifi" => Ok(Quality::HiFi),
            other => Err(format!("unknown quality tier: {}", other)),
        }
    }
}

/// Codecs the service is known to serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Codec {
    Mp3,
    Aac,
    HeAac,
    Alac,
    Flac,
    Mqa,
    None,
}

impl Codec {
    /// Map a format name as returned by the API onto the codec enum.
    /// The API spells HE-AAC as "AAC PLUS"; an empty name means no
    /// format matched.
    pub fn from_api_name(name: &str) -> Codec {
        let name = if name == "AAC PLUS" { "HEAAC" } else { name };
        match name {
            "" => Codec::None,
            "MP3" => Codec::Mp3,
            "AAC" => Codec::Aac,
            "HEAAC" => Codec::HeAac,
            "ALAC" => Codec::Alac,
            "FLAC" => Codec::Flac,
            "MQA" => Codec::Mqa,
            _ => Codec::None,
        }
    }
}

/// Caller policy for codec selection.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodecOptions {
    /// Allow proprietary formats (MQA) to be selected.
    pub proprietary_codecs: bool,
}

/// Raw API data already fetched by an earlier call, forwarded so the next
/// call does not refetch it. Absent fields mean "fetch fresh".
#[derive(Debug, Clone, Default)]
pub struct Prefetch {
    /// Raw records keyed by item id.
    pub data: HashMap<String, Value>,
    /// Parent album record for a track.
    pub album: Option<Value>,
    /// Playlist owner's display name.
    pub member_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub result_id: String,
    pub name: String,
    pub artists: Vec<String>,
    pub year: Option<String>,
    pub explicit: Option<bool>,
    #[serde(skip)]
    pub prefetch: Prefetch,
}

/// Metadata tags attached to a track.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Tags {
    pub album_artist: Option<String>,
    pub composer: Option<String>,
    pub track_number: Option<u32>,
    pub total_tracks: Option<u32>,
    pub copyright: Option<String>,
    pub isrc: Option<String>,
    pub upc: Option<String>,
    pub disc_number: Option<u32>,
    pub total_discs: Option<u32>,
    pub genres: Vec<String>,
}

/// Parameters needed to resolve a stream URL for a selected format.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadParams {
    pub bitrate: u32,
    /// Raw format name as the API spells it (pre enum mapping).
    pub codec: String,
    pub track_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackInfo {
    pub name: String,
    pub album: String,
    pub album_id: String,
    pub artists: Vec<String>,
    pub artist_id: String,
    pub codec: Codec,
    pub cover_url: String,
    pub release_year: Option<String>,
    pub explicit: bool,
    pub bit_depth: u32,
    /// kHz for lossy formats, raw API value for lossless.
    pub sample_rate: f64,
    pub bitrate: u32,
    pub download: DownloadParams,
    /// Contributor role -> resolved display name, minus the primary artist.
    pub contributors: HashMap<String, String>,
    /// Non-fatal condition (no bitrate match, not streamable); the rest of
    /// the record stays usable for display.
    pub error: Option<String>,
    pub tags: Tags,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackDownloadInfo {
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlbumInfo {
    pub name: String,
    pub artist: String,
    pub artist_id: Option<String>,
    /// Track ids in server order.
    pub tracks: Vec<String>,
    pub release_year: Option<String>,
    pub explicit: bool,
    pub cover_url: String,
    #[serde(skip)]
    pub track_prefetch: Prefetch,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaylistInfo {
    pub name: String,
    pub creator: String,
    pub creator_id: Option<String>,
    pub tracks: Vec<String>,
    pub release_year: Option<String>,
    pub cover_url: Option<String>,
    #[serde(skip)]
    pub track_prefetch: Prefetch,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtistInfo {
    pub name: String,
    pub albums: Vec<String>,
    #[serde(skip)]
    pub album_prefetch: Prefetch,
}

/// One credited role with its display names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreditsInfo {
    pub role: String,
    pub names: Vec<String>,
}
