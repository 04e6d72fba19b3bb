use super::client::NapsterApi;
use super::Provider;
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::models::{
    AlbumInfo, ArtistInfo, Codec, CodecOptions, CreditsInfo, DownloadParams, MediaIdentification,
    MediaType, PlaylistInfo, Prefetch, Quality, SearchResult, Tags, TrackDownloadInfo, TrackInfo,
};
use crate::store::{self, keys, SessionStore};
use crate::util;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

const DEFAULT_PAGE: u32 = 50;
const TRACK_PAGE: u32 = 200;

const PATH_KEYWORDS: [&str; 4] = ["track", "album", "artist", "playlist"];

/// Napster provider adapter: maps host calls onto the REST client and
/// assembles the host's normalized metadata records.
///
/// One instance per logical session, used sequentially. The artist-name and
/// genre-name caches grow for the lifetime of the instance and are dropped
/// with it.
pub struct NapsterProvider {
    api: NapsterApi,
    store: Arc<dyn SessionStore>,
    artist_names: Mutex<HashMap<String, String>>,
    genre_names: Mutex<HashMap<String, String>>,
}

impl NapsterProvider {
    /// Build an adapter over the stored session. If the stored expiry is in
    /// the past the access token is refreshed (and persisted) once, here;
    /// otherwise the stored token and catalog region are loaded directly.
    pub async fn connect(settings: &Settings, store: Arc<dyn SessionStore>) -> Result<Self> {
        let api = NapsterApi::new(
            settings.api_key.clone(),
            settings.customer_secret.clone(),
            settings.api_base.clone(),
        );
        let provider = Self {
            api,
            store,
            artist_names: Mutex::new(HashMap::new()),
            genre_names: Mutex::new(HashMap::new()),
        };
        provider.restore_session().await?;
        Ok(provider)
    }

    async fn restore_session(&self) -> Result<()> {
        let store = self.store.as_ref();
        let catalog = store.read(keys::CATALOG_REGION);
        match store::read_i64(store, keys::EXPIRY_TIME) {
            Some(expiry) if Utc::now().timestamp() >= expiry => {
                debug!("stored session expired, refreshing access token");
                let refresh_token = store.read(keys::REFRESH_TOKEN).ok_or_else(|| {
                    Error::Auth("session expired and no refresh token stored".into())
                })?;
                let (access_token, expiry_time) = self
                    .api
                    .refresh_login(&refresh_token, Utc::now().timestamp())
                    .await?;
                self.store.write(keys::ACCESS_TOKEN, &access_token)?;
                self.store
                    .write(keys::EXPIRY_TIME, &expiry_time.to_string())?;
                self.api.set_session(access_token, catalog).await;
            }
            _ => {
                if let Some(access_token) = store.read(keys::ACCESS_TOKEN) {
                    self.api.set_session(access_token, catalog).await;
                }
            }
        }
        Ok(())
    }

    /// Fetch the single record for `id`, or fail with an api error.
    async fn fetch_one(&self, item_type: &str, id: &str) -> Result<Value> {
        let ids = [id.to_string()];
        self.api
            .get_items_list(item_type, &ids, None, None, DEFAULT_PAGE)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Api(format!("no {} record for {}", item_type, id)))
    }

    /// Resolve ids to display names through a grow-only cache. All uncached
    /// ids are fetched in one batched call; previously resolved ids never
    /// trigger a request again.
    async fn cached_names(
        &self,
        cache: &Mutex<HashMap<String, String>>,
        item_type: &str,
        ids: &[String],
    ) -> Result<HashMap<String, String>> {
        let missing: Vec<String> = {
            let cache = cache.lock().await;
            ids.iter()
                .filter(|id| !cache.contains_key(*id))
                .cloned()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        };
        if !missing.is_empty() {
            let fetched = self
                .api
                .get_string_from_items_list(item_type, &missing, "name", None, None, DEFAULT_PAGE)
                .await?;
            cache.lock().await.extend(fetched);
        }
        let cache = cache.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| cache.get(id).map(|name| (id.clone(), name.clone())))
            .collect())
    }

    fn cover_url(&self, album_id: &str) -> String {
        format!(
            "{}/imageserver/v2/albums/{}/images/600x600.jpg",
            self.api.base_url(),
            album_id
        )
    }
}

/// Outcome of bitrate/codec selection for one track.
struct FormatSelection {
    bitrate: u32,
    codec_name: String,
    bit_depth: u32,
    sample_rate: f64,
    no_match: bool,
}

/// Pick the stream format for a track given the requested tier and the
/// account limits. Lossless tiers without the hi-res entitlement downgrade
/// to high; lossy targets clamp to the account's max bitrate and the best
/// format at or under the clamp wins. MQA is skipped unless proprietary
/// codecs are allowed.
fn select_stream_format(
    track: &Value,
    quality: Quality,
    codecs: CodecOptions,
    max_bitrate: u32,
    hires_enabled: bool,
) -> FormatSelection {
    let tier = if quality.is_lossless() && !hires_enabled {
        Quality::High
    } else {
        quality
    };

    match tier.target_bitrate() {
        None => {
            let format = &track["losslessFormats"][0];
            match format["bitrate"].as_u64() {
                Some(bitrate) => FormatSelection {
                    bitrate: bitrate as u32,
                    codec_name: format["name"].as_str().unwrap_or("").to_string(),
                    bit_depth: format["sampleBits"].as_u64().unwrap_or(16) as u32,
                    sample_rate: format["sampleRate"].as_f64().unwrap_or(44.1),
                    no_match: false,
                },
                None => FormatSelection {
                    bitrate: 0,
                    codec_name: String::new(),
                    bit_depth: 16,
                    sample_rate: 44.1,
                    no_match: true,
                },
            }
        }
        Some(target) => {
            let target = target.min(max_bitrate);
            let mut selected = FormatSelection {
                bitrate: 0,
                codec_name: String::new(),
                bit_depth: 16,
                sample_rate: 44.1,
                no_match: false,
            };
            if let Some(formats) = track["formats"].as_array() {
                for format in formats {
                    let name = format["name"].as_str().unwrap_or("");
                    if name == "MQA" && !codecs.proprietary_codecs {
                        continue;
                    }
                    let bitrate = format["bitrate"].as_u64().unwrap_or(0) as u32;
                    if bitrate <= target && bitrate > selected.bitrate {
                        selected.bitrate = bitrate;
                        selected.codec_name = name.to_string();
                        selected.bit_depth = format["sampleBits"].as_u64().unwrap_or(16) as u32;
                        selected.sample_rate =
                            format["sampleRate"].as_f64().unwrap_or(44_100.0) / 1000.0;
                    }
                }
            }
            if selected.bitrate == 0 {
                selected.no_match = true;
            }
            selected
        }
    }
}

fn string_field(value: &Value, key: &str) -> String {
    value[key].as_str().unwrap_or("").to_string()
}

fn u32_field(value: &Value, key: &str) -> Option<u32> {
    value[key].as_u64().map(|n| n as u32)
}

fn opt_string_field(value: &Value, key: &str) -> Option<String> {
    value[key].as_str().map(|s| s.to_string())
}

#[async_trait]
impl Provider for NapsterProvider {
    fn name(&self) -> &str {
        "napster"
    }

    fn is_authenticated(&self) -> bool {
        self.store.read(keys::ACCESS_TOKEN).is_some()
    }

    async fn login(&self, username: &str, password: &str) -> Result<()> {
        let creds = self
            .api
            .login(username, password, Utc::now().timestamp())
            .await?;
        self.store.write(keys::ACCESS_TOKEN, &creds.access_token)?;
        self.store.write(keys::REFRESH_TOKEN, &creds.refresh_token)?;
        self.store
            .write(keys::EXPIRY_TIME, &creds.expiry_time.to_string())?;
        self.store
            .write(keys::CATALOG_REGION, &creds.catalog_region)?;
        self.store
            .write(keys::MAX_BITRATE, &creds.max_bitrate.to_string())?;
        self.store
            .write(keys::HIRES_ENABLED, &creds.hires_enabled.to_string())?;
        info!("logged in; catalog region {}", creds.catalog_region);
        Ok(())
    }

    /// Parse a deep link. Query form: an `id` parameter whose dotted prefix
    /// (`alb.`, `tra.`, `pp.`/`mp.`, `art.`) selects the type and the
    /// remainder is the id. Path form: a literal `track`/`album`/`artist`/
    /// `playlist` segment selects the type and the remaining non-keyword
    /// segments, joined by `/`, form the id.
    fn parse_url(&self, raw: &str) -> Result<MediaIdentification> {
        let parsed = Url::parse(raw).map_err(|_| Error::InvalidUrl(raw.to_string()))?;

        if let Some(query) = parsed.query() {
            let query = query.to_ascii_lowercase();
            let pairs: HashMap<&str, &str> =
                query.split('&').filter_map(|kv| kv.split_once('=')).collect();
            if let Some(id) = pairs.get("id") {
                let (prefix, rest) = id
                    .split_once('.')
                    .ok_or_else(|| Error::InvalidUrl(raw.to_string()))?;
                let media_type = match prefix {
                    "alb" => MediaType::Album,
                    "tra" => MediaType::Track,
                    "pp" | "mp" => MediaType::Playlist,
                    "art" => MediaType::Artist,
                    _ => return Err(Error::InvalidUrl(raw.to_string())),
                };
                return Ok(MediaIdentification {
                    media_type,
                    media_id: rest.to_string(),
                });
            }
        }

        let segments: Vec<&str> = parsed.path().split('/').collect();
        let media_type = if segments.contains(&"track") {
            MediaType::Track
        } else if segments.contains(&"album") {
            MediaType::Album
        } else if segments.contains(&"artist") {
            MediaType::Artist
        } else if segments.contains(&"playlist") {
            MediaType::Playlist
        } else {
            return Err(Error::InvalidUrl(raw.to_string()));
        };

        let media_id = segments
            .iter()
            .filter(|s| !s.is_empty() && !PATH_KEYWORDS.contains(s))
            .copied()
            .collect::<Vec<_>>()
            .join("/");

        Ok(MediaIdentification {
            media_type,
            media_id,
        })
    }

    /// Search the catalog. A track hint carrying an ISRC is tried as an
    /// exact lookup first; free-text search is the fallback. Track results
    /// are bundled with their parent albums and playlist results with the
    /// owning member's display name so later calls need not refetch.
    async fn search(
        &self,
        media: MediaType,
        query: &str,
        hint: Option<&TrackInfo>,
        limit: u32,
    ) -> Result<Vec<SearchResult>> {
        let mut results = Vec::new();
        if let Some(isrc) = hint.and_then(|t| t.tags.isrc.as_ref()) {
            let ids = [isrc.clone()];
            results = self
                .api
                .get_items_list("tracks/isrc", &ids, None, Some("tracks"), DEFAULT_PAGE)
                .await?;
        }
        if results.is_empty() {
            results = self.api.search(media.as_str(), query, limit, 0).await?;
        }

        match media {
            MediaType::Track => {
                let album_ids: Vec<String> = results
                    .iter()
                    .filter_map(|t| opt_string_field(t, "albumId"))
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect();
                let albums = self
                    .api
                    .get_items_dict("albums", &album_ids, None, None, DEFAULT_PAGE)
                    .await?;
                Ok(results
                    .into_iter()
                    .map(|item| {
                        let album = item["albumId"].as_str().and_then(|id| albums.get(id));
                        let year = album
                            .and_then(|a| a["released"].as_str())
                            .and_then(util::release_year);
                        let id = string_field(&item, "id");
                        SearchResult {
                            result_id: id.clone(),
                            name: string_field(&item, "name"),
                            artists: vec![string_field(&item, "artistName")],
                            year,
                            explicit: item["isExplicit"].as_bool(),
                            prefetch: Prefetch {
                                data: HashMap::from([(id, item.clone())]),
                                album: album.cloned(),
                                member_name: None,
                            },
                        }
                    })
                    .collect())
            }
            MediaType::Playlist => {
                let member_ids: Vec<String> = results
                    .iter()
                    .filter_map(|p| first_member_id(p))
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect();
                let members = self
                    .api
                    .get_string_from_items_list(
                        "members",
                        &member_ids,
                        "screenName",
                        None,
                        None,
                        DEFAULT_PAGE,
                    )
                    .await?;
                Ok(results
                    .into_iter()
                    .map(|item| {
                        let member = first_member_id(&item)
                            .and_then(|id| members.get(&id).cloned());
                        let year = item["modified"]
                            .as_str()
                            .and_then(util::release_year);
                        let id = string_field(&item, "id");
                        SearchResult {
                            result_id: id.clone(),
                            name: string_field(&item, "name"),
                            artists: member.iter().cloned().collect(),
                            year,
                            explicit: item["isExplicit"].as_bool(),
                            prefetch: Prefetch {
                                data: HashMap::from([(id, item.clone())]),
                                album: None,
                                member_name: member,
                            },
                        }
                    })
                    .collect())
            }
            MediaType::Album => Ok(results
                .into_iter()
                .map(|item| {
                    let year = item["released"].as_str().and_then(util::release_year);
                    let id = string_field(&item, "id");
                    SearchResult {
                        result_id: id.clone(),
                        name: string_field(&item, "name"),
                        artists: vec![string_field(&item, "artistName")],
                        year,
                        explicit: item["isExplicit"].as_bool(),
                        prefetch: Prefetch {
                            data: HashMap::from([(id, item.clone())]),
                            album: None,
                            member_name: None,
                        },
                    }
                })
                .collect()),
            MediaType::Artist => Ok(results
                .into_iter()
                .map(|item| {
                    let id = string_field(&item, "id");
                    SearchResult {
                        result_id: id.clone(),
                        name: string_field(&item, "name"),
                        artists: Vec::new(),
                        year: None,
                        explicit: item["isExplicit"].as_bool(),
                        prefetch: Prefetch {
                            data: HashMap::from([(id, item.clone())]),
                            album: None,
                            member_name: None,
                        },
                    }
                })
                .collect()),
        }
    }

    async fn track_info(
        &self,
        track_id: &str,
        quality: Quality,
        codecs: CodecOptions,
        prefetch: Option<&Prefetch>,
    ) -> Result<TrackInfo> {
        let track_data = match prefetch.and_then(|p| p.data.get(track_id)) {
            Some(track) => track.clone(),
            None => self.fetch_one("tracks", track_id).await?,
        };
        let album_id = string_field(&track_data, "albumId");
        let album_data = match prefetch.and_then(|p| p.album.clone()) {
            Some(album) => album,
            None => self.fetch_one("albums", &album_id).await?,
        };

        // Not-streamable wins over any later selection error.
        let mut error = if track_data["isStreamable"].as_bool().unwrap_or(false) {
            None
        } else {
            Some("Track is not streamable".to_string())
        };

        let max_bitrate =
            store::read_u32(self.store.as_ref(), keys::MAX_BITRATE).unwrap_or(u32::MAX);
        let hires_enabled =
            store::read_bool(self.store.as_ref(), keys::HIRES_ENABLED).unwrap_or(false);
        let selection =
            select_stream_format(&track_data, quality, codecs, max_bitrate, hires_enabled);
        if selection.no_match && error.is_none() {
            error = Some("No suitable bitrate found".to_string());
        }

        let contributor_roles: HashMap<String, String> = track_data["contributors"]
            .as_object()
            .map(|roles| {
                roles
                    .iter()
                    .filter_map(|(role, id)| id.as_str().map(|id| (role.clone(), id.to_string())))
                    .collect()
            })
            .unwrap_or_default();
        let contributor_ids: Vec<String> = contributor_roles.values().cloned().collect();
        let names = self
            .cached_names(&self.artist_names, "artists", &contributor_ids)
            .await?;
        let mut contributors: HashMap<String, String> = contributor_roles
            .iter()
            .filter_map(|(role, id)| names.get(id).map(|name| (role.clone(), name.clone())))
            .collect();
        contributors.remove("primaryArtist");

        let mut artists = vec![string_field(&track_data, "artistName")];
        if let Some(non_primary) = contributors.get("nonPrimary") {
            if !artists.contains(non_primary) {
                artists.push(non_primary.clone());
            }
        }
        contributors.remove("nonPrimary");

        let genre_ids: Vec<String> = track_data["links"]["genres"]["ids"]
            .as_array()
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| id.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default();
        let genre_names = self
            .cached_names(&self.genre_names, "genres", &genre_ids)
            .await?;
        let genres: Vec<String> = genre_ids
            .iter()
            .filter_map(|id| genre_names.get(id).cloned())
            .collect();

        Ok(TrackInfo {
            name: string_field(&track_data, "name"),
            album: string_field(&track_data, "albumName"),
            album_id: album_id.clone(),
            artists,
            artist_id: string_field(&track_data, "artistId"),
            codec: Codec::from_api_name(&selection.codec_name),
            cover_url: self.cover_url(&album_id),
            release_year: album_data["released"]
                .as_str()
                .and_then(util::release_year),
            explicit: track_data["isExplicit"].as_bool().unwrap_or(false),
            bit_depth: selection.bit_depth,
            sample_rate: selection.sample_rate,
            bitrate: selection.bitrate,
            download: DownloadParams {
                bitrate: selection.bitrate,
                codec: selection.codec_name,
                track_id: string_field(&track_data, "id"),
            },
            contributors,
            error,
            tags: Tags {
                album_artist: opt_string_field(&album_data, "artistName"),
                composer: names_for_role(&contributor_roles, &names, "composer"),
                track_number: u32_field(&track_data, "index"),
                total_tracks: u32_field(&album_data, "trackCount"),
                copyright: opt_string_field(&album_data, "copyright"),
                isrc: opt_string_field(&track_data, "isrc"),
                upc: opt_string_field(&album_data, "upc"),
                disc_number: u32_field(&track_data, "disc"),
                total_discs: u32_field(&album_data, "discCount"),
                genres,
            },
        })
    }

    async fn track_download(&self, download: &DownloadParams) -> Result<TrackDownloadInfo> {
        let url = self
            .api
            .get_stream_url(download.bitrate, &download.codec, &download.track_id)
            .await?;
        Ok(TrackDownloadInfo { url })
    }

    async fn album_info(&self, album_id: &str, prefetch: Option<&Prefetch>) -> Result<AlbumInfo> {
        let album_data = match prefetch.and_then(|p| p.data.get(album_id)) {
            Some(album) => album.clone(),
            None => self.fetch_one("albums", album_id).await?,
        };
        let id = string_field(&album_data, "id");

        let ids = [id.clone()];
        let track_items = self
            .api
            .get_items_list("albums", &ids, Some("tracks"), Some("tracks"), TRACK_PAGE)
            .await?;
        let tracks: Vec<String> = track_items
            .iter()
            .filter_map(|t| opt_string_field(t, "id"))
            .collect();
        let mut data = HashMap::with_capacity(track_items.len());
        for track in track_items {
            if let Some(track_id) = track["id"].as_str() {
                data.insert(track_id.to_string(), track);
            }
        }

        Ok(AlbumInfo {
            name: string_field(&album_data, "name"),
            artist: string_field(&album_data, "artistName"),
            artist_id: album_data["contributingArtists"]["primaryArtist"]
                .as_str()
                .map(|s| s.to_string()),
            tracks,
            release_year: album_data["released"]
                .as_str()
                .and_then(util::release_year),
            explicit: album_data["isExplicit"].as_bool().unwrap_or(false),
            cover_url: self.cover_url(&id),
            track_prefetch: Prefetch {
                data,
                album: Some(album_data),
                member_name: None,
            },
        })
    }

    async fn playlist_info(
        &self,
        playlist_id: &str,
        prefetch: Option<&Prefetch>,
    ) -> Result<PlaylistInfo> {
        let playlist_data = match prefetch.and_then(|p| p.data.get(playlist_id)) {
            Some(playlist) => playlist.clone(),
            None => self.fetch_one("playlists", playlist_id).await?,
        };
        let id = string_field(&playlist_data, "id");
        let creator_id = first_member_id(&playlist_data);

        let creator = match prefetch.and_then(|p| p.member_name.clone()) {
            Some(name) => name,
            None => match &creator_id {
                Some(member_id) => string_field(
                    &self.fetch_one("members", member_id).await?,
                    "screenName",
                ),
                None => String::new(),
            },
        };

        let ids = [id.clone()];
        let track_items = self
            .api
            .get_items_list("playlists", &ids, Some("tracks"), Some("tracks"), TRACK_PAGE)
            .await?;
        let tracks: Vec<String> = track_items
            .iter()
            .filter_map(|t| opt_string_field(t, "id"))
            .collect();
        let mut data = HashMap::with_capacity(track_items.len());
        for track in track_items {
            if let Some(track_id) = track["id"].as_str() {
                data.insert(track_id.to_string(), track);
            }
        }

        let has_images = playlist_data["images"]
            .as_array()
            .map(|images| !images.is_empty())
            .unwrap_or(false);
        let cover_url = has_images.then(|| {
            format!(
                "{}/imageserver/v2/playlists/{}/artists/images/1800x600.jpg",
                self.api.base_url(),
                id
            )
        });

        Ok(PlaylistInfo {
            name: string_field(&playlist_data, "name"),
            creator,
            creator_id,
            tracks,
            release_year: playlist_data["modified"]
                .as_str()
                .and_then(util::release_year),
            cover_url,
            track_prefetch: Prefetch {
                data,
                album: None,
                member_name: None,
            },
        })
    }

    /// Search results omit album groups, so the artist record is always
    /// fetched fresh here.
    async fn artist_info(&self, artist_id: &str) -> Result<ArtistInfo> {
        let artist_data = self.fetch_one("artists", artist_id).await?;

        let groups = &artist_data["albumGroups"];
        let mut albums: Vec<String> = Vec::new();
        for group in ["main", "singlesAndEPs"] {
            if let Some(ids) = groups[group].as_array() {
                albums.extend(ids.iter().filter_map(|id| id.as_str().map(|s| s.to_string())));
            }
        }

        let album_data = self
            .api
            .get_items_dict("albums", &albums, None, None, DEFAULT_PAGE)
            .await?;

        Ok(ArtistInfo {
            name: string_field(&artist_data, "name"),
            albums,
            album_prefetch: Prefetch {
                data: album_data,
                album: None,
                member_name: None,
            },
        })
    }

    fn track_credits(
        &self,
        _track_id: &str,
        contributors: &HashMap<String, String>,
    ) -> Vec<CreditsInfo> {
        contributors
            .iter()
            .map(|(role, name)| CreditsInfo {
                role: util::expand_role_key(role),
                names: vec![name.clone()],
            })
            .collect()
    }
}

fn first_member_id(item: &Value) -> Option<String> {
    item["links"]["members"]["ids"][0]
        .as_str()
        .map(|s| s.to_string())
}

fn names_for_role(
    roles: &HashMap<String, String>,
    names: &HashMap<String, String>,
    role: &str,
) -> Option<String> {
    roles.get(role).and_then(|id| names.get(id)).cloned()
}
