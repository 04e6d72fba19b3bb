pub mod client;
pub mod napster;

use crate::error::Result;
use crate::models::{
    AlbumInfo, ArtistInfo, CodecOptions, CreditsInfo, DownloadParams, MediaIdentification,
    MediaType, PlaylistInfo, Prefetch, Quality, SearchResult, TrackDownloadInfo, TrackInfo,
};
use std::collections::HashMap;

/// Provider trait: the surface the host application drives.
/// Implementation: napster::NapsterProvider.
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    /// Return the provider's name (for logging, UI, etc)
    fn name(&self) -> &str;

    /// Return true if a session access token is stored for this provider.
    fn is_authenticated(&self) -> bool;

    /// Password login; persists the full credential set to the session store.
    async fn login(&self, username: &str, password: &str) -> Result<()>;

    /// Resolve a deep link into an entity type and id.
    fn parse_url(&self, url: &str) -> Result<MediaIdentification>;

    /// Search the catalog. A track hint with an ISRC short-circuits to an
    /// exact lookup before falling back to free text.
    async fn search(
        &self,
        media: MediaType,
        query: &str,
        hint: Option<&TrackInfo>,
        limit: u32,
    ) -> Result<Vec<SearchResult>>;

    /// Full track metadata plus bitrate/codec selection for the requested
    /// quality tier. Prefetched raw data from an earlier call avoids
    /// refetching; absent means fetch fresh.
    async fn track_info(
        &self,
        track_id: &str,
        quality: Quality,
        codecs: CodecOptions,
        prefetch: Option<&Prefetch>,
    ) -> Result<TrackInfo>;

    /// Resolve the stream URL for a previously selected format.
    async fn track_download(&self, download: &DownloadParams) -> Result<TrackDownloadInfo>;

    async fn album_info(&self, album_id: &str, prefetch: Option<&Prefetch>) -> Result<AlbumInfo>;

    async fn playlist_info(
        &self,
        playlist_id: &str,
        prefetch: Option<&Prefetch>,
    ) -> Result<PlaylistInfo>;

    async fn artist_info(&self, artist_id: &str) -> Result<ArtistInfo>;

    /// Format the contributor map from track info into display credits.
    fn track_credits(
        &self,
        track_id: &str,
        contributors: &HashMap<String, String>,
    ) -> Vec<CreditsInfo>;
}
