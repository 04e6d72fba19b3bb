use mockito::{Matcher, Mock, Server};
use napster_provider as lib;
use lib::api::napster::NapsterProvider;
use lib::api::Provider;
use lib::config::Settings;
use lib::models::{Codec, CodecOptions, Prefetch, Quality};
use lib::store::{keys, MemoryStore, SessionStore};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

fn settings(base: &str) -> Settings {
    let mut cfg: Settings = toml::from_str(
        r#"
        api_key = "test-api-key"
        customer_secret = "test-secret"
    "#,
    )
    .expect("settings");
    cfg.api_base = Some(base.to_string());
    cfg
}

fn connect(base: &str, max_bitrate: u32, hires: bool) -> NapsterProvider {
    let store = Arc::new(MemoryStore::new());
    store.write(keys::ACCESS_TOKEN, "token").expect("write");
    store
        .write(
            keys::EXPIRY_TIME,
            &(chrono::Utc::now().timestamp() + 3600).to_string(),
        )
        .expect("write");
    store.write(keys::CATALOG_REGION, "US").expect("write");
    store
        .write(keys::MAX_BITRATE, &max_bitrate.to_string())
        .expect("write");
    store
        .write(keys::HIRES_ENABLED, &hires.to_string())
        .expect("write");

    let rt = tokio::runtime::Runtime::new().expect("rt");
    rt.block_on(NapsterProvider::connect(&settings(base), store)).expect("connect")
}

fn track_fixture(id: &str) -> Value {
    json!({
        "id": id,
        "name": "Darkside",
        "albumId": "alb.1",
        "albumName": "Darkside (Single)",
        "artistName": "Alan Walker",
        "artistId": "art.1",
        "isStreamable": true,
        "isExplicit": false,
        "index": 1,
        "disc": 1,
        "isrc": "NOG841807010",
        "formats": [
            { "bitrate": 64, "name": "AAC PLUS", "sampleBits": 16, "sampleRate": 44100 },
            { "bitrate": 192, "name": "AAC", "sampleBits": 16, "sampleRate": 44100 },
            { "bitrate": 320, "name": "AAC", "sampleBits": 16, "sampleRate": 44100 }
        ],
        "losslessFormats": [
            { "bitrate": 1411, "name": "FLAC", "sampleBits": 16, "sampleRate": 44100 }
        ],
        "contributors": { "primaryArtist": "art.1", "composer": "art.2" },
        "links": { "genres": { "ids": ["g.1"] } }
    })
}

fn album_fixture() -> Value {
    json!({
        "id": "alb.1",
        "name": "Darkside (Single)",
        "released": "2018-07-27",
        "artistName": "Alan Walker",
        "trackCount": 1,
        "discCount": 1,
        "copyright": "(C) 2018 MER",
        "upc": "190295560973",
        "isExplicit": false,
        "contributingArtists": { "primaryArtist": "art.1" }
    })
}

fn prefetch_for(track: &Value) -> Prefetch {
    let id = track["id"].as_str().expect("id").to_string();
    Prefetch {
        data: HashMap::from([(id, track.clone())]),
        album: Some(album_fixture()),
        member_name: None,
    }
}

fn mock_names_endpoint(server: &mut Server, path: &str, body: Value, hits: usize) -> Mock {
    server
        .mock("GET", path)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body.to_string())
        .expect(hits)
        .create()
}

fn name_mocks(server: &mut Server, artist_hits: usize, genre_hits: usize) -> (Mock, Mock) {
    let artists = mock_names_endpoint(
        server,
        "/v2.2/artists/art.1,art.2",
        json!({
            "meta": { "returnedCount": 2, "totalCount": 2 },
            "artists": [
                { "id": "art.1", "name": "Alan Walker" },
                { "id": "art.2", "name": "Tommy La Verdi" }
            ]
        }),
        artist_hits,
    );
    let genres = mock_names_endpoint(
        server,
        "/v2.2/genres/g.1",
        json!({
            "meta": { "returnedCount": 1, "totalCount": 1 },
            "genres": [{ "id": "g.1", "name": "Electronic" }]
        }),
        genre_hits,
    );
    (artists, genres)
}

#[test]
fn track_info_assembles_metadata_from_prefetched_data() {
    let mut server = Server::new();
    let (m_artists, m_genres) = name_mocks(&mut server, 1, 1);

    let provider = connect(&server.url(), 320, false);
    let track = track_fixture("tra.1");
    let rt = tokio::runtime::Runtime::new().expect("rt");
    let info = rt
        .block_on(provider.track_info(
            "tra.1",
            Quality::High,
            CodecOptions::default(),
            Some(&prefetch_for(&track)),
        ))
        .expect("track info");

    assert_eq!(info.name, "Darkside");
    assert_eq!(info.album, "Darkside (Single)");
    assert_eq!(info.album_id, "alb.1");
    assert_eq!(info.artists, vec!["Alan Walker".to_string()]);
    assert_eq!(info.artist_id, "art.1");
    assert_eq!(info.bitrate, 320);
    assert_eq!(info.codec, Codec::Aac);
    assert_eq!(info.sample_rate, 44.1);
    assert_eq!(info.release_year.as_deref(), Some("2018"));
    assert!(info.cover_url.contains("/imageserver/v2/albums/alb.1/"));
    assert!(info.error.is_none());

    // primary artist is excluded from the credits-facing map
    assert!(!info.contributors.contains_key("primaryArtist"));
    assert_eq!(
        info.contributors.get("composer").map(|s| s.as_str()),
        Some("Tommy La Verdi")
    );

    assert_eq!(info.tags.isrc.as_deref(), Some("NOG841807010"));
    assert_eq!(info.tags.upc.as_deref(), Some("190295560973"));
    assert_eq!(info.tags.composer.as_deref(), Some("Tommy La Verdi"));
    assert_eq!(info.tags.genres, vec!["Electronic".to_string()]);

    assert_eq!(info.download.bitrate, 320);
    assert_eq!(info.download.codec, "AAC");
    assert_eq!(info.download.track_id, "tra.1");

    m_artists.assert();
    m_genres.assert();
}

#[test]
fn distinct_non_primary_contributor_joins_artist_list() {
    let mut server = Server::new();
    let _m_artists = mock_names_endpoint(
        &mut server,
        "/v2.2/artists/art.1,art.3",
        json!({
            "meta": { "returnedCount": 2, "totalCount": 2 },
            "artists": [
                { "id": "art.1", "name": "Alan Walker" },
                { "id": "art.3", "name": "21 Savage" }
            ]
        }),
        1,
    );
    let _m_genres = mock_names_endpoint(
        &mut server,
        "/v2.2/genres/g.1",
        json!({
            "meta": { "returnedCount": 1, "totalCount": 1 },
            "genres": [{ "id": "g.1", "name": "Electronic" }]
        }),
        1,
    );

    let mut track = track_fixture("tra.1");
    track["contributors"] = json!({ "primaryArtist": "art.1", "nonPrimary": "art.3" });

    let provider = connect(&server.url(), 320, false);
    let rt = tokio::runtime::Runtime::new().expect("rt");
    let info = rt
        .block_on(provider.track_info(
            "tra.1",
            Quality::High,
            CodecOptions::default(),
            Some(&prefetch_for(&track)),
        ))
        .expect("track info");

    assert_eq!(
        info.artists,
        vec!["Alan Walker".to_string(), "21 Savage".to_string()]
    );
    // appended to artists, excluded from credits
    assert!(!info.contributors.contains_key("nonPrimary"));
    assert!(!info.contributors.contains_key("primaryArtist"));
}

#[test]
fn name_caches_prevent_refetch_within_a_session() {
    let mut server = Server::new();
    let (m_artists, m_genres) = name_mocks(&mut server, 1, 1);

    let provider = connect(&server.url(), 320, false);
    let first = track_fixture("tra.1");
    let second = track_fixture("tra.2");

    let rt = tokio::runtime::Runtime::new().expect("rt");
    rt.block_on(async {
        provider
            .track_info("tra.1", Quality::High, CodecOptions::default(), Some(&prefetch_for(&first)))
            .await
            .expect("first track");
        // same contributors and genres: everything must come from the caches
        provider
            .track_info("tra.2", Quality::High, CodecOptions::default(), Some(&prefetch_for(&second)))
            .await
            .expect("second track");
    });

    m_artists.assert();
    m_genres.assert();
}

#[test]
fn not_streamable_error_survives_valid_selection() {
    let mut server = Server::new();
    let (_m_artists, _m_genres) = name_mocks(&mut server, 1, 1);

    let mut track = track_fixture("tra.1");
    track["isStreamable"] = json!(false);

    let provider = connect(&server.url(), 320, false);
    let rt = tokio::runtime::Runtime::new().expect("rt");
    let info = rt
        .block_on(provider.track_info(
            "tra.1",
            Quality::High,
            CodecOptions::default(),
            Some(&prefetch_for(&track)),
        ))
        .expect("track info");

    // a bitrate was selected, but the streamability error wins
    assert_eq!(info.bitrate, 320);
    assert_eq!(info.error.as_deref(), Some("Track is not streamable"));
}

#[test]
fn not_streamable_wins_when_both_errors_apply() {
    let mut server = Server::new();
    let (_m_artists, _m_genres) = name_mocks(&mut server, 1, 1);

    let mut track = track_fixture("tra.1");
    track["isStreamable"] = json!(false);
    track["formats"] = json!([
        { "bitrate": 320, "name": "AAC", "sampleBits": 16, "sampleRate": 44100 }
    ]);

    let provider = connect(&server.url(), 320, false);
    let rt = tokio::runtime::Runtime::new().expect("rt");
    let info = rt
        .block_on(provider.track_info(
            "tra.1",
            Quality::Minimum,
            CodecOptions::default(),
            Some(&prefetch_for(&track)),
        ))
        .expect("track info");

    assert_eq!(info.bitrate, 0);
    assert_eq!(info.error.as_deref(), Some("Track is not streamable"));
}

#[test]
fn no_suitable_bitrate_is_reported_in_band() {
    let mut server = Server::new();
    let (_m_artists, _m_genres) = name_mocks(&mut server, 1, 1);

    let mut track = track_fixture("tra.1");
    track["formats"] = json!([
        { "bitrate": 320, "name": "AAC", "sampleBits": 16, "sampleRate": 44100 }
    ]);

    let provider = connect(&server.url(), 320, false);
    let rt = tokio::runtime::Runtime::new().expect("rt");
    let info = rt
        .block_on(provider.track_info(
            "tra.1",
            Quality::Minimum,
            CodecOptions::default(),
            Some(&prefetch_for(&track)),
        ))
        .expect("track info");

    assert_eq!(info.error.as_deref(), Some("No suitable bitrate found"));
    assert_eq!(info.bitrate, 0);
    assert_eq!(info.codec, Codec::None);
}

#[test]
fn hires_entitlement_gates_lossless_selection() {
    let mut server = Server::new();
    let (_m_artists, _m_genres) = name_mocks(&mut server, 1, 1);

    // entitled account goes lossless
    let provider = connect(&server.url(), 320, true);
    let track = track_fixture("tra.1");
    let rt = tokio::runtime::Runtime::new().expect("rt");
    let info = rt
        .block_on(provider.track_info(
            "tra.1",
            Quality::Lossless,
            CodecOptions::default(),
            Some(&prefetch_for(&track)),
        ))
        .expect("track info");
    assert_eq!(info.bitrate, 1411);
    assert_eq!(info.codec, Codec::Flac);
    assert_eq!(info.download.codec, "FLAC");
}

#[test]
fn lossless_without_entitlement_downgrades_to_high() {
    let mut server = Server::new();
    // second call resolves names from the caches
    let (_m_artists, _m_genres) = name_mocks(&mut server, 1, 1);

    let provider = connect(&server.url(), 320, false);
    let track = track_fixture("tra.1");
    let rt = tokio::runtime::Runtime::new().expect("rt");
    let (lossless, high) = rt.block_on(async {
        let lossless = provider
            .track_info("tra.1", Quality::Lossless, CodecOptions::default(), Some(&prefetch_for(&track)))
            .await
            .expect("lossless");
        let high = provider
            .track_info("tra.1", Quality::High, CodecOptions::default(), Some(&prefetch_for(&track)))
            .await
            .expect("high");
        (lossless, high)
    });

    assert_eq!(lossless.bitrate, high.bitrate);
    assert_eq!(lossless.codec, high.codec);
    assert_eq!(lossless.bitrate, 320);
}

#[test]
fn missing_prefetch_fetches_track_and_album() {
    let mut server = Server::new();
    let (m_artists, m_genres) = name_mocks(&mut server, 1, 1);
    let m_track = server
        .mock("GET", "/v2.2/tracks/tra.1")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "meta": { "returnedCount": 1, "totalCount": 1 },
                "tracks": [track_fixture("tra.1")]
            })
            .to_string(),
        )
        .expect(1)
        .create();
    let m_album = server
        .mock("GET", "/v2.2/albums/alb.1")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "meta": { "returnedCount": 1, "totalCount": 1 },
                "albums": [album_fixture()]
            })
            .to_string(),
        )
        .expect(1)
        .create();

    let provider = connect(&server.url(), 320, false);
    let rt = tokio::runtime::Runtime::new().expect("rt");
    let info = rt
        .block_on(provider.track_info("tra.1", Quality::High, CodecOptions::default(), None))
        .expect("track info");

    assert_eq!(info.name, "Darkside");
    assert_eq!(info.release_year.as_deref(), Some("2018"));
    m_track.assert();
    m_album.assert();
    m_artists.assert();
    m_genres.assert();
}
