use crate::error::{Error, Result};
use base64::engine::general_purpose;
use base64::Engine as _;
use log::debug;
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::Mutex;

const API_VERSION: &str = "v2.2";
const OKHTTP_UA: &str = "okhttp/4.9.1";

/// Everything the server hands back on a successful password login,
/// plus the account entitlements fetched right after.
#[derive(Debug, Clone)]
pub struct SessionCredentials {
    pub access_token: String,
    pub refresh_token: String,
    /// Epoch seconds at which the access token stops working.
    pub expiry_time: i64,
    pub catalog_region: String,
    /// Highest bitrate (kbps) the account may stream.
    pub max_bitrate: u32,
    pub hires_enabled: bool,
}

/// Raw REST client for the Napster API. Maps requests and responses
/// literally; music-domain interpretation lives in the provider adapter.
///
/// The base URL defaults to the production endpoint and may be overridden
/// via the `NAPSTER_API_BASE` env var or an explicit constructor argument
/// (mockito points tests at a local server this way).
pub struct NapsterApi {
    http: Client,
    base: String,
    api_key: String,
    customer_secret: String,
    access_token: Mutex<Option<String>>,
    catalog_region: Mutex<Option<String>>,
}

impl NapsterApi {
    pub fn new(api_key: String, customer_secret: String, base: Option<String>) -> Self {
        let base = base
            .or_else(|| std::env::var("NAPSTER_API_BASE").ok())
            .unwrap_or_else(|| "https://api.napster.com".into());
        Self {
            http: Client::new(),
            base,
            api_key,
            customer_secret,
            access_token: Mutex::new(None),
            catalog_region: Mutex::new(None),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    /// Seed the client with a previously stored session.
    pub async fn set_session(&self, access_token: String, catalog_region: Option<String>) {
        *self.access_token.lock().await = Some(access_token);
        *self.catalog_region.lock().await = catalog_region;
    }

    async fn error_message(resp: reqwest::Response) -> String {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|j| j["message"].as_str().map(|s| s.to_string()))
            .unwrap_or_else(|| format!("{}: {}", status, text))
    }

    /// Basic-authenticated password-grant login. Requires exactly 200.
    /// Stores the access token and catalog region for subsequent calls and
    /// returns the full credential set, expiry computed from `now`.
    pub async fn login(&self, username: &str, password: &str, now: i64) -> Result<SessionCredentials> {
        let basic = general_purpose::STANDARD
            .encode(format!("{}:{}", self.api_key, self.customer_secret));
        let params = [
            ("username", username),
            ("password", password),
            ("grant_type", "password"),
        ];
        let url = format!("{}/oauth/token", self.base);
        let resp = self
            .http
            .post(&url)
            .header("apikey", &self.api_key)
            .header(USER_AGENT, OKHTTP_UA)
            .header(AUTHORIZATION, format!("Basic {}", basic))
            .form(&params)
            .send()
            .await?;
        if resp.status().as_u16() != 200 {
            return Err(Error::Auth(Self::error_message(resp).await));
        }
        let j: Value = resp.json().await?;

        let access_token = j["access_token"]
            .as_str()
            .ok_or_else(|| Error::missing("access_token"))?
            .to_string();
        let refresh_token = j["refresh_token"]
            .as_str()
            .ok_or_else(|| Error::missing("refresh_token"))?
            .to_string();
        let catalog_region = j["catalog"]
            .as_str()
            .ok_or_else(|| Error::missing("catalog"))?
            .to_string();
        let expires_in = j["expires_in"].as_i64().unwrap_or(0);

        *self.access_token.lock().await = Some(access_token.clone());
        *self.catalog_region.lock().await = Some(catalog_region.clone());

        let account = self.get("me/account", &[]).await?;
        let entitlements = &account["account"]["entitlements"];

        Ok(SessionCredentials {
            access_token,
            refresh_token,
            expiry_time: now + expires_in,
            catalog_region,
            max_bitrate: entitlements["maxStreamBitrate"].as_u64().unwrap_or(0) as u32,
            hires_enabled: entitlements["canStreamHiRes"].as_bool().unwrap_or(false),
        })
    }

    /// Exchange a refresh token for a new access token. Requires exactly
    /// 200; stores the new access token and returns it with its expiry.
    pub async fn refresh_login(&self, refresh_token: &str, now: i64) -> Result<(String, i64)> {
        let params = [
            ("client_id", self.api_key.as_str()),
            ("client_secret", self.customer_secret.as_str()),
            ("refresh_token", refresh_token),
            ("response_type", "token"),
            ("grant_type", "refresh_token"),
        ];
        let url = format!("{}/oauth/access_token", self.base);
        let resp = self
            .http
            .post(&url)
            .header("apikey", &self.api_key)
            .header(USER_AGENT, OKHTTP_UA)
            .form(&params)
            .send()
            .await?;
        if resp.status().as_u16() != 200 {
            return Err(Error::Auth(Self::error_message(resp).await));
        }
        let j: Value = resp.json().await?;
        let access_token = j["access_token"]
            .as_str()
            .ok_or_else(|| Error::missing("access_token"))?
            .to_string();
        let expires_in = j["expires_in"].as_i64().unwrap_or(0);
        *self.access_token.lock().await = Some(access_token.clone());
        Ok((access_token, now + expires_in))
    }

    /// Authenticated GET against the versioned API. The accepted success
    /// set is exactly {200, 201, 202}.
    async fn get(&self, resource: &str, params: &[(&str, String)]) -> Result<Value> {
        let token = self
            .access_token
            .lock()
            .await
            .clone()
            .ok_or_else(|| Error::Auth("no access token; login first".into()))?;
        let url = format!("{}/{}/{}", self.base, API_VERSION, resource);
        debug!("GET {} {:?}", resource, params);
        let resp = self
            .http
            .get(&url)
            .query(params)
            .header("apikey", &self.api_key)
            .header(USER_AGENT, OKHTTP_UA)
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .send()
            .await?;
        if !matches!(resp.status().as_u16(), 200 | 201 | 202) {
            return Err(Error::Api(Self::error_message(resp).await));
        }
        Ok(resp.json().await?)
    }

    /// Fetch one or more items by comma-joined id list, optionally a
    /// subresource collection (e.g. an album's tracks). Pages are fetched
    /// transparently until the running item count reaches the server's
    /// `meta.totalCount`; server order is preserved. An empty id slice
    /// returns no items without issuing a request, since the API treats a
    /// missing id segment as "no id" rather than "all".
    pub async fn get_items_list(
        &self,
        item_type: &str,
        item_ids: &[String],
        item_sub: Option<&str>,
        item_key: Option<&str>,
        limit: u32,
    ) -> Result<Vec<Value>> {
        if item_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = item_ids.join(",");
        let resource = match item_sub {
            Some(sub) => format!("{}/{}/{}", item_type, ids, sub),
            None => format!("{}/{}", item_type, ids),
        };
        let key = item_key.unwrap_or(item_type);

        let mut page = self.get(&resource, &[("limit", limit.to_string())]).await?;
        let mut items = take_items(&mut page, key);
        let mut fetched = page["meta"]["returnedCount"]
            .as_i64()
            .unwrap_or(items.len() as i64);
        let total = page["meta"]["totalCount"].as_i64().unwrap_or(0);

        while fetched < total {
            let mut next = self
                .get(
                    &resource,
                    &[("limit", limit.to_string()), ("offset", fetched.to_string())],
                )
                .await?;
            let returned = next["meta"]["returnedCount"].as_i64().unwrap_or(0);
            items.append(&mut take_items(&mut next, key));
            if returned == 0 {
                break;
            }
            fetched += returned;
        }

        Ok(items)
    }

    /// Same as [`get_items_list`](Self::get_items_list), re-keyed by item id.
    pub async fn get_items_dict(
        &self,
        item_type: &str,
        item_ids: &[String],
        item_sub: Option<&str>,
        item_key: Option<&str>,
        limit: u32,
    ) -> Result<HashMap<String, Value>> {
        let items = self
            .get_items_list(item_type, item_ids, item_sub, item_key, limit)
            .await?;
        let mut map = HashMap::with_capacity(items.len());
        for item in items {
            if let Some(id) = item["id"].as_str() {
                map.insert(id.to_string(), item);
            }
        }
        Ok(map)
    }

    /// Same as the list fetch, projected down to one named string field per
    /// item, keyed by id.
    pub async fn get_string_from_items_list(
        &self,
        item_type: &str,
        item_ids: &[String],
        string_key: &str,
        item_sub: Option<&str>,
        item_key: Option<&str>,
        limit: u32,
    ) -> Result<HashMap<String, String>> {
        let items = self
            .get_items_list(item_type, item_ids, item_sub, item_key, limit)
            .await?;
        let mut map = HashMap::with_capacity(items.len());
        for item in items {
            if let (Some(id), Some(s)) = (item["id"].as_str(), item[string_key].as_str()) {
                map.insert(id.to_string(), s.to_string());
            }
        }
        Ok(map)
    }

    /// One-shot (non-paginated) search for the given singular type name,
    /// returning the raw result array.
    pub async fn search(
        &self,
        query_type: &str,
        query: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Value>> {
        let catalog = self.catalog_region.lock().await.clone().unwrap_or_default();
        let params = [
            ("query", query.to_string()),
            ("type", query_type.to_string()),
            ("per_type_limit", limit.to_string()),
            ("catalog", catalog),
            ("rights", "2".to_string()),
            ("offset", offset.to_string()),
        ];
        let mut j = self.get("search", &params).await?;
        let key = format!("{}s", query_type);
        let items = j
            .get_mut("search")
            .and_then(|s| s.get_mut("data"))
            .and_then(|d| d.get_mut(key.as_str()))
            .map(Value::take);
        Ok(match items {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        })
    }

    /// Resolve a single streamable URL for the given bitrate/codec/track.
    pub async fn get_stream_url(&self, bitrate: u32, codec: &str, track_id: &str) -> Result<String> {
        let params = [
            ("bitrate", bitrate.to_string()),
            ("format", codec.to_string()),
            ("protocol", String::new()),
            ("track", track_id.to_string()),
        ];
        let j = self.get("streams", &params).await?;
        j["streams"][0]["url"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| Error::missing("streams[0].url"))
    }
}

fn take_items(page: &mut Value, key: &str) -> Vec<Value> {
    match page.get_mut(key).map(Value::take) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}
