//! NetEase Cloud Music audio-match lookup

use super::CatalogMatcher;
use crate::error::RecognitionError;
use async_trait::async_trait;
use chapter_core::RecognitionResult;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::Deserialize;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;

const ALGORITHM_CODE: &str = "shazam_v2";

#[derive(Debug, Deserialize)]
struct MatchResponse {
    code: i64,
    data: Option<MatchData>,
}

#[derive(Debug, Deserialize)]
struct MatchData {
    #[serde(default)]
    result: Option<Vec<MatchEntry>>,
}

#[derive(Debug, Deserialize)]
struct MatchEntry {
    song: SongRecord,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SongRecord {
    name: String,
    id: serde_json::Value,
    #[serde(default)]
    artists: Vec<NamedEntity>,
    #[serde(default)]
    album: Option<NamedEntity>,
    #[serde(default)]
    trans_name: Option<String>,
    #[serde(default)]
    popularity: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct NamedEntity {
    #[serde(default)]
    name: String,
}

impl From<SongRecord> for RecognitionResult {
    fn from(song: SongRecord) -> Self {
        let id = match song.id {
            serde_json::Value::String(s) => s,
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        };
        RecognitionResult {
            name: song.name,
            artists: song.artists.into_iter().map(|a| a.name).collect(),
            album: song.album.map(|a| a.name).unwrap_or_default(),
            id,
            translated_name: song.trans_name.filter(|t| !t.trim().is_empty()),
            popularity: song.popularity,
        }
    }
}

/// Interpret a match response body. A non-200 code or an empty result list is no match.
pub fn parse_match_response(body: &str) -> Result<Option<RecognitionResult>, RecognitionError> {
    let response: MatchResponse = serde_json::from_str(body)
        .map_err(|e| RecognitionError::Catalog(format!("unexpected response: {}", e)))?;

    if response.code != 200 {
        debug!("Catalog answered code {}", response.code);
        return Ok(None);
    }

    let first = response
        .data
        .and_then(|d| d.result)
        .and_then(|r| r.into_iter().next());
    Ok(first.map(|entry| entry.song.into()))
}

/// Catalog client shared by every worker, rate limited as a whole
pub struct NeteaseCatalog {
    client: reqwest::Client,
    endpoint: String,
    limiter: DefaultDirectRateLimiter,
}

impl NeteaseCatalog {
    pub fn new(endpoint: impl Into<String>, requests_per_second: u32, timeout: Duration) -> Result<Self, RecognitionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("mkv-chapter-renamer/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let per_second = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            limiter: RateLimiter::direct(Quota::per_second(per_second)),
        })
    }
}

fn session_id() -> String {
    let now = chrono::Utc::now();
    format!("{:08x}{:08x}", now.timestamp() as u32, now.timestamp_subsec_nanos())
}

#[async_trait]
impl CatalogMatcher for NeteaseCatalog {
    async fn match_fingerprint(
        &self,
        fingerprint: &str,
        duration_seconds: u32,
    ) -> Result<Option<RecognitionResult>, RecognitionError> {
        self.limiter.until_ready().await;

        let duration = duration_seconds.to_string();
        let session = session_id();
        let params = [
            ("sessionId", session.as_str()),
            ("algorithmCode", ALGORITHM_CODE),
            ("duration", duration.as_str()),
            ("rawdata", fingerprint),
            ("times", "1"),
            ("decrypt", "1"),
        ];

        debug!("🌐 Querying catalog (duration: {}s, fingerprint length: {})", duration_seconds, fingerprint.len());

        let response = self.client.get(&self.endpoint).query(&params).send().await?;
        if !response.status().is_success() {
            debug!("Catalog HTTP status {}", response.status());
            return Ok(None);
        }

        let body = response.text().await?;
        parse_match_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_first_match() {
        let body = r#"{
            "code": 200,
            "data": {"result": [
                {"song": {"name": "ハジメテノオト", "id": 22677570,
                          "artists": [{"name": "初音ミク"}, {"name": "malo"}],
                          "album": {"name": "VOCALOID"}, "transName": "初次之音", "popularity": 95.0}},
                {"song": {"name": "Second", "id": "1", "artists": []}}
            ]}
        }"#;

        let song = parse_match_response(body).unwrap().unwrap();
        assert_eq!(song.name, "ハジメテノオト");
        assert_eq!(song.id, "22677570");
        assert_eq!(song.artists, vec!["初音ミク", "malo"]);
        assert_eq!(song.album, "VOCALOID");
        assert_eq!(song.translated_name.as_deref(), Some("初次之音"));
        assert_eq!(song.popularity, Some(95.0));
    }

    #[test]
    fn test_no_match_outcomes() {
        assert_eq!(parse_match_response(r#"{"code": 400, "data": null}"#).unwrap(), None);
        assert_eq!(parse_match_response(r#"{"code": 200, "data": {"result": []}}"#).unwrap(), None);
        assert_eq!(parse_match_response(r#"{"code": 200, "data": {}}"#).unwrap(), None);
        assert!(parse_match_response("<html>").is_err());
    }

    #[test]
    fn test_blank_translation_is_absent() {
        let body = r#"{"code":200,"data":{"result":[{"song":{"name":"X","id":"7","transName":" "}}]}}"#;
        let song = parse_match_response(body).unwrap().unwrap();
        assert_eq!(song.translated_name, None);
        assert_eq!(song.album, "");
    }
}
