use super::{MutePage, MuteSource};
use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use std::time::Duration;

const MUTE_IDS_PATH: &str = "mutes/users/ids.json";

/// Fetches the mute list from the platform's REST API.
pub struct HttpMuteSource {
    base_url: String,
    token: String,
    client: reqwest::blocking::Client,
}

#[derive(Debug, Deserialize)]
struct MuteIdsResponse {
    #[serde(default, deserialize_with = "id_list")]
    ids: Vec<String>,
    #[serde(default)]
    next_cursor: Option<serde_json::Value>,
    #[serde(default)]
    next_cursor_str: Option<String>,
}

impl MuteIdsResponse {
    fn into_page(self) -> MutePage {
        let next_cursor = self
            .next_cursor_str
            .or_else(|| {
                self.next_cursor.map(|v| match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                })
            })
            .unwrap_or_else(|| "0".to_string());
        MutePage {
            ids: self.ids,
            next_cursor,
        }
    }
}

impl HttpMuteSource {
    pub fn new(base_url: String, token: String, timeout: Duration) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tweetsixel/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());

        Self {
            base_url,
            token,
            client,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), MUTE_IDS_PATH)
    }
}

impl MuteSource for HttpMuteSource {
    fn fetch_page(&self, cursor: Option<&str>) -> Result<MutePage> {
        let mut request = self
            .client
            .get(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.token));
        if let Some(cursor) = cursor {
            request = request.query(&[("cursor", cursor)]);
        }

        let response = request.send().context("mute list request failed")?;
        if !response.status().is_success() {
            return Err(anyhow::anyhow!("mute list API error: {}", response.status()));
        }

        let body: MuteIdsResponse = response.json().context("decoding mute list page")?;
        Ok(body.into_page())
    }
}

fn id_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(u64),
    }

    Ok(Vec::<Id>::deserialize(deserializer)?
        .into_iter()
        .map(|id| match id {
            Id::Text(s) => s,
            Id::Number(n) => n.to_string(),
        })
        .collect())
}
