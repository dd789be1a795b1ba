use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};

/// Layout of the platform's textual timestamp, e.g. `Wed Feb 24 12:34:56 +0000 2016`.
const CREATED_AT_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct User {
    #[serde(default, deserialize_with = "id_string")]
    pub id_str: String,
    #[serde(default)]
    pub screen_name: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub protected: bool,
    #[serde(default)]
    pub profile_image_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tweet {
    #[serde(default, deserialize_with = "id_string")]
    pub id_str: String,
    pub text: String,
    #[serde(default)]
    pub user: User,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub entities: Entities,
    #[serde(default)]
    pub extended_entities: Option<ExtendedEntities>,
    #[serde(default)]
    pub retweeted_status: Option<Box<Tweet>>,
    #[serde(default)]
    pub quoted_status: Option<Box<Tweet>>,
    #[serde(default)]
    pub quoted_status_id_str: Option<String>,
    #[serde(default)]
    pub retweet_count: u64,
    #[serde(default)]
    pub favorite_count: u64,
    #[serde(default, deserialize_with = "optional_millis")]
    pub timestamp_ms: Option<i64>,
    #[serde(default)]
    pub created_at: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Entities {
    #[serde(default)]
    pub hashtags: Vec<Hashtag>,
    #[serde(default)]
    pub urls: Vec<UrlEntity>,
}

/// Hashtag span; `indices` are Unicode scalar offsets into the original text.
#[derive(Debug, Clone, Deserialize)]
pub struct Hashtag {
    pub indices: [usize; 2],
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UrlEntity {
    pub url: String,
    #[serde(default)]
    pub display_url: String,
    #[serde(default)]
    pub expanded_url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtendedEntities {
    #[serde(default)]
    pub media: Vec<Media>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Media {
    pub url: String,
    #[serde(default)]
    pub display_url: String,
    #[serde(default)]
    pub media_url: String,
    #[serde(default)]
    pub sizes: MediaSizes,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaSizes {
    #[serde(default)]
    pub small: MediaSize,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct MediaSize {
    #[serde(default)]
    pub w: u32,
    #[serde(default)]
    pub h: u32,
}

/// Envelope of a streamed `event` message (follow, favorite, mute, ...).
#[derive(Debug, Clone, Deserialize)]
pub struct EventEnvelope {
    pub event: String,
    #[serde(default)]
    pub source: User,
    #[serde(default)]
    pub target: User,
    #[serde(default, deserialize_with = "optional_millis")]
    pub timestamp_ms: Option<i64>,
    #[serde(default)]
    pub created_at: String,
}

/// Anything carrying the platform's pair of timestamp fields.
pub trait Timestamped {
    fn timestamp_ms(&self) -> Option<i64>;
    fn created_at(&self) -> &str;

    /// The millisecond field wins; the textual timestamp is the fallback.
    fn posted_at(&self) -> Option<DateTime<Utc>> {
        match self.timestamp_ms() {
            Some(ms) => Utc.timestamp_millis_opt(ms).single(),
            None => parse_created_at(self.created_at()),
        }
    }
}

impl Timestamped for Tweet {
    fn timestamp_ms(&self) -> Option<i64> {
        self.timestamp_ms
    }

    fn created_at(&self) -> &str {
        &self.created_at
    }
}

impl Timestamped for EventEnvelope {
    fn timestamp_ms(&self) -> Option<i64> {
        self.timestamp_ms
    }

    fn created_at(&self) -> &str {
        &self.created_at
    }
}

pub fn parse_created_at(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(text, CREATED_AT_FORMAT)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

impl Tweet {
    pub fn media(&self) -> &[Media] {
        self.extended_entities
            .as_ref()
            .map(|e| e.media.as_slice())
            .unwrap_or(&[])
    }
}

/// Ids arrive as strings (`id_str`) or bare numbers depending on the endpoint.
pub(crate) fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(u64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

fn optional_millis<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Millis {
        Text(String),
        Number(i64),
    }

    Ok(match Option::<Millis>::deserialize(deserializer)? {
        Some(Millis::Number(n)) => Some(n),
        Some(Millis::Text(s)) => s.trim().parse().ok(),
        None => None,
    })
}
