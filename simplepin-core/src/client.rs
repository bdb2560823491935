use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://api.pinboard.in";
const RESULT_DONE: &str = "done";

#[derive(Debug, Error)]
pub enum PinboardError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid timestamp {value:?}: {reason}")]
    InvalidTimestamp { value: String, reason: String },
    #[error("server rejected request: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    Auth,
    RateLimit,
    Transient,
    Permanent,
}

#[derive(Clone)]
pub struct PinboardClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl PinboardClient {
    pub fn new(token: impl Into<String>) -> Result<Self, PinboardError> {
        Self::with_base_url(DEFAULT_BASE_URL, token)
    }

    pub fn with_base_url(base_url: &str, token: impl Into<String>) -> Result<Self, PinboardError> {
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(base_url)?,
            token: token.into(),
        })
    }

    /// Rebuilds the underlying HTTP client with a per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, PinboardError> {
        self.http = Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub async fn fetch_all_bookmarks(&self) -> Result<Vec<Post>, PinboardError> {
        let url = self.endpoint("/v1/posts/all")?;
        let response = self.http.get(url).send().await?;
        Self::handle_response(response).await
    }

    pub async fn fetch_tags(&self) -> Result<Vec<TagCount>, PinboardError> {
        let url = self.endpoint("/v1/tags/get")?;
        let response = self.http.get(url).send().await?;
        let payload: serde_json::Map<String, serde_json::Value> =
            Self::handle_response(response).await?;
        Ok(payload
            .into_iter()
            .map(|(name, count)| TagCount {
                name,
                count: usage_count(&count),
            })
            .collect())
    }

    /// Cheap staleness probe: the time of the user's most recent change, as unix seconds.
    pub async fn probe_last_update(&self) -> Result<i64, PinboardError> {
        let url = self.endpoint("/v1/posts/update")?;
        let response = self.http.get(url).send().await?;
        let payload: UpdateTime = Self::handle_response(response).await?;
        parse_timestamp(&payload.update_time)
    }

    pub async fn add_or_edit_bookmark(&self, post: &PostInput) -> Result<ResultCode, PinboardError> {
        let mut url = self.endpoint("/v1/posts/add")?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("url", &post.url)
                .append_pair("description", &post.title)
                .append_pair("extended", &post.description)
                .append_pair("tags", &post.tags.join(" "))
                .append_pair("replace", "yes")
                .append_pair("shared", yes_no(!post.is_private))
                .append_pair("toread", yes_no(post.to_read));
            if let Some(time) = post.time {
                query.append_pair("dt", &format_timestamp(time)?);
            }
        }
        let response = self.http.get(url).send().await?;
        Self::handle_response(response).await
    }

    pub async fn delete_bookmark(&self, bookmark_url: &str) -> Result<ResultCode, PinboardError> {
        let mut url = self.endpoint("/v1/posts/delete")?;
        url.query_pairs_mut().append_pair("url", bookmark_url);
        let response = self.http.get(url).send().await?;
        Self::handle_response(response).await
    }

    pub async fn suggest_tags(&self, bookmark_url: &str) -> Result<TagSuggestions, PinboardError> {
        let mut url = self.endpoint("/v1/posts/suggest")?;
        url.query_pairs_mut().append_pair("url", bookmark_url);
        let response = self.http.get(url).send().await?;
        let entries: Vec<SuggestEntry> = Self::handle_response(response).await?;
        let mut suggestions = TagSuggestions::default();
        for entry in entries {
            suggestions.popular.extend(entry.popular.unwrap_or_default());
            suggestions
                .recommended
                .extend(entry.recommended.unwrap_or_default());
        }
        Ok(suggestions)
    }

    fn endpoint(&self, path: &str) -> Result<Url, PinboardError> {
        let mut url = self.base_url.join(path)?;
        url.query_pairs_mut()
            .append_pair("auth_token", &self.token)
            .append_pair("format", "json");
        Ok(url)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, PinboardError> {
        let status = response.status();
        let body = response.text().await?;
        if status.is_success() {
            Ok(serde_json::from_str(&body)?)
        } else {
            Err(PinboardError::Api { status, body })
        }
    }
}

impl PinboardError {
    pub fn classification(&self) -> Option<ApiErrorClass> {
        match self {
            PinboardError::Api { status, .. } => Some(classify_api_status(*status)),
            _ => None,
        }
    }

    /// True for failures caused by a payload the client could not understand.
    pub fn is_decode(&self) -> bool {
        match self {
            PinboardError::Decode(_) | PinboardError::InvalidTimestamp { .. } => true,
            PinboardError::Request(err) => err.is_decode(),
            _ => false,
        }
    }
}

fn classify_api_status(status: StatusCode) -> ApiErrorClass {
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        ApiErrorClass::Auth
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ApiErrorClass::RateLimit
    } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        ApiErrorClass::Transient
    } else {
        ApiErrorClass::Permanent
    }
}

pub fn parse_timestamp(value: &str) -> Result<i64, PinboardError> {
    OffsetDateTime::parse(value, &Rfc3339)
        .map(OffsetDateTime::unix_timestamp)
        .map_err(|err| PinboardError::InvalidTimestamp {
            value: value.to_string(),
            reason: err.to_string(),
        })
}

pub fn format_timestamp(unix: i64) -> Result<String, PinboardError> {
    let invalid = |reason: String| PinboardError::InvalidTimestamp {
        value: unix.to_string(),
        reason,
    };
    OffsetDateTime::from_unix_timestamp(unix)
        .map_err(|err| invalid(err.to_string()))?
        .format(&Rfc3339)
        .map_err(|err| invalid(err.to_string()))
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

// tags/get reports counts as numbers or as numeric strings depending on the account.
fn usage_count(value: &serde_json::Value) -> u64 {
    match value {
        serde_json::Value::Number(number) => number.as_u64().unwrap_or(0),
        serde_json::Value::String(text) => text.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Post {
    pub href: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub extended: String,
    #[serde(default)]
    pub meta: String,
    #[serde(default)]
    pub hash: String,
    pub time: String,
    #[serde(default)]
    pub shared: String,
    #[serde(default)]
    pub toread: String,
    #[serde(default)]
    pub tags: String,
}

impl Post {
    pub fn tag_list(&self) -> Vec<String> {
        self.tags.split_whitespace().map(str::to_string).collect()
    }

    pub fn is_private(&self) -> bool {
        self.shared == "no"
    }

    pub fn is_unread(&self) -> bool {
        self.toread == "yes"
    }

    pub fn timestamp(&self) -> Result<i64, PinboardError> {
        parse_timestamp(&self.time)
    }
}

/// Fields sent by `posts/add`; an existing bookmark with the same url is replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostInput {
    pub url: String,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub time: Option<i64>,
    pub is_private: bool,
    pub to_read: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagCount {
    pub name: String,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSuggestions {
    pub popular: Vec<String>,
    pub recommended: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ResultCode {
    pub result_code: String,
}

impl ResultCode {
    pub fn is_done(&self) -> bool {
        self.result_code == RESULT_DONE
    }

    pub fn ensure_done(self) -> Result<(), PinboardError> {
        if self.is_done() {
            Ok(())
        } else {
            Err(PinboardError::Rejected(self.result_code))
        }
    }
}

#[derive(Debug, Deserialize)]
struct UpdateTime {
    update_time: String,
}

#[derive(Debug, Deserialize)]
struct SuggestEntry {
    #[serde(default)]
    popular: Option<Vec<String>>,
    #[serde(default)]
    recommended: Option<Vec<String>>,
}
