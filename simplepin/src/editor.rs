use std::collections::HashSet;

use thiserror::Error;
use url::Url;

use crate::library::BookmarkItem;
use crate::preferences::Preferences;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DraftError {
    #[error("a url is required")]
    MissingUrl,
    #[error("the url must start with http:// or https://")]
    InvalidUrl,
    #[error("a title is required")]
    MissingTitle,
}

/// Add/edit form state for one bookmark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookmarkDraft {
    url: String,
    pub title: String,
    pub description: String,
    tags: Vec<String>,
    pub date: i64,
    pub is_private: bool,
    pub to_read: bool,
}

impl BookmarkDraft {
    /// Empty draft for a new bookmark, flags taken from the user's defaults.
    pub fn new(preferences: &Preferences) -> Self {
        Self {
            url: String::new(),
            title: String::new(),
            description: String::new(),
            tags: Vec::new(),
            date: now_unix(),
            is_private: preferences.private_by_default,
            to_read: preferences.unread_by_default,
        }
    }

    pub fn from_item(item: &BookmarkItem) -> Self {
        Self {
            url: item.url.clone(),
            title: item.title.clone(),
            description: item.description.clone(),
            tags: item.tags.clone(),
            date: item.date,
            is_private: item.is_private,
            to_read: item.to_read,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Urls never contain whitespace; anything typed or pasted is stripped.
    pub fn set_url(&mut self, input: &str) {
        self.url = input.split_whitespace().collect();
    }

    pub fn with_url(mut self, input: &str) -> Self {
        self.set_url(input);
        self
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn add_tag(&mut self, tag: &str) -> bool {
        let tag = tag.trim();
        if tag.is_empty() || self.tags.iter().any(|existing| existing == tag) {
            return false;
        }
        self.tags.push(tag.to_string());
        true
    }

    pub fn remove_tag(&mut self, tag: &str) -> bool {
        let before = self.tags.len();
        self.tags.retain(|existing| existing != tag);
        self.tags.len() != before
    }

    pub fn tag_completions(
        &self,
        input: &str,
        suggested: &[String],
        user_tags: &[String],
    ) -> TagCompletions {
        tag_completions(input, &self.tags, suggested, user_tags)
    }

    pub fn validate(&self) -> Result<(), DraftError> {
        if self.url.is_empty() {
            return Err(DraftError::MissingUrl);
        }
        let valid_url = Url::parse(&self.url)
            .is_ok_and(|url| matches!(url.scheme(), "http" | "https") && url.has_host());
        if !valid_url {
            return Err(DraftError::InvalidUrl);
        }
        if self.title.trim().is_empty() {
            return Err(DraftError::MissingTitle);
        }
        Ok(())
    }

    /// Validates and produces the record to store, with text fields trimmed.
    pub fn to_item(&self) -> Result<BookmarkItem, DraftError> {
        self.validate()?;
        let mut item = BookmarkItem::new(self.url.clone(), self.title.trim(), self.date)
            .with_description(self.description.trim())
            .with_tags(self.tags.iter().filter(|tag| !tag.is_empty()).cloned());
        item.is_private = self.is_private;
        item.to_read = self.to_read;
        Ok(item)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagCompletions {
    pub suggested: Vec<String>,
    pub user: Vec<String>,
}

impl TagCompletions {
    pub fn is_empty(&self) -> bool {
        self.suggested.is_empty() && self.user.is_empty()
    }
}

/// Completions for the tag field. Suggested tags come first; user tags that
/// are already suggested or already on the draft are left out.
pub fn tag_completions(
    input: &str,
    draft_tags: &[String],
    suggested: &[String],
    user_tags: &[String],
) -> TagCompletions {
    let input = input.trim();
    if input.is_empty() {
        return TagCompletions::default();
    }
    let on_draft: HashSet<&str> = draft_tags.iter().map(String::as_str).collect();
    let offered: HashSet<&str> = suggested.iter().map(String::as_str).collect();

    let suggested = suggested
        .iter()
        .filter(|tag| !on_draft.contains(tag.as_str()) && tag.contains(input))
        .cloned()
        .collect();
    let user = user_tags
        .iter()
        .filter(|tag| {
            !on_draft.contains(tag.as_str()) && !offered.contains(tag.as_str()) && tag.contains(input)
        })
        .cloned()
        .collect();
    TagCompletions { suggested, user }
}

/// Flattens popular and recommended suggestions, dropping blanks and repeats.
pub fn merge_suggestions(popular: Vec<String>, recommended: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    popular
        .into_iter()
        .chain(recommended)
        .filter(|tag| !tag.is_empty() && seen.insert(tag.clone()))
        .collect()
}

pub(crate) fn now_unix() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
