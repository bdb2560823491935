use std::collections::HashSet;

use serde::Serialize;

use super::model::BookmarkItem;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum SearchScope {
    #[default]
    All,
    TagOnly,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    pub text: String,
    pub scope: SearchScope,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>, scope: SearchScope) -> Self {
        Self {
            text: text.into(),
            scope,
        }
    }

    /// Query issued when a tag chip is tapped.
    pub fn tag(tag: impl Into<String>) -> Self {
        Self::new(tag, SearchScope::TagOnly)
    }

    pub fn is_active(&self) -> bool {
        !self.text.is_empty()
    }

    pub fn run(&self, all: &[BookmarkItem]) -> Vec<BookmarkItem> {
        search(all, &self.text, self.scope)
    }
}

pub fn tokenize(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(str::to_lowercase)
        .filter(|token| !token.is_empty())
        .collect()
}

/// Filters `all` down to the bookmarks matching every token of `query`.
///
/// An empty query returns `all` untouched, in store order. Otherwise each token
/// must be a case-insensitive substring of the title, the description or the
/// space-joined tags (tags only under [`SearchScope::TagOnly`]); different
/// tokens may match different fields. Matches are returned newest first.
pub fn search(all: &[BookmarkItem], query: &str, scope: SearchScope) -> Vec<BookmarkItem> {
    if query.is_empty() {
        return all.to_vec();
    }
    let tokens = tokenize(query);
    if tokens.is_empty() {
        return Vec::new();
    }

    let haystacks: Vec<Haystack<'_>> = all.iter().map(Haystack::new).collect();
    let mut matched: Option<HashSet<&str>> = None;
    for token in &tokens {
        let hits: HashSet<&str> = haystacks
            .iter()
            .filter(|haystack| haystack.matches(token, scope))
            .map(|haystack| haystack.url)
            .collect();
        let next = match matched {
            Some(previous) => previous.intersection(&hits).copied().collect(),
            None => hits,
        };
        if next.is_empty() {
            return Vec::new();
        }
        matched = Some(next);
    }

    let matched = matched.unwrap_or_default();
    let mut results: Vec<BookmarkItem> = all
        .iter()
        .filter(|item| matched.contains(item.url.as_str()))
        .cloned()
        .collect();
    results.sort_by(|a, b| b.date.cmp(&a.date));
    results
}

pub fn search_tag(all: &[BookmarkItem], tag: &str) -> Vec<BookmarkItem> {
    search(all, tag, SearchScope::TagOnly)
}

struct Haystack<'a> {
    url: &'a str,
    title: String,
    description: String,
    tags: String,
}

impl<'a> Haystack<'a> {
    fn new(item: &'a BookmarkItem) -> Self {
        Self {
            url: &item.url,
            title: item.title.to_lowercase(),
            description: item.description.to_lowercase(),
            tags: item.joined_tags().to_lowercase(),
        }
    }

    fn matches(&self, token: &str, scope: SearchScope) -> bool {
        match scope {
            SearchScope::TagOnly => self.tags.contains(token),
            SearchScope::All => {
                self.title.contains(token)
                    || self.description.contains(token)
                    || self.tags.contains(token)
            }
        }
    }
}
