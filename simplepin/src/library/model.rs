use serde::Serialize;
use simplepin_core::{PinboardError, Post, PostInput, TagCount};

/// One saved link. `url` is the identity of a bookmark everywhere in the crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookmarkItem {
    pub url: String,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    /// Unix seconds.
    pub date: i64,
    pub is_private: bool,
    pub to_read: bool,
    /// Regenerated on every save; equal tokens mean the record was not touched.
    pub change_token: String,
}

impl BookmarkItem {
    pub fn new(url: impl Into<String>, title: impl Into<String>, date: i64) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            description: String::new(),
            tags: Vec::new(),
            date,
            is_private: false,
            to_read: false,
            change_token: new_change_token(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn from_post(post: Post) -> Result<Self, PinboardError> {
        let date = post.timestamp()?;
        let tags = post.tag_list();
        let is_private = post.is_private();
        let to_read = post.is_unread();
        let change_token = if post.meta.is_empty() {
            new_change_token()
        } else {
            post.meta
        };
        Ok(Self {
            url: post.href,
            title: post.description,
            description: post.extended,
            tags,
            date,
            is_private,
            to_read,
            change_token,
        })
    }

    pub fn to_post_input(&self) -> PostInput {
        PostInput {
            url: self.url.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            tags: self.tags.clone(),
            time: Some(self.date),
            is_private: self.is_private,
            to_read: self.to_read,
        }
    }

    pub fn joined_tags(&self) -> String {
        self.tags.join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagItem {
    pub name: String,
    pub usage_count: u64,
}

impl From<TagCount> for TagItem {
    fn from(tag: TagCount) -> Self {
        Self {
            name: tag.name,
            usage_count: tag.count,
        }
    }
}

pub fn new_change_token() -> String {
    format!("{:016x}", rand::random::<u64>())
}
