use std::collections::HashMap;

use super::model::{BookmarkItem, TagItem, new_change_token};

/// Result of an optimistic write. The caller settles it once the matching
/// network call has finished, with either [`BookmarkStore::confirm`] or
/// [`BookmarkStore::rollback`].
#[must_use = "an optimistic change must be confirmed or rolled back"]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChange {
    url: String,
    previous: Option<BookmarkItem>,
    applied_token: String,
}

impl PendingChange {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn previous(&self) -> Option<&BookmarkItem> {
        self.previous.as_ref()
    }
}

/// A bookmark taken out of the store, kept so a failed delete can put it back
/// where it was.
#[must_use = "a removal must be dropped or restored"]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    item: BookmarkItem,
    index: usize,
}

impl Removal {
    pub fn item(&self) -> &BookmarkItem {
        &self.item
    }
}

#[derive(Debug, Default)]
pub struct BookmarkStore {
    bookmarks: Vec<BookmarkItem>,
    positions: HashMap<String, usize>,
    tags: Vec<TagItem>,
}

impl BookmarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swaps the whole collection. Duplicate urls keep their first occurrence.
    pub fn replace_all(&mut self, bookmarks: Vec<BookmarkItem>, tags: Vec<TagItem>) {
        let mut positions = HashMap::with_capacity(bookmarks.len());
        let mut unique = Vec::with_capacity(bookmarks.len());
        for item in bookmarks {
            if positions.contains_key(&item.url) {
                continue;
            }
            positions.insert(item.url.clone(), unique.len());
            unique.push(item);
        }
        self.bookmarks = unique;
        self.positions = positions;
        self.tags = tags;
    }

    pub fn replace_tags(&mut self, tags: Vec<TagItem>) {
        self.tags = tags;
    }

    /// Inserts a new bookmark at the front or replaces the record with the same url.
    pub fn upsert(&mut self, mut item: BookmarkItem) -> PendingChange {
        item.change_token = new_change_token();
        let applied_token = item.change_token.clone();
        let url = item.url.clone();
        let previous = match self.positions.get(&url) {
            Some(&index) => Some(std::mem::replace(&mut self.bookmarks[index], item)),
            None => {
                self.bookmarks.insert(0, item);
                self.reindex();
                None
            }
        };
        PendingChange {
            url,
            previous,
            applied_token,
        }
    }

    /// Flips the unread marker right away. `None` when no bookmark has this url.
    pub fn set_read_state(&mut self, url: &str, to_read: bool) -> Option<PendingChange> {
        let index = *self.positions.get(url)?;
        let item = &mut self.bookmarks[index];
        let previous = item.clone();
        item.to_read = to_read;
        item.change_token = new_change_token();
        Some(PendingChange {
            url: url.to_string(),
            previous: Some(previous),
            applied_token: item.change_token.clone(),
        })
    }

    pub fn remove(&mut self, url: &str) -> Option<BookmarkItem> {
        let index = self.positions.remove(url)?;
        let removed = self.bookmarks.remove(index);
        self.reindex();
        Some(removed)
    }

    pub fn take(&mut self, url: &str) -> Option<Removal> {
        let index = *self.positions.get(url)?;
        let item = self.remove(url)?;
        Some(Removal { item, index })
    }

    /// Puts a removed bookmark back at its old position. Returns false when a
    /// bookmark with the same url has been saved in the meantime.
    pub fn restore(&mut self, removal: Removal) -> bool {
        if self.positions.contains_key(&removal.item.url) {
            return false;
        }
        let index = removal.index.min(self.bookmarks.len());
        self.bookmarks.insert(index, removal.item);
        self.reindex();
        true
    }

    pub fn confirm(&mut self, change: PendingChange) {
        tracing::debug!(url = %change.url, "optimistic change confirmed");
    }

    /// Restores the record as it was before `change`. Returns false without
    /// touching anything when the record has been modified, replaced or removed
    /// since, so a later mutation is never clobbered.
    pub fn rollback(&mut self, change: PendingChange) -> bool {
        let Some(&index) = self.positions.get(&change.url) else {
            return false;
        };
        if self.bookmarks[index].change_token != change.applied_token {
            return false;
        }
        match change.previous {
            Some(mut previous) => {
                previous.change_token = new_change_token();
                self.bookmarks[index] = previous;
            }
            None => {
                self.remove(&change.url);
            }
        }
        true
    }

    pub fn get(&self, url: &str) -> Option<&BookmarkItem> {
        self.positions.get(url).map(|&index| &self.bookmarks[index])
    }

    pub fn contains(&self, url: &str) -> bool {
        self.positions.contains_key(url)
    }

    pub fn bookmarks(&self) -> &[BookmarkItem] {
        &self.bookmarks
    }

    pub fn tags(&self) -> &[TagItem] {
        &self.tags
    }

    pub fn tag_names(&self) -> Vec<String> {
        self.tags.iter().map(|tag| tag.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.bookmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookmarks.is_empty()
    }

    fn reindex(&mut self) {
        self.positions = self
            .bookmarks
            .iter()
            .enumerate()
            .map(|(index, item)| (item.url.clone(), index))
            .collect();
    }
}
