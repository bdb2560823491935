//! In-memory bookmark collection, the search engine over it, and the
//! serialized context that keeps the rendered view in step with both.

pub mod model;
pub mod search;
pub mod store;

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

pub use model::{BookmarkItem, TagItem};
pub use search::{SearchQuery, SearchScope, search, search_tag};
pub use store::{BookmarkStore, PendingChange, Removal};

const LOADING_MESSAGE: &str = "Loading bookmarks…";
const OFFLINE_MESSAGE: &str = "No internet connection.";
const NO_BOOKMARKS_MESSAGE: &str = "No bookmarks.";

/// Message shown in place of the list, with or without a spinner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmptyState {
    pub message: String,
    pub spinner: bool,
}

impl EmptyState {
    fn new(message: impl Into<String>, spinner: bool) -> Self {
        Self {
            message: message.into(),
            spinner,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum LoadPhase {
    #[default]
    NotLoaded,
    Loading,
    Offline,
    Loaded,
}

/// All reads and writes of the store go through one `Library` behind a single
/// async mutex. Every mutation recomputes the view before returning, so the
/// view observed by the next lock holder is always current.
pub type SharedLibrary = Arc<Mutex<Library>>;

#[derive(Debug, Default)]
pub struct Library {
    store: BookmarkStore,
    query: SearchQuery,
    view: Vec<BookmarkItem>,
    phase: LoadPhase,
    deletions: u64,
    /// url -> deletion sequence number, for deletes a running fetch may not see.
    tombstones: HashMap<String, u64>,
}

impl Library {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedLibrary {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn store(&self) -> &BookmarkStore {
        &self.store
    }

    pub fn query(&self) -> &SearchQuery {
        &self.query
    }

    pub fn view(&self) -> &[BookmarkItem] {
        &self.view
    }

    pub fn replace_all(&mut self, bookmarks: Vec<BookmarkItem>, tags: Vec<TagItem>) {
        self.store.replace_all(bookmarks, tags);
        self.phase = LoadPhase::Loaded;
        self.refresh_view();
    }

    /// Position in the delete history; taken when a fetch starts and handed
    /// back to [`Library::replace_fetched`].
    pub fn fetch_marker(&self) -> u64 {
        self.deletions
    }

    /// Like [`Library::replace_all`], but drops bookmarks deleted after
    /// `since`, since the server answered before it saw those deletes.
    pub fn replace_fetched(
        &mut self,
        mut bookmarks: Vec<BookmarkItem>,
        tags: Vec<TagItem>,
        since: u64,
    ) {
        let before = bookmarks.len();
        bookmarks.retain(|item| {
            self.tombstones
                .get(&item.url)
                .is_none_or(|&deleted_at| deleted_at <= since)
        });
        if bookmarks.len() != before {
            tracing::debug!(
                dropped = before - bookmarks.len(),
                "fetched bookmarks deleted during the fetch were skipped"
            );
        }
        self.tombstones.retain(|_, deleted_at| *deleted_at > since);
        self.replace_all(bookmarks, tags);
    }

    pub fn upsert(&mut self, item: BookmarkItem) -> PendingChange {
        self.tombstones.remove(&item.url);
        let change = self.store.upsert(item);
        self.refresh_view();
        change
    }

    pub fn set_read_state(&mut self, url: &str, to_read: bool) -> Option<PendingChange> {
        let change = self.store.set_read_state(url, to_read)?;
        self.refresh_view();
        Some(change)
    }

    pub fn remove(&mut self, url: &str) -> Option<BookmarkItem> {
        let removed = self.store.remove(url)?;
        self.refresh_view();
        Some(removed)
    }

    /// Removes a bookmark for a pending delete. Until the next fetch that
    /// starts after this call, fetched data will not bring it back.
    pub fn take(&mut self, url: &str) -> Option<Removal> {
        let removal = self.store.take(url)?;
        self.deletions += 1;
        self.tombstones.insert(url.to_string(), self.deletions);
        self.refresh_view();
        Some(removal)
    }

    pub fn restore(&mut self, removal: Removal) -> bool {
        let url = removal.item().url.clone();
        self.tombstones.remove(&url);
        let restored = self.store.restore(removal);
        if restored {
            tracing::info!(url = %url, "removed bookmark restored");
            self.refresh_view();
        }
        restored
    }

    pub fn confirm(&mut self, change: PendingChange) {
        self.store.confirm(change);
    }

    pub fn rollback(&mut self, change: PendingChange) -> bool {
        let url = change.url().to_string();
        let restored = self.store.rollback(change);
        if restored {
            tracing::info!(url = %url, "optimistic change rolled back");
            self.refresh_view();
        }
        restored
    }

    pub fn set_query(&mut self, query: SearchQuery) {
        self.query = query;
        self.refresh_view();
    }

    pub fn begin_loading(&mut self) {
        if self.phase != LoadPhase::Loaded {
            self.phase = LoadPhase::Loading;
        }
    }

    pub fn mark_offline(&mut self) {
        if self.phase != LoadPhase::Loaded {
            self.phase = LoadPhase::Offline;
        }
    }

    /// Drops a loading spinner left behind by a fetch that did not complete.
    pub fn abandon_loading(&mut self) {
        if self.phase == LoadPhase::Loading {
            self.phase = LoadPhase::NotLoaded;
        }
    }

    pub fn empty_state(&self) -> Option<EmptyState> {
        if self.store.is_empty() {
            match self.phase {
                LoadPhase::Loading => return Some(EmptyState::new(LOADING_MESSAGE, true)),
                LoadPhase::Offline => return Some(EmptyState::new(OFFLINE_MESSAGE, false)),
                LoadPhase::NotLoaded | LoadPhase::Loaded => {}
            }
        }
        if self.query.is_active() && self.view.is_empty() {
            return Some(EmptyState::new(
                format!("Couldn't find {}", self.query.text),
                false,
            ));
        }
        if self.store.is_empty() && self.phase == LoadPhase::Loaded {
            return Some(EmptyState::new(NO_BOOKMARKS_MESSAGE, false));
        }
        None
    }

    fn refresh_view(&mut self) {
        self.view = self.query.run(self.store.bookmarks());
    }
}
