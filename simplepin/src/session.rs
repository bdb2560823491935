use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use simplepin_core::PinboardError;
use thiserror::Error;

use crate::editor::{BookmarkDraft, DraftError, merge_suggestions};
use crate::events::{AppEvent, EventBus, Notice, Subscription};
use crate::library::{
    EmptyState, Library, PendingChange, Removal, SearchQuery, SearchScope, SharedLibrary,
};
use crate::preferences::PreferenceStore;
use crate::sync::{SyncCoordinator, SyncError, SyncOutcome, TaskCategory, TaskOutcome};

const SOMETHING_WENT_WRONG: &str = "Something Went Wrong";
const REFRESH_FAILED: &str = "Couldn't Refresh Bookmarks";
const OFFLINE_HINT: &str = "Try again when you're back online.";
const INVALID_TOKEN_HINT: &str = "Your API token was rejected. Please log in again.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Draft(#[from] DraftError),
    #[error("no bookmark with url {0}")]
    UnknownBookmark(String),
}

impl From<PinboardError> for SessionError {
    fn from(err: PinboardError) -> Self {
        SessionError::Sync(err.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    Confirmed,
    /// A newer action of the same kind took over. The request may already
    /// have reached the server, so the local change is kept.
    Superseded,
    /// Torn down before it finished; the store was rolled back.
    Cancelled,
}

/// What the UI should do when a bookmark is selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    pub url: String,
    pub external: bool,
    pub reader_mode: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Feedback {
    Notify,
    Quiet,
}

/// An optimistic store change waiting for its network call.
enum Applied {
    Change(PendingChange),
    Removal(Removal),
}

impl Applied {
    fn confirm(self, library: &mut Library) {
        match self {
            Applied::Change(change) => library.confirm(change),
            Applied::Removal(removal) => {
                tracing::debug!(url = %removal.item().url, "removal confirmed");
            }
        }
    }

    fn undo(self, library: &mut Library) -> bool {
        match self {
            Applied::Change(change) => library.rollback(change),
            Applied::Removal(removal) => library.restore(removal),
        }
    }
}

/// User-facing bookmark actions on top of the shared library.
///
/// Mutations are applied to the store first and settled when the matching
/// request finishes: confirmed on success, rolled back otherwise. Outcomes
/// are reported as notices on the event bus.
pub struct BookmarkSession {
    coordinator: Arc<SyncCoordinator>,
    bus: EventBus,
    preferences: Arc<PreferenceStore>,
    dismissed_clipboard: Mutex<HashSet<String>>,
}

impl BookmarkSession {
    pub fn new(
        coordinator: Arc<SyncCoordinator>,
        bus: EventBus,
        preferences: Arc<PreferenceStore>,
    ) -> Self {
        Self {
            coordinator,
            bus,
            preferences,
            dismissed_clipboard: Mutex::new(HashSet::new()),
        }
    }

    pub fn library(&self) -> &SharedLibrary {
        self.coordinator.library()
    }

    pub fn coordinator(&self) -> &Arc<SyncCoordinator> {
        &self.coordinator
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn preferences(&self) -> &PreferenceStore {
        &self.preferences
    }

    pub async fn empty_state(&self) -> Option<EmptyState> {
        self.library().lock().await.empty_state()
    }

    /// Full fetch. Being offline is shown through the empty state rather
    /// than an alert.
    pub async fn start(&self) -> Result<SyncOutcome, SessionError> {
        let result = self.coordinator.fetch_all().await;
        self.publish_view().await;
        match result {
            Ok(outcome) => Ok(outcome),
            Err(SyncError::Unreachable) => Err(SyncError::Unreachable.into()),
            Err(err) => {
                self.report(SOMETHING_WENT_WRONG, &err);
                Err(err.into())
            }
        }
    }

    pub async fn refresh(&self) -> Result<SyncOutcome, SessionError> {
        let result = self.coordinator.check_for_updates().await;
        self.publish_view().await;
        match result {
            Ok(outcome) => Ok(outcome),
            Err(SyncError::Unreachable) => {
                self.alert(REFRESH_FAILED, OFFLINE_HINT);
                Err(SyncError::Unreachable.into())
            }
            Err(err) => {
                self.report(REFRESH_FAILED, &err);
                Err(err.into())
            }
        }
    }

    pub async fn foregrounded(&self) -> Result<SyncOutcome, SessionError> {
        self.refresh().await
    }

    /// Returns the number of bookmarks in the new view.
    pub async fn set_query(&self, text: &str, scope: SearchScope) -> usize {
        self.apply_query(SearchQuery::new(text, scope)).await
    }

    pub async fn select_tag(&self, tag: &str) -> usize {
        self.apply_query(SearchQuery::tag(tag)).await
    }

    pub async fn toggle_read(&self, url: &str) -> Result<MutationOutcome, SessionError> {
        let to_read = {
            let library = self.library().lock().await;
            let item = library
                .store()
                .get(url)
                .ok_or_else(|| SessionError::UnknownBookmark(url.to_string()))?;
            !item.to_read
        };
        self.set_read_state(url, to_read, Feedback::Notify).await
    }

    pub async fn delete(&self, url: &str) -> Result<MutationOutcome, SessionError> {
        let removal = self
            .library()
            .lock()
            .await
            .take(url)
            .ok_or_else(|| SessionError::UnknownBookmark(url.to_string()))?;
        let title = removal.item().title.clone();
        let client = self.coordinator.client().clone();
        let target = url.to_string();
        self.settle(
            TaskCategory::Delete,
            Applied::Removal(removal),
            async move { client.delete_bookmark(&target).await?.ensure_done() },
            Notice::toast("Bookmark Deleted", title),
            Feedback::Notify,
        )
        .await
    }

    /// Adds a new bookmark or replaces the one with the same url.
    pub async fn save(&self, draft: &BookmarkDraft) -> Result<MutationOutcome, SessionError> {
        let item = draft.to_item()?;
        let input = item.to_post_input();
        let title = item.title.clone();
        let change = self.library().lock().await.upsert(item);
        let client = self.coordinator.client().clone();
        let outcome = self
            .settle(
                TaskCategory::Add,
                Applied::Change(change),
                async move { client.add_or_edit_bookmark(&input).await?.ensure_done() },
                Notice::toast("Bookmark Saved", title),
                Feedback::Notify,
            )
            .await?;
        if outcome == MutationOutcome::Confirmed {
            self.bus.publish(AppEvent::BookmarkAdded);
        }
        Ok(outcome)
    }

    /// Resolves how to show a bookmark, marking it read first when the user
    /// asked for that and the service is reachable. A failed mark is rolled
    /// back silently.
    pub async fn open(&self, url: &str) -> Result<OpenRequest, SessionError> {
        let prefs = self.preferences.snapshot();
        let unread = {
            let library = self.library().lock().await;
            library
                .store()
                .get(url)
                .ok_or_else(|| SessionError::UnknownBookmark(url.to_string()))?
                .to_read
        };
        if prefs.mark_as_read && unread && self.coordinator.is_reachable().await {
            if let Err(err) = self.set_read_state(url, false, Feedback::Quiet).await {
                tracing::debug!(url, error = %err, "mark as read on open failed");
            }
        }
        Ok(OpenRequest {
            url: url.to_string(),
            external: prefs.open_links_external,
            reader_mode: prefs.reader_mode,
        })
    }

    /// Whether a url found on the clipboard should be offered for saving.
    pub async fn offer_clipboard_url(&self, url: &str) -> bool {
        let url = url.trim();
        if url.is_empty() || self.dismissed_clipboard.lock().contains(url) {
            return false;
        }
        !self.library().lock().await.store().contains(url)
    }

    pub fn dismiss_clipboard_url(&self, url: &str) {
        self.dismissed_clipboard.lock().insert(url.trim().to_string());
    }

    pub async fn suggest_tags(&self, url: &str) -> Result<Vec<String>, SessionError> {
        let suggestions = self.coordinator.client().suggest_tags(url).await?;
        Ok(merge_suggestions(
            suggestions.popular,
            suggestions.recommended,
        ))
    }

    pub async fn user_tags(&self) -> Vec<String> {
        self.library().lock().await.store().tag_names()
    }

    pub async fn handle_event(&self, event: &AppEvent) -> Result<Option<SyncOutcome>, SessionError> {
        match event {
            AppEvent::LoginSucceeded | AppEvent::BookmarkAdded => self.start().await.map(Some),
            AppEvent::Foregrounded => self.foregrounded().await.map(Some),
            AppEvent::TokenChanged => {
                self.teardown();
                Ok(None)
            }
            AppEvent::Notice(_) | AppEvent::ViewChanged { .. } => Ok(None),
        }
    }

    /// Handles bus events until every publisher is gone. Failures have
    /// already been published as notices.
    pub async fn run_events(&self, mut subscription: Subscription) {
        while let Some(event) = subscription.recv().await {
            if let Err(err) = self.handle_event(&event).await {
                tracing::debug!(?event, error = %err, "event handling failed");
            }
            if event == AppEvent::TokenChanged {
                break;
            }
        }
    }

    pub fn teardown(&self) {
        tracing::info!("session teardown, cancelling in-flight operations");
        self.coordinator.tasks().cancel_all();
    }

    async fn set_read_state(
        &self,
        url: &str,
        to_read: bool,
        feedback: Feedback,
    ) -> Result<MutationOutcome, SessionError> {
        let (change, input, title) = {
            let mut library = self.library().lock().await;
            let change = library
                .set_read_state(url, to_read)
                .ok_or_else(|| SessionError::UnknownBookmark(url.to_string()))?;
            let item = library
                .store()
                .get(url)
                .ok_or_else(|| SessionError::UnknownBookmark(url.to_string()))?;
            (change, item.to_post_input(), item.title.clone())
        };
        let client = self.coordinator.client().clone();
        let label = if to_read { "Marked as Unread" } else { "Marked as Read" };
        self.settle(
            TaskCategory::Add,
            Applied::Change(change),
            async move { client.add_or_edit_bookmark(&input).await?.ensure_done() },
            Notice::toast(label, title),
            feedback,
        )
        .await
    }

    async fn settle<F>(
        &self,
        category: TaskCategory,
        applied: Applied,
        request: F,
        done: Notice,
        feedback: Feedback,
    ) -> Result<MutationOutcome, SessionError>
    where
        F: Future<Output = Result<(), PinboardError>> + Send + 'static,
    {
        self.publish_view().await;
        if !self.coordinator.is_reachable().await {
            self.undo(applied).await;
            if feedback == Feedback::Notify {
                self.alert(SOMETHING_WENT_WRONG, OFFLINE_HINT);
            }
            return Err(SyncError::Unreachable.into());
        }

        let mut handle = self.coordinator.tasks().start(category, request);
        match handle.join().await {
            TaskOutcome::Completed(Ok(())) => {
                let mut library = self.library().lock().await;
                if handle.is_superseded() {
                    applied.confirm(&mut library);
                    return Ok(MutationOutcome::Superseded);
                }
                if handle.is_cancelled() {
                    applied.undo(&mut library);
                    drop(library);
                    self.publish_view().await;
                    return Ok(MutationOutcome::Cancelled);
                }
                applied.confirm(&mut library);
                drop(library);
                if feedback == Feedback::Notify {
                    self.bus.publish(AppEvent::Notice(done));
                }
                Ok(MutationOutcome::Confirmed)
            }
            TaskOutcome::Completed(Err(err)) => {
                let err = SyncError::from(err);
                tracing::warn!(category = category.as_str(), error = %err, "mutation failed");
                self.undo(applied).await;
                if feedback == Feedback::Notify {
                    self.report(SOMETHING_WENT_WRONG, &err);
                }
                Err(err.into())
            }
            TaskOutcome::Superseded => {
                tracing::debug!(category = category.as_str(), "mutation superseded, keeping its change");
                applied.confirm(&mut *self.library().lock().await);
                Ok(MutationOutcome::Superseded)
            }
            TaskOutcome::Cancelled => {
                tracing::debug!(category = category.as_str(), "mutation cancelled");
                self.undo(applied).await;
                Ok(MutationOutcome::Cancelled)
            }
        }
    }

    async fn undo(&self, applied: Applied) {
        let restored = applied.undo(&mut *self.library().lock().await);
        if restored {
            self.publish_view().await;
        }
    }

    async fn apply_query(&self, query: SearchQuery) -> usize {
        let len = {
            let mut library = self.library().lock().await;
            library.set_query(query);
            library.view().len()
        };
        self.bus.publish(AppEvent::ViewChanged { len });
        len
    }

    async fn publish_view(&self) {
        let len = self.library().lock().await.view().len();
        self.bus.publish(AppEvent::ViewChanged { len });
    }

    /// Alerts about `err`. A rejected token also ends the session, as a
    /// token change would.
    fn report(&self, title: &str, err: &SyncError) {
        self.alert(title, failure_message(err));
        if *err == SyncError::Unauthorized {
            self.bus.publish(AppEvent::TokenChanged);
        }
    }

    fn alert(&self, title: &str, message: impl Into<String>) {
        self.bus.publish(AppEvent::Notice(Notice::alert(title, message)));
    }
}

fn failure_message(err: &SyncError) -> String {
    match err {
        SyncError::Unreachable => OFFLINE_HINT.to_string(),
        SyncError::Unauthorized => INVALID_TOKEN_HINT.to_string(),
        SyncError::RequestFailed(message)
        | SyncError::Decode(message)
        | SyncError::Preferences(message) => message.clone(),
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
