use std::sync::Arc;

use simplepin_core::{ApiErrorClass, PinboardClient, PinboardError};
use thiserror::Error;

use super::tasks::{TaskCategory, TaskController, TaskOutcome};
use crate::library::{BookmarkItem, SharedLibrary, TagItem};
use crate::preferences::{PreferenceStore, PreferencesError};
use crate::reachability::Reachability;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("service is unreachable")]
    Unreachable,
    #[error("api token was rejected")]
    Unauthorized,
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("could not save preferences: {0}")]
    Preferences(String),
}

impl From<PreferencesError> for SyncError {
    fn from(err: PreferencesError) -> Self {
        SyncError::Preferences(err.to_string())
    }
}

impl From<PinboardError> for SyncError {
    fn from(err: PinboardError) -> Self {
        if err.classification() == Some(ApiErrorClass::Auth) {
            return SyncError::Unauthorized;
        }
        if err.is_decode() {
            return SyncError::Decode(err.to_string());
        }
        match err {
            PinboardError::Rejected(code) => SyncError::RequestFailed(code),
            PinboardError::Api { status, body } if body.trim().is_empty() => {
                SyncError::RequestFailed(status.to_string())
            }
            PinboardError::Api { body, .. } => SyncError::RequestFailed(body),
            other => SyncError::RequestFailed(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshReason {
    NeverSynced,
    RemoteNewer,
    EmptyCache,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshDecision {
    Fetch(RefreshReason),
    UpToDate,
}

/// Whether a staleness probe result warrants a full refetch.
///
/// An empty cache is always refetched, even when the server reports an older
/// timestamp than the one recorded locally.
pub fn decide_refresh(local: Option<i64>, remote: i64, store_empty: bool) -> RefreshDecision {
    match local {
        None => RefreshDecision::Fetch(RefreshReason::NeverSynced),
        Some(local) if remote > local => RefreshDecision::Fetch(RefreshReason::RemoteNewer),
        Some(_) if store_empty => RefreshDecision::Fetch(RefreshReason::EmptyCache),
        Some(_) => RefreshDecision::UpToDate,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Fetched { bookmarks: usize, tags: usize },
    UpToDate,
    /// A newer fetch or check took over; its result decides the state.
    Superseded,
    Cancelled,
}

pub struct SyncCoordinator {
    client: PinboardClient,
    reachability: Arc<dyn Reachability>,
    tasks: TaskController,
    library: SharedLibrary,
    preferences: Arc<PreferenceStore>,
}

impl SyncCoordinator {
    pub fn new(
        client: PinboardClient,
        reachability: Arc<dyn Reachability>,
        tasks: TaskController,
        library: SharedLibrary,
        preferences: Arc<PreferenceStore>,
    ) -> Self {
        Self {
            client,
            reachability,
            tasks,
            library,
            preferences,
        }
    }

    pub fn client(&self) -> &PinboardClient {
        &self.client
    }

    pub fn tasks(&self) -> &TaskController {
        &self.tasks
    }

    pub fn library(&self) -> &SharedLibrary {
        &self.library
    }

    pub fn last_update(&self) -> Option<i64> {
        self.preferences.last_update()
    }

    pub async fn is_reachable(&self) -> bool {
        self.reachability.is_reachable().await
    }

    /// Replaces bookmarks and tags with the server's full set.
    pub async fn fetch_all(&self) -> Result<SyncOutcome, SyncError> {
        if !self.is_reachable().await {
            tracing::warn!("fetch_all skipped: service unreachable");
            self.library.lock().await.mark_offline();
            return Err(SyncError::Unreachable);
        }
        let since = {
            let mut library = self.library.lock().await;
            library.begin_loading();
            library.fetch_marker()
        };

        let client = self.client.clone();
        let mut fetch = self.tasks.start(TaskCategory::FetchAll, async move {
            let update_time = client.probe_last_update().await?;
            let posts = client.fetch_all_bookmarks().await?;
            Ok::<_, PinboardError>((update_time, posts))
        });
        let client = self.client.clone();
        let mut tags_task = self
            .tasks
            .start(TaskCategory::FetchTags, async move { client.fetch_tags().await });

        let (update_time, posts) = match fetch.join().await {
            TaskOutcome::Completed(Ok(result)) => result,
            TaskOutcome::Completed(Err(err)) => {
                tracing::warn!(error = %err, "fetch_all failed");
                tags_task.cancel();
                self.library.lock().await.abandon_loading();
                return Err(err.into());
            }
            TaskOutcome::Superseded => {
                tracing::debug!("fetch_all superseded by a newer fetch");
                return Ok(SyncOutcome::Superseded);
            }
            TaskOutcome::Cancelled => {
                tags_task.cancel();
                self.library.lock().await.abandon_loading();
                return Ok(SyncOutcome::Cancelled);
            }
        };
        let bookmarks = match posts
            .into_iter()
            .map(BookmarkItem::from_post)
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(bookmarks) => bookmarks,
            Err(err) => {
                tracing::warn!(error = %err, "fetch_all returned undecodable bookmark");
                tags_task.cancel();
                self.library.lock().await.abandon_loading();
                return Err(err.into());
            }
        };
        let tags: Option<Vec<TagItem>> = match tags_task.join().await {
            TaskOutcome::Completed(Ok(tags)) => Some(tags.into_iter().map(TagItem::from).collect()),
            TaskOutcome::Completed(Err(err)) => {
                tracing::warn!(error = %err, "tag fetch failed, keeping previous tags");
                None
            }
            TaskOutcome::Superseded | TaskOutcome::Cancelled => None,
        };

        let mut library = self.library.lock().await;
        if fetch.is_superseded() {
            return Ok(SyncOutcome::Superseded);
        }
        if fetch.is_cancelled() {
            library.abandon_loading();
            return Ok(SyncOutcome::Cancelled);
        }
        let tags = tags.unwrap_or_else(|| library.store().tags().to_vec());
        library.replace_fetched(bookmarks, tags, since);
        let outcome = SyncOutcome::Fetched {
            bookmarks: library.store().len(),
            tags: library.store().tags().len(),
        };
        // The fresh data stays in place; without a recorded timestamp the next
        // check simply refetches.
        if let Err(err) = self.preferences.record_last_update(update_time) {
            tracing::warn!(error = %err, "failed to persist last update time");
            return Err(err.into());
        }
        tracing::info!(
            bookmarks = library.store().len(),
            tags = library.store().tags().len(),
            update_time,
            "bookmarks refreshed"
        );
        Ok(outcome)
    }

    /// Probes the server's last update time and refetches only when needed.
    pub async fn check_for_updates(&self) -> Result<SyncOutcome, SyncError> {
        if !self.is_reachable().await {
            tracing::warn!("update check skipped: service unreachable");
            return Err(SyncError::Unreachable);
        }
        let client = self.client.clone();
        let mut probe = self
            .tasks
            .start(TaskCategory::CheckUpdates, async move {
                client.probe_last_update().await
            });
        let remote = match probe.join().await {
            TaskOutcome::Completed(result) => result?,
            TaskOutcome::Superseded => return Ok(SyncOutcome::Superseded),
            TaskOutcome::Cancelled => return Ok(SyncOutcome::Cancelled),
        };
        let store_empty = self.library.lock().await.store().is_empty();
        if probe.is_superseded() {
            return Ok(SyncOutcome::Superseded);
        }
        if probe.is_cancelled() {
            return Ok(SyncOutcome::Cancelled);
        }
        drop(probe);

        let local = self.last_update();
        match decide_refresh(local, remote, store_empty) {
            RefreshDecision::Fetch(reason) => {
                tracing::info!(?reason, ?local, remote, "cache is stale, refetching");
                self.fetch_all().await
            }
            RefreshDecision::UpToDate => {
                tracing::debug!(?local, remote, "cache is up to date");
                Ok(SyncOutcome::UpToDate)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{SearchQuery, SearchScope};
    use crate::test_support::{
        Harness, mount_posts, mount_tags, mount_update, offline, post_json, spec_posts,
    };
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn decision_table() {
        use RefreshDecision::*;
        assert_eq!(
            decide_refresh(Some(100), 150, false),
            Fetch(RefreshReason::RemoteNewer)
        );
        assert_eq!(
            decide_refresh(Some(200), 150, true),
            Fetch(RefreshReason::EmptyCache)
        );
        assert_eq!(
            decide_refresh(Some(150), 150, true),
            Fetch(RefreshReason::EmptyCache)
        );
        assert_eq!(decide_refresh(Some(150), 150, false), UpToDate);
        assert_eq!(decide_refresh(Some(200), 150, false), UpToDate);
        assert_eq!(
            decide_refresh(None, 0, false),
            Fetch(RefreshReason::NeverSynced)
        );
    }

    #[test]
    fn maps_wire_errors_onto_taxonomy() {
        assert_eq!(
            SyncError::from(PinboardError::Rejected("item not found".into())),
            SyncError::RequestFailed("item not found".into())
        );
        let decode = serde_json::from_str::<u8>("x").unwrap_err();
        assert!(matches!(
            SyncError::from(PinboardError::Decode(decode)),
            SyncError::Decode(_)
        ));
    }

    #[tokio::test]
    async fn fetch_all_replaces_store_and_records_server_time() {
        let server = MockServer::start().await;
        mount_update(&server, 150).await;
        mount_posts(&server, spec_posts()).await;
        mount_tags(&server, serde_json::json!({"programming": 2, "todo": 1})).await;
        let harness = Harness::new(&server);
        harness
            .library
            .lock()
            .await
            .set_query(SearchQuery::new("programming", SearchScope::All));

        let outcome = harness.coordinator.fetch_all().await.unwrap();

        assert_eq!(
            outcome,
            SyncOutcome::Fetched {
                bookmarks: 3,
                tags: 2
            }
        );
        assert_eq!(harness.coordinator.last_update(), Some(150));
        let library = harness.library.lock().await;
        assert_eq!(library.store().len(), 3);
        let view: Vec<&str> = library.view().iter().map(|b| b.url.as_str()).collect();
        assert_eq!(view, vec!["u2", "u1"]);
        assert_eq!(library.empty_state(), None);
    }

    #[tokio::test]
    async fn fetch_all_when_unreachable_leaves_store_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/posts/all"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(0)
            .mount(&server)
            .await;
        let harness = Harness::with_reachability(&server, offline());
        harness
            .library
            .lock()
            .await
            .replace_all(vec![crate::library::fixtures::b1()], Vec::new());

        let err = harness.coordinator.fetch_all().await.unwrap_err();

        assert_eq!(err, SyncError::Unreachable);
        assert_eq!(harness.library.lock().await.store().len(), 1);
        assert_eq!(harness.coordinator.last_update(), None);
    }

    #[tokio::test]
    async fn undecodable_bookmark_aborts_without_touching_store() {
        let server = MockServer::start().await;
        mount_update(&server, 150).await;
        mount_posts(
            &server,
            vec![serde_json::json!({"href": "u1", "time": "not-a-date"})],
        )
        .await;
        mount_tags(&server, serde_json::json!({})).await;
        let harness = Harness::new(&server);
        harness
            .library
            .lock()
            .await
            .replace_all(vec![crate::library::fixtures::b3()], Vec::new());

        let err = harness.coordinator.fetch_all().await.unwrap_err();

        assert!(matches!(err, SyncError::Decode(_)));
        let library = harness.library.lock().await;
        assert_eq!(library.store().bookmarks()[0].url, "u3");
        assert_eq!(harness.coordinator.last_update(), None);
    }

    #[tokio::test]
    async fn failed_tag_fetch_keeps_previous_tags() {
        let server = MockServer::start().await;
        mount_update(&server, 10).await;
        mount_posts(&server, spec_posts()).await;
        Mock::given(method("GET"))
            .and(path("/v1/tags/get"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let harness = Harness::new(&server);
        harness.library.lock().await.replace_all(
            Vec::new(),
            vec![TagItem {
                name: "old".into(),
                usage_count: 4,
            }],
        );

        harness.coordinator.fetch_all().await.unwrap();

        let library = harness.library.lock().await;
        assert_eq!(library.store().len(), 3);
        assert_eq!(library.store().tag_names(), vec!["old"]);
    }

    #[tokio::test]
    async fn server_error_is_request_failed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/posts/update"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;
        mount_tags(&server, serde_json::json!({})).await;
        let harness = Harness::new(&server);

        let err = harness.coordinator.fetch_all().await.unwrap_err();

        assert_eq!(err, SyncError::RequestFailed("maintenance".into()));
        assert_eq!(harness.library.lock().await.empty_state(), None);
    }

    #[tokio::test]
    async fn rejected_token_is_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/posts/update"))
            .respond_with(ResponseTemplate::new(401).set_body_string("API requires authentication"))
            .mount(&server)
            .await;
        let harness = Harness::new(&server);

        assert_eq!(
            harness.coordinator.check_for_updates().await.unwrap_err(),
            SyncError::Unauthorized
        );
    }

    #[tokio::test]
    async fn newer_remote_triggers_fetch() {
        let server = MockServer::start().await;
        mount_update(&server, 150).await;
        Mock::given(method("GET"))
            .and(path("/v1/posts/all"))
            .respond_with(ResponseTemplate::new(200).set_body_json(spec_posts()))
            .expect(1)
            .mount(&server)
            .await;
        mount_tags(&server, serde_json::json!({})).await;
        let harness = Harness::new(&server);
        harness.preferences.record_last_update(100).unwrap();
        harness
            .library
            .lock()
            .await
            .replace_all(vec![crate::library::fixtures::b1()], Vec::new());

        let outcome = harness.coordinator.check_for_updates().await.unwrap();

        assert!(matches!(outcome, SyncOutcome::Fetched { bookmarks: 3, .. }));
        assert_eq!(harness.coordinator.last_update(), Some(150));
    }

    #[tokio::test]
    async fn empty_store_triggers_fetch_even_when_remote_is_older() {
        let server = MockServer::start().await;
        mount_update(&server, 150).await;
        Mock::given(method("GET"))
            .and(path("/v1/posts/all"))
            .respond_with(ResponseTemplate::new(200).set_body_json(spec_posts()))
            .expect(1)
            .mount(&server)
            .await;
        mount_tags(&server, serde_json::json!({})).await;
        let harness = Harness::new(&server);
        harness.preferences.record_last_update(200).unwrap();

        let outcome = harness.coordinator.check_for_updates().await.unwrap();

        assert!(matches!(outcome, SyncOutcome::Fetched { bookmarks: 3, .. }));
    }

    #[tokio::test]
    async fn up_to_date_cache_skips_fetch() {
        let server = MockServer::start().await;
        mount_update(&server, 150).await;
        Mock::given(method("GET"))
            .and(path("/v1/posts/all"))
            .respond_with(ResponseTemplate::new(200).set_body_json(spec_posts()))
            .expect(0)
            .mount(&server)
            .await;
        let harness = Harness::new(&server);
        harness.preferences.record_last_update(150).unwrap();
        harness
            .library
            .lock()
            .await
            .replace_all(vec![crate::library::fixtures::b1()], Vec::new());

        let outcome = harness.coordinator.check_for_updates().await.unwrap();

        assert_eq!(outcome, SyncOutcome::UpToDate);
        assert_eq!(harness.library.lock().await.store().len(), 1);
    }

    #[tokio::test]
    async fn check_when_unreachable_reports_error() {
        let server = MockServer::start().await;
        let harness = Harness::with_reachability(&server, offline());

        assert_eq!(
            harness.coordinator.check_for_updates().await.unwrap_err(),
            SyncError::Unreachable
        );
    }

    #[tokio::test]
    async fn superseded_fetch_keeps_spinner_for_the_newer_one() {
        let server = MockServer::start().await;
        mount_update(&server, 150).await;
        Mock::given(method("GET"))
            .and(path("/v1/posts/all"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(spec_posts())
                    .set_delay(Duration::from_millis(600)),
            )
            .mount(&server)
            .await;
        mount_tags(&server, serde_json::json!({})).await;
        let harness = Harness::new(&server);

        let first_coordinator = Arc::clone(&harness.coordinator);
        let first = tokio::spawn(async move { first_coordinator.fetch_all().await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        let second_coordinator = Arc::clone(&harness.coordinator);
        let second = tokio::spawn(async move { second_coordinator.fetch_all().await });

        assert_eq!(first.await.unwrap(), Ok(SyncOutcome::Superseded));
        let loading = harness.library.lock().await.empty_state().unwrap();
        assert_eq!(loading.message, "Loading bookmarks…");
        assert!(loading.spinner);

        assert!(matches!(
            second.await.unwrap(),
            Ok(SyncOutcome::Fetched { bookmarks: 3, .. })
        ));
        assert_eq!(harness.library.lock().await.empty_state(), None);
    }

    #[tokio::test]
    async fn delete_during_fetch_is_not_undone_by_its_result() {
        let server = MockServer::start().await;
        mount_update(&server, 150).await;
        Mock::given(method("GET"))
            .and(path("/v1/posts/all"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(spec_posts())
                    .set_delay(Duration::from_millis(400)),
            )
            .mount(&server)
            .await;
        mount_tags(&server, serde_json::json!({})).await;
        let harness = Harness::new(&server);
        harness.library.lock().await.replace_all(
            vec![
                crate::library::fixtures::b1(),
                crate::library::fixtures::b2(),
                crate::library::fixtures::b3(),
            ],
            Vec::new(),
        );
        let coordinator = Arc::clone(&harness.coordinator);

        let pending = tokio::spawn(async move { coordinator.fetch_all().await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        let removal = harness.library.lock().await.take("u2").unwrap();

        assert!(matches!(
            pending.await.unwrap(),
            Ok(SyncOutcome::Fetched { bookmarks: 2, .. })
        ));
        drop(removal);
        let library = harness.library.lock().await;
        assert!(!library.store().contains("u2"));
        assert_eq!(library.store().len(), 2);
    }

    #[tokio::test]
    async fn teardown_during_fetch_drops_the_result() {
        let server = MockServer::start().await;
        mount_update(&server, 150).await;
        Mock::given(method("GET"))
            .and(path("/v1/posts/all"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(vec![post_json("u9", "Late", "", "", 9)])
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;
        mount_tags(&server, serde_json::json!({})).await;
        let harness = Harness::new(&server);
        let coordinator = Arc::clone(&harness.coordinator);

        let pending = tokio::spawn(async move { coordinator.fetch_all().await });
        tokio::time::sleep(Duration::from_millis(200)).await;
        harness.coordinator.tasks().cancel_all();

        assert_eq!(pending.await.unwrap(), Ok(SyncOutcome::Cancelled));
        let library = harness.library.lock().await;
        assert!(library.store().is_empty());
        assert_eq!(library.empty_state(), None);
        assert_eq!(harness.coordinator.last_update(), None);
    }
}
