use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde_json::{Value, json};
use simplepin_core::{PinboardClient, format_timestamp};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::events::EventBus;
use crate::library::{Library, SharedLibrary};
use crate::preferences::PreferenceStore;
use crate::reachability::Reachability;
use crate::session::BookmarkSession;
use crate::sync::{SyncCoordinator, TaskController};

pub(crate) const TEST_TOKEN: &str = "user:TOKEN";

struct FixedReachability(bool);

impl Reachability for FixedReachability {
    fn is_reachable(&self) -> BoxFuture<'_, bool> {
        let reachable = self.0;
        async move { reachable }.boxed()
    }
}

pub(crate) fn online() -> Arc<dyn Reachability> {
    Arc::new(FixedReachability(true))
}

pub(crate) fn offline() -> Arc<dyn Reachability> {
    Arc::new(FixedReachability(false))
}

pub(crate) struct Harness {
    pub coordinator: Arc<SyncCoordinator>,
    pub library: SharedLibrary,
    pub preferences: Arc<PreferenceStore>,
    pub bus: EventBus,
    _dir: TempDir,
}

impl Harness {
    pub fn new(server: &MockServer) -> Self {
        Self::with_reachability(server, online())
    }

    pub fn with_reachability(server: &MockServer, reachability: Arc<dyn Reachability>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let preferences =
            Arc::new(PreferenceStore::open(dir.path().join("preferences.json")).unwrap());
        let client = PinboardClient::with_base_url(&server.uri(), TEST_TOKEN).unwrap();
        let library = Library::shared();
        let coordinator = Arc::new(SyncCoordinator::new(
            client,
            reachability,
            TaskController::new(),
            Arc::clone(&library),
            Arc::clone(&preferences),
        ));
        Self {
            coordinator,
            library,
            preferences,
            bus: EventBus::default(),
            _dir: dir,
        }
    }

    pub fn session(&self) -> BookmarkSession {
        BookmarkSession::new(
            Arc::clone(&self.coordinator),
            self.bus.clone(),
            Arc::clone(&self.preferences),
        )
    }
}

pub(crate) fn post_json(href: &str, title: &str, extended: &str, tags: &str, time: i64) -> Value {
    json!({
        "href": href,
        "description": title,
        "extended": extended,
        "meta": format!("meta-{href}"),
        "hash": format!("hash-{href}"),
        "time": format_timestamp(time).unwrap(),
        "shared": "yes",
        "toread": "no",
        "tags": tags,
    })
}

pub(crate) fn spec_posts() -> Vec<Value> {
    vec![
        post_json("u1", "Rust Guide", "systems language", "rust programming", 100),
        post_json("u2", "Go Tutorial", "concurrency", "go programming", 200),
        post_json("u3", "Notes", "misc", "todo", 50),
    ]
}

pub(crate) async fn mount_update(server: &MockServer, time: i64) {
    Mock::given(method("GET"))
        .and(path("/v1/posts/update"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"update_time": format_timestamp(time).unwrap()})),
        )
        .mount(server)
        .await;
}

pub(crate) async fn mount_posts(server: &MockServer, posts: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path("/v1/posts/all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(posts))
        .mount(server)
        .await;
}

pub(crate) async fn mount_tags(server: &MockServer, tags: Value) {
    Mock::given(method("GET"))
        .and(path("/v1/tags/get"))
        .respond_with(ResponseTemplate::new(200).set_body_json(tags))
        .mount(server)
        .await;
}

pub(crate) fn result_code(code: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"result_code": code}))
}
