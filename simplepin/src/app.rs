use std::sync::Arc;

use anyhow::Context;
use simplepin_core::{PinboardClient, format_timestamp};

use crate::config::AppConfig;
use crate::editor::now_unix;
use crate::events::{AppEvent, EventBus, NoticeLevel};
use crate::library::{BookmarkItem, Library, SearchScope};
use crate::preferences::{PreferenceStore, Preferences};
use crate::reachability::HostReachability;
use crate::session::{BookmarkSession, SessionError};
use crate::sync::{SyncCoordinator, SyncError, TaskController};

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;

/// Composition root for the command line front end.
pub struct AppRuntime {
    config: AppConfig,
    bus: EventBus,
    session: Arc<BookmarkSession>,
}

impl AppRuntime {
    pub fn bootstrap(config: AppConfig, token: String) -> anyhow::Result<Self> {
        let preferences = Arc::new(
            PreferenceStore::open(&config.preferences_path).with_context(|| {
                format!(
                    "failed to load preferences from {}",
                    config.preferences_path.display()
                )
            })?,
        );
        let client = PinboardClient::with_base_url(config.api_url.as_str(), token)?
            .with_timeout(config.request_timeout)?;
        let reachability = Arc::new(
            HostReachability::for_url(&config.api_url, config.reachability_timeout)
                .context("api url cannot be probed for reachability")?,
        );
        let coordinator = Arc::new(SyncCoordinator::new(
            client,
            reachability,
            TaskController::new(),
            Library::shared(),
            Arc::clone(&preferences),
        ));
        let bus = EventBus::default();
        let session = Arc::new(BookmarkSession::new(coordinator, bus.clone(), preferences));
        Ok(Self {
            config,
            bus,
            session,
        })
    }

    /// Fetches everything once and prints the bookmarks matching `query`.
    pub async fn search(&self, query: &str, scope: SearchScope) -> anyhow::Result<()> {
        match self.session.start().await {
            Ok(_) | Err(SessionError::Sync(SyncError::Unreachable)) => {}
            Err(err) => return Err(err).context("failed to fetch bookmarks"),
        }
        self.session.set_query(query, scope).await;

        let prefs = self.session.preferences().snapshot();
        let now = now_unix();
        let library = self.session.library().lock().await;
        if let Some(empty) = library.empty_state() {
            println!("{}", empty.message);
            return Ok(());
        }
        for item in library.view() {
            println!("{}", render_bookmark(item, &prefs, now));
        }
        Ok(())
    }

    /// Keeps the cache fresh until Ctrl-C, printing notices as they arrive.
    pub async fn watch(self) -> anyhow::Result<()> {
        tracing::info!(
            api = %self.config.api_url,
            poll_secs = self.config.poll_interval.as_secs(),
            "watching for bookmark changes"
        );

        let mut notices = self.bus.subscribe();
        let notice_handle = tokio::spawn(async move {
            while let Some(event) = notices.recv().await {
                match event {
                    AppEvent::Notice(notice) if notice.level == NoticeLevel::Alert => {
                        tracing::warn!(title = %notice.title, "{}", notice.message);
                    }
                    AppEvent::Notice(notice) => {
                        tracing::info!(title = %notice.title, "{}", notice.message);
                    }
                    AppEvent::ViewChanged { len } => {
                        tracing::debug!(len, "view changed");
                    }
                    _ => {}
                }
            }
        });

        let session_for_events = Arc::clone(&self.session);
        let subscription = self.bus.subscribe();
        let events_handle = tokio::spawn(async move {
            session_for_events.run_events(subscription).await;
        });

        let bus_for_poll = self.bus.clone();
        let poll_interval = self.config.poll_interval;
        let poll_handle = tokio::spawn(async move {
            bus_for_poll.publish(AppEvent::LoginSucceeded);
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                bus_for_poll.publish(AppEvent::Foregrounded);
            }
        });

        let result = tokio::signal::ctrl_c()
            .await
            .context("failed waiting for shutdown signal");

        poll_handle.abort();
        self.session.teardown();
        events_handle.abort();
        notice_handle.abort();
        tracing::info!("stopped");
        result
    }
}

fn render_bookmark(item: &BookmarkItem, prefs: &Preferences, now: i64) -> String {
    let mut tags = item.tags.clone();
    if prefs.sort_tags {
        tags.sort_by_key(|tag| tag.to_lowercase());
    }
    let when = if prefs.exact_date {
        format_timestamp(item.date).unwrap_or_else(|_| item.date.to_string())
    } else {
        relative_age(now, item.date)
    };
    let mut flags = String::new();
    if item.to_read {
        flags.push_str(" [unread]");
    }
    if item.is_private {
        flags.push_str(" [private]");
    }

    let mut line = format!("{}{}\n  {}\n  {}", item.title, flags, item.url, when);
    if !tags.is_empty() {
        line.push_str(&format!("  #{}", tags.join(" #")));
    }
    line
}

fn relative_age(now: i64, date: i64) -> String {
    let age = now.saturating_sub(date).max(0);
    match age {
        age if age < MINUTE => "just now".to_string(),
        age if age < HOUR => plural(age / MINUTE, "minute"),
        age if age < DAY => plural(age / HOUR, "hour"),
        age => plural(age / DAY, "day"),
    }
}

fn plural(count: i64, unit: &str) -> String {
    if count == 1 {
        format!("1 {unit} ago")
    } else {
        format!("{count} {unit}s ago")
    }
}
