use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskCategory {
    FetchAll,
    CheckUpdates,
    Add,
    Delete,
    FetchTags,
}

impl TaskCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskCategory::FetchAll => "fetch_all",
            TaskCategory::CheckUpdates => "check_updates",
            TaskCategory::Add => "add",
            TaskCategory::Delete => "delete",
            TaskCategory::FetchTags => "fetch_tags",
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum TaskOutcome<T> {
    Completed(T),
    /// A newer operation of the same category took over the slot.
    Superseded,
    /// Stopped through [`TaskController::cancel`] or [`TaskController::cancel_all`].
    Cancelled,
}

struct Slot {
    generation: u64,
    token: CancellationToken,
    superseded: Arc<AtomicBool>,
}

#[derive(Default)]
struct Registry {
    slots: Mutex<HashMap<TaskCategory, Slot>>,
    next_generation: AtomicU64,
}

impl Registry {
    fn release(&self, category: TaskCategory, generation: u64) {
        let mut slots = self.slots.lock();
        if slots
            .get(&category)
            .is_some_and(|slot| slot.generation == generation)
        {
            slots.remove(&category);
        }
    }
}

/// Keeps at most one in-flight operation per [`TaskCategory`].
#[derive(Clone, Default)]
pub struct TaskController {
    registry: Arc<Registry>,
}

impl TaskController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns `operation` under `category`, cancelling whatever was running there.
    pub fn start<F>(&self, category: TaskCategory, operation: F) -> TaskHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let generation = self.registry.next_generation.fetch_add(1, Ordering::SeqCst);
        let token = CancellationToken::new();
        let superseded = Arc::new(AtomicBool::new(false));
        let previous = self.registry.slots.lock().insert(
            category,
            Slot {
                generation,
                token: token.clone(),
                superseded: Arc::clone(&superseded),
            },
        );
        if let Some(previous) = previous {
            tracing::debug!(category = category.as_str(), "superseding in-flight operation");
            previous.superseded.store(true, Ordering::SeqCst);
            previous.token.cancel();
        }

        let task_token = token.clone();
        let join = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = task_token.cancelled() => None,
                output = operation => Some(output),
            }
        });

        TaskHandle {
            category,
            generation,
            token,
            superseded,
            join: Some(join),
            registry: Arc::clone(&self.registry),
        }
    }

    pub fn cancel(&self, category: TaskCategory) -> bool {
        let removed = self.registry.slots.lock().remove(&category);
        match removed {
            Some(slot) => {
                tracing::debug!(category = category.as_str(), "operation cancelled");
                slot.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        let drained: Vec<(TaskCategory, Slot)> = self.registry.slots.lock().drain().collect();
        for (category, slot) in drained {
            tracing::debug!(category = category.as_str(), "operation cancelled");
            slot.token.cancel();
        }
    }

    pub fn is_active(&self, category: TaskCategory) -> bool {
        self.registry.slots.lock().contains_key(&category)
    }

    pub fn active_count(&self) -> usize {
        self.registry.slots.lock().len()
    }
}

/// Handle to one started operation. Dropping it cancels the operation if it
/// is still running and frees its category slot.
pub struct TaskHandle<T> {
    category: TaskCategory,
    generation: u64,
    token: CancellationToken,
    superseded: Arc<AtomicBool>,
    join: Option<JoinHandle<Option<T>>>,
    registry: Arc<Registry>,
}

impl<T> TaskHandle<T> {
    pub fn category(&self) -> TaskCategory {
        self.category
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// True once a newer operation of the same category has replaced this one.
    pub fn is_superseded(&self) -> bool {
        self.superseded.load(Ordering::SeqCst)
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Waits for the operation. An output that arrives after cancellation is
    /// discarded. Joining a second time reports `Cancelled`.
    pub async fn join(&mut self) -> TaskOutcome<T> {
        let Some(join) = self.join.take() else {
            return TaskOutcome::Cancelled;
        };
        match join.await {
            Ok(Some(output)) if !self.token.is_cancelled() => TaskOutcome::Completed(output),
            Ok(_) => self.stopped(),
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(_) => self.stopped(),
        }
    }

    fn stopped(&self) -> TaskOutcome<T> {
        if self.is_superseded() {
            TaskOutcome::Superseded
        } else {
            TaskOutcome::Cancelled
        }
    }
}

impl<T> Drop for TaskHandle<T> {
    fn drop(&mut self) {
        if self.join.is_some() {
            self.token.cancel();
        }
        self.registry.release(self.category, self.generation);
    }
}
