use crate::{
    error::{ArtifyError, Result},
    models::GeneratedImage,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use uuid::Uuid;

pub type Completion = Result<Vec<GeneratedImage>>;

struct PendingRequest {
    seq: u64,
    expected: usize,
    received: Vec<GeneratedImage>,
    sink: oneshot::Sender<Completion>,
}

#[derive(Default)]
struct PendingState {
    entries: HashMap<Uuid, PendingRequest>,
    next_seq: u64,
}

/// In-flight requests keyed by task UUID.
///
/// An entry is removed from the map before its sink is completed, so every
/// sink fires at most once.
#[derive(Default)]
pub struct PendingRequests {
    state: Mutex<PendingState>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(
        &self,
        task_uuid: Uuid,
        expected: usize,
    ) -> Result<oneshot::Receiver<Completion>> {
        let mut state = self.state.lock().await;
        if state.entries.contains_key(&task_uuid) {
            return Err(ArtifyError::ValidationError(format!(
                "Task {} is already in flight",
                task_uuid
            )));
        }

        let (sink, receiver) = oneshot::channel();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.entries.insert(
            task_uuid,
            PendingRequest {
                seq,
                expected: expected.max(1),
                received: Vec::new(),
                sink,
            },
        );
        Ok(receiver)
    }

    /// Records one result. Returns `false` when no request is waiting for it.
    pub async fn deliver(&self, task_uuid: &Uuid, image: GeneratedImage) -> bool {
        let mut state = self.state.lock().await;
        let Some(entry) = state.entries.get_mut(task_uuid) else {
            return false;
        };

        entry.received.push(image);
        if entry.received.len() >= entry.expected {
            if let Some(done) = state.entries.remove(task_uuid) {
                if done.sink.send(Ok(done.received)).is_err() {
                    log::debug!("Caller for task {} is no longer waiting", task_uuid);
                }
            }
        }
        true
    }

    pub async fn reject(&self, task_uuid: &Uuid, error: ArtifyError) -> bool {
        let entry = self.state.lock().await.entries.remove(task_uuid);
        match entry {
            Some(entry) => {
                let _ = entry.sink.send(Err(error));
                true
            }
            None => false,
        }
    }

    /// Rejects the earliest registered request, if any.
    pub async fn reject_oldest(&self, error: ArtifyError) -> Option<Uuid> {
        let mut state = self.state.lock().await;
        let oldest = state
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.seq)
            .map(|(id, _)| *id)?;

        let entry = state.entries.remove(&oldest)?;
        let _ = entry.sink.send(Err(error));
        Some(oldest)
    }

    pub async fn reject_all<F>(&self, make_error: F) -> usize
    where
        F: Fn() -> ArtifyError,
    {
        let drained: Vec<PendingRequest> = {
            let mut state = self.state.lock().await;
            state.entries.drain().map(|(_, entry)| entry).collect()
        };

        let count = drained.len();
        for entry in drained {
            let _ = entry.sink.send(Err(make_error()));
        }
        count
    }

    /// Drops a request without completing it, e.g. after a timeout.
    pub async fn remove(&self, task_uuid: &Uuid) -> bool {
        self.state.lock().await.entries.remove(task_uuid).is_some()
    }

    pub async fn contains(&self, task_uuid: &Uuid) -> bool {
        self.state.lock().await.entries.contains_key(task_uuid)
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Drops a task's entry when the caller waiting on it goes away.
///
/// Disarm it once the task has completed.
pub struct PendingGuard {
    pending: Arc<PendingRequests>,
    task_uuid: Uuid,
    armed: bool,
}

impl PendingGuard {
    pub fn new(pending: Arc<PendingRequests>, task_uuid: Uuid) -> Self {
        Self {
            pending,
            task_uuid,
            armed: true,
        }
    }

    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let task_uuid = self.task_uuid;
        if let Ok(mut state) = self.pending.state.try_lock() {
            if state.entries.remove(&task_uuid).is_some() {
                log::debug!("Task {} abandoned by its caller", task_uuid);
            }
            return;
        }

        // Table busy: finish the removal on the runtime.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let pending = self.pending.clone();
            handle.spawn(async move {
                if pending.remove(&task_uuid).await {
                    log::debug!("Task {} abandoned by its caller", task_uuid);
                }
            });
        }
    }
}
