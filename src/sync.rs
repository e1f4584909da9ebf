//! Timer driven refresh of the active room.

use crate::models::{RoomId, RoomSnapshot};
use crate::session::SessionStore;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub type SharedSession = Arc<Mutex<SessionStore>>;

/// Default time between two reads of the shared store.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Runs `f` against the session on the blocking pool. Store access does
/// file I/O and may sleep waiting on another writer's lock.
pub async fn with_session<T, F>(session: &SharedSession, f: F) -> Option<T>
where
    F: FnOnce(&mut SessionStore) -> T + Send + 'static,
    T: Send + 'static,
{
    let session = session.clone();
    match tokio::task::spawn_blocking(move || f(&mut session.lock())).await {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("session task failed: {e}");
            None
        }
    }
}

/// Running poll loop for one room. Dropping the handle stops the loop.
pub struct SyncHandle {
    room: RoomId,
    updates: watch::Receiver<RoomSnapshot>,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

/// Starts polling `room`. The first refresh happens immediately; every
/// snapshot that differs from the previous one is published on
/// [`SyncHandle::updates`].
pub fn start(session: SharedSession, room: RoomId, period: Duration) -> SyncHandle {
    let initial = session.lock().snapshot().clone();
    let (tx, rx) = watch::channel(initial);
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
    let task_room = room.clone();

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        log::info!("polling {task_room} every {period:?}");
        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                _ = ticker.tick() => {
                    let room = task_room.clone();
                    let Some(snapshot) = with_session(&session, move |s| s.refresh(&room)).await else {
                        continue;
                    };
                    tx.send_if_modified(|current| {
                        if *current == snapshot {
                            return false;
                        }
                        *current = snapshot;
                        true
                    });
                }
            }
        }
        log::info!("stopped polling {task_room}");
    });

    SyncHandle { room, updates: rx, stop: Some(stop_tx), task: Some(task) }
}

impl SyncHandle {
    pub fn room(&self) -> &RoomId {
        &self.room
    }

    pub fn updates(&self) -> watch::Receiver<RoomSnapshot> {
        self.updates.clone()
    }

    /// Stops the loop and waits for it to finish its current refresh.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                log::warn!("poll task for {} ended abnormally: {e}", self.room);
            }
        }
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}
