//! Background timers driving the sync engine and the open conversation.
//!
//! Each poller sleeps only after its previous round finished, so rounds never
//! overlap. Results are queued for the front end, which drains them on its
//! own tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::error::ApiError;
use crate::session::Liveness;
use crate::sync::{ConversationSync, CycleOutcome};
use crate::thread::MessageLoader;

/// Updates produced in the background
#[derive(Debug, Clone, PartialEq)]
pub enum SyncUpdate {
    Conversations(CycleOutcome),
    Messages {
        conversation_id: String,
        result: Result<usize, ApiError>,
    },
}

pub type UpdateQueue = Arc<Mutex<Vec<SyncUpdate>>>;

/// Take everything queued so far.
pub async fn drain(queue: &UpdateQueue) -> Vec<SyncUpdate> {
    let mut pending = queue.lock().await;
    std::mem::take(&mut *pending)
}

pub fn spawn_conversation_poller(
    sync: Arc<ConversationSync>,
    interval: Duration,
    liveness: Liveness,
    queue: UpdateQueue,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        crate::info_log!("poller: conversations every {:?}", interval);
        while liveness.is_alive() {
            let outcome = sync.poll_cycle().await;
            if !liveness.is_alive() {
                break;
            }
            match outcome {
                CycleOutcome::Unchanged | CycleOutcome::Skipped | CycleOutcome::Discarded => {}
                other => queue.lock().await.push(SyncUpdate::Conversations(other)),
            }
            tokio::time::sleep(interval).await;
        }
        crate::debug_log!("poller: conversation poller stopped");
    })
}

/// Poll the newest message page of whatever conversation is `selected`.
pub fn spawn_message_poller(
    loader: Arc<MessageLoader>,
    selected: Arc<Mutex<Option<String>>>,
    interval: Duration,
    liveness: Liveness,
    queue: UpdateQueue,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        crate::info_log!("poller: open conversation every {:?}", interval);
        loop {
            tokio::time::sleep(interval).await;
            if !liveness.is_alive() {
                break;
            }
            let Some(conversation_id) = selected.lock().await.clone() else {
                continue;
            };

            let result = loader.refresh(&conversation_id).await;
            if !liveness.is_alive() {
                break;
            }
            if matches!(result, Ok(0)) {
                continue;
            }
            queue.lock().await.push(SyncUpdate::Messages {
                conversation_id,
                result,
            });
        }
        crate::debug_log!("poller: message poller stopped");
    })
}
