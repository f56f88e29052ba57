//! Periodic conversation synchronization.
//!
//! One cycle fetches the first conversation page, diffs it against what is
//! held, enriches only the changed conversations and merges them back in.
//! Nothing is mutated when the diff comes back empty.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Mutex;

use crate::client::RemoteClient;
use crate::config::Settings;
use crate::contacts::ContactResolver;
use crate::error::ApiError;
use crate::merge::{merge_messages, MergeDirection};
use crate::models::{Conversation, UNKNOWN_PARTICIPANT};
use crate::pager::{self, Cursor};
use crate::session::Liveness;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Fetching,
    Diffing,
    Enriching,
    Merging,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Another cycle was still running.
    Skipped,
    Unchanged,
    Updated { changed: usize },
    Failed(ApiError),
    /// The session ended while the cycle was in flight.
    Discarded,
}

/// The held conversation collection and the top-level cursor.
///
/// `revision` moves on every mutation, so observers can tell whether a
/// re-render is needed. Ids deleted during the session are remembered so a
/// poll that was already in flight cannot bring them back.
#[derive(Debug, Default)]
pub struct ConversationStore {
    conversations: Vec<Conversation>,
    cursor: Cursor,
    revision: u64,
    deleted: HashSet<String>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| c.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn bump(&mut self) {
        self.revision += 1;
    }

    pub fn insert(&mut self, conversation: Conversation) {
        match self.get_mut(&conversation.id) {
            Some(held) => *held = conversation,
            None => self.conversations.push(conversation),
        }
        self.bump();
    }

    fn remove(&mut self, id: &str) -> bool {
        self.deleted.insert(id.to_string());
        let before = self.conversations.len();
        self.conversations.retain(|c| c.id != id);
        before != self.conversations.len()
    }

    pub fn is_deleted(&self, id: &str) -> bool {
        self.deleted.contains(id)
    }

    /// Conversations in display order: most recently updated first, one row per id.
    pub fn display_order(&self) -> Vec<&Conversation> {
        let mut seen = HashSet::new();
        let mut rows: Vec<&Conversation> = self
            .conversations
            .iter()
            .filter(|c| seen.insert(c.id.as_str()))
            .collect();
        rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        rows
    }
}

/// Conversations fetched from one page, with their first message page loaded.
struct FetchedPage {
    conversations: Vec<Conversation>,
    cursor: Cursor,
}

/// Conversations whose id is unseen or whose update time or newest page size moved.
pub fn diff_conversations(held: &[Conversation], fetched: Vec<Conversation>) -> Vec<Conversation> {
    fetched
        .into_iter()
        .filter(|c| match held.iter().find(|h| h.id == c.id) {
            None => true,
            Some(h) => h.updated_at != c.updated_at || h.latest_page_len != c.latest_page_len,
        })
        .collect()
}

/// Merge polled conversations into the store: matching ids are updated in
/// place, unseen ids are appended. Held messages are kept and the polled page
/// is merged on top of them.
fn merge_polled(store: &mut ConversationStore, polled: Vec<Conversation>) {
    for mut incoming in polled {
        if store.is_deleted(&incoming.id) {
            crate::debug_log!("sync: dropping deleted conversation {}", incoming.id);
            continue;
        }
        match store.get_mut(&incoming.id) {
            Some(held) => {
                let messages = std::mem::take(&mut incoming.messages);
                held.messages = merge_messages(&held.messages, messages, MergeDirection::Append);
                held.integration = incoming.integration;
                held.updated_at = incoming.updated_at;
                held.latest_page_len = incoming.latest_page_len;
                if incoming.participant_name.is_some() {
                    held.participant_id = incoming.participant_id;
                    held.participant_name = incoming.participant_name;
                }
                if held.message_cursor.is_none() {
                    held.message_cursor = incoming.message_cursor;
                }
            }
            None => store.conversations.push(incoming),
        }
    }
}

struct CycleGuard<'a> {
    sync: &'a ConversationSync,
}

impl<'a> CycleGuard<'a> {
    fn acquire(sync: &'a ConversationSync) -> Option<Self> {
        sync.cycle_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { sync })
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.sync.set_phase(SyncPhase::Idle);
        self.sync.cycle_running.store(false, Ordering::SeqCst);
    }
}

pub struct ConversationSync {
    client: Arc<dyn RemoteClient>,
    resolver: ContactResolver,
    channel: String,
    hide_empty: bool,
    store: Arc<Mutex<ConversationStore>>,
    cycle_running: AtomicBool,
    phase: std::sync::Mutex<SyncPhase>,
    liveness: Liveness,
}

impl ConversationSync {
    pub fn new(
        client: Arc<dyn RemoteClient>,
        resolver: ContactResolver,
        settings: &Settings,
        liveness: Liveness,
    ) -> Self {
        Self {
            client,
            resolver,
            channel: settings.channel.clone(),
            hide_empty: settings.hide_empty_conversations,
            store: Arc::new(Mutex::new(ConversationStore::new())),
            cycle_running: AtomicBool::new(false),
            phase: std::sync::Mutex::new(SyncPhase::Idle),
            liveness,
        }
    }

    pub fn store(&self) -> Arc<Mutex<ConversationStore>> {
        self.store.clone()
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase.lock().map(|p| *p).unwrap_or(SyncPhase::Idle)
    }

    fn set_phase(&self, phase: SyncPhase) {
        if let Ok(mut current) = self.phase.lock() {
            *current = phase;
        }
    }

    pub async fn revision(&self) -> u64 {
        self.store.lock().await.revision()
    }

    pub async fn has_more_conversations(&self) -> bool {
        self.store.lock().await.cursor().has_more()
    }

    /// Snapshot of the held conversations in display order.
    pub async fn display_conversations(&self) -> Vec<Conversation> {
        self.store
            .lock()
            .await
            .display_order()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Run one polling cycle.
    pub async fn poll_cycle(&self) -> CycleOutcome {
        let _guard = match CycleGuard::acquire(self) {
            Some(guard) => guard,
            None => {
                crate::debug_log!("sync: cycle already running, skipping");
                return CycleOutcome::Skipped;
            }
        };
        if !self.liveness.is_alive() {
            return CycleOutcome::Discarded;
        }

        self.set_phase(SyncPhase::Fetching);
        let fetched = match self.fetch_page(&Cursor::new()).await {
            Ok(page) => page,
            Err(e) => {
                crate::warn_log!("sync: fetching conversations failed: {}", e);
                return CycleOutcome::Failed(e);
            }
        };
        if !self.liveness.is_alive() {
            crate::debug_log!("sync: session ended during fetch, discarding");
            return CycleOutcome::Discarded;
        }

        self.set_phase(SyncPhase::Diffing);
        let (changed, first_cycle) = {
            let store = self.store.lock().await;
            let live: Vec<Conversation> = fetched
                .conversations
                .into_iter()
                .filter(|c| !store.is_deleted(&c.id))
                .collect();
            (
                diff_conversations(&store.conversations, live),
                store.cursor().is_fresh(),
            )
        };
        if changed.is_empty() && !first_cycle {
            crate::debug_log!("sync: no changes");
            return CycleOutcome::Unchanged;
        }
        crate::debug_log!("sync: {} changed conversations", changed.len());

        self.set_phase(SyncPhase::Enriching);
        let enriched = self.enrich(changed).await;
        if !self.liveness.is_alive() {
            crate::debug_log!("sync: session ended during enrichment, discarding");
            return CycleOutcome::Discarded;
        }

        self.set_phase(SyncPhase::Merging);
        let count = enriched.len();
        let mut store = self.store.lock().await;
        if !self.liveness.is_alive() {
            crate::debug_log!("sync: session ended before merge, discarding");
            return CycleOutcome::Discarded;
        }
        merge_polled(&mut store, enriched);
        if store.cursor().is_fresh() {
            store.cursor = fetched.cursor;
        }
        store.bump();
        crate::info_log!("sync: merged {} conversations, holding {}", count, store.len());
        CycleOutcome::Updated { changed: count }
    }

    /// Fetch the next conversation page and append the ones not held yet.
    pub async fn load_more(&self) -> Result<usize, ApiError> {
        let cursor = self.store.lock().await.cursor().clone();
        if !cursor.has_more() {
            return Ok(0);
        }

        let fetched = self.fetch_page(&cursor).await?;
        let fresh: Vec<Conversation> = {
            let store = self.store.lock().await;
            fetched
                .conversations
                .into_iter()
                .filter(|c| !store.contains(&c.id) && !store.is_deleted(&c.id))
                .collect()
        };
        let enriched = self.enrich(fresh).await;
        if !self.liveness.is_alive() {
            return Ok(0);
        }

        let mut store = self.store.lock().await;
        let mut added = 0;
        for conversation in enriched {
            if !store.contains(&conversation.id) && !store.is_deleted(&conversation.id) {
                store.conversations.push(conversation);
                added += 1;
            }
        }
        store.cursor = fetched.cursor;
        store.bump();
        crate::info_log!("sync: load_more added {} conversations", added);
        Ok(added)
    }

    /// Delete remotely, then drop the conversation locally. A failed call
    /// leaves it in place.
    pub async fn delete_conversation(&self, id: &str) -> Result<(), ApiError> {
        self.client.delete_conversation(id).await?;
        let mut store = self.store.lock().await;
        if !self.liveness.is_alive() {
            return Ok(());
        }
        if store.remove(id) {
            store.bump();
        }
        Ok(())
    }

    /// Most recently updated conversation held with `participant_id`.
    pub async fn conversation_for_participant(&self, participant_id: &str) -> Option<String> {
        let store = self.store.lock().await;
        store
            .display_order()
            .into_iter()
            .find(|c| c.participant_id.as_deref() == Some(participant_id))
            .map(|c| c.id.clone())
    }

    async fn fetch_page(&self, cursor: &Cursor) -> Result<FetchedPage, ApiError> {
        let client = &self.client;
        let (conversations, next) = pager::fetch_next(cursor, |token| async move {
            client.list_conversations(token.as_deref()).await
        })
        .await?;

        let in_channel: Vec<Conversation> = conversations
            .into_iter()
            .filter(|c| c.integration == self.channel)
            .collect();

        let loads = in_channel.into_iter().map(|mut conversation| async move {
            let page = client.list_messages(&conversation.id, None).await?;
            conversation.latest_page_len = page.items.len();
            conversation.messages = merge_messages(&[], page.items, MergeDirection::Append);
            conversation.message_cursor = Some(Cursor::after(page.next_token));
            Ok::<_, ApiError>(conversation)
        });
        let mut loaded = join_all(loads)
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;

        if self.hide_empty {
            loaded.retain(|c| !c.messages.is_empty());
        }
        Ok(FetchedPage {
            conversations: loaded,
            cursor: next,
        })
    }

    /// Label each conversation with the participant of its latest incoming message.
    async fn enrich(&self, mut conversations: Vec<Conversation>) -> Vec<Conversation> {
        let mut ids: Vec<String> = Vec::new();
        for conversation in &conversations {
            if let Some(m) = conversation.latest_incoming() {
                if !ids.contains(&m.participant_id) {
                    ids.push(m.participant_id.clone());
                }
            }
        }

        let results = join_all(ids.iter().map(|id| self.resolver.resolve(id))).await;
        let names: HashMap<String, String> = ids
            .into_iter()
            .zip(results)
            .filter_map(|(id, result)| result.ok().map(|contact| (id, contact.name)))
            .collect();

        for conversation in &mut conversations {
            let participant = conversation.latest_incoming().map(|m| m.participant_id.clone());
            let Some(participant) = participant else {
                continue;
            };
            match names.get(&participant) {
                Some(name) => {
                    conversation.participant_name = Some(name.clone());
                    conversation.participant_id = Some(participant);
                }
                None => {
                    conversation.participant_name = Some(UNKNOWN_PARTICIPANT.to_string());
                    conversation.participant_id = None;
                }
            }
        }
        conversations
    }
}
