use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::Line,
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
    Frame,
};
use tokio::sync::Mutex;

use crate::config::Config;
use crate::contacts::{ContactBook, ContactResolver};
use crate::error::ApiError;
use crate::formatting::{format_contact, format_conversation_list, format_thread, NO_MORE_CONVERSATIONS};
use crate::models::Conversation;
use crate::notice::{NoticeBoard, NoticeKind};
use crate::poller::{self, SyncUpdate, UpdateQueue};
use crate::retry::RetryConfig;
use crate::scroll::{scroll_to_bottom, ScrollController, ScrollMode};
use crate::session::Session;
use crate::sync::{ConversationSync, CycleOutcome};
use crate::thread::MessageLoader;
use crate::widgets::ChatPane;

pub const BOT_NAME_LOADING: &str = "Loading";

pub struct App {
    pub config: Config,
    pub session: Session,
    pub sync: Arc<ConversationSync>,
    pub loader: Arc<MessageLoader>,
    pub contacts: ContactBook,
    pub notices: NoticeBoard,
    pub pane: ChatPane,
    pub scroll: ScrollController,
    pub selected: Arc<Mutex<Option<String>>>, // Conversation the message poller follows
    pub updates: UpdateQueue,
    pub bot_name: String,
    pub conversations: Vec<Conversation>, // Display-order snapshot of the store
    pub has_more: bool,
    pub open_conversation: Option<Conversation>,
    pub selected_idx: usize,
    pub focus_on_list: bool,
    pub input_buffer: String,
    pub input_cursor: usize, // Cursor byte position in input_buffer
    pub pane_width: usize,
    pub needs_redraw: bool,
    pub should_quit: bool,
}

impl App {
    pub async fn new() -> Result<Self> {
        let config = Config::load()?;
        let session = Session::from_config(&config);
        Ok(Self::with_session(config, session))
    }

    /// Wire the sync core onto an existing session.
    pub fn with_session(config: Config, session: Session) -> Self {
        let settings = &config.settings;
        let contacts = ContactBook::new();
        let resolver = ContactResolver::new(
            session.client(),
            &settings.channel,
            contacts.clone(),
            session.liveness(),
        );
        let sync = Arc::new(ConversationSync::new(
            session.client(),
            resolver,
            settings,
            session.liveness(),
        ));
        let loader = Arc::new(MessageLoader::new(
            session.client(),
            sync.store(),
            RetryConfig::from_settings(settings),
            session.liveness(),
        ));

        Self {
            notices: NoticeBoard::from_settings(settings),
            pane: ChatPane::new(settings.viewport_rows),
            scroll: ScrollController::new(settings.near_bottom_threshold),
            config,
            session,
            sync,
            loader,
            contacts,
            selected: Arc::new(Mutex::new(None)),
            updates: Arc::default(),
            bot_name: BOT_NAME_LOADING.to_string(),
            conversations: Vec::new(),
            has_more: true,
            open_conversation: None,
            selected_idx: 0,
            focus_on_list: true,
            input_buffer: String::new(),
            input_cursor: 0,
            pane_width: 80,
            needs_redraw: true,
            should_quit: false,
        }
    }

    /// Load bot info and start the background pollers.
    pub async fn start(&mut self) {
        self.load_bot_info().await;

        let settings = &self.config.settings;
        let conversations = poller::spawn_conversation_poller(
            self.sync.clone(),
            Duration::from_secs(settings.poll_interval_secs.max(1)),
            self.session.liveness(),
            self.updates.clone(),
        );
        self.session.attach(conversations);

        let messages = poller::spawn_message_poller(
            self.loader.clone(),
            self.selected.clone(),
            Duration::from_secs(settings.message_poll_interval_secs.max(1)),
            self.session.liveness(),
            self.updates.clone(),
        );
        self.session.attach(messages);
    }

    pub async fn load_bot_info(&mut self) {
        match self.session.client().get_bot(self.session.bot_id()).await {
            Ok(bot) if !bot.name.trim().is_empty() => self.bot_name = bot.name,
            Ok(_) => self.bot_name = self.session.bot_id().to_string(),
            Err(e) => {
                crate::warn_log!("bot info: {}", e);
                self.notices.error("Couldn't load bot info");
            }
        }
        self.needs_redraw = true;
    }

    fn report(&mut self, context: &str, err: &ApiError) {
        crate::warn_log!("{}: {}", context, err);
        self.notices.report(context, err);
        self.needs_redraw = true;
    }

    /// Re-read the conversation list and the open conversation from the store.
    pub async fn refresh_list(&mut self) {
        self.conversations = self.sync.display_conversations().await;
        self.has_more = self.sync.has_more_conversations().await;
        if self.selected_idx >= self.conversations.len() {
            self.selected_idx = self.conversations.len().saturating_sub(1);
        }
        self.needs_redraw = true;
    }

    async fn snapshot_open(&mut self) {
        let Some(id) = self.pane.conversation_id.clone() else {
            self.open_conversation = None;
            return;
        };
        let store = self.sync.store();
        let conversation = store.lock().await.get(&id).cloned();
        self.open_conversation = conversation;
    }

    /// Rebuild the pane lines from the open conversation, keeping the scroll
    /// position according to `mode`.
    fn relayout(&mut self, mode: ScrollMode) {
        let Some(conversation) = &self.open_conversation else {
            return;
        };
        let lines = format_thread(
            conversation,
            &self.bot_name,
            self.config.settings.show_timestamps,
            self.pane_width,
        );
        self.scroll.apply(&mut self.pane, mode, |pane| pane.set_lines(lines));
        self.needs_redraw = true;
    }

    pub async fn open_conversation(&mut self, conversation_id: &str) {
        let title = match self.conversations.iter().find(|c| c.id == conversation_id) {
            Some(c) => format!("{} ({})", c.display_name(), c.integration),
            None => conversation_id.to_string(),
        };
        self.pane.open(conversation_id, &title);
        *self.selected.lock().await = Some(conversation_id.to_string());
        self.focus_on_list = false;

        if let Err(e) = self.loader.open(conversation_id).await {
            self.report("Couldn't load messages", &e);
        }
        self.snapshot_open().await;
        self.relayout(ScrollMode::StickToBottom);
        scroll_to_bottom(&mut self.pane);
    }

    /// Open the conversation at `position` (1-based) in the list.
    pub async fn open_position(&mut self, position: usize) {
        let Some(id) = position
            .checked_sub(1)
            .and_then(|idx| self.conversations.get(idx))
            .map(|c| c.id.clone())
        else {
            self.notices.error(format!("No conversation #{}", position));
            return;
        };
        self.selected_idx = position - 1;
        self.open_conversation(&id).await;
    }

    pub async fn open_selected(&mut self) {
        self.open_position(self.selected_idx + 1).await;
    }

    pub async fn load_older(&mut self) {
        let Some(id) = self.pane.conversation_id.clone() else {
            self.notices.info("Open a conversation first");
            return;
        };
        match self.loader.load_older(&id).await {
            Ok(0) => {}
            Ok(_) => {
                self.snapshot_open().await;
                self.relayout(ScrollMode::PreservePosition);
            }
            Err(e) => self.report("Couldn't load older messages", &e),
        }
    }

    pub async fn reload(&mut self) {
        let Some(id) = self.pane.conversation_id.clone() else {
            self.refresh_list().await;
            return;
        };
        match self.loader.reload(&id).await {
            Ok(_) => {
                self.snapshot_open().await;
                self.relayout(ScrollMode::StickToBottom);
            }
            Err(e) => self.report("Couldn't reload messages", &e),
        }
    }

    pub async fn send_message(&mut self, text: &str) {
        let Some(id) = self.pane.conversation_id.clone() else {
            self.notices.info("Open a conversation first");
            return;
        };
        match self.loader.send_text(&id, text).await {
            Ok(_) => {
                self.snapshot_open().await;
                self.relayout(ScrollMode::StickToBottom);
                scroll_to_bottom(&mut self.pane);
            }
            Err(e) => self.report("Couldn't send message", &e),
        }
    }

    pub async fn send_custom(&mut self, conversation_id: &str, user_id: &str, text: &str) {
        match self.loader.send_custom(conversation_id, user_id, text).await {
            Ok(_) => {
                self.notices.success("Message sent");
                if self.pane.is_showing(conversation_id) {
                    self.snapshot_open().await;
                    self.relayout(ScrollMode::StickToBottom);
                }
            }
            Err(e) => self.report("Couldn't send message", &e),
        }
    }

    pub async fn delete_open(&mut self) {
        let Some(id) = self.pane.conversation_id.clone() else {
            self.notices.info("Open a conversation first");
            return;
        };
        match self.sync.delete_conversation(&id).await {
            Ok(()) => {
                self.pane.clear();
                self.open_conversation = None;
                *self.selected.lock().await = None;
                self.notices.success("Conversation deleted");
                self.refresh_list().await;
            }
            Err(e) => self.report("Couldn't delete conversation", &e),
        }
    }

    pub async fn load_more(&mut self) {
        if !self.has_more {
            self.notices.info(NO_MORE_CONVERSATIONS);
            return;
        }
        match self.sync.load_more().await {
            Ok(added) => {
                crate::debug_log!("load_more: {} conversations added", added);
                self.refresh_list().await;
            }
            Err(e) => self.report("Couldn't load more conversations", &e),
        }
    }

    /// Show matching contacts in the pane.
    pub async fn show_contacts(&mut self, term: &str) {
        let contacts = self.contacts.search(term).await;
        let mut lines: Vec<String> = contacts.iter().map(format_contact).collect();
        if lines.is_empty() {
            lines.push("No contacts".to_string());
        }
        self.pane.clear();
        self.pane.title = format!("Contacts ({})", contacts.len());
        self.pane.set_lines(lines);
        self.open_conversation = None;
        *self.selected.lock().await = None;
        self.needs_redraw = true;
    }

    /// Jump from a contact to its conversation.
    pub async fn open_contact(&mut self, contact_id: &str) {
        match self.sync.conversation_for_participant(contact_id).await {
            Some(id) => self.open_conversation(&id).await,
            None => {
                self.notices.error("conversation not found");
            }
        }
    }

    pub fn show_help(&mut self) {
        self.pane.clear();
        self.pane.title = "Help".to_string();
        self.pane.set_lines(
            crate::commands::HELP
                .lines()
                .map(str::to_string)
                .collect(),
        );
        self.open_conversation = None;
        self.needs_redraw = true;
    }

    /// Apply whatever the pollers queued. Returns true if the screen changed.
    pub async fn process_updates(&mut self) -> bool {
        let updates = poller::drain(&self.updates).await;
        let mut changed = self.notices.prune();

        for update in updates {
            match update {
                SyncUpdate::Conversations(CycleOutcome::Failed(e)) => {
                    self.report("Couldn't refresh conversations", &e);
                }
                SyncUpdate::Conversations(_) => {
                    self.refresh_list().await;
                    if self.open_conversation.is_some() {
                        self.snapshot_open().await;
                        self.relayout(ScrollMode::StickToBottom);
                    }
                }
                SyncUpdate::Messages {
                    conversation_id,
                    result: Ok(_),
                } => {
                    if self.pane.is_showing(&conversation_id) {
                        self.snapshot_open().await;
                        self.relayout(ScrollMode::StickToBottom);
                    }
                    self.refresh_list().await;
                }
                SyncUpdate::Messages { result: Err(e), .. } => {
                    self.report("Couldn't refresh messages", &e);
                }
            }
            changed = true;
        }

        if changed {
            self.needs_redraw = true;
        }
        changed
    }

    /// End the session: pollers stop and late results are dropped.
    pub fn logout(&mut self) {
        self.session.teardown();
        self.should_quit = true;
    }

    pub fn draw(&mut self, f: &mut Frame) {
        let outer = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(1)])
            .split(f.area());

        let total_width = outer[0].width;
        let list_width = (total_width.saturating_mul(35) / 100).max(20);
        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(list_width), Constraint::Min(0)])
            .split(outer[0]);

        self.draw_conversation_list(f, chunks[0]);
        self.draw_chat_pane(f, chunks[1]);
        self.draw_status(f, outer[1]);
    }

    fn draw_conversation_list(&self, f: &mut Frame, area: Rect) {
        let width = area.width.saturating_sub(2).max(1) as usize;
        let active_id = self.pane.conversation_id.as_deref();

        let items: Vec<ListItem> = if self.conversations.is_empty() && self.has_more {
            vec![ListItem::new("Loading conversations...").style(Style::default().fg(Color::DarkGray))]
        } else {
            format_conversation_list(&self.conversations, self.has_more, width)
                .into_iter()
                .enumerate()
                .map(|(idx, row)| {
                    let Some(conversation) = self.conversations.get(idx) else {
                        // Footer row
                        return ListItem::new(row).style(Style::default().fg(Color::DarkGray));
                    };
                    let mut style = Style::default();
                    if Some(conversation.id.as_str()) == active_id {
                        style = style.fg(Color::Yellow).add_modifier(Modifier::BOLD);
                    }
                    if self.focus_on_list && idx == self.selected_idx {
                        style = style.add_modifier(Modifier::REVERSED);
                    }
                    ListItem::new(row).style(style)
                })
                .collect()
        };

        let border_style = if self.focus_on_list {
            Style::default().fg(Color::Green)
        } else {
            Style::default()
        };
        let list = List::new(items).block(
            Block::default()
                .borders(Borders::ALL)
                .title("Conversations")
                .border_style(border_style),
        );
        f.render_widget(list, area);
    }

    fn draw_chat_pane(&mut self, f: &mut Frame, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(0),    // messages
                Constraint::Length(3), // input
            ])
            .split(area);

        // Keep the pane geometry in sync with the terminal
        let rows = chunks[1].height.saturating_sub(2).max(1) as usize;
        let width = chunks[1].width.saturating_sub(2).max(10) as usize;
        if rows != self.pane.viewport_rows {
            self.pane.viewport_rows = rows;
            self.pane.scroll_offset = self.pane.scroll_offset.min(self.pane.max_offset());
        }
        if width != self.pane_width {
            self.pane_width = width;
            self.relayout(ScrollMode::StickToBottom);
        }

        let header_style = if self.focus_on_list {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
        };
        let header = Paragraph::new(self.pane.header_text())
            .block(Block::default().borders(Borders::ALL))
            .style(header_style);
        f.render_widget(header, chunks[0]);

        let message_lines: Vec<Line> = self
            .pane
            .visible_lines()
            .iter()
            .map(|line| {
                if line.starts_with("> ") || line.contains("] > ") {
                    Line::from(line.clone()).style(Style::default().fg(Color::Green))
                } else if line.starts_with("---") || line.starts_with("(/") {
                    Line::from(line.clone()).style(
                        Style::default()
                            .fg(Color::DarkGray)
                            .add_modifier(Modifier::ITALIC),
                    )
                } else {
                    Line::from(line.clone())
                }
            })
            .collect();
        let messages = Paragraph::new(message_lines)
            .block(Block::default().borders(Borders::ALL).title("Messages"));
        f.render_widget(messages, chunks[1]);

        let mut input_text = self.input_buffer.clone();
        if !self.focus_on_list {
            let cursor_pos = self.input_cursor.min(input_text.len());
            input_text.insert(cursor_pos, '█');
        }
        let input_title = if self.focus_on_list {
            "Input (Tab to type)"
        } else {
            "Input (/help for commands)"
        };
        let input = Paragraph::new(input_text)
            .block(Block::default().borders(Borders::ALL).title(input_title))
            .wrap(Wrap { trim: false });
        f.render_widget(input, chunks[2]);
    }

    fn draw_status(&self, f: &mut Frame, area: Rect) {
        let (text, style) = match self.notices.active().last() {
            Some(notice) => {
                let color = match notice.kind {
                    NoticeKind::Info => Color::Cyan,
                    NoticeKind::Success => Color::Green,
                    NoticeKind::Error => Color::Red,
                    NoticeKind::RateLimited => Color::Magenta,
                };
                (
                    format!("{}  (Esc to dismiss)", notice.text),
                    Style::default().fg(color).add_modifier(Modifier::BOLD),
                )
            }
            None => (
                format!("Bot: {}", self.bot_name),
                Style::default().fg(Color::DarkGray),
            ),
        };
        f.render_widget(Paragraph::new(text).style(style), area);
    }

    pub fn handle_up(&mut self) {
        if self.focus_on_list {
            self.selected_idx = self.selected_idx.saturating_sub(1);
        } else {
            self.pane.scroll_up();
        }
    }

    pub fn handle_down(&mut self) {
        if self.focus_on_list {
            if self.selected_idx + 1 < self.conversations.len() {
                self.selected_idx += 1;
            }
        } else {
            self.pane.scroll_down();
        }
    }

    pub fn handle_page_up(&mut self) {
        for _ in 0..(self.pane.viewport_rows / 3).max(1) {
            self.pane.scroll_up();
        }
    }

    pub fn handle_page_down(&mut self) {
        for _ in 0..(self.pane.viewport_rows / 3).max(1) {
            self.pane.scroll_down();
        }
    }

    pub fn handle_tab(&mut self) {
        self.focus_on_list = !self.focus_on_list;
    }

    pub fn dismiss_notice(&mut self) {
        self.notices.dismiss_latest();
    }

    pub async fn handle_enter(&mut self) -> Result<()> {
        if self.focus_on_list {
            self.open_selected().await;
            return Ok(());
        }

        let text = std::mem::take(&mut self.input_buffer);
        self.input_cursor = 0;
        if text.trim().is_empty() {
            return Ok(());
        }
        if crate::commands::CommandHandler::handle(self, &text).await? {
            return Ok(());
        }
        self.send_message(&text).await;
        Ok(())
    }

    pub fn handle_char(&mut self, c: char) {
        let pos = self.input_cursor.min(self.input_buffer.len());
        self.input_buffer.insert(pos, c);
        self.input_cursor = pos + c.len_utf8();
    }

    pub fn handle_backspace(&mut self) {
        let pos = self.input_cursor.min(self.input_buffer.len());
        if pos == 0 {
            return;
        }
        let prev = self.input_buffer[..pos]
            .char_indices()
            .next_back()
            .map(|(i, _)| i)
            .unwrap_or(0);
        self.input_buffer.replace_range(prev..pos, "");
        self.input_cursor = prev;
    }

    pub fn handle_input_left(&mut self) {
        let pos = self.input_cursor.min(self.input_buffer.len());
        self.input_cursor = self.input_buffer[..pos]
            .char_indices()
            .next_back()
            .map(|(i, _)| i)
            .unwrap_or(0);
    }

    pub fn handle_input_right(&mut self) {
        let pos = self.input_cursor.min(self.input_buffer.len());
        self.input_cursor = self.input_buffer[pos..]
            .chars()
            .next()
            .map(|c| pos + c.len_utf8())
            .unwrap_or(pos);
    }
}
