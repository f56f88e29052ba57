use crate::scroll::ScrollViewport;

/// Nominal height of one rendered row, so the near-bottom threshold is
/// expressed in the same units for every viewport.
pub const ROW_HEIGHT: f32 = 16.0;

/// The open conversation as a scrollable block of formatted lines.
pub struct ChatPane {
    pub conversation_id: Option<String>,
    pub title: String,
    pub lines: Vec<String>,        // Formatted display lines
    pub scroll_offset: usize,      // First visible row
    pub viewport_rows: usize,
}

impl ChatPane {
    pub fn new(viewport_rows: usize) -> Self {
        Self {
            conversation_id: None,
            title: String::from("No conversation selected"),
            lines: Vec::new(),
            scroll_offset: 0,
            viewport_rows: viewport_rows.max(1),
        }
    }

    pub fn open(&mut self, conversation_id: &str, title: &str) {
        self.clear();
        self.conversation_id = Some(conversation_id.to_string());
        self.title = title.to_string();
    }

    pub fn clear(&mut self) {
        self.conversation_id = None;
        self.title = String::from("No conversation selected");
        self.lines.clear();
        self.scroll_offset = 0;
    }

    pub fn is_showing(&self, conversation_id: &str) -> bool {
        self.conversation_id.as_deref() == Some(conversation_id)
    }

    pub fn set_lines(&mut self, lines: Vec<String>) {
        self.lines = lines;
        self.scroll_offset = self.scroll_offset.min(self.max_offset());
    }

    pub fn max_offset(&self) -> usize {
        self.lines.len().saturating_sub(self.viewport_rows)
    }

    pub fn scroll_up(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_sub(3);
    }

    pub fn scroll_down(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_add(3).min(self.max_offset());
    }

    pub fn visible_lines(&self) -> &[String] {
        let start = self.scroll_offset.min(self.lines.len());
        let end = (start + self.viewport_rows).min(self.lines.len());
        &self.lines[start..end]
    }

    /// Header line with the scroll position when the content overflows.
    pub fn header_text(&self) -> String {
        if self.lines.len() <= self.viewport_rows {
            return self.title.clone();
        }
        let last = (self.scroll_offset + self.viewport_rows).min(self.lines.len());
        format!(
            "{} [{}-{}/{}]",
            self.title,
            self.scroll_offset + 1,
            last,
            self.lines.len()
        )
    }
}

impl ScrollViewport for ChatPane {
    fn scroll_top(&self) -> f32 {
        self.scroll_offset as f32 * ROW_HEIGHT
    }

    fn scroll_height(&self) -> f32 {
        self.lines.len() as f32 * ROW_HEIGHT
    }

    fn client_height(&self) -> f32 {
        self.viewport_rows as f32 * ROW_HEIGHT
    }

    fn set_scroll_top(&mut self, value: f32) {
        let rows = (value.max(0.0) / ROW_HEIGHT).round() as usize;
        self.scroll_offset = rows.min(self.max_offset());
    }
}
