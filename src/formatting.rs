use chrono::{DateTime, Local, Utc};
use regex::Regex;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::models::{Contact, Conversation, Direction, Message, MessagePayload};

pub const NO_MORE_CONVERSATIONS: &str = "No more conversations";
pub const START_OF_CONVERSATION: &str = "Start of the conversation";
pub const NO_MESSAGES: &str = "There are no messages...";

/// Shorten long URLs in text by truncating
pub fn shorten_urls(text: &str, max_len: usize) -> String {
    let Ok(url_regex) = Regex::new(r"https?://[^\s]+") else {
        return text.to_string();
    };

    let mut result = text.to_string();
    for cap in url_regex.find_iter(text) {
        let url = cap.as_str();
        if url.chars().count() > max_len {
            let truncate_at = url
                .char_indices()
                .nth(max_len)
                .map(|(i, _)| i)
                .unwrap_or(url.len());
            let shortened = format!("{}...", &url[..truncate_at]);
            result = result.replace(url, &shortened);
        }
    }

    result
}

/// Cut `text` to at most `width` terminal columns, marking the cut with "...".
pub fn truncate_to_width(text: &str, width: usize) -> String {
    if text.width() <= width {
        return text.to_string();
    }
    let budget = width.saturating_sub(3);
    let mut out = String::new();
    let mut used = 0;
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        out.push(c);
    }
    out.push_str("...");
    out
}

/// Wrap text into lines of at most `width` columns. Continuation lines are
/// indented by `indent` columns.
pub fn wrap_text(text: &str, indent: usize, width: usize) -> Vec<String> {
    if width <= indent + 1 {
        return vec![text.to_string()];
    }
    let pad = " ".repeat(indent);
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();

    let flush = |current: &mut String, lines: &mut Vec<String>| {
        if lines.is_empty() {
            lines.push(std::mem::take(current));
        } else {
            lines.push(format!("{}{}", pad, std::mem::take(current)));
        }
    };

    for paragraph in text.split('\n') {
        for word in paragraph.split(' ').filter(|w| !w.is_empty()) {
            let limit = if lines.is_empty() { width } else { width - indent };
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{} {}", current, word)
            };

            if candidate.width() <= limit {
                current = candidate;
                continue;
            }
            if !current.is_empty() {
                flush(&mut current, &mut lines);
            }
            // Words wider than a whole line are split by columns
            let limit = width - indent;
            let mut chunk = String::new();
            for c in word.chars() {
                if chunk.width() + c.width().unwrap_or(0) > limit {
                    flush(&mut chunk, &mut lines);
                }
                chunk.push(c);
            }
            current = chunk;
        }
        flush(&mut current, &mut lines);
    }

    lines
}

/// Format timestamp for display
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    let datetime: DateTime<Local> = timestamp.with_timezone(&Local);

    let now = Local::now();
    if datetime.date_naive() == now.date_naive() {
        datetime.format("%H:%M").to_string()
    } else {
        datetime.format("%Y-%m-%d %H:%M").to_string()
    }
}

pub fn payload_text(payload: &MessagePayload) -> String {
    match payload {
        MessagePayload::Text { text } => text.clone(),
        MessagePayload::Image { image_url } => format!("[image] {}", image_url),
        MessagePayload::Unsupported { kind } => format!("[{} message]", kind),
    }
}

fn sender_label<'a>(message: &Message, conversation: &'a Conversation, bot_name: &'a str) -> &'a str {
    match message.direction {
        Direction::Incoming => conversation.display_name(),
        Direction::Outgoing => bot_name,
    }
}

/// Lines of the open conversation, oldest first.
pub fn format_thread(
    conversation: &Conversation,
    bot_name: &str,
    show_timestamps: bool,
    width: usize,
) -> Vec<String> {
    if conversation.messages.is_empty() {
        return vec![NO_MESSAGES.to_string()];
    }

    let mut lines = Vec::with_capacity(conversation.messages.len() + 1);
    if conversation.has_older_messages() {
        lines.push("(/older for earlier messages)".to_string());
    } else {
        lines.push(format!("--- {} ---", START_OF_CONVERSATION));
    }

    for message in &conversation.messages {
        let mut prefix = String::new();
        if show_timestamps {
            prefix.push_str(&format!("[{}] ", format_timestamp(message.created_at)));
        }
        let marker = match message.direction {
            Direction::Incoming => "<",
            Direction::Outgoing => ">",
        };
        prefix.push_str(&format!("{} {}: ", marker, sender_label(message, conversation, bot_name)));

        let text = shorten_urls(&payload_text(&message.payload), 60);
        let indent = prefix.width();
        lines.extend(wrap_text(&format!("{}{}", prefix, text), indent, width));
    }

    lines
}

/// One row of the conversation list: position, name, last message and time.
pub fn format_conversation_row(position: usize, conversation: &Conversation, width: usize) -> String {
    let preview = conversation
        .messages
        .last()
        .map(|m| payload_text(&m.payload).replace('\n', " "))
        .unwrap_or_default();
    let time = format_timestamp(conversation.updated_at);
    let head = format!("{:>3}. {}", position, conversation.display_name());

    let budget = width.saturating_sub(head.width() + time.width() + 4);
    if budget < 4 || preview.is_empty() {
        return format!("{}  {}", head, time);
    }
    format!("{}: {}  {}", head, truncate_to_width(&preview, budget), time)
}

pub fn format_conversation_list(conversations: &[Conversation], has_more: bool, width: usize) -> Vec<String> {
    let mut lines: Vec<String> = conversations
        .iter()
        .enumerate()
        .map(|(i, c)| format_conversation_row(i + 1, c, width))
        .collect();

    if has_more {
        lines.push("(/more to load more conversations)".to_string());
    } else {
        lines.push(NO_MORE_CONVERSATIONS.to_string());
    }
    lines
}

pub fn format_contact(contact: &Contact) -> String {
    let mut line = format!("{} ({})", contact.name, contact.id);
    if let Some(phone) = &contact.phone {
        line.push_str(&format!(" {}", phone));
    }
    if let Some(about) = &contact.about {
        line.push_str(&format!(" - {}", about));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pager::Cursor;
    use crate::testing::{conversation, message};

    #[test]
    fn test_shorten_urls() {
        let text =
            "Check this out: https://example.com/very/long/path/that/should/be/shortened/here";
        let result = shorten_urls(text, 30);
        assert!(result.contains("..."));
        assert!(result.len() < text.len());
    }

    #[test]
    fn test_wrap_text() {
        let text = "This is a longer text that should be wrapped at word boundaries properly";
        let lines = wrap_text(text, 10, 40);
        assert!(lines.len() > 1);
        for line in &lines {
            assert!(line.width() <= 40, "Line too long: {}", line);
        }
        assert!(lines[1].starts_with("          "));
    }

    #[test]
    fn test_wrap_splits_long_words() {
        let lines = wrap_text(&"x".repeat(25), 0, 10);
        assert_eq!(lines, vec!["x".repeat(10), "x".repeat(10), "x".repeat(5)]);
    }

    #[test]
    fn test_truncate_counts_wide_chars() {
        assert_eq!(truncate_to_width("hello", 10), "hello");
        assert_eq!(truncate_to_width("hello world", 8), "hello...");
        // CJK characters take two columns each
        assert_eq!(truncate_to_width("日本語のテキスト", 9), "日本語...");
    }

    #[test]
    fn test_thread_labels() {
        let mut conv = conversation("c1", "whatsapp", 1);
        assert_eq!(format_thread(&conv, "Bot", false, 80), vec![NO_MESSAGES]);

        conv.messages = vec![
            message("m1", "c1", 1, Direction::Incoming, "u1"),
            message("m2", "c1", 2, Direction::Outgoing, "bot"),
        ];
        conv.participant_name = Some("Ana".to_string());
        conv.message_cursor = Some(Cursor::after(None));

        let lines = format_thread(&conv, "Bot", false, 80);
        assert_eq!(lines[0], format!("--- {} ---", START_OF_CONVERSATION));
        assert_eq!(lines[1], "< Ana: text of m1");
        assert_eq!(lines[2], "> Bot: text of m2");
    }

    #[test]
    fn test_list_footer() {
        let lines = format_conversation_list(&[], false, 80);
        assert_eq!(lines, vec![NO_MORE_CONVERSATIONS]);

        let conv = conversation("c1", "whatsapp", 1);
        let lines = format_conversation_list(&[conv], true, 80);
        assert!(lines[0].starts_with("  1. unknown participant"));
        assert!(lines[1].contains("/more"));
    }

    #[test]
    fn test_payload_text() {
        assert_eq!(payload_text(&MessagePayload::text("hi")), "hi");
        let other = MessagePayload::Unsupported {
            kind: "carousel".to_string(),
        };
        assert_eq!(payload_text(&other), "[carousel message]");
    }
}
