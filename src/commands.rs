use anyhow::Result;

use crate::app::App;

pub const HELP: &str = "\
Commands:
  /list                 Focus the conversation list
  /more                 Load the next page of conversations
  /open N|ID            Open conversation by list position or id
  /older                Load earlier messages of the open conversation
  /reload               Reload the open conversation
  /delete               Delete the open conversation
  /contacts [term]      List known contacts, optionally filtered
  /contact ID           Open the conversation of a contact
  /custom CONV USER TEXT  Send a message as any user
  /up, /down            Scroll the message pane
  /dismiss              Dismiss the latest notice
  /quit                 End the session and exit
Keys: Tab switches focus, Enter opens or sends, PgUp/PgDn scroll, Esc dismisses, Ctrl+Q quits";

pub struct Command {
    pub name: String,
    pub args: Vec<String>,
    pub full_text: String,
}

impl Command {
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if !text.starts_with('/') {
            return None;
        }

        let parts: Vec<&str> = text.split_whitespace().collect();
        if parts.is_empty() {
            return None;
        }

        let name = parts[0][1..].to_lowercase();
        let args = parts[1..].iter().map(|s| s.to_string()).collect();

        Some(Command {
            name,
            args,
            full_text: text.to_string(),
        })
    }

    /// Everything after the first `n` arguments, with its original spacing.
    pub fn rest_after(&self, n: usize) -> Option<&str> {
        let mut rest = self.full_text.as_str();
        // Skip the command word, then n arguments
        for _ in 0..=n {
            rest = rest.trim_start();
            let end = rest.find(char::is_whitespace)?;
            rest = &rest[end..];
        }
        let rest = rest.trim();
        (!rest.is_empty()).then_some(rest)
    }
}

pub struct CommandHandler;

impl CommandHandler {
    /// Run `text` as a slash command. Returns false when it is not one, so the
    /// caller sends it as a message.
    pub async fn handle(app: &mut App, text: &str) -> Result<bool> {
        let cmd = match Command::parse(text) {
            Some(c) => c,
            None => return Ok(false),
        };
        crate::debug_log!("command: /{} {:?}", cmd.name, cmd.args);

        match cmd.name.as_str() {
            "list" | "l" => {
                app.refresh_list().await;
                app.focus_on_list = true;
            }
            "more" => app.load_more().await,
            "open" | "o" => Self::handle_open(app, &cmd).await,
            "older" => app.load_older().await,
            "reload" => app.reload().await,
            "delete" | "del" => app.delete_open().await,
            "contacts" | "c" => {
                let term = cmd.rest_after(0).unwrap_or("");
                app.show_contacts(term).await;
            }
            "contact" => match cmd.args.first() {
                Some(id) => app.open_contact(id).await,
                None => {
                    app.notices.info("Usage: /contact ID");
                }
            },
            "custom" => Self::handle_custom(app, &cmd).await,
            "up" => app.pane.scroll_up(),
            "down" => app.pane.scroll_down(),
            "dismiss" => {
                app.dismiss_notice();
            }
            "help" | "h" => app.show_help(),
            "quit" | "q" | "logout" => app.logout(),
            other => {
                app.notices.error(format!("Unknown command: /{}", other));
            }
        }

        app.needs_redraw = true;
        Ok(true)
    }

    async fn handle_open(app: &mut App, cmd: &Command) {
        let Some(target) = cmd.args.first() else {
            app.notices.info("Usage: /open N or /open ID");
            return;
        };

        match target.trim_start_matches('#').parse::<usize>() {
            Ok(position) => app.open_position(position).await,
            Err(_) => {
                let target = target.clone();
                app.open_conversation(&target).await;
            }
        }
    }

    async fn handle_custom(app: &mut App, cmd: &Command) {
        let (Some(conversation_id), Some(user_id), Some(text)) =
            (cmd.args.first(), cmd.args.get(1), cmd.rest_after(2))
        else {
            app.notices.info("Usage: /custom CONV USER TEXT");
            return;
        };
        let (conversation_id, user_id, text) =
            (conversation_id.clone(), user_id.clone(), text.to_string());
        app.send_custom(&conversation_id, &user_id, &text).await;
    }
}
