use std::time::{Duration, Instant};

use crate::config::Settings;
use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Success,
    Error,
    RateLimited,
}

#[derive(Debug, Clone)]
pub struct Notice {
    pub id: u64,
    pub kind: NoticeKind,
    pub text: String,
    expires_at: Instant,
}

impl Notice {
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Non-blocking notices shown under the dashboard. Every notice expires on
/// its own and can be dismissed earlier.
#[derive(Debug)]
pub struct NoticeBoard {
    notices: Vec<Notice>,
    next_id: u64,
    notice_ttl: Duration,
    rate_limit_ttl: Duration,
}

impl NoticeBoard {
    pub fn new(notice_ttl: Duration, rate_limit_ttl: Duration) -> Self {
        Self {
            notices: Vec::new(),
            next_id: 1,
            notice_ttl,
            rate_limit_ttl,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            Duration::from_secs(settings.notice_secs),
            Duration::from_secs(settings.rate_limit_notice_secs),
        )
    }

    pub fn push(&mut self, kind: NoticeKind, text: impl Into<String>) -> u64 {
        let ttl = match kind {
            NoticeKind::RateLimited => self.rate_limit_ttl,
            _ => self.notice_ttl,
        };
        let expires_at = Instant::now() + ttl;

        // One rate-limit notice at a time; a repeat only extends it
        if kind == NoticeKind::RateLimited {
            if let Some(existing) = self.notices.iter_mut().find(|n| n.kind == kind) {
                existing.text = text.into();
                existing.expires_at = expires_at;
                return existing.id;
            }
        }

        let id = self.next_id;
        self.next_id += 1;
        self.notices.push(Notice {
            id,
            kind,
            text: text.into(),
            expires_at,
        });
        id
    }

    pub fn info(&mut self, text: impl Into<String>) -> u64 {
        self.push(NoticeKind::Info, text)
    }

    pub fn success(&mut self, text: impl Into<String>) -> u64 {
        self.push(NoticeKind::Success, text)
    }

    pub fn error(&mut self, text: impl Into<String>) -> u64 {
        self.push(NoticeKind::Error, text)
    }

    /// Report a failed remote call. Rate limits get their own long-lived notice.
    pub fn report(&mut self, context: &str, err: &ApiError) -> u64 {
        match err {
            ApiError::RateLimited {
                retry_after: Some(after),
            } => self.push(
                NoticeKind::RateLimited,
                format!("Rate limited, try again in {}s", after.as_secs().max(1)),
            ),
            ApiError::RateLimited { retry_after: None } => self.push(
                NoticeKind::RateLimited,
                "Rate limited, try again in a moment",
            ),
            other => self.error(format!("{}: {}", context, other)),
        }
    }

    pub fn dismiss(&mut self, id: u64) -> bool {
        let before = self.notices.len();
        self.notices.retain(|n| n.id != id);
        before != self.notices.len()
    }

    /// Dismiss the newest notice, if any.
    pub fn dismiss_latest(&mut self) -> bool {
        self.notices.pop().is_some()
    }

    /// Drop expired notices. Returns true when something was removed.
    pub fn prune_at(&mut self, now: Instant) -> bool {
        let before = self.notices.len();
        self.notices.retain(|n| !n.is_expired_at(now));
        before != self.notices.len()
    }

    pub fn prune(&mut self) -> bool {
        self.prune_at(Instant::now())
    }

    pub fn active(&self) -> &[Notice] {
        &self.notices
    }
}
