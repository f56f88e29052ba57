use std::future::Future;

use crate::error::ApiError;

/// Opaque pagination position.
///
/// A fresh cursor has never been fetched and reports `has_more`. After a
/// fetch, `has_more` is true only if the remote handed back a non-empty token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cursor {
    token: Option<String>,
    fetched: bool,
}

impl Cursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cursor positioned after a page that returned `next_token`.
    pub fn after(next_token: Option<String>) -> Self {
        Self {
            token: next_token.filter(|t| !t.is_empty()),
            fetched: true,
        }
    }

    pub fn has_more(&self) -> bool {
        !self.fetched || self.token.is_some()
    }

    pub fn is_fresh(&self) -> bool {
        !self.fetched
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

/// One page returned by a cursor-paginated endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next_token: Option<String>) -> Self {
        Self { items, next_token }
    }

    pub fn last(items: Vec<T>) -> Self {
        Self::new(items, None)
    }
}

/// Fetch the page at `cursor`.
///
/// Returns an empty batch and the same cursor when nothing is left. On error
/// the caller keeps its cursor, so retrying resumes at the same position.
pub async fn fetch_next<T, F, Fut>(cursor: &Cursor, fetch: F) -> Result<(Vec<T>, Cursor), ApiError>
where
    F: FnOnce(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>, ApiError>>,
{
    if !cursor.has_more() {
        return Ok((Vec::new(), cursor.clone()));
    }

    let page = fetch(cursor.token.clone()).await?;
    Ok((page.items, Cursor::after(page.next_token)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_fresh_cursor_fetches_first_page() {
        let cursor = Cursor::new();
        assert!(cursor.has_more());

        let (items, next) = fetch_next(&cursor, |token| async move {
            assert_eq!(token, None);
            Ok(Page::new(vec![1, 2, 3], Some("t2".to_string())))
        })
        .await
        .unwrap();

        assert_eq!(items, vec![1, 2, 3]);
        assert!(next.has_more());
        assert_eq!(next.token(), Some("t2"));
    }

    #[tokio::test]
    async fn test_exhausted_cursor_is_noop() {
        let calls = AtomicUsize::new(0);
        let cursor = Cursor::after(None);
        assert!(!cursor.has_more());

        let (items, next): (Vec<u32>, Cursor) = fetch_next(&cursor, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(Page::new(vec![9], None)) }
        })
        .await
        .unwrap();

        assert!(items.is_empty());
        assert_eq!(next, cursor);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failure_leaves_cursor_alone() {
        let cursor = Cursor::after(Some("t3".to_string()));
        let result: Result<(Vec<u32>, Cursor), ApiError> = fetch_next(&cursor, |token| async move {
            assert_eq!(token.as_deref(), Some("t3"));
            Err(ApiError::Transient("boom".to_string()))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(cursor.token(), Some("t3"));
        assert!(cursor.has_more());
    }

    #[test]
    fn test_empty_token_means_no_more() {
        let cursor = Cursor::after(Some(String::new()));
        assert!(!cursor.has_more());
        assert!(!cursor.is_fresh());
    }
}
