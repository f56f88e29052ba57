use std::collections::HashSet;

use crate::models::Message;

/// Where a fetched batch sits relative to what is already held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeDirection {
    /// Older page, placed before existing messages.
    Prepend,
    /// Newer messages, placed after existing messages.
    Append,
}

/// Merge `incoming` into `existing` by message id.
///
/// Ids already held are dropped from the batch, the remainder is placed
/// according to `direction`, then the whole sequence is stable-sorted by
/// creation time. Merging the same batch twice is the same as merging it once.
pub fn merge_messages(
    existing: &[Message],
    incoming: Vec<Message>,
    direction: MergeDirection,
) -> Vec<Message> {
    let seen: HashSet<&str> = existing.iter().map(|m| m.id.as_str()).collect();
    let mut fresh: Vec<Message> = Vec::with_capacity(incoming.len());
    for message in incoming {
        if seen.contains(message.id.as_str()) || fresh.iter().any(|m| m.id == message.id) {
            continue;
        }
        fresh.push(message);
    }

    let mut merged = Vec::with_capacity(existing.len() + fresh.len());
    match direction {
        MergeDirection::Prepend => {
            merged.extend(fresh);
            merged.extend(existing.iter().cloned());
        }
        MergeDirection::Append => {
            merged.extend(existing.iter().cloned());
            merged.extend(fresh);
        }
    }

    // sort_by_key is stable: equal timestamps keep arrival order
    merged.sort_by_key(|m| m.created_at);
    merged
}
