//! Participant resolution and the shared contact cache.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::client::{RemoteClient, RemoteUser};
use crate::error::ApiError;
use crate::models::{Contact, UNKNOWN_PARTICIPANT};
use crate::session::Liveness;

/// Flat contact cache keyed by participant id.
///
/// Cloning hands out another read handle to the same cache. Only
/// [`ContactResolver`] writes to it.
#[derive(Debug, Clone, Default)]
pub struct ContactBook {
    entries: Arc<Mutex<HashMap<String, Contact>>>,
}

impl ContactBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: &str) -> Option<Contact> {
        self.entries.lock().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// All contacts, sorted by name for stable display.
    pub async fn all(&self) -> Vec<Contact> {
        let mut contacts: Vec<Contact> = self.entries.lock().await.values().cloned().collect();
        contacts.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.id.cmp(&b.id))
        });
        contacts
    }

    /// Contacts whose name (case-insensitive) or phone contains `term`.
    pub async fn search(&self, term: &str) -> Vec<Contact> {
        let needle = term.trim().to_lowercase();
        if needle.is_empty() {
            return self.all().await;
        }
        self.all()
            .await
            .into_iter()
            .filter(|c| {
                c.name.to_lowercase().contains(&needle)
                    || c.phone.as_deref().is_some_and(|p| p.contains(term.trim()))
            })
            .collect()
    }

    async fn put(&self, contact: Contact) {
        self.entries.lock().await.insert(contact.id.clone(), contact);
    }
}

/// Build a contact from the remote user's tags.
///
/// Name preference: `<channel>:name`, then `name`, then the raw id.
pub fn contact_from_user(participant_id: &str, user: &RemoteUser, channel: &str) -> Contact {
    let tag = |key: &str| {
        user.tags
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let name = tag(&format!("{}:name", channel))
        .or_else(|| tag("name"))
        .or_else(|| Some(participant_id.to_string()).filter(|id| !id.is_empty()))
        .unwrap_or_else(|| UNKNOWN_PARTICIPANT.to_string());

    Contact {
        id: participant_id.to_string(),
        name,
        phone: tag(&format!("{}:userId", channel)),
        about: tag(&format!("{}:about", channel)),
    }
}

/// Resolves participant ids into contacts and writes them to the cache.
#[derive(Clone)]
pub struct ContactResolver {
    client: Arc<dyn RemoteClient>,
    channel: String,
    book: ContactBook,
    liveness: Liveness,
}

impl ContactResolver {
    pub fn new(client: Arc<dyn RemoteClient>, channel: &str, book: ContactBook, liveness: Liveness) -> Self {
        Self {
            client,
            channel: channel.to_string(),
            book,
            liveness,
        }
    }

    /// Look up `participant_id` remotely and overwrite its cache entry.
    ///
    /// Failures leave the cache untouched; callers apply their own fallback.
    pub async fn resolve(&self, participant_id: &str) -> Result<Contact, ApiError> {
        let user = match self.client.get_user(participant_id).await {
            Ok(user) => user,
            Err(e) => {
                crate::warn_log!("resolve: could not fetch user {}: {}", participant_id, e);
                return Err(e);
            }
        };

        let contact = contact_from_user(participant_id, &user, &self.channel);
        if self.liveness.is_alive() {
            self.book.put(contact.clone()).await;
            crate::debug_log!("resolve: cached contact {} as '{}'", contact.id, contact.name);
        }
        Ok(contact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockClient;

    fn user(id: &str, tags: &[(&str, &str)]) -> RemoteUser {
        RemoteUser {
            id: id.to_string(),
            tags: tags
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_name_preference() {
        let u = user("u1", &[("whatsapp:name", "Ana"), ("name", "Generic")]);
        assert_eq!(contact_from_user("u1", &u, "whatsapp").name, "Ana");

        let u = user("u1", &[("name", "Generic")]);
        assert_eq!(contact_from_user("u1", &u, "whatsapp").name, "Generic");

        let u = user("u1", &[("whatsapp:name", "  ")]);
        assert_eq!(contact_from_user("u1", &u, "whatsapp").name, "u1");

        let u = user("", &[]);
        assert_eq!(contact_from_user("", &u, "whatsapp").name, UNKNOWN_PARTICIPANT);
    }

    #[test]
    fn test_phone_and_about_from_channel_tags() {
        let u = user(
            "u1",
            &[
                ("whatsapp:name", "Ana"),
                ("whatsapp:userId", "+5511988887777"),
                ("whatsapp:about", "Hey there!"),
            ],
        );
        let contact = contact_from_user("u1", &u, "whatsapp");
        assert_eq!(contact.phone.as_deref(), Some("+5511988887777"));
        assert_eq!(contact.about.as_deref(), Some("Hey there!"));

        let other = contact_from_user("u1", &u, "telegram");
        assert_eq!(other.phone, None);
        assert_eq!(other.about, None);
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let client = Arc::new(MockClient::new());
        client.set_user(user("u1", &[("whatsapp:name", "First")]));
        let book = ContactBook::new();
        let resolver = ContactResolver::new(client.clone(), "whatsapp", book.clone(), Liveness::new());

        resolver.resolve("u1").await.unwrap();
        client.set_user(user("u1", &[("whatsapp:name", "Second")]));
        resolver.resolve("u1").await.unwrap();

        assert_eq!(book.len().await, 1);
        assert_eq!(book.get("u1").await.unwrap().name, "Second");
    }

    #[tokio::test]
    async fn test_failure_writes_nothing() {
        let client = Arc::new(MockClient::new());
        let book = ContactBook::new();
        let resolver = ContactResolver::new(client, "whatsapp", book.clone(), Liveness::new());

        let err = resolver.resolve("ghost").await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
        assert!(book.is_empty().await);
    }

    #[tokio::test]
    async fn test_no_write_after_teardown() {
        let client = Arc::new(MockClient::new());
        client.set_user(user("u1", &[("name", "Late")]));
        let book = ContactBook::new();
        let liveness = Liveness::new();
        let resolver = ContactResolver::new(client, "whatsapp", book.clone(), liveness.clone());

        liveness.end();
        assert!(resolver.resolve("u1").await.is_ok());
        assert!(book.is_empty().await);
    }

    #[tokio::test]
    async fn test_search_by_name_or_phone() {
        let client = Arc::new(MockClient::new());
        client.set_user(user("u1", &[("whatsapp:name", "Ana Souza"), ("whatsapp:userId", "5511")]));
        client.set_user(user("u2", &[("whatsapp:name", "bruno"), ("whatsapp:userId", "5521")]));
        let book = ContactBook::new();
        let resolver = ContactResolver::new(client, "whatsapp", book.clone(), Liveness::new());
        resolver.resolve("u1").await.unwrap();
        resolver.resolve("u2").await.unwrap();

        let all: Vec<String> = book.all().await.into_iter().map(|c| c.name).collect();
        assert_eq!(all, vec!["Ana Souza", "bruno"]);

        assert_eq!(book.search("SOUZA").await.len(), 1);
        assert_eq!(book.search("552").await[0].id, "u2");
        assert_eq!(book.search("").await.len(), 2);
        assert!(book.search("zzz").await.is_empty());
    }
}
