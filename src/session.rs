use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

use crate::client::{BotpressClient, RemoteClient};
use crate::config::Config;

/// Shared flag that tells continuations whether their owner is still around.
#[derive(Debug, Clone)]
pub struct Liveness(Arc<AtomicBool>);

impl Liveness {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn end(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

/// An authenticated connection to the remote plus everything that must stop
/// when the operator logs out.
pub struct Session {
    client: Arc<dyn RemoteClient>,
    bot_id: String,
    liveness: Liveness,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Session {
    pub fn create(client: Arc<dyn RemoteClient>, bot_id: &str) -> Self {
        crate::info_log!("session: created for bot {}", bot_id);
        Self {
            client,
            bot_id: bot_id.to_string(),
            liveness: Liveness::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Session backed by the HTTP client built from the configured credentials.
    pub fn from_config(config: &Config) -> Self {
        let client = BotpressClient::new(
            &config.api_url,
            &config.token,
            &config.workspace_id,
            &config.bot_id,
        );
        Self::create(Arc::new(client), &config.bot_id)
    }

    pub fn client(&self) -> Arc<dyn RemoteClient> {
        self.client.clone()
    }

    pub fn bot_id(&self) -> &str {
        &self.bot_id
    }

    pub fn liveness(&self) -> Liveness {
        self.liveness.clone()
    }

    pub fn is_alive(&self) -> bool {
        self.liveness.is_alive()
    }

    /// Tie a background task to this session so teardown stops it.
    pub fn attach(&self, handle: JoinHandle<()>) {
        if !self.is_alive() {
            handle.abort();
            return;
        }
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(handle);
        }
    }

    /// End the session: results of in-flight calls are discarded from now on
    /// and every attached task is aborted.
    pub fn teardown(&self) {
        if !self.is_alive() {
            return;
        }
        self.liveness.end();
        let tasks = match self.tasks.lock() {
            Ok(mut tasks) => std::mem::take(&mut *tasks),
            Err(_) => Vec::new(),
        };
        for task in &tasks {
            task.abort();
        }
        crate::info_log!("session: torn down, aborted {} background tasks", tasks.len());
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockClient;
    use std::time::Duration;

    #[tokio::test]
    async fn test_teardown_aborts_attached_tasks() {
        let session = Session::create(Arc::new(MockClient::new()), "bot-1");
        let handle = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        let abort_check = handle.abort_handle();
        session.attach(handle);

        let liveness = session.liveness();
        assert!(liveness.is_alive());
        session.teardown();

        assert!(!liveness.is_alive());
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(abort_check.is_finished());
    }

    #[tokio::test]
    async fn test_attach_after_teardown_aborts_immediately() {
        let session = Session::create(Arc::new(MockClient::new()), "bot-1");
        session.teardown();

        let handle = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        let abort_check = handle.abort_handle();
        session.attach(handle);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(abort_check.is_finished());
    }
}
