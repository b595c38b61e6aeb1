use std::sync::Arc;

use tokio::sync::watch;

/// Last resource version seen on the pod list/watch, shared between the
/// watch task (writer) and anyone interested in its progress.
///
/// The cursor lives only as long as the process; a restarted monitor starts
/// again from a fresh list.
#[derive(Debug, Clone)]
pub struct WatchCursor {
    tx: Arc<watch::Sender<String>>,
}

impl Default for WatchCursor {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchCursor {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(String::new());
        Self { tx: Arc::new(tx) }
    }

    /// Current resource version, empty before the initial list.
    pub fn current(&self) -> String {
        self.tx.borrow().clone()
    }

    /// Moves the cursor to `resource_version`. Empty versions are ignored.
    pub fn advance(&self, resource_version: impl Into<String>) {
        let resource_version = resource_version.into();
        if resource_version.is_empty() {
            return;
        }
        self.tx.send_if_modified(|current| {
            if *current == resource_version {
                return false;
            }
            *current = resource_version;
            true
        });
    }

    /// Receiver notified each time the cursor moves.
    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.tx.subscribe()
    }
}
