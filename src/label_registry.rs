//! Review-label resolution
//!
//! Label names map to exactly one Gmail label id. The registry always lists
//! existing labels before creating one, and label ids are re-resolved in every
//! process because nothing is persisted locally.
//!
//! Known limitation: resolution is serialized within this process only. Two
//! separate processes resolving the same new name at the same moment can
//! both miss it in the listing and both create it.

use once_cell::sync::Lazy;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::client::MailClient;
use crate::error::{CleanupError, Result};

/// Serializes lookup-then-create across every registry in the process
static RESOLVE_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Resolves label names to ids, creating missing labels
pub struct LabelRegistry<'a> {
    client: &'a dyn MailClient,
}

impl<'a> LabelRegistry<'a> {
    pub fn new(client: &'a dyn MailClient) -> Self {
        Self { client }
    }

    /// Look up an existing label by exact, case-sensitive name
    pub async fn find(&self, name: &str) -> Result<Option<String>> {
        let labels = self.client.list_labels().await?;
        Ok(labels.into_iter().find(|l| l.name == name).map(|l| l.id))
    }

    /// Return the id of the label called `name`, creating it if absent
    pub async fn resolve_or_create(&self, name: &str) -> Result<String> {
        if name.trim().is_empty() {
            return Err(CleanupError::LabelError(
                "label name must not be empty".to_string(),
            ));
        }

        let _guard = RESOLVE_LOCK.lock().await;

        if let Some(id) = self.find(name).await? {
            debug!("Label '{}' already exists with ID {}", name, id);
            return Ok(id);
        }

        info!("Creating label: {}", name);
        let id = self.client.create_label(name).await.map_err(|e| {
            CleanupError::LabelError(format!("Failed to create label '{}': {}", name, e))
        })?;
        info!("Created label '{}' with ID: {}", name, id);
        Ok(id)
    }
}
