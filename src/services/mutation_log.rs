//! Completion signal for asynchronous mutations
//!
//! Confirmations dispatched on a background task report their outcome
//! through the mutation log; callers await completion by polling the entry.

use std::time::Duration;

use sqlx::PgPool;
use tokio::time::{sleep, Instant};
use uuid::Uuid;

use crate::database::MutationLogRepository;
use crate::error::Result;
use crate::models::{MutationLogEntry, MutationStatus};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone)]
pub struct MutationLogService {
    repository: MutationLogRepository,
}

impl MutationLogService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: MutationLogRepository::new(pool),
        }
    }

    pub async fn get(&self, internal_id: Uuid) -> Result<Option<MutationLogEntry>> {
        self.repository.get(internal_id).await
    }

    /// Poll until the mutation reaches a terminal status. Returns `None` on
    /// timeout (the entry may still complete later).
    pub async fn wait_for(
        &self,
        internal_id: Uuid,
        timeout: Duration,
    ) -> Result<Option<MutationLogEntry>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(entry) = self.repository.get(internal_id).await? {
                if entry.status != MutationStatus::Received {
                    return Ok(Some(entry));
                }
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            sleep(POLL_INTERVAL).await;
        }
    }
}
