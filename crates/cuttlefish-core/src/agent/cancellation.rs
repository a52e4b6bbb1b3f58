//! Per-conversation cancel handles
//!
//! At most one run owns a conversation. The slot is taken synchronously before
//! the run is spawned and released by the run itself, keyed by run id so a
//! finishing run can never release a newer run's slot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::error::GenerationError;

struct RegisteredRun {
    run_id: u64,
    token: CancellationToken,
}

/// Handle returned on registration
#[derive(Debug, Clone)]
pub struct RunRegistration {
    pub conversation_id: i64,
    pub run_id: u64,
    pub token: CancellationToken,
}

#[derive(Default)]
pub struct CancellationRegistry {
    runs: Mutex<HashMap<i64, RegisteredRun>>,
    next_run_id: AtomicU64,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the conversation's slot with a child of `parent`.
    ///
    /// Fails with `AlreadyGenerating` while another run holds the slot.
    pub fn try_register(
        &self,
        conversation_id: i64,
        parent: &CancellationToken,
    ) -> Result<RunRegistration, GenerationError> {
        let mut runs = self.runs.lock();
        if runs.contains_key(&conversation_id) {
            return Err(GenerationError::AlreadyGenerating(conversation_id));
        }

        let run_id = self.next_run_id.fetch_add(1, Ordering::Relaxed);
        let token = parent.child_token();
        runs.insert(
            conversation_id,
            RegisteredRun {
                run_id,
                token: token.clone(),
            },
        );
        debug!(conversation_id, run_id, "Registered run");

        Ok(RunRegistration {
            conversation_id,
            run_id,
            token,
        })
    }

    /// Trigger the conversation's cancel handle. Returns false if no run is registered.
    pub fn cancel(&self, conversation_id: i64) -> bool {
        let token = self
            .runs
            .lock()
            .get(&conversation_id)
            .map(|run| run.token.clone());
        match token {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Release the slot if it still belongs to `run_id`
    pub fn unregister(&self, conversation_id: i64, run_id: u64) -> bool {
        let mut runs = self.runs.lock();
        match runs.get(&conversation_id) {
            Some(run) if run.run_id == run_id => {
                runs.remove(&conversation_id);
                debug!(conversation_id, run_id, "Unregistered run");
                true
            }
            _ => false,
        }
    }

    pub fn is_registered(&self, conversation_id: i64) -> bool {
        self.runs.lock().contains_key(&conversation_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_registration_rejected() {
        let registry = CancellationRegistry::new();
        let root = CancellationToken::new();

        let first = registry.try_register(7, &root).unwrap();
        let second = registry.try_register(7, &root);
        assert!(matches!(second, Err(GenerationError::AlreadyGenerating(7))));

        assert!(registry.try_register(8, &root).is_ok());
        assert!(registry.unregister(7, first.run_id));
        assert!(registry.try_register(7, &root).is_ok());
    }

    #[test]
    fn test_stale_unregister_is_ignored() {
        let registry = CancellationRegistry::new();
        let root = CancellationToken::new();

        let old = registry.try_register(1, &root).unwrap();
        assert!(registry.unregister(1, old.run_id));
        let new = registry.try_register(1, &root).unwrap();

        assert!(!registry.unregister(1, old.run_id));
        assert!(registry.is_registered(1));
        assert!(registry.unregister(1, new.run_id));
    }

    #[test]
    fn test_cancel_triggers_token() {
        let registry = CancellationRegistry::new();
        let root = CancellationToken::new();
        let run = registry.try_register(3, &root).unwrap();

        assert!(!registry.cancel(4));
        assert!(registry.cancel(3));
        assert!(run.token.is_cancelled());
        assert!(!root.is_cancelled());
    }

    #[test]
    fn test_parent_cancellation_reaches_runs() {
        let registry = CancellationRegistry::new();
        let root = CancellationToken::new();
        let run = registry.try_register(3, &root).unwrap();
        root.cancel();
        assert!(run.token.is_cancelled());
    }
}
