//! Human approval gate for privileged tool actions
//!
//! A tool instance blocks on [`ApprovalHandle::wait_for_approval`] until the
//! user approves the request or the run is cancelled. Each conversation has at
//! most one visible pending request; a newer one replaces it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::RngCore;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::events::{emit, AppEvent, EventSender};

/// What the user is asked to approve
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalRequest {
    pub id: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApprovalError {
    #[error("approval request was cancelled")]
    Cancelled,
}

struct PendingApproval {
    request: ApprovalRequest,
    approve: oneshot::Sender<()>,
}

pub struct ApprovalGate {
    pending: Mutex<HashMap<i64, PendingApproval>>,
    events: EventSender,
}

impl ApprovalGate {
    pub fn new(events: EventSender) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Publish a request and wait for it to be approved or cancelled.
    ///
    /// The request stays visible only while this future is alive.
    pub async fn wait_for_approval(
        &self,
        conversation_id: i64,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ApprovalError> {
        let id = new_approval_id();
        let (tx, rx) = oneshot::channel();

        let replaced = self.pending.lock().insert(
            conversation_id,
            PendingApproval {
                request: ApprovalRequest {
                    id: id.clone(),
                    message: message.to_string(),
                },
                approve: tx,
            },
        );
        if let Some(old) = replaced {
            debug!(conversation_id, old_id = %old.request.id, "Pending approval superseded");
        }
        info!(conversation_id, approval_id = %id, "Waiting for approval");
        emit(&self.events, AppEvent::ApprovalsUpdated { conversation_id });

        scopeguard::defer! {
            self.remove_if_current(conversation_id, &id);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ApprovalError::Cancelled),
            approved = rx => match approved {
                Ok(()) => Ok(()),
                // Superseded: our sender was dropped, nothing can approve us now.
                Err(_) => {
                    cancel.cancelled().await;
                    Err(ApprovalError::Cancelled)
                }
            },
        }
    }

    /// Approve the pending request if `approval_id` matches it
    pub fn approve(&self, conversation_id: i64, approval_id: &str) -> bool {
        let approved = {
            let mut pending = self.pending.lock();
            match pending.get(&conversation_id) {
                Some(entry) if entry.request.id == approval_id => pending
                    .remove(&conversation_id)
                    .map(|entry| entry.approve.send(()).is_ok())
                    .unwrap_or(false),
                _ => false,
            }
        };
        if approved {
            info!(conversation_id, approval_id, "Approved");
            emit(&self.events, AppEvent::ApprovalsUpdated { conversation_id });
        }
        approved
    }

    /// The visible pending request, if any
    pub fn pending(&self, conversation_id: i64) -> Vec<ApprovalRequest> {
        self.pending
            .lock()
            .get(&conversation_id)
            .map(|entry| vec![entry.request.clone()])
            .unwrap_or_default()
    }

    fn remove_if_current(&self, conversation_id: i64, approval_id: &str) {
        let removed = {
            let mut pending = self.pending.lock();
            match pending.get(&conversation_id) {
                Some(entry) if entry.request.id == approval_id => {
                    pending.remove(&conversation_id);
                    true
                }
                _ => false,
            }
        };
        if removed {
            emit(&self.events, AppEvent::ApprovalsUpdated { conversation_id });
        }
    }
}

/// 8 random bytes, hex encoded
fn new_approval_id() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Approval access bound to one run
#[derive(Clone)]
pub struct ApprovalHandle {
    gate: Arc<ApprovalGate>,
    conversation_id: i64,
    cancel: CancellationToken,
}

impl ApprovalHandle {
    pub fn new(gate: Arc<ApprovalGate>, conversation_id: i64, cancel: CancellationToken) -> Self {
        Self {
            gate,
            conversation_id,
            cancel,
        }
    }

    pub async fn wait_for_approval(&self, message: &str) -> Result<(), ApprovalError> {
        self.gate
            .wait_for_approval(self.conversation_id, message, &self.cancel)
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;

    async fn wait_until_pending(gate: &ApprovalGate, conversation_id: i64) -> ApprovalRequest {
        for _ in 0..100 {
            if let Some(request) = gate.pending(conversation_id).pop() {
                return request;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("approval request never appeared");
    }

    #[tokio::test]
    async fn test_approve_resolves_waiter() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let gate = Arc::new(ApprovalGate::new(tx));
        let handle = ApprovalHandle::new(gate.clone(), 1, CancellationToken::new());

        let waiter = tokio::spawn(async move { handle.wait_for_approval("rm -rf /tmp/x").await });
        let request = wait_until_pending(&gate, 1).await;
        assert_eq!(request.message, "rm -rf /tmp/x");
        assert_eq!(request.id.len(), 16);

        assert!(!gate.approve(1, "wrong"));
        assert!(gate.approve(1, &request.id));
        assert_eq!(waiter.await.unwrap(), Ok(()));
        assert!(gate.pending(1).is_empty());
        assert_eq!(
            rx.recv().await,
            Some(AppEvent::ApprovalsUpdated { conversation_id: 1 })
        );
    }

    #[tokio::test]
    async fn test_cancel_removes_request() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let gate = Arc::new(ApprovalGate::new(tx));
        let token = CancellationToken::new();
        let handle = ApprovalHandle::new(gate.clone(), 2, token.clone());

        let waiter = tokio::spawn(async move { handle.wait_for_approval("run").await });
        let request = wait_until_pending(&gate, 2).await;

        token.cancel();
        assert_eq!(waiter.await.unwrap(), Err(ApprovalError::Cancelled));
        assert!(gate.pending(2).is_empty());
        assert!(!gate.approve(2, &request.id));
    }

    #[tokio::test]
    async fn test_dropped_waiter_removes_request() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let gate = Arc::new(ApprovalGate::new(tx));
        let handle = ApprovalHandle::new(gate.clone(), 3, CancellationToken::new());

        let waiter = tokio::spawn(async move { handle.wait_for_approval("run").await });
        wait_until_pending(&gate, 3).await;
        waiter.abort();
        let _ = waiter.await;

        assert!(gate.pending(3).is_empty());
    }

    #[tokio::test]
    async fn test_newer_request_supersedes_older() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let gate = Arc::new(ApprovalGate::new(tx));
        let token = CancellationToken::new();
        let first = ApprovalHandle::new(gate.clone(), 4, token.clone());
        let second = first.clone();

        let first_waiter = tokio::spawn(async move { first.wait_for_approval("one").await });
        let first_request = wait_until_pending(&gate, 4).await;

        let second_waiter = tokio::spawn(async move { second.wait_for_approval("two").await });
        let second_request = loop {
            let request = wait_until_pending(&gate, 4).await;
            if request.id != first_request.id {
                break request;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };
        assert_eq!(second_request.message, "two");
        assert!(!gate.approve(4, &first_request.id));

        assert!(gate.approve(4, &second_request.id));
        assert_eq!(second_waiter.await.unwrap(), Ok(()));

        token.cancel();
        assert_eq!(first_waiter.await.unwrap(), Err(ApprovalError::Cancelled));
    }
}
