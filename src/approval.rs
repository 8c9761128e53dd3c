use tokio::sync::{mpsc, oneshot};

use crate::agent::SessionEvent;

/// Human decision for one pending tool call.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApprovalResponse {
    pub approved: bool,
    /// Approve everything else in this session too. Only honored together
    /// with an approval.
    pub auto_approve_session: bool,
}

/// A pending confirmation, delivered to the embedding surface over the
/// session event channel. `arguments` is the raw argument blob exactly as
/// the backend sent it, with no reformatting, so the human approves exactly
/// what will run.
#[derive(Debug)]
pub struct ApprovalRequest {
    pub tool_name: String,
    pub arguments: String,
    pub respond: oneshot::Sender<ApprovalResponse>,
}

/// Per-call confirmation with a session-scoped auto-approve escalation.
/// The flag is one-directional: it can only be cleared by building a new
/// session.
#[derive(Debug, Default)]
pub struct ApprovalGate {
    auto_approve: bool,
}

impl ApprovalGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn auto_approve_enabled(&self) -> bool {
        self.auto_approve
    }

    /// Decide one tool call. Short-circuits when session-wide auto-approve
    /// is already set; otherwise blocks until the surface resolves the
    /// prompt. A closed channel or a dropped responder counts as denial.
    pub async fn decide(
        &mut self,
        tool_name: &str,
        arguments: &str,
        events: &mpsc::UnboundedSender<SessionEvent>,
    ) -> bool {
        if self.auto_approve {
            return true;
        }

        let (respond, response_rx) = oneshot::channel();
        let request = ApprovalRequest {
            tool_name: tool_name.to_string(),
            arguments: arguments.to_string(),
            respond,
        };
        if events.send(SessionEvent::ApprovalRequest(request)).is_err() {
            return false;
        }

        let response = response_rx.await.unwrap_or_default();
        if response.approved && response.auto_approve_session {
            self.auto_approve = true;
        }
        response.approved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn respond_to_requests(
        mut events: mpsc::UnboundedReceiver<SessionEvent>,
        response: ApprovalResponse,
    ) -> tokio::task::JoinHandle<usize> {
        tokio::spawn(async move {
            let mut prompts = 0;
            while let Some(event) = events.recv().await {
                if let SessionEvent::ApprovalRequest(request) = event {
                    prompts += 1;
                    let _ = request.respond.send(response);
                }
            }
            prompts
        })
    }

    #[tokio::test]
    async fn test_denial_is_returned_and_does_not_escalate() {
        let (tx, rx) = mpsc::unbounded_channel();
        let responder = respond_to_requests(
            rx,
            ApprovalResponse {
                approved: false,
                auto_approve_session: true,
            },
        );

        let mut gate = ApprovalGate::new();
        assert!(!gate.decide("write_file", "{}", &tx).await);
        // auto-approve is only honored together with an approval
        assert!(!gate.auto_approve_enabled());

        drop(tx);
        assert_eq!(responder.await.expect("responder"), 1);
    }

    #[tokio::test]
    async fn test_auto_approve_short_circuits_later_calls() {
        let (tx, rx) = mpsc::unbounded_channel();
        let responder = respond_to_requests(
            rx,
            ApprovalResponse {
                approved: true,
                auto_approve_session: true,
            },
        );

        let mut gate = ApprovalGate::new();
        assert!(gate.decide("write_file", "{}", &tx).await);
        assert!(gate.auto_approve_enabled());
        assert!(gate.decide("run_command", "{}", &tx).await);
        assert!(gate.decide("delete_file", "{}", &tx).await);

        drop(tx);
        // only the first call ever prompted
        assert_eq!(responder.await.expect("responder"), 1);
    }

    #[tokio::test]
    async fn test_closed_channel_counts_as_denial() {
        let (tx, rx) = mpsc::unbounded_channel::<SessionEvent>();
        drop(rx);

        let mut gate = ApprovalGate::new();
        assert!(!gate.decide("write_file", "{}", &tx).await);
    }

    #[tokio::test]
    async fn test_dropped_responder_counts_as_denial() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let responder = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let SessionEvent::ApprovalRequest(request) = event {
                    drop(request.respond);
                }
            }
        });

        let mut gate = ApprovalGate::new();
        assert!(!gate.decide("write_file", "{}", &tx).await);

        drop(tx);
        responder.await.expect("responder");
    }
}
