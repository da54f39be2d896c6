//! Human-approval collaborators.
//!
//! [`ApprovalMiddleware`](crate::policy::ApprovalMiddleware) hands every
//! gated call to an [`Approver`]. Two implementations ship here:
//! [`StaticApprover`] for development and tests, and [`ChannelApprover`],
//! which forwards requests to a review queue over a tokio channel.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::context::ExecutionContext;
use crate::tool::RiskLevel;

/// A gated call awaiting a decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: Uuid,
    pub run_id: String,
    pub tool_name: String,
    pub input: Vec<u8>,
    pub reason: String,
    pub risk_level: RiskLevel,
    pub requested_at: DateTime<Utc>,
}

impl ApprovalRequest {
    pub fn from_exec(exec: &ExecutionContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id: exec.run_id().to_string(),
            tool_name: exec.tool_name().to_string(),
            input: exec.input.clone(),
            reason: exec.reason.clone(),
            risk_level: exec.tool().annotations().risk_level,
            requested_at: Utc::now(),
        }
    }

    /// Input rendered as text for display to a reviewer.
    pub fn input_text(&self) -> String {
        String::from_utf8_lossy(&self.input).into_owned()
    }
}

/// An approver's verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalResponse {
    pub approved: bool,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub approver: Option<String>,
}

impl ApprovalResponse {
    pub fn approve() -> Self {
        Self {
            approved: true,
            reason: String::new(),
            approver: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            reason: reason.into(),
            approver: None,
        }
    }

    pub fn by(mut self, approver: impl Into<String>) -> Self {
        self.approver = Some(approver.into());
        self
    }
}

/// Decides whether a gated call may proceed.
///
/// May block for as long as a human takes; the approval stage bounds the
/// wait with the call context.
#[async_trait]
pub trait Approver: Send + Sync {
    async fn approve(&self, request: &ApprovalRequest) -> anyhow::Result<ApprovalResponse>;
}

/// Approver with a fixed answer.
#[derive(Debug, Clone)]
pub struct StaticApprover {
    approved: bool,
    reason: String,
}

impl StaticApprover {
    pub fn allow_all() -> Self {
        Self {
            approved: true,
            reason: String::new(),
        }
    }

    pub fn deny_all(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Approver for StaticApprover {
    async fn approve(&self, _request: &ApprovalRequest) -> anyhow::Result<ApprovalResponse> {
        let response = if self.approved {
            ApprovalResponse::approve()
        } else {
            ApprovalResponse::deny(self.reason.clone())
        };
        Ok(response.by("static"))
    }
}

/// A request delivered to the review queue, with the means to answer it.
#[derive(Debug)]
pub struct PendingApproval {
    pub request: ApprovalRequest,
    responder: oneshot::Sender<ApprovalResponse>,
}

impl PendingApproval {
    /// Send a verdict. Returns `false` if the caller stopped waiting.
    pub fn respond(self, response: ApprovalResponse) -> bool {
        self.responder.send(response).is_ok()
    }

    pub fn approve(self, approver: impl Into<String>) -> bool {
        self.respond(ApprovalResponse::approve().by(approver))
    }

    pub fn deny(self, approver: impl Into<String>, reason: impl Into<String>) -> bool {
        self.respond(ApprovalResponse::deny(reason).by(approver))
    }
}

/// Forwards requests to a review queue and waits for the answer.
///
/// A closed queue or a request dropped without an answer is an approver
/// error, which the approval stage reports as `ApprovalFailed`.
#[derive(Debug, Clone)]
pub struct ChannelApprover {
    queue: mpsc::Sender<PendingApproval>,
}

impl ChannelApprover {
    /// Create the approver and the receiving end of its review queue.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<PendingApproval>) {
        let (queue, rx) = mpsc::channel(capacity.max(1));
        (Self { queue }, rx)
    }
}

#[async_trait]
impl Approver for ChannelApprover {
    async fn approve(&self, request: &ApprovalRequest) -> anyhow::Result<ApprovalResponse> {
        let (responder, answer) = oneshot::channel();
        self.queue
            .send(PendingApproval {
                request: request.clone(),
                responder,
            })
            .await
            .map_err(|_| anyhow!("approval queue is closed"))?;
        answer
            .await
            .with_context(|| format!("approval request {} dropped without an answer", request.id))
    }
}
