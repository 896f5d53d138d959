//! Review queue for planned commands. A proposal holds a plan until someone
//! approves or rejects it, then records how the run went.

use std::time::{SystemTime, UNIX_EPOCH};

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::AppError;
use crate::model::PlannedCommand;
use crate::runner::{HaltReason, PlanRunReport};

pub const DEFAULT_MAX_PROPOSALS: usize = 100;
/// One hour.
pub const DEFAULT_PROPOSAL_TTL_MS: u64 = 3_600_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Approved,
    Rejected,
    Applied,
    Failed,
    Expired,
}

impl ProposalStatus {
    pub fn slug(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Applied => "applied",
            Self::Failed => "failed",
            Self::Expired => "expired",
        }
    }

    /// No further transition is possible.
    pub fn is_resolved(self) -> bool {
        matches!(self, Self::Rejected | Self::Applied | Self::Failed | Self::Expired)
    }
}

impl std::fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.slug())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    pub id: String,
    pub planned: PlannedCommand,
    /// Project version the plan was made against.
    pub base_version: u64,
    pub status: ProposalStatus,
    /// Unix millis.
    pub created_at: u64,
    pub updated_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Proposal {
    pub fn new(id: impl Into<String>, planned: PlannedCommand, base_version: u64, now: u64) -> Self {
        Self {
            id: id.into(),
            planned,
            base_version,
            status: ProposalStatus::Pending,
            created_at: now,
            updated_at: now,
            notes: None,
            error: None,
        }
    }

    /// Approved, or pending on a plan that never needed approval.
    pub fn is_runnable(&self) -> bool {
        match self.status {
            ProposalStatus::Approved => true,
            ProposalStatus::Pending => !self.planned.plan().requires_approval,
            _ => false,
        }
    }

    pub fn approve(&mut self, now: u64) -> Result<(), AppError> {
        self.require(ProposalStatus::Pending, "approve")?;
        self.transition(ProposalStatus::Approved, now);
        Ok(())
    }

    pub fn reject(&mut self, reason: Option<&str>, now: u64) -> Result<(), AppError> {
        self.require(ProposalStatus::Pending, "reject")?;
        self.notes = reason.map(str::to_string);
        self.transition(ProposalStatus::Rejected, now);
        Ok(())
    }

    pub fn mark_applied(&mut self, now: u64) -> Result<(), AppError> {
        self.require_runnable("apply")?;
        self.transition(ProposalStatus::Applied, now);
        Ok(())
    }

    pub fn mark_failed(&mut self, error: impl Into<String>, now: u64) -> Result<(), AppError> {
        self.require_runnable("fail")?;
        self.error = Some(error.into());
        self.transition(ProposalStatus::Failed, now);
        Ok(())
    }

    /// Expires a pending proposal older than `ttl_ms`. True if it expired.
    pub fn expire(&mut self, now: u64, ttl_ms: u64) -> bool {
        if self.status != ProposalStatus::Pending || now.saturating_sub(self.created_at) < ttl_ms {
            return false;
        }
        self.transition(ProposalStatus::Expired, now);
        true
    }

    fn transition(&mut self, status: ProposalStatus, now: u64) {
        debug!(proposal = %self.id, from = %self.status, to = %status, "proposal status changed");
        self.status = status;
        self.updated_at = now;
    }

    fn require(&self, status: ProposalStatus, action: &str) -> Result<(), AppError> {
        if self.status == status {
            return Ok(());
        }
        Err(AppError::PreconditionFailed {
            message: format!(
                "cannot {action} proposal '{}': it is {}, not {status}",
                self.id, self.status
            ),
        })
    }

    fn require_runnable(&self, action: &str) -> Result<(), AppError> {
        if self.is_runnable() {
            return Ok(());
        }
        Err(AppError::PreconditionFailed {
            message: format!(
                "cannot {action} proposal '{}': it is {} and has not been approved",
                self.id, self.status
            ),
        })
    }
}

struct Queue {
    proposals: IndexMap<String, Proposal>,
    next_id: u64,
}

/// Bounded, insertion-ordered set of proposals. When full, the oldest
/// resolved proposal makes room for a new one.
pub struct ProposalStore {
    queue: Mutex<Queue>,
    capacity: usize,
    ttl_ms: u64,
}

impl Default for ProposalStore {
    fn default() -> Self {
        Self {
            queue: Mutex::new(Queue {
                proposals: IndexMap::new(),
                next_id: 1,
            }),
            capacity: DEFAULT_MAX_PROPOSALS,
            ttl_ms: DEFAULT_PROPOSAL_TTL_MS,
        }
    }
}

impl ProposalStore {
    pub fn new(capacity: usize, ttl_ms: u64) -> Result<Self, AppError> {
        if capacity == 0 {
            return Err(AppError::InvalidConfig {
                message: "proposal capacity must be at least 1".into(),
            });
        }
        Ok(Self {
            capacity,
            ttl_ms,
            ..Self::default()
        })
    }

    pub fn len(&self) -> usize {
        self.queue.lock().proposals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queue a planned command made against `base_version`.
    pub fn submit(&self, planned: PlannedCommand, base_version: u64) -> Result<Proposal, AppError> {
        self.submit_at(planned, base_version, now_millis())
    }

    pub fn submit_at(
        &self,
        planned: PlannedCommand,
        base_version: u64,
        now: u64,
    ) -> Result<Proposal, AppError> {
        let mut queue = self.queue.lock();
        self.expire_in(&mut queue, now);

        if queue.proposals.len() >= self.capacity {
            let oldest_resolved = queue
                .proposals
                .iter()
                .find(|(_, p)| p.status.is_resolved())
                .map(|(id, _)| id.clone());
            let Some(evicted) = oldest_resolved else {
                return Err(AppError::PreconditionFailed {
                    message: format!(
                        "proposal queue is full: all {} proposals are unresolved",
                        queue.proposals.len()
                    ),
                });
            };
            queue.proposals.shift_remove(&evicted);
            debug!(proposal = %evicted, "evicted resolved proposal");
        }

        let id = format!("proposal_{}", queue.next_id);
        queue.next_id += 1;
        let proposal = Proposal::new(id.clone(), planned, base_version, now);
        info!(proposal = %id, source = %proposal.planned.label(), "proposal submitted");
        queue.proposals.insert(id, proposal.clone());
        Ok(proposal)
    }

    pub fn get(&self, id: &str) -> Result<Proposal, AppError> {
        self.update(id, |_, _| Ok(()))
    }

    /// Proposals still waiting for a decision, oldest first.
    pub fn pending(&self) -> Vec<Proposal> {
        let mut queue = self.queue.lock();
        self.expire_in(&mut queue, now_millis());
        queue
            .proposals
            .values()
            .filter(|p| p.status == ProposalStatus::Pending)
            .cloned()
            .collect()
    }

    pub fn approve(&self, id: &str) -> Result<Proposal, AppError> {
        self.update(id, Proposal::approve)
    }

    pub fn reject(&self, id: &str, reason: Option<&str>) -> Result<Proposal, AppError> {
        self.update(id, |p, now| p.reject(reason, now))
    }

    /// Applied when the run completed, failed otherwise. A run refused at
    /// the approval gate leaves the proposal untouched.
    pub fn record_outcome(&self, id: &str, report: &PlanRunReport) -> Result<Proposal, AppError> {
        if report.halted == Some(HaltReason::ApprovalRequired) {
            return self.get(id);
        }
        match report.failure_summary() {
            None => self.update(id, Proposal::mark_applied),
            Some(error) => self.update(id, |p, now| p.mark_failed(error, now)),
        }
    }

    /// Expires every pending proposal older than the store's TTL as of `now`.
    pub fn expire_stale_at(&self, now: u64) -> usize {
        let mut queue = self.queue.lock();
        self.expire_in(&mut queue, now)
    }

    fn expire_in(&self, queue: &mut Queue, now: u64) -> usize {
        let mut expired = 0;
        for proposal in queue.proposals.values_mut() {
            if proposal.expire(now, self.ttl_ms) {
                expired += 1;
            }
        }
        if expired > 0 {
            info!(expired, "pending proposals expired");
        }
        expired
    }

    /// Applies `f` to a draft of the proposal and commits it only on `Ok`.
    /// An overdue pending proposal is expired first.
    fn update<F>(&self, id: &str, f: F) -> Result<Proposal, AppError>
    where
        F: FnOnce(&mut Proposal, u64) -> Result<(), AppError>,
    {
        let now = now_millis();
        let mut queue = self.queue.lock();
        let stored = queue.proposals.get_mut(id).ok_or_else(|| AppError::NotFound {
            what: format!("Proposal '{id}'"),
        })?;
        stored.expire(now, self.ttl_ms);
        let mut draft = stored.clone();
        f(&mut draft, now)?;
        *stored = draft.clone();
        Ok(draft)
    }
}

fn now_millis() -> u64 {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}
