use crate::{AuthoritySequence, WorkerId};

/// Authority state of one (entity, component set).
///
/// `Unowned → PendingGrant → Owned → PendingRelease → Unowned`. The pending
/// variants cover the round trip through the coordinator so transitions can be
/// driven deterministically without network timing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthorityState {
    Unowned,
    PendingGrant { requester: WorkerId },
    Owned { owner: WorkerId },
    PendingRelease { owner: WorkerId },
}

impl AuthorityState {
    /// The worker that currently may write, if any. A worker giving up
    /// authority keeps writing until the release is applied.
    pub fn writer(&self) -> Option<WorkerId> {
        match self {
            Self::Owned { owner } | Self::PendingRelease { owner } => Some(*owner),
            Self::Unowned | Self::PendingGrant { .. } => None,
        }
    }

    /// The worker this record is tied to, granted or pending
    pub fn holder(&self) -> Option<WorkerId> {
        match self {
            Self::Owned { owner } | Self::PendingRelease { owner } => Some(*owner),
            Self::PendingGrant { requester } => Some(*requester),
            Self::Unowned => None,
        }
    }

    pub fn is_unowned(&self) -> bool {
        matches!(self, Self::Unowned)
    }
}

/// A transition the coordinator assigned and must announce
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AuthorityTransition {
    /// Worker gaining or losing authority
    pub worker: WorkerId,
    pub authoritative: bool,
    pub sequence: AuthoritySequence,
}
