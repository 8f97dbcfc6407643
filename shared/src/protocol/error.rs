use thiserror::Error;

use crate::{ComponentKind, ComponentSetId};

/// Errors that can occur during protocol operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Protocol is locked and cannot be modified
    #[error("Protocol is already locked and cannot be modified. Protocol.lock() has been called and no further changes are allowed")]
    AlreadyLocked,

    /// A component set references a kind that was never added
    #[error("Component {kind} not registered with Protocol. Must call `add_component()` before adding it to set {set}")]
    KindNotRegistered {
        kind: ComponentKind,
        set: ComponentSetId,
    },

    /// Each kind may belong to at most one component set
    #[error("Component {kind} already belongs to set {existing}, cannot also add it to set {set}")]
    KindAlreadyInSet {
        kind: ComponentKind,
        existing: ComponentSetId,
        set: ComponentSetId,
    },

    /// Only delegable kinds can be placed under worker authority
    #[error("Component {kind} is coordinator-owned and cannot be part of delegable set {set}")]
    KindNotDelegable {
        kind: ComponentKind,
        set: ComponentSetId,
    },
}
