use std::fmt;

use serde::{Deserialize, Serialize};

/// Which side of a connection this process runs on
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostType {
    Coordinator,
    Worker,
}

impl HostType {
    pub fn invert(self) -> Self {
        match self {
            Self::Coordinator => Self::Worker,
            Self::Worker => Self::Coordinator,
        }
    }
}

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident, $inner:ty, $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub struct $name($inner);

        impl $name {
            pub const fn new(value: $inner) -> Self {
                Self(value)
            }

            pub const fn value(self) -> $inner {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        }
    };
}

id_type!(
    /// Globally unique entity identifier. Assigned once by the coordinator and never reused.
    EntityId,
    u64,
    "E"
);
id_type!(
    /// Identifies a worker connection on the coordinator
    WorkerId,
    u32,
    "W"
);
id_type!(ComponentKind, u32, "K");
id_type!(
    /// A group of component kinds whose authority is always granted together
    ComponentSetId,
    u32,
    "S"
);
id_type!(CommandId, u32, "C");

/// Per-component version used for last-writer-wins
pub type Version = u64;
/// Per-entity authority transition sequence, assigned by the coordinator
pub type AuthoritySequence = u64;
/// Per-(entity, component) RPC stream sequence, assigned by the sender
pub type RpcSequence = u64;

/// A typed, versioned blob of component state. The bytes are opaque to this crate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentData {
    pub kind: ComponentKind,
    pub version: Version,
    pub state: Vec<u8>,
}

impl ComponentData {
    pub fn new(kind: ComponentKind, version: Version, state: Vec<u8>) -> Self {
        Self {
            kind,
            version,
            state,
        }
    }
}
