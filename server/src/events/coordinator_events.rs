use std::mem;

use mosaic_shared::{ComponentSetId, EntityId, SyncError, WorkerId};

use crate::lifecycle::LifecycleError;

/// Everything observable that happened on the coordinator since the last
/// `take_events`
#[derive(Debug)]
pub struct CoordinatorEvents {
    connections: Vec<WorkerId>,
    disconnections: Vec<WorkerId>,
    errors: Vec<(WorkerId, SyncError)>,
    rejections: Vec<(WorkerId, LifecycleError)>,
    creates: Vec<(WorkerId, EntityId)>,
    deletes: Vec<EntityId>,
    retirements: Vec<EntityId>,
    auth_grants: Vec<(WorkerId, EntityId, ComponentSetId)>,
    auth_releases: Vec<(WorkerId, EntityId, ComponentSetId)>,
    reassignments: Vec<(EntityId, ComponentSetId)>,
    dropped_rpcs: usize,
    empty: bool,
}

impl CoordinatorEvents {
    pub(crate) fn new() -> Self {
        Self {
            connections: Vec::new(),
            disconnections: Vec::new(),
            errors: Vec::new(),
            rejections: Vec::new(),
            creates: Vec::new(),
            deletes: Vec::new(),
            retirements: Vec::new(),
            auth_grants: Vec::new(),
            auth_releases: Vec::new(),
            reassignments: Vec::new(),
            dropped_rpcs: 0,
            empty: true,
        }
    }

    // Public

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn take_connections(&mut self) -> Vec<WorkerId> {
        mem::take(&mut self.connections)
    }

    pub fn take_disconnections(&mut self) -> Vec<WorkerId> {
        mem::take(&mut self.disconnections)
    }

    /// Rejected writes and discarded messages, with the worker that sent them
    pub fn take_errors(&mut self) -> Vec<(WorkerId, SyncError)> {
        mem::take(&mut self.errors)
    }

    /// Create, delete and reservation requests that were refused
    pub fn take_rejections(&mut self) -> Vec<(WorkerId, LifecycleError)> {
        mem::take(&mut self.rejections)
    }

    /// Entities created by workers
    pub fn take_creates(&mut self) -> Vec<(WorkerId, EntityId)> {
        mem::take(&mut self.creates)
    }

    pub fn take_deletes(&mut self) -> Vec<EntityId> {
        mem::take(&mut self.deletes)
    }

    /// Deleted entities whose drain window elapsed
    pub fn take_retirements(&mut self) -> Vec<EntityId> {
        mem::take(&mut self.retirements)
    }

    pub fn take_auth_grants(&mut self) -> Vec<(WorkerId, EntityId, ComponentSetId)> {
        mem::take(&mut self.auth_grants)
    }

    pub fn take_auth_releases(&mut self) -> Vec<(WorkerId, EntityId, ComponentSetId)> {
        mem::take(&mut self.auth_releases)
    }

    /// Authority records left unowned by a disconnected worker. The
    /// application decides who takes them over.
    pub fn take_reassignments(&mut self) -> Vec<(EntityId, ComponentSetId)> {
        mem::take(&mut self.reassignments)
    }

    /// RPCs that had no authoritative recipient
    pub fn dropped_rpcs(&self) -> usize {
        self.dropped_rpcs
    }

    // Crate-public

    pub(crate) fn push_connection(&mut self, worker: WorkerId) {
        self.connections.push(worker);
        self.empty = false;
    }

    pub(crate) fn push_disconnection(&mut self, worker: WorkerId) {
        self.disconnections.push(worker);
        self.empty = false;
    }

    pub(crate) fn push_error(&mut self, worker: WorkerId, error: SyncError) {
        self.errors.push((worker, error));
        self.empty = false;
    }

    pub(crate) fn push_rejection(&mut self, worker: WorkerId, error: LifecycleError) {
        self.rejections.push((worker, error));
        self.empty = false;
    }

    pub(crate) fn push_create(&mut self, worker: WorkerId, entity: EntityId) {
        self.creates.push((worker, entity));
        self.empty = false;
    }

    pub(crate) fn push_delete(&mut self, entity: EntityId) {
        self.deletes.push(entity);
        self.empty = false;
    }

    pub(crate) fn push_retirement(&mut self, entity: EntityId) {
        self.retirements.push(entity);
        self.empty = false;
    }

    pub(crate) fn push_auth_grant(&mut self, worker: WorkerId, entity: EntityId, set: ComponentSetId) {
        self.auth_grants.push((worker, entity, set));
        self.empty = false;
    }

    pub(crate) fn push_auth_release(
        &mut self,
        worker: WorkerId,
        entity: EntityId,
        set: ComponentSetId,
    ) {
        self.auth_releases.push((worker, entity, set));
        self.empty = false;
    }

    pub(crate) fn push_reassignments(&mut self, records: Vec<(EntityId, ComponentSetId)>) {
        if records.is_empty() {
            return;
        }
        self.reassignments.extend(records);
        self.empty = false;
    }

    pub(crate) fn push_dropped_rpc(&mut self) {
        self.dropped_rpcs += 1;
        self.empty = false;
    }
}

impl Default for CoordinatorEvents {
    fn default() -> Self {
        Self::new()
    }
}
