use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use log::{debug, info, warn};

use mosaic_shared::{
    transport::{ConnectionSession, RecvError, SendError},
    AuthorityManager, ComponentKind, ComponentStore, Decoder, DownstreamOp, Encoder, EntityId,
    SyncError, UpstreamOp, WorkerId,
};

/// Result of draining one connection's inbound packets
#[derive(Debug, Default)]
pub struct InboundBatch {
    /// Ops the coordinator applies itself, in arrival order
    pub deferred: Vec<UpstreamOp>,
    /// Writes and messages that were rejected, in arrival order
    pub errors: Vec<SyncError>,
    /// Components whose write was rejected. The writer's local state for
    /// them no longer matches the coordinator's.
    pub rejected: Vec<(EntityId, ComponentKind)>,
    pub applied_writes: usize,
    pub closed: bool,
}

/// One worker's session on the coordinator, with its outbound op queue
pub struct Connection {
    worker: WorkerId,
    session: Box<dyn ConnectionSession>,
    outgoing: Vec<DownstreamOp>,
    encoder: Encoder,
    decoder: Decoder,
    disconnected: Arc<AtomicBool>,
}

impl Connection {
    pub fn new(worker: WorkerId, mut session: Box<dyn ConnectionSession>) -> Self {
        let disconnected = Arc::new(AtomicBool::new(false));
        let flag = disconnected.clone();
        session.on_disconnect(Box::new(move || {
            flag.store(true, Ordering::Release);
        }));
        Self {
            worker,
            session,
            outgoing: Vec::new(),
            encoder: Encoder::new(),
            decoder: Decoder::new(),
            disconnected,
        }
    }

    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    pub fn is_connected(&self) -> bool {
        !self.disconnected.load(Ordering::Acquire) && self.session.is_connected()
    }

    // Outgoing

    pub fn queue(&mut self, op: DownstreamOp) {
        self.outgoing.push(op);
    }

    /// Sends everything queued as a single packet. Returns the number of ops sent.
    pub fn flush(&mut self) -> Result<usize, SendError> {
        if self.outgoing.is_empty() {
            return Ok(0);
        }
        let ops = std::mem::take(&mut self.outgoing);
        let payload = match self.encoder.try_encode(&ops) {
            Ok(payload) => payload,
            Err(err) => {
                warn!("Dropping {} ops for {}: {}", ops.len(), self.worker, err);
                return Ok(0);
            }
        };
        self.session.send(payload)?;
        Ok(ops.len())
    }

    // Incoming

    /// Drains every waiting packet. Component writes are applied here, against
    /// the shared store, after an authority check; everything else is deferred
    /// to the coordinator in arrival order.
    pub fn process_inbound(
        &mut self,
        store: &ComponentStore,
        authority: &AuthorityManager,
    ) -> InboundBatch {
        let mut batch = InboundBatch::default();
        loop {
            let packet = match self.session.receive() {
                Ok(Some(packet)) => packet,
                Ok(None) => break,
                Err(RecvError::Closed) => {
                    info!("{} session closed", self.worker);
                    batch.closed = true;
                    break;
                }
            };
            let decoded = match self.decoder.try_decode::<UpstreamOp>(&packet) {
                Ok(decoded) => decoded,
                Err(err) => {
                    warn!("Discarding packet from {}: {}", self.worker, err);
                    batch.errors.push(err.into());
                    continue;
                }
            };
            batch
                .errors
                .extend(decoded.malformed.into_iter().map(SyncError::from));
            for op in decoded.ops {
                self.apply_op(op, store, authority, &mut batch);
            }
        }
        if !batch.closed && !self.is_connected() {
            batch.closed = true;
        }
        batch
    }

    fn apply_op(
        &self,
        op: UpstreamOp,
        store: &ComponentStore,
        authority: &AuthorityManager,
        batch: &mut InboundBatch,
    ) {
        let target = match &op {
            UpstreamOp::AddComponent { entity, component }
            | UpstreamOp::UpdateComponent { entity, component } => (*entity, component.kind),
            UpstreamOp::RemoveComponent { entity, kind } => (*entity, *kind),
            _ => {
                batch.deferred.push(op);
                return;
            }
        };
        let result = match op {
            UpstreamOp::AddComponent { entity, component }
            | UpstreamOp::UpdateComponent { entity, component } => authority
                .check_write(entity, component.kind, self.worker)
                .map_err(SyncError::from)
                .and_then(|_| {
                    let (kind, version) = (component.kind, component.version);
                    store
                        .upsert(entity, kind, component.state, version)
                        .into_result(entity, kind, version)
                        .map_err(SyncError::from)
                }),
            UpstreamOp::RemoveComponent { entity, kind } => authority
                .check_write(entity, kind, self.worker)
                .map(|_| {
                    if !store.remove_component(entity, kind) {
                        debug!("{} removed absent {}/{}", self.worker, entity, kind);
                    }
                })
                .map_err(SyncError::from),
            _ => return,
        };
        let err = match result {
            Ok(()) => {
                batch.applied_writes += 1;
                return;
            }
            Err(err) => err,
        };
        batch.rejected.push(target);
        match err {
            SyncError::StaleWrite {
                entity,
                kind,
                stored,
                attempted,
            } => {
                debug!(
                    "Dropped stale write from {} to {}/{}: v{} <= v{}",
                    self.worker, entity, kind, attempted, stored
                );
                batch.errors.push(SyncError::StaleWrite {
                    entity,
                    kind,
                    stored,
                    attempted,
                });
            }
            err => {
                warn!("Rejected write from {}: {}", self.worker, err);
                batch.errors.push(err);
            }
        }
    }

    pub fn close(&mut self) {
        self.session.close();
    }
}
