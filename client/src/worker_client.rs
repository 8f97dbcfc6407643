use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::Instant,
};

use log::{debug, info, warn};

use mosaic_shared::{
    transport::{ConnectionSession, RecvError},
    AuthorityManager, CommandId, ComponentData, ComponentKind, ComponentSetId, ComponentStore,
    Decoder, Dispatcher, DownstreamOp, Encoder, EntityId, InterestQuery, Protocol,
    ReliabilityTier, RpcReceiver, RpcSequence, RpcSender, SubView, UpstreamOp, Version,
    ViewCallbacks, ViewContext, ViewDeltaComputer, ViewEvent, WorkerId,
};

use crate::{
    entity_pool::EntityPool,
    write_buffer::{PendingWrite, WriteBuffer},
    WorkerConfig, WorkerError,
};

/// Identifies a sub view registered on a [`WorkerClient`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubViewId(u32);

/// A worker's end of the sync core.
///
/// Keeps a local view of the entities in this worker's interest, applies the
/// coordinator's op stream to it through a [`ViewDeltaComputer`], checks
/// authority before buffering local writes and routes RPCs both ways. All
/// progress happens in [`WorkerClient::tick`], which reports what changed to
/// the application through [`ViewCallbacks`].
pub struct WorkerClient {
    config: WorkerConfig,
    protocol: Arc<Protocol>,
    session: Box<dyn ConnectionSession>,
    worker: Option<WorkerId>,
    connected: bool,
    store: ComponentStore,
    authority: AuthorityManager,
    view: ViewDeltaComputer,
    dispatcher: Dispatcher,
    sub_views: BTreeMap<SubViewId, SubView>,
    next_sub_view: u32,
    rpc_sender: RpcSender,
    rpc_receiver: RpcReceiver,
    writes: WriteBuffer,
    pool: EntityPool,
    // created here, waiting for the coordinator to commit
    pending_creates: HashMap<EntityId, Vec<ComponentData>>,
    outgoing: Vec<UpstreamOp>,
    // produced outside of a tick, reported with the next one
    pending_events: Vec<ViewEvent>,
    encoder: Encoder,
    decoder: Decoder,
}

impl WorkerClient {
    /// Create a new WorkerClient over an established session
    pub fn new<S: ConnectionSession + 'static>(
        config: WorkerConfig,
        protocol: Protocol,
        session: S,
    ) -> Self {
        let protocol = Arc::new(protocol);
        let authority = AuthorityManager::new(protocol.clone());
        let rpc_sender = RpcSender::new(config.rpc.clone());
        let rpc_receiver = RpcReceiver::new(config.rpc.max_buffered);
        let pool = EntityPool::new(config.pool.clone());

        Self {
            config,
            protocol,
            session: Box::new(session),
            worker: None,
            connected: true,
            store: ComponentStore::new(),
            authority,
            view: ViewDeltaComputer::new(WorkerId::new(0)),
            dispatcher: Dispatcher::new(),
            sub_views: BTreeMap::new(),
            next_sub_view: 0,
            rpc_sender,
            rpc_receiver,
            writes: WriteBuffer::new(),
            pool,
            pending_creates: HashMap::new(),
            outgoing: Vec::new(),
            pending_events: Vec::new(),
            encoder: Encoder::new(),
            decoder: Decoder::new(),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Id assigned by the coordinator, once welcomed
    pub fn worker_id(&self) -> Option<WorkerId> {
        self.worker
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// The local view. Entities appear here only once fully replicated.
    pub fn store(&self) -> &ComponentStore {
        &self.store
    }

    pub fn authority(&self) -> &AuthorityManager {
        &self.authority
    }

    pub fn is_visible(&self, entity: &EntityId) -> bool {
        self.view.is_visible(entity)
    }

    pub fn has_authority(&self, entity: &EntityId, kind: &ComponentKind) -> bool {
        match self.worker {
            Some(worker) => self.authority.writer_of(entity, kind) == Some(worker),
            None => false,
        }
    }

    /// Entity ids still available for `create_entity`
    pub fn reserved_ids(&self) -> usize {
        self.pool.available()
    }

    pub fn is_creating(&self, entity: &EntityId) -> bool {
        self.pending_creates.contains_key(entity)
    }

    pub fn buffered_writes(&self) -> usize {
        self.writes.len()
    }

    fn local_worker(&self) -> Result<WorkerId, WorkerError> {
        if !self.connected {
            return Err(WorkerError::ConnectionLost);
        }
        self.worker.ok_or(WorkerError::NotWelcomed)
    }

    // Views

    /// Per-component callbacks, run after the `ViewCallbacks` of each tick
    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    /// Registers a sub view. Entities already in the view are picked up and
    /// reported as entered by the next tick.
    pub fn add_sub_view(&mut self, mut sub_view: SubView) -> SubViewId {
        let context = ViewContext::new(&self.store, &self.authority, self.worker);
        sub_view.seed(&context);
        self.next_sub_view += 1;
        let id = SubViewId(self.next_sub_view);
        self.sub_views.insert(id, sub_view);
        id
    }

    pub fn sub_view(&self, id: &SubViewId) -> Option<&SubView> {
        self.sub_views.get(id)
    }

    pub fn remove_sub_view(&mut self, id: &SubViewId) -> Option<SubView> {
        self.sub_views.remove(id)
    }

    /// Checks every tagged entity of the sub view against its filter again.
    /// Returns false for an unknown id.
    pub fn refresh_sub_view(&mut self, id: &SubViewId) -> bool {
        let context = ViewContext::new(&self.store, &self.authority, self.worker);
        match self.sub_views.get_mut(id) {
            Some(sub_view) => {
                sub_view.refresh(&context);
                true
            }
            None => false,
        }
    }

    pub fn refresh_sub_view_entity(&mut self, id: &SubViewId, entity: EntityId) -> bool {
        let context = ViewContext::new(&self.store, &self.authority, self.worker);
        match self.sub_views.get_mut(id) {
            Some(sub_view) => {
                sub_view.refresh_entity(entity, &context);
                true
            }
            None => false,
        }
    }

    // Writes

    /// Buffers a write to a component this worker has authority over. Sent on
    /// the next flush. Returns the version the write was given.
    pub fn write_component(
        &mut self,
        entity: EntityId,
        kind: ComponentKind,
        state: Vec<u8>,
    ) -> Result<Version, WorkerError> {
        let worker = self.local_worker()?;
        self.authority.check_write(entity, kind, worker)?;
        let set = self
            .protocol
            .set_of(&kind)
            .ok_or(WorkerError::UnknownComponent { kind })?;

        let stored = self
            .store
            .get(&entity, &kind)
            .map(|component| component.version)
            .unwrap_or(0);
        let buffered = self.writes.latest_version(&entity, &kind).unwrap_or(0);
        let version = stored.max(buffered) + 1;
        self.writes.push(
            entity,
            set,
            PendingWrite::Upsert(ComponentData::new(kind, version, state)),
        );
        Ok(version)
    }

    pub fn remove_component(
        &mut self,
        entity: EntityId,
        kind: ComponentKind,
    ) -> Result<(), WorkerError> {
        let worker = self.local_worker()?;
        self.authority.check_write(entity, kind, worker)?;
        let set = self
            .protocol
            .set_of(&kind)
            .ok_or(WorkerError::UnknownComponent { kind })?;
        self.writes.push(entity, set, PendingWrite::Remove(kind));
        Ok(())
    }

    /// Applies buffered writes to the local view and queues them upstream
    pub fn flush_writes(&mut self) {
        for (entity, write) in self.writes.drain() {
            match write {
                PendingWrite::Upsert(component) => {
                    let existed = self.store.get(&entity, &component.kind).is_some();
                    self.store.upsert(
                        entity,
                        component.kind,
                        component.state.clone(),
                        component.version,
                    );
                    self.outgoing.push(if existed {
                        UpstreamOp::UpdateComponent { entity, component }
                    } else {
                        UpstreamOp::AddComponent { entity, component }
                    });
                }
                PendingWrite::Remove(kind) => {
                    self.store.remove_component(entity, kind);
                    self.outgoing
                        .push(UpstreamOp::RemoveComponent { entity, kind });
                }
            }
        }
    }

    // Authority

    pub fn request_authority(
        &mut self,
        entity: EntityId,
        set: ComponentSetId,
    ) -> Result<(), WorkerError> {
        let worker = self.local_worker()?;
        if !self.view.is_visible(&entity) {
            return Err(WorkerError::NotVisible { entity });
        }
        self.authority.request_grant(entity, set, worker, true)?;
        self.outgoing
            .push(UpstreamOp::RequestAuthority { entity, set });
        Ok(())
    }

    /// Gives authority back. Buffered writes for the set are flushed first so
    /// the coordinator applies them before the release.
    pub fn release_authority(
        &mut self,
        entity: EntityId,
        set: ComponentSetId,
    ) -> Result<(), WorkerError> {
        let worker = self.local_worker()?;
        self.authority.begin_release(entity, set, worker)?;
        self.flush_writes();
        self.outgoing
            .push(UpstreamOp::ReleaseAuthority { entity, set });
        Ok(())
    }

    // Interest

    pub fn set_interest(&mut self, queries: Vec<InterestQuery>) -> Result<(), WorkerError> {
        self.local_worker()?;
        self.outgoing.push(UpstreamOp::SetInterest { queries });
        Ok(())
    }

    // RPC

    /// Sends an RPC to whichever worker holds authority over `kind` on
    /// `target`. Returns the stream sequence, zero for unreliable calls.
    pub fn call_rpc(
        &mut self,
        now: Instant,
        target: EntityId,
        kind: ComponentKind,
        command: CommandId,
        payload: Vec<u8>,
        tier: ReliabilityTier,
    ) -> Result<RpcSequence, WorkerError> {
        self.local_worker()?;
        if !self.protocol.is_registered(&kind) {
            return Err(WorkerError::UnknownComponent { kind });
        }
        Ok(self
            .rpc_sender
            .call(now, target, kind, command, payload, tier))
    }

    pub fn pending_rpcs(&self) -> usize {
        self.rpc_sender.pending_count()
    }

    /// Inbound reliable streams tracked for duplicates, one per sender,
    /// target and component kind
    pub fn inbound_rpc_streams(&self) -> usize {
        self.rpc_receiver.stream_count()
    }

    // Lifecycle

    /// Creates an entity with an id from the reserved pool. It stays invisible
    /// until the coordinator has committed it.
    pub fn create_entity(
        &mut self,
        components: Vec<ComponentData>,
    ) -> Result<EntityId, WorkerError> {
        self.local_worker()?;
        if let Some(component) = components
            .iter()
            .find(|component| !self.protocol.is_registered(&component.kind))
        {
            return Err(WorkerError::UnknownComponent {
                kind: component.kind,
            });
        }
        let entity = self.pool.take().ok_or(WorkerError::PoolExhausted)?;
        self.pending_creates.insert(entity, components.clone());
        self.outgoing
            .push(UpstreamOp::CreateEntity { entity, components });
        debug!("Creating {}", entity);
        Ok(entity)
    }

    pub fn delete_entity(&mut self, entity: EntityId) -> Result<(), WorkerError> {
        self.local_worker()?;
        if !self.view.is_visible(&entity) {
            return Err(WorkerError::NotVisible { entity });
        }
        self.outgoing.push(UpstreamOp::DeleteEntity { entity });
        Ok(())
    }

    // Connection

    /// Closes the session locally. Outstanding RPCs fail with the next tick.
    pub fn disconnect(&mut self) {
        self.session.close();
        self.connection_lost();
    }

    fn connection_lost(&mut self) {
        if !self.connected {
            return;
        }
        self.connected = false;
        warn!("Connection to coordinator lost");
        for error in self.rpc_sender.clear() {
            self.pending_events.push(ViewEvent::RpcFailed(error));
        }
        self.rpc_receiver.clear();
        self.writes.clear();
        self.pending_creates.clear();
        self.pool.clear();
        self.outgoing.clear();
    }

    // Tick

    /// Receives and applies everything the coordinator sent, retransmits
    /// unacknowledged RPCs, flushes buffered writes and reports the resulting
    /// events to `callbacks` in order. Returns `ConnectionLost` once the
    /// session is gone, after reporting the last events.
    pub fn tick(
        &mut self,
        now: Instant,
        callbacks: &mut dyn ViewCallbacks,
    ) -> Result<(), WorkerError> {
        let mut events = std::mem::take(&mut self.pending_events);

        if self.connected {
            let ops = self.receive_all_packets();
            self.process_ops(now, ops, &mut events);
        }
        if self.connected {
            self.send_all_packets(now, &mut events);
        }

        events.append(&mut self.pending_events);
        let context = ViewContext::new(&self.store, &self.authority, self.worker);
        for sub_view in self.sub_views.values_mut() {
            sub_view.advance(&events, &context);
        }
        self.dispatcher.dispatch(&events, callbacks);
        if self.connected {
            Ok(())
        } else {
            Err(WorkerError::ConnectionLost)
        }
    }

    fn receive_all_packets(&mut self) -> Vec<DownstreamOp> {
        let mut ops = Vec::new();
        loop {
            match self.session.receive() {
                Ok(Some(packet)) => match self.decoder.try_decode::<DownstreamOp>(&packet) {
                    Ok(decoded) => ops.extend(decoded.ops),
                    Err(err) => warn!("Discarding packet from coordinator: {}", err),
                },
                Ok(None) => break,
                Err(RecvError::Closed) => {
                    self.connection_lost();
                    break;
                }
            }
        }
        ops
    }

    /// Applies ops in arrival order. Consecutive view ops go to the view
    /// computer together.
    fn process_ops(&mut self, now: Instant, ops: Vec<DownstreamOp>, events: &mut Vec<ViewEvent>) {
        let mut view_ops = Vec::new();
        for op in ops {
            if op.view_entity().is_some() {
                view_ops.push(op);
                continue;
            }
            self.apply_view_ops(std::mem::take(&mut view_ops), events);
            if let DownstreamOp::Welcome { worker } = op {
                info!("Welcomed as {}", worker);
                self.worker = Some(worker);
                self.view.set_local_worker(worker);
            } else {
                self.handle_op(now, op, events);
            }
        }
        self.apply_view_ops(view_ops, events);
    }

    fn apply_view_ops(&mut self, ops: Vec<DownstreamOp>, events: &mut Vec<ViewEvent>) {
        if ops.is_empty() {
            return;
        }
        let view_events = self.view.process_batch(ops, &self.store, &self.authority);
        for event in view_events {
            self.follow_view_event(&event, events);
        }
    }

    /// Pushes `event`, along with anything it implies for local state
    fn follow_view_event(&mut self, event: &ViewEvent, events: &mut Vec<ViewEvent>) {
        events.push(event.clone());
        match event {
            ViewEvent::AuthorityChanged {
                entity,
                kind,
                has_authority: false,
            } => {
                let Some(set) = self.protocol.set_of(kind) else {
                    return;
                };
                let count = self.writes.discard(entity, &set);
                if count > 0 {
                    info!("Lost {}/{}, discarded {} buffered writes", entity, set, count);
                    events.push(ViewEvent::WritesDiscarded {
                        entity: *entity,
                        set,
                        count,
                    });
                }
            }
            ViewEvent::EntityRemoved { entity, deleted } => {
                for (set, count) in self.writes.discard_entity(entity) {
                    if count > 0 {
                        events.push(ViewEvent::WritesDiscarded {
                            entity: *entity,
                            set,
                            count,
                        });
                    }
                }
                if *deleted {
                    self.rpc_sender.drop_target(*entity);
                    self.rpc_receiver.drop_target(*entity);
                }
            }
            _ => {}
        }
    }

    fn handle_op(&mut self, now: Instant, op: DownstreamOp, events: &mut Vec<ViewEvent>) {
        match op {
            DownstreamOp::Rpc { sender, envelope } => {
                let (target, kind) = (envelope.target, envelope.kind);
                let received = self.rpc_receiver.receive(sender, envelope);
                for delivered in received.deliver {
                    events.push(ViewEvent::RpcReceived {
                        entity: delivered.target,
                        kind: delivered.kind,
                        command: delivered.command,
                        payload: delivered.payload,
                        sender,
                    });
                }
                if let Some(sequence) = received.ack {
                    self.outgoing.push(UpstreamOp::RpcAck {
                        sender,
                        target,
                        kind,
                        sequence,
                    });
                }
            }
            DownstreamOp::RpcAck {
                target,
                kind,
                sequence,
            } => {
                self.rpc_sender.ack(target, kind, sequence);
            }
            DownstreamOp::AuthorityDenied { entity, set } => {
                if let Some(worker) = self.worker {
                    // withdraw the local pending request
                    if let Err(err) = self.authority.begin_release(entity, set, worker) {
                        debug!("Denial of {}/{} had nothing to withdraw: {}", entity, set, err);
                    }
                }
                events.push(ViewEvent::AuthorityDenied { entity, set });
            }
            DownstreamOp::ReserveEntityIdsResponse { first, count, ttl } => {
                self.pool.on_reserved(now, first, count, ttl);
            }
            DownstreamOp::CreateEntityResponse { entity, accepted } => {
                if self.pending_creates.remove(&entity).is_none() {
                    debug!("Create response for unknown {}", entity);
                }
                if !accepted {
                    warn!("Coordinator refused to create {}", entity);
                }
                events.push(ViewEvent::EntityCreated { entity, accepted });
            }
            DownstreamOp::DeleteEntityResponse { entity, accepted } => {
                if !accepted {
                    warn!("Coordinator refused to delete {}", entity);
                }
            }
            DownstreamOp::WorkerLeft { worker } => {
                debug!("{} left, dropping its RPC streams", worker);
                self.rpc_receiver.drop_sender(worker);
            }
            other => debug!("Ignoring unexpected op {:?}", other),
        }
    }

    fn send_all_packets(&mut self, now: Instant, events: &mut Vec<ViewEvent>) {
        for envelope in self.rpc_sender.collect_outgoing(now) {
            self.outgoing.push(UpstreamOp::Rpc(envelope));
        }
        for error in self.rpc_sender.take_failures() {
            warn!("{}", error);
            events.push(ViewEvent::RpcFailed(error));
        }

        if self.worker.is_some() {
            self.pool.expire(now);
            if let Some(count) = self.pool.refresh_request() {
                self.pool.mark_requested(now);
                self.outgoing.push(UpstreamOp::ReserveEntityIds { count });
            }
        }

        self.flush_writes();
        if self.outgoing.is_empty() {
            return;
        }
        let ops = std::mem::take(&mut self.outgoing);
        let payload = match self.encoder.try_encode(&ops) {
            Ok(payload) => payload,
            Err(err) => {
                warn!("Dropping {} outbound ops: {}", ops.len(), err);
                return;
            }
        };
        if let Err(err) = self.session.send(payload) {
            warn!("Sending to coordinator failed: {}", err);
            self.connection_lost();
        }
    }
}
