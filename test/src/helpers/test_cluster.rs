use std::time::{Duration, Instant};

use log::debug;

use mosaic_client::{WorkerClient, WorkerConfig};
use mosaic_server::{Coordinator, ServerConfig};
use mosaic_shared::{
    transport::{LinkConditionerConfig, MemorySession},
    Constraint, EntityId, InterestQuery, Position, WorkerId,
};

use crate::{protocol, server_config, RecordingCallbacks};

/// A worker client together with what it reported to the application
pub struct TestWorker {
    pub id: WorkerId,
    pub client: WorkerClient,
    pub callbacks: RecordingCallbacks,
    /// Set once `tick` reported the connection gone
    pub lost: bool,
}

impl TestWorker {
    pub fn tick(&mut self, now: Instant) {
        if self.lost {
            return;
        }
        if let Err(err) = self.client.tick(now, &mut self.callbacks) {
            debug!("{} stopped ticking: {}", self.id, err);
            self.lost = true;
        }
    }
}

/// One coordinator and any number of workers over in-memory sessions, all
/// driven from a single manual clock
pub struct TestCluster {
    pub coordinator: Coordinator,
    pub workers: Vec<TestWorker>,
    now: Instant,
}

impl Default for TestCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl TestCluster {
    pub fn new() -> Self {
        Self::with_config(server_config())
    }

    pub fn with_config(config: ServerConfig) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        Self {
            coordinator: Coordinator::new(config, protocol()),
            workers: Vec::new(),
            now: Instant::now(),
        }
    }

    /// Connects a worker with the default config and runs the handshake.
    /// Returns its index in `workers`.
    pub fn add_worker(&mut self) -> usize {
        self.add_worker_with(WorkerConfig::default(), None)
    }

    /// Connects a worker, optionally duplicating and reordering everything it
    /// sends upstream, and runs the handshake
    pub fn add_worker_with(
        &mut self,
        config: WorkerConfig,
        conditioner: Option<LinkConditionerConfig>,
    ) -> usize {
        let (worker_end, coordinator_end) = MemorySession::pair();
        let worker_end = match conditioner {
            Some(conditioner) => worker_end.with_conditioner(conditioner),
            None => worker_end,
        };
        let id = self.coordinator.connect(coordinator_end);
        let client = WorkerClient::new(config, protocol(), worker_end);
        self.workers.push(TestWorker {
            id,
            client,
            callbacks: RecordingCallbacks::new(),
            lost: false,
        });
        self.settle();
        self.workers.len() - 1
    }

    pub fn now(&self) -> Instant {
        self.now
    }

    pub fn advance(&mut self, by: Duration) {
        self.now += by;
    }

    pub fn worker(&mut self, index: usize) -> &mut TestWorker {
        &mut self.workers[index]
    }

    pub fn worker_id(&self, index: usize) -> WorkerId {
        self.workers[index].id
    }

    /// Ticks only the coordinator
    pub fn tick_coordinator(&mut self) {
        self.coordinator.tick(self.now);
    }

    /// Ticks only one worker
    pub fn tick_worker(&mut self, index: usize) {
        let now = self.now;
        self.workers[index].tick(now);
    }

    /// One round: the coordinator, then every worker in order
    pub fn tick(&mut self) {
        self.coordinator.tick(self.now);
        let now = self.now;
        for worker in self.workers.iter_mut() {
            worker.tick(now);
        }
    }

    /// Enough rounds for any op to make a full worker → coordinator → worker
    /// trip and be answered
    pub fn settle(&mut self) {
        for _ in 0..4 {
            self.tick();
        }
    }

    /// Gives a worker a circular interest around `center`
    pub fn watch_area(&mut self, index: usize, center: Position, radius: f32) {
        let query = InterestQuery::new(Constraint::Sphere { center, radius });
        let result = self.workers[index].client.set_interest(vec![query]);
        assert!(result.is_ok(), "set_interest failed: {:?}", result);
        self.settle();
    }

    /// Gives a worker interest in exactly these entities
    pub fn watch_entities(&mut self, index: usize, entities: Vec<EntityId>) {
        let query = InterestQuery::new(Constraint::Entities(entities));
        let result = self.workers[index].client.set_interest(vec![query]);
        assert!(result.is_ok(), "set_interest failed: {:?}", result);
        self.settle();
    }
}
