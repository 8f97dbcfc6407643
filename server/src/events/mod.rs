mod coordinator_events;

pub use coordinator_events::CoordinatorEvents;
