/// Integration tests for worker-created entities, id reservation and deletion

use std::time::Duration;

use mosaic_client::{EntityPoolConfig, WorkerConfig, WorkerError};
use mosaic_server::LifecycleError;
use mosaic_shared::{ComponentData, ComponentKind, Position};
use mosaic_test::{
    health, inventory, position, Recorded, TestCluster, ITEMS, POSITION, VELOCITY,
};

#[test]
fn handshake_reserves_ids() {
    let mut cluster = TestCluster::new();
    let a = cluster.add_worker();
    let worker = cluster.worker(a);
    assert!(worker.client.worker_id().is_some());
    assert_eq!(
        worker.client.reserved_ids(),
        worker.client.config().pool.initial_reservation as usize
    );
}

#[test]
fn created_entity_appears_before_its_confirmation() {
    let mut cluster = TestCluster::new();
    let a = cluster.add_worker();
    let a_id = cluster.worker_id(a);

    let entity = cluster
        .worker(a)
        .client
        .create_entity(vec![position(3.0, 3.0)])
        .unwrap();
    assert!(cluster.worker(a).client.is_creating(&entity));
    assert!(!cluster.worker(a).client.is_visible(&entity));
    cluster.settle();

    let worker = cluster.worker(a);
    let recorded = worker.callbacks.take();
    assert!(matches!(recorded.first(), Some(Recorded::EntityAdded(added, _)) if *added == entity));
    assert_eq!(
        &recorded[1..],
        &[
            Recorded::AuthorityChanged(entity, POSITION, true),
            Recorded::AuthorityChanged(entity, VELOCITY, true),
            Recorded::EntityCreated(entity, true),
        ]
    );
    assert!(!worker.client.is_creating(&entity));
    assert!(worker.client.has_authority(&entity, &POSITION));

    let mut events = cluster.coordinator.take_events();
    assert_eq!(events.take_creates(), vec![(a_id, entity)]);
}

#[test]
fn creator_owns_only_the_sets_it_supplied() {
    let mut cluster = TestCluster::new();
    let a = cluster.add_worker();

    let entity = cluster
        .worker(a)
        .client
        .create_entity(vec![position(0.0, 0.0), inventory(&[4]), health(10)])
        .unwrap();
    cluster.settle();

    let authority = cluster.coordinator.authority();
    let a_id = cluster.workers[a].id;
    assert_eq!(authority.writer_of(&entity, &POSITION), Some(a_id));
    assert_eq!(
        authority
            .state(&entity, &ITEMS)
            .and_then(|state| state.writer()),
        Some(a_id)
    );
    assert!(cluster.workers[a].client.has_authority(&entity, &VELOCITY));
}

#[test]
fn other_workers_see_a_created_entity_through_interest() {
    let mut cluster = TestCluster::new();
    let a = cluster.add_worker();
    let b = cluster.add_worker();
    cluster.watch_area(b, Position::default(), 50.0);

    let entity = cluster
        .worker(a)
        .client
        .create_entity(vec![position(1.0, 0.0)])
        .unwrap();
    cluster.settle();

    assert!(cluster.worker(b).client.is_visible(&entity));
    assert!(!cluster.worker(b).client.has_authority(&entity, &POSITION));
}

#[test]
fn unknown_component_is_refused_before_sending() {
    let mut cluster = TestCluster::new();
    let a = cluster.add_worker();
    let before = cluster.worker(a).client.reserved_ids();

    let result = cluster
        .worker(a)
        .client
        .create_entity(vec![ComponentData::new(ComponentKind::new(99), 1, vec![])]);
    assert!(matches!(result, Err(WorkerError::UnknownComponent { .. })));
    assert_eq!(cluster.worker(a).client.reserved_ids(), before);
}

#[test]
fn pool_refreshes_below_threshold() {
    let mut cluster = TestCluster::new();
    let config = WorkerConfig {
        pool: EntityPoolConfig {
            initial_reservation: 4,
            refresh_threshold: 2,
            refresh_count: 8,
        },
        ..Default::default()
    };
    let a = cluster.add_worker_with(config, None);
    assert_eq!(cluster.worker(a).client.reserved_ids(), 4);

    for x in 0..3 {
        cluster
            .worker(a)
            .client
            .create_entity(vec![position(x as f32, 0.0)])
            .unwrap();
    }
    assert_eq!(cluster.worker(a).client.reserved_ids(), 1);
    cluster.settle();
    assert_eq!(cluster.worker(a).client.reserved_ids(), 9);
}

#[test]
fn lapsed_reservations_are_replaced() {
    let mut cluster = TestCluster::new();
    let a = cluster.add_worker();
    let a_id = cluster.worker_id(a);
    let reserved = cluster.worker(a).client.reserved_ids();
    assert!(reserved > 0);

    let ttl = cluster.coordinator.config().reservation_ttl;
    cluster.advance(ttl + Duration::from_secs(1));
    cluster.settle();
    assert_eq!(cluster.worker(a).client.reserved_ids(), reserved);

    let entity = cluster
        .worker(a)
        .client
        .create_entity(vec![position(0.0, 0.0)])
        .unwrap();
    cluster.settle();
    assert!(cluster
        .worker(a)
        .callbacks
        .recorded()
        .contains(&Recorded::EntityCreated(entity, true)));
    let mut events = cluster.coordinator.take_events();
    assert!(events.take_rejections().is_empty());
    assert_eq!(events.take_creates(), vec![(a_id, entity)]);
}

#[test]
fn empty_pool_refuses_creation() {
    let mut cluster = TestCluster::new();
    let config = WorkerConfig {
        pool: EntityPoolConfig {
            initial_reservation: 1,
            refresh_threshold: 0,
            refresh_count: 0,
        },
        ..Default::default()
    };
    let a = cluster.add_worker_with(config, None);

    cluster
        .worker(a)
        .client
        .create_entity(vec![position(0.0, 0.0)])
        .unwrap();
    let result = cluster
        .worker(a)
        .client
        .create_entity(vec![position(0.0, 0.0)]);
    assert!(matches!(result, Err(WorkerError::PoolExhausted)));
}

#[test]
fn owner_deletes_its_entity() {
    let mut cluster = TestCluster::new();
    let a = cluster.add_worker();
    let b = cluster.add_worker();
    cluster.watch_area(b, Position::default(), 50.0);
    let entity = cluster
        .worker(a)
        .client
        .create_entity(vec![position(0.0, 0.0)])
        .unwrap();
    cluster.settle();
    cluster.worker(a).callbacks.clear();
    cluster.worker(b).callbacks.clear();

    cluster.worker(a).client.delete_entity(entity).unwrap();
    cluster.settle();

    assert_eq!(
        cluster.worker(a).callbacks.take(),
        vec![
            Recorded::AuthorityChanged(entity, POSITION, false),
            Recorded::AuthorityChanged(entity, VELOCITY, false),
            Recorded::EntityRemoved(entity),
        ]
    );
    assert_eq!(cluster.worker(b).callbacks.take(), vec![Recorded::EntityRemoved(entity)]);
    assert!(cluster.coordinator.store().is_tombstoned(&entity));
    assert!(cluster.coordinator.authority().is_tombstoned(&entity));
    let mut events = cluster.coordinator.take_events();
    assert_eq!(events.take_deletes(), vec![entity]);
}

#[test]
fn delete_is_refused_while_another_worker_holds_authority() {
    let mut cluster = TestCluster::new();
    let a = cluster.add_worker();
    let b = cluster.add_worker();
    cluster.watch_area(b, Position::default(), 50.0);
    let entity = cluster
        .worker(a)
        .client
        .create_entity(vec![position(0.0, 0.0)])
        .unwrap();
    cluster.settle();
    cluster.coordinator.take_events();

    cluster.worker(b).client.delete_entity(entity).unwrap();
    cluster.settle();

    let b_id = cluster.worker_id(b);
    let mut events = cluster.coordinator.take_events();
    let rejections = events.take_rejections();
    assert_eq!(rejections.len(), 1);
    assert!(matches!(
        &rejections[0],
        (worker, LifecycleError::DeleteNotPermitted { entity: refused, .. })
            if *worker == b_id && *refused == entity
    ));
    assert!(cluster.coordinator.store().contains(&entity));
    assert!(cluster.worker(b).client.is_visible(&entity));
}

#[test]
fn invisible_entity_cannot_be_deleted() {
    let mut cluster = TestCluster::new();
    let a = cluster.add_worker();
    let entity = cluster
        .coordinator
        .spawn_entity(vec![position(400.0, 0.0)])
        .unwrap();

    let result = cluster.worker(a).client.delete_entity(entity);
    assert!(matches!(result, Err(WorkerError::NotVisible { .. })));
    assert!(cluster.coordinator.store().contains(&entity));
}
