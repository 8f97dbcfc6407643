/// Integration tests for authority handoff between workers through the
/// coordinator

use mosaic_client::WorkerError;
use mosaic_server::CoordinatorError;
use mosaic_shared::{
    AuthorityError, AuthorityState, Constraint, EntityId, InterestQuery, Position,
};
use mosaic_test::{
    health, position, Recorded, TestCluster, HEALTH, PHYSICS, POSITION, VELOCITY,
};

/// Two workers watching the origin and one entity there
fn two_workers() -> (TestCluster, usize, usize, EntityId) {
    let mut cluster = TestCluster::new();
    let a = cluster.add_worker();
    let b = cluster.add_worker();
    let entity = cluster
        .coordinator
        .spawn_entity(vec![position(0.0, 0.0), health(100)])
        .unwrap();
    cluster.watch_area(a, Position::default(), 50.0);
    cluster.watch_area(b, Position::default(), 50.0);
    cluster.worker(a).callbacks.clear();
    cluster.worker(b).callbacks.clear();
    (cluster, a, b, entity)
}

fn grant(cluster: &mut TestCluster, index: usize, entity: EntityId) {
    cluster
        .worker(index)
        .client
        .request_authority(entity, PHYSICS)
        .expect("request should be accepted locally");
    cluster.settle();
    assert!(cluster.worker(index).client.has_authority(&entity, &POSITION));
}

#[test]
fn granted_worker_writes_and_others_observe() {
    let (mut cluster, a, b, entity) = two_workers();
    let a_id = cluster.worker_id(a);

    cluster
        .worker(a)
        .client
        .request_authority(entity, PHYSICS)
        .unwrap();
    cluster.settle();
    assert_eq!(
        cluster.worker(a).callbacks.take(),
        vec![
            Recorded::AuthorityChanged(entity, POSITION, true),
            Recorded::AuthorityChanged(entity, VELOCITY, true),
        ]
    );
    let mut events = cluster.coordinator.take_events();
    assert_eq!(events.take_auth_grants(), vec![(a_id, entity, PHYSICS)]);

    let moved = Position::new(5.0, 0.0, 0.0).to_bytes();
    let version = cluster
        .worker(a)
        .client
        .write_component(entity, POSITION, moved.clone())
        .unwrap();
    assert_eq!(version, 2);
    cluster.settle();

    assert_eq!(
        cluster.coordinator.store().get(&entity, &POSITION).unwrap().version,
        2
    );
    assert_eq!(
        cluster.worker(b).callbacks.take(),
        vec![Recorded::ComponentUpdated(entity, POSITION, moved)]
    );
    // the echo of its own write is not reported back to the writer
    assert!(cluster.worker(a).callbacks.take().is_empty());
}

#[test]
fn write_without_authority_is_rejected_locally() {
    let (mut cluster, a, b, entity) = two_workers();
    grant(&mut cluster, a, entity);

    let result = cluster
        .worker(b)
        .client
        .write_component(entity, POSITION, vec![0; 12]);
    assert!(matches!(
        result,
        Err(WorkerError::Authority(AuthorityError::NotAuthoritative { .. }))
    ));

    let result = cluster
        .worker(a)
        .client
        .write_component(entity, HEALTH, vec![1]);
    assert!(matches!(
        result,
        Err(WorkerError::Authority(AuthorityError::CoordinatorOwned { .. }))
    ));
}

#[test]
fn contended_request_is_denied() {
    let (mut cluster, a, b, entity) = two_workers();
    grant(&mut cluster, a, entity);

    cluster
        .worker(b)
        .client
        .request_authority(entity, PHYSICS)
        .unwrap();
    cluster.settle();

    let worker = cluster.worker(b);
    assert_eq!(
        worker.callbacks.take(),
        vec![Recorded::AuthorityDenied(entity, PHYSICS)]
    );
    assert_eq!(
        worker.client.authority().state(&entity, &PHYSICS),
        Some(AuthorityState::Unowned)
    );
    assert!(cluster.worker(a).client.has_authority(&entity, &POSITION));
}

#[test]
fn release_hands_authority_to_the_next_requester() {
    let (mut cluster, a, b, entity) = two_workers();
    grant(&mut cluster, a, entity);
    cluster.worker(a).callbacks.clear();

    cluster
        .worker(a)
        .client
        .release_authority(entity, PHYSICS)
        .unwrap();
    cluster.settle();
    assert_eq!(
        cluster.worker(a).callbacks.take(),
        vec![
            Recorded::AuthorityChanged(entity, POSITION, false),
            Recorded::AuthorityChanged(entity, VELOCITY, false),
        ]
    );
    assert_eq!(
        cluster.coordinator.authority().state(&entity, &PHYSICS),
        Some(AuthorityState::Unowned)
    );

    grant(&mut cluster, b, entity);
    assert!(!cluster.worker(a).client.has_authority(&entity, &POSITION));
    // grant, release, grant
    assert_eq!(cluster.coordinator.authority().last_sequence(&entity), Some(3));
}

#[test]
fn coordinator_cannot_write_a_set_a_worker_owns() {
    let (mut cluster, a, _, entity) = two_workers();
    grant(&mut cluster, a, entity);

    let result = cluster
        .coordinator
        .write_component(entity, POSITION, vec![0; 12]);
    assert!(matches!(
        result,
        Err(CoordinatorError::Authority(AuthorityError::Contended { .. }))
    ));
    // coordinator-owned kinds stay writable
    assert_eq!(
        cluster.coordinator.write_component(entity, HEALTH, vec![50]).unwrap(),
        2
    );
}

#[test]
fn coordinator_revoke_discards_unsent_writes() {
    let (mut cluster, a, _, entity) = two_workers();
    grant(&mut cluster, a, entity);
    cluster.worker(a).callbacks.clear();

    cluster
        .worker(a)
        .client
        .write_component(entity, POSITION, Position::new(9.0, 0.0, 0.0).to_bytes())
        .unwrap();
    assert_eq!(cluster.worker(a).client.buffered_writes(), 1);

    let a_id = cluster.worker_id(a);
    assert_eq!(cluster.coordinator.revoke_authority(entity, PHYSICS).unwrap(), a_id);
    cluster.settle();

    let worker = cluster.worker(a);
    assert_eq!(
        worker.callbacks.take(),
        vec![
            Recorded::AuthorityChanged(entity, POSITION, false),
            Recorded::WritesDiscarded(entity, PHYSICS, 1),
            Recorded::AuthorityChanged(entity, VELOCITY, false),
        ]
    );
    assert_eq!(worker.client.buffered_writes(), 0);
    assert_eq!(
        cluster.coordinator.store().get(&entity, &POSITION).unwrap().version,
        1
    );
}

#[test]
fn authority_requires_interest() {
    let mut cluster = TestCluster::new();
    let a = cluster.add_worker();
    let entity = cluster
        .coordinator
        .spawn_entity(vec![position(500.0, 0.0)])
        .unwrap();
    cluster.watch_area(a, Position::default(), 50.0);

    let result = cluster.worker(a).client.request_authority(entity, PHYSICS);
    assert!(matches!(result, Err(WorkerError::NotVisible { .. })));

    let a_id = cluster.worker_id(a);
    let result = cluster.coordinator.assign_authority(entity, PHYSICS, a_id);
    assert!(matches!(
        result,
        Err(CoordinatorError::Authority(AuthorityError::NoInterest { .. }))
    ));
}

#[test]
fn held_entity_stays_in_interest_when_it_moves_away() {
    let (mut cluster, a, b, entity) = two_workers();
    grant(&mut cluster, a, entity);

    cluster
        .worker(a)
        .client
        .write_component(entity, POSITION, Position::new(800.0, 0.0, 0.0).to_bytes())
        .unwrap();
    cluster.settle();

    assert!(cluster.worker(a).client.is_visible(&entity));
    assert!(cluster.worker(a).client.has_authority(&entity, &POSITION));
    assert!(!cluster.worker(b).client.is_visible(&entity));

    // once released the query alone decides
    cluster
        .worker(a)
        .client
        .release_authority(entity, PHYSICS)
        .unwrap();
    cluster.settle();
    assert!(!cluster.worker(a).client.is_visible(&entity));
}

#[test]
fn disconnect_queues_authority_for_reassignment() {
    let (mut cluster, a, b, entity) = two_workers();
    grant(&mut cluster, a, entity);
    let (a_id, b_id) = (cluster.worker_id(a), cluster.worker_id(b));
    cluster.coordinator.take_events();

    cluster.worker(a).client.disconnect();
    cluster.settle();
    assert!(cluster.worker(a).lost);
    assert!(!cluster.coordinator.is_connected(&a_id));

    let mut events = cluster.coordinator.take_events();
    assert_eq!(events.take_disconnections(), vec![a_id]);
    assert_eq!(events.take_reassignments(), vec![(entity, PHYSICS)]);
    assert_eq!(
        cluster.coordinator.authority().state(&entity, &PHYSICS),
        Some(AuthorityState::Unowned)
    );

    cluster.worker(b).callbacks.clear();
    cluster
        .coordinator
        .assign_authority(entity, PHYSICS, b_id)
        .unwrap();
    cluster.settle();
    assert_eq!(
        cluster.worker(b).callbacks.take(),
        vec![
            Recorded::AuthorityChanged(entity, POSITION, true),
            Recorded::AuthorityChanged(entity, VELOCITY, true),
        ]
    );
}

#[test]
fn grant_widens_a_filtered_view_and_revocation_narrows_it() {
    let mut cluster = TestCluster::new();
    let a = cluster.add_worker();
    let entity = cluster
        .coordinator
        .spawn_entity(vec![position(0.0, 0.0), health(100)])
        .unwrap();
    let query = InterestQuery::new(Constraint::Component(HEALTH)).with_result_kinds(vec![HEALTH]);
    cluster.worker(a).client.set_interest(vec![query]).unwrap();
    cluster.settle();
    assert!(cluster.worker(a).client.is_visible(&entity));
    assert!(cluster.worker(a).client.store().get(&entity, &POSITION).is_none());
    cluster.worker(a).callbacks.clear();

    let a_id = cluster.worker_id(a);
    cluster
        .coordinator
        .assign_authority(entity, PHYSICS, a_id)
        .unwrap();
    cluster.settle();
    assert!(cluster.worker(a).client.has_authority(&entity, &POSITION));
    assert_eq!(
        cluster.worker(a).client.store().get(&entity, &POSITION),
        cluster.coordinator.store().get(&entity, &POSITION)
    );
    assert_eq!(
        cluster.worker(a).callbacks.take(),
        vec![
            Recorded::ComponentAdded(entity, POSITION),
            Recorded::AuthorityChanged(entity, POSITION, true),
            Recorded::AuthorityChanged(entity, VELOCITY, true),
        ]
    );

    let moved = Position::new(3.0, 0.0, 0.0).to_bytes();
    let version = cluster
        .worker(a)
        .client
        .write_component(entity, POSITION, moved.clone())
        .unwrap();
    assert_eq!(version, 2);
    cluster.settle();
    assert_eq!(
        cluster.coordinator.store().get(&entity, &POSITION).unwrap().state,
        moved
    );

    cluster
        .coordinator
        .revoke_authority(entity, PHYSICS)
        .unwrap();
    cluster.settle();
    assert!(cluster.worker(a).client.store().get(&entity, &POSITION).is_none());
    assert_eq!(
        cluster.worker(a).callbacks.take(),
        vec![
            Recorded::AuthorityChanged(entity, POSITION, false),
            Recorded::AuthorityChanged(entity, VELOCITY, false),
            Recorded::ComponentRemoved(entity, POSITION),
        ]
    );
}
