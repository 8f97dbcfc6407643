/// Regression: writes buffered before a release must reach the coordinator
/// ahead of the release, not be dropped with the lost authority

use mosaic_shared::Position;
use mosaic_test::{position, Recorded, TestCluster, PHYSICS, POSITION, VELOCITY};

#[test]
fn write_then_release_in_one_tick_keeps_the_write() {
    let mut cluster = TestCluster::new();
    let a = cluster.add_worker();
    let b = cluster.add_worker();
    let entity = cluster
        .coordinator
        .spawn_entity(vec![position(0.0, 0.0)])
        .unwrap();
    cluster.watch_area(a, Position::default(), 50.0);
    cluster.watch_area(b, Position::default(), 50.0);
    cluster
        .worker(a)
        .client
        .request_authority(entity, PHYSICS)
        .unwrap();
    cluster.settle();
    cluster.worker(a).callbacks.clear();
    cluster.worker(b).callbacks.clear();

    let moved = Position::new(7.0, 0.0, 0.0).to_bytes();
    cluster
        .worker(a)
        .client
        .write_component(entity, POSITION, moved.clone())
        .unwrap();
    cluster
        .worker(a)
        .client
        .release_authority(entity, PHYSICS)
        .unwrap();
    assert_eq!(cluster.worker(a).client.buffered_writes(), 0);
    cluster.settle();

    let stored = cluster.coordinator.store().get(&entity, &POSITION).unwrap();
    assert_eq!(stored.version, 2);
    assert_eq!(stored.state, moved);
    assert_eq!(
        cluster.worker(b).callbacks.take(),
        vec![Recorded::ComponentUpdated(entity, POSITION, moved)]
    );
    assert_eq!(
        cluster.worker(a).callbacks.take(),
        vec![
            Recorded::AuthorityChanged(entity, POSITION, false),
            Recorded::AuthorityChanged(entity, VELOCITY, false),
        ]
    );
}
