/// Regression: an entity kept in view only by authority must leave the
/// worker's view after the authority is gone, with the loss reported first

use mosaic_shared::Position;
use mosaic_test::{position, Recorded, TestCluster, PHYSICS, POSITION, VELOCITY};

#[test]
fn revoke_outside_query_reports_loss_then_removal() {
    let mut cluster = TestCluster::new();
    let a = cluster.add_worker();
    let entity = cluster
        .coordinator
        .spawn_entity(vec![position(0.0, 0.0)])
        .unwrap();
    cluster.watch_area(a, Position::default(), 50.0);
    cluster
        .worker(a)
        .client
        .request_authority(entity, PHYSICS)
        .unwrap();
    cluster.settle();

    cluster
        .worker(a)
        .client
        .write_component(entity, POSITION, Position::new(600.0, 0.0, 0.0).to_bytes())
        .unwrap();
    cluster.settle();
    assert!(cluster.worker(a).client.is_visible(&entity));
    cluster.worker(a).callbacks.clear();

    cluster.coordinator.revoke_authority(entity, PHYSICS).unwrap();
    cluster.settle();

    let worker = cluster.worker(a);
    assert_eq!(
        worker.callbacks.take(),
        vec![
            Recorded::AuthorityChanged(entity, POSITION, false),
            Recorded::AuthorityChanged(entity, VELOCITY, false),
            Recorded::EntityRemoved(entity),
        ]
    );
    assert!(!worker.client.is_visible(&entity));
    assert!(!cluster.coordinator.interest().has_interest(&cluster.worker_id(a), &entity));
}
