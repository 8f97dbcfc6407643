/// Regression: a denial followed by a grant for the same set must be applied
/// in that order, even when both arrive in one tick

use mosaic_shared::{AuthorityState, Position};
use mosaic_test::{position, Recorded, TestCluster, PHYSICS, POSITION, VELOCITY};

#[test]
fn denial_then_grant_leaves_the_worker_owning_the_set() {
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
        .worker(b)
        .client
        .request_authority(entity, PHYSICS)
        .unwrap();
    cluster.settle();
    cluster.worker(a).callbacks.clear();

    // contended while b holds the set
    cluster
        .worker(a)
        .client
        .request_authority(entity, PHYSICS)
        .unwrap();
    cluster.tick_worker(a);
    cluster.tick_coordinator();

    // a is not ticked, so the grant lands in the same receive as the denial
    let a_id = cluster.worker_id(a);
    cluster
        .coordinator
        .revoke_authority(entity, PHYSICS)
        .unwrap();
    cluster
        .coordinator
        .assign_authority(entity, PHYSICS, a_id)
        .unwrap();
    cluster.tick_coordinator();
    cluster.tick_worker(a);

    assert_eq!(
        cluster.worker(a).callbacks.take(),
        vec![
            Recorded::AuthorityDenied(entity, PHYSICS),
            Recorded::AuthorityChanged(entity, POSITION, true),
            Recorded::AuthorityChanged(entity, VELOCITY, true),
        ]
    );
    assert_eq!(
        cluster.worker(a).client.authority().state(&entity, &PHYSICS),
        Some(AuthorityState::Owned { owner: a_id })
    );
    assert!(cluster
        .worker(a)
        .client
        .release_authority(entity, PHYSICS)
        .is_ok());
}
