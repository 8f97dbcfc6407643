/// Integration tests for sub views and per-component callbacks on a worker

use std::sync::{Arc, Mutex};

use mosaic_shared::{EntityId, Position, RefreshTrigger, SubView};
use mosaic_test::{health, inventory, position, TestCluster, HEALTH, INVENTORY};

fn alive_with_items() -> SubView {
    SubView::new(
        INVENTORY,
        |entity, context| {
            context
                .get(&entity, &HEALTH)
                .map(|health| health.state.first().copied().unwrap_or(0) > 0)
                .unwrap_or(false)
        },
        vec![RefreshTrigger::ComponentChanged(HEALTH)],
    )
}

#[test]
fn sub_view_follows_tag_and_filter() {
    let mut cluster = TestCluster::new();
    let a = cluster.add_worker();
    let stocked = cluster
        .coordinator
        .spawn_entity(vec![position(0.0, 0.0), inventory(&[1]), health(100)])
        .unwrap();
    let untagged = cluster
        .coordinator
        .spawn_entity(vec![position(1.0, 0.0), health(100)])
        .unwrap();
    let fallen = cluster
        .coordinator
        .spawn_entity(vec![position(2.0, 0.0), inventory(&[]), health(0)])
        .unwrap();
    let view = cluster.worker(a).client.add_sub_view(alive_with_items());
    cluster.watch_area(a, Position::default(), 50.0);

    let complete: Vec<EntityId> = {
        let sub_view = cluster.worker(a).client.sub_view(&view).unwrap();
        sub_view.complete_entities().iter().copied().collect()
    };
    assert_eq!(complete, vec![stocked]);
    assert!(cluster.worker(a).client.is_visible(&untagged));

    cluster
        .coordinator
        .write_component(fallen, HEALTH, vec![30])
        .unwrap();
    cluster.tick_coordinator();
    cluster.tick_worker(a);
    let sub_view = cluster.worker(a).client.sub_view(&view).unwrap();
    assert_eq!(sub_view.delta().entered, vec![fallen]);
    assert!(sub_view.is_complete(&fallen));

    cluster
        .coordinator
        .write_component(stocked, HEALTH, vec![0])
        .unwrap();
    cluster.tick_coordinator();
    cluster.tick_worker(a);
    let sub_view = cluster.worker(a).client.sub_view(&view).unwrap();
    assert_eq!(sub_view.delta().left, vec![stocked]);
    assert!(!sub_view.is_complete(&stocked));
}

#[test]
fn sub_view_added_late_sees_existing_entities() {
    let mut cluster = TestCluster::new();
    let a = cluster.add_worker();
    let entity = cluster
        .coordinator
        .spawn_entity(vec![position(0.0, 0.0), inventory(&[2]), health(10)])
        .unwrap();
    cluster.watch_area(a, Position::default(), 50.0);

    let view = cluster.worker(a).client.add_sub_view(alive_with_items());
    assert!(cluster
        .worker(a)
        .client
        .sub_view(&view)
        .unwrap()
        .is_complete(&entity));
    cluster.tick_worker(a);
    assert_eq!(
        cluster.worker(a).client.sub_view(&view).unwrap().delta().entered,
        vec![entity]
    );
    assert!(cluster.worker(a).client.remove_sub_view(&view).is_some());
    assert!(!cluster.worker(a).client.refresh_sub_view(&view));
}

#[test]
fn component_callbacks_run_until_removed() {
    let mut cluster = TestCluster::new();
    let a = cluster.add_worker();
    let entity = cluster
        .coordinator
        .spawn_entity(vec![position(0.0, 0.0), health(10)])
        .unwrap();

    let updates = Arc::new(Mutex::new(Vec::new()));
    let added = Arc::new(Mutex::new(Vec::new()));
    let seen = updates.clone();
    let id = cluster
        .worker(a)
        .client
        .dispatcher_mut()
        .register_component_updated(HEALTH, move |entity, component| {
            seen.lock().unwrap().push((entity, component.state.clone()));
        });
    let seen = added.clone();
    cluster
        .worker(a)
        .client
        .dispatcher_mut()
        .register_component_added(HEALTH, move |entity, _| {
            seen.lock().unwrap().push(entity);
        });
    cluster.watch_area(a, Position::default(), 50.0);
    assert_eq!(*added.lock().unwrap(), vec![entity]);

    cluster
        .coordinator
        .write_component(entity, HEALTH, vec![9])
        .unwrap();
    cluster.settle();
    assert!(cluster.worker(a).client.dispatcher_mut().remove_callback(id));
    cluster
        .coordinator
        .write_component(entity, HEALTH, vec![8])
        .unwrap();
    cluster.settle();

    assert_eq!(*updates.lock().unwrap(), vec![(entity, vec![9])]);
    assert_eq!(
        cluster.worker(a).client.store().get(&entity, &HEALTH).unwrap().state,
        vec![8]
    );
}
