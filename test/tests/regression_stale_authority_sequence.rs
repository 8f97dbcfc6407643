/// Regression: an authority change delayed behind a newer one must not be
/// applied, or a worker briefly believes it regained authority it lost

use std::sync::Arc;

use mosaic_shared::{
    AuthorityError, AuthorityManager, AuthorityState, ComponentStore, DownstreamOp, EntityId,
    ViewDeltaComputer, ViewEvent, WorkerId,
};
use mosaic_test::{position, protocol, PHYSICS, POSITION};

const ME: WorkerId = WorkerId::new(1);
const OTHER: WorkerId = WorkerId::new(2);
const ENTITY: EntityId = EntityId::new(40);

#[test]
fn sequence_five_after_seven_is_rejected() {
    let authority = AuthorityManager::new(Arc::new(protocol()));
    authority.register_entity(ENTITY);

    assert_eq!(authority.apply_grant(ENTITY, PHYSICS, OTHER, 7, true), Ok(None));
    let result = authority.apply_grant(ENTITY, PHYSICS, ME, 5, true);
    assert_eq!(
        result,
        Err(AuthorityError::StaleSequence {
            entity: ENTITY,
            last_applied: 7,
            attempted: 5,
        })
    );
    assert_eq!(
        authority.state(&ENTITY, &PHYSICS),
        Some(AuthorityState::Owned { owner: OTHER })
    );
    assert_eq!(authority.last_sequence(&ENTITY), Some(7));
}

#[test]
fn stale_change_in_op_stream_produces_no_event() {
    let authority = AuthorityManager::new(Arc::new(protocol()));
    let store = ComponentStore::new();
    let mut view = ViewDeltaComputer::new(ME);

    let events = view.process_batch(
        vec![
            DownstreamOp::AddEntity { entity: ENTITY },
            DownstreamOp::AddComponent {
                entity: ENTITY,
                component: position(0.0, 0.0),
            },
            DownstreamOp::InitialStateComplete { entity: ENTITY },
            DownstreamOp::AuthorityChange {
                entity: ENTITY,
                set: PHYSICS,
                authoritative: false,
                sequence: 7,
            },
        ],
        &store,
        &authority,
    );
    assert!(matches!(events.as_slice(), [ViewEvent::EntityAdded { .. }]));

    let events = view.process_batch(
        vec![DownstreamOp::AuthorityChange {
            entity: ENTITY,
            set: PHYSICS,
            authoritative: true,
            sequence: 5,
        }],
        &store,
        &authority,
    );
    assert!(events.is_empty());
    assert!(authority.check_write(ENTITY, POSITION, ME).is_err());
}
