/// PROPERTY-BASED TESTS: convergence of component state and authority
///
/// Key invariants:
/// 1. Last-writer-wins upserts reach the same state in any arrival order
/// 2. Only writes newer than everything before them are applied
/// 3. A mirror applying authority transitions in any order never goes
///    backwards and ends where the coordinator ended

use std::sync::Arc;

use proptest::prelude::*;

use mosaic_shared::{
    AuthorityManager, AuthorityState, AuthorityTransition, ComponentKind, ComponentStore,
    EntityId, WorkerId,
};
use mosaic_test::{protocol, PHYSICS, POSITION};

const ENTITY: EntityId = EntityId::new(1);

// Strategy for a set of distinct versions plus a random arrival order
fn versions_and_arrival() -> impl Strategy<Value = (Vec<u64>, Vec<u64>)> {
    prop::collection::btree_set(1u64..1000, 1..32).prop_flat_map(|versions| {
        let ordered: Vec<u64> = versions.into_iter().collect();
        (Just(ordered.clone()), Just(ordered).prop_shuffle())
    })
}

fn state_for(version: u64) -> Vec<u8> {
    version.to_le_bytes().to_vec()
}

fn apply_all(kind: ComponentKind, arrival: &[u64]) -> (ComponentStore, usize) {
    let store = ComponentStore::new();
    store.insert_entity(ENTITY, Vec::new()).unwrap();
    let applied = arrival
        .iter()
        .filter(|version| {
            store
                .upsert(ENTITY, kind, state_for(**version), **version)
                .is_applied()
        })
        .count();
    (store, applied)
}

// Strategy for a list of (worker, wants authority) requests
fn authority_ops() -> impl Strategy<Value = Vec<(u32, bool)>> {
    prop::collection::vec((1u32..=3, any::<bool>()), 1..40)
}

proptest! {
    #[test]
    fn prop_upserts_converge_in_any_order((ordered, arrival) in versions_and_arrival()) {
        let (in_order, _) = apply_all(POSITION, &ordered);
        let (shuffled, applied) = apply_all(POSITION, &arrival);

        let newest = *ordered.last().unwrap();
        let expected = in_order.get(&ENTITY, &POSITION).unwrap();
        prop_assert_eq!(expected.version, newest);
        prop_assert_eq!(&expected.state, &state_for(newest));
        prop_assert_eq!(shuffled.get(&ENTITY, &POSITION).unwrap(), expected);

        // a write applies exactly when it beats every earlier arrival
        let mut highest = 0;
        let mut maxima = 0;
        for version in &arrival {
            if *version > highest {
                highest = *version;
                maxima += 1;
            }
        }
        prop_assert_eq!(applied, maxima);
    }

    #[test]
    fn prop_authority_mirror_never_goes_backwards(
        ops in authority_ops(),
        keys in prop::collection::vec(any::<u32>(), 80),
    ) {
        let protocol = Arc::new(protocol());
        let coordinator = AuthorityManager::new(protocol.clone());
        coordinator.register_entity(ENTITY);

        let mut transitions: Vec<AuthorityTransition> = Vec::new();
        for (worker, wants) in ops {
            let worker = WorkerId::new(worker);
            if wants {
                if coordinator.request_grant(ENTITY, PHYSICS, worker, true).is_ok() {
                    transitions.push(coordinator.assign_grant(ENTITY, PHYSICS, &|_| true).unwrap());
                }
            } else if coordinator.begin_release(ENTITY, PHYSICS, worker).is_ok() {
                transitions.push(coordinator.assign_release(ENTITY, PHYSICS).unwrap());
            }
        }
        prop_assume!(!transitions.is_empty());
        for pair in transitions.windows(2) {
            prop_assert!(pair[0].sequence < pair[1].sequence);
        }

        // deliver in a random order
        let mut delivery: Vec<(u32, AuthorityTransition)> = transitions
            .iter()
            .enumerate()
            .map(|(index, transition)| (keys[index % keys.len()], *transition))
            .collect();
        delivery.sort_by_key(|(key, transition)| (*key, transition.sequence));

        let mirror = AuthorityManager::new(protocol);
        mirror.register_entity(ENTITY);
        let mut accepted = Vec::new();
        for (_, transition) in delivery {
            let result = if transition.authoritative {
                mirror.apply_grant(ENTITY, PHYSICS, transition.worker, transition.sequence, true)
            } else {
                mirror.apply_release(ENTITY, PHYSICS, transition.sequence)
            };
            if result.is_ok() {
                accepted.push(transition.sequence);
            }
        }
        for pair in accepted.windows(2) {
            prop_assert!(pair[0] < pair[1]);
        }

        let newest = transitions.last().unwrap();
        prop_assert_eq!(accepted.last(), Some(&newest.sequence));
        prop_assert_eq!(mirror.last_sequence(&ENTITY), coordinator.last_sequence(&ENTITY));
        let expected = if newest.authoritative {
            AuthorityState::Owned { owner: newest.worker }
        } else {
            AuthorityState::Unowned
        };
        prop_assert_eq!(mirror.state(&ENTITY, &PHYSICS), Some(expected));
        prop_assert_eq!(coordinator.state(&ENTITY, &PHYSICS), Some(expected));
    }
}
