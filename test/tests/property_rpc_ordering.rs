/// PROPERTY-BASED TESTS: reliable RPC delivery over a misbehaving link
///
/// Packets from the caller are duplicated and reordered. Every reliable RPC
/// must still reach the authoritative worker exactly once, in send order.

use std::time::Duration;

use proptest::prelude::*;

use mosaic_client::WorkerConfig;
use mosaic_shared::{transport::LinkConditionerConfig, Position, ReliabilityTier, RpcConfig};
use mosaic_test::{position, TestCluster, PHYSICS, PING, POSITION};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_reliable_rpcs_delivered_once_in_order(
        count in 1u8..24,
        duplicate in 0.0f32..0.6,
        reorder in 0.0f32..0.6,
        seed in any::<u64>(),
    ) {
        let mut cluster = TestCluster::new();
        let config = WorkerConfig {
            rpc: RpcConfig {
                max_retries: 50,
                ..Default::default()
            },
            ..Default::default()
        };
        let conditioner = LinkConditionerConfig::new(duplicate, reorder, seed);
        let a = cluster.add_worker_with(config, Some(conditioner));
        let b = cluster.add_worker();

        let entity = cluster.coordinator.spawn_entity(vec![position(0.0, 0.0)]).unwrap();
        cluster.watch_area(b, Position::default(), 50.0);
        cluster.worker(b).client.request_authority(entity, PHYSICS).unwrap();
        cluster.settle();
        prop_assert!(cluster.worker(b).client.has_authority(&entity, &POSITION));

        for value in 0..count {
            let now = cluster.now();
            cluster
                .worker(a)
                .client
                .call_rpc(now, entity, POSITION, PING, vec![value], ReliabilityTier::Reliable)
                .unwrap();
            if value % 3 == 0 {
                cluster.tick();
            }
        }
        for _ in 0..200 {
            cluster.advance(Duration::from_millis(50));
            cluster.tick();
            if cluster.worker(a).client.pending_rpcs() == 0 {
                break;
            }
        }
        cluster.settle();

        let expected: Vec<Vec<u8>> = (0..count).map(|value| vec![value]).collect();
        prop_assert_eq!(cluster.worker(b).callbacks.rpc_payloads(PING), expected);
        prop_assert_eq!(cluster.worker(a).client.pending_rpcs(), 0);
    }
}
