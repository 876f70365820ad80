//! Property test: arbitrary traffic never violates the occupancy
//! invariants.
//!
//! Random spawn mixes (both entries, both train types, 1-6 wagons, any
//! stop or none) are injected while the engine runs. The engine's own
//! assertion layer halts on any internal contradiction, so a clean
//! `execute_tick` result every tick *is* the property; the snapshot
//! checks re-verify it from the outside.

use proptest::prelude::*;
use std::collections::{HashMap, HashSet};
use stellwerk_core::{Command, SectionId, SpawnRequest, StopId, TrainId, TrainTypeId};
use stellwerk_engine::{SimConfig, SimulationEngine};
use stellwerk_topology::demo::demo_station;

#[derive(Clone, Debug)]
struct SpawnMix {
    entry: u32,
    train_type: u32,
    wagons: u8,
    stop: Option<u32>,
}

fn arb_spawn() -> impl Strategy<Value = SpawnMix> {
    (
        prop::sample::select(vec![0u32, 141]),
        1u32..=2,
        1u8..=6,
        prop::option::of(1u32..=4),
    )
        .prop_map(|(entry, train_type, wagons, stop)| SpawnMix {
            entry,
            train_type,
            wagons,
            stop,
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn random_traffic_preserves_invariants(
        mixes in prop::collection::vec(arb_spawn(), 1..8),
        ticks in 100usize..400,
    ) {
        let mut engine = SimulationEngine::new(demo_station(), SimConfig::demo()).unwrap();
        let mut spawns = mixes.into_iter().enumerate();

        for tick in 0..ticks {
            // Inject the next spawn every 25 ticks; rejections (entry
            // busy, duplicate) are part of the chaos.
            let commands = if tick % 25 == 0 {
                match spawns.next() {
                    Some((i, mix)) => vec![Command::Spawn(SpawnRequest {
                        train_id: TrainId(i as u32 + 1),
                        code: format!("X {i}"),
                        train_type: TrainTypeId(mix.train_type),
                        entry_section: SectionId(mix.entry),
                        num_wagons: mix.wagons,
                        desired_stop: mix.stop.map(StopId),
                    })],
                    None => vec![],
                }
            } else {
                vec![]
            };

            let result = engine.execute_tick(commands);
            prop_assert!(result.is_ok(), "engine halted: {:?}", result.err());

            let snap = engine.snapshot();
            let mut sections = HashSet::new();
            let mut block_owner: HashMap<_, TrainId> = HashMap::new();
            for w in &snap.wagons {
                prop_assert!(
                    sections.insert(w.section),
                    "tick {}: section {} doubly occupied",
                    snap.tick,
                    w.section
                );
                prop_assert!(
                    (0.0..1.0).contains(&w.position_offset),
                    "tick {}: offset {} out of range",
                    snap.tick,
                    w.position_offset
                );
                let block = engine.topology().block_of(w.section).unwrap();
                if let Some(&owner) = block_owner.get(&block) {
                    prop_assert_eq!(owner, w.train, "two trains share a block");
                }
                block_owner.insert(block, w.train);
            }
        }
    }
}
