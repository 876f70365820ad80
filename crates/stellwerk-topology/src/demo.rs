//! The built-in demo station.
//!
//! A two-line, four-platform layout: an eastbound line entering at
//! section 0 and exiting at 41, a westbound line entering at 141 and
//! exiting at 100, platform tracks 1/2 served eastbound (left approach)
//! and 3/4 served westbound (right approach), plus an inactive siding
//! behind the entry switch at section 2.
//!
//! ```text
//!  x:   0     1     2     3      4     5     6      7     8  9
//!
//!  0 -- 2 -- 10 -- 20 --+-- 30 - 31 - 32 --+------ 40 -- 41
//!       \                \                  \
//!        1000             +- 128 -129 -130 -+
//!
//!                      +--- 212 -213 - 214 ---+--- 140 -- 141
//!                      |                      |
//!                      +--- 300 -301 - 302 ---+
//!  100 - 101 -- 104 ---+          (westbound lines read right-to-left)
//! ```
//!
//! Track 1 is additionally signalled westbound (32 → 31 → 30) with a
//! crossover 140 → 32 from the westbound line and 30 → 104 to the west
//! exit, so westbound trains can call at Track 1 and eastbound trains
//! can reverse out west. V-turns at the crossovers are forbidden by
//! previous-block exclusions.

use crate::graph::{Approach, SectionKind, Topology};
use crate::loader::{BlockSpec, ConnectionSpec, SectionSpec, SpawnSpec, StopSpec, TopologySpec};

fn section(id: u32, x: f64, kind: SectionKind) -> SectionSpec {
    SectionSpec {
        id,
        kind,
        x,
        length: 1.0,
    }
}

fn conn(from: u32, to: u32) -> ConnectionSpec {
    ConnectionSpec {
        from,
        to,
        active: true,
        exclude_previous_block: None,
    }
}

fn conn_excl(from: u32, to: u32, exclude: &str) -> ConnectionSpec {
    ConnectionSpec {
        from,
        to,
        active: true,
        exclude_previous_block: Some(exclude.to_string()),
    }
}

/// The declarative description of the demo station.
pub fn demo_station_spec() -> TopologySpec {
    use SectionKind::{Diagonal, Horizontal};

    let sections = vec![
        // Eastbound approach.
        section(0, 0.0, Horizontal),
        section(2, 1.0, Horizontal),
        section(10, 2.0, Horizontal),
        section(20, 3.0, Horizontal),
        // Siding behind the entry switch.
        section(1000, 2.0, Horizontal),
        // Platform tracks, west ramp / platform / east ramp.
        section(30, 4.0, Diagonal),
        section(31, 5.0, Horizontal),
        section(32, 6.0, Diagonal),
        section(128, 4.0, Diagonal),
        section(129, 5.0, Horizontal),
        section(130, 6.0, Diagonal),
        section(212, 4.0, Diagonal),
        section(213, 5.0, Horizontal),
        section(214, 6.0, Diagonal),
        section(300, 4.0, Diagonal),
        section(301, 5.0, Horizontal),
        section(302, 6.0, Diagonal),
        // East throat and exit.
        section(40, 7.0, Horizontal),
        section(41, 8.0, Horizontal),
        // Westbound approach.
        section(141, 9.0, Horizontal),
        section(140, 7.0, Horizontal),
        // West exit line.
        section(104, 3.0, Horizontal),
        section(101, 1.0, Horizontal),
        section(100, 0.0, Horizontal),
    ];

    let connections = vec![
        // Eastbound main.
        conn(0, 2),
        conn(2, 10),
        conn(10, 20),
        // Siding (ships inactive).
        ConnectionSpec {
            from: 2,
            to: 1000,
            active: false,
            exclude_previous_block: None,
        },
        // West ladder.
        conn(20, 30),
        conn(20, 128),
        // Track 1, both directions.
        conn(30, 31),
        conn(31, 32),
        conn(32, 31),
        conn(31, 30),
        // Track 2, eastbound.
        conn(128, 129),
        conn(129, 130),
        // East throat. Leaving Track 1 eastward is a V for trains that
        // came in through the 140 crossover.
        conn_excl(32, 40, "section-140"),
        conn(130, 40),
        conn(40, 41),
        // Westbound main and east ladder.
        conn(141, 140),
        conn(140, 214),
        conn(140, 302),
        conn(140, 32),
        // Tracks 3 and 4, westbound.
        conn(214, 213),
        conn(213, 212),
        conn(302, 301),
        conn(301, 300),
        // West throat and exit.
        conn(212, 104),
        conn(300, 104),
        conn(104, 101),
        conn(101, 100),
        // Crossover: Track 1 to the west exit. A train that just arrived
        // through section 20 cannot V-turn straight back west.
        conn_excl(30, 104, "section-20"),
    ];

    TopologySpec {
        sections,
        connections,
        blocks: vec![
            BlockSpec {
                name: "track-1".into(),
                sections: vec![30, 31, 32],
            },
            BlockSpec {
                name: "track-2".into(),
                sections: vec![128, 129, 130],
            },
            BlockSpec {
                name: "track-3".into(),
                sections: vec![212, 213, 214],
            },
            BlockSpec {
                name: "track-4".into(),
                sections: vec![300, 301, 302],
            },
        ],
        stops: vec![
            StopSpec {
                id: 1,
                name: "Track 1".into(),
                section: 31,
                approach: Approach::Left,
            },
            StopSpec {
                id: 2,
                name: "Track 2".into(),
                section: 129,
                approach: Approach::Left,
            },
            StopSpec {
                id: 3,
                name: "Track 3".into(),
                section: 213,
                approach: Approach::Right,
            },
            StopSpec {
                id: 4,
                name: "Track 4".into(),
                section: 301,
                approach: Approach::Right,
            },
        ],
        spawns: vec![
            SpawnSpec {
                section: 0,
                exit: 41,
            },
            SpawnSpec {
                section: 141,
                exit: 100,
            },
        ],
        despawns: vec![41, 100],
    }
}

/// The demo station, loaded and validated.
pub fn demo_station() -> Topology {
    Topology::from_spec(demo_station_spec()).expect("demo station spec is valid")
}

#[cfg(test)]
mod tests {
    use super::*;
    use stellwerk_core::{SectionId, StopId};

    #[test]
    fn demo_station_validates() {
        let topo = demo_station();
        assert_eq!(topo.section_count(), 24);
        assert!(topo.is_spawn(SectionId(0)));
        assert!(topo.is_spawn(SectionId(141)));
        assert!(topo.is_despawn(SectionId(41)));
        assert!(topo.is_despawn(SectionId(100)));
    }

    #[test]
    fn four_stops_two_per_side() {
        let topo = demo_station();
        let left = topo
            .stops()
            .filter(|s| s.approach == Approach::Left)
            .count();
        let right = topo
            .stops()
            .filter(|s| s.approach == Approach::Right)
            .count();
        assert_eq!((left, right), (2, 2));
        assert_eq!(topo.stop(StopId(1)).unwrap().section, SectionId(31));
        assert_eq!(topo.stop(StopId(3)).unwrap().section, SectionId(213));
    }

    #[test]
    fn transit_exits_are_opposite_side() {
        let topo = demo_station();
        assert_eq!(
            topo.spawn_point(SectionId(0)).unwrap().exit,
            SectionId(41)
        );
        assert_eq!(
            topo.spawn_point(SectionId(141)).unwrap().exit,
            SectionId(100)
        );
    }

    #[test]
    fn platform_blocks_are_declared() {
        let topo = demo_station();
        let b = topo.block_of(SectionId(31)).unwrap();
        assert_eq!(topo.block(b).name, "track-1");
        assert_eq!(topo.sections_of(b).len(), 3);
        // The approach line runs on implicit one-section blocks so trains
        // can follow nose-to-tail.
        let a = topo.block_of(SectionId(10)).unwrap();
        assert_eq!(topo.sections_of(a), &[SectionId(10)]);
    }
}
