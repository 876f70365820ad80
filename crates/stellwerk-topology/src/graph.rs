//! The in-memory topology graph and its query operations.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashMap;
use stellwerk_core::{BlockId, Heading, SectionId, StopId, SwitchError};

/// Geometry class of a section, used by the router's tie-breaking rule:
/// when a move reverses the train, horizontal targets are preferred over
/// diagonal ones.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    /// A straight running section.
    Horizontal,
    /// A ladder or crossover ramp.
    Diagonal,
}

/// Mandated approach direction for a stop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Approach {
    /// Must be entered from the lower-x neighbor, i.e. heading east.
    Left,
    /// Must be entered from the higher-x neighbor, i.e. heading west.
    Right,
}

impl Approach {
    /// Whether an entry with the given heading satisfies this rule.
    pub fn matches(self, heading: Heading) -> bool {
        match self {
            Self::Left => heading == Heading::East,
            Self::Right => heading == Heading::West,
        }
    }

    /// The heading a correctly-approaching train travels with.
    pub fn entry_heading(self) -> Heading {
        match self {
            Self::Left => Heading::East,
            Self::Right => Heading::West,
        }
    }
}

/// A track section, the atomic occupancy unit.
#[derive(Clone, Debug, PartialEq)]
pub struct Section {
    /// External id, as given in the topology input.
    pub id: SectionId,
    /// Geometry class.
    pub kind: SectionKind,
    /// Horizontal coordinate; edge orientation derives from the
    /// endpoints' x values.
    pub x: f64,
    /// Length in abstract units; kinematics divides speed by this.
    pub length: f64,
}

/// A directed connection between two sections.
#[derive(Clone, Debug, PartialEq)]
pub struct Connection {
    /// Source section.
    pub from: SectionId,
    /// Target section.
    pub to: SectionId,
    /// Whether this connection may currently be traversed. Toggled at
    /// runtime by `SetConnectionActive`.
    pub active: bool,
    /// Traversal is forbidden when the train's immediately previous
    /// block equals this block. Encodes V-shaped turn restrictions.
    pub exclude_previous_block: Option<BlockId>,
}

/// A named group of sections; the reservation unit above sections.
#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    /// Dense id assigned at load time.
    pub id: BlockId,
    /// Declared name, or `section-<id>` for implicit one-section blocks.
    pub name: String,
    /// Member sections.
    pub sections: Vec<SectionId>,
}

/// A stop placed on a section, with its mandated approach direction.
#[derive(Clone, Debug, PartialEq)]
pub struct Stop {
    /// External id referenced by spawn requests.
    pub id: StopId,
    /// Display name, e.g. "Track 1".
    pub name: String,
    /// The section the platform sits on.
    pub section: SectionId,
    /// Mandated approach direction; dwell only begins when the entry
    /// heading matches.
    pub approach: Approach,
}

/// A designated entry section and the exit its transit traffic targets.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpawnPoint {
    /// The entry section.
    pub section: SectionId,
    /// The despawn section transit trains from this entry head for.
    pub exit: SectionId,
}

/// The immutable track graph.
///
/// Sections, blocks, and stops live in dense vectors; external ids
/// resolve through lookup maps. Cross-references everywhere are ids.
#[derive(Clone, Debug, PartialEq)]
pub struct Topology {
    pub(crate) sections: Vec<Section>,
    pub(crate) section_index: HashMap<SectionId, usize>,
    pub(crate) connections: Vec<Connection>,
    pub(crate) connection_index: HashMap<(SectionId, SectionId), usize>,
    /// Per section index: indices into `connections`, sorted by target id.
    pub(crate) out_edges: Vec<SmallVec<[usize; 4]>>,
    pub(crate) blocks: Vec<Block>,
    /// Per section index: the block containing the section.
    pub(crate) section_block: Vec<BlockId>,
    pub(crate) stops: Vec<Stop>,
    pub(crate) stop_index: HashMap<StopId, usize>,
    pub(crate) stop_by_section: HashMap<SectionId, usize>,
    pub(crate) spawns: Vec<SpawnPoint>,
    pub(crate) despawns: Vec<SectionId>,
}

impl Topology {
    /// Number of sections.
    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    /// Dense index of a section id, if it exists.
    pub fn index_of(&self, section: SectionId) -> Option<usize> {
        self.section_index.get(&section).copied()
    }

    /// Section by external id.
    pub fn section(&self, id: SectionId) -> Option<&Section> {
        self.index_of(id).map(|i| &self.sections[i])
    }

    /// Section by dense index.
    pub fn section_by_index(&self, index: usize) -> &Section {
        &self.sections[index]
    }

    /// All sections in load order.
    pub fn sections(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter()
    }

    /// Length of a section, defaulting to 1.0 for unknown ids.
    pub fn section_length(&self, id: SectionId) -> f64 {
        self.section(id).map_or(1.0, |s| s.length)
    }

    /// Sections reachable from `from` in one hop, filtered by the active
    /// flag and by the previous-block exclusion, sorted by target id.
    pub fn neighbors(
        &self,
        from: SectionId,
        previous_block: Option<BlockId>,
    ) -> SmallVec<[SectionId; 4]> {
        let mut out = SmallVec::new();
        let Some(idx) = self.index_of(from) else {
            return out;
        };
        for &ci in &self.out_edges[idx] {
            let conn = &self.connections[ci];
            if !conn.active {
                continue;
            }
            if conn.exclude_previous_block.is_some()
                && conn.exclude_previous_block == previous_block
            {
                continue;
            }
            out.push(conn.to);
        }
        out
    }

    /// The directed connection between two sections, if declared.
    pub fn connection(&self, from: SectionId, to: SectionId) -> Option<&Connection> {
        self.connection_index
            .get(&(from, to))
            .map(|&i| &self.connections[i])
    }

    /// All connections in load order (snapshot diagnostics).
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Whether the edge `from -> to` may be traversed right now by a
    /// train whose previous block is `previous_block`.
    pub fn edge_allowed(
        &self,
        from: SectionId,
        to: SectionId,
        previous_block: Option<BlockId>,
    ) -> bool {
        match self.connection(from, to) {
            Some(conn) => {
                conn.active
                    && !(conn.exclude_previous_block.is_some()
                        && conn.exclude_previous_block == previous_block)
            }
            None => false,
        }
    }

    /// Set a connection's active flag. Returns whether the flag changed.
    ///
    /// Occupancy validation (`SwitchOccupied`) is the engine's concern;
    /// the topology only knows whether the connection exists.
    pub fn set_connection_active(
        &mut self,
        from: SectionId,
        to: SectionId,
        active: bool,
    ) -> Result<bool, SwitchError> {
        let &i = self
            .connection_index
            .get(&(from, to))
            .ok_or(SwitchError::UnknownConnection { from, to })?;
        let changed = self.connections[i].active != active;
        self.connections[i].active = active;
        Ok(changed)
    }

    /// Geometric orientation of the edge `from -> to`.
    ///
    /// The loader guarantees connected sections have distinct x values,
    /// so this is total for declared edges. Unknown sections read as
    /// eastbound.
    pub fn orientation(&self, from: SectionId, to: SectionId) -> Heading {
        let fx = self.section(from).map_or(0.0, |s| s.x);
        let tx = self.section(to).map_or(f64::MAX, |s| s.x);
        if tx > fx {
            Heading::East
        } else {
            Heading::West
        }
    }

    /// The block containing a section.
    pub fn block_of(&self, section: SectionId) -> Option<BlockId> {
        self.index_of(section).map(|i| self.section_block[i])
    }

    /// Block by id.
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0 as usize]
    }

    /// Member sections of a block.
    pub fn sections_of(&self, id: BlockId) -> &[SectionId] {
        &self.blocks[id.0 as usize].sections
    }

    /// Number of blocks, implicit one-section blocks included.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// The stop placed on a section, if any.
    pub fn stop_at(&self, section: SectionId) -> Option<&Stop> {
        self.stop_by_section.get(&section).map(|&i| &self.stops[i])
    }

    /// Stop by external id.
    pub fn stop(&self, id: StopId) -> Option<&Stop> {
        self.stop_index.get(&id).map(|&i| &self.stops[i])
    }

    /// All stops in load order.
    pub fn stops(&self) -> impl Iterator<Item = &Stop> {
        self.stops.iter()
    }

    /// Whether a section is a designated entry point.
    pub fn is_spawn(&self, section: SectionId) -> bool {
        self.spawns.iter().any(|s| s.section == section)
    }

    /// Whether a section is a designated exit point.
    pub fn is_despawn(&self, section: SectionId) -> bool {
        self.despawns.contains(&section)
    }

    /// The spawn point record for an entry section.
    pub fn spawn_point(&self, section: SectionId) -> Option<&SpawnPoint> {
        self.spawns.iter().find(|s| s.section == section)
    }

    /// All designated exit sections.
    pub fn despawns(&self) -> &[SectionId] {
        &self.despawns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::demo_station;

    #[test]
    fn neighbors_respect_active_flag() {
        let mut topo = demo_station();
        // The siding connection 2 -> 1000 ships inactive.
        assert!(!topo
            .neighbors(SectionId(2), None)
            .contains(&SectionId(1000)));

        topo.set_connection_active(SectionId(2), SectionId(1000), true)
            .unwrap();
        assert!(topo
            .neighbors(SectionId(2), None)
            .contains(&SectionId(1000)));
    }

    #[test]
    fn neighbors_respect_previous_block_exclusion() {
        let topo = demo_station();
        // 30 -> 104 is a west crossover excluded for trains that just
        // arrived through section 20's block.
        let excl = topo
            .connection(SectionId(30), SectionId(104))
            .unwrap()
            .exclude_previous_block
            .expect("crossover carries an exclusion");

        assert!(!topo
            .neighbors(SectionId(30), Some(excl))
            .contains(&SectionId(104)));
        assert!(topo
            .neighbors(SectionId(30), None)
            .contains(&SectionId(104)));
    }

    #[test]
    fn orientation_follows_coordinates() {
        let topo = demo_station();
        assert_eq!(
            topo.orientation(SectionId(30), SectionId(31)),
            Heading::East
        );
        assert_eq!(
            topo.orientation(SectionId(141), SectionId(140)),
            Heading::West
        );
    }

    #[test]
    fn set_connection_active_is_idempotent() {
        let mut topo = demo_station();
        let changed = topo
            .set_connection_active(SectionId(0), SectionId(2), true)
            .unwrap();
        assert!(!changed, "already active");
        assert!(matches!(
            topo.set_connection_active(SectionId(0), SectionId(999), true),
            Err(SwitchError::UnknownConnection { .. })
        ));
    }

    #[test]
    fn every_section_has_a_block() {
        let topo = demo_station();
        for s in topo.sections() {
            assert!(topo.block_of(s.id).is_some(), "section {} blockless", s.id);
        }
    }
}
