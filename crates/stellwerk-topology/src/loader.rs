//! Declarative topology description and its validating loader.
//!
//! [`TopologySpec`] is the serde-facing input format; [`Topology::from_spec`]
//! checks every cross-reference before the graph is handed to the engine,
//! so the engine never has to re-validate ids at runtime.

use crate::graph::{
    Approach, Block, Connection, Section, SectionKind, SpawnPoint, Stop, Topology,
};
use indexmap::IndexMap;
use serde::Deserialize;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use stellwerk_core::{BlockId, SectionId, StopId};

fn default_length() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

fn default_kind() -> SectionKind {
    SectionKind::Horizontal
}

/// One section in the input description.
#[derive(Clone, Debug, Deserialize)]
pub struct SectionSpec {
    /// External section id.
    pub id: u32,
    /// Geometry class; defaults to horizontal.
    #[serde(default = "default_kind")]
    pub kind: SectionKind,
    /// Horizontal coordinate.
    pub x: f64,
    /// Length in abstract units; defaults to 1.0.
    #[serde(default = "default_length")]
    pub length: f64,
}

/// One directed connection in the input description.
#[derive(Clone, Debug, Deserialize)]
pub struct ConnectionSpec {
    /// Source section id.
    pub from: u32,
    /// Target section id.
    pub to: u32,
    /// Initial active state; defaults to true.
    #[serde(default = "default_true")]
    pub active: bool,
    /// Block name whose trains may not traverse this edge as their next
    /// move after leaving that block.
    #[serde(default)]
    pub exclude_previous_block: Option<String>,
}

/// One declared block in the input description.
///
/// Sections not named by any block get an implicit one-section block
/// called `section-<id>`.
#[derive(Clone, Debug, Deserialize)]
pub struct BlockSpec {
    /// Block name; must be unique.
    pub name: String,
    /// Member section ids; at least one.
    pub sections: Vec<u32>,
}

/// One stop in the input description.
#[derive(Clone, Debug, Deserialize)]
pub struct StopSpec {
    /// External stop id.
    pub id: u32,
    /// Display name.
    pub name: String,
    /// Section the stop sits on.
    pub section: u32,
    /// Mandated approach direction.
    pub approach: Approach,
}

/// One spawn point in the input description.
#[derive(Clone, Debug, Deserialize)]
pub struct SpawnSpec {
    /// The entry section.
    pub section: u32,
    /// The despawn section transit traffic from this entry targets.
    pub exit: u32,
}

/// The complete declarative topology input.
#[derive(Clone, Debug, Deserialize)]
pub struct TopologySpec {
    /// All sections.
    pub sections: Vec<SectionSpec>,
    /// All directed connections.
    pub connections: Vec<ConnectionSpec>,
    /// Declared multi-section blocks.
    #[serde(default)]
    pub blocks: Vec<BlockSpec>,
    /// Stop placements.
    #[serde(default)]
    pub stops: Vec<StopSpec>,
    /// Designated entry points.
    pub spawns: Vec<SpawnSpec>,
    /// Designated exit sections.
    pub despawns: Vec<u32>,
}

/// Errors detected while loading a [`TopologySpec`].
#[derive(Clone, Debug, PartialEq)]
pub enum TopologyError {
    /// The section list is empty.
    NoSections,
    /// A section id appears twice.
    DuplicateSection {
        /// The repeated id.
        id: SectionId,
    },
    /// A section has a non-finite coordinate or a non-positive length.
    InvalidSection {
        /// The offending section.
        id: SectionId,
    },
    /// A connection references an unknown section.
    UnknownSection {
        /// The unknown id.
        id: SectionId,
    },
    /// A connection's endpoints coincide, or the pair appears twice.
    InvalidConnection {
        /// Source of the offending connection.
        from: SectionId,
        /// Target of the offending connection.
        to: SectionId,
    },
    /// Connected sections share an x coordinate, so the edge has no
    /// orientation.
    NoOrientation {
        /// Source of the offending connection.
        from: SectionId,
        /// Target of the offending connection.
        to: SectionId,
    },
    /// A declared block has no sections.
    EmptyBlock {
        /// The offending block name.
        name: String,
    },
    /// Two blocks share a name.
    DuplicateBlockName {
        /// The repeated name.
        name: String,
    },
    /// A section is claimed by two blocks.
    SectionInTwoBlocks {
        /// The doubly-claimed section.
        id: SectionId,
    },
    /// An `exclude_previous_block` names a block that does not exist.
    UnknownBlock {
        /// The unknown name.
        name: String,
    },
    /// A stop id appears twice, or two stops share a section.
    DuplicateStop {
        /// The offending stop id.
        id: StopId,
    },
    /// A spawn or despawn designation references an unknown section.
    InvalidEndpoint {
        /// The unknown id.
        id: SectionId,
    },
    /// A spawn's exit is not a designated despawn section.
    ExitNotADespawn {
        /// The offending exit section.
        id: SectionId,
    },
}

impl fmt::Display for TopologyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSections => write!(f, "topology has no sections"),
            Self::DuplicateSection { id } => write!(f, "duplicate section {id}"),
            Self::InvalidSection { id } => {
                write!(f, "section {id} has invalid coordinate or length")
            }
            Self::UnknownSection { id } => write!(f, "unknown section {id}"),
            Self::InvalidConnection { from, to } => {
                write!(f, "invalid connection {from} -> {to}")
            }
            Self::NoOrientation { from, to } => {
                write!(f, "sections {from} and {to} share an x coordinate")
            }
            Self::EmptyBlock { name } => write!(f, "block '{name}' has no sections"),
            Self::DuplicateBlockName { name } => write!(f, "duplicate block name '{name}'"),
            Self::SectionInTwoBlocks { id } => {
                write!(f, "section {id} belongs to two blocks")
            }
            Self::UnknownBlock { name } => write!(f, "unknown block '{name}'"),
            Self::DuplicateStop { id } => write!(f, "duplicate stop {id}"),
            Self::InvalidEndpoint { id } => {
                write!(f, "spawn/despawn references unknown section {id}")
            }
            Self::ExitNotADespawn { id } => {
                write!(f, "spawn exit {id} is not a despawn section")
            }
        }
    }
}

impl Error for TopologyError {}

impl Topology {
    /// Build and validate a topology from its declarative description.
    pub fn from_spec(spec: TopologySpec) -> Result<Self, TopologyError> {
        // 1. Sections: present, unique, finite geometry.
        if spec.sections.is_empty() {
            return Err(TopologyError::NoSections);
        }
        let mut sections = Vec::with_capacity(spec.sections.len());
        let mut section_index = HashMap::with_capacity(spec.sections.len());
        for s in &spec.sections {
            let id = SectionId(s.id);
            if !s.x.is_finite() || !s.length.is_finite() || s.length <= 0.0 {
                return Err(TopologyError::InvalidSection { id });
            }
            if section_index.insert(id, sections.len()).is_some() {
                return Err(TopologyError::DuplicateSection { id });
            }
            sections.push(Section {
                id,
                kind: s.kind,
                x: s.x,
                length: s.length,
            });
        }

        // 2. Blocks: declared blocks first, then an implicit one-section
        //    block for every unclaimed section, in section load order.
        let mut blocks: Vec<Block> = Vec::new();
        let mut block_names: IndexMap<String, BlockId> = IndexMap::new();
        let mut section_block: Vec<Option<BlockId>> = vec![None; sections.len()];
        for b in &spec.blocks {
            if b.sections.is_empty() {
                return Err(TopologyError::EmptyBlock {
                    name: b.name.clone(),
                });
            }
            let id = BlockId(blocks.len() as u32);
            if block_names.insert(b.name.clone(), id).is_some() {
                return Err(TopologyError::DuplicateBlockName {
                    name: b.name.clone(),
                });
            }
            let mut members = Vec::with_capacity(b.sections.len());
            for &sid in &b.sections {
                let sid = SectionId(sid);
                let idx = *section_index
                    .get(&sid)
                    .ok_or(TopologyError::UnknownSection { id: sid })?;
                if section_block[idx].is_some() {
                    return Err(TopologyError::SectionInTwoBlocks { id: sid });
                }
                section_block[idx] = Some(id);
                members.push(sid);
            }
            blocks.push(Block {
                id,
                name: b.name.clone(),
                sections: members,
            });
        }
        for (idx, slot) in section_block.iter_mut().enumerate() {
            if slot.is_none() {
                let sid = sections[idx].id;
                let id = BlockId(blocks.len() as u32);
                let name = format!("section-{sid}");
                // Collision with a declared name of the same shape is a
                // configuration mistake, not something to paper over.
                if block_names.insert(name.clone(), id).is_some() {
                    return Err(TopologyError::DuplicateBlockName { name });
                }
                blocks.push(Block {
                    id,
                    name,
                    sections: vec![sid],
                });
                *slot = Some(id);
            }
        }
        let section_block: Vec<BlockId> =
            section_block.into_iter().map(|b| b.expect("assigned")).collect();

        // 3. Connections: endpoints exist, no self-loops or duplicates,
        //    orientation derivable, exclusions resolve.
        let mut connections = Vec::with_capacity(spec.connections.len());
        let mut connection_index = HashMap::with_capacity(spec.connections.len());
        let mut out_edges: Vec<SmallVec<[usize; 4]>> = vec![SmallVec::new(); sections.len()];
        for c in &spec.connections {
            let from = SectionId(c.from);
            let to = SectionId(c.to);
            let fi = *section_index
                .get(&from)
                .ok_or(TopologyError::UnknownSection { id: from })?;
            let ti = *section_index
                .get(&to)
                .ok_or(TopologyError::UnknownSection { id: to })?;
            if from == to {
                return Err(TopologyError::InvalidConnection { from, to });
            }
            if sections[fi].x == sections[ti].x {
                return Err(TopologyError::NoOrientation { from, to });
            }
            let exclude = match &c.exclude_previous_block {
                Some(name) => Some(*block_names.get(name).ok_or_else(|| {
                    TopologyError::UnknownBlock { name: name.clone() }
                })?),
                None => None,
            };
            let ci = connections.len();
            if connection_index.insert((from, to), ci).is_some() {
                return Err(TopologyError::InvalidConnection { from, to });
            }
            connections.push(Connection {
                from,
                to,
                active: c.active,
                exclude_previous_block: exclude,
            });
            out_edges[fi].push(ci);
        }
        for edges in &mut out_edges {
            edges.sort_by_key(|&ci| connections[ci].to);
        }

        // 4. Stops: unique ids, one per section, sections exist.
        let mut stops = Vec::with_capacity(spec.stops.len());
        let mut stop_index = HashMap::new();
        let mut stop_by_section = HashMap::new();
        for s in &spec.stops {
            let id = StopId(s.id);
            let section = SectionId(s.section);
            if !section_index.contains_key(&section) {
                return Err(TopologyError::UnknownSection { id: section });
            }
            let i = stops.len();
            if stop_index.insert(id, i).is_some() {
                return Err(TopologyError::DuplicateStop { id });
            }
            if stop_by_section.insert(section, i).is_some() {
                return Err(TopologyError::DuplicateStop { id });
            }
            stops.push(Stop {
                id,
                name: s.name.clone(),
                section,
                approach: s.approach,
            });
        }

        // 5. Spawn and despawn designations.
        let mut despawns = Vec::with_capacity(spec.despawns.len());
        for &d in &spec.despawns {
            let id = SectionId(d);
            if !section_index.contains_key(&id) {
                return Err(TopologyError::InvalidEndpoint { id });
            }
            despawns.push(id);
        }
        let mut spawns = Vec::with_capacity(spec.spawns.len());
        for sp in &spec.spawns {
            let section = SectionId(sp.section);
            let exit = SectionId(sp.exit);
            if !section_index.contains_key(&section) {
                return Err(TopologyError::InvalidEndpoint { id: section });
            }
            if !despawns.contains(&exit) {
                return Err(TopologyError::ExitNotADespawn { id: exit });
            }
            spawns.push(SpawnPoint { section, exit });
        }

        Ok(Topology {
            sections,
            section_index,
            connections,
            connection_index,
            out_edges,
            blocks,
            section_block,
            stops,
            stop_index,
            stop_by_section,
            spawns,
            despawns,
        })
    }
}
