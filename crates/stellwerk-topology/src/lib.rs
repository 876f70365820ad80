//! Track topology for the Stellwerk simulator.
//!
//! A [`Topology`] is the immutable directed graph of track sections the
//! engine runs on: sections with geometry, directed connections with
//! active flags and previous-block turn exclusions, reservation blocks,
//! stops with mandated approach directions, and designated spawn/despawn
//! sections. It is built once at startup from a declarative
//! [`TopologySpec`]; the only runtime mutation is toggling a connection's
//! active flag.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod demo;
pub mod graph;
pub mod loader;

pub use graph::{Approach, Block, Connection, Section, SectionKind, SpawnPoint, Stop, Topology};
pub use loader::{
    BlockSpec, ConnectionSpec, SectionSpec, SpawnSpec, StopSpec, TopologyError, TopologySpec,
};
