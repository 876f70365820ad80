//! Core types for the Stellwerk railway station simulator.
//!
//! This crate carries the vocabulary shared by every other Stellwerk
//! crate: strongly-typed identifiers, the inbound command set with its
//! per-command receipts, the error taxonomy, and the train-type table.
//! It has no simulation logic of its own.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod command;
pub mod error;
pub mod id;
pub mod train;

pub use command::{Command, Receipt, SpawnRequest};
pub use error::{
    CommandError, InvariantViolation, RouteError, SpawnError, StepError, SwitchError,
};
pub use id::{BlockId, SectionId, StopId, TickId, TrainId, TrainTypeId, WagonId};
pub use train::{Heading, TrainStatus, TrainType};
