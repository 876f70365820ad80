//! Simulation engine for the Stellwerk railway station simulator.
//!
//! [`SimulationEngine`] is the single-threaded tick engine: it owns the
//! topology, the reservation table, and every train, and advances the
//! world one tick at a time in a fixed phase order (drain commands →
//! priority sort → plan upkeep → signaling → kinematics → lifecycle →
//! snapshot). [`SimulationHandle`] wraps it in a background thread at a
//! fixed cadence with a bounded command queue in front and a
//! drop-stale snapshot hub behind.
//!
//! # Lockstep and realtime
//!
//! The engine itself is a callable struct with no threads — tests and
//! other deterministic drivers call [`SimulationEngine::execute_tick`]
//! directly. The realtime wrapper adds cadence, command batching, and
//! snapshot fan-out without changing any engine semantics.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod batch;
pub mod broadcast;
pub mod config;
pub mod engine;
pub mod ingress;
pub mod metrics;
pub mod reservation;
pub mod router;
pub mod sim_thread;
pub mod snapshot;

mod signaling;
mod train;

pub use batch::{parse_train_batch, BatchError};
pub use broadcast::{SnapshotHub, Subscription};
pub use config::{ConfigError, SimConfig};
pub use engine::{SimulationEngine, TickFailure, TickResult};
pub use ingress::CommandQueue;
pub use metrics::TickMetrics;
pub use reservation::ReservationTable;
pub use router::{plan_route, plan_to_nearest, RouteGoal, RoutePlan, RouteRequest};
pub use sim_thread::{SimulationHandle, SubmitError};
pub use snapshot::{ConnectionSnapshot, Snapshot, TrainSnapshot, WagonSnapshot};
