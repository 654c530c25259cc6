//! Deterministic simulation harness for Huddle session testing.
//!
//! Seeded, virtual-time implementations of the Environment and Driver traits
//! for reproducible testing of the whole session under late, reordered and
//! failing responses.
//!
//! # Invariant Testing
//!
//! The `invariants` module provides behavioral testing through invariant
//! checks. Invariants verify WHAT must be true across all execution paths, not
//! specific scenarios. Use [`InvariantRegistry::standard()`] for the session
//! invariants. [`Simulation`] checks them after every runtime cycle.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod scenario;
pub mod sim_backend;
pub mod sim_driver;
pub mod sim_env;

pub use invariants::{
    ActiveRoomAgrees, EntrySnapshot, Invariant, InvariantRegistry, InvariantResult,
    MessagesOrderedUnique, RepliesConsistent, ReplyStatus, SessionSnapshot, ViewMatchesStore,
    Violation,
};
pub use scenario::{MAX_SETTLE_CYCLES, Simulation};
pub use sim_backend::SimBackend;
pub use sim_driver::{Faults, SimDriver, SimDriverError, SimLink};
pub use sim_env::{SIM_EPOCH_MILLIS, SimEnv};
