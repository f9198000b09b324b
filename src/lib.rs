//! tsconsensus - recovery-aware linearizable reads for consensus groups
//!
//! Every consensus group on a node owns a state machine fed by an apply
//! driver. After restart the group replays its persisted log tail before
//! it serves reads; the read gateway answers a read only once the local
//! state machine has applied everything committed at the time the read
//! arrived.

pub mod cli;
pub mod config;
pub mod consensus;
pub mod gateway;
pub mod group;
pub mod log;
pub mod observability;
pub mod recovery;
pub mod snapshot;
pub mod statemachine;
