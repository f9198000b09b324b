//! Recovery coordinator error types

use thiserror::Error;

use super::state::RecoveryState;
use crate::consensus::ConsensusGroupId;

pub type RecoveryResult<T> = Result<T, RecoveryError>;

#[derive(Debug, Error)]
pub enum RecoveryError {
    /// `begin_recovery` runs once per process lifetime
    #[error("{group}: recovery already started (state {state})")]
    AlreadyStarted {
        group: ConsensusGroupId,
        state: RecoveryState,
    },
}
