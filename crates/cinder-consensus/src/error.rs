//! Consensus math failures.

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsensusError {
    #[error("compact bits out of range")] BadBits,
    #[error("hash does not meet the claimed target")] ProofOfWorkFailed,
    #[error("stake input younger than minimum age")] StakeUnderMinAge,
    #[error("kernel hash above weighted target")] StakeKernelFailed,
}
