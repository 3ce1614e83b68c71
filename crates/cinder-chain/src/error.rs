//! Validator error types.
//!
//! Three disjoint failure kinds flow through [`ChainError`]:
//!
//! - consensus-invalid: carries a misbehavior score via `dos_score()`, is
//!   never retried and never persisted;
//! - transient: an unknown parent or missing input; the object is buffered
//!   and retried when its ancestor arrives ([`BlockError::UnknownParent`],
//!   [`MempoolError::MissingInputs`], both scored zero);
//! - environmental: database or file I/O trouble ([`DbError`]); the
//!   operation aborts and committed state stays intact.

use thiserror::Error;

use cinder_core::error::{PolicyError, TxError};
use cinder_core::ser::SerError;
use cinder_core::types::OutPoint;
use cinder_consensus::ConsensusError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockError {
    #[error("transaction {index}: {source}")]
    Tx { index: usize, source: TxError },
    #[error("block has no transactions")] NoTransactions,
    #[error("oversized block: {0}")] Oversized(usize),
    #[error("block timestamp too far in the future")] TimestampTooNew,
    #[error("first transaction is not coinbase")] FirstTxNotCoinbase,
    #[error("more than one coinbase")] MultipleCoinbase,
    #[error("coin-stake in wrong position")] MisplacedCoinStake,
    #[error("block timestamp {block} does not equal coin-stake timestamp {tx}")]
    CoinStakeTimeMismatch { block: i64, tx: i64 },
    #[error("transaction {0} timestamp is after block timestamp")] TxTimeAfterBlock(usize),
    #[error("proof of work failed")] ProofOfWorkFailed,
    #[error("compact bits out of range")] BadBits,
    #[error("merkle root mismatch")] MerkleRootMismatch,
    #[error("too many signature operations")] TooManySigOps,
    #[error("bad block signature")] BadBlockSignature,
    #[error("proof-of-work block carries a signature")] UnexpectedBlockSignature,
    #[error("coinbase of a proof-of-stake block must be empty")] NonEmptyStakeCoinbase,
    #[error("unknown parent block")] UnknownParent,
    #[error("wrong difficulty target: got {got:#x}, expected {expected:#x}")]
    WrongTarget { got: u32, expected: u32 },
    #[error("block timestamp not after median time past")] TimestampBeforeMedian,
    #[error("block timestamp too far in the past")] TimestampTooOld,
    #[error("transaction {0} is not final")] NonFinalTx(usize),
    #[error("duplicate proof-of-stake")] DuplicateStake,
    #[error("proof-of-stake kernel check failed")] StakeKernelFailed,
    #[error("coin-stake input not found")] StakeInputMissing,
    #[error("coinbase pays too much: got {got}, limit {limit}")]
    CoinbaseRewardTooHigh { got: i64, limit: i64 },
    #[error("coin-stake pays too much: got {got}, limit {limit}")]
    StakeRewardTooHigh { got: i64, limit: i64 },
    #[error("batched script verification failed")] ScriptBatchFailed,
}

impl BlockError {
    /// Misbehavior score for the peer that relayed the block.
    pub fn dos_score(&self) -> u32 {
        use BlockError::*;
        match self {
            Tx { source, .. } => source.dos_score(),
            UnknownParent => 0,
            DuplicateStake | StakeKernelFailed | StakeInputMissing => 1,
            TimestampBeforeMedian | TimestampTooOld | NonFinalTx(_) => 10,
            TimestampTooNew | CoinStakeTimeMismatch { .. } | TxTimeAfterBlock(_)
            | ProofOfWorkFailed | BadBits => 50,
            NoTransactions | Oversized(_) | FirstTxNotCoinbase | MultipleCoinbase
            | MisplacedCoinStake | MerkleRootMismatch | TooManySigOps | BadBlockSignature
            | UnexpectedBlockSignature | NonEmptyStakeCoinbase
            | WrongTarget { .. } | CoinbaseRewardTooHigh { .. }
            | StakeRewardTooHigh { .. } | ScriptBatchFailed => 100,
        }
    }

    /// Transient failures are buffered and retried, not punished.
    pub fn is_transient(&self) -> bool {
        matches!(self, BlockError::UnknownParent)
    }
}

impl From<ConsensusError> for BlockError {
    fn from(e: ConsensusError) -> Self {
        match e {
            ConsensusError::BadBits => BlockError::BadBits,
            ConsensusError::ProofOfWorkFailed => BlockError::ProofOfWorkFailed,
            ConsensusError::StakeUnderMinAge | ConsensusError::StakeKernelFailed => {
                BlockError::StakeKernelFailed
            }
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MempoolError {
    #[error("transaction already in pool")] AlreadyInPool,
    #[error("transaction already in a connected block")] AlreadyKnown,
    #[error("coinbase as individual transaction")] CoinbaseRejected,
    #[error("coin-stake as individual transaction")] CoinStakeRejected,
    #[error("not standard: {0}")] NotStandard(PolicyError),
    #[error("inputs not standard")] InputsNotStandard,
    #[error("non-final transaction")] NonFinal,
    #[error("conflicts with pool transaction on {0}")] Conflict(OutPoint),
    #[error("inputs not yet known")] MissingInputs,
    #[error("fee {fee} below required {required}")] FeeTooLow { fee: i64, required: i64 },
}

impl MempoolError {
    pub fn dos_score(&self) -> u32 {
        match self {
            MempoolError::CoinbaseRejected | MempoolError::CoinStakeRejected => 100,
            _ => 0,
        }
    }
}

/// Environmental failures: the database or block files misbehaved.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("storage backend: {0}")] Backend(String),
    #[error("corrupt record: {0}")] Corrupt(&'static str),
    #[error("io: {0}")] Io(#[from] std::io::Error),
    #[error(transparent)] Ser(#[from] SerError),
}

#[derive(Error, Debug)]
pub enum ChainError {
    #[error(transparent)] Block(#[from] BlockError),
    #[error(transparent)] Tx(#[from] TxError),
    #[error(transparent)] Mempool(#[from] MempoolError),
    #[error(transparent)] Db(#[from] DbError),
}

impl ChainError {
    pub fn dos_score(&self) -> u32 {
        match self {
            ChainError::Block(e) => e.dos_score(),
            ChainError::Tx(e) => e.dos_score(),
            ChainError::Mempool(e) => e.dos_score(),
            ChainError::Db(_) => 0,
        }
    }
}
