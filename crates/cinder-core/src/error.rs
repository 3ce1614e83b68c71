//! Transaction-level and policy error types.
//!
//! Consensus failures carry a misbehavior weight via [`TxError::dos_score`];
//! the caller threads the score to the peer that sourced the object. A score
//! of zero means the failure is not evidence of misbehavior.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TxError {
    #[error("vin or vout empty")] EmptyInputsOrOutputs,
    #[error("oversized: {size} > {max}")] Oversized { size: usize, max: usize },
    #[error("output value out of range: {0}")] OutputOutOfRange(i64),
    #[error("output total out of range")] OutputSumOutOfRange,
    #[error("output {index} below minimum: {value}")] OutputBelowMinimum { index: usize, value: i64 },
    #[error("empty output in user transaction at index {0}")] EmptyUserOutput(usize),
    #[error("duplicate prevout")] DuplicateInputs,
    #[error("coinbase sigScript size {0} outside [2, 100]")] BadCoinbaseScriptSize(usize),
    #[error("null prevout in non-coinbase input {0}")] NullPrevout(usize),
    #[error("source transaction of input {0} not found")] MissingInput(usize),
    #[error("input {0} out of range of its source transaction")] InputOutOfRange(usize),
    #[error("input {0} already spent")] AlreadySpent(usize),
    #[error("transaction timestamp earlier than input {0}")] TimestampBeforeInput(usize),
    #[error("spends immature generation output at input {input} (depth {depth})")]
    ImmatureSpend { input: usize, depth: i32 },
    #[error("input value out of range")] InputValueOutOfRange,
    #[error("input value below output value")] InputsBelowOutputs,
    #[error("script verification failed for input {0}")] ScriptFailed(usize),
}

impl TxError {
    /// Misbehavior score for the peer that relayed the transaction.
    pub fn dos_score(&self) -> u32 {
        use TxError::*;
        match self {
            EmptyInputsOrOutputs | NullPrevout(_) => 10,
            ImmatureSpend { .. } | MissingInput(_) => 0,
            Oversized { .. }
            | OutputOutOfRange(_)
            | OutputSumOutOfRange
            | OutputBelowMinimum { .. }
            | EmptyUserOutput(_)
            | DuplicateInputs
            | BadCoinbaseScriptSize(_)
            | InputOutOfRange(_)
            | AlreadySpent(_)
            | TimestampBeforeInput(_)
            | InputValueOutOfRange
            | InputsBelowOutputs
            | ScriptFailed(_) => 100,
        }
    }
}

/// Reasons a well-formed transaction is still refused relay.
///
/// Policy failures never carry a misbehavior score; a non-standard
/// transaction may be perfectly valid inside a block.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyError {
    #[error("version not standard")] Version,
    #[error("exceeds standard size")] Oversized,
    #[error("sigScript too large")] SigScriptSize,
    #[error("sigScript is not push-only")] SigScriptNotPushOnly,
    #[error("unrecognized output script template")] UnknownTemplate,
}
