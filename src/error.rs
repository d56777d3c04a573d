use alloy_primitives::B256;
use std::fmt;

pub type Result<T, E = EngineError> = std::result::Result<T, E>;

/// Malformed card data. Never repaired silently.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("card has no cells")]
    EmptyGrid,
    #[error("cell count {0} is not a multiple of 3")]
    RaggedGrid(usize),
    #[error("prize {prize} has no matching row in the grid")]
    MissingWinningRow { prize: i128 },
    #[error("losing card has a winning-shaped row at index {row}")]
    UnexpectedWinningRow { row: usize },
    #[error("prize {prize} has no prize asset contract")]
    MissingPrizeAsset { prize: i128 },
    #[error("prize amount {0} is not a valid prize (expected -1, 0 or a positive amount)")]
    InvalidPrizeAmount(i128),
    #[error("card {token_id} is already claimed")]
    AlreadyClaimed { token_id: u64 },
    #[error("card {token_id} cannot be claimed before it is scratched")]
    NotScratched { token_id: u64 },
    #[error("cell names a friend without friendFid")]
    IncompleteFriend,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("signer unreachable: {0}")]
    Unreachable(String),
    #[error("signer rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("signer returned an invalid payload: {0}")]
    InvalidShape(String),
    #[error("signature expired at {deadline}")]
    Expired { deadline: u64 },
    #[error("signature is for token {actual}, expected {expected}")]
    WrongToken { expected: String, actual: String },
}

/// Failure reported by a chain read/write provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("transaction rejected: {0}")]
    Rejected(String),
    #[error("transient read failure: {0}")]
    Transient(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApprovalError {
    #[error("approval transaction rejected: {0}")]
    Rejected(String),
    #[error("approval transaction {0} reverted")]
    Reverted(B256),
    #[error("approval {hash} not confirmed: {reason}")]
    Unconfirmed { hash: B256, reason: String },
    #[error("allowance read failed: {0}")]
    AllowanceRead(String),
    #[error("allowance {allowance} still below required {required} after approval")]
    StillInsufficient { allowance: String, required: String },
    #[error("an approval is already in flight")]
    Busy,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClaimError {
    #[error("a claim for token {token_id} is already in flight")]
    AlreadyInFlight { token_id: u64 },
    #[error(transparent)]
    Signature(#[from] SignatureError),
    #[error(transparent)]
    Approval(#[from] ApprovalError),
    #[error("claim transaction rejected: {0}")]
    Rejected(String),
    #[error("claim transaction {0} reverted")]
    Reverted(B256),
    #[error("claim transaction {hash} not confirmed after {waited_ms} ms")]
    Timeout { hash: B256, waited_ms: u64 },
    #[error("receipt reads for {hash} kept failing: {reason}")]
    ReceiptUnavailable { hash: B256, reason: String },
    #[error("claim observation detached (broadcast hash: {tx_hash:?})")]
    Detached { tx_hash: Option<B256> },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersistenceError {
    #[error("persistence service unreachable: {0}")]
    Unreachable(String),
    #[error("persistence service responded with {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Signature(#[from] SignatureError),
    #[error(transparent)]
    Approval(#[from] ApprovalError),
    #[error(transparent)]
    Claim(#[from] ClaimError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Coarse category handed to the host alongside a human readable detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Input,
    Signature,
    Approval,
    Claim,
    Persistence,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Input => "input",
            ErrorKind::Signature => "signature",
            ErrorKind::Approval => "approval",
            ErrorKind::Claim => "claim",
            ErrorKind::Persistence => "persistence",
        };
        write!(f, "{name}")
    }
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Input(_) => ErrorKind::Input,
            EngineError::Signature(_) => ErrorKind::Signature,
            EngineError::Approval(_) => ErrorKind::Approval,
            EngineError::Claim(err) => err.kind(),
            EngineError::Persistence(_) => ErrorKind::Persistence,
        }
    }
}

impl ClaimError {
    /// Signature and approval failures keep their own category even when they
    /// surface through the claim flow.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClaimError::Signature(_) => ErrorKind::Signature,
            ClaimError::Approval(_) => ErrorKind::Approval,
            _ => ErrorKind::Claim,
        }
    }

    pub fn broadcast_hash(&self) -> Option<B256> {
        match self {
            ClaimError::Reverted(hash)
            | ClaimError::Timeout { hash, .. }
            | ClaimError::ReceiptUnavailable { hash, .. } => Some(*hash),
            ClaimError::Detached { tx_hash } => *tx_hash,
            _ => None,
        }
    }
}
