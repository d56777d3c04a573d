//! Collaborators the engine talks to but does not own.

use crate::{
    card::{
        ClaimSignature,
        Prize,
    },
    error::{
        ChainError,
        PersistenceError,
        SignatureError,
    },
    reveal::RevealFeedback,
};
use alloy_primitives::{
    Address,
    B256,
    Bytes,
    U256,
};
use serde::{
    Deserialize,
    Serialize,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReceiptStatus {
    Success,
    Reverted,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TxReceipt {
    pub hash: B256,
    pub block_number: u64,
    pub status: ReceiptStatus,
}

/// Arguments shared by `claimPrize` and `claimPrizeWithBonus`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClaimCall {
    pub contract: Address,
    pub token_id: u64,
    pub signature: ClaimSignature,
    /// [`Address::ZERO`] makes the contract pay the caller.
    pub recipient: Address,
}

pub trait ChainProvider {
    fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> impl Future<Output = Result<U256, ChainError>>;

    fn approve(
        &self,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> impl Future<Output = Result<B256, ChainError>>;

    fn claim_prize(&self, call: ClaimCall) -> impl Future<Output = Result<B256, ChainError>>;

    fn claim_prize_with_bonus(
        &self,
        call: ClaimCall,
        bonus_recipient: Address,
    ) -> impl Future<Output = Result<B256, ChainError>>;

    /// `Ok(None)` while the transaction is not yet mined.
    fn receipt(&self, hash: B256)
    -> impl Future<Output = Result<Option<TxReceipt>, ChainError>>;

    fn block_number(&self) -> impl Future<Output = Result<u64, ChainError>>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureRequest {
    pub token_id: u64,
    pub user_wallet: Address,
}

pub trait SignatureService {
    fn claim_signature(
        &self,
        request: SignatureRequest,
    ) -> impl Future<Output = Result<ClaimSignature, SignatureError>>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackScratch {
    pub scratched: bool,
    pub scratched_by: Address,
    pub prize_won: Prize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRecord {
    pub claimed: bool,
    pub claim_hash: B256,
    pub claimed_by: Address,
}

pub trait PersistenceService {
    fn track_scratch(
        &self,
        token_id: u64,
        body: TrackScratch,
    ) -> impl Future<Output = Result<(), PersistenceError>>;

    fn record_claim(
        &self,
        token_id: u64,
        body: ClaimRecord,
    ) -> impl Future<Output = Result<(), PersistenceError>>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WinNotice {
    pub token_id: u64,
    pub winner: Address,
    pub prize: Prize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friend_fid: Option<u64>,
}

/// Best-effort side channel. Failures are logged by the caller and dropped.
pub trait WinNotifier {
    fn notify_win(&self, notice: WinNotice) -> impl Future<Output = Result<(), String>>;
}

/// Sound, haptics and artwork for a reveal. Implementations hold whatever
/// platform handles they need between `init` and `teardown`.
pub trait FeedbackSink {
    fn init(&mut self) {}

    fn play(&mut self, feedback: RevealFeedback);

    /// Artwork shown behind a winning card, if any is loaded.
    fn winner_asset(&self) -> Option<Bytes> {
        None
    }

    fn teardown(&mut self) {}
}

/// Feedback sink that only logs; used where there is no audio or haptic device.
#[derive(Debug, Default)]
pub struct LogFeedback {
    played: Vec<RevealFeedback>,
}

impl LogFeedback {
    pub fn played(&self) -> &[RevealFeedback] {
        &self.played
    }
}

impl FeedbackSink for LogFeedback {
    fn play(&mut self, feedback: RevealFeedback) {
        tracing::info!(?feedback, "reveal feedback");
        self.played.push(feedback);
    }

    fn teardown(&mut self) {
        self.played.clear();
    }
}
