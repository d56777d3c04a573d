//! ERC-20 allowance tracking for the claim contract.
//!
//! The allowance held here is only ever the last value read from the chain.
//! Approving does not bump it; the gate re-reads after the approval confirms.

use crate::{
    confirmations::{
        ConfirmError,
        ConfirmationPolicy,
        wait_for_confirmations,
    },
    error::{
        ApprovalError,
        ChainError,
    },
    ports::ChainProvider,
};
use alloy_primitives::{
    Address,
    B256,
    U256,
};
use serde::{
    Deserialize,
    Serialize,
};

pub fn needs_approval(allowance: U256, required: U256) -> bool {
    allowance < required
}

/// Lifecycle of a single on-chain write.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum TxStatus {
    #[default]
    Idle,
    Pending,
    Confirming,
    Success,
    Error,
}

impl TxStatus {
    pub fn is_busy(self) -> bool {
        matches!(self, TxStatus::Pending | TxStatus::Confirming)
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalPolicy {
    Exact,
    /// Approve `U256::MAX` once so later claims skip the approval step.
    #[default]
    Unlimited,
}

#[derive(Clone, Debug)]
pub struct ApprovalGate {
    token: Address,
    owner: Address,
    spender: Address,
    required: U256,
    allowance: Option<U256>,
    status: TxStatus,
    last_hash: Option<B256>,
    last_error: Option<ApprovalError>,
    confirmations: ConfirmationPolicy,
}

impl ApprovalGate {
    pub fn new(
        token: Address,
        owner: Address,
        spender: Address,
        required: U256,
        confirmations: ConfirmationPolicy,
    ) -> Self {
        Self {
            token,
            owner,
            spender,
            required,
            allowance: None,
            status: TxStatus::Idle,
            last_hash: None,
            last_error: None,
            confirmations,
        }
    }

    pub fn token(&self) -> Address {
        self.token
    }

    pub fn required(&self) -> U256 {
        self.required
    }

    pub fn set_required(&mut self, required: U256) {
        self.required = required;
    }

    pub fn allowance(&self) -> Option<U256> {
        self.allowance
    }

    pub fn status(&self) -> TxStatus {
        self.status
    }

    pub fn last_hash(&self) -> Option<B256> {
        self.last_hash
    }

    pub fn last_error(&self) -> Option<&ApprovalError> {
        self.last_error.as_ref()
    }

    /// Records a fresh allowance read.
    pub fn observe_allowance(&mut self, allowance: U256) {
        self.allowance = Some(allowance);
    }

    /// An allowance that has not been read yet counts as zero.
    pub fn needs_approval(&self) -> bool {
        needs_approval(self.allowance.unwrap_or(U256::ZERO), self.required)
    }

    pub fn has_sufficient_approval(&self) -> bool {
        !self.needs_approval()
    }

    pub async fn refresh<C: ChainProvider>(&mut self, chain: &C) -> Result<U256, ApprovalError> {
        let allowance = chain
            .allowance(self.token, self.owner, self.spender)
            .await
            .map_err(|err| ApprovalError::AllowanceRead(err.to_string()))?;
        self.observe_allowance(allowance);
        Ok(allowance)
    }

    pub async fn approve_exact<C: ChainProvider>(
        &mut self,
        chain: &C,
        amount: U256,
    ) -> Result<B256, ApprovalError> {
        self.approve(chain, amount).await
    }

    pub async fn approve_unlimited<C: ChainProvider>(
        &mut self,
        chain: &C,
    ) -> Result<B256, ApprovalError> {
        self.approve(chain, U256::MAX).await
    }

    async fn approve<C: ChainProvider>(
        &mut self,
        chain: &C,
        amount: U256,
    ) -> Result<B256, ApprovalError> {
        if self.status.is_busy() {
            return Err(ApprovalError::Busy);
        }
        self.status = TxStatus::Pending;
        self.last_error = None;
        self.last_hash = None;
        tracing::info!(token = %self.token, spender = %self.spender, %amount, "requesting approval");
        let result = self.submit_and_confirm(chain, amount).await;
        match &result {
            Ok(hash) => {
                self.status = TxStatus::Success;
                tracing::info!(%hash, "approval confirmed");
            }
            Err(err) => {
                self.status = TxStatus::Error;
                self.last_error = Some(err.clone());
                tracing::error!(error = %err, "approval failed");
            }
        }
        result
    }

    async fn submit_and_confirm<C: ChainProvider>(
        &mut self,
        chain: &C,
        amount: U256,
    ) -> Result<B256, ApprovalError> {
        let hash = chain
            .approve(self.token, self.spender, amount)
            .await
            .map_err(|err| match err {
                ChainError::Rejected(reason) | ChainError::Transient(reason) => {
                    ApprovalError::Rejected(reason)
                }
            })?;
        self.last_hash = Some(hash);
        self.status = TxStatus::Confirming;
        wait_for_confirmations(chain, hash, &self.confirmations)
            .await
            .map_err(|err| match err {
                ConfirmError::Reverted => ApprovalError::Reverted(hash),
                ConfirmError::Timeout { waited } => ApprovalError::Unconfirmed {
                    hash,
                    reason: format!("timed out after {} ms", waited.as_millis()),
                },
                ConfirmError::Unavailable(err) => ApprovalError::Unconfirmed {
                    hash,
                    reason: err.to_string(),
                },
            })?;
        self.refresh(chain).await?;
        Ok(hash)
    }
}
