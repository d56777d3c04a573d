use crate::{
    error::ChainError,
    ports::{
        ChainProvider,
        ReceiptStatus,
        TxReceipt,
    },
};
use alloy_primitives::B256;
use std::time::Duration;
use tokio::time::{
    self,
    Instant,
};

pub const DEFAULT_CONFIRMATIONS: u64 = 2;
pub const DEFAULT_READ_RETRIES: u32 = 3;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    pub confirmations: u64,
    /// Consecutive failed reads tolerated before giving up.
    pub read_retries: u32,
    pub retry_backoff: Duration,
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            confirmations: DEFAULT_CONFIRMATIONS,
            read_retries: DEFAULT_READ_RETRIES,
            retry_backoff: Duration::from_secs(1),
            poll_interval: Duration::from_secs(2),
            timeout: Duration::from_secs(180),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfirmError {
    Reverted,
    Timeout { waited: Duration },
    Unavailable(ChainError),
}

async fn read_confirmed<C: ChainProvider>(
    chain: &C,
    hash: B256,
    needed: u64,
) -> Result<Option<TxReceipt>, ChainError> {
    let Some(receipt) = chain.receipt(hash).await? else {
        return Ok(None);
    };
    if receipt.status == ReceiptStatus::Reverted {
        return Ok(Some(receipt));
    }
    let head = chain.block_number().await?;
    let confirmations = head.saturating_sub(receipt.block_number) + 1;
    tracing::debug!(%hash, confirmations, needed, "receipt observed");
    Ok((confirmations >= needed).then_some(receipt))
}

/// Polls until `hash` has `policy.confirmations` confirmations. Transient read
/// failures are retried with a fixed backoff; the transaction itself is never
/// resubmitted.
pub async fn wait_for_confirmations<C: ChainProvider>(
    chain: &C,
    hash: B256,
    policy: &ConfirmationPolicy,
) -> Result<TxReceipt, ConfirmError> {
    let started = Instant::now();
    let mut failures = 0u32;
    loop {
        match read_confirmed(chain, hash, policy.confirmations).await {
            Ok(Some(receipt)) if receipt.status == ReceiptStatus::Reverted => {
                return Err(ConfirmError::Reverted);
            }
            Ok(Some(receipt)) => return Ok(receipt),
            Ok(None) => failures = 0,
            Err(err) => {
                failures += 1;
                tracing::warn!(%hash, attempt = failures, error = %err, "receipt read failed");
                if failures >= policy.read_retries {
                    return Err(ConfirmError::Unavailable(err));
                }
                time::sleep(policy.retry_backoff).await;
                continue;
            }
        }
        let waited = started.elapsed();
        if waited >= policy.timeout {
            return Err(ConfirmError::Timeout { waited });
        }
        time::sleep(policy.poll_interval).await;
    }
}
