//! In-memory collaborators for offline play and tests.

use crate::{
    card::{
        Card,
        Cell,
        ClaimSignature,
        FriendRef,
        Prize,
    },
    error::{
        ChainError,
        PersistenceError,
        SignatureError,
    },
    grid::ROW_WIDTH,
    ports::{
        ChainProvider,
        ClaimCall,
        ClaimRecord,
        PersistenceService,
        ReceiptStatus,
        SignatureRequest,
        SignatureService,
        TrackScratch,
        TxReceipt,
        WinNotice,
        WinNotifier,
    },
};
use alloy_primitives::{
    Address,
    B256,
    Bytes,
    U256,
};
use chrono::Utc;
use rand::Rng;
use sha2::{
    Digest,
    Sha256,
};
use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
    },
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmittedClaim {
    pub token_id: u64,
    pub recipient: Address,
    pub bonus_recipient: Option<Address>,
    pub hash: B256,
}

#[derive(Debug, Default)]
struct ChainState {
    head: u64,
    nonce: u64,
    allowances: HashMap<(Address, Address, Address), U256>,
    approvals: Vec<(Address, Address, U256)>,
    claims: Vec<SubmittedClaim>,
    receipts: HashMap<B256, TxReceipt>,
    freeze_allowances: bool,
    reject_next_write: Option<String>,
    revert_next_write: bool,
    failing_receipt_reads: u32,
}

/// Chain that mines every write in the next block and advances one block per
/// `block_number` read.
#[derive(Clone, Debug)]
pub struct SimulatedChain {
    caller: Address,
    state: Arc<Mutex<ChainState>>,
}

impl SimulatedChain {
    pub fn new(caller: Address) -> Self {
        Self {
            caller,
            state: Arc::new(Mutex::new(ChainState {
                head: 1,
                ..ChainState::default()
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_allowance(&self, token: Address, owner: Address, spender: Address, value: U256) {
        self.state().allowances.insert((token, owner, spender), value);
    }

    /// Approvals are still mined but allowance reads keep returning the old value.
    pub fn freeze_allowances(&self, frozen: bool) {
        self.state().freeze_allowances = frozen;
    }

    pub fn reject_next_write(&self, reason: &str) {
        self.state().reject_next_write = Some(reason.to_string());
    }

    pub fn revert_next_write(&self) {
        self.state().revert_next_write = true;
    }

    pub fn fail_receipt_reads(&self, count: u32) {
        self.state().failing_receipt_reads = count;
    }

    pub fn approvals(&self) -> Vec<(Address, Address, U256)> {
        self.state().approvals.clone()
    }

    pub fn claims(&self) -> Vec<SubmittedClaim> {
        self.state().claims.clone()
    }

    fn mine(&self, label: &str) -> Result<B256, ChainError> {
        let mut state = self.state();
        if let Some(reason) = state.reject_next_write.take() {
            return Err(ChainError::Rejected(reason));
        }
        state.nonce += 1;
        state.head += 1;
        let mut hasher = Sha256::new();
        hasher.update(self.caller.as_slice());
        hasher.update(state.nonce.to_be_bytes());
        hasher.update(label.as_bytes());
        let hash = B256::from_slice(&hasher.finalize());
        let status = if std::mem::take(&mut state.revert_next_write) {
            ReceiptStatus::Reverted
        } else {
            ReceiptStatus::Success
        };
        let receipt = TxReceipt {
            hash,
            block_number: state.head,
            status,
        };
        state.receipts.insert(hash, receipt);
        Ok(hash)
    }

    fn receipt_succeeded(&self, hash: B256) -> bool {
        self.state()
            .receipts
            .get(&hash)
            .is_some_and(|receipt| receipt.status == ReceiptStatus::Success)
    }
}

impl ChainProvider for SimulatedChain {
    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, ChainError> {
        tokio::task::yield_now().await;
        Ok(self
            .state()
            .allowances
            .get(&(token, owner, spender))
            .copied()
            .unwrap_or(U256::ZERO))
    }

    async fn approve(
        &self,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> Result<B256, ChainError> {
        tokio::task::yield_now().await;
        let hash = self.mine("approve")?;
        if self.receipt_succeeded(hash) {
            let mut state = self.state();
            state.approvals.push((token, spender, amount));
            if !state.freeze_allowances {
                state.allowances.insert((token, self.caller, spender), amount);
            }
        }
        Ok(hash)
    }

    async fn claim_prize(&self, call: ClaimCall) -> Result<B256, ChainError> {
        tokio::task::yield_now().await;
        let hash = self.mine("claimPrize")?;
        self.state().claims.push(SubmittedClaim {
            token_id: call.token_id,
            recipient: call.recipient,
            bonus_recipient: None,
            hash,
        });
        Ok(hash)
    }

    async fn claim_prize_with_bonus(
        &self,
        call: ClaimCall,
        bonus_recipient: Address,
    ) -> Result<B256, ChainError> {
        tokio::task::yield_now().await;
        let hash = self.mine("claimPrizeWithBonus")?;
        self.state().claims.push(SubmittedClaim {
            token_id: call.token_id,
            recipient: call.recipient,
            bonus_recipient: Some(bonus_recipient),
            hash,
        });
        Ok(hash)
    }

    async fn receipt(&self, hash: B256) -> Result<Option<TxReceipt>, ChainError> {
        tokio::task::yield_now().await;
        let mut state = self.state();
        if state.failing_receipt_reads > 0 {
            state.failing_receipt_reads -= 1;
            return Err(ChainError::Transient("rpc timeout".into()));
        }
        Ok(state.receipts.get(&hash).copied())
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        tokio::task::yield_now().await;
        let mut state = self.state();
        let head = state.head;
        state.head += 1;
        Ok(head)
    }
}

#[derive(Debug, Default)]
struct SignerState {
    cards: HashMap<u64, (Prize, Address)>,
    requests: Vec<SignatureRequest>,
    fail_next: Option<SignatureError>,
}

/// Signs claims for cards registered with [`SimulatedSigner::register`].
#[derive(Clone, Debug)]
pub struct SimulatedSigner {
    validity_secs: u64,
    state: Arc<Mutex<SignerState>>,
}

impl SimulatedSigner {
    pub fn new(validity_secs: u64) -> Self {
        Self {
            validity_secs,
            state: Arc::default(),
        }
    }

    fn state(&self) -> MutexGuard<'_, SignerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn register(&self, card: &Card) {
        let asset = card.prize_asset_contract.unwrap_or(Address::ZERO);
        self.state()
            .cards
            .insert(card.token_id, (card.prize_amount, asset));
    }

    pub fn fail_next(&self, err: SignatureError) {
        self.state().fail_next = Some(err);
    }

    pub fn requests(&self) -> Vec<SignatureRequest> {
        self.state().requests.clone()
    }
}

impl SignatureService for SimulatedSigner {
    async fn claim_signature(
        &self,
        request: SignatureRequest,
    ) -> Result<ClaimSignature, SignatureError> {
        tokio::task::yield_now().await;
        let mut state = self.state();
        state.requests.push(request.clone());
        if let Some(err) = state.fail_next.take() {
            return Err(err);
        }
        let (prize, token_address) = state
            .cards
            .get(&request.token_id)
            .copied()
            .ok_or_else(|| SignatureError::Rejected {
                status: 404,
                body: format!("unknown token {}", request.token_id),
            })?;
        let mut hasher = Sha256::new();
        hasher.update(request.token_id.to_be_bytes());
        hasher.update(request.user_wallet.as_slice());
        let digest = hasher.finalize();
        let mut signature = digest.to_vec();
        signature.extend_from_slice(&digest);
        signature.push(27);
        let now = u64::try_from(Utc::now().timestamp()).unwrap_or(0);
        Ok(ClaimSignature {
            prize_amount: prize,
            token_address,
            deadline: now + self.validity_secs,
            signature: Bytes::from(signature),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PersistedWrite {
    TrackScratch(u64, TrackScratch),
    Claim(u64, ClaimRecord),
}

#[derive(Debug, Default)]
struct PersistenceState {
    writes: Vec<PersistedWrite>,
    failures_left: u32,
}

#[derive(Clone, Debug, Default)]
pub struct MemoryPersistence {
    state: Arc<Mutex<PersistenceState>>,
}

impl MemoryPersistence {
    fn state(&self) -> MutexGuard<'_, PersistenceState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn fail_next(&self, count: u32) {
        self.state().failures_left = count;
    }

    pub fn writes(&self) -> Vec<PersistedWrite> {
        self.state().writes.clone()
    }

    fn record(&self, write: PersistedWrite) -> Result<(), PersistenceError> {
        let mut state = self.state();
        if state.failures_left > 0 {
            state.failures_left -= 1;
            return Err(PersistenceError::Unreachable("connection refused".into()));
        }
        state.writes.push(write);
        Ok(())
    }
}

impl PersistenceService for MemoryPersistence {
    async fn track_scratch(&self, token_id: u64, body: TrackScratch) -> Result<(), PersistenceError> {
        tokio::task::yield_now().await;
        self.record(PersistedWrite::TrackScratch(token_id, body))
    }

    async fn record_claim(&self, token_id: u64, body: ClaimRecord) -> Result<(), PersistenceError> {
        tokio::task::yield_now().await;
        self.record(PersistedWrite::Claim(token_id, body))
    }
}

#[derive(Clone, Debug, Default)]
pub struct MemoryNotifier {
    notices: Arc<Mutex<Vec<WinNotice>>>,
    failing: bool,
}

impl MemoryNotifier {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn notices(&self) -> Vec<WinNotice> {
        self.notices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl WinNotifier for MemoryNotifier {
    async fn notify_win(&self, notice: WinNotice) -> Result<(), String> {
        if self.failing {
            return Err("notification service unavailable".into());
        }
        self.notices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(notice);
        Ok(())
    }
}

pub const GRID_ROWS: usize = 4;
const UNIT: u128 = 1_000_000;
const PRIZE_TABLE: [u128; 5] = [UNIT, 2 * UNIT, 5 * UNIT, 10 * UNIT, 25 * UNIT];

fn filler_row<R: Rng>(rng: &mut R, asset: Address) -> Vec<Cell> {
    let mut amounts: Vec<u128> = (0..ROW_WIDTH)
        .map(|_| PRIZE_TABLE[rng.random_range(0..PRIZE_TABLE.len())])
        .collect();
    if amounts.iter().all(|a| *a == amounts[0]) {
        let bumped = PRIZE_TABLE
            .iter()
            .copied()
            .find(|a| *a != amounts[0])
            .unwrap_or(UNIT + 1);
        amounts[ROW_WIDTH - 1] = bumped;
    }
    amounts
        .into_iter()
        .map(|amount| Cell::new(Prize::Tokens(amount), Some(asset)))
        .collect()
}

fn random_friend<R: Rng>(rng: &mut R) -> FriendRef {
    FriendRef {
        fid: rng.random_range(1..500_000),
        username: Some(fakeit::internet::username()),
        pfp: None,
        wallet: Some(Address::from(rng.random::<[u8; 20]>())),
    }
}

/// Draws a card whose grid is consistent with a randomly chosen prize.
pub fn random_card<R: Rng>(rng: &mut R, token_id: u64, asset: Address) -> Card {
    let roll = rng.random_range(0..100u32);
    let prize = match roll {
        0..60 => Prize::NoWin,
        60..75 => Prize::FreeCard,
        _ => Prize::Tokens(PRIZE_TABLE[rng.random_range(0..PRIZE_TABLE.len())]),
    };
    let winning_row = rng.random_range(0..GRID_ROWS);
    let mut cells = Vec::with_capacity(GRID_ROWS * ROW_WIDTH);
    for row in 0..GRID_ROWS {
        let mut row_cells = filler_row(rng, asset);
        if row == winning_row {
            match prize {
                Prize::Tokens(amount) => {
                    row_cells = vec![Cell::new(Prize::Tokens(amount), Some(asset)); ROW_WIDTH];
                }
                Prize::FreeCard => {
                    let slot = rng.random_range(0..ROW_WIDTH);
                    row_cells[slot] =
                        Cell::new(Prize::FreeCard, None).with_friend(random_friend(rng));
                }
                Prize::NoWin => {}
            }
        }
        cells.extend(row_cells);
    }
    Card {
        id: format!("sim-{token_id}"),
        token_id,
        prize_amount: prize,
        prize_asset_contract: match prize {
            Prize::Tokens(_) => Some(asset),
            _ => None,
        },
        cells,
        scratched: false,
        claimed: false,
        scratched_at: None,
        claimed_at: None,
    }
}
