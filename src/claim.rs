//! Drives a revealed prize to a confirmed on-chain claim.
//!
//! Session state is published through a `watch` channel so hosts can follow
//! every phase change. [`ClaimOrchestrator::reset`] only stops local
//! observation: a transaction that was already broadcast stays on the chain.

use crate::{
    approval::{
        ApprovalGate,
        ApprovalPolicy,
        TxStatus,
    },
    card::{
        Card,
        ClaimSignature,
        Prize,
    },
    confirmations::{
        ConfirmError,
        ConfirmationPolicy,
        wait_for_confirmations,
    },
    error::{
        ApprovalError,
        ChainError,
        ClaimError,
        SignatureError,
    },
    ports::{
        ChainProvider,
        ClaimCall,
        SignatureRequest,
        SignatureService,
    },
};
use alloy_primitives::{
    Address,
    B256,
    U256,
};
use chrono::Utc;
use tokio::sync::watch;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ClaimPhase {
    #[default]
    Idle,
    PendingSignature,
    PendingApproval,
    Submitting,
    Confirming,
    Success,
    Error,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClaimSession {
    pub token_id: Option<u64>,
    pub phase: ClaimPhase,
    pub approval: TxStatus,
    pub last_error: Option<ClaimError>,
    pub tx_hash: Option<B256>,
    epoch: u64,
}

impl ClaimSession {
    pub fn can_claim(&self) -> bool {
        matches!(self.phase, ClaimPhase::Idle | ClaimPhase::Success)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Scratch card contract; also the ERC-20 spender.
    pub contract: Address,
    pub confirmations: ConfirmationPolicy,
    pub approval: ApprovalPolicy,
    /// Token the contract pulls from the claimer, if any.
    pub payment_token: Option<Address>,
    pub standard_claim_cost: U256,
    pub bonus_claim_cost: U256,
}

impl OrchestratorConfig {
    pub fn new(contract: Address) -> Self {
        Self {
            contract,
            confirmations: ConfirmationPolicy::default(),
            approval: ApprovalPolicy::default(),
            payment_token: None,
            standard_claim_cost: U256::ZERO,
            bonus_claim_cost: U256::ZERO,
        }
    }

    fn required_allowance(&self, bonus: bool) -> U256 {
        if bonus {
            self.bonus_claim_cost
        } else {
            self.standard_claim_cost
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClaimRequest {
    pub token_id: u64,
    pub claimer: Address,
    /// `None` fetches one from the signer first.
    pub signature: Option<ClaimSignature>,
    /// `None` pays the caller.
    pub recipient: Option<Address>,
    pub bonus_recipient: Option<Address>,
}

impl ClaimRequest {
    /// Builds the request for a card. A free-card prize with a friend wallet in
    /// the grid takes the bonus path, paying that friend; anything else is a
    /// standard claim.
    pub fn for_card(card: &Card, claimer: Address, signature: Option<ClaimSignature>) -> Self {
        let bonus_recipient = match card.prize_amount {
            Prize::FreeCard => {
                let wallet = card.friend().and_then(|friend| friend.wallet);
                if wallet.is_none() {
                    tracing::warn!(
                        token_id = card.token_id,
                        "free card has no friend wallet, using standard claim"
                    );
                }
                wallet
            }
            _ => None,
        };
        Self {
            token_id: card.token_id,
            claimer,
            signature,
            recipient: None,
            bonus_recipient,
        }
    }
}

pub struct ClaimOrchestrator<C, S> {
    chain: C,
    signer: S,
    config: OrchestratorConfig,
    session: watch::Sender<ClaimSession>,
}

impl<C, S> ClaimOrchestrator<C, S> {
    pub fn new(chain: C, signer: S, config: OrchestratorConfig) -> Self {
        let (session, _) = watch::channel(ClaimSession::default());
        Self {
            chain,
            signer,
            config,
            session,
        }
    }

    pub fn session(&self) -> ClaimSession {
        self.session.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ClaimSession> {
        self.session.subscribe()
    }

    pub fn can_claim(&self) -> bool {
        self.session.borrow().can_claim()
    }

    /// Bumped by every accepted claim and every [`reset`](Self::reset).
    pub fn epoch(&self) -> u64 {
        self.session.borrow().epoch
    }

    /// Back to `Idle` with error and hash cleared. Safe from any phase.
    pub fn reset(&self) {
        self.session.send_modify(|session| {
            let epoch = session.epoch + 1;
            *session = ClaimSession {
                epoch,
                ..ClaimSession::default()
            };
        });
        tracing::debug!("claim session reset");
    }

    /// Applies `update` unless the session was reset since `epoch`.
    fn publish(
        &self,
        epoch: u64,
        tx_hash: Option<B256>,
        update: impl FnOnce(&mut ClaimSession),
    ) -> Result<(), ClaimError> {
        let current = self.session.send_if_modified(|session| {
            if session.epoch != epoch {
                return false;
            }
            update(session);
            true
        });
        if current {
            Ok(())
        } else {
            Err(ClaimError::Detached { tx_hash })
        }
    }

    fn enter(&self, epoch: u64, tx_hash: Option<B256>, phase: ClaimPhase) -> Result<(), ClaimError> {
        tracing::info!(?phase, "claim phase");
        self.publish(epoch, tx_hash, |session| {
            session.phase = phase;
            if tx_hash.is_some() {
                session.tx_hash = tx_hash;
            }
        })
    }
}

impl<C, S> ClaimOrchestrator<C, S>
where
    C: ChainProvider,
    S: SignatureService,
{
    /// Runs one claim attempt. Rejected locally while another attempt is in
    /// flight; a failed submission is never retried here.
    pub async fn claim(&self, request: ClaimRequest) -> Result<B256, ClaimError> {
        self.start(request, None).await
    }

    /// Runs one claim attempt for a job created while the session was at
    /// `epoch`. Refused with [`ClaimError::Detached`] when the session was
    /// reset in between, before anything reaches the signer or the chain.
    pub async fn claim_from(&self, epoch: u64, request: ClaimRequest) -> Result<B256, ClaimError> {
        self.start(request, Some(epoch)).await
    }

    async fn start(&self, request: ClaimRequest, since: Option<u64>) -> Result<B256, ClaimError> {
        let mut epoch = 0;
        let mut stale = false;
        let accepted = self.session.send_if_modified(|session| {
            if !session.can_claim() {
                return false;
            }
            if since.is_some_and(|since| since != session.epoch) {
                stale = true;
                return false;
            }
            epoch = session.epoch + 1;
            *session = ClaimSession {
                token_id: Some(request.token_id),
                phase: ClaimPhase::PendingSignature,
                epoch,
                ..ClaimSession::default()
            };
            true
        });
        if stale {
            tracing::info!(token_id = request.token_id, "claim job outlived its card, not starting");
            return Err(ClaimError::Detached { tx_hash: None });
        }
        if !accepted {
            tracing::warn!(token_id = request.token_id, "claim rejected, another attempt is in flight");
            return Err(ClaimError::AlreadyInFlight {
                token_id: request.token_id,
            });
        }

        let result = self.run(&request, epoch).await;
        let finished = match &result {
            Ok(hash) => self.publish(epoch, Some(*hash), |session| {
                session.phase = ClaimPhase::Success;
                session.tx_hash = Some(*hash);
            }),
            Err(ClaimError::Detached { .. }) => Ok(()),
            Err(err) => self.publish(epoch, err.broadcast_hash(), |session| {
                session.phase = ClaimPhase::Error;
                session.last_error = Some(err.clone());
                if let Some(hash) = err.broadcast_hash() {
                    session.tx_hash = Some(hash);
                }
            }),
        };
        match finished {
            Ok(()) => result,
            Err(detached) => {
                tracing::info!(token_id = request.token_id, "claim finished after reset");
                Err(detached)
            }
        }
    }

    async fn run(&self, request: &ClaimRequest, epoch: u64) -> Result<B256, ClaimError> {
        let signature = match &request.signature {
            Some(signature) => signature.clone(),
            None => {
                self.signer
                    .claim_signature(SignatureRequest {
                        token_id: request.token_id,
                        user_wallet: request.claimer,
                    })
                    .await?
            }
        };
        if signature.is_expired(Utc::now()) {
            return Err(SignatureError::Expired {
                deadline: signature.deadline,
            }
            .into());
        }

        let bonus = request.bonus_recipient.is_some();
        self.ensure_allowance(request, bonus, epoch).await?;

        self.enter(epoch, None, ClaimPhase::Submitting)?;
        let call = ClaimCall {
            contract: self.config.contract,
            token_id: request.token_id,
            signature,
            recipient: request.recipient.unwrap_or(Address::ZERO),
        };
        let submitted = match request.bonus_recipient {
            Some(bonus_recipient) => {
                self.chain
                    .claim_prize_with_bonus(call, bonus_recipient)
                    .await
            }
            None => self.chain.claim_prize(call).await,
        };
        let hash = submitted.map_err(|err| match err {
            ChainError::Rejected(reason) | ChainError::Transient(reason) => {
                ClaimError::Rejected(reason)
            }
        })?;
        tracing::info!(token_id = request.token_id, %hash, bonus, "claim submitted");

        self.enter(epoch, Some(hash), ClaimPhase::Confirming)?;
        wait_for_confirmations(&self.chain, hash, &self.config.confirmations)
            .await
            .map_err(|err| match err {
                ConfirmError::Reverted => ClaimError::Reverted(hash),
                ConfirmError::Timeout { waited } => ClaimError::Timeout {
                    hash,
                    waited_ms: u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
                },
                ConfirmError::Unavailable(err) => ClaimError::ReceiptUnavailable {
                    hash,
                    reason: err.to_string(),
                },
            })?;
        self.publish(epoch, Some(hash), |_| {})?;
        Ok(hash)
    }

    async fn ensure_allowance(
        &self,
        request: &ClaimRequest,
        bonus: bool,
        epoch: u64,
    ) -> Result<(), ClaimError> {
        let required = self.config.required_allowance(bonus);
        let Some(token) = self.config.payment_token else {
            return Ok(());
        };
        if required.is_zero() {
            return Ok(());
        }
        let mut gate = ApprovalGate::new(
            token,
            request.claimer,
            self.config.contract,
            required,
            self.config.confirmations.clone(),
        );
        gate.refresh(&self.chain).await?;
        if gate.has_sufficient_approval() {
            tracing::debug!(%required, "allowance sufficient, skipping approval");
            return Ok(());
        }

        self.enter(epoch, None, ClaimPhase::PendingApproval)?;
        self.publish(epoch, None, |session| session.approval = TxStatus::Pending)?;
        let approved = match self.config.approval {
            ApprovalPolicy::Exact => gate.approve_exact(&self.chain, required).await,
            ApprovalPolicy::Unlimited => gate.approve_unlimited(&self.chain).await,
        };
        let status = gate.status();
        self.publish(epoch, gate.last_hash(), |session| session.approval = status)?;
        approved?;
        if gate.needs_approval() {
            let allowance = gate.allowance().unwrap_or(U256::ZERO);
            return Err(ApprovalError::StillInsufficient {
                allowance: allowance.to_string(),
                required: required.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::simulated::{
        SimulatedChain,
        SimulatedSigner,
    };
    use alloy_primitives::{
        Bytes,
        address,
    };
    use std::time::Duration;

    const USDC: Address = address!("833589fcd6edb6e08f4c7c32d4f71b54bda02913");
    const ME: Address = address!("00000000000000000000000000000000000000b0");
    const FRIEND: Address = address!("00000000000000000000000000000000000000f1");
    const CARDS: Address = address!("00000000000000000000000000000000000000c0");

    fn signature(deadline: u64) -> ClaimSignature {
        ClaimSignature {
            prize_amount: Prize::Tokens(10),
            token_address: USDC,
            deadline,
            signature: Bytes::from_static(&[7; 65]),
        }
    }

    fn request() -> ClaimRequest {
        ClaimRequest {
            token_id: 5,
            claimer: ME,
            signature: Some(signature(u64::MAX)),
            recipient: None,
            bonus_recipient: None,
        }
    }

    fn orchestrator(
        config: OrchestratorConfig,
    ) -> (ClaimOrchestrator<SimulatedChain, SimulatedSigner>, SimulatedChain) {
        let chain = SimulatedChain::new(ME);
        let signer = SimulatedSigner::new(600);
        (ClaimOrchestrator::new(chain.clone(), signer, config), chain)
    }

    fn paying_config() -> OrchestratorConfig {
        OrchestratorConfig {
            payment_token: Some(USDC),
            bonus_claim_cost: U256::from(100),
            approval: ApprovalPolicy::Exact,
            ..OrchestratorConfig::new(CARDS)
        }
    }

    #[tokio::test]
    async fn claim__twice_in_rapid_succession__submits_exactly_once() {
        // given
        tokio::time::pause();
        let (orchestrator, chain) = orchestrator(OrchestratorConfig::new(CARDS));

        // when
        let (first, second) =
            tokio::join!(orchestrator.claim(request()), orchestrator.claim(request()));

        // then
        assert!(first.is_ok());
        assert_eq!(second, Err(ClaimError::AlreadyInFlight { token_id: 5 }));
        assert_eq!(chain.claims().len(), 1);
        assert_eq!(orchestrator.session().phase, ClaimPhase::Success);
    }

    #[tokio::test]
    async fn claim__in_flight__can_claim_is_false() {
        // given
        tokio::time::pause();
        let (orchestrator, _chain) = orchestrator(OrchestratorConfig::new(CARDS));
        let mut updates = orchestrator.subscribe();

        // when
        let observe = async {
            updates.changed().await.unwrap();
            let phase = updates.borrow().phase;
            (phase, orchestrator.can_claim())
        };
        let (result, (phase, can_claim)) = tokio::join!(orchestrator.claim(request()), observe);

        // then
        assert!(result.is_ok());
        assert_ne!(phase, ClaimPhase::Idle);
        assert!(!can_claim);
    }

    #[tokio::test]
    async fn claim__bonus_path_needing_approval__approves_then_claims_with_friend() {
        // given
        tokio::time::pause();
        let (orchestrator, chain) = orchestrator(paying_config());
        let mut updates = orchestrator.subscribe();
        let req = ClaimRequest {
            bonus_recipient: Some(FRIEND),
            ..request()
        };

        // when
        let collect = async {
            let mut phases = Vec::new();
            while updates.changed().await.is_ok() {
                let phase = updates.borrow().phase;
                if phases.last() != Some(&phase) {
                    phases.push(phase);
                }
                if matches!(phase, ClaimPhase::Success | ClaimPhase::Error) {
                    break;
                }
            }
            phases
        };
        let (result, phases) = tokio::join!(orchestrator.claim(req), collect);

        // then
        let hash = result.unwrap();
        assert_eq!(chain.approvals(), vec![(USDC, CARDS, U256::from(100))]);
        let claims = chain.claims();
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].bonus_recipient, Some(FRIEND));
        assert_eq!(claims[0].recipient, Address::ZERO);
        assert_eq!(claims[0].hash, hash);
        let approval_at = phases.iter().position(|p| *p == ClaimPhase::PendingApproval);
        let submit_at = phases.iter().position(|p| *p == ClaimPhase::Submitting);
        let confirm_at = phases.iter().position(|p| *p == ClaimPhase::Confirming);
        assert!(approval_at < submit_at && submit_at < confirm_at, "{phases:?}");
        assert_eq!(orchestrator.session().approval, TxStatus::Success);
    }

    #[tokio::test]
    async fn claim__allowance_already_sufficient__skips_approval() {
        // given
        tokio::time::pause();
        let (orchestrator, chain) = orchestrator(paying_config());
        chain.set_allowance(USDC, ME, CARDS, U256::from(1_000));
        let req = ClaimRequest {
            bonus_recipient: Some(FRIEND),
            ..request()
        };

        // when
        let result = orchestrator.claim(req).await;

        // then
        assert!(result.is_ok());
        assert!(chain.approvals().is_empty());
        assert_eq!(orchestrator.session().approval, TxStatus::Idle);
    }

    #[tokio::test]
    async fn claim__standard_path_without_cost__skips_approval() {
        // given
        tokio::time::pause();
        let (orchestrator, chain) = orchestrator(paying_config());

        // when
        let result = orchestrator.claim(request()).await;

        // then
        assert!(result.is_ok());
        assert!(chain.approvals().is_empty());
        assert_eq!(chain.claims()[0].bonus_recipient, None);
    }

    #[tokio::test]
    async fn claim__submission_rejected__is_terminal_and_not_resubmitted() {
        // given
        tokio::time::pause();
        let (orchestrator, chain) = orchestrator(OrchestratorConfig::new(CARDS));
        chain.reject_next_write("execution reverted: bad signature");

        // when
        let result = orchestrator.claim(request()).await;

        // then
        assert_eq!(
            result,
            Err(ClaimError::Rejected("execution reverted: bad signature".into()))
        );
        assert!(chain.claims().is_empty());
        let session = orchestrator.session();
        assert_eq!(session.phase, ClaimPhase::Error);
        assert!(!session.can_claim());
    }

    #[tokio::test]
    async fn claim__transient_receipt_failures__retried_within_budget() {
        // given
        tokio::time::pause();
        let (orchestrator, chain) = orchestrator(OrchestratorConfig::new(CARDS));
        chain.fail_receipt_reads(2);

        // when
        let result = orchestrator.claim(request()).await;

        // then
        assert!(result.is_ok());
        assert_eq!(chain.claims().len(), 1);
    }

    #[tokio::test]
    async fn claim__receipt_reads_keep_failing__reports_unavailable_with_hash() {
        // given
        tokio::time::pause();
        let (orchestrator, chain) = orchestrator(OrchestratorConfig::new(CARDS));
        chain.fail_receipt_reads(3);

        // when
        let result = orchestrator.claim(request()).await;

        // then
        let hash = chain.claims()[0].hash;
        assert!(matches!(
            result,
            Err(ClaimError::ReceiptUnavailable { hash: h, .. }) if h == hash
        ));
        assert_eq!(orchestrator.session().tx_hash, Some(hash));
    }

    #[tokio::test]
    async fn claim__reverted_transaction__ends_in_error() {
        // given
        tokio::time::pause();
        let (orchestrator, chain) = orchestrator(OrchestratorConfig::new(CARDS));
        chain.revert_next_write();

        // when
        let result = orchestrator.claim(request()).await;

        // then
        assert!(matches!(result, Err(ClaimError::Reverted(_))));
        assert_eq!(orchestrator.session().phase, ClaimPhase::Error);
    }

    #[tokio::test]
    async fn claim__expired_signature__fails_before_any_write() {
        // given
        tokio::time::pause();
        let (orchestrator, chain) = orchestrator(OrchestratorConfig::new(CARDS));
        let req = ClaimRequest {
            signature: Some(signature(1)),
            ..request()
        };

        // when
        let result = orchestrator.claim(req).await;

        // then
        assert_eq!(
            result,
            Err(ClaimError::Signature(SignatureError::Expired { deadline: 1 }))
        );
        assert!(chain.claims().is_empty());
    }

    #[tokio::test]
    async fn claim__without_signature__fetches_one_first() {
        // given
        tokio::time::pause();
        let chain = SimulatedChain::new(ME);
        let signer = SimulatedSigner::new(600);
        let card = crate::simulated::random_card(&mut rand::rng(), 5, USDC);
        signer.register(&card);
        let orchestrator =
            ClaimOrchestrator::new(chain.clone(), signer.clone(), OrchestratorConfig::new(CARDS));
        let req = ClaimRequest {
            signature: None,
            ..request()
        };

        // when
        let result = orchestrator.claim(req).await;

        // then
        assert!(result.is_ok());
        assert_eq!(signer.requests().len(), 1);
    }

    #[tokio::test]
    async fn reset__mid_flight__detaches_observation_but_not_the_transaction() {
        // given
        tokio::time::pause();
        let (orchestrator, chain) = orchestrator(OrchestratorConfig::new(CARDS));
        let mut updates = orchestrator.subscribe();

        // when
        let reset_when_confirming = async {
            loop {
                updates.changed().await.unwrap();
                let phase = updates.borrow().phase;
                if phase == ClaimPhase::Confirming {
                    break;
                }
            }
            orchestrator.reset();
        };
        let (result, ()) = tokio::join!(orchestrator.claim(request()), reset_when_confirming);

        // then
        let broadcast = chain.claims()[0].hash;
        assert_eq!(
            result,
            Err(ClaimError::Detached {
                tx_hash: Some(broadcast)
            })
        );
        let session = orchestrator.session();
        assert_eq!(session.phase, ClaimPhase::Idle);
        assert_eq!(session.tx_hash, None);
        assert!(orchestrator.can_claim());
    }

    #[tokio::test]
    async fn reset__after_error__allows_user_retry() {
        // given
        tokio::time::pause();
        let (orchestrator, chain) = orchestrator(OrchestratorConfig::new(CARDS));
        chain.reject_next_write("user rejected");
        let _ = orchestrator.claim(request()).await;

        // when
        orchestrator.reset();
        let retried = orchestrator.claim(request()).await;

        // then
        assert!(retried.is_ok());
        assert_eq!(chain.claims().len(), 1);
    }

    #[test]
    fn for_card__free_card_with_friend_wallet__targets_the_friend() {
        // given
        let friend = crate::card::FriendRef {
            fid: 1,
            username: None,
            pfp: None,
            wallet: Some(FRIEND),
        };
        let mut cells = vec![crate::card::Cell::new(Prize::Tokens(3), Some(USDC)); 3];
        cells[1] = cells[1].clone().with_friend(friend);
        let card = Card {
            id: "c".into(),
            token_id: 8,
            prize_amount: Prize::FreeCard,
            prize_asset_contract: None,
            cells,
            scratched: true,
            claimed: false,
            scratched_at: None,
            claimed_at: None,
        };

        // when
        let request = ClaimRequest::for_card(&card, ME, None);

        // then
        assert_eq!(request.bonus_recipient, Some(FRIEND));
        assert_ne!(request.bonus_recipient, Some(ME));
    }

    #[tokio::test]
    async fn claim__confirmation_never_arrives__times_out() {
        // given
        tokio::time::pause();
        let config = OrchestratorConfig {
            confirmations: ConfirmationPolicy {
                confirmations: 1_000,
                timeout: Duration::from_secs(10),
                ..ConfirmationPolicy::default()
            },
            ..OrchestratorConfig::new(CARDS)
        };
        let (orchestrator, _chain) = orchestrator(config);

        // when
        let result = orchestrator.claim(request()).await;

        // then
        assert!(matches!(result, Err(ClaimError::Timeout { .. })));
    }

    fn bonus_request() -> ClaimRequest {
        ClaimRequest {
            bonus_recipient: Some(FRIEND),
            ..request()
        }
    }

    #[tokio::test]
    async fn claim__approval_rejected__ends_in_approval_error_without_claim() {
        // given
        tokio::time::pause();
        let (orchestrator, chain) = orchestrator(paying_config());
        chain.reject_next_write("user denied approval");

        // when
        let result = orchestrator.claim(bonus_request()).await;

        // then
        assert_eq!(
            result,
            Err(ClaimError::Approval(ApprovalError::Rejected(
                "user denied approval".into()
            )))
        );
        assert!(chain.claims().is_empty());
        let session = orchestrator.session();
        assert_eq!(session.phase, ClaimPhase::Error);
        assert_eq!(session.approval, TxStatus::Error);
        assert_eq!(
            session.last_error.map(|err| err.kind()),
            Some(crate::error::ErrorKind::Approval)
        );
    }

    #[tokio::test]
    async fn claim__approval_reverted__no_claim_is_submitted() {
        // given
        tokio::time::pause();
        let (orchestrator, chain) = orchestrator(paying_config());
        chain.revert_next_write();

        // when
        let result = orchestrator.claim(bonus_request()).await;

        // then
        assert!(matches!(
            result,
            Err(ClaimError::Approval(ApprovalError::Reverted(_)))
        ));
        assert!(chain.approvals().is_empty());
        assert!(chain.claims().is_empty());
        assert_eq!(orchestrator.session().phase, ClaimPhase::Error);
    }

    #[tokio::test]
    async fn claim__allowance_unchanged_after_approval__still_insufficient() {
        // given
        tokio::time::pause();
        let (orchestrator, chain) = orchestrator(paying_config());
        chain.freeze_allowances(true);

        // when
        let result = orchestrator.claim(bonus_request()).await;

        // then
        assert_eq!(
            result,
            Err(ClaimError::Approval(ApprovalError::StillInsufficient {
                allowance: "0".into(),
                required: "100".into(),
            }))
        );
        assert_eq!(chain.approvals(), vec![(USDC, CARDS, U256::from(100))]);
        assert!(chain.claims().is_empty());
        assert_eq!(orchestrator.session().phase, ClaimPhase::Error);
    }

    #[tokio::test]
    async fn claim_from__reset_before_first_poll__detached_without_any_write() {
        // given
        tokio::time::pause();
        let (orchestrator, chain) = orchestrator(OrchestratorConfig::new(CARDS));
        let epoch = orchestrator.epoch();
        let job = orchestrator.claim_from(epoch, request());

        // when
        orchestrator.reset();
        let result = job.await;

        // then
        assert_eq!(result, Err(ClaimError::Detached { tx_hash: None }));
        assert!(chain.claims().is_empty());
        assert_eq!(orchestrator.session().phase, ClaimPhase::Idle);
        assert!(orchestrator.can_claim());
    }
}
