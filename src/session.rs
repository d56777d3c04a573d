//! Runs the reveal reducer against real collaborators for one visible card.
//!
//! A [`CardSession`] owns the detector, the reveal state and the card's claim
//! orchestrator. Reducer effects are executed in order; a started claim is
//! handed back to the host as a [`ClaimJob`] so input and redraws keep flowing
//! while the transaction confirms. Persistence writes and win notifications
//! never hold up the reveal: they run in the background and are driven by
//! [`CardSession::next_background`]. Host-facing notifications go out on the
//! [`HostEvent`] channel returned by [`CardSession::new`].

use crate::{
    card::{
        Card,
        Prize,
    },
    claim::{
        ClaimOrchestrator,
        ClaimRequest,
        ClaimSession,
        OrchestratorConfig,
    },
    detector::{
        DetectorConfig,
        Point,
        ScratchDetector,
    },
    error::{
        ClaimError,
        ErrorKind,
        InputError,
        PersistenceError,
    },
    ports::{
        ChainProvider,
        ClaimRecord,
        FeedbackSink,
        PersistenceService,
        SignatureService,
        TrackScratch,
        WinNotice,
        WinNotifier,
    },
    reveal::{
        ClaimPolicy,
        Effect,
        Message,
        RevealContext,
        RevealState,
    },
};
use alloy_primitives::{
    Address,
    B256,
};
use chrono::Utc;
use futures::{
    StreamExt,
    future::{
        FutureExt,
        LocalBoxFuture,
    },
    stream::FuturesUnordered,
};
use std::{
    collections::VecDeque,
    rc::Rc,
};
use tokio::{
    sync::mpsc,
    time::Instant,
};

#[derive(Clone, Debug, PartialEq)]
pub enum HostEvent {
    Revealed {
        token_id: u64,
        prize: Prize,
        winning_row: Option<usize>,
    },
    ClaimStateChanged(ClaimSession),
    Error {
        kind: ErrorKind,
        detail: String,
    },
}

/// Persistence call that failed and is waiting for
/// [`CardSession::retry_pending_writes`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PendingWrite {
    TrackScratch { token_id: u64, body: TrackScratch },
    Claim { token_id: u64, body: ClaimRecord },
}

impl PendingWrite {
    pub fn token_id(&self) -> u64 {
        match self {
            PendingWrite::TrackScratch { token_id, .. } | PendingWrite::Claim { token_id, .. } => {
                *token_id
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClaimOutcome {
    pub token_id: u64,
    pub result: Result<B256, ClaimError>,
}

/// A started claim. Poll it to completion and hand the outcome to
/// [`CardSession::finish_claim`].
pub type ClaimJob = LocalBoxFuture<'static, ClaimOutcome>;

/// A finished background call.
enum Settled {
    Write {
        write: PendingWrite,
        result: Result<(), PersistenceError>,
    },
    Notified {
        token_id: u64,
        result: Result<(), String>,
    },
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub claimer: Address,
    pub policy: ClaimPolicy,
    pub detector: DetectorConfig,
    /// Logical size of the scratch surface.
    pub surface: (u32, u32),
    pub orchestrator: OrchestratorConfig,
}

pub struct Collaborators<C, S, P, N, F> {
    pub chain: C,
    pub signer: S,
    pub persistence: P,
    pub notifier: N,
    pub feedback: F,
}

struct Attached<C, S> {
    card: Card,
    state: RevealState,
    orchestrator: Rc<ClaimOrchestrator<C, S>>,
}

pub struct CardSession<C, S, P, N, F> {
    config: SessionConfig,
    chain: C,
    signer: S,
    persistence: P,
    notifier: N,
    feedback: F,
    detector: ScratchDetector,
    attached: Option<Attached<C, S>>,
    pending: VecDeque<PendingWrite>,
    background: FuturesUnordered<LocalBoxFuture<'static, Settled>>,
    events: mpsc::UnboundedSender<HostEvent>,
}

impl<C, S, P, N, F> CardSession<C, S, P, N, F> {
    pub fn card(&self) -> Option<&Card> {
        self.attached.as_ref().map(|attached| &attached.card)
    }

    pub fn reveal_state(&self) -> Option<&RevealState> {
        self.attached.as_ref().map(|attached| &attached.state)
    }

    pub fn claim_session(&self) -> Option<ClaimSession> {
        self.attached
            .as_ref()
            .map(|attached| attached.orchestrator.session())
    }

    pub fn detector(&self) -> &ScratchDetector {
        &self.detector
    }

    pub fn claimer(&self) -> Address {
        self.config.claimer
    }

    pub fn pending_writes(&self) -> &VecDeque<PendingWrite> {
        &self.pending
    }

    /// Persistence writes and notifications still running.
    pub fn background_len(&self) -> usize {
        self.background.len()
    }

    pub fn feedback(&self) -> &F {
        &self.feedback
    }

    fn emit(&self, event: HostEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("host event receiver dropped");
        }
    }

    fn report(&self, kind: ErrorKind, detail: String) {
        self.emit(HostEvent::Error { kind, detail });
    }

    pub fn scratch_begin(&mut self, p: Point) {
        self.detector.begin_stroke(p);
    }

    pub fn scratch_move(&mut self, p: Point) {
        self.detector.move_to(p);
    }

    pub fn scratch_end(&mut self, now: Instant) {
        self.detector.end_stroke(now);
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.detector.next_deadline()
    }
}

impl<C, S, P, N, F> CardSession<C, S, P, N, F>
where
    C: ChainProvider + Clone + 'static,
    S: SignatureService + Clone + 'static,
    P: PersistenceService + Clone + 'static,
    N: WinNotifier + Clone + 'static,
    F: FeedbackSink,
{
    pub fn new(
        config: SessionConfig,
        collaborators: Collaborators<C, S, P, N, F>,
    ) -> (Self, mpsc::UnboundedReceiver<HostEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let (width, height) = config.surface;
        let detector = ScratchDetector::new(config.detector.clone(), width, height);
        let session = Self {
            config,
            chain: collaborators.chain,
            signer: collaborators.signer,
            persistence: collaborators.persistence,
            notifier: collaborators.notifier,
            feedback: collaborators.feedback,
            detector,
            attached: None,
            pending: VecDeque::new(),
            background: FuturesUnordered::new(),
            events,
        };
        (session, receiver)
    }

    /// Shows `card`, replacing whatever was attached. Malformed cards are
    /// refused and reported, never repaired.
    pub fn attach(&mut self, card: Card) -> Result<(), InputError> {
        self.detach();
        if let Err(err) = card.validate() {
            tracing::error!(token_id = card.token_id, error = %err, "refusing malformed card");
            self.report(ErrorKind::Input, err.to_string());
            return Err(err);
        }
        let orchestrator = ClaimOrchestrator::new(
            self.chain.clone(),
            self.signer.clone(),
            self.config.orchestrator.clone(),
        );
        self.detector.attach(card.scratched);
        self.feedback.init();
        tracing::info!(token_id = card.token_id, prize = %card.prize_amount, "card attached");
        self.attached = Some(Attached {
            state: RevealState::for_card(&card),
            card,
            orchestrator: Rc::new(orchestrator),
        });
        Ok(())
    }

    /// Drops the card. A claim already broadcast keeps going on chain, but its
    /// outcome is no longer observed.
    pub fn detach(&mut self) {
        self.detector.cancel();
        let Some(mut attached) = self.attached.take() else {
            return;
        };
        attached.orchestrator.reset();
        let ctx = RevealContext {
            card: &attached.card,
            claimer: self.config.claimer,
            policy: self.config.policy,
        };
        attached.state.apply(&ctx, Message::Teardown);
        self.feedback.teardown();
        tracing::info!(token_id = attached.card.token_id, "card detached");
    }

    /// Advances the detector clock and runs the reveal once the threshold
    /// event is due.
    pub async fn tick(&mut self, now: Instant) -> Option<ClaimJob> {
        let event = self.detector.poll(now)?;
        if !self.detector.is_current(&event) {
            return None;
        }
        let job = self.dispatch(Message::ThresholdCrossed).await;
        self.detector.finish_processing();
        job
    }

    /// Picks up a card that was scratched earlier but never claimed.
    pub async fn resume(&mut self) -> Option<ClaimJob> {
        self.dispatch(Message::Resume).await
    }

    pub async fn request_claim(&mut self) -> Option<ClaimJob> {
        self.dispatch(Message::ClaimRequested).await
    }

    pub async fn tilt(&mut self, x: f32, y: f32) {
        self.dispatch(Message::Tilt { x, y }).await;
    }

    pub async fn finish_claim(&mut self, outcome: ClaimOutcome) {
        let current = self.card().map(|card| card.token_id);
        if current != Some(outcome.token_id) {
            tracing::debug!(token_id = outcome.token_id, "dropping claim outcome for detached card");
            return;
        }
        if let Err(ClaimError::Detached { tx_hash }) = &outcome.result {
            tracing::info!(token_id = outcome.token_id, ?tx_hash, "claim observation detached");
            return;
        }
        self.dispatch(Message::ClaimFinished(outcome.result)).await;
    }

    /// Awaits `job` and feeds its outcome back in.
    pub async fn run_claim(&mut self, job: ClaimJob) {
        let outcome = job.await;
        self.finish_claim(outcome).await;
    }

    /// Resubmits every queued persistence write once. Returns how many were
    /// resubmitted; failures land back in the queue as they settle.
    pub fn retry_pending_writes(&mut self) -> usize {
        let queued: Vec<PendingWrite> = self.pending.drain(..).collect();
        let count = queued.len();
        for write in queued {
            self.persist(write);
        }
        tracing::info!(count, "resubmitted pending persistence writes");
        count
    }

    /// Settles the next finished background call. Never completes while
    /// nothing is running, so it can sit in a `select!` arm.
    pub async fn next_background(&mut self) {
        match self.background.next().await {
            Some(settled) => self.settle(settled),
            None => std::future::pending().await,
        }
    }

    /// Waits for every background call to finish.
    pub async fn flush_background(&mut self) {
        while let Some(settled) = self.background.next().await {
            self.settle(settled);
        }
    }

    async fn dispatch(&mut self, message: Message) -> Option<ClaimJob> {
        let effects = self.apply(message)?;
        let mut queue = VecDeque::from(effects);
        let mut job = None;
        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::PlayFeedback(feedback) => self.feedback.play(feedback),
                Effect::TrackScratch(body) => {
                    let token_id = self.mark_scratched()?;
                    self.persist(PendingWrite::TrackScratch { token_id, body });
                }
                Effect::RequestSignature(request) => {
                    let result = self.signer.claim_signature(request).await;
                    if let Some(effects) = self.apply(Message::SignatureResolved(result)) {
                        queue.extend(effects);
                    }
                }
                Effect::NotifyWin(notice) => self.notify(notice),
                Effect::Revealed {
                    token_id,
                    prize,
                    winning_row,
                } => self.emit(HostEvent::Revealed {
                    token_id,
                    prize,
                    winning_row,
                }),
                Effect::StartClaim { signature } => {
                    let attached = self.attached.as_ref()?;
                    let request =
                        ClaimRequest::for_card(&attached.card, self.config.claimer, signature);
                    job = Some(self.claim_job(request)?);
                }
                Effect::PersistClaim(body) => {
                    let token_id = self.mark_claimed()?;
                    self.persist(PendingWrite::Claim { token_id, body });
                }
                Effect::ReportError { kind, detail } => self.report(kind, detail),
            }
        }
        job
    }

    fn apply(&mut self, message: Message) -> Option<Vec<Effect>> {
        let attached = self.attached.as_mut()?;
        let ctx = RevealContext {
            card: &attached.card,
            claimer: self.config.claimer,
            policy: self.config.policy,
        };
        Some(attached.state.apply(&ctx, message))
    }

    fn mark_scratched(&mut self) -> Option<u64> {
        let attached = self.attached.as_mut()?;
        attached.card.mark_scratched(Utc::now());
        Some(attached.card.token_id)
    }

    fn mark_claimed(&mut self) -> Option<u64> {
        let attached = self.attached.as_mut()?;
        let token_id = attached.card.token_id;
        if let Err(err) = attached.card.mark_claimed(Utc::now()) {
            tracing::warn!(token_id, error = %err, "card state rejected claim");
            self.report(ErrorKind::Input, err.to_string());
        }
        Some(token_id)
    }

    fn claim_job(&self, request: ClaimRequest) -> Option<ClaimJob> {
        let orchestrator = Rc::clone(&self.attached.as_ref()?.orchestrator);
        if orchestrator.session().phase == crate::claim::ClaimPhase::Error {
            orchestrator.reset();
        }
        // A detach before the job is first polled must keep it off the chain.
        let epoch = orchestrator.epoch();
        let events = self.events.clone();
        let job = async move {
            let token_id = request.token_id;
            let mut updates = orchestrator.subscribe();
            let claim = orchestrator.claim_from(epoch, request);
            tokio::pin!(claim);
            let result = loop {
                tokio::select! {
                    result = &mut claim => break result,
                    Ok(()) = updates.changed() => {
                        let session = updates.borrow_and_update().clone();
                        let _ = events.send(HostEvent::ClaimStateChanged(session));
                    }
                }
            };
            if updates.has_changed().unwrap_or(false) {
                let session = updates.borrow_and_update().clone();
                let _ = events.send(HostEvent::ClaimStateChanged(session));
            }
            ClaimOutcome { token_id, result }
        };
        Some(job.boxed_local())
    }

    fn persist(&mut self, write: PendingWrite) {
        let persistence = self.persistence.clone();
        self.background.push(
            async move {
                let result = write_to(&persistence, &write).await;
                Settled::Write { write, result }
            }
            .boxed_local(),
        );
    }

    fn notify(&mut self, notice: WinNotice) {
        let notifier = self.notifier.clone();
        self.background.push(
            async move {
                let token_id = notice.token_id;
                let result = notifier.notify_win(notice).await;
                Settled::Notified { token_id, result }
            }
            .boxed_local(),
        );
    }

    fn settle(&mut self, settled: Settled) {
        match settled {
            Settled::Write { write, result } => {
                let token_id = write.token_id();
                match result {
                    Ok(()) => tracing::debug!(token_id, ?write, "persisted"),
                    Err(err) => {
                        tracing::warn!(token_id, error = %err, "persistence write failed, queued for retry");
                        self.report(ErrorKind::Persistence, err.to_string());
                        self.pending.push_back(write);
                    }
                }
            }
            Settled::Notified { token_id, result } => {
                if let Err(reason) = result {
                    tracing::warn!(token_id, %reason, "win notification failed");
                }
            }
        }
    }
}

async fn write_to<P: PersistenceService>(
    persistence: &P,
    write: &PendingWrite,
) -> Result<(), PersistenceError> {
    match write {
        PendingWrite::TrackScratch { token_id, body } => {
            persistence.track_scratch(*token_id, body.clone()).await
        }
        PendingWrite::Claim { token_id, body } => {
            persistence.record_claim(*token_id, body.clone()).await
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::{
        card::Cell,
        claim::ClaimPhase,
        ports::LogFeedback,
        reveal::Phase,
        simulated::{
            MemoryNotifier,
            MemoryPersistence,
            PersistedWrite,
            SimulatedChain,
            SimulatedSigner,
        },
    };
    use alloy_primitives::address;
    use std::time::Duration;

    const USDC: Address = address!("833589fcd6edb6e08f4c7c32d4f71b54bda02913");
    const ME: Address = address!("00000000000000000000000000000000000000b0");
    const CARDS: Address = address!("00000000000000000000000000000000000000c0");

    type TestSession =
        CardSession<SimulatedChain, SimulatedSigner, MemoryPersistence, MemoryNotifier, LogFeedback>;

    struct Harness {
        session: TestSession,
        events: mpsc::UnboundedReceiver<HostEvent>,
        chain: SimulatedChain,
        signer: SimulatedSigner,
        persistence: MemoryPersistence,
    }

    fn harness(notifier: MemoryNotifier, policy: ClaimPolicy) -> Harness {
        let chain = SimulatedChain::new(ME);
        let signer = SimulatedSigner::new(600);
        let persistence = MemoryPersistence::default();
        let config = SessionConfig {
            claimer: ME,
            policy,
            detector: DetectorConfig::inline(),
            surface: (100, 100),
            orchestrator: OrchestratorConfig::new(CARDS),
        };
        let (session, events) = CardSession::new(
            config,
            Collaborators {
                chain: chain.clone(),
                signer: signer.clone(),
                persistence: persistence.clone(),
                notifier,
                feedback: LogFeedback::default(),
            },
        );
        Harness {
            session,
            events,
            chain,
            signer,
            persistence,
        }
    }

    fn winning_card(token_id: u64) -> Card {
        let amounts = [1u128, 2, 3, 10, 10, 10, 4, 5, 6];
        Card {
            id: format!("card-{token_id}"),
            token_id,
            prize_amount: Prize::Tokens(10),
            prize_asset_contract: Some(USDC),
            cells: amounts
                .iter()
                .map(|a| Cell::new(Prize::Tokens(*a), Some(USDC)))
                .collect(),
            scratched: false,
            claimed: false,
            scratched_at: None,
            claimed_at: None,
        }
    }

    async fn scratch_everything(session: &mut TestSession) -> Option<ClaimJob> {
        for y in [10.0, 30.0, 50.0, 70.0, 90.0] {
            session.scratch_begin(Point::new(0.0, y));
            session.scratch_move(Point::new(100.0, y));
        }
        let now = Instant::now();
        session.scratch_end(now);
        session.tick(now + Duration::from_millis(400)).await
    }

    fn drain(events: &mut mpsc::UnboundedReceiver<HostEvent>) -> Vec<HostEvent> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test]
    async fn tick__threshold_on_winner__reveals_and_tracks_scratch_once() {
        // given
        let mut h = harness(MemoryNotifier::default(), ClaimPolicy::Manual);
        let card = winning_card(3);
        h.signer.register(&card);
        h.session.attach(card).unwrap();

        // when
        let job = scratch_everything(&mut h.session).await;
        h.session.flush_background().await;

        // then
        assert!(job.is_none());
        let state = h.session.reveal_state().unwrap();
        assert!(matches!(state.phase, Phase::Revealed(_)));
        assert!(h.session.card().unwrap().scratched);
        assert_eq!(h.signer.requests().len(), 1);
        let writes = h.persistence.writes();
        assert_eq!(writes.len(), 1);
        assert!(matches!(writes[0], PersistedWrite::TrackScratch(3, _)));
        assert!(drain(&mut h.events).contains(&HostEvent::Revealed {
            token_id: 3,
            prize: Prize::Tokens(10),
            winning_row: Some(1),
        }));
    }

    #[tokio::test]
    async fn request_claim__after_reveal__claims_and_persists_hash() {
        // given
        tokio::time::pause();
        let mut h = harness(MemoryNotifier::default(), ClaimPolicy::Manual);
        let card = winning_card(4);
        h.signer.register(&card);
        h.session.attach(card).unwrap();
        scratch_everything(&mut h.session).await;

        // when
        let job = h.session.request_claim().await.unwrap();
        let second = h.session.request_claim().await;
        h.session.run_claim(job).await;
        h.session.flush_background().await;

        // then
        assert!(second.is_none());
        assert_eq!(h.chain.claims().len(), 1);
        let hash = h.chain.claims()[0].hash;
        assert_eq!(h.session.reveal_state().unwrap().phase, Phase::Claimed);
        assert!(h.session.card().unwrap().claimed);
        assert!(h.persistence.writes().contains(&PersistedWrite::Claim(
            4,
            ClaimRecord {
                claimed: true,
                claim_hash: hash,
                claimed_by: ME,
            }
        )));
        let phases: Vec<ClaimPhase> = drain(&mut h.events)
            .into_iter()
            .filter_map(|event| match event {
                HostEvent::ClaimStateChanged(session) => Some(session.phase),
                _ => None,
            })
            .collect();
        assert_eq!(phases.last(), Some(&ClaimPhase::Success));
    }

    #[tokio::test]
    async fn persistence_failure__queued_and_retried() {
        // given
        let mut h = harness(MemoryNotifier::default(), ClaimPolicy::Manual);
        let card = winning_card(5);
        h.signer.register(&card);
        h.session.attach(card).unwrap();
        h.persistence.fail_next(1);

        // when
        scratch_everything(&mut h.session).await;
        h.session.flush_background().await;
        let queued = h.session.pending_writes().len();
        let resubmitted = h.session.retry_pending_writes();
        h.session.flush_background().await;

        // then
        assert_eq!(queued, 1);
        assert_eq!(resubmitted, 1);
        assert!(h.session.pending_writes().is_empty());
        assert_eq!(h.persistence.writes().len(), 1);
        assert!(drain(&mut h.events).iter().any(|event| matches!(
            event,
            HostEvent::Error {
                kind: ErrorKind::Persistence,
                ..
            }
        )));
        assert!(matches!(
            h.session.reveal_state().unwrap().phase,
            Phase::Revealed(_)
        ));
    }

    #[tokio::test]
    async fn notifier_failure__does_not_affect_reveal() {
        // given
        let mut h = harness(MemoryNotifier::failing(), ClaimPolicy::Manual);
        let card = winning_card(6);
        h.signer.register(&card);
        h.session.attach(card).unwrap();

        // when
        scratch_everything(&mut h.session).await;
        h.session.flush_background().await;

        // then
        assert!(matches!(
            h.session.reveal_state().unwrap().phase,
            Phase::Revealed(_)
        ));
        assert!(!drain(&mut h.events)
            .iter()
            .any(|event| matches!(event, HostEvent::Error { .. })));
    }

    #[tokio::test]
    async fn attach__malformed_card__refused_with_input_error() {
        // given
        let mut h = harness(MemoryNotifier::default(), ClaimPolicy::Manual);
        let mut card = winning_card(7);
        card.cells.pop();

        // when
        let result = h.session.attach(card);

        // then
        assert_eq!(result, Err(InputError::RaggedGrid(8)));
        assert!(h.session.card().is_none());
        assert!(matches!(
            drain(&mut h.events)[..],
            [HostEvent::Error {
                kind: ErrorKind::Input,
                ..
            }]
        ));
    }

    #[tokio::test]
    async fn detach__before_claim_job_runs__nothing_is_broadcast() {
        // given
        tokio::time::pause();
        let mut h = harness(MemoryNotifier::default(), ClaimPolicy::Automatic);
        let card = winning_card(8);
        h.signer.register(&card);
        h.session.attach(card).unwrap();
        let job = scratch_everything(&mut h.session).await.unwrap();

        // when
        h.session.detach();
        let next = winning_card(9);
        h.signer.register(&next);
        h.session.attach(next).unwrap();
        let outcome = job.await;
        h.session.finish_claim(outcome.clone()).await;
        h.session.flush_background().await;

        // then
        assert_eq!(outcome.token_id, 8);
        assert_eq!(outcome.result, Err(ClaimError::Detached { tx_hash: None }));
        assert!(h.chain.claims().is_empty());
        assert_eq!(h.session.card().map(|card| card.token_id), Some(9));
        assert_eq!(
            h.session.claim_session().map(|session| session.phase),
            Some(ClaimPhase::Idle)
        );
        assert!(!h
            .persistence
            .writes()
            .iter()
            .any(|write| matches!(write, PersistedWrite::Claim(..))));
    }

    #[tokio::test]
    async fn detach__with_claim_confirming__late_outcome_is_dropped() {
        // given
        tokio::time::pause();
        let mut h = harness(MemoryNotifier::default(), ClaimPolicy::Manual);
        let card = winning_card(10);
        h.signer.register(&card);
        h.session.attach(card).unwrap();
        scratch_everything(&mut h.session).await;
        let mut job = h.session.request_claim().await.unwrap();

        // when
        let early = tokio::time::timeout(Duration::from_millis(1), &mut job).await;
        h.session.detach();
        let outcome = job.await;
        h.session.finish_claim(outcome.clone()).await;

        // then
        assert!(early.is_err());
        assert_eq!(h.chain.claims().len(), 1);
        assert!(matches!(outcome.result, Err(ClaimError::Detached { tx_hash: Some(_) })));
        assert!(h.session.card().is_none());
    }

    #[derive(Clone)]
    struct StalledNotifier;

    impl WinNotifier for StalledNotifier {
        async fn notify_win(&self, _notice: WinNotice) -> Result<(), String> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn tick__notifier_never_answers__reveal_and_auto_claim_still_proceed() {
        // given
        tokio::time::pause();
        let chain = SimulatedChain::new(ME);
        let signer = SimulatedSigner::new(600);
        let persistence = MemoryPersistence::default();
        let config = SessionConfig {
            claimer: ME,
            policy: ClaimPolicy::Automatic,
            detector: DetectorConfig::inline(),
            surface: (100, 100),
            orchestrator: OrchestratorConfig::new(CARDS),
        };
        let (mut session, mut events) = CardSession::new(
            config,
            Collaborators {
                chain: chain.clone(),
                signer: signer.clone(),
                persistence: persistence.clone(),
                notifier: StalledNotifier,
                feedback: LogFeedback::default(),
            },
        );
        let card = winning_card(11);
        signer.register(&card);
        session.attach(card).unwrap();

        // when
        for y in [10.0, 30.0, 50.0, 70.0, 90.0] {
            session.scratch_begin(Point::new(0.0, y));
            session.scratch_move(Point::new(100.0, y));
        }
        let now = Instant::now();
        session.scratch_end(now);
        let job = tokio::time::timeout(
            Duration::from_secs(60),
            session.tick(now + Duration::from_millis(400)),
        )
        .await
        .unwrap()
        .unwrap();
        session.run_claim(job).await;
        let flushed = tokio::time::timeout(Duration::from_secs(5), session.flush_background()).await;

        // then
        assert!(flushed.is_err());
        assert_eq!(persistence.writes().len(), 2);
        assert!(drain(&mut events).contains(&HostEvent::Revealed {
            token_id: 11,
            prize: Prize::Tokens(10),
            winning_row: Some(1),
        }));
        assert_eq!(session.reveal_state().unwrap().phase, Phase::Claimed);
        assert_eq!(chain.claims().len(), 1);
        assert_eq!(session.background_len(), 1);
    }

    #[tokio::test]
    async fn tick__detached_session__never_fires() {
        // given
        let mut h = harness(MemoryNotifier::default(), ClaimPolicy::Manual);
        let card = winning_card(9);
        h.signer.register(&card);
        h.session.attach(card).unwrap();
        for y in [10.0, 30.0, 50.0, 70.0, 90.0] {
            h.session.scratch_begin(Point::new(0.0, y));
            h.session.scratch_move(Point::new(100.0, y));
        }
        let now = Instant::now();
        h.session.scratch_end(now);

        // when
        h.session.detach();
        let job = h.session.tick(now + Duration::from_secs(1)).await;

        // then
        assert!(job.is_none());
        assert!(h.signer.requests().is_empty());
        assert!(h.persistence.writes().is_empty());
    }
}
