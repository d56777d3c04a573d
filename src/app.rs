use crate::ui;
use alloy_primitives::{
    Address,
    address,
};
use chrono::Utc;
use color_eyre::eyre::Result;
use scratch_engine::{
    card::Card,
    claim::ClaimSession,
    config::EngineConfig,
    detector::{
        CoverRaster,
        Point,
        sleep_until_deadline,
    },
    grid::{
        RowHighlight,
        row_highlights,
    },
    ports::{
        LogFeedback,
        PersistenceService,
        SignatureService,
        WinNotifier,
    },
    reveal::RevealState,
    session::{
        CardSession,
        ClaimJob,
        ClaimOutcome,
        Collaborators,
        HostEvent,
        SessionConfig,
    },
    simulated::{
        GRID_ROWS,
        SimulatedChain,
        SimulatedSigner,
        random_card,
    },
};
use tokio::{
    sync::mpsc,
    time::Instant,
};

/// Prize asset used for simulated cards.
pub const SIMULATED_ASSET: Address = address!("833589fcd6edb6e08f4c7c32d4f71b54bda02913");
const LOG_CAPACITY: usize = 200;

pub struct AppSnapshot<'a> {
    pub card: Option<&'a Card>,
    pub reveal: Option<&'a RevealState>,
    pub raster: &'a CoverRaster,
    pub revealed: bool,
    pub highlights: Vec<RowHighlight>,
    pub percent_cleared: f32,
    pub claim: Option<ClaimSession>,
    pub pending_writes: usize,
    pub claimer: Address,
    pub log: &'a [String],
}

impl AppSnapshot<'_> {
    /// Whether the cover is still intact under the terminal cell at
    /// (`col`, `row`) of the card area.
    pub fn is_covered(&self, col: u16, row: u16) -> bool {
        let p = Point::new(
            f32::from(col) * ui::PX_PER_COL + ui::PX_PER_COL / 2.0,
            f32::from(row) * ui::PX_PER_ROW + ui::PX_PER_ROW / 2.0,
        );
        self.raster.is_covered_at(p)
    }
}

pub struct App<S, P, N> {
    session: CardSession<SimulatedChain, S, P, N, LogFeedback>,
    events: mpsc::UnboundedReceiver<HostEvent>,
    claim: Option<ClaimJob>,
    /// Present when cards must be registered with a local signer.
    registry: Option<SimulatedSigner>,
    next_token: u64,
    log: Vec<String>,
}

impl<S, P, N> App<S, P, N>
where
    S: SignatureService + Clone + 'static,
    P: PersistenceService + Clone + 'static,
    N: WinNotifier + Clone + 'static,
{
    pub fn new(
        engine: &EngineConfig,
        claimer: Address,
        collaborators: Collaborators<SimulatedChain, S, P, N, LogFeedback>,
        registry: Option<SimulatedSigner>,
    ) -> Self {
        let config = SessionConfig {
            claimer,
            policy: engine.claim_policy,
            detector: engine.detector_config(),
            surface: ui::surface_size(GRID_ROWS as u16),
            orchestrator: engine.orchestrator_config(),
        };
        let (session, events) = CardSession::new(config, collaborators);
        Self {
            session,
            events,
            claim: None,
            registry,
            next_token: 1,
            log: Vec::new(),
        }
    }

    pub fn snapshot(&self) -> AppSnapshot<'_> {
        let card = self.session.card();
        let reveal = self.session.reveal_state();
        let revealed = reveal.is_some_and(RevealState::is_revealed);
        AppSnapshot {
            card,
            reveal,
            raster: self.session.detector().raster(),
            revealed,
            highlights: card
                .map(|card| row_highlights(card, revealed))
                .unwrap_or_default(),
            percent_cleared: self.session.detector().percent_cleared(),
            claim: self.session.claim_session(),
            pending_writes: self.session.pending_writes().len(),
            claimer: self.session.claimer(),
            log: &self.log,
        }
    }

    fn push_log(&mut self, line: String) {
        self.log
            .push(format!("{} {line}", Utc::now().format("%H:%M:%S")));
        if self.log.len() > LOG_CAPACITY {
            let excess = self.log.len() - LOG_CAPACITY;
            self.log.drain(..excess);
        }
    }

    fn record(&mut self, event: HostEvent) {
        let line = match event {
            HostEvent::Revealed {
                token_id,
                prize,
                winning_row,
            } => match winning_row {
                Some(row) => format!("card #{token_id} revealed: {prize} on row {}", row + 1),
                None => format!("card #{token_id} revealed: {prize}"),
            },
            HostEvent::ClaimStateChanged(session) => match session.tx_hash {
                Some(hash) => format!("claim {:?} ({hash})", session.phase),
                None => format!("claim {:?}", session.phase),
            },
            HostEvent::Error { kind, detail } => format!("{kind} error: {detail}"),
        };
        self.push_log(line);
    }

    pub fn new_card(&mut self) {
        self.claim = None;
        let token_id = self.next_token;
        self.next_token += 1;
        let card = random_card(&mut rand::rng(), token_id, SIMULATED_ASSET);
        if let Some(registry) = &self.registry {
            registry.register(&card);
        }
        if self.session.attach(card).is_ok() {
            self.push_log(format!("new card #{token_id}"));
        }
    }

    async fn claim(&mut self) {
        if self.claim.is_some() {
            self.push_log(String::from("claim already in flight"));
            return;
        }
        match self.session.request_claim().await {
            Some(job) => self.claim = Some(job),
            None => self.push_log(String::from("nothing to claim")),
        }
    }

    fn retry_persistence(&mut self) {
        let resubmitted = self.session.retry_pending_writes();
        self.push_log(format!("resubmitted {resubmitted} pending writes"));
    }
}

async fn next_outcome(job: &mut Option<ClaimJob>) -> ClaimOutcome {
    match job {
        Some(job) => job.await,
        None => std::future::pending().await,
    }
}

pub async fn run_app<S, P, N>(mut app: App<S, P, N>) -> Result<()>
where
    S: SignatureService + Clone + 'static,
    P: PersistenceService + Clone + 'static,
    N: WinNotifier + Clone + 'static,
{
    let mut ui_state = ui::UiState::default();
    ui::terminal_enter(&mut ui_state)?;
    let res = run_loop(&mut app, &mut ui_state).await;
    ui::terminal_exit()?;
    res
}

async fn run_loop<S, P, N>(app: &mut App<S, P, N>, ui_state: &mut ui::UiState) -> Result<()>
where
    S: SignatureService + Clone + 'static,
    P: PersistenceService + Clone + 'static,
    N: WinNotifier + Clone + 'static,
{
    app.new_card();
    ui::draw(ui_state, &app.snapshot())?;
    loop {
        let deadline = app.session.next_deadline();
        tokio::select! {
            ev = ui::next_event(ui_state) => {
                match ev? {
                    ui::UserEvent::Quit => break,
                    ui::UserEvent::ScratchBegin(p) => app.session.scratch_begin(p),
                    ui::UserEvent::ScratchMove(p) => app.session.scratch_move(p),
                    ui::UserEvent::ScratchEnd => app.session.scratch_end(Instant::now()),
                    ui::UserEvent::Claim => app.claim().await,
                    ui::UserEvent::RetryPersistence => app.retry_persistence(),
                    ui::UserEvent::NewCard => app.new_card(),
                    ui::UserEvent::Redraw => {}
                }
            }
            _ = sleep_until_deadline(deadline) => {
                if let Some(job) = app.session.tick(Instant::now()).await {
                    app.claim = Some(job);
                }
            }
            outcome = next_outcome(&mut app.claim) => {
                app.claim = None;
                app.session.finish_claim(outcome).await;
            }
            Some(event) = app.events.recv() => app.record(event),
            () = app.session.next_background() => {}
        }
        ui::draw(ui_state, &app.snapshot())?;
    }
    Ok(())
}
