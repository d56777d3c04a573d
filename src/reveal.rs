//! Per-card reveal state machine.
//!
//! [`RevealState::apply`] is a pure reducer: it takes the current state, an
//! immutable [`RevealContext`] and one [`Message`], mutates only its own fields
//! and returns the [`Effect`]s the caller must run. No I/O happens here.

use crate::{
    card::{
        Card,
        ClaimSignature,
        Prize,
    },
    error::{
        ClaimError,
        ErrorKind,
        SignatureError,
    },
    ports::{
        ClaimRecord,
        SignatureRequest,
        TrackScratch,
        WinNotice,
    },
};
use alloy_primitives::{
    Address,
    B256,
};
use serde::{
    Deserialize,
    Serialize,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Won,
    Lost,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    Covered,
    Revealing,
    Revealed(Outcome),
    ClaimPending,
    Claimed,
    Error(ErrorKind),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Theme {
    Won,
    Lost,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Haptic {
    Success,
    Soft,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Sound {
    Win,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RevealFeedback {
    pub theme: Theme,
    pub haptic: Haptic,
    pub sound: Option<Sound>,
}

impl RevealFeedback {
    pub fn for_prize(prize: Prize) -> Self {
        if prize.is_win() {
            Self {
                theme: Theme::Won,
                haptic: Haptic::Success,
                sound: Some(Sound::Win),
            }
        } else {
            Self {
                theme: Theme::Lost,
                haptic: Haptic::Soft,
                sound: None,
            }
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimPolicy {
    /// Wait for the user to ask for the claim.
    #[default]
    Manual,
    /// Start the claim as soon as the signature arrives.
    Automatic,
}

/// Read-only inputs of a transition.
#[derive(Clone, Copy, Debug)]
pub struct RevealContext<'a> {
    pub card: &'a Card,
    pub claimer: Address,
    pub policy: ClaimPolicy,
}

/// Local UI state that is thrown away on teardown.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Ephemeral {
    pub tilt: (f32, f32),
    pub overlay_visible: bool,
    pub signature_in_flight: bool,
    pub claim_in_flight: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    ThresholdCrossed,
    /// Re-enter the flow for a card that was scratched in an earlier session
    /// but never claimed.
    Resume,
    SignatureResolved(Result<ClaimSignature, SignatureError>),
    ClaimRequested,
    ClaimFinished(Result<B256, ClaimError>),
    Tilt { x: f32, y: f32 },
    ShowOverlay(bool),
    Teardown,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    PlayFeedback(RevealFeedback),
    TrackScratch(TrackScratch),
    RequestSignature(SignatureRequest),
    NotifyWin(WinNotice),
    Revealed {
        token_id: u64,
        prize: Prize,
        winning_row: Option<usize>,
    },
    /// `None` lets the claim flow fetch its own signature.
    StartClaim { signature: Option<ClaimSignature> },
    PersistClaim(ClaimRecord),
    ReportError { kind: ErrorKind, detail: String },
}

#[derive(Clone, Debug, PartialEq)]
pub struct RevealState {
    pub phase: Phase,
    pub winning_row: Option<usize>,
    pub feedback: Option<RevealFeedback>,
    pub signature: Option<ClaimSignature>,
    pub tx_hash: Option<B256>,
    pub last_error: Option<String>,
    pub ui: Ephemeral,
}

impl RevealState {
    /// Starting state for a card as loaded from persistence.
    pub fn for_card(card: &Card) -> Self {
        let phase = if card.claimed {
            Phase::Claimed
        } else if card.scratched && !card.prize_amount.is_win() {
            Phase::Revealed(Outcome::Lost)
        } else {
            Phase::Covered
        };
        let revealed = card.scratched || card.claimed;
        Self {
            phase,
            winning_row: if revealed { card.winning_row() } else { None },
            feedback: None,
            signature: None,
            tx_hash: None,
            last_error: None,
            ui: Ephemeral {
                overlay_visible: !revealed,
                ..Ephemeral::default()
            },
        }
    }

    pub fn is_revealed(&self) -> bool {
        !matches!(self.phase, Phase::Covered | Phase::Revealing)
            || self.winning_row.is_some()
            || self.feedback.is_some()
    }

    /// A failed signature ends the reveal; the signer is asked at most once
    /// per reveal.
    pub fn can_request_claim(&self) -> bool {
        matches!(self.phase, Phase::Revealed(Outcome::Won) | Phase::Error(_))
            && self.phase != Phase::Error(ErrorKind::Signature)
            && !self.ui.claim_in_flight
            && self.feedback.map_or(true, |f| f.theme == Theme::Won)
    }

    pub fn apply(&mut self, ctx: &RevealContext<'_>, message: Message) -> Vec<Effect> {
        let card = ctx.card;
        match (self.phase, message) {
            (_, Message::Tilt { x, y }) => {
                self.ui.tilt = (x, y);
                Vec::new()
            }
            (_, Message::ShowOverlay(visible)) => {
                self.ui.overlay_visible = visible;
                Vec::new()
            }
            (_, Message::Teardown) => {
                self.ui = Ephemeral::default();
                Vec::new()
            }
            (Phase::Covered, Message::ThresholdCrossed) => {
                let prize = card.prize_amount;
                let feedback = RevealFeedback::for_prize(prize);
                self.winning_row = card.winning_row();
                self.feedback = Some(feedback);
                self.ui.overlay_visible = false;
                let mut effects = vec![
                    Effect::PlayFeedback(feedback),
                    Effect::TrackScratch(TrackScratch {
                        scratched: true,
                        scratched_by: ctx.claimer,
                        prize_won: prize,
                    }),
                ];
                if prize.is_win() {
                    self.phase = Phase::Revealing;
                    self.ui.signature_in_flight = true;
                    effects.push(Effect::RequestSignature(SignatureRequest {
                        token_id: card.token_id,
                        user_wallet: ctx.claimer,
                    }));
                    effects.push(Effect::NotifyWin(WinNotice {
                        token_id: card.token_id,
                        winner: ctx.claimer,
                        prize,
                        friend_fid: card.friend().map(|friend| friend.fid),
                    }));
                } else {
                    self.phase = Phase::Revealed(Outcome::Lost);
                    effects.push(Effect::Revealed {
                        token_id: card.token_id,
                        prize,
                        winning_row: self.winning_row,
                    });
                }
                tracing::info!(token_id = card.token_id, %prize, phase = ?self.phase, "card revealed");
                effects
            }
            (Phase::Covered, Message::Resume) if card.scratched && card.prize_amount.is_win() => {
                self.winning_row = card.winning_row();
                self.feedback = Some(RevealFeedback::for_prize(card.prize_amount));
                self.ui.overlay_visible = false;
                self.phase = Phase::Revealing;
                self.ui.signature_in_flight = true;
                vec![Effect::RequestSignature(SignatureRequest {
                    token_id: card.token_id,
                    user_wallet: ctx.claimer,
                })]
            }
            (Phase::Revealing, Message::SignatureResolved(result)) => {
                self.ui.signature_in_flight = false;
                match result.and_then(|signature| check_signature(card, signature)) {
                    Ok(signature) => {
                        self.signature = Some(signature.clone());
                        self.phase = Phase::Revealed(Outcome::Won);
                        let mut effects = vec![Effect::Revealed {
                            token_id: card.token_id,
                            prize: card.prize_amount,
                            winning_row: self.winning_row,
                        }];
                        if ctx.policy == ClaimPolicy::Automatic {
                            self.phase = Phase::ClaimPending;
                            self.ui.claim_in_flight = true;
                            effects.push(Effect::StartClaim {
                                signature: Some(signature),
                            });
                        }
                        effects
                    }
                    Err(err) => {
                        tracing::error!(token_id = card.token_id, error = %err, "claim signature failed");
                        self.fail(ErrorKind::Signature, err.to_string())
                    }
                }
            }
            (Phase::Revealed(Outcome::Won) | Phase::Error(_), Message::ClaimRequested)
                if self.phase != Phase::Error(ErrorKind::Signature) =>
            {
                if self.feedback.is_some_and(|f| f.theme != Theme::Won) {
                    return Vec::new();
                }
                self.phase = Phase::ClaimPending;
                self.ui.claim_in_flight = true;
                self.last_error = None;
                tracing::info!(token_id = card.token_id, "claim requested");
                vec![Effect::StartClaim {
                    signature: self.signature.clone(),
                }]
            }
            (Phase::ClaimPending, Message::ClaimFinished(result)) => {
                self.ui.claim_in_flight = false;
                match result {
                    Ok(hash) => {
                        self.phase = Phase::Claimed;
                        self.tx_hash = Some(hash);
                        tracing::info!(token_id = card.token_id, %hash, "card claimed");
                        vec![Effect::PersistClaim(ClaimRecord {
                            claimed: true,
                            claim_hash: hash,
                            claimed_by: ctx.claimer,
                        })]
                    }
                    Err(err) => {
                        tracing::error!(token_id = card.token_id, error = %err, "claim failed");
                        if let Some(hash) = err.broadcast_hash() {
                            self.tx_hash = Some(hash);
                        }
                        self.fail(err.kind(), err.to_string())
                    }
                }
            }
            (phase, message) => {
                tracing::debug!(?phase, ?message, "ignoring message for current phase");
                Vec::new()
            }
        }
    }

    fn fail(&mut self, kind: ErrorKind, detail: String) -> Vec<Effect> {
        self.phase = Phase::Error(kind);
        self.last_error = Some(detail.clone());
        vec![Effect::ReportError { kind, detail }]
    }
}

/// A signature for another asset than the card's prize cannot pay this card.
fn check_signature(card: &Card, signature: ClaimSignature) -> Result<ClaimSignature, SignatureError> {
    match card.prize_asset_contract {
        Some(asset) if asset != signature.token_address => Err(SignatureError::WrongToken {
            expected: asset.to_string(),
            actual: signature.token_address.to_string(),
        }),
        _ => Ok(signature),
    }
}
