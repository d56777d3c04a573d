//! Winning-row resolution over the 3-wide prize grid.
//!
//! Everything here is a pure function of its inputs, so the same call is made
//! at reveal time and on every redraw that needs row highlighting.

use crate::{
    card::{
        Card,
        Cell,
        Prize,
    },
    error::InputError,
};
use alloy_primitives::Address;
use itertools::Itertools;

pub const ROW_WIDTH: usize = 3;

/// Rows of exactly [`ROW_WIDTH`] cells in grid order. A trailing partial row
/// is dropped.
pub fn rows(cells: &[Cell]) -> impl Iterator<Item = &[Cell]> {
    cells.chunks_exact(ROW_WIDTH)
}

/// Index of the first row that justifies `prize`, if any.
pub fn resolve_winning_row(
    cells: &[Cell],
    prize: Prize,
    prize_asset: Option<Address>,
) -> Option<usize> {
    rows(cells).position(|row| row_matches(row, prize, prize_asset))
}

fn row_matches(row: &[Cell], prize: Prize, prize_asset: Option<Address>) -> bool {
    match prize {
        Prize::NoWin => false,
        Prize::FreeCard => {
            row.iter().any(Cell::is_social_bonus)
                || row.iter().all(|cell| cell.amount == Prize::FreeCard)
        }
        Prize::Tokens(_) => row.iter().all(|cell| {
            cell.amount == prize
                && (cell.asset_contract.is_none() || cell.asset_contract == prize_asset)
        }),
    }
}

/// Whether a row would pay out under any prize: a friend cell, three free-card
/// cells, or three equal positive amounts on a single asset.
fn row_looks_winning(row: &[Cell]) -> bool {
    if row.iter().any(Cell::is_social_bonus) {
        return true;
    }
    let same_amount = row.iter().map(|cell| cell.amount).all_equal();
    let same_asset = row
        .iter()
        .filter_map(|cell| cell.asset_contract)
        .all_equal();
    match row.first().map(|cell| cell.amount) {
        Some(Prize::FreeCard) => same_amount,
        Some(Prize::Tokens(_)) => same_amount && same_asset,
        _ => false,
    }
}

/// Checks that a card's grid is consistent with its prize.
pub fn validate_card(card: &Card) -> Result<(), InputError> {
    let count = card.cells.len();
    if count == 0 {
        return Err(InputError::EmptyGrid);
    }
    if count % ROW_WIDTH != 0 {
        return Err(InputError::RaggedGrid(count));
    }
    match card.prize_amount {
        Prize::NoWin => {
            if let Some(row) = rows(&card.cells).position(row_looks_winning) {
                return Err(InputError::UnexpectedWinningRow { row });
            }
        }
        prize => {
            if matches!(prize, Prize::Tokens(_)) && card.prize_asset_contract.is_none() {
                return Err(InputError::MissingPrizeAsset { prize: prize.raw() });
            }
            if card.winning_row().is_none() {
                return Err(InputError::MissingWinningRow { prize: prize.raw() });
            }
        }
    }
    Ok(())
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RowHighlight {
    /// Still covered; nothing is emphasised.
    Neutral,
    Winning,
    Dimmed,
}

/// Presentation hint per row: before reveal everything is neutral, afterwards
/// the winning row is emphasised and the rest dimmed.
pub fn row_highlights(card: &Card, revealed: bool) -> Vec<RowHighlight> {
    let row_count = card.cells.len() / ROW_WIDTH;
    if !revealed {
        return vec![RowHighlight::Neutral; row_count];
    }
    let winner = card.winning_row();
    (0..row_count)
        .map(|row| {
            if Some(row) == winner {
                RowHighlight::Winning
            } else {
                RowHighlight::Dimmed
            }
        })
        .collect()
}
