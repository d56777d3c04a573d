use crate::{
    error::InputError,
    grid,
};
use alloy_primitives::{
    Address,
    Bytes,
    U256,
};
use chrono::{
    DateTime,
    Utc,
};
use serde::{
    Deserialize,
    Deserializer,
    Serialize,
};
use std::fmt;

/// Typed view of the signed `prizeAmount` integer carried by cards and cells.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i128", into = "i128")]
pub enum Prize {
    /// `0`: nothing won.
    NoWin,
    /// `-1`: a free card for the scratcher plus a nominated friend.
    FreeCard,
    /// `> 0`: amount in the smallest unit of the prize asset.
    Tokens(u128),
}

impl Prize {
    pub const FREE_CARD_SENTINEL: i128 = -1;

    pub fn is_win(self) -> bool {
        !matches!(self, Prize::NoWin)
    }

    pub fn token_amount(self) -> U256 {
        match self {
            Prize::Tokens(amount) => U256::from(amount),
            Prize::NoWin | Prize::FreeCard => U256::ZERO,
        }
    }

    pub fn raw(self) -> i128 {
        i128::from(self)
    }
}

impl TryFrom<i128> for Prize {
    type Error = InputError;

    fn try_from(raw: i128) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Prize::NoWin),
            Prize::FREE_CARD_SENTINEL => Ok(Prize::FreeCard),
            // positive, so the cast is lossless
            amount if amount > 0 => Ok(Prize::Tokens(amount as u128)),
            other => Err(InputError::InvalidPrizeAmount(other)),
        }
    }
}

impl From<Prize> for i128 {
    fn from(prize: Prize) -> Self {
        match prize {
            Prize::NoWin => 0,
            Prize::FreeCard => Prize::FREE_CARD_SENTINEL,
            Prize::Tokens(amount) => i128::try_from(amount).unwrap_or(i128::MAX),
        }
    }
}

impl fmt::Display for Prize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prize::NoWin => write!(f, "no win"),
            Prize::FreeCard => write!(f, "free card"),
            Prize::Tokens(amount) => write!(f, "{amount}"),
        }
    }
}

/// Social-bonus identity recorded on a cell. A plain value, not a handle into
/// any user registry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendRef {
    #[serde(rename = "friendFid")]
    pub fid: u64,
    #[serde(rename = "friendUsername", default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(rename = "friendPfp", default, skip_serializing_if = "Option::is_none")]
    pub pfp: Option<String>,
    #[serde(rename = "friendWallet", default, skip_serializing_if = "Option::is_none")]
    pub wallet: Option<Address>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "WireCell")]
pub struct Cell {
    pub amount: Prize,
    /// `None` stands for the default prize asset.
    pub asset_contract: Option<Address>,
    #[serde(flatten)]
    pub friend: Option<FriendRef>,
}

/// Cell as it arrives in `numbersJson`, friend fields still loose.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCell {
    amount: Prize,
    #[serde(default, deserialize_with = "optional_address")]
    asset_contract: Option<Address>,
    #[serde(default)]
    friend_fid: Option<u64>,
    #[serde(default)]
    friend_username: Option<String>,
    #[serde(default)]
    friend_pfp: Option<String>,
    #[serde(default, deserialize_with = "optional_address")]
    friend_wallet: Option<Address>,
}

impl TryFrom<WireCell> for Cell {
    type Error = InputError;

    fn try_from(wire: WireCell) -> Result<Self, Self::Error> {
        let friend = match wire.friend_fid {
            Some(fid) => Some(FriendRef {
                fid,
                username: wire.friend_username,
                pfp: wire.friend_pfp,
                wallet: wire.friend_wallet,
            }),
            None if wire.friend_username.is_some()
                || wire.friend_pfp.is_some()
                || wire.friend_wallet.is_some() =>
            {
                return Err(InputError::IncompleteFriend);
            }
            None => None,
        };
        Ok(Self {
            amount: wire.amount,
            asset_contract: wire.asset_contract,
            friend,
        })
    }
}

impl Cell {
    pub fn new(amount: Prize, asset_contract: Option<Address>) -> Self {
        Self {
            amount,
            asset_contract,
            friend: None,
        }
    }

    pub fn with_friend(mut self, friend: FriendRef) -> Self {
        self.friend = Some(friend);
        self
    }

    pub fn is_social_bonus(&self) -> bool {
        self.friend.is_some()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: String,
    pub token_id: u64,
    pub prize_amount: Prize,
    #[serde(default, deserialize_with = "optional_address")]
    pub prize_asset_contract: Option<Address>,
    #[serde(rename = "numbersJson")]
    pub cells: Vec<Cell>,
    #[serde(default)]
    pub scratched: bool,
    #[serde(default)]
    pub claimed: bool,
    #[serde(default)]
    pub scratched_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub claimed_at: Option<DateTime<Utc>>,
}

impl Card {
    pub fn winning_row(&self) -> Option<usize> {
        grid::resolve_winning_row(
            &self.cells,
            self.prize_amount,
            self.prize_asset_contract,
        )
    }

    pub fn validate(&self) -> Result<(), InputError> {
        grid::validate_card(self)
    }

    /// Friend nominated for the bonus: taken from the winning row first, then
    /// from anywhere in the grid.
    pub fn friend(&self) -> Option<&FriendRef> {
        let from_winning_row = self.winning_row().and_then(|row| {
            grid::rows(&self.cells)
                .nth(row)
                .and_then(|cells| cells.iter().find_map(|cell| cell.friend.as_ref()))
        });
        from_winning_row.or_else(|| self.cells.iter().find_map(|cell| cell.friend.as_ref()))
    }

    pub fn mark_scratched(&mut self, at: DateTime<Utc>) {
        if !self.scratched {
            self.scratched = true;
            self.scratched_at = Some(at);
        }
    }

    pub fn mark_claimed(&mut self, at: DateTime<Utc>) -> Result<(), InputError> {
        if self.claimed {
            return Err(InputError::AlreadyClaimed {
                token_id: self.token_id,
            });
        }
        if !self.scratched {
            return Err(InputError::NotScratched {
                token_id: self.token_id,
            });
        }
        self.claimed = true;
        self.claimed_at = Some(at);
        Ok(())
    }
}

/// Signer-issued capability to claim `prize_amount` of `token_address` before
/// `deadline` (unix seconds).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimSignature {
    pub prize_amount: Prize,
    pub token_address: Address,
    pub deadline: u64,
    pub signature: Bytes,
}

impl ClaimSignature {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let now = u64::try_from(now.timestamp()).unwrap_or(0);
        now >= self.deadline
    }
}

fn optional_address<'de, D>(deserializer: D) -> Result<Option<Address>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse::<Address>()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
