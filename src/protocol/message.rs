use crate::bets::Bet;

pub mod message_type {
    pub const BET: u32 = 0;
    pub const BET_RESPONSE: u32 = 1;
    pub const BATCH_BET: u32 = 2;
    pub const ALL_BETS_SENT: u32 = 3;
    pub const RESULTS_QUERY: u32 = 4;
    pub const RESULT_UNAVAILABLE: u32 = 5;
    pub const RESULTS_RESPONSE: u32 = 6;
}

pub(super) const SUCCESS: &str = "SUCCESS";
pub(super) const ERROR: &str = "ERROR";

pub(super) const RECORD_SEPARATOR: char = '\n';
pub(super) const WINNER_SEPARATOR: char = ';';

/// A single frame as it was read from the wire,
/// before its payload has been given any meaning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub ty: u32,
    pub payload: Vec<u8>,
}

impl RawMessage {
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Bet(Bet),
    BetResponse(bool),
    // records are kept in their encoded form so every one of them
    // can be accepted or rejected on its own
    BatchBet(Vec<String>),
    AllBetsSent { agency: u32 },
    ResultsQuery { agency: u32 },
    ResultUnavailable,
    ResultsResponse { winners: Vec<String> },
}

impl Message {
    pub fn ty(&self) -> u32 {
        match self {
            Self::Bet(_) => message_type::BET,
            Self::BetResponse(_) => message_type::BET_RESPONSE,
            Self::BatchBet(_) => message_type::BATCH_BET,
            Self::AllBetsSent { .. } => message_type::ALL_BETS_SENT,
            Self::ResultsQuery { .. } => message_type::RESULTS_QUERY,
            Self::ResultUnavailable => message_type::RESULT_UNAVAILABLE,
            Self::ResultsResponse { .. } => message_type::RESULTS_RESPONSE,
        }
    }

    pub fn batch<'a>(bets: impl IntoIterator<Item = &'a Bet>) -> Self {
        Self::BatchBet(bets.into_iter().map(Bet::to_string).collect())
    }
}
