use async_trait::async_trait;
use tokio::io::AsyncReadExt;

use crate::bets::{Bet, BetParseError};

use super::{
    message::{
        message_type, Message, RawMessage, RECORD_SEPARATOR, SUCCESS, WINNER_SEPARATOR,
    },
    MAX_PAYLOAD_LEN,
};

#[async_trait]
pub trait Deserialize: Sized {
    type Error;

    // Deserialize a structure from a reader
    async fn deserialize<R: AsyncReadExt + Unpin + Send>(
        reader: &mut R,
    ) -> Result<Self, Self::Error>;
}

#[derive(thiserror::Error, Debug)]
pub enum DeserializeError {
    #[error("{0}")]
    Utf(#[from] std::string::FromUtf8Error),

    #[error("{0}")]
    Io(#[from] tokio::io::Error),

    #[error("Unknown message type: {0}")]
    UnknownType(u32),

    #[error("The payload is too long: {0} bytes")]
    TooLong(u32),

    #[error("Expected a 4 byte agency id, got {0} bytes")]
    BadAgency(usize),

    #[error("{0}")]
    Bet(#[from] BetParseError),
}

#[async_trait]
impl Deserialize for RawMessage {
    type Error = DeserializeError;

    async fn deserialize<R: AsyncReadExt + Unpin + Send>(
        reader: &mut R,
    ) -> Result<Self, Self::Error> {
        // read_u32 & read_exact keep polling the reader until they are satisfied,
        // and fail with UnexpectedEof if the stream ends in the middle
        let ty = reader.read_u32().await?;
        let length = reader.read_u32().await?;
        if length as usize > MAX_PAYLOAD_LEN {
            return Err(DeserializeError::TooLong(length));
        }

        let mut payload = vec![0u8; length as usize];
        reader.read_exact(&mut payload).await?;

        Ok(Self { ty, payload })
    }
}

impl TryFrom<RawMessage> for Message {
    type Error = DeserializeError;

    fn try_from(raw: RawMessage) -> Result<Self, Self::Error> {
        let msg = match raw.ty {
            message_type::BET => Self::Bet(String::from_utf8(raw.payload)?.parse::<Bet>()?),
            message_type::BET_RESPONSE => {
                Self::BetResponse(String::from_utf8(raw.payload)? == SUCCESS)
            }
            message_type::BATCH_BET => {
                let text = String::from_utf8(raw.payload)?;
                if text.is_empty() {
                    Self::BatchBet(vec![])
                } else {
                    Self::BatchBet(text.split(RECORD_SEPARATOR).map(str::to_owned).collect())
                }
            }
            message_type::ALL_BETS_SENT => Self::AllBetsSent {
                agency: agency_from_payload(&raw.payload)?,
            },
            message_type::RESULTS_QUERY => Self::ResultsQuery {
                agency: agency_from_payload(&raw.payload)?,
            },
            message_type::RESULT_UNAVAILABLE => Self::ResultUnavailable,
            message_type::RESULTS_RESPONSE => {
                let text = String::from_utf8(raw.payload)?;
                let winners = match text.is_empty() {
                    true => vec![],
                    false => text.split(WINNER_SEPARATOR).map(str::to_owned).collect(),
                };

                Self::ResultsResponse { winners }
            }

            ty => return Err(DeserializeError::UnknownType(ty)),
        };

        Ok(msg)
    }
}

#[async_trait]
impl Deserialize for Message {
    type Error = DeserializeError;

    async fn deserialize<R: AsyncReadExt + Unpin + Send>(
        reader: &mut R,
    ) -> Result<Self, Self::Error> {
        RawMessage::deserialize(reader).await?.try_into()
    }
}

fn agency_from_payload(payload: &[u8]) -> Result<u32, DeserializeError> {
    let bytes: [u8; 4] = payload
        .try_into()
        .map_err(|_| DeserializeError::BadAgency(payload.len()))?;

    Ok(u32::from_be_bytes(bytes))
}
