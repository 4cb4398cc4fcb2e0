use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use super::{
    message::{Message, ERROR, RECORD_SEPARATOR, SUCCESS, WINNER_SEPARATOR},
    MAX_PAYLOAD_LEN,
};

#[async_trait]
pub trait Serialize: Sized {
    type Error;

    /// Serialize a structure into a writer
    async fn serialize<W: AsyncWriteExt + Unpin + Send>(
        &self,
        writer: &mut W,
    ) -> Result<(), Self::Error>;
}

#[derive(thiserror::Error, Debug)]
pub enum SerializeError {
    #[error("The payload is too long!")]
    TooLong,

    #[error("{0}")]
    Io(#[from] tokio::io::Error),

    #[error("A {0} can't be empty or contain its separator")]
    BadEntry(&'static str),
}

// Entries that are empty or hold the separator would not be read back as they were sent
fn join(
    entries: &[String],
    separator: char,
    what: &'static str,
) -> Result<Vec<u8>, SerializeError> {
    if entries
        .iter()
        .any(|entry| entry.is_empty() || entry.contains(separator))
    {
        return Err(SerializeError::BadEntry(what));
    }

    Ok(entries.join(&separator.to_string()).into_bytes())
}

impl Message {
    fn payload(&self) -> Result<Vec<u8>, SerializeError> {
        let payload = match self {
            Self::Bet(bet) => bet.to_string().into_bytes(),
            Self::BetResponse(true) => SUCCESS.into(),
            Self::BetResponse(false) => ERROR.into(),
            Self::BatchBet(records) => join(records, RECORD_SEPARATOR, "batch record")?,
            Self::AllBetsSent { agency } | Self::ResultsQuery { agency } => {
                agency.to_be_bytes().to_vec()
            }
            Self::ResultUnavailable => vec![],
            Self::ResultsResponse { winners } => join(winners, WINNER_SEPARATOR, "winner")?,
        };

        Ok(payload)
    }
}

#[async_trait]
impl Serialize for Message {
    type Error = SerializeError;

    async fn serialize<W: AsyncWriteExt + Unpin + Send>(
        &self,
        writer: &mut W,
    ) -> Result<(), Self::Error> {
        let payload = self.payload()?;
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(SerializeError::TooLong);
        }

        // build the whole frame first, write_all takes care of partial writes
        let mut frame = Vec::with_capacity(8 + payload.len());
        frame.extend_from_slice(&self.ty().to_be_bytes());
        frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        frame.extend_from_slice(&payload);

        writer.write_all(&frame).await?;
        writer.flush().await?;

        Ok(())
    }
}
