use std::time::Duration;

use tokio::{
    io::{AsyncWriteExt, BufReader},
    net::TcpStream,
};

use crate::{
    bets::{Bet, BetParseError},
    protocol::{Deserialize, DeserializeError, Message, Serialize, SerializeError},
};

const CSV_SEPARATOR: char = ',';

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("{0}")]
    Io(#[from] tokio::io::Error),

    #[error("{0}")]
    Serialize(#[from] SerializeError),

    #[error("{0}")]
    Deserialize(#[from] DeserializeError),

    #[error("Unexpected response type: {0}")]
    UnexpectedResponse(u32),

    #[error("The winners were not available after {0} attempts")]
    ResultsUnavailable(u32),
}

/// Parses a line of the agency bets file:
/// `firstName,lastName,document,birthDate,number`
pub fn parse_record(agency: u32, line: &str) -> Result<Bet, BetParseError> {
    let fields: Vec<&str> = line.trim().split(CSV_SEPARATOR).collect();
    if fields.len() != 5 {
        // counted the way the server counts them, agency included
        return Err(BetParseError::FieldCount(fields.len() + 1));
    }

    format!("{agency};{}", fields.join(";")).parse()
}

/// Parses every bet of the file, lines that can't be parsed are skipped
pub fn parse_records(agency: u32, content: &str) -> Vec<Bet> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(idx, line)| match parse_record(agency, line) {
            Ok(bet) => Some(bet),
            Err(err) => {
                tracing::warn!(action = "load_bets", result = "fail", line = idx + 1, error = %err);
                None
            }
        })
        .collect()
}

/// The agency side of the protocol, every exchange uses its own connection
#[derive(Debug, Clone)]
pub struct Agency {
    id: u32,
    server_address: String,
    retry_period: Duration,
    max_retries: u32,
}

impl Agency {
    pub fn new(id: u32, server_address: String, retry_period: Duration, max_retries: u32) -> Self {
        Self {
            id,
            server_address,
            retry_period,
            max_retries,
        }
    }

    async fn send(&self, message: Message) -> Result<BufReader<TcpStream>, ClientError> {
        let mut stream = BufReader::new(TcpStream::connect(&self.server_address).await?);
        message.serialize(&mut stream).await?;
        Ok(stream)
    }

    async fn exchange(&self, message: Message) -> Result<Message, ClientError> {
        let mut stream = self.send(message).await?;
        let response = Message::deserialize(&mut stream).await?;
        let _ = stream.shutdown().await;

        Ok(response)
    }

    /// Sends a batch of bets, returns whether the server stored all of them
    pub async fn send_batch(&self, bets: &[Bet]) -> Result<bool, ClientError> {
        match self.exchange(Message::batch(bets)).await? {
            Message::BetResponse(accepted) => Ok(accepted),
            other => Err(ClientError::UnexpectedResponse(other.ty())),
        }
    }

    /// Sends every bet, `batch_size` at a time, waiting for each response.
    ///
    /// Returns the number of batches the server rejected.
    pub async fn send_bets(&self, bets: &[Bet], batch_size: usize) -> Result<usize, ClientError> {
        let mut rejected = 0;
        for batch in bets.chunks(batch_size.max(1)) {
            if self.send_batch(batch).await? {
                tracing::info!(action = "batch_sent", result = "success", count = batch.len());
            } else {
                rejected += 1;
                tracing::warn!(action = "batch_sent", result = "fail", count = batch.len());
            }
        }

        Ok(rejected)
    }

    /// Tells the server the agency won't send any more bets
    pub async fn notify_done(&self) -> Result<(), ClientError> {
        let mut stream = self
            .send(Message::AllBetsSent { agency: self.id })
            .await?;
        stream.shutdown().await?;

        tracing::info!(action = "all_bets_sent", result = "success", agency = self.id);
        Ok(())
    }

    /// Asks for the winners once, None while the draw is pending
    pub async fn query_winners(&self) -> Result<Option<Vec<String>>, ClientError> {
        match self.exchange(Message::ResultsQuery { agency: self.id }).await? {
            Message::ResultsResponse { winners } => Ok(Some(winners)),
            Message::ResultUnavailable => Ok(None),
            other => Err(ClientError::UnexpectedResponse(other.ty())),
        }
    }

    /// Keeps asking for the winners until the draw is done
    pub async fn wait_for_winners(&self) -> Result<Vec<String>, ClientError> {
        for attempt in 1..=self.max_retries {
            if let Some(winners) = self.query_winners().await? {
                tracing::info!(
                    action = "winners_query",
                    result = "success",
                    winners = winners.len()
                );
                return Ok(winners);
            }

            tracing::debug!(action = "winners_query", result = "in_progress", attempt);
            tokio::time::sleep(self.retry_period).await;
        }

        Err(ClientError::ResultsUnavailable(self.max_retries))
    }
}
