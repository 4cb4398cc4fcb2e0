use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::{
    bets::Bet,
    protocol::{Deserialize, Message, RawMessage, Serialize},
    systems::Lottery,
};

// Every connection carries exactly one request and at most one response
enum State {
    AwaitMessage,
    Dispatch(RawMessage),
    Respond(Option<Message>),
}

/// Serves a single request on the connection and closes it
pub async fn handle<S>(stream: S, lottery: Arc<Lottery>) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut stream = BufReader::new(stream);
    let mut state = State::AwaitMessage;

    loop {
        state = match state {
            State::AwaitMessage => match RawMessage::deserialize(&mut stream).await {
                Ok(raw) => State::Dispatch(raw),
                Err(err) => {
                    tracing::warn!(action = "receive_message", result = "fail", error = %err);

                    // the connection might already be gone, no reason to report a failure twice
                    let _ = Message::BetResponse(false).serialize(&mut stream).await;
                    let _ = stream.shutdown().await;
                    return Ok(());
                }
            },
            State::Dispatch(raw) => State::Respond(dispatch(raw, &lottery).await),
            State::Respond(response) => {
                if let Some(response) = response {
                    response.serialize(&mut stream).await?;
                }

                stream.shutdown().await?;
                return Ok(());
            }
        };
    }
}

async fn dispatch(raw: RawMessage, lottery: &Arc<Lottery>) -> Option<Message> {
    tracing::debug!(action = "receive_message", result = "success", ty = raw.ty, len = raw.len());

    let message = match Message::try_from(raw) {
        Ok(message) => message,
        Err(err) => {
            tracing::warn!(action = "parse_message", result = "fail", error = %err);
            return Some(Message::BetResponse(false));
        }
    };

    match message {
        Message::Bet(bet) => {
            let stored = store(lottery, std::slice::from_ref(&bet)).await;
            if stored {
                tracing::info!(
                    action = "bet_stored",
                    result = "success",
                    document = %bet.document,
                    number = bet.number
                );
            }

            Some(Message::BetResponse(stored))
        }
        Message::BatchBet(records) => Some(Message::BetResponse(
            store_batch(lottery, &records).await,
        )),
        Message::AllBetsSent { agency } => {
            // the draw, if released, keeps running on its own task
            let _ = lottery.agency_done(agency);
            None
        }
        Message::ResultsQuery { agency } => match lottery.winners(agency) {
            Some(winners) => {
                tracing::info!(
                    action = "winners_query",
                    result = "success",
                    agency,
                    winners = winners.len()
                );
                Some(Message::ResultsResponse { winners })
            }
            None => {
                tracing::debug!(action = "winners_query", result = "unavailable", agency);
                Some(Message::ResultUnavailable)
            }
        },
        Message::BetResponse(_) | Message::ResultUnavailable | Message::ResultsResponse { .. } => {
            tracing::warn!(
                action = "receive_message",
                result = "fail",
                error = "the server does not accept responses"
            );
            Some(Message::BetResponse(false))
        }
    }
}

// Validates every record on its own.
// The valid records of a batch are stored even when some of its siblings are rejected,
// in which case the whole batch is still reported as failed.
async fn store_batch(lottery: &Lottery, records: &[String]) -> bool {
    let max_batch_size = lottery.settings().max_batch_size;
    if records.len() > max_batch_size {
        tracing::warn!(
            action = "batch_stored",
            result = "fail",
            size = records.len(),
            max_batch_size,
            error = "the batch is too big"
        );
        return false;
    }

    let mut bets = Vec::with_capacity(records.len());
    let mut rejected = 0usize;
    for (idx, record) in records.iter().enumerate() {
        match record.parse::<Bet>() {
            Ok(bet) => bets.push(bet),
            Err(err) => {
                rejected += 1;
                tracing::warn!(action = "parse_bet", result = "fail", record = idx, error = %err);
            }
        }
    }

    let stored = store(lottery, &bets).await;
    if stored && rejected == 0 {
        tracing::info!(action = "batch_stored", result = "success", count = bets.len());
        true
    } else {
        tracing::warn!(
            action = "batch_stored",
            result = "fail",
            stored = if stored { bets.len() } else { 0 },
            rejected
        );
        false
    }
}

async fn store(lottery: &Lottery, bets: &[Bet]) -> bool {
    match lottery.store_bets(bets).await {
        Ok(()) => true,
        Err(err) => {
            tracing::error!(action = "store_bets", result = "fail", count = bets.len(), error = %err);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;
    use tokio::io::{AsyncWriteExt, DuplexStream};

    use super::handle;
    use crate::{
        bets::Bet,
        protocol::{Deserialize, DeserializeError, Message, Serialize},
        storage::{BetStore, MemoryStore},
        systems::{Lottery, Settings},
    };

    fn lottery(agencies: usize, store: Arc<MemoryStore>) -> Arc<Lottery> {
        Lottery::new(
            Settings {
                agencies,
                max_batch_size: 4,
                winning_number: 7574,
            },
            store,
        )
    }

    fn bet(agency: u32, document: &str, number: i64) -> Bet {
        Bet {
            agency,
            first_name: "Santiago".into(),
            last_name: "Lorca".into(),
            document: document.into(),
            birth_date: NaiveDate::from_ymd_opt(1999, 3, 17).unwrap(),
            number,
        }
    }

    // runs a single connection against the handler, returns what the server answered
    async fn exchange_raw(lottery: &Arc<Lottery>, request: &[u8]) -> Option<Message> {
        let (mut client, server) = tokio::io::duplex(64);
        let handler = tokio::spawn(handle(server, lottery.clone()));

        client.write_all(request).await.unwrap();
        let response = read_response(&mut client).await;

        handler.await.unwrap().unwrap();
        response
    }

    async fn exchange(lottery: &Arc<Lottery>, request: Message) -> Option<Message> {
        let mut raw = vec![];
        request.serialize(&mut raw).await.unwrap();
        exchange_raw(lottery, &raw).await
    }

    async fn read_response(client: &mut DuplexStream) -> Option<Message> {
        match Message::deserialize(client).await {
            Ok(message) => Some(message),
            Err(DeserializeError::Io(err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                None
            }
            Err(err) => panic!("unexpected response: {err}"),
        }
    }

    #[tokio::test]
    async fn single_bet_is_stored() {
        let store = Arc::new(MemoryStore::default());
        let lottery = lottery(1, store.clone());

        let response = exchange(&lottery, Message::Bet(bet(1, "30904465", 7574))).await;
        assert_eq!(response, Some(Message::BetResponse(true)));
        assert_eq!(store.load_all().await.unwrap(), [bet(1, "30904465", 7574)]);
    }

    #[tokio::test]
    async fn invalid_single_bet_is_rejected() {
        let store = Arc::new(MemoryStore::default());
        let lottery = lottery(1, store.clone());

        let payload = b"1;Santiago;Lorca;30904465;not-a-date;7574";
        let mut request = vec![0, 0, 0, 0];
        request.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        request.extend_from_slice(payload);

        let response = exchange_raw(&lottery, &request).await;
        assert_eq!(response, Some(Message::BetResponse(false)));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn bet_spanning_lines_is_rejected() {
        let store = Arc::new(MemoryStore::default());
        let lottery = lottery(1, store.clone());

        let payload = b"1;Santi\nago;Lorca;30904465;1999-03-17;7574";
        let mut request = vec![0, 0, 0, 0];
        request.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        request.extend_from_slice(payload);

        let response = exchange_raw(&lottery, &request).await;
        assert_eq!(response, Some(Message::BetResponse(false)));
        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn batch_with_invalid_records_keeps_the_valid_ones() {
        let store = Arc::new(MemoryStore::default());
        let lottery = lottery(1, store.clone());

        let records = vec![
            bet(1, "1", 10).to_string(),
            "1;Santiago;Lorca;2;1999-03-17;not-a-number".to_string(),
            bet(1, "3", 30).to_string(),
            "x;Santiago;Lorca;4;1999-03-17;40".to_string(),
        ];

        let response = exchange(&lottery, Message::BatchBet(records)).await;
        assert_eq!(response, Some(Message::BetResponse(false)));
        assert_eq!(
            store.load_all().await.unwrap(),
            [bet(1, "1", 10), bet(1, "3", 30)]
        );
    }

    #[tokio::test]
    async fn valid_batch_is_stored() {
        let store = Arc::new(MemoryStore::default());
        let lottery = lottery(1, store.clone());

        let bets = [bet(1, "1", 10), bet(1, "2", 20), bet(1, "3", 30)];
        let response = exchange(&lottery, Message::batch(&bets)).await;

        assert_eq!(response, Some(Message::BetResponse(true)));
        assert_eq!(store.load_all().await.unwrap(), bets);
    }

    #[tokio::test]
    async fn oversized_batch_is_rejected_whole() {
        let store = Arc::new(MemoryStore::default());
        let lottery = lottery(1, store.clone());

        let bets: Vec<Bet> = (0..5).map(|idx| bet(1, &idx.to_string(), idx)).collect();
        let response = exchange(&lottery, Message::batch(&bets)).await;

        assert_eq!(response, Some(Message::BetResponse(false)));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn results_are_served_once_every_agency_is_done() {
        let store = Arc::new(MemoryStore::default());
        let lottery = lottery(2, store.clone());

        let bets = [bet(1, "a", 7574), bet(2, "b", 7574), bet(1, "c", 1)];
        assert_eq!(
            exchange(&lottery, Message::batch(&bets)).await,
            Some(Message::BetResponse(true))
        );

        let query = Message::ResultsQuery { agency: 1 };
        assert_eq!(
            exchange(&lottery, query.clone()).await,
            Some(Message::ResultUnavailable)
        );

        // no answer is sent back for a completion notification
        assert_eq!(exchange(&lottery, Message::AllBetsSent { agency: 1 }).await, None);
        assert_eq!(
            exchange(&lottery, query.clone()).await,
            Some(Message::ResultUnavailable)
        );
        assert_eq!(exchange(&lottery, Message::AllBetsSent { agency: 2 }).await, None);

        // the draw runs on its own task, give it a chance to finish
        let mut response = exchange(&lottery, query.clone()).await;
        while response == Some(Message::ResultUnavailable) {
            tokio::task::yield_now().await;
            response = exchange(&lottery, query.clone()).await;
        }

        assert_eq!(
            response,
            Some(Message::ResultsResponse {
                winners: vec!["a".into()]
            })
        );
        assert_eq!(
            exchange(&lottery, Message::ResultsQuery { agency: 3 }).await,
            Some(Message::ResultsResponse { winners: vec![] })
        );
    }

    #[tokio::test]
    async fn unknown_and_unexpected_messages_are_refused() {
        let store = Arc::new(MemoryStore::default());
        let lottery = lottery(1, store.clone());

        let unknown = b"\x00\x00\x00\x2a\x00\x00\x00\x00";
        assert_eq!(
            exchange_raw(&lottery, unknown).await,
            Some(Message::BetResponse(false))
        );

        assert_eq!(
            exchange(&lottery, Message::BetResponse(true)).await,
            Some(Message::BetResponse(false))
        );
    }

    #[tokio::test]
    async fn broken_frame_gets_a_negative_answer() {
        let store = Arc::new(MemoryStore::default());
        let lottery = lottery(1, store.clone());

        let (mut client, server) = tokio::io::duplex(64);
        let handler = tokio::spawn(handle(server, lottery.clone()));

        // announce a 100 bytes payload but only send a few of them
        client
            .write_all(b"\x00\x00\x00\x02\x00\x00\x00\x64only a few")
            .await
            .unwrap();
        client.shutdown().await.unwrap();

        assert_eq!(
            read_response(&mut client).await,
            Some(Message::BetResponse(false))
        );
        handler.await.unwrap().unwrap();
        assert!(store.is_empty().await);
    }
}
