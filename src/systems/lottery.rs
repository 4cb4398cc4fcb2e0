use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::{
    bets::Bet,
    storage::{BetStore, StoreError},
};

use super::{
    barrier::{CompletionBarrier, Notified},
    results::{ResultsCache, WinnersIndex},
};

#[derive(Debug, Clone)]
pub struct Settings {
    pub agencies: usize,
    pub max_batch_size: usize,
    pub winning_number: i64,
}

/// Everything the connections of a single draw share:
/// the bet store, the completion barrier and the results
pub struct Lottery {
    settings: Settings,
    store: Arc<dyn BetStore>,
    barrier: CompletionBarrier,
    results: ResultsCache,
}

impl Lottery {
    pub fn new(settings: Settings, store: Arc<dyn BetStore>) -> Arc<Self> {
        Arc::new(Self {
            barrier: CompletionBarrier::new(settings.agencies),
            results: ResultsCache::default(),
            settings,
            store,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub async fn store_bets(&self, bets: &[Bet]) -> Result<(), StoreError> {
        self.store.append(bets).await
    }

    /// Marks the agency as done
    ///
    /// when this completes the set of agencies, the draw is started on
    /// its own task and its handle is returned
    pub fn agency_done(self: &Arc<Self>, agency: u32) -> Option<JoinHandle<()>> {
        match self.barrier.notify(agency) {
            Notified::Released => {
                tracing::info!(action = "draw", result = "in_progress", agency);
                let this = self.clone();
                Some(tokio::spawn(async move { this.draw().await }))
            }
            Notified::Waiting { remaining } => {
                tracing::info!(action = "agency_done", result = "success", agency, remaining);
                None
            }
            Notified::Duplicate | Notified::AlreadyReleased => {
                tracing::warn!(action = "agency_done", result = "ignored", agency);
                None
            }
        }
    }

    async fn draw(&self) {
        let bets = match self.store.load_all().await {
            Ok(bets) => bets,
            Err(err) => {
                // the results stay unavailable for the rest of the run
                tracing::error!(action = "draw", result = "fail", error = %err);
                return;
            }
        };

        let index = WinnersIndex::draw(&bets, self.settings.winning_number);
        let winners = index.total();
        if self.results.publish(index) {
            tracing::info!(action = "draw", result = "success", bets = bets.len(), winners);
        }
    }

    /// Returns the winners of the agency, or None while the draw is pending
    pub fn winners(&self, agency: u32) -> Option<Vec<String>> {
        self.results.winners(agency)
    }
}
