use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::{
    fs::{File, OpenOptions},
    io::AsyncWriteExt,
    sync::Mutex,
};

use crate::bets::{Bet, BetParseError};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("{0}")]
    Io(#[from] tokio::io::Error),

    #[error("corrupt record at line {line}: {source}")]
    Corrupt {
        line: usize,
        #[source]
        source: BetParseError,
    },
}

/// Durable home of every bet received by the server
#[async_trait]
pub trait BetStore: Send + Sync {
    /// Appends the bets at the end of the store, as a single unit
    async fn append(&self, bets: &[Bet]) -> Result<(), StoreError>;

    /// Loads every bet that was ever appended, in store order
    async fn load_all(&self) -> Result<Vec<Bet>, StoreError>;
}

/// Keeps the bets in an append-only text file, one encoded bet per line
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl BetStore for FileStore {
    async fn append(&self, bets: &[Bet]) -> Result<(), StoreError> {
        if bets.is_empty() {
            return Ok(());
        }

        // encode the whole batch up front so it hits the file in one write
        let mut block = String::new();
        for bet in bets {
            block += &bet.to_string();
            block.push('\n');
        }

        let mut file = self.file.lock().await;
        file.write_all(block.as_bytes()).await?;
        file.flush().await?;

        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<Bet>, StoreError> {
        // hold the append lock so we never observe half of a batch
        let _guard = self.file.lock().await;

        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(err) => return Err(err.into()),
        };

        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| {
                line.parse::<Bet>().map_err(|source| StoreError::Corrupt {
                    line: idx + 1,
                    source,
                })
            })
            .collect()
    }
}

/// Keeps the bets in memory, nothing survives the process
#[derive(Debug, Default)]
pub struct MemoryStore {
    bets: Mutex<Vec<Bet>>,
}

#[cfg(test)]
impl MemoryStore {
    pub async fn len(&self) -> usize {
        self.bets.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.bets.lock().await.is_empty()
    }
}

#[async_trait]
impl BetStore for MemoryStore {
    async fn append(&self, bets: &[Bet]) -> Result<(), StoreError> {
        self.bets.lock().await.extend_from_slice(bets);
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<Bet>, StoreError> {
        Ok(self.bets.lock().await.clone())
    }
}
