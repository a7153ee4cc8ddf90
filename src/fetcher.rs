//! Previous-output resolution
//!
//! Verifying an input needs the output it spends. The core never talks to
//! the network itself; callers supply a [`TxFetcher`] that maps a transaction
//! id to raw transaction bytes.

use crate::error::{ConsensusError, Result};
use crate::transaction::Transaction;
use crate::types::{ByteString, Network};
use std::collections::HashMap;

/// Source of raw transactions by id
pub trait TxFetcher {
    /// Raw serialised transaction with id `tx_id` (display-order hex)
    fn fetch(&self, tx_id: &str, testnet: bool) -> Result<ByteString>;
}

/// Fetch and parse a transaction, rejecting a payload whose id differs from
/// the one requested
pub fn fetch_transaction<F: TxFetcher + ?Sized>(
    fetcher: &F,
    tx_id: &str,
    network: Network,
) -> Result<Transaction> {
    let raw = fetcher.fetch(tx_id, network.is_testnet())?;
    let tx = Transaction::parse(&raw, network)?;
    let id = tx.id();
    if id != tx_id {
        log::warn!("fetched transaction {} when asking for {}", id, tx_id);
        return Err(ConsensusError::TransactionFetch(format!(
            "requested {} but received {}",
            tx_id, id
        )));
    }
    log::debug!("fetched transaction {}", id);
    Ok(tx)
}

/// In-memory transaction store keyed by network and id
#[derive(Debug, Clone, Default)]
pub struct MemoryTxStore {
    transactions: HashMap<(Network, String), ByteString>,
}

impl MemoryTxStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a transaction under its own id
    pub fn insert(&mut self, tx: &Transaction) -> String {
        let id = tx.id();
        self.transactions
            .insert((tx.network, id.clone()), tx.serialize());
        id
    }

    /// Store raw bytes under an explicit id
    pub fn insert_raw(&mut self, network: Network, tx_id: &str, raw: ByteString) {
        self.transactions.insert((network, tx_id.to_string()), raw);
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

impl TxFetcher for MemoryTxStore {
    fn fetch(&self, tx_id: &str, testnet: bool) -> Result<ByteString> {
        self.transactions
            .get(&(Network::from_testnet(testnet), tx_id.to_string()))
            .cloned()
            .ok_or_else(|| ConsensusError::UtxoNotFound(tx_id.to_string()))
    }
}
