//! # Consensus-Core
//!
//! Cryptographic and transaction-validation core of a Bitcoin-like protocol.
//!
//! This crate implements secp256k1 arithmetic and ECDSA from first
//! principles, a script interpreter covering P2PKH, P2SH, P2WPKH, P2WSH and
//! bare multisig, the transaction model with legacy and BIP143 signature
//! hashing, and block header proof-of-work checks.
//!
//! ## Architecture
//!
//! The system is layered, leaves first:
//! - Field and curve arithmetic (`field`, `point`, `curve`)
//! - Signatures and keys (`ecdsa`)
//! - Encodings (`codec`, `hashes`, `base58`)
//! - Script (`opcodes`, `script`, `interpreter`)
//! - Transactions (`transaction`, `segwit`, `fetcher`)
//! - Headers (`block`, `pow`)
//!
//! ## Design Principles
//!
//! 1. **Pure Verification**: verifying never mutates its inputs
//! 2. **Errors Are Not Failures**: malformed input is an `Err`, an invalid
//!    signature or script is `Ok(false)`
//! 3. **Exact Version Pinning**: consensus-critical dependencies are pinned
//! 4. **No Network Access**: previous outputs come from a caller-supplied
//!    [`TxFetcher`]
//!
//! ## Usage
//!
//! ```rust
//! use consensus_core::ConsensusCore;
//!
//! let core = ConsensusCore::new();
//! let genesis = hex::decode(
//!     "0100000000000000000000000000000000000000000000000000000000000000\
//!      000000003ba3edfd7a7b12b27ac72c3e67768f617fc81bc3888a51323a9fb8aa\
//!      4b1e5e4a29ab5f49ffff001d1dac2b7c",
//! )
//! .unwrap();
//! let header = core.parse_block_header(&genesis).unwrap();
//! assert!(core.check_proof_of_work(&header).unwrap());
//! ```

pub mod types;
pub mod constants;
pub mod error;
pub mod config;
pub mod codec;
pub mod hashes;
pub mod base58;
pub mod field;
pub mod point;
pub mod curve;
pub mod ecdsa;
pub mod opcodes;
pub mod script;
pub mod interpreter;
pub mod transaction;
pub mod segwit;
pub mod fetcher;
pub mod block;
pub mod pow;

// Re-export commonly used types
pub use types::*;
pub use constants::*;
pub use error::{ConsensusError, Result};
pub use config::ConsensusConfig;
pub use block::BlockHeader;
pub use ecdsa::{PrivateKey, Signature};
pub use fetcher::{MemoryTxStore, TxFetcher};
pub use field::FieldElement;
pub use point::Point;
pub use script::{Command, Script};
pub use transaction::{Transaction, TxIn, TxOut};

/// Main consensus core entry point
///
/// Holds a [`ConsensusConfig`] and applies its network and verification
/// flags to every call.
///
/// # Examples
///
/// ```
/// use consensus_core::{ConsensusConfig, ConsensusCore, Network};
///
/// let config = ConsensusConfig::from_json(r#"{"network": "testnet"}"#).unwrap();
/// let core = ConsensusCore::with_config(config);
/// assert_eq!(core.config().network, Network::Testnet);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConsensusCore {
    config: ConsensusConfig,
}

impl ConsensusCore {
    /// Create an instance with the default configuration (mainnet,
    /// P2SH and witness evaluation enabled)
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ConsensusConfig) -> Self {
        ConsensusCore { config }
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    /// Parse a serialised transaction for the configured network
    pub fn parse_transaction(&self, bytes: &[u8]) -> Result<Transaction> {
        Transaction::parse(bytes, self.config.network)
    }

    /// Verify fee and every input, resolving previous outputs through
    /// `fetcher`
    ///
    /// # Examples
    ///
    /// ```
    /// use consensus_core::*;
    ///
    /// let core = ConsensusCore::new();
    /// let mut store = MemoryTxStore::new();
    /// let key = PrivateKey::new(8675309u32.into()).unwrap();
    /// let h160 = key.public_point().hash160(true).unwrap();
    ///
    /// let funding = Transaction::new(
    ///     1,
    ///     vec![TxIn::new([0x01; 32], 0)],
    ///     vec![TxOut::new(50_000, Script::p2pkh(&h160))],
    ///     0,
    ///     Network::Mainnet,
    /// );
    /// let funding_id = store.insert(&funding);
    ///
    /// let mut prev_tx = [0u8; 32];
    /// prev_tx.copy_from_slice(&hex::decode(&funding_id).unwrap());
    /// let mut spend = Transaction::new(
    ///     1,
    ///     vec![TxIn::new(prev_tx, 0)],
    ///     vec![TxOut::new(40_000, Script::p2pkh(&h160))],
    ///     0,
    ///     Network::Mainnet,
    /// );
    /// assert!(spend.sign_input(0, &key, &store).unwrap());
    /// assert!(core.verify_transaction(&spend, &store).unwrap());
    /// ```
    pub fn verify_transaction<F: TxFetcher + ?Sized>(
        &self,
        tx: &Transaction,
        fetcher: &F,
    ) -> Result<bool> {
        tx.verify_with_flags(fetcher, self.config.flags())
    }

    /// Verify a single input under the configured flags
    pub fn verify_input<F: TxFetcher + ?Sized>(
        &self,
        tx: &Transaction,
        index: usize,
        fetcher: &F,
    ) -> Result<bool> {
        tx.verify_input(index, fetcher, self.config.flags())
    }

    /// Structural checks that need no previous outputs
    pub fn check_transaction(&self, tx: &Transaction) -> Result<ValidationResult> {
        transaction::check_transaction(tx)
    }

    /// Evaluate `script_sig` followed by `script_pubkey` against the
    /// signature hash `z`
    ///
    /// # Examples
    ///
    /// ```
    /// use consensus_core::{ConsensusCore, Script};
    /// use num_bigint::BigUint;
    ///
    /// let core = ConsensusCore::new();
    /// // OP_1 | OP_1 OP_EQUAL
    /// let script_sig = Script::parse_raw(&[0x51]).unwrap();
    /// let script_pubkey = Script::parse_raw(&[0x51, 0x87]).unwrap();
    /// let valid = core
    ///     .verify_script(&script_sig, &script_pubkey, &[], &BigUint::from(0u32))
    ///     .unwrap();
    /// assert!(valid);
    /// ```
    pub fn verify_script(
        &self,
        script_sig: &Script,
        script_pubkey: &Script,
        witness: &[ByteString],
        z: &num_bigint::BigUint,
    ) -> Result<bool> {
        script_sig
            .combine(script_pubkey)
            .evaluate(z, witness, self.config.flags())
    }

    pub fn parse_block_header(&self, bytes: &[u8]) -> Result<BlockHeader> {
        BlockHeader::parse(bytes)
    }

    /// Parse the payload of a `headers` message
    pub fn parse_headers(&self, payload: &[u8]) -> Result<Vec<BlockHeader>> {
        block::parse_headers_payload(payload)
    }

    /// Check proof of work
    pub fn check_proof_of_work(&self, header: &BlockHeader) -> Result<bool> {
        pow::check_proof_of_work(header)
    }

    /// Compact target for the interval following `first..=last`
    pub fn get_next_work_required(&self, first: &BlockHeader, last: &BlockHeader) -> Result<u32> {
        pow::get_next_work_required(first, last)
    }
}
