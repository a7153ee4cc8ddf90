//! Transaction model, serialisation, signature hashing and verification

use crate::codec::{encode_varint, little_endian_to_int, ByteReader};
use crate::constants::*;
use crate::ecdsa::PrivateKey;
use crate::error::{ConsensusError, Result};
use crate::fetcher::{fetch_transaction, TxFetcher};
use crate::hashes::hash256;
use crate::script::{Command, Script};
use crate::segwit::{serialize_witness, sig_hash_bip143, transaction_weight};
use crate::types::*;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Transaction input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxIn {
    /// Id of the transaction being spent, in display order
    pub prev_tx: Hash,
    pub prev_index: u32,
    pub script_sig: Script,
    pub sequence: u32,
    pub witness: Vec<ByteString>,
}

impl TxIn {
    /// Unsigned input spending `prev_tx:prev_index` with a final sequence
    pub fn new(prev_tx: Hash, prev_index: u32) -> TxIn {
        TxIn {
            prev_tx,
            prev_index,
            script_sig: Script::default(),
            sequence: SEQUENCE_FINAL,
            witness: Vec::new(),
        }
    }

    pub fn parse(reader: &mut ByteReader<'_>) -> Result<TxIn> {
        let prev_tx = reader.read_hash_reversed("input prev tx")?;
        let prev_index = reader.read_u32_le("input prev index")?;
        let script_sig = Script::parse(reader)?;
        let sequence = reader.read_u32_le("input sequence")?;
        Ok(TxIn {
            prev_tx,
            prev_index,
            script_sig,
            sequence,
            witness: Vec::new(),
        })
    }

    /// Wire form of the outpoint: reversed txid followed by the index
    pub fn outpoint_bytes(&self) -> [u8; 36] {
        let mut out = [0u8; 36];
        out[..32].copy_from_slice(&self.prev_tx);
        out[..32].reverse();
        out[32..].copy_from_slice(&self.prev_index.to_le_bytes());
        out
    }

    pub fn serialize(&self) -> ByteString {
        self.serialize_with_script(&self.script_sig)
    }

    fn serialize_with_script(&self, script: &Script) -> ByteString {
        let mut out = self.outpoint_bytes().to_vec();
        out.extend_from_slice(&script.serialize());
        out.extend_from_slice(&self.sequence.to_le_bytes());
        out
    }

    pub fn prev_tx_id(&self) -> String {
        hex::encode(self.prev_tx)
    }

    pub fn fetch_tx<F: TxFetcher + ?Sized>(&self, fetcher: &F, network: Network) -> Result<Transaction> {
        fetch_transaction(fetcher, &self.prev_tx_id(), network)
    }

    /// The output this input spends
    pub fn prev_output<F: TxFetcher + ?Sized>(&self, fetcher: &F, network: Network) -> Result<TxOut> {
        let tx = self.fetch_tx(fetcher, network)?;
        tx.outputs
            .get(self.prev_index as usize)
            .cloned()
            .ok_or_else(|| {
                ConsensusError::TransactionValidation(format!(
                    "{} has no output {}",
                    self.prev_tx_id(),
                    self.prev_index
                ))
            })
    }

    pub fn value<F: TxFetcher + ?Sized>(&self, fetcher: &F, network: Network) -> Result<u64> {
        Ok(self.prev_output(fetcher, network)?.amount)
    }

    pub fn script_pubkey<F: TxFetcher + ?Sized>(&self, fetcher: &F, network: Network) -> Result<Script> {
        Ok(self.prev_output(fetcher, network)?.script_pubkey)
    }
}

impl fmt::Display for TxIn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.prev_tx_id(), self.prev_index)
    }
}

/// Transaction output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    pub amount: u64,
    pub script_pubkey: Script,
}

impl TxOut {
    pub fn new(amount: u64, script_pubkey: Script) -> TxOut {
        TxOut {
            amount,
            script_pubkey,
        }
    }

    pub fn parse(reader: &mut ByteReader<'_>) -> Result<TxOut> {
        let amount = reader.read_u64_le("output amount")?;
        let script_pubkey = Script::parse(reader)?;
        Ok(TxOut {
            amount,
            script_pubkey,
        })
    }

    pub fn serialize(&self) -> ByteString {
        let mut out = self.amount.to_le_bytes().to_vec();
        out.extend_from_slice(&self.script_pubkey.serialize());
        out
    }
}

impl fmt::Display for TxOut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.amount, self.script_pubkey)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
    pub network: Network,
    /// Serialise with marker, flag and witness data
    pub segwit: bool,
}

impl Transaction {
    /// Build a transaction; it is segwit when any input carries a witness
    pub fn new(
        version: u32,
        inputs: Vec<TxIn>,
        outputs: Vec<TxOut>,
        lock_time: u32,
        network: Network,
    ) -> Transaction {
        let segwit = inputs.iter().any(|input| !input.witness.is_empty());
        Transaction {
            version,
            inputs,
            outputs,
            lock_time,
            network,
            segwit,
        }
    }

    /// Parse a complete transaction; trailing bytes are rejected
    pub fn parse(bytes: &[u8], network: Network) -> Result<Transaction> {
        let mut reader = ByteReader::new(bytes);
        let tx = Transaction::parse_from(&mut reader, network)?;
        reader.finish("transaction")?;
        Ok(tx)
    }

    /// Parse a transaction from the front of `reader`
    pub fn parse_from(reader: &mut ByteReader<'_>, network: Network) -> Result<Transaction> {
        let version = reader.read_u32_le("transaction version")?;
        let segwit = reader.peek_u8("transaction input count")? == 0x00;
        if segwit {
            reader.read_u8("segwit marker")?;
            let flag = reader.read_u8("segwit flag")?;
            if flag != 0x01 {
                return Err(ConsensusError::malformed(
                    "segwit flag",
                    format!("expected 0x01, got 0x{:02x}", flag),
                ));
            }
        }

        let input_count = reader.read_varint("transaction input count")?;
        let mut inputs = Vec::new();
        for _ in 0..input_count {
            inputs.push(TxIn::parse(reader)?);
        }
        let output_count = reader.read_varint("transaction output count")?;
        let mut outputs = Vec::new();
        for _ in 0..output_count {
            outputs.push(TxOut::parse(reader)?);
        }

        if segwit {
            for input in inputs.iter_mut() {
                let items = reader.read_varint("witness item count")?;
                for _ in 0..items {
                    input.witness.push(reader.read_var_bytes("witness item")?.to_vec());
                }
            }
        }

        let lock_time = reader.read_u32_le("transaction locktime")?;
        Ok(Transaction {
            version,
            inputs,
            outputs,
            lock_time,
            network,
            segwit,
        })
    }

    pub fn serialize(&self) -> ByteString {
        if self.segwit {
            self.serialize_segwit()
        } else {
            self.serialize_legacy()
        }
    }

    /// Serialisation without marker, flag or witness data
    pub fn serialize_legacy(&self) -> ByteString {
        self.serialize_with(|_, input| input.serialize())
    }

    fn serialize_with(&self, mut input_bytes: impl FnMut(usize, &TxIn) -> ByteString) -> ByteString {
        let mut out = self.version.to_le_bytes().to_vec();
        out.extend_from_slice(&encode_varint(self.inputs.len() as u64));
        for (i, input) in self.inputs.iter().enumerate() {
            out.extend_from_slice(&input_bytes(i, input));
        }
        out.extend_from_slice(&encode_varint(self.outputs.len() as u64));
        for output in &self.outputs {
            out.extend_from_slice(&output.serialize());
        }
        out.extend_from_slice(&self.lock_time.to_le_bytes());
        out
    }

    fn serialize_segwit(&self) -> ByteString {
        let mut out = self.version.to_le_bytes().to_vec();
        out.extend_from_slice(&[0x00, 0x01]);
        out.extend_from_slice(&encode_varint(self.inputs.len() as u64));
        for input in &self.inputs {
            out.extend_from_slice(&input.serialize());
        }
        out.extend_from_slice(&encode_varint(self.outputs.len() as u64));
        for output in &self.outputs {
            out.extend_from_slice(&output.serialize());
        }
        for input in &self.inputs {
            out.extend_from_slice(&serialize_witness(&input.witness));
        }
        out.extend_from_slice(&self.lock_time.to_le_bytes());
        out
    }

    /// hash256 of the legacy serialisation, in display order
    pub fn hash(&self) -> Hash {
        let mut hash = hash256(&self.serialize_legacy());
        hash.reverse();
        hash
    }

    pub fn id(&self) -> String {
        hex::encode(self.hash())
    }

    pub fn weight(&self) -> usize {
        transaction_weight(self)
    }

    fn input(&self, index: usize) -> Result<&TxIn> {
        self.inputs.get(index).ok_or_else(|| {
            ConsensusError::TransactionValidation(format!(
                "input index {} out of range for {} inputs",
                index,
                self.inputs.len()
            ))
        })
    }

    /// Legacy SIGHASH_ALL digest: the signed input carries `script_code`,
    /// every other input an empty script
    pub fn sig_hash_legacy(&self, index: usize, script_code: &Script) -> Result<BigUint> {
        self.input(index)?;
        let empty = Script::default();
        let mut preimage = self.serialize_with(|i, input| {
            input.serialize_with_script(if i == index { script_code } else { &empty })
        });
        preimage.extend_from_slice(&SIGHASH_ALL.to_le_bytes());
        Ok(BigUint::from_bytes_be(&hash256(&preimage)))
    }

    /// BIP143 digest for a witness input
    pub fn sig_hash_bip143(&self, index: usize, script_code: &Script, amount: u64) -> Result<BigUint> {
        sig_hash_bip143(self, index, script_code, amount)
    }

    /// Σ inputs − Σ outputs. Summed in `i128` so that any count of `u64`
    /// amounts fits without wrapping.
    pub fn fee<F: TxFetcher + ?Sized>(&self, fetcher: &F) -> Result<i128> {
        let mut input_sum: i128 = 0;
        for input in &self.inputs {
            input_sum += i128::from(input.value(fetcher, self.network)?);
        }
        let output_sum: i128 = self.outputs.iter().map(|o| i128::from(o.amount)).sum();
        Ok(input_sum - output_sum)
    }

    /// Digest an input signs, chosen by the type of the output it spends
    fn sig_hash_for_input(&self, index: usize, prev: &TxOut) -> Result<Option<BigUint>> {
        let input = self.input(index)?;
        let spk = &prev.script_pubkey;
        if spk.is_p2sh() {
            let redeem = match input.script_sig.commands.last().and_then(Command::data) {
                Some(raw) => match Script::parse_raw(raw) {
                    Ok(redeem) => redeem,
                    Err(e) => {
                        log::debug!("input {} has an unparseable redeem script: {}", index, e);
                        return Ok(None);
                    }
                },
                _ => return Ok(None),
            };
            if redeem.witness_program().is_some() {
                return self.witness_sig_hash(index, &redeem, prev.amount);
            }
            return self.sig_hash_legacy(index, &redeem).map(Some);
        }
        if spk.witness_program().is_some() {
            return self.witness_sig_hash(index, spk, prev.amount);
        }
        self.sig_hash_legacy(index, spk).map(Some)
    }

    fn witness_sig_hash(&self, index: usize, program: &Script, amount: u64) -> Result<Option<BigUint>> {
        let input = self.input(index)?;
        let script_code = if program.is_p2wpkh() {
            let mut h160 = [0u8; 20];
            h160.copy_from_slice(program.witness_program().unwrap_or(&[0u8; 20]));
            Script::p2pkh(&h160)
        } else {
            match input.witness.last().map(|raw| Script::parse_raw(raw)) {
                Some(Ok(script)) => script,
                Some(Err(e)) => {
                    log::debug!("input {} has an unparseable witness script: {}", index, e);
                    return Ok(None);
                }
                None => return Ok(None),
            }
        };
        self.sig_hash_bip143(index, &script_code, amount).map(Some)
    }

    /// Verify one input's unlocking data against the output it spends
    pub fn verify_input<F: TxFetcher + ?Sized>(&self, index: usize, fetcher: &F, flags: u32) -> Result<bool> {
        let input = self.input(index)?;
        let prev = input.prev_output(fetcher, self.network)?;
        for (name, script) in [("script_sig", &input.script_sig), ("script_pubkey", &prev.script_pubkey)] {
            let size = script.raw_serialize().len();
            if size > MAX_SCRIPT_SIZE {
                log::debug!("input {} {} is {} bytes, over {}", index, name, size, MAX_SCRIPT_SIZE);
                return Ok(false);
            }
        }
        let z = match self.sig_hash_for_input(index, &prev)? {
            Some(z) => z,
            None => return Ok(false),
        };
        let combined = input.script_sig.combine(&prev.script_pubkey);
        let valid = combined.evaluate(&z, &input.witness, flags)?;
        log::debug!("input {} of {} valid: {}", index, self.id(), valid);
        Ok(valid)
    }

    /// Fee is non-negative and every input verifies under the standard flags
    pub fn verify<F: TxFetcher + ?Sized>(&self, fetcher: &F) -> Result<bool> {
        self.verify_with_flags(fetcher, STANDARD_VERIFY_FLAGS)
    }

    pub fn verify_with_flags<F: TxFetcher + ?Sized>(&self, fetcher: &F, flags: u32) -> Result<bool> {
        let fee = self.fee(fetcher)?;
        if fee < 0 {
            log::warn!("transaction {} spends more than its inputs ({})", self.id(), fee);
            return Ok(false);
        }
        for index in 0..self.inputs.len() {
            if !self.verify_input(index, fetcher, flags)? {
                log::warn!("input {} of {} failed verification", index, self.id());
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Sign input `index` with `key`, then verify it. Supports outputs paying
    /// to P2PKH and P2WPKH.
    pub fn sign_input<F: TxFetcher + ?Sized>(
        &mut self,
        index: usize,
        key: &PrivateKey,
        fetcher: &F,
    ) -> Result<bool> {
        let prev = self.input(index)?.prev_output(fetcher, self.network)?;
        let spk = &prev.script_pubkey;
        let point = key.public_point();

        if spk.is_p2pkh() {
            let compressed = spk.embedded_hash160() == Some(point.hash160(true)?);
            let z = self.sig_hash_legacy(index, spk)?;
            let sig = signature_with_hash_type(key, &z)?;
            let sec = point.sec(compressed)?;
            self.inputs[index].script_sig = Script::new(vec![Command::Data(sig), Command::Data(sec)]);
        } else if spk.is_p2wpkh() {
            let script_code = Script::p2pkh(&point.hash160(true)?);
            let z = self.sig_hash_bip143(index, &script_code, prev.amount)?;
            let sig = signature_with_hash_type(key, &z)?;
            let input = &mut self.inputs[index];
            input.script_sig = Script::default();
            input.witness = vec![sig, point.sec(true)?];
            self.segwit = true;
        } else {
            return Err(ConsensusError::UnsupportedOperation(format!(
                "cannot sign for script {}",
                spk
            )));
        }
        self.verify_input(index, fetcher, STANDARD_VERIFY_FLAGS)
    }

    /// One input spending the null outpoint
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1
            && self.inputs[0].prev_tx == [0u8; 32]
            && self.inputs[0].prev_index == 0xffffffff
    }

    /// BIP34 block height from the first push of the coinbase script
    pub fn coinbase_height(&self) -> Option<u64> {
        if !self.is_coinbase() {
            return None;
        }
        self.inputs[0]
            .script_sig
            .commands
            .first()
            .and_then(Command::data)
            .and_then(|height| little_endian_to_int(height).ok())
    }
}

fn signature_with_hash_type(key: &PrivateKey, z: &BigUint) -> Result<ByteString> {
    let mut sig = key.sign(z)?.der();
    sig.push(SIGHASH_ALL as u8);
    Ok(sig)
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "tx: {}", self.id())?;
        writeln!(f, "version: {}", self.version)?;
        writeln!(f, "inputs:")?;
        for input in &self.inputs {
            writeln!(f, "  {}", input)?;
        }
        writeln!(f, "outputs:")?;
        for output in &self.outputs {
            writeln!(f, "  {}", output)?;
        }
        write!(f, "locktime: {}", self.lock_time)
    }
}

/// CheckTransaction: 𝒯𝒳 → {valid, invalid}
///
/// A transaction tx = (v, ins, outs, lt) is valid if and only if:
/// 1. |ins| > 0 ∧ |outs| > 0
/// 2. ∀o ∈ outs: o.value ≤ M_max and Σ o.value ≤ M_max
/// 3. |ins| ≤ M_max_inputs
/// 4. |outs| ≤ M_max_outputs
/// 5. |tx| ≤ M_max_tx_size
pub fn check_transaction(tx: &Transaction) -> Result<ValidationResult> {
    // 1. Check inputs and outputs are not empty
    if tx.inputs.is_empty() || tx.outputs.is_empty() {
        return Ok(ValidationResult::Invalid("Empty inputs or outputs".to_string()));
    }

    // 2. Check output values are valid
    let mut total: u64 = 0;
    for (i, output) in tx.outputs.iter().enumerate() {
        if output.amount > MAX_MONEY {
            return Ok(ValidationResult::Invalid(format!(
                "Invalid output value {} at index {}",
                output.amount, i
            )));
        }
        total += output.amount;
        if total > MAX_MONEY {
            return Ok(ValidationResult::Invalid(format!(
                "Total output value {} exceeds maximum",
                total
            )));
        }
    }

    // 3. Check input count limit
    if tx.inputs.len() > MAX_INPUTS {
        return Ok(ValidationResult::Invalid(format!(
            "Too many inputs: {}",
            tx.inputs.len()
        )));
    }

    // 4. Check output count limit
    if tx.outputs.len() > MAX_OUTPUTS {
        return Ok(ValidationResult::Invalid(format!(
            "Too many outputs: {}",
            tx.outputs.len()
        )));
    }

    // 5. Check transaction size limit
    let tx_size = tx.serialize_legacy().len();
    if tx_size > MAX_TX_SIZE {
        return Ok(ValidationResult::Invalid(format!(
            "Transaction too large: {} bytes",
            tx_size
        )));
    }

    Ok(ValidationResult::Valid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::MemoryTxStore;
    use crate::point::Point;
    use crate::ecdsa::Signature;

    const RAW_TX: &str = "0100000001813f79011acb80925dfe69b3def355fe914bd1d96a3f5f71bf8303c6a989c7d1000000006b483045022100ed81ff192e75a3fd2304004dcadb746fa5e24c5031ccfcf21320b0277457c98f02207a986d955c6e0cb35d446a89d3f56100f4d7f67801c31967743a9c8e10615bed01210349fc4e631e3624a545de3f89f5d8684c7b8138bd94bdd531d2e213bf016b278afeffffff02a135ef01000000001976a914bc3b654dca7e56b04dca18f2566cdaf02e8d9ada88ac99c39800000000001976a9141c4bc762dd5423e332166702cb75f40df79fea1288ac19430600";

    fn raw_tx() -> Transaction {
        Transaction::parse(&hex::decode(RAW_TX).unwrap(), Network::Mainnet).unwrap()
    }

    #[test]
    fn test_parse_fields() {
        let tx = raw_tx();
        assert_eq!(tx.version, 1);
        assert!(!tx.segwit);
        assert_eq!(tx.inputs.len(), 1);
        assert_eq!(
            tx.inputs[0].prev_tx_id(),
            "d1c789a9c60383bf715f3f6ad9d14b91fe55f3deb369fe5d9280cb1a01793f81"
        );
        assert_eq!(tx.inputs[0].prev_index, 0);
        assert_eq!(tx.inputs[0].sequence, 0xfffffffe);
        assert_eq!(tx.outputs.len(), 2);
        assert_eq!(tx.outputs[0].amount, 32454049);
        assert_eq!(tx.outputs[1].amount, 10011545);
        assert_eq!(tx.lock_time, 410393);
    }

    #[test]
    fn test_serialize_and_id() {
        let tx = raw_tx();
        assert_eq!(hex::encode(tx.serialize()), RAW_TX);
        assert_eq!(
            tx.id(),
            "452c629d67e41baec3ac6f04fe744b4b9617f8f859c63b3002f8684e7a4fee03"
        );
    }

    #[test]
    fn test_legacy_sig_hash_and_signature() {
        let tx = raw_tx();
        let sec = match &tx.inputs[0].script_sig.commands[1] {
            Command::Data(sec) => sec.clone(),
            _ => panic!("expected sec push"),
        };
        let der = match &tx.inputs[0].script_sig.commands[0] {
            Command::Data(sig) => sig[..sig.len() - 1].to_vec(),
            _ => panic!("expected signature push"),
        };
        let point = Point::parse_sec(&sec).unwrap();
        let script_code = Script::p2pkh(&point.hash160(true).unwrap());
        let z = tx.sig_hash_legacy(0, &script_code).unwrap();
        assert_eq!(
            z.to_str_radix(16),
            "27e0c5994dec7824e56dec6b2fcb342eb7cdb0d0957c2fce9882f715e85d81a6"
        );
        let sig = Signature::parse_der(&der).unwrap();
        assert!(point.verify(&z, &sig).unwrap());
        assert!(tx.sig_hash_legacy(1, &script_code).is_err());
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut raw = hex::decode(RAW_TX).unwrap();
        raw.push(0x00);
        assert!(matches!(
            Transaction::parse(&raw, Network::Mainnet).unwrap_err(),
            ConsensusError::Malformed { .. }
        ));
    }

    #[test]
    fn test_truncated_transaction_rejected() {
        let raw = hex::decode(RAW_TX).unwrap();
        for cut in [3, 10, 50, raw.len() - 1] {
            assert!(Transaction::parse(&raw[..cut], Network::Mainnet).is_err());
        }
    }

    #[test]
    fn test_bad_segwit_flag() {
        let raw = hex::decode("010000000002").unwrap();
        let err = Transaction::parse(&raw, Network::Mainnet).unwrap_err();
        assert!(matches!(err, ConsensusError::Malformed { field: "segwit flag", .. }));
    }

    #[test]
    fn test_segwit_round_trip_keeps_id_witness_free() {
        let mut tx = raw_tx();
        tx.inputs[0].witness = vec![vec![0x01, 0x02], vec![]];
        tx.segwit = true;
        let raw = tx.serialize();
        assert_eq!(&raw[4..6], &[0x00, 0x01]);
        let parsed = Transaction::parse(&raw, Network::Mainnet).unwrap();
        assert_eq!(parsed, tx);
        assert_eq!(parsed.id(), raw_tx().id());
    }

    fn funding(store: &mut MemoryTxStore, outputs: Vec<TxOut>) -> Hash {
        let funding = Transaction::new(1, vec![TxIn::new([0x99; 32], 0)], outputs, 0, Network::Testnet);
        store.insert(&funding);
        funding.hash()
    }

    #[test]
    fn test_sign_and_verify_p2pkh() {
        let key = PrivateKey::new(BigUint::from(0xc0ffeeu32)).unwrap();
        let mut store = MemoryTxStore::new();
        let spk = Script::p2pkh(&key.public_point().hash160(true).unwrap());
        let prev = funding(&mut store, vec![TxOut::new(50_000, spk.clone())]);

        let mut tx = Transaction::new(1, vec![TxIn::new(prev, 0)], vec![TxOut::new(40_000, spk)], 0, Network::Testnet);
        assert!(!tx.verify(&store).unwrap());
        assert!(tx.sign_input(0, &key, &store).unwrap());
        assert_eq!(tx.fee(&store).unwrap(), 10_000);
        assert!(tx.verify(&store).unwrap());
        assert!(tx.verify(&store).unwrap());
    }

    #[test]
    fn test_sign_and_verify_p2wpkh() {
        let key = PrivateKey::new(BigUint::from(0xbeefu32)).unwrap();
        let mut store = MemoryTxStore::new();
        let spk = Script::p2wpkh(&key.public_point().hash160(true).unwrap());
        let prev = funding(&mut store, vec![TxOut::new(70_000, spk)]);

        let change = Script::p2pkh(&[0x55; 20]);
        let mut tx = Transaction::new(2, vec![TxIn::new(prev, 0)], vec![TxOut::new(60_000, change)], 0, Network::Testnet);
        assert!(tx.sign_input(0, &key, &store).unwrap());
        assert!(tx.segwit);
        assert!(tx.inputs[0].script_sig.is_empty());

        let reparsed = Transaction::parse(&tx.serialize(), Network::Testnet).unwrap();
        assert!(reparsed.verify(&store).unwrap());

        // Any change to the outputs invalidates the signature
        let mut tampered = reparsed.clone();
        tampered.outputs[0].amount = 10_000;
        assert!(!tampered.verify(&store).unwrap());
    }

    #[test]
    fn test_negative_fee_fails() {
        let key = PrivateKey::new(BigUint::from(77u32)).unwrap();
        let mut store = MemoryTxStore::new();
        let spk = Script::p2pkh(&key.public_point().hash160(true).unwrap());
        let prev = funding(&mut store, vec![TxOut::new(1_000, spk.clone())]);
        let mut tx = Transaction::new(1, vec![TxIn::new(prev, 0)], vec![TxOut::new(2_000, spk)], 0, Network::Testnet);
        assert!(tx.sign_input(0, &key, &store).unwrap());
        assert_eq!(tx.fee(&store).unwrap(), -1_000);
        assert!(!tx.verify(&store).unwrap());
    }

    #[test]
    fn test_fee_sums_without_wrapping() {
        let mut store = MemoryTxStore::new();
        let prev = funding(&mut store, vec![TxOut::new(1_000, Script::p2pkh(&[0x21; 20]))]);
        let outputs = vec![
            TxOut::new(u64::MAX, Script::default()),
            TxOut::new(u64::MAX, Script::default()),
        ];
        let tx = Transaction::new(1, vec![TxIn::new(prev, 0)], outputs, 0, Network::Testnet);
        assert_eq!(tx.fee(&store).unwrap(), 1_000 - 2 * i128::from(u64::MAX));
        assert!(!tx.verify(&store).unwrap());

        let outputs = vec![
            TxOut::new(i64::MAX as u64, Script::default()),
            TxOut::new(1, Script::default()),
        ];
        let tx = Transaction::new(1, vec![TxIn::new(prev, 0)], outputs, 0, Network::Testnet);
        assert!(tx.fee(&store).unwrap() < 0);
        assert!(!tx.verify(&store).unwrap());
    }

    #[test]
    fn test_legacy_signatures_survive_signing_other_inputs() {
        let key = PrivateKey::new(BigUint::from(0x5151u32)).unwrap();
        let mut store = MemoryTxStore::new();
        let spk = Script::p2pkh(&key.public_point().hash160(true).unwrap());
        let prev = funding(
            &mut store,
            vec![TxOut::new(30_000, spk.clone()), TxOut::new(20_000, spk.clone())],
        );
        let mut tx = Transaction::new(
            1,
            vec![TxIn::new(prev, 0), TxIn::new(prev, 1)],
            vec![TxOut::new(45_000, spk.clone())],
            0,
            Network::Testnet,
        );

        assert!(tx.sign_input(0, &key, &store).unwrap());
        let first_digest = tx.sig_hash_legacy(0, &spk).unwrap();
        assert!(tx.sign_input(1, &key, &store).unwrap());
        assert_eq!(tx.sig_hash_legacy(0, &spk).unwrap(), first_digest);
        assert!(tx.verify_input(0, &store, STANDARD_VERIFY_FLAGS).unwrap());
        assert!(tx.verify(&store).unwrap());
    }

    #[test]
    fn test_oversized_script_pubkey_fails() {
        let spend = |store: &MemoryTxStore, prev: Hash| {
            let tx = Transaction::new(1, vec![TxIn::new(prev, 0)], vec![TxOut::new(100, Script::default())], 0, Network::Testnet);
            tx.verify_input(0, store, STANDARD_VERIFY_FLAGS).unwrap()
        };
        let pushes = |count: usize| {
            let mut commands = vec![Command::Data(vec![0u8; MAX_SCRIPT_ELEMENT_SIZE]); count];
            commands.push(Command::Op(0x51));
            Script::new(commands)
        };

        let mut store = MemoryTxStore::new();
        let fits = pushes(19);
        assert!(fits.raw_serialize().len() <= MAX_SCRIPT_SIZE);
        let prev = funding(&mut store, vec![TxOut::new(1_000, fits)]);
        assert!(spend(&store, prev));

        let oversized = pushes(20);
        assert!(oversized.raw_serialize().len() > MAX_SCRIPT_SIZE);
        let prev = funding(&mut store, vec![TxOut::new(1_000, oversized)]);
        assert!(!spend(&store, prev));
    }

    #[test]
    fn test_wide_push_keeps_transaction_id() {
        let mut raw = hex::decode("0100000001").unwrap();
        raw.extend_from_slice(&[0x11; 32]);
        raw.extend_from_slice(&hex::decode("00000000034c01abffffffff01e8030000000000000000000000").unwrap());
        let tx = Transaction::parse(&raw, Network::Mainnet).unwrap();
        assert!(matches!(tx.inputs[0].script_sig.commands[0], Command::PushData { opcode: 0x4c, .. }));
        assert_eq!(tx.serialize(), raw);

        let mut expected = hash256(&raw);
        expected.reverse();
        assert_eq!(tx.id(), hex::encode(expected));

        let mut store = MemoryTxStore::new();
        store.insert_raw(Network::Mainnet, &tx.id(), raw);
        assert_eq!(fetch_transaction(&store, &tx.id(), Network::Mainnet).unwrap(), tx);
    }

    #[test]
    fn test_missing_prev_output() {
        let mut store = MemoryTxStore::new();
        let prev = funding(&mut store, vec![TxOut::new(1, Script::p2pkh(&[0; 20]))]);
        let tx = Transaction::new(1, vec![TxIn::new(prev, 3)], vec![], 0, Network::Testnet);
        assert!(matches!(
            tx.verify_input(0, &store, STANDARD_VERIFY_FLAGS).unwrap_err(),
            ConsensusError::TransactionValidation(_)
        ));
        let unknown = Transaction::new(1, vec![TxIn::new([0x42; 32], 0)], vec![], 0, Network::Testnet);
        assert!(matches!(
            unknown.verify_input(0, &store, STANDARD_VERIFY_FLAGS).unwrap_err(),
            ConsensusError::UtxoNotFound(_)
        ));
    }

    #[test]
    fn test_coinbase_height() {
        let mut input = TxIn::new([0u8; 32], 0xffffffff);
        input.script_sig = Script::new(vec![Command::Data(vec![0x5e, 0x76, 0x06])]);
        let tx = Transaction::new(1, vec![input], vec![TxOut::new(0, Script::default())], 0, Network::Mainnet);
        assert!(tx.is_coinbase());
        assert_eq!(tx.coinbase_height(), Some(0x06765e));
        assert!(!raw_tx().is_coinbase());
        assert_eq!(raw_tx().coinbase_height(), None);
    }

    #[test]
    fn test_check_transaction() {
        assert_eq!(check_transaction(&raw_tx()).unwrap(), ValidationResult::Valid);

        let mut empty = raw_tx();
        empty.outputs.clear();
        assert!(matches!(check_transaction(&empty).unwrap(), ValidationResult::Invalid(_)));

        let mut rich = raw_tx();
        rich.outputs[0].amount = MAX_MONEY + 1;
        assert!(matches!(check_transaction(&rich).unwrap(), ValidationResult::Invalid(_)));

        let mut overflow = raw_tx();
        overflow.outputs[0].amount = MAX_MONEY;
        overflow.outputs[1].amount = 1;
        assert!(matches!(check_transaction(&overflow).unwrap(), ValidationResult::Invalid(_)));
    }
}
