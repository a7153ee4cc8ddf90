//! Segregated Witness: BIP143 signature hashing, witness serialisation and
//! transaction weight

use crate::codec::encode_varint;
use crate::constants::SIGHASH_ALL;
use crate::error::{ConsensusError, Result};
use crate::hashes::hash256;
use crate::script::Script;
use crate::transaction::{Transaction, TxIn};
use crate::types::*;
use num_bigint::BigUint;

/// Witness data: stack of witness elements for one input
pub type Witness = Vec<ByteString>;

/// Check if transaction carries any witness data
pub fn is_segwit_transaction(tx: &Transaction) -> bool {
    tx.inputs.iter().any(|input| !input.witness.is_empty())
}

/// hash256 of every input's outpoint
pub fn hash_prevouts(tx: &Transaction) -> Hash {
    let mut data = Vec::with_capacity(tx.inputs.len() * 36);
    for input in &tx.inputs {
        data.extend_from_slice(&input.outpoint_bytes());
    }
    hash256(&data)
}

/// hash256 of every input's sequence
pub fn hash_sequence(tx: &Transaction) -> Hash {
    let mut data = Vec::with_capacity(tx.inputs.len() * 4);
    for input in &tx.inputs {
        data.extend_from_slice(&input.sequence.to_le_bytes());
    }
    hash256(&data)
}

/// hash256 of every serialised output
pub fn hash_outputs(tx: &Transaction) -> Hash {
    let mut data = Vec::new();
    for output in &tx.outputs {
        data.extend_from_slice(&output.serialize());
    }
    hash256(&data)
}

/// BIP143 digest (SIGHASH_ALL) for input `index` spending `amount` satoshis
/// under `script_code`
pub fn sig_hash_bip143(
    tx: &Transaction,
    index: usize,
    script_code: &Script,
    amount: u64,
) -> Result<BigUint> {
    let input: &TxIn = tx.inputs.get(index).ok_or_else(|| {
        ConsensusError::TransactionValidation(format!(
            "input index {} out of range for {} inputs",
            index,
            tx.inputs.len()
        ))
    })?;
    let mut preimage = Vec::new();
    preimage.extend_from_slice(&tx.version.to_le_bytes());
    preimage.extend_from_slice(&hash_prevouts(tx));
    preimage.extend_from_slice(&hash_sequence(tx));
    preimage.extend_from_slice(&input.outpoint_bytes());
    preimage.extend_from_slice(&script_code.serialize());
    preimage.extend_from_slice(&amount.to_le_bytes());
    preimage.extend_from_slice(&input.sequence.to_le_bytes());
    preimage.extend_from_slice(&hash_outputs(tx));
    preimage.extend_from_slice(&tx.lock_time.to_le_bytes());
    preimage.extend_from_slice(&SIGHASH_ALL.to_le_bytes());
    Ok(BigUint::from_bytes_be(&hash256(&preimage)))
}

/// Serialise one input's witness stack
pub fn serialize_witness(witness: &[ByteString]) -> ByteString {
    let mut out = encode_varint(witness.len() as u64);
    for item in witness {
        out.extend_from_slice(&encode_varint(item.len() as u64));
        out.extend_from_slice(item);
    }
    out
}

/// Weight(tx) = 3 × |Serialize(tx ∖ witness)| + |Serialize(tx)|
pub fn transaction_weight(tx: &Transaction) -> usize {
    let base = tx.serialize_legacy().len();
    let total = tx.serialize().len();
    base * 3 + total
}

/// Weight divided by four, rounded up
pub fn virtual_size(tx: &Transaction) -> usize {
    (transaction_weight(tx) + 3) / 4
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TxOut;

    fn tx_with_witness(witness: Witness) -> Transaction {
        let mut input = TxIn::new([0xaa; 32], 1);
        input.witness = witness;
        Transaction::new(
            2,
            vec![input, TxIn::new([0xbb; 32], 0)],
            vec![TxOut::new(1000, Script::p2wpkh(&[0x01; 20]))],
            0,
            Network::Mainnet,
        )
    }

    #[test]
    fn test_weight_of_legacy_transaction() {
        let tx = tx_with_witness(vec![]);
        assert!(!is_segwit_transaction(&tx));
        assert_eq!(transaction_weight(&tx), tx.serialize().len() * 4);
    }

    #[test]
    fn test_witness_is_discounted() {
        let tx = tx_with_witness(vec![vec![0x01; 72], vec![0x02; 33]]);
        assert!(is_segwit_transaction(&tx));
        let base = tx.serialize_legacy().len();
        let total = tx.serialize().len();
        assert!(total > base);
        assert_eq!(transaction_weight(&tx), base * 3 + total);
        assert!(virtual_size(&tx) < total);
    }

    #[test]
    fn test_serialize_witness() {
        assert_eq!(serialize_witness(&[]), vec![0x00]);
        assert_eq!(serialize_witness(&[vec![0xab], vec![]]), vec![0x02, 0x01, 0xab, 0x00]);
    }

    #[test]
    fn test_bip143_commits_to_amount_and_index() {
        let tx = tx_with_witness(vec![]);
        let code = Script::p2pkh(&[0x01; 20]);
        let a = sig_hash_bip143(&tx, 0, &code, 1000).unwrap();
        assert_eq!(a, sig_hash_bip143(&tx, 0, &code, 1000).unwrap());
        assert_ne!(a, sig_hash_bip143(&tx, 0, &code, 1001).unwrap());
        assert_ne!(a, sig_hash_bip143(&tx, 1, &code, 1000).unwrap());
        assert!(sig_hash_bip143(&tx, 2, &code, 1000).is_err());
    }

    #[test]
    fn test_bip143_native_p2wpkh_vector() {
        // Unsigned transaction of the native P2WPKH example in BIP143
        let raw = hex::decode(
            "0100000002fff7f7881a8099afa6940d42d1e7f6362bec38171ea3edf433541db4e4ad969f00000000\
             00eeffffffef51e1b804cc89d182d279655c3aa89e815b1b309fe287d9b2b55d57b90ec68a01000000\
             00ffffffff02202cb206000000001976a9148280b37df378db99f66f85c95a783a76ac7a6d5988ac90\
             93510d000000001976a9143bde42dbee7e4dbe6a21b2d50ce2f0167faa815988ac11000000",
        )
        .unwrap();
        let tx = Transaction::parse(&raw, Network::Mainnet).unwrap();
        let mut h160 = [0u8; 20];
        h160.copy_from_slice(&hex::decode("1d0f172a0ecb48aee1be1f2687d2963ae33f71a1").unwrap());
        let z = sig_hash_bip143(&tx, 1, &Script::p2pkh(&h160), 600_000_000).unwrap();
        assert_eq!(
            z.to_str_radix(16),
            "c37af31116d1b27caf68aae9e3ac82f1477929014d5b917657d0eb49478cb670"
        );
    }

    #[test]
    fn test_bip143_ignores_other_witnesses() {
        let code = Script::p2pkh(&[0x01; 20]);
        let bare = tx_with_witness(vec![]);
        let witnessed = tx_with_witness(vec![vec![0x01; 10]]);
        assert_eq!(
            sig_hash_bip143(&bare, 1, &code, 5).unwrap(),
            sig_hash_bip143(&witnessed, 1, &code, 5).unwrap()
        );
    }
}
