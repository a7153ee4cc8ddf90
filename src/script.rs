//! Script model, codec and standard templates
//!
//! A script is a sequence of commands, each either an opcode byte or a data
//! push. Evaluation lives in [`crate::interpreter`].

use crate::base58::{decode_base58_checksum, encode_base58_checksum};
use crate::codec::{encode_varint, ByteReader};
use crate::constants::MAX_PUBKEYS_PER_MULTISIG;
use crate::error::{ConsensusError, Result};
use crate::interpreter::ScriptProgram;
use crate::opcodes::{opcode_name, Opcode};
use crate::types::*;
use bech32::{segwit, Hrp};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single script element
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    Op(u8),
    /// Data written with the shortest push for its length
    Data(ByteString),
    /// Data written with a wider `OP_PUSHDATA1/2/4` than its length needs.
    /// The opcode is kept so the script serialises back to the same bytes.
    PushData { opcode: u8, data: ByteString },
}

impl Command {
    pub fn op(opcode: Opcode) -> Command {
        Command::Op(opcode.byte())
    }

    pub fn is_op(&self, opcode: Opcode) -> bool {
        matches!(self, Command::Op(b) if *b == opcode.byte())
    }

    pub fn data(&self) -> Option<&[u8]> {
        match self {
            Command::Data(d) | Command::PushData { data: d, .. } => Some(d.as_slice()),
            Command::Op(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Script {
    pub commands: Vec<Command>,
}

impl Script {
    pub fn new(commands: Vec<Command>) -> Script {
        Script { commands }
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Parse a varint-length-prefixed script
    pub fn parse(reader: &mut ByteReader<'_>) -> Result<Script> {
        let bytes = reader.read_var_bytes("script")?;
        Script::parse_raw(bytes)
    }

    /// Parse a script without a length prefix
    pub fn parse_raw(bytes: &[u8]) -> Result<Script> {
        let mut reader = ByteReader::new(bytes);
        let mut commands = Vec::new();
        while !reader.is_empty() {
            let byte = reader.read_u8("script opcode")?;
            let command = match byte {
                0x01..=0x4b => Command::Data(reader.read_bytes(byte as usize, "script push")?.to_vec()),
                0x4c => {
                    let len = reader.read_u8("script pushdata1 length")? as usize;
                    push_command(byte, reader.read_bytes(len, "script pushdata1")?)
                }
                0x4d => {
                    let len = reader.read_u16_le("script pushdata2 length")? as usize;
                    push_command(byte, reader.read_bytes(len, "script pushdata2")?)
                }
                0x4e => {
                    let len = reader.read_u32_le("script pushdata4 length")? as usize;
                    push_command(byte, reader.read_bytes(len, "script pushdata4")?)
                }
                op => Command::Op(op),
            };
            commands.push(command);
        }
        Ok(Script { commands })
    }

    /// Serialise without the length prefix. `Data` uses the smallest push
    /// for its length; `PushData` keeps its recorded opcode.
    pub fn raw_serialize(&self) -> ByteString {
        let mut out = Vec::new();
        for command in &self.commands {
            match command {
                Command::Op(op) => out.push(*op),
                Command::Data(data) => {
                    write_push(&mut out, minimal_push_opcode(data.len()), data);
                }
                Command::PushData { opcode, data } => write_push(&mut out, *opcode, data),
            }
        }
        out
    }

    /// Serialise with a varint length prefix
    pub fn serialize(&self) -> ByteString {
        let raw = self.raw_serialize();
        let mut out = encode_varint(raw.len() as u64);
        out.extend_from_slice(&raw);
        out
    }

    /// `self` followed by `other`, as evaluated for an unlocking/locking pair
    pub fn combine(&self, other: &Script) -> Script {
        let mut commands = self.commands.clone();
        commands.extend(other.commands.iter().cloned());
        Script { commands }
    }

    /// Evaluate against the signature hash `z`
    pub fn evaluate(&self, z: &BigUint, witness: &[ByteString], flags: u32) -> Result<bool> {
        ScriptProgram::new(self, z.clone(), witness, flags).run()
    }

    // ------------------------------------------------------------------
    // Templates
    // ------------------------------------------------------------------

    /// `OP_DUP OP_HASH160 <h160> OP_EQUALVERIFY OP_CHECKSIG`
    pub fn p2pkh(h160: &Hash160) -> Script {
        Script::new(vec![
            Command::op(Opcode::Dup),
            Command::op(Opcode::Hash160),
            Command::Data(h160.to_vec()),
            Command::op(Opcode::EqualVerify),
            Command::op(Opcode::CheckSig),
        ])
    }

    /// `OP_HASH160 <h160> OP_EQUAL`
    pub fn p2sh(h160: &Hash160) -> Script {
        Script::new(vec![
            Command::op(Opcode::Hash160),
            Command::Data(h160.to_vec()),
            Command::op(Opcode::Equal),
        ])
    }

    /// `OP_0 <h160>`
    pub fn p2wpkh(h160: &Hash160) -> Script {
        Script::new(vec![Command::op(Opcode::Op0), Command::Data(h160.to_vec())])
    }

    /// `OP_0 <sha256(witness script)>`
    pub fn p2wsh(h256: &Hash) -> Script {
        Script::new(vec![Command::op(Opcode::Op0), Command::Data(h256.to_vec())])
    }

    /// `OP_m <keys...> OP_n OP_CHECKMULTISIG` over SEC-encoded keys
    pub fn multisig(m: usize, pubkeys: &[ByteString]) -> Result<Script> {
        let n = pubkeys.len();
        if m == 0 || m > n || n > 16 || n > MAX_PUBKEYS_PER_MULTISIG {
            return Err(ConsensusError::malformed(
                "multisig script",
                format!("cannot build {}-of-{} multisig", m, n),
            ));
        }
        let small = |v: usize| -> Result<Command> {
            Opcode::from_small_int(v as u8)
                .map(Command::op)
                .ok_or_else(|| ConsensusError::malformed("multisig script", "count out of range"))
        };
        let mut commands = vec![small(m)?];
        commands.extend(pubkeys.iter().cloned().map(Command::Data));
        commands.push(small(n)?);
        commands.push(Command::op(Opcode::CheckMultiSig));
        Ok(Script::new(commands))
    }

    // ------------------------------------------------------------------
    // Pattern detection
    // ------------------------------------------------------------------

    pub fn is_p2pkh(&self) -> bool {
        matches!(
            self.commands.as_slice(),
            [dup, hash, Command::Data(h), verify, check]
                if dup.is_op(Opcode::Dup)
                    && hash.is_op(Opcode::Hash160)
                    && h.len() == 20
                    && verify.is_op(Opcode::EqualVerify)
                    && check.is_op(Opcode::CheckSig)
        )
    }

    pub fn is_p2sh(&self) -> bool {
        matches!(
            self.commands.as_slice(),
            [hash, Command::Data(h), equal]
                if hash.is_op(Opcode::Hash160) && h.len() == 20 && equal.is_op(Opcode::Equal)
        )
    }

    pub fn is_p2wpkh(&self) -> bool {
        self.witness_program().map(|p| p.len() == 20).unwrap_or(false)
    }

    pub fn is_p2wsh(&self) -> bool {
        self.witness_program().map(|p| p.len() == 32).unwrap_or(false)
    }

    /// The program of a version 0 witness output
    pub fn witness_program(&self) -> Option<&[u8]> {
        match self.commands.as_slice() {
            [version, Command::Data(program)]
                if version.is_op(Opcode::Op0) && (program.len() == 20 || program.len() == 32) =>
            {
                Some(program.as_slice())
            }
            _ => None,
        }
    }

    /// Hash160 embedded in a P2PKH or P2SH script
    pub fn embedded_hash160(&self) -> Option<Hash160> {
        let data = if self.is_p2pkh() {
            self.commands[2].data()
        } else if self.is_p2sh() {
            self.commands[1].data()
        } else {
            None
        }?;
        let mut out = [0u8; 20];
        out.copy_from_slice(data);
        Some(out)
    }

    /// Base58Check address for P2PKH and P2SH scripts, bech32 for version 0
    /// witness programs
    pub fn address(&self, network: Network) -> Result<String> {
        if let Some(program) = self.witness_program() {
            return segwit::encode(segwit_hrp(network), segwit::VERSION_0, program)
                .map_err(|e| ConsensusError::malformed("segwit address", e.to_string()));
        }
        let prefix = if self.is_p2pkh() {
            network.p2pkh_prefix()
        } else if self.is_p2sh() {
            network.p2sh_prefix()
        } else {
            return Err(ConsensusError::UnsupportedOperation(
                "script has no standard address".to_string(),
            ));
        };
        let mut payload = vec![prefix];
        // Both templates were matched above, so the hash is present
        payload.extend_from_slice(&self.embedded_hash160().unwrap_or_default());
        Ok(encode_base58_checksum(&payload))
    }

    /// Locking script paying to an address, with the network it belongs to
    pub fn from_address(address: &str) -> Result<(Script, Network)> {
        let lower = address.to_ascii_lowercase();
        if lower.starts_with("bc1") || lower.starts_with("tb1") {
            return Script::from_segwit_address(address);
        }
        let payload = decode_base58_checksum(address)?;
        if payload.len() != 21 {
            return Err(ConsensusError::malformed(
                "address",
                format!("expected 21 byte payload, got {}", payload.len()),
            ));
        }
        let mut h160 = [0u8; 20];
        h160.copy_from_slice(&payload[1..]);
        let prefix = payload[0];
        for network in [Network::Mainnet, Network::Testnet] {
            if prefix == network.p2pkh_prefix() {
                return Ok((Script::p2pkh(&h160), network));
            }
            if prefix == network.p2sh_prefix() {
                return Ok((Script::p2sh(&h160), network));
            }
        }
        Err(ConsensusError::malformed(
            "address",
            format!("unknown version byte 0x{:02x}", prefix),
        ))
    }

    fn from_segwit_address(address: &str) -> Result<(Script, Network)> {
        let (hrp, version, program) = segwit::decode(address)
            .map_err(|e| ConsensusError::malformed("segwit address", e.to_string()))?;
        let network = if hrp == bech32::hrp::BC {
            Network::Mainnet
        } else if hrp == bech32::hrp::TB {
            Network::Testnet
        } else {
            return Err(ConsensusError::malformed(
                "segwit address",
                format!("unknown prefix {}", hrp),
            ));
        };
        if version != segwit::VERSION_0 {
            return Err(ConsensusError::UnsupportedOperation(format!(
                "witness version {} addresses",
                version.to_u8()
            )));
        }
        match program.len() {
            20 => {
                let mut h160 = [0u8; 20];
                h160.copy_from_slice(&program);
                Ok((Script::p2wpkh(&h160), network))
            }
            32 => {
                let mut h256 = [0u8; 32];
                h256.copy_from_slice(&program);
                Ok((Script::p2wsh(&h256), network))
            }
            len => Err(ConsensusError::malformed(
                "segwit address",
                format!("{} byte version 0 program", len),
            )),
        }
    }
}

fn segwit_hrp(network: Network) -> Hrp {
    match network {
        Network::Mainnet => bech32::hrp::BC,
        Network::Testnet => bech32::hrp::TB,
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .commands
            .iter()
            .map(|c| match c {
                Command::Op(op) => opcode_name(*op),
                Command::Data(d) | Command::PushData { data: d, .. } => hex::encode(d),
            })
            .collect();
        write!(f, "{}", parts.join(" "))
    }
}

/// Push opcode for `len` bytes of `Data`: the bare length up to 75, then the
/// narrowest `OP_PUSHDATA`; empty data is `OP_0`
fn minimal_push_opcode(len: usize) -> u8 {
    if len == 0 {
        Opcode::Op0.byte()
    } else if len <= 0x4b {
        len as u8
    } else if len <= 0xff {
        Opcode::PushData1.byte()
    } else if len <= 0xffff {
        Opcode::PushData2.byte()
    } else {
        Opcode::PushData4.byte()
    }
}

/// A parsed push, recording the opcode only when it is not the minimal one
fn push_command(opcode: u8, data: &[u8]) -> Command {
    if minimal_push_opcode(data.len()) == opcode {
        Command::Data(data.to_vec())
    } else {
        Command::PushData {
            opcode,
            data: data.to_vec(),
        }
    }
}

fn write_push(out: &mut ByteString, opcode: u8, data: &[u8]) {
    out.push(opcode);
    match opcode {
        0x4c => out.push(data.len() as u8),
        0x4d => out.extend_from_slice(&(data.len() as u16).to_le_bytes()),
        0x4e => out.extend_from_slice(&(data.len() as u32).to_le_bytes()),
        _ => {}
    }
    out.extend_from_slice(data);
}

/// Minimal little-endian script number with the sign in the top bit
pub fn encode_num(num: i64) -> ByteString {
    if num == 0 {
        return Vec::new();
    }
    let negative = num < 0;
    let mut abs = num.unsigned_abs();
    let mut out = Vec::new();
    while abs > 0 {
        out.push((abs & 0xff) as u8);
        abs >>= 8;
    }
    let last = out.len() - 1;
    if out[last] & 0x80 != 0 {
        out.push(if negative { 0x80 } else { 0x00 });
    } else if negative {
        out[last] |= 0x80;
    }
    out
}

/// Inverse of [`encode_num`] for up to 8 bytes
pub fn decode_num(bytes: &[u8]) -> Result<i64> {
    if bytes.len() > 8 {
        return Err(ConsensusError::malformed(
            "script number",
            format!("{} bytes is too long", bytes.len()),
        ));
    }
    let (last, rest) = match bytes.split_last() {
        Some(split) => split,
        None => return Ok(0),
    };
    let negative = last & 0x80 != 0;
    let mut result = (last & 0x7f) as i64;
    for b in rest.iter().rev() {
        result = (result << 8) | *b as i64;
    }
    Ok(if negative { -result } else { result })
}
