//! Script execution engine
//!
//! A [`ScriptProgram`] owns a command queue and two stacks. Commands are
//! dequeued one at a time; data is pushed, opcodes are dispatched through the
//! closed [`Opcode`] enumeration. Two rewrites splice new commands into the
//! queue while running:
//!
//! - after a data push, if the rest of the queue is exactly
//!   `OP_HASH160 <20 bytes> OP_EQUAL`, a P2SH step is scheduled that checks
//!   the redeem script on top of the stack and then runs it;
//! - when the queue is fresh (program start, after a P2SH splice) and is a
//!   version 0 witness program, it is replaced by the witness items followed
//!   by the script the program commits to.
//!
//! A failing opcode ends evaluation with `Ok(false)`. Opcodes this engine
//! does not implement end it with [`ConsensusError::UnsupportedOperation`].

use crate::constants::*;
use crate::ecdsa::Signature;
use crate::error::{ConsensusError, Result};
use crate::hashes::{hash160, hash256, ripemd160, sha256};
use crate::opcodes::Opcode;
use crate::point::Point;
use crate::script::{decode_num, encode_num, Command, Script};
use crate::types::ByteString;
use num_bigint::BigUint;
use std::collections::VecDeque;
use std::convert::TryFrom;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Instruction {
    Command(Command),
    /// Synthetic step verifying and expanding a P2SH redeem script
    P2sh,
}

/// Interpreter state for one evaluation
#[derive(Debug, Clone)]
pub struct ScriptProgram {
    stack: Vec<ByteString>,
    alt_stack: Vec<ByteString>,
    commands: VecDeque<Instruction>,
    witness: Vec<ByteString>,
    z: BigUint,
    flags: u32,
    op_count: usize,
}

impl ScriptProgram {
    pub fn new(script: &Script, z: BigUint, witness: &[ByteString], flags: u32) -> ScriptProgram {
        ScriptProgram {
            stack: Vec::new(),
            alt_stack: Vec::new(),
            commands: script.commands.iter().cloned().map(Instruction::Command).collect(),
            witness: witness.to_vec(),
            z,
            flags,
            op_count: 0,
        }
    }

    pub fn stack(&self) -> &[ByteString] {
        &self.stack
    }

    fn flag(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }

    /// Run to completion
    pub fn run(mut self) -> Result<bool> {
        if !self.expand_witness_program() {
            return Ok(false);
        }
        while let Some(instruction) = self.commands.pop_front() {
            let ok = match instruction {
                Instruction::Command(Command::Data(data))
                | Instruction::Command(Command::PushData { data, .. }) => self.push_data(data),
                Instruction::Command(Command::Op(byte)) => {
                    let op = Opcode::try_from(byte)?;
                    if op.byte() > Opcode::Op16.byte() {
                        self.op_count += 1;
                    }
                    let ok = self.execute(op)?;
                    if !ok {
                        log::debug!("script failed at {}", op);
                    }
                    ok
                }
                Instruction::P2sh => self.execute_p2sh()?,
            };
            if !ok {
                return Ok(false);
            }
            if self.op_count > MAX_SCRIPT_OPS {
                log::debug!("script exceeded {} operations", MAX_SCRIPT_OPS);
                return Ok(false);
            }
            if self.stack.len() + self.alt_stack.len() > MAX_STACK_SIZE {
                log::debug!("script exceeded stack size {}", MAX_STACK_SIZE);
                return Ok(false);
            }
        }
        Ok(self.stack.last().map(|top| cast_to_bool(top)).unwrap_or(false))
    }

    fn push_data(&mut self, data: ByteString) -> bool {
        if data.len() > MAX_SCRIPT_ELEMENT_SIZE {
            log::debug!("push of {} bytes exceeds element limit", data.len());
            return false;
        }
        self.stack.push(data);
        if self.flag(VERIFY_P2SH) && self.p2sh_pending() {
            self.commands.push_front(Instruction::P2sh);
        }
        true
    }

    /// The remaining queue is exactly `OP_HASH160 <20 bytes> OP_EQUAL`
    fn p2sh_pending(&self) -> bool {
        if self.commands.len() != 3 {
            return false;
        }
        matches!(
            (&self.commands[0], &self.commands[1], &self.commands[2]),
            (
                Instruction::Command(hash),
                Instruction::Command(Command::Data(h)),
                Instruction::Command(equal),
            ) if hash.is_op(Opcode::Hash160) && h.len() == 20 && equal.is_op(Opcode::Equal)
        )
    }

    fn execute_p2sh(&mut self) -> Result<bool> {
        let expected = match (self.commands.pop_front(), self.commands.pop_front(), self.commands.pop_front()) {
            (_, Some(Instruction::Command(Command::Data(h))), _) => h,
            _ => return Ok(false),
        };
        let redeem = match self.stack.pop() {
            Some(redeem) => redeem,
            None => return Ok(false),
        };
        if redeem.len() > MAX_SCRIPT_SIZE {
            log::debug!("redeem script is {} bytes, over {}", redeem.len(), MAX_SCRIPT_SIZE);
            return Ok(false);
        }
        if hash160(&redeem)[..] != expected[..] {
            log::debug!("redeem script does not match p2sh hash");
            return Ok(false);
        }
        let script = match Script::parse_raw(&redeem) {
            Ok(script) => script,
            Err(e) => {
                log::debug!("unparseable redeem script: {}", e);
                return Ok(false);
            }
        };
        log::debug!("running p2sh redeem script {}", script);
        self.commands
            .extend(script.commands.into_iter().map(Instruction::Command));
        Ok(self.expand_witness_program())
    }

    /// Replace a version 0 witness program with the script it commits to.
    /// Returns false when the witness does not satisfy the commitment.
    fn expand_witness_program(&mut self) -> bool {
        if !self.flag(VERIFY_WITNESS) || self.commands.len() != 2 {
            return true;
        }
        let program = match (&self.commands[0], &self.commands[1]) {
            (Instruction::Command(version), Instruction::Command(Command::Data(program)))
                if version.is_op(Opcode::Op0) =>
            {
                program.clone()
            }
            _ => return true,
        };
        let expanded = match program.len() {
            20 => {
                let mut h160 = [0u8; 20];
                h160.copy_from_slice(&program);
                log::debug!("expanding p2wpkh program {}", hex::encode(&program));
                let mut commands: Vec<Command> =
                    self.witness.iter().cloned().map(Command::Data).collect();
                commands.extend(Script::p2pkh(&h160).commands);
                commands
            }
            32 => {
                let (witness_script, items) = match self.witness.split_last() {
                    Some(split) => split,
                    None => return false,
                };
                if witness_script.len() > MAX_SCRIPT_SIZE {
                    log::debug!("witness script is {} bytes, over {}", witness_script.len(), MAX_SCRIPT_SIZE);
                    return false;
                }
                if sha256(witness_script)[..] != program[..] {
                    log::debug!("witness script does not match p2wsh program");
                    return false;
                }
                let script = match Script::parse_raw(witness_script) {
                    Ok(script) => script,
                    Err(e) => {
                        log::debug!("unparseable witness script: {}", e);
                        return false;
                    }
                };
                log::debug!("expanding p2wsh program to {}", script);
                let mut commands: Vec<Command> = items.iter().cloned().map(Command::Data).collect();
                commands.extend(script.commands);
                commands
            }
            _ => return true,
        };
        self.commands = expanded.into_iter().map(Instruction::Command).collect();
        true
    }

    fn pop(&mut self) -> Option<ByteString> {
        self.stack.pop()
    }

    /// Pop a number of at most four bytes
    fn pop_num(&mut self) -> Option<i64> {
        let bytes = self.stack.pop()?;
        if bytes.len() > MAX_NUM_SIZE {
            return None;
        }
        decode_num(&bytes).ok()
    }

    fn push_num(&mut self, n: i64) {
        self.stack.push(encode_num(n));
    }

    fn push_bool(&mut self, b: bool) {
        self.push_num(b as i64);
    }

    /// Copy of the item `depth` places below the top
    fn peek(&self, depth: usize) -> Option<ByteString> {
        let len = self.stack.len();
        if depth < len {
            Some(self.stack[len - 1 - depth].clone())
        } else {
            None
        }
    }

    fn unary(&mut self, f: impl Fn(i64) -> i64) -> bool {
        match self.pop_num() {
            Some(a) => {
                self.push_num(f(a));
                true
            }
            None => false,
        }
    }

    fn binary(&mut self, f: impl Fn(i64, i64) -> i64) -> bool {
        let b = match self.pop_num() {
            Some(b) => b,
            None => return false,
        };
        match self.pop_num() {
            Some(a) => {
                self.push_num(f(a, b));
                true
            }
            None => false,
        }
    }

    fn verify_top(&mut self) -> bool {
        match self.pop() {
            Some(top) => cast_to_bool(&top),
            None => false,
        }
    }

    fn execute(&mut self, op: Opcode) -> Result<bool> {
        let ok = match op {
            // Constants
            Opcode::Op0 => {
                self.stack.push(Vec::new());
                true
            }
            Opcode::Op1Negate
            | Opcode::Op1
            | Opcode::Op2
            | Opcode::Op3
            | Opcode::Op4
            | Opcode::Op5
            | Opcode::Op6
            | Opcode::Op7
            | Opcode::Op8
            | Opcode::Op9
            | Opcode::Op10
            | Opcode::Op11
            | Opcode::Op12
            | Opcode::Op13
            | Opcode::Op14
            | Opcode::Op15
            | Opcode::Op16 => {
                self.push_num(op.small_int().unwrap_or_default());
                true
            }

            // Flow control
            Opcode::Nop
            | Opcode::Nop1
            | Opcode::Nop4
            | Opcode::Nop5
            | Opcode::Nop6
            | Opcode::Nop7
            | Opcode::Nop8
            | Opcode::Nop9
            | Opcode::Nop10 => true,
            Opcode::If | Opcode::NotIf => self.execute_if(op == Opcode::If),
            // Reached only when unbalanced
            Opcode::Else | Opcode::EndIf => false,
            Opcode::Verify => self.verify_top(),
            Opcode::Return => false,

            // Stack
            Opcode::ToAltStack => match self.pop() {
                Some(item) => {
                    self.alt_stack.push(item);
                    true
                }
                None => false,
            },
            Opcode::FromAltStack => match self.alt_stack.pop() {
                Some(item) => {
                    self.stack.push(item);
                    true
                }
                None => false,
            },
            Opcode::TwoDrop => {
                if self.stack.len() < 2 {
                    return Ok(false);
                }
                self.stack.truncate(self.stack.len() - 2);
                true
            }
            Opcode::TwoDup => self.duplicate_top(2),
            Opcode::ThreeDup => self.duplicate_top(3),
            Opcode::TwoOver => match (self.peek(3), self.peek(2)) {
                (Some(a), Some(b)) => {
                    self.stack.push(a);
                    self.stack.push(b);
                    true
                }
                _ => false,
            },
            Opcode::TwoRot => {
                let len = self.stack.len();
                if len < 6 {
                    return Ok(false);
                }
                let pair: Vec<ByteString> = self.stack.drain(len - 6..len - 4).collect();
                self.stack.extend(pair);
                true
            }
            Opcode::TwoSwap => {
                let len = self.stack.len();
                if len < 4 {
                    return Ok(false);
                }
                self.stack[len - 4..].rotate_left(2);
                true
            }
            Opcode::IfDup => match self.peek(0) {
                Some(top) => {
                    if cast_to_bool(&top) {
                        self.stack.push(top);
                    }
                    true
                }
                None => false,
            },
            Opcode::Depth => {
                let depth = self.stack.len() as i64;
                self.push_num(depth);
                true
            }
            Opcode::Drop => self.pop().is_some(),
            Opcode::Dup => match self.peek(0) {
                Some(top) => {
                    self.stack.push(top);
                    true
                }
                None => false,
            },
            Opcode::Nip => {
                let len = self.stack.len();
                if len < 2 {
                    return Ok(false);
                }
                self.stack.remove(len - 2);
                true
            }
            Opcode::Over => match self.peek(1) {
                Some(item) => {
                    self.stack.push(item);
                    true
                }
                None => false,
            },
            Opcode::Pick | Opcode::Roll => {
                let n = match self.pop_num() {
                    Some(n) if n >= 0 && (n as usize) < self.stack.len() => n as usize,
                    _ => return Ok(false),
                };
                let index = self.stack.len() - 1 - n;
                let item = if op == Opcode::Roll {
                    self.stack.remove(index)
                } else {
                    self.stack[index].clone()
                };
                self.stack.push(item);
                true
            }
            Opcode::Rot => {
                let len = self.stack.len();
                if len < 3 {
                    return Ok(false);
                }
                self.stack[len - 3..].rotate_left(1);
                true
            }
            Opcode::Swap => {
                let len = self.stack.len();
                if len < 2 {
                    return Ok(false);
                }
                self.stack.swap(len - 1, len - 2);
                true
            }
            Opcode::Tuck => {
                let len = self.stack.len();
                if len < 2 {
                    return Ok(false);
                }
                let top = self.stack[len - 1].clone();
                self.stack.insert(len - 2, top);
                true
            }
            Opcode::Size => match self.peek(0) {
                Some(top) => {
                    self.push_num(top.len() as i64);
                    true
                }
                None => false,
            },

            // Bitwise logic
            Opcode::Equal | Opcode::EqualVerify => {
                let (a, b) = match (self.pop(), self.pop()) {
                    (Some(a), Some(b)) => (a, b),
                    _ => return Ok(false),
                };
                if op == Opcode::EqualVerify {
                    a == b
                } else {
                    self.push_bool(a == b);
                    true
                }
            }

            // Arithmetic
            Opcode::OneAdd => self.unary(|a| a + 1),
            Opcode::OneSub => self.unary(|a| a - 1),
            Opcode::Negate => self.unary(|a| -a),
            Opcode::Abs => self.unary(|a| a.abs()),
            Opcode::Not => self.unary(|a| (a == 0) as i64),
            Opcode::ZeroNotEqual => self.unary(|a| (a != 0) as i64),
            Opcode::Add => self.binary(|a, b| a + b),
            Opcode::Sub => self.binary(|a, b| a - b),
            Opcode::BoolAnd => self.binary(|a, b| (a != 0 && b != 0) as i64),
            Opcode::BoolOr => self.binary(|a, b| (a != 0 || b != 0) as i64),
            Opcode::NumEqual => self.binary(|a, b| (a == b) as i64),
            Opcode::NumEqualVerify => self.binary(|a, b| (a == b) as i64) && self.verify_top(),
            Opcode::NumNotEqual => self.binary(|a, b| (a != b) as i64),
            Opcode::LessThan => self.binary(|a, b| (a < b) as i64),
            Opcode::GreaterThan => self.binary(|a, b| (a > b) as i64),
            Opcode::LessThanOrEqual => self.binary(|a, b| (a <= b) as i64),
            Opcode::GreaterThanOrEqual => self.binary(|a, b| (a >= b) as i64),
            Opcode::Min => self.binary(|a, b| a.min(b)),
            Opcode::Max => self.binary(|a, b| a.max(b)),
            Opcode::Within => match (self.pop_num(), self.pop_num(), self.pop_num()) {
                (Some(max), Some(min), Some(x)) => {
                    self.push_bool(min <= x && x < max);
                    true
                }
                _ => false,
            },

            // Crypto
            Opcode::Ripemd160 => self.hash_top(|d| ripemd160(d).to_vec()),
            Opcode::Sha256 => self.hash_top(|d| sha256(d).to_vec()),
            Opcode::Hash160 => self.hash_top(|d| hash160(d).to_vec()),
            Opcode::Hash256 => self.hash_top(|d| hash256(d).to_vec()),
            Opcode::CheckSig | Opcode::CheckSigVerify => {
                let (pubkey, sig) = match (self.pop(), self.pop()) {
                    (Some(pubkey), Some(sig)) => (pubkey, sig),
                    _ => return Ok(false),
                };
                let valid = self.check_sig(&sig, &pubkey)?;
                if op == Opcode::CheckSigVerify {
                    valid
                } else {
                    self.push_bool(valid);
                    true
                }
            }
            Opcode::CheckMultiSig | Opcode::CheckMultiSigVerify => match self.check_multisig()? {
                Some(valid) if op == Opcode::CheckMultiSigVerify => valid,
                Some(valid) => {
                    self.push_bool(valid);
                    true
                }
                None => false,
            },

            // Disabled, reserved and unimplemented
            Opcode::PushData1
            | Opcode::PushData2
            | Opcode::PushData4
            | Opcode::Reserved
            | Opcode::Ver
            | Opcode::VerIf
            | Opcode::VerNotIf
            | Opcode::Cat
            | Opcode::Substr
            | Opcode::Left
            | Opcode::Right
            | Opcode::Invert
            | Opcode::And
            | Opcode::Or
            | Opcode::Xor
            | Opcode::Reserved1
            | Opcode::Reserved2
            | Opcode::TwoMul
            | Opcode::TwoDiv
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Mod
            | Opcode::LShift
            | Opcode::RShift
            | Opcode::Sha1
            | Opcode::CodeSeparator
            | Opcode::CheckLockTimeVerify
            | Opcode::CheckSequenceVerify => {
                log::warn!("unsupported opcode {}", op);
                return Err(ConsensusError::UnsupportedOperation(op.name().to_string()));
            }
        };
        Ok(ok)
    }

    fn duplicate_top(&mut self, count: usize) -> bool {
        let len = self.stack.len();
        if len < count {
            return false;
        }
        let items: Vec<ByteString> = self.stack[len - count..].to_vec();
        self.stack.extend(items);
        true
    }

    fn hash_top(&mut self, f: impl Fn(&[u8]) -> ByteString) -> bool {
        match self.pop() {
            Some(item) => {
                self.stack.push(f(&item));
                true
            }
            None => false,
        }
    }

    /// Split the queue at the matching `OP_ENDIF` and keep the branch
    /// selected by the popped condition
    fn execute_if(&mut self, is_if: bool) -> bool {
        let mut true_branch = Vec::new();
        let mut false_branch = Vec::new();
        let mut in_true = true;
        let mut depth = 0usize;
        let mut found = false;
        while let Some(instruction) = self.commands.pop_front() {
            if let Instruction::Command(command) = &instruction {
                if command.is_op(Opcode::If) || command.is_op(Opcode::NotIf) {
                    depth += 1;
                } else if command.is_op(Opcode::EndIf) {
                    if depth == 0 {
                        found = true;
                        break;
                    }
                    depth -= 1;
                } else if command.is_op(Opcode::Else) && depth == 0 {
                    in_true = !in_true;
                    continue;
                }
            }
            if in_true {
                true_branch.push(instruction);
            } else {
                false_branch.push(instruction);
            }
        }
        if !found {
            log::debug!("unbalanced conditional");
            return false;
        }
        let condition = match self.pop() {
            Some(top) => cast_to_bool(&top),
            None => return false,
        };
        let branch = if condition == is_if { true_branch } else { false_branch };
        for instruction in branch.into_iter().rev() {
            self.commands.push_front(instruction);
        }
        true
    }

    /// Verify a DER signature with a trailing hash-type byte against a SEC
    /// public key. Anything unparseable is an invalid signature.
    fn check_sig(&self, sig: &[u8], pubkey: &[u8]) -> Result<bool> {
        let der = match sig.split_last() {
            Some((_hash_type, der)) => der,
            None => return Ok(false),
        };
        let point = match Point::parse_sec(pubkey) {
            Ok(point) => point,
            Err(e) => {
                log::debug!("checksig with bad public key: {}", e);
                return Ok(false);
            }
        };
        let signature = match Signature::parse_der(der) {
            Ok(signature) => signature,
            Err(e) => {
                log::debug!("checksig with bad signature: {}", e);
                return Ok(false);
            }
        };
        if self.flag(VERIFY_LOW_S) && !signature.is_low_s() {
            log::debug!("checksig rejected high-s signature");
            return Ok(false);
        }
        point.verify(&self.z, &signature)
    }

    /// `None` on stack underflow or bad counts, otherwise whether every
    /// signature matched a key in order
    fn check_multisig(&mut self) -> Result<Option<bool>> {
        let n = match self.pop_num() {
            Some(n) if n >= 0 && n as usize <= MAX_PUBKEYS_PER_MULTISIG => n as usize,
            _ => return Ok(None),
        };
        if self.stack.len() < n {
            return Ok(None);
        }
        self.op_count += n;
        let keys: Vec<ByteString> = self.stack.split_off(self.stack.len() - n);

        let m = match self.pop_num() {
            Some(m) if m >= 0 && m as usize <= n => m as usize,
            _ => return Ok(None),
        };
        if self.stack.len() < m {
            return Ok(None);
        }
        let sigs: Vec<ByteString> = self.stack.split_off(self.stack.len() - m);

        // Dummy element left by the CHECKMULTISIG off-by-one
        if self.pop().is_none() {
            return Ok(None);
        }

        let mut remaining_keys = keys.iter();
        for sig in &sigs {
            let mut matched = false;
            for key in remaining_keys.by_ref() {
                if self.check_sig(sig, key)? {
                    matched = true;
                    break;
                }
            }
            if !matched {
                return Ok(Some(false));
            }
        }
        Ok(Some(true))
    }
}

/// Stack truthiness: false for empty, all-zero and negative-zero values
pub fn cast_to_bool(bytes: &[u8]) -> bool {
    match bytes.split_last() {
        None => false,
        Some((last, rest)) => rest.iter().any(|b| *b != 0) || (*last != 0 && *last != 0x80),
    }
}
