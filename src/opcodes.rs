//! Script opcodes
//!
//! Every assigned opcode byte has a variant; bytes outside the enumeration
//! fail to convert and are reported as unsupported operations.

use crate::error::{ConsensusError, Result};
use std::convert::TryFrom;
use std::fmt;

macro_rules! opcodes {
    ($($variant:ident = $byte:literal => $name:literal,)*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum Opcode {
            $($variant = $byte,)*
        }

        impl Opcode {
            /// Canonical `OP_*` name
            pub fn name(self) -> &'static str {
                match self {
                    $(Opcode::$variant => $name,)*
                }
            }

            /// Look an opcode up by its `OP_*` name
            pub fn from_name(name: &str) -> Option<Opcode> {
                match name {
                    $($name => Some(Opcode::$variant),)*
                    _ => None,
                }
            }
        }

        impl TryFrom<u8> for Opcode {
            type Error = ConsensusError;

            fn try_from(byte: u8) -> Result<Opcode> {
                match byte {
                    $($byte => Ok(Opcode::$variant),)*
                    other => Err(ConsensusError::UnsupportedOperation(format!(
                        "unassigned opcode 0x{:02x}",
                        other
                    ))),
                }
            }
        }
    };
}

opcodes! {
    Op0 = 0x00 => "OP_0",
    PushData1 = 0x4c => "OP_PUSHDATA1",
    PushData2 = 0x4d => "OP_PUSHDATA2",
    PushData4 = 0x4e => "OP_PUSHDATA4",
    Op1Negate = 0x4f => "OP_1NEGATE",
    Reserved = 0x50 => "OP_RESERVED",
    Op1 = 0x51 => "OP_1",
    Op2 = 0x52 => "OP_2",
    Op3 = 0x53 => "OP_3",
    Op4 = 0x54 => "OP_4",
    Op5 = 0x55 => "OP_5",
    Op6 = 0x56 => "OP_6",
    Op7 = 0x57 => "OP_7",
    Op8 = 0x58 => "OP_8",
    Op9 = 0x59 => "OP_9",
    Op10 = 0x5a => "OP_10",
    Op11 = 0x5b => "OP_11",
    Op12 = 0x5c => "OP_12",
    Op13 = 0x5d => "OP_13",
    Op14 = 0x5e => "OP_14",
    Op15 = 0x5f => "OP_15",
    Op16 = 0x60 => "OP_16",
    Nop = 0x61 => "OP_NOP",
    Ver = 0x62 => "OP_VER",
    If = 0x63 => "OP_IF",
    NotIf = 0x64 => "OP_NOTIF",
    VerIf = 0x65 => "OP_VERIF",
    VerNotIf = 0x66 => "OP_VERNOTIF",
    Else = 0x67 => "OP_ELSE",
    EndIf = 0x68 => "OP_ENDIF",
    Verify = 0x69 => "OP_VERIFY",
    Return = 0x6a => "OP_RETURN",
    ToAltStack = 0x6b => "OP_TOALTSTACK",
    FromAltStack = 0x6c => "OP_FROMALTSTACK",
    TwoDrop = 0x6d => "OP_2DROP",
    TwoDup = 0x6e => "OP_2DUP",
    ThreeDup = 0x6f => "OP_3DUP",
    TwoOver = 0x70 => "OP_2OVER",
    TwoRot = 0x71 => "OP_2ROT",
    TwoSwap = 0x72 => "OP_2SWAP",
    IfDup = 0x73 => "OP_IFDUP",
    Depth = 0x74 => "OP_DEPTH",
    Drop = 0x75 => "OP_DROP",
    Dup = 0x76 => "OP_DUP",
    Nip = 0x77 => "OP_NIP",
    Over = 0x78 => "OP_OVER",
    Pick = 0x79 => "OP_PICK",
    Roll = 0x7a => "OP_ROLL",
    Rot = 0x7b => "OP_ROT",
    Swap = 0x7c => "OP_SWAP",
    Tuck = 0x7d => "OP_TUCK",
    Cat = 0x7e => "OP_CAT",
    Substr = 0x7f => "OP_SUBSTR",
    Left = 0x80 => "OP_LEFT",
    Right = 0x81 => "OP_RIGHT",
    Size = 0x82 => "OP_SIZE",
    Invert = 0x83 => "OP_INVERT",
    And = 0x84 => "OP_AND",
    Or = 0x85 => "OP_OR",
    Xor = 0x86 => "OP_XOR",
    Equal = 0x87 => "OP_EQUAL",
    EqualVerify = 0x88 => "OP_EQUALVERIFY",
    Reserved1 = 0x89 => "OP_RESERVED1",
    Reserved2 = 0x8a => "OP_RESERVED2",
    OneAdd = 0x8b => "OP_1ADD",
    OneSub = 0x8c => "OP_1SUB",
    TwoMul = 0x8d => "OP_2MUL",
    TwoDiv = 0x8e => "OP_2DIV",
    Negate = 0x8f => "OP_NEGATE",
    Abs = 0x90 => "OP_ABS",
    Not = 0x91 => "OP_NOT",
    ZeroNotEqual = 0x92 => "OP_0NOTEQUAL",
    Add = 0x93 => "OP_ADD",
    Sub = 0x94 => "OP_SUB",
    Mul = 0x95 => "OP_MUL",
    Div = 0x96 => "OP_DIV",
    Mod = 0x97 => "OP_MOD",
    LShift = 0x98 => "OP_LSHIFT",
    RShift = 0x99 => "OP_RSHIFT",
    BoolAnd = 0x9a => "OP_BOOLAND",
    BoolOr = 0x9b => "OP_BOOLOR",
    NumEqual = 0x9c => "OP_NUMEQUAL",
    NumEqualVerify = 0x9d => "OP_NUMEQUALVERIFY",
    NumNotEqual = 0x9e => "OP_NUMNOTEQUAL",
    LessThan = 0x9f => "OP_LESSTHAN",
    GreaterThan = 0xa0 => "OP_GREATERTHAN",
    LessThanOrEqual = 0xa1 => "OP_LESSTHANOREQUAL",
    GreaterThanOrEqual = 0xa2 => "OP_GREATERTHANOREQUAL",
    Min = 0xa3 => "OP_MIN",
    Max = 0xa4 => "OP_MAX",
    Within = 0xa5 => "OP_WITHIN",
    Ripemd160 = 0xa6 => "OP_RIPEMD160",
    Sha1 = 0xa7 => "OP_SHA1",
    Sha256 = 0xa8 => "OP_SHA256",
    Hash160 = 0xa9 => "OP_HASH160",
    Hash256 = 0xaa => "OP_HASH256",
    CodeSeparator = 0xab => "OP_CODESEPARATOR",
    CheckSig = 0xac => "OP_CHECKSIG",
    CheckSigVerify = 0xad => "OP_CHECKSIGVERIFY",
    CheckMultiSig = 0xae => "OP_CHECKMULTISIG",
    CheckMultiSigVerify = 0xaf => "OP_CHECKMULTISIGVERIFY",
    Nop1 = 0xb0 => "OP_NOP1",
    CheckLockTimeVerify = 0xb1 => "OP_CHECKLOCKTIMEVERIFY",
    CheckSequenceVerify = 0xb2 => "OP_CHECKSEQUENCEVERIFY",
    Nop4 = 0xb3 => "OP_NOP4",
    Nop5 = 0xb4 => "OP_NOP5",
    Nop6 = 0xb5 => "OP_NOP6",
    Nop7 = 0xb6 => "OP_NOP7",
    Nop8 = 0xb7 => "OP_NOP8",
    Nop9 = 0xb8 => "OP_NOP9",
    Nop10 = 0xb9 => "OP_NOP10",
}

impl Opcode {
    pub fn byte(self) -> u8 {
        self as u8
    }

    /// The value pushed by `OP_1NEGATE`, `OP_0` and `OP_1` to `OP_16`
    pub fn small_int(self) -> Option<i64> {
        match self {
            Opcode::Op0 => Some(0),
            Opcode::Op1Negate => Some(-1),
            op if (Opcode::Op1 as u8..=Opcode::Op16 as u8).contains(&(op as u8)) => {
                Some((op as u8 - Opcode::Op1 as u8 + 1) as i64)
            }
            _ => None,
        }
    }

    /// `OP_n` for `n` in `0..=16`
    pub fn from_small_int(n: u8) -> Option<Opcode> {
        match n {
            0 => Some(Opcode::Op0),
            1..=16 => Opcode::try_from(Opcode::Op1 as u8 + n - 1).ok(),
            _ => None,
        }
    }
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> u8 {
        op as u8
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// ASM name of an opcode byte, including bytes without an assigned opcode
pub fn opcode_name(byte: u8) -> String {
    match Opcode::try_from(byte) {
        Ok(op) => op.name().to_string(),
        Err(_) => format!("OP_UNKNOWN_0x{:02x}", byte),
    }
}
