//! Bitcoin consensus constants

/// Maximum money supply: 21,000,000 BTC in satoshis
pub const MAX_MONEY: u64 = 21_000_000 * SATOSHIS_PER_BTC;

/// Satoshis per BTC
pub const SATOSHIS_PER_BTC: u64 = 100_000_000;

/// Maximum transaction size: 1MB
pub const MAX_TX_SIZE: usize = 1_000_000;

/// Maximum number of inputs per transaction
pub const MAX_INPUTS: usize = 1000;

/// Maximum number of outputs per transaction
pub const MAX_OUTPUTS: usize = 1000;

/// Maximum script length
pub const MAX_SCRIPT_SIZE: usize = 10_000;

/// Maximum size of a single pushed stack element
pub const MAX_SCRIPT_ELEMENT_SIZE: usize = 520;

/// Maximum combined size of the main and alt stacks during execution
pub const MAX_STACK_SIZE: usize = 1000;

/// Maximum number of non-push operations in a script
pub const MAX_SCRIPT_OPS: usize = 201;

/// Maximum number of public keys in a CHECKMULTISIG
pub const MAX_PUBKEYS_PER_MULTISIG: usize = 20;

/// Numeric stack operands are limited to 4 bytes
pub const MAX_NUM_SIZE: usize = 4;

/// Sequence number for final transaction
pub const SEQUENCE_FINAL: u32 = 0xffffffff;

/// Only SIGHASH_ALL is produced and verified
pub const SIGHASH_ALL: u32 = 1;

// ============================================================================
// VERIFICATION FLAGS
// ============================================================================

/// Do not enable any optional verification.
pub const VERIFY_NONE: u32 = 0;
/// Evaluate P2SH (BIP16) redeem scripts.
pub const VERIFY_P2SH: u32 = 1 << 0;
/// Evaluate witness programs (BIP141/BIP143).
pub const VERIFY_WITNESS: u32 = 1 << 1;
/// Reject signatures whose s value is above N/2 (BIP62).
pub const VERIFY_LOW_S: u32 = 1 << 2;
/// Flags used when none are given explicitly.
pub const STANDARD_VERIFY_FLAGS: u32 = VERIFY_P2SH | VERIFY_WITNESS;

// ============================================================================
// SECP256K1
// ============================================================================

/// Field prime P = 2^256 - 2^32 - 977
pub const SECP256K1_P_HEX: &str =
    "fffffffffffffffffffffffffffffffffffffffffffffffffffffffefffffc2f";

/// Order of the generator
pub const SECP256K1_N_HEX: &str =
    "fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364141";

pub const SECP256K1_GX_HEX: &str =
    "79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";

pub const SECP256K1_GY_HEX: &str =
    "483ada7726a3c4655da4fbfc0e1108a8fd17b448a68554199c47d08ffb10d4b8";

pub const SECP256K1_A: u32 = 0;

pub const SECP256K1_B: u32 = 7;

// ============================================================================
// PROOF OF WORK
// ============================================================================

/// Difficulty adjustment interval: 2016 blocks
pub const DIFFICULTY_ADJUSTMENT_INTERVAL: u64 = 2016;

/// Target time per block: 10 minutes
pub const TARGET_TIME_PER_BLOCK: u64 = 600;

/// Two weeks, the expected duration of one adjustment interval
pub const TWO_WEEKS: u64 = DIFFICULTY_ADJUSTMENT_INTERVAL * TARGET_TIME_PER_BLOCK;

/// Compact form of the maximum target (minimum difficulty)
pub const MAX_TARGET_BITS: u32 = 0x1d00ffff;

/// Block header size on the wire
pub const BLOCK_HEADER_SIZE: usize = 80;
