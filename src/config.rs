//! Runtime verification configuration

use crate::constants::{VERIFY_LOW_S, VERIFY_NONE, VERIFY_P2SH, VERIFY_WITNESS};
use crate::error::{ConsensusError, Result};
use crate::types::Network;
use serde::{Deserialize, Serialize};

/// Which chain to parse for and which optional script rules to enforce
///
/// Missing JSON fields fall back to [`ConsensusConfig::default`]: mainnet,
/// P2SH and witness evaluation on, low-s not required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    pub network: Network,
    pub verify_p2sh: bool,
    pub verify_witness: bool,
    pub require_low_s: bool,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        ConsensusConfig {
            network: Network::Mainnet,
            verify_p2sh: true,
            verify_witness: true,
            require_low_s: false,
        }
    }
}

impl ConsensusConfig {
    /// Interpreter flag bits for this configuration
    pub fn flags(&self) -> u32 {
        let mut flags = VERIFY_NONE;
        if self.verify_p2sh {
            flags |= VERIFY_P2SH;
        }
        if self.verify_witness {
            flags |= VERIFY_WITNESS;
        }
        if self.require_low_s {
            flags |= VERIFY_LOW_S;
        }
        flags
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ConsensusError::Serialization(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| ConsensusError::Serialization(e.to_string()))
    }
}
