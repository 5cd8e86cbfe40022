//! Network and staking parameter configuration
//!
//! The core never reads the environment or the filesystem. Callers hand in
//! a [`BtcNetwork`] and a [`StakingParams`] value, typically parsed from a
//! TOML document with [`StakingParams::from_toml_str`].
//!
//! # Example
//!
//! ```toml
//! network = "signet"
//! covenant_pks = ["d45c70d2...", "4b15848e...", "23b29f89..."]
//! covenant_quorum = 2
//! slashing_pk_script = "76a914010101010101010101010101010101010101010188ac"
//! slashing_rate = "0.1"
//! min_slashing_tx_fee_sat = 1000
//! unbonding_fee_sat = 1000
//! unbonding_time_blocks = 101
//! min_staking_value_sat = 50000
//! max_staking_value_sat = 5000000000
//! min_staking_time_blocks = 10
//! max_staking_time_blocks = 65535
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use bitcoin::{Amount, CompactTarget, ScriptBuf, Target, XOnlyPublicKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{Error, Result};
use crate::tx::{SlashingPolicy, SlashingRate};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown network: {0}")]
    UnknownNetwork(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

// ============================================================================
// Bitcoin network parameters
// ============================================================================

/// Bitcoin network the staking transactions live on.
///
/// Selects the bech32 human readable part, the network magic and the
/// proof-of-work limit. Nothing else in the core depends on the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BtcNetwork {
    Mainnet,
    Testnet,
    Simnet,
    Regtest,
    Signet,
}

impl FromStr for BtcNetwork {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" | "main" | "bitcoin" => Ok(BtcNetwork::Mainnet),
            "testnet" | "test" | "testnet3" => Ok(BtcNetwork::Testnet),
            "simnet" => Ok(BtcNetwork::Simnet),
            "regtest" => Ok(BtcNetwork::Regtest),
            "signet" => Ok(BtcNetwork::Signet),
            _ => Err(ConfigError::UnknownNetwork(s.to_string())),
        }
    }
}

impl fmt::Display for BtcNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BtcNetwork::Mainnet => "mainnet",
            BtcNetwork::Testnet => "testnet",
            BtcNetwork::Simnet => "simnet",
            BtcNetwork::Regtest => "regtest",
            BtcNetwork::Signet => "signet",
        };
        f.write_str(name)
    }
}

impl BtcNetwork {
    /// Human readable part of segwit addresses
    pub fn bech32_hrp(&self) -> &'static str {
        match self {
            BtcNetwork::Mainnet => "bc",
            BtcNetwork::Testnet | BtcNetwork::Signet => "tb",
            BtcNetwork::Simnet => "sb",
            BtcNetwork::Regtest => "bcrt",
        }
    }

    /// P2P network magic
    pub fn magic(&self) -> u32 {
        match self {
            BtcNetwork::Mainnet => 0xd9b4_bef9,
            BtcNetwork::Testnet => 0x0709_110b,
            BtcNetwork::Simnet => 0x1214_1c16,
            BtcNetwork::Regtest => 0xdab5_bffa,
            BtcNetwork::Signet => 0x40cf_030a,
        }
    }

    /// Proof-of-work limit in compact form
    pub fn pow_limit_bits(&self) -> CompactTarget {
        let bits = match self {
            BtcNetwork::Mainnet | BtcNetwork::Testnet => 0x1d00_ffff,
            BtcNetwork::Simnet | BtcNetwork::Regtest => 0x207f_ffff,
            BtcNetwork::Signet => 0x1e03_77ae,
        };
        CompactTarget::from_consensus(bits)
    }

    /// Proof-of-work limit
    pub fn pow_limit(&self) -> Target {
        Target::from_compact(self.pow_limit_bits())
    }

    /// Matching rust-bitcoin network, if rust-bitcoin knows it
    pub fn to_bitcoin_network(&self) -> Option<bitcoin::Network> {
        match self {
            BtcNetwork::Mainnet => Some(bitcoin::Network::Bitcoin),
            BtcNetwork::Testnet => Some(bitcoin::Network::Testnet),
            BtcNetwork::Regtest => Some(bitcoin::Network::Regtest),
            BtcNetwork::Signet => Some(bitcoin::Network::Signet),
            BtcNetwork::Simnet => None,
        }
    }
}

// ============================================================================
// Staking parameters
// ============================================================================

/// Chain-wide parameters a delegation is validated against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakingParams {
    pub network: BtcNetwork,
    /// Covenant committee keys
    pub covenant_pks: Vec<XOnlyPublicKey>,
    pub covenant_quorum: u32,
    /// Output script slashed funds are paid to
    pub slashing_pk_script: ScriptBuf,
    pub slashing_rate: SlashingRate,
    pub min_slashing_tx_fee_sat: u64,
    pub unbonding_fee_sat: u64,
    pub unbonding_time_blocks: u16,
    pub min_staking_value_sat: u64,
    pub max_staking_value_sat: u64,
    pub min_staking_time_blocks: u16,
    pub max_staking_time_blocks: u16,
    /// Carried for the surrounding chain, not interpreted here
    #[serde(default)]
    pub allow_list_expiration_height: u64,
    /// Carried for the surrounding chain, not interpreted here
    #[serde(default)]
    pub btc_activation_height: u32,
}

impl StakingParams {
    /// Parse and validate parameters from a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let params: StakingParams =
            toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        params.validate()?;
        Ok(params)
    }

    /// Serialize parameters to TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| Error::Config(ConfigError::Parse(e.to_string())))
    }

    /// Check the invariants every parameter set must satisfy
    pub fn validate(&self) -> Result<()> {
        if self.covenant_pks.is_empty() {
            return Err(Error::EmptyKeySet);
        }
        if self.covenant_quorum == 0 || self.covenant_quorum as usize > self.covenant_pks.len() {
            return Err(Error::InvalidQuorum {
                quorum: self.covenant_quorum,
                keys: self.covenant_pks.len(),
            });
        }

        let mut seen = BTreeSet::new();
        for pk in &self.covenant_pks {
            if !seen.insert(pk.serialize()) {
                return Err(Error::DuplicatedKeyInScript(pk.to_string()));
            }
        }

        if self.slashing_pk_script.is_empty() {
            return Err(invalid_value("slashing_pk_script", "must not be empty"));
        }
        if self.min_slashing_tx_fee_sat == 0 {
            return Err(invalid_value("min_slashing_tx_fee_sat", "must be positive"));
        }
        if self.unbonding_fee_sat == 0 {
            return Err(invalid_value("unbonding_fee_sat", "must be positive"));
        }
        if self.unbonding_time_blocks == 0 {
            return Err(invalid_value("unbonding_time_blocks", "must be positive"));
        }
        if self.min_staking_time_blocks == 0 {
            return Err(invalid_value("min_staking_time_blocks", "must be positive"));
        }
        if self.min_staking_time_blocks > self.max_staking_time_blocks {
            return Err(invalid_value(
                "min_staking_time_blocks",
                "must not exceed max_staking_time_blocks",
            ));
        }
        if self.min_staking_value_sat == 0 {
            return Err(invalid_value("min_staking_value_sat", "must be positive"));
        }
        if self.min_staking_value_sat > self.max_staking_value_sat {
            return Err(invalid_value(
                "min_staking_value_sat",
                "must not exceed max_staking_value_sat",
            ));
        }

        Ok(())
    }

    /// Slashing parameters, with the staker's change locked for the
    /// unbonding time
    pub fn slashing_policy(&self) -> SlashingPolicy {
        SlashingPolicy {
            slashing_pk_script: self.slashing_pk_script.clone(),
            slashing_rate: self.slashing_rate,
            change_lock_blocks: self.unbonding_time_blocks,
            min_slashing_tx_fee: Amount::from_sat(self.min_slashing_tx_fee_sat),
        }
    }

    pub fn unbonding_fee(&self) -> Amount {
        Amount::from_sat(self.unbonding_fee_sat)
    }

    /// Consumer policy bounds on a delegation's value and staking time.
    ///
    /// Script and transaction construction never call this.
    pub fn check_staking_policy(&self, staking_value_sat: u64, staking_time_blocks: u16) -> Result<()> {
        if staking_value_sat < self.min_staking_value_sat
            || staking_value_sat > self.max_staking_value_sat
        {
            return Err(Error::invalid_input(format!(
                "staking value {} outside [{}, {}]",
                staking_value_sat, self.min_staking_value_sat, self.max_staking_value_sat
            )));
        }
        if staking_time_blocks < self.min_staking_time_blocks
            || staking_time_blocks > self.max_staking_time_blocks
        {
            return Err(Error::invalid_input(format!(
                "staking time {} outside [{}, {}]",
                staking_time_blocks, self.min_staking_time_blocks, self.max_staking_time_blocks
            )));
        }
        Ok(())
    }
}

fn invalid_value(field: &str, msg: &str) -> Error {
    Error::Config(ConfigError::InvalidValue(field.to_string(), msg.to_string()))
}
