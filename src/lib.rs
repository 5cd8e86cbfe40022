//! Bitcoin staking core
//!
//! Builds and verifies the Bitcoin side of BTC staking: the Taproot staking
//! and unbonding outputs, the pre-signed unbonding and slashing transactions,
//! and the signatures that authorize them.
//!
//! # Signature schemes
//!
//! - BIP-340 Schnorr for staker, covenant and finality provider signatures
//! - EOTS (extractable one-time signatures) for finality votes; equivocation
//!   leaks the provider's secret key
//! - Schnorr adaptor signatures, encrypted under a finality provider key, for
//!   covenant pre-authorization of slashing
//! - BIP-322 and Bitcoin signed-message ECDSA for proofs of possession
//!
//! # Usage
//!
//! ```ignore
//! let data = StakingScriptData::new(staker_pk, fp_pks, cov_pks, quorum)?;
//! let staking = StakingInfo::new(&data, staking_time, value)?;
//! let slashing_tx = build_slashing_tx(&staking_tx, 0, &params.slashing_policy(), &staker_pk, fee)?;
//! ```

pub mod adaptor;
pub mod address;
pub mod bip322;
pub mod config;
pub mod covenant;
pub mod eots;
pub mod error;
pub mod interpreter;
pub mod logging;
pub mod pop;
pub mod primitives;
pub mod schnorr;
pub mod scripts;
pub mod sighash;
pub mod signing;
pub mod tx;

pub use adaptor::{AdaptorSignature, DecryptionKey, EncryptionKey};
pub use address::{AddressType, BtcAddress};
pub use config::{BtcNetwork, ConfigError, StakingParams};
pub use covenant::{CovenantAdaptorSignatures, SlashingSignatures, UnbondingSignatures};
pub use eots::{EotsSignature, Evidence, PrivateRand, PubRandCommit, PubRandProof, PublicRand};
pub use error::{Error, ErrorKind, Result};
pub use interpreter::ScriptError;
pub use logging::{init_logging, LogLevel, LoggingError};
pub use pop::{AccountAddress, BtcSigType, ProofOfPossession};
pub use scripts::{RelativeTimelockInfo, SpendInfo, SpendPath, StakingInfo, StakingScriptData, UnbondingInfo};
pub use sighash::PrevOutputFetcher;
pub use tx::{
    build_slashing_tx, build_unbonding_info, build_unbonding_tx, check_slashing_matches_funding,
    check_unbonding_tx_matches_staking, validate_slashing_tx, SlashingPolicy, SlashingRate,
};
