//! Error types for the staking core
//!
//! Every failure is a value of [`Error`]. Callers that only care about the
//! broad category use [`Error::kind`]; callers that surface errors over an
//! API use [`Error::code`].

use thiserror::Error;

use crate::config::ConfigError;
use crate::interpreter::ScriptError;

/// Broad failure categories shared by every component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    InvalidScript,
    InvalidTx,
    InvalidSlashingRate,
    InsufficientSlashingAmount,
    InsufficientChangeAmount,
    DustOutput,
    InvalidSignature,
    InvalidAdaptorSig,
    InvalidBip322,
    MismatchedFunding,
}

/// Root error type
#[derive(Debug, Error)]
pub enum Error {
    /// A key appears more than once across staker, finality provider and
    /// covenant key sets.
    #[error("duplicated key in script: {0}")]
    DuplicatedKeyInScript(String),

    #[error("invalid quorum {quorum} for {keys} keys")]
    InvalidQuorum { quorum: u32, keys: usize },

    #[error("empty key set")]
    EmptyKeySet,

    #[error("invalid public key: {0}")]
    InvalidPubKey(String),

    #[error("invalid scalar: {0}")]
    InvalidScalar(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid script: {0}")]
    InvalidScript(String),

    #[error("invalid transaction: {0}")]
    InvalidTx(String),

    #[error("invalid slashing rate: {0}")]
    InvalidSlashingRate(String),

    #[error("insufficient slashing amount: expected at least {expected} sats, got {actual}")]
    InsufficientSlashingAmount { expected: u64, actual: u64 },

    #[error("insufficient change amount: {0}")]
    InsufficientChangeAmount(String),

    #[error("insufficient slashing fee: expected at least {expected} sats, got {actual}")]
    InsufficientSlashingFee { expected: u64, actual: u64 },

    #[error("output {index} is dust: {value} sats below {threshold} sats")]
    DustOutput { index: usize, value: u64, threshold: u64 },

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("invalid adaptor signature: {0}")]
    InvalidAdaptorSig(String),

    #[error("invalid sighash type: {0:#04x}")]
    InvalidSighashType(u32),

    #[error("unsupported address: {0}")]
    UnsupportedAddress(String),

    #[error("invalid BIP-322 signature: {0}")]
    InvalidBip322(String),

    #[error("mismatched funding: {0}")]
    MismatchedFunding(String),

    #[error("duplicate covenant signature from {cov_pk} over {target}")]
    DuplicateCovenantSig { cov_pk: String, target: String },

    #[error("{0} is not a covenant committee member")]
    UnknownCovenantMember(String),

    #[error("covenant quorum not met over {target}: {have} of {need}")]
    CovenantQuorumNotMet { target: String, have: usize, need: usize },

    #[error("script execution failed: {0}")]
    Script(#[from] ScriptError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("secp256k1 error: {0}")]
    Secp256k1(#[from] secp256k1::Error),

    #[error("decode error: {0}")]
    Decode(#[from] bitcoin::consensus::encode::Error),
}

impl Error {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn invalid_tx(msg: impl Into<String>) -> Self {
        Self::InvalidTx(msg.into())
    }

    pub fn invalid_signature(msg: impl Into<String>) -> Self {
        Self::InvalidSignature(msg.into())
    }

    pub fn invalid_bip322(msg: impl Into<String>) -> Self {
        Self::InvalidBip322(msg.into())
    }

    pub fn mismatched_funding(msg: impl Into<String>) -> Self {
        Self::MismatchedFunding(msg.into())
    }

    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::DuplicatedKeyInScript(_)
            | Error::InvalidQuorum { .. }
            | Error::EmptyKeySet
            | Error::InvalidPubKey(_)
            | Error::InvalidScalar(_)
            | Error::InvalidInput(_)
            | Error::DuplicateCovenantSig { .. }
            | Error::UnknownCovenantMember(_)
            | Error::Config(_)
            | Error::Decode(_) => ErrorKind::InvalidInput,
            Error::InvalidScript(_) => ErrorKind::InvalidScript,
            Error::InvalidTx(_) | Error::InsufficientSlashingFee { .. } => ErrorKind::InvalidTx,
            Error::InvalidSlashingRate(_) => ErrorKind::InvalidSlashingRate,
            Error::InsufficientSlashingAmount { .. } => ErrorKind::InsufficientSlashingAmount,
            Error::InsufficientChangeAmount(_) => ErrorKind::InsufficientChangeAmount,
            Error::DustOutput { .. } => ErrorKind::DustOutput,
            Error::InvalidSignature(_)
            | Error::InvalidSighashType(_)
            | Error::CovenantQuorumNotMet { .. }
            | Error::Secp256k1(_)
            | Error::Script(_) => ErrorKind::InvalidSignature,
            Error::InvalidAdaptorSig(_) => ErrorKind::InvalidAdaptorSig,
            Error::UnsupportedAddress(_) | Error::InvalidBip322(_) => ErrorKind::InvalidBip322,
            Error::MismatchedFunding(_) => ErrorKind::MismatchedFunding,
        }
    }

    /// Stable error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            Error::DuplicatedKeyInScript(_) => "DUPLICATED_KEY_IN_SCRIPT",
            Error::InvalidQuorum { .. } => "INVALID_QUORUM",
            Error::EmptyKeySet => "EMPTY_KEY_SET",
            Error::InvalidPubKey(_) => "INVALID_PUB_KEY",
            Error::InvalidScalar(_) => "INVALID_SCALAR",
            Error::InvalidInput(_) => "INVALID_INPUT",
            Error::InvalidScript(_) => "INVALID_SCRIPT",
            Error::InvalidTx(_) => "INVALID_TX",
            Error::InvalidSlashingRate(_) => "INVALID_SLASHING_RATE",
            Error::InsufficientSlashingAmount { .. } => "INSUFFICIENT_SLASHING_AMOUNT",
            Error::InsufficientChangeAmount(_) => "INSUFFICIENT_CHANGE_AMOUNT",
            Error::InsufficientSlashingFee { .. } => "INSUFFICIENT_SLASHING_FEE",
            Error::DustOutput { .. } => "DUST_OUTPUT",
            Error::InvalidSignature(_) => "INVALID_SIGNATURE",
            Error::InvalidAdaptorSig(_) => "INVALID_ADAPTOR_SIG",
            Error::InvalidSighashType(_) => "INVALID_SIGHASH_TYPE",
            Error::UnsupportedAddress(_) => "UNSUPPORTED_ADDRESS",
            Error::InvalidBip322(_) => "INVALID_BIP322",
            Error::MismatchedFunding(_) => "MISMATCHED_FUNDING",
            Error::DuplicateCovenantSig { .. } => "DUPLICATE_COVENANT_SIG",
            Error::UnknownCovenantMember(_) => "UNKNOWN_COVENANT_MEMBER",
            Error::CovenantQuorumNotMet { .. } => "COVENANT_QUORUM_NOT_MET",
            Error::Script(_) => "SCRIPT_ERROR",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Secp256k1(_) => "SECP256K1_ERROR",
            Error::Decode(_) => "DECODE_ERROR",
        }
    }
}

/// Result type alias using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;
