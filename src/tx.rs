//! Pre-signed slashing and unbonding transactions
//!
//! Pre-signed transactions are final and non-replaceable: exactly one
//! input with sequence `0xffffffff`, no locktime, no signature script and
//! no witness until the spend is assembled.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode::serialize;
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness, XOnlyPublicKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::config::ConfigError;
use crate::error::{Error, Result};
use crate::scripts::{RelativeTimelockInfo, StakingScriptData, UnbondingInfo};

/// Maximum standard transaction weight
pub const MAX_STANDARD_TX_WEIGHT: u64 = 400_000;

/// Maximum serialized size of a transaction without witness data
pub const MAX_BLOCK_BASE_SIZE: usize = 1_000_000;

/// 21 million BTC in satoshis
pub const MAX_MONEY_SAT: u64 = 21_000_000 * 100_000_000;

const MAX_TX_VERSION: i32 = 2;

// ============================================================================
// Slashing rate
// ============================================================================

/// Fraction of the staked value paid out on slashing.
///
/// An exact decimal in (0, 1) with at most four fractional digits, stored in
/// units of 1/10000.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlashingRate(u32);

impl SlashingRate {
    pub const DENOMINATOR: u32 = 10_000;

    pub fn from_basis_points(bp: u32) -> Result<Self> {
        if bp == 0 || bp >= Self::DENOMINATOR {
            return Err(Error::InvalidSlashingRate(format!(
                "{}/{} is not in (0, 1)",
                bp,
                Self::DENOMINATOR
            )));
        }
        Ok(SlashingRate(bp))
    }

    pub fn basis_points(&self) -> u32 {
        self.0
    }

    /// `floor(value · rate)`
    pub fn slashing_amount(&self, value: Amount) -> Amount {
        let sat = value.to_sat() as u128 * self.0 as u128 / Self::DENOMINATOR as u128;
        Amount::from_sat(sat as u64)
    }
}

/// Whether `rate` parses as a valid slashing rate
pub fn is_slashing_rate_valid(rate: &str) -> bool {
    rate.parse::<SlashingRate>().is_ok()
}

impl FromStr for SlashingRate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidSlashingRate(s.to_string());
        let (int_part, frac_part) = s.trim().split_once('.').unwrap_or((s.trim(), ""));

        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        if !int_part.chars().all(|c| c.is_ascii_digit())
            || !frac_part.chars().all(|c| c.is_ascii_digit())
        {
            return Err(invalid());
        }

        // trailing zeros do not add precision
        let frac_part = frac_part.trim_end_matches('0');
        if frac_part.len() > 4 {
            return Err(invalid());
        }
        if int_part.trim_start_matches('0') != "" {
            // >= 1
            return Err(invalid());
        }

        let mut bp: u32 = 0;
        for (i, c) in frac_part.chars().enumerate() {
            bp += c.to_digit(10).ok_or_else(invalid)? * 10u32.pow(3 - i as u32);
        }
        SlashingRate::from_basis_points(bp).map_err(|_| invalid())
    }
}

impl fmt::Display for SlashingRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let frac = format!("{:04}", self.0);
        write!(f, "0.{}", frac.trim_end_matches('0'))
    }
}

impl Serialize for SlashingRate {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SlashingRate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Sanity checks
// ============================================================================

/// Context-free consensus checks on a transaction
pub fn check_transaction_sanity(tx: &Transaction) -> Result<()> {
    if tx.input.is_empty() {
        return Err(Error::invalid_tx("transaction has no inputs"));
    }
    if tx.output.is_empty() {
        return Err(Error::invalid_tx("transaction has no outputs"));
    }

    let base_size = serialize(&strip_witness(tx)).len();
    if base_size > MAX_BLOCK_BASE_SIZE {
        return Err(Error::invalid_tx(format!(
            "serialized size {} exceeds {}",
            base_size, MAX_BLOCK_BASE_SIZE
        )));
    }

    let mut total: u64 = 0;
    for (i, out) in tx.output.iter().enumerate() {
        let value = out.value.to_sat();
        if value > MAX_MONEY_SAT {
            return Err(Error::invalid_tx(format!(
                "output {} value {} exceeds max money",
                i, value
            )));
        }
        total = total
            .checked_add(value)
            .filter(|t| *t <= MAX_MONEY_SAT)
            .ok_or_else(|| Error::invalid_tx("total output value exceeds max money"))?;
    }

    let mut seen = HashSet::with_capacity(tx.input.len());
    for txin in &tx.input {
        if !seen.insert(txin.previous_output) {
            return Err(Error::invalid_tx(format!(
                "duplicate input {}",
                txin.previous_output
            )));
        }
    }

    if tx.is_coinbase() {
        let len = tx.input[0].script_sig.len();
        if !(2..=100).contains(&len) {
            return Err(Error::invalid_tx("coinbase script length out of range"));
        }
    } else if tx.input.iter().any(|txin| txin.previous_output.is_null()) {
        return Err(Error::invalid_tx("input refers to a null outpoint"));
    }

    Ok(())
}

fn strip_witness(tx: &Transaction) -> Transaction {
    let mut stripped = tx.clone();
    for txin in stripped.input.iter_mut() {
        txin.witness.clear();
    }
    stripped
}

fn check_pre_signed_tx_sanity(
    tx: &Transaction,
    num_inputs: usize,
    num_outputs: usize,
    min_version: i32,
    max_version: i32,
) -> Result<()> {
    check_transaction_sanity(tx)?;

    if tx.input.len() != num_inputs {
        return Err(Error::invalid_tx(format!(
            "expected {} inputs, got {}",
            num_inputs,
            tx.input.len()
        )));
    }
    if tx.output.len() != num_outputs {
        return Err(Error::invalid_tx(format!(
            "expected {} outputs, got {}",
            num_outputs,
            tx.output.len()
        )));
    }

    // pre-signed txs must be final
    if tx.lock_time.to_consensus_u32() != 0 {
        return Err(Error::invalid_tx("pre-signed tx must not have locktime"));
    }

    let version = tx.version.0;
    if version < min_version || version > max_version {
        return Err(Error::invalid_tx(format!(
            "version {} outside [{}, {}]",
            version, min_version, max_version
        )));
    }

    let weight = tx.weight().to_wu();
    if weight > MAX_STANDARD_TX_WEIGHT {
        return Err(Error::invalid_tx(format!(
            "weight {} exceeds {}",
            weight, MAX_STANDARD_TX_WEIGHT
        )));
    }

    for txin in &tx.input {
        if txin.sequence != Sequence::MAX {
            return Err(Error::invalid_tx("pre-signed tx must not be replaceable"));
        }
        if !txin.script_sig.is_empty() {
            return Err(Error::invalid_tx("pre-signed tx must not have signature script"));
        }
        if !txin.witness.is_empty() {
            return Err(Error::invalid_tx("pre-signed tx must not have witness"));
        }
    }

    Ok(())
}

/// One input, one output, version 2
pub fn check_pre_signed_unbonding_tx_sanity(tx: &Transaction) -> Result<()> {
    check_pre_signed_tx_sanity(tx, 1, 1, MAX_TX_VERSION, MAX_TX_VERSION)
}

/// One input, two outputs, version 1 or 2
pub fn check_pre_signed_slashing_tx_sanity(tx: &Transaction) -> Result<()> {
    check_pre_signed_tx_sanity(tx, 1, 2, 1, MAX_TX_VERSION)
}

/// Reject non-OP_RETURN outputs below the default relay dust threshold
pub fn check_dust_outputs(tx: &Transaction) -> Result<()> {
    for (index, out) in tx.output.iter().enumerate() {
        if out.script_pubkey.is_op_return() {
            continue;
        }
        let threshold = out.script_pubkey.minimal_non_dust();
        if out.value < threshold {
            return Err(Error::DustOutput {
                index,
                value: out.value.to_sat(),
                threshold: threshold.to_sat(),
            });
        }
    }
    Ok(())
}

// ============================================================================
// Slashing tx
// ============================================================================

/// Chain parameters a slashing tx is built and checked against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlashingPolicy {
    pub slashing_pk_script: ScriptBuf,
    pub slashing_rate: SlashingRate,
    /// Relative lock on the staker's change output
    pub change_lock_blocks: u16,
    pub min_slashing_tx_fee: Amount,
}

fn funding_output(funding_tx: &Transaction, output_idx: u32) -> Result<&TxOut> {
    funding_tx.output.get(output_idx as usize).ok_or_else(|| {
        Error::invalid_input(format!(
            "funding output index {} out of range for {} outputs",
            output_idx,
            funding_tx.output.len()
        ))
    })
}

fn unsigned_input(previous_output: OutPoint) -> TxIn {
    TxIn {
        previous_output,
        script_sig: ScriptBuf::new(),
        sequence: Sequence::MAX,
        witness: Witness::new(),
    }
}

/// Build a slashing tx spending `funding_tx.output[output_idx]`.
///
/// Output 0 pays `floor(value · rate)` to the slashing script, output 1
/// returns the rest minus `fee` to a timelock output of the staker. The
/// funding tx is either the staking tx or the unbonding tx.
pub fn build_slashing_tx(
    funding_tx: &Transaction,
    output_idx: u32,
    policy: &SlashingPolicy,
    staker_pk: &XOnlyPublicKey,
    fee: Amount,
) -> Result<Transaction> {
    if policy.slashing_pk_script.is_empty() {
        return Err(Error::InvalidScript("empty slashing pk script".into()));
    }
    let input_value = funding_output(funding_tx, output_idx)?.value;

    let slashing_amount = policy.slashing_rate.slashing_amount(input_value);
    if slashing_amount == Amount::ZERO {
        return Err(Error::InsufficientSlashingAmount {
            expected: 1,
            actual: 0,
        });
    }

    let change_amount = input_value
        .checked_sub(slashing_amount)
        .and_then(|v| v.checked_sub(fee))
        .filter(|v| *v > Amount::ZERO)
        .ok_or_else(|| {
            Error::InsufficientChangeAmount(format!(
                "{} - {} - {} leaves nothing for the staker",
                input_value, slashing_amount, fee
            ))
        })?;

    let change_info = RelativeTimelockInfo::new(staker_pk, policy.change_lock_blocks)?;

    let tx = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![unsigned_input(OutPoint {
            txid: funding_tx.compute_txid(),
            vout: output_idx,
        })],
        output: vec![
            TxOut {
                value: slashing_amount,
                script_pubkey: policy.slashing_pk_script.clone(),
            },
            TxOut {
                value: change_amount,
                script_pubkey: change_info.pk_script(),
            },
        ],
    };
    check_dust_outputs(&tx)?;

    tracing::debug!(
        slashing_amount = slashing_amount.to_sat(),
        change_amount = change_amount.to_sat(),
        fee = fee.to_sat(),
        "built slashing tx"
    );
    Ok(tx)
}

/// Check the outputs of a slashing tx spending a funding output worth
/// `funding_value`
pub fn validate_slashing_tx(
    slashing_tx: &Transaction,
    funding_value: Amount,
    policy: &SlashingPolicy,
    staker_pk: &XOnlyPublicKey,
) -> Result<()> {
    check_pre_signed_slashing_tx_sanity(slashing_tx)?;

    if policy.min_slashing_tx_fee == Amount::ZERO {
        return Err(Error::Config(ConfigError::InvalidValue(
            "min_slashing_tx_fee".to_string(),
            "must be positive".to_string(),
        )));
    }

    let slashing_out = &slashing_tx.output[0];
    let change_out = &slashing_tx.output[1];

    if slashing_out.script_pubkey != policy.slashing_pk_script {
        tracing::debug!(rule = "slashing_pk_script", "slashing tx rejected");
        return Err(Error::invalid_tx("output 0 does not pay the slashing pk script"));
    }

    let expected = policy.slashing_rate.slashing_amount(funding_value);
    if expected == Amount::ZERO || slashing_out.value < expected {
        tracing::debug!(rule = "slashing_amount", expected = expected.to_sat(), "slashing tx rejected");
        return Err(Error::InsufficientSlashingAmount {
            expected: expected.to_sat(),
            actual: slashing_out.value.to_sat(),
        });
    }

    let change_info = RelativeTimelockInfo::new(staker_pk, policy.change_lock_blocks)?;
    if change_out.script_pubkey != change_info.pk_script() {
        tracing::debug!(rule = "change_pk_script", "slashing tx rejected");
        return Err(Error::invalid_tx("output 1 does not pay the staker's timelock output"));
    }

    check_dust_outputs(slashing_tx)?;

    // sanity already bounded the total by max money
    let total_out: u64 = slashing_tx.output.iter().map(|o| o.value.to_sat()).sum();
    if total_out >= funding_value.to_sat() {
        return Err(Error::invalid_tx(format!(
            "outputs {} do not leave a fee from input {}",
            total_out,
            funding_value.to_sat()
        )));
    }
    let fee = funding_value.to_sat() - total_out;
    if fee < policy.min_slashing_tx_fee.to_sat() {
        return Err(Error::InsufficientSlashingFee {
            expected: policy.min_slashing_tx_fee.to_sat(),
            actual: fee,
        });
    }

    Ok(())
}

/// Full check of a slashing tx against the funding tx it spends
pub fn check_slashing_matches_funding(
    slashing_tx: &Transaction,
    funding_tx: &Transaction,
    output_idx: u32,
    policy: &SlashingPolicy,
    staker_pk: &XOnlyPublicKey,
) -> Result<()> {
    let funding_value = funding_output(funding_tx, output_idx)?.value;
    validate_slashing_tx(slashing_tx, funding_value, policy, staker_pk)?;

    let expected = OutPoint {
        txid: funding_tx.compute_txid(),
        vout: output_idx,
    };
    if slashing_tx.input[0].previous_output != expected {
        return Err(Error::mismatched_funding(format!(
            "slashing tx spends {}, expected {}",
            slashing_tx.input[0].previous_output, expected
        )));
    }
    Ok(())
}

// ============================================================================
// Unbonding tx
// ============================================================================

/// Unbonding output for a staking output of `staking_value`, paying
/// `staking_value - unbonding_fee`
pub fn build_unbonding_info(
    data: &StakingScriptData,
    unbonding_time_blocks: u16,
    staking_value: Amount,
    unbonding_fee: Amount,
) -> Result<UnbondingInfo> {
    let value = staking_value
        .checked_sub(unbonding_fee)
        .filter(|v| *v > Amount::ZERO)
        .ok_or_else(|| {
            Error::invalid_input(format!(
                "unbonding fee {} consumes staking value {}",
                unbonding_fee, staking_value
            ))
        })?;
    UnbondingInfo::new(data, unbonding_time_blocks, value)
}

/// Build the version 2 unbonding tx spending the staking output
pub fn build_unbonding_tx(
    staking_tx: &Transaction,
    staking_output_idx: u32,
    unbonding_info: &UnbondingInfo,
    unbonding_fee: Amount,
) -> Result<Transaction> {
    let staking_value = funding_output(staking_tx, staking_output_idx)?.value;
    if staking_value.checked_sub(unbonding_fee) != Some(unbonding_info.unbonding_output.value) {
        return Err(Error::invalid_input(format!(
            "unbonding output {} is not staking value {} minus fee {}",
            unbonding_info.unbonding_output.value, staking_value, unbonding_fee
        )));
    }

    let tx = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![unsigned_input(OutPoint {
            txid: staking_tx.compute_txid(),
            vout: staking_output_idx,
        })],
        output: vec![unbonding_info.unbonding_output.clone()],
    };
    check_dust_outputs(&tx)?;
    Ok(tx)
}

/// Check an unbonding tx against the staking tx it spends
pub fn check_unbonding_tx_matches_staking(
    unbonding_tx: &Transaction,
    staking_tx: &Transaction,
    staking_output_idx: u32,
    unbonding_info: &UnbondingInfo,
    unbonding_fee: Amount,
) -> Result<()> {
    check_pre_signed_unbonding_tx_sanity(unbonding_tx)?;
    let staking_value = funding_output(staking_tx, staking_output_idx)?.value;

    let expected = OutPoint {
        txid: staking_tx.compute_txid(),
        vout: staking_output_idx,
    };
    if unbonding_tx.input[0].previous_output != expected {
        return Err(Error::mismatched_funding(format!(
            "unbonding tx spends {}, expected {}",
            unbonding_tx.input[0].previous_output, expected
        )));
    }

    let out = &unbonding_tx.output[0];
    if out.script_pubkey != unbonding_info.unbonding_output.script_pubkey {
        return Err(Error::invalid_tx("unbonding output script does not match"));
    }
    if staking_value.checked_sub(unbonding_fee) != Some(out.value) {
        return Err(Error::invalid_tx(format!(
            "unbonding output {} is not staking value {} minus fee {}",
            out.value, staking_value, unbonding_fee
        )));
    }
    check_dust_outputs(unbonding_tx)
}
