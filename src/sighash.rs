//! BIP-341 signature hashes, with the BIP-342 tapscript extension
//!
//! The digest commits to the amount and script of every input, so callers
//! supply all previous outputs through a [`PrevOutputFetcher`], not just the
//! one being signed.

use std::collections::HashMap;

use bitcoin::hashes::Hash;
use bitcoin::sighash::{Prevouts, SighashCache};
use bitcoin::taproot::TapLeafHash;
use bitcoin::{OutPoint, TapSighashType, Transaction, TxOut};

use crate::error::{Error, Result};

/// Code separator position when no OP_CODESEPARATOR was executed
pub const NO_CODESEPARATOR: u32 = 0xffff_ffff;

/// Parse a taproot sighash type byte
pub fn tap_sighash_type(byte: u8) -> Result<TapSighashType> {
    TapSighashType::from_consensus_u8(byte).map_err(|_| Error::InvalidSighashType(byte as u32))
}

/// Previous outputs of a transaction's inputs, keyed by outpoint
#[derive(Debug, Clone, Default)]
pub struct PrevOutputFetcher {
    outputs: HashMap<OutPoint, TxOut>,
}

impl PrevOutputFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, outpoint: OutPoint, txout: TxOut) {
        self.outputs.insert(outpoint, txout);
    }

    pub fn with(mut self, outpoint: OutPoint, txout: TxOut) -> Self {
        self.add(outpoint, txout);
        self
    }

    pub fn fetch(&self, outpoint: &OutPoint) -> Option<&TxOut> {
        self.outputs.get(outpoint)
    }

    /// Previous outputs in the order `tx` spends them
    pub fn prevouts_for(&self, tx: &Transaction) -> Result<Vec<TxOut>> {
        tx.input
            .iter()
            .map(|txin| {
                self.fetch(&txin.previous_output).cloned().ok_or_else(|| {
                    Error::invalid_input(format!("missing previous output {}", txin.previous_output))
                })
            })
            .collect()
    }
}

impl FromIterator<(OutPoint, TxOut)> for PrevOutputFetcher {
    fn from_iter<I: IntoIterator<Item = (OutPoint, TxOut)>>(iter: I) -> Self {
        Self {
            outputs: iter.into_iter().collect(),
        }
    }
}

/// Script-path sighash for `tx.input[input_index]` under the given leaf
pub fn tapscript_sighash(
    tx: &Transaction,
    input_index: usize,
    prev_outputs: &PrevOutputFetcher,
    leaf_hash: TapLeafHash,
    sighash_type: TapSighashType,
) -> Result<[u8; 32]> {
    let prevouts = prev_outputs.prevouts_for(tx)?;
    signature_hash(
        tx,
        input_index,
        &prevouts,
        sighash_type,
        Some((leaf_hash, NO_CODESEPARATOR)),
    )
}

/// Key-path sighash for `tx.input[input_index]`
pub fn taproot_key_spend_sighash(
    tx: &Transaction,
    input_index: usize,
    prev_outputs: &PrevOutputFetcher,
    sighash_type: TapSighashType,
) -> Result<[u8; 32]> {
    let prevouts = prev_outputs.prevouts_for(tx)?;
    signature_hash(tx, input_index, &prevouts, sighash_type, None)
}

/// BIP-341 signature message hash.
///
/// `prevouts` lists the spent output of every input in input order. `leaf`
/// selects the tapscript extension with the leaf hash and the position of
/// the last executed OP_CODESEPARATOR. Annexes are not supported.
pub fn signature_hash(
    tx: &Transaction,
    input_index: usize,
    prevouts: &[TxOut],
    sighash_type: TapSighashType,
    leaf: Option<(TapLeafHash, u32)>,
) -> Result<[u8; 32]> {
    if prevouts.len() != tx.input.len() {
        return Err(Error::invalid_input(format!(
            "{} previous outputs for {} inputs",
            prevouts.len(),
            tx.input.len()
        )));
    }

    SighashCache::new(tx)
        .taproot_signature_hash(input_index, &Prevouts::All(prevouts), None, leaf, sighash_type)
        .map(|hash| hash.to_byte_array())
        .map_err(|e| Error::invalid_input(format!("taproot sighash for input {}: {}", input_index, e)))
}
