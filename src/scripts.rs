//! Staking output scripts
//!
//! # Leaves
//!
//! - Timelock: `<staker> OP_CHECKSIGVERIFY <staking_time> OP_CSV`
//! - Unbonding: `<staker> OP_CHECKSIGVERIFY <covenant multisig> OP_NUMEQUAL`
//! - Slashing: `<staker> OP_CHECKSIGVERIFY <covenant multisig> OP_NUMEQUALVERIFY
//!   <finality provider multisig, threshold 1>`
//!
//! A multisig over `pk_0 > pk_1 > ... > pk_n` (reverse lexicographic by x-only
//! bytes) is `<pk_0> OP_CHECKSIG <pk_1> OP_CHECKSIGADD ... <q> OP_NUMEQUAL`; a
//! single key set degenerates to `<pk> OP_CHECKSIG`.
//!
//! The staking output commits to `branch(branch(timelock, unbonding),
//! slashing)` under [`UNSPENDABLE_KEY`], the unbonding output to
//! `branch(timelock, slashing)`, and the slashing change output to the single
//! timelock leaf.

use std::collections::BTreeSet;

use bitcoin::opcodes::all::*;
use bitcoin::script::Builder as ScriptBuilder;
use bitcoin::taproot::{ControlBlock, LeafVersion, TapLeafHash, TapNodeHash, TaprootBuilder, TaprootSpendInfo};
use bitcoin::{Amount, ScriptBuf, Transaction, TxOut, Witness, XOnlyPublicKey};
use secp256k1::schnorr::Signature;
use secp256k1::SECP256K1;

use crate::error::{Error, Result};
use crate::primitives::UNSPENDABLE_KEY;

// ============================================================================
// Script fragments
// ============================================================================

/// Sort keys in reverse lexicographic order of their x-only bytes.
///
/// Fails on duplicates.
pub fn sort_keys(pks: &[XOnlyPublicKey]) -> Result<Vec<XOnlyPublicKey>> {
    let mut sorted = pks.to_vec();
    sorted.sort_by(|a, b| b.serialize().cmp(&a.serialize()));
    for pair in sorted.windows(2) {
        if pair[0] == pair[1] {
            return Err(Error::DuplicatedKeyInScript(pair[0].to_string()));
        }
    }
    Ok(sorted)
}

fn push_single_key(builder: ScriptBuilder, pk: &XOnlyPublicKey, verify: bool) -> ScriptBuilder {
    builder
        .push_x_only_key(pk)
        .push_opcode(if verify { OP_CHECKSIGVERIFY } else { OP_CHECKSIG })
}

fn push_multisig(
    builder: ScriptBuilder,
    pks: &[XOnlyPublicKey],
    quorum: u32,
    verify: bool,
) -> Result<ScriptBuilder> {
    if pks.is_empty() {
        return Err(Error::EmptyKeySet);
    }
    if quorum == 0 || quorum as usize > pks.len() {
        return Err(Error::InvalidQuorum {
            quorum,
            keys: pks.len(),
        });
    }

    let sorted = sort_keys(pks)?;
    if sorted.len() == 1 {
        return Ok(push_single_key(builder, &sorted[0], verify));
    }

    let mut builder = builder;
    for (i, pk) in sorted.iter().enumerate() {
        builder = builder
            .push_x_only_key(pk)
            .push_opcode(if i == 0 { OP_CHECKSIG } else { OP_CHECKSIGADD });
    }
    Ok(builder
        .push_int(quorum as i64)
        .push_opcode(if verify { OP_NUMEQUALVERIFY } else { OP_NUMEQUAL }))
}

pub fn single_key_script(pk: &XOnlyPublicKey, verify: bool) -> ScriptBuf {
    push_single_key(ScriptBuilder::new(), pk, verify).into_script()
}

/// Threshold multisig over `pks`
pub fn multisig_script(pks: &[XOnlyPublicKey], quorum: u32, verify: bool) -> Result<ScriptBuf> {
    Ok(push_multisig(ScriptBuilder::new(), pks, quorum, verify)?.into_script())
}

/// `<pk> OP_CHECKSIGVERIFY <lock> OP_CSV`
pub fn timelock_script(pk: &XOnlyPublicKey, lock_blocks: u16) -> ScriptBuf {
    push_single_key(ScriptBuilder::new(), pk, true)
        .push_int(lock_blocks as i64)
        .push_opcode(OP_CSV)
        .into_script()
}

pub fn unbonding_script(
    staker_pk: &XOnlyPublicKey,
    cov_pks: &[XOnlyPublicKey],
    cov_quorum: u32,
) -> Result<ScriptBuf> {
    let builder = push_single_key(ScriptBuilder::new(), staker_pk, true);
    Ok(push_multisig(builder, cov_pks, cov_quorum, false)?.into_script())
}

pub fn slashing_script(
    staker_pk: &XOnlyPublicKey,
    fp_pks: &[XOnlyPublicKey],
    cov_pks: &[XOnlyPublicKey],
    cov_quorum: u32,
) -> Result<ScriptBuf> {
    let builder = push_single_key(ScriptBuilder::new(), staker_pk, true);
    let builder = push_multisig(builder, cov_pks, cov_quorum, true)?;
    Ok(push_multisig(builder, fp_pks, 1, false)?.into_script())
}

// ============================================================================
// Delegation keys
// ============================================================================

/// Keys and covenant quorum of one delegation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakingScriptData {
    pub staker_pk: XOnlyPublicKey,
    pub fp_pks: Vec<XOnlyPublicKey>,
    pub cov_pks: Vec<XOnlyPublicKey>,
    pub cov_quorum: u32,
}

impl StakingScriptData {
    /// Validate the key sets: every key across staker, finality providers
    /// and covenant is distinct, and the quorum is in range.
    pub fn new(
        staker_pk: XOnlyPublicKey,
        fp_pks: Vec<XOnlyPublicKey>,
        cov_pks: Vec<XOnlyPublicKey>,
        cov_quorum: u32,
    ) -> Result<Self> {
        if fp_pks.is_empty() || cov_pks.is_empty() {
            return Err(Error::EmptyKeySet);
        }
        if cov_quorum == 0 || cov_quorum as usize > cov_pks.len() {
            return Err(Error::InvalidQuorum {
                quorum: cov_quorum,
                keys: cov_pks.len(),
            });
        }

        let mut seen = BTreeSet::new();
        for pk in std::iter::once(&staker_pk).chain(&fp_pks).chain(&cov_pks) {
            if !seen.insert(pk.serialize()) {
                tracing::debug!(pk = %pk, "duplicated key in staking script");
                return Err(Error::DuplicatedKeyInScript(pk.to_string()));
            }
        }

        Ok(Self {
            staker_pk,
            fp_pks,
            cov_pks,
            cov_quorum,
        })
    }

    pub fn timelock_script(&self, lock_blocks: u16) -> ScriptBuf {
        timelock_script(&self.staker_pk, lock_blocks)
    }

    pub fn unbonding_script(&self) -> Result<ScriptBuf> {
        unbonding_script(&self.staker_pk, &self.cov_pks, self.cov_quorum)
    }

    pub fn slashing_script(&self) -> Result<ScriptBuf> {
        slashing_script(&self.staker_pk, &self.fp_pks, &self.cov_pks, self.cov_quorum)
    }
}

fn check_lock_time(lock_blocks: u16) -> Result<()> {
    if lock_blocks == 0 {
        return Err(Error::invalid_input("lock time must be positive"));
    }
    Ok(())
}

// ============================================================================
// Taproot outputs
// ============================================================================

/// Revealed leaf, its hash and the control block proving it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendInfo {
    pub script: ScriptBuf,
    pub leaf_hash: TapLeafHash,
    pub control_block: ControlBlock,
}

impl SpendInfo {
    pub fn control_block_bytes(&self) -> Vec<u8> {
        self.control_block.serialize()
    }
}

/// Script tree committed under the unspendable internal key
#[derive(Debug, Clone)]
struct TaprootScriptHolder {
    scripts: Vec<ScriptBuf>,
    spend_info: TaprootSpendInfo,
    merkle_root: TapNodeHash,
}

impl TaprootScriptHolder {
    /// Leaves are paired left to right; with three leaves the last one sits
    /// a level higher, giving `branch(branch(l0, l1), l2)`.
    fn new(scripts: Vec<ScriptBuf>) -> Result<Self> {
        let depths: &[u8] = match scripts.len() {
            1 => &[0],
            2 => &[1, 1],
            3 => &[2, 2, 1],
            n => return Err(Error::InvalidScript(format!("no tree layout for {} leaves", n))),
        };

        let mut builder = TaprootBuilder::new();
        for (script, depth) in scripts.iter().zip(depths) {
            builder = builder
                .add_leaf(*depth, script.clone())
                .map_err(|e| Error::InvalidScript(e.to_string()))?;
        }
        let spend_info = builder
            .finalize(SECP256K1, *UNSPENDABLE_KEY)
            .map_err(|_| Error::InvalidScript("script tree is not complete".into()))?;
        let merkle_root = spend_info
            .merkle_root()
            .ok_or_else(|| Error::InvalidScript("script tree has no root".into()))?;

        Ok(Self {
            scripts,
            spend_info,
            merkle_root,
        })
    }

    fn output_key(&self) -> XOnlyPublicKey {
        self.spend_info.output_key().to_inner()
    }

    fn pk_script(&self) -> ScriptBuf {
        ScriptBuf::new_p2tr_tweaked(self.spend_info.output_key())
    }

    fn spend_info(&self, index: usize) -> Result<SpendInfo> {
        let script = self
            .scripts
            .get(index)
            .ok_or_else(|| Error::InvalidScript(format!("no leaf at index {}", index)))?;
        let control_block = self
            .spend_info
            .control_block(&(script.clone(), LeafVersion::TapScript))
            .ok_or_else(|| Error::InvalidScript(format!("leaf {} is not in the script tree", index)))?;

        Ok(SpendInfo {
            script: script.clone(),
            leaf_hash: TapLeafHash::from_script(script, LeafVersion::TapScript),
            control_block,
        })
    }
}

/// Which leaf of a staking or unbonding output is spent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpendPath {
    Timelock,
    Unbonding,
    Slashing,
}

/// Staking output with its three spend paths
#[derive(Debug, Clone)]
pub struct StakingInfo {
    pub staking_output: TxOut,
    holder: TaprootScriptHolder,
}

impl StakingInfo {
    const TIMELOCK_INDEX: usize = 0;
    const UNBONDING_INDEX: usize = 1;
    const SLASHING_INDEX: usize = 2;

    pub fn new(data: &StakingScriptData, staking_time_blocks: u16, staking_value: Amount) -> Result<Self> {
        check_lock_time(staking_time_blocks)?;
        if staking_value == Amount::ZERO {
            return Err(Error::invalid_input("staking value must be positive"));
        }

        let holder = TaprootScriptHolder::new(vec![
            data.timelock_script(staking_time_blocks),
            data.unbonding_script()?,
            data.slashing_script()?,
        ])?;
        let staking_output = TxOut {
            value: staking_value,
            script_pubkey: holder.pk_script(),
        };

        tracing::debug!(
            staker_pk = %data.staker_pk,
            fps = data.fp_pks.len(),
            covenants = data.cov_pks.len(),
            staking_time_blocks,
            value = staking_value.to_sat(),
            "built staking output"
        );

        Ok(Self {
            staking_output,
            holder,
        })
    }

    pub fn output_key(&self) -> XOnlyPublicKey {
        self.holder.output_key()
    }

    pub fn merkle_root(&self) -> TapNodeHash {
        self.holder.merkle_root
    }

    pub fn spend_info(&self, path: SpendPath) -> Result<SpendInfo> {
        let index = match path {
            SpendPath::Timelock => Self::TIMELOCK_INDEX,
            SpendPath::Unbonding => Self::UNBONDING_INDEX,
            SpendPath::Slashing => Self::SLASHING_INDEX,
        };
        self.holder.spend_info(index)
    }

    pub fn timelock_path_spend_info(&self) -> Result<SpendInfo> {
        self.spend_info(SpendPath::Timelock)
    }

    pub fn unbonding_path_spend_info(&self) -> Result<SpendInfo> {
        self.spend_info(SpendPath::Unbonding)
    }

    pub fn slashing_path_spend_info(&self) -> Result<SpendInfo> {
        self.spend_info(SpendPath::Slashing)
    }

    /// Index of the unique output of `tx` matching the staking output
    pub fn find_output_index(&self, tx: &Transaction) -> Result<u32> {
        find_unique_output(tx, &self.staking_output)
    }
}

/// Unbonding output with its timelock and slashing paths
#[derive(Debug, Clone)]
pub struct UnbondingInfo {
    pub unbonding_output: TxOut,
    holder: TaprootScriptHolder,
}

impl UnbondingInfo {
    const TIMELOCK_INDEX: usize = 0;
    const SLASHING_INDEX: usize = 1;

    pub fn new(data: &StakingScriptData, unbonding_time_blocks: u16, unbonding_value: Amount) -> Result<Self> {
        check_lock_time(unbonding_time_blocks)?;
        if unbonding_value == Amount::ZERO {
            return Err(Error::invalid_input("unbonding value must be positive"));
        }

        let holder = TaprootScriptHolder::new(vec![
            data.timelock_script(unbonding_time_blocks),
            data.slashing_script()?,
        ])?;
        let unbonding_output = TxOut {
            value: unbonding_value,
            script_pubkey: holder.pk_script(),
        };

        Ok(Self {
            unbonding_output,
            holder,
        })
    }

    pub fn output_key(&self) -> XOnlyPublicKey {
        self.holder.output_key()
    }

    pub fn spend_info(&self, path: SpendPath) -> Result<SpendInfo> {
        match path {
            SpendPath::Timelock => self.holder.spend_info(Self::TIMELOCK_INDEX),
            SpendPath::Slashing => self.holder.spend_info(Self::SLASHING_INDEX),
            SpendPath::Unbonding => Err(Error::InvalidScript(
                "unbonding output has no unbonding path".into(),
            )),
        }
    }

    pub fn timelock_path_spend_info(&self) -> Result<SpendInfo> {
        self.spend_info(SpendPath::Timelock)
    }

    pub fn slashing_path_spend_info(&self) -> Result<SpendInfo> {
        self.spend_info(SpendPath::Slashing)
    }
}

/// Single-key relative timelock output used for slashing change
#[derive(Debug, Clone)]
pub struct RelativeTimelockInfo {
    holder: TaprootScriptHolder,
}

impl RelativeTimelockInfo {
    pub fn new(pk: &XOnlyPublicKey, lock_blocks: u16) -> Result<Self> {
        check_lock_time(lock_blocks)?;
        Ok(Self {
            holder: TaprootScriptHolder::new(vec![timelock_script(pk, lock_blocks)])?,
        })
    }

    pub fn pk_script(&self) -> ScriptBuf {
        self.holder.pk_script()
    }

    pub fn output_key(&self) -> XOnlyPublicKey {
        self.holder.output_key()
    }

    pub fn spend_info(&self) -> Result<SpendInfo> {
        self.holder.spend_info(0)
    }
}

fn find_unique_output(tx: &Transaction, expected: &TxOut) -> Result<u32> {
    let mut found = None;
    for (i, out) in tx.output.iter().enumerate() {
        if out == expected {
            if found.is_some() {
                return Err(Error::invalid_tx("transaction has multiple matching outputs"));
            }
            found = Some(i as u32);
        }
    }
    found.ok_or_else(|| Error::invalid_tx("transaction has no matching output"))
}

// ============================================================================
// Witnesses
// ============================================================================

fn finish_witness(witness: &mut Witness, spend_info: &SpendInfo) {
    witness.push(spend_info.script.as_bytes());
    witness.push(spend_info.control_block_bytes());
}

/// Push multisig slots so the first key in the script consumes the first slot.
///
/// `sigs` follows the reverse lexicographic key order of the script; `None`
/// becomes an empty element.
fn push_multisig_slots(witness: &mut Witness, sigs: &[Option<Signature>]) {
    for sig in sigs.iter().rev() {
        match sig {
            Some(sig) => witness.push(sig.serialize()),
            None => witness.push(Vec::<u8>::new()),
        }
    }
}

/// `[staker_sig, script, control_block]`
pub fn timelock_path_witness(spend_info: &SpendInfo, staker_sig: &Signature) -> Witness {
    let mut witness = Witness::new();
    witness.push(staker_sig.serialize());
    finish_witness(&mut witness, spend_info);
    witness
}

/// `[cov_sigs..., staker_sig, script, control_block]`
pub fn unbonding_path_witness(
    spend_info: &SpendInfo,
    cov_sigs: &[Option<Signature>],
    staker_sig: &Signature,
) -> Witness {
    let mut witness = Witness::new();
    push_multisig_slots(&mut witness, cov_sigs);
    witness.push(staker_sig.serialize());
    finish_witness(&mut witness, spend_info);
    witness
}

/// `[fp_sigs..., cov_sigs..., staker_sig, script, control_block]`
pub fn slashing_path_witness(
    spend_info: &SpendInfo,
    cov_sigs: &[Option<Signature>],
    fp_sigs: &[Option<Signature>],
    staker_sig: &Signature,
) -> Witness {
    let mut witness = Witness::new();
    push_multisig_slots(&mut witness, fp_sigs);
    push_multisig_slots(&mut witness, cov_sigs);
    witness.push(staker_sig.serialize());
    finish_witness(&mut witness, spend_info);
    witness
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::key_pair;

    fn keys(prefix: u8, n: u8) -> Vec<XOnlyPublicKey> {
        (0..n).map(|i| key_pair(&[prefix, i]).1).collect()
    }

    fn sample_data() -> StakingScriptData {
        StakingScriptData::new(key_pair(b"staker").1, keys(b'f', 1), keys(b'c', 5), 3).unwrap()
    }

    #[test]
    fn test_sort_keys_reverse_lex() {
        let pks = keys(b'c', 5);
        let sorted = sort_keys(&pks).unwrap();
        for pair in sorted.windows(2) {
            assert!(pair[0].serialize() > pair[1].serialize());
        }
        let mut dup = pks.clone();
        dup.push(pks[2]);
        assert!(matches!(sort_keys(&dup), Err(Error::DuplicatedKeyInScript(_))));
    }

    #[test]
    fn test_multisig_script_layout() {
        let pks = keys(b'c', 3);
        let sorted = sort_keys(&pks).unwrap();
        let script = multisig_script(&pks, 2, false).unwrap();
        let expected = ScriptBuilder::new()
            .push_x_only_key(&sorted[0])
            .push_opcode(OP_CHECKSIG)
            .push_x_only_key(&sorted[1])
            .push_opcode(OP_CHECKSIGADD)
            .push_x_only_key(&sorted[2])
            .push_opcode(OP_CHECKSIGADD)
            .push_int(2)
            .push_opcode(OP_NUMEQUAL)
            .into_script();
        assert_eq!(script, expected);

        // input order does not matter
        let mut shuffled = pks.clone();
        shuffled.reverse();
        assert_eq!(multisig_script(&shuffled, 2, false).unwrap(), script);

        let single = multisig_script(&pks[..1], 1, true).unwrap();
        assert_eq!(single, single_key_script(&pks[0], true));
    }

    #[test]
    fn test_multisig_script_errors() {
        let pks = keys(b'c', 3);
        assert!(matches!(multisig_script(&[], 1, false), Err(Error::EmptyKeySet)));
        assert!(matches!(
            multisig_script(&pks, 0, false),
            Err(Error::InvalidQuorum { quorum: 0, keys: 3 })
        ));
        assert!(matches!(
            multisig_script(&pks, 4, false),
            Err(Error::InvalidQuorum { .. })
        ));
    }

    #[test]
    fn test_duplicate_keys_across_sets() {
        let staker = key_pair(b"staker").1;
        let fps = keys(b'f', 2);
        let covs = keys(b'c', 3);

        let mut bad_fps = fps.clone();
        bad_fps.push(staker);
        assert!(matches!(
            StakingScriptData::new(staker, bad_fps, covs.clone(), 2),
            Err(Error::DuplicatedKeyInScript(_))
        ));

        let mut bad_covs = covs.clone();
        bad_covs[0] = fps[1];
        assert!(matches!(
            StakingScriptData::new(staker, fps.clone(), bad_covs, 2),
            Err(Error::DuplicatedKeyInScript(_))
        ));

        assert!(matches!(
            StakingScriptData::new(staker, vec![], covs.clone(), 2),
            Err(Error::EmptyKeySet)
        ));
        assert!(StakingScriptData::new(staker, fps, covs, 3).is_ok());
    }

    #[test]
    fn test_staking_info_deterministic() {
        let data = sample_data();
        let a = StakingInfo::new(&data, 5, Amount::from_sat(200_000_000)).unwrap();
        let b = StakingInfo::new(&data, 5, Amount::from_sat(200_000_000)).unwrap();
        assert_eq!(a.staking_output, b.staking_output);
        for path in [SpendPath::Timelock, SpendPath::Unbonding, SpendPath::Slashing] {
            assert_eq!(a.spend_info(path).unwrap(), b.spend_info(path).unwrap());
        }
        assert!(a.staking_output.script_pubkey.is_p2tr());
    }

    #[test]
    fn test_staking_tree_shape() {
        let data = sample_data();
        let info = StakingInfo::new(&data, 5, Amount::from_sat(200_000_000)).unwrap();

        let timelock = data.timelock_script(5);
        let unbonding = data.unbonding_script().unwrap();
        let slashing = data.slashing_script().unwrap();
        let leaf = |s: &ScriptBuf| TapNodeHash::from_script(s, LeafVersion::TapScript);

        let left = TapNodeHash::from_node_hashes(leaf(&timelock), leaf(&unbonding));
        assert_eq!(info.merkle_root(), TapNodeHash::from_node_hashes(left, leaf(&slashing)));

        for (path, script, depth) in [
            (SpendPath::Timelock, &timelock, 2),
            (SpendPath::Unbonding, &unbonding, 2),
            (SpendPath::Slashing, &slashing, 1),
        ] {
            let spend = info.spend_info(path).unwrap();
            assert_eq!(&spend.script, script);
            assert_eq!(spend.leaf_hash, TapLeafHash::from_script(script, LeafVersion::TapScript));
            assert_eq!(spend.control_block.merkle_branch.len(), depth);
            assert_eq!(spend.control_block.internal_key, *UNSPENDABLE_KEY);
            assert!(spend
                .control_block
                .verify_taproot_commitment(SECP256K1, info.output_key(), script));
        }
    }

    #[test]
    fn test_unbonding_info() {
        let data = sample_data();
        let info = UnbondingInfo::new(&data, 101, Amount::from_sat(199_999_000)).unwrap();
        let timelock = info.timelock_path_spend_info().unwrap();
        let slashing = info.slashing_path_spend_info().unwrap();
        assert_eq!(timelock.script, data.timelock_script(101));
        assert_eq!(slashing.script, data.slashing_script().unwrap());
        assert!(info.spend_info(SpendPath::Unbonding).is_err());
        assert!(slashing
            .control_block
            .verify_taproot_commitment(SECP256K1, info.output_key(), &slashing.script));
    }

    #[test]
    fn test_relative_timelock_info() {
        let staker = key_pair(b"staker").1;
        let info = RelativeTimelockInfo::new(&staker, 101).unwrap();
        let spend = info.spend_info().unwrap();
        assert_eq!(spend.control_block_bytes().len(), 33);
        assert!(spend
            .control_block
            .verify_taproot_commitment(SECP256K1, info.output_key(), &spend.script));
        assert!(RelativeTimelockInfo::new(&staker, 0).is_err());
    }

    #[test]
    fn test_find_output_index() {
        let data = sample_data();
        let info = StakingInfo::new(&data, 5, Amount::from_sat(100_000)).unwrap();
        let other = TxOut {
            value: Amount::from_sat(5_000),
            script_pubkey: ScriptBuf::from_hex("6a").unwrap(),
        };
        let mut tx = Transaction {
            version: bitcoin::transaction::Version::TWO,
            lock_time: bitcoin::absolute::LockTime::ZERO,
            input: vec![],
            output: vec![other.clone(), info.staking_output.clone()],
        };
        assert_eq!(info.find_output_index(&tx).unwrap(), 1);

        tx.output[1].value = Amount::from_sat(99_999);
        assert!(info.find_output_index(&tx).is_err());

        tx.output[1] = info.staking_output.clone();
        tx.output.push(info.staking_output.clone());
        assert!(info.find_output_index(&tx).is_err());
    }

    #[test]
    fn test_witness_slot_order() {
        let data = sample_data();
        let info = StakingInfo::new(&data, 5, Amount::from_sat(100_000)).unwrap();
        let spend = info.unbonding_path_spend_info().unwrap();
        let sig = |b: u8| Signature::from_slice(&[b; 64]).unwrap();

        let witness = unbonding_path_witness(
            &spend,
            &[Some(sig(0)), None, Some(sig(2)), None, Some(sig(4))],
            &sig(9),
        );
        let elements: Vec<&[u8]> = witness.iter().collect();
        assert_eq!(elements.len(), 8);
        assert_eq!(elements[0], &[4u8; 64][..]);
        assert!(elements[1].is_empty());
        assert_eq!(elements[4], &[0u8; 64][..]);
        assert_eq!(elements[5], &[9u8; 64][..]);
        assert_eq!(elements[6], spend.script.as_bytes());
    }
}
