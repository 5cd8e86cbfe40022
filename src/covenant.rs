//! Covenant committee signatures
//!
//! The committee pre-authorizes two kinds of spends of a delegation:
//!
//! - slashing txs, with one adaptor signature per (member, finality provider)
//!   pair encrypted under the provider's key;
//! - the unbonding tx, with one plain Schnorr signature per member.
//!
//! Every contribution is verified on arrival. Unknown members and repeated
//! contributions are rejected rather than overwritten.

use std::collections::HashMap;

use bitcoin::{ScriptBuf, Transaction, TxOut, Witness, XOnlyPublicKey};
use secp256k1::schnorr::Signature;
use secp256k1::{SecretKey, SECP256K1};

use crate::adaptor::{AdaptorSignature, DecryptionKey, EncryptionKey};
use crate::error::{Error, Result};
use crate::scripts::{slashing_path_witness, sort_keys, unbonding_path_witness, SpendInfo, StakingScriptData};
use crate::signing::{
    enc_sign_tx_with_output, enc_verify_tx_sig_with_output, sign_tx_with_output, verify_tx_sig_with_output,
};

/// One member's adaptor signatures over a slashing tx, in the delegation's
/// finality provider order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CovenantAdaptorSignatures {
    pub cov_pk: XOnlyPublicKey,
    pub adaptor_sigs: Vec<AdaptorSignature>,
}

/// Sign `slashing_tx` as covenant member `cov_sk`, once per finality provider
pub fn sign_slashing_tx(
    data: &StakingScriptData,
    slashing_tx: &Transaction,
    funding_output: &TxOut,
    cov_sk: &SecretKey,
) -> Result<CovenantAdaptorSignatures> {
    let slashing_script = data.slashing_script()?;
    let adaptor_sigs = data
        .fp_pks
        .iter()
        .map(|fp_pk| {
            let ek = EncryptionKey::from_xonly(fp_pk)?;
            enc_sign_tx_with_output(slashing_tx, funding_output, &slashing_script, cov_sk, &ek)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CovenantAdaptorSignatures {
        cov_pk: cov_sk.x_only_public_key(SECP256K1).0,
        adaptor_sigs,
    })
}

fn check_member(cov_pks: &[XOnlyPublicKey], cov_pk: &XOnlyPublicKey) -> Result<()> {
    if !cov_pks.contains(cov_pk) {
        return Err(Error::UnknownCovenantMember(cov_pk.to_string()));
    }
    Ok(())
}

/// Order one signature per key into multisig slots, reverse lexicographic by
/// key; keys without a signature get an empty slot
fn ordered_slots(
    sorted_pks: &[XOnlyPublicKey],
    sigs: impl Fn(&XOnlyPublicKey) -> Result<Option<Signature>>,
) -> Result<Vec<Option<Signature>>> {
    sorted_pks.iter().map(sigs).collect()
}

/// Finality provider slots of a slashing witness, holding the single
/// signature of `fp_pk`
pub fn fp_signature_slots(
    fp_pks: &[XOnlyPublicKey],
    fp_pk: &XOnlyPublicKey,
    fp_sig: &Signature,
) -> Result<Vec<Option<Signature>>> {
    let sorted = sort_keys(fp_pks)?;
    if !sorted.contains(fp_pk) {
        return Err(Error::invalid_input(format!(
            "{} is not a finality provider of the delegation",
            fp_pk
        )));
    }
    ordered_slots(&sorted, |pk| Ok((pk == fp_pk).then_some(*fp_sig)))
}

// ============================================================================
// Slashing
// ============================================================================

/// Adaptor signatures collected for one slashing tx
#[derive(Debug, Clone)]
pub struct SlashingSignatures {
    slashing_tx: Transaction,
    funding_output: TxOut,
    slashing_script: ScriptBuf,
    staker_pk: XOnlyPublicKey,
    fp_pks: Vec<XOnlyPublicKey>,
    cov_pks: Vec<XOnlyPublicKey>,
    quorum: u32,
    /// keyed by (finality provider, covenant member)
    sigs: HashMap<(XOnlyPublicKey, XOnlyPublicKey), AdaptorSignature>,
}

impl SlashingSignatures {
    /// `funding_output` is the staking or unbonding output the slashing tx
    /// spends through its slashing leaf
    pub fn new(data: &StakingScriptData, slashing_tx: Transaction, funding_output: TxOut) -> Result<Self> {
        Ok(Self {
            slashing_tx,
            funding_output,
            slashing_script: data.slashing_script()?,
            staker_pk: data.staker_pk,
            fp_pks: data.fp_pks.clone(),
            cov_pks: sort_keys(&data.cov_pks)?,
            quorum: data.cov_quorum,
            sigs: HashMap::new(),
        })
    }

    fn check_fp(&self, fp_pk: &XOnlyPublicKey) -> Result<()> {
        if !self.fp_pks.contains(fp_pk) {
            return Err(Error::invalid_input(format!(
                "{} is not a finality provider of the delegation",
                fp_pk
            )));
        }
        Ok(())
    }

    fn check_new(&self, cov_pk: &XOnlyPublicKey, fp_pk: &XOnlyPublicKey, sig: &AdaptorSignature) -> Result<()> {
        check_member(&self.cov_pks, cov_pk)?;
        self.check_fp(fp_pk)?;
        if self.sigs.contains_key(&(*fp_pk, *cov_pk)) {
            return Err(Error::DuplicateCovenantSig {
                cov_pk: cov_pk.to_string(),
                target: format!("finality provider {}", fp_pk),
            });
        }

        enc_verify_tx_sig_with_output(
            &self.slashing_tx,
            &self.funding_output,
            &self.slashing_script,
            cov_pk,
            &EncryptionKey::from_xonly(fp_pk)?,
            sig,
        )
    }

    /// Verify and record a single adaptor signature
    pub fn add_adaptor_signature(
        &mut self,
        cov_pk: &XOnlyPublicKey,
        fp_pk: &XOnlyPublicKey,
        sig: AdaptorSignature,
    ) -> Result<()> {
        self.check_new(cov_pk, fp_pk, &sig)?;
        self.sigs.insert((*fp_pk, *cov_pk), sig);
        Ok(())
    }

    /// Verify and record a member's full set. Nothing is recorded unless
    /// every signature in the set is valid.
    pub fn add_member_signatures(&mut self, contribution: &CovenantAdaptorSignatures) -> Result<()> {
        if contribution.adaptor_sigs.len() != self.fp_pks.len() {
            return Err(Error::invalid_input(format!(
                "expected {} adaptor signatures, got {}",
                self.fp_pks.len(),
                contribution.adaptor_sigs.len()
            )));
        }

        for (fp_pk, sig) in self.fp_pks.iter().zip(&contribution.adaptor_sigs) {
            self.check_new(&contribution.cov_pk, fp_pk, sig)?;
        }
        for (fp_pk, sig) in self.fp_pks.iter().zip(&contribution.adaptor_sigs) {
            self.sigs.insert((*fp_pk, contribution.cov_pk), *sig);
        }

        tracing::debug!(cov_pk = %contribution.cov_pk, fps = self.fp_pks.len(), "recorded covenant adaptor signatures");
        Ok(())
    }

    /// Number of members that signed for `fp_pk`
    pub fn signature_count(&self, fp_pk: &XOnlyPublicKey) -> usize {
        self.cov_pks
            .iter()
            .filter(|cov_pk| self.sigs.contains_key(&(*fp_pk, **cov_pk)))
            .count()
    }

    fn check_quorum_for(&self, fp_pk: &XOnlyPublicKey) -> Result<()> {
        let have = self.signature_count(fp_pk);
        let need = self.quorum as usize;
        if have < need {
            return Err(Error::CovenantQuorumNotMet {
                target: format!("finality provider {}", fp_pk),
                have,
                need,
            });
        }
        Ok(())
    }

    /// Every finality provider has at least `quorum` member signatures
    pub fn check_quorum(&self) -> Result<()> {
        self.fp_pks.iter().try_for_each(|fp_pk| self.check_quorum_for(fp_pk))
    }

    pub fn is_complete(&self) -> bool {
        self.check_quorum().is_ok()
    }

    /// Covenant slots of the slashing witness, decrypted with the key of the
    /// finality provider being slashed
    pub fn covenant_slots(&self, fp_pk: &XOnlyPublicKey, dk: &DecryptionKey) -> Result<Vec<Option<Signature>>> {
        self.check_fp(fp_pk)?;
        self.check_quorum_for(fp_pk)?;
        if dk.encryption_key() != EncryptionKey::from_xonly(fp_pk)? {
            return Err(Error::InvalidAdaptorSig(format!(
                "decryption key does not belong to {}",
                fp_pk
            )));
        }

        ordered_slots(&self.cov_pks, |cov_pk| {
            let Some(asig) = self.sigs.get(&(*fp_pk, *cov_pk)) else {
                return Ok(None);
            };
            let sig = asig.decrypt(dk)?;
            verify_tx_sig_with_output(
                &self.slashing_tx,
                &self.funding_output,
                &self.slashing_script,
                cov_pk,
                &sig,
            )?;
            Ok(Some(sig))
        })
    }

    /// Complete the slashing witness with the secret of a finality provider
    /// (typically extracted from equivocation evidence) and the staker's
    /// pre-signature
    pub fn slashing_witness(
        &self,
        spend_info: &SpendInfo,
        fp_sk: &SecretKey,
        staker_sig: &Signature,
    ) -> Result<Witness> {
        if spend_info.script != self.slashing_script {
            return Err(Error::InvalidScript("spend info is not the slashing leaf".into()));
        }
        verify_tx_sig_with_output(
            &self.slashing_tx,
            &self.funding_output,
            &self.slashing_script,
            &self.staker_pk,
            staker_sig,
        )?;

        let fp_pk = fp_sk.x_only_public_key(SECP256K1).0;
        let cov_slots = self.covenant_slots(&fp_pk, &DecryptionKey::from_secret_key(fp_sk)?)?;
        let fp_sig = sign_tx_with_output(&self.slashing_tx, &self.funding_output, &self.slashing_script, fp_sk)?;
        let fp_slots = fp_signature_slots(&self.fp_pks, &fp_pk, &fp_sig)?;

        Ok(slashing_path_witness(spend_info, &cov_slots, &fp_slots, staker_sig))
    }
}

// ============================================================================
// Unbonding
// ============================================================================

/// Covenant signatures collected for the unbonding tx
#[derive(Debug, Clone)]
pub struct UnbondingSignatures {
    unbonding_tx: Transaction,
    staking_output: TxOut,
    unbonding_script: ScriptBuf,
    staker_pk: XOnlyPublicKey,
    cov_pks: Vec<XOnlyPublicKey>,
    quorum: u32,
    sigs: HashMap<XOnlyPublicKey, Signature>,
}

impl UnbondingSignatures {
    pub fn new(data: &StakingScriptData, unbonding_tx: Transaction, staking_output: TxOut) -> Result<Self> {
        Ok(Self {
            unbonding_tx,
            staking_output,
            unbonding_script: data.unbonding_script()?,
            staker_pk: data.staker_pk,
            cov_pks: sort_keys(&data.cov_pks)?,
            quorum: data.cov_quorum,
            sigs: HashMap::new(),
        })
    }

    pub fn add_signature(&mut self, cov_pk: &XOnlyPublicKey, sig: Signature) -> Result<()> {
        check_member(&self.cov_pks, cov_pk)?;
        if self.sigs.contains_key(cov_pk) {
            return Err(Error::DuplicateCovenantSig {
                cov_pk: cov_pk.to_string(),
                target: "unbonding tx".into(),
            });
        }
        verify_tx_sig_with_output(
            &self.unbonding_tx,
            &self.staking_output,
            &self.unbonding_script,
            cov_pk,
            &sig,
        )?;
        self.sigs.insert(*cov_pk, sig);
        Ok(())
    }

    pub fn signature_count(&self) -> usize {
        self.sigs.len()
    }

    pub fn check_quorum(&self) -> Result<()> {
        let need = self.quorum as usize;
        if self.sigs.len() < need {
            return Err(Error::CovenantQuorumNotMet {
                target: "unbonding tx".into(),
                have: self.sigs.len(),
                need,
            });
        }
        Ok(())
    }

    pub fn covenant_slots(&self) -> Result<Vec<Option<Signature>>> {
        self.check_quorum()?;
        ordered_slots(&self.cov_pks, |cov_pk| Ok(self.sigs.get(cov_pk).copied()))
    }

    /// `[cov_sigs..., staker_sig, script, control_block]` for the unbonding leaf
    pub fn unbonding_witness(&self, spend_info: &SpendInfo, staker_sig: &Signature) -> Result<Witness> {
        if spend_info.script != self.unbonding_script {
            return Err(Error::InvalidScript("spend info is not the unbonding leaf".into()));
        }
        verify_tx_sig_with_output(
            &self.unbonding_tx,
            &self.staking_output,
            &self.unbonding_script,
            &self.staker_pk,
            staker_sig,
        )?;
        Ok(unbonding_path_witness(spend_info, &self.covenant_slots()?, staker_sig))
    }
}
