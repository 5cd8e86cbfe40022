//! Signatures over pre-signed transactions
//!
//! Every signature here commits to input 0 of the transaction under one
//! tapscript leaf of the output it spends, with SIGHASH_DEFAULT.

use bitcoin::hashes::Hash;
use bitcoin::sighash::{Prevouts, SighashCache};
use bitcoin::{Script, TapSighashType, Transaction, TxOut, XOnlyPublicKey};
use secp256k1::schnorr::Signature;
use secp256k1::SecretKey;

use crate::adaptor::{self, AdaptorSignature, EncryptionKey};
use crate::error::{Error, Result};
use crate::schnorr;
use crate::sighash::{tapscript_sighash, PrevOutputFetcher};

/// Sighash of input 0 of a single-input tx spending `funding_output` through
/// `path_script`
pub fn calc_sighash(transaction: &Transaction, funding_output: &TxOut, path_script: &Script) -> Result<[u8; 32]> {
    if transaction.input.len() != 1 {
        return Err(Error::invalid_tx(format!(
            "expected 1 input, got {}",
            transaction.input.len()
        )));
    }

    let sighash = SighashCache::new(transaction)
        .taproot_script_spend_signature_hash(
            0,
            &Prevouts::All(&[funding_output]),
            path_script.tapscript_leaf_hash(),
            TapSighashType::Default,
        )
        .map_err(|e| Error::invalid_tx(format!("sighash: {}", e)))?;
    Ok(sighash.to_byte_array())
}

pub fn sign_tx_with_output(
    transaction: &Transaction,
    funding_output: &TxOut,
    path_script: &Script,
    sk: &SecretKey,
) -> Result<Signature> {
    let sighash = calc_sighash(transaction, funding_output, path_script)?;
    Ok(schnorr::sign(sk, &sighash))
}

/// Verify a Schnorr signature of a single-input tx under the given spend path
pub fn verify_tx_sig_with_output(
    transaction: &Transaction,
    funding_output: &TxOut,
    path_script: &Script,
    pub_key: &XOnlyPublicKey,
    signature: &Signature,
) -> Result<()> {
    let sighash = calc_sighash(transaction, funding_output, path_script)?;
    schnorr::verify_signature(pub_key, &sighash, signature).inspect_err(|_| {
        tracing::debug!(signer = %pub_key, "transaction signature rejected");
    })
}

/// Adaptor-sign a single-input tx, encrypted under `enc_key`
pub fn enc_sign_tx_with_output(
    transaction: &Transaction,
    funding_output: &TxOut,
    path_script: &Script,
    sk: &SecretKey,
    enc_key: &EncryptionKey,
) -> Result<AdaptorSignature> {
    let sighash = calc_sighash(transaction, funding_output, path_script)?;
    adaptor::enc_sign(sk, enc_key, &sighash)
}

/// Verify an adaptor signature of a single-input tx
pub fn enc_verify_tx_sig_with_output(
    transaction: &Transaction,
    funding_output: &TxOut,
    path_script: &Script,
    pub_key: &XOnlyPublicKey,
    enc_key: &EncryptionKey,
    signature: &AdaptorSignature,
) -> Result<()> {
    let sighash = calc_sighash(transaction, funding_output, path_script)?;
    signature.enc_verify(pub_key, enc_key, &sighash)
}

// ============================================================================
// Stake expansion
// ============================================================================

/// Sighash of input 0 of a stake-expansion tx.
///
/// The tx spends the previous staking output (input 0) and one funding
/// output (input 1); `prev_outputs` must resolve both.
pub fn calc_stake_expansion_sighash(
    transaction: &Transaction,
    prev_outputs: &PrevOutputFetcher,
    path_script: &Script,
) -> Result<[u8; 32]> {
    if transaction.input.len() != 2 {
        return Err(Error::invalid_tx(format!(
            "stake expansion tx must have 2 inputs, got {}",
            transaction.input.len()
        )));
    }
    tapscript_sighash(
        transaction,
        0,
        prev_outputs,
        path_script.tapscript_leaf_hash(),
        TapSighashType::Default,
    )
}

pub fn sign_stake_expansion_tx(
    transaction: &Transaction,
    prev_outputs: &PrevOutputFetcher,
    path_script: &Script,
    sk: &SecretKey,
) -> Result<Signature> {
    let sighash = calc_stake_expansion_sighash(transaction, prev_outputs, path_script)?;
    Ok(schnorr::sign(sk, &sighash))
}

pub fn verify_stake_expansion_sig(
    transaction: &Transaction,
    prev_outputs: &PrevOutputFetcher,
    path_script: &Script,
    pub_key: &XOnlyPublicKey,
    signature: &Signature,
) -> Result<()> {
    let sighash = calc_stake_expansion_sighash(transaction, prev_outputs, path_script)?;
    schnorr::verify_signature(pub_key, &sighash, signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adaptor::DecryptionKey;
    use crate::scripts::StakingInfo;
    use crate::test_utils::{funding_tx, key_pair, sample_script_data};
    use crate::tx::{build_unbonding_info, build_unbonding_tx};
    use bitcoin::absolute::LockTime;
    use bitcoin::transaction::Version;
    use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, TxIn, Witness};

    fn unbonding_fixture() -> (Transaction, TxOut, ScriptBuf) {
        let data = sample_script_data();
        let value = Amount::from_sat(1_000_000);
        let info = StakingInfo::new(&data, 1000, value).unwrap();
        let staking_tx = funding_tx(vec![info.staking_output.clone()]);
        let unbonding_info = build_unbonding_info(&data, 101, value, Amount::from_sat(1_000)).unwrap();
        let unbonding_tx = build_unbonding_tx(&staking_tx, 0, &unbonding_info, Amount::from_sat(1_000)).unwrap();
        (unbonding_tx, info.staking_output, data.unbonding_script().unwrap())
    }

    #[test]
    fn test_sign_and_verify_tx() {
        let (tx, out, script) = unbonding_fixture();
        let (sk, pk) = key_pair(b"covenant 0");
        let sig = sign_tx_with_output(&tx, &out, &script, &sk).unwrap();
        verify_tx_sig_with_output(&tx, &out, &script, &pk, &sig).unwrap();

        let (_, other) = key_pair(b"covenant 1");
        assert!(verify_tx_sig_with_output(&tx, &out, &script, &other, &sig).is_err());

        // a different leaf changes the digest
        let timelock = ScriptBuf::from_hex("51").unwrap();
        assert!(verify_tx_sig_with_output(&tx, &out, &timelock, &pk, &sig).is_err());
    }

    #[test]
    fn test_enc_sign_and_decrypt_tx() {
        let (tx, out, script) = unbonding_fixture();
        let (sk, pk) = key_pair(b"covenant 0");
        let (fp_sk, fp_pk) = key_pair(b"fp");
        let ek = EncryptionKey::from_xonly(&fp_pk).unwrap();

        let asig = enc_sign_tx_with_output(&tx, &out, &script, &sk, &ek).unwrap();
        enc_verify_tx_sig_with_output(&tx, &out, &script, &pk, &ek, &asig).unwrap();

        let sig = asig.decrypt(&DecryptionKey::from_secret_key(&fp_sk).unwrap()).unwrap();
        verify_tx_sig_with_output(&tx, &out, &script, &pk, &sig).unwrap();
    }

    #[test]
    fn test_calc_sighash_rejects_multi_input() {
        let (mut tx, out, script) = unbonding_fixture();
        let mut second = tx.input[0].clone();
        second.previous_output.vout = 7;
        tx.input.push(second);
        assert!(matches!(calc_sighash(&tx, &out, &script), Err(Error::InvalidTx(_))));
    }

    #[test]
    fn test_stake_expansion_signature() {
        let (_, prev_staking_out, script) = unbonding_fixture();
        let funding_out = TxOut {
            value: Amount::from_sat(50_000),
            script_pubkey: ScriptBuf::from_hex("00140404040404040404040404040404040404040404").unwrap(),
        };
        let prev_op = OutPoint::new(funding_tx(vec![prev_staking_out.clone()]).compute_txid(), 0);
        let funding_op = OutPoint::new(funding_tx(vec![funding_out.clone()]).compute_txid(), 0);

        let input = |previous_output| TxIn {
            previous_output,
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        };
        let tx = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![input(prev_op), input(funding_op)],
            output: vec![TxOut {
                value: Amount::from_sat(1_040_000),
                script_pubkey: prev_staking_out.script_pubkey.clone(),
            }],
        };

        let fetcher = PrevOutputFetcher::new()
            .with(prev_op, prev_staking_out.clone())
            .with(funding_op, funding_out.clone());
        let (sk, pk) = key_pair(b"covenant 2");
        let sig = sign_stake_expansion_tx(&tx, &fetcher, &script, &sk).unwrap();
        verify_stake_expansion_sig(&tx, &fetcher, &script, &pk, &sig).unwrap();

        // the digest commits to the funding input's amount
        let mut cheaper = funding_out;
        cheaper.value = Amount::from_sat(49_999);
        let tampered = PrevOutputFetcher::new()
            .with(prev_op, prev_staking_out)
            .with(funding_op, cheaper);
        assert!(verify_stake_expansion_sig(&tx, &tampered, &script, &pk, &sig).is_err());

        let partial = PrevOutputFetcher::new().with(prev_op, tx.output[0].clone());
        assert!(calc_stake_expansion_sighash(&tx, &partial, &script).is_err());
    }
}
