//! BIP-322 generic message signing, "simple" variant
//!
//! A signature is the witness of a virtual `to_sign` transaction spending
//! the single output of a virtual `to_spend` transaction that commits to
//! the message. Only P2WPKH and P2TR addresses are accepted.

use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode::{deserialize, serialize};
use bitcoin::hashes::Hash;
use bitcoin::key::{Keypair, TapTweak};
use bitcoin::opcodes::all::OP_RETURN;
use bitcoin::script::Builder as ScriptBuilder;
use bitcoin::sighash::{Prevouts, SighashCache};
use bitcoin::transaction::Version;
use bitcoin::{
    Amount, EcdsaSighashType, OutPoint, Script, ScriptBuf, Sequence, TapSighashType, Transaction, TxIn, TxOut,
    Txid, Witness,
};
use secp256k1::{Message, SecretKey, SECP256K1};

use crate::address::{AddressType, BtcAddress};
use crate::config::BtcNetwork;
use crate::error::{Error, Result};
use crate::interpreter;
use crate::primitives::{tagged_hash, TAG_BIP322_SIGNED_MESSAGE};

/// `H_BIP0322-signed-message(message)`
pub fn message_hash(message: &[u8]) -> [u8; 32] {
    tagged_hash(TAG_BIP322_SIGNED_MESSAGE, &[message])
}

/// Virtual transaction committing to the message and paying the signer
pub fn to_spend_tx(message: &[u8], script_pubkey: &Script) -> Transaction {
    let script_sig = ScriptBuilder::new()
        .push_int(0)
        .push_slice(message_hash(message))
        .into_script();

    Transaction {
        version: Version(0),
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint {
                txid: Txid::all_zeros(),
                vout: 0xffff_ffff,
            },
            script_sig,
            sequence: Sequence::ZERO,
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value: Amount::ZERO,
            script_pubkey: script_pubkey.to_owned(),
        }],
    }
}

/// Virtual transaction spending `to_spend` with the signature witness
pub fn to_sign_tx(to_spend: &Transaction, witness: Witness) -> Transaction {
    Transaction {
        version: Version(0),
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint {
                txid: to_spend.compute_txid(),
                vout: 0,
            },
            script_sig: ScriptBuf::new(),
            sequence: Sequence::ZERO,
            witness,
        }],
        output: vec![TxOut {
            value: Amount::ZERO,
            script_pubkey: ScriptBuilder::new().push_opcode(OP_RETURN).into_script(),
        }],
    }
}

/// Only SIGHASH_DEFAULT / SIGHASH_ALL signatures are accepted
fn check_sighash_type(address_type: AddressType, witness: &Witness) -> Result<()> {
    let sig = witness
        .nth(0)
        .ok_or_else(|| Error::invalid_bip322("empty witness"))?;

    let allowed = match address_type {
        AddressType::P2tr => sig.len() == 64 || (sig.len() == 65 && sig[64] == TapSighashType::All as u8),
        AddressType::P2wpkh => sig.last() == Some(&(EcdsaSighashType::All as u8)),
        other => return Err(Error::UnsupportedAddress(other.to_string())),
    };
    if !allowed {
        return Err(Error::invalid_bip322(format!(
            "{} signature must use SIGHASH_ALL",
            address_type
        )));
    }
    Ok(())
}

/// Verify a simple signature over `message` by `address`
pub fn verify(message: &[u8], witness: &Witness, address: &str, network: BtcNetwork) -> Result<()> {
    let address = BtcAddress::parse(address, network)?;
    verify_for_address(message, witness, &address)
}

pub fn verify_for_address(message: &[u8], witness: &Witness, address: &BtcAddress) -> Result<()> {
    check_sighash_type(address.address_type(), witness)?;

    let to_spend = to_spend_tx(message, &address.script_pubkey());
    let to_sign = to_sign_tx(&to_spend, witness.clone());
    interpreter::verify_input(&to_sign, 0, &to_spend.output).map_err(|e| {
        tracing::debug!(error = %e, "BIP-322 signature rejected");
        Error::invalid_bip322(e.to_string())
    })
}

/// Key-path signature by the BIP-86 address of `sk`
pub fn sign_bip322_p2tr(message: &[u8], sk: &SecretKey) -> Result<Witness> {
    let keypair = Keypair::from_secret_key(SECP256K1, sk);
    let (internal_key, _) = keypair.x_only_public_key();
    let address = BtcAddress::p2tr(&internal_key);

    let to_spend = to_spend_tx(message, &address.script_pubkey());
    let to_sign = to_sign_tx(&to_spend, Witness::new());
    let sighash = SighashCache::new(&to_sign)
        .taproot_key_spend_signature_hash(0, &Prevouts::All(&to_spend.output), TapSighashType::Default)
        .map_err(|e| Error::invalid_input(e.to_string()))?;

    let tweaked = keypair.tap_tweak(SECP256K1, None).to_inner();
    let sig = SECP256K1.sign_schnorr(&Message::from_digest(sighash.to_byte_array()), &tweaked);

    let mut witness = Witness::new();
    witness.push(sig.serialize());
    Ok(witness)
}

/// ECDSA signature by the P2WPKH address of `sk`
pub fn sign_bip322_p2wpkh(message: &[u8], sk: &SecretKey) -> Result<Witness> {
    let pk = sk.public_key(SECP256K1);
    let address = BtcAddress::p2wpkh(&pk);

    let to_spend = to_spend_tx(message, &address.script_pubkey());
    let to_sign = to_sign_tx(&to_spend, Witness::new());
    let prevout = &to_spend.output[0];
    let sighash = SighashCache::new(&to_sign)
        .p2wpkh_signature_hash(0, &prevout.script_pubkey, prevout.value, EcdsaSighashType::All)
        .map_err(|e| Error::invalid_input(e.to_string()))?;
    let sig = SECP256K1.sign_ecdsa(&Message::from_digest(sighash.to_byte_array()), sk);

    let mut sig_bytes = sig.serialize_der().to_vec();
    sig_bytes.push(EcdsaSighashType::All as u8);

    let mut witness = Witness::new();
    witness.push(sig_bytes);
    witness.push(pk.serialize());
    Ok(witness)
}

/// Base64 of the consensus-encoded witness
pub fn encode_simple_signature(witness: &Witness) -> String {
    base64::Engine::encode(&base64::engine::general_purpose::STANDARD, serialize(witness))
}

pub fn decode_simple_signature(s: &str) -> Result<Witness> {
    let bytes = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, s)
        .map_err(|e| Error::invalid_bip322(format!("invalid base64: {}", e)))?;
    Ok(deserialize(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::key_pair;
    use bitcoin::PrivateKey;

    const WIF: &str = "L3VFeEujGtevx9w18HD1fhRbCH67Az2dpCymeRE1SoPK6XQtaN2k";
    const P2WPKH_ADDRESS: &str = "bc1q9vza2e8x573nczrlzms0wvx3gsqjx7vavgkx0l";

    fn wif_key() -> SecretKey {
        PrivateKey::from_wif(WIF).unwrap().inner
    }

    #[test]
    fn test_message_hash_vectors() {
        assert_eq!(
            hex::encode(message_hash(b"")),
            "c90c269c4f8fcbe6880f72a721ddfbf1914268a794cbb21cfafee13770ae19f1"
        );
        assert_eq!(
            hex::encode(message_hash(b"Hello World")),
            "f0eb03b1a75ac6d9847f55c624a99169b5dccba2a31f5b23bea77ba270de0a7a"
        );
    }

    #[test]
    fn test_wif_key_address() {
        let pk = wif_key().public_key(SECP256K1);
        let address = BtcAddress::p2wpkh(&pk);
        assert_eq!(address.encode(BtcNetwork::Mainnet).unwrap(), P2WPKH_ADDRESS);
    }

    #[test]
    fn test_virtual_transactions() {
        let address = BtcAddress::parse(P2WPKH_ADDRESS, BtcNetwork::Mainnet).unwrap();
        let to_spend = to_spend_tx(b"Hello World", &address.script_pubkey());
        assert_eq!(to_spend.version, Version(0));
        assert_eq!(to_spend.input[0].sequence, Sequence::ZERO);
        assert_eq!(to_spend.input[0].script_sig.len(), 34);
        assert_eq!(to_spend.output[0].value, Amount::ZERO);

        let to_sign = to_sign_tx(&to_spend, Witness::new());
        assert_eq!(to_sign.input[0].previous_output.txid, to_spend.compute_txid());
        assert_eq!(to_sign.output[0].script_pubkey.as_bytes(), &[0x6a]);
    }

    #[test]
    fn test_p2wpkh_sign_and_verify() {
        let witness = sign_bip322_p2wpkh(b"Hello World", &wif_key()).unwrap();
        verify(b"Hello World", &witness, P2WPKH_ADDRESS, BtcNetwork::Mainnet).unwrap();

        let err = verify(b"Hello World!", &witness, P2WPKH_ADDRESS, BtcNetwork::Mainnet).unwrap_err();
        assert!(matches!(err, Error::InvalidBip322(_)));

        let encoded = encode_simple_signature(&witness);
        assert_eq!(decode_simple_signature(&encoded).unwrap(), witness);
    }

    #[test]
    fn test_p2wpkh_sighash_byte_rejected() {
        let witness = sign_bip322_p2wpkh(b"Hello World", &wif_key()).unwrap();
        let mut sig = witness.nth(0).unwrap().to_vec();
        *sig.last_mut().unwrap() = 0x02;
        let tampered = Witness::from_slice(&[sig, witness.nth(1).unwrap().to_vec()]);

        let err = verify(b"Hello World", &tampered, P2WPKH_ADDRESS, BtcNetwork::Mainnet).unwrap_err();
        assert!(matches!(err, Error::InvalidBip322(_)));
    }

    #[test]
    fn test_p2tr_sign_and_verify() {
        let (sk, pk) = key_pair(b"bip322 taproot");
        let address = BtcAddress::p2tr(&pk).encode(BtcNetwork::Signet).unwrap();

        let witness = sign_bip322_p2tr(b"Hello World", &sk).unwrap();
        verify(b"Hello World", &witness, &address, BtcNetwork::Signet).unwrap();
        assert!(verify(b"other", &witness, &address, BtcNetwork::Signet).is_err());

        // explicit SIGHASH_ALL byte on a DEFAULT signature fails in the VM
        let mut sig = witness.nth(0).unwrap().to_vec();
        sig.push(0x01);
        let all = Witness::from_slice(&[sig.clone()]);
        assert!(matches!(
            verify(b"Hello World", &all, &address, BtcNetwork::Signet),
            Err(Error::InvalidBip322(_))
        ));

        *sig.last_mut().unwrap() = 0x02;
        let none = Witness::from_slice(&[sig]);
        assert!(matches!(
            verify(b"Hello World", &none, &address, BtcNetwork::Signet),
            Err(Error::InvalidBip322(_))
        ));
    }

    #[test]
    fn test_unsupported_address() {
        let witness = sign_bip322_p2wpkh(b"msg", &wif_key()).unwrap();
        let err = verify(b"msg", &witness, "1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2", BtcNetwork::Mainnet).unwrap_err();
        assert!(matches!(err, Error::UnsupportedAddress(_)));

        assert!(verify(b"msg", &Witness::new(), P2WPKH_ADDRESS, BtcNetwork::Mainnet).is_err());
    }
}
