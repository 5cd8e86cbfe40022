//! Proof of possession
//!
//! Binds a Babylon account address to a BTC key: the holder of the BTC key
//! signs `context ‖ account_bytes` (or, for ECDSA, `context ‖ bech32(account)`).

use std::fmt;
use std::str::FromStr;

use bitcoin::consensus::encode::{deserialize, deserialize_partial, serialize};
use bitcoin::hashes::Hash;
use bitcoin::key::Parity;
use bitcoin::sign_message::{signed_msg_hash, MessageSignature};
use bitcoin::{Witness, XOnlyPublicKey};
use secp256k1::schnorr::Signature;
use secp256k1::{Message, SecretKey, SECP256K1};

use crate::address::{encode_bech32_account, BtcAddress};
use crate::bip322;
use crate::config::BtcNetwork;
use crate::error::{Error, Result};
use crate::primitives::sha256;
use crate::schnorr;

/// Babylon account address as raw bytes plus its bech32 prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountAddress {
    pub hrp: String,
    pub bytes: Vec<u8>,
}

impl AccountAddress {
    pub fn new(hrp: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            hrp: hrp.into(),
            bytes: bytes.into(),
        }
    }

    pub fn to_bech32(&self) -> Result<String> {
        encode_bech32_account(&self.hrp, &self.bytes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BtcSigType {
    Bip340,
    Bip322,
    Ecdsa,
}

impl BtcSigType {
    pub fn as_str_name(&self) -> &'static str {
        match self {
            BtcSigType::Bip340 => "BIP340",
            BtcSigType::Bip322 => "BIP322",
            BtcSigType::Ecdsa => "ECDSA",
        }
    }
}

impl fmt::Display for BtcSigType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str_name())
    }
}

impl FromStr for BtcSigType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "BIP340" => Ok(BtcSigType::Bip340),
            "BIP322" => Ok(BtcSigType::Bip322),
            "ECDSA" => Ok(BtcSigType::Ecdsa),
            _ => Err(Error::invalid_input(format!("unknown BTC signature type: {}", s))),
        }
    }
}

impl TryFrom<i32> for BtcSigType {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(BtcSigType::Bip340),
            1 => Ok(BtcSigType::Bip322),
            2 => Ok(BtcSigType::Ecdsa),
            _ => Err(Error::invalid_input(format!("unknown BTC signature type: {}", value))),
        }
    }
}

/// BIP-322 proof payload: the signing address and the simple-signature
/// witness
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bip322Sig {
    pub address: String,
    pub witness: Witness,
}

impl Bip322Sig {
    /// Consensus encoding of the address string followed by the witness
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = serialize(&self.address);
        out.extend(serialize(&self.witness));
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (address, consumed): (String, usize) = deserialize_partial(bytes)?;
        let witness: Witness = deserialize(&bytes[consumed..])?;
        Ok(Self { address, witness })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofOfPossession {
    pub btc_sig_type: BtcSigType,
    pub btc_sig: Vec<u8>,
}

fn bip340_digest(context: &str, account: &AccountAddress) -> [u8; 32] {
    let mut msg = context.as_bytes().to_vec();
    msg.extend_from_slice(&account.bytes);
    sha256(&msg)
}

fn ecdsa_message(context: &str, account: &AccountAddress) -> Result<String> {
    Ok(format!("{}{}", context, account.to_bech32()?))
}

fn bip322_message(context: &str, account: &AccountAddress) -> Vec<u8> {
    let mut msg = context.as_bytes().to_vec();
    msg.extend_from_slice(&account.bytes);
    msg
}

impl ProofOfPossession {
    pub fn new_bip340(context: &str, account: &AccountAddress, sk: &SecretKey) -> Result<Self> {
        let sig = schnorr::sign(sk, &bip340_digest(context, account));
        Ok(Self {
            btc_sig_type: BtcSigType::Bip340,
            btc_sig: sig.serialize().to_vec(),
        })
    }

    /// Bitcoin signed-message ECDSA signature, 65-byte compact recoverable
    pub fn new_ecdsa(context: &str, account: &AccountAddress, sk: &SecretKey) -> Result<Self> {
        let msg_hash = signed_msg_hash(&ecdsa_message(context, account)?);
        let sig = SECP256K1.sign_ecdsa_recoverable(&Message::from_digest(msg_hash.to_byte_array()), sk);
        Ok(Self {
            btc_sig_type: BtcSigType::Ecdsa,
            btc_sig: MessageSignature::new(sig, true).serialize().to_vec(),
        })
    }

    /// BIP-322 signature by the BIP-86 P2TR address of `sk`
    pub fn new_bip322_p2tr(
        context: &str,
        account: &AccountAddress,
        sk: &SecretKey,
        network: BtcNetwork,
    ) -> Result<Self> {
        let (internal_key, _) = sk.x_only_public_key(SECP256K1);
        let address = BtcAddress::p2tr(&internal_key).encode(network)?;
        let witness = bip322::sign_bip322_p2tr(&bip322_message(context, account), sk)?;
        Ok(Self::bip322(address, witness))
    }

    /// BIP-322 signature by the P2WPKH address of `sk`
    pub fn new_bip322_p2wpkh(
        context: &str,
        account: &AccountAddress,
        sk: &SecretKey,
        network: BtcNetwork,
    ) -> Result<Self> {
        let address = BtcAddress::p2wpkh(&sk.public_key(SECP256K1)).encode(network)?;
        let witness = bip322::sign_bip322_p2wpkh(&bip322_message(context, account), sk)?;
        Ok(Self::bip322(address, witness))
    }

    fn bip322(address: String, witness: Witness) -> Self {
        Self {
            btc_sig_type: BtcSigType::Bip322,
            btc_sig: Bip322Sig { address, witness }.to_bytes(),
        }
    }

    /// Check that the holder of `btc_pk` signed `account` under `context`
    pub fn verify(
        &self,
        context: &str,
        account: &AccountAddress,
        btc_pk: &XOnlyPublicKey,
        network: BtcNetwork,
    ) -> Result<()> {
        let result = match self.btc_sig_type {
            BtcSigType::Bip340 => self.verify_bip340(context, account, btc_pk),
            BtcSigType::Ecdsa => self.verify_ecdsa(context, account, btc_pk),
            BtcSigType::Bip322 => self.verify_bip322(context, account, btc_pk, network),
        };
        result.inspect_err(|e| {
            tracing::debug!(sig_type = %self.btc_sig_type, btc_pk = %btc_pk, error = %e, "proof of possession rejected");
        })
    }

    fn verify_bip340(&self, context: &str, account: &AccountAddress, btc_pk: &XOnlyPublicKey) -> Result<()> {
        let sig = Signature::from_slice(&self.btc_sig)
            .map_err(|e| Error::invalid_signature(format!("malformed BIP-340 signature: {}", e)))?;
        schnorr::verify_signature(btc_pk, &bip340_digest(context, account), &sig)
    }

    fn verify_ecdsa(&self, context: &str, account: &AccountAddress, btc_pk: &XOnlyPublicKey) -> Result<()> {
        let sig = MessageSignature::from_slice(&self.btc_sig)
            .map_err(|e| Error::invalid_signature(format!("malformed ECDSA signature: {}", e)))?;
        let msg_hash = signed_msg_hash(&ecdsa_message(context, account)?);
        let recovered = sig
            .recover_pubkey(SECP256K1, msg_hash)
            .map_err(|e| Error::invalid_signature(e.to_string()))?;

        if recovered.inner.x_only_public_key().0 != *btc_pk {
            return Err(Error::invalid_signature("ECDSA signature recovers a different key"));
        }
        Ok(())
    }

    fn verify_bip322(
        &self,
        context: &str,
        account: &AccountAddress,
        btc_pk: &XOnlyPublicKey,
        network: BtcNetwork,
    ) -> Result<()> {
        let sig = Bip322Sig::from_bytes(&self.btc_sig)?;
        let address = BtcAddress::parse(&sig.address, network)?;

        // P2TR is the BIP-86 address of the key; P2WPKH may hash either parity
        let owned = match address {
            BtcAddress::P2tr(_) => address == BtcAddress::p2tr(btc_pk),
            BtcAddress::P2wpkh(_) => [Parity::Even, Parity::Odd]
                .into_iter()
                .any(|parity| address == BtcAddress::p2wpkh(&btc_pk.public_key(parity))),
        };
        if !owned {
            return Err(Error::invalid_bip322(format!(
                "address {} does not belong to {}",
                sig.address, btc_pk
            )));
        }

        bip322::verify_for_address(&bip322_message(context, account), &sig.witness, &address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::key_pair;

    const CONTEXT: &str = "btcstaking/0/staker_pop/bbn-test-5";

    fn account() -> AccountAddress {
        AccountAddress::new("bbn", [0x11u8; 20])
    }

    #[test]
    fn test_sig_type_names() {
        for ty in [BtcSigType::Bip340, BtcSigType::Bip322, BtcSigType::Ecdsa] {
            assert_eq!(ty.as_str_name().parse::<BtcSigType>().unwrap(), ty);
        }
        assert_eq!(BtcSigType::try_from(2).unwrap(), BtcSigType::Ecdsa);
        assert!(BtcSigType::try_from(3).is_err());
    }

    #[test]
    fn test_bip340_pop() {
        let (sk, pk) = key_pair(b"pop staker");
        let pop = ProofOfPossession::new_bip340(CONTEXT, &account(), &sk).unwrap();
        assert_eq!(pop.btc_sig.len(), 64);
        pop.verify(CONTEXT, &account(), &pk, BtcNetwork::Signet).unwrap();

        let other = AccountAddress::new("bbn", [0x12u8; 20]);
        assert!(matches!(
            pop.verify(CONTEXT, &other, &pk, BtcNetwork::Signet),
            Err(Error::InvalidSignature(_))
        ));
        assert!(pop.verify("other context", &account(), &pk, BtcNetwork::Signet).is_err());
    }

    #[test]
    fn test_ecdsa_pop() {
        let (sk, pk) = key_pair(b"pop staker");
        let pop = ProofOfPossession::new_ecdsa(CONTEXT, &account(), &sk).unwrap();
        assert_eq!(pop.btc_sig.len(), 65);
        pop.verify(CONTEXT, &account(), &pk, BtcNetwork::Signet).unwrap();

        let (_, other_pk) = key_pair(b"someone else");
        assert!(pop.verify(CONTEXT, &account(), &other_pk, BtcNetwork::Signet).is_err());
    }

    #[test]
    fn test_bip322_pop_p2tr() {
        let (sk, pk) = key_pair(b"pop staker");
        let pop = ProofOfPossession::new_bip322_p2tr(CONTEXT, &account(), &sk, BtcNetwork::Signet).unwrap();
        pop.verify(CONTEXT, &account(), &pk, BtcNetwork::Signet).unwrap();

        let other = AccountAddress::new("bbn", [0x12u8; 20]);
        assert!(matches!(
            pop.verify(CONTEXT, &other, &pk, BtcNetwork::Signet),
            Err(Error::InvalidBip322(_))
        ));
    }

    #[test]
    fn test_bip322_pop_p2wpkh() {
        let (sk, pk) = key_pair(b"pop staker");
        let pop = ProofOfPossession::new_bip322_p2wpkh(CONTEXT, &account(), &sk, BtcNetwork::Signet).unwrap();
        pop.verify(CONTEXT, &account(), &pk, BtcNetwork::Signet).unwrap();

        // signed by the key, but claimed for another one
        let (_, other_pk) = key_pair(b"someone else");
        assert!(matches!(
            pop.verify(CONTEXT, &account(), &other_pk, BtcNetwork::Signet),
            Err(Error::InvalidBip322(_))
        ));
    }

    #[test]
    fn test_bip322_pop_wrong_network() {
        let (sk, pk) = key_pair(b"pop staker");
        let pop = ProofOfPossession::new_bip322_p2tr(CONTEXT, &account(), &sk, BtcNetwork::Mainnet).unwrap();
        assert!(pop.verify(CONTEXT, &account(), &pk, BtcNetwork::Regtest).is_err());
    }

    #[test]
    fn test_bip322_sig_bytes() {
        let (sk, _) = key_pair(b"pop staker");
        let pop = ProofOfPossession::new_bip322_p2wpkh(CONTEXT, &account(), &sk, BtcNetwork::Mainnet).unwrap();
        let sig = Bip322Sig::from_bytes(&pop.btc_sig).unwrap();
        assert!(sig.address.starts_with("bc1q"));
        assert_eq!(sig.witness.len(), 2);
        assert_eq!(sig.to_bytes(), pop.btc_sig);

        assert!(Bip322Sig::from_bytes(&[0x05, b'b']).is_err());
    }

    #[test]
    fn test_mismatched_sig_type() {
        let (sk, pk) = key_pair(b"pop staker");
        let mut pop = ProofOfPossession::new_bip340(CONTEXT, &account(), &sk).unwrap();
        pop.btc_sig_type = BtcSigType::Ecdsa;
        assert!(pop.verify(CONTEXT, &account(), &pk, BtcNetwork::Signet).is_err());
    }
}
