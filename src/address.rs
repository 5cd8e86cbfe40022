//! Bitcoin address handling
//!
//! Only native segwit P2WPKH and Taproot P2TR addresses take part in
//! staking proofs. Everything else is classified into [`AddressType`] for
//! error reporting and then rejected.

use std::fmt;
use std::str::FromStr;

use bitcoin::bech32::{self, segwit, Fe32, Hrp};
use bitcoin::hashes::Hash;
use bitcoin::key::{TapTweak, TweakedPublicKey};
use bitcoin::{
    Address, CompressedPublicKey, Script, ScriptBuf, WPubkeyHash, WitnessProgram, WitnessVersion, XOnlyPublicKey,
};
use secp256k1::{PublicKey, SECP256K1};

use crate::config::BtcNetwork;
use crate::error::{Error, Result};

/// Bitcoin address type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressType {
    /// Legacy P2PKH (starts with 1 or m/n)
    P2pkh,
    /// Legacy P2SH (starts with 3 or 2)
    P2sh,
    P2wpkh,
    P2wsh,
    P2tr,
    Unknown,
}

impl fmt::Display for AddressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AddressType::P2pkh => "p2pkh",
            AddressType::P2sh => "p2sh",
            AddressType::P2wpkh => "p2wpkh",
            AddressType::P2wsh => "p2wsh",
            AddressType::P2tr => "p2tr",
            AddressType::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

impl AddressType {
    /// Classify an output script
    pub fn of_script(script: &Script) -> Self {
        if script.is_p2pkh() {
            AddressType::P2pkh
        } else if script.is_p2sh() {
            AddressType::P2sh
        } else if script.is_p2wpkh() {
            AddressType::P2wpkh
        } else if script.is_p2wsh() {
            AddressType::P2wsh
        } else if script.is_p2tr() {
            AddressType::P2tr
        } else {
            AddressType::Unknown
        }
    }
}

/// A P2WPKH or P2TR address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BtcAddress {
    P2wpkh(WPubkeyHash),
    /// Tweaked output key
    P2tr(XOnlyPublicKey),
}

impl BtcAddress {
    /// Pay to the hash of a compressed key
    pub fn p2wpkh(pk: &PublicKey) -> Self {
        BtcAddress::P2wpkh(CompressedPublicKey(*pk).wpubkey_hash())
    }

    /// BIP-86 key-path-only Taproot address of an internal key
    pub fn p2tr(internal_key: &XOnlyPublicKey) -> Self {
        let (output_key, _) = internal_key.tap_tweak(SECP256K1, None);
        BtcAddress::P2tr(output_key.to_inner())
    }

    /// Parse an address, checking it belongs to `network`
    pub fn parse(address: &str, network: BtcNetwork) -> Result<Self> {
        let script_pubkey = match network.to_bitcoin_network() {
            Some(net) => Address::from_str(address)
                .map_err(|e| Error::invalid_input(format!("malformed address {}: {}", address, e)))?
                .require_network(net)
                .map_err(|_| Error::invalid_input(format!("address {} is not a {} address", address, network)))?
                .script_pubkey(),
            None => decode_segwit(address, network)?,
        };

        Self::from_script_pubkey(&script_pubkey).map_err(|_| {
            Error::UnsupportedAddress(format!("{} ({})", address, AddressType::of_script(&script_pubkey)))
        })
    }

    /// Recover the address from an output script
    pub fn from_script_pubkey(script: &Script) -> Result<Self> {
        if script.is_p2wpkh() {
            let hash = WPubkeyHash::from_slice(&script.as_bytes()[2..])
                .map_err(|e| Error::invalid_input(e.to_string()))?;
            return Ok(BtcAddress::P2wpkh(hash));
        }
        if script.is_p2tr() {
            let key = XOnlyPublicKey::from_slice(&script.as_bytes()[2..])
                .map_err(|e| Error::InvalidPubKey(e.to_string()))?;
            return Ok(BtcAddress::P2tr(key));
        }
        Err(Error::UnsupportedAddress(format!(
            "{} script {}",
            AddressType::of_script(script),
            script.to_hex_string()
        )))
    }

    pub fn address_type(&self) -> AddressType {
        match self {
            BtcAddress::P2wpkh(_) => AddressType::P2wpkh,
            BtcAddress::P2tr(_) => AddressType::P2tr,
        }
    }

    pub fn script_pubkey(&self) -> ScriptBuf {
        match self {
            BtcAddress::P2wpkh(hash) => ScriptBuf::new_p2wpkh(hash),
            BtcAddress::P2tr(key) => ScriptBuf::new_p2tr_tweaked(TweakedPublicKey::dangerous_assume_tweaked(*key)),
        }
    }

    /// bech32 for P2WPKH, bech32m for P2TR
    pub fn encode(&self, network: BtcNetwork) -> Result<String> {
        let hrp = Hrp::parse(network.bech32_hrp()).map_err(|e| Error::invalid_input(e.to_string()))?;
        let encoded = match self {
            BtcAddress::P2wpkh(hash) => segwit::encode(hrp, Fe32::Q, hash.as_byte_array()),
            BtcAddress::P2tr(key) => segwit::encode(hrp, Fe32::P, &key.serialize()),
        };
        encoded.map_err(|e| Error::invalid_input(e.to_string()))
    }

    /// A displayable form bound to a network
    pub fn display(&self, network: BtcNetwork) -> AddressDisplay<'_> {
        AddressDisplay { address: self, network }
    }
}

pub struct AddressDisplay<'a> {
    address: &'a BtcAddress,
    network: BtcNetwork,
}

impl fmt::Display for AddressDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.address.encode(self.network).map_err(|_| fmt::Error)?;
        f.write_str(&s)
    }
}

/// Segwit address on a network `bitcoin::Address` does not know
fn decode_segwit(address: &str, network: BtcNetwork) -> Result<ScriptBuf> {
    let (hrp, version, program) = segwit::decode(address)
        .map_err(|e| Error::invalid_input(format!("malformed address {}: {}", address, e)))?;
    if hrp.to_lowercase() != network.bech32_hrp() {
        return Err(Error::invalid_input(format!(
            "address {} is not a {} address",
            address, network
        )));
    }

    let version = WitnessVersion::try_from(version).map_err(|e| Error::invalid_input(e.to_string()))?;
    let program = WitnessProgram::new(version, &program).map_err(|e| Error::invalid_input(e.to_string()))?;
    Ok(ScriptBuf::new_witness_program(&program))
}

/// Classic bech32 encoding of arbitrary account bytes under `hrp`
pub fn encode_bech32_account(hrp: &str, data: &[u8]) -> Result<String> {
    let hrp = Hrp::parse(hrp).map_err(|e| Error::invalid_input(e.to_string()))?;
    bech32::encode::<bech32::Bech32>(hrp, data).map_err(|e| Error::invalid_input(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::key_pair;
    use secp256k1::SECP256K1;

    // BIP-173 / BIP-86 reference addresses
    const P2WPKH_MAINNET: &str = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";
    const P2TR_BIP86: &str = "bc1p5cyxnuxmeuwuvkwfem96lqzszd02n6xdcjrs20cac6yqjjwudpxqkedrcr";
    const BIP86_INTERNAL_KEY: &str = "cc8a4bc64d897bddc5fbc2f670f7a8ba0b386779106cf1223c6fc5d7cd6fc115";

    #[test]
    fn test_parse_p2wpkh() {
        let addr = BtcAddress::parse(P2WPKH_MAINNET, BtcNetwork::Mainnet).unwrap();
        assert_eq!(addr.address_type(), AddressType::P2wpkh);
        assert_eq!(
            addr.script_pubkey().to_hex_string(),
            "0014751e76e8199196d454941c45d1b3a323f1433bd6"
        );
        assert_eq!(addr.encode(BtcNetwork::Mainnet).unwrap(), P2WPKH_MAINNET);
        assert_eq!(BtcAddress::from_script_pubkey(&addr.script_pubkey()).unwrap(), addr);

        // uppercase is valid bech32
        let upper = BtcAddress::parse(&P2WPKH_MAINNET.to_uppercase(), BtcNetwork::Mainnet).unwrap();
        assert_eq!(upper, addr);
    }

    #[test]
    fn test_bip86_p2tr_address() {
        let internal = XOnlyPublicKey::from_slice(&hex::decode(BIP86_INTERNAL_KEY).unwrap()).unwrap();
        let addr = BtcAddress::p2tr(&internal);
        assert_eq!(addr.encode(BtcNetwork::Mainnet).unwrap(), P2TR_BIP86);
        assert_eq!(BtcAddress::parse(P2TR_BIP86, BtcNetwork::Mainnet).unwrap(), addr);
        assert_eq!(addr.display(BtcNetwork::Mainnet).to_string(), P2TR_BIP86);
    }

    #[test]
    fn test_p2tr_matches_bitcoin_address() {
        let (_, pk) = key_pair(b"p2tr");
        let ours = BtcAddress::p2tr(&pk);
        let theirs = bitcoin::Address::p2tr(SECP256K1, pk, None, bitcoin::Network::Signet);
        assert_eq!(ours.encode(BtcNetwork::Signet).unwrap(), theirs.to_string());
        assert_eq!(ours.script_pubkey(), theirs.script_pubkey());
    }

    #[test]
    fn test_network_hrp_enforced() {
        let (sk, _) = key_pair(b"wpkh");
        let addr = BtcAddress::p2wpkh(&sk.public_key(SECP256K1));
        let simnet = addr.encode(BtcNetwork::Simnet).unwrap();
        assert!(simnet.starts_with("sb1q"));
        assert_eq!(BtcAddress::parse(&simnet, BtcNetwork::Simnet).unwrap(), addr);
        assert!(BtcAddress::parse(&simnet, BtcNetwork::Mainnet).is_err());

        let regtest = addr.encode(BtcNetwork::Regtest).unwrap();
        assert!(regtest.starts_with("bcrt1q"));
    }

    #[test]
    fn test_unsupported_addresses() {
        let p2pkh = BtcAddress::parse("1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2", BtcNetwork::Mainnet);
        assert!(matches!(p2pkh, Err(Error::UnsupportedAddress(_))));

        let p2sh = BtcAddress::parse("3J98t1WpEZ73CNmQviecrnyiWrnqRhWNLy", BtcNetwork::Mainnet);
        assert!(matches!(p2sh, Err(Error::UnsupportedAddress(_))));

        let p2wsh = BtcAddress::parse(
            "bc1qrp33g0q5c5txsp9arysrx4k6zdkfs4nce4xj0gdcccefvpysxf3qccfmv3",
            BtcNetwork::Mainnet,
        );
        assert!(matches!(p2wsh, Err(Error::UnsupportedAddress(_))));

        assert!(BtcAddress::parse("bc1qnotanaddress", BtcNetwork::Mainnet).is_err());
        assert!(BtcAddress::from_script_pubkey(&ScriptBuf::from_hex("51").unwrap()).is_err());
    }

    #[test]
    fn test_unsupported_address_reports_type() {
        let err = BtcAddress::parse("3J98t1WpEZ73CNmQviecrnyiWrnqRhWNLy", BtcNetwork::Mainnet).unwrap_err();
        assert!(err.to_string().contains("p2sh"), "{}", err);

        let err = BtcAddress::parse("1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2", BtcNetwork::Mainnet).unwrap_err();
        assert!(err.to_string().contains("p2pkh"), "{}", err);

        // valid on testnet, foreign on mainnet
        let err = BtcAddress::parse("mipcBbFg9gMiCh81Kj8tqqdgoZub1ZJRfn", BtcNetwork::Mainnet).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        assert_eq!(AddressType::of_script(&ScriptBuf::from_hex("51").unwrap()), AddressType::Unknown);
    }

    #[test]
    fn test_testnet_and_signet_share_addresses() {
        let (_, pk) = key_pair(b"tb");
        let addr = BtcAddress::p2tr(&pk);
        let encoded = addr.encode(BtcNetwork::Testnet).unwrap();
        assert_eq!(BtcAddress::parse(&encoded, BtcNetwork::Signet).unwrap(), addr);
        assert!(BtcAddress::parse(&encoded, BtcNetwork::Regtest).is_err());
    }

    #[test]
    fn test_bech32_account_encoding() {
        let s = encode_bech32_account("bbn", &[0u8; 20]).unwrap();
        assert!(s.starts_with("bbn1"));
        assert!(encode_bech32_account("", &[1, 2, 3]).is_err());
    }
}
