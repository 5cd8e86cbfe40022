//! BIP-322 message signatures and proofs of possession

mod common;

use bitcoin::{PrivateKey, Witness};
use btcstaking_core::bip322::{self, decode_simple_signature, encode_simple_signature, message_hash};
use btcstaking_core::{AccountAddress, BtcAddress, BtcNetwork, BtcSigType, Error, ErrorKind, ProofOfPossession};
use common::key_pair;

const ADDRESS: &str = "bc1q9vza2e8x573nczrlzms0wvx3gsqjx7vavgkx0l";
const WIF: &str = "L3VFeEujGtevx9w18HD1fhRbCH67Az2dpCymeRE1SoPK6XQtaN2k";
const HELLO_WORLD_SIG: &str = "AkcwRAIgZRfIY3p7/DoVTty6YZbWS71bc5Vct9p9Fia83eRmw2QCICK/ENGfwLtptFluMGs2KsqoNSk89pO7F29zJLUx9a/sASECx/EgAxlkQpQ9hYjgGu6EBCPMVPwVIVJqO4XCsMvViHI=";

fn flip_sighash_byte(witness: &Witness) -> Witness {
    let mut items: Vec<Vec<u8>> = witness.iter().map(|item| item.to_vec()).collect();
    if let Some(last) = items[0].last_mut() {
        *last = 0x02;
    }
    Witness::from_slice(&items)
}

#[test]
fn test_bip322_hello_world_vector() {
    assert_eq!(
        hex::encode(message_hash(b"Hello World")),
        "f0eb03b1a75ac6d9847f55c624a99169b5dccba2a31f5b23bea77ba270de0a7a"
    );

    let witness = decode_simple_signature(HELLO_WORLD_SIG).unwrap();
    bip322::verify(b"Hello World", &witness, ADDRESS, BtcNetwork::Mainnet).unwrap();
    assert_eq!(encode_simple_signature(&witness), HELLO_WORLD_SIG);

    let err = bip322::verify(b"Hello World", &flip_sighash_byte(&witness), ADDRESS, BtcNetwork::Mainnet).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidBip322);

    assert!(bip322::verify(b"Hello world", &witness, ADDRESS, BtcNetwork::Mainnet).is_err());
}

#[test]
fn test_bip322_fresh_signatures() {
    let sk = PrivateKey::from_wif(WIF).unwrap().inner;
    let witness = bip322::sign_bip322_p2wpkh(b"Hello World", &sk).unwrap();
    bip322::verify(b"Hello World", &witness, ADDRESS, BtcNetwork::Mainnet).unwrap();

    let (sk, pk) = key_pair(b"taproot signer");
    let address = BtcAddress::p2tr(&pk).encode(BtcNetwork::Testnet).unwrap();
    assert!(address.starts_with("tb1p"));
    let witness = bip322::sign_bip322_p2tr(b"Hello World", &sk).unwrap();
    bip322::verify(b"Hello World", &witness, &address, BtcNetwork::Testnet).unwrap();

    // the same address string is foreign on mainnet
    assert!(bip322::verify(b"Hello World", &witness, &address, BtcNetwork::Mainnet).is_err());
}

#[test]
fn test_bip322_legacy_address_unsupported() {
    let witness = decode_simple_signature(HELLO_WORLD_SIG).unwrap();
    let err = bip322::verify(
        b"Hello World",
        &witness,
        "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa",
        BtcNetwork::Mainnet,
    )
    .unwrap_err();
    assert!(matches!(err, Error::UnsupportedAddress(_)));
}

#[test]
fn test_proof_of_possession_variants() {
    let context = "btcstaking/0/staker_pop/bbn-1";
    let account = AccountAddress::new("bbn", hex::decode("5a1b2c3d4e5f60718293a4b5c6d7e8f901234567").unwrap());
    let (sk, pk) = key_pair(b"delegator");

    let pops = [
        ProofOfPossession::new_bip340(context, &account, &sk).unwrap(),
        ProofOfPossession::new_ecdsa(context, &account, &sk).unwrap(),
        ProofOfPossession::new_bip322_p2tr(context, &account, &sk, BtcNetwork::Mainnet).unwrap(),
        ProofOfPossession::new_bip322_p2wpkh(context, &account, &sk, BtcNetwork::Mainnet).unwrap(),
    ];
    let types: Vec<_> = pops.iter().map(|p| p.btc_sig_type).collect();
    assert_eq!(
        types,
        [BtcSigType::Bip340, BtcSigType::Ecdsa, BtcSigType::Bip322, BtcSigType::Bip322]
    );

    let (_, other_pk) = key_pair(b"someone else");
    let other_account = AccountAddress::new("bbn", vec![0u8; 20]);
    for pop in &pops {
        pop.verify(context, &account, &pk, BtcNetwork::Mainnet).unwrap();
        assert!(pop.verify(context, &account, &other_pk, BtcNetwork::Mainnet).is_err());
        assert!(pop.verify(context, &other_account, &pk, BtcNetwork::Mainnet).is_err());
        assert!(pop.verify("btcstaking/0/fp_pop/bbn-1", &account, &pk, BtcNetwork::Mainnet).is_err());
    }
}
