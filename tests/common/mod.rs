//! Shared fixtures for the end-to-end scenarios

#![allow(dead_code)]

use bitcoin::absolute::LockTime;
use bitcoin::hashes::Hash;
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness, XOnlyPublicKey};
use btcstaking_core::primitives::sha256;
use btcstaking_core::{SlashingPolicy, SlashingRate, StakingScriptData};
use secp256k1::{SecretKey, SECP256K1};

pub const COVENANT_SIZE: u8 = 5;
pub const COVENANT_QUORUM: u32 = 3;

pub fn key_pair(seed: &[u8]) -> (SecretKey, XOnlyPublicKey) {
    let sk = SecretKey::from_slice(&sha256(seed)).unwrap();
    let (pk, _) = sk.x_only_public_key(SECP256K1);
    (sk, pk)
}

pub fn staker() -> (SecretKey, XOnlyPublicKey) {
    key_pair(b"staker")
}

pub fn finality_provider() -> (SecretKey, XOnlyPublicKey) {
    key_pair(b"finality provider")
}

pub fn covenant_keys() -> Vec<(SecretKey, XOnlyPublicKey)> {
    (0..COVENANT_SIZE).map(|i| key_pair(&[b'c', i])).collect()
}

/// Covenant keys in the order the multisig fragment lists them
pub fn sorted_covenant_keys() -> Vec<(SecretKey, XOnlyPublicKey)> {
    let mut keys = covenant_keys();
    keys.sort_by(|a, b| b.1.serialize().cmp(&a.1.serialize()));
    keys
}

/// 1 finality provider, 3-of-5 covenant
pub fn script_data() -> StakingScriptData {
    StakingScriptData::new(
        staker().1,
        vec![finality_provider().1],
        covenant_keys().into_iter().map(|(_, pk)| pk).collect(),
        COVENANT_QUORUM,
    )
    .unwrap()
}

pub fn slashing_policy() -> SlashingPolicy {
    SlashingPolicy {
        slashing_pk_script: ScriptBuf::from_hex("0014b6e7f3c1a1b2c3d4e5f60718293a4b5c6d7e8f90").unwrap(),
        slashing_rate: "0.1".parse::<SlashingRate>().unwrap(),
        change_lock_blocks: 101,
        min_slashing_tx_fee: Amount::from_sat(1_000),
    }
}

/// Version 2 tx funding `outputs` from an arbitrary coin
pub fn funding_tx(outputs: Vec<TxOut>) -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::new(Txid::from_byte_array([0x17; 32]), 0),
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: outputs,
    }
}

/// Version 2 tx spending `prev` with `sequence` to a P2WPKH output
pub fn spend_tx(prev: OutPoint, sequence: u32, value: Amount) -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: prev,
            script_sig: ScriptBuf::new(),
            sequence: Sequence(sequence),
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value,
            script_pubkey: ScriptBuf::from_hex("00140a0b0c0d0e0f101112131415161718191a1b1c1d").unwrap(),
        }],
    }
}
