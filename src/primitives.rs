//! Curve and hashing primitives
//!
//! Scalar and point helpers over k256, BIP-340 tagged hashes, x-only key
//! lifting and the RFC-6962 Merkle tree used for public randomness
//! commitments.

use std::sync::LazyLock;

use bitcoin::XOnlyPublicKey;
use k256::elliptic_curve::ops::Reduce;
use k256::elliptic_curve::point::{AffineCoordinates, DecompressPoint};
use k256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use k256::elliptic_curve::subtle::Choice;
use k256::elliptic_curve::{Field, PrimeField};
use k256::{AffinePoint, EncodedPoint, FieldBytes, ProjectivePoint, Scalar, U256};
use secp256k1::{PublicKey, SecretKey};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

pub const TAG_BIP340_CHALLENGE: &str = "BIP0340/challenge";
pub const TAG_BIP340_AUX: &str = "BIP0340/aux";
pub const TAG_BIP340_NONCE: &str = "BIP0340/nonce";
pub const TAG_BIP322_SIGNED_MESSAGE: &str = "BIP0322-signed-message";

/// x coordinate of the BIP-341 NUMS point `H = lift_x(SHA256(G))`
pub const NUMS_X_COORDINATE: [u8; 32] = [
    0x50, 0x92, 0x9b, 0x74, 0xc1, 0xa0, 0x49, 0x54, 0xb7, 0x8b, 0x4b, 0x60, 0x35, 0xe9, 0x7a, 0x5e,
    0x07, 0x8a, 0x5a, 0x0f, 0x28, 0xec, 0x96, 0xd5, 0x47, 0xbf, 0xee, 0x9a, 0xce, 0x80, 0x3a, 0xc0,
];

/// Internal key without a known discrete log; disables key-path spends
pub static UNSPENDABLE_KEY: LazyLock<XOnlyPublicKey> = LazyLock::new(|| {
    XOnlyPublicKey::from_slice(&NUMS_X_COORDINATE).expect("NUMS x coordinate lifts to a point")
});

// ============================================================================
// Hashing
// ============================================================================

/// `SHA256(SHA256(tag) || SHA256(tag) || m)` over the concatenation of `msgs`
pub fn tagged_hash(tag: &str, msgs: &[&[u8]]) -> [u8; 32] {
    let tag_hash = Sha256::digest(tag.as_bytes());
    let mut hasher = Sha256::new();
    hasher.update(tag_hash);
    hasher.update(tag_hash);
    for m in msgs {
        hasher.update(m);
    }
    hasher.finalize().into()
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

// ============================================================================
// Scalars
// ============================================================================

/// Parse a scalar, rejecting values `>= n`
pub fn parse_scalar(bytes: &[u8; 32]) -> Result<Scalar> {
    Option::from(Scalar::from_repr(FieldBytes::from(*bytes)))
        .ok_or_else(|| Error::InvalidScalar("value exceeds curve order".into()))
}

/// Parse a scalar, rejecting zero and values `>= n`
pub fn parse_nonzero_scalar(bytes: &[u8; 32]) -> Result<Scalar> {
    let s = parse_scalar(bytes)?;
    if bool::from(s.is_zero()) {
        return Err(Error::InvalidScalar("zero scalar".into()));
    }
    Ok(s)
}

/// Interpret 32 bytes as an integer reduced mod n
pub fn scalar_reduce(bytes: &[u8; 32]) -> Scalar {
    <Scalar as Reduce<U256>>::reduce_bytes(&FieldBytes::from(*bytes))
}

pub fn scalar_to_bytes(s: &Scalar) -> [u8; 32] {
    s.to_bytes().into()
}

pub fn scalar_inverse(s: &Scalar) -> Result<Scalar> {
    Option::from(s.invert()).ok_or_else(|| Error::InvalidScalar("zero has no inverse".into()))
}

pub fn secret_to_scalar(sk: &SecretKey) -> Result<Scalar> {
    parse_nonzero_scalar(&sk.secret_bytes())
}

pub fn scalar_to_secret(s: &Scalar) -> Result<SecretKey> {
    SecretKey::from_slice(&scalar_to_bytes(s)).map_err(|e| Error::InvalidScalar(e.to_string()))
}

// ============================================================================
// Points
// ============================================================================

/// `s·G`
pub fn mul_base(s: &Scalar) -> ProjectivePoint {
    ProjectivePoint::GENERATOR * s
}

pub fn is_identity(p: &ProjectivePoint) -> bool {
    *p == ProjectivePoint::IDENTITY
}

pub fn has_even_y(p: &AffinePoint) -> bool {
    !bool::from(p.y_is_odd())
}

pub fn x_bytes(p: &AffinePoint) -> [u8; 32] {
    p.x().into()
}

/// Lift an x coordinate to the point with even Y.
///
/// Fails if `x >= p` or `x` is not on the curve.
pub fn lift_x(x: &[u8; 32]) -> Result<AffinePoint> {
    Option::from(AffinePoint::decompress(&FieldBytes::from(*x), Choice::from(0)))
        .ok_or_else(|| Error::InvalidPubKey(format!("{} does not lift to a point", hex::encode(x))))
}

pub fn parse_xonly(bytes: &[u8]) -> Result<XOnlyPublicKey> {
    XOnlyPublicKey::from_slice(bytes).map_err(|e| Error::InvalidPubKey(e.to_string()))
}

pub fn xonly_to_point(pk: &XOnlyPublicKey) -> Result<AffinePoint> {
    lift_x(&pk.serialize())
}

pub fn pubkey_to_point(pk: &PublicKey) -> Result<AffinePoint> {
    let encoded = EncodedPoint::from_bytes(pk.serialize())
        .map_err(|e| Error::InvalidPubKey(e.to_string()))?;
    Option::from(AffinePoint::from_encoded_point(&encoded))
        .ok_or_else(|| Error::InvalidPubKey("not on curve".into()))
}

/// SEC1 compressed encoding. Fails on the identity.
pub fn point_to_compressed(p: &ProjectivePoint) -> Result<[u8; 33]> {
    if is_identity(p) {
        return Err(Error::InvalidPubKey("point at infinity".into()));
    }
    let encoded = p.to_affine().to_encoded_point(true);
    let mut out = [0u8; 33];
    out.copy_from_slice(encoded.as_bytes());
    Ok(out)
}

pub fn point_from_compressed(bytes: &[u8; 33]) -> Result<AffinePoint> {
    let pk = PublicKey::from_slice(bytes).map_err(|e| Error::InvalidPubKey(e.to_string()))?;
    pubkey_to_point(&pk)
}

pub fn point_to_pubkey(p: &ProjectivePoint) -> Result<PublicKey> {
    let bytes = point_to_compressed(p)?;
    PublicKey::from_slice(&bytes).map_err(|e| Error::InvalidPubKey(e.to_string()))
}

// ============================================================================
// RFC-6962 Merkle tree
// ============================================================================

fn merkle_leaf_hash(leaf: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update([0x00]);
    hasher.update(leaf);
    hasher.finalize().into()
}

fn merkle_inner_hash(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update([0x01]);
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Largest power of two strictly below `n` (`n >= 2`)
fn split_point(n: usize) -> usize {
    let mut k = 1;
    while k * 2 < n {
        k *= 2;
    }
    k
}

/// Inclusion proof in an RFC-6962 tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleProof {
    pub index: u64,
    pub total: u64,
    /// Sibling hashes, from the leaf upwards
    pub aunts: Vec<[u8; 32]>,
}

impl MerkleProof {
    /// Recompute the root from `leaf` and compare
    pub fn verify(&self, root: &[u8; 32], leaf: &[u8]) -> bool {
        match root_from_aunts(self.index, self.total, merkle_leaf_hash(leaf), &self.aunts) {
            Some(computed) => &computed == root,
            None => false,
        }
    }
}

fn root_from_aunts(index: u64, total: u64, leaf_hash: [u8; 32], aunts: &[[u8; 32]]) -> Option<[u8; 32]> {
    if index >= total {
        return None;
    }
    if total == 1 {
        return aunts.is_empty().then_some(leaf_hash);
    }
    let (last, rest) = aunts.split_last()?;
    let num_left = split_point(total as usize) as u64;
    if index < num_left {
        let left = root_from_aunts(index, num_left, leaf_hash, rest)?;
        Some(merkle_inner_hash(&left, last))
    } else {
        let right = root_from_aunts(index - num_left, total - num_left, leaf_hash, rest)?;
        Some(merkle_inner_hash(last, &right))
    }
}

/// Root of the tree over `leaves` together with one proof per leaf.
///
/// The empty tree hashes to `SHA256("")`.
pub fn merkle_root_with_proofs(leaves: &[&[u8]]) -> ([u8; 32], Vec<MerkleProof>) {
    let total = leaves.len() as u64;
    let (root, trails) = merkle_trails(leaves);
    let proofs = trails
        .into_iter()
        .enumerate()
        .map(|(i, aunts)| MerkleProof {
            index: i as u64,
            total,
            aunts,
        })
        .collect();
    (root, proofs)
}

fn merkle_trails(leaves: &[&[u8]]) -> ([u8; 32], Vec<Vec<[u8; 32]>>) {
    match leaves.len() {
        0 => (sha256(&[]), Vec::new()),
        1 => (merkle_leaf_hash(leaves[0]), vec![Vec::new()]),
        n => {
            let k = split_point(n);
            let (left_root, mut left_trails) = merkle_trails(&leaves[..k]);
            let (right_root, right_trails) = merkle_trails(&leaves[k..]);
            for trail in left_trails.iter_mut() {
                trail.push(right_root);
            }
            left_trails.extend(right_trails.into_iter().map(|mut trail| {
                trail.push(left_root);
                trail
            }));
            (merkle_inner_hash(&left_root, &right_root), left_trails)
        }
    }
}
