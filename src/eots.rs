//! Extractable one-time signatures
//!
//! A finality provider commits to public randomness `P_r = r·G` ahead of
//! time and later signs with `s = r + e·x`. Two signatures over different
//! messages under the same `P_r` reveal `x`, which is what slashing relies
//! on.
//!
//! The nonce is normalized the same way BIP-340 normalizes it: when `r·G`
//! has odd Y the signer uses `-r`, and the public randomness is the x-only
//! coordinate. The signing key is normalized to even Y likewise, and
//! [`extract`] undoes that normalization using the full public key.

use std::fmt;

use bitcoin::key::Parity;
use bitcoin::XOnlyPublicKey;
use k256::elliptic_curve::Field;
use k256::{ProjectivePoint, Scalar};
use rand::{CryptoRng, RngCore};
use secp256k1::{PublicKey, SecretKey};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::primitives::{
    has_even_y, lift_x, merkle_root_with_proofs, mul_base, parse_nonzero_scalar, parse_scalar,
    scalar_inverse, scalar_to_bytes, scalar_to_secret, x_bytes, xonly_to_point, MerkleProof,
};
use crate::schnorr::{challenge, normalized_secret};

// ============================================================================
// Randomness
// ============================================================================

/// Secret nonce `r`, already normalized so that `r·G` has even Y
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateRand(Scalar);

impl PrivateRand {
    /// Interpret 32 bytes as a nonce. The value is negated if its point has
    /// odd Y.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let r = parse_nonzero_scalar(bytes)?;
        Ok(Self::normalize(r))
    }

    fn normalize(r: Scalar) -> Self {
        if has_even_y(&mul_base(&r).to_affine()) {
            Self(r)
        } else {
            Self(-r)
        }
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        scalar_to_bytes(&self.0)
    }

    pub fn public(&self) -> PublicRand {
        PublicRand(x_bytes(&mul_base(&self.0).to_affine()))
    }
}

impl fmt::Debug for PrivateRand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateRand(..)")
    }
}

/// Committed public randomness: x coordinate of `r·G`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicRand([u8; 32]);

impl PublicRand {
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        lift_x(bytes)?;
        Ok(Self(*bytes))
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for PublicRand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Draw a fresh nonce and its public randomness
pub fn rand_gen<R: RngCore + CryptoRng>(rng: &mut R) -> (PrivateRand, PublicRand) {
    loop {
        let r = Scalar::random(&mut *rng);
        if !bool::from(r.is_zero()) {
            let private = PrivateRand::normalize(r);
            let public = private.public();
            return (private, public);
        }
    }
}

// ============================================================================
// Signatures
// ============================================================================

/// EOTS signature: the scalar `s` only; `R` is the committed randomness
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct EotsSignature(Scalar);

impl EotsSignature {
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        parse_scalar(bytes).map(Self)
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        scalar_to_bytes(&self.0)
    }
}

impl fmt::Debug for EotsSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EotsSignature({})", hex::encode(self.to_bytes()))
    }
}

/// `s = r + H(P_r, P, d)·x`
pub fn sign(sk: &SecretKey, rand: &PrivateRand, digest: &[u8; 32]) -> Result<EotsSignature> {
    let (d, pk_x) = normalized_secret(sk)?;
    let r_x = rand.public().to_bytes();
    let e = challenge(&r_x, &pk_x, digest);
    Ok(EotsSignature(rand.0 + e * d))
}

/// Check `s·G - e·P == P_r`
pub fn verify_signature(
    pk: &XOnlyPublicKey,
    pub_rand: &PublicRand,
    digest: &[u8; 32],
    sig: &EotsSignature,
) -> Result<()> {
    let p = ProjectivePoint::from(xonly_to_point(pk)?);
    let r = ProjectivePoint::from(lift_x(pub_rand.as_bytes())?);
    let e = challenge(pub_rand.as_bytes(), &pk.serialize(), digest);
    if mul_base(&sig.0) - p * e != r {
        return Err(Error::invalid_signature("EOTS signature does not match public randomness"));
    }
    Ok(())
}

pub fn verify(pk: &XOnlyPublicKey, pub_rand: &PublicRand, digest: &[u8; 32], sig: &EotsSignature) -> bool {
    verify_signature(pk, pub_rand, digest, sig).is_ok()
}

/// Recover the secret key from two signatures sharing `pub_rand`.
///
/// `pk` carries its Y parity so the returned key is exactly the signer's
/// original secret.
pub fn extract(
    pk: &PublicKey,
    pub_rand: &PublicRand,
    digest1: &[u8; 32],
    sig1: &EotsSignature,
    digest2: &[u8; 32],
    sig2: &EotsSignature,
) -> Result<SecretKey> {
    if digest1 == digest2 {
        return Err(Error::invalid_input("cannot extract from two signatures over the same message"));
    }

    let (xonly, parity) = pk.x_only_public_key();
    verify_signature(&xonly, pub_rand, digest1, sig1)?;
    verify_signature(&xonly, pub_rand, digest2, sig2)?;

    let e1 = challenge(pub_rand.as_bytes(), &xonly.serialize(), digest1);
    let e2 = challenge(pub_rand.as_bytes(), &xonly.serialize(), digest2);
    let x = (sig1.0 - sig2.0) * scalar_inverse(&(e1 - e2))?;
    let x = match parity {
        Parity::Even => x,
        Parity::Odd => -x,
    };

    tracing::debug!(fp_pk = %xonly, pub_rand = %pub_rand, "extracted secret key from EOTS signatures");
    scalar_to_secret(&x)
}

// ============================================================================
// Finality votes and evidence
// ============================================================================

/// Digest a finality provider signs for a block: `SHA256(height_be || app_hash)`
pub fn finality_sig_digest(block_height: u64, app_hash: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(block_height.to_be_bytes());
    hasher.update(app_hash);
    hasher.finalize().into()
}

/// Two finality signatures by one provider at one height for different blocks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evidence {
    pub fp_btc_pk: XOnlyPublicKey,
    pub block_height: u64,
    pub pub_rand: PublicRand,
    pub canonical_app_hash: [u8; 32],
    pub fork_app_hash: [u8; 32],
    pub canonical_finality_sig: EotsSignature,
    pub fork_finality_sig: EotsSignature,
}

impl Evidence {
    pub fn validate(&self) -> Result<()> {
        if self.canonical_app_hash == self.fork_app_hash {
            return Err(Error::invalid_input("canonical and fork app hashes are equal"));
        }
        verify_signature(
            &self.fp_btc_pk,
            &self.pub_rand,
            &finality_sig_digest(self.block_height, &self.canonical_app_hash),
            &self.canonical_finality_sig,
        )?;
        verify_signature(
            &self.fp_btc_pk,
            &self.pub_rand,
            &finality_sig_digest(self.block_height, &self.fork_app_hash),
            &self.fork_finality_sig,
        )
    }

    /// Extract the provider's key. Only the x-only key is known, so the
    /// result is the secret whose public key has even Y.
    pub fn extract_secret_key(&self) -> Result<SecretKey> {
        extract(
            &self.fp_btc_pk.public_key(Parity::Even),
            &self.pub_rand,
            &finality_sig_digest(self.block_height, &self.canonical_app_hash),
            &self.canonical_finality_sig,
            &finality_sig_digest(self.block_height, &self.fork_app_hash),
            &self.fork_finality_sig,
        )
    }
}

// ============================================================================
// Public randomness commitments
// ============================================================================

/// Inclusion proof of one public randomness value in a commitment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubRandProof(pub MerkleProof);

impl PubRandProof {
    pub fn verify(&self, commitment: &[u8; 32], pub_rand: &PublicRand) -> Result<()> {
        if !self.0.verify(commitment, pub_rand.as_bytes()) {
            return Err(Error::invalid_input(format!(
                "public randomness {} is not committed at index {}",
                pub_rand, self.0.index
            )));
        }
        Ok(())
    }
}

/// Merkle commitment over a list of public randomness plus one proof per value
pub fn commit_pub_rand_list(list: &[PublicRand]) -> ([u8; 32], Vec<PubRandProof>) {
    let leaves: Vec<&[u8]> = list.iter().map(|r| r.as_bytes().as_slice()).collect();
    let (root, proofs) = merkle_root_with_proofs(&leaves);
    (root, proofs.into_iter().map(PubRandProof).collect())
}

/// Commitment to public randomness for heights `start_height..start_height + num_pub_rand`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubRandCommit {
    pub start_height: u64,
    pub num_pub_rand: u64,
    pub commitment: [u8; 32],
}

impl PubRandCommit {
    /// Last committed height, or `None` for an empty commit or one whose
    /// range runs past `u64::MAX`.
    pub fn end_height(&self) -> Option<u64> {
        let last = self.num_pub_rand.checked_sub(1)?;
        self.start_height.checked_add(last)
    }

    pub fn is_in_range(&self, height: u64) -> bool {
        self.end_height()
            .is_some_and(|end| self.start_height <= height && height <= end)
    }

    /// Check that `pub_rand` is the value committed for `height`
    pub fn verify_pub_rand(&self, height: u64, pub_rand: &PublicRand, proof: &PubRandProof) -> Result<()> {
        let Some(end) = self.end_height() else {
            return Err(Error::invalid_input(format!(
                "invalid commit of {} values from height {}",
                self.num_pub_rand, self.start_height
            )));
        };
        if height < self.start_height || height > end {
            return Err(Error::invalid_input(format!(
                "height {} outside committed range [{}, {}]",
                height, self.start_height, end
            )));
        }
        if proof.0.total != self.num_pub_rand || proof.0.index != height - self.start_height {
            return Err(Error::invalid_input("proof position does not match height"));
        }
        proof.verify(&self.commitment, pub_rand)
    }
}
