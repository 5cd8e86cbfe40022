//! Schnorr adaptor signatures
//!
//! An adaptor signature over digest `m` is encrypted under a point `T`.
//! Anyone holding `t` with `T = t·G` can decrypt it into a valid BIP-340
//! signature, and anyone seeing both the adaptor signature and the
//! decrypted signature learns `t`.
//!
//! Covenant members encrypt their slashing signatures under each finality
//! provider's key, so a slashing tx can only be completed once that
//! provider's secret leaks through EOTS extraction.
//!
//! Encoding is 65 bytes: the compressed nonce point `R = R̂ + T` followed by
//! `ŝ`. When `R` has odd Y the signer negates its nonce, so decryption
//! subtracts `t` instead of adding it.

use std::fmt;

use bitcoin::XOnlyPublicKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::elliptic_curve::Field;
use k256::{AffinePoint, ProjectivePoint, Scalar};
use rand::RngCore;
use secp256k1::schnorr::Signature;
use secp256k1::{PublicKey, SecretKey};

use crate::error::{Error, Result};
use crate::primitives::{
    has_even_y, is_identity, mul_base, parse_scalar, point_from_compressed, point_to_compressed,
    pubkey_to_point, scalar_reduce, scalar_to_bytes, scalar_to_secret,
    tagged_hash, x_bytes, xonly_to_point, TAG_BIP340_AUX, TAG_BIP340_NONCE,
};
use crate::schnorr::{challenge, normalized_secret};

pub const ADAPTOR_SIGNATURE_SIZE: usize = 65;

/// Encryption point `T`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptionKey(AffinePoint);

impl EncryptionKey {
    /// Lift a BIP-340 key to its even-Y point
    pub fn from_xonly(pk: &XOnlyPublicKey) -> Result<Self> {
        Ok(Self(xonly_to_point(pk)?))
    }

    pub fn from_pubkey(pk: &PublicKey) -> Result<Self> {
        Ok(Self(pubkey_to_point(pk)?))
    }

    pub fn to_bytes(&self) -> Result<[u8; 33]> {
        point_to_compressed(&ProjectivePoint::from(self.0))
    }
}

/// Decryption scalar `t`
#[derive(Clone, PartialEq, Eq)]
pub struct DecryptionKey(Scalar);

impl DecryptionKey {
    /// Decryption key matching [`EncryptionKey::from_xonly`] of the secret's
    /// x-only public key; negated when that key has odd Y.
    pub fn from_secret_key(sk: &SecretKey) -> Result<Self> {
        let (t, _) = normalized_secret(sk)?;
        Ok(Self(t))
    }

    pub fn encryption_key(&self) -> EncryptionKey {
        EncryptionKey(mul_base(&self.0).to_affine())
    }

    pub fn to_secret_key(&self) -> Result<SecretKey> {
        scalar_to_secret(&self.0)
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        scalar_to_bytes(&self.0)
    }
}

impl fmt::Debug for DecryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DecryptionKey(..)")
    }
}

/// Encrypted Schnorr signature
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct AdaptorSignature {
    r: AffinePoint,
    s_hat: Scalar,
}

impl AdaptorSignature {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != ADAPTOR_SIGNATURE_SIZE {
            return Err(Error::InvalidAdaptorSig(format!(
                "expected {} bytes, got {}",
                ADAPTOR_SIGNATURE_SIZE,
                bytes.len()
            )));
        }
        let mut r_bytes = [0u8; 33];
        r_bytes.copy_from_slice(&bytes[..33]);
        let mut s_bytes = [0u8; 32];
        s_bytes.copy_from_slice(&bytes[33..]);

        let r = point_from_compressed(&r_bytes)
            .map_err(|e| Error::InvalidAdaptorSig(e.to_string()))?;
        let s_hat = parse_scalar(&s_bytes).map_err(|e| Error::InvalidAdaptorSig(e.to_string()))?;
        Ok(Self { r, s_hat })
    }

    pub fn to_bytes(&self) -> [u8; ADAPTOR_SIGNATURE_SIZE] {
        let mut out = [0u8; ADAPTOR_SIGNATURE_SIZE];
        out[..33].copy_from_slice(self.r.to_encoded_point(true).as_bytes());
        out[33..].copy_from_slice(&scalar_to_bytes(&self.s_hat));
        out
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| Error::InvalidAdaptorSig(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Whether the nonce was negated because `R` has odd Y
    pub fn need_negation(&self) -> bool {
        !has_even_y(&self.r)
    }

    /// Check that decrypting with the secret of `ek` yields a valid
    /// signature of `digest` under `pk`
    pub fn enc_verify(&self, pk: &XOnlyPublicKey, ek: &EncryptionKey, digest: &[u8; 32]) -> Result<()> {
        let p = ProjectivePoint::from(xonly_to_point(pk)?);
        let r = ProjectivePoint::from(self.r);
        let r_hat = r - ProjectivePoint::from(ek.0);
        let e = challenge(&x_bytes(&self.r), &pk.serialize(), digest);

        let r_hat = if self.need_negation() { -r_hat } else { r_hat };
        let expected = r_hat + p * e;
        if mul_base(&self.s_hat) != expected {
            tracing::trace!(pk = %pk, "adaptor signature mismatch");
            return Err(Error::InvalidAdaptorSig("ŝG does not match R̂ + eP".into()));
        }
        Ok(())
    }

    /// Complete the signature with `t`
    pub fn decrypt(&self, dk: &DecryptionKey) -> Result<Signature> {
        let s = if self.need_negation() {
            self.s_hat - dk.0
        } else {
            self.s_hat + dk.0
        };
        let mut sig = [0u8; 64];
        sig[..32].copy_from_slice(&x_bytes(&self.r));
        sig[32..].copy_from_slice(&scalar_to_bytes(&s));
        Signature::from_slice(&sig).map_err(Error::from)
    }

    /// Learn `t` from a signature produced by [`AdaptorSignature::decrypt`]
    pub fn recover(&self, sig: &Signature) -> Result<DecryptionKey> {
        let bytes = sig.serialize();
        if bytes[..32] != x_bytes(&self.r) {
            return Err(Error::InvalidAdaptorSig(
                "signature nonce does not match adaptor signature".into(),
            ));
        }
        let mut s_bytes = [0u8; 32];
        s_bytes.copy_from_slice(&bytes[32..]);
        let s = parse_scalar(&s_bytes)?;

        let t = if self.need_negation() {
            self.s_hat - s
        } else {
            s - self.s_hat
        };
        Ok(DecryptionKey(t))
    }
}

impl fmt::Debug for AdaptorSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AdaptorSignature({})", self.to_hex())
    }
}

/// Encrypt a signature of `digest` under `ek`, with caller supplied
/// auxiliary randomness
pub fn enc_sign_with_aux_rand(
    sk: &SecretKey,
    ek: &EncryptionKey,
    digest: &[u8; 32],
    aux: &[u8; 32],
) -> Result<AdaptorSignature> {
    let (d, pk_x) = normalized_secret(sk)?;
    let t_bytes = ek.to_bytes()?;

    let mut masked = scalar_to_bytes(&d);
    let aux_hash = tagged_hash(TAG_BIP340_AUX, &[aux]);
    for (b, a) in masked.iter_mut().zip(aux_hash.iter()) {
        *b ^= a;
    }
    let k = scalar_reduce(&tagged_hash(TAG_BIP340_NONCE, &[&masked, &t_bytes, &pk_x, digest]));
    if bool::from(k.is_zero()) {
        return Err(Error::InvalidScalar("derived nonce is zero".into()));
    }

    let r = mul_base(&k) + ProjectivePoint::from(ek.0);
    if is_identity(&r) {
        return Err(Error::InvalidAdaptorSig("R is the point at infinity".into()));
    }
    let r = r.to_affine();
    let k = if has_even_y(&r) { k } else { -k };

    let e = challenge(&x_bytes(&r), &pk_x, digest);
    Ok(AdaptorSignature {
        r,
        s_hat: k + e * d,
    })
}

/// Encrypt a signature of `digest` under `ek`
pub fn enc_sign(sk: &SecretKey, ek: &EncryptionKey, digest: &[u8; 32]) -> Result<AdaptorSignature> {
    let mut aux = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut aux);
    enc_sign_with_aux_rand(sk, ek, digest, &aux)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schnorr;
    use crate::test_utils::key_pair;
    use secp256k1::SECP256K1;

    #[test]
    fn test_enc_sign_decrypt_recover() {
        let (sk, pk) = key_pair(b"covenant");
        let digest = [0x33; 32];

        // cover both signs of R by trying several encryption keys
        let mut negated = [false, false];
        for i in 0u8..16 {
            let (fp_sk, fp_pk) = key_pair(&[b'f', i]);
            let ek = EncryptionKey::from_xonly(&fp_pk).unwrap();
            let dk = DecryptionKey::from_secret_key(&fp_sk).unwrap();
            assert_eq!(dk.encryption_key(), ek);

            let asig = enc_sign(&sk, &ek, &digest).unwrap();
            negated[asig.need_negation() as usize] = true;
            asig.enc_verify(&pk, &ek, &digest).unwrap();

            let sig = asig.decrypt(&dk).unwrap();
            assert!(schnorr::verify(&pk, &digest, &sig));

            let recovered = asig.recover(&sig).unwrap();
            assert_eq!(recovered, dk);
            assert_eq!(recovered.encryption_key(), ek);
        }
        assert!(negated[0] && negated[1]);
    }

    #[test]
    fn test_enc_verify_rejects() {
        let (sk, pk) = key_pair(b"covenant");
        let (_, fp_pk) = key_pair(b"fp");
        let (_, other_pk) = key_pair(b"other");
        let ek = EncryptionKey::from_xonly(&fp_pk).unwrap();
        let digest = [0x44; 32];
        let asig = enc_sign(&sk, &ek, &digest).unwrap();

        assert!(asig.enc_verify(&pk, &ek, &[0x45; 32]).is_err());
        assert!(asig.enc_verify(&other_pk, &ek, &digest).is_err());
        let wrong_ek = EncryptionKey::from_xonly(&other_pk).unwrap();
        assert!(matches!(
            asig.enc_verify(&pk, &wrong_ek, &digest),
            Err(Error::InvalidAdaptorSig(_))
        ));
    }

    #[test]
    fn test_wrong_decryption_key() {
        let (sk, pk) = key_pair(b"covenant");
        let (_, fp_pk) = key_pair(b"fp");
        let (other_sk, _) = key_pair(b"other");
        let ek = EncryptionKey::from_xonly(&fp_pk).unwrap();
        let digest = [0x55; 32];
        let asig = enc_sign(&sk, &ek, &digest).unwrap();

        let wrong = DecryptionKey::from_secret_key(&other_sk).unwrap();
        let sig = asig.decrypt(&wrong).unwrap();
        assert!(!schnorr::verify(&pk, &digest, &sig));
    }

    #[test]
    fn test_serialization() {
        let (sk, _) = key_pair(b"covenant");
        let (_, fp_pk) = key_pair(b"fp");
        let ek = EncryptionKey::from_xonly(&fp_pk).unwrap();
        let asig = enc_sign_with_aux_rand(&sk, &ek, &[1u8; 32], &[2u8; 32]).unwrap();

        let bytes = asig.to_bytes();
        assert_eq!(bytes.len(), ADAPTOR_SIGNATURE_SIZE);
        assert_eq!(AdaptorSignature::from_bytes(&bytes).unwrap(), asig);
        assert_eq!(AdaptorSignature::from_hex(&asig.to_hex()).unwrap(), asig);

        assert!(AdaptorSignature::from_bytes(&bytes[..64]).is_err());
        let mut bad = bytes;
        bad[0] = 0x05;
        assert!(matches!(
            AdaptorSignature::from_bytes(&bad),
            Err(Error::InvalidAdaptorSig(_))
        ));
    }

    #[test]
    fn test_encoding_carries_nonce_parity() {
        let (sk, _) = key_pair(b"covenant");
        let mut seen = [false, false];
        for i in 0u8..16 {
            let (_, fp_pk) = key_pair(&[b'f', i]);
            let ek = EncryptionKey::from_xonly(&fp_pk).unwrap();
            let asig = enc_sign_with_aux_rand(&sk, &ek, &[i; 32], &[0u8; 32]).unwrap();
            let bytes = asig.to_bytes();

            let expected_prefix = if asig.need_negation() { 0x03 } else { 0x02 };
            assert_eq!(bytes[0], expected_prefix);
            assert!(PublicKey::from_slice(&bytes[..33]).is_ok());
            seen[asig.need_negation() as usize] = true;
        }
        assert!(seen[0] && seen[1]);
    }

    #[test]
    fn test_deterministic_with_aux() {
        let (sk, _) = key_pair(b"covenant");
        let (fp_sk, _) = key_pair(b"fp");
        let ek = EncryptionKey::from_pubkey(&fp_sk.public_key(SECP256K1)).unwrap();
        let a = enc_sign_with_aux_rand(&sk, &ek, &[9u8; 32], &[0u8; 32]).unwrap();
        let b = enc_sign_with_aux_rand(&sk, &ek, &[9u8; 32], &[0u8; 32]).unwrap();
        assert_eq!(a, b);
    }
}
