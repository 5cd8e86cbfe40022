//! BIP-340 Schnorr signatures over 32-byte digests
//!
//! Signing and verification go through libsecp256k1. The challenge and
//! even-Y helpers are exposed for the EOTS and adaptor schemes, which reuse
//! the BIP-340 equations over k256 scalars.

use bitcoin::XOnlyPublicKey;
use k256::Scalar;
use secp256k1::schnorr::Signature;
use secp256k1::{Keypair, Message, SecretKey, SECP256K1};

use crate::error::{Error, Result};
use crate::primitives::{
    has_even_y, mul_base, scalar_reduce, secret_to_scalar, tagged_hash, x_bytes, TAG_BIP340_CHALLENGE,
};

/// `e = H_challenge(R.x || P.x || m) mod n`
pub fn challenge(r_x: &[u8; 32], pk_x: &[u8; 32], digest: &[u8; 32]) -> Scalar {
    scalar_reduce(&tagged_hash(TAG_BIP340_CHALLENGE, &[r_x, pk_x, digest]))
}

/// Secret scalar adjusted so that its public point has even Y, plus that
/// point's x coordinate.
pub(crate) fn normalized_secret(sk: &SecretKey) -> Result<(Scalar, [u8; 32])> {
    let d = secret_to_scalar(sk)?;
    let p = mul_base(&d).to_affine();
    let d = if has_even_y(&p) { d } else { -d };
    Ok((d, x_bytes(&p)))
}

/// Sign with caller supplied auxiliary randomness. Output is a pure
/// function of the inputs.
pub fn sign_with_aux_rand(sk: &SecretKey, digest: &[u8; 32], aux: &[u8; 32]) -> Signature {
    let keypair = Keypair::from_secret_key(SECP256K1, sk);
    SECP256K1.sign_schnorr_with_aux_rand(&Message::from_digest(*digest), &keypair, aux)
}

/// Sign with fresh auxiliary randomness from the thread RNG
pub fn sign(sk: &SecretKey, digest: &[u8; 32]) -> Signature {
    let keypair = Keypair::from_secret_key(SECP256K1, sk);
    SECP256K1.sign_schnorr(&Message::from_digest(*digest), &keypair)
}

/// Verify a signature
pub fn verify_signature(pk: &XOnlyPublicKey, digest: &[u8; 32], sig: &Signature) -> Result<()> {
    SECP256K1
        .verify_schnorr(sig, &Message::from_digest(*digest), pk)
        .map_err(|e| {
            tracing::trace!(pk = %pk, "schnorr signature mismatch");
            Error::invalid_signature(e.to_string())
        })
}

pub fn verify(pk: &XOnlyPublicKey, digest: &[u8; 32], sig: &Signature) -> bool {
    verify_signature(pk, digest, sig).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::{lift_x, parse_scalar};
    use crate::test_utils::key_pair;
    use k256::ProjectivePoint;

    #[test]
    fn test_sign_verify() {
        let (sk, pk) = key_pair(b"staker");
        let digest = [0x5a; 32];
        let sig = sign(&sk, &digest);
        assert!(verify(&pk, &digest, &sig));
        assert!(!verify(&pk, &[0x5b; 32], &sig));

        let (_, other) = key_pair(b"other");
        assert!(!verify(&other, &digest, &sig));
    }

    #[test]
    fn test_challenge_satisfies_verification_equation() {
        let (sk, pk) = key_pair(b"fixture");
        let digest = [0x01; 32];
        let sig = sign_with_aux_rand(&sk, &digest, &[0x02; 32]).serialize();

        let r_x: [u8; 32] = sig[..32].try_into().unwrap();
        let s = parse_scalar(&sig[32..].try_into().unwrap()).unwrap();
        let (d, pk_x) = normalized_secret(&sk).unwrap();
        assert_eq!(pk_x, pk.serialize());

        // s·G = R + e·P with P the even-Y lift of the key
        let e = challenge(&r_x, &pk_x, &digest);
        let r = ProjectivePoint::from(lift_x(&r_x).unwrap());
        assert_eq!(mul_base(&s), r + mul_base(&(e * d)));
    }

    #[test]
    fn test_bip340_vector_0() {
        let mut secret = [0u8; 32];
        secret[31] = 3;
        let sk = SecretKey::from_slice(&secret).unwrap();
        let sig = sign_with_aux_rand(&sk, &[0u8; 32], &[0u8; 32]);
        assert_eq!(
            hex::encode(sig.serialize()).to_uppercase(),
            "E907831F80848D1069A5371B402410364BDF1C5F8307B0084C55F1CE2DCA8215\
             25F66A4A85EA8B71E482A74F382D2CE5EBEEE8FDB2172F477DF4900D310536C0"
        );
    }

    #[test]
    fn test_reject_high_s() {
        let (sk, pk) = key_pair(b"staker");
        let digest = [0x11; 32];
        let mut bytes = sign(&sk, &digest).serialize();
        bytes[32..].copy_from_slice(&[0xff; 32]);
        let sig = Signature::from_slice(&bytes).unwrap();
        assert!(matches!(
            verify_signature(&pk, &digest, &sig),
            Err(Error::InvalidSignature(_))
        ));
    }
}
