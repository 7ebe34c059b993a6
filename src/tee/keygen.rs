use openssl::bn::{BigNum, BigNumContext, BigNumRef};
use openssl::pkey::{PKey, PKeyRef, Private, Public};
use openssl::rsa::Rsa;
use rand::{CryptoRng, RngCore};
use std::cmp::Ordering;

use super::measurement::{signer_identity, MrSigner};
use crate::{BundleError, Result};

/// Modulus size mandated for SIGSTRUCT signing keys.
pub const RSA_MODULUS_BITS: u32 = 3072;
/// Public exponent mandated for SIGSTRUCT signing keys.
pub const RSA_EXPONENT: u32 = 3;

/// Miller-Rabin rounds for prime candidates that pass trial division.
const PRIME_CHECKS: i32 = 64;

/// An RSA-3072 key pair with public exponent 3.
pub struct KeyPair {
    pkey: PKey<Private>,
}

impl KeyPair {
    pub fn pkey(&self) -> &PKeyRef<Private> {
        &self.pkey
    }

    pub fn public_key(&self) -> Result<Rsa<Public>> {
        let rsa = self.pkey.rsa()?;
        Ok(Rsa::from_public_components(
            rsa.n().to_owned()?,
            rsa.e().to_owned()?,
        )?)
    }

    pub fn mr_signer(&self) -> Result<MrSigner> {
        signer_identity(&*self.public_key()?)
    }

    /// Private key as PKCS#8 PEM.
    pub fn private_key_pem(&self) -> Result<Vec<u8>> {
        Ok(self.pkey.private_key_to_pem_pkcs8()?)
    }

    /// Public key as SubjectPublicKeyInfo PEM.
    pub fn public_key_pem(&self) -> Result<Vec<u8>> {
        Ok(self.pkey.public_key_to_pem()?)
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("bits", &self.pkey.bits())
            .finish_non_exhaustive()
    }
}

/// Load an RSA public key from PEM (SubjectPublicKeyInfo or PKCS#1).
pub fn public_key_from_pem(pem: &[u8]) -> Result<Rsa<Public>> {
    Rsa::public_key_from_pem(pem)
        .or_else(|_| Rsa::public_key_from_pem_pkcs1(pem))
        .map_err(|e| BundleError::CryptoFailure(format!("failed to parse public key: {}", e)))
}

/// Generate a fresh two-prime RSA-3072 key with public exponent 3.
///
/// Prime candidates come from `rng`. A pair is redrawn whenever the primes are
/// equal, the modulus is not exactly 3072 bits, or 3 is not invertible modulo
/// `(p-1)(q-1)`.
pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Result<KeyPair> {
    let prime_bits = RSA_MODULUS_BITS / 2;
    let mut ctx = BigNumContext::new()?;
    let e = BigNum::from_u32(RSA_EXPONENT)?;
    let one = BigNum::from_u32(1)?;

    let mut attempts = 0u32;
    loop {
        attempts += 1;

        let p = random_prime(rng, prime_bits, &mut ctx)?;
        let q = random_prime(rng, prime_bits, &mut ctx)?;
        if p.ucmp(&q) == Ordering::Equal {
            tracing::debug!("Prime pair collided, redrawing (attempt {})", attempts);
            continue;
        }

        let mut n = BigNum::new()?;
        n.checked_mul(&p, &q, &mut ctx)?;
        if n.num_bits() != RSA_MODULUS_BITS as i32 {
            tracing::debug!(
                "Modulus has {} bits, redrawing (attempt {})",
                n.num_bits(),
                attempts
            );
            continue;
        }

        let mut p1 = BigNum::new()?;
        p1.checked_sub(&p, &one)?;
        let mut q1 = BigNum::new()?;
        q1.checked_sub(&q, &one)?;
        let mut totient = BigNum::new()?;
        totient.checked_mul(&p1, &q1, &mut ctx)?;

        let mut d = BigNum::new()?;
        if d.mod_inverse(&e, &totient, &mut ctx).is_err() {
            tracing::debug!("Exponent not invertible, redrawing (attempt {})", attempts);
            continue;
        }

        let mut dmp1 = BigNum::new()?;
        dmp1.nnmod(&d, &p1, &mut ctx)?;
        let mut dmq1 = BigNum::new()?;
        dmq1.nnmod(&d, &q1, &mut ctx)?;
        let mut iqmp = BigNum::new()?;
        iqmp.mod_inverse(&q, &p, &mut ctx)?;

        let rsa = Rsa::from_private_components(n, e, d, p, q, dmp1, dmq1, iqmp)?;
        if !rsa.check_key()? {
            return Err(BundleError::CryptoFailure(
                "generated key failed consistency check".to_string(),
            ));
        }

        tracing::debug!("Generated RSA-{} key after {} attempt(s)", RSA_MODULUS_BITS, attempts);
        return Ok(KeyPair {
            pkey: PKey::from_rsa(rsa)?,
        });
    }
}

/// Draw a random prime of exactly `bits` bits with the top two bits set.
///
/// Candidates congruent to 1 mod 3 are skipped since `p - 1` would share a
/// factor with the public exponent.
fn random_prime<R: RngCore + CryptoRng>(
    rng: &mut R,
    bits: u32,
    ctx: &mut BigNumContext,
) -> Result<BigNum> {
    let len = ((bits + 7) / 8) as usize;
    let excess = (len * 8) as u32 - bits;
    let mut buf = vec![0u8; len];

    loop {
        rng.try_fill_bytes(&mut buf)
            .map_err(|e| BundleError::CryptoFailure(format!("random source failed: {}", e)))?;

        // Clear bits above `bits`, then set the top two and the lowest.
        buf[0] &= 0xffu8 >> excess;
        if excess < 7 {
            buf[0] |= 0xc0u8 >> excess;
        } else {
            buf[0] |= 0x01;
            buf[1] |= 0x80;
        }
        buf[len - 1] |= 0x01;

        let candidate = BigNum::from_slice(&buf)?;
        if candidate.mod_word(RSA_EXPONENT)? == 1 {
            continue;
        }
        if is_probable_prime(&candidate, ctx)? {
            return Ok(candidate);
        }
    }
}

fn is_probable_prime(candidate: &BigNumRef, ctx: &mut BigNumContext) -> Result<bool> {
    Ok(candidate.is_prime_fasttest(PRIME_CHECKS, ctx, true)?)
}
