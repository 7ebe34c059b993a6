use openssl::pkey::HasPublic;
use openssl::rsa::RsaRef;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::{BundleError, Result};

/// Size of an SGXS measurement record in bytes.
pub const SGXS_RECORD_SIZE: usize = 64;
/// Size of the data block following each EEXTEND record.
const SGXS_EEXTEND_DATA_SIZE: usize = 256;
/// Size of a 3072-bit modulus in bytes.
pub const MODULUS_SIZE: usize = 384;

const TAG_ECREATE: &[u8; 8] = b"ECREATE\0";
const TAG_EADD: &[u8; 8] = b"EADD\0\0\0\0";
const TAG_EEXTEND: &[u8; 8] = b"EEXTEND\0";

macro_rules! measurement_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $name([u8; 32]);

        impl $name {
            pub fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl FromStr for $name {
            type Err = BundleError;

            fn from_str(s: &str) -> Result<Self> {
                let raw = hex::decode(s)
                    .map_err(|e| BundleError::invalid_field(stringify!($name), e))?;
                let bytes: [u8; 32] = raw.try_into().map_err(|_| {
                    BundleError::invalid_field(stringify!($name), "expected 32 bytes")
                })?;
                Ok(Self(bytes))
            }
        }
    };
}

measurement_type!(
    /// Enclave measurement (MRENCLAVE): what was signed.
    MrEnclave
);

measurement_type!(
    /// Signer identity (MRSIGNER): who signed it.
    MrSigner
);

/// Compute MRENCLAVE from an SGXS measurement stream.
///
/// The stream is made of 64-byte records starting with ECREATE, then EADD and
/// EEXTEND records (EEXTEND is followed by 256 bytes of page data). The SHA-256
/// of the whole stream is the value the SGX loader derives at EINIT.
pub fn measure_enclave(image: &[u8]) -> Result<MrEnclave> {
    validate_sgxs(image)?;

    let digest: [u8; 32] = Sha256::digest(image).into();
    Ok(MrEnclave(digest))
}

fn validate_sgxs(image: &[u8]) -> Result<()> {
    if image.is_empty() {
        return Err(BundleError::InvalidEnclaveImage("image is empty".to_string()));
    }
    if image.len() < SGXS_RECORD_SIZE {
        return Err(BundleError::InvalidEnclaveImage(format!(
            "image is {} bytes, smaller than one {}-byte record",
            image.len(),
            SGXS_RECORD_SIZE
        )));
    }
    if &image[..8] != TAG_ECREATE {
        return Err(BundleError::InvalidEnclaveImage(
            "stream does not start with an ECREATE record".to_string(),
        ));
    }

    let mut offset = SGXS_RECORD_SIZE;
    while offset < image.len() {
        let record = &image[offset..];
        if record.len() < SGXS_RECORD_SIZE {
            return Err(BundleError::InvalidEnclaveImage(format!(
                "truncated record at offset {:#x}",
                offset
            )));
        }

        let tag = &record[..8];
        let record_len = if tag == TAG_EADD {
            SGXS_RECORD_SIZE
        } else if tag == TAG_EEXTEND {
            SGXS_RECORD_SIZE + SGXS_EEXTEND_DATA_SIZE
        } else if tag == TAG_ECREATE {
            return Err(BundleError::InvalidEnclaveImage(format!(
                "duplicate ECREATE record at offset {:#x}",
                offset
            )));
        } else {
            return Err(BundleError::InvalidEnclaveImage(format!(
                "unknown record tag {} at offset {:#x}",
                hex::encode(tag),
                offset
            )));
        };

        if record.len() < record_len {
            return Err(BundleError::InvalidEnclaveImage(format!(
                "truncated record at offset {:#x}",
                offset
            )));
        }
        offset += record_len;
    }

    Ok(())
}

/// Compute MRSIGNER: SHA-256 over the little-endian 3072-bit modulus.
pub fn signer_identity<T: HasPublic>(public_key: &RsaRef<T>) -> Result<MrSigner> {
    let modulus = public_key.n().to_vec_padded(MODULUS_SIZE as i32).map_err(|_| {
        BundleError::CryptoFailure(format!(
            "modulus does not fit in {} bytes",
            MODULUS_SIZE
        ))
    })?;

    Ok(signer_identity_from_modulus(&modulus))
}

/// MRSIGNER from a big-endian modulus of [`MODULUS_SIZE`] bytes.
pub(crate) fn signer_identity_from_modulus(modulus_be: &[u8]) -> MrSigner {
    let mut le = modulus_be.to_vec();
    le.reverse();
    MrSigner(Sha256::digest(&le).into())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a small well-formed SGXS stream: ECREATE, one EADD, `pages` EEXTENDs.
    pub(crate) fn test_sgxs(pages: usize, fill: u8) -> Vec<u8> {
        let mut image = Vec::new();

        let mut ecreate = [0u8; SGXS_RECORD_SIZE];
        ecreate[..8].copy_from_slice(TAG_ECREATE);
        ecreate[8..12].copy_from_slice(&1u32.to_le_bytes());
        ecreate[12..20].copy_from_slice(&0x10_0000u64.to_le_bytes());
        image.extend_from_slice(&ecreate);

        let mut eadd = [0u8; SGXS_RECORD_SIZE];
        eadd[..8].copy_from_slice(TAG_EADD);
        image.extend_from_slice(&eadd);

        for i in 0..pages {
            let mut eextend = [0u8; SGXS_RECORD_SIZE];
            eextend[..8].copy_from_slice(TAG_EEXTEND);
            eextend[8..16].copy_from_slice(&((i * SGXS_EEXTEND_DATA_SIZE) as u64).to_le_bytes());
            image.extend_from_slice(&eextend);
            image.extend_from_slice(&[fill; SGXS_EEXTEND_DATA_SIZE]);
        }

        image
    }

    #[test]
    fn test_measure_is_sha256_of_stream() {
        let image = test_sgxs(2, 0xAB);
        let mr = measure_enclave(&image).unwrap();

        let expected: [u8; 32] = Sha256::digest(&image).into();
        assert_eq!(mr.as_bytes(), &expected);
    }

    #[test]
    fn test_measure_is_deterministic_and_content_sensitive() {
        let a = measure_enclave(&test_sgxs(1, 0x01)).unwrap();
        let b = measure_enclave(&test_sgxs(1, 0x01)).unwrap();
        let c = measure_enclave(&test_sgxs(1, 0x02)).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_reject_empty_and_short_images() {
        assert!(matches!(
            measure_enclave(&[]),
            Err(BundleError::InvalidEnclaveImage(_))
        ));
        assert!(matches!(
            measure_enclave(&[0u8; 32]),
            Err(BundleError::InvalidEnclaveImage(_))
        ));
    }

    #[test]
    fn test_reject_missing_ecreate() {
        let mut image = test_sgxs(1, 0);
        image[0] = b'X';
        assert!(matches!(
            measure_enclave(&image),
            Err(BundleError::InvalidEnclaveImage(_))
        ));
    }

    #[test]
    fn test_reject_truncated_eextend() {
        let mut image = test_sgxs(1, 0);
        image.truncate(image.len() - 10);
        assert!(matches!(
            measure_enclave(&image),
            Err(BundleError::InvalidEnclaveImage(_))
        ));
    }

    #[test]
    fn test_reject_unknown_record() {
        let mut image = test_sgxs(0, 0);
        image.extend_from_slice(&[0xFFu8; SGXS_RECORD_SIZE]);
        assert!(matches!(
            measure_enclave(&image),
            Err(BundleError::InvalidEnclaveImage(_))
        ));
    }

    #[test]
    fn test_signer_identity_hashes_little_endian_modulus() {
        let mut modulus_be = vec![0u8; MODULUS_SIZE];
        modulus_be[0] = 0xC0;
        modulus_be[MODULUS_SIZE - 1] = 0x01;

        let mr = signer_identity_from_modulus(&modulus_be);

        let mut le = modulus_be.clone();
        le.reverse();
        let expected: [u8; 32] = Sha256::digest(&le).into();
        assert_eq!(mr.as_bytes(), &expected);
    }

    #[test]
    fn test_measurement_hex_parsing() {
        let mr = measure_enclave(&test_sgxs(0, 0)).unwrap();
        let parsed: MrEnclave = mr.to_string().parse().unwrap();
        assert_eq!(parsed, mr);
        assert!("00".parse::<MrEnclave>().is_err());
    }
}
