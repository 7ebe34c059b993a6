//! SGX SIGSTRUCT construction, signing and verification.
//!
//! Layout (1808 bytes, little-endian):
//!
//! | offset | size | field                                 |
//! |--------|------|---------------------------------------|
//! | 0      | 16   | HEADER                                |
//! | 16     | 4    | VENDOR                                |
//! | 20     | 4    | DATE (BCD, 0xYYYYMMDD)                |
//! | 24     | 16   | HEADER2                               |
//! | 40     | 4    | SWDEFINED                             |
//! | 128    | 384  | MODULUS                               |
//! | 512    | 4    | EXPONENT (3)                          |
//! | 516    | 384  | SIGNATURE                             |
//! | 900    | 4    | MISCSELECT                            |
//! | 904    | 4    | MISCMASK                              |
//! | 928    | 16   | ATTRIBUTES (flags, xfrm)              |
//! | 944    | 16   | ATTRIBUTEMASK (flags, xfrm)           |
//! | 960    | 32   | ENCLAVEHASH                           |
//! | 1024   | 2    | ISVPRODID                             |
//! | 1026   | 2    | ISVSVN                                |
//! | 1040   | 384  | Q1                                    |
//! | 1424   | 384  | Q2                                    |
//!
//! The signed portion is bytes `[0, 128)` followed by `[900, 1028)`.
use chrono::{Datelike, Local, NaiveDate};
use openssl::bn::{BigNum, BigNumContext};
use openssl::md::Md;
use openssl::pkey::{HasPublic, PKey, Public};
use openssl::pkey_ctx::PkeyCtx;
use openssl::rsa::{Padding, Rsa, RsaRef};
use sha2::{Digest, Sha256};
use std::str::FromStr;

use super::keygen::{KeyPair, RSA_EXPONENT, RSA_MODULUS_BITS};
use super::measurement::{signer_identity_from_modulus, MrEnclave, MrSigner, MODULUS_SIZE};
use crate::{BundleError, Result};

/// Total SIGSTRUCT size in bytes.
pub const SIGSTRUCT_SIZE: usize = 1808;

const HEADER: [u8; 16] = [
    0x06, 0x00, 0x00, 0x00, 0xe1, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00,
];
const HEADER2: [u8; 16] = [
    0x01, 0x01, 0x00, 0x00, 0x60, 0x00, 0x00, 0x00, 0x60, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00,
];

const OFFSET_HEADER: usize = 0;
const OFFSET_VENDOR: usize = 16;
const OFFSET_DATE: usize = 20;
const OFFSET_HEADER2: usize = 24;
const OFFSET_SWDEFINED: usize = 40;
const OFFSET_MODULUS: usize = 128;
const OFFSET_EXPONENT: usize = 512;
const OFFSET_SIGNATURE: usize = 516;
const OFFSET_MISCSELECT: usize = 900;
const OFFSET_MISCMASK: usize = 904;
const OFFSET_ATTRIBUTES: usize = 928;
const OFFSET_ATTRIBUTEMASK: usize = 944;
const OFFSET_ENCLAVEHASH: usize = 960;
const OFFSET_ISVPRODID: usize = 1024;
const OFFSET_ISVSVN: usize = 1026;
const OFFSET_Q1: usize = 1040;
const OFFSET_Q2: usize = 1424;

const SIGNED_HEADER: std::ops::Range<usize> = 0..128;
const SIGNED_BODY: std::ops::Range<usize> = 900..1028;

/// Lower 64 bits of the SGX ATTRIBUTES field plus XFRM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Attributes {
    pub flags: u64,
    pub xfrm: u64,
}

impl Attributes {
    pub const INIT: u64 = 0x01;
    pub const DEBUG: u64 = 0x02;
    pub const MODE64BIT: u64 = 0x04;
    pub const PROVISION_KEY: u64 = 0x10;
    pub const EINITTOKEN_KEY: u64 = 0x20;

    const FLAG_NAMES: [(u64, &'static str); 5] = [
        (Self::INIT, "init"),
        (Self::DEBUG, "DEBUG"),
        (Self::MODE64BIT, "64-bit mode"),
        (Self::PROVISION_KEY, "provision key"),
        (Self::EINITTOKEN_KEY, "enclave init token key"),
    ];

    pub fn contains(&self, flag: u64) -> bool {
        self.flags & flag == flag
    }

    /// Names of the well-known flags set in `flags`.
    pub fn flag_names(&self) -> Vec<&'static str> {
        Self::FLAG_NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }
}

/// A `value/mask` pair as accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskedValue<T> {
    pub value: T,
    pub mask: T,
}

impl<T> MaskedValue<T> {
    pub fn new(value: T, mask: T) -> Self {
        Self { value, mask }
    }
}

fn parse_number(s: &str) -> std::result::Result<u64, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex_digits) => u64::from_str_radix(hex_digits, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("'{}': {}", s, e))
}

fn parse_pair(s: &str) -> std::result::Result<(u64, u64), String> {
    let (value, mask) = s
        .split_once('/')
        .ok_or_else(|| format!("'{}' is not in <value>/<mask> form", s))?;
    Ok((parse_number(value)?, parse_number(mask)?))
}

impl MaskedValue<u64> {
    /// Parse a `value/mask` pair, naming `field` in any error.
    pub fn parse_field(field: &'static str, s: &str) -> Result<Self> {
        let (value, mask) = parse_pair(s).map_err(|e| BundleError::invalid_field(field, e))?;
        Ok(Self::new(value, mask))
    }
}

impl MaskedValue<u32> {
    /// Parse a `value/mask` pair of 32-bit numbers, naming `field` in any error.
    pub fn parse_field(field: &'static str, s: &str) -> Result<Self> {
        let (value, mask) = parse_pair(s).map_err(|e| BundleError::invalid_field(field, e))?;
        let narrow = |v: u64| {
            u32::try_from(v).map_err(|_| {
                BundleError::invalid_field(field, format!("{:#x} does not fit in 32 bits", v))
            })
        };
        Ok(Self::new(narrow(value)?, narrow(mask)?))
    }
}

impl FromStr for MaskedValue<u64> {
    type Err = BundleError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_field("value/mask", s)
    }
}

impl FromStr for MaskedValue<u32> {
    type Err = BundleError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_field("value/mask", s)
    }
}

/// Caller-supplied SIGSTRUCT fields. Masks are given in their natural form
/// (a set bit means "enforced") and inverted when the record is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningFields {
    /// Build date; today when unset.
    pub date: Option<NaiveDate>,
    pub sw_defined: u32,
    pub isv_prod_id: u16,
    pub isv_svn: u16,
    pub misc_select: MaskedValue<u32>,
    pub attributes: MaskedValue<u64>,
    pub xfrm: MaskedValue<u64>,
    /// Clear MODE64BIT in the attributes and enforce it in the mask.
    pub mode_32bit: bool,
    /// Set DEBUG in the attributes and drop it from the mask.
    pub debug: bool,
}

impl Default for SigningFields {
    fn default() -> Self {
        Self {
            date: None,
            sw_defined: 0,
            isv_prod_id: 0,
            isv_svn: 0,
            misc_select: MaskedValue::new(0, 0),
            attributes: MaskedValue::new(0x4, 0x2),
            xfrm: MaskedValue::new(0x3, 0x3),
            mode_32bit: false,
            debug: false,
        }
    }
}

/// Parse a build date in `YYYYMMDD` form.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y%m%d")
        .map_err(|e| BundleError::invalid_field("date", format!("'{}': {}", s, e)))
}

/// Declared SIGSTRUCT fields, without key material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sigstruct {
    pub build_date: NaiveDate,
    pub sw_defined: u32,
    pub isv_prod_id: u16,
    pub isv_svn: u16,
    pub misc_select: u32,
    /// Stored (inverted) MISCMASK.
    pub misc_select_mask: u32,
    pub attributes: Attributes,
    /// Stored (inverted) ATTRIBUTEMASK: `[flags, xfrm]`.
    pub attributes_mask: [u64; 2],
    pub enclave_hash: MrEnclave,
}

impl Sigstruct {
    /// Assemble a SIGSTRUCT from signing fields and the enclave measurement.
    pub fn build(fields: &SigningFields, enclave_hash: MrEnclave) -> Self {
        let mut attributes = fields.attributes.value;
        let mut attributes_mask = !fields.attributes.mask;
        if fields.mode_32bit {
            attributes &= !Attributes::MODE64BIT;
            attributes_mask |= Attributes::MODE64BIT;
        }
        if fields.debug {
            attributes |= Attributes::DEBUG;
            attributes_mask &= !Attributes::DEBUG;
        }

        Self {
            build_date: fields.date.unwrap_or_else(|| Local::now().date_naive()),
            sw_defined: fields.sw_defined,
            isv_prod_id: fields.isv_prod_id,
            isv_svn: fields.isv_svn,
            misc_select: fields.misc_select.value,
            misc_select_mask: !fields.misc_select.mask,
            attributes: Attributes {
                flags: attributes,
                xfrm: fields.xfrm.value,
            },
            attributes_mask: [attributes_mask, !fields.xfrm.mask],
            enclave_hash,
        }
    }

    /// Serialize the declared fields into a full-size buffer, key material zeroed.
    fn encode(&self) -> Vec<u8> {
        let mut out = vec![0u8; SIGSTRUCT_SIZE];

        out[OFFSET_HEADER..OFFSET_HEADER + 16].copy_from_slice(&HEADER);
        put_u32(&mut out, OFFSET_VENDOR, 0);
        put_u32(&mut out, OFFSET_DATE, encode_date(self.build_date));
        out[OFFSET_HEADER2..OFFSET_HEADER2 + 16].copy_from_slice(&HEADER2);
        put_u32(&mut out, OFFSET_SWDEFINED, self.sw_defined);

        put_u32(&mut out, OFFSET_MISCSELECT, self.misc_select);
        put_u32(&mut out, OFFSET_MISCMASK, self.misc_select_mask);
        put_u64(&mut out, OFFSET_ATTRIBUTES, self.attributes.flags);
        put_u64(&mut out, OFFSET_ATTRIBUTES + 8, self.attributes.xfrm);
        put_u64(&mut out, OFFSET_ATTRIBUTEMASK, self.attributes_mask[0]);
        put_u64(&mut out, OFFSET_ATTRIBUTEMASK + 8, self.attributes_mask[1]);
        out[OFFSET_ENCLAVEHASH..OFFSET_ENCLAVEHASH + 32].copy_from_slice(self.enclave_hash.as_bytes());
        put_u16(&mut out, OFFSET_ISVPRODID, self.isv_prod_id);
        put_u16(&mut out, OFFSET_ISVSVN, self.isv_svn);

        out
    }

    fn decode(raw: &[u8]) -> Result<Self> {
        if raw[OFFSET_HEADER..OFFSET_HEADER + 16] != HEADER {
            return Err(BundleError::MalformedRecord("bad HEADER".to_string()));
        }
        if raw[OFFSET_HEADER2..OFFSET_HEADER2 + 16] != HEADER2 {
            return Err(BundleError::MalformedRecord("bad HEADER2".to_string()));
        }

        let mut enclave_hash = [0u8; 32];
        enclave_hash.copy_from_slice(&raw[OFFSET_ENCLAVEHASH..OFFSET_ENCLAVEHASH + 32]);

        Ok(Self {
            build_date: decode_date(get_u32(raw, OFFSET_DATE))?,
            sw_defined: get_u32(raw, OFFSET_SWDEFINED),
            isv_prod_id: get_u16(raw, OFFSET_ISVPRODID),
            isv_svn: get_u16(raw, OFFSET_ISVSVN),
            misc_select: get_u32(raw, OFFSET_MISCSELECT),
            misc_select_mask: get_u32(raw, OFFSET_MISCMASK),
            attributes: Attributes {
                flags: get_u64(raw, OFFSET_ATTRIBUTES),
                xfrm: get_u64(raw, OFFSET_ATTRIBUTES + 8),
            },
            attributes_mask: [
                get_u64(raw, OFFSET_ATTRIBUTEMASK),
                get_u64(raw, OFFSET_ATTRIBUTEMASK + 8),
            ],
            enclave_hash: MrEnclave::from_bytes(enclave_hash),
        })
    }

    /// Bytes covered by the signature: header and body, key material excluded.
    pub fn signing_data(&self) -> Vec<u8> {
        signed_portion(&self.encode())
    }

    /// SHA-256 of [`Self::signing_data`]; this is what an external signer signs.
    pub fn hash_for_signature(&self) -> [u8; 32] {
        Sha256::digest(self.signing_data()).into()
    }

    /// Attach an externally produced PKCS#1 v1.5 / SHA-256 signature (big-endian).
    pub fn attach_signature<T: HasPublic>(
        &self,
        signature: &[u8],
        public_key: &RsaRef<T>,
    ) -> Result<SignedSigstruct> {
        check_key_shape(public_key)?;

        let modulus = public_key.n().to_vec_padded(MODULUS_SIZE as i32)?;
        let public = PKey::from_rsa(public_rsa(&modulus)?)?;
        if signature.len() != MODULUS_SIZE
            || !verify_hash(&public, &self.hash_for_signature(), signature)?
        {
            return Err(BundleError::SignatureMismatch);
        }

        SignedSigstruct::assemble(self.clone(), modulus, signature.to_vec())
    }

    /// Sign with a held private key.
    pub fn sign(&self, key: &KeyPair) -> Result<SignedSigstruct> {
        let rsa = key.pkey().rsa()?;
        check_key_shape(&rsa)?;

        let mut ctx = PkeyCtx::new(key.pkey())?;
        ctx.sign_init()?;
        ctx.set_rsa_padding(Padding::PKCS1)?;
        ctx.set_signature_md(Md::sha256())?;

        let mut signature = Vec::new();
        ctx.sign_to_vec(&self.hash_for_signature(), &mut signature)?;

        let modulus = rsa.n().to_vec_padded(MODULUS_SIZE as i32)?;
        SignedSigstruct::assemble(self.clone(), modulus, left_pad(&signature)?)
    }
}

/// A SIGSTRUCT carrying its signer's modulus, the signature and Q1/Q2.
///
/// All big numbers are kept big-endian and converted on (de)serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedSigstruct {
    sigstruct: Sigstruct,
    /// Signed bytes exactly as they appear in the record, VENDOR and reserved spans included.
    signed_data: Vec<u8>,
    modulus: Vec<u8>,
    signature: Vec<u8>,
    q1: Vec<u8>,
    q2: Vec<u8>,
}

/// Result of a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub sigstruct: Sigstruct,
    pub mr_signer: MrSigner,
}

impl SignedSigstruct {
    fn assemble(sigstruct: Sigstruct, modulus: Vec<u8>, signature: Vec<u8>) -> Result<Self> {
        let (q1, q2) = compute_q1_q2(&signature, &modulus)?;
        Ok(Self {
            signed_data: sigstruct.signing_data(),
            sigstruct,
            modulus,
            signature,
            q1,
            q2,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; SIGSTRUCT_SIZE];
        let (header, body) = self.signed_data.split_at(SIGNED_HEADER.len());
        out[SIGNED_HEADER].copy_from_slice(header);
        out[SIGNED_BODY].copy_from_slice(body);
        put_le(&mut out, OFFSET_MODULUS, &self.modulus);
        put_u32(&mut out, OFFSET_EXPONENT, RSA_EXPONENT);
        put_le(&mut out, OFFSET_SIGNATURE, &self.signature);
        put_le(&mut out, OFFSET_Q1, &self.q1);
        put_le(&mut out, OFFSET_Q2, &self.q2);
        out
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        if raw.len() != SIGSTRUCT_SIZE {
            return Err(BundleError::MalformedRecord(format!(
                "expected {} bytes, got {}",
                SIGSTRUCT_SIZE,
                raw.len()
            )));
        }

        let exponent = get_u32(raw, OFFSET_EXPONENT);
        if exponent != RSA_EXPONENT {
            return Err(BundleError::MalformedRecord(format!(
                "exponent is {}, expected {}",
                exponent, RSA_EXPONENT
            )));
        }

        Ok(Self {
            sigstruct: Sigstruct::decode(raw)?,
            signed_data: signed_portion(raw),
            modulus: get_le(raw, OFFSET_MODULUS),
            signature: get_le(raw, OFFSET_SIGNATURE),
            q1: get_le(raw, OFFSET_Q1),
            q2: get_le(raw, OFFSET_Q2),
        })
    }

    /// Fields decoded from the record.
    pub fn sigstruct(&self) -> &Sigstruct {
        &self.sigstruct
    }

    /// Public key rebuilt from the embedded modulus and the fixed exponent.
    pub fn public_key(&self) -> Result<Rsa<Public>> {
        public_rsa(&self.modulus)
    }

    pub fn mr_signer(&self) -> MrSigner {
        signer_identity_from_modulus(&self.modulus)
    }

    /// Check the record against the expected enclave measurement and its own signature.
    pub fn verify(&self, expected: &MrEnclave) -> Result<VerifiedIdentity> {
        if self.sigstruct.enclave_hash != *expected {
            return Err(BundleError::MeasurementMismatch {
                expected: expected.to_string(),
                actual: self.sigstruct.enclave_hash.to_string(),
            });
        }

        let public = PKey::from_rsa(self.public_key()?)?;
        if !verify_hash(&public, &Sha256::digest(&self.signed_data), &self.signature)? {
            return Err(BundleError::SignatureInvalid(
                "signature does not verify under the embedded modulus".to_string(),
            ));
        }

        let (q1, q2) = compute_q1_q2(&self.signature, &self.modulus)?;
        if q1 != self.q1 || q2 != self.q2 {
            return Err(BundleError::SignatureInvalid(
                "Q1/Q2 do not match the signature".to_string(),
            ));
        }

        Ok(VerifiedIdentity {
            sigstruct: self.sigstruct.clone(),
            mr_signer: self.mr_signer(),
        })
    }
}

/// Parse a signed SIGSTRUCT and verify it against the expected measurement.
pub fn verify(raw: &[u8], expected: &MrEnclave) -> Result<VerifiedIdentity> {
    SignedSigstruct::from_bytes(raw)?.verify(expected)
}

fn check_key_shape<T: HasPublic>(key: &RsaRef<T>) -> Result<()> {
    let bits = key.n().num_bits();
    if bits != RSA_MODULUS_BITS as i32 {
        return Err(BundleError::CryptoFailure(format!(
            "modulus is {} bits, expected {}",
            bits, RSA_MODULUS_BITS
        )));
    }
    if key.e().to_vec() != [RSA_EXPONENT as u8] {
        return Err(BundleError::CryptoFailure(format!(
            "public exponent must be {}",
            RSA_EXPONENT
        )));
    }
    Ok(())
}

fn public_rsa(modulus_be: &[u8]) -> Result<Rsa<Public>> {
    let n = BigNum::from_slice(modulus_be)?;
    let e = BigNum::from_u32(RSA_EXPONENT)?;
    Ok(Rsa::from_public_components(n, e)?)
}

fn verify_hash(public: &PKey<Public>, hash: &[u8], signature_be: &[u8]) -> Result<bool> {
    let mut ctx = PkeyCtx::new(public)?;
    ctx.verify_init()?;
    ctx.set_rsa_padding(Padding::PKCS1)?;
    ctx.set_signature_md(Md::sha256())?;
    // OpenSSL reports some malformed signatures as errors rather than a mismatch.
    Ok(matches!(ctx.verify(hash, signature_be), Ok(true)))
}

/// `Q1 = floor(S^2 / M)`, `Q2 = floor((S^3 - Q1*S*M) / M)`, both big-endian and padded.
fn compute_q1_q2(signature_be: &[u8], modulus_be: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
    let mut ctx = BigNumContext::new()?;
    let s = BigNum::from_slice(signature_be)?;
    let m = BigNum::from_slice(modulus_be)?;

    let mut s2 = BigNum::new()?;
    s2.checked_mul(&s, &s, &mut ctx)?;
    let mut q1 = BigNum::new()?;
    q1.checked_div(&s2, &m, &mut ctx)?;

    let mut s3 = BigNum::new()?;
    s3.checked_mul(&s2, &s, &mut ctx)?;
    let mut q1s = BigNum::new()?;
    q1s.checked_mul(&q1, &s, &mut ctx)?;
    let mut q1sm = BigNum::new()?;
    q1sm.checked_mul(&q1s, &m, &mut ctx)?;
    let mut rest = BigNum::new()?;
    rest.checked_sub(&s3, &q1sm)?;
    let mut q2 = BigNum::new()?;
    q2.checked_div(&rest, &m, &mut ctx)?;

    Ok((
        q1.to_vec_padded(MODULUS_SIZE as i32)?,
        q2.to_vec_padded(MODULUS_SIZE as i32)?,
    ))
}

fn left_pad(be: &[u8]) -> Result<Vec<u8>> {
    if be.len() > MODULUS_SIZE {
        return Err(BundleError::CryptoFailure(format!(
            "signature is {} bytes, expected {}",
            be.len(),
            MODULUS_SIZE
        )));
    }
    let mut out = vec![0u8; MODULUS_SIZE - be.len()];
    out.extend_from_slice(be);
    Ok(out)
}

fn signed_portion(raw: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(SIGNED_HEADER.len() + SIGNED_BODY.len());
    data.extend_from_slice(&raw[SIGNED_HEADER]);
    data.extend_from_slice(&raw[SIGNED_BODY]);
    data
}

fn to_bcd(mut value: u32, digits: u32) -> u32 {
    let mut out = 0;
    for i in 0..digits {
        out |= (value % 10) << (4 * i);
        value /= 10;
    }
    out
}

fn from_bcd(value: u32, digits: u32) -> Result<u32> {
    let mut out = 0;
    for i in (0..digits).rev() {
        let nibble = (value >> (4 * i)) & 0xf;
        if nibble > 9 {
            return Err(BundleError::MalformedRecord(format!(
                "DATE {:#010x} is not BCD",
                value
            )));
        }
        out = out * 10 + nibble;
    }
    Ok(out)
}

fn encode_date(date: NaiveDate) -> u32 {
    let year = date.year().clamp(0, 9999) as u32;
    (to_bcd(year, 4) << 16) | (to_bcd(date.month(), 2) << 8) | to_bcd(date.day(), 2)
}

fn decode_date(raw: u32) -> Result<NaiveDate> {
    let year = from_bcd(raw >> 16, 4)?;
    let month = from_bcd((raw >> 8) & 0xff, 2)?;
    let day = from_bcd(raw & 0xff, 2)?;
    NaiveDate::from_ymd_opt(year as i32, month, day)
        .ok_or_else(|| BundleError::MalformedRecord(format!("DATE {:#010x} is not a date", raw)))
}

fn put_u16(out: &mut [u8], offset: usize, v: u16) {
    out[offset..offset + 2].copy_from_slice(&v.to_le_bytes());
}

fn put_u32(out: &mut [u8], offset: usize, v: u32) {
    out[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
}

fn put_u64(out: &mut [u8], offset: usize, v: u64) {
    out[offset..offset + 8].copy_from_slice(&v.to_le_bytes());
}

/// Store a big-endian number little-endian.
fn put_le(out: &mut [u8], offset: usize, be: &[u8]) {
    for (dst, src) in out[offset..offset + be.len()].iter_mut().zip(be.iter().rev()) {
        *dst = *src;
    }
}

fn get_u16(raw: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([raw[offset], raw[offset + 1]])
}

fn get_u32(raw: &[u8], offset: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&raw[offset..offset + 4]);
    u32::from_le_bytes(b)
}

fn get_u64(raw: &[u8], offset: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&raw[offset..offset + 8]);
    u64::from_le_bytes(b)
}

/// Read a little-endian number of [`MODULUS_SIZE`] bytes as big-endian.
fn get_le(raw: &[u8], offset: usize) -> Vec<u8> {
    let mut be = raw[offset..offset + MODULUS_SIZE].to_vec();
    be.reverse();
    be
}

#[cfg(test)]
#[path = "sigstruct_tests.rs"]
mod sigstruct_tests;
