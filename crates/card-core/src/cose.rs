//! COSE EC2 key records and ES256K (secp256k1 ECDSA) verification.
//!
//! Common COSE algorithm registries know P-256 but not secp256k1. This module
//! adds the one missing entry: algorithm `-47` (ES256K) on curve `8`
//! (secp256k1), per RFC 8812.
//!
//! # Key Record Format
//!
//! ```text
//! {
//!    1: 2,        // kty: EC2
//!    3: -47,      // alg: ES256K
//!   -1: 8,        // crv: secp256k1
//!   -2: x,        // 32-byte big-endian x-coordinate
//!   -3: y,        // 32-byte big-endian y-coordinate
//! }
//! ```
//!
//! # Example
//!
//! ```
//! use card_protocol_core::cose::{CoseKey, Es256k};
//! use k256::ecdsa::{Signature, SigningKey, signature::Signer};
//!
//! let signing_key = SigningKey::from_slice(&[0x11; 32]).unwrap();
//! let key = CoseKey::from_public_key(&signing_key.verifying_key().into());
//!
//! let message = b"authenticator data || client data hash";
//! let signature: Signature = signing_key.sign(message);
//!
//! Es256k::verify(&key, message, signature.to_der().as_bytes()).unwrap();
//! ```

use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::{Signature, VerifyingKey};
use k256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use k256::{EncodedPoint, FieldBytes, PublicKey};
use minicbor::data::Type;
use minicbor::{Decoder, Encoder};
use sha2::{Digest, Sha256, Sha384, Sha512};
use tracing::debug;

use crate::error::{Error, Result};

/// COSE key type `EC2` (elliptic curve with x and y coordinates).
pub const KTY_EC2: i64 = 2;

/// COSE curve identifier for secp256k1.
pub const CRV_SECP256K1: i64 = 8;

/// COSE key map labels.
mod label {
    pub(super) const KTY: i64 = 1;
    pub(super) const ALG: i64 = 3;
    pub(super) const CRV: i64 = -1;
    pub(super) const X: i64 = -2;
    pub(super) const Y: i64 = -3;
}

/// Coordinate width for secp256k1.
const COORDINATE_LEN: usize = 32;

/// Message digest applied before ECDSA verification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DigestAlgorithm {
    /// SHA-256, the digest ES256K is defined with.
    #[default]
    Sha256,

    /// SHA-384.
    Sha384,

    /// SHA-512.
    Sha512,
}

impl DigestAlgorithm {
    /// Hashes `message`.
    #[must_use]
    pub fn digest(self, message: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha256 => Sha256::digest(message).to_vec(),
            Self::Sha384 => Sha384::digest(message).to_vec(),
            Self::Sha512 => Sha512::digest(message).to_vec(),
        }
    }

    /// Returns the digest length in bytes.
    #[must_use]
    pub const fn output_len(self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }
}

/// A COSE EC2 public key record with fixed-width coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CoseKey {
    key_type: i64,
    algorithm: i64,
    curve: i64,
    x: [u8; COORDINATE_LEN],
    y: [u8; COORDINATE_LEN],
}

impl CoseKey {
    /// Creates a key record from its fields.
    ///
    /// No field is validated; [`Es256k::public_key`] checks the curve and the
    /// point.
    #[must_use]
    pub const fn new(key_type: i64, algorithm: i64, curve: i64, x: [u8; 32], y: [u8; 32]) -> Self {
        Self {
            key_type,
            algorithm,
            curve,
            x,
            y,
        }
    }

    /// Encodes a secp256k1 public key as an ES256K record.
    #[must_use]
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        // 0x04 || x || y
        let point = public_key.to_encoded_point(false);
        let bytes = point.as_bytes();

        let mut x = [0u8; COORDINATE_LEN];
        let mut y = [0u8; COORDINATE_LEN];
        x.copy_from_slice(&bytes[1..=COORDINATE_LEN]);
        y.copy_from_slice(&bytes[1 + COORDINATE_LEN..]);

        Self::new(KTY_EC2, Es256k::ALGORITHM, CRV_SECP256K1, x, y)
    }

    /// Returns the key type (label `1`).
    #[must_use]
    pub const fn key_type(&self) -> i64 {
        self.key_type
    }

    /// Returns the algorithm identifier (label `3`).
    #[must_use]
    pub const fn algorithm(&self) -> i64 {
        self.algorithm
    }

    /// Returns the curve identifier (label `-1`).
    #[must_use]
    pub const fn curve(&self) -> i64 {
        self.curve
    }

    /// Returns the big-endian x-coordinate (label `-2`).
    #[must_use]
    pub const fn x(&self) -> &[u8; 32] {
        &self.x
    }

    /// Returns the big-endian y-coordinate (label `-3`).
    #[must_use]
    pub const fn y(&self) -> &[u8; 32] {
        &self.y
    }

    /// Encodes the record as a CBOR map in canonical label order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyEncoding`] if encoding fails.
    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        let mut encoder = Encoder::new(Vec::with_capacity(80));
        encoder
            .map(5)?
            .i64(label::KTY)?
            .i64(self.key_type)?
            .i64(label::ALG)?
            .i64(self.algorithm)?
            .i64(label::CRV)?
            .i64(self.curve)?
            .i64(label::X)?
            .bytes(&self.x)?
            .i64(label::Y)?
            .bytes(&self.y)?;
        Ok(encoder.into_writer())
    }

    /// Decodes a record from a CBOR map.
    ///
    /// Unknown labels are skipped. Only secp256k1 records are accepted, since
    /// other curves do not fit the fixed coordinate width.
    ///
    /// # Errors
    ///
    /// - [`Error::KeyEncoding`] if the CBOR is malformed, the map has
    ///   indefinite length, a required label is missing, or bytes trail the map
    /// - [`Error::UnsupportedCurve`] if the curve is not secp256k1
    /// - [`Error::InvalidPublicKey`] if a coordinate is not 32 bytes
    pub fn from_cbor(bytes: &[u8]) -> Result<Self> {
        let mut decoder = Decoder::new(bytes);
        let entries = decoder
            .map()?
            .ok_or_else(|| Error::KeyEncoding("indefinite-length map".to_string()))?;

        let mut key_type = None;
        let mut algorithm = None;
        let mut curve = None;
        let mut x = None;
        let mut y = None;

        for _ in 0..entries {
            if decoder.datatype()? == Type::String {
                decoder.skip()?;
                decoder.skip()?;
                continue;
            }

            match decoder.i64()? {
                label::KTY => key_type = Some(decoder.i64()?),
                label::ALG => algorithm = Some(decoder.i64()?),
                label::CRV => curve = Some(decoder.i64()?),
                label::X => x = Some(decoder.bytes()?),
                label::Y => y = Some(decoder.bytes()?),
                _ => decoder.skip()?,
            }
        }

        if decoder.position() != bytes.len() {
            return Err(Error::KeyEncoding(format!(
                "{} trailing bytes after key map",
                bytes.len() - decoder.position()
            )));
        }

        // Coordinate width depends on the curve.
        let curve = required(curve, "crv")?;
        if curve != CRV_SECP256K1 {
            debug!(curve, "rejecting key record on unsupported curve");
            return Err(Error::UnsupportedCurve(curve));
        }

        Ok(Self::new(
            required(key_type, "kty")?,
            required(algorithm, "alg")?,
            curve,
            coordinate(required(x, "x")?, "x")?,
            coordinate(required(y, "y")?, "y")?,
        ))
    }
}

fn coordinate(bytes: &[u8], name: &str) -> Result<[u8; COORDINATE_LEN]> {
    bytes.try_into().map_err(|_| {
        Error::InvalidPublicKey(format!(
            "{name}-coordinate must be {COORDINATE_LEN} bytes, got {}",
            bytes.len()
        ))
    })
}

fn required<T>(value: Option<T>, name: &str) -> Result<T> {
    value.ok_or_else(|| Error::KeyEncoding(format!("missing {name} label")))
}

/// ES256K: ECDSA over secp256k1.
#[derive(Debug, Clone, Copy, Default)]
pub struct Es256k;

impl Es256k {
    /// COSE algorithm identifier for ES256K.
    pub const ALGORITHM: i64 = -47;

    /// The only curve this verifier accepts.
    pub const CURVE: i64 = CRV_SECP256K1;

    /// Digest used by [`verify`](Self::verify).
    pub const DIGEST: DigestAlgorithm = DigestAlgorithm::Sha256;

    /// Encodes a public key as a key record.
    #[must_use]
    pub fn encode(public_key: &PublicKey) -> CoseKey {
        CoseKey::from_public_key(public_key)
    }

    /// Reconstructs the public key described by `key`.
    ///
    /// # Errors
    ///
    /// - [`Error::UnsupportedCurve`] if the curve is not secp256k1
    /// - [`Error::InvalidPublicKey`] if `(x, y)` is not a point on the curve
    pub fn public_key(key: &CoseKey) -> Result<PublicKey> {
        if key.curve != Self::CURVE {
            debug!(curve = key.curve, "rejecting key on unsupported curve");
            return Err(Error::UnsupportedCurve(key.curve));
        }

        let point = EncodedPoint::from_affine_coordinates(
            &FieldBytes::from(key.x),
            &FieldBytes::from(key.y),
            false,
        );

        Option::<PublicKey>::from(PublicKey::from_encoded_point(&point))
            .ok_or_else(|| Error::InvalidPublicKey("point is not on secp256k1".to_string()))
    }

    /// Verifies a DER-encoded signature over `message` using SHA-256.
    ///
    /// # Errors
    ///
    /// See [`verify_with`](Self::verify_with).
    pub fn verify(key: &CoseKey, message: &[u8], signature: &[u8]) -> Result<()> {
        Self::verify_with(key, Self::DIGEST, message, signature)
    }

    /// Verifies a DER-encoded signature over `message` using `digest`.
    ///
    /// High-S signatures are accepted.
    ///
    /// # Errors
    ///
    /// - [`Error::UnsupportedCurve`] if the key is not on secp256k1
    /// - [`Error::InvalidPublicKey`] if the coordinates are not a curve point
    /// - [`Error::SignatureInvalid`] if the signature is malformed or does
    ///   not verify
    pub fn verify_with(
        key: &CoseKey,
        digest: DigestAlgorithm,
        message: &[u8],
        signature: &[u8],
    ) -> Result<()> {
        let public_key = Self::public_key(key)?;
        let verifying_key = VerifyingKey::from_affine(*public_key.as_affine())
            .map_err(|e| Error::InvalidPublicKey(e.to_string()))?;

        let signature = Signature::from_der(signature).map_err(|_| Error::SignatureInvalid)?;
        // k256 only verifies low-S.
        let signature = signature.normalize_s().unwrap_or(signature);

        let prehash = digest.digest(message);
        verifying_key
            .verify_prehash(&prehash, &signature)
            .map_err(|_| Error::SignatureInvalid)
    }
}
