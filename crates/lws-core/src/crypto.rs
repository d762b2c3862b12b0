//! Read-time CryptoNote helpers.
//!
//! The view engine never verifies anything. It only needs enough curve
//! arithmetic to check a view key against an address, derive one-time output
//! keys, and re-encode stored RingCT masks and amounts for a client.
use curve25519_dalek::constants::ED25519_BASEPOINT_POINT;
use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar;
use serde::Serialize;
use tiny_keccak::{Hasher, Keccak};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CommonError, Expect};
use crate::types::{Output, PublicKey, ViewKey};

/// Second Pedersen generator `H`.
const H_POINT_BYTES: [u8; 32] = [
    0x8b, 0x65, 0x59, 0x70, 0x15, 0x37, 0x99, 0xaf,
    0x2a, 0xea, 0xdc, 0x9f, 0xf1, 0xad, 0xd0, 0xea,
    0x6c, 0x72, 0x51, 0xd5, 0x41, 0x54, 0xcf, 0xa9,
    0x2c, 0x17, 0x3a, 0x0d, 0xd3, 0x9c, 0x1f, 0x94,
];

/// Shared secret `8·a·R` between a transaction key and a view key.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct KeyDerivation([u8; 32]);

impl KeyDerivation {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// RingCT fields re-encoded for the owning wallet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RctFields {
    pub commitment: PublicKey,
    #[serde(serialize_with = "hex_bytes")]
    pub mask: [u8; 32],
    #[serde(serialize_with = "hex_bytes")]
    pub amount: [u8; 32],
}

fn hex_bytes<S: serde::Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(bytes))
}

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut keccak = Keccak::v256();
    let mut output = [0u8; 32];
    keccak.update(data);
    keccak.finalize(&mut output);
    output
}

fn encode_varint(mut val: u64, buf: &mut Vec<u8>) {
    loop {
        let byte = (val & 0x7f) as u8;
        val >>= 7;
        if val == 0 {
            buf.push(byte);
            break;
        }
        buf.push(byte | 0x80);
    }
}

/// `H_s(data)`: Keccak-256 reduced mod l.
pub fn hash_to_scalar(data: &[u8]) -> Scalar {
    Scalar::from_bytes_mod_order(keccak256(data))
}

fn decompress(point: &[u8; 32]) -> Expect<EdwardsPoint> {
    CompressedEdwardsY(*point).decompress().ok_or_else(|| CommonError::CryptoFailure.into())
}

/// Public key of a secret key. Non-canonical scalars are rejected.
pub fn secret_key_to_public_key(secret: &ViewKey) -> Expect<PublicKey> {
    let scalar: Option<Scalar> = Scalar::from_canonical_bytes(*secret.as_bytes()).into();
    let scalar = scalar.ok_or(CommonError::CryptoFailure)?;
    Ok(PublicKey(EdwardsPoint::mul_base(&scalar).compress().to_bytes()))
}

pub fn generate_key_derivation(tx_public: &PublicKey, view_key: &ViewKey) -> Expect<KeyDerivation> {
    let point = decompress(tx_public.as_bytes())?;
    let scalar = Scalar::from_bytes_mod_order(*view_key.as_bytes());
    let shared = (scalar * point).mul_by_cofactor();
    Ok(KeyDerivation(shared.compress().to_bytes()))
}

/// `H_s(D ‖ varint(index))`.
pub fn derivation_to_scalar(derivation: &KeyDerivation, output_index: u32) -> Scalar {
    let mut buf = Vec::with_capacity(32 + 5);
    buf.extend_from_slice(derivation.as_bytes());
    encode_varint(u64::from(output_index), &mut buf);
    hash_to_scalar(&buf)
}

/// One-time output key `H_s(D ‖ i)·G + base`.
pub fn derive_public_key(
    derivation: &KeyDerivation,
    output_index: u32,
    base: &PublicKey,
) -> Expect<PublicKey> {
    let base = decompress(base.as_bytes())?;
    let scalar = derivation_to_scalar(derivation, output_index);
    Ok(PublicKey((EdwardsPoint::mul_base(&scalar) + base).compress().to_bytes()))
}

/// Pedersen commitment `mask·G + amount·H`.
pub fn commit(amount: u64, mask: &Scalar) -> Expect<PublicKey> {
    let h = decompress(&H_POINT_BYTES)?;
    let point = EdwardsPoint::mul_base(mask) + h * Scalar::from(amount);
    Ok(PublicKey(point.compress().to_bytes()))
}

/// Encode `(mask, amount)` under `shared`: `mask + H_s(s)`, `amount + H_s(H_s(s))`.
pub fn ecdh_encode(mask: &Scalar, amount: u64, shared: &Scalar) -> (Scalar, Scalar) {
    let s1 = hash_to_scalar(shared.as_bytes());
    let s2 = hash_to_scalar(s1.as_bytes());
    (mask + s1, Scalar::from(amount) + s2)
}

/// Rebuild the client-facing RingCT fields of a stored output.
pub fn reconstruct_ringct(output: &Output, view_key: &ViewKey) -> Expect<RctFields> {
    let meta = &output.spend_meta;
    let mask = Scalar::from_bytes_mod_order(output.ringct_mask);
    let commitment = commit(meta.amount, &mask)?;

    let derivation = generate_key_derivation(&meta.tx_public, view_key)?;
    let shared = derivation_to_scalar(&derivation, meta.index);
    let (encoded_mask, encoded_amount) = ecdh_encode(&mask, meta.amount, &shared);

    Ok(RctFields { commitment, mask: encoded_mask.to_bytes(), amount: encoded_amount.to_bytes() })
}

/// The Ed25519 base point `G`.
pub fn basepoint() -> PublicKey {
    PublicKey(ED25519_BASEPOINT_POINT.compress().to_bytes())
}
