//! Cryptographic primitives for forgechain
//!
//! Keys live on secp256k1. Transactions embed the raw 64-byte public key
//! (x and y coordinates concatenated) and a 64-byte compact signature
//! (the r and s scalars concatenated). Addresses are Base58Check strings
//! over the RIPEMD160-of-SHA256 hash of the raw public key.

use crate::error::{ChainError, Result};
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use ripemd::Ripemd160;
use secp256k1::{
    constants::{COMPACT_SIGNATURE_SIZE, SECRET_KEY_SIZE, UNCOMPRESSED_PUBLIC_KEY_SIZE},
    ecdsa::Signature,
    All, Message, PublicKey, Secp256k1, SecretKey,
};
use sha2::{Digest, Sha256};

/// A thread-safe, lazily initialized Secp256k1 context.
/// This prevents repeated, unnecessary context creation.
static SECP256K1_CONTEXT: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

/// Size of the raw public key carried in transaction inputs: the two
/// 32-byte curve coordinates, without the SEC1 prefix byte.
pub const RAW_PUBLIC_KEY_SIZE: usize = UNCOMPRESSED_PUBLIC_KEY_SIZE - 1;

/// Version byte prepended to every public key hash before encoding.
pub const ADDRESS_VERSION: u8 = 0x00;

/// Number of checksum bytes appended to an address payload.
pub const ADDRESS_CHECKSUM_SIZE: usize = 4;

#[derive(Debug, Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generates a new random KeyPair using the OS random number generator.
    pub fn generate() -> Result<Self> {
        let secret_key = SecretKey::new(&mut OsRng);
        // Using the context from the static Lazy
        let public_key = PublicKey::from_secret_key(&SECP256K1_CONTEXT, &secret_key);

        Ok(KeyPair {
            secret_key,
            public_key,
        })
    }

    /// Creates a KeyPair from an existing SecretKey.
    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        // Using the context from the static Lazy
        let public_key = PublicKey::from_secret_key(&SECP256K1_CONTEXT, &secret_key);
        KeyPair {
            secret_key,
            public_key,
        }
    }

    /// Creates a KeyPair from raw secret key bytes.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self> {
        let secret_key = SecretKey::from_slice(bytes).map_err(|e| {
            if bytes.len() != SECRET_KEY_SIZE {
                ChainError::Crypto(format!(
                    "Secret key must be {} bytes, got {}",
                    SECRET_KEY_SIZE,
                    bytes.len()
                ))
            } else {
                ChainError::Crypto(format!("Invalid secret key bytes: {}", e))
            }
        })?;

        Ok(Self::from_secret_key(secret_key))
    }

    /// Returns the raw public key as carried in transaction inputs:
    /// the uncompressed SEC1 encoding with the leading 0x04 stripped.
    pub fn public_key_bytes(&self) -> [u8; RAW_PUBLIC_KEY_SIZE] {
        let uncompressed = self.public_key.serialize_uncompressed();
        let mut raw = [0u8; RAW_PUBLIC_KEY_SIZE];
        raw.copy_from_slice(&uncompressed[1..]);
        raw
    }

    /// Base58Check address of this key.
    pub fn address(&self) -> String {
        encode_address(&hash_pub_key(&self.public_key_bytes()))
    }

    /// Signs a 32-byte digest and returns the compact signature bytes.
    pub fn sign_digest(&self, digest: &[u8]) -> Result<[u8; COMPACT_SIGNATURE_SIZE]> {
        sign_digest(digest, &self.secret_key)
    }
}

/// Signs a 32-byte digest with `secret_key`, returning the 64-byte compact
/// signature (r scalar followed by s scalar).
pub fn sign_digest(digest: &[u8], secret_key: &SecretKey) -> Result<[u8; COMPACT_SIGNATURE_SIZE]> {
    let message = Message::from_digest_slice(digest)
        .map_err(|e| ChainError::Crypto(format!("Failed to create message: {}", e)))?;

    // Using the context from the static Lazy
    let signature = SECP256K1_CONTEXT.sign_ecdsa(&message, secret_key);
    Ok(signature.serialize_compact())
}

/// Verifies a compact signature over a 32-byte digest against a raw public
/// key. Malformed signature or key bytes count as a failed verification
/// rather than an error, so tampered transactions report `false`.
pub fn verify_digest(digest: &[u8], signature_bytes: &[u8], public_key_bytes: &[u8]) -> Result<bool> {
    let message = Message::from_digest_slice(digest)
        .map_err(|e| ChainError::Crypto(format!("Failed to create message: {}", e)))?;

    if signature_bytes.len() != COMPACT_SIGNATURE_SIZE
        || public_key_bytes.len() != RAW_PUBLIC_KEY_SIZE
    {
        return Ok(false);
    }

    let signature = match Signature::from_compact(signature_bytes) {
        Ok(signature) => signature,
        Err(_) => return Ok(false),
    };

    // Reconstruct the curve point from the stored coordinate halves.
    let mut uncompressed = [0u8; UNCOMPRESSED_PUBLIC_KEY_SIZE];
    uncompressed[0] = 0x04;
    uncompressed[1..].copy_from_slice(public_key_bytes);
    let public_key = match PublicKey::from_slice(&uncompressed) {
        Ok(public_key) => public_key,
        Err(_) => return Ok(false),
    };

    Ok(SECP256K1_CONTEXT
        .verify_ecdsa(&message, &signature, &public_key)
        .is_ok())
}

/// RIPEMD160 over SHA-256 of the raw public key; the locking value carried
/// by transaction outputs.
pub fn hash_pub_key(public_key_bytes: &[u8]) -> Vec<u8> {
    let sha = Sha256::digest(public_key_bytes);
    Ripemd160::digest(sha).to_vec()
}

fn checksum(payload: &[u8]) -> [u8; ADDRESS_CHECKSUM_SIZE] {
    let first = Sha256::digest(payload);
    let second = Sha256::digest(first);
    let mut check = [0u8; ADDRESS_CHECKSUM_SIZE];
    check.copy_from_slice(&second[..ADDRESS_CHECKSUM_SIZE]);
    check
}

/// Encodes a public key hash as a Base58Check address:
/// version byte, then the hash, then four checksum bytes.
pub fn encode_address(pub_key_hash: &[u8]) -> String {
    let mut payload = Vec::with_capacity(1 + pub_key_hash.len() + ADDRESS_CHECKSUM_SIZE);
    payload.push(ADDRESS_VERSION);
    payload.extend_from_slice(pub_key_hash);
    let check = checksum(&payload);
    payload.extend_from_slice(&check);
    bs58::encode(payload).into_string()
}

/// Decodes an address back to the public key hash it wraps, rejecting
/// payloads whose checksum or version byte do not match.
pub fn decode_address(address: &str) -> Result<Vec<u8>> {
    let payload = bs58::decode(address)
        .into_vec()
        .map_err(|e| ChainError::InvalidAddress(format!("{}: {}", address, e)))?;

    if payload.len() <= 1 + ADDRESS_CHECKSUM_SIZE {
        return Err(ChainError::InvalidAddress(format!(
            "{}: payload too short",
            address
        )));
    }

    let (body, check) = payload.split_at(payload.len() - ADDRESS_CHECKSUM_SIZE);
    let expected = checksum(body);
    if &expected[..] != check {
        return Err(ChainError::InvalidAddress(format!(
            "{}: checksum mismatch",
            address
        )));
    }
    if body[0] != ADDRESS_VERSION {
        return Err(ChainError::InvalidAddress(format!(
            "{}: unknown version byte {:#04x}",
            address, body[0]
        )));
    }

    Ok(body[1..].to_vec())
}

/// Checks that an address is well formed with an intact checksum.
pub fn validate_address(address: &str) -> Result<()> {
    decode_address(address).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_generation() {
        let keypair = KeyPair::generate().unwrap();
        assert_eq!(keypair.public_key_bytes().len(), RAW_PUBLIC_KEY_SIZE);
        assert_eq!(keypair.secret_key.secret_bytes().len(), SECRET_KEY_SIZE);
    }

    #[test]
    fn test_pub_key_hash_length() {
        let keypair = KeyPair::generate().unwrap();
        // RIPEMD160 output
        assert_eq!(hash_pub_key(&keypair.public_key_bytes()).len(), 20);
    }

    #[test]
    fn test_address_round_trip() {
        let keypair = KeyPair::generate().unwrap();
        let pub_key_hash = hash_pub_key(&keypair.public_key_bytes());
        let address = encode_address(&pub_key_hash);

        let decoded = decode_address(&address).unwrap();
        assert_eq!(decoded, pub_key_hash);
        assert!(validate_address(&address).is_ok());
    }

    #[test]
    fn test_address_corruption_detected() {
        let keypair = KeyPair::generate().unwrap();
        let mut chars: Vec<char> = keypair.address().chars().collect();

        // Swap one character for a different alphabet member so the string
        // still parses as Base58 but the checksum no longer matches.
        let position = chars.iter().position(|c| *c != 'z').unwrap();
        chars[position] = 'z';
        let corrupted: String = chars.into_iter().collect();

        assert!(decode_address(&corrupted).is_err());
    }

    #[test]
    fn test_address_rejects_garbage() {
        assert!(validate_address("").is_err());
        assert!(validate_address("0OIl-not-base58").is_err());
        assert!(validate_address("abc").is_err());
    }

    #[test]
    fn test_sign_and_verify_digest() {
        let keypair = KeyPair::generate().unwrap();
        let digest = Sha256::digest(b"forgechain test digest");

        let signature = keypair.sign_digest(&digest).unwrap();
        let pubkey_bytes = keypair.public_key_bytes();

        assert!(verify_digest(&digest, &signature, &pubkey_bytes).unwrap());

        let other = Sha256::digest(b"a different digest");
        assert!(!verify_digest(&other, &signature, &pubkey_bytes).unwrap());
    }

    #[test]
    fn test_verify_rejects_flipped_bytes() {
        let keypair = KeyPair::generate().unwrap();
        let digest = Sha256::digest(b"flip resistance");
        let signature = keypair.sign_digest(&digest).unwrap();
        let pubkey_bytes = keypair.public_key_bytes();

        let mut bad_sig = signature;
        bad_sig[10] ^= 0x01;
        assert!(!verify_digest(&digest, &bad_sig, &pubkey_bytes).unwrap());

        let mut bad_key = pubkey_bytes;
        bad_key[10] ^= 0x01;
        assert!(!verify_digest(&digest, &signature, &bad_key).unwrap());
    }

    #[test]
    fn test_verify_rejects_wrong_lengths() {
        let keypair = KeyPair::generate().unwrap();
        let digest = Sha256::digest(b"length checks");
        let signature = keypair.sign_digest(&digest).unwrap();
        let pubkey_bytes = keypair.public_key_bytes();

        assert!(!verify_digest(&digest, &signature[1..], &pubkey_bytes).unwrap());
        assert!(!verify_digest(&digest, &signature, &pubkey_bytes[1..]).unwrap());
    }

    #[test]
    fn test_from_secret_bytes_invalid_length() {
        let short_bytes = [0u8; SECRET_KEY_SIZE - 1];
        let result = KeyPair::from_secret_bytes(&short_bytes);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Secret key must be"));
    }

    #[test]
    fn test_from_secret_bytes_round_trip() {
        let keypair = KeyPair::generate().unwrap();
        let restored = KeyPair::from_secret_bytes(&keypair.secret_key.secret_bytes()).unwrap();
        assert_eq!(restored.public_key_bytes(), keypair.public_key_bytes());
        assert_eq!(restored.address(), keypair.address());
    }
}
