//! # Ownership Proofs (secp256k1)
//!
//! Owners of the form `dweb:0x<40 hex>` are addresses derived from a
//! secp256k1 public key: the last 20 bytes of keccak256 over the
//! uncompressed point without its `0x04` prefix. Registering a domain under
//! such an owner requires the public key, a message, and a signature over
//! the personal-message hash of that message.

use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::{Signature, VerifyingKey};
use sha3::{Digest, Keccak256};

use super::errors::RegistryError;

/// Prefix marking a cryptographic owner identifier.
pub const CRYPTO_OWNER_PREFIX: &str = "dweb:0x";

/// Proof fields attached to a registration or owner patch.
#[derive(Debug, Clone, Copy)]
pub struct OwnershipProof<'a> {
    pub public_key: &'a str,
    pub signature: &'a str,
    pub message: &'a str,
}

impl<'a> OwnershipProof<'a> {
    /// A proof only when all three fields were supplied.
    pub fn from_parts(
        public_key: Option<&'a str>,
        signature: Option<&'a str>,
        message: Option<&'a str>,
    ) -> Option<Self> {
        Some(Self {
            public_key: public_key?,
            signature: signature?,
            message: message?,
        })
    }
}

pub fn is_crypto_owner(owner: &str) -> bool {
    owner.trim().to_ascii_lowercase().starts_with(CRYPTO_OWNER_PREFIX)
}

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Derive the 20-byte address of a public key.
pub fn address_from_public_key(public_key: &VerifyingKey) -> [u8; 20] {
    let point = public_key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    address
}

/// Owner identifier for a public key.
pub fn owner_for_public_key(public_key: &VerifyingKey) -> String {
    format!(
        "{CRYPTO_OWNER_PREFIX}{}",
        hex::encode(address_from_public_key(public_key))
    )
}

/// keccak256 of `"\x19Ethereum Signed Message:\n" + len(message) + message`.
pub fn personal_message_hash(message: &str) -> [u8; 32] {
    let prefixed = format!("\x19Ethereum Signed Message:\n{}{}", message.len(), message);
    keccak256(prefixed.as_bytes())
}

fn decode_hex(text: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let text = text.trim();
    hex::decode(text.strip_prefix("0x").unwrap_or(text))
}

/// Check an ownership proof for `owner`.
///
/// Plain owners need no proof. For `dweb:0x` owners the checks run in
/// order: proof present, key derives the owner, signature verifies.
pub fn verify_ownership(owner: &str, proof: Option<OwnershipProof<'_>>) -> Result<(), RegistryError> {
    if !is_crypto_owner(owner) {
        return Ok(());
    }
    let proof = proof.ok_or_else(|| RegistryError::SignatureRequired(owner.to_string()))?;

    let key_bytes = decode_hex(proof.public_key)
        .map_err(|_| RegistryError::InvalidSignature("publicKey is not hex".into()))?;
    let public_key = VerifyingKey::from_sec1_bytes(&key_bytes)
        .map_err(|_| RegistryError::InvalidSignature("publicKey is not a secp256k1 point".into()))?;

    let derived = owner_for_public_key(&public_key);
    if !derived.eq_ignore_ascii_case(owner.trim()) {
        return Err(RegistryError::OwnerMismatch {
            owner: owner.to_string(),
            derived,
        });
    }

    let sig_bytes = decode_hex(proof.signature)
        .map_err(|_| RegistryError::InvalidSignature("signature is not hex".into()))?;
    if sig_bytes.len() != 64 && sig_bytes.len() != 65 {
        return Err(RegistryError::InvalidSignature(format!(
            "signature has {} bytes, expected 64 or 65",
            sig_bytes.len()
        )));
    }
    let signature = Signature::from_slice(&sig_bytes[..64])
        .map_err(|_| RegistryError::InvalidSignature("malformed signature".into()))?;
    let signature = signature.normalize_s().unwrap_or(signature);

    public_key
        .verify_prehash(&personal_message_hash(proof.message), &signature)
        .map_err(|_| RegistryError::InvalidSignature("signature does not match message".into()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use k256::ecdsa::SigningKey;

    /// Owner, public key hex and signature hex for `message`.
    pub(crate) fn signed(message: &str) -> (String, String, String) {
        let signing_key = SigningKey::random(&mut rand::thread_rng());
        let (signature, recovery_id) = signing_key
            .sign_prehash_recoverable(&personal_message_hash(message))
            .unwrap();
        let mut sig_bytes = signature.to_bytes().to_vec();
        sig_bytes.push(27 + recovery_id.to_byte());
        let verifying_key = signing_key.verifying_key();
        (
            owner_for_public_key(verifying_key),
            hex::encode(verifying_key.to_encoded_point(false).as_bytes()),
            format!("0x{}", hex::encode(sig_bytes)),
        )
    }

    #[test]
    fn test_plain_owner_needs_no_proof() {
        assert!(verify_ownership("alice", None).is_ok());
    }

    #[test]
    fn test_crypto_owner_without_proof() {
        let err = verify_ownership("dweb:0xabc", None).unwrap_err();
        assert_eq!(err.code(), "SIGNATURE_REQUIRED");
    }

    #[test]
    fn test_valid_proof() {
        let (owner, public_key, signature) = signed("register site.dweb");
        let proof = OwnershipProof {
            public_key: &public_key,
            signature: &signature,
            message: "register site.dweb",
        };
        assert!(verify_ownership(&owner, Some(proof)).is_ok());
        assert!(verify_ownership(&owner.to_uppercase().replace("DWEB:0X", "dweb:0x"), Some(proof)).is_ok());
    }

    #[test]
    fn test_owner_mismatch() {
        let (_, public_key, signature) = signed("m");
        let proof = OwnershipProof {
            public_key: &public_key,
            signature: &signature,
            message: "m",
        };
        let err = verify_ownership("dweb:0x0000000000000000000000000000000000000000", Some(proof))
            .unwrap_err();
        assert_eq!(err.code(), "OWNER_MISMATCH");
    }

    #[test]
    fn test_signature_over_other_message() {
        let (owner, public_key, signature) = signed("original");
        let proof = OwnershipProof {
            public_key: &public_key,
            signature: &signature,
            message: "tampered",
        };
        let err = verify_ownership(&owner, Some(proof)).unwrap_err();
        assert_eq!(err.code(), "INVALID_SIGNATURE");
    }

    #[test]
    fn test_garbage_signature() {
        let (owner, public_key, _) = signed("m");
        let proof = OwnershipProof {
            public_key: &public_key,
            signature: "zz",
            message: "m",
        };
        assert_eq!(verify_ownership(&owner, Some(proof)).unwrap_err().code(), "INVALID_SIGNATURE");
    }
}
