use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Length of an address in hex characters (20 bytes).
pub const ADDRESS_HEX_LENGTH: usize = 40;

/// Length of a public key in hex characters (32-byte Ed25519 key).
pub const PUBLIC_KEY_HEX_LENGTH: usize = 64;

/// Maximum length of one signature component in hex characters (32 bytes).
pub const SIGNATURE_COMPONENT_HEX_LENGTH: usize = 64;

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Decoding error: {0}")]
    DecodingError(String),
}

/// A signature as it travels on the wire: the (r, s) pair of hex numeric
/// strings. For Ed25519 these are the R and s halves of the 64-byte
/// signature.
pub type SignaturePair = [String; 2];

/// Hashes arbitrary bytes with SHA-256
///
/// # Returns
///
/// The digest as a lowercase hexadecimal string
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Derives the chain address of a public key
///
/// The address is the SHA-256 digest of the raw key bytes, truncated to the
/// first 20 bytes and hex-encoded.
///
/// # Arguments
///
/// * `public_key_hex` - The public key as a 64-character hex string
///
/// # Returns
///
/// The 40-character lowercase hex address
pub fn public_key_to_address(public_key_hex: &str) -> Result<String, CryptoError> {
    let bytes = hex::decode(public_key_hex)
        .map_err(|e| CryptoError::DecodingError(e.to_string()))?;

    if bytes.len() != PUBLIC_KEY_HEX_LENGTH / 2 {
        return Err(CryptoError::InvalidPublicKey(
            "Invalid public key length".to_string(),
        ));
    }

    let digest = Sha256::digest(&bytes);
    Ok(hex::encode(&digest[..ADDRESS_HEX_LENGTH / 2]))
}

/// Verifies a signature over a transaction data hash
///
/// Any malformed key or signature component simply fails verification;
/// malformed input is never an error here.
///
/// # Arguments
///
/// * `data_hash` - The hex data hash the signature was produced over
/// * `public_key_hex` - The signer's public key
/// * `signature` - The (r, s) signature pair
///
/// # Returns
///
/// true if the signature is valid, false otherwise
pub fn verify_signature(data_hash: &str, public_key_hex: &str, signature: &SignaturePair) -> bool {
    let Ok(key_bytes) = hex::decode(public_key_hex) else {
        return false;
    };
    let Ok(key_array) = <[u8; 32]>::try_from(key_bytes) else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&key_array) else {
        return false;
    };

    let Some(r) = decode_component(&signature[0]) else {
        return false;
    };
    let Some(s) = decode_component(&signature[1]) else {
        return false;
    };

    let mut signature_bytes = [0u8; 64];
    signature_bytes[..32].copy_from_slice(&r);
    signature_bytes[32..].copy_from_slice(&s);
    let signature = Signature::from_bytes(&signature_bytes);

    verifying_key.verify(data_hash.as_bytes(), &signature).is_ok()
}

/// Decodes one signature component, left-padding short hex numerals to a
/// full 32 bytes.
fn decode_component(component: &str) -> Option<[u8; 32]> {
    if component.is_empty() || component.len() > SIGNATURE_COMPONENT_HEX_LENGTH {
        return None;
    }

    let padded = format!("{:0>64}", component);
    let bytes = hex::decode(padded).ok()?;
    bytes.try_into().ok()
}

/// Represents a wallet with a keypair
#[derive(Debug, Clone)]
pub struct Wallet {
    signing_key: SigningKey,
    public_key_hex: String,
    address: String,
}

impl Wallet {
    /// Creates a new wallet with a random keypair
    pub fn new() -> Result<Self, CryptoError> {
        let mut csprng = OsRng;
        let signing_key = SigningKey::generate(&mut csprng);
        Self::from_signing_key(signing_key)
    }

    /// Creates a wallet from an existing secret key
    pub fn from_secret_key(secret_key_bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes_array: [u8; 32] = secret_key_bytes.try_into().map_err(|_| {
            CryptoError::InvalidPrivateKey("Invalid private key length".to_string())
        })?;

        Self::from_signing_key(SigningKey::from_bytes(&bytes_array))
    }

    fn from_signing_key(signing_key: SigningKey) -> Result<Self, CryptoError> {
        let public_key_hex = hex::encode(signing_key.verifying_key().as_bytes());
        let address = public_key_to_address(&public_key_hex)?;

        Ok(Wallet {
            signing_key,
            public_key_hex,
            address,
        })
    }

    /// Gets the wallet's address
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Gets the wallet's public key as a hex string
    pub fn public_key_hex(&self) -> &str {
        &self.public_key_hex
    }

    /// Signs a transaction data hash with the wallet's private key
    pub fn sign(&self, data_hash: &str) -> SignaturePair {
        let signature = self.signing_key.sign(data_hash.as_bytes());
        let bytes = signature.to_bytes();
        [hex::encode(&bytes[..32]), hex::encode(&bytes[32..])]
    }

    /// Exports the wallet's secret key as bytes
    pub fn export_secret_key(&self) -> Vec<u8> {
        self.signing_key.to_bytes().to_vec()
    }
}
