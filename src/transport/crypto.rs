//! Signing, encryption, and compression primitives
//!
//! Free functions shared by the outbound codec and the server middleware.
//! Each concern is an independent toggle: no key, no signature; no RSA key
//! pair, no encryption; compression is always applied outbound and detected
//! by marker inbound.

use std::io::{Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use hmac::{Hmac, Mac};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use super::codec::CodecError;

type HmacSha256 = Hmac<Sha256>;

/// PKCS#1 v1.5 padding overhead per encrypted block.
const RSA_PADDING_OVERHEAD: usize = 11;

/// Hex-encoded HMAC-SHA256 over `body`.
pub fn sign(body: &[u8], key: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Recompute the MAC over `body` and compare against the hex signature.
///
/// Comparison goes through the `Mac` verifier, which is constant-time.
pub fn verify(body: &[u8], key: &str, signature_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(body);
    mac.verify_slice(&signature).is_ok()
}

/// Gzip `data` at the fastest compression level.
pub fn compress(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
    encoder.write_all(data).map_err(CodecError::Compress)?;
    encoder.finish().map_err(CodecError::Compress)
}

pub fn decompress(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(CodecError::Compress)?;
    Ok(out)
}

/// Load an RSA public key from a PEM file (PKCS#8 or PKCS#1).
pub fn load_public_key(path: impl AsRef<Path>) -> Result<RsaPublicKey, CodecError> {
    let pem = std::fs::read_to_string(path).map_err(|e| CodecError::Key(e.to_string()))?;
    RsaPublicKey::from_public_key_pem(&pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(&pem))
        .map_err(|e| CodecError::Key(e.to_string()))
}

/// Load an RSA private key from a PEM file (PKCS#8 or PKCS#1).
pub fn load_private_key(path: impl AsRef<Path>) -> Result<RsaPrivateKey, CodecError> {
    let pem = std::fs::read_to_string(path).map_err(|e| CodecError::Key(e.to_string()))?;
    RsaPrivateKey::from_pkcs8_pem(&pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(&pem))
        .map_err(|e| CodecError::Key(e.to_string()))
}

/// Encrypt `plain` with PKCS#1 v1.5, chunked so payloads larger than one
/// RSA block still round-trip.
pub fn encrypt(plain: &[u8], key: &RsaPublicKey) -> Result<Vec<u8>, CodecError> {
    let mut rng = rand::thread_rng();
    let chunk_size = key.size() - RSA_PADDING_OVERHEAD;
    let mut out = Vec::with_capacity(plain.len() + key.size());
    for chunk in plain.chunks(chunk_size) {
        let block = key
            .encrypt(&mut rng, Pkcs1v15Encrypt, chunk)
            .map_err(|e| CodecError::Crypto(e.to_string()))?;
        out.extend_from_slice(&block);
    }
    Ok(out)
}

pub fn decrypt(cipher: &[u8], key: &RsaPrivateKey) -> Result<Vec<u8>, CodecError> {
    let block_size = key.size();
    if cipher.is_empty() || cipher.len() % block_size != 0 {
        return Err(CodecError::Crypto(format!(
            "ciphertext length {} is not a multiple of the key size {}",
            cipher.len(),
            block_size
        )));
    }
    let mut out = Vec::with_capacity(cipher.len());
    for block in cipher.chunks(block_size) {
        let plain = key
            .decrypt(Pkcs1v15Encrypt, block)
            .map_err(|e| CodecError::Crypto(e.to_string()))?;
        out.extend_from_slice(&plain);
    }
    Ok(out)
}
