//! Outbound payload sealing
//!
//! [`OutboundCodec`] runs the fixed pipeline order once per request:
//! serialize, sign over the plaintext, encrypt, compress. The server's
//! middleware undoes the stages one by one, which is why the inbound
//! primitives stay as free functions in [`super::crypto`].

use rsa::RsaPublicKey;
use serde::Serialize;

use super::crypto;

/// Errors raised while encoding or decoding a metric payload.
#[derive(Debug)]
pub enum CodecError {
    Serialize(serde_json::Error),
    Compress(std::io::Error),
    Crypto(String),
    Key(String),
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecError::Serialize(err) => write!(f, "serialization failed: {}", err),
            CodecError::Compress(err) => write!(f, "compression failed: {}", err),
            CodecError::Crypto(msg) => write!(f, "encryption failed: {}", msg),
            CodecError::Key(msg) => write!(f, "failed to load key: {}", msg),
        }
    }
}

impl std::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CodecError::Serialize(err) => Some(err),
            CodecError::Compress(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        CodecError::Serialize(err)
    }
}

/// A request body ready to go on the wire, plus its side-channel values.
#[derive(Debug)]
pub struct SealedPayload {
    /// Compressed (and possibly encrypted) body bytes.
    pub body: Vec<u8>,

    /// Hex MAC over the plaintext, present when signing is configured.
    pub signature: Option<String>,
}

/// Applies the outbound half of the codec pipeline.
///
/// Signing and encryption are independent toggles; compression is always
/// on for outbound payloads.
pub struct OutboundCodec {
    key: Option<String>,
    public_key: Option<RsaPublicKey>,
}

impl OutboundCodec {
    pub fn new(key: Option<String>, public_key: Option<RsaPublicKey>) -> Self {
        Self { key, public_key }
    }

    /// Serialize → sign → encrypt → compress.
    pub fn seal<T: Serialize>(&self, payload: &T) -> Result<SealedPayload, CodecError> {
        let plain = serde_json::to_vec(payload)?;

        let signature = self.key.as_deref().map(|key| crypto::sign(&plain, key));

        let body = match &self.public_key {
            Some(public_key) => crypto::encrypt(&plain, public_key)?,
            None => plain,
        };

        Ok(SealedPayload {
            body: crypto::compress(&body)?,
            signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use rsa::{RsaPrivateKey, RsaPublicKey};

    use super::super::crypto;
    use super::*;
    use crate::MetricRecord;

    #[test]
    fn seal_without_keys_is_compressed_json() {
        let codec = OutboundCodec::new(None, None);
        let record = MetricRecord::gauge("Alloc", 123.5);

        let sealed = codec.seal(&record).unwrap();
        assert!(sealed.signature.is_none());

        let plain = crypto::decompress(&sealed.body).unwrap();
        let decoded: MetricRecord = serde_json::from_slice(&plain).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn seal_signs_over_plaintext() {
        let codec = OutboundCodec::new(Some("secret".into()), None);
        let record = MetricRecord::counter("PollCount", 1);

        let sealed = codec.seal(&record).unwrap();
        let signature = sealed.signature.unwrap();

        let plain = crypto::decompress(&sealed.body).unwrap();
        assert!(crypto::verify(&plain, "secret", &signature));
    }

    #[test]
    fn seal_encrypts_then_compresses() {
        let mut rng = rand::thread_rng();
        let private = RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let public = RsaPublicKey::from(&private);

        let codec = OutboundCodec::new(Some("secret".into()), Some(public));
        let record = MetricRecord::gauge("HeapInuse", 42.0);

        let sealed = codec.seal(&record).unwrap();
        let cipher = crypto::decompress(&sealed.body).unwrap();
        let plain = crypto::decrypt(&cipher, &private).unwrap();

        let decoded: MetricRecord = serde_json::from_slice(&plain).unwrap();
        assert_eq!(decoded, record);
        // MAC still covers the plaintext, not the ciphertext
        assert!(crypto::verify(&plain, "secret", &sealed.signature.unwrap()));
    }
}
