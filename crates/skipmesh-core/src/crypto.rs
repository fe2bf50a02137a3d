//! Sealed-envelope cryptography
//!
//! The cryptographic gateway for the relay: [`Identity::seal`] signs a
//! plaintext with the local Ed25519 key and encrypts it for a recipient's
//! X25519 key; [`Identity::open`] attempts the reverse. A failed `open` is
//! not an error — it is the routing signal that this node is merely a relay
//! for the message, so it returns `Option` rather than `Result`.
//!
//! Payload layout: ephemeral X25519 public key (32) || nonce (12) ||
//! ChaCha20-Poly1305 ciphertext of a bincode-encoded [`SealedRecord`].

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use x25519_dalek::{EphemeralSecret, PublicKey as ExchangePublic, StaticSecret};

use crate::types::{PublicKey, Timestamp};

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// Domain separation for the signed digest
const SIGN_CONTEXT: &[u8] = b"skipmesh-seal-v1";

/// Domain separation for the key derivation
const KDF_CONTEXT: &[u8] = b"skipmesh-kdf-v1";

/// ChaCha20-Poly1305 nonce size
const NONCE_SIZE: usize = 12;

/// Poly1305 authentication tag size
const TAG_SIZE: usize = 16;

/// Minimum sealed payload: ephemeral key + nonce + tag
const MIN_SEALED_SIZE: usize = 32 + NONCE_SIZE + TAG_SIZE;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Failures on the seal (send) path.
///
/// These abort the send of that single message; nothing is buffered or
/// transmitted on failure.
#[derive(Debug, thiserror::Error)]
pub enum SealError {
    #[error("recipient key rejected")]
    InvalidRecipientKey,

    #[error("record encoding failed: {0}")]
    Encoding(String),

    #[error("encryption failed")]
    Encryption,
}

// ----------------------------------------------------------------------------
// Sealed Record
// ----------------------------------------------------------------------------

/// The authenticated plaintext carried inside the ciphertext: sender
/// identity, origin timestamp, message, and signature over all of them.
#[derive(Serialize, Deserialize)]
struct SealedRecord {
    sender_exchange: [u8; 32],
    sender_verifying: [u8; 32],
    sent_at: u64,
    message: Vec<u8>,
    #[serde(with = "signature_serde")]
    signature: [u8; 64],
}

/// A successfully opened self-addressed message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedMessage {
    /// The recovered plaintext
    pub plaintext: Vec<u8>,
    /// The sender's public identity key
    pub sender: PublicKey,
    /// Origin timestamp, as claimed and signed by the sender
    pub sent_at: Timestamp,
}

// ----------------------------------------------------------------------------
// Identity
// ----------------------------------------------------------------------------

/// Local key material: an Ed25519 signing pair and an X25519 exchange pair.
///
/// Generated once and used unchanged for the node's lifetime; the embedding
/// application persists it via [`Identity::secret_bytes`].
pub struct Identity {
    signing_key: SigningKey,
    exchange_secret: StaticSecret,
    exchange_public: ExchangePublic,
}

impl Identity {
    /// Generate a fresh random identity
    pub fn generate() -> Self {
        let mut signing_bytes = [0u8; 32];
        OsRng.fill_bytes(&mut signing_bytes);
        let signing_key = SigningKey::from_bytes(&signing_bytes);

        let exchange_secret = StaticSecret::random_from_rng(OsRng);
        let exchange_public = ExchangePublic::from(&exchange_secret);

        Self {
            signing_key,
            exchange_secret,
            exchange_public,
        }
    }

    /// Reconstruct an identity from [`Identity::secret_bytes`] output
    pub fn from_secret_bytes(bytes: &[u8; 64]) -> Self {
        let mut signing_bytes = [0u8; 32];
        signing_bytes.copy_from_slice(&bytes[..32]);
        let mut exchange_bytes = [0u8; 32];
        exchange_bytes.copy_from_slice(&bytes[32..]);

        let signing_key = SigningKey::from_bytes(&signing_bytes);
        let exchange_secret = StaticSecret::from(exchange_bytes);
        let exchange_public = ExchangePublic::from(&exchange_secret);

        Self {
            signing_key,
            exchange_secret,
            exchange_public,
        }
    }

    /// Serialize the secret material: signing key (32) || exchange key (32)
    pub fn secret_bytes(&self) -> [u8; 64] {
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(&self.signing_key.to_bytes());
        bytes[32..].copy_from_slice(&self.exchange_secret.to_bytes());
        bytes
    }

    /// The addressable public identity key (X25519)
    pub fn public_key(&self) -> PublicKey {
        PublicKey::new(self.exchange_public.to_bytes())
    }

    /// The Ed25519 verification key
    pub fn verifying_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Sign `plaintext` and encrypt it for `recipient`.
    ///
    /// The returned bytes are the opaque envelope payload. Only the
    /// recipient's exchange secret can open them.
    pub fn seal(&self, plaintext: &[u8], recipient: &PublicKey) -> Result<Vec<u8>, SealError> {
        let recipient_key = ExchangePublic::from(*recipient.as_bytes());

        let sent_at = Timestamp::now();
        let sender_exchange = self.exchange_public.to_bytes();

        let digest = signed_digest(
            &sender_exchange,
            recipient.as_bytes(),
            sent_at.as_millis(),
            plaintext,
        );
        let signature = self.signing_key.sign(&digest).to_bytes();

        let record = SealedRecord {
            sender_exchange,
            sender_verifying: self.verifying_key(),
            sent_at: sent_at.as_millis(),
            message: plaintext.to_vec(),
            signature,
        };
        let record_bytes =
            bincode::serialize(&record).map_err(|e| SealError::Encoding(e.to_string()))?;

        let ephemeral = EphemeralSecret::random_from_rng(OsRng);
        let ephemeral_public = ExchangePublic::from(&ephemeral);
        let shared = ephemeral.diffie_hellman(&recipient_key);
        if !shared.was_contributory() {
            return Err(SealError::InvalidRecipientKey);
        }

        let key = derive_key(
            shared.as_bytes(),
            ephemeral_public.as_bytes(),
            recipient.as_bytes(),
        );

        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), record_bytes.as_ref())
            .map_err(|_| SealError::Encryption)?;

        let mut payload = Vec::with_capacity(32 + NONCE_SIZE + ciphertext.len());
        payload.extend_from_slice(ephemeral_public.as_bytes());
        payload.extend_from_slice(&nonce);
        payload.extend_from_slice(&ciphertext);
        Ok(payload)
    }

    /// Attempt to open a payload as addressed to this identity.
    ///
    /// Returns `None` for anything that is not a well-formed message sealed
    /// for this key — wrong recipient, truncated blob, bad tag, or bad
    /// signature all fold into the same answer, because the caller's only
    /// decision is deliver-to-self versus relay.
    pub fn open(&self, payload: &[u8]) -> Option<OpenedMessage> {
        if payload.len() < MIN_SEALED_SIZE {
            return None;
        }

        let mut ephemeral_bytes = [0u8; 32];
        ephemeral_bytes.copy_from_slice(&payload[..32]);
        let ephemeral_public = ExchangePublic::from(ephemeral_bytes);
        let nonce = &payload[32..32 + NONCE_SIZE];
        let ciphertext = &payload[32 + NONCE_SIZE..];

        let shared = self.exchange_secret.diffie_hellman(&ephemeral_public);
        let key = derive_key(
            shared.as_bytes(),
            ephemeral_public.as_bytes(),
            self.exchange_public.as_bytes(),
        );

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
        let record_bytes = cipher.decrypt(Nonce::from_slice(nonce), ciphertext).ok()?;

        let record: SealedRecord = bincode::deserialize(&record_bytes).ok()?;

        let verifying_key = VerifyingKey::from_bytes(&record.sender_verifying).ok()?;
        let digest = signed_digest(
            &record.sender_exchange,
            self.exchange_public.as_bytes(),
            record.sent_at,
            &record.message,
        );
        let signature = Signature::from_bytes(&record.signature);
        verifying_key.verify(&digest, &signature).ok()?;

        Some(OpenedMessage {
            plaintext: record.message,
            sender: PublicKey::new(record.sender_exchange),
            sent_at: Timestamp::new(record.sent_at),
        })
    }
}

impl core::fmt::Debug for Identity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Identity")
            .field("public_key", &self.public_key())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Digest and Key Derivation
// ----------------------------------------------------------------------------

/// Canonical digest covered by the sender's signature: binds the message to
/// its sender, intended recipient, and origin timestamp.
fn signed_digest(
    sender_exchange: &[u8; 32],
    recipient: &[u8; 32],
    sent_at: u64,
    message: &[u8],
) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(SIGN_CONTEXT);
    hasher.update(sender_exchange);
    hasher.update(recipient);
    hasher.update(sent_at.to_be_bytes());
    hasher.update(message);
    hasher.finalize().into()
}

/// Derive the symmetric key from the ECDH shared secret and both public
/// halves of the exchange
fn derive_key(shared: &[u8; 32], ephemeral: &[u8; 32], recipient: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(KDF_CONTEXT);
    hasher.update(shared);
    hasher.update(ephemeral);
    hasher.update(recipient);
    hasher.finalize().into()
}

// ----------------------------------------------------------------------------
// Custom Serde for the 64-byte signature
// ----------------------------------------------------------------------------

mod signature_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &[u8; 64], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bytes(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 64], D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes: Vec<u8> = Vec::deserialize(deserializer)?;
        if bytes.len() != 64 {
            return Err(serde::de::Error::invalid_length(bytes.len(), &"64 bytes"));
        }
        let mut array = [0u8; 64];
        array.copy_from_slice(&bytes);
        Ok(array)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
