//! Cryptographic primitives backing the handshake and packet encryption:
//! ephemeral key agreement, HKDF key derivation, id-nonce signing, and
//! AES-128-GCM packet AEAD.
//!
//! This crate treats the wire cryptography as an external collaborator;
//! this module is a concrete, minimal implementation of that
//! collaborator using the same crypto stack as the rest of the crate
//! (`libsecp256k1`, `hkdf`+`sha2`, `openssl`), not a hardened audited
//! codec.

use crate::error::{Error, Result};
use enr::{CombinedKey, Enr, NodeId};
use hkdf::Hkdf;
use libsecp256k1::{PublicKey, SecretKey, SharedSecret};
use openssl::symm::{decrypt_aead, encrypt_aead, Cipher};
use rand::RngCore;
use sha2::Sha256;

/// An AES-128-GCM key derived for one direction of a session.
pub type SessionKey = [u8; 16];

pub const AUTH_TAG_LENGTH: usize = 12;
pub const ID_NONCE_LENGTH: usize = 32;

/// Generates a fresh ephemeral keypair used for one handshake attempt.
pub fn generate_ephemeral_keypair() -> (SecretKey, PublicKey) {
    let mut rng = rand::thread_rng();
    loop {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        if let Ok(secret) = SecretKey::parse(&bytes) {
            let public = PublicKey::from_secret_key(&secret);
            return (secret, public);
        }
    }
}

/// Generates a fresh random auth tag, used as the AEAD nonce for a packet.
pub fn random_auth_tag() -> [u8; AUTH_TAG_LENGTH] {
    let mut tag = [0u8; AUTH_TAG_LENGTH];
    rand::thread_rng().fill_bytes(&mut tag);
    tag
}

/// Generates a fresh random id-nonce for a WHOAREYOU challenge.
pub fn random_id_nonce() -> [u8; ID_NONCE_LENGTH] {
    let mut nonce = [0u8; ID_NONCE_LENGTH];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

/// Derives the two directional session keys (`initiator -> responder`,
/// `responder -> initiator`) from an ECDH shared secret.
///
/// The handshake only ever carries one ephemeral public key on the wire
/// (the initiator's, embedded in its `AuthHeader`), so the two sides reach
/// the same point differently: the initiator combines its fresh ephemeral
/// secret with the responder's static ENR key, the responder combines its
/// static secret with the initiator's ephemeral public key. ECDH is
/// symmetric in the two scalars, so both derive the same shared secret.
pub fn derive_keys(
    local_secret: &SecretKey,
    remote_public: &PublicKey,
    initiator: &NodeId,
    responder: &NodeId,
    id_nonce: &[u8; ID_NONCE_LENGTH],
) -> Result<(SessionKey, SessionKey)> {
    let shared = SharedSecret::new(remote_public, local_secret)
        .map_err(|_| Error::KeypairEnrMismatch)?;

    let mut info = Vec::with_capacity(26 + 32 + 32);
    info.extend_from_slice(b"discovery v5 key agreement");
    info.extend_from_slice(&initiator.raw());
    info.extend_from_slice(&responder.raw());

    let hk = Hkdf::<Sha256>::new(Some(id_nonce), shared.as_ref());
    let mut okm = [0u8; 32];
    hk.expand(&info, &mut okm)
        .map_err(|_| Error::KeypairEnrMismatch)?;

    let mut initiator_key = [0u8; 16];
    let mut responder_key = [0u8; 16];
    initiator_key.copy_from_slice(&okm[0..16]);
    responder_key.copy_from_slice(&okm[16..32]);
    Ok((initiator_key, responder_key))
}

/// Signs an id-nonce with the local static key, authenticating this node's
/// possession of the private key behind its ENR.
pub fn sign_id_nonce(local_secret: &SecretKey, id_nonce: &[u8; ID_NONCE_LENGTH]) -> Vec<u8> {
    let message = libsecp256k1::Message::parse(&sha2_32(id_nonce));
    let (sig, _recovery) = libsecp256k1::sign(&message, local_secret);
    sig.serialize().to_vec()
}

/// Verifies a signature over an id-nonce against the claimed public key.
pub fn verify_id_nonce_signature(
    remote_public: &PublicKey,
    id_nonce: &[u8; ID_NONCE_LENGTH],
    signature: &[u8],
) -> bool {
    let sig = match libsecp256k1::Signature::parse_standard_slice(signature) {
        Ok(sig) => sig,
        Err(_) => return false,
    };
    let message = libsecp256k1::Message::parse(&sha2_32(id_nonce));
    libsecp256k1::verify(&message, &sig, remote_public)
}

/// Extracts the raw secp256k1 public key backing a remote ENR, for use as
/// the static half of a handshake ECDH. Fails if the ENR's identity scheme
/// is not secp256k1 or the encoded point is malformed.
pub fn enr_public_key(enr: &Enr<CombinedKey>) -> Result<PublicKey> {
    let encoded = enr.public_key().encode();
    PublicKey::parse_slice(&encoded).map_err(|_| Error::KeypairEnrMismatch)
}

fn sha2_32(data: &[u8]) -> [u8; 32] {
    use sha2::Digest;
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(data));
    out
}

/// Encrypts `plaintext` under `key`, using `auth_tag` as the AEAD nonce and
/// `aad` (the packet tag/header) as associated data. Returns
/// `ciphertext || gcm_tag`.
pub fn encrypt_message(
    key: &SessionKey,
    auth_tag: &[u8; AUTH_TAG_LENGTH],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    let mut gcm_tag = [0u8; 16];
    let ciphertext = encrypt_aead(Cipher::aes_128_gcm(), key, Some(auth_tag), aad, plaintext, &mut gcm_tag)
        .map_err(|e| Error::Transport(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
    let mut out = ciphertext;
    out.extend_from_slice(&gcm_tag);
    Ok(out)
}

/// Decrypts a buffer produced by [`encrypt_message`]. Fails (without
/// panicking) on any tampering or key mismatch — the only acceptable
/// response is to drop the session and request a fresh handshake.
pub fn decrypt_message(
    key: &SessionKey,
    auth_tag: &[u8; AUTH_TAG_LENGTH],
    ciphertext_and_tag: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    if ciphertext_and_tag.len() < 16 {
        return Err(Error::KeypairEnrMismatch);
    }
    let (ciphertext, gcm_tag) = ciphertext_and_tag.split_at(ciphertext_and_tag.len() - 16);
    decrypt_aead(Cipher::aes_128_gcm(), key, Some(auth_tag), aad, ciphertext, gcm_tag)
        .map_err(|e| Error::Transport(std::io::Error::new(std::io::ErrorKind::Other, e)))
}
