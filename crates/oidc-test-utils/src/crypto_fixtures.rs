//! Deterministic cryptographic fixtures for testing
//!
//! Provides reproducible Ed25519 keypairs rendered as JWKs, plus token
//! signing. All fixtures are deterministic based on seed values.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use ring::signature::{Ed25519KeyPair, KeyPair};
use serde_json::{json, Value};

/// Shared secret used for HMAC-signed negative fixtures.
pub const TEST_HMAC_SECRET: &[u8] = b"oidc-test-hmac-secret-0123456789";

/// Ed25519 keypair with a key ID, usable both to sign tokens and to publish
/// its public half in a JWK Set.
#[derive(Debug, Clone)]
pub struct TestKeypair {
    pub kid: String,
    public_key_bytes: Vec<u8>,
    private_key_pkcs8: Vec<u8>,
}

impl TestKeypair {
    /// Create a keypair from `seed`. The same seed always yields the same key.
    pub fn new(seed: u8, kid: &str) -> Self {
        let seed_bytes = seed_bytes(seed);

        let key_pair = Ed25519KeyPair::from_seed_unchecked(&seed_bytes)
            .expect("Failed to create test keypair");

        Self {
            kid: kid.to_string(),
            public_key_bytes: key_pair.public_key().as_ref().to_vec(),
            private_key_pkcs8: build_pkcs8_from_seed(&seed_bytes),
        }
    }

    /// Sign `claims` with EdDSA, putting this key's `kid` in the header.
    pub fn sign(&self, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::EdDSA);
        header.typ = Some("JWT".to_string());
        header.kid = Some(self.kid.clone());
        self.sign_with_header(&header, claims)
    }

    /// Sign `claims` with EdDSA and no `kid` in the header.
    pub fn sign_without_kid(&self, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::EdDSA);
        header.typ = Some("JWT".to_string());
        self.sign_with_header(&header, claims)
    }

    fn sign_with_header(&self, header: &Header, claims: &Value) -> String {
        let encoding_key = EncodingKey::from_ed_der(&self.private_key_pkcs8);
        encode(header, claims, &encoding_key).expect("Failed to sign token")
    }

    /// Public key as a JWK.
    pub fn jwk_json(&self) -> Value {
        json!({
            "kty": "OKP",
            "kid": self.kid,
            "crv": "Ed25519",
            "x": URL_SAFE_NO_PAD.encode(&self.public_key_bytes),
            "alg": "EdDSA",
            "use": "sig"
        })
    }
}

/// JWK Set document containing each keypair's public key.
pub fn jwks_json(keys: &[&TestKeypair]) -> Value {
    json!({ "keys": keys.iter().map(|k| k.jwk_json()).collect::<Vec<_>>() })
}

/// Sign `claims` with HS256 under [`TEST_HMAC_SECRET`].
pub fn sign_hs256(kid: &str, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(kid.to_string());
    encode(&header, claims, &EncodingKey::from_secret(TEST_HMAC_SECRET))
        .expect("Failed to sign HMAC token")
}

/// Replace the signature segment of `token` with another token's signature.
pub fn with_foreign_signature(token: &str, donor: &str) -> String {
    let (signed_part, _) = token.rsplit_once('.').expect("token has three segments");
    let (_, signature) = donor.rsplit_once('.').expect("token has three segments");
    format!("{signed_part}.{signature}")
}

fn seed_bytes(seed: u8) -> [u8; 32] {
    let mut seed_bytes = [0u8; 32];
    seed_bytes[0] = seed;
    for (i, byte) in seed_bytes.iter_mut().enumerate().skip(1) {
        *byte = seed.wrapping_mul(i as u8).wrapping_add(i as u8);
    }
    seed_bytes
}

/// Build PKCS#8 v1 document from Ed25519 seed
///
/// Ring doesn't expose PKCS#8 export for a seeded keypair, so the DER is
/// assembled by hand. Test-only.
fn build_pkcs8_from_seed(seed: &[u8; 32]) -> Vec<u8> {
    let mut pkcs8 = Vec::new();

    // Outer SEQUENCE tag
    pkcs8.push(0x30);
    pkcs8.push(0x2e); // Length: 46 bytes

    // Version: INTEGER 0
    pkcs8.extend_from_slice(&[0x02, 0x01, 0x00]);

    // Algorithm Identifier: SEQUENCE, OID 1.3.101.112 (Ed25519)
    pkcs8.extend_from_slice(&[0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70]);

    // Private Key: OCTET STRING wrapping OCTET STRING with the seed
    pkcs8.extend_from_slice(&[0x04, 0x22, 0x04, 0x20]);
    pkcs8.extend_from_slice(seed);

    pkcs8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_is_deterministic() {
        let a = TestKeypair::new(1, "k");
        let b = TestKeypair::new(1, "k");
        assert_eq!(a.jwk_json(), b.jwk_json());
    }

    #[test]
    fn test_different_seeds_produce_different_keys() {
        let a = TestKeypair::new(1, "k");
        let b = TestKeypair::new(2, "k");
        assert_ne!(a.jwk_json()["x"], b.jwk_json()["x"]);
    }

    #[test]
    fn test_pkcs8_is_accepted_by_ring() {
        let pkcs8 = build_pkcs8_from_seed(&seed_bytes(7));
        assert!(Ed25519KeyPair::from_pkcs8_maybe_unchecked(&pkcs8).is_ok());
    }

    #[test]
    fn test_sign_sets_kid() {
        let keypair = TestKeypair::new(3, "key-3");
        let token = keypair.sign(&json!({"sub": "alice"}));

        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.kid.as_deref(), Some("key-3"));
        assert_eq!(header.alg, Algorithm::EdDSA);
    }

    #[test]
    fn test_jwks_json_lists_every_key() {
        let a = TestKeypair::new(1, "a");
        let b = TestKeypair::new(2, "b");
        let jwks = jwks_json(&[&a, &b]);
        assert_eq!(jwks["keys"].as_array().unwrap().len(), 2);
        assert_eq!(jwks["keys"][1]["kid"], "b");
    }
}
