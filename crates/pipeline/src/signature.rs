//! Webhook signature computation and verification.
//!
//! The source-control host signs each delivery with an HMAC over the raw
//! request body, keyed with the shared webhook secret. Two headers are in use:
//!
//! | Header | Value |
//! |--------|-------|
//! | `X-Hub-Signature-256` | `sha256=<hex>` |
//! | `X-Hub-Signature` | `sha1=<hex>` |
//!
//! Verification never reports *why* a signature failed; callers only learn
//! that it did.

use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;

type HmacSha1 = Hmac<Sha1>;
type HmacSha256 = Hmac<Sha256>;

/// Header carrying the HMAC-SHA256 signature.
pub const SIGNATURE_256_HEADER: &str = "x-hub-signature-256";
/// Header carrying the HMAC-SHA1 signature.
pub const SIGNATURE_HEADER: &str = "x-hub-signature";

/// The hash function behind a signature header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureAlgorithm {
    Sha1,
    Sha256,
}

impl SignatureAlgorithm {
    /// The prefix used in the header value, without the `=`.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
        }
    }

    /// The header that carries signatures of this kind.
    pub fn header_name(self) -> &'static str {
        match self {
            Self::Sha1 => SIGNATURE_HEADER,
            Self::Sha256 => SIGNATURE_256_HEADER,
        }
    }
}

/// Splits a header value (e.g. `"sha256=abc123..."`) into algorithm and raw digest.
///
/// Returns `None` for malformed values: unknown prefix, missing `=`, or bad hex.
pub fn parse_signature_header(header: &str) -> Option<(SignatureAlgorithm, Vec<u8>)> {
    let (prefix, hex_sig) = header.split_once('=')?;
    let algorithm = match prefix {
        "sha1" => SignatureAlgorithm::Sha1,
        "sha256" => SignatureAlgorithm::Sha256,
        _ => return None,
    };
    let digest = hex::decode(hex_sig).ok()?;
    Some((algorithm, digest))
}

/// Computes the header value for `body` signed with `secret`.
pub fn sign(algorithm: SignatureAlgorithm, secret: &[u8], body: &[u8]) -> String {
    let digest = match algorithm {
        SignatureAlgorithm::Sha1 => {
            let mut mac = new_mac::<HmacSha1>(secret);
            mac.update(body);
            mac.finalize().into_bytes().to_vec()
        }
        SignatureAlgorithm::Sha256 => {
            let mut mac = new_mac::<HmacSha256>(secret);
            mac.update(body);
            mac.finalize().into_bytes().to_vec()
        }
    };
    format!("{}={}", algorithm.prefix(), hex::encode(digest))
}

/// Verifies a signature header value against `body` and `secret`.
///
/// The digest comparison is constant-time (delegated to the HMAC library).
/// Malformed header values yield `false`.
pub fn verify(secret: &[u8], body: &[u8], header: &str) -> bool {
    let Some((algorithm, expected)) = parse_signature_header(header) else {
        return false;
    };

    match algorithm {
        SignatureAlgorithm::Sha1 => {
            let mut mac = new_mac::<HmacSha1>(secret);
            mac.update(body);
            mac.verify_slice(&expected).is_ok()
        }
        SignatureAlgorithm::Sha256 => {
            let mut mac = new_mac::<HmacSha256>(secret);
            mac.update(body);
            mac.verify_slice(&expected).is_ok()
        }
    }
}

/// HMAC pads or hashes the key to the block size, so keys of every length,
/// including empty ones, are accepted and `new_from_slice` never errors.
fn new_mac<M: Mac + hmac::digest::KeyInit>(secret: &[u8]) -> M {
    <M as hmac::digest::KeyInit>::new_from_slice(secret)
        .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_known_sha256_vector() {
        // Example delivery from the source-control host's documentation.
        let header = sign(
            SignatureAlgorithm::Sha256,
            b"It's a Secret to Everybody",
            b"Hello, World!",
        );
        assert_eq!(
            header,
            "sha256=757107ea0eb2509fc211221cce984b8a37570b6d7586c22c46f4379c8b043e17"
        );
    }

    #[test]
    fn test_sha1_header_round_trip() {
        let header = sign(SignatureAlgorithm::Sha1, b"secret", b"{\"ref\":\"refs/heads/dev\"}");
        assert!(header.starts_with("sha1="));
        assert_eq!(header.len(), "sha1=".len() + 40);
        assert!(verify(b"secret", b"{\"ref\":\"refs/heads/dev\"}", &header));
    }

    #[test]
    fn test_wrong_secret_fails() {
        let header = sign(SignatureAlgorithm::Sha256, b"correct", b"payload");
        assert!(!verify(b"wrong", b"payload", &header));
    }

    #[test]
    fn test_malformed_headers_fail() {
        for header in ["", "sha256=", "sha256=zz", "md5=abcd", "abcdef", "sha1=abc"] {
            assert!(!verify(b"secret", b"payload", header), "{header}");
        }
    }

    #[test]
    fn test_parse_uppercase_hex() {
        let (algorithm, digest) = parse_signature_header("sha1=ABCD").unwrap();
        assert_eq!(algorithm, SignatureAlgorithm::Sha1);
        assert_eq!(digest, vec![0xab, 0xcd]);
    }

    #[test]
    fn test_any_key_length_signs() {
        let long_key = [7u8; 200];
        for key in [&b""[..], &b"k"[..], &long_key[..]] {
            for algorithm in [SignatureAlgorithm::Sha1, SignatureAlgorithm::Sha256] {
                let header = sign(algorithm, key, b"{}");
                assert!(verify(key, b"{}", &header), "{algorithm:?} with {} byte key", key.len());
            }
        }
    }

    #[test]
    fn test_algorithm_header_names() {
        assert_eq!(SignatureAlgorithm::Sha256.header_name(), "x-hub-signature-256");
        assert_eq!(SignatureAlgorithm::Sha1.header_name(), "x-hub-signature");
    }

    fn arb_algorithm() -> impl Strategy<Value = SignatureAlgorithm> {
        prop_oneof![Just(SignatureAlgorithm::Sha1), Just(SignatureAlgorithm::Sha256)]
    }

    proptest! {
        /// Property: verify(K, B, sign(K, B)) holds for every body and secret.
        #[test]
        fn prop_sign_verify_roundtrip(
            algorithm in arb_algorithm(),
            body in prop::collection::vec(any::<u8>(), 0..512),
            secret in prop::collection::vec(any::<u8>(), 0..64),
        ) {
            let header = sign(algorithm, &secret, &body);
            prop_assert!(verify(&secret, &body, &header));
        }

        /// Property: flipping any single bit of the body breaks verification.
        #[test]
        fn prop_body_bit_flip_fails(
            algorithm in arb_algorithm(),
            body in prop::collection::vec(any::<u8>(), 1..256),
            secret in prop::collection::vec(any::<u8>(), 0..64),
            index in any::<prop::sample::Index>(),
            bit in 0u8..8,
        ) {
            let header = sign(algorithm, &secret, &body);
            let mut tampered = body.clone();
            let i = index.index(tampered.len());
            tampered[i] ^= 1 << bit;
            prop_assert!(!verify(&secret, &tampered, &header));
        }

        /// Property: flipping any single bit of the signature digest breaks verification.
        #[test]
        fn prop_signature_bit_flip_fails(
            algorithm in arb_algorithm(),
            body in prop::collection::vec(any::<u8>(), 0..256),
            secret in prop::collection::vec(any::<u8>(), 0..64),
            index in any::<prop::sample::Index>(),
            bit in 0u8..8,
        ) {
            let header = sign(algorithm, &secret, &body);
            let (_, mut digest) = parse_signature_header(&header).unwrap();
            let i = index.index(digest.len());
            digest[i] ^= 1 << bit;
            let tampered = format!("{}={}", algorithm.prefix(), hex::encode(digest));
            prop_assert!(!verify(&secret, &body, &tampered));
        }

        /// Property: arbitrary header strings never panic.
        #[test]
        fn prop_arbitrary_header_no_panic(header in ".*", body in prop::collection::vec(any::<u8>(), 0..64)) {
            let _ = verify(b"secret", &body, &header);
        }
    }
}
