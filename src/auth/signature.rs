use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying `sha256=<hex>` over the raw request body.
pub const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";

const PREFIX: &str = "sha256=";

/// Sign `body` with `secret`, producing the `sha256=<hex>` header value.
pub fn sign(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length, so this cannot fail.
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("hmac accepts any key length"));
    mac.update(body);
    format!("{PREFIX}{}", hex::encode(mac.finalize().into_bytes()))
}

/// Check `signature` against HMAC-SHA256(`secret`, `raw_body`).
///
/// `raw_body` must be the exact bytes received on the wire. Returns `false`
/// for an unset or empty secret, a missing header, a header without the
/// `sha256=` prefix, non-hex digits, or a mismatch. The digest comparison is
/// constant-time.
pub fn verify(secret: Option<&str>, raw_body: &[u8], signature: Option<&str>) -> bool {
    let Some(secret) = secret.filter(|s| !s.is_empty()) else {
        return false;
    };
    let Some(hex_digest) = signature.and_then(|s| s.trim().strip_prefix(PREFIX)) else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(raw_body);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "It's a Secret to Everybody";
    const BODY: &[u8] = b"Hello, World!";

    #[test]
    fn known_vector() {
        // Published example for GitHub webhook signature validation.
        assert_eq!(
            sign(SECRET, BODY),
            "sha256=757107ea0eb2509fc211221cce984b8a37570b6d7586c22c46f4379c8b043e17"
        );
    }

    #[test]
    fn valid_signature_accepted() {
        let header = sign(SECRET, BODY);
        assert!(verify(Some(SECRET), BODY, Some(&header)));
    }

    #[test]
    fn uppercase_hex_accepted() {
        let header = sign(SECRET, BODY);
        let upper = format!("sha256={}", header[7..].to_uppercase());
        assert!(verify(Some(SECRET), BODY, Some(&upper)));
    }

    #[test]
    fn missing_header_rejected() {
        assert!(!verify(Some(SECRET), BODY, None));
    }

    #[test]
    fn unset_or_empty_secret_rejected() {
        let header = sign("", BODY);
        assert!(!verify(None, BODY, Some(&header)));
        assert!(!verify(Some(""), BODY, Some(&header)));
    }

    #[test]
    fn malformed_headers_rejected() {
        let digest = &sign(SECRET, BODY)[7..];
        for header in [
            String::new(),
            "sha256=".to_owned(),
            digest.to_owned(),
            format!("sha1={digest}"),
            "sha256=zz".to_owned(),
            "sha256=abc".to_owned(),
            format!("sha256={}", &digest[..32]),
        ] {
            assert!(
                !verify(Some(SECRET), BODY, Some(&header)),
                "header {header:?} should be rejected"
            );
        }
    }

    #[test]
    fn wrong_secret_rejected() {
        let header = sign("another secret", BODY);
        assert!(!verify(Some(SECRET), BODY, Some(&header)));
    }

    #[test]
    fn reserialized_json_does_not_verify() {
        let raw = br#"{"repository": {"name": "demo", "clone_url": "x"}}"#;
        let header = sign(SECRET, raw);
        let parsed: serde_json::Value = serde_json::from_slice(raw).unwrap();
        let reserialized = serde_json::to_vec(&parsed).unwrap();
        assert_ne!(raw.as_slice(), reserialized.as_slice());
        assert!(verify(Some(SECRET), raw, Some(&header)));
        assert!(!verify(Some(SECRET), &reserialized, Some(&header)));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn signed_body_always_verifies(
                secret in "[ -~]{1,64}",
                body in proptest::collection::vec(any::<u8>(), 0..512),
            ) {
                let header = sign(&secret, &body);
                prop_assert!(verify(Some(&secret), &body, Some(&header)));
            }

            #[test]
            fn one_byte_mutation_fails(
                secret in "[ -~]{1,64}",
                body in proptest::collection::vec(any::<u8>(), 1..512),
                idx in any::<prop::sample::Index>(),
                flip in 1_u8..=255,
            ) {
                let header = sign(&secret, &body);
                let mut mutated = body.clone();
                let i = idx.index(mutated.len());
                mutated[i] ^= flip;
                prop_assert!(!verify(Some(&secret), &mutated, Some(&header)));
            }

            #[test]
            fn arbitrary_header_never_panics(header in ".*") {
                let _ = verify(Some("s"), b"body", Some(&header));
            }
        }
    }
}
