//! `x-hub-signature-256` verification for webhook deliveries.

use sha2::{Digest, Sha256};

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Checks `sha256=<hex hmac>` of the raw body against the app secret.
pub fn verify_signature(signature_header: Option<&str>, body: &[u8], app_secret: &str) -> bool {
    let Some(provided) = signature_header.map(str::trim) else {
        return false;
    };
    let expected = format!("sha256={}", hmac_sha256_hex(app_secret.as_bytes(), body));
    constant_time_eq(expected.as_bytes(), provided.as_bytes())
}

pub fn hmac_sha256_hex(key: &[u8], payload: &[u8]) -> String {
    const BLOCK: usize = 64;

    let mut key_block = [0_u8; BLOCK];
    if key.len() > BLOCK {
        let digest = Sha256::digest(key);
        key_block[..digest.len()].copy_from_slice(&digest);
    } else {
        key_block[..key.len()].copy_from_slice(key);
    }

    let inner_pad: Vec<u8> = key_block.iter().map(|b| b ^ 0x36).collect();
    let outer_pad: Vec<u8> = key_block.iter().map(|b| b ^ 0x5c).collect();

    let inner_digest = Sha256::new()
        .chain_update(&inner_pad)
        .chain_update(payload)
        .finalize();
    let digest = Sha256::new()
        .chain_update(&outer_pad)
        .chain_update(inner_digest)
        .finalize();

    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    let mut diff = left.len() ^ right.len();
    for index in 0..left.len().max(right.len()) {
        let l = left.get(index).copied().unwrap_or(0);
        let r = right.get(index).copied().unwrap_or(0);
        diff |= (l ^ r) as usize;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hmac_matches_known_sha256_vector() {
        let digest = hmac_sha256_hex(b"key", b"The quick brown fox jumps over the lazy dog");
        assert_eq!(
            digest,
            "f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
        );
    }

    #[test]
    fn accepts_matching_signature_and_rejects_others() {
        let body = br#"{"object":"page","entry":[]}"#;
        let header = format!("sha256={}", hmac_sha256_hex(b"secret", body));
        assert!(verify_signature(Some(&header), body, "secret"));
        assert!(!verify_signature(Some(&header), body, "other-secret"));
        assert!(!verify_signature(Some("sha256=deadbeef"), body, "secret"));
        assert!(!verify_signature(None, body, "secret"));
    }

    #[test]
    fn header_must_be_the_exact_prefixed_lowercase_digest() {
        let body = br#"{"object":"page","entry":[]}"#;
        let digest = hmac_sha256_hex(b"secret", body);

        let padded = format!("  sha256={digest}\n");
        assert!(verify_signature(Some(&padded), body, "secret"));

        let uppercase = format!("sha256={}", digest.to_uppercase());
        let bare = digest.clone();
        let wrong_algorithm = format!("sha1={digest}");
        let truncated = format!("sha256={}", &digest[..digest.len() - 1]);
        let extended = format!("sha256={digest}0");
        for header in [uppercase, bare, wrong_algorithm, truncated, extended] {
            assert!(
                !verify_signature(Some(&header), body, "secret"),
                "accepted {header:?}"
            );
        }
        assert!(!verify_signature(Some(""), body, "secret"));
    }
}
