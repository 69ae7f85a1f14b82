use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// base64(HMAC-SHA256(secret, data)), the signature format the storefront puts in `X-Shopify-Hmac-SHA256`.
pub fn calculate_hmac(secret: &str, data: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(data);
    base64::encode(mac.finalize().into_bytes())
}

/// Check a webhook signature against the *raw* request bytes.
///
/// The body must be the exact bytes as received; re-serializing the parsed JSON can change whitespace or key
/// order and break the signature. Returns false (never an error) on empty body, empty secret or any mismatch:
/// callers treat false as "reject the request".
pub fn verify_webhook_hmac(body: &[u8], signature: &str, secret: &str) -> bool {
    if body.is_empty() || secret.is_empty() {
        return false;
    }
    let expected = calculate_hmac(secret, body);
    constant_time_eq(expected.as_bytes(), signature.trim().as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod test {
    use super::*;

    const SECRET: &str = "0123456789abcdef";

    #[test]
    fn signature_round_trip() {
        let body = br#"{"order_id":7304009351501,"refund_line_items":[{"subtotal":"6.00"}]}"#;
        let signature = calculate_hmac(SECRET, body);
        assert!(verify_webhook_hmac(body, &signature, SECRET));
    }

    #[test]
    fn known_vector() {
        // HMAC-SHA256("secret", "hello world"), base64
        let signature = calculate_hmac("secret", b"hello world");
        assert_eq!(signature, "c0zGLzKEFWj0VxWuufTXiRMk5tlI5MbGDAYhzaxIYjo=");
    }

    #[test]
    fn any_single_byte_mutation_fails() {
        let body = b"{\"order_id\": 42}".to_vec();
        let signature = calculate_hmac(SECRET, &body);
        for i in 0..body.len() {
            let mut mutated = body.clone();
            mutated[i] ^= 0x01;
            assert!(!verify_webhook_hmac(&mutated, &signature, SECRET), "mutation at byte {i} was accepted");
        }
        // mutate the signature instead of the body
        let mut bad_signature = signature.clone().into_bytes();
        bad_signature[0] ^= 0x01;
        assert!(!verify_webhook_hmac(&body, &String::from_utf8(bad_signature).unwrap(), SECRET));
    }

    #[test]
    fn degenerate_inputs_are_rejected_not_errors() {
        assert!(!verify_webhook_hmac(b"", "sig", SECRET));
        assert!(!verify_webhook_hmac(b"body", "sig", ""));
        assert!(!verify_webhook_hmac(b"body", "", SECRET));
        assert!(!verify_webhook_hmac(b"body", "not base64 at all!", SECRET));
    }
}
