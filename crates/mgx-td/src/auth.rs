//! MEXC authentication and request signing.
//!
//! Every private REST request carries a `timestamp` parameter and a
//! `signature` parameter: the lowercase-hex HMAC-SHA256 of the URL-encoded
//! query string, keyed by the API secret. The signature is computed over the
//! query exactly as it is sent, so values are encoded *before* signing.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute an HMAC-SHA256 signature and return it as a lowercase hex string.
///
/// # Arguments
///
/// * `secret` — the API secret key (UTF-8 string).
/// * `message` — the data to sign (typically the query string).
pub fn hmac_sha256_sign(secret: &str, message: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(message.as_bytes());
    let result = mac.finalize();
    hex::encode(result.into_bytes())
}

/// Build a URL-encoded, HMAC-SHA256–signed query string.
///
/// Takes a slice of `(key, value)` parameter pairs, joins them with `&`,
/// computes the HMAC-SHA256 signature over the resulting string, and appends
/// `&signature=<hex>`.
///
/// # Arguments
///
/// * `params` — request parameters (must already include `timestamp`).
/// * `secret` — the API secret key.
pub fn build_signed_query(params: &[(&str, &str)], secret: &str) -> String {
    let query: String = params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    let signature = hmac_sha256_sign(secret, &query);
    format!("{query}&signature={signature}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hmac_sha256_is_hex_of_32_bytes() {
        let secret = "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j";
        let message = "symbol=BTCUSDC&side=BUY&type=LIMIT&quantity=0.00005\
                        &price=29950.00&timestamp=1499827319559";
        let sig = hmac_sha256_sign(secret, message);
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));

        // Deterministic for identical input.
        assert_eq!(sig, hmac_sha256_sign(secret, message));
    }

    #[test]
    fn build_signed_query_appends_signature() {
        let query = build_signed_query(
            &[("symbol", "BTCUSDC"), ("timestamp", "1234567890")],
            "test_secret",
        );
        assert!(query.starts_with("symbol=BTCUSDC&timestamp=1234567890&signature="));
    }

    #[test]
    fn values_are_encoded_before_signing() {
        let json = r#"[{"symbol":"BTCUSDC"}]"#;
        let query = build_signed_query(&[("batchOrders", json)], "test_secret");

        // The raw JSON never appears; the encoded form is what gets signed.
        assert!(!query.contains(json));
        let encoded = urlencoding::encode(json).into_owned();
        assert!(query.starts_with(&format!("batchOrders={encoded}&signature=")));
    }
}
