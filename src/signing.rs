//! Signed download URLs.
//!
//! Authorization for the out-of-band download channel is encoded entirely in the URL:
//! a per-URL random salt plus an HMAC-SHA256 signature over the salt and the canonical
//! form of the URL. A verifier holding the shared key decides validity without ever
//! contacting the issuer.
//!
//! Canonical form: `scheme://host[:port]<path>?<query>` with all query pairs
//! percent-decoded, re-encoded against a single normalized set, and sorted
//! lexicographically; the `sign` parameter is excluded, the `salt` parameter included.
//! The salt bytes are part of the MAC input in addition to the canonical URL, so a
//! substituted salt always invalidates the signature.

use anyhow::{Context, Result};
use hmac::{Hmac, Mac};
use percent_encoding::{percent_decode_str, percent_encode, NON_ALPHANUMERIC};
use rand::RngCore;
use sha2::Sha256;
use url::Url;

type HmacSha256 = Hmac<Sha256>;

/// The reserved query parameter carrying the URL-escaped random salt.
pub const PARAM_SALT: &str = "salt";
/// The reserved query parameter carrying the URL signature.
pub const PARAM_SIGN: &str = "sign";
/// The number of random salt bytes bound into each signature.
const SALT_LEN: usize = 64;

/// Sign the given URL with the given key.
///
/// The returned URL carries the original query parameters untouched, plus the reserved
/// `salt` & `sign` parameters.
pub fn sign_url(key: &[u8], url: &str) -> Result<String> {
    let mut url = Url::parse(url).context("error parsing URL for signing")?;

    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let salt_param = percent_encode(&salt, NON_ALPHANUMERIC).to_string();
    append_raw_query(&mut url, PARAM_SALT, &salt_param);

    let canonical = canonicalize(&url);
    let mut mac = HmacSha256::new_from_slice(key).context("error initializing HMAC from signing key")?;
    mac.update(&salt);
    mac.update(canonical.as_bytes());
    let sig = base64::encode_config(mac.finalize().into_bytes(), base64::URL_SAFE_NO_PAD);
    append_raw_query(&mut url, PARAM_SIGN, &sig);

    Ok(url.to_string())
}

/// Verify the signature of the given URL with the given key.
///
/// `Ok(false)` covers any malformed, missing or mismatching signature material; an error
/// is returned only for crypto initialization failures. The signature comparison itself
/// is constant-time.
pub fn verify_url(key: &[u8], url: &str) -> Result<bool> {
    let url = match Url::parse(url) {
        Ok(url) => url,
        Err(_) => return Ok(false),
    };

    let (mut sig, mut salt) = (None, None);
    for (decoded_key, raw_value) in raw_query_pairs(&url) {
        match decoded_key.as_slice() {
            b"sign" => {
                let raw: Vec<u8> = percent_decode_str(raw_value).collect();
                sig = base64::decode_config(raw, base64::URL_SAFE_NO_PAD).ok();
            }
            b"salt" => salt = Some(percent_decode_str(raw_value).collect::<Vec<u8>>()),
            _ => continue,
        }
    }
    let (sig, salt) = match (sig, salt) {
        (Some(sig), Some(salt)) => (sig, salt),
        _ => return Ok(false),
    };

    let canonical = canonicalize(&url);
    let mut mac = HmacSha256::new_from_slice(key).context("error initializing HMAC from signing key")?;
    mac.update(&salt);
    mac.update(canonical.as_bytes());
    Ok(mac.verify_slice(&sig).is_ok())
}

/// Compute the canonical form of the given URL for signing purposes.
///
/// The `sign` parameter is always excluded. Signer and verifier share this routine,
/// which is what makes the signature decidable offline.
fn canonicalize(url: &Url) -> String {
    let mut pairs: Vec<(String, String)> = raw_query_pairs(url)
        .filter(|(key, _)| key.as_slice() != PARAM_SIGN.as_bytes())
        .map(|(key, raw_value)| {
            let value: Vec<u8> = percent_decode_str(raw_value).collect();
            (
                percent_encode(&key, NON_ALPHANUMERIC).to_string(),
                percent_encode(&value, NON_ALPHANUMERIC).to_string(),
            )
        })
        .collect();
    pairs.sort();

    let mut canonical = format!("{}://{}", url.scheme(), url.host_str().unwrap_or(""));
    if let Some(port) = url.port() {
        canonical.push(':');
        canonical.push_str(&port.to_string());
    }
    canonical.push_str(url.path());
    if !pairs.is_empty() {
        canonical.push('?');
        let query: Vec<String> = pairs.into_iter().map(|(key, value)| format!("{}={}", key, value)).collect();
        canonical.push_str(&query.join("&"));
    }
    canonical
}

/// Iterate the raw query pairs of the given URL as (decoded key bytes, raw value).
fn raw_query_pairs<'a>(url: &'a Url) -> impl Iterator<Item = (Vec<u8>, &'a str)> {
    url.query().unwrap_or("").split('&').filter(|part| !part.is_empty()).map(|part| {
        let (key, value) = match part.split_once('=') {
            Some((key, value)) => (key, value),
            None => (part, ""),
        };
        (percent_decode_str(key).collect::<Vec<u8>>(), value)
    })
}

/// Append a key & pre-encoded value pair to the URL's raw query string.
fn append_raw_query(url: &mut Url, key: &str, raw_value: &str) {
    let query = match url.query() {
        Some(query) if !query.is_empty() => format!("{}&{}={}", query, key, raw_value),
        _ => format!("{}={}", key, raw_value),
    };
    url.set_query(Some(&query));
}
