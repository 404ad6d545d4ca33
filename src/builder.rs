//! Builder API authentication for relayer requests.

use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE},
    Engine,
};
use hmac::{Hmac, Mac};
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Method,
};
use sha2::Sha256;

use crate::config::Credentials;

type HmacSha256 = Hmac<Sha256>;

pub const API_KEY_HEADER: &str = "poly_builder_api_key";
pub const PASSPHRASE_HEADER: &str = "poly_builder_passphrase";
pub const SIGNATURE_HEADER: &str = "poly_builder_signature";
pub const TIMESTAMP_HEADER: &str = "poly_builder_timestamp";

#[derive(Clone)]
pub struct BuilderAuth {
    api_key: String,
    secret: Vec<u8>,
    passphrase: String,
}

impl BuilderAuth {
    pub fn new(credentials: &Credentials) -> Self {
        Self {
            api_key: credentials.api_key.clone(),
            secret: decode_secret(&credentials.secret),
            passphrase: credentials.passphrase.clone(),
        }
    }

    /// base64url(HMAC-SHA256(secret, timestamp || method || path || body))
    pub fn sign(&self, timestamp: i64, method: &Method, path: &str, body: &str) -> String {
        let message = format!("{timestamp}{}{path}{body}", method.as_str());

        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts keys of any length");
        mac.update(message.as_bytes());

        URL_SAFE.encode(mac.finalize().into_bytes())
    }

    pub fn headers(
        &self,
        method: &Method,
        path: &str,
        body: &str,
    ) -> Result<HeaderMap, reqwest::header::InvalidHeaderValue> {
        let timestamp = chrono::Utc::now().timestamp();
        self.headers_at(timestamp, method, path, body)
    }

    fn headers_at(
        &self,
        timestamp: i64,
        method: &Method,
        path: &str,
        body: &str,
    ) -> Result<HeaderMap, reqwest::header::InvalidHeaderValue> {
        let signature = self.sign(timestamp, method, path, body);

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static(API_KEY_HEADER),
            HeaderValue::from_str(&self.api_key)?,
        );
        headers.insert(
            HeaderName::from_static(PASSPHRASE_HEADER),
            HeaderValue::from_str(&self.passphrase)?,
        );
        headers.insert(
            HeaderName::from_static(SIGNATURE_HEADER),
            HeaderValue::from_str(&signature)?,
        );
        headers.insert(
            HeaderName::from_static(TIMESTAMP_HEADER),
            HeaderValue::from_str(&timestamp.to_string())?,
        );

        Ok(headers)
    }
}

fn decode_secret(secret: &str) -> Vec<u8> {
    URL_SAFE
        .decode(secret)
        .or_else(|_| STANDARD.decode(secret))
        .unwrap_or_else(|_| secret.as_bytes().to_vec())
}
