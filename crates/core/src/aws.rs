//! AWS credentials and Signature Version 4 request signing.
//!
//! An [`AwsSession`] is built once per invocation and handed to every client
//! that needs it: the parameter store reads the session token from it, the
//! S3 object store and the OpenSearch client sign requests with a
//! [`SigV4Signer`] derived from it.

use crate::error::ConfigError;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use url::Url;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl AwsCredentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token,
        }
    }

    /// Reads `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and the optional
    /// `AWS_SESSION_TOKEN`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let access_key_id = required_env("AWS_ACCESS_KEY_ID")?;
        let secret_access_key = required_env("AWS_SECRET_ACCESS_KEY")?;
        let session_token = std::env::var("AWS_SESSION_TOKEN")
            .ok()
            .filter(|token| !token.trim().is_empty());

        Ok(Self::new(access_key_id, secret_access_key, session_token))
    }
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingCredential(format!("{name} is not set")))
}

#[derive(Debug, Clone)]
pub struct AwsSession {
    credentials: AwsCredentials,
    region: String,
}

impl AwsSession {
    pub fn new(credentials: AwsCredentials, region: impl Into<String>) -> Self {
        Self {
            credentials,
            region: region.into(),
        }
    }

    pub fn from_env(region: impl Into<String>) -> Result<Self, ConfigError> {
        Ok(Self::new(AwsCredentials::from_env()?, region))
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn session_token(&self) -> Option<&str> {
        self.credentials.session_token.as_deref()
    }

    pub fn signer(&self, service: impl Into<String>) -> SigV4Signer {
        SigV4Signer {
            credentials: self.credentials.clone(),
            region: self.region.clone(),
            service: service.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SigV4Signer {
    credentials: AwsCredentials,
    region: String,
    service: String,
}

impl SigV4Signer {
    /// Headers to attach to the request, `Authorization` included.
    pub fn sign(
        &self,
        method: &str,
        url: &Url,
        payload: &[u8],
    ) -> Result<Vec<(String, String)>, ConfigError> {
        self.sign_at(method, url, payload, Utc::now())
    }

    pub fn sign_at(
        &self,
        method: &str,
        url: &Url,
        payload: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Vec<(String, String)>, ConfigError> {
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let payload_hash = hex_sha256(payload);

        let mut headers = vec![
            ("host".to_string(), host_header(url)),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        if let Some(token) = &self.credentials.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        let signed_headers = headers
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>()
            .join(";");
        let canonical_headers: String = headers
            .iter()
            .map(|(name, value)| format!("{}:{}\n", name, value.trim()))
            .collect();

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method.to_uppercase(),
            self.canonical_uri(url),
            canonical_query(url),
            canonical_headers,
            signed_headers,
            payload_hash
        );

        let credential_scope = format!(
            "{}/{}/{}/aws4_request",
            date_stamp, self.region, self.service
        );
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            hex_sha256(canonical_request.as_bytes())
        );

        let signing_key = derive_signing_key(
            &self.credentials.secret_access_key,
            &date_stamp,
            &self.region,
            &self.service,
        )?;
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes())?);

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.credentials.access_key_id, credential_scope, signed_headers, signature
        );

        headers.retain(|(name, _)| name != "host");
        headers.push(("authorization".to_string(), authorization));
        Ok(headers)
    }

    /// S3 signs the path as sent; every other service signs it encoded twice.
    fn canonical_uri(&self, url: &Url) -> String {
        let path = if url.path().is_empty() { "/" } else { url.path() };
        if self.service == "s3" {
            return path.to_string();
        }
        path.split('/')
            .map(urlencoding::encode)
            .collect::<Vec<_>>()
            .join("/")
    }
}

fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

fn canonical_query(url: &Url) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(name, value)| {
            (
                urlencoding::encode(&name).into_owned(),
                urlencoding::encode(&value).into_owned(),
            )
        })
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

pub(crate) fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, ConfigError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|error| ConfigError::Signing(error.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn derive_signing_key(
    secret_key: &str,
    date_stamp: &str,
    region: &str,
    service: &str,
) -> Result<Vec<u8>, ConfigError> {
    let k_date = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), date_stamp.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn signer(service: &str, token: Option<&str>) -> SigV4Signer {
        let credentials = AwsCredentials::new(
            "AKIDEXAMPLE",
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            token.map(str::to_string),
        );
        AwsSession::new(credentials, "ap-northeast-1").signer(service)
    }

    #[test]
    fn signing_key_matches_published_derivation() -> Result<(), Box<dyn std::error::Error>> {
        let key = derive_signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20120215",
            "us-east-1",
            "iam",
        )?;
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
        Ok(())
    }

    #[test]
    fn signed_headers_carry_scope_and_token() -> Result<(), Box<dyn std::error::Error>> {
        let url = Url::parse("https://search.example.com/site-index/_doc/news")?;
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).single().ok_or("bad date")?;
        let headers = signer("aoss", Some("token-1")).sign_at("PUT", &url, b"{}", now)?;

        let lookup = |name: &str| {
            headers
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.clone())
        };

        assert_eq!(lookup("x-amz-date").as_deref(), Some("20240102T030405Z"));
        assert_eq!(lookup("x-amz-security-token").as_deref(), Some("token-1"));
        assert_eq!(lookup("x-amz-content-sha256"), Some(hex_sha256(b"{}")));
        assert!(lookup("host").is_none());

        let authorization = lookup("authorization").ok_or("missing authorization")?;
        assert!(authorization.starts_with(
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20240102/ap-northeast-1/aoss/aws4_request"
        ));
        assert!(authorization
            .contains("SignedHeaders=host;x-amz-content-sha256;x-amz-date;x-amz-security-token"));
        Ok(())
    }

    #[test]
    fn signature_is_deterministic_for_a_fixed_clock() -> Result<(), Box<dyn std::error::Error>> {
        let url = Url::parse("https://bucket.s3.ap-northeast-1.amazonaws.com/a/b.html")?;
        let now = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).single().ok_or("bad date")?;
        let first = signer("s3", None).sign_at("GET", &url, b"", now)?;
        let second = signer("s3", None).sign_at("GET", &url, b"", now)?;
        assert_eq!(first, second);
        assert!(!first.iter().any(|(name, _)| name == "x-amz-security-token"));
        Ok(())
    }

    #[test]
    fn non_s3_paths_are_encoded_twice() -> Result<(), Box<dyn std::error::Error>> {
        let url = Url::parse("https://search.example.com/idx/_doc/%E3%83%86")?;
        assert_eq!(signer("aoss", None).canonical_uri(&url), "/idx/_doc/%25E3%2583%2586");
        assert_eq!(signer("s3", None).canonical_uri(&url), "/idx/_doc/%E3%83%86");
        Ok(())
    }

    #[test]
    fn query_parameters_are_sorted_and_encoded() -> Result<(), Box<dyn std::error::Error>> {
        let url = Url::parse("https://example.com/?b=2&a=x%2Fy")?;
        assert_eq!(canonical_query(&url), "a=x%2Fy&b=2");
        Ok(())
    }
}
