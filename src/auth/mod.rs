//! Authentication of webhook deliveries.

mod extractor;

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

pub use extractor::{AuthError, GitlabTokenAuth};

type HmacSha256 = Hmac<Sha256>;

/// Shared secrets both platforms authenticate their deliveries with.
///
/// `Debug` never prints the values.
#[derive(Clone)]
pub struct WebhookSecrets {
    github: SecretString,
    gitlab: SecretString,
}

impl WebhookSecrets {
    pub fn new(github: SecretString, gitlab: SecretString) -> Self {
        Self { github, gitlab }
    }

    /// Check an `X-Hub-Signature-256: sha256=<hex>` header against the body.
    ///
    /// The MAC comparison is constant-time.
    pub fn verify_github(&self, body: &[u8], signature: Option<&str>) -> bool {
        let Some(hex_digest) = signature.and_then(|s| s.trim().strip_prefix("sha256=")) else {
            return false;
        };
        let Ok(expected) = hex::decode(hex_digest) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(self.github.expose_secret().as_bytes()) else {
            return false;
        };
        mac.update(body);
        mac.verify_slice(&expected).is_ok()
    }

    /// Check an `X-Gitlab-Token` header. Unequal lengths compare false without
    /// an early exit.
    pub fn verify_gitlab(&self, token: Option<&str>) -> bool {
        match token {
            Some(provided) => self
                .gitlab
                .expose_secret()
                .as_bytes()
                .ct_eq(provided.as_bytes())
                .into(),
            None => false,
        }
    }
}

impl std::fmt::Debug for WebhookSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WebhookSecrets([REDACTED])")
    }
}

/// `sha256=<hex>` signature of `body`, as GitHub computes it.
pub fn sign_github(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}
