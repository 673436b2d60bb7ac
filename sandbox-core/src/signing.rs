//! Signed download/upload URLs for the envd filesystem endpoints.

use hmac::Hmac;
use hmac::Mac;
use sha2::Sha256;

use crate::error::Result;
use crate::error::SandboxError;

type HmacSha256 = Hmac<Sha256>;

/// The operation a signed URL authorizes; included in the signed payload so
/// a download signature can't be replayed to authorize an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignedOperation {
    Read,
    Write,
}

impl SignedOperation {
    fn as_str(self) -> &'static str {
        match self {
            SignedOperation::Read => "read",
            SignedOperation::Write => "write",
        }
    }
}

/// Computes the hex-encoded HMAC-SHA256 signature over
/// `path:operation:user:expiration`, keyed by the sandbox's envd access
/// token.
pub fn sign(
    path: &str,
    operation: SignedOperation,
    user: &str,
    token: &str,
    expiration_epoch_secs: u64,
) -> Result<String> {
    let payload = format!(
        "{path}:{operation}:{user}:{expiration}",
        operation = operation.as_str(),
        expiration = expiration_epoch_secs
    );
    let mut mac = HmacSha256::new_from_slice(token.as_bytes())
        .map_err(|e| SandboxError::Sandbox(format!("invalid signing key: {e}")))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Appends `?username=…&signature=…&signature_expiration=…` to `base_url`.
pub fn signed_url(
    base_url: &str,
    path: &str,
    operation: SignedOperation,
    user: &str,
    token: &str,
    expiration_epoch_secs: u64,
) -> Result<String> {
    let signature = sign(path, operation, user, token, expiration_epoch_secs)?;
    let mut url = url::Url::parse(base_url)
        .map_err(|e| SandboxError::Sandbox(format!("invalid base url: {e}")))?;
    url.query_pairs_mut()
        .append_pair("username", user)
        .append_pair("signature", &signature)
        .append_pair("signature_expiration", &expiration_epoch_secs.to_string());
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]
    use super::*;

    #[test]
    fn signature_is_deterministic_for_the_same_inputs() {
        let a = sign("/home/user/file.txt", SignedOperation::Read, "user", "secret-token", 1_700_000_000).unwrap();
        let b = sign("/home/user/file.txt", SignedOperation::Read, "user", "secret-token", 1_700_000_000).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn read_and_write_signatures_differ_for_the_same_path() {
        let read = sign("/home/user/file.txt", SignedOperation::Read, "user", "secret-token", 1_700_000_000).unwrap();
        let write = sign("/home/user/file.txt", SignedOperation::Write, "user", "secret-token", 1_700_000_000).unwrap();
        assert_ne!(read, write);
    }

    #[test]
    fn signed_url_appends_expected_query_params() {
        let url = signed_url(
            "https://8080-sbx.example.com",
            "/home/user/file.txt",
            SignedOperation::Read,
            "user",
            "secret-token",
            1_700_000_000,
        )
        .unwrap();
        assert!(url.contains("username=user"));
        assert!(url.contains("signature_expiration=1700000000"));
        assert!(url.contains("signature="));
    }
}
