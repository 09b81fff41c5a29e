//! Credential and signing-key derivation.

use std::env;
use std::fmt::Debug;
use std::fmt::Formatter;
use std::fs;

use log::debug;

use crate::constants::AWS_ACCESS_KEY;
use crate::constants::AWS_SECRET_KEY;
use crate::error::{Error, ErrorKind, Result};
use crate::hash::hmac_sha256;
use crate::region::Region;
use crate::time::{format_date, now};

/// Hook used to fetch a fresh key pair when the signing day rolls over.
/// Returns `(secret, access)`. The hook must be idempotent and thread
/// safe; it is called at most once per UTC day.
pub type RefreshKeys = Box<dyn Fn() -> (String, String) + Send + Sync>;

/// Credential holds the long-term keys together with the day-scoped
/// signing key derived from them.
///
/// The signing key is a pure function of (secret, date, region, service);
/// it is re-derived only when the UTC day changes under an installed
/// [refresh hook](Credential::with_refresh).
pub struct Credential {
    access: String,
    secret: String,
    date: String,
    region: &'static Region,
    service: String,
    signing_key: [u8; 32],
    refresh: Option<RefreshKeys>,
}

impl Credential {
    /// Create a credential for `region`/`service` with the scope date set
    /// to the current UTC day.
    pub fn new(secret: &str, access: &str, region: &'static Region, service: &str) -> Self {
        let mut cred = Credential {
            access: access.to_string(),
            secret: secret.to_string(),
            date: format_date(now()),
            region,
            service: service.to_string(),
            signing_key: [0; 32],
            refresh: None,
        };
        cred.derive_signing_key();
        cred
    }

    /// Install a hook that fetches fresh keys when the UTC day changes
    /// between signing calls.
    pub fn with_refresh(mut self, refresh: RefreshKeys) -> Self {
        self.refresh = Some(refresh);
        self
    }

    /// Pin the scope date instead of using the current UTC day.
    ///
    /// # Note
    ///
    /// We should always take the current day to sign requests. Only use
    /// this function for testing.
    #[cfg(test)]
    pub(crate) fn with_date(mut self, date: &str) -> Self {
        self.date = date.to_string();
        self.derive_signing_key();
        self
    }

    /// Get the access identifier.
    pub fn access(&self) -> &str {
        &self.access
    }

    /// Get the region this credential signs for.
    pub fn region(&self) -> &'static Region {
        self.region
    }

    /// The credential scope: "20110909/us-east-1/glacier/aws4_request".
    pub fn scope(&self) -> String {
        format!(
            "{}/{}/{}/aws4_request",
            self.date, self.region.name, self.service
        )
    }

    /// A credential is valid when both keys are present.
    pub fn is_valid(&self) -> bool {
        !self.access.is_empty() && !self.secret.is_empty()
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(Error::new(ErrorKind::Config, "credential is empty")
                .with_operation("credential::check"))
        }
    }

    pub(crate) fn signing_key(&self) -> &[u8; 32] {
        &self.signing_key
    }

    /// Re-derive the signing key if the UTC day has rolled past the scope
    /// date and a refresh hook is installed. Without a hook the stale key
    /// is kept and the service will reject the signature.
    pub(crate) fn rollover(&mut self, today: &str) {
        let Some(refresh) = &self.refresh else {
            return;
        };
        if self.date == today {
            return;
        }

        debug!("signing scope rolled over from {} to {today}", self.date);
        let (secret, access) = refresh();
        self.secret = secret;
        self.access = access;
        self.date = today.to_string();
        self.derive_signing_key();
    }

    fn derive_signing_key(&mut self) {
        // Sign secret
        let secret = format!("AWS4{}", self.secret);
        // Sign date
        let sign_date = hmac_sha256(secret.as_bytes(), self.date.as_bytes());
        // Sign region
        let sign_region = hmac_sha256(&sign_date, self.region.name.as_bytes());
        // Sign service
        let sign_service = hmac_sha256(&sign_region, self.service.as_bytes());
        // Sign request
        self.signing_key = hmac_sha256(&sign_service, b"aws4_request");
    }
}

impl Debug for Credential {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Credential {{ access: {}, secret: {}, scope: {} }}",
            redact(&self.access),
            redact(&self.secret),
            self.scope()
        )
    }
}

fn redact(v: &str) -> &str {
    if v.is_empty() {
        "<empty>"
    } else {
        "<redacted>"
    }
}

/// Get secret and access keys (in that order) from the environment
/// variables `AWS_SECRET_KEY` and `AWS_ACCESS_KEY`.
///
/// Both come back empty when unset; the caller decides whether that is
/// fatal.
pub fn keys_from_env() -> (String, String) {
    (
        env::var(AWS_SECRET_KEY).unwrap_or_default(),
        env::var(AWS_ACCESS_KEY).unwrap_or_default(),
    )
}

/// Get secret and access keys (in that order) from a file holding the two
/// tokens separated by whitespace.
pub fn keys_from_file(path: &str) -> Result<(String, String)> {
    let content = fs::read_to_string(path).map_err(|e| {
        Error::new(ErrorKind::Config, "reading key file failed")
            .with_operation("credential::keys_from_file")
            .set_source(e)
    })?;

    let mut tokens = content.split_whitespace();
    match (tokens.next(), tokens.next()) {
        (Some(secret), Some(access)) => Ok((secret.to_string(), access.to_string())),
        _ => Err(
            Error::new(ErrorKind::Config, "key file must hold two tokens")
                .with_operation("credential::keys_from_file"),
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;

    use super::*;
    use crate::region::US_EAST_1;

    #[test]
    fn test_derive_signing_key() {
        let _ = env_logger::builder().is_test(true).try_init();

        let cred = Credential::new(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "AKIDEXAMPLE",
            &US_EAST_1,
            "host",
        )
        .with_date("20110909");

        assert_eq!(
            hex::encode(cred.signing_key()),
            "e220a8ee99f059729066fd06efe5c0f949d6aa8973360d189dd0e0eddd7a9596"
        );
        assert_eq!(cred.scope(), "20110909/us-east-1/host/aws4_request");
    }

    #[test]
    fn test_signing_key_is_pure() {
        let a = Credential::new("secret", "access", &US_EAST_1, "glacier").with_date("20110909");
        let b = Credential::new("secret", "access", &US_EAST_1, "glacier").with_date("20110909");
        assert_eq!(a.signing_key(), b.signing_key());
    }

    #[test]
    fn test_check_empty() {
        let cred = Credential::new("", "", &US_EAST_1, "glacier");
        assert!(!cred.is_valid());
        let err = cred.check().expect_err("must fail");
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }

    #[test]
    fn test_rollover_without_hook_keeps_key() {
        let mut cred = Credential::new("secret", "access", &US_EAST_1, "glacier")
            .with_date("20200101");
        let before = *cred.signing_key();
        cred.rollover("20200102");
        assert_eq!(*cred.signing_key(), before);
        assert_eq!(cred.scope(), "20200101/us-east-1/glacier/aws4_request");
    }

    #[test]
    fn test_rollover_with_hook_rederives() {
        let _ = env_logger::builder().is_test(true).try_init();

        let mut cred = Credential::new("old_secret", "old_access", &US_EAST_1, "glacier")
            .with_date("20200101")
            .with_refresh(Box::new(|| {
                ("new_secret".to_string(), "new_access".to_string())
            }));
        let before = *cred.signing_key();

        cred.rollover("20200102");

        assert_eq!(cred.access(), "new_access");
        assert_eq!(cred.scope(), "20200102/us-east-1/glacier/aws4_request");
        assert_ne!(*cred.signing_key(), before);

        let expected = Credential::new("new_secret", "new_access", &US_EAST_1, "glacier")
            .with_date("20200102");
        assert_eq!(cred.signing_key(), expected.signing_key());
    }

    #[test]
    fn test_keys_from_env() {
        temp_env::with_vars(
            vec![
                (AWS_SECRET_KEY, Some("secret")),
                (AWS_ACCESS_KEY, Some("access")),
            ],
            || {
                assert_eq!(
                    keys_from_env(),
                    ("secret".to_string(), "access".to_string())
                );
            },
        );
    }

    #[test]
    fn test_keys_from_env_unset() {
        temp_env::with_vars_unset(vec![AWS_SECRET_KEY, AWS_ACCESS_KEY], || {
            assert_eq!(keys_from_env(), (String::new(), String::new()));
        });
    }

    #[test]
    fn test_keys_from_file() {
        let path = env::temp_dir().join("coldvault_keys_test");
        let path = path.to_str().expect("temp path must be valid utf-8");

        for content in ["secret access", "secret  access", "secret\naccess", "\nsecret\taccess"] {
            fs::write(path, content).expect("write must succeed");
            let (secret, access) = keys_from_file(path).expect("load must succeed");
            assert_eq!(secret, "secret", "unexpected keys from {content:?}");
            assert_eq!(access, "access", "unexpected keys from {content:?}");
        }

        fs::remove_file(path).expect("remove must succeed");
    }

    #[test]
    fn test_keys_from_file_short() {
        let path = env::temp_dir().join("coldvault_keys_test_short");
        let path = path.to_str().expect("temp path must be valid utf-8");

        fs::write(path, "secret").expect("write must succeed");
        let err = keys_from_file(path).expect_err("must fail");
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);

        fs::remove_file(path).expect("remove must succeed");
    }

    #[test]
    fn test_redacted_debug() {
        let cred = Credential::new("sensitive_secret_key", "sensitive_access_key", &US_EAST_1, "glacier");
        let out = format!("{cred:?}");
        assert!(!out.contains("sensitive"), "keys leaked into {out}");
        assert!(out.contains("<redacted>"));
    }
}
