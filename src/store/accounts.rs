use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{check_segment, ensure_dir, write_private};
use crate::key::KeySpec;
use crate::provider::{DigiCertConfig, DigiCertEabConfig};
use crate::util::redacted;
use crate::{Error, Result};

const CREDENTIALS_FILE: &str = "credentials.json";

/// Which CA family a stored account belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderTag {
    #[default]
    LetsEncrypt,
    DigiCert,
}

impl ProviderTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderTag::LetsEncrypt => "letsencrypt",
            ProviderTag::DigiCert => "digicert",
        }
    }
}

impl fmt::Display for ProviderTag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Secrets for one account, keyed by (provider, email).
///
/// Only the fields relevant for the provider are set, empty ones are left
/// out of the JSON.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AccountCredentials {
    pub email: String,
    pub server: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub eab_kid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub eab_hmac_key: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hmac_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hmac_key: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_key: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub account_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub organization_id: String,
    pub provider: ProviderTag,
}

impl fmt::Debug for AccountCredentials {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("AccountCredentials")
            .field("email", &self.email)
            .field("server", &self.server)
            .field("eab_kid", &self.eab_kid)
            .field("eab_hmac_key", &redacted(&self.eab_hmac_key))
            .field("hmac_id", &self.hmac_id)
            .field("hmac_key", &redacted(&self.hmac_key))
            .field("api_key", &redacted(&self.api_key))
            .field("account_id", &self.account_id)
            .field("organization_id", &self.organization_id)
            .field("provider", &self.provider)
            .finish()
    }
}

/// `{base}/accounts/{provider}/{email}/credentials.json`, 0700 dirs and 0600 files.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    base_dir: PathBuf,
}

impl CredentialStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        CredentialStore {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn provider_dir(&self, provider: ProviderTag) -> PathBuf {
        self.base_dir.join("accounts").join(provider.as_str())
    }

    fn credentials_path(&self, email: &str, provider: ProviderTag) -> PathBuf {
        self.provider_dir(provider).join(email).join(CREDENTIALS_FILE)
    }

    /// Write `creds` under its provider tag, replacing an earlier record.
    pub fn save(&self, email: &str, creds: &AccountCredentials) -> Result<PathBuf> {
        check_segment("email", email)?;
        let dir = self.provider_dir(creds.provider).join(email);
        ensure_dir(&dir, 0o700)?;
        let path = dir.join(CREDENTIALS_FILE);
        let json = serde_json::to_string_pretty(creds)?;
        write_private(&path, json.as_bytes())?;
        debug!("Saved {} account for {}", creds.provider, email);
        Ok(path)
    }

    /// Read the record for (`provider`, `email`).
    pub fn load(&self, email: &str, provider: ProviderTag) -> Result<AccountCredentials> {
        check_segment("email", email)?;
        let path = self.credentials_path(email, provider);
        let data = match fs::read_to_string(&path) {
            Ok(d) => d,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::NotFound(format!("{} account for {}", provider, email)));
            }
            Err(e) => return Err(e.into()),
        };
        let creds: AccountCredentials =
            serde_json::from_str(&data).map_err(|e| Error::Corrupt {
                path: path.display().to_string(),
                detail: e.to_string(),
            })?;
        if creds.provider != provider {
            return Err(Error::WrongProvider {
                expected: provider.to_string(),
                found: creds.provider.to_string(),
            });
        }
        Ok(creds)
    }

    /// Emails with a stored account for `provider`, sorted.
    pub fn list(&self, provider: ProviderTag) -> Result<Vec<String>> {
        let entries = match fs::read_dir(self.provider_dir(provider)) {
            Ok(e) => e,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };
        let mut emails = vec![];
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                emails.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        emails.sort();
        Ok(emails)
    }

    /// Settings for the signed REST provider from a stored DigiCert account.
    pub fn digicert_rest_config(&self, email: &str) -> Result<DigiCertConfig> {
        let creds = self.load(email, ProviderTag::DigiCert)?;
        Ok(DigiCertConfig {
            server_url: creds.server,
            hmac_id: creds.hmac_id,
            hmac_key: creds.hmac_key,
            api_key: creds.api_key,
            account_id: creds.account_id,
            organization_id: creds.organization_id,
        })
    }

    /// Settings for the EAB provider from a stored DigiCert account.
    ///
    /// The key spec is not part of the account and starts out as the default.
    pub fn digicert_eab_config(&self, email: &str) -> Result<DigiCertEabConfig> {
        let creds = self.load(email, ProviderTag::DigiCert)?;
        Ok(DigiCertEabConfig {
            server_url: creds.server,
            eab_kid: creds.eab_kid,
            eab_hmac_key: creds.eab_hmac_key,
            email: creds.email,
            key: KeySpec::default(),
        })
    }

    pub fn save_letsencrypt_account(&self, email: &str, server: &str) -> Result<PathBuf> {
        self.save(
            email,
            &AccountCredentials {
                email: email.into(),
                server: server.into(),
                provider: ProviderTag::LetsEncrypt,
                ..Default::default()
            },
        )
    }

    /// Store the credentials of the signed REST API.
    pub fn save_digicert_account(&self, email: &str, config: &DigiCertConfig) -> Result<PathBuf> {
        self.save(
            email,
            &AccountCredentials {
                email: email.into(),
                server: config.server_url.clone(),
                hmac_id: config.hmac_id.clone(),
                hmac_key: config.hmac_key.clone(),
                api_key: config.api_key.clone(),
                account_id: config.account_id.clone(),
                organization_id: config.organization_id.clone(),
                provider: ProviderTag::DigiCert,
                ..Default::default()
            },
        )
    }

    /// Store an EAB key pair for the DigiCert ACME directory.
    pub fn save_digicert_eab_account(
        &self,
        email: &str,
        server: &str,
        eab_kid: &str,
        eab_hmac_key: &str,
        account_id: &str,
        organization_id: &str,
    ) -> Result<PathBuf> {
        self.save(
            email,
            &AccountCredentials {
                email: email.into(),
                server: server.into(),
                eab_kid: eab_kid.into(),
                eab_hmac_key: eab_hmac_key.into(),
                account_id: account_id.into(),
                organization_id: organization_id.into(),
                provider: ProviderTag::DigiCert,
                ..Default::default()
            },
        )
    }
}
