//! On-disk persistence of account credentials and certificates.
//!
//! ```text
//! {base}/accounts/{provider}/{email}/credentials.json
//! {base}/live/{domain}/cert.pem|chain.pem|fullchain.pem|privkey.pem
//! {base}/archive/{domain}/{YYYYMMDD-HHMMSS}/...
//! {base}/renewal/{domain}.yaml
//! ```
use std::fs;
use std::io::Write;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};

use crate::{Error, Result};

mod accounts;
mod certs;

pub use self::accounts::{AccountCredentials, CredentialStore, ProviderTag};
pub use self::certs::{parse_expiry, CertPaths, CertificateStore};

const FALLBACK_BASE_DIR: &str = "/var/lib/trusttls";

/// `$HOME/.trusttls`, or `/var/lib/trusttls` when there is no home directory.
pub fn default_base_dir() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(".trusttls"),
        None => PathBuf::from(FALLBACK_BASE_DIR),
    }
}

/// Create `dir` (and parents) and force `mode` on it, also when it existed.
pub(crate) fn ensure_dir(dir: &Path, mode: u32) -> Result<()> {
    fs::DirBuilder::new().recursive(true).mode(mode).create(dir)?;
    fs::set_permissions(dir, fs::Permissions::from_mode(mode))?;
    Ok(())
}

/// Write a file only the owner can read, replacing any previous content.
pub(crate) fn write_private(path: &Path, value: &[u8]) -> Result<()> {
    let mut f = fs::File::create(path)?;
    let mut permissions = f.metadata()?.permissions();
    permissions.set_mode(0o600);
    f.set_permissions(permissions)?;
    f.write_all(value).map_err(Error::from)
}

/// Path segments come from domains and emails. Keep them inside the base dir.
pub(crate) fn check_segment(what: &str, s: &str) -> Result<()> {
    if s.is_empty() {
        return Err(Error::Validation(format!("{} is required", what)));
    }
    if s.contains('/') || s.contains('\\') || s == "." || s == ".." {
        return Err(Error::Validation(format!("invalid {}: {:?}", what, s)));
    }
    Ok(())
}
