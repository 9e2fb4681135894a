//! HTTP-01 challenge files under a web server's document root.
use std::fs;
use std::io;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};

use crate::{Error, Result};

const CHALLENGE_DIR: &str = ".well-known/acme-challenge";

/// Places `{webroot}/.well-known/acme-challenge/{token}` files for the CA to fetch.
#[derive(Debug, Clone, Default)]
pub struct Http01Responder {
    webroot: Option<PathBuf>,
}

impl Http01Responder {
    pub fn new(webroot: impl Into<PathBuf>) -> Self {
        let webroot = webroot.into();
        Http01Responder {
            webroot: if webroot.as_os_str().is_empty() {
                None
            } else {
                Some(webroot)
            },
        }
    }

    /// A responder without a root. Every [`present`] fails until replaced.
    ///
    /// [`present`]: #method.present
    pub fn unbound() -> Self {
        Self::default()
    }

    pub fn webroot(&self) -> Option<&Path> {
        self.webroot.as_deref()
    }

    fn token_path(&self, token: &str) -> Result<PathBuf> {
        let root = self.webroot.as_ref().ok_or(Error::EmptyWebroot)?;
        if token.is_empty() || token.contains('/') || token.contains("..") {
            return Err(Error::Validation(format!("bad challenge token: {:?}", token)));
        }
        Ok(root.join(CHALLENGE_DIR).join(token))
    }

    /// Write `key_authorization` as the challenge file for `token`.
    ///
    /// Directories are created 0755 and the file 0644 so the web server can read them.
    pub fn present(&self, token: &str, key_authorization: &str) -> Result<()> {
        let path = self.token_path(token)?;
        if let Some(dir) = path.parent() {
            fs::DirBuilder::new()
                .recursive(true)
                .mode(0o755)
                .create(dir)?;
        }
        fs::write(&path, key_authorization)?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644))?;
        debug!("Challenge file written: {}", path.display());
        Ok(())
    }

    /// Remove the challenge file for `token`. A missing file is fine.
    pub fn clean_up(&self, token: &str) -> Result<()> {
        let path = self.token_path(token)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Challenge file removed: {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!("Failed to remove {}: {}", path.display(), e);
                Ok(())
            }
        }
    }
}
