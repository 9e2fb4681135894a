//! Hooks into the web server that serves a domain.
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::store::CertPaths;
use crate::Result;

/// Web server found in front of a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServerType {
    Apache,
    Nginx,
    #[default]
    Unknown,
}

impl fmt::Display for ServerType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            ServerType::Apache => "apache",
            ServerType::Nginx => "nginx",
            ServerType::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// Installs issued certificates into a web server.
///
/// Registered with the [`RenewalEngine`] under the target names used in
/// renewal configs (`apache`, `nginx`, ...).
///
/// [`RenewalEngine`]: ../renewal/struct.RenewalEngine.html
pub trait Installer {
    /// Document root serving `domain`, if the server config names one.
    fn webroot(&self, domain: &str) -> Option<PathBuf>;

    fn is_ssl_enabled(&self, domain: &str) -> bool;

    /// Config file of the virtual host for `domain` and the server owning it.
    fn detect_vhost(&self, domain: &str) -> (Option<PathBuf>, ServerType);

    /// Point the server at the live files and reload it.
    fn install(&self, domain: &str, paths: &CertPaths) -> Result<()>;
}
