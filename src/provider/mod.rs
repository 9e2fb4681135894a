//! The issuance backends.
//!
//! * `acme-http01`: any ACME directory, HTTP-01 from a webroot.
//! * `digicert-acme-eab`: DigiCert's ACME directory with an external account
//!   binding, HTTP-01 from a webroot.
//! * `digicert-rest`: the HMAC signed REST API, validation is done by hand.
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::cert::CertificateResource;
use crate::clock::Cancel;
use crate::{Error, Result};

mod acme;
mod digicert_acme;
mod digicert_rest;

pub use self::acme::{AcmeOptions, AcmeProvider};
pub use self::digicert_acme::{DigiCertAcmeProvider, DigiCertEabConfig, DIGICERT_ACME};
pub use self::digicert_rest::{
    CertificateRef, DcvMethod, DigiCertCertificate, DigiCertConfig, DigiCertOrder,
    DigiCertRestProvider, OrderStatus,
};

/// Selects the provider for a renewal.
///
/// Besides the names below, the older `method` values `http-01` and
/// `letsencrypt` mean `acme-http01` and `digicert` means `digicert-acme-eab`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ProviderKind {
    #[default]
    AcmeHttp01,
    DigiCertRest,
    DigiCertAcmeEab,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::AcmeHttp01 => "acme-http01",
            ProviderKind::DigiCertRest => "digicert-rest",
            ProviderKind::DigiCertAcmeEab => "digicert-acme-eab",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "acme-http01" | "http-01" | "letsencrypt" => Ok(ProviderKind::AcmeHttp01),
            "digicert-rest" => Ok(ProviderKind::DigiCertRest),
            "digicert-acme-eab" | "digicert" => Ok(ProviderKind::DigiCertAcmeEab),
            other => Err(Error::UnsupportedProvider(other.to_string())),
        }
    }
}

impl TryFrom<String> for ProviderKind {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<ProviderKind> for String {
    fn from(k: ProviderKind) -> Self {
        k.as_str().to_string()
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One configured provider, ready to issue.
#[derive(Debug)]
pub enum Provider {
    /// Generic ACME, challenge files go in `webroot`.
    AcmeHttp01 {
        provider: AcmeProvider,
        webroot: PathBuf,
    },
    DigiCertRest(DigiCertRestProvider),
    DigiCertAcmeEab(DigiCertAcmeProvider),
}

impl Provider {
    pub fn kind(&self) -> ProviderKind {
        match self {
            Provider::AcmeHttp01 { .. } => ProviderKind::AcmeHttp01,
            Provider::DigiCertRest(_) => ProviderKind::DigiCertRest,
            Provider::DigiCertAcmeEab(_) => ProviderKind::DigiCertAcmeEab,
        }
    }

    /// Issue a certificate for `domains`. The first domain is the primary one.
    pub fn obtain_certificate(
        &self,
        domains: &[&str],
        cancel: &Cancel,
    ) -> Result<CertificateResource> {
        debug!("Obtain certificate for {:?} via {}", domains, self.kind());
        match self {
            Provider::AcmeHttp01 { provider, webroot } => {
                provider.obtain_http01(domains, webroot, cancel)
            }
            Provider::DigiCertRest(p) => p.obtain_certificate(domains, cancel),
            Provider::DigiCertAcmeEab(p) => p.obtain_certificate(domains, cancel),
        }
    }
}
