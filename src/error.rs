//
use std::io;

use crate::api::ApiProblem;

/// certkeeper result.
pub type Result<T> = ::std::result::Result<T, Error>;

/// certkeeper errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required input (domain, email, credential) is missing or malformed.
    #[error("{0}")]
    Validation(String),
    /// An HTTP-01 responder was used without a webroot.
    #[error("webroot is empty")]
    EmptyWebroot,
    /// A stored record does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// A stored record exists but can't be parsed.
    #[error("corrupt record {path}: {detail}")]
    Corrupt { path: String, detail: String },
    /// Stored credentials belong to another provider.
    #[error("account is not a {expected} account (stored provider: {found})")]
    WrongProvider { expected: String, found: String },
    /// Transport failure or unexpected HTTP status.
    #[error("{}", network_message(.status, .detail))]
    Network { status: Option<u16>, detail: String },
    /// The ACME API answered with a problem document.
    #[error("{0}")]
    Api(ApiProblem),
    /// The remote side did not follow the expected protocol.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// A DigiCert order offered no HTTP DCV method.
    #[error("HTTP DCV method not available")]
    NoHttpDcv,
    /// EAB key id or HMAC secret missing.
    #[error("EAB KID and HMAC key required")]
    MissingEab,
    /// The provider/method selector is not one we know.
    #[error("unsupported provider: {0}")]
    UnsupportedProvider(String),
    /// The remote marked the order as failed.
    #[error("certificate issuance failed: {0}")]
    IssuanceFailed(String),
    /// A polling loop or deadline ran out.
    #[error("timeout waiting for {0}")]
    Timeout(String),
    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,
    #[error("unsupported key type: {0}")]
    UnsupportedKeyType(String),
    #[error("no PEM block found")]
    InvalidPem,
    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),
    /// openssl failure.
    #[error("openssl: {0}")]
    Crypto(#[from] openssl::error::ErrorStack),
    /// std::io error.
    #[error("{0}")]
    Io(#[from] io::Error),
    /// JSON serialization/deserialization error.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    /// YAML serialization/deserialization error.
    #[error("{0}")]
    Yaml(#[from] serde_yaml::Error),
    /// One or more domains failed during a renewal run.
    #[error("some renewals failed: {}", join_failures(.0))]
    RenewalFailed(Vec<(String, String)>),
}

impl Error {
    pub(crate) fn network(status: u16, body: impl Into<String>) -> Self {
        Error::Network {
            status: Some(status),
            detail: body.into(),
        }
    }

    /// Domains listed in a [`Error::RenewalFailed`], empty for any other error.
    pub fn failed_domains(&self) -> Vec<&str> {
        match self {
            Error::RenewalFailed(v) => v.iter().map(|(d, _)| d.as_str()).collect(),
            _ => vec![],
        }
    }
}

impl From<ApiProblem> for Error {
    fn from(p: ApiProblem) -> Self {
        Error::Api(p)
    }
}

fn network_message(status: &Option<u16>, detail: &str) -> String {
    match status {
        Some(s) => format!("unexpected status code: {}, body: {}", s, detail),
        None => format!("network error: {}", detail),
    }
}

fn join_failures(v: &[(String, String)]) -> String {
    v.iter()
        .map(|(d, e)| format!("{}: {}", d, e))
        .collect::<Vec<_>>()
        .join("; ")
}
