#![warn(clippy::all)]
//! certkeeper issues, stores and renews TLS certificates.
//!
//! Three issuance backends are supported:
//!
//! * ACME ([Let's Encrypt](https://letsencrypt.org/) or any RFC 8555 directory)
//!   with HTTP-01 validation from a webroot.
//! * DigiCert's ACME directory, bound to a CertCentral account through an
//!   External Account Binding (EAB).
//! * The DigiCert REST API, with HMAC signed requests.
//!
//! Issued certificates are kept under a base directory (`~/.trusttls` by
//! default) next to the account credentials and the renewal configs:
//!
//! ```text
//! accounts/{provider}/{email}/credentials.json
//! live/{domain}/cert.pem|chain.pem|fullchain.pem|privkey.pem
//! archive/{domain}/{YYYYMMDD-HHMMSS}/...
//! renewal/{domain}.yaml
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use certkeeper::{AcmeOptions, AcmeProvider, Cancel, CertificateStore, Error, KeySpec};
//! use certkeeper::{default_base_dir, LETSENCRYPT_STAGING};
//! use std::path::Path;
//!
//! fn request_cert() -> Result<(), Error> {
//!
//! // Use LETSENCRYPT_STAGING for dev/testing.
//! let provider = AcmeProvider::new(AcmeOptions {
//!     email: "foo@bar.com".into(),
//!     server: LETSENCRYPT_STAGING.into(),
//!     key: KeySpec::ecdsa(256),
//! })?;
//!
//! // The challenge file is written below the webroot:
//! //
//! // /var/www/.well-known/acme-challenge/<token>
//! //
//! // It must be reachable over plain HTTP for every domain:
//! //
//! // http://myfancydomain.com/.well-known/acme-challenge/<token>
//! let cert = provider.obtain_http01(
//!     &["myfancydomain.com", "www.myfancydomain.com"],
//!     Path::new("/var/www"),
//!     &Cancel::new(),
//! )?;
//!
//! // live/myfancydomain.com/{cert,chain,fullchain,privkey}.pem
//! let store = CertificateStore::new(default_base_dir());
//! store.save("myfancydomain.com", &cert)?;
//!
//! Ok(())
//! }
//! ```
//!
//! # Renewal
//!
//! A [`RenewalConfig`] saved with the [`RenewalEngine`] is picked up by
//! [`run_all`], which renews every certificate that expires within 30 days
//! and hands the new files to the configured [`Installer`]s.
//!
//! [`run_all`]: renewal/struct.RenewalEngine.html#method.run_all
//!
//! ## Rate limits
//!
//! Let's Encrypt uses [rate limits] to ensure the API is not being abused.
//! Use the staging directory while developing.
//!
//! [rate limits]: https://letsencrypt.org/docs/rate-limits/
//!
//! ## Implementation details
//!
//! All I/O is synchronous and blocking, over [ureq](https://docs.rs/ureq/).
//! JWS signing, keys, CSRs and HMACs rely on the [openssl](https://docs.rs/openssl/)
//! crate.
#[macro_use]
extern crate log;

mod acc;
mod cert;
mod challenge;
mod clock;
mod dir;
mod error;
mod install;
mod jwt;
mod key;
mod order;
mod poll;
mod req;
mod trans;
mod util;

pub mod api;
pub mod provider;
pub mod renewal;
pub mod store;

#[cfg(test)]
mod test;

pub use crate::cert::CertificateResource;
pub use crate::challenge::Http01Responder;
pub use crate::clock::{Cancel, Clock, SystemClock};
pub use crate::dir::{LETSENCRYPT, LETSENCRYPT_STAGING};
pub use crate::error::{Error, Result};
pub use crate::install::{Installer, ServerType};
pub use crate::key::{build_csr, generate_key, key_from_pem, key_to_pem, KeyKind, KeySpec};
pub use crate::poll::{PollState, Poller};
pub use crate::provider::{
    AcmeOptions, AcmeProvider, DigiCertAcmeProvider, DigiCertConfig, DigiCertEabConfig,
    DigiCertRestProvider, Provider, ProviderKind,
};
pub use crate::renewal::{RenewalConfig, RenewalEngine, ResolveProvider, StoreResolver};
pub use crate::store::{
    default_base_dir, parse_expiry, AccountCredentials, CertPaths, CertificateStore,
    CredentialStore, ProviderTag,
};
