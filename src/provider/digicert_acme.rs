//! DigiCert's ACME directory, which requires an external account binding.
use std::path::PathBuf;
use std::sync::Arc;

use crate::acc::{Account, AcmeKey};
use crate::cert::CertificateResource;
use crate::challenge::Http01Responder;
use crate::clock::{Cancel, Clock, SystemClock};
use crate::dir::{Directory, Eab};
use crate::key::KeySpec;
use crate::provider::acme::issue;
use crate::util::redacted;
use crate::{Error, Result};

/// Default DigiCert ACME directory.
pub const DIGICERT_ACME: &str = "https://acme.digicert.com/v2/acme/directory/";

/// Settings for [`DigiCertAcmeProvider::new`].
#[derive(Clone, PartialEq, Eq, Default)]
pub struct DigiCertEabConfig {
    /// Directory URL, [`DIGICERT_ACME`] when empty.
    pub server_url: String,
    pub eab_kid: String,
    /// base64url, as handed out by CertCentral.
    pub eab_hmac_key: String,
    pub email: String,
    pub key: KeySpec,
}

impl std::fmt::Debug for DigiCertEabConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("DigiCertEabConfig")
            .field("server_url", &self.server_url)
            .field("eab_kid", &self.eab_kid)
            .field("eab_hmac_key", &redacted(&self.eab_hmac_key))
            .field("email", &self.email)
            .field("key", &self.key)
            .finish()
    }
}

/// ACME account bound to a DigiCert account through EAB.
pub struct DigiCertAcmeProvider {
    account: Account,
    responder: Http01Responder,
    key: KeySpec,
    clock: Arc<dyn Clock>,
}

impl DigiCertAcmeProvider {
    pub fn new(config: DigiCertEabConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Register (or look up) the account bound to `config.eab_kid`.
    ///
    /// No webroot is known yet, call [`set_webroot`] before ordering.
    ///
    /// [`set_webroot`]: #method.set_webroot
    pub fn with_clock(config: DigiCertEabConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        if config.eab_kid.is_empty() || config.eab_hmac_key.is_empty() {
            return Err(Error::MissingEab);
        }
        let server = if config.server_url.is_empty() {
            DIGICERT_ACME
        } else {
            config.server_url.as_str()
        };

        let acme_key = AcmeKey::new(&config.key)?;
        let dir = Directory::from_url(server)?;
        if !dir.api_directory().external_account_required() {
            debug!("Directory {} does not require EAB, binding anyway", server);
        }
        let eab = Eab {
            kid: &config.eab_kid,
            hmac_key: &config.eab_hmac_key,
        };
        let account = dir.register(&config.email, acme_key, Some(eab))?;
        info!("Registered DigiCert ACME account for kid {}", config.eab_kid);

        Ok(DigiCertAcmeProvider {
            account,
            responder: Http01Responder::unbound(),
            key: config.key,
            clock,
        })
    }

    /// Serve HTTP-01 challenges from `webroot`.
    pub fn set_webroot(&mut self, webroot: impl Into<PathBuf>) {
        self.responder = Http01Responder::new(webroot);
    }

    pub fn obtain_certificate(
        &self,
        domains: &[&str],
        cancel: &Cancel,
    ) -> Result<CertificateResource> {
        issue(
            &self.account,
            &self.responder,
            &self.key,
            domains,
            &*self.clock,
            cancel,
        )
    }
}

impl std::fmt::Debug for DigiCertAcmeProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("DigiCertAcmeProvider")
            .field("email", &self.account.contact_email())
            .field("webroot", &self.responder.webroot())
            .finish()
    }
}
