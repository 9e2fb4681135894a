//
use std::sync::Arc;

use crate::acc::{Account, AcmeKey};
use crate::api::{ApiAccount, ApiDirectory};
use crate::jwt::eab_binding;
use crate::req::{new_agent, req_expect_header, req_get, req_handle_error};
use crate::trans::{NoncePool, Transport};
use crate::util::read_json;
use crate::{Error, Result};

/// The main Let's Encrypt directory. Not appropriate for testing and dev.
pub const LETSENCRYPT: &str = "https://acme-v02.api.letsencrypt.org/directory";
/// The staging Let's Encrypt directory. Doesn't issue trusted certificates.
pub const LETSENCRYPT_STAGING: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";

/// External account binding handed out by the CA.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Eab<'a> {
    pub kid: &'a str,
    pub hmac_key: &'a str,
}

/// Entry point for accessing an ACME API.
#[derive(Clone, Debug)]
pub(crate) struct Directory {
    agent: ureq::Agent,
    nonce_pool: Arc<NoncePool>,
    api_directory: ApiDirectory,
}

impl Directory {
    /// Fetch the directory document at `url`.
    pub fn from_url(url: &str) -> Result<Directory> {
        let agent = new_agent();
        debug!("Fetch directory {}", url);
        let res = req_handle_error(req_get(&agent, url))?;
        let api_directory: ApiDirectory = read_json(res)?;
        let nonce_pool = Arc::new(NoncePool::new(&api_directory.newNonce));
        Ok(Directory {
            agent,
            nonce_pool,
            api_directory,
        })
    }

    /// Register `acme_key` as an account, agreeing to the terms of service.
    ///
    /// An account that already exists for the key is not an error: the
    /// existing account is looked up instead.
    pub fn register(&self, email: &str, acme_key: AcmeKey, eab: Option<Eab>) -> Result<Account> {
        let contact = if email.is_empty() {
            vec![]
        } else {
            vec![format!("mailto:{}", email)]
        };

        let binding = match eab {
            Some(eab) => Some(eab_binding(
                eab.kid,
                eab.hmac_key,
                &self.api_directory.newAccount,
                &acme_key,
            )?),
            None if self.api_directory.external_account_required() => {
                return Err(Error::MissingEab);
            }
            None => None,
        };

        let acc = ApiAccount {
            contact,
            termsOfServiceAgreed: Some(true),
            externalAccountBinding: binding,
            ..Default::default()
        };

        let mut transport = Transport::new(&self.nonce_pool, self.agent.clone(), acme_key);
        let res = match transport.call_jwk(&self.api_directory.newAccount, &acc) {
            Err(Error::Api(problem)) if problem.is_already_registered() => {
                info!("Account already registered: {}", problem);
                let existing = ApiAccount {
                    onlyReturnExisting: Some(true),
                    ..Default::default()
                };
                transport.call_jwk(&self.api_directory.newAccount, &existing)?
            }
            res => res?,
        };
        let kid = req_expect_header(&res, "location")?;
        debug!("Key id is: {}", kid);
        // fill in the server returned key id
        transport.set_key_id(kid);

        let api_account: ApiAccount = read_json(res)?;

        Ok(Account::new(
            transport,
            email,
            api_account,
            self.api_directory.clone(),
        ))
    }

    /// Access the underlying JSON object for debugging.
    pub fn api_directory(&self) -> &ApiDirectory {
        &self.api_directory
    }
}
