//
use std::sync::Arc;

use crate::acc::AccountInner;
use crate::api::{ApiAuth, ApiChallenge, ApiEmptyObject, ApiEmptyString};
use crate::clock::{Cancel, Clock};
use crate::jwt::key_authorization;
use crate::order::{ACME_POLL_ATTEMPTS, ACME_POLL_INTERVAL};
use crate::poll::{PollState, Poller};
use crate::util::read_json;
use crate::{Error, Result};

/// An authorization ([ownership proof]) for a domain name.
///
/// Each authorization for an order must be progressed to a valid state before the ACME API
/// will issue a certificate. Only the HTTP-01 proof is supported: a text file served from
/// the web server of the domain being authorized.
///
/// [ownership proof]: https://tools.ietf.org/html/rfc8555#section-7.5
#[derive(Debug)]
pub(crate) struct Auth {
    inner: Arc<AccountInner>,
    api_auth: ApiAuth,
    auth_url: String,
}

impl Auth {
    pub(crate) fn new(inner: &Arc<AccountInner>, api_auth: ApiAuth, auth_url: &str) -> Self {
        Auth {
            inner: inner.clone(),
            api_auth,
            auth_url: auth_url.into(),
        }
    }

    /// Domain name for this authorization.
    pub fn domain_name(&self) -> &str {
        &self.api_auth.identifier.value
    }

    /// Whether we actually need to do the authorization. This might not be needed if we have
    /// proven ownership of the domain recently in a previous order.
    pub fn need_challenge(&self) -> bool {
        !self.api_auth.is_status_valid()
    }

    /// Get the http challenge.
    ///
    /// The http challenge must be placed so it is accessible under:
    ///
    /// ```text
    /// http://<domain-to-be-proven>/.well-known/acme-challenge/<token>
    /// ```
    pub fn http_challenge(&self) -> Result<Challenge> {
        self.api_auth
            .http_challenge()
            .map(|c| Challenge::new(&self.inner, c.clone(), &self.auth_url))
            .ok_or_else(|| {
                Error::Protocol(format!("no http-01 challenge for {}", self.domain_name()))
            })
    }
}

/// An HTTP-01 challenge as obtained from the [`Auth`].
///
/// [`Auth`]: struct.Auth.html
pub(crate) struct Challenge {
    inner: Arc<AccountInner>,
    api_challenge: ApiChallenge,
    auth_url: String,
}

impl Challenge {
    fn new(inner: &Arc<AccountInner>, api_challenge: ApiChallenge, auth_url: &str) -> Self {
        Challenge {
            inner: inner.clone(),
            api_challenge,
            auth_url: auth_url.into(),
        }
    }

    /// The `token` is a unique identifier of the challenge. It is the file name in the
    /// http challenge.
    pub fn http_token(&self) -> &str {
        &self.api_challenge.token
    }

    /// The `proof` is the text content placed in the file named by `token`.
    pub fn http_proof(&self) -> Result<String> {
        let acme_key = self.inner.transport.acme_key();
        key_authorization(&self.api_challenge.token, acme_key)
    }

    /// Tell the ACME API to attempt validating the proof of this challenge, then
    /// poll the authorization until it leaves `pending`.
    ///
    /// The proof must be in place before calling this.
    pub fn validate(self, clock: &dyn Clock, cancel: &Cancel) -> Result<()> {
        let url_chall = &self.api_challenge.url;
        let res = self.inner.transport.call(url_chall, &ApiEmptyObject)?;
        let _: ApiChallenge = read_json(res)?;

        let poller = Poller::new(
            clock,
            cancel,
            ACME_POLL_INTERVAL,
            ACME_POLL_ATTEMPTS,
            "authorization",
        );
        poller.run(|_| {
            let res = self.inner.transport.call(&self.auth_url, &ApiEmptyString)?;
            let auth: ApiAuth = read_json(res)?;
            Ok(if auth.is_status_pending() {
                PollState::Pending
            } else if auth.is_status_valid() {
                PollState::Issued(())
            } else {
                PollState::Failed(auth_failure(&auth))
            })
        })
    }
}

fn auth_failure(auth: &ApiAuth) -> String {
    let error = auth.challenges.iter().find_map(|c| c.error.as_ref());
    if let Some(error) = error {
        format!(
            "validation of {} failed: {}",
            auth.identifier.value,
            error.detail.clone().unwrap_or_else(|| error._type.clone())
        )
    } else {
        format!(
            "validation of {} failed and no error found",
            auth.identifier.value
        )
    }
}
