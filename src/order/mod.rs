//! Order life cycle.
//!
//! An order goes through a life cycle of different states that require various actions by
//! the caller. Simple façade structs wrap the actual [`ApiOrder`] so only the
//! appropriate actions are reachable.
//!
//! 1. First prove ownership:
//!    * [`NewOrder`] -> [`Auth`]* -> `Challenge`
//! 2. Then submit CSR and download the cert.
//!    * [`NewOrder`] -> [`CsrOrder`] -> [`CertOrder`]
//!
//! \* Possibly multiple auths.
//!
//! [`ApiOrder`]: ../api/struct.ApiOrder.html
use openssl::pkey::{PKey, Private};
use std::sync::Arc;
use std::time::Duration;

use crate::acc::AccountInner;
use crate::api::{ApiAuth, ApiEmptyString, ApiFinalize, ApiOrder};
use crate::cert::CertificateResource;
use crate::clock::{Cancel, Clock};
use crate::key::{create_csr, key_to_pem};
use crate::poll::{PollState, Poller};
use crate::req::req_safe_read_body;
use crate::util::{base64url, read_json};
use crate::{Error, Result};

mod auth;

pub(crate) use self::auth::Auth;

/// Time between two polls of an order or authorization.
pub(crate) const ACME_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Polls before giving up on an order or authorization.
pub(crate) const ACME_POLL_ATTEMPTS: u32 = 60;

/// The order wrapped with an outer façade.
#[derive(Debug)]
pub(crate) struct Order {
    inner: Arc<AccountInner>,
    api_order: ApiOrder,
    url: String,
}

impl Order {
    pub(crate) fn new(inner: &Arc<AccountInner>, api_order: ApiOrder, url: String) -> Self {
        Order {
            inner: inner.clone(),
            api_order,
            url,
        }
    }
}

/// Helper to refresh an order status (POST-as-GET).
pub(crate) fn refresh_order(inner: &Arc<AccountInner>, url: String) -> Result<Order> {
    let res = inner.transport.call(&url, &ApiEmptyString)?;
    let api_order: ApiOrder = read_json(res)?;
    Ok(Order {
        inner: inner.clone(),
        api_order,
        url,
    })
}

/// A new order created by [`Account::new_order`].
///
/// All domains in the order must have authorizations before the order can
/// progress to submitting a CSR. The ACME API provider might "remember" a
/// previous authorization, in which case there is nothing to prove.
///
/// [`Account::new_order`]: ../acc/struct.Account.html#method.new_order
#[derive(Debug)]
pub(crate) struct NewOrder {
    pub(crate) order: Order,
}

impl NewOrder {
    /// Tell if the domains in this order have been authorized.
    ///
    /// In ACME API terms, the order can either be `ready` or `valid`, which both would
    /// mean we have passed the authorization stage.
    pub fn is_validated(&self) -> bool {
        self.order.api_order.is_status_ready() || self.order.api_order.is_status_valid()
    }

    /// If the order [`is_validated`] progress it to a [`CsrOrder`].
    ///
    /// This doesn't do any calls against the API. You must manually call [`refresh`].
    ///
    /// [`is_validated`]: struct.NewOrder.html#method.is_validated
    /// [`refresh`]: struct.NewOrder.html#method.refresh
    pub fn confirm_validations(&self) -> Option<CsrOrder> {
        if self.is_validated() {
            Some(CsrOrder {
                order: Order::new(
                    &self.order.inner,
                    self.order.api_order.clone(),
                    self.order.url.clone(),
                ),
            })
        } else {
            None
        }
    }

    /// Refresh the order state against the ACME API.
    pub fn refresh(&mut self) -> Result<()> {
        let order = refresh_order(&self.order.inner, self.order.url.clone())?;
        if order.api_order.is_status_invalid() {
            return Err(Error::IssuanceFailed(order_failure(&order.api_order)));
        }
        self.order = order;
        Ok(())
    }

    /// One authorization per domain in the order, possibly a mix of already
    /// valid and not yet valid ones.
    pub fn authorizations(&self) -> Result<Vec<Auth>> {
        let mut result = vec![];
        if let Some(authorizations) = &self.order.api_order.authorizations {
            for auth_url in authorizations {
                let res = self.order.inner.transport.call(auth_url, &ApiEmptyString)?;
                let api_auth: ApiAuth = read_json(res)?;
                result.push(Auth::new(&self.order.inner, api_auth, auth_url));
            }
        }
        Ok(result)
    }

    /// Access the underlying JSON object for debugging.
    pub fn api_order(&self) -> &ApiOrder {
        &self.order.api_order
    }
}

/// An order that is ready for a CSR submission ("finalizing").
#[derive(Debug)]
pub(crate) struct CsrOrder {
    pub(crate) order: Order,
}

impl CsrOrder {
    /// Create the CSR for the domains in the order and submit it.
    ///
    /// The first domain of the order is the `CN`, all of them go in the SAN.
    /// Once submitted, the order is polled until it leaves `processing`.
    pub fn finalize_pkey(
        self,
        private_key: PKey<Private>,
        clock: &dyn Clock,
        cancel: &Cancel,
    ) -> Result<CertOrder> {
        //
        // the domains that we have authorized
        let domains = self.order.api_order.domains();
        let primary = domains
            .first()
            .ok_or_else(|| Error::Protocol("order has no identifiers".into()))?;

        // csr from private key and authorized domains.
        let csr = create_csr(&private_key, primary, &domains)?;

        // this is not the same as PEM.
        let csr_der = csr.to_der()?;
        let csr_enc = base64url(&csr_der);
        let finalize = ApiFinalize { csr: csr_enc };

        let inner = self.order.inner;
        let order_url = self.order.url;
        let finalize_url = &self.order.api_order.finalize;

        // if the CSR is invalid, we will get a 4xx code back.
        inner.transport.call(finalize_url, &finalize)?;

        // wait for the status to not be processing.
        // valid -> cert is issued
        // invalid -> the whole thing is off
        let poller = Poller::new(clock, cancel, ACME_POLL_INTERVAL, ACME_POLL_ATTEMPTS, "order");
        let order = poller.run(|_| {
            let order = refresh_order(&inner, order_url.clone())?;
            let api = &order.api_order;
            Ok(if api.is_status_valid() {
                PollState::Issued(order)
            } else if api.is_status_invalid() {
                PollState::Failed(order_failure(api))
            } else {
                PollState::Pending
            })
        })?;

        Ok(CertOrder { private_key, order })
    }
}

/// Order for an issued certificate that is ready to download.
#[derive(Debug)]
pub(crate) struct CertOrder {
    private_key: PKey<Private>,
    order: Order,
}

impl CertOrder {
    /// Download the issued bundle and pair it with the private key.
    pub fn download_cert(self) -> Result<CertificateResource> {
        let api_order = &self.order.api_order;
        let primary_name = api_order
            .domains()
            .first()
            .map(|d| d.to_string())
            .unwrap_or_default();
        let url = api_order
            .certificate
            .as_deref()
            .ok_or_else(|| Error::Protocol("valid order without certificate url".into()))?;

        let res = self.order.inner.transport.call(url, &ApiEmptyString)?;
        let bundle = req_safe_read_body(res);
        debug!("Downloaded certificate for {}", primary_name);

        let pkey_pem = key_to_pem(&self.private_key)?;
        CertificateResource::from_bundle(&primary_name, &bundle, &pkey_pem)
    }
}

fn order_failure(api_order: &ApiOrder) -> String {
    match &api_order.error {
        Some(problem) => problem.to_string(),
        None => format!("order is in status: {:?}", api_order.status),
    }
}
