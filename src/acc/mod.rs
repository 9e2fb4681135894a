//
use std::sync::Arc;

use crate::api::{ApiAccount, ApiDirectory, ApiIdentifier, ApiOrder};
use crate::order::{NewOrder, Order};
use crate::req::req_expect_header;
use crate::trans::Transport;
use crate::util::read_json;
use crate::{Error, Result};

mod akey;

pub(crate) use self::akey::AcmeKey;

#[derive(Clone, Debug)]
pub(crate) struct AccountInner {
    pub transport: Transport,
    pub contact_email: String,
    pub api_account: ApiAccount,
    pub api_directory: ApiDirectory,
}

/// Registered account with an ACME provider.
///
/// Created by [`Directory::register`]. Holds the account key (with its
/// key id) used to sign every further request.
///
/// [`Directory::register`]: ../dir/struct.Directory.html#method.register
#[derive(Clone, Debug)]
pub(crate) struct Account {
    inner: Arc<AccountInner>,
}

impl Account {
    pub(crate) fn new(
        transport: Transport,
        contact_email: &str,
        api_account: ApiAccount,
        api_directory: ApiDirectory,
    ) -> Self {
        Account {
            inner: Arc::new(AccountInner {
                transport,
                contact_email: contact_email.into(),
                api_account,
                api_directory,
            }),
        }
    }

    /// Contact email for this account.
    pub fn contact_email(&self) -> &str {
        &self.inner.contact_email
    }

    /// Create a new order for `domains`. The first domain becomes the `CN`.
    ///
    /// Every call creates a new order with the ACME API provider, even when the domain
    /// names supplied are exactly the same.
    pub fn new_order(&self, domains: &[&str]) -> Result<NewOrder> {
        if domains.is_empty() {
            return Err(Error::Validation("at least one domain is required".into()));
        }
        // construct the identifiers
        let order = ApiOrder {
            identifiers: domains
                .iter()
                .map(|s| ApiIdentifier {
                    _type: "dns".into(),
                    value: s.to_string(),
                })
                .collect(),
            ..Default::default()
        };

        let new_order_url = &self.inner.api_directory.newOrder;

        let res = self.inner.transport.call(new_order_url, &order)?;
        let order_url = req_expect_header(&res, "location")?;
        let api_order: ApiOrder = read_json(res)?;

        let order = Order::new(&self.inner, api_order, order_url);
        Ok(NewOrder { order })
    }

    /// Access the underlying JSON object for debugging.
    pub fn api_account(&self) -> &ApiAccount {
        &self.inner.api_account
    }
}
