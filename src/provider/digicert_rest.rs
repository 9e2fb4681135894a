//! Certificate orders over the DigiCert REST API, authenticated with an
//! HMAC signature per request.
//!
//! Each request carries:
//!
//! ```text
//! X-DC-DEVKEY:    <api key>
//! X-DC-TIMESTAMP: 2024-01-01T00:00:00Z
//! X-DC-SIGNATURE: hex(hmac_sha256(hmac_key, "METHOD\nPATH[\nBODY]"))
//! X-DC-HMAC-ID:   <hmac id, when configured>
//! ```
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};
use url::Url;

use crate::cert::CertificateResource;
use crate::clock::{Cancel, Clock, SystemClock};
use crate::key::{build_csr, generate_key, key_to_pem, KeySpec};
use crate::poll::{PollState, Poller};
use crate::req::{new_agent, req_status_body};
use crate::util::{hmac_sha256, redacted};
use crate::{Error, Result};

/// Time between two polls of an order.
const POLL_INTERVAL: Duration = Duration::from_secs(10);
/// Polls before giving up on an order.
const POLL_ATTEMPTS: u32 = 30;
/// The REST flow always orders RSA 2048 certificates.
const REST_KEY_BITS: u32 = 2048;

/// Account settings for the REST API.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct DigiCertConfig {
    /// API base, e.g. `https://www.digicert.com/services/v2`.
    pub server_url: String,
    pub hmac_id: String,
    pub hmac_key: String,
    pub api_key: String,
    pub account_id: String,
    /// Left out of orders when empty.
    pub organization_id: String,
}

impl std::fmt::Debug for DigiCertConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("DigiCertConfig")
            .field("server_url", &self.server_url)
            .field("hmac_id", &self.hmac_id)
            .field("hmac_key", &redacted(&self.hmac_key))
            .field("api_key", &redacted(&self.api_key))
            .field("account_id", &self.account_id)
            .field("organization_id", &self.organization_id)
            .finish()
    }
}

/// Order state as reported by the API.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "String")]
pub enum OrderStatus {
    #[default]
    Pending,
    Issued,
    Failed,
    Other(String),
}

impl From<String> for OrderStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "pending" => OrderStatus::Pending,
            "issued" => OrderStatus::Issued,
            "failed" => OrderStatus::Failed,
            _ => OrderStatus::Other(s),
        }
    }
}

/// Response to a new order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DigiCertOrder {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub status: OrderStatus,
    #[serde(default)]
    pub certificate: Option<CertificateRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CertificateRef {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
}

/// One domain control validation method offered for an order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DcvMethod {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub status: String,
}

/// State of an order's certificate, with the PEMs once issued.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct DigiCertCertificate {
    #[serde(default, deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub status: OrderStatus,
    #[serde(default)]
    pub expires_at: Option<String>,
    #[serde(default)]
    pub server_cert: String,
    #[serde(default)]
    pub intermediate_cert: String,
    #[serde(default)]
    pub private_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct OrderRequest<'a> {
    certificate: CertificateRequest<'a>,
    validity_years: u32,
}

#[derive(Debug, Serialize)]
struct CertificateRequest<'a> {
    common_name: &'a str,
    dns_names: &'a [&'a str],
    signature_hash: &'static str,
    key_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    organization_id: Option<&'a str>,
    csr: &'a str,
}

/// Ids come back as numbers from some endpoints and as strings from others.
fn id_string<'de, D>(d: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as _;
    match serde_json::Value::deserialize(d)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!("invalid id: {}", other))),
    }
}

/// Client for one DigiCert REST account.
pub struct DigiCertRestProvider {
    config: DigiCertConfig,
    agent: ureq::Agent,
    clock: Arc<dyn Clock>,
}

impl DigiCertRestProvider {
    pub fn new(config: DigiCertConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// The clock stamps requests and paces polling.
    pub fn with_clock(config: DigiCertConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        if config.server_url.trim().is_empty() {
            return Err(Error::Validation("server url is required".into()));
        }
        if config.api_key.is_empty() || config.hmac_key.is_empty() {
            return Err(Error::Validation("api key and hmac key are required".into()));
        }
        Ok(DigiCertRestProvider {
            config,
            agent: new_agent(),
            clock,
        })
    }

    pub fn config(&self) -> &DigiCertConfig {
        &self.config
    }

    /// Key, order, DCV lookup and polling until the certificate is issued.
    ///
    /// Domain control validation is not automated: the HTTP token is logged
    /// and must be put in place by the operator while the order is polled.
    pub fn obtain_certificate(
        &self,
        domains: &[&str],
        cancel: &Cancel,
    ) -> Result<CertificateResource> {
        let primary = *domains
            .first()
            .ok_or_else(|| Error::Validation("at least one domain is required".into()))?;

        let pkey = generate_key(&KeySpec::rsa(REST_KEY_BITS))?;
        let csr = build_csr(primary, domains, &pkey)?;

        let order = self.create_order(domains, &csr)?;
        info!("DigiCert order {} created for {}", order.id, primary);

        self.handle_dcv(&order.id)?;

        let cert = self.wait_for_certificate(&order.id, cancel)?;
        Ok(CertificateResource::new(
            primary,
            cert.server_cert,
            cert.intermediate_cert,
            key_to_pem(&pkey)?,
        ))
    }

    /// Submit `csr_pem` for `domains`. The first domain is the common name.
    pub fn create_order(&self, domains: &[&str], csr_pem: &str) -> Result<DigiCertOrder> {
        let common_name = *domains
            .first()
            .ok_or_else(|| Error::Validation("at least one domain is required".into()))?;
        let organization_id = Some(self.config.organization_id.as_str()).filter(|s| !s.is_empty());
        let order = OrderRequest {
            certificate: CertificateRequest {
                common_name,
                dns_names: domains,
                signature_hash: "sha256",
                key_size: REST_KEY_BITS,
                organization_id,
                csr: csr_pem,
            },
            validity_years: 1,
        };
        let body = serde_json::to_string(&order)?;

        let url = self.url("certificates");
        let req = self
            .signed("POST", &url, Some(&body))?
            .set("Content-Type", "application/json");
        trace!("POST {} {}", url, body);
        let (status, res_body) = req_status_body(req.send_string(&body))?;
        if status != 201 {
            return Err(Error::network(status, res_body));
        }
        Ok(serde_json::from_str(&res_body)?)
    }

    /// Find the HTTP validation method for `order_id` and surface its token.
    pub fn handle_dcv(&self, order_id: &str) -> Result<DcvMethod> {
        let url = self.url(&format!("certificates/{}/dcv", order_id));
        let (status, body) = req_status_body(self.signed("GET", &url, None)?.call())?;
        if status != 200 {
            return Err(Error::network(status, body));
        }
        let methods: Vec<DcvMethod> = serde_json::from_str(&body)?;
        let http = methods
            .into_iter()
            .find(|m| m.kind == "http")
            .ok_or(Error::NoHttpDcv)?;
        warn!(
            "Order {} needs HTTP validation, serve token: {} (status: {})",
            order_id, http.token, http.status
        );
        Ok(http)
    }

    /// Poll `order_id` every 10 seconds, at most 30 times.
    pub fn wait_for_certificate(
        &self,
        order_id: &str,
        cancel: &Cancel,
    ) -> Result<DigiCertCertificate> {
        let poller = Poller::new(
            &*self.clock,
            cancel,
            POLL_INTERVAL,
            POLL_ATTEMPTS,
            "certificate",
        );
        poller.run(|attempt| {
            let cert = self.get_certificate(order_id)?;
            debug!(
                "Order {} is {:?} (attempt {})",
                order_id, cert.status, attempt
            );
            Ok(match cert.status {
                OrderStatus::Issued => PollState::Issued(cert),
                OrderStatus::Failed => PollState::Failed(format!("order {}", order_id)),
                _ => PollState::Pending,
            })
        })
    }

    fn get_certificate(&self, order_id: &str) -> Result<DigiCertCertificate> {
        let url = self.url(&format!("certificates/{}", order_id));
        let (status, body) = req_status_body(self.signed("GET", &url, None)?.call())?;
        if status != 200 {
            return Err(Error::network(status, body));
        }
        Ok(serde_json::from_str(&body)?)
    }

    /// Lowercase hex HMAC-SHA256 of `METHOD\nPATH`, with `\nBODY` appended
    /// when there is a body, even an empty one.
    pub fn sign_request(&self, method: &str, path: &str, body: Option<&str>) -> Result<String> {
        let data = match body {
            Some(b) => format!("{}\n{}\n{}", method, path, b),
            None => format!("{}\n{}", method, path),
        };
        let mac = hmac_sha256(self.config.hmac_key.as_bytes(), data.as_bytes())?;
        Ok(hex::encode(mac))
    }

    fn signed(&self, method: &str, url: &str, body: Option<&str>) -> Result<ureq::Request> {
        let path = Url::parse(url)
            .map_err(|e| Error::Validation(format!("invalid url {}: {}", url, e)))?
            .path()
            .to_string();
        let timestamp = rest_timestamp(self.clock.now())?;
        let signature = self.sign_request(method, &path, body)?;

        let mut req = self
            .agent
            .request(method, url)
            .set("X-DC-DEVKEY", &self.config.api_key)
            .set("X-DC-TIMESTAMP", &timestamp)
            .set("X-DC-SIGNATURE", &signature);
        if !self.config.hmac_id.is_empty() {
            req = req.set("X-DC-HMAC-ID", &self.config.hmac_id);
        }
        Ok(req)
    }

    fn url(&self, rel: &str) -> String {
        format!("{}/{}", self.config.server_url.trim_end_matches('/'), rel)
    }
}

impl std::fmt::Debug for DigiCertRestProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("DigiCertRestProvider")
            .field("server_url", &self.config.server_url)
            .field("account_id", &self.config.account_id)
            .finish()
    }
}

/// RFC 3339 in UTC with whole seconds.
fn rest_timestamp(now: OffsetDateTime) -> Result<String> {
    let fmt = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]Z");
    now.to_offset(UtcOffset::UTC)
        .format(fmt)
        .map_err(|e| Error::Validation(format!("timestamp: {}", e)))
}
