//! Test rig: a mock ACME server, a manual clock and certificate helpers.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mockito::{Matcher, Mock, ServerGuard};
use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::x509::{X509Builder, X509NameBuilder};
use time::macros::datetime;
use time::OffsetDateTime;

use crate::clock::Clock;
use crate::key::{generate_key, KeySpec};
use crate::util::base64url_decode;

pub const CHALLENGE_TOKEN: &str = "MUi-gqeOJdRkSb_YR2eaMxQBqf6al8dgt_dOttSWb0w";
pub const ORDER_DOMAIN: &str = "acmetest.example.com";

pub fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Clock that only moves when slept on.
pub struct ManualClock {
    start: OffsetDateTime,
    elapsed: Mutex<Duration>,
    sleeps: AtomicUsize,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::at(datetime!(2024-01-01 00:00 UTC))
    }

    pub fn at(start: OffsetDateTime) -> Self {
        ManualClock {
            start,
            elapsed: Mutex::new(Duration::ZERO),
            sleeps: AtomicUsize::new(0),
        }
    }

    /// Total time slept.
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap()
    }

    /// Number of calls to `sleep`.
    pub fn sleeps(&self) -> usize {
        self.sleeps.load(Ordering::SeqCst)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        self.start + self.elapsed()
    }
    fn sleep(&self, dur: Duration) {
        self.sleeps.fetch_add(1, Ordering::SeqCst);
        *self.elapsed.lock().unwrap() += dur;
    }
}

/// Self signed PEM certificate for `cn` expiring at `not_after`.
pub fn cert_pem(cn: &str, not_after: &Asn1Time) -> String {
    let key = generate_key(&KeySpec::ecdsa(256)).unwrap();
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_nid(Nid::COMMONNAME, cn).unwrap();
    let name = name.build();

    let mut b = X509Builder::new().unwrap();
    b.set_version(2).unwrap();
    let serial = BigNum::from_u32(1).unwrap().to_asn1_integer().unwrap();
    b.set_serial_number(&serial).unwrap();
    b.set_subject_name(&name).unwrap();
    b.set_issuer_name(&name).unwrap();
    b.set_pubkey(&key).unwrap();
    b.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
    b.set_not_after(not_after).unwrap();
    b.sign(&key, MessageDigest::sha256()).unwrap();
    String::from_utf8(b.build().to_pem().unwrap()).unwrap()
}

/// Certificate for `cn` that expires `days` from now.
pub fn cert_pem_expiring_in(cn: &str, days: u32) -> String {
    cert_pem(cn, &Asn1Time::days_from_now(days).unwrap())
}

const DIRECTORY: &str = r#"{
    "keyChange": "<URL>/acme/key-change",
    "newAccount": "<URL>/acme/new-acct",
    "newNonce": "<URL>/acme/new-nonce",
    "newOrder": "<URL>/acme/new-order",
    "revokeCert": "<URL>/acme/revoke-cert",
    "meta": {
        "caaIdentities": ["testdir.org"],
        "externalAccountRequired": <EAB>
    }
}"#;

const ACCOUNT: &str = r#"{
    "contact": ["mailto:foo@bar.com"],
    "createdAt": "2018-12-31T17:15:40.399104457Z",
    "status": "valid"
}"#;

const ORDER: &str = r#"{
    "status": "<STATUS>",
    "expires": "2019-01-09T08:26:43.570360537Z",
    "identifiers": [{"type": "dns", "value": "acmetest.example.com"}],
    "authorizations": ["<URL>/acme/authz/1"],
    "finalize": "<URL>/acme/finalize/1",
    "certificate": "<URL>/acme/cert/1"
}"#;

const AUTHZ: &str = r#"{
    "identifier": {"type": "dns", "value": "acmetest.example.com"},
    "status": "<STATUS>",
    "expires": "2019-01-09T08:26:43Z",
    "challenges": [
        {
            "type": "http-01",
            "status": "<STATUS>",
            "url": "<URL>/acme/chall/1",
            "token": "MUi-gqeOJdRkSb_YR2eaMxQBqf6al8dgt_dOttSWb0w"
        },
        {
            "type": "dns-01",
            "status": "<STATUS>",
            "url": "<URL>/acme/chall/2",
            "token": "RRo2ZcXAEqxKvMH8RGcATjSK1KknLEUmauwfQ5i3gG8"
        }
    ]
}"#;

// base64url of `{"contact":["mailt`
const PAYLOAD_NEW_ACCOUNT: &str = r#""payload":"eyJjb250YWN0IjpbIm1haWx0"#;
// base64url of `{"onlyReturnExisting":true}`
const PAYLOAD_ONLY_EXISTING: &str = r#""payload":"eyJvbmx5UmV0dXJuRXhpc3RpbmciOnRydWV9""#;

/// Mock ACME server issuing one certificate for [`ORDER_DOMAIN`].
///
/// The authorization is `pending` on the first fetch and `valid` after.
pub struct AcmeServer {
    pub dir_url: String,
    pub leaf_pem: String,
    pub issuer_pem: String,
    server: ServerGuard,
    mocks: Vec<Mock>,
    new_account: Arc<Mutex<Vec<u8>>>,
}

impl AcmeServer {
    pub fn new() -> Self {
        Self::build(false, false)
    }

    /// Directory says `externalAccountRequired`.
    pub fn eab_required() -> Self {
        Self::build(true, false)
    }

    /// newAccount refuses with `accountAlreadyExists` unless asked for the
    /// existing account.
    pub fn already_registered() -> Self {
        Self::build(false, true)
    }

    pub fn url(&self) -> String {
        self.server.url()
    }

    /// Decoded JWS payload of the last newAccount request.
    pub fn new_account_payload(&self) -> serde_json::Value {
        let body = self.new_account.lock().unwrap();
        let jws: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let payload = base64url_decode(jws["payload"].as_str().unwrap()).unwrap();
        serde_json::from_slice(&payload).unwrap()
    }

    /// Panics unless the certificate was downloaded.
    pub fn assert_downloaded(&self) {
        self.mocks.last().unwrap().assert();
    }

    fn build(eab_required: bool, already_registered: bool) -> Self {
        let mut server = mockito::Server::new();
        let url = server.url();
        let subst = |s: &str, status: &str| {
            s.replace("<URL>", &url)
                .replace("<STATUS>", status)
                .replace("<EAB>", if eab_required { "true" } else { "false" })
        };
        let mut mocks = vec![];

        mocks.push(
            server
                .mock("GET", "/directory")
                .with_header("content-type", "application/json")
                .with_body(subst(DIRECTORY, ""))
                .create(),
        );
        mocks.push(
            server
                .mock("HEAD", "/acme/new-nonce")
                .with_status(204)
                .with_header("replay-nonce", "8_uBBV3N2DBRJczhoiB46ugJKUkUHxGzVe6xIMpjHFM")
                .create(),
        );

        let acct_location = format!("{}/acme/acct/7728515", url);
        let new_account = Arc::new(Mutex::new(vec![]));
        if already_registered {
            mocks.push(
                server
                    .mock("POST", "/acme/new-acct")
                    .match_body(Matcher::Regex(PAYLOAD_NEW_ACCOUNT.into()))
                    .with_status(409)
                    .with_header("content-type", "application/problem+json")
                    .with_body(
                        r#"{"type":"urn:ietf:params:acme:error:accountAlreadyExists","detail":"account exists"}"#,
                    )
                    .create(),
            );
            mocks.push(
                server
                    .mock("POST", "/acme/new-acct")
                    .match_body(Matcher::Regex(PAYLOAD_ONLY_EXISTING.into()))
                    .with_status(200)
                    .with_header("location", &acct_location)
                    .with_body(ACCOUNT)
                    .create(),
            );
        } else {
            mocks.push(
                server
                    .mock("POST", "/acme/new-acct")
                    .with_status(201)
                    .with_header("location", &acct_location)
                    .with_body_from_request({
                        let new_account = new_account.clone();
                        move |req| {
                            *new_account.lock().unwrap() =
                                req.body().map(|b| b.to_vec()).unwrap_or_default();
                            ACCOUNT.into()
                        }
                    })
                    .create(),
            );
        }

        mocks.push(
            server
                .mock("POST", "/acme/new-order")
                .with_status(201)
                .with_header("location", &format!("{}/acme/order/1", url))
                .with_body(subst(ORDER, "pending"))
                .create(),
        );
        mocks.push(
            server
                .mock("POST", "/acme/order/1")
                .with_body(subst(ORDER, "valid"))
                .create(),
        );

        let hits = Arc::new(AtomicUsize::new(0));
        let pending = subst(AUTHZ, "pending");
        let valid = subst(AUTHZ, "valid");
        mocks.push(
            server
                .mock("POST", "/acme/authz/1")
                .with_body_from_request(move |_| {
                    if hits.fetch_add(1, Ordering::SeqCst) == 0 {
                        pending.clone().into()
                    } else {
                        valid.clone().into()
                    }
                })
                .create(),
        );
        mocks.push(
            server
                .mock("POST", "/acme/chall/1")
                .with_body(format!(
                    r#"{{"type":"http-01","status":"processing","url":"{}/acme/chall/1","token":"{}"}}"#,
                    url, CHALLENGE_TOKEN
                ))
                .create(),
        );
        mocks.push(
            server
                .mock("POST", "/acme/finalize/1")
                .with_body(subst(ORDER, "processing"))
                .create(),
        );

        let leaf_pem = cert_pem_expiring_in(ORDER_DOMAIN, 90);
        let issuer_pem = cert_pem_expiring_in("Mock Intermediate", 365);
        mocks.push(
            server
                .mock("POST", "/acme/cert/1")
                .with_header("content-type", "application/pem-certificate-chain")
                .with_body(format!("{}{}", leaf_pem, issuer_pem))
                .create(),
        );

        AcmeServer {
            dir_url: format!("{}/directory", url),
            leaf_pem,
            issuer_pem,
            server,
            mocks,
            new_account,
        }
    }
}

#[test]
pub fn test_make_directory() {
    let server = AcmeServer::new();
    let res = ureq::get(&server.dir_url).call();
    assert!(res.is_ok());
}
