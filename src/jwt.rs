use openssl::sha::sha256;
use serde::{Deserialize, Serialize};

use crate::acc::AcmeKey;
use crate::util::{base64url, base64url_decode, hmac_sha256};
use crate::{Error, Result};

#[derive(Debug, Serialize, Deserialize, Default)]
pub(crate) struct JwsProtected {
    alg: String,
    url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    nonce: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    jwk: Option<Jwk>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kid: Option<String>,
}

impl JwsProtected {
    pub(crate) fn new_jwk(jwk: Jwk, alg: &str, url: &str, nonce: String) -> Self {
        JwsProtected {
            alg: alg.into(),
            url: url.into(),
            nonce: Some(nonce),
            jwk: Some(jwk),
            ..Default::default()
        }
    }
    pub(crate) fn new_kid(kid: &str, alg: &str, url: &str, nonce: String) -> Self {
        JwsProtected {
            alg: alg.into(),
            url: url.into(),
            nonce: Some(nonce),
            kid: Some(kid.into()),
            ..Default::default()
        }
    }
}

/// Public key in JWK form.
///
/// Only the required members are kept, in lexical order, so the JSON
/// serialization doubles as the RFC 7638 thumbprint input.
// LEXICAL ORDER OF FIELDS MATTER!
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub(crate) struct Jwk {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    pub kty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

impl Jwk {
    pub(crate) fn thumbprint(&self) -> Result<String> {
        let jwk_json = serde_json::to_string(self)?;
        Ok(base64url(&sha256(jwk_json.as_bytes())))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Jws {
    protected: String,
    payload: String,
    signature: String,
}

impl Jws {
    fn new(protected: String, payload: String, signature: String) -> Self {
        Jws {
            protected,
            payload,
            signature,
        }
    }
}

pub(crate) fn jws_with_kid<T: Serialize + ?Sized>(
    url: &str,
    nonce: String,
    key: &AcmeKey,
    payload: &T,
) -> Result<String> {
    let kid = key
        .key_id()
        .ok_or_else(|| Error::Protocol("account key id not set".into()))?;
    let protected = JwsProtected::new_kid(kid, key.alg(), url, nonce);
    jws_with(protected, key, payload)
}

pub(crate) fn jws_with_jwk<T: Serialize + ?Sized>(
    url: &str,
    nonce: String,
    key: &AcmeKey,
    payload: &T,
) -> Result<String> {
    let protected = JwsProtected::new_jwk(key.jwk()?, key.alg(), url, nonce);
    jws_with(protected, key, payload)
}

fn jws_with<T: Serialize + ?Sized>(
    protected: JwsProtected,
    key: &AcmeKey,
    payload: &T,
) -> Result<String> {
    let protected = {
        let pro_json = serde_json::to_string(&protected)?;
        base64url(pro_json.as_bytes())
    };
    let payload = {
        let pay_json = serde_json::to_string(payload)?;
        if pay_json == "\"\"" {
            // This is a special case produced by ApiEmptyString and should
            // not be further base64url encoded.
            "".to_string()
        } else {
            base64url(pay_json.as_bytes())
        }
    };

    let to_sign = format!("{}.{}", protected, payload);
    let signature = base64url(&key.sign(to_sign.as_bytes())?);

    let jws = Jws::new(protected, payload, signature);

    Ok(serde_json::to_string(&jws)?)
}

/// The `externalAccountBinding` member of a newAccount request (RFC 8555 7.3.4).
///
/// A HS256 JWS over the account JWK, keyed with the CA issued MAC key.
pub(crate) fn eab_binding(
    eab_kid: &str,
    eab_hmac_key: &str,
    new_account_url: &str,
    key: &AcmeKey,
) -> Result<serde_json::Value> {
    let mac_key = base64url_decode(eab_hmac_key)?;
    let protected = JwsProtected {
        alg: "HS256".into(),
        url: new_account_url.into(),
        kid: Some(eab_kid.into()),
        ..Default::default()
    };
    let protected = base64url(serde_json::to_string(&protected)?.as_bytes());
    let payload = base64url(serde_json::to_string(&key.jwk()?)?.as_bytes());
    let to_sign = format!("{}.{}", protected, payload);
    let signature = base64url(&hmac_sha256(&mac_key, to_sign.as_bytes())?);
    Ok(serde_json::to_value(Jws::new(protected, payload, signature))?)
}

/// `token.thumbprint`, the content served for an HTTP-01 challenge.
pub(crate) fn key_authorization(token: &str, key: &AcmeKey) -> Result<String> {
    Ok(format!("{}.{}", token, key.jwk()?.thumbprint()?))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::key::KeySpec;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    #[test]
    fn test_rfc7638_thumbprint() {
        // RFC 7638 section 3.1 example key
        let jwk = Jwk {
            e: Some("AQAB".into()),
            kty: "RSA".into(),
            n: Some("0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4cbbfAAtVT86zwu1RK7aPFFxuhDR1L6tSoc_BJECPebWKRXjBZCiFV4n3oknjhMstn64tZ_2W-5JsGY4Hc5n9yBXArwl93lqt7_RN5w6Cf0h4QyQ5v-65YGjQR0_FDW2QvzqY368QQMicAtaSqzs8KJZgnYb9c7d0zgdAZHzu6qMQvRL5hajrn1n91CbOpbISD08qNLyrdkt-bFTWhAI4vMQFh6WeZu0fM4lFd2NcRwr3XPksINHaQ-G_xBniIqbw0Ls1jF44-csFCur-kEgU8awapJzKnqDKgw".into()),
            ..Default::default()
        };
        assert_eq!(
            jwk.thumbprint().unwrap(),
            "NzbLsXh8uDCcd-6MNwXF4W_7noWXFZAfHkxZsRGC9Xs"
        );
    }

    #[test]
    fn test_eab_binding_shape() {
        let mut key = AcmeKey::new(&KeySpec::ecdsa(256)).unwrap();
        key.set_key_id("ignored".into());
        let secret = base64url(b"0123456789abcdef0123456789abcdef");
        let v = eab_binding("kid-1", &secret, "https://ca/new-acct", &key).unwrap();

        let protected = URL_SAFE_NO_PAD
            .decode(v["protected"].as_str().unwrap())
            .unwrap();
        let protected: serde_json::Value = serde_json::from_slice(&protected).unwrap();
        assert_eq!(protected["alg"], "HS256");
        assert_eq!(protected["kid"], "kid-1");
        assert_eq!(protected["url"], "https://ca/new-acct");
        assert!(protected.get("nonce").is_none());

        let payload = URL_SAFE_NO_PAD
            .decode(v["payload"].as_str().unwrap())
            .unwrap();
        let jwk: Jwk = serde_json::from_slice(&payload).unwrap();
        assert_eq!(jwk, key.jwk().unwrap());

        let to_sign = format!(
            "{}.{}",
            v["protected"].as_str().unwrap(),
            v["payload"].as_str().unwrap()
        );
        let mac = hmac_sha256(b"0123456789abcdef0123456789abcdef", to_sign.as_bytes()).unwrap();
        assert_eq!(v["signature"].as_str().unwrap(), base64url(&mac));
    }

    #[test]
    fn test_jws_without_kid_is_an_error() {
        let key = AcmeKey::new(&KeySpec::ecdsa(256)).unwrap();
        assert!(jws_with_kid("https://ca/x", "n".into(), &key, "").is_err());
    }
}
