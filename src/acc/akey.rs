use openssl::bn::{BigNum, BigNumContext};
use openssl::ecdsa::EcdsaSig;
use openssl::hash::{hash, MessageDigest};
use openssl::nid::Nid;
use openssl::pkey::{Id, PKey, Private};
use openssl::sign::Signer;

use crate::jwt::Jwk;
use crate::key::{generate_key, KeySpec};
use crate::util::base64url;
use crate::{Error, Result};

/// The account key and, once registered, the key id (account URL).
#[derive(Clone, Debug)]
pub(crate) struct AcmeKey {
    private_key: PKey<Private>,
    alg: &'static str,
    /// set once we contacted the ACME API to figure out the key id
    key_id: Option<String>,
}

impl AcmeKey {
    pub(crate) fn new(spec: &KeySpec) -> Result<AcmeKey> {
        Self::from_key(generate_key(spec)?)
    }

    pub(crate) fn from_key(private_key: PKey<Private>) -> Result<AcmeKey> {
        let alg = match private_key.id() {
            Id::RSA => "RS256",
            Id::EC => match curve_of(&private_key)? {
                Nid::SECP384R1 => "ES384",
                _ => "ES256",
            },
            other => return Err(Error::UnsupportedKeyType(format!("{:?}", other))),
        };
        Ok(AcmeKey {
            private_key,
            alg,
            key_id: None,
        })
    }

    /// JWS `alg` matching the key.
    pub(crate) fn alg(&self) -> &'static str {
        self.alg
    }

    pub(crate) fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    pub(crate) fn set_key_id(&mut self, kid: String) {
        self.key_id = Some(kid)
    }

    /// Public part of the key as a JWK.
    pub(crate) fn jwk(&self) -> Result<Jwk> {
        match self.private_key.id() {
            Id::RSA => {
                let rsa = self.private_key.rsa()?;
                Ok(Jwk {
                    e: Some(base64url(&rsa.e().to_vec())),
                    kty: "RSA".into(),
                    n: Some(base64url(&rsa.n().to_vec())),
                    ..Default::default()
                })
            }
            _ => {
                let ec = self.private_key.ec_key()?;
                let (crv, size) = curve_params(ec.group().curve_name());
                let mut ctx = BigNumContext::new()?;
                let mut x = BigNum::new()?;
                let mut y = BigNum::new()?;
                ec.public_key()
                    .affine_coordinates_gfp(ec.group(), &mut x, &mut y, &mut ctx)?;
                Ok(Jwk {
                    crv: Some(crv.into()),
                    kty: "EC".into(),
                    x: Some(base64url(&x.to_vec_padded(size)?)),
                    y: Some(base64url(&y.to_vec_padded(size)?)),
                    ..Default::default()
                })
            }
        }
    }

    /// Signature over `data` in the JWS encoding for [`alg`].
    ///
    /// ECDSA signatures are the fixed width `r || s` concatenation, not DER.
    ///
    /// [`alg`]: #method.alg
    pub(crate) fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self.private_key.id() {
            Id::RSA => {
                let mut signer = Signer::new(MessageDigest::sha256(), &self.private_key)?;
                signer.update(data)?;
                Ok(signer.sign_to_vec()?)
            }
            _ => {
                let ec = self.private_key.ec_key()?;
                let (_, size) = curve_params(ec.group().curve_name());
                let md = if size == 48 {
                    MessageDigest::sha384()
                } else {
                    MessageDigest::sha256()
                };
                let digest = hash(md, data)?;
                let sig = EcdsaSig::sign(&digest, &ec)?;
                let mut v = sig.r().to_vec_padded(size)?;
                v.extend_from_slice(&sig.s().to_vec_padded(size)?);
                Ok(v)
            }
        }
    }
}

fn curve_of(key: &PKey<Private>) -> Result<Nid> {
    Ok(key
        .ec_key()?
        .group()
        .curve_name()
        .unwrap_or(Nid::X9_62_PRIME256V1))
}

/// JWK curve name and coordinate width in bytes.
fn curve_params(nid: Option<Nid>) -> (&'static str, i32) {
    match nid {
        Some(Nid::SECP384R1) => ("P-384", 48),
        _ => ("P-256", 32),
    }
}
