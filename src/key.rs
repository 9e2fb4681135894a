//! Key pairs and certificate signing requests.
use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use openssl::ec::{Asn1Flag, EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{Id, PKey, Private};
use openssl::rsa::Rsa;
use openssl::stack::Stack;
use openssl::x509::extension::SubjectAlternativeName;
use openssl::x509::{X509NameBuilder, X509Req, X509ReqBuilder};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Smallest RSA modulus we hand out. Smaller requests are raised to this.
pub const MIN_RSA_BITS: u32 = 2048;

lazy_static! {
    pub(crate) static ref EC_GROUP_P256: EcGroup = ec_group(Nid::X9_62_PRIME256V1);
    pub(crate) static ref EC_GROUP_P384: EcGroup = ec_group(Nid::SECP384R1);
}

fn ec_group(nid: Nid) -> EcGroup {
    let mut g = EcGroup::from_curve_name(nid).expect("EcGroup");
    // this is required for openssl 1.0.x (but not 1.1.x)
    g.set_asn1_flag(Asn1Flag::NAMED_CURVE);
    g
}

/// Key algorithm family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum KeyKind {
    #[default]
    Rsa,
    Ecdsa,
}

impl FromStr for KeyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "rsa" => Ok(KeyKind::Rsa),
            "ecdsa" | "ec" => Ok(KeyKind::Ecdsa),
            other => Err(Error::UnsupportedKeyType(other.to_string())),
        }
    }
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            KeyKind::Rsa => write!(f, "rsa"),
            KeyKind::Ecdsa => write!(f, "ecdsa"),
        }
    }
}

/// Which key to generate: a family plus RSA bits or ECDSA curve bits.
///
/// A `size` of `0` means "the default for the family".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeySpec {
    pub kind: KeyKind,
    pub size: u32,
}

impl KeySpec {
    pub fn rsa(bits: u32) -> Self {
        KeySpec {
            kind: KeyKind::Rsa,
            size: bits,
        }
    }

    pub fn ecdsa(curve_bits: u32) -> Self {
        KeySpec {
            kind: KeyKind::Ecdsa,
            size: curve_bits,
        }
    }

    /// Build from the loosely typed values found in renewal configs.
    pub fn parse(kind: &str, size: u32) -> Result<Self> {
        Ok(KeySpec {
            kind: kind.parse()?,
            size,
        })
    }

    /// The size that will actually be used.
    ///
    /// RSA below 2048 (or unset) is raised to 2048. ECDSA only knows 256
    /// and 384, everything else falls back to 256.
    pub fn effective_size(&self) -> u32 {
        match self.kind {
            KeyKind::Rsa => self.size.max(MIN_RSA_BITS),
            KeyKind::Ecdsa => match self.size {
                384 => 384,
                _ => 256,
            },
        }
    }
}

/// Generate a private key (from which we can derive a public key).
pub fn generate_key(spec: &KeySpec) -> Result<PKey<Private>> {
    let bits = spec.effective_size();
    debug!("Generate {} key ({} bits)", spec.kind, bits);
    let pkey = match spec.kind {
        KeyKind::Rsa => PKey::from_rsa(Rsa::generate(bits)?)?,
        KeyKind::Ecdsa => {
            let group: &EcGroup = if bits == 384 {
                &*EC_GROUP_P384
            } else {
                &*EC_GROUP_P256
            };
            PKey::from_ec_key(EcKey::generate(group)?)?
        }
    };
    Ok(pkey)
}

pub(crate) fn create_csr(
    pkey: &PKey<Private>,
    common_name: &str,
    dns_names: &[&str],
) -> Result<X509Req> {
    //
    // the csr builder
    let mut req_bld = X509ReqBuilder::new()?;

    // set private/public key in builder
    req_bld.set_pubkey(pkey)?;

    let mut name = X509NameBuilder::new()?;
    name.append_entry_by_nid(Nid::COMMONNAME, common_name)?;
    req_bld.set_subject_name(&name.build())?;

    // set all domains as alt names
    if !dns_names.is_empty() {
        let mut stack = Stack::new()?;
        let ctx = req_bld.x509v3_context(None);
        let mut an = SubjectAlternativeName::new();
        for name in dns_names {
            an.dns(name);
        }
        let ext = an.build(&ctx)?;
        stack.push(ext)?;
        req_bld.add_extensions(&stack)?;
    }

    // sign it
    req_bld.sign(pkey, MessageDigest::sha256())?;

    Ok(req_bld.build())
}

/// PEM encoded PKCS#10 request for `common_name` with every name in
/// `dns_names` as a subject alternative name, signed with SHA-256.
pub fn build_csr(common_name: &str, dns_names: &[&str], key: &PKey<Private>) -> Result<String> {
    let csr = create_csr(key, common_name, dns_names)?;
    Ok(String::from_utf8_lossy(&csr.to_pem()?).into_owned())
}

/// Traditional PEM for a private key: `RSA PRIVATE KEY` (PKCS#1) or
/// `EC PRIVATE KEY` (SEC1).
pub fn key_to_pem(key: &PKey<Private>) -> Result<String> {
    let pem = match key.id() {
        Id::RSA => key.rsa()?.private_key_to_pem()?,
        Id::EC => key.ec_key()?.private_key_to_pem()?,
        other => return Err(Error::UnsupportedKeyType(format!("{:?}", other))),
    };
    Ok(String::from_utf8_lossy(&pem).into_owned())
}

/// Read back a key written by [`key_to_pem`] (or any PKCS#8 key).
pub fn key_from_pem(pem: &str) -> Result<PKey<Private>> {
    Ok(PKey::private_key_from_pem(pem.as_bytes())?)
}
