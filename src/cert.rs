//! Issued certificates as handed back by a provider.
use openssl::x509::X509;

use crate::{Error, Result};

/// An issued certificate with its chain and private key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateResource {
    domain: String,
    certificate: String,
    issuer_certificate: String,
    private_key: String,
}

impl CertificateResource {
    pub fn new(
        domain: impl Into<String>,
        certificate: impl Into<String>,
        issuer_certificate: impl Into<String>,
        private_key: impl Into<String>,
    ) -> Self {
        CertificateResource {
            domain: domain.into(),
            certificate: certificate.into(),
            issuer_certificate: issuer_certificate.into(),
            private_key: private_key.into(),
        }
    }

    /// Build from a `application/pem-certificate-chain` download: the
    /// first certificate is the leaf, the rest is the chain.
    pub fn from_bundle(domain: &str, bundle: &str, private_key: &str) -> Result<Self> {
        let (leaf, chain) = split_bundle(bundle)?;
        Ok(Self::new(domain, leaf, chain, private_key))
    }

    /// Primary domain the certificate was ordered for.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The PEM encoded leaf certificate.
    pub fn certificate(&self) -> &str {
        &self.certificate
    }

    /// The PEM encoded issuer chain, may be empty.
    pub fn issuer_certificate(&self) -> &str {
        &self.issuer_certificate
    }

    /// The PEM encoded private key, empty when the provider didn't make one.
    pub fn private_key(&self) -> &str {
        &self.private_key
    }

    /// Leaf followed by chain.
    pub fn full_chain(&self) -> String {
        let mut s = self.certificate.clone();
        if !s.is_empty() && !s.ends_with('\n') && !self.issuer_certificate.is_empty() {
            s.push('\n');
        }
        s.push_str(&self.issuer_certificate);
        s
    }
}

/// Split a PEM bundle into the leaf and the PEM of everything after it.
pub(crate) fn split_bundle(bundle: &str) -> Result<(String, String)> {
    let stack = X509::stack_from_pem(bundle.as_bytes())
        .map_err(|e| Error::InvalidCertificate(e.to_string()))?;
    let mut certs = stack.iter();
    let leaf = certs.next().ok_or(Error::InvalidPem)?;
    let leaf = pem_string(leaf)?;
    let mut chain = String::new();
    for cert in certs {
        chain.push_str(&pem_string(cert)?);
    }
    Ok((leaf, chain))
}

fn pem_string(cert: &X509) -> Result<String> {
    Ok(String::from_utf8_lossy(&cert.to_pem()?).into_owned())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test::cert_pem_expiring_in;

    #[test]
    fn test_split_bundle() -> Result<()> {
        let leaf = cert_pem_expiring_in("leaf", 90);
        let issuer = cert_pem_expiring_in("issuer", 365);
        let root = cert_pem_expiring_in("root", 3650);

        // blank lines and CRLF between blocks are fine
        let bundle = format!("\n{}\r\n{}{}", leaf, issuer.replace('\n', "\r\n"), root);
        let (got_leaf, chain) = split_bundle(&bundle)?;
        assert_eq!(got_leaf, leaf);
        assert_eq!(chain, format!("{}{}", issuer, root));
        Ok(())
    }

    #[test]
    fn test_split_single_block() -> Result<()> {
        let leaf = cert_pem_expiring_in("leaf", 90);
        assert_eq!(split_bundle(&leaf)?, (leaf.clone(), String::new()));
        Ok(())
    }

    #[test]
    fn test_split_errors() {
        assert!(matches!(split_bundle(""), Err(Error::InvalidPem)));
        assert!(matches!(
            split_bundle("-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n"),
            Err(Error::InvalidCertificate(_))
        ));
    }

    #[test]
    fn test_full_chain() {
        let leaf = cert_pem_expiring_in("leaf", 90);
        let issuer = cert_pem_expiring_in("issuer", 365);
        let res = CertificateResource::new("example.com", leaf.as_str(), issuer.as_str(), "");
        assert_eq!(res.full_chain(), format!("{}{}", leaf, issuer));

        let res = CertificateResource::new("example.com", leaf.trim_end(), issuer.as_str(), "");
        assert_eq!(res.full_chain(), format!("{}{}", leaf, issuer));
    }
}
