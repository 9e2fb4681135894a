//! Unattended renewal of every domain with a saved renewal config.
//!
//! Configs live in `{base}/renewal/{domain}.yaml`:
//!
//! ```yaml
//! domain: www.example.com
//! email: ops@example.com
//! server: https://acme-v02.api.letsencrypt.org/directory
//! provider: acme-http01
//! webroot: /var/www/html
//! key_type: ecdsa
//! key_size: 256
//! targets:
//!   - nginx
//! base_dir: /root/.trusttls
//! ```
//!
//! The older `method` key is read as `provider`.
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::clock::{Cancel, Clock, SystemClock};
use crate::install::Installer;
use crate::key::KeySpec;
use crate::provider::{
    AcmeOptions, AcmeProvider, DigiCertAcmeProvider, DigiCertRestProvider, Provider, ProviderKind,
};
use crate::store::{check_segment, ensure_dir, write_private, CertificateStore, CredentialStore};
use crate::{Error, Result, LETSENCRYPT};

const RENEWAL_DIR: &str = "renewal";
const CONFIG_EXT: &str = "yaml";

/// Renew when the certificate expires sooner than this.
pub const RENEW_BEFORE_DAYS: i64 = 30;

/// How to renew one domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RenewalConfig {
    pub domain: String,
    #[serde(default)]
    pub email: String,
    /// ACME directory or REST base URL. Empty means the provider default.
    #[serde(default)]
    pub server: String,
    #[serde(default, alias = "method")]
    pub provider: ProviderKind,
    #[serde(default)]
    pub webroot: String,
    #[serde(default)]
    pub key_type: String,
    #[serde(default)]
    pub key_size: u32,
    /// Installer names to run after a renewal.
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default)]
    pub base_dir: PathBuf,
}

impl RenewalConfig {
    pub fn key_spec(&self) -> Result<KeySpec> {
        KeySpec::parse(&self.key_type, self.key_size)
    }
}

/// Builds the provider a config asks for.
pub trait ResolveProvider {
    fn resolve(&self, config: &RenewalConfig) -> Result<Provider>;
}

/// Builds providers from the config plus the accounts in the
/// [`CredentialStore`] under the config's base dir.
pub struct StoreResolver {
    clock: Arc<dyn Clock>,
}

impl StoreResolver {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        StoreResolver { clock }
    }
}

impl Default for StoreResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolveProvider for StoreResolver {
    fn resolve(&self, config: &RenewalConfig) -> Result<Provider> {
        let key = config.key_spec()?;
        let credentials = CredentialStore::new(&config.base_dir);
        let clock = self.clock.clone();

        Ok(match config.provider {
            ProviderKind::AcmeHttp01 => {
                if config.webroot.is_empty() {
                    return Err(Error::EmptyWebroot);
                }
                let server = if config.server.is_empty() {
                    LETSENCRYPT.to_string()
                } else {
                    config.server.clone()
                };
                let opts = AcmeOptions {
                    email: config.email.clone(),
                    server,
                    key,
                };
                Provider::AcmeHttp01 {
                    provider: AcmeProvider::with_clock(opts, clock)?,
                    webroot: PathBuf::from(&config.webroot),
                }
            }
            ProviderKind::DigiCertRest => {
                let mut rest = credentials.digicert_rest_config(&config.email)?;
                if !config.server.is_empty() {
                    rest.server_url = config.server.clone();
                }
                Provider::DigiCertRest(DigiCertRestProvider::with_clock(rest, clock)?)
            }
            ProviderKind::DigiCertAcmeEab => {
                let mut eab = credentials.digicert_eab_config(&config.email)?;
                if !config.server.is_empty() {
                    eab.server_url = config.server.clone();
                }
                eab.key = key;
                let mut provider = DigiCertAcmeProvider::with_clock(eab, clock)?;
                provider.set_webroot(&config.webroot);
                Provider::DigiCertAcmeEab(provider)
            }
        })
    }
}

/// Saves renewal configs and renews whatever is due.
pub struct RenewalEngine {
    base_dir: PathBuf,
    resolver: Box<dyn ResolveProvider>,
    installers: HashMap<String, Box<dyn Installer>>,
    clock: Arc<dyn Clock>,
    cancel: Cancel,
}

impl RenewalEngine {
    /// Engine over `{base_dir}/renewal` using the [`StoreResolver`].
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self::with_clock(base_dir, Arc::new(SystemClock))
    }

    pub fn with_clock(base_dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        RenewalEngine {
            base_dir: base_dir.into(),
            resolver: Box::new(StoreResolver::with_clock(clock.clone())),
            installers: HashMap::new(),
            clock,
            cancel: Cancel::new(),
        }
    }

    pub fn set_resolver(&mut self, resolver: Box<dyn ResolveProvider>) {
        self.resolver = resolver;
    }

    /// Make `installer` available to configs listing `target`.
    pub fn add_installer(&mut self, target: impl Into<String>, installer: Box<dyn Installer>) {
        self.installers.insert(target.into(), installer);
    }

    /// Used by every provider call of [`run_all`](#method.run_all).
    pub fn set_cancel(&mut self, cancel: Cancel) {
        self.cancel = cancel;
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn renewal_dir(&self) -> PathBuf {
        self.base_dir.join(RENEWAL_DIR)
    }

    fn config_path(&self, domain: &str) -> PathBuf {
        self.renewal_dir()
            .join(format!("{}.{}", domain, CONFIG_EXT))
    }

    /// Write `config`, replacing any earlier one for the same domain.
    pub fn save(&self, config: &RenewalConfig) -> Result<PathBuf> {
        check_segment("domain", &config.domain)?;
        let mut config = config.clone();
        if config.base_dir.as_os_str().is_empty() {
            config.base_dir = self.base_dir.clone();
        }
        ensure_dir(&self.renewal_dir(), 0o700)?;
        let path = self.config_path(&config.domain);
        let yaml = serde_yaml::to_string(&config)?;
        write_private(&path, yaml.as_bytes())?;
        debug!("Saved renewal config {}", path.display());
        Ok(path)
    }

    pub fn load(&self, domain: &str) -> Result<RenewalConfig> {
        check_segment("domain", domain)?;
        self.load_path(&self.config_path(domain))
    }

    fn load_path(&self, path: &Path) -> Result<RenewalConfig> {
        let yaml = match fs::read_to_string(path) {
            Ok(y) => y,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::NotFound(path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let mut config: RenewalConfig =
            serde_yaml::from_str(&yaml).map_err(|e| Error::Corrupt {
                path: path.display().to_string(),
                detail: e.to_string(),
            })?;
        if config.base_dir.as_os_str().is_empty() {
            config.base_dir = self.base_dir.clone();
        }
        Ok(config)
    }

    /// Every saved config, sorted by domain. Unreadable files are skipped.
    pub fn list(&self) -> Result<Vec<RenewalConfig>> {
        let mut configs = vec![];
        for (path, res) in self.read_all()? {
            match res {
                Ok(c) => configs.push(c),
                Err(e) => warn!("Skipping {}: {}", path.display(), e),
            }
        }
        Ok(configs)
    }

    fn read_all(&self) -> Result<Vec<(PathBuf, Result<RenewalConfig>)>> {
        let entries = match fs::read_dir(self.renewal_dir()) {
            Ok(e) => e,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };
        let mut paths = vec![];
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && path.extension().map_or(false, |e| e == CONFIG_EXT) {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths
            .into_iter()
            .map(|p| {
                let res = self.load_path(&p);
                (p, res)
            })
            .collect())
    }

    /// Whether `config.domain` should be renewed at `now`.
    ///
    /// A missing or unreadable certificate is always due.
    pub fn due(&self, config: &RenewalConfig, now: OffsetDateTime) -> bool {
        let base = if config.base_dir.as_os_str().is_empty() {
            &self.base_dir
        } else {
            &config.base_dir
        };
        match CertificateStore::new(base).load_expiry(&config.domain) {
            Ok(expiry) => expiry - now < time::Duration::days(RENEW_BEFORE_DAYS),
            Err(e) => {
                debug!("{} is due: {}", config.domain, e);
                true
            }
        }
    }

    /// Renew every due domain, one after the other.
    ///
    /// A failing domain does not stop the others. Returns the renewed
    /// domains, or [`Error::RenewalFailed`] naming every domain (or config
    /// file) that failed.
    pub fn run_all(&self, verbose: bool) -> Result<Vec<String>> {
        let mut renewed = vec![];
        let mut failures = vec![];

        for (path, res) in self.read_all()? {
            let config = match res {
                Ok(c) => c,
                Err(e) => {
                    let name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    failures.push((name, e.to_string()));
                    continue;
                }
            };
            if !self.due(&config, self.clock.now()) {
                trace!("{} is not due", config.domain);
                continue;
            }
            match self.renew_one(&config) {
                Ok(()) => {
                    if verbose {
                        info!("Renewed {}", config.domain);
                    } else {
                        debug!("Renewed {}", config.domain);
                    }
                    renewed.push(config.domain);
                }
                Err(e) => {
                    warn!("Renewal of {} failed: {}", config.domain, e);
                    failures.push((config.domain, e.to_string()));
                }
            }
        }

        if failures.is_empty() {
            Ok(renewed)
        } else {
            Err(Error::RenewalFailed(failures))
        }
    }

    /// Issue and store a fresh certificate, then hand it to the installers.
    ///
    /// A missing or failing installer fails the domain, but only after the
    /// new certificate is stored.
    fn renew_one(&self, config: &RenewalConfig) -> Result<()> {
        let mut config = config.clone();
        if config.webroot.is_empty() {
            let found = config
                .targets
                .iter()
                .filter_map(|t| self.installers.get(t))
                .find_map(|i| i.webroot(&config.domain));
            if let Some(webroot) = found {
                config.webroot = webroot.to_string_lossy().into_owned();
            }
        }

        let provider = self.resolver.resolve(&config)?;
        let cert = provider.obtain_certificate(&[&config.domain], &self.cancel)?;

        let store = CertificateStore::with_clock(&config.base_dir, self.clock.clone());
        store.save(&config.domain, &cert)?;

        let paths = store.paths(&config.domain);
        let mut errors = vec![];
        for target in &config.targets {
            let installer = match self.installers.get(target) {
                Some(i) => i,
                None => {
                    errors.push(format!("no installer for target: {}", target));
                    continue;
                }
            };
            let (vhost, server) = installer.detect_vhost(&config.domain);
            debug!(
                "Install {} via {} ({}, vhost: {:?}, ssl: {})",
                config.domain,
                target,
                server,
                vhost,
                installer.is_ssl_enabled(&config.domain)
            );
            if let Err(e) = installer.install(&config.domain, &paths) {
                errors.push(format!("install via {}: {}", target, e));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(errors.join("; ")))
        }
    }
}

impl std::fmt::Debug for RenewalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let mut targets: Vec<_> = self.installers.keys().collect();
        targets.sort();
        f.debug_struct("RenewalEngine")
            .field("base_dir", &self.base_dir)
            .field("installers", &targets)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::install::ServerType;
    use crate::store::CertPaths;
    use crate::test::{cert_pem_expiring_in, init_log, AcmeServer, ManualClock};
    use std::sync::Mutex;

    fn engine(tmp: &tempfile::TempDir) -> RenewalEngine {
        RenewalEngine::with_clock(tmp.path(), Arc::new(ManualClock::new()))
    }

    fn write_live_cert(base: &Path, domain: &str, pem: &str) {
        let dir = base.join("live").join(domain);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("cert.pem"), pem).unwrap();
    }

    #[test]
    fn test_save_and_load() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let engine = engine(&tmp);
        let config = RenewalConfig {
            domain: "www.example.com".into(),
            email: "ops@example.com".into(),
            provider: ProviderKind::DigiCertRest,
            targets: vec!["nginx".into()],
            ..Default::default()
        };
        let path = engine.save(&config)?;
        assert_eq!(path, tmp.path().join("renewal/www.example.com.yaml"));

        let loaded = engine.load("www.example.com")?;
        assert_eq!(loaded.base_dir, tmp.path());
        assert_eq!(loaded.provider, ProviderKind::DigiCertRest);
        assert_eq!(loaded.targets, vec!["nginx".to_string()]);

        // same domain overwrites
        engine.save(&RenewalConfig {
            email: "other@example.com".into(),
            ..config
        })?;
        assert_eq!(engine.list()?.len(), 1);
        assert_eq!(engine.load("www.example.com")?.email, "other@example.com");
        Ok(())
    }

    #[test]
    fn test_save_requires_domain() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(
            engine(&tmp).save(&RenewalConfig::default()),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_legacy_method_key() -> Result<()> {
        let config: RenewalConfig = serde_yaml::from_str(
            "domain: a.example.com\nmethod: http-01\nwebroot: /var/www\nkey_type: rsa\nkey_size: 4096\n",
        )?;
        assert_eq!(config.provider, ProviderKind::AcmeHttp01);
        assert_eq!(config.key_spec()?, KeySpec::rsa(4096));
        Ok(())
    }

    #[test]
    fn test_due() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let engine = RenewalEngine::new(tmp.path());
        let config = |domain: &str| RenewalConfig {
            domain: domain.into(),
            base_dir: tmp.path().to_path_buf(),
            ..Default::default()
        };
        let now = OffsetDateTime::now_utc();

        assert!(engine.due(&config("none.example.com"), now));

        write_live_cert(tmp.path(), "soon.example.com", &cert_pem_expiring_in("soon", 29));
        assert!(engine.due(&config("soon.example.com"), now));

        write_live_cert(tmp.path(), "later.example.com", &cert_pem_expiring_in("later", 31));
        assert!(!engine.due(&config("later.example.com"), now));

        write_live_cert(tmp.path(), "bad.example.com", "not a certificate");
        assert!(engine.due(&config("bad.example.com"), now));
        Ok(())
    }

    #[derive(Default)]
    struct RecordingInstaller {
        installed: Mutex<Vec<(String, CertPaths)>>,
        webroot: Option<PathBuf>,
    }

    impl Installer for Arc<RecordingInstaller> {
        fn webroot(&self, _domain: &str) -> Option<PathBuf> {
            self.webroot.clone()
        }
        fn is_ssl_enabled(&self, _domain: &str) -> bool {
            false
        }
        fn detect_vhost(&self, _domain: &str) -> (Option<PathBuf>, ServerType) {
            (None, ServerType::Nginx)
        }
        fn install(&self, domain: &str, paths: &CertPaths) -> Result<()> {
            self.installed
                .lock()
                .unwrap()
                .push((domain.to_string(), paths.clone()));
            Ok(())
        }
    }

    #[test]
    fn test_run_all_partial_failure() -> Result<()> {
        init_log();
        let server = AcmeServer::new();
        let tmp = tempfile::tempdir()?;
        let webroot = tempfile::tempdir()?;
        let mut engine = engine(&tmp);
        let installer = Arc::new(RecordingInstaller {
            webroot: Some(webroot.path().to_path_buf()),
            ..Default::default()
        });
        engine.add_installer("nginx", Box::new(installer.clone()));

        let acme = |domain: &str, server: &str| RenewalConfig {
            domain: domain.into(),
            email: "ops@example.com".into(),
            server: server.into(),
            key_type: "ecdsa".into(),
            targets: vec!["nginx".into()],
            ..Default::default()
        };
        engine.save(&acme("a.example.com", &server.dir_url))?;
        engine.save(&acme("b.example.com", &server.dir_url))?;
        // nothing listens on port 1
        engine.save(&acme("c.example.com", "http://127.0.0.1:1/directory"))?;

        let err = engine.run_all(true).unwrap_err();
        assert_eq!(err.failed_domains(), vec!["c.example.com"]);
        assert!(err.to_string().starts_with("some renewals failed: c.example.com: "));

        let store = CertificateStore::new(tmp.path());
        for domain in ["a.example.com", "b.example.com"] {
            assert_eq!(fs::read_to_string(store.paths(domain).cert)?, server.leaf_pem);
        }
        assert!(!store.paths("c.example.com").cert.exists());

        let installed = installer.installed.lock().unwrap();
        let domains: Vec<_> = installed.iter().map(|(d, _)| d.as_str()).collect();
        assert_eq!(domains, vec!["a.example.com", "b.example.com"]);
        assert_eq!(installed[0].1, store.paths("a.example.com"));
        Ok(())
    }

    #[test]
    fn test_run_all_skips_not_due() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let engine = engine(&tmp);
        engine.save(&RenewalConfig {
            domain: "fresh.example.com".into(),
            // would fail if it were attempted
            server: "http://127.0.0.1:1/directory".into(),
            webroot: "/var/www".into(),
            ..Default::default()
        })?;
        write_live_cert(tmp.path(), "fresh.example.com", &cert_pem_expiring_in("fresh", 60));

        assert_eq!(engine.run_all(true)?, Vec::<String>::new());
        Ok(())
    }

    #[test]
    fn test_unknown_target_and_bad_config() -> Result<()> {
        let server = AcmeServer::new();
        let tmp = tempfile::tempdir()?;
        let webroot = tempfile::tempdir()?;
        let engine = engine(&tmp);
        engine.save(&RenewalConfig {
            domain: "x.example.com".into(),
            email: "ops@example.com".into(),
            server: server.dir_url.clone(),
            webroot: webroot.path().to_string_lossy().into_owned(),
            key_type: "ecdsa".into(),
            targets: vec!["apache".into()],
            ..Default::default()
        })?;
        fs::write(tmp.path().join("renewal/broken.yaml"), "domain: [")?;

        let err = engine.run_all(false).unwrap_err();
        assert_eq!(err.failed_domains(), vec!["broken.yaml", "x.example.com"]);
        assert!(err.to_string().contains("no installer for target: apache"));
        assert_eq!(engine.list()?.len(), 1);

        // issued and stored even though nothing could install it
        let store = CertificateStore::new(tmp.path());
        assert_eq!(
            fs::read_to_string(store.paths("x.example.com").cert)?,
            server.leaf_pem
        );
        Ok(())
    }

    #[test]
    fn test_missing_installer_still_renews() -> Result<()> {
        let server = AcmeServer::new();
        let tmp = tempfile::tempdir()?;
        let webroot = tempfile::tempdir()?;
        let engine = engine(&tmp);
        engine.save(&RenewalConfig {
            domain: "a.example.com".into(),
            email: "ops@example.com".into(),
            server: server.dir_url.clone(),
            webroot: webroot.path().to_string_lossy().into_owned(),
            key_type: "ecdsa".into(),
            targets: vec!["nginx".into()],
            ..Default::default()
        })?;

        let err = engine.run_all(true).unwrap_err();
        assert_eq!(err.failed_domains(), vec!["a.example.com"]);
        server.assert_downloaded();

        let store = CertificateStore::new(tmp.path());
        assert!(store.paths("a.example.com").cert.exists());
        // a fresh cert is no longer due
        let config = engine.load("a.example.com")?;
        assert!(!engine.due(&config, OffsetDateTime::now_utc()));
        Ok(())
    }
}
