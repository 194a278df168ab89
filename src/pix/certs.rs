//! Credential-store collaborator for client certificate material

use crate::pix::error::{PixError, PixResult};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Client TLS material loaded from a credential store.
///
/// Plain PEM pairs load without a passphrase; encrypted material must come
/// as a PKCS#12 bundle with its passphrase alongside.
#[derive(Clone)]
pub struct CertificateMaterial {
    pub cert_pem: Vec<u8>,
    pub key_pem: Vec<u8>,
    pub ca_pem: Option<Vec<u8>>,
    pub pkcs12: Option<Vec<u8>>,
    pub passphrase: Option<String>,
}

impl std::fmt::Debug for CertificateMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateMaterial")
            .field("cert_pem_len", &self.cert_pem.len())
            .field("has_ca", &self.ca_pem.is_some())
            .field("has_pkcs12", &self.pkcs12.is_some())
            .field("has_passphrase", &self.passphrase.is_some())
            .finish()
    }
}

/// Where certificate material comes from. Loaded once per process.
pub trait CertificateSource: Send + Sync {
    /// `Ok(None)` means no material is configured (insecure transport mode).
    fn load(&self) -> PixResult<Option<CertificateMaterial>>;
}

/// Filesystem source reading `cert.pem`, `key.pem`, `ca.pem` (optional),
/// `bundle.p12` (optional) and `passphrase.txt` (optional) from one
/// directory.
pub struct FsCertificateSource {
    dir: PathBuf,
}

impl FsCertificateSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn read(&self, name: &str) -> PixResult<Vec<u8>> {
        std::fs::read(self.dir.join(name)).map_err(|e| PixError::Certificate {
            message: format!("failed to read {name}: {e}"),
        })
    }

    fn read_optional(&self, name: &str) -> PixResult<Option<Vec<u8>>> {
        if self.dir.join(name).is_file() {
            self.read(name).map(Some)
        } else {
            Ok(None)
        }
    }
}

impl CertificateSource for FsCertificateSource {
    fn load(&self) -> PixResult<Option<CertificateMaterial>> {
        let has = |name: &str| self.dir.join(name).is_file();

        if !has("cert.pem") || !has("key.pem") {
            warn!(
                dir = %self.dir.display(),
                "client certificates not found (expected cert.pem + key.pem); \
                 gateway calls will use the insecure transport profile"
            );
            return Ok(None);
        }

        let material = CertificateMaterial {
            cert_pem: self.read("cert.pem")?,
            key_pem: self.read("key.pem")?,
            ca_pem: self.read_optional("ca.pem")?,
            pkcs12: self.read_optional("bundle.p12")?,
            passphrase: self
                .read_optional("passphrase.txt")?
                .map(|bytes| String::from_utf8_lossy(&bytes).trim().to_string())
                .filter(|s| !s.is_empty()),
        };

        info!(
            dir = %self.dir.display(),
            has_ca = material.ca_pem.is_some(),
            has_pkcs12 = material.pkcs12.is_some(),
            "client certificate material loaded"
        );
        Ok(Some(material))
    }
}

/// Source that never yields material. Used where a deployment explicitly
/// runs without client certificates.
pub struct NoCertificates;

impl CertificateSource for NoCertificates {
    fn load(&self) -> PixResult<Option<CertificateMaterial>> {
        Ok(None)
    }
}

pub fn fs_source(dir: impl AsRef<Path>) -> FsCertificateSource {
    FsCertificateSource::new(dir.as_ref().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn missing_material_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let source = FsCertificateSource::new(dir.path());
        assert!(source.load().unwrap().is_none());
    }

    #[test]
    fn cert_without_key_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("cert.pem"), "CERT").unwrap();
        let source = FsCertificateSource::new(dir.path());
        assert!(source.load().unwrap().is_none());
    }

    #[test]
    fn full_material_is_loaded_with_trimmed_passphrase() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("cert.pem"), "CERT").unwrap();
        fs::write(dir.path().join("key.pem"), "KEY").unwrap();
        fs::write(dir.path().join("ca.pem"), "CA").unwrap();
        fs::write(dir.path().join("passphrase.txt"), "  s3cret \n").unwrap();

        let material = FsCertificateSource::new(dir.path())
            .load()
            .unwrap()
            .expect("material should load");
        assert_eq!(material.cert_pem, b"CERT");
        assert_eq!(material.key_pem, b"KEY");
        assert_eq!(material.ca_pem.as_deref(), Some(b"CA".as_slice()));
        assert!(material.pkcs12.is_none());
        assert_eq!(material.passphrase.as_deref(), Some("s3cret"));
    }

    #[test]
    fn empty_passphrase_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("cert.pem"), "CERT").unwrap();
        fs::write(dir.path().join("key.pem"), "KEY").unwrap();
        fs::write(dir.path().join("passphrase.txt"), "\n").unwrap();

        let material = FsCertificateSource::new(dir.path())
            .load()
            .unwrap()
            .unwrap();
        assert!(material.passphrase.is_none());
        assert!(material.ca_pem.is_none());
    }
}
