//! Mutual-TLS transport for the PIX gateway
//!
//! One pooled client is built at startup and shared by every gateway call.
//! The gateway's OAuth endpoint is known to reject handshakes with a
//! bad-certificate alert when the client identity does not match; for that
//! call only, an ordered list of successively looser TLS profiles can be
//! tried before giving up. The loosening is bounded and every insecure
//! client construction is logged.

use crate::pix::certs::{CertificateMaterial, CertificateSource};
use crate::pix::error::{PixError, PixResult};
use reqwest::{Certificate, Client, Identity};
use std::time::Duration;
use tracing::{info, warn};

/// One transport configuration in the fallback ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlsProfile {
    pub name: &'static str,
    pub use_identity: bool,
    pub verify_peer: bool,
}

/// Looser profiles tried, in order, when the primary handshake is rejected.
/// Consumed only by the OAuth call.
const FALLBACK_PROFILES: [TlsProfile; 2] = [
    TlsProfile {
        name: "identity-no-verify",
        use_identity: true,
        verify_peer: false,
    },
    TlsProfile {
        name: "anonymous-no-verify",
        use_identity: false,
        verify_peer: false,
    },
];

#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub request_timeout: Duration,
    pub max_idle_connections: usize,
    pub allow_tls_fallback: bool,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_idle_connections: 50,
            allow_tls_fallback: true,
        }
    }
}

/// Shared gateway transport. Holds the primary pooled client plus the
/// material needed to construct fallback clients on demand.
pub struct Transport {
    client: Client,
    material: Option<CertificateMaterial>,
    settings: HttpSettings,
}

impl Transport {
    /// Loads certificate material once and builds the primary client.
    ///
    /// With cert + key present the client authenticates mutually; peer
    /// verification stays on only when a CA chain was also provided.
    /// Without material the client skips peer verification entirely, which
    /// is explicitly insecure and logged as such.
    pub fn from_source(source: &dyn CertificateSource, settings: HttpSettings) -> PixResult<Self> {
        let material = source.load()?;

        let primary = match &material {
            Some(m) => {
                let verify_peer = m.ca_pem.is_some();
                if !verify_peer {
                    warn!(
                        "no CA chain configured; peer verification disabled for \
                         the mutual-TLS client"
                    );
                }
                let profile = TlsProfile {
                    name: "mutual-tls",
                    use_identity: true,
                    verify_peer,
                };
                info!(profile = profile.name, "gateway transport ready");
                build_client(&settings, Some(m), profile)?
            }
            None => {
                let profile = TlsProfile {
                    name: "insecure-anonymous",
                    use_identity: false,
                    verify_peer: false,
                };
                warn!(
                    profile = profile.name,
                    "building gateway transport without client certificates; \
                     the gateway is likely to reject the handshake"
                );
                build_client(&settings, None, profile)?
            }
        };

        Ok(Self {
            client: primary,
            material,
            settings,
        })
    }

    /// The shared pooled client used by all gateway calls.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Whether a send failure looks like a TLS/connect-phase rejection that
    /// the fallback ladder may help with. Timeouts are excluded: those are
    /// the polling loop's concern.
    pub fn is_handshake_failure(err: &reqwest::Error) -> bool {
        err.is_connect() && !err.is_timeout()
    }

    /// Builds the looser fallback clients, in ladder order. Empty when the
    /// fallback is disabled by configuration.
    pub fn fallback_clients(&self) -> Vec<(&'static str, Client)> {
        if !self.settings.allow_tls_fallback {
            return Vec::new();
        }
        FALLBACK_PROFILES
            .iter()
            .filter(|p| !p.use_identity || self.material.is_some())
            .filter_map(|profile| {
                warn!(
                    profile = profile.name,
                    "constructing fallback TLS client with peer verification disabled"
                );
                match build_client(&self.settings, self.material.as_ref(), *profile) {
                    Ok(client) => Some((profile.name, client)),
                    Err(e) => {
                        warn!(profile = profile.name, error = %e, "fallback client build failed");
                        None
                    }
                }
            })
            .collect()
    }
}

fn build_client(
    settings: &HttpSettings,
    material: Option<&CertificateMaterial>,
    profile: TlsProfile,
) -> PixResult<Client> {
    let mut builder = Client::builder()
        .use_native_tls()
        .timeout(settings.request_timeout)
        .pool_max_idle_per_host(settings.max_idle_connections)
        .tcp_keepalive(Duration::from_secs(1))
        .min_tls_version(reqwest::tls::Version::TLS_1_2);

    if profile.use_identity {
        let m = material.ok_or_else(|| PixError::Certificate {
            message: format!(
                "profile {} requires client certificates but none are loaded",
                profile.name
            ),
        })?;
        builder = builder.identity(build_identity(m)?);
        if let (true, Some(ca)) = (profile.verify_peer, &m.ca_pem) {
            let ca = Certificate::from_pem(ca).map_err(|e| PixError::Certificate {
                message: format!("invalid CA chain: {e}"),
            })?;
            builder = builder.add_root_certificate(ca);
        }
    }

    if !profile.verify_peer {
        builder = builder.danger_accept_invalid_certs(true);
    }

    builder.build().map_err(|e| PixError::Certificate {
        message: format!("failed to build HTTP client ({}): {e}", profile.name),
    })
}

fn build_identity(material: &CertificateMaterial) -> PixResult<Identity> {
    // Encrypted keys come as PKCS#12 with the passphrase alongside; plain
    // PEM pairs load directly.
    match (&material.pkcs12, &material.passphrase) {
        (Some(der), Some(passphrase)) => {
            Identity::from_pkcs12_der(der, passphrase).map_err(|e| PixError::Certificate {
                message: format!("invalid PKCS#12 bundle: {e}"),
            })
        }
        _ => Identity::from_pkcs8_pem(&material.cert_pem, &material.key_pem).map_err(|e| {
            PixError::Certificate {
                message: format!("invalid certificate/key PEM pair: {e}"),
            }
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pix::certs::NoCertificates;

    #[test]
    fn anonymous_transport_builds_without_material() {
        let transport = Transport::from_source(&NoCertificates, HttpSettings::default())
            .expect("insecure transport should build");
        // no identity available, so only the anonymous fallback remains
        let fallbacks = transport.fallback_clients();
        assert_eq!(fallbacks.len(), 1);
        assert_eq!(fallbacks[0].0, "anonymous-no-verify");
    }

    #[test]
    fn fallback_ladder_can_be_disabled() {
        let settings = HttpSettings {
            allow_tls_fallback: false,
            ..HttpSettings::default()
        };
        let transport = Transport::from_source(&NoCertificates, settings).unwrap();
        assert!(transport.fallback_clients().is_empty());
    }
}
