//! TLS trust policy for FTPS sessions.
//!
//! Built once from configuration: verify against a supplied CA bundle, verify
//! against the platform's default CAs, or skip verification entirely.

use anyhow::{Context, Result};
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::CertificateDer;
use std::fs;
use std::path::Path;

/// PEM text holding at least one X.509 certificate.
#[derive(Clone, PartialEq, Eq)]
pub struct CaBundle {
    pem: String,
    certificates: usize,
}

impl CaBundle {
    /// Parse `pem`, rejecting input without a single certificate.
    /// `origin` names the configuration option in error messages.
    pub fn from_pem(pem: &str, origin: &str) -> Result<Self> {
        let certs = CertificateDer::pem_slice_iter(pem.as_bytes())
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("failed to read {}", origin))?;
        if certs.is_empty() {
            anyhow::bail!("{} does not include valid X.509 PEM certificates", origin);
        }
        Ok(Self {
            pem: pem.to_string(),
            certificates: certs.len(),
        })
    }

    pub fn pem(&self) -> &str {
        &self.pem
    }

    pub fn certificate_count(&self) -> usize {
        self.certificates
    }
}

impl std::fmt::Debug for CaBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaBundle")
            .field("certificates", &self.certificates)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyMode {
    /// Accept any server certificate.
    NoVerify,
    /// Trust only the supplied certificates.
    Certificates(CaBundle),
    /// Trust the platform default CA store.
    PlatformDefault,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPolicy {
    pub verify: VerifyMode,
    pub verify_hostname: bool,
}

impl TlsPolicy {
    pub fn no_verify() -> Self {
        Self {
            verify: VerifyMode::NoVerify,
            verify_hostname: false,
        }
    }

    pub fn platform_default(verify_hostname: bool) -> Self {
        Self {
            verify: VerifyMode::PlatformDefault,
            verify_hostname,
        }
    }

    /// Build the policy from the `ssl_*` options. Verification defaults to on.
    /// Inline CA data takes precedence over a CA file.
    pub fn configure(
        ssl_verify: Option<bool>,
        verify_hostname: bool,
        ca_cert_file: Option<&Path>,
        ca_cert_data: Option<&str>,
    ) -> Result<Self> {
        if !ssl_verify.unwrap_or(true) {
            return Ok(Self::no_verify());
        }
        match read_trusted_certificates(ca_cert_file, ca_cert_data)? {
            Some(bundle) => Ok(Self {
                verify: VerifyMode::Certificates(bundle),
                verify_hostname,
            }),
            None => Ok(Self::platform_default(verify_hostname)),
        }
    }

    pub fn verifies_peer(&self) -> bool {
        !matches!(self.verify, VerifyMode::NoVerify)
    }
}

impl Default for TlsPolicy {
    fn default() -> Self {
        Self::platform_default(true)
    }
}

/// Load the trusted CA bundle from inline data or a file, if either is configured.
pub fn read_trusted_certificates(
    ca_cert_file: Option<&Path>,
    ca_cert_data: Option<&str>,
) -> Result<Option<CaBundle>> {
    if let Some(data) = ca_cert_data {
        return CaBundle::from_pem(data, "ssl_trusted_ca_cert_data").map(Some);
    }
    if let Some(path) = ca_cert_file {
        let origin = format!("ssl_trusted_ca_cert_file '{}'", path.display());
        let data = fs::read_to_string(path).with_context(|| format!("failed to open {}", origin))?;
        return CaBundle::from_pem(&data, &origin).map(Some);
    }
    Ok(None)
}
