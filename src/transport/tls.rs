use std::fmt;
use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::config::TransportConfig;
use crate::error::RouterError;

/// Client certificate and private key presented to the broker.
#[derive(Clone)]
pub struct ClientIdentity {
    pub cert_pem: Vec<u8>,
    pub key_pem: Vec<u8>,
}

/// PEM material read from disk at router construction.
///
/// The CA bundle is optional and loaded best-effort; the client identity, when
/// configured, must load or construction fails.
#[derive(Clone)]
pub struct TlsMaterial {
    pub ca_bundle: Option<Vec<u8>>,
    pub identity: Option<ClientIdentity>,
}

impl TlsMaterial {
    /// Load TLS material named by `config`. Returns `Ok(None)` for a plain
    /// connection (no certificate paths configured).
    pub fn from_config(config: &TransportConfig) -> Result<Option<Self>, RouterError> {
        let identity = match (&config.client_cert_path, &config.client_key_path) {
            (Some(cert), Some(key)) => Some(ClientIdentity {
                cert_pem: read_pem(cert)?,
                key_pem: read_pem(key)?,
            }),
            (None, None) => None,
            (Some(_), None) => return Err(RouterError::MissingParam("client_key_path")),
            (None, Some(_)) => return Err(RouterError::MissingParam("client_cert_path")),
        };

        let ca_bundle = config.ca_cert_path.as_deref().and_then(|path| {
            match read_pem(path) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    warn!(error = %e, "CA bundle unavailable, continuing without it");
                    None
                }
            }
        });

        if identity.is_none() && ca_bundle.is_none() {
            return Ok(None);
        }
        debug!(
            ca_bundle = ca_bundle.is_some(),
            client_identity = identity.is_some(),
            "TLS material loaded"
        );
        Ok(Some(Self {
            ca_bundle,
            identity,
        }))
    }
}

impl fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("ca_bundle_bytes", &self.ca_bundle.as_ref().map(Vec::len))
            .field("client_identity", &self.identity.is_some())
            .finish()
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>, RouterError> {
    let bytes = fs::read(path).map_err(|e| RouterError::Tls {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    if !contains_pem_block(&bytes) {
        return Err(RouterError::Tls {
            path: path.to_path_buf(),
            reason: "no PEM block found".to_string(),
        });
    }
    Ok(bytes)
}

fn contains_pem_block(bytes: &[u8]) -> bool {
    const MARKER: &[u8] = b"-----BEGIN ";
    bytes.windows(MARKER.len()).any(|w| w == MARKER)
}
