use base64::Engine as _;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// kubeconfig `*-data` fields are base64-encoded text, not raw bytes, in `kube::config`'s wire
/// types; decode here rather than at every call site.
fn decode_b64(context: &str, field: Option<String>) -> Result<Vec<u8>> {
    match field {
        None => Ok(Vec::new()),
        Some(encoded) => base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| Error::InvalidClusterSecret(context.to_string(), e.to_string())),
    }
}

/// A minimal view of a kubeconfig: only what's needed to translate it into the CD driver's
/// native cluster-credential form (current-context's cluster + auth-info).
#[derive(Debug, Clone)]
pub struct Kubeconfig {
    pub server: String,
    pub certificate_authority_data: Vec<u8>,
    pub client_certificate_data: Vec<u8>,
    pub client_key_data: Vec<u8>,
}

impl Kubeconfig {
    /// Parses a raw kubeconfig YAML document, resolving `current-context` into its cluster and
    /// auth-info entries. Fails if there is no current context or it cannot be resolved.
    pub fn from_yaml(raw: &[u8]) -> Result<Self> {
        let doc: kube::config::Kubeconfig =
            serde_yaml::from_slice(raw).map_err(|e| Error::InvalidClusterSecret("<kubeconfig>".into(), e.to_string()))?;
        let current = doc
            .current_context
            .clone()
            .ok_or(Error::MissingCurrentContext)?;
        let context = doc
            .contexts
            .iter()
            .find(|c| c.name == current)
            .and_then(|c| c.context.clone())
            .ok_or(Error::MissingCurrentContext)?;

        let cluster = doc
            .clusters
            .iter()
            .find(|c| c.name == context.cluster)
            .and_then(|c| c.cluster.clone())
            .ok_or_else(|| Error::InvalidClusterSecret(current.clone(), "unknown cluster".into()))?;
        let user = doc
            .auth_infos
            .iter()
            .find(|u| u.name == context.user)
            .and_then(|u| u.auth_info.clone())
            .ok_or_else(|| Error::InvalidClusterSecret(current.clone(), "unknown user".into()))?;

        Ok(Self {
            server: cluster.server.unwrap_or_default(),
            certificate_authority_data: decode_b64(&current, cluster.certificate_authority_data)?,
            client_certificate_data: decode_b64(&current, user.client_certificate_data)?,
            client_key_data: decode_b64(&current, user.client_key_data)?,
        })
    }

    /// Re-encodes this kubeconfig as a minimal single-context `kube::config::Kubeconfig` YAML
    /// document, for building a one-off client against a remote discovered at runtime
    /// (§4.5's `Config()`, consumed by `nimbus-provisioner`'s `ProvisionCtx`).
    pub fn to_yaml(&self) -> Result<Vec<u8>> {
        use base64::Engine as _;
        let b64 = base64::engine::general_purpose::STANDARD;
        let doc = serde_json::json!({
            "apiVersion": "v1",
            "kind": "Config",
            "current-context": "remote",
            "clusters": [{
                "name": "remote",
                "cluster": {
                    "server": self.server,
                    "certificate-authority-data": b64.encode(&self.certificate_authority_data),
                },
            }],
            "users": [{
                "name": "remote",
                "user": {
                    "client-certificate-data": b64.encode(&self.client_certificate_data),
                    "client-key-data": b64.encode(&self.client_key_data),
                },
            }],
            "contexts": [{
                "name": "remote",
                "context": { "cluster": "remote", "user": "remote" },
            }],
        });
        serde_yaml::to_string(&doc)
            .map(String::into_bytes)
            .map_err(Error::Yaml)
    }

    /// `cluster-<hex8>`, hex8 = first 8 bytes of `sha256(server)` — used both as the driver secret
    /// name suffix and, by callers, as a stable handle for the cluster.
    pub fn secret_name_suffix(&self) -> String {
        hex8(self.server.as_bytes())
    }
}

/// First 8 bytes (16 hex chars) of `sha256(input)`. Load-bearing for on-cluster compatibility —
/// do not change the truncation length.
pub fn hex8(input: &[u8]) -> String {
    let digest = Sha256::digest(input);
    hex::encode(&digest[..8])
}

mod hex {
    pub fn encode(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// The driver-native form a [`Kubeconfig`] is translated into before being stored as a labeled
/// secret.
#[derive(Debug, Clone)]
pub struct ClusterRegistration {
    pub server: String,
    pub ca_data: Vec<u8>,
    pub client_cert_data: Vec<u8>,
    pub client_key_data: Vec<u8>,
    pub labels: BTreeMap<String, String>,
}

impl ClusterRegistration {
    pub fn from_kubeconfig(kubeconfig: &Kubeconfig, labels: BTreeMap<String, String>) -> Self {
        Self {
            server: kubeconfig.server.clone(),
            ca_data: kubeconfig.certificate_authority_data.clone(),
            client_cert_data: kubeconfig.client_certificate_data.clone(),
            client_key_data: kubeconfig.client_key_data.clone(),
            labels,
        }
    }

    /// Secret name deterministically derived from the cluster's server URL: hash of the URL plus
    /// a short hostname hint, so secrets stay human-scannable in `kubectl get secret`.
    pub fn secret_name(&self) -> String {
        let host = url_host(&self.server).unwrap_or_else(|| "cluster".to_string());
        format!("cluster-{}-{}", host, hex8(self.server.as_bytes()))
    }
}

fn url_host(server: &str) -> Option<String> {
    let without_scheme = server.split("://").nth(1).unwrap_or(server);
    let host = without_scheme.split(['/', ':']).next()?;
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex8_is_16_chars() {
        assert_eq!(hex8(b"https://example.com:6443").len(), 16);
    }

    #[test]
    fn hex8_is_stable() {
        assert_eq!(hex8(b"same-input"), hex8(b"same-input"));
    }

    #[test]
    fn url_host_extracts_hostname() {
        assert_eq!(
            url_host("https://kube.example.com:6443").as_deref(),
            Some("kube.example.com")
        );
    }
}
