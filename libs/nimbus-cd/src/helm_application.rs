use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The abstract description of one Helm-like install, independent of any particular CD driver's
/// native representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelmApplication {
    pub repo_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Chart version, or git ref when `path` is used instead of `chart`.
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_name: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "serde_yaml::Value::is_null")]
    pub values: serde_yaml::Value,

    pub target_cluster: String,
    pub target_namespace: String,
    #[serde(default)]
    pub create_namespace: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore_differences: Vec<String>,
    #[serde(default)]
    pub server_side_apply: bool,
    #[serde(default)]
    pub allow_degraded: bool,
}

impl HelmApplication {
    pub fn new(repo_url: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            repo_url: repo_url.into(),
            chart: None,
            path: None,
            version: version.into(),
            release_name: None,
            parameters: BTreeMap::new(),
            values: serde_yaml::Value::Null,
            target_cluster: String::new(),
            target_namespace: String::new(),
            create_namespace: false,
            ignore_differences: Vec::new(),
            server_side_apply: false,
            allow_degraded: false,
        }
    }

    pub fn with_chart(mut self, chart: impl Into<String>) -> Self {
        self.chart = Some(chart.into());
        self
    }

    pub fn with_target(mut self, cluster: impl Into<String>, namespace: impl Into<String>) -> Self {
        self.target_cluster = cluster.into();
        self.target_namespace = namespace.into();
        self
    }

    /// Sets only the target namespace, leaving `target_cluster` for `ApplicationProvisioner` to
    /// fill in from the in-scope remote (§4.6).
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.target_namespace = namespace.into();
        self
    }

    pub fn with_release_name(mut self, release_name: impl Into<String>) -> Self {
        self.release_name = Some(release_name.into());
        self
    }

    pub fn allow_degraded(mut self, allow: bool) -> Self {
        self.allow_degraded = allow;
        self
    }
}

/// The CD driver's summary status for a [`HelmApplication`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Health {
    Healthy,
    Degraded,
    Progressing,
    Suspended,
    #[default]
    Missing,
    Unknown,
}

impl Health {
    /// Whether this health, combined with `allow_degraded`, satisfies the CD driver's health
    /// gate described in §4.3/§8 of the engine spec.
    pub fn satisfies(self, allow_degraded: bool) -> bool {
        matches!(self, Health::Healthy) || (allow_degraded && matches!(self, Health::Degraded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn healthy_always_satisfies() {
        assert!(Health::Healthy.satisfies(false));
        assert!(Health::Healthy.satisfies(true));
    }

    #[test]
    fn degraded_only_satisfies_when_allowed() {
        assert!(!Health::Degraded.satisfies(false));
        assert!(Health::Degraded.satisfies(true));
    }

    #[test]
    fn progressing_never_satisfies() {
        assert!(!Health::Progressing.satisfies(true));
    }
}
