use std::collections::BTreeMap;

use kube::api::ListParams;
use serde::{Deserialize, Serialize};

/// Uniquely names a CD-driver-managed resource (a Helm application or a cluster registration)
/// across units. Two identifiers with equal `name` and equal label-value sequence are considered
/// the same resource, so labels are kept in an ordered map rather than a `HashMap` — iteration
/// order feeds directly into the label selector built by [`ResourceIdentifier::list_params`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceIdentifier {
    pub name: String,
    pub labels: BTreeMap<String, String>,
}

impl ResourceIdentifier {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: BTreeMap::new(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_labels<I, K, V>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in labels {
            self.labels.insert(k.into(), v.into());
        }
        self
    }

    /// A label selector matching exactly the resources sharing this identity.
    pub fn label_selector(&self) -> String {
        self.labels
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn list_params(&self) -> ListParams {
        ListParams::default().labels(&self.label_selector())
    }

    /// All labels this identifier carries, plus `name`, to stamp onto a driver-native object so
    /// it can be rediscovered by [`ResourceIdentifier::label_selector`] after a restart.
    pub fn as_label_map(&self) -> BTreeMap<String, String> {
        self.labels.clone()
    }

    /// A globally-unique ArgoCD `destination.name` for this identity: `in-cluster` verbatim (the
    /// reserved alias for ArgoCD's own cluster, which needs no registration), otherwise
    /// `<name>-<hex8 of this identity's labels>` so two units' same-named remote (e.g. two
    /// control planes each registering a `vcluster`) don't collide.
    pub fn cluster_destination_name(&self) -> String {
        if self.name == "in-cluster" {
            return self.name.clone();
        }
        format!("{}-{}", self.name, crate::cluster::hex8(self.label_selector().as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_selector_is_sorted_by_key() {
        let id = ResourceIdentifier::new("cluster-a1b2c3d4")
            .with_label("cluster", "c1")
            .with_label("control-plane", "cp1");
        assert_eq!(id.label_selector(), "cluster=c1,control-plane=cp1");
    }

    #[test]
    fn equal_name_and_labels_are_equal() {
        let a = ResourceIdentifier::new("x").with_label("k", "v");
        let b = ResourceIdentifier::new("x").with_label("k", "v");
        assert_eq!(a, b);
    }

    #[test]
    fn in_cluster_destination_name_ignores_labels() {
        let id = ResourceIdentifier::new("in-cluster").with_label("organization", "acme");
        assert_eq!(id.cluster_destination_name(), "in-cluster");
    }

    #[test]
    fn distinct_labels_give_distinct_destination_names() {
        let a = ResourceIdentifier::new("vcluster").with_label("control-plane", "cp1");
        let b = ResourceIdentifier::new("vcluster").with_label("control-plane", "cp2");
        assert_ne!(a.cluster_destination_name(), b.cluster_destination_name());
    }
}
