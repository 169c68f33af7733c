//! A file-backed [`BundleProvider`] (§4.4): bundles are read once at startup from a YAML document
//! listing every [`ApplicationBundle`], the simplest storage the trait's contract allows (bundle
//! CRDs are out of scope, per `nimbus-bundle`'s own doc comment).

use std::path::Path;

use nimbus_bundle::{ApplicationBundle, BundleKind, BundleProvider};

use crate::error::{Error, Result};

pub struct FileBundleProvider {
    bundles: Vec<ApplicationBundle>,
}

impl FileBundleProvider {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read(path)
            .map_err(|e| Error::BundleConfig(path.display().to_string(), e.to_string()))?;
        let bundles: Vec<ApplicationBundle> = serde_yaml::from_slice(&raw)
            .map_err(|e| Error::BundleConfig(path.display().to_string(), e.to_string()))?;
        Ok(Self { bundles })
    }
}

impl BundleProvider for FileBundleProvider {
    fn get(&self, name: &str) -> Option<ApplicationBundle> {
        self.bundles.iter().find(|b| b.name == name).cloned()
    }

    fn list(&self, kind: BundleKind) -> Vec<ApplicationBundle> {
        self.bundles.iter().filter(|b| b.kind == kind).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_bundles_and_filters_by_kind() {
        let yaml = r#"
- name: cluster-1.0.0
  version: "1.0.0"
  kind: Cluster
  entries:
    - logicalName: cni
      application:
        repoUrl: https://charts.example.com/cilium
        version: "1.15.0"
        targetCluster: ""
        targetNamespace: ""
"#;
        let path = std::env::temp_dir().join("nimbus-operator-bundles-test.yaml");
        std::fs::File::create(&path).unwrap().write_all(yaml.as_bytes()).unwrap();

        let provider = FileBundleProvider::load(&path).unwrap();
        assert!(provider.get("cluster-1.0.0").is_some());
        assert_eq!(provider.list(BundleKind::ControlPlane).len(), 0);
        assert_eq!(provider.list(BundleKind::Cluster).len(), 1);
    }
}
