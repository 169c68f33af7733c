//! Versioned, named collections of [`HelmApplication`] descriptors a unit resolves against
//! (§4.4). A bundle is immutable once observed; units upgrade by switching which bundle they
//! reference.

pub mod error;

use std::cmp::Ordering;

use nimbus_cd::HelmApplication;
use semver::Version;
use serde::{Deserialize, Serialize};

pub use error::Error;
use error::Result;

/// The two unit kinds a bundle can be scoped to (§3). `Project` units don't consume bundles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
pub enum BundleKind {
    ControlPlane,
    Cluster,
}

impl BundleKind {
    fn as_name(self) -> &'static str {
        match self {
            BundleKind::ControlPlane => "ControlPlane",
            BundleKind::Cluster => "Cluster",
        }
    }
}

/// One named entry in a bundle: the logical application name a composer asks for, paired with
/// the template it resolves to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
pub struct BundleEntry {
    pub logical_name: String,
    pub application: HelmApplication,
}

/// `(name, version, kind, preview?, end_of_life?, entries)` per §3. `entries` preserves insertion
/// order, matching the source's "ordered mapping" invariant — lookups are linear, which is fine
/// at the entry counts a bundle actually has (a handful of add-ons).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
pub struct ApplicationBundle {
    pub name: String,
    pub version: String,
    pub kind: BundleKind,
    #[serde(default)]
    pub preview: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_of_life: Option<chrono::DateTime<chrono::Utc>>,
    pub entries: Vec<BundleEntry>,
}

impl ApplicationBundle {
    fn semver(&self) -> Result<Version> {
        Version::parse(&self.version).map_err(|e| Error::InvalidVersion(self.version.clone(), e))
    }

    fn entry(&self, logical_name: &str) -> Option<&HelmApplication> {
        self.entries
            .iter()
            .find(|e| e.logical_name == logical_name)
            .map(|e| &e.application)
    }

    fn is_eol(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        self.end_of_life.is_some_and(|eol| eol <= now)
    }
}

/// One requested entry in an [`unbundle`] call: the logical application name to look up, and
/// whether its absence is tolerable.
pub struct BundleRequest<'a> {
    pub logical_name: &'a str,
    pub optional: bool,
}

impl<'a> BundleRequest<'a> {
    pub fn required(logical_name: &'a str) -> Self {
        Self {
            logical_name,
            optional: false,
        }
    }

    pub fn optional(logical_name: &'a str) -> Self {
        Self {
            logical_name,
            optional: true,
        }
    }
}

/// Resolves `requests` against `bundle`, asserting `bundle.kind == kind`. A required entry
/// missing from the bundle is a fatal error; an optional entry missing is simply absent from the
/// returned map (§4.4).
///
/// Returns a map keyed by logical name rather than writing through caller-supplied receivers —
/// equivalent semantics to the source's out-parameter style, without fighting Rust's aliasing
/// rules for shared mutable receivers (recorded as an Open Question resolution in DESIGN.md).
pub fn unbundle(
    bundle: &ApplicationBundle,
    kind: BundleKind,
    requests: &[BundleRequest<'_>],
) -> Result<std::collections::HashMap<String, HelmApplication>> {
    if bundle.kind != kind {
        return Err(Error::KindMismatch {
            name: bundle.name.clone(),
            actual: bundle.kind.as_name(),
            expected: kind.as_name(),
        });
    }

    let mut resolved = std::collections::HashMap::with_capacity(requests.len());
    for request in requests {
        match bundle.entry(request.logical_name) {
            Some(app) => {
                resolved.insert(request.logical_name.to_string(), app.clone());
            }
            None if request.optional => {}
            None => {
                return Err(Error::MissingRequiredEntry {
                    bundle: bundle.name.clone(),
                    logical_name: request.logical_name.to_string(),
                })
            }
        }
    }
    Ok(resolved)
}

/// A source of named bundles. The concrete storage (a `ConfigMap`, a CRD, a static table) is left
/// to the caller — the core only needs this narrow lookup contract (§1 out-of-scope: CRD type
/// definitions beyond §3's fields).
pub trait BundleProvider {
    fn get(&self, name: &str) -> Option<ApplicationBundle>;
    fn list(&self, kind: BundleKind) -> Vec<ApplicationBundle>;
}

/// Chooses the lowest non-preview, non-end-of-life bundle of `kind`, for units created without an
/// explicit bundle reference (§4.4).
pub fn select_default(
    provider: &dyn BundleProvider,
    kind: BundleKind,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<ApplicationBundle> {
    let mut candidates: Vec<ApplicationBundle> = provider
        .list(kind)
        .into_iter()
        .filter(|b| !b.preview && !b.is_eol(now))
        .collect();

    candidates.sort_by(|a, b| match (a.semver(), b.semver()) {
        (Ok(av), Ok(bv)) => av.cmp(&bv),
        _ => Ordering::Equal,
    });

    candidates
        .into_iter()
        .next()
        .ok_or(Error::NoDefaultAvailable(kind.as_name()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> BundleEntry {
        BundleEntry {
            logical_name: name.to_string(),
            application: HelmApplication::new("https://charts.example.com", "1.0.0"),
        }
    }

    fn bundle(version: &str) -> ApplicationBundle {
        ApplicationBundle {
            name: format!("cluster-{version}"),
            version: version.to_string(),
            kind: BundleKind::Cluster,
            preview: false,
            end_of_life: None,
            entries: vec![entry("cni"), entry("csi")],
        }
    }

    #[test]
    fn unbundle_fills_required_and_optional() {
        let b = bundle("1.0.0");
        let resolved = unbundle(
            &b,
            BundleKind::Cluster,
            &[
                BundleRequest::required("cni"),
                BundleRequest::optional("dashboard"),
            ],
        )
        .unwrap();
        assert!(resolved.contains_key("cni"));
        assert!(!resolved.contains_key("dashboard"));
    }

    #[test]
    fn unbundle_fails_on_missing_required() {
        let b = bundle("1.0.0");
        let err = unbundle(&b, BundleKind::Cluster, &[BundleRequest::required("gpu-operator")]);
        assert!(matches!(err, Err(Error::MissingRequiredEntry { .. })));
    }

    #[test]
    fn unbundle_rejects_kind_mismatch() {
        let b = bundle("1.0.0");
        let err = unbundle(&b, BundleKind::ControlPlane, &[]);
        assert!(matches!(err, Err(Error::KindMismatch { .. })));
    }

    struct StaticProvider(Vec<ApplicationBundle>);
    impl BundleProvider for StaticProvider {
        fn get(&self, name: &str) -> Option<ApplicationBundle> {
            self.0.iter().find(|b| b.name == name).cloned()
        }
        fn list(&self, kind: BundleKind) -> Vec<ApplicationBundle> {
            self.0.iter().filter(|b| b.kind == kind).cloned().collect()
        }
    }

    #[test]
    fn select_default_picks_lowest_eligible_version() {
        let mut preview = bundle("3.0.0");
        preview.preview = true;
        let mut eol = bundle("0.5.0");
        eol.end_of_life = Some(chrono::DateTime::UNIX_EPOCH);
        let provider = StaticProvider(vec![bundle("2.0.0"), preview, eol, bundle("1.0.0")]);

        let chosen = select_default(&provider, BundleKind::Cluster, chrono::Utc::now()).unwrap();
        assert_eq!(chosen.version, "1.0.0");
    }

    #[test]
    fn select_default_errors_when_nothing_eligible() {
        let provider = StaticProvider(vec![]);
        let err = select_default(&provider, BundleKind::Cluster, chrono::Utc::now());
        assert!(matches!(err, Err(Error::NoDefaultAvailable(_))));
    }
}
