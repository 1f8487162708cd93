//! Effective property resolution.
//!
//! Layers a placement's overrides on top of its spawn's defaults and reports,
//! per field, which tier supplied the value. Pure functions: inputs are never
//! mutated and outputs are freshly allocated on every call, so callers can
//! rely on identity comparison to detect changes.

use indexmap::IndexMap;
use strum::IntoEnumIterator;

use crate::spawn::{AssetProperties, PropertyKey};

/// Which tier supplied an effective value.
///
/// `None` covers both "inherited from the spawn default" and "absent
/// everywhere" — the presentation layer distinguishes the two by checking
/// whether the default itself is defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertySource {
    Override,
    None,
}

/// Per-field record of where each effective value came from.
pub type SourceMap = IndexMap<PropertyKey, PropertySource>;

/// The resolved view of one placement: effective values plus attribution.
/// Derived data, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedProperties {
    pub effective: AssetProperties,
    pub sources: SourceMap,
}

/// Compute the effective property set for one placement.
///
/// Precedence per key: instance override, else spawn default, else unset.
/// An unset effective value means "use the host environment's own default";
/// no fallback is ever invented here. Composite fields (dimensions,
/// position, scale, crop) resolve as whole units — an override replaces the
/// entire composite, it is never merged sub-field by sub-field with the
/// default.
pub fn resolve_effective_properties(
    spawn_defaults: &AssetProperties,
    instance_overrides: &AssetProperties,
) -> ResolvedProperties {
    let mut effective = AssetProperties::default();
    let mut sources = SourceMap::new();

    for key in PropertyKey::iter() {
        let (value, source) = match instance_overrides.get(key) {
            Some(value) => (Some(value), PropertySource::Override),
            None => (spawn_defaults.get(key), PropertySource::None),
        };

        // The key always pairs with a value read out under the same key, so
        // this cannot hit the type-mismatch arm.
        effective
            .set(key, value)
            .expect("value read by key must set under the same key");
        sources.insert(key, source);
    }

    ResolvedProperties { effective, sources }
}

/// Layer a placement's duration override over the spawn duration.
pub fn resolve_effective_duration(spawn_duration: u64, override_duration: Option<u64>) -> u64 {
    override_duration.unwrap_or(spawn_duration)
}
