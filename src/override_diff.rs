//! Minimal override patch computation.
//!
//! Given the set of values an editor session wants to persist as overrides,
//! builds the `AssetProperties` patch to store on the placement. A key is
//! present in the patch exactly when the session holds a concrete value for
//! it; reverting a field to "inherit" is expressed by omitting the key, not
//! by writing a null or sentinel.

use indexmap::IndexMap;

use crate::spawn::{AssetProperties, PropertyKey, PropertyTypeError, PropertyValue};

/// The desired override values of a draft: only the fields the user has
/// override-enabled, each with a concrete value.
pub type DesiredValues = IndexMap<PropertyKey, PropertyValue>;

/// Build the override patch for the given desired values.
///
/// Round-trip invariant: resolving the returned patch against the original
/// spawn defaults reproduces every desired value exactly. Pure — does not
/// read or write the persisted spawn.
///
/// Fails only when a key is paired with a value of the wrong shape, which
/// is programmer misuse upstream.
pub fn build_overrides_diff(desired: &DesiredValues) -> Result<AssetProperties, PropertyTypeError> {
    let mut patch = AssetProperties::default();
    for (&key, value) in desired {
        patch.set(key, Some(value.clone()))?;
    }
    Ok(patch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolution::resolve_effective_properties;
    use crate::spawn::Dimensions;
    use pretty_assertions::assert_eq;
    use strum::IntoEnumIterator;

    #[test]
    fn patch_contains_exactly_the_desired_keys() {
        let mut desired = DesiredValues::new();
        desired.insert(PropertyKey::Volume, PropertyValue::Float(0.7));
        desired.insert(
            PropertyKey::Dimensions,
            PropertyValue::Dimensions(Dimensions {
                width: 120,
                height: 90,
            }),
        );

        let patch = build_overrides_diff(&desired).unwrap();

        for key in PropertyKey::iter() {
            if desired.contains_key(&key) {
                assert_eq!(patch.get(key), desired.get(&key).cloned(), "{key}");
            } else {
                assert_eq!(patch.get(key), None, "{key}");
            }
        }
    }

    #[test]
    fn empty_desired_set_builds_empty_patch() {
        let patch = build_overrides_diff(&DesiredValues::new()).unwrap();
        assert!(patch.is_empty());
    }

    #[test]
    fn round_trip_reproduces_desired_values() {
        let spawn_defaults = AssetProperties {
            volume: Some(0.8),
            dimensions: Some(Dimensions {
                width: 80,
                height: 80,
            }),
            ..Default::default()
        };

        let mut desired = DesiredValues::new();
        desired.insert(PropertyKey::Volume, PropertyValue::Float(0.25));
        desired.insert(
            PropertyKey::Dimensions,
            PropertyValue::Dimensions(Dimensions {
                width: 120,
                height: 90,
            }),
        );
        desired.insert(PropertyKey::Muted, PropertyValue::Bool(true));

        let patch = build_overrides_diff(&desired).unwrap();
        let resolved = resolve_effective_properties(&spawn_defaults, &patch);

        for (&key, value) in &desired {
            assert_eq!(resolved.effective.get(key).as_ref(), Some(value), "{key}");
        }
    }

    #[test]
    fn dimensions_only_change_produces_dimensions_only_patch() {
        // Spawn default 80x80, user sets 120x90 and touches nothing else:
        // the persisted diff carries only dimensions.
        let mut desired = DesiredValues::new();
        desired.insert(
            PropertyKey::Dimensions,
            PropertyValue::Dimensions(Dimensions {
                width: 120,
                height: 90,
            }),
        );

        let patch = build_overrides_diff(&desired).unwrap();
        assert_eq!(
            serde_json::to_value(&patch).unwrap(),
            serde_json::json!({ "dimensions": { "width": 120, "height": 90 } })
        );
    }

    #[test]
    fn mismatched_value_shape_is_rejected() {
        let mut desired = DesiredValues::new();
        desired.insert(PropertyKey::Muted, PropertyValue::Float(1.0));
        let err = build_overrides_diff(&desired).unwrap_err();
        assert_eq!(err.key, PropertyKey::Muted);
    }
}
