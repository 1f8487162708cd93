//! Core data model for spawn profiles.
//!
//! A `Profile` owns an ordered list of `Spawn`s; each spawn owns an ordered
//! list of `SpawnAsset` placements. Spawn-level `default_properties` apply to
//! every placement unless that placement carries an override for the field.
//! Overrides are expressed by omission: a `None` field means "inherit", and
//! serialized forms drop absent fields entirely rather than writing nulls.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

/// Identity of a spawn within a profile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpawnId(String);

impl SpawnId {
    pub fn new() -> Self {
        SpawnId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SpawnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SpawnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SpawnId {
    fn from(value: &str) -> Self {
        SpawnId(value.to_owned())
    }
}

/// Identity of one asset placement inside a spawn.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpawnAssetId(String);

impl SpawnAssetId {
    pub fn new() -> Self {
        SpawnAssetId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SpawnAssetId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SpawnAssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SpawnAssetId {
    fn from(value: &str) -> Self {
        SpawnAssetId(value.to_owned())
    }
}

/// Pixel dimensions. Resolves as a whole unit: an override replaces both
/// fields, never one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Screen position in pixels relative to the layout origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

/// Per-axis scale factor. Atomic like the other composites.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scale {
    pub x: f64,
    pub y: f64,
}

/// Crop rectangle in source pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crop {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// How `position` is interpreted by the host environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum PositionMode {
    Absolute,
    Relative,
    Centered,
}

/// The full set of configurable property keys. Every resolver and draft
/// operation iterates this enum, so adding a key here is the single point
/// of extension.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter, EnumString,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum PropertyKey {
    Volume,
    Muted,
    Loop,
    Autoplay,
    Rotation,
    Dimensions,
    Position,
    Scale,
    Crop,
    PositionMode,
}

/// A concrete value for one property. Composite variants carry the whole
/// object, which is what makes override resolution atomic-replace by
/// construction.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Float(f64),
    Dimensions(Dimensions),
    Position(Position),
    Scale(Scale),
    Crop(Crop),
    PositionMode(PositionMode),
}

impl PropertyValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            PropertyValue::Bool(_) => "bool",
            PropertyValue::Float(_) => "float",
            PropertyValue::Dimensions(_) => "dimensions",
            PropertyValue::Position(_) => "position",
            PropertyValue::Scale(_) => "scale",
            PropertyValue::Crop(_) => "crop",
            PropertyValue::PositionMode(_) => "positionMode",
        }
    }
}

/// A property key was paired with a value of the wrong shape. This is
/// programmer misuse, not user input variation, and is expected to be
/// caught and surfaced at the component boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("property \"{key}\" cannot hold a {value_kind} value")]
pub struct PropertyTypeError {
    pub key: PropertyKey,
    pub value_kind: &'static str,
}

/// Partial property set. Used both for spawn-level defaults and for
/// per-placement overrides; `None` always means "unset" (inherit, or fall
/// through to the host environment's own default).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssetProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub muted: Option<bool>,
    #[serde(rename = "loop", skip_serializing_if = "Option::is_none")]
    pub looping: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub autoplay: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<Scale>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop: Option<Crop>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_mode: Option<PositionMode>,
}

impl AssetProperties {
    /// Uniform read access by key.
    pub fn get(&self, key: PropertyKey) -> Option<PropertyValue> {
        match key {
            PropertyKey::Volume => self.volume.map(PropertyValue::Float),
            PropertyKey::Muted => self.muted.map(PropertyValue::Bool),
            PropertyKey::Loop => self.looping.map(PropertyValue::Bool),
            PropertyKey::Autoplay => self.autoplay.map(PropertyValue::Bool),
            PropertyKey::Rotation => self.rotation.map(PropertyValue::Float),
            PropertyKey::Dimensions => self.dimensions.map(PropertyValue::Dimensions),
            PropertyKey::Position => self.position.map(PropertyValue::Position),
            PropertyKey::Scale => self.scale.map(PropertyValue::Scale),
            PropertyKey::Crop => self.crop.map(PropertyValue::Crop),
            PropertyKey::PositionMode => self.position_mode.map(PropertyValue::PositionMode),
        }
    }

    /// Uniform write access by key. `None` clears the field back to unset.
    /// Fails only when the value shape does not match the key.
    pub fn set(
        &mut self,
        key: PropertyKey,
        value: Option<PropertyValue>,
    ) -> Result<(), PropertyTypeError> {
        match (key, value) {
            (PropertyKey::Volume, Some(PropertyValue::Float(v))) => self.volume = Some(v),
            (PropertyKey::Volume, None) => self.volume = None,
            (PropertyKey::Muted, Some(PropertyValue::Bool(v))) => self.muted = Some(v),
            (PropertyKey::Muted, None) => self.muted = None,
            (PropertyKey::Loop, Some(PropertyValue::Bool(v))) => self.looping = Some(v),
            (PropertyKey::Loop, None) => self.looping = None,
            (PropertyKey::Autoplay, Some(PropertyValue::Bool(v))) => self.autoplay = Some(v),
            (PropertyKey::Autoplay, None) => self.autoplay = None,
            (PropertyKey::Rotation, Some(PropertyValue::Float(v))) => self.rotation = Some(v),
            (PropertyKey::Rotation, None) => self.rotation = None,
            (PropertyKey::Dimensions, Some(PropertyValue::Dimensions(v))) => {
                self.dimensions = Some(v)
            }
            (PropertyKey::Dimensions, None) => self.dimensions = None,
            (PropertyKey::Position, Some(PropertyValue::Position(v))) => self.position = Some(v),
            (PropertyKey::Position, None) => self.position = None,
            (PropertyKey::Scale, Some(PropertyValue::Scale(v))) => self.scale = Some(v),
            (PropertyKey::Scale, None) => self.scale = None,
            (PropertyKey::Crop, Some(PropertyValue::Crop(v))) => self.crop = Some(v),
            (PropertyKey::Crop, None) => self.crop = None,
            (PropertyKey::PositionMode, Some(PropertyValue::PositionMode(v))) => {
                self.position_mode = Some(v)
            }
            (PropertyKey::PositionMode, None) => self.position_mode = None,
            (key, Some(value)) => {
                return Err(PropertyTypeError {
                    key,
                    value_kind: value.kind_name(),
                })
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        PropertyKey::iter().all(|key| self.get(key).is_none())
    }
}

/// Per-placement deviations from the spawn's defaults. Holds only fields
/// genuinely different from "inherit"; a value equal to the inherited one
/// is removed rather than stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssetOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(skip_serializing_if = "AssetProperties::is_empty")]
    pub properties: AssetProperties,
}

impl AssetOverrides {
    pub fn is_empty(&self) -> bool {
        self.duration.is_none() && self.properties.is_empty()
    }
}

/// One placement of a base media asset inside a spawn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnAsset {
    pub id: SpawnAssetId,
    /// Reference to the base media asset in the asset library.
    pub asset_id: String,
    pub enabled: bool,
    /// 0-based position within the spawn. Contiguous after any
    /// reorder/removal; the store renumbers on update.
    pub order: u32,
    #[serde(default, skip_serializing_if = "AssetOverrides::is_empty")]
    pub overrides: AssetOverrides,
}

impl SpawnAsset {
    pub fn new(asset_id: impl Into<String>, order: u32) -> Self {
        SpawnAsset {
            id: SpawnAssetId::new(),
            asset_id: asset_id.into(),
            enabled: true,
            order,
            overrides: AssetOverrides::default(),
        }
    }
}

/// What fires a spawn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Trigger {
    Manual,
    Command { command: String },
    ChannelPointReward { reward: String },
    Timer { interval_ms: u64 },
}

/// A named subset of a spawn's assets from which the host picks `pick`
/// entries at random instead of playing all of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RandomizationBucket {
    pub id: String,
    pub name: String,
    pub pick: u32,
    pub members: Vec<SpawnAssetId>,
}

/// A named, orderable, enable-able trigger unit. Mutated only through the
/// persistence collaborator, which also stamps `last_modified`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Spawn {
    pub id: SpawnId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub trigger: Trigger,
    pub enabled: bool,
    /// Default playback duration in milliseconds for every asset in this
    /// spawn, unless a placement overrides it.
    pub duration: u64,
    #[serde(default, skip_serializing_if = "AssetProperties::is_empty")]
    pub default_properties: AssetProperties,
    #[serde(default)]
    pub assets: Vec<SpawnAsset>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub randomization_buckets: Vec<RandomizationBucket>,
    #[serde(with = "time::serde::rfc3339")]
    pub last_modified: OffsetDateTime,
}

impl Spawn {
    pub fn new(name: impl Into<String>) -> Self {
        Spawn {
            id: SpawnId::new(),
            name: name.into(),
            description: None,
            trigger: Trigger::Manual,
            enabled: true,
            duration: 5000,
            default_properties: AssetProperties::default(),
            assets: Vec::new(),
            randomization_buckets: Vec::new(),
            last_modified: OffsetDateTime::UNIX_EPOCH,
        }
    }

    pub fn asset(&self, id: &SpawnAssetId) -> Option<&SpawnAsset> {
        self.assets.iter().find(|asset| &asset.id == id)
    }

    pub fn asset_mut(&mut self, id: &SpawnAssetId) -> Option<&mut SpawnAsset> {
        self.assets.iter_mut().find(|asset| &asset.id == id)
    }
}

/// The whole locally-edited configuration: what gets exported, hashed and
/// compared against the remote host's copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub spawns: Vec<Spawn>,
}

impl Profile {
    pub fn new(name: impl Into<String>) -> Self {
        Profile {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            spawns: Vec::new(),
        }
    }

    pub fn spawn(&self, id: &SpawnId) -> Option<&Spawn> {
        self.spawns.iter().find(|spawn| &spawn.id == id)
    }

    pub fn spawn_mut(&mut self, id: &SpawnId) -> Option<&mut Spawn> {
        self.spawns.iter_mut().find(|spawn| &spawn.id == id)
    }
}
