pub mod draft;
pub mod event_bus;
pub mod export;
pub mod host;
pub mod override_diff;
pub mod persistence;
pub mod resolution;
pub mod spawn;
pub mod storage;
pub mod sync;
pub mod workspace;

pub use draft::{
    CachedDraft, CloseResponse, Draft, DraftCache, DraftKey, DraftSession, DraftState, EditorError,
    SaveError, SLIDER_QUIET_PERIOD,
};
pub use event_bus::{EventBus, SpawnEvent, Subscription};
pub use export::{ConfigExporter, ExportError, ProfileExporter};
pub use host::{ConnectionState, HostError, RemoteHost};
pub use override_diff::{build_overrides_diff, DesiredValues};
pub use resolution::{
    resolve_effective_duration, resolve_effective_properties, PropertySource, ResolvedProperties,
    SourceMap,
};
pub use persistence::{InMemorySpawnStore, SpawnStore, UpdateError, UpdateSpawnFields};
pub use spawn::{
    AssetOverrides, AssetProperties, Crop, Dimensions, Position, PositionMode, Profile,
    PropertyKey, PropertyTypeError, PropertyValue, RandomizationBucket, Scale, Spawn, SpawnAsset,
    SpawnAssetId, SpawnId, Trigger,
};
pub use storage::{MemoryStorage, Storage};
pub use sync::{
    hash_config, SyncError, SyncErrorKind, SyncStatus, SyncStatusInfo, SyncStatusMonitor,
};
pub use workspace::Workspace;
