use thiserror::Error;

/// Hard failures surfaced by the map core.
///
/// Bad ids and out-of-bounds coordinates on the primary query/mutator paths
/// are not represented here: those are logged and recovered locally with a
/// sentinel return. The variants below are the conditions that must reach the
/// caller.
#[derive(Error, Debug)]
pub enum MapError {
    /// The unit id space is fully allocated. A systemic capacity problem,
    /// distinct from any "not found" condition.
    #[error("Unit id space exhausted: no free ids remain")]
    UnitIdsExhausted,

    /// The requested army does not exist on the map.
    #[error("Army not found: {0}")]
    ArmyNotFound(crate::core::types::ArmyId),

    /// A serialization operation was requested before a codec was configured.
    #[error("No map codec has been configured")]
    CodecNotSet,

    /// A snapshot referenced a definition name unknown to the catalog.
    #[error("Unknown definition: {0}")]
    UnknownDefinition(String),

    /// A snapshot failed validation while being applied.
    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    /// The codec rejected the stream.
    #[error("Codec error: {0}")]
    Codec(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MapError>;
