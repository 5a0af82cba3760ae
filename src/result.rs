use {crate::riff::ChunkId, thiserror::Error};

/// Error that can happen when decoding an Srx byte stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The stream doesn't start with the Srx magic token
    #[error("Decode Error: Magic start missing!")]
    MissingMagic,
    /// Expected a blob, but the data ended first
    #[error("Decode Error: Missing blob")]
    MissingBlob,
    /// A blob's length prefix contains something other than decimal digits
    #[error("Decode Error: Missing blob size")]
    MissingBlobSize,
    /// A blob declares more bytes than are left in its enclosing blob
    #[error("Decode Error: Premature end of blob")]
    PrematureEnd,
    /// A blob length prefix doesn't fit into the address space
    #[error("Decode Error: Blob size overflow")]
    LengthOverflow,
    /// The root blob or the root object identity is empty
    #[error("Decode Error: No root object")]
    NoRootObject,
    /// The declared root object is not among the decoded objects
    #[error("Decode Error: Missing declared root object")]
    MissingRootObject,
    /// A numeric blob could not be parsed
    #[error("Decode Error: Invalid number")]
    InvalidNumber,
    /// A boolean blob is neither `0` nor `1`
    #[error("Decode Error: Invalid boolean value")]
    InvalidBool,
    /// Identity chains hold at most two identities (pointer slot and pointee)
    #[error("Decode Error: Identity chain too long")]
    UidChainTooLong,
}

/// Error that can happen while applying a decoded archive onto live objects
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// The source archive has no valid root object
    #[error("No source root object!")]
    NoSourceRoot,
    /// The freshly introspected destination has no valid root object
    #[error("Expected destination root object not found!")]
    NoDestinationRoot,
    /// Object versions are not compatible in either direction
    #[error(
        "Version incompatible (destination version {dst_version} [min. version {dst_min_version}], \
         source version {src_version} [min. version {src_min_version}])"
    )]
    VersionIncompatible {
        /// Version of the destination object
        dst_version: u32,
        /// Minimum version the destination object accepts
        dst_min_version: u32,
        /// Version of the source object
        src_version: u32,
        /// Minimum version the source object accepts
        src_min_version: u32,
    },
    /// Destination and source object have different data types
    #[error("Incompatible data structure type (destination type {dst} vs. source type {src})")]
    TypeMismatch {
        /// Long description of the destination type
        dst: String,
        /// Long description of the source type
        src: String,
    },
    /// No destination member could be matched with a source member
    #[error("Expected member '{name}' missing in destination object")]
    MissingMember {
        /// Name of the source member
        name: String,
    },
}

/// Error caused by calling an archive operation on the wrong kind of object
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    /// The object is invalid (no type or no identity)
    #[error("Invalid object")]
    InvalidObject,
    /// There is no object with the given identity in the archive
    #[error("No object with that identity in archive")]
    NoSuchObject,
    /// A primitive value was requested from a non-primitive object
    #[error("Object is class type")]
    NotPrimitive,
    /// The object's data type doesn't fit the requested operation
    #[error("Object is not of {expected} type (it is {actual})")]
    WrongCategory {
        /// What the operation needs
        expected: &'static str,
        /// Long description of what the object actually is
        actual: String,
    },
    /// A textual value could not be converted to the object's data type
    #[error("Value '{0}' can't be converted to the object's data type")]
    UnparsableValue(String),
    /// A shared object was already mutably borrowed during a pass
    #[error("Shared object is borrowed elsewhere")]
    BorrowConflict,
    /// A member was registered outside of any aggregate's `serialize` call
    #[error("Member '{0}' registered without a parent object")]
    NoParent(String),
    /// A member shares its identity with a different object, usually its
    /// parent when the parent has a single member of the same size
    #[error("Member '{0}' has the same identity as another object")]
    IdentityCollision(String),
}

/// Any error the serialization framework can produce
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArchiveError {
    /// Malformed byte stream
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// Incompatible data structures
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// Programmer error
    #[error(transparent)]
    Usage(#[from] UsageError),
}

/// Error that can happen when streaming Gigasampler sample data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SampleError {
    /// A frame starts with a compression mode byte outside 0..=5
    #[error("Unknown compression mode {0}")]
    UnknownCompressionMode(u8),
    /// Only 16 and 24 bit samples are supported
    #[error("Unsupported bit depth: {0}")]
    UnsupportedBitDepth(u16),
    /// Only mono and stereo samples are supported
    #[error("Unsupported channel count: {0}")]
    UnsupportedChannels(u16),
    /// A chunk the sample needs is absent from the wave list
    #[error("Mandatory chunk '{0}' missing")]
    MissingChunk(ChunkId),
    /// The format chunk is too small or otherwise unreadable
    #[error("Invalid format chunk")]
    InvalidFormatChunk,
    /// The data doesn't start with a `RIFF` header of the expected form type
    #[error("Not a RIFF '{0}' file")]
    NotRiff(ChunkId),
    /// Frame data ends before the samples it claims to hold
    #[error("Frame data truncated")]
    TruncatedFrame,
    /// The output buffer can't hold the decoded samples
    #[error("Output buffer too small")]
    BufferTooSmall,
}

/// Result of a serialization framework operation
pub type ArchiveResult<T = ()> = Result<T, ArchiveError>;

/// Result of a sample streaming operation
pub type SampleResult<T = ()> = Result<T, SampleError>;
