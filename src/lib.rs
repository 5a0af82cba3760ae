#![doc = include_str!("../README.md")]
// When we return an error type, the possible errors are encoded within it.
#![allow(clippy::missing_errors_doc)]

pub mod archivable;
mod archive;
pub mod data_type;
mod io;
mod object;
mod result;
pub mod riff;
pub mod sample;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod uid;

pub use {
    archivable::{Archivable, Leaf, Serializable},
    archive::{Archive, FORMAT_MINOR_VERSION, MAGIC, NATIVE_ENUM_SIZE, Operation, TimeBase},
    data_type::{BaseKind, DataType},
    object::{Member, Object},
    result::{
        ArchiveError, ArchiveResult, DecodeError, SampleError, SampleResult, SchemaError,
        UsageError,
    },
    riff::{ChunkId, ChunkList, ChunkStream, MemChunk, MemList, Whence},
    sample::{
        CompressionInfo, DecompressionBuffer, LoopType, PlaybackState, RamCache, Sample,
        SampleFormat, SampleLoop, create_decompression_buffer,
    },
    uid::{Uid, UidChain},
};

#[cfg(target_endian = "big")]
const _: () = panic!("Only little endian architectures are supported currently.");
