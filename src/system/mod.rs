// System Layer
pub mod archive;
pub mod backup;
pub mod path_mapper;
pub mod scanner;
pub mod stream;

pub use archive::{
    codec_for, detect_archive_format, ArchiveCodec, ArchiveFormat, ArchiveReader, ArchiveWriter,
    CodecOptions,
};
pub use backup::Backup;
