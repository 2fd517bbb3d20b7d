//! Layer archive primitives: reproducible tar writers and digests.

pub mod digest;
mod tar_writer;

pub use digest::{sha256_bytes, sha256_file, HashingWriter, SHA256_PREFIX};
pub use tar_writer::{
    EntryKind, LayerOs, LinuxLayerWriter, TarEntry, TarWriter, TarWriterFactory,
    WindowsLayerWriter, NORMALIZED_MTIME, NORMALIZED_TIMESTAMP,
};
