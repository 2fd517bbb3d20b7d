//! Layer tar writers.
//!
//! Layers are written as plain ustar archives with fixed ownership and a
//! normalized modification time so identical input produces identical
//! bytes. Entry names are stored verbatim, including a leading `/`.

use std::fmt;
use std::io::{self, Write};

use cnb_assets_core::error::{AssetError, Result};

/// Modification time stamped on every entry: 1980-01-01T00:00:01Z.
pub const NORMALIZED_MTIME: u64 = 315_532_801;

/// [`NORMALIZED_MTIME`] as an RFC 3339 timestamp.
pub const NORMALIZED_TIMESTAMP: &str = "1980-01-01T00:00:01Z";

/// Kind of a tar entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
}

/// Header fields of one layer entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TarEntry {
    pub kind: EntryKind,
    pub name: String,
    pub mode: u32,
    pub mtime: u64,
}

impl TarEntry {
    /// Directory entry with mode 0755 and the normalized mtime.
    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            kind: EntryKind::Directory,
            name: name.into(),
            mode: 0o755,
            mtime: NORMALIZED_MTIME,
        }
    }

    /// Regular file entry with mode 0755 and the normalized mtime.
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            kind: EntryKind::File,
            name: name.into(),
            mode: 0o755,
            mtime: NORMALIZED_MTIME,
        }
    }
}

/// Writes entries of a single layer.
pub trait TarWriter {
    /// Append one entry; `data` is empty for directories.
    fn write_entry(&mut self, entry: &TarEntry, data: &[u8]) -> io::Result<()>;

    /// Write the end-of-archive marker and flush.
    fn finish(self: Box<Self>) -> io::Result<()>;
}

/// Operating system a layer is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerOs {
    Linux,
    Windows,
}

impl fmt::Display for LayerOs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerOs::Linux => f.write_str("linux"),
            LayerOs::Windows => f.write_str("windows"),
        }
    }
}

/// Creates the layer tar writer matching a target OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TarWriterFactory {
    os: LayerOs,
}

impl TarWriterFactory {
    /// Factory for `os`; unsupported operating systems are rejected up front.
    pub fn for_os(os: &str) -> Result<Self> {
        let os = match os {
            "linux" => LayerOs::Linux,
            "windows" => LayerOs::Windows,
            other => {
                return Err(AssetError::ConfigError(format!(
                    "unsupported OS {:?} for layer tar writer",
                    other
                )))
            }
        };
        Ok(Self { os })
    }

    pub fn os(&self) -> LayerOs {
        self.os
    }

    /// Wrap `out` in the writer for this factory's OS.
    pub fn create<'a, W: Write + 'a>(&self, out: W) -> Box<dyn TarWriter + 'a> {
        match self.os {
            LayerOs::Linux => Box::new(LinuxLayerWriter::new(out)),
            LayerOs::Windows => Box::new(WindowsLayerWriter::new(out)),
        }
    }
}

/// Writes entries exactly as given.
pub struct LinuxLayerWriter<W: Write> {
    builder: tar::Builder<W>,
}

impl<W: Write> LinuxLayerWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            builder: tar::Builder::new(out),
        }
    }

    fn append(&mut self, entry: &TarEntry, data: &[u8]) -> io::Result<()> {
        let mut header = tar::Header::new_ustar();
        set_raw_path(&mut header, &entry.name)?;
        header.set_entry_type(match entry.kind {
            EntryKind::Directory => tar::EntryType::Directory,
            EntryKind::File => tar::EntryType::Regular,
        });
        header.set_mode(entry.mode);
        header.set_uid(0);
        header.set_gid(0);
        header.set_mtime(entry.mtime);
        header.set_size(data.len() as u64);
        header.set_cksum();
        self.builder.append(&header, data)
    }

    fn close(self) -> io::Result<()> {
        let mut out = self.builder.into_inner()?;
        out.flush()
    }
}

impl<W: Write> TarWriter for LinuxLayerWriter<W> {
    fn write_entry(&mut self, entry: &TarEntry, data: &[u8]) -> io::Result<()> {
        self.append(entry, data)
    }

    fn finish(self: Box<Self>) -> io::Result<()> {
        (*self).close()
    }
}

/// Windows container layers keep file content under `Files/` next to a
/// `Hives/` directory; every entry is rewritten under `Files/`.
pub struct WindowsLayerWriter<W: Write> {
    inner: LinuxLayerWriter<W>,
    roots_written: bool,
}

impl<W: Write> WindowsLayerWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            inner: LinuxLayerWriter::new(out),
            roots_written: false,
        }
    }

    fn write_roots(&mut self) -> io::Result<()> {
        if !self.roots_written {
            self.inner.append(&TarEntry::dir("Files"), &[])?;
            self.inner.append(&TarEntry::dir("Hives"), &[])?;
            self.roots_written = true;
        }
        Ok(())
    }
}

impl<W: Write> TarWriter for WindowsLayerWriter<W> {
    fn write_entry(&mut self, entry: &TarEntry, data: &[u8]) -> io::Result<()> {
        self.write_roots()?;
        let rewritten = TarEntry {
            name: format!("Files/{}", entry.name.trim_start_matches('/')),
            ..entry.clone()
        };
        self.inner.append(&rewritten, data)
    }

    fn finish(mut self: Box<Self>) -> io::Result<()> {
        self.write_roots()?;
        let this = *self;
        this.inner.close()
    }
}

/// Store `name` in the ustar name/prefix fields without path validation.
fn set_raw_path(header: &mut tar::Header, name: &str) -> io::Result<()> {
    let bytes = name.as_bytes();
    let ustar = header
        .as_ustar_mut()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "not a ustar header"))?;

    let (name_len, prefix_len) = (ustar.name.len(), ustar.prefix.len());
    if bytes.len() <= name_len {
        ustar.name[..bytes.len()].copy_from_slice(bytes);
        return Ok(());
    }

    // Long names are split at a '/' into prefix and name.
    let split = bytes
        .iter()
        .enumerate()
        .filter(|(i, b)| {
            **b == b'/'
                && *i > 0
                && *i <= prefix_len
                && bytes.len() - *i - 1 <= name_len
        })
        .map(|(i, _)| i)
        .next()
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("path too long for layer entry: {}", name),
            )
        })?;

    ustar.prefix[..split].copy_from_slice(&bytes[..split]);
    let rest = &bytes[split + 1..];
    ustar.name[..rest.len()].copy_from_slice(rest);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn entries(bytes: &[u8]) -> Vec<(String, tar::EntryType, u32, u64, String)> {
        let mut archive = tar::Archive::new(bytes);
        archive
            .entries()
            .unwrap()
            .map(|e| {
                let mut e = e.unwrap();
                let path = String::from_utf8(e.path_bytes().into_owned()).unwrap();
                let header = e.header().clone();
                let mut content = String::new();
                e.read_to_string(&mut content).unwrap();
                (
                    path,
                    header.entry_type(),
                    header.mode().unwrap(),
                    header.mtime().unwrap(),
                    content,
                )
            })
            .collect()
    }

    fn write_sample(factory: TarWriterFactory) -> Vec<u8> {
        let mut out = Vec::new();
        let mut writer = factory.create(&mut out);
        writer.write_entry(&TarEntry::dir("/cnb"), &[]).unwrap();
        writer
            .write_entry(&TarEntry::file("/cnb/asset.txt"), b"content")
            .unwrap();
        writer.finish().unwrap();
        out
    }

    #[test]
    fn test_factory_rejects_unknown_os() {
        let err = TarWriterFactory::for_os("unknown-os").unwrap_err();
        assert!(err.to_string().contains("layer tar writer"));
    }

    #[test]
    fn test_factory_os() {
        assert_eq!(TarWriterFactory::for_os("linux").unwrap().os(), LayerOs::Linux);
        assert_eq!(
            TarWriterFactory::for_os("windows").unwrap().os(),
            LayerOs::Windows
        );
    }

    #[test]
    fn test_linux_writer_keeps_absolute_names() {
        let out = write_sample(TarWriterFactory::for_os("linux").unwrap());
        let entries = entries(&out);

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, "/cnb");
        assert_eq!(entries[0].1, tar::EntryType::Directory);
        assert_eq!(entries[0].2, 0o755);
        assert_eq!(entries[0].3, NORMALIZED_MTIME);
        assert_eq!(entries[1].0, "/cnb/asset.txt");
        assert_eq!(entries[1].1, tar::EntryType::Regular);
        assert_eq!(entries[1].4, "content");
    }

    #[test]
    fn test_windows_writer_prefixes_files() {
        let out = write_sample(TarWriterFactory::for_os("windows").unwrap());
        let names: Vec<String> = entries(&out).into_iter().map(|e| e.0).collect();
        assert_eq!(names, vec!["Files", "Hives", "Files/cnb", "Files/cnb/asset.txt"]);
    }

    #[test]
    fn test_output_is_reproducible() {
        let factory = TarWriterFactory::for_os("linux").unwrap();
        assert_eq!(write_sample(factory), write_sample(factory));
    }

    #[test]
    fn test_long_name_uses_prefix() {
        let dir = format!("/cnb/{}", "d".repeat(80));
        let name = format!("{}/{}", dir, "f".repeat(60));

        let mut out = Vec::new();
        let mut writer = TarWriterFactory::for_os("linux").unwrap().create(&mut out);
        writer.write_entry(&TarEntry::file(name.as_str()), b"x").unwrap();
        writer.finish().unwrap();

        assert_eq!(entries(&out)[0].0, name);
    }

    #[test]
    fn test_name_too_long() {
        let name = "x".repeat(300);
        let mut out = Vec::new();
        let mut writer = TarWriterFactory::for_os("linux").unwrap().create(&mut out);
        assert!(writer.write_entry(&TarEntry::file(name), b"x").is_err());
    }
}
