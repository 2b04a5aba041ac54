use std::{
    fmt,
    fs::File,
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

/// A sized, randomly readable byte source for one packed entry.
///
/// Providers are shared between the builder's entry table and its callers.
/// Reads are positioned and stateless, so a frozen archive can serve any
/// number of readers over the same backing files.
pub trait EntryProvider: Send + Sync {
    /// Size of the packed representation in bytes.
    fn size(&self) -> u64;

    /// Reads up to `buf.len()` bytes starting at `offset` into the packed
    /// representation and returns the number of bytes written. Fewer bytes
    /// than requested means the read ran past the end or the backing source
    /// came up short.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;
}

/// A shared, immutable handle to an opened backing file.
///
/// Clones share the underlying descriptor; all reads are `pread`-style and
/// leave no cursor state behind, which is what lets many [`EntryProvider`]
/// views serve the same file concurrently.
#[derive(Clone)]
pub struct SharedFile {
    file: Arc<File>,
    path: Option<PathBuf>,
    len: u64,
}

impl SharedFile {
    /// Opens `path`, resolved to its canonical form so that views of the
    /// same file compare equal regardless of how they were reached.
    pub fn open(path: &Path) -> io::Result<Self> {
        let canonical = path.canonicalize()?;
        Self::from_file(File::open(&canonical)?, Some(canonical))
    }

    pub fn from_file(file: File, path: Option<PathBuf>) -> io::Result<Self> {
        let len = file.metadata()?.len();
        Ok(Self {
            file: Arc::new(file),
            path,
            len,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[cfg(unix)]
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        use std::os::unix::fs::FileExt;
        self.file.read_at(buf, offset)
    }

    #[cfg(windows)]
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        use std::os::windows::fs::FileExt;
        self.file.seek_read(buf, offset)
    }

    /// Reads exactly `buf.len()` bytes at `offset` or fails.
    pub fn read_exact_at(&self, mut offset: u64, mut buf: &mut [u8]) -> io::Result<()> {
        while !buf.is_empty() {
            match self.read_at(offset, buf)? {
                0 => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "unexpected end of backing file",
                    ))
                }
                n => {
                    offset += n as u64;
                    let rest = buf;
                    buf = &mut rest[n..];
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for SharedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedFile")
            .field("path", &self.path)
            .field("len", &self.len)
            .finish()
    }
}

/// What a loose file holds, decided from its size and lowercased extension.
///
/// The kind selects which packer an entry goes through. Packing is performed
/// by external codecs; the providers here serve the packed bytes verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Empty,
    Texture,
    Model,
    Binary,
}

impl ContentKind {
    pub fn of(path: &Path, len: u64) -> Self {
        if len == 0 {
            return Self::Empty;
        }
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match extension.as_deref() {
            Some("tex") => Self::Texture,
            Some("mdl") => Self::Model,
            _ => Self::Binary,
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Empty => "empty",
            Self::Texture => "texture",
            Self::Model => "model",
            Self::Binary => "binary",
        })
    }
}

/// Provider for an entry with no payload at all.
#[derive(Debug, Default)]
pub struct EmptyEntryProvider;

impl EntryProvider for EmptyEntryProvider {
    fn size(&self) -> u64 {
        0
    }

    fn read_at(&self, _offset: u64, _buf: &mut [u8]) -> io::Result<usize> {
        Ok(0)
    }
}

/// Provider serving a whole backing file as one entry.
#[derive(Debug)]
pub struct FileEntryProvider {
    file: SharedFile,
    kind: ContentKind,
}

impl FileEntryProvider {
    pub fn texture(file: SharedFile) -> Self {
        Self {
            file,
            kind: ContentKind::Texture,
        }
    }

    pub fn model(file: SharedFile) -> Self {
        Self {
            file,
            kind: ContentKind::Model,
        }
    }

    pub fn binary(file: SharedFile) -> Self {
        Self {
            file,
            kind: ContentKind::Binary,
        }
    }

    pub fn kind(&self) -> ContentKind {
        self.kind
    }
}

impl EntryProvider for FileEntryProvider {
    fn size(&self) -> u64 {
        self.file.len()
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read_at(offset, buf)
    }
}

/// Provider serving an `(offset, size)` window of a shared backing file,
/// e.g. one mod's slice of a `TTMPD.mpd` blob or one packed entry of an
/// existing archive's dat.
#[derive(Debug)]
pub struct SliceEntryProvider {
    file: SharedFile,
    offset: u64,
    size: u64,
}

impl SliceEntryProvider {
    pub fn new(file: SharedFile, offset: u64, size: u64) -> Self {
        Self { file, offset, size }
    }
}

impl EntryProvider for SliceEntryProvider {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        if offset >= self.size {
            return Ok(0);
        }
        let available = ((self.size - offset).min(buf.len() as u64)) as usize;
        self.file.read_at(self.offset + offset, &mut buf[..available])
    }
}

/// Provider over an in-memory payload.
#[derive(Debug)]
pub struct MemoryEntryProvider {
    bytes: Vec<u8>,
}

impl MemoryEntryProvider {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

impl EntryProvider for MemoryEntryProvider {
    fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        if offset >= self.bytes.len() as u64 {
            return Ok(0);
        }
        let src = &self.bytes[offset as usize..];
        let available = src.len().min(buf.len());
        buf[..available].copy_from_slice(&src[..available]);
        Ok(available)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_kind_dispatches_on_lowercased_extension() {
        assert_eq!(ContentKind::of(Path::new("a/b.TEX"), 4), ContentKind::Texture);
        assert_eq!(ContentKind::of(Path::new("a/b.mdl"), 4), ContentKind::Model);
        assert_eq!(ContentKind::of(Path::new("a/b.lua"), 4), ContentKind::Binary);
        assert_eq!(ContentKind::of(Path::new("a/b"), 4), ContentKind::Binary);
        assert_eq!(ContentKind::of(Path::new("a/b.tex"), 0), ContentKind::Empty);
    }

    #[test]
    fn memory_provider_serves_windows() {
        let provider = MemoryEntryProvider::new(b"0123456789".to_vec());
        let mut buf = [0u8; 4];

        assert_eq!(provider.read_at(0, &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"0123");

        assert_eq!(provider.read_at(8, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"89");

        assert_eq!(provider.read_at(10, &mut buf).unwrap(), 0);
        assert_eq!(provider.size(), 10);
    }
}
