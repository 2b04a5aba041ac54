use std::{fs::File, path::Path, sync::Arc};

use hashbrown::HashMap;

use crate::{
    errors::{AddError, CreateError, FreezeError, IngestError, ReadError, TtmpError},
    format::{
        sign_header, DataHeader, FileSegmentEntry, FileSegmentEntry2, FolderSegmentEntry,
        IndexHeader, IndexType, LEDataLocator, SegmentDescriptor, SqpackHeader, SqpackType,
        DATA_HEADER_SIZE, ENTRY_ALIGNMENT, INDEX_HEADER_SIZE, SQPACK_HEADER_SIZE,
    },
    pathspec::PathSpec,
    provider::{
        ContentKind, EmptyEntryProvider, EntryProvider, FileEntryProvider, SharedFile,
        SliceEntryProvider,
    },
    reader::SqPackReader,
    ttmp,
};

/// Bytes taken by the two fixed headers at the start of every data span.
const DATA_FIXED_HEADERS: u64 = (SQPACK_HEADER_SIZE + DATA_HEADER_SIZE) as u64;

/// One interned asset: its addressing value, its payload source, and, once
/// the builder is frozen, its placement inside the data spans.
pub struct Entry {
    path_spec: PathSpec,
    provider: Arc<dyn EntryProvider>,
    data_file_index: u32,
    block_size: u32,
    pad_size: u32,
    offset_after_headers: u64,
    locator: LEDataLocator,
}

impl Entry {
    fn new(path_spec: PathSpec, provider: Arc<dyn EntryProvider>) -> Self {
        Self {
            path_spec,
            provider,
            data_file_index: 0,
            block_size: 0,
            pad_size: 0,
            offset_after_headers: 0,
            locator: LEDataLocator::default(),
        }
    }

    pub fn path_spec(&self) -> &PathSpec {
        &self.path_spec
    }

    pub fn provider(&self) -> &Arc<dyn EntryProvider> {
        &self.provider
    }

    /// Index of the span this entry was packed into. Zero before freeze.
    pub fn data_file_index(&self) -> u32 {
        self.data_file_index
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn pad_size(&self) -> u32 {
        self.pad_size
    }

    pub fn offset_after_headers(&self) -> u64 {
        self.offset_after_headers
    }

    pub fn locator(&self) -> LEDataLocator {
        self.locator
    }

    /// Bytes this entry occupies in its span: block plus alignment padding.
    fn stored_size(&self) -> u64 {
        self.block_size as u64 + self.pad_size as u64
    }
}

/// Aggregated outcome of one or more `add` calls.
///
/// Each list holds indexes of the affected entries, resolvable through
/// [`VirtualSqPack::entry`]; the indexes stay valid for the builder's whole
/// lifetime since entries are never removed.
#[derive(Debug, Default, Clone)]
pub struct AddResult {
    pub added: Vec<usize>,
    pub replaced: Vec<usize>,
    pub skipped_existing: Vec<usize>,
}

impl AddResult {
    fn added(index: usize) -> Self {
        Self {
            added: vec![index],
            ..Self::default()
        }
    }

    fn replaced(index: usize) -> Self {
        Self {
            replaced: vec![index],
            ..Self::default()
        }
    }

    fn skipped(index: usize) -> Self {
        Self {
            skipped_existing: vec![index],
            ..Self::default()
        }
    }

    /// Any affected entry, preferring added over replaced over skipped.
    pub fn any_item(&self) -> Option<usize> {
        self.added
            .first()
            .or_else(|| self.replaced.first())
            .or_else(|| self.skipped_existing.first())
            .copied()
    }

    /// All affected entries, grouped in added, replaced, skipped order.
    pub fn all_entries(&self) -> Vec<usize> {
        let mut all = Vec::with_capacity(
            self.added.len() + self.replaced.len() + self.skipped_existing.len(),
        );
        all.extend_from_slice(&self.added);
        all.extend_from_slice(&self.replaced);
        all.extend_from_slice(&self.skipped_existing);
        all
    }
}

impl std::ops::AddAssign for AddResult {
    fn add_assign(&mut self, other: Self) {
        self.added.extend(other.added);
        self.replaced.extend(other.replaced);
        self.skipped_existing.extend(other.skipped_existing);
    }
}

struct IndexStream {
    header: [u8; SQPACK_HEADER_SIZE],
    subheader: [u8; INDEX_HEADER_SIZE],
    files: Vec<u8>,
    folders: Vec<u8>,
}

struct Span {
    header: DataHeader,
    header_bytes: [u8; DATA_HEADER_SIZE],
    /// Indexes of the entries packed into this span, ascending by
    /// `offset_after_headers`.
    entry_order: Vec<usize>,
}

struct Frozen {
    index1: IndexStream,
    index2: IndexStream,
    data_header: [u8; SQPACK_HEADER_SIZE],
    spans: Vec<Span>,
    file_entries_1: Vec<FileSegmentEntry>,
    file_entries_2: Vec<FileSegmentEntry2>,
    folder_entries: Vec<FolderSegmentEntry>,
}

/// An in-memory SqPack archive assembled from heterogeneous sources.
///
/// Entries come in through [`add`], [`add_file`], [`add_entries_from_sqpack`]
/// and [`add_entries_from_ttmp`], keyed and deduplicated by their
/// [`PathSpec`]. [`freeze`] assigns placement once, after which the archive
/// serves `index1`, `index2` and every `dat` span as synthetic byte streams
/// through [`read_index1`], [`read_index2`] and [`read_data`] without ever
/// materializing them.
///
/// The builder is single-owner and externally synchronized: mutation and
/// freeze happen on one caller; after freeze the whole data graph is
/// immutable and reads only take `&self`, so they can be issued from any
/// number of threads.
///
/// [`add`]: VirtualSqPack::add
/// [`add_file`]: VirtualSqPack::add_file
/// [`add_entries_from_sqpack`]: VirtualSqPack::add_entries_from_sqpack
/// [`add_entries_from_ttmp`]: VirtualSqPack::add_entries_from_ttmp
/// [`freeze`]: VirtualSqPack::freeze
/// [`read_index1`]: VirtualSqPack::read_index1
/// [`read_index2`]: VirtualSqPack::read_index2
/// [`read_data`]: VirtualSqPack::read_data
pub struct VirtualSqPack {
    expansion: String,
    name: String,
    max_file_size: u64,

    entries: Vec<Entry>,
    component_index: HashMap<(u32, u32), usize>,
    fullpath_index: HashMap<u32, usize>,

    index1_segment2: Vec<u8>,
    index1_segment3: Vec<u8>,
    index2_segment2: Vec<u8>,
    index2_segment3: Vec<u8>,

    open_files: Vec<SharedFile>,
    frozen: Option<Frozen>,
}

impl VirtualSqPack {
    /// Creates an empty builder for the archive `name` (e.g. `040000`) of
    /// `expansion` (e.g. `ffxiv`), with data spans capped at
    /// `max_file_size` bytes.
    pub fn new(
        expansion: impl Into<String>,
        name: impl Into<String>,
        max_file_size: u64,
    ) -> Result<Self, CreateError> {
        if max_file_size > DataHeader::MAX_FILE_SIZE {
            return Err(CreateError::MaxFileSizeTooLarge {
                size: max_file_size,
            });
        }

        Ok(Self {
            expansion: expansion.into(),
            name: name.into(),
            max_file_size,
            entries: Vec::new(),
            component_index: HashMap::new(),
            fullpath_index: HashMap::new(),
            index1_segment2: Vec::new(),
            index1_segment3: Vec::new(),
            index2_segment2: Vec::new(),
            index2_segment3: Vec::new(),
            open_files: Vec::new(),
            frozen: None,
        })
    }

    pub fn expansion(&self) -> &str {
        &self.expansion
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.is_some()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn entry(&self, index: usize) -> Option<&Entry> {
        self.entries.get(index)
    }

    /// The number of data spans. Zero until the builder is frozen.
    pub fn data_file_count(&self) -> usize {
        self.frozen.as_ref().map_or(0, |frozen| frozen.spans.len())
    }

    /// Interns an entry under the keys its `path_spec` carries.
    ///
    /// If an entry with the same component key (or, failing that, the same
    /// full path key) already exists, the incoming spec's hashes are merged
    /// into the stored one and the entry is either kept (`overwrite_existing
    /// == false`, reported as skipped) or has its provider swapped for the
    /// incoming one (reported as replaced). The component key is probed
    /// first; a hit there ends the lookup without consulting the full path
    /// key.
    pub fn add(
        &mut self,
        path_spec: PathSpec,
        provider: Arc<dyn EntryProvider>,
        overwrite_existing: bool,
    ) -> Result<AddResult, AddError> {
        if self.frozen.is_some() {
            return Err(AddError::Frozen);
        }
        debug_assert!(path_spec.has_component_hash() || path_spec.has_full_path_hash());

        if path_spec.has_component_hash() {
            if let Some(&index) = self.component_index.get(&path_spec.component_key()) {
                return Ok(self.upsert(index, path_spec, provider, overwrite_existing));
            }
        }
        if path_spec.has_full_path_hash() {
            if let Some(&index) = self.fullpath_index.get(&path_spec.full_key()) {
                return Ok(self.upsert(index, path_spec, provider, overwrite_existing));
            }
        }

        let index = self.entries.len();
        if path_spec.has_full_path_hash() {
            self.fullpath_index.insert(path_spec.full_key(), index);
        }
        if path_spec.has_component_hash() {
            self.component_index.insert(path_spec.component_key(), index);
        }
        log::trace!(target: "vsqpack", "added {path_spec} as entry {index}");
        self.entries.push(Entry::new(path_spec, provider));
        Ok(AddResult::added(index))
    }

    fn upsert(
        &mut self,
        index: usize,
        path_spec: PathSpec,
        provider: Arc<dyn EntryProvider>,
        overwrite_existing: bool,
    ) -> AddResult {
        let entry = &mut self.entries[index];
        entry.path_spec.update(&path_spec);
        if !overwrite_existing {
            log::trace!(target: "vsqpack", "skipped {path_spec}, entry {index} already present");
            return AddResult::skipped(index);
        }
        entry.provider = provider;
        log::trace!(target: "vsqpack", "replaced entry {index} with {path_spec}");
        AddResult::replaced(index)
    }

    /// Opens (or reuses) a backing file, deduplicated by resolved canonical
    /// path. Opened files are retained for the builder's lifetime.
    pub fn open_file(
        &mut self,
        path: Option<&Path>,
        already_opened: Option<File>,
    ) -> Result<SharedFile, AddError> {
        let shared = match (path, already_opened) {
            (Some(path), Some(file)) => SharedFile::from_file(file, Some(path.canonicalize()?))?,
            (Some(path), None) => SharedFile::open(path)?,
            (None, Some(file)) => SharedFile::from_file(file, None)?,
            (None, None) => return Err(AddError::MissingSource),
        };
        Ok(self.retain_file(shared))
    }

    fn retain_file(&mut self, file: SharedFile) -> SharedFile {
        if let Some(path) = file.path() {
            if let Some(existing) = self
                .open_files
                .iter()
                .find(|open| open.path() == Some(path))
            {
                return existing.clone();
            }
        }
        self.open_files.push(file.clone());
        file
    }

    /// Adds one loose file, dispatching on its size and lowercased extension
    /// to the matching content kind. Packing into the game's entry
    /// representation is the codecs' business; the providers serve the
    /// file's bytes as-is.
    pub fn add_file(
        &mut self,
        path_spec: PathSpec,
        path: &Path,
        overwrite_existing: bool,
    ) -> Result<AddResult, AddError> {
        if self.frozen.is_some() {
            return Err(AddError::Frozen);
        }

        let file = self.open_file(Some(path), None)?;
        let kind = ContentKind::of(path, file.len());
        log::debug!(
            target: "vsqpack",
            "adding {path_spec} from {} as {kind}",
            path.display()
        );

        let provider: Arc<dyn EntryProvider> = match kind {
            ContentKind::Empty => Arc::new(EmptyEntryProvider),
            ContentKind::Texture => Arc::new(FileEntryProvider::texture(file)),
            ContentKind::Model => Arc::new(FileEntryProvider::model(file)),
            ContentKind::Binary => Arc::new(FileEntryProvider::binary(file)),
        };
        self.add(path_spec, provider, overwrite_existing)
    }

    /// Ingests every entry of an existing on-disk archive, identified by the
    /// path of its `.index` file. Entry payloads are served from the base
    /// archive's dat files through the builder's open-file cache. With
    /// `overwrite_unknown_segments`, the base archive's opaque index
    /// segments 2 and 3 are adopted verbatim.
    pub fn add_entries_from_sqpack(
        &mut self,
        index_path: &Path,
        overwrite_existing: bool,
        overwrite_unknown_segments: bool,
    ) -> Result<AddResult, IngestError> {
        if self.frozen.is_some() {
            return Err(AddError::Frozen.into());
        }

        let reader = SqPackReader::open(index_path)?;
        log::debug!(
            target: "vsqpack",
            "ingesting {} entries from {}",
            reader.entries().len(),
            index_path.display()
        );

        if overwrite_unknown_segments {
            self.index1_segment2 = reader.index1().data_files_segment.clone();
            self.index1_segment3 = reader.index1().segment3.clone();
            self.index2_segment2 = reader.index2().data_files_segment.clone();
            self.index2_segment3 = reader.index2().segment3.clone();
        }

        let data_files: Vec<SharedFile> = reader
            .data_files()
            .iter()
            .map(|file| self.retain_file(file.clone()))
            .collect();

        let mut result = AddResult::default();
        for entry in reader.entries() {
            let file = data_files[entry.data_file_index as usize].clone();
            let provider = Arc::new(SliceEntryProvider::new(file, entry.offset, entry.size));
            result += self.add(entry.path_spec.clone(), provider, overwrite_existing)?;
        }
        Ok(result)
    }

    /// Ingests the entries of an extracted TTMP package directory that
    /// target this archive, honoring an optional `choices.json` next to the
    /// manifest. Payloads are slices of the package's `TTMPD.mpd`, which is
    /// opened lazily and only when some entry actually matches.
    pub fn add_entries_from_ttmp(
        &mut self,
        dir: &Path,
        overwrite_existing: bool,
    ) -> Result<AddResult, TtmpError> {
        if self.frozen.is_some() {
            return Err(AddError::Frozen.into());
        }

        let manifest = ttmp::Manifest::from_file(&dir.join("TTMPL.mpl"))?;
        let choices_path = dir.join("choices.json");
        let choices = if choices_path.exists() {
            log::debug!(target: "vsqpack", "choice file found at {}", choices_path.display());
            ttmp::Choices::from_file(&choices_path)?
        } else {
            ttmp::Choices::default()
        };

        let mut ttmpd: Option<SharedFile> = None;
        let mut result = AddResult::default();
        for selection in manifest.select(&choices)? {
            let entry = selection.entry;
            if entry.dat_file != self.name {
                continue;
            }

            let file = match &ttmpd {
                Some(file) => file.clone(),
                None => {
                    let file = self.open_file(Some(&dir.join("TTMPD.mpd")), None)?;
                    ttmpd = Some(file.clone());
                    file
                }
            };

            let provider = Arc::new(SliceEntryProvider::new(
                file,
                entry.mod_offset,
                entry.mod_size,
            ));
            let one = self.add(PathSpec::from_path(&entry.full_path), provider, overwrite_existing)?;
            log::debug!(
                target: "vsqpack",
                "{}: {} ({})",
                outcome_label(&one),
                entry.full_path,
                selection.trail
            );
            result += one;
        }
        Ok(result)
    }

    /// Assigns placement to every entry, derives both index tables and the
    /// folder directory, emits the fixed headers, and seals the builder.
    ///
    /// Entries are bin-packed into spans in insertion order; a span rolls
    /// over when the next aligned payload would push it past
    /// `max_file_size`. With `strict`, every emitted header is signed with
    /// the SHA-1 of its own bytes, matching what the game's native archives
    /// carry.
    pub fn freeze(&mut self, strict: bool) -> Result<(), FreezeError> {
        if self.frozen.is_some() {
            return Err(FreezeError::AlreadyFrozen);
        }
        log::debug!(
            target: "vsqpack",
            "freezing {}/{} with {} entries (strict: {strict})",
            self.expansion,
            self.name,
            self.entries.len()
        );

        struct Placement {
            data_file_index: u32,
            block_size: u32,
            pad_size: u32,
            offset_after_headers: u64,
            locator: LEDataLocator,
        }

        let mut spans: Vec<DataHeader> = Vec::new();
        let mut span_orders: Vec<Vec<usize>> = Vec::new();
        let mut placements: Vec<Placement> = Vec::with_capacity(self.entries.len());
        let mut file_entries_1: Vec<FileSegmentEntry> = Vec::new();
        let mut file_entries_2: Vec<FileSegmentEntry2> = Vec::new();

        for (index, entry) in self.entries.iter().enumerate() {
            let stream_size = entry.provider.size();
            let block_size =
                u32::try_from(stream_size).map_err(|_| FreezeError::EntryTooLarge {
                    spec: entry.path_spec.to_string(),
                    size: stream_size,
                })?;
            let pad_size = block_size.wrapping_neg() % ENTRY_ALIGNMENT;
            let required = block_size as u64 + pad_size as u64;

            if DATA_FIXED_HEADERS + required > self.max_file_size {
                return Err(FreezeError::EntryExceedsSpan {
                    spec: entry.path_spec.to_string(),
                    required: DATA_FIXED_HEADERS + required,
                    max: self.max_file_size,
                });
            }

            let needs_new_span = match spans.last() {
                None => true,
                Some(span) => DATA_FIXED_HEADERS + span.data_size + required > self.max_file_size,
            };
            if needs_new_span {
                if spans.len() == LEDataLocator::MAX_DATA_FILES {
                    return Err(FreezeError::TooManySpans {
                        count: spans.len() + 1,
                    });
                }
                spans.push(DataHeader::new(spans.len() as u32, self.max_file_size));
                span_orders.push(Vec::new());
            }

            let span = spans.last_mut().unwrap();
            let data_file_index = span.span_index;
            let offset_after_headers = span.data_size;
            span.data_size += required;
            span_orders.last_mut().unwrap().push(index);

            let locator =
                LEDataLocator::new(data_file_index, DATA_FIXED_HEADERS + offset_after_headers);
            placements.push(Placement {
                data_file_index,
                block_size,
                pad_size,
                offset_after_headers,
                locator,
            });

            if entry.path_spec.has_component_hash() {
                file_entries_1.push(FileSegmentEntry {
                    name_hash: entry.path_spec.name_hash,
                    folder_hash: entry.path_spec.folder_hash,
                    locator,
                });
            }
            if entry.path_spec.has_full_path_hash() {
                file_entries_2.push(FileSegmentEntry2 {
                    full_path_hash: entry.path_spec.full_path_hash,
                    locator,
                });
            }
        }

        // Even an empty archive serves a well-formed dat0.
        if spans.is_empty() {
            spans.push(DataHeader::new(0, self.max_file_size));
            span_orders.push(Vec::new());
        }

        for (entry, placement) in self.entries.iter_mut().zip(&placements) {
            entry.data_file_index = placement.data_file_index;
            entry.block_size = placement.block_size;
            entry.pad_size = placement.pad_size;
            entry.offset_after_headers = placement.offset_after_headers;
            entry.locator = placement.locator;
        }

        file_entries_1.sort_unstable_by_key(|entry| (entry.folder_hash, entry.name_hash));
        file_entries_2.sort_unstable_by_key(|entry| entry.full_path_hash);

        let file_segment_offset = (SQPACK_HEADER_SIZE + INDEX_HEADER_SIZE) as u32;

        // Run-length group the sorted index1 records into the folder
        // directory; each run records the absolute byte range of its file
        // records inside index1.
        let mut folder_entries: Vec<FolderSegmentEntry> = Vec::new();
        for (position, entry) in file_entries_1.iter().enumerate() {
            match folder_entries.last_mut() {
                Some(last) if last.folder_hash == entry.folder_hash => {
                    last.file_segment_size += FileSegmentEntry::SIZE as u32;
                }
                _ => folder_entries.push(FolderSegmentEntry {
                    folder_hash: entry.folder_hash,
                    file_segment_offset: file_segment_offset
                        + (position * FileSegmentEntry::SIZE) as u32,
                    file_segment_size: FileSegmentEntry::SIZE as u32,
                }),
            }
        }

        let mut sub1 = IndexHeader::new(IndexType::Index);
        sub1.file_segment = SegmentDescriptor {
            count: 1,
            offset: file_segment_offset,
            size: (file_entries_1.len() * FileSegmentEntry::SIZE) as u32,
        };
        sub1.data_files_segment = SegmentDescriptor {
            count: spans.len() as u32,
            offset: sub1.file_segment.end(),
            size: self.index1_segment2.len() as u32,
        };
        sub1.unknown_segment_3 = SegmentDescriptor {
            count: 0,
            offset: sub1.data_files_segment.end(),
            size: self.index1_segment3.len() as u32,
        };
        sub1.folder_segment = SegmentDescriptor {
            count: 0,
            offset: sub1.unknown_segment_3.end(),
            size: (folder_entries.len() * FolderSegmentEntry::SIZE) as u32,
        };

        let mut sub2 = IndexHeader::new(IndexType::Index2);
        sub2.file_segment = SegmentDescriptor {
            count: 1,
            offset: file_segment_offset,
            size: (file_entries_2.len() * FileSegmentEntry2::SIZE) as u32,
        };
        sub2.data_files_segment = SegmentDescriptor {
            count: spans.len() as u32,
            offset: sub2.file_segment.end(),
            size: self.index2_segment2.len() as u32,
        };
        sub2.unknown_segment_3 = SegmentDescriptor {
            count: 0,
            offset: sub2.data_files_segment.end(),
            size: self.index2_segment3.len() as u32,
        };
        sub2.folder_segment = SegmentDescriptor {
            count: 0,
            offset: sub2.unknown_segment_3.end(),
            size: 0,
        };

        let mut files1_bytes = Vec::with_capacity(file_entries_1.len() * FileSegmentEntry::SIZE);
        for entry in &file_entries_1 {
            entry.encode_into(&mut files1_bytes);
        }
        let mut files2_bytes = Vec::with_capacity(file_entries_2.len() * FileSegmentEntry2::SIZE);
        for entry in &file_entries_2 {
            entry.encode_into(&mut files2_bytes);
        }
        let mut folders_bytes = Vec::with_capacity(folder_entries.len() * FolderSegmentEntry::SIZE);
        for entry in &folder_entries {
            entry.encode_into(&mut folders_bytes);
        }

        let mut index1 = IndexStream {
            header: SqpackHeader::new(SqpackType::SqIndex).encode(),
            subheader: sub1.encode(),
            files: files1_bytes,
            folders: folders_bytes,
        };
        let mut index2 = IndexStream {
            header: SqpackHeader::new(SqpackType::SqIndex).encode(),
            subheader: sub2.encode(),
            files: files2_bytes,
            folders: Vec::new(),
        };
        let mut data_header = SqpackHeader::new(SqpackType::SqData).encode();
        let mut span_list: Vec<Span> = spans
            .into_iter()
            .zip(span_orders)
            .map(|(header, entry_order)| Span {
                header_bytes: header.encode(),
                header,
                entry_order,
            })
            .collect();

        if strict {
            sign_header(&mut index1.header);
            sign_header(&mut index1.subheader);
            sign_header(&mut index2.header);
            sign_header(&mut index2.subheader);
            sign_header(&mut data_header);
            for span in &mut span_list {
                sign_header(&mut span.header_bytes);
            }
        }

        log::debug!(
            target: "vsqpack",
            "frozen: {} index1 records, {} index2 records, {} folders, {} spans",
            file_entries_1.len(),
            file_entries_2.len(),
            folder_entries.len(),
            span_list.len()
        );

        self.frozen = Some(Frozen {
            index1,
            index2,
            data_header,
            spans: span_list,
            file_entries_1,
            file_entries_2,
            folder_entries,
        });
        Ok(())
    }

    fn frozen(&self) -> Result<&Frozen, ReadError> {
        self.frozen.as_ref().ok_or(ReadError::NotFrozen)
    }

    /// The sorted index1 file records. Available once frozen.
    pub fn file_entries_1(&self) -> Result<&[FileSegmentEntry], ReadError> {
        Ok(&self.frozen()?.file_entries_1)
    }

    /// The sorted index2 file records. Available once frozen.
    pub fn file_entries_2(&self) -> Result<&[FileSegmentEntry2], ReadError> {
        Ok(&self.frozen()?.file_entries_2)
    }

    /// The folder directory derived from index1. Available once frozen.
    pub fn folder_entries(&self) -> Result<&[FolderSegmentEntry], ReadError> {
        Ok(&self.frozen()?.folder_entries)
    }

    fn index1_regions<'a>(&'a self, frozen: &'a Frozen) -> [&'a [u8]; 6] {
        [
            &frozen.index1.header,
            &frozen.index1.subheader,
            &frozen.index1.files,
            &self.index1_segment2,
            &self.index1_segment3,
            &frozen.index1.folders,
        ]
    }

    fn index2_regions<'a>(&'a self, frozen: &'a Frozen) -> [&'a [u8]; 6] {
        [
            &frozen.index2.header,
            &frozen.index2.subheader,
            &frozen.index2.files,
            &self.index2_segment2,
            &self.index2_segment3,
            &frozen.index2.folders,
        ]
    }

    pub fn size_index1(&self) -> Result<u64, ReadError> {
        let frozen = self.frozen()?;
        Ok(self
            .index1_regions(frozen)
            .iter()
            .map(|region| region.len() as u64)
            .sum())
    }

    pub fn size_index2(&self) -> Result<u64, ReadError> {
        let frozen = self.frozen()?;
        Ok(self
            .index2_regions(frozen)
            .iter()
            .map(|region| region.len() as u64)
            .sum())
    }

    pub fn size_data(&self, data_file_index: u32) -> Result<u64, ReadError> {
        let frozen = self.frozen()?;
        let span = frozen
            .spans
            .get(data_file_index as usize)
            .ok_or(ReadError::UnknownDataFile {
                index: data_file_index,
                count: frozen.spans.len(),
            })?;
        Ok(DATA_FIXED_HEADERS + span.header.data_size)
    }

    /// Reads from the synthetic `index1` stream at `offset`. Returns the
    /// number of bytes written, short when the stream ends.
    pub fn read_index1(&self, offset: u64, buf: &mut [u8]) -> Result<usize, ReadError> {
        let frozen = self.frozen()?;
        Ok(read_regions(&self.index1_regions(frozen), offset, buf))
    }

    /// Reads from the synthetic `index2` stream at `offset`.
    pub fn read_index2(&self, offset: u64, buf: &mut [u8]) -> Result<usize, ReadError> {
        let frozen = self.frozen()?;
        Ok(read_regions(&self.index2_regions(frozen), offset, buf))
    }

    /// Reads from the synthetic `dat` stream of span `data_file_index` at
    /// `offset`: the two fixed headers followed by every entry's block and
    /// zero padding. A provider that fails or comes up short ends the read
    /// early; the return value is the number of bytes actually written.
    pub fn read_data(
        &self,
        data_file_index: u32,
        offset: u64,
        buf: &mut [u8],
    ) -> Result<usize, ReadError> {
        let frozen = self.frozen()?;
        let span = frozen
            .spans
            .get(data_file_index as usize)
            .ok_or(ReadError::UnknownDataFile {
                index: data_file_index,
                count: frozen.spans.len(),
            })?;
        if buf.is_empty() {
            return Ok(0);
        }

        let header_regions: [&[u8]; 2] = [&frozen.data_header, &span.header_bytes];
        let mut written = read_regions(&header_regions, offset, buf);
        if written == buf.len() {
            return Ok(written);
        }

        // Offset into the payload area past the two fixed headers.
        let mut relative = offset.saturating_sub(DATA_FIXED_HEADERS);
        let first = span.entry_order.partition_point(|&index| {
            let entry = &self.entries[index];
            entry.offset_after_headers + entry.stored_size() <= relative
        });
        if first == span.entry_order.len() {
            return Ok(written);
        }
        relative -= self.entries[span.entry_order[first]].offset_after_headers;

        for &index in &span.entry_order[first..] {
            let entry = &self.entries[index];

            if relative < entry.block_size as u64 {
                let wanted =
                    ((entry.block_size as u64 - relative) as usize).min(buf.len() - written);
                let got = match entry
                    .provider
                    .read_at(relative, &mut buf[written..written + wanted])
                {
                    Ok(got) => got,
                    Err(error) => {
                        log::debug!(
                            target: "vsqpack",
                            "provider read failed for {}: {error}",
                            entry.path_spec
                        );
                        return Ok(written);
                    }
                };
                written += got;
                if got < wanted {
                    log::debug!(
                        target: "vsqpack",
                        "short provider read for {}: {got}/{wanted} bytes",
                        entry.path_spec
                    );
                    return Ok(written);
                }
                relative = 0;
                if written == buf.len() {
                    break;
                }
            } else {
                relative -= entry.block_size as u64;
            }

            if relative < entry.pad_size as u64 {
                let wanted = ((entry.pad_size as u64 - relative) as usize).min(buf.len() - written);
                buf[written..written + wanted].fill(0);
                written += wanted;
                relative = 0;
                if written == buf.len() {
                    break;
                }
            } else {
                relative -= entry.pad_size as u64;
            }
        }

        Ok(written)
    }
}

fn outcome_label(result: &AddResult) -> &'static str {
    if !result.added.is_empty() {
        "added"
    } else if !result.replaced.is_empty() {
        "replaced"
    } else {
        "ignored"
    }
}

/// Reads from the logical concatenation of `regions`: regions wholly before
/// `offset` are skipped, the straddling one is consumed partially, and
/// subsequent regions fully, until the buffer fills or regions run out.
fn read_regions(regions: &[&[u8]], offset: u64, buf: &mut [u8]) -> usize {
    if buf.is_empty() {
        return 0;
    }

    let mut relative = offset;
    let mut written = 0;
    for region in regions {
        let len = region.len() as u64;
        if relative < len {
            let source = &region[relative as usize..];
            let available = source.len().min(buf.len() - written);
            buf[written..written + available].copy_from_slice(&source[..available]);
            written += available;
            relative = 0;
            if written == buf.len() {
                break;
            }
        } else {
            relative -= len;
        }
    }
    written
}
