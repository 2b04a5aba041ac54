//! Reading existing on-disk archives.
//!
//! [`SqPackReader`] opens a base archive by the path of its `.index` file,
//! locates the sibling `.index2` and `.dat0..N` files, and yields one merged
//! record per packed entry: index1 contributes the component hash pair,
//! index2 the full path hash, matched up by locator. The reader does not
//! interpret entry payloads; it only hands out their byte ranges.

use std::{
    fs::File,
    io::{BufReader, Read, Seek, SeekFrom},
    path::{Path, PathBuf},
};

use hashbrown::HashMap;

use crate::{
    errors::ParseError,
    format::{
        FileSegmentEntry, FileSegmentEntry2, IndexHeader, IndexType, LEDataLocator,
        SegmentDescriptor, SqpackHeader, SqpackType,
    },
    ioext::ReadExt,
    pathspec::PathSpec,
    provider::SharedFile,
};

/// The parsed metadata of one index file: its subheader plus the two opaque
/// segments a builder may adopt verbatim.
pub struct IndexContents {
    pub header: IndexHeader,
    pub data_files_segment: Vec<u8>,
    pub segment3: Vec<u8>,
}

/// One packed entry of a base archive: its addressing value and the byte
/// range of its packed payload inside a dat file.
#[derive(Debug, Clone)]
pub struct ReaderEntry {
    pub path_spec: PathSpec,
    pub data_file_index: u32,
    pub offset: u64,
    pub size: u64,
}

/// An opened base archive.
pub struct SqPackReader {
    index1: IndexContents,
    index2: IndexContents,
    data_files: Vec<SharedFile>,
    entries: Vec<ReaderEntry>,
}

impl SqPackReader {
    /// Opens the archive whose `.index` file lives at `index_path`; the
    /// `.index2` and `.dat0..N` files are derived from it, with the dat
    /// count taken from the index's data-files segment.
    pub fn open(index_path: &Path) -> Result<Self, ParseError> {
        let (index1, files1) = parse_index1(index_path)?;
        let (index2, files2) = parse_index2(&sibling(index_path, "index2"))?;

        let dat_count = index1.header.data_files_segment.count as usize;
        let mut data_files = Vec::with_capacity(dat_count);
        for dat_index in 0..dat_count {
            let dat_path = sibling(index_path, &format!("dat{dat_index}"));
            let file = SharedFile::open(&dat_path)?;
            check_stream_kind(&file, SqpackType::SqData)?;
            data_files.push(file);
        }

        let mut entries: Vec<ReaderEntry> = Vec::with_capacity(files1.len());
        let mut by_locator: HashMap<u32, usize> = HashMap::with_capacity(files1.len());
        let in_range = |locator: LEDataLocator| {
            let ok = (locator.data_file_index() as usize) < data_files.len();
            if !ok {
                log::warn!(
                    target: "vsqpack",
                    "index record points at missing dat {} and was dropped",
                    locator.data_file_index()
                );
            }
            ok
        };

        for record in files1 {
            if !in_range(record.locator) {
                continue;
            }
            by_locator.insert(record.locator.raw(), entries.len());
            entries.push(ReaderEntry {
                path_spec: PathSpec::from_component_hashes(record.folder_hash, record.name_hash),
                data_file_index: record.locator.data_file_index(),
                offset: record.locator.byte_offset(),
                size: 0,
            });
        }
        for record in files2 {
            match by_locator.get(&record.locator.raw()) {
                Some(&index) => entries[index]
                    .path_spec
                    .update(&PathSpec::from_full_hash(record.full_path_hash)),
                None => {
                    if !in_range(record.locator) {
                        continue;
                    }
                    entries.push(ReaderEntry {
                        path_spec: PathSpec::from_full_hash(record.full_path_hash),
                        data_file_index: record.locator.data_file_index(),
                        offset: record.locator.byte_offset(),
                        size: 0,
                    });
                }
            }
        }

        derive_sizes(&mut entries, &data_files);

        Ok(Self {
            index1,
            index2,
            data_files,
            entries,
        })
    }

    pub fn index1(&self) -> &IndexContents {
        &self.index1
    }

    pub fn index2(&self) -> &IndexContents {
        &self.index2
    }

    pub fn data_files(&self) -> &[SharedFile] {
        &self.data_files
    }

    pub fn entries(&self) -> &[ReaderEntry] {
        &self.entries
    }
}

fn sibling(index_path: &Path, extension: &str) -> PathBuf {
    index_path.with_extension(extension)
}

/// The index carries no entry sizes; they are recovered from the gaps
/// between sorted locator offsets, with the last entry of each dat bounded
/// by the file length. Entries are stored contiguously and aligned, so the
/// recovered size is the padded size of the packed payload.
fn derive_sizes(entries: &mut [ReaderEntry], data_files: &[SharedFile]) {
    let mut per_dat: Vec<Vec<usize>> = vec![Vec::new(); data_files.len()];
    for (index, entry) in entries.iter().enumerate() {
        per_dat[entry.data_file_index as usize].push(index);
    }

    for (dat_index, mut order) in per_dat.into_iter().enumerate() {
        order.sort_by_key(|&index| entries[index].offset);
        let file_len = data_files[dat_index].len();
        for position in 0..order.len() {
            let end = match order.get(position + 1) {
                Some(&next) => entries[next].offset,
                None => file_len,
            };
            let entry = &mut entries[order[position]];
            entry.size = end.saturating_sub(entry.offset);
        }
    }
}

fn check_stream_kind(file: &SharedFile, expected: SqpackType) -> Result<(), ParseError> {
    let mut buf = [0u8; crate::format::SQPACK_HEADER_SIZE];
    file.read_exact_at(0, &mut buf)?;
    let header = SqpackHeader::decode(&buf)?;
    if header.kind != expected {
        return Err(ParseError::MismatchedStreamType {
            expected,
            found: header.kind,
        });
    }
    Ok(())
}

fn parse_index1(path: &Path) -> Result<(IndexContents, Vec<FileSegmentEntry>), ParseError> {
    let mut reader = BufReader::new(File::open(path)?);
    let contents = parse_index_header(&mut reader, IndexType::Index)?;

    let segment = contents.header.file_segment;
    if segment.size as usize % FileSegmentEntry::SIZE != 0 {
        return Err(ParseError::misaligned_index1(segment.size));
    }
    reader.seek(SeekFrom::Start(segment.offset as u64))?;

    let count = segment.size as usize / FileSegmentEntry::SIZE;
    let mut records = Vec::with_capacity(count);
    for _ in 0..count {
        let name_hash = reader.read_u32_le()?;
        let folder_hash = reader.read_u32_le()?;
        let locator = LEDataLocator::from_raw(reader.read_u32_le()?);
        let _reserved = reader.read_u32_le()?;
        records.push(FileSegmentEntry {
            name_hash,
            folder_hash,
            locator,
        });
    }

    Ok((contents, records))
}

fn parse_index2(path: &Path) -> Result<(IndexContents, Vec<FileSegmentEntry2>), ParseError> {
    let mut reader = BufReader::new(File::open(path)?);
    let contents = parse_index_header(&mut reader, IndexType::Index2)?;

    let segment = contents.header.file_segment;
    if segment.size as usize % FileSegmentEntry2::SIZE != 0 {
        return Err(ParseError::misaligned_index2(segment.size));
    }
    reader.seek(SeekFrom::Start(segment.offset as u64))?;

    let count = segment.size as usize / FileSegmentEntry2::SIZE;
    let mut records = Vec::with_capacity(count);
    for _ in 0..count {
        let full_path_hash = reader.read_u32_le()?;
        let locator = LEDataLocator::from_raw(reader.read_u32_le()?);
        records.push(FileSegmentEntry2 {
            full_path_hash,
            locator,
        });
    }

    Ok((contents, records))
}

fn parse_index_header(
    reader: &mut BufReader<File>,
    expected: IndexType,
) -> Result<IndexContents, ParseError> {
    let file_len = reader.get_ref().metadata()?.len();

    let outer = SqpackHeader::decode(&reader.read_n_exact()?)?;
    if outer.kind != SqpackType::SqIndex {
        return Err(ParseError::MismatchedStreamType {
            expected: SqpackType::SqIndex,
            found: outer.kind,
        });
    }

    let header = IndexHeader::decode(&reader.read_n_exact()?)?;
    if header.kind != expected {
        return Err(ParseError::MismatchedIndexType {
            expected,
            found: header.kind,
        });
    }

    for segment in [
        header.file_segment,
        header.data_files_segment,
        header.unknown_segment_3,
        header.folder_segment,
    ] {
        if segment.offset as u64 + segment.size as u64 > file_len {
            return Err(ParseError::SegmentOverflow {
                offset: segment.offset,
                size: segment.size,
                len: file_len,
            });
        }
    }

    let data_files_segment = read_segment(reader, header.data_files_segment)?;
    let segment3 = read_segment(reader, header.unknown_segment_3)?;

    Ok(IndexContents {
        header,
        data_files_segment,
        segment3,
    })
}

fn read_segment(
    reader: &mut BufReader<File>,
    segment: SegmentDescriptor,
) -> Result<Vec<u8>, ParseError> {
    reader.seek(SeekFrom::Start(segment.offset as u64))?;
    let mut buf = vec![0u8; segment.size as usize];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}
