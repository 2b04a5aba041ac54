//! On-disk SqPack structures.
//!
//! Every structure here is written with explicit little-endian encoding into
//! a fixed-size buffer; nothing is cast from in-memory representations. The
//! three outer headers are 1024 bytes each and carry their SHA-1 at offset
//! `0x3C0`, computed over the bytes before it.

use sha1::{Digest, Sha1};

use crate::errors::ParseError;

pub const SQPACK_HEADER_SIZE: usize = 1024;
pub const INDEX_HEADER_SIZE: usize = 1024;
pub const DATA_HEADER_SIZE: usize = 1024;

/// Offset of the SHA-1 digest within each 1024-byte header.
pub const HEADER_SHA1_OFFSET: usize = 0x3c0;

/// Entries inside a data span start and end on this alignment, which is also
/// the unit a [`LEDataLocator`] measures offsets in.
pub const ENTRY_ALIGNMENT: u32 = 128;

pub const SQPACK_SIGNATURE: [u8; 8] = *b"SqPack\0\0";

const SQPACK_UNKNOWN1: u32 = 1;
const SQPACK_UNKNOWN2: u32 = 0xFFFF_FFFF;
const DATA_UNKNOWN1: u32 = 0x10;

fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

fn get_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap())
}

/// Computes the digest of `header[..0x3C0]` and stores it at `0x3C0`.
pub fn sign_header(header: &mut [u8]) {
    let digest = Sha1::digest(&header[..HEADER_SHA1_OFFSET]);
    header[HEADER_SHA1_OFFSET..HEADER_SHA1_OFFSET + 20].copy_from_slice(&digest);
}

/// Checks a header signed by [`sign_header`]. A header whose digest field is
/// still zeroed (non-strict output) does not verify.
pub fn verify_header(header: &[u8]) -> bool {
    let digest = Sha1::digest(&header[..HEADER_SHA1_OFFSET]);
    header[HEADER_SHA1_OFFSET..HEADER_SHA1_OFFSET + 20] == digest[..]
}

/// Discriminates the outermost header of every SqPack stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SqpackType {
    SqData = 1,
    SqIndex = 2,
}

impl SqpackType {
    fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::SqData),
            2 => Some(Self::SqIndex),
            _ => None,
        }
    }
}

/// Discriminates the two index flavors in their subheaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum IndexType {
    Index = 0,
    Index2 = 2,
}

impl IndexType {
    fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Index),
            2 => Some(Self::Index2),
            _ => None,
        }
    }
}

/// The 1024-byte header opening every synthesized stream.
#[derive(Debug, Clone, Copy)]
pub struct SqpackHeader {
    pub header_size: u32,
    pub unknown1: u32,
    pub kind: SqpackType,
    pub unknown2: u32,
}

impl SqpackHeader {
    pub fn new(kind: SqpackType) -> Self {
        Self {
            header_size: SQPACK_HEADER_SIZE as u32,
            unknown1: SQPACK_UNKNOWN1,
            kind,
            unknown2: SQPACK_UNKNOWN2,
        }
    }

    pub fn encode(&self) -> [u8; SQPACK_HEADER_SIZE] {
        let mut buf = [0u8; SQPACK_HEADER_SIZE];
        buf[..8].copy_from_slice(&SQPACK_SIGNATURE);
        put_u32(&mut buf, 0x0c, self.header_size);
        put_u32(&mut buf, 0x10, self.unknown1);
        put_u32(&mut buf, 0x14, self.kind as u32);
        put_u32(&mut buf, 0x18, self.unknown2);
        buf
    }

    pub fn decode(buf: &[u8; SQPACK_HEADER_SIZE]) -> Result<Self, ParseError> {
        if buf[..8] != SQPACK_SIGNATURE {
            return Err(ParseError::MismatchedMagic);
        }
        let header_size = get_u32(buf, 0x0c);
        if header_size != SQPACK_HEADER_SIZE as u32 {
            return Err(ParseError::MismatchedHeaderSize {
                size: header_size,
                expected: SQPACK_HEADER_SIZE as u32,
            });
        }
        let raw_kind = get_u32(buf, 0x14);

        Ok(Self {
            header_size,
            unknown1: get_u32(buf, 0x10),
            kind: SqpackType::from_u32(raw_kind)
                .ok_or(ParseError::UnrecognisedType(raw_kind))?,
            unknown2: get_u32(buf, 0x18),
        })
    }
}

/// One `{count, offset, size}` segment descriptor of an index subheader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentDescriptor {
    pub count: u32,
    pub offset: u32,
    pub size: u32,
}

impl SegmentDescriptor {
    fn encode_into(&self, buf: &mut [u8], offset: usize) {
        put_u32(buf, offset, self.count);
        put_u32(buf, offset + 4, self.offset);
        put_u32(buf, offset + 8, self.size);
    }

    fn decode(buf: &[u8], offset: usize) -> Self {
        Self {
            count: get_u32(buf, offset),
            offset: get_u32(buf, offset + 4),
            size: get_u32(buf, offset + 8),
        }
    }

    /// Offset of the first byte past this segment.
    pub fn end(&self) -> u32 {
        self.offset + self.size
    }
}

/// The 1024-byte index subheader describing the four index segments.
#[derive(Debug, Clone, Copy)]
pub struct IndexHeader {
    pub header_size: u32,
    pub kind: IndexType,
    pub file_segment: SegmentDescriptor,
    pub data_files_segment: SegmentDescriptor,
    pub unknown_segment_3: SegmentDescriptor,
    pub folder_segment: SegmentDescriptor,
}

impl IndexHeader {
    pub fn new(kind: IndexType) -> Self {
        Self {
            header_size: INDEX_HEADER_SIZE as u32,
            kind,
            file_segment: SegmentDescriptor::default(),
            data_files_segment: SegmentDescriptor::default(),
            unknown_segment_3: SegmentDescriptor::default(),
            folder_segment: SegmentDescriptor::default(),
        }
    }

    pub fn encode(&self) -> [u8; INDEX_HEADER_SIZE] {
        let mut buf = [0u8; INDEX_HEADER_SIZE];
        put_u32(&mut buf, 0x00, self.header_size);
        put_u32(&mut buf, 0x04, self.kind as u32);
        self.file_segment.encode_into(&mut buf, 0x08);
        self.data_files_segment.encode_into(&mut buf, 0x14);
        self.unknown_segment_3.encode_into(&mut buf, 0x20);
        self.folder_segment.encode_into(&mut buf, 0x2c);
        buf
    }

    pub fn decode(buf: &[u8; INDEX_HEADER_SIZE]) -> Result<Self, ParseError> {
        let header_size = get_u32(buf, 0x00);
        if header_size != INDEX_HEADER_SIZE as u32 {
            return Err(ParseError::MismatchedHeaderSize {
                size: header_size,
                expected: INDEX_HEADER_SIZE as u32,
            });
        }
        let raw_kind = get_u32(buf, 0x04);

        Ok(Self {
            header_size,
            kind: IndexType::from_u32(raw_kind)
                .ok_or(ParseError::UnrecognisedIndexType(raw_kind))?,
            file_segment: SegmentDescriptor::decode(buf, 0x08),
            data_files_segment: SegmentDescriptor::decode(buf, 0x14),
            unknown_segment_3: SegmentDescriptor::decode(buf, 0x20),
            folder_segment: SegmentDescriptor::decode(buf, 0x2c),
        })
    }
}

/// The 1024-byte subheader of one data span.
#[derive(Debug, Clone, Copy)]
pub struct DataHeader {
    pub header_size: u32,
    pub unknown1: u32,
    /// Payload bytes stored past the two fixed headers.
    pub data_size: u64,
    pub span_index: u32,
    pub max_file_size: u64,
}

impl DataHeader {
    /// Ceiling on `max_file_size`: the locator's 28-bit offset field in
    /// 128-byte units, i.e. 32 GiB.
    pub const MAX_FILE_SIZE: u64 = (1 << 28) * ENTRY_ALIGNMENT as u64;

    pub fn new(span_index: u32, max_file_size: u64) -> Self {
        Self {
            header_size: DATA_HEADER_SIZE as u32,
            unknown1: DATA_UNKNOWN1,
            data_size: 0,
            span_index,
            max_file_size,
        }
    }

    pub fn encode(&self) -> [u8; DATA_HEADER_SIZE] {
        let mut buf = [0u8; DATA_HEADER_SIZE];
        put_u32(&mut buf, 0x00, self.header_size);
        put_u32(&mut buf, 0x04, self.unknown1);
        put_u64(&mut buf, 0x08, self.data_size);
        put_u32(&mut buf, 0x10, self.span_index);
        put_u64(&mut buf, 0x18, self.max_file_size);
        buf
    }
}

/// A 32-bit packed pointer into a data span.
///
/// Bit 0 is reserved (the loader's synonym flag, always clear here), bits
/// 1..=3 hold the data file index, bits 4..=31 the byte offset in units of
/// [`ENTRY_ALIGNMENT`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LEDataLocator(u32);

impl LEDataLocator {
    /// The span index field is three bits wide.
    pub const MAX_DATA_FILES: usize = 8;

    pub fn new(data_file_index: u32, byte_offset: u64) -> Self {
        debug_assert!((data_file_index as usize) < Self::MAX_DATA_FILES);
        debug_assert!(byte_offset % ENTRY_ALIGNMENT as u64 == 0);
        debug_assert!(byte_offset < DataHeader::MAX_FILE_SIZE);

        let units = (byte_offset / ENTRY_ALIGNMENT as u64) as u32;
        Self(units << 4 | data_file_index << 1)
    }

    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }

    pub fn data_file_index(&self) -> u32 {
        (self.0 >> 1) & 0x7
    }

    pub fn byte_offset(&self) -> u64 {
        ((self.0 >> 4) as u64) * ENTRY_ALIGNMENT as u64
    }
}

/// One 16-byte index1 file record.
#[derive(Debug, Clone, Copy)]
pub struct FileSegmentEntry {
    pub name_hash: u32,
    pub folder_hash: u32,
    pub locator: LEDataLocator,
}

impl FileSegmentEntry {
    pub const SIZE: usize = 16;

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.name_hash.to_le_bytes());
        out.extend_from_slice(&self.folder_hash.to_le_bytes());
        out.extend_from_slice(&self.locator.raw().to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
    }
}

/// One 8-byte index2 file record.
#[derive(Debug, Clone, Copy)]
pub struct FileSegmentEntry2 {
    pub full_path_hash: u32,
    pub locator: LEDataLocator,
}

impl FileSegmentEntry2 {
    pub const SIZE: usize = 8;

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.full_path_hash.to_le_bytes());
        out.extend_from_slice(&self.locator.raw().to_le_bytes());
    }
}

/// One 16-byte record of the folder directory derived from index1.
#[derive(Debug, Clone, Copy)]
pub struct FolderSegmentEntry {
    pub folder_hash: u32,
    /// Absolute offset of the folder's first file record inside index1.
    pub file_segment_offset: u32,
    /// Byte length of the folder's run of file records.
    pub file_segment_size: u32,
}

impl FolderSegmentEntry {
    pub const SIZE: usize = 16;

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.folder_hash.to_le_bytes());
        out.extend_from_slice(&self.file_segment_offset.to_le_bytes());
        out.extend_from_slice(&self.file_segment_size.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
    }
}
