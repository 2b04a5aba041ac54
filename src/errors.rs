use thiserror::Error;

use crate::format::{FileSegmentEntry, FileSegmentEntry2};

/// An error triggered while constructing a builder.
#[derive(Debug, Error)]
pub enum CreateError {
    #[error("maximum data file size {size} exceeds the 32 GiB locator ceiling")]
    /// The requested span ceiling cannot be addressed by a locator.
    MaxFileSizeTooLarge {
        /// The requested maximum span size.
        size: u64,
    },
}

/// An error triggered while adding entries to a builder.
#[derive(Debug, Error)]
pub enum AddError {
    #[error("archive is frozen and can no longer be modified")]
    /// The builder was already frozen.
    Frozen,

    #[error("neither a path nor an already opened file was provided")]
    /// `open_file` was called with nothing to open.
    MissingSource,

    #[error(transparent)]
    /// An IO error occurred.
    Io(#[from] std::io::Error),
}

/// An error triggered while freezing a builder.
#[derive(Debug, Error)]
pub enum FreezeError {
    #[error("archive is already frozen")]
    /// `freeze` was called a second time.
    AlreadyFrozen,

    #[error("entry {spec} is {size} bytes, over the 32-bit block size limit")]
    /// An entry's stream size does not fit the 32-bit block size field.
    EntryTooLarge {
        /// The offending entry's path spec, rendered.
        spec: String,
        /// The provider's stream size.
        size: u64,
    },

    #[error("entry {spec} needs {required} bytes and cannot fit a data file capped at {max}")]
    /// An entry cannot fit even a fresh span under the size cap.
    EntryExceedsSpan {
        /// The offending entry's path spec, rendered.
        spec: String,
        /// The aligned payload size plus the two fixed headers.
        required: u64,
        /// The configured maximum span size.
        max: u64,
    },

    #[error("entries spill into {count} data files, over the locator's span limit")]
    /// Bin-packing produced more spans than a locator can address.
    TooManySpans {
        /// The number of spans that would be needed.
        count: usize,
    },
}

/// An error triggered while reading one of the synthesized streams.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("archive is not frozen yet")]
    /// A read was attempted before `freeze`.
    NotFrozen,

    #[error("data file index {index} is out of range ({count} data files)")]
    /// `read_data` named a span that does not exist.
    UnknownDataFile {
        /// The requested data file index.
        index: u32,
        /// The number of spans the frozen archive has.
        count: usize,
    },
}

/// An error triggered while parsing an existing archive.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("file does not start with the SqPack signature")]
    /// The input did not start with the correct signature.
    MismatchedMagic,

    #[error("file header claims header size {size} (expected {expected})")]
    /// The input archive indicated an unsupported header size.
    MismatchedHeaderSize {
        /// The header size provided by the input archive.
        size: u32,
        /// The only size this implementation understands.
        expected: u32,
    },

    #[error("unrecognised sqpack stream type {0:#010x}")]
    /// The outer header carried an unknown stream type.
    UnrecognisedType(u32),

    #[error("unrecognised index type {0:#010x}")]
    /// The index subheader carried an unknown index type.
    UnrecognisedIndexType(u32),

    #[error("expected a {expected:?} stream but found {found:?}")]
    /// A stream of the wrong kind was supplied, e.g. an index where a dat
    /// was expected.
    MismatchedStreamType {
        expected: crate::format::SqpackType,
        found: crate::format::SqpackType,
    },

    #[error("expected an {expected:?} index but found {found:?}")]
    /// An index of the wrong flavor was supplied, e.g. an index2 where an
    /// index was expected.
    MismatchedIndexType {
        expected: crate::format::IndexType,
        found: crate::format::IndexType,
    },

    #[error("index segment at {offset}+{size} extends beyond EOF at {len}")]
    /// A segment descriptor points past the end of the file.
    SegmentOverflow { offset: u32, size: u32, len: u64 },

    #[error("file segment size {size} is not a whole number of {record}-byte records")]
    /// The file segment cannot be split into records.
    MisalignedFileSegment { size: u32, record: usize },

    #[error(transparent)]
    /// An IO error occurred.
    Io(#[from] std::io::Error),
}

impl ParseError {
    pub(crate) fn misaligned_index1(size: u32) -> Self {
        Self::MisalignedFileSegment {
            size,
            record: FileSegmentEntry::SIZE,
        }
    }

    pub(crate) fn misaligned_index2(size: u32) -> Self {
        Self::MisalignedFileSegment {
            size,
            record: FileSegmentEntry2::SIZE,
        }
    }
}

/// An error triggered while ingesting an existing archive.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    /// The base archive could not be parsed.
    Parse(#[from] ParseError),

    #[error(transparent)]
    /// An entry could not be added.
    Add(#[from] AddError),
}

/// An error triggered while ingesting a TTMP mod package.
#[derive(Debug, Error)]
pub enum TtmpError {
    #[error("could not parse TTMPL manifest")]
    /// `TTMPL.mpl` was not valid JSON of the expected shape.
    Manifest(#[source] serde_json::Error),

    #[error("could not parse choices file")]
    /// `choices.json` was not valid JSON.
    Choices(#[source] serde_json::Error),

    #[error("choice {choice} is out of range for group {group} with {options} options")]
    /// A choice selected an option the group does not have.
    ChoiceOutOfRange {
        /// The group's name, or its index when unnamed.
        group: String,
        /// The selected option index.
        choice: i64,
        /// The number of options the group actually has.
        options: usize,
    },

    #[error(transparent)]
    /// An entry could not be added.
    Add(#[from] AddError),

    #[error(transparent)]
    /// An IO error occurred.
    Io(#[from] std::io::Error),
}
