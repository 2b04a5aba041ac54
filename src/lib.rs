//! `vsqpack` assembles virtual FFXIV SqPack archives in memory.
//!
//! A [`VirtualSqPack`] collects game-asset entries from heterogeneous
//! sources (an existing archive on disk, loose files, extracted TTMP mod
//! packages), deduplicating them by hashed path so mods can be layered over
//! a base archive. [`freeze`](VirtualSqPack::freeze) then assigns every
//! entry its place inside the data spans and seals the builder; from that
//! point on the archive serves the `index1`, `index2` and `dat0..N` streams
//! the game's loader expects, byte for byte, through positioned reads and
//! without ever materializing them.
//!
//! # Features
//! - [X] ingesting existing `.index`/`.index2`/`.dat` archives
//! - [X] ingesting loose files, dispatched on extension
//! - [X] ingesting TTMP packages with `choices.json` selections
//! - [X] fingerprint-keyed upserts (skip or replace on collision)
//! - [X] multi-span bin packing under a configurable size cap
//! - [X] strict mode: SHA-1 signed headers, as the native archives carry
//!
//! # Quick start
//! ```
//! use std::sync::Arc;
//! use vsqpack::{MemoryEntryProvider, PathSpec, VirtualSqPack};
//!
//! let mut pack = VirtualSqPack::new("ffxiv", "000000", 2 << 30)?;
//! pack.add(
//!     PathSpec::from_path("common/font/font1.tex"),
//!     Arc::new(MemoryEntryProvider::new(b"packed payload".to_vec())),
//!     false,
//! )?;
//! pack.freeze(true)?;
//!
//! let mut index1 = vec![0u8; pack.size_index1()? as usize];
//! pack.read_index1(0, &mut index1)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod builder;
mod errors;
pub mod format;
mod ioext;
mod pathspec;
mod provider;
pub mod reader;
pub mod ttmp;

pub use builder::{AddResult, Entry, VirtualSqPack};
pub use errors::*;
pub use pathspec::{sqpack_hash, PathSpec, EMPTY_HASH};
pub use provider::{
    ContentKind, EmptyEntryProvider, EntryProvider, FileEntryProvider, MemoryEntryProvider,
    SharedFile, SliceEntryProvider,
};
pub use reader::SqPackReader;
