use std::{io, sync::Arc};

use test_log::test;

use vsqpack::{
    format::{
        verify_header, DataHeader, FileSegmentEntry, DATA_HEADER_SIZE, SQPACK_HEADER_SIZE,
    },
    AddError, CreateError, EntryProvider, FreezeError, PathSpec, ReadError, VirtualSqPack,
    sqpack_hash,
};

mod data;

const FIXED_DATA_HEADERS: u64 = (SQPACK_HEADER_SIZE + DATA_HEADER_SIZE) as u64;

struct SizedProvider(u64);

impl EntryProvider for SizedProvider {
    fn size(&self) -> u64 {
        self.0
    }

    fn read_at(&self, _offset: u64, _buf: &mut [u8]) -> io::Result<usize> {
        Ok(0)
    }
}

struct FailingProvider;

impl EntryProvider for FailingProvider {
    fn size(&self) -> u64 {
        64
    }

    fn read_at(&self, _offset: u64, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::Other, "backing file went away"))
    }
}

#[test]
fn rejects_oversized_max_file_size() {
    assert!(matches!(
        VirtualSqPack::new("ffxiv", "000000", DataHeader::MAX_FILE_SIZE + 1),
        Err(CreateError::MaxFileSizeTooLarge { .. })
    ));
    assert!(VirtualSqPack::new("ffxiv", "000000", DataHeader::MAX_FILE_SIZE).is_ok());
}

#[test]
fn empty_pack_serves_bare_headers() {
    let mut pack = data::new_pack(2 << 30);
    pack.freeze(false).unwrap();

    assert_eq!(pack.data_file_count(), 1);
    assert_eq!(pack.size_data(0).unwrap(), FIXED_DATA_HEADERS);
    assert_eq!(pack.size_index1().unwrap(), FIXED_DATA_HEADERS);

    let mut buf = vec![0u8; 4096];
    assert_eq!(
        pack.read_data(0, 0, &mut buf).unwrap(),
        FIXED_DATA_HEADERS as usize
    );
    assert_eq!(&buf[..8], b"SqPack\0\0");
}

#[test]
fn single_small_entry_placement() {
    let mut pack = data::new_pack(2 << 30);
    let result = pack
        .add(
            PathSpec::from_path("common/font/font1.tex"),
            data::provider(*b"1234567"),
            false,
        )
        .unwrap();
    pack.freeze(false).unwrap();

    let entry = pack.entry(result.added[0]).unwrap();
    assert_eq!(entry.block_size(), 7);
    assert_eq!(entry.pad_size(), 121);
    assert_eq!(entry.data_file_index(), 0);
    assert_eq!(entry.locator().byte_offset(), FIXED_DATA_HEADERS);
    assert_eq!(pack.size_data(0).unwrap(), FIXED_DATA_HEADERS + 128);

    let mut block = [0u8; 7];
    assert_eq!(pack.read_data(0, FIXED_DATA_HEADERS, &mut block).unwrap(), 7);
    assert_eq!(&block, b"1234567");

    // The padding after the block reads back as zeros.
    let mut padded = [0u8; 128];
    assert_eq!(
        pack.read_data(0, FIXED_DATA_HEADERS, &mut padded).unwrap(),
        128
    );
    assert!(padded[7..].iter().all(|&byte| byte == 0));
}

#[test]
fn skip_then_replace_on_same_key() {
    let spec = PathSpec::from_path("common/font/font1.tex");
    let first: Arc<dyn EntryProvider> = data::provider(*b"first");
    let second: Arc<dyn EntryProvider> = data::provider(*b"second");

    let mut pack = data::new_pack(2 << 30);
    let added = pack.add(spec.clone(), first.clone(), false).unwrap();
    assert_eq!(added.added.len(), 1);

    let skipped = pack.add(spec.clone(), second.clone(), false).unwrap();
    assert_eq!(skipped.skipped_existing, added.added);
    assert_eq!(skipped.any_item(), Some(0));
    assert_eq!(pack.entry_count(), 1);
    assert!(Arc::ptr_eq(pack.entry(0).unwrap().provider(), &first));

    let mut combined = added.clone();
    combined += skipped;
    assert_eq!(combined.all_entries(), [0, 0]);

    let replaced = pack.add(spec, second.clone(), true).unwrap();
    assert_eq!(replaced.replaced, added.added);
    assert_eq!(pack.entry_count(), 1);
    assert!(Arc::ptr_eq(pack.entry(0).unwrap().provider(), &second));
}

#[test]
fn full_hash_entry_learns_component_key_in_place() {
    let path = "common/font/font1.tex";
    let mut pack = data::new_pack(2 << 30);
    pack.add(
        PathSpec::from_full_hash(sqpack_hash(path)),
        data::provider(*b"payload"),
        false,
    )
    .unwrap();

    // The same logical file arrives again, now with both key kinds known.
    let result = pack
        .add(PathSpec::from_path(path), data::provider(*b"other"), false)
        .unwrap();
    assert_eq!(result.skipped_existing, vec![0]);
    assert_eq!(pack.entry_count(), 1);
    assert!(pack.entry(0).unwrap().path_spec().has_component_hash());

    pack.freeze(false).unwrap();
    assert_eq!(pack.file_entries_1().unwrap().len(), 1);
    assert_eq!(pack.file_entries_2().unwrap().len(), 1);
}

#[test]
fn indexes_are_sorted_and_folders_grouped() {
    let mut pack = data::new_pack(2 << 30);
    for (folder, name) in [(2u32, 1u32), (1, 2), (1, 1)] {
        pack.add(
            PathSpec::from_component_hashes(folder, name),
            data::provider(vec![folder as u8; 24]),
            false,
        )
        .unwrap();
    }
    pack.freeze(false).unwrap();

    let files = pack.file_entries_1().unwrap();
    let keys: Vec<(u32, u32)> = files
        .iter()
        .map(|entry| (entry.folder_hash, entry.name_hash))
        .collect();
    assert_eq!(keys, [(1, 1), (1, 2), (2, 1)]);

    let folders = pack.folder_entries().unwrap();
    assert_eq!(folders.len(), 2);
    assert_eq!(folders[0].folder_hash, 1);
    assert_eq!(folders[0].file_segment_offset, FIXED_DATA_HEADERS as u32);
    assert_eq!(
        folders[0].file_segment_size,
        2 * FileSegmentEntry::SIZE as u32
    );
    assert_eq!(folders[1].folder_hash, 2);
    assert_eq!(
        folders[1].file_segment_offset,
        FIXED_DATA_HEADERS as u32 + folders[0].file_segment_size
    );
    assert_eq!(folders[1].file_segment_size, FileSegmentEntry::SIZE as u32);

    // Each run covers exactly the records carrying its folder hash.
    for folder in folders {
        let run = files
            .iter()
            .filter(|entry| entry.folder_hash == folder.folder_hash)
            .count();
        assert_eq!(
            folder.file_segment_size as usize,
            run * FileSegmentEntry::SIZE
        );
    }
}

#[test]
fn entries_roll_over_into_fresh_spans() {
    let mut pack = data::new_pack(FIXED_DATA_HEADERS + 256);
    for index in 0..3 {
        pack.add(
            PathSpec::from_component_hashes(1, index),
            data::provider(vec![index as u8; 200]),
            false,
        )
        .unwrap();
    }
    pack.freeze(false).unwrap();

    assert_eq!(pack.data_file_count(), 3);
    for index in 0..3u32 {
        let entry = pack.entry(index as usize).unwrap();
        assert_eq!(entry.data_file_index(), index);
        assert_eq!(entry.offset_after_headers(), 0);
        assert_eq!(entry.locator().byte_offset(), FIXED_DATA_HEADERS);
        assert_eq!(
            pack.size_data(index).unwrap(),
            FIXED_DATA_HEADERS + 256
        );
    }
}

#[test]
fn blocks_are_aligned_and_spans_capped() {
    let payloads = data::random_payloads();
    let max_file_size = FIXED_DATA_HEADERS + 1024;
    let mut pack = data::new_pack(max_file_size);
    for (path, bytes) in &payloads {
        pack.add(PathSpec::from_path(path), data::provider(bytes.clone()), false)
            .unwrap();
    }
    pack.freeze(false).unwrap();

    for index in 0..pack.entry_count() {
        let entry = pack.entry(index).unwrap();
        assert_eq!((entry.block_size() + entry.pad_size()) % 128, 0);
    }
    assert!(pack.data_file_count() > 1);
    for span in 0..pack.data_file_count() {
        assert!(pack.size_data(span as u32).unwrap() <= max_file_size);
    }
}

#[test]
fn reads_match_the_concatenated_streams() {
    let payloads = data::random_payloads();
    let pack = data::frozen_pack(&payloads, false);

    let mut index1 = vec![0u8; pack.size_index1().unwrap() as usize];
    assert_eq!(pack.read_index1(0, &mut index1).unwrap(), index1.len());
    let mut index2 = vec![0u8; pack.size_index2().unwrap() as usize];
    assert_eq!(pack.read_index2(0, &mut index2).unwrap(), index2.len());
    let mut dat0 = vec![0u8; pack.size_data(0).unwrap() as usize];
    assert_eq!(pack.read_data(0, 0, &mut dat0).unwrap(), dat0.len());

    let cases: &[(&str, &[u8])] = &[("index1", &index1), ("index2", &index2), ("dat0", &dat0)];
    for &(stream, full) in cases {
        for offset in [0usize, 1, 100, 1023, 1024, 2047, 2048, 2049, full.len() - 1] {
            for len in [1usize, 7, 128, 4096] {
                let mut buf = vec![0u8; len];
                let got = match stream {
                    "index1" => pack.read_index1(offset as u64, &mut buf).unwrap(),
                    "index2" => pack.read_index2(offset as u64, &mut buf).unwrap(),
                    _ => pack.read_data(0, offset as u64, &mut buf).unwrap(),
                };
                let expected = &full[offset..(offset + len).min(full.len())];
                assert_eq!(got, expected.len(), "{stream} at {offset}+{len}");
                assert_eq!(&buf[..got], expected, "{stream} at {offset}+{len}");
            }
        }
    }

    // Every payload reads back from its locator byte for byte.
    for (index, (path, bytes)) in payloads.iter().enumerate() {
        let entry = pack.entry(index).unwrap();
        let mut buf = vec![0u8; bytes.len()];
        let got = pack
            .read_data(
                entry.data_file_index(),
                entry.locator().byte_offset(),
                &mut buf,
            )
            .unwrap();
        assert_eq!(got, bytes.len(), "{path}");
        assert_eq!(&buf, bytes, "{path}");
    }
}

#[test]
fn freeze_is_one_shot() {
    let mut pack = data::new_pack(2 << 30);
    pack.freeze(false).unwrap();
    assert!(matches!(pack.freeze(true), Err(FreezeError::AlreadyFrozen)));
}

#[test]
fn lifecycle_guards_both_directions() {
    let mut pack = data::new_pack(2 << 30);
    let mut buf = [0u8; 16];
    assert!(matches!(
        pack.read_index1(0, &mut buf),
        Err(ReadError::NotFrozen)
    ));
    assert!(matches!(pack.size_index2(), Err(ReadError::NotFrozen)));
    assert_eq!(pack.data_file_count(), 0);

    pack.freeze(false).unwrap();
    assert!(matches!(
        pack.add(
            PathSpec::from_path("common/font/font1.tex"),
            data::provider(*b"x"),
            true,
        ),
        Err(AddError::Frozen)
    ));
}

#[test]
fn strict_mode_signs_every_header() {
    let payloads = data::random_payloads();
    let strict = data::frozen_pack(&payloads, true);
    let relaxed = data::frozen_pack(&payloads, false);

    let mut headers = vec![0u8; 2 * SQPACK_HEADER_SIZE];
    for stream in 0..3 {
        let read = |pack: &VirtualSqPack, buf: &mut [u8]| match stream {
            0 => pack.read_index1(0, buf).unwrap(),
            1 => pack.read_index2(0, buf).unwrap(),
            _ => pack.read_data(0, 0, buf).unwrap(),
        };

        read(&strict, &mut headers);
        assert!(verify_header(&headers[..SQPACK_HEADER_SIZE]));
        assert!(verify_header(&headers[SQPACK_HEADER_SIZE..]));

        read(&relaxed, &mut headers);
        assert!(!verify_header(&headers[..SQPACK_HEADER_SIZE]));
        assert!(!verify_header(&headers[SQPACK_HEADER_SIZE..]));
    }
}

#[test]
fn entries_too_big_for_the_format_fail_freeze() {
    let mut pack = data::new_pack(DataHeader::MAX_FILE_SIZE);
    pack.add(
        PathSpec::from_component_hashes(1, 1),
        Arc::new(SizedProvider(1 << 33)),
        false,
    )
    .unwrap();
    assert!(matches!(
        pack.freeze(false),
        Err(FreezeError::EntryTooLarge { .. })
    ));
    assert!(!pack.is_frozen());

    let mut pack = data::new_pack(FIXED_DATA_HEADERS + 256);
    pack.add(
        PathSpec::from_component_hashes(1, 1),
        Arc::new(SizedProvider(1000)),
        false,
    )
    .unwrap();
    assert!(matches!(
        pack.freeze(false),
        Err(FreezeError::EntryExceedsSpan { .. })
    ));

    // A failed freeze leaves the builder mutable.
    assert!(pack
        .add(
            PathSpec::from_component_hashes(1, 2),
            data::provider(*b"ok"),
            false
        )
        .is_ok());
}

#[test]
fn unknown_data_file_is_reported() {
    let mut pack = data::new_pack(2 << 30);
    pack.freeze(false).unwrap();
    let mut buf = [0u8; 16];
    assert!(matches!(
        pack.read_data(5, 0, &mut buf),
        Err(ReadError::UnknownDataFile { index: 5, count: 1 })
    ));
}

#[test]
fn provider_failure_surfaces_as_short_read() {
    let mut pack = data::new_pack(2 << 30);
    pack.add(
        PathSpec::from_component_hashes(1, 1),
        Arc::new(FailingProvider),
        false,
    )
    .unwrap();
    pack.freeze(false).unwrap();

    let mut buf = vec![0u8; 4096];
    assert_eq!(
        pack.read_data(0, 0, &mut buf).unwrap(),
        FIXED_DATA_HEADERS as usize
    );
}
