use std::sync::Arc;

use rand::Rng;

use vsqpack::{EntryProvider, MemoryEntryProvider, PathSpec, VirtualSqPack};

pub const ARCHIVE_NAME: &str = "040000";

pub const GAME_PATHS: &[&str] = &[
    "common/font/font1.tex",
    "common/font/font2.tex",
    "common/graphics/texture/dummy.tex",
    "chara/equipment/e0001/model.mdl",
    "exd/root.exl",
];

pub fn provider(bytes: impl Into<Vec<u8>>) -> Arc<dyn EntryProvider> {
    Arc::new(MemoryEntryProvider::new(bytes.into()))
}

pub fn new_pack(max_file_size: u64) -> VirtualSqPack {
    VirtualSqPack::new("ffxiv", ARCHIVE_NAME, max_file_size).unwrap()
}

/// Paths with payloads of every size class up to a KiB, plus the named
/// fixture paths.
pub fn random_payloads() -> Vec<(String, Vec<u8>)> {
    let mut rng = rand::thread_rng();
    let mut payloads: Vec<(String, Vec<u8>)> = GAME_PATHS
        .iter()
        .enumerate()
        .map(|(i, path)| (path.to_string(), vec![i as u8 + 1; 11 * (i + 1)]))
        .collect();

    for i in 0..16 {
        let size = 1usize << (i % 11);
        let mut data = vec![0; size];
        rng.fill(&mut data[..]);
        payloads.push((format!("test/random/{i}.bin"), data));
    }
    payloads
}

/// Builds and freezes a pack holding `payloads`, keyed by full textual path.
pub fn frozen_pack(payloads: &[(String, Vec<u8>)], strict: bool) -> VirtualSqPack {
    let mut pack = new_pack(2 << 30);
    for (path, data) in payloads {
        pack.add(PathSpec::from_path(path), provider(data.clone()), false)
            .unwrap();
    }
    pack.freeze(strict).unwrap();
    pack
}
