//! TexTools mod package (TTMP) manifests.
//!
//! An extracted package directory holds `TTMPL.mpl`, a JSON manifest listing
//! mod entries either in a flat `SimpleModsList` or grouped into pages,
//! groups and options, plus `TTMPD.mpd`, the blob every entry's
//! `(ModOffset, ModSize)` points into. An optional `choices.json` next to
//! the manifest switches simple entries off and picks one option per group.

use std::{fs::File, io::BufReader, path::Path};

use serde::Deserialize;
use serde_json::Value;

use crate::errors::TtmpError;

/// One mod entry: the game path it replaces, the archive it targets, and
/// the byte range of its packed payload inside `TTMPD.mpd`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModEntry {
    #[serde(default)]
    pub name: Option<String>,
    pub full_path: String,
    pub dat_file: String,
    pub mod_offset: u64,
    pub mod_size: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModOption {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mods_jsons: Vec<ModEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModGroup {
    #[serde(default)]
    pub group_name: Option<String>,
    #[serde(default)]
    pub option_list: Vec<ModOption>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModPackPage {
    #[serde(default)]
    pub mod_groups: Vec<ModGroup>,
}

/// The parsed `TTMPL.mpl` manifest.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Manifest {
    pub name: Option<String>,
    pub simple_mods_list: Vec<ModEntry>,
    pub mod_pack_pages: Vec<ModPackPage>,
}

/// The parsed `choices.json`.
///
/// The file is a JSON array indexed two ways at once: an entry of the
/// `SimpleModsList` is switched off by a `false` at its index, and a page of
/// `ModPackPages` selects options through an array at the page's index,
/// holding one option index per group (missing means 0).
#[derive(Debug, Default)]
pub struct Choices(Value);

impl Choices {
    pub fn from_file(path: &Path) -> Result<Self, TtmpError> {
        let file = File::open(path)?;
        serde_json::from_reader(BufReader::new(file))
            .map(Self)
            .map_err(TtmpError::Choices)
    }

    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    fn simple_enabled(&self, index: usize) -> bool {
        !matches!(self.0.get(index), Some(Value::Bool(false)))
    }

    fn option_index(&self, page: usize, group: usize) -> i64 {
        match self.0.get(page) {
            Some(Value::Array(groups)) => groups.get(group).and_then(Value::as_i64).unwrap_or(0),
            _ => 0,
        }
    }
}

/// One accepted manifest entry plus a rendered provenance trail for logging.
pub struct Selection<'a> {
    pub entry: &'a ModEntry,
    pub trail: String,
}

impl Manifest {
    pub fn from_file(path: &Path) -> Result<Self, TtmpError> {
        let file = File::open(path)?;
        serde_json::from_reader(BufReader::new(file)).map_err(TtmpError::Manifest)
    }

    /// Applies `choices` and yields every entry that is switched on: the
    /// simple list first, then the selected option of each group on each
    /// page. A choice pointing past a group's options is an error; a group
    /// with no options at all is skipped.
    pub fn select<'a>(&'a self, choices: &Choices) -> Result<Vec<Selection<'a>>, TtmpError> {
        let pack = self.name.as_deref().unwrap_or("?");
        let mut selections = Vec::new();

        for (index, entry) in self.simple_mods_list.iter().enumerate() {
            if !choices.simple_enabled(index) {
                log::debug!(target: "vsqpack", "skipping disabled mod {}", entry.full_path);
                continue;
            }
            selections.push(Selection {
                entry,
                trail: format!(
                    "{pack} > {}",
                    entry.name.as_deref().unwrap_or(&entry.full_path)
                ),
            });
        }

        for (page_index, page) in self.mod_pack_pages.iter().enumerate() {
            for (group_index, group) in page.mod_groups.iter().enumerate() {
                let group_name = group
                    .group_name
                    .clone()
                    .unwrap_or_else(|| group_index.to_string());
                if group.option_list.is_empty() {
                    log::warn!(target: "vsqpack", "group {group_name} has no options, skipping");
                    continue;
                }

                let choice = choices.option_index(page_index, group_index);
                let option = usize::try_from(choice)
                    .ok()
                    .and_then(|choice| group.option_list.get(choice))
                    .ok_or_else(|| TtmpError::ChoiceOutOfRange {
                        group: group_name.clone(),
                        choice,
                        options: group.option_list.len(),
                    })?;

                for entry in &option.mods_jsons {
                    selections.push(Selection {
                        entry,
                        trail: format!(
                            "{pack} > {group_name}({group_index}) > {}({choice}) > {}",
                            option.name.as_deref().unwrap_or("?"),
                            entry.name.as_deref().unwrap_or(&entry.full_path)
                        ),
                    });
                }
            }
        }

        Ok(selections)
    }
}
