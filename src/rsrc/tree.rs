//! The three-level resource directory (type -> name -> language).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::PeError;
use super::pe::{DIR_RESOURCE, PeImage, u16_at, u32_at};

const SUBDIRECTORY: u32 = 0x8000_0000;
const DIRECTORY_HEADER_LEN: usize = 16;
const DIRECTORY_ENTRY_LEN: usize = 8;
const DATA_ENTRY_LEN: usize = 16;

pub const RT_ICON: ResourceId = ResourceId::Id(3);
pub const RT_GROUP_ICON: ResourceId = ResourceId::Id(14);
pub const RT_VERSION: ResourceId = ResourceId::Id(16);

/// A resource type or name. Named entries sort before numeric ones, which
/// is the order the loader expects them in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceId {
    Name(String),
    Id(u16),
}

impl ResourceId {
    pub fn name(name: &str) -> Self {
        ResourceId::Name(name.to_string())
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceId::Name(name) => f.write_str(name),
            ResourceId::Id(id) => write!(f, "#{id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceData {
    pub data: Vec<u8>,
    pub code_page: u32,
}

type Languages = BTreeMap<u16, ResourceData>;
type Names = BTreeMap<ResourceId, Languages>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceTree {
    types: BTreeMap<ResourceId, Names>,
}

impl ResourceTree {
    /// Load the tree the image's resource directory points at. An image
    /// without resources yields an empty tree.
    pub fn parse(image: &PeImage) -> Result<Self, PeError> {
        let mut tree = Self::default();
        let Some((rva, _)) = image.directory(DIR_RESOURCE)? else {
            return Ok(tree);
        };
        let rsrc = image.section_tail(rva)?;

        for (type_id, field) in read_directory(rsrc, 0)? {
            for (name_id, field) in read_directory(rsrc, subdirectory(field)?)? {
                for (lang_id, field) in read_directory(rsrc, subdirectory(field)?)? {
                    let ResourceId::Id(lang) = lang_id else {
                        return Err(PeError::Malformed(format!(
                            "named language under {type_id}/{name_id}"
                        )));
                    };
                    if field & SUBDIRECTORY != 0 {
                        return Err(PeError::Malformed(format!(
                            "resource tree deeper than three levels at {type_id}/{name_id}"
                        )));
                    }
                    let entry = field as usize;
                    let data_rva = u32_at(rsrc, entry)?;
                    let size = u32_at(rsrc, entry + 4)?;
                    let code_page = u32_at(rsrc, entry + 8)?;
                    let data = image.read_rva(data_rva, size)?.to_vec();
                    tree.insert(
                        type_id.clone(),
                        name_id.clone(),
                        lang,
                        ResourceData { data, code_page },
                    );
                }
            }
        }
        Ok(tree)
    }

    pub fn insert(&mut self, kind: ResourceId, name: ResourceId, lang: u16, data: ResourceData) {
        self.types
            .entry(kind)
            .or_default()
            .entry(name)
            .or_default()
            .insert(lang, data);
    }

    pub fn get(&self, kind: &ResourceId, name: &ResourceId, lang: u16) -> Option<&ResourceData> {
        self.types.get(kind)?.get(name)?.get(&lang)
    }

    /// First `(name, lang, data)` of a type, in directory order.
    pub fn first(&self, kind: &ResourceId) -> Option<(&ResourceId, u16, &ResourceData)> {
        let (name, langs) = self.types.get(kind)?.iter().next()?;
        let (lang, data) = langs.iter().next()?;
        Some((name, *lang, data))
    }

    /// Remove every language of `kind/name`, pruning emptied directories.
    pub fn remove(&mut self, kind: &ResourceId, name: &ResourceId) -> bool {
        let Some(names) = self.types.get_mut(kind) else {
            return false;
        };
        let removed = names.remove(name).is_some();
        if names.is_empty() {
            self.types.remove(kind);
        }
        removed
    }

    pub fn names(&self, kind: &ResourceId) -> Vec<ResourceId> {
        self.types
            .get(kind)
            .map(|names| names.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Lay the tree out as a resource section mapped at `base_rva`:
    /// directory tables breadth first, then data entries, then name strings,
    /// then the 8-byte aligned payloads.
    pub fn serialize(&self, base_rva: u32) -> Vec<u8> {
        let table_len = |entries: usize| DIRECTORY_HEADER_LEN + entries * DIRECTORY_ENTRY_LEN;

        let level1_start = table_len(self.types.len());
        let level2_start =
            level1_start + self.types.values().map(|n| table_len(n.len())).sum::<usize>();
        let tables_end = level2_start
            + self
                .types
                .values()
                .flat_map(|names| names.values())
                .map(|langs| table_len(langs.len()))
                .sum::<usize>();
        let leaves: usize = self
            .types
            .values()
            .flat_map(|names| names.values())
            .map(BTreeMap::len)
            .sum();

        let strings_start = tables_end + leaves * DATA_ENTRY_LEN;
        let (strings, string_offsets) = self.string_table(strings_start);
        let data_start = (strings_start + strings.len()).next_multiple_of(8);
        let data_len: usize = self
            .types
            .values()
            .flat_map(|names| names.values())
            .flat_map(|langs| langs.values())
            .map(|res| res.data.len().next_multiple_of(8))
            .sum();

        let mut out = vec![0u8; data_start + data_len];
        out[strings_start..strings_start + strings.len()].copy_from_slice(&strings);

        let id_field = |id: &ResourceId| match id {
            ResourceId::Id(n) => *n as u32,
            ResourceId::Name(s) => string_offsets[s] as u32 | SUBDIRECTORY,
        };

        let mut level1 = level1_start;
        let mut level2 = level2_start;
        let mut leaf = tables_end;
        let mut data = data_start;

        write_header(&mut out, 0, self.types.keys());
        for (i, (kind, names)) in self.types.iter().enumerate() {
            let type_table = level1;
            level1 += table_len(names.len());
            write_entry(&mut out, 0, i, id_field(kind), type_table as u32 | SUBDIRECTORY);
            write_header(&mut out, type_table, names.keys());

            for (j, (name, langs)) in names.iter().enumerate() {
                let name_table = level2;
                level2 += table_len(langs.len());
                write_entry(&mut out, type_table, j, id_field(name), name_table as u32 | SUBDIRECTORY);
                let lang_ids: Vec<ResourceId> =
                    langs.keys().map(|l| ResourceId::Id(*l)).collect();
                write_header(&mut out, name_table, lang_ids.iter());

                for (k, (lang, res)) in langs.iter().enumerate() {
                    write_entry(&mut out, name_table, k, *lang as u32, leaf as u32);
                    put_u32(&mut out, leaf, base_rva + data as u32);
                    put_u32(&mut out, leaf + 4, res.data.len() as u32);
                    put_u32(&mut out, leaf + 8, res.code_page);
                    leaf += DATA_ENTRY_LEN;

                    out[data..data + res.data.len()].copy_from_slice(&res.data);
                    data += res.data.len().next_multiple_of(8);
                }
            }
        }
        out
    }

    /// Length-prefixed UTF-16 strings for every named type and name.
    fn string_table(&self, start: usize) -> (Vec<u8>, BTreeMap<String, usize>) {
        let names: BTreeSet<&String> = self
            .types
            .iter()
            .flat_map(|(kind, names)| std::iter::once(kind).chain(names.keys()))
            .filter_map(|id| match id {
                ResourceId::Name(s) => Some(s),
                ResourceId::Id(_) => None,
            })
            .collect();

        let mut bytes = Vec::new();
        let mut offsets = BTreeMap::new();
        for name in names {
            offsets.insert(name.clone(), start + bytes.len());
            let units: Vec<u16> = name.encode_utf16().collect();
            bytes.extend_from_slice(&(units.len() as u16).to_le_bytes());
            for unit in units {
                bytes.extend_from_slice(&unit.to_le_bytes());
            }
        }
        (bytes, offsets)
    }
}

fn subdirectory(field: u32) -> Result<usize, PeError> {
    if field & SUBDIRECTORY == 0 {
        return Err(PeError::Malformed("expected a subdirectory".into()));
    }
    Ok((field & !SUBDIRECTORY) as usize)
}

fn read_directory(rsrc: &[u8], at: usize) -> Result<Vec<(ResourceId, u32)>, PeError> {
    let named = u16_at(rsrc, at + 12)? as usize;
    let ids = u16_at(rsrc, at + 14)? as usize;
    let mut entries = Vec::with_capacity(named + ids);
    for i in 0..named + ids {
        let entry = at + DIRECTORY_HEADER_LEN + i * DIRECTORY_ENTRY_LEN;
        let name = u32_at(rsrc, entry)?;
        let field = u32_at(rsrc, entry + 4)?;
        let id = if name & SUBDIRECTORY != 0 {
            ResourceId::Name(read_name(rsrc, (name & !SUBDIRECTORY) as usize)?)
        } else {
            ResourceId::Id(name as u16)
        };
        entries.push((id, field));
    }
    Ok(entries)
}

fn read_name(rsrc: &[u8], at: usize) -> Result<String, PeError> {
    let len = u16_at(rsrc, at)? as usize;
    let units = (0..len)
        .map(|i| u16_at(rsrc, at + 2 + i * 2))
        .collect::<Result<Vec<u16>, _>>()?;
    Ok(String::from_utf16_lossy(&units))
}

fn write_header<'a>(out: &mut [u8], at: usize, ids: impl Iterator<Item = &'a ResourceId>) {
    let (mut named, mut numbered) = (0u16, 0u16);
    for id in ids {
        match id {
            ResourceId::Name(_) => named += 1,
            ResourceId::Id(_) => numbered += 1,
        }
    }
    out[at + 12..at + 14].copy_from_slice(&named.to_le_bytes());
    out[at + 14..at + 16].copy_from_slice(&numbered.to_le_bytes());
}

fn write_entry(out: &mut [u8], table: usize, index: usize, name: u32, target: u32) {
    let at = table + DIRECTORY_HEADER_LEN + index * DIRECTORY_ENTRY_LEN;
    put_u32(out, at, name);
    put_u32(out, at + 4, target);
}

fn put_u32(out: &mut [u8], at: usize, value: u32) {
    out[at..at + 4].copy_from_slice(&value.to_le_bytes());
}
