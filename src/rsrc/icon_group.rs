//! RT_GROUP_ICON / RT_ICON replacement from an ICO file.
//!
//! A group is the ICO directory with the 4-byte file offset of each entry
//! swapped for the 2-byte id of the RT_ICON resource holding its image.

use super::PeError;
use super::tree::{RT_GROUP_ICON, RT_ICON, ResourceData, ResourceId, ResourceTree};
use crate::icons::{IcoEntry, parse_ico};

const GROUP_HEADER_LEN: usize = 6;
const GROUP_ENTRY_LEN: usize = 14;
const LANG_EN_US: u16 = 1033;

/// RT_ICON ids referenced by a group resource.
pub fn group_icon_ids(group: &[u8]) -> Vec<u16> {
    let Some(count) = group.get(4..6).map(|b| u16::from_le_bytes([b[0], b[1]])) else {
        return Vec::new();
    };
    (0..count as usize)
        .filter_map(|i| {
            let at = GROUP_HEADER_LEN + i * GROUP_ENTRY_LEN + 12;
            group.get(at..at + 2).map(|b| u16::from_le_bytes([b[0], b[1]]))
        })
        .collect()
}

fn encode_group(entries: &[(u16, &IcoEntry)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(GROUP_HEADER_LEN + entries.len() * GROUP_ENTRY_LEN);
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    for (id, entry) in entries {
        out.push(entry.width);
        out.push(entry.height);
        out.push(entry.color_count);
        out.push(0);
        out.extend_from_slice(&entry.planes.to_le_bytes());
        out.extend_from_slice(&entry.bit_count.to_le_bytes());
        out.extend_from_slice(&(entry.data.len() as u32).to_le_bytes());
        out.extend_from_slice(&id.to_le_bytes());
    }
    out
}

/// Swap the first icon group for the images of `ico`.
///
/// The icons the old group referenced are dropped; new images get fresh
/// ids above any RT_ICON still present. An executable without a group
/// gets one named `#1`.
pub fn replace_icon_group(tree: &mut ResourceTree, ico: &[u8]) -> Result<(), PeError> {
    let entries = parse_ico(ico).map_err(PeError::Icon)?;
    if entries.is_empty() {
        return Err(PeError::Icon("icon file holds no images".into()));
    }

    let existing = tree
        .first(&RT_GROUP_ICON)
        .map(|(name, lang, group)| (name.clone(), lang, group_icon_ids(&group.data)));
    let (group_name, lang) = match existing {
        Some((name, lang, old_ids)) => {
            for id in old_ids {
                tree.remove(&RT_ICON, &ResourceId::Id(id));
            }
            (name, lang)
        }
        None => (ResourceId::Id(1), LANG_EN_US),
    };
    tree.remove(&RT_GROUP_ICON, &group_name);

    let mut next_id = tree
        .names(&RT_ICON)
        .iter()
        .filter_map(|id| match id {
            ResourceId::Id(n) => Some(*n),
            ResourceId::Name(_) => None,
        })
        .max()
        .unwrap_or(0);

    let mut assigned = Vec::with_capacity(entries.len());
    for entry in &entries {
        next_id = next_id
            .checked_add(1)
            .ok_or_else(|| PeError::Icon("ran out of icon ids".into()))?;
        tree.insert(
            RT_ICON,
            ResourceId::Id(next_id),
            lang,
            ResourceData {
                data: entry.data.clone(),
                code_page: 0,
            },
        );
        assigned.push((next_id, entry));
    }

    tree.insert(
        RT_GROUP_ICON,
        group_name,
        lang,
        ResourceData {
            data: encode_group(&assigned),
            code_page: 0,
        },
    );
    Ok(())
}
