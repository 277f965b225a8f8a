//! VS_VERSIONINFO blocks.
//!
//! Every node is `wLength | wValueLength | wType | key (UTF-16, NUL) | pad |
//! value | pad | children`. Text values count their length in UTF-16 units,
//! binary values in bytes.

use super::PeError;
use super::pe::u16_at;

const ROOT_KEY: &str = "VS_VERSION_INFO";
const STRING_FILE_INFO: &str = "StringFileInfo";
const VAR_FILE_INFO: &str = "VarFileInfo";
const TRANSLATION: &str = "Translation";

/// en-US, Unicode.
pub const STRING_TABLE_KEY: &str = "040904B0";
const LANG_EN_US: u16 = 0x0409;
const CODE_PAGE_UNICODE: u16 = 0x04B0;

const FIXED_SIGNATURE: u32 = 0xFEEF_04BD;
const FIXED_INFO_LEN: usize = 52;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Block {
    key: String,
    text: bool,
    value: Vec<u8>,
    children: Vec<Block>,
}

impl Block {
    fn new(key: &str, text: bool, value: Vec<u8>) -> Self {
        Self {
            key: key.to_string(),
            text,
            value,
            children: Vec::new(),
        }
    }

    fn child(&self, key: &str) -> Option<&Block> {
        self.children.iter().find(|c| c.key == key)
    }

    fn child_mut(&mut self, key: &str) -> Option<&mut Block> {
        self.children.iter_mut().find(|c| c.key == key)
    }

    fn child_mut_or_insert(&mut self, key: &str, text: bool) -> &mut Block {
        let index = match self.children.iter().position(|c| c.key == key) {
            Some(index) => index,
            None => {
                self.children.push(Block::new(key, text, Vec::new()));
                self.children.len() - 1
            }
        };
        &mut self.children[index]
    }

    fn parse(bytes: &[u8], at: usize) -> Result<(Block, usize), PeError> {
        let malformed = |what: &str| PeError::VersionInfo(format!("{what} at {at:#x}"));
        let length = u16_at(bytes, at)? as usize;
        let value_length = u16_at(bytes, at + 2)? as usize;
        let text = u16_at(bytes, at + 4)? == 1;
        let end = at + length;
        if length < 6 || end > bytes.len() {
            return Err(malformed("block length out of range"));
        }

        let mut pos = at + 6;
        let mut key_units = Vec::new();
        loop {
            let unit = u16_at(bytes, pos)?;
            pos += 2;
            if unit == 0 {
                break;
            }
            key_units.push(unit);
            if pos >= end {
                return Err(malformed("unterminated key"));
            }
        }
        let key = String::from_utf16_lossy(&key_units);
        pos = pos.next_multiple_of(4);

        let value_bytes = if text { value_length * 2 } else { value_length };
        let value_end = (pos + value_bytes).min(end);
        let value = bytes.get(pos.min(end)..value_end).unwrap_or_default().to_vec();
        pos = value_end.next_multiple_of(4);

        let mut children = Vec::new();
        while pos + 6 <= end {
            let (child, next) = Block::parse(bytes, pos)?;
            children.push(child);
            pos = next.next_multiple_of(4);
        }

        Ok((
            Block {
                key,
                text,
                value,
                children,
            },
            end,
        ))
    }

    /// Lengths are 16-bit fields; a block that outgrows them is an error,
    /// never a truncated header.
    fn write(&self, out: &mut Vec<u8>) -> Result<(), PeError> {
        let start = out.len();
        out.extend_from_slice(&[0; 6]);
        for unit in self.key.encode_utf16().chain(std::iter::once(0)) {
            out.extend_from_slice(&unit.to_le_bytes());
        }
        pad4(out);
        out.extend_from_slice(&self.value);
        for child in &self.children {
            pad4(out);
            child.write(out)?;
        }

        let too_long = |what: &str, len: usize| {
            PeError::VersionInfo(format!("{what} of {:?} is {len}, above {}", self.key, u16::MAX))
        };
        let total = out.len() - start;
        let length = u16::try_from(total).map_err(|_| too_long("block length", total))?;
        let value_units = if self.text {
            self.value.len() / 2
        } else {
            self.value.len()
        };
        let value_length =
            u16::try_from(value_units).map_err(|_| too_long("value length", value_units))?;
        out[start..start + 2].copy_from_slice(&length.to_le_bytes());
        out[start + 2..start + 4].copy_from_slice(&value_length.to_le_bytes());
        out[start + 4..start + 6].copy_from_slice(&(self.text as u16).to_le_bytes());
        Ok(())
    }
}

fn pad4(out: &mut Vec<u8>) {
    let padded = out.len().next_multiple_of(4);
    out.resize(padded, 0);
}

fn encode_text(value: &str) -> Vec<u8> {
    value
        .encode_utf16()
        .chain(std::iter::once(0))
        .flat_map(u16::to_le_bytes)
        .collect()
}

fn decode_text(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .take_while(|&u| u != 0)
        .collect();
    String::from_utf16_lossy(&units)
}

/// Parse `"1.2.3"` style versions into four components; missing or
/// non-numeric parts become 0.
pub fn version_quad(version: &str) -> [u16; 4] {
    let mut quad = [0u16; 4];
    for (slot, part) in quad.iter_mut().zip(version.split('.')) {
        let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
        *slot = digits.parse().unwrap_or(0);
    }
    quad
}

fn fixed_file_info(version: [u16; 4]) -> Vec<u8> {
    let ms = ((version[0] as u32) << 16) | version[1] as u32;
    let ls = ((version[2] as u32) << 16) | version[3] as u32;
    let fields: [u32; 13] = [
        FIXED_SIGNATURE,
        0x0001_0000, // struct version
        ms,
        ls,
        ms,
        ls,
        0x3f,        // flags mask
        0,           // flags
        0x0004_0004, // VOS_NT_WINDOWS32
        0x1,         // VFT_APP
        0,
        0,
        0,
    ];
    fields.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// An editable version resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    root: Block,
}

impl VersionInfo {
    /// A fresh resource with an empty en-US string table.
    pub fn new(version: [u16; 4]) -> Self {
        let mut root = Block::new(ROOT_KEY, false, fixed_file_info(version));
        let mut strings = Block::new(STRING_FILE_INFO, true, Vec::new());
        strings
            .children
            .push(Block::new(STRING_TABLE_KEY, true, Vec::new()));
        root.children.push(strings);

        let mut vars = Block::new(VAR_FILE_INFO, true, Vec::new());
        let translation = [LANG_EN_US.to_le_bytes(), CODE_PAGE_UNICODE.to_le_bytes()].concat();
        vars.children.push(Block::new(TRANSLATION, false, translation));
        root.children.push(vars);
        Self { root }
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, PeError> {
        let (root, _) = Block::parse(bytes, 0)?;
        if root.key != ROOT_KEY {
            return Err(PeError::VersionInfo(format!(
                "unexpected root key {:?}",
                root.key
            )));
        }
        Ok(Self { root })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, PeError> {
        let mut out = Vec::new();
        self.root.write(&mut out)?;
        Ok(out)
    }

    /// Key of the string table Explorer reads: the one named by the first
    /// `Translation` pair, else the first table present, else en-US Unicode.
    pub fn string_table_key(&self) -> String {
        let tables = self.root.child(STRING_FILE_INFO);
        let translated = self
            .root
            .child(VAR_FILE_INFO)
            .and_then(|vars| vars.child(TRANSLATION))
            .filter(|t| t.value.len() >= 4)
            .map(|t| {
                let lang = u16::from_le_bytes([t.value[0], t.value[1]]);
                let code_page = u16::from_le_bytes([t.value[2], t.value[3]]);
                format!("{lang:04X}{code_page:04X}")
            });
        if let (Some(key), Some(tables)) = (translated, tables)
            && let Some(table) = tables.children.iter().find(|c| c.key.eq_ignore_ascii_case(&key))
        {
            return table.key.clone();
        }
        tables
            .and_then(|t| t.children.first())
            .map(|c| c.key.clone())
            .unwrap_or_else(|| STRING_TABLE_KEY.to_string())
    }

    pub fn string(&self, key: &str) -> Option<String> {
        self.root
            .child(STRING_FILE_INFO)?
            .child(&self.string_table_key())?
            .child(key)
            .map(|entry| decode_text(&entry.value))
    }

    /// Set one entry of the active string table, creating an en-US table
    /// when the executable ships without one.
    pub fn set_string(&mut self, key: &str, value: &str) {
        let table = self.string_table_key();
        let entry = self
            .root
            .child_mut_or_insert(STRING_FILE_INFO, true)
            .child_mut_or_insert(&table, true)
            .child_mut_or_insert(key, true);
        entry.text = true;
        entry.value = encode_text(value);
        if table == STRING_TABLE_KEY {
            self.ensure_translation();
        }
    }

    /// A created en-US table must be advertised in `VarFileInfo`.
    fn ensure_translation(&mut self) {
        let vars = self.root.child_mut_or_insert(VAR_FILE_INFO, true);
        if vars.child_mut(TRANSLATION).is_none() {
            let pair = [LANG_EN_US.to_le_bytes(), CODE_PAGE_UNICODE.to_le_bytes()].concat();
            vars.children.push(Block::new(TRANSLATION, false, pair));
        }
    }

    /// File and product version from the fixed file info.
    pub fn version(&self) -> Option<[u16; 4]> {
        let v = &self.root.value;
        if v.len() < FIXED_INFO_LEN || v[0..4] != FIXED_SIGNATURE.to_le_bytes() {
            return None;
        }
        let word = |at: usize| u32::from_le_bytes([v[at], v[at + 1], v[at + 2], v[at + 3]]);
        let (ms, ls) = (word(8), word(12));
        Some([(ms >> 16) as u16, ms as u16, (ls >> 16) as u16, ls as u16])
    }

    /// Overwrite file and product version, keeping the rest of the fixed
    /// info when it is well formed.
    pub fn set_version(&mut self, version: [u16; 4]) {
        let fresh = fixed_file_info(version);
        if self.version().is_none() {
            self.root.value = fresh;
            return;
        }
        // dwFileVersionMS..dwProductVersionLS
        self.root.value[8..24].copy_from_slice(&fresh[8..24]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_parsing() {
        assert_eq!(version_quad("1.2.3"), [1, 2, 3, 0]);
        assert_eq!(version_quad("2.0.1-beta.4"), [2, 0, 1, 0]);
        assert_eq!(version_quad("10"), [10, 0, 0, 0]);
        assert_eq!(version_quad("x.y"), [0, 0, 0, 0]);
    }

    #[test]
    fn fresh_resource_roundtrips() {
        let mut info = VersionInfo::new([1, 2, 3, 4]);
        info.set_string("ProductName", "My App");
        info.set_string("FileDescription", "Desk");
        let bytes = info.to_bytes().unwrap();
        assert_eq!(u16_at(&bytes, 0).unwrap() as usize, bytes.len());

        let parsed = VersionInfo::parse(&bytes).unwrap();
        assert_eq!(parsed.string("ProductName").as_deref(), Some("My App"));
        assert_eq!(parsed.string("FileDescription").as_deref(), Some("Desk"));
        assert_eq!(parsed.version(), Some([1, 2, 3, 4]));
        assert_eq!(parsed, info);
    }

    #[test]
    fn string_values_count_utf16_units() {
        let mut info = VersionInfo::new([1, 0, 0, 0]);
        info.set_string("CompanyName", "Ab");
        let entry = info
            .root
            .child(STRING_FILE_INFO)
            .and_then(|s| s.child(STRING_TABLE_KEY))
            .and_then(|t| t.child("CompanyName"))
            .unwrap();
        let mut out = Vec::new();
        entry.write(&mut out).unwrap();
        // "Ab" plus the terminator
        assert_eq!(u16_at(&out, 2).unwrap(), 3);
        assert_eq!(u16_at(&out, 4).unwrap(), 1);
    }

    #[test]
    fn editing_keeps_other_entries() {
        let mut info = VersionInfo::new([1, 0, 0, 0]);
        info.set_string("LegalCopyright", "(c) someone");
        info.set_string("ProductName", "Old");
        let mut parsed = VersionInfo::parse(&info.to_bytes().unwrap()).unwrap();
        parsed.set_string("ProductName", "New");
        parsed.set_version([3, 1, 0, 0]);

        let reparsed = VersionInfo::parse(&parsed.to_bytes().unwrap()).unwrap();
        assert_eq!(reparsed.string("ProductName").as_deref(), Some("New"));
        assert_eq!(reparsed.string("LegalCopyright").as_deref(), Some("(c) someone"));
        assert_eq!(reparsed.version(), Some([3, 1, 0, 0]));
    }

    #[test]
    fn missing_string_table_is_created() {
        let mut info = VersionInfo::new([1, 0, 0, 0]);
        info.root.children.clear();
        info.set_string("ProductName", "Fresh");
        let parsed = VersionInfo::parse(&info.to_bytes().unwrap()).unwrap();
        assert_eq!(parsed.string("ProductName").as_deref(), Some("Fresh"));
    }

    #[test]
    fn rejects_foreign_blocks() {
        let mut out = Vec::new();
        Block::new("NOT_VERSION", false, vec![]).write(&mut out).unwrap();
        assert!(VersionInfo::parse(&out).is_err());
        assert!(VersionInfo::parse(&[0xff, 0xff]).is_err());
    }

    #[test]
    fn oversized_strings_are_rejected() {
        let mut info = VersionInfo::new([1, 0, 0, 0]);
        info.set_string("FileDescription", &"x".repeat(40_000));
        let err = info.to_bytes().unwrap_err();
        assert!(matches!(err, PeError::VersionInfo(_)), "{err}");

        info.set_string("FileDescription", &"x".repeat(1_000));
        let parsed = VersionInfo::parse(&info.to_bytes().unwrap()).unwrap();
        assert_eq!(parsed.string("FileDescription").map(|s| s.len()), Some(1_000));
    }

    #[test]
    fn edits_follow_the_translation_table() {
        let mut info = VersionInfo::new([1, 0, 0, 0]);
        info.root.children.clear();
        let mut strings = Block::new(STRING_FILE_INFO, true, Vec::new());
        let mut table = Block::new("040904E4", true, Vec::new());
        table
            .children
            .push(Block::new("ProductName", true, encode_text("Shell")));
        strings.children.push(table);
        info.root.children.push(strings);
        let mut vars = Block::new(VAR_FILE_INFO, true, Vec::new());
        let pair = [LANG_EN_US.to_le_bytes(), 0x04E4u16.to_le_bytes()].concat();
        vars.children.push(Block::new(TRANSLATION, false, pair));
        info.root.children.push(vars);

        let mut parsed = VersionInfo::parse(&info.to_bytes().unwrap()).unwrap();
        assert_eq!(parsed.string_table_key(), "040904E4");
        parsed.set_string("ProductName", "Forge");

        let reparsed = VersionInfo::parse(&parsed.to_bytes().unwrap()).unwrap();
        assert_eq!(reparsed.string("ProductName").as_deref(), Some("Forge"));
        let tables = reparsed.root.child(STRING_FILE_INFO).unwrap();
        assert_eq!(tables.children.len(), 1);
        assert!(tables.child(STRING_TABLE_KEY).is_none());
    }
}
