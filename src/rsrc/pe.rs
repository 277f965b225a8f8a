//! Just enough of the PE/COFF layout to relocate the resource directory
//! into a freshly appended section.

use super::PeError;

const PE_SIGNATURE: &[u8; 4] = b"PE\0\0";
const COFF_HEADER_LEN: usize = 20;
const SECTION_HEADER_LEN: usize = 40;
const DATA_DIRECTORY_LEN: usize = 8;

const MAGIC_PE32: u16 = 0x10b;
const MAGIC_PE32_PLUS: u16 = 0x20b;

pub const DIR_RESOURCE: usize = 2;
pub const DIR_SECURITY: usize = 4;

/// IMAGE_SCN_CNT_INITIALIZED_DATA | IMAGE_SCN_MEM_READ
const RSRC_CHARACTERISTICS: u32 = 0x4000_0040;

pub(crate) fn u16_at(bytes: &[u8], at: usize) -> Result<u16, PeError> {
    bytes
        .get(at..at + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or_else(|| PeError::Malformed(format!("read past end at {at:#x}")))
}

pub(crate) fn u32_at(bytes: &[u8], at: usize) -> Result<u32, PeError> {
    bytes
        .get(at..at + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| PeError::Malformed(format!("read past end at {at:#x}")))
}

fn put_u16(bytes: &mut [u8], at: usize, value: u16) {
    bytes[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(bytes: &mut [u8], at: usize, value: u32) {
    bytes[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn align_up(value: usize, alignment: usize) -> usize {
    if alignment == 0 {
        return value;
    }
    value.div_ceil(alignment) * alignment
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub virtual_size: u32,
    pub virtual_address: u32,
    pub raw_size: u32,
    pub raw_offset: u32,
}

impl Section {
    fn contains_rva(&self, rva: u32) -> bool {
        let span = self.virtual_size.max(self.raw_size);
        rva >= self.virtual_address && rva - self.virtual_address < span
    }
}

/// A parsed executable image. Offsets are file offsets into `data`.
#[derive(Debug, Clone)]
pub struct PeImage {
    data: Vec<u8>,
    coff: usize,
    optional: usize,
    data_directories: usize,
    directory_count: usize,
    section_table: usize,
    pub sections: Vec<Section>,
    pub pe32_plus: bool,
}

impl PeImage {
    pub fn parse(data: Vec<u8>) -> Result<Self, PeError> {
        if !data.starts_with(b"MZ") {
            return Err(PeError::NotPe("missing MZ header".into()));
        }
        let pe = u32_at(&data, 0x3c)? as usize;
        if data.get(pe..pe + 4) != Some(&PE_SIGNATURE[..]) {
            return Err(PeError::NotPe("missing PE signature".into()));
        }
        let coff = pe + 4;
        let section_count = u16_at(&data, coff + 2)? as usize;
        let optional_len = u16_at(&data, coff + 16)? as usize;
        let optional = coff + COFF_HEADER_LEN;

        let pe32_plus = match u16_at(&data, optional)? {
            MAGIC_PE32 => false,
            MAGIC_PE32_PLUS => true,
            other => {
                return Err(PeError::NotPe(format!(
                    "unknown optional header magic {other:#x}"
                )));
            }
        };
        let (count_at, dirs_at) = if pe32_plus { (108, 112) } else { (92, 96) };
        let directory_count = u32_at(&data, optional + count_at)? as usize;
        if directory_count <= DIR_SECURITY {
            return Err(PeError::Malformed(format!(
                "only {directory_count} data directories"
            )));
        }
        let data_directories = optional + dirs_at;
        let section_table = optional + optional_len;

        let mut sections = Vec::with_capacity(section_count);
        for i in 0..section_count {
            let at = section_table + i * SECTION_HEADER_LEN;
            let raw_name = data
                .get(at..at + 8)
                .ok_or_else(|| PeError::Malformed("truncated section table".into()))?;
            let name = String::from_utf8_lossy(raw_name)
                .trim_end_matches('\0')
                .to_string();
            sections.push(Section {
                name,
                virtual_size: u32_at(&data, at + 8)?,
                virtual_address: u32_at(&data, at + 12)?,
                raw_size: u32_at(&data, at + 16)?,
                raw_offset: u32_at(&data, at + 20)?,
            });
        }

        Ok(Self {
            data,
            coff,
            optional,
            data_directories,
            directory_count,
            section_table,
            sections,
            pe32_plus,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    fn section_alignment(&self) -> Result<usize, PeError> {
        Ok(u32_at(&self.data, self.optional + 32)? as usize)
    }

    fn file_alignment(&self) -> Result<usize, PeError> {
        Ok(u32_at(&self.data, self.optional + 36)? as usize)
    }

    fn size_of_headers(&self) -> Result<usize, PeError> {
        Ok(u32_at(&self.data, self.optional + 60)? as usize)
    }

    fn checksum_offset(&self) -> usize {
        self.optional + 64
    }

    pub fn stored_checksum(&self) -> Result<u32, PeError> {
        u32_at(&self.data, self.checksum_offset())
    }

    /// `(rva, size)` of a data directory; `None` when empty.
    pub fn directory(&self, index: usize) -> Result<Option<(u32, u32)>, PeError> {
        if index >= self.directory_count {
            return Ok(None);
        }
        let at = self.data_directories + index * DATA_DIRECTORY_LEN;
        let rva = u32_at(&self.data, at)?;
        let size = u32_at(&self.data, at + 4)?;
        Ok((rva != 0 && size != 0).then_some((rva, size)))
    }

    fn set_directory(&mut self, index: usize, rva: u32, size: u32) {
        let at = self.data_directories + index * DATA_DIRECTORY_LEN;
        put_u32(&mut self.data, at, rva);
        put_u32(&mut self.data, at + 4, size);
    }

    pub fn rva_to_offset(&self, rva: u32) -> Option<usize> {
        self.sections
            .iter()
            .find(|s| s.contains_rva(rva))
            .and_then(|s| {
                let delta = rva - s.virtual_address;
                (delta < s.raw_size).then_some(s.raw_offset as usize + delta as usize)
            })
    }

    /// Bytes from `rva` to the end of the raw data of its section.
    pub fn section_tail(&self, rva: u32) -> Result<&[u8], PeError> {
        let section = self
            .sections
            .iter()
            .find(|s| s.contains_rva(rva))
            .ok_or_else(|| PeError::Malformed(format!("rva {rva:#x} is not mapped")))?;
        let start = self
            .rva_to_offset(rva)
            .ok_or_else(|| PeError::Malformed(format!("rva {rva:#x} has no file data")))?;
        let end = section.raw_offset as usize + section.raw_size as usize;
        self.data
            .get(start..end.min(self.data.len()))
            .ok_or_else(|| PeError::Malformed("section extends past end of file".into()))
    }

    pub fn read_rva(&self, rva: u32, len: u32) -> Result<&[u8], PeError> {
        let start = self
            .rva_to_offset(rva)
            .ok_or_else(|| PeError::Malformed(format!("rva {rva:#x} is not mapped")))?;
        self.data
            .get(start..start + len as usize)
            .ok_or_else(|| PeError::Malformed(format!("data at rva {rva:#x} is truncated")))
    }

    /// RVA the next appended section would be mapped at.
    pub fn next_section_rva(&self) -> Result<u32, PeError> {
        let end = self
            .sections
            .iter()
            .map(|s| s.virtual_address as usize + s.virtual_size.max(s.raw_size) as usize)
            .max()
            .unwrap_or(0);
        let aligned = align_up(end, self.section_alignment()?);
        u32::try_from(aligned).map_err(|_| PeError::Malformed("image too large".into()))
    }

    /// Append `payload` as a new `.rsrc` section mapped at `rva` and point
    /// the resource directory at it. The previous resource section stays in
    /// place, unreferenced. Any Authenticode signature is dropped; overlay
    /// data after the sections is carried over.
    pub fn append_resource_section(&mut self, rva: u32, payload: &[u8]) -> Result<(), PeError> {
        let file_alignment = self.file_alignment()?;
        let section_alignment = self.section_alignment()?;

        let header_at = self.section_table + self.sections.len() * SECTION_HEADER_LEN;
        let first_raw = self
            .sections
            .iter()
            .filter(|s| s.raw_size > 0)
            .map(|s| s.raw_offset as usize)
            .min()
            .unwrap_or(usize::MAX);
        if header_at + SECTION_HEADER_LEN > self.size_of_headers()?.min(first_raw) {
            return Err(PeError::NoHeaderRoom);
        }

        let sections_end = self
            .sections
            .iter()
            .map(|s| s.raw_offset as usize + s.raw_size as usize)
            .max()
            .unwrap_or(self.size_of_headers()?)
            .min(self.data.len());

        let mut overlay = self.data[sections_end..].to_vec();
        if let Some((cert_offset, _)) = self.directory(DIR_SECURITY)? {
            let cert_offset = cert_offset as usize;
            if cert_offset >= sections_end {
                overlay.truncate(cert_offset - sections_end);
            }
            self.set_directory(DIR_SECURITY, 0, 0);
        }

        let raw_offset = align_up(sections_end, file_alignment);
        let raw_size = align_up(payload.len(), file_alignment);
        let to_u32 = |v: usize| {
            u32::try_from(v).map_err(|_| PeError::Malformed("image too large".into()))
        };

        self.data.truncate(sections_end);
        self.data.resize(raw_offset, 0);
        self.data.extend_from_slice(payload);
        self.data.resize(raw_offset + raw_size, 0);
        self.data.extend_from_slice(&overlay);

        let section = Section {
            name: ".rsrc".into(),
            virtual_size: to_u32(payload.len())?,
            virtual_address: rva,
            raw_size: to_u32(raw_size)?,
            raw_offset: to_u32(raw_offset)?,
        };
        let mut name = [0u8; 8];
        name[..5].copy_from_slice(b".rsrc");
        self.data[header_at..header_at + SECTION_HEADER_LEN].fill(0);
        self.data[header_at..header_at + 8].copy_from_slice(&name);
        put_u32(&mut self.data, header_at + 8, section.virtual_size);
        put_u32(&mut self.data, header_at + 12, section.virtual_address);
        put_u32(&mut self.data, header_at + 16, section.raw_size);
        put_u32(&mut self.data, header_at + 20, section.raw_offset);
        put_u32(&mut self.data, header_at + 36, RSRC_CHARACTERISTICS);
        self.sections.push(section);

        let count = u16::try_from(self.sections.len())
            .map_err(|_| PeError::Malformed("too many sections".into()))?;
        put_u16(&mut self.data, self.coff + 2, count);
        let image_size = align_up(rva as usize + payload.len(), section_alignment);
        put_u32(&mut self.data, self.optional + 56, to_u32(image_size)?);
        self.set_directory(DIR_RESOURCE, rva, to_u32(payload.len())?);

        self.update_checksum();
        Ok(())
    }

    fn update_checksum(&mut self) {
        let at = self.checksum_offset();
        put_u32(&mut self.data, at, 0);
        let sum = checksum(&self.data);
        put_u32(&mut self.data, at, sum);
    }
}

/// The PE image checksum: 16-bit one's-complement style fold of the whole
/// file (checksum field zeroed) plus the file length.
pub fn checksum(data: &[u8]) -> u32 {
    let mut sum: u64 = 0;
    for word in data.chunks(2) {
        let lo = word[0] as u64;
        let hi = word.get(1).copied().unwrap_or(0) as u64;
        sum += lo | (hi << 8);
        sum = (sum & 0xffff) + (sum >> 16);
    }
    sum = (sum & 0xffff) + (sum >> 16);
    (sum as u32).wrapping_add(data.len() as u32)
}
