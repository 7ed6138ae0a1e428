//! The container's on-disk sorted dictionary.
//!
//! An index group is a flat list of `(id, left, right, name, data)` entries
//! forming a bitwise trie: the runtime walks left or right depending on a
//! single bit of the queried name, selected by each entry's `id` (byte index
//! times eight plus bit position). Entry ids and links are a pure function
//! of the name set, reproduced here exactly as the game's rebuild computes
//! them.

use crate::binstream::{BinReader, BinWriter, Mark};
use crate::error::BrresError;

const ENTRY_SIZE: usize = 16;
const HEADER_SIZE: usize = 8;

#[derive(Debug, Clone)]
struct CalcEntry {
    id: u16,
    left: u16,
    right: u16,
    idx: u16,
    name: Vec<u8>,
}

fn highest_bit(val: u8) -> u16 {
    (7 - (val | 1).leading_zeros()) as u16
}

impl CalcEntry {
    fn new(idx: u16, name: &[u8]) -> Self {
        Self {
            id: 0xffff,
            left: 0,
            right: 0,
            idx,
            name: name.to_vec(),
        }
    }

    /// The most significant differing bit between `other` and this entry's
    /// name, encoded as `byte_index << 3 | bit`.
    fn calc_id(&mut self, other: &[u8]) {
        let subjlen = self.name.len();
        if other.len() < subjlen {
            let val = self.name[subjlen - 1];
            self.id = ((subjlen - 1) << 3) as u16 | highest_bit(val);
        } else {
            for i in (0..subjlen).rev() {
                let ch = other[i] ^ self.name[i];
                if ch != 0 {
                    self.id = (i << 3) as u16 | highest_bit(ch);
                    break;
                }
            }
        }
    }

    fn id_bit(&self, id: u16) -> bool {
        name_bit(&self.name, id)
    }
}

fn name_bit(name: &[u8], id: u16) -> bool {
    let idx = (id >> 3) as usize;
    if idx < name.len() {
        (name[idx] >> (id & 7)) & 1 != 0
    } else {
        false
    }
}

fn calc_entry(entries: &mut [CalcEntry], index: usize) {
    let mut entry = entries[index].clone();
    let empty: &[u8] = &[];
    if !entry.name.is_empty() {
        entry.calc_id(empty);
    }
    entry.left = entry.idx;
    entry.right = entry.idx;

    let mut prev = 0usize; // head
    let mut current = entries[entries[0].left as usize].idx as usize;
    let mut is_right = false;
    while entry.id <= entries[current].id && entries[current].id < entries[prev].id {
        if entry.id == entries[current].id {
            let current_name = entries[current].name.clone();
            entry.calc_id(&current_name);
            if name_bit(&current_name, entry.id) {
                entry.left = entry.idx;
                entry.right = entries[current].idx;
            } else {
                entry.left = entries[current].idx;
                entry.right = entry.idx;
            }
        }
        prev = current;
        is_right = entry.id_bit(entries[current].id);
        current = if is_right {
            entries[current].right as usize
        } else {
            entries[current].left as usize
        };
    }
    if entries[current].name.len() == entry.name.len() && entries[current].id_bit(entry.id) {
        entry.right = entries[current].idx;
    } else {
        entry.left = entries[current].idx;
    }
    if is_right {
        entries[prev].right = entry.idx;
    } else {
        entries[prev].left = entry.idx;
    }
    entries[index] = entry;
}

/// A named entry queued for packing. `data_ptr` holds a precomputed pointer
/// relative to the group start, or `None` to reserve a slot resolved later.
#[derive(Debug, Clone)]
pub struct GroupEntry {
    pub name: String,
    pub data_ptr: Option<u32>,
}

/// An index group being assembled for packing.
#[derive(Debug, Clone, Default)]
pub struct IndexGroup {
    entries: Vec<GroupEntry>,
}

impl IndexGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entry(&mut self, name: &str) {
        self.entries.push(GroupEntry {
            name: name.to_string(),
            data_ptr: None,
        });
    }

    pub fn add_entry_with_ptr(&mut self, name: &str, data_ptr: u32) {
        self.entries.push(GroupEntry {
            name: name.to_string(),
            data_ptr: Some(data_ptr),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn byte_size(&self) -> usize {
        HEADER_SIZE + (self.entries.len() + 1) * ENTRY_SIZE
    }

    /// Computes the trie fields for the sentinel plus every entry.
    fn calc_entries(&self) -> Vec<CalcEntry> {
        let mut list = Vec::with_capacity(self.entries.len() + 1);
        list.push(CalcEntry::new(0, &[]));
        for (i, entry) in self.entries.iter().enumerate() {
            list.push(CalcEntry::new((i + 1) as u16, entry.name.as_bytes()));
        }
        for i in 0..list.len() {
            calc_entry(&mut list, i);
        }
        list
    }

    /// Serializes the group, returning a handle used to resolve the data
    /// pointers of entries packed later.
    pub fn pack(&self, writer: &mut BinWriter) -> PackedGroup {
        let calc = self.calc_entries();
        // names and data pointers are relative to the group itself
        let base = writer.start();
        writer.write_u32(self.byte_size() as u32);
        writer.write_u32(self.entries.len() as u32);

        let mut marks = Vec::with_capacity(self.entries.len());
        for (i, entry) in calc.iter().enumerate() {
            writer.write_u16(entry.id);
            writer.write_u16(0);
            writer.write_u16(entry.left);
            writer.write_u16(entry.right);
            if i == 0 {
                // sentinel has no name or data
                writer.write_u32(0);
                writer.write_u32(0);
            } else {
                let source = &self.entries[i - 1];
                writer.store_name_ref(&source.name);
                match source.data_ptr {
                    Some(ptr) => writer.write_u32(ptr),
                    None => marks.push(writer.mark()),
                }
            }
        }
        writer.end();
        PackedGroup { base, marks, next: 0 }
    }

    /// Deterministic lookup mirroring the game's runtime walk.
    pub fn find(&self, name: &str) -> Option<usize> {
        if self.entries.is_empty() {
            return None;
        }
        let calc = self.calc_entries();
        let key = name.as_bytes();
        let mut prev = 0usize;
        let mut current = calc[0].left as usize;
        while calc[current].id < calc[prev].id {
            prev = current;
            current = if name_bit(key, calc[current].id) {
                calc[current].right as usize
            } else {
                calc[current].left as usize
            };
        }
        if current > 0 && calc[current].name == key {
            Some(current - 1)
        } else {
            None
        }
    }
}

/// Data pointer slots of a packed group, resolved in entry order as each
/// pointee is packed.
pub struct PackedGroup {
    pub base: usize,
    marks: Vec<Mark>,
    next: usize,
}

impl PackedGroup {
    /// Resolves the next pending entry's data pointer to the current offset,
    /// relative to the group start.
    pub fn resolve_next(&mut self, writer: &mut BinWriter) -> Result<(), BrresError> {
        let mark = self
            .marks
            .get(self.next)
            .copied()
            .ok_or(BrresError::MissingReference {
                base: self.base,
                index: self.next,
            })?;
        self.next += 1;
        writer.resolve_from(mark, self.base);
        Ok(())
    }

    /// Resolves a specific entry's data pointer (insertion order) to the
    /// current offset, without touching the in-order cursor.
    pub fn resolve_at(&mut self, writer: &mut BinWriter, index: usize) -> Result<(), BrresError> {
        let mark = self
            .marks
            .get(index)
            .copied()
            .ok_or(BrresError::MissingReference {
                base: self.base,
                index,
            })?;
        writer.resolve_from(mark, self.base);
        Ok(())
    }

    /// Resolves the next pending entry's data pointer to an absolute target
    /// that was already written.
    pub fn resolve_next_to(
        &mut self,
        writer: &mut BinWriter,
        target: usize,
    ) -> Result<(), BrresError> {
        let mark = self
            .marks
            .get(self.next)
            .copied()
            .ok_or(BrresError::MissingReference {
                base: self.base,
                index: self.next,
            })?;
        self.next += 1;
        writer.resolve_raw(mark, (target - self.base) as u32);
        Ok(())
    }
}

/// An index group read from a file. Data pointers are stored against the
/// group's base so entries can be recalled after the group region ends.
#[derive(Debug)]
pub struct ReadGroup {
    pub base: usize,
    names: Vec<String>,
    next: usize,
}

impl ReadGroup {
    pub fn unpack(reader: &mut BinReader) -> Result<Self, BrresError> {
        let base = reader.start();
        let _byte_size = reader.read_u32()?;
        let num_entries = reader.read_u32()? as usize;
        reader.skip(ENTRY_SIZE)?; // sentinel
        let mut names = Vec::with_capacity(num_entries);
        for _ in 0..num_entries {
            reader.skip(8)?; // id, pad, left, right
            let name = reader.read_name()?.unwrap_or_default();
            reader.store(1)?;
            names.push(name);
        }
        reader.end();
        Ok(Self {
            base,
            names,
            next: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Seeks to the next entry's data and returns its name.
    pub fn recall_next(&mut self, reader: &mut BinReader) -> Result<String, BrresError> {
        let name = self
            .names
            .get(self.next)
            .cloned()
            .ok_or(BrresError::MissingReference {
                base: self.base,
                index: self.next,
            })?;
        reader.recall_offset(self.base, 0)?;
        self.next += 1;
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn triples(names: &[&str]) -> Vec<(u16, u16, u16)> {
        let mut group = IndexGroup::new();
        for name in names {
            group.add_entry(name);
        }
        group
            .calc_entries()
            .iter()
            .map(|e| (e.id, e.left, e.right))
            .collect()
    }

    #[test]
    fn highest_bit_positions() {
        assert_eq!(highest_bit(0x80), 7);
        assert_eq!(highest_bit(0x41), 6);
        assert_eq!(highest_bit(0x03), 1);
        assert_eq!(highest_bit(0x01), 0);
    }

    #[test]
    fn abc_entry_triple() {
        let t = triples(&["A", "AB", "ABC", "B"]);
        // sentinel
        assert_eq!(t[0], (0xffff, 3, 0));
        assert_eq!(t[1], (6, 0, 4)); // "A"
        assert_eq!(t[2], (14, 1, 2)); // "AB"
        assert_eq!(t[3], (22, 2, 3)); // "ABC"
        assert_eq!(t[4], (1, 1, 4)); // "B"
    }

    #[test]
    fn lookup_finds_every_entry() {
        let names = ["courseA", "courseB", "map_model", "vrcorn", "a", "ab"];
        let mut group = IndexGroup::new();
        for name in &names {
            group.add_entry(name);
        }
        for (i, name) in names.iter().enumerate() {
            assert_eq!(group.find(name), Some(i), "lookup failed for {}", name);
        }
        assert_eq!(group.find("missing"), None);
    }

    #[test]
    fn pack_then_unpack_preserves_names_and_ptrs() {
        let mut group = IndexGroup::new();
        group.add_entry("model3d");
        group.add_entry("texA");

        let mut writer = BinWriter::new();
        writer.start();
        let mut packed = group.pack(&mut writer);
        // pretend both payloads start right after the group
        packed.resolve_next(&mut writer).unwrap();
        writer.write_u32(0xdead_beef);
        packed.resolve_next(&mut writer).unwrap();
        writer.write_u32(0xcafe_f00d);
        writer.end();
        writer.pack_names();
        let file = writer.finish().unwrap();

        let mut reader = BinReader::new(file);
        reader.start();
        let mut read = ReadGroup::unpack(&mut reader).unwrap();
        assert_eq!(read.names(), &["model3d".to_string(), "texA".to_string()]);
        assert_eq!(read.recall_next(&mut reader).unwrap(), "model3d");
        assert_eq!(reader.read_u32().unwrap(), 0xdead_beef);
        assert_eq!(read.recall_next(&mut reader).unwrap(), "texA");
        assert_eq!(reader.read_u32().unwrap(), 0xcafe_f00d);
    }

    #[test]
    fn byte_size_counts_sentinel() {
        let mut group = IndexGroup::new();
        group.add_entry("one");
        group.add_entry("two");
        assert_eq!(group.byte_size(), 8 + 16 * 3);
    }
}
