//! Positional binary reading and writing with nested regions.
//!
//! Every pointer in a BRRES file is relative to the start of some enclosing
//! region: sub-files point into themselves, index groups point at their
//! entries, and the trailing name pool is addressed relative to whichever
//! region holds the reference. [BinWriter] builds the file in one forward
//! pass, reserving four byte slots ([Mark]) wherever a pointer's target is
//! not known yet and patching them once it is. [BinReader] mirrors this with
//! stored offsets that can be recalled to reposition the cursor.

use std::collections::BTreeMap;
use std::convert::TryInto;

use ahash::AHashMap;
use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::BrresError;

/// Byte order of a container, selected by the BOM on read.
/// Files are always written big endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Big,
    Little,
}

impl Endian {
    fn u16(self, b: &[u8]) -> u16 {
        match self {
            Endian::Big => BigEndian::read_u16(b),
            Endian::Little => LittleEndian::read_u16(b),
        }
    }

    fn u32(self, b: &[u8]) -> u32 {
        match self {
            Endian::Big => BigEndian::read_u32(b),
            Endian::Little => LittleEndian::read_u32(b),
        }
    }

    fn f32(self, b: &[u8]) -> f32 {
        match self {
            Endian::Big => BigEndian::read_f32(b),
            Endian::Little => LittleEndian::read_f32(b),
        }
    }
}

/// A reserved pointer slot returned by [BinWriter::mark].
///
/// Marks are plain handles. Dropping one without resolving it leaves the
/// slot unfilled, which [BinWriter::finish] reports as
/// [BrresError::UnresolvedReferences].
#[derive(Debug, Clone, Copy)]
pub struct Mark(usize);

#[derive(Debug)]
struct Slot {
    pos: usize,
    filled: bool,
}

#[derive(Debug)]
struct WriteRegion {
    base: usize,
    len_slot: Option<usize>,
}

/// Append-only big endian writer with a stack of regions and deferred
/// pointer resolution.
pub struct BinWriter {
    data: Vec<u8>,
    regions: Vec<WriteRegion>,
    slots: Vec<Slot>,
    // name bytes -> every (region base, slot position) that references it
    name_refs: BTreeMap<Vec<u8>, Vec<(usize, usize)>>,
    names_packed: bool,
}

impl BinWriter {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            regions: vec![WriteRegion {
                base: 0,
                len_slot: None,
            }],
            slots: Vec::new(),
            name_refs: BTreeMap::new(),
            names_packed: false,
        }
    }

    /// Current absolute offset, which is always the end of the buffer.
    pub fn pos(&self) -> usize {
        self.data.len()
    }

    /// Base offset of the innermost region.
    pub fn base(&self) -> usize {
        self.regions.last().map(|r| r.base).unwrap_or(0)
    }

    /// Base offset of the region enclosing the innermost one.
    pub fn parent_base(&self) -> usize {
        if self.regions.len() > 1 {
            self.regions[self.regions.len() - 2].base
        } else {
            0
        }
    }

    /// Signed offset from the current region to its parent.
    /// Sub-file headers store this to find the enclosing container.
    pub fn outer_offset(&self) -> i32 {
        self.parent_base() as i32 - self.base() as i32
    }

    /// Pushes a new region based at the current offset and returns its base.
    pub fn start(&mut self) -> usize {
        let base = self.pos();
        self.regions.push(WriteRegion {
            base,
            len_slot: None,
        });
        base
    }

    /// Reserves the current slot for the region's total length,
    /// written when the region ends.
    pub fn mark_len(&mut self) {
        let pos = self.pos();
        if let Some(region) = self.regions.last_mut() {
            region.len_slot = Some(pos);
        }
        self.advance(4);
    }

    /// Pops the innermost region, writing its length if one was marked.
    pub fn end(&mut self) {
        if let Some(region) = self.regions.pop() {
            if let Some(slot) = region.len_slot {
                let length = (self.pos() - region.base) as u32;
                self.write_u32_at(slot, length);
            }
        }
    }

    pub fn align_and_end(&mut self, alignment: usize) {
        self.align(alignment);
        self.end();
    }

    /// Pads the region out to exactly `size` bytes, then ends it.
    pub fn pad_to_end(&mut self, size: usize) {
        let target = self.base() + size;
        if target > self.pos() {
            let n = target - self.pos();
            self.advance(n);
        }
        self.end();
    }

    /// Extends the buffer with `n` zero bytes.
    pub fn advance(&mut self, n: usize) {
        self.data.resize(self.data.len() + n, 0);
    }

    /// Zero pads until the absolute offset is a multiple of `alignment`.
    pub fn align(&mut self, alignment: usize) {
        let past = self.pos() % alignment;
        if past != 0 {
            self.advance(alignment - past);
        }
    }

    /// Zero pads until the offset is aligned relative to the parent region.
    pub fn align_to_parent(&mut self, alignment: usize) {
        let past = (self.pos() - self.parent_base()) % alignment;
        if past != 0 {
            self.advance(alignment - past);
        }
    }

    /// Reserves a pointer slot at the current offset.
    pub fn mark(&mut self) -> Mark {
        let pos = self.pos();
        self.advance(4);
        self.slots.push(Slot { pos, filled: false });
        Mark(self.slots.len() - 1)
    }

    pub fn mark_n(&mut self, n: usize) -> Vec<Mark> {
        (0..n).map(|_| self.mark()).collect()
    }

    /// Absolute position of a mark's slot.
    pub fn mark_pos(&self, mark: Mark) -> usize {
        self.slots[mark.0].pos
    }

    fn fill(&mut self, mark: Mark, value: u32) {
        let pos = self.slots[mark.0].pos;
        self.write_u32_at(pos, value);
        self.slots[mark.0].filled = true;
    }

    /// Writes the current offset relative to the current region into the slot.
    pub fn resolve(&mut self, mark: Mark) {
        let value = (self.pos() - self.base()) as u32;
        self.fill(mark, value);
    }

    /// Writes the current offset relative to `base` into the slot.
    pub fn resolve_from(&mut self, mark: Mark, base: usize) {
        let value = (self.pos() - base) as u32;
        self.fill(mark, value);
    }

    /// Writes the current offset relative to the slot's own position.
    pub fn resolve_rel(&mut self, mark: Mark) {
        let value = (self.pos() - self.slots[mark.0].pos) as u32;
        self.fill(mark, value);
    }

    /// Writes `target` relative to the slot's own position. Used when the
    /// pointee was already packed, such as a shared keyframe list.
    pub fn resolve_rel_to(&mut self, mark: Mark, target: usize) {
        let value = (target as isize - self.slots[mark.0].pos as isize) as u32;
        self.fill(mark, value);
    }

    /// Fills the slot with a raw value.
    pub fn resolve_raw(&mut self, mark: Mark, value: u32) {
        self.fill(mark, value);
    }

    pub fn write_magic(&mut self, magic: &[u8; 4]) {
        self.data.extend_from_slice(magic);
    }

    pub fn write_u8(&mut self, v: u8) {
        self.data.push(v);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.data.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_i16(&mut self, v: i16) {
        self.data.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.data.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_i32(&mut self, v: i32) {
        self.data.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_f32(&mut self, v: f32) {
        self.data.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Patches a u32 at an absolute offset that was already written.
    pub fn write_u32_at(&mut self, pos: usize, v: u32) {
        self.data[pos..pos + 4].copy_from_slice(&v.to_be_bytes());
    }

    /// Reserves a name pointer slot at the current offset, to be patched by
    /// [BinWriter::pack_names] with the pool offset relative to the current
    /// region's base.
    pub fn store_name_ref(&mut self, name: &str) {
        let base = self.base();
        let pos = self.pos();
        self.name_refs
            .entry(name.as_bytes().to_vec())
            .or_default()
            .push((base, pos));
        self.advance(4);
    }

    /// Registers an existing four byte slot inside already written data as
    /// a name reference, relative to `region_base`. Used when a payload is
    /// carried opaquely but its name pointers must target the new pool.
    pub fn store_name_ref_at(&mut self, name: &str, region_base: usize, slot: usize) {
        self.name_refs
            .entry(name.as_bytes().to_vec())
            .or_default()
            .push((region_base, slot));
    }

    /// Writes the sorted, deduplicated name pool and patches every
    /// reference slot with `name_offset - region_base`.
    ///
    /// A writer that never stored a name reference gets no pool and no
    /// trailing padding, so it doubles as a plain byte buffer.
    pub fn pack_names(&mut self) {
        self.names_packed = true;
        if self.name_refs.is_empty() {
            return;
        }
        let names = std::mem::take(&mut self.name_refs);
        for (name, refs) in &names {
            if name.is_empty() {
                continue;
            }
            self.align(4);
            // pointers target the first byte of the name, not the length
            let name_offset = self.pos() + 4;
            self.write_u32(name.len() as u32);
            self.write_bytes(name);
            self.write_u8(0);
            for &(region_base, slot) in refs {
                self.write_u32_at(slot, (name_offset - region_base) as u32);
            }
        }
        self.align(32);
    }

    /// Finishes packing and returns the file contents.
    ///
    /// Fails if any region is still open or a marked slot was never resolved.
    pub fn finish(mut self) -> Result<Vec<u8>, BrresError> {
        if self.regions.len() > 1 {
            return Err(BrresError::Packing(format!(
                "{} regions still open",
                self.regions.len() - 1
            )));
        }
        if !self.names_packed {
            self.pack_names();
        }
        let unresolved = self.slots.iter().filter(|s| !s.filled).count();
        if unresolved > 0 {
            return Err(BrresError::UnresolvedReferences { count: unresolved });
        }
        Ok(self.data)
    }
}

impl Default for BinWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct ReadRegion {
    base: usize,
    length: Option<usize>,
}

/// Reader over a fully buffered file with the same region model as
/// [BinWriter]. Stored pointers are kept per region base so index group
/// entries can be recalled after their group's region has ended.
pub struct BinReader {
    data: Vec<u8>,
    offset: usize,
    endian: Endian,
    regions: Vec<ReadRegion>,
    stored: AHashMap<usize, Vec<u32>>,
    name_cache: AHashMap<usize, String>,
}

impl BinReader {
    pub fn new(data: Vec<u8>) -> Self {
        let mut stored = AHashMap::new();
        stored.insert(0, Vec::new());
        Self {
            data,
            offset: 0,
            endian: Endian::Big,
            regions: vec![ReadRegion {
                base: 0,
                length: None,
            }],
            stored,
            name_cache: AHashMap::new(),
        }
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn set_endian(&mut self, endian: Endian) {
        self.endian = endian;
    }

    pub fn pos(&self) -> usize {
        self.offset
    }

    pub fn base(&self) -> usize {
        self.regions.last().map(|r| r.base).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn seek(&mut self, offset: usize) {
        self.offset = offset;
    }

    /// Pushes a region based at the current offset.
    pub fn start(&mut self) -> usize {
        let base = self.offset;
        self.regions.push(ReadRegion { base, length: None });
        self.stored.insert(base, Vec::new());
        base
    }

    pub fn end(&mut self) {
        self.regions.pop();
    }

    /// Depth of the open region stack.
    pub fn region_depth(&self) -> usize {
        self.regions.len()
    }

    /// Pops regions opened past `depth`, abandoning a record that failed
    /// to parse so the caller can continue with the next stored pointer.
    pub fn unwind_to(&mut self, depth: usize) {
        while self.regions.len() > depth {
            self.regions.pop();
        }
    }

    /// Reads a u32 section length and records it for bounds checks.
    pub fn read_len(&mut self) -> Result<usize, BrresError> {
        let length = self.read_u32()? as usize;
        if let Some(region) = self.regions.last_mut() {
            region.length = Some(length);
        }
        Ok(length)
    }

    /// Recorded length of the current region, if any.
    pub fn region_len(&self) -> Option<usize> {
        self.regions.last().and_then(|r| r.length)
    }

    fn check(&self, n: usize) -> Result<(), BrresError> {
        if self.offset + n > self.data.len() {
            return Err(BrresError::UnexpectedEof {
                offset: self.offset,
            });
        }
        if let Some(region) = self.regions.last() {
            if let Some(length) = region.length {
                if self.offset + n - region.base > length {
                    return Err(BrresError::OversizedLength {
                        offset: self.offset + n,
                        length,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn skip(&mut self, n: usize) -> Result<(), BrresError> {
        self.check(n)?;
        self.offset += n;
        Ok(())
    }

    pub fn align(&mut self, alignment: usize) -> Result<(), BrresError> {
        let past = self.offset % alignment;
        if past != 0 {
            self.skip(alignment - past)?;
        }
        Ok(())
    }

    pub fn read_magic(&mut self) -> Result<[u8; 4], BrresError> {
        self.check(4)?;
        let magic = self.data[self.offset..self.offset + 4]
            .try_into()
            .unwrap_or([0u8; 4]);
        self.offset += 4;
        Ok(magic)
    }

    pub fn expect_magic(&mut self, expected: &[u8; 4]) -> Result<(), BrresError> {
        let found = self.read_magic()?;
        if &found != expected {
            return Err(BrresError::InvalidMagic {
                expected: *expected,
                found,
            });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, BrresError> {
        self.check(1)?;
        let v = self.data[self.offset];
        self.offset += 1;
        Ok(v)
    }

    pub fn read_u16(&mut self) -> Result<u16, BrresError> {
        self.check(2)?;
        let v = self.endian.u16(&self.data[self.offset..]);
        self.offset += 2;
        Ok(v)
    }

    pub fn read_i16(&mut self) -> Result<i16, BrresError> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_u32(&mut self) -> Result<u32, BrresError> {
        self.check(4)?;
        let v = self.endian.u32(&self.data[self.offset..]);
        self.offset += 4;
        Ok(v)
    }

    pub fn read_i32(&mut self) -> Result<i32, BrresError> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_f32(&mut self) -> Result<f32, BrresError> {
        self.check(4)?;
        let v = self.endian.f32(&self.data[self.offset..]);
        self.offset += 4;
        Ok(v)
    }

    pub fn read_f32x3(&mut self) -> Result<[f32; 3], BrresError> {
        Ok([self.read_f32()?, self.read_f32()?, self.read_f32()?])
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, BrresError> {
        self.check(n)?;
        let v = self.data[self.offset..self.offset + n].to_vec();
        self.offset += n;
        Ok(v)
    }

    /// Reads to the end of the current region's recorded length.
    pub fn read_remaining(&mut self) -> Result<Vec<u8>, BrresError> {
        let region = self.regions.last().map(|r| (r.base, r.length));
        let end = match region {
            Some((base, Some(length))) => base + length,
            _ => self.data.len(),
        };
        if end < self.offset || end > self.data.len() {
            return Err(BrresError::UnexpectedEof { offset: end });
        }
        let v = self.data[self.offset..end].to_vec();
        self.offset = end;
        Ok(v)
    }

    pub fn read_u16_at(&self, offset: usize) -> Result<u16, BrresError> {
        if offset + 2 > self.data.len() {
            return Err(BrresError::UnexpectedEof { offset });
        }
        Ok(self.endian.u16(&self.data[offset..]))
    }

    pub fn read_u32_at(&self, offset: usize) -> Result<u32, BrresError> {
        if offset + 4 > self.data.len() {
            return Err(BrresError::UnexpectedEof { offset });
        }
        Ok(self.endian.u32(&self.data[offset..]))
    }

    /// Reads `n` u32 pointers relative to the current region and stores them
    /// for later [BinReader::recall]. Returns the index of the first.
    pub fn store(&mut self, n: usize) -> Result<usize, BrresError> {
        let base = self.base();
        let mut values = Vec::with_capacity(n);
        for _ in 0..n {
            values.push(self.read_u32()?);
        }
        let refs = self.stored.entry(base).or_default();
        let first = refs.len();
        refs.extend(values);
        Ok(first)
    }

    /// Pushes the current offset (relative to the region) as a stored
    /// pointer without reading anything.
    pub fn push_pos(&mut self) {
        let rel = (self.offset - self.base()) as u32;
        let base = self.base();
        self.stored.entry(base).or_default().push(rel);
    }

    /// Pops the stored pointer at `index` for the current region and seeks
    /// to it. Returns the offset relative to the region base.
    pub fn recall(&mut self, index: usize) -> Result<u32, BrresError> {
        let base = self.base();
        self.recall_offset(base, index)
    }

    /// Like [BinReader::recall] for a region identified by its base offset,
    /// which may already have ended.
    pub fn recall_offset(&mut self, base: usize, index: usize) -> Result<u32, BrresError> {
        let refs = self
            .stored
            .get_mut(&base)
            .ok_or(BrresError::MissingReference { base, index })?;
        if index >= refs.len() {
            return Err(BrresError::MissingReference { base, index });
        }
        let rel = refs.remove(index);
        self.offset = base + rel as usize;
        Ok(rel)
    }

    /// Reads the stored pointer at `index` without popping or seeking.
    pub fn peek_stored(&self, base: usize, index: usize) -> Result<u32, BrresError> {
        self.stored
            .get(&base)
            .and_then(|refs| refs.get(index).copied())
            .ok_or(BrresError::MissingReference { base, index })
    }

    /// Number of stored pointers remaining for the current region.
    pub fn stored_len(&self) -> usize {
        self.stored.get(&self.base()).map(Vec::len).unwrap_or(0)
    }

    /// Reads a name pointer relative to the current region.
    ///
    /// Names live in the pool as `len:u32` followed by the bytes; the
    /// pointer targets the bytes. A zero pointer yields `None`.
    pub fn read_name(&mut self) -> Result<Option<String>, BrresError> {
        let base = self.base();
        let ptr = self.read_u32()?;
        if ptr == 0 {
            return Ok(None);
        }
        let offset = base + ptr as usize;
        if let Some(name) = self.name_cache.get(&offset) {
            return Ok(Some(name.clone()));
        }
        if offset < 4 || offset > self.data.len() {
            return Err(BrresError::UnexpectedEof { offset });
        }
        let len = self.read_u32_at(offset - 4)? as usize;
        if len > 256 || offset + len > self.data.len() {
            return Err(BrresError::Decode(format!(
                "invalid name record at offset {:#x}",
                offset
            )));
        }
        let name = String::from_utf8_lossy(&self.data[offset..offset + len]).into_owned();
        self.name_cache.insert(offset, name.clone());
        Ok(Some(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexlit::hex;

    use crate::assert_hex_eq;

    #[test]
    fn write_region_length_and_refs() {
        let mut writer = BinWriter::new();
        writer.start();
        writer.write_magic(b"ABCD");
        writer.mark_len();
        let data = writer.mark();
        writer.write_u32(7);
        writer.resolve(data);
        writer.write_u16(0x1234);
        writer.end();
        let file = writer.finish().unwrap();
        // length 18, data pointer 16 (relative to region start)
        assert_hex_eq!(file, hex!("41424344 00000012 00000010 00000007 1234"));
    }

    #[test]
    fn finish_without_names_adds_no_padding() {
        let mut writer = BinWriter::new();
        writer.write_u32(0xdead_beef);
        writer.write_u16(0x1234);
        let file = writer.finish().unwrap();
        assert_eq!(file, hex!("deadbeef 1234"));
    }

    #[test]
    fn unresolved_mark_fails() {
        let mut writer = BinWriter::new();
        let _orphan = writer.mark();
        let result = writer.finish();
        assert!(matches!(
            result,
            Err(BrresError::UnresolvedReferences { count: 1 })
        ));
    }

    #[test]
    fn name_pool_is_sorted_and_shared() {
        let mut writer = BinWriter::new();
        writer.start();
        writer.store_name_ref("beta");
        writer.store_name_ref("alpha");
        writer.store_name_ref("beta");
        writer.end();
        writer.pack_names();
        let file = writer.finish().unwrap();

        let mut reader = BinReader::new(file);
        reader.start();
        assert_eq!(reader.read_name().unwrap().as_deref(), Some("beta"));
        assert_eq!(reader.read_name().unwrap().as_deref(), Some("alpha"));
        assert_eq!(reader.read_name().unwrap().as_deref(), Some("beta"));
        // alphabetical pool order
        let alpha_ptr = reader.read_u32_at(4).unwrap();
        let beta_ptr = reader.read_u32_at(0).unwrap();
        assert!(alpha_ptr < beta_ptr);
    }

    #[test]
    fn resolve_rel_is_slot_relative() {
        let mut writer = BinWriter::new();
        writer.write_u32(0);
        let slot = writer.mark(); // slot at offset 4
        writer.write_u32(0);
        writer.resolve_rel(slot); // target at offset 12
        let file = writer.finish().unwrap();
        assert_eq!(u32::from_be_bytes(file[4..8].try_into().unwrap()), 8);
    }

    #[test]
    fn read_past_end_fails() {
        let mut reader = BinReader::new(vec![0u8; 2]);
        assert!(matches!(
            reader.read_u32(),
            Err(BrresError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn read_past_section_length_fails() {
        let mut reader = BinReader::new(hex!("00000008 00000000 00000000").to_vec());
        reader.start();
        reader.read_len().unwrap();
        reader.read_u32().unwrap();
        assert!(matches!(
            reader.read_u32(),
            Err(BrresError::OversizedLength { .. })
        ));
    }

    #[test]
    fn store_and_recall() {
        let mut reader = BinReader::new(hex!("0000000C 00000008 AABBCCDD 11223344").to_vec());
        reader.start();
        reader.store(2).unwrap();
        reader.recall(1).unwrap();
        assert_eq!(reader.read_u32().unwrap(), 0xAABBCCDD);
        reader.recall(0).unwrap();
        assert_eq!(reader.read_u32().unwrap(), 0x11223344);
        assert!(matches!(
            reader.recall(0),
            Err(BrresError::MissingReference { .. })
        ));
    }

    #[test]
    fn little_endian_reads() {
        let mut reader = BinReader::new(hex!("78563412").to_vec());
        reader.set_endian(Endian::Little);
        assert_eq!(reader.read_u32().unwrap(), 0x12345678);
    }
}
