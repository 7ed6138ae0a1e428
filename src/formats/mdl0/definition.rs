//! Definition lists: byte command streams that drive bone hierarchy setup,
//! matrix blending and draw order. Every list ends with the 0x01 command.

use crate::binstream::{BinReader, BinWriter};
use crate::error::BrresError;

const CMD_DONE: u8 = 0x01;
const CMD_NODE: u8 = 0x02;
const CMD_MIX: u8 = 0x03;
const CMD_DRAW: u8 = 0x04;

/// Bone hierarchy: one command per bone pairing its index with the parent's
/// weight slot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "derive_serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeTree {
    pub nodes: Vec<(u16, u16)>,
}

impl NodeTree {
    pub fn add_entry(&mut self, bone_index: u16, parent_index: u16) {
        self.nodes.push((bone_index, parent_index));
    }

    pub fn pack(&self, writer: &mut BinWriter) {
        for (bone, parent) in &self.nodes {
            writer.write_u8(CMD_NODE);
            writer.write_u16(*bone);
            writer.write_u16(*parent);
        }
        writer.write_u8(CMD_DONE);
    }

    pub fn unpack(reader: &mut BinReader) -> Result<Self, BrresError> {
        let mut nodes = Vec::new();
        loop {
            let byte = reader.read_u8()?;
            if byte == CMD_DONE {
                break;
            }
            if byte != CMD_NODE {
                return Err(BrresError::Decode(format!(
                    "unexpected command {:#x} in node tree",
                    byte
                )));
            }
            nodes.push((reader.read_u16()?, reader.read_u16()?));
        }
        Ok(Self { nodes })
    }
}

/// One command of a matrix blend list.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "derive_serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MixCommand {
    /// Blends several weight slots into slot `weight_id`.
    Blend {
        weight_id: u16,
        weights: Vec<(u16, f32)>,
    },
    /// Raw draw setup command.
    Draw([u8; 7]),
    /// Any other low command with its fixed four byte payload.
    Other(u8, [u8; 4]),
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "derive_serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeMix {
    pub commands: Vec<MixCommand>,
}

impl NodeMix {
    pub fn add_blend(&mut self, weight_id: u16, weights: Vec<(u16, f32)>) {
        self.commands.push(MixCommand::Blend { weight_id, weights });
    }

    pub fn pack(&self, writer: &mut BinWriter) {
        for command in &self.commands {
            match command {
                MixCommand::Blend { weight_id, weights } => {
                    writer.write_u8(CMD_MIX);
                    writer.write_u16(*weight_id);
                    writer.write_u8(weights.len() as u8);
                    for (id, weight) in weights {
                        writer.write_u16(*id);
                        writer.write_f32(*weight);
                    }
                }
                MixCommand::Draw(data) => {
                    writer.write_u8(CMD_DRAW);
                    writer.write_bytes(data);
                }
                MixCommand::Other(cmd, data) => {
                    writer.write_u8(*cmd);
                    writer.write_bytes(data);
                }
            }
        }
        writer.write_u8(CMD_DONE);
    }

    pub fn unpack(reader: &mut BinReader) -> Result<Self, BrresError> {
        let mut commands = Vec::new();
        loop {
            let byte = reader.read_u8()?;
            match byte {
                CMD_DONE => break,
                CMD_MIX => {
                    let weight_id = reader.read_u16()?;
                    let count = reader.read_u8()?;
                    let mut weights = Vec::with_capacity(count as usize);
                    for _ in 0..count {
                        weights.push((reader.read_u16()?, reader.read_f32()?));
                    }
                    commands.push(MixCommand::Blend { weight_id, weights });
                }
                CMD_DRAW => {
                    let mut data = [0u8; 7];
                    for b in &mut data {
                        *b = reader.read_u8()?;
                    }
                    commands.push(MixCommand::Draw(data));
                }
                cmd if cmd <= 0x6 => {
                    let mut data = [0u8; 4];
                    for b in &mut data {
                        *b = reader.read_u8()?;
                    }
                    commands.push(MixCommand::Other(cmd, data));
                }
                cmd => {
                    return Err(BrresError::Decode(format!(
                        "unexpected command {:#x} in node mix list",
                        cmd
                    )))
                }
            }
        }
        Ok(Self { commands })
    }
}

/// Consumes a definition list with an unrecognized name, stepping over each
/// command by its size until the terminator. Payload bytes may contain 0x01,
/// so scanning for the terminator byte alone would stop short.
pub fn skip_list(reader: &mut BinReader) -> Result<(), BrresError> {
    loop {
        match reader.read_u8()? {
            CMD_DONE => return Ok(()),
            CMD_MIX => {
                reader.skip(2)?;
                let count = reader.read_u8()? as usize;
                reader.skip(count * 6)?;
            }
            CMD_DRAW => reader.skip(7)?,
            cmd if cmd <= 0x6 => reader.skip(4)?,
            cmd => {
                return Err(BrresError::Decode(format!(
                    "unexpected command {:#x} in definition list",
                    cmd
                )))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "derive_serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DrawEntry {
    pub material: u16,
    pub object: u16,
    pub bone: u16,
    pub priority: u8,
}

/// Draw order list, one entry per object, sorted by priority.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "derive_serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DrawList {
    pub entries: Vec<DrawEntry>,
}

impl DrawList {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn add_entry(&mut self, material: u16, object: u16, bone: u16, priority: u8) {
        self.entries.push(DrawEntry {
            material,
            object,
            bone,
            priority,
        });
    }

    pub fn sort(&mut self) {
        self.entries.sort_by_key(|e| e.priority);
    }

    pub fn by_material(&self, material: u16) -> Option<&DrawEntry> {
        self.entries.iter().find(|e| e.material == material)
    }

    pub fn pack(&self, writer: &mut BinWriter) {
        for entry in &self.entries {
            writer.write_u8(CMD_DRAW);
            writer.write_u16(entry.material);
            writer.write_u16(entry.object);
            writer.write_u16(entry.bone);
            writer.write_u8(entry.priority);
        }
        writer.write_u8(CMD_DONE);
    }

    pub fn unpack(reader: &mut BinReader) -> Result<Self, BrresError> {
        let mut entries = Vec::new();
        loop {
            let byte = reader.read_u8()?;
            if byte == CMD_DONE {
                break;
            }
            if byte != CMD_DRAW {
                return Err(BrresError::Decode(format!(
                    "unexpected command {:#x} in draw list",
                    byte
                )));
            }
            entries.push(DrawEntry {
                material: reader.read_u16()?,
                object: reader.read_u16()?,
                bone: reader.read_u16()?,
                priority: reader.read_u8()?,
            });
        }
        Ok(Self { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn node_tree_round_trip() {
        let mut tree = NodeTree::default();
        tree.add_entry(0, 0);
        tree.add_entry(1, 0);
        tree.add_entry(2, 1);
        let mut writer = BinWriter::new();
        writer.start();
        tree.pack(&mut writer);
        writer.end();
        let data = writer.finish().unwrap();
        assert_eq!(data.len(), 3 * 5 + 1);

        let mut reader = BinReader::new(data);
        reader.start();
        assert_eq!(NodeTree::unpack(&mut reader).unwrap(), tree);
    }

    #[test]
    fn node_mix_round_trip() {
        let mut mix = NodeMix::default();
        mix.add_blend(3, vec![(0, 0.75), (1, 0.25)]);
        mix.commands.push(MixCommand::Draw([1, 0, 2, 0, 0, 0, 0]));
        let mut writer = BinWriter::new();
        writer.start();
        mix.pack(&mut writer);
        writer.end();
        let mut reader = BinReader::new(writer.finish().unwrap());
        reader.start();
        assert_eq!(NodeMix::unpack(&mut reader).unwrap(), mix);
    }

    #[test]
    fn draw_list_sorts_by_priority() {
        let mut list = DrawList::default();
        list.add_entry(1, 1, 0, 4);
        list.add_entry(0, 0, 0, 1);
        list.sort();
        assert_eq!(list.entries[0].material, 0);

        let mut writer = BinWriter::new();
        writer.start();
        list.pack(&mut writer);
        writer.end();
        let mut reader = BinReader::new(writer.finish().unwrap());
        reader.start();
        assert_eq!(DrawList::unpack(&mut reader).unwrap(), list);
    }

    #[test]
    fn skip_list_steps_over_terminator_bytes_in_payloads() {
        // the draw payload carries 0x01 bytes that are not the terminator
        let mut reader = BinReader::new(vec![0x04, 0, 1, 0, 1, 0, 1, 0, 0x01, 0xaa]);
        reader.start();
        skip_list(&mut reader).unwrap();
        assert_eq!(reader.read_u8().unwrap(), 0xaa);
    }

    #[test]
    fn bad_command_is_rejected() {
        let mut reader = BinReader::new(vec![0x09, 0, 0, 0, 0, 0x01]);
        reader.start();
        assert!(NodeMix::unpack(&mut reader).is_err());
    }
}
