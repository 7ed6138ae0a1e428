//! Wii GPU command encoding.
//!
//! Material and shader state is stored as literal display list commands:
//! BP (blitting processor) loads of one register each and XF (transform
//! unit) loads of one or more words. Register bit layouts follow the
//! hardware.

use modular_bitfield::prelude::*;

use crate::binstream::{BinReader, BinWriter};
use crate::error::BrresError;

pub const LOAD_BP: u8 = 0x61;
pub const LOAD_XF: u8 = 0x10;

// BP register addresses
pub const BP_IND_MTXA0: u8 = 0x06;
pub const BP_IND_CMD0: u8 = 0x10;
pub const BP_RAS1_SS0: u8 = 0x25;
pub const BP_IREF: u8 = 0x27;
pub const BP_TREF0: u8 = 0x28;
pub const BP_ZMODE: u8 = 0x40;
pub const BP_BLENDMODE: u8 = 0x41;
pub const BP_CONSTANTALPHA: u8 = 0x42;
pub const BP_MASK: u8 = 0xfe;
pub const BP_ALPHACOMPARE: u8 = 0xf3;
pub const BP_TEV_REGISTER_L0: u8 = 0xe0;
pub const BP_TEV_COLOR_ENV0: u8 = 0xc0;
pub const BP_TEV_ALPHA_ENV0: u8 = 0xc1;
pub const BP_TEV_KSEL0: u8 = 0xf6;

// XF register addresses
pub const XF_VT_SPECS: u16 = 0x1008;
pub const XF_TEX0_ID: u16 = 0x1040;
pub const XF_DUALTEX0_ID: u16 = 0x1050;

pub fn pack_bp(writer: &mut BinWriter, reg: u8, data: u32) {
    writer.write_u8(LOAD_BP);
    writer.write_u32((reg as u32) << 24 | data & 0x00ff_ffff);
}

/// Reads one BP command, returning the register and its 24 bit payload.
/// A zero opcode is a nop slot left by shorter stage blocks.
pub fn unpack_bp(reader: &mut BinReader) -> Result<(u8, u32), BrresError> {
    let op = reader.read_u8()?;
    if op != LOAD_BP && op != 0 {
        return Err(BrresError::Decode(format!(
            "expected BP load, found {:#04x}",
            op
        )));
    }
    let word = reader.read_u32()?;
    Ok(((word >> 24) as u8, word & 0x00ff_ffff))
}

pub fn pack_bp_mask(writer: &mut BinWriter, mask: u32) {
    pack_bp(writer, BP_MASK, mask);
}

pub fn pack_xf(writer: &mut BinWriter, address: u16, data: u32) {
    writer.write_u8(LOAD_XF);
    writer.write_u16(0);
    writer.write_u16(address);
    writer.write_u32(data);
}

/// Reads an XF command header plus a single data word.
/// Disabled slots (opcode 0) yield `None`.
pub fn unpack_xf(reader: &mut BinReader) -> Result<Option<(u16, u32)>, BrresError> {
    let op = reader.read_u8()?;
    let _size = reader.read_u16()?;
    let address = reader.read_u16()?;
    let data = reader.read_u32()?;
    if op == 0 {
        return Ok(None);
    }
    Ok(Some((address, data)))
}

/// Encodes a texture matrix value into the hardware's 11 bit fixed point
/// fraction: a sign bit over ten magnitude bits of halves, quarters, and on
/// down.
pub fn encode_11bit_float(val: f32) -> u32 {
    let mut e: u32 = if val < 0.0 { 1 } else { 0 };
    let mut v = val.abs();
    let mut subtractee = 0.5f32;
    for _ in 0..10 {
        e <<= 1;
        if v >= subtractee {
            v -= subtractee;
            e |= 1;
        }
        subtractee /= 2.0;
    }
    e
}

pub fn decode_11bit_float(bits: u32) -> f32 {
    let mut v = 0.0f32;
    let mut weight = 0.5f32;
    for i in (0..10).rev() {
        if bits >> i & 1 != 0 {
            v += weight;
        }
        weight /= 2.0;
    }
    if bits >> 10 & 1 != 0 {
        -v
    } else {
        v
    }
}

/// An indirect texture coordinate matrix, stored across three BP registers.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "derive_serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IndMatrix {
    pub enabled: bool,
    pub scale: i8,
    pub matrix: [[f32; 3]; 2],
}

impl Default for IndMatrix {
    fn default() -> Self {
        Self {
            enabled: false,
            scale: 0,
            matrix: [[0.0; 3]; 2],
        }
    }
}

impl IndMatrix {
    pub fn pack(&self, writer: &mut BinWriter, index: usize) {
        if !self.enabled {
            writer.advance(15);
            return;
        }
        let mut reg = BP_IND_MTXA0 + (index * 3) as u8;
        let scale = (self.scale as i32 + 17) as u32;
        for i in 0..3 {
            let sbits = scale >> (2 * i) & 3;
            let r0 = encode_11bit_float(self.matrix[0][i]);
            let r1 = encode_11bit_float(self.matrix[1][i]);
            pack_bp(writer, reg, sbits << 22 | r1 << 11 | r0);
            reg += 1;
        }
    }

    pub fn unpack(reader: &mut BinReader) -> Result<Self, BrresError> {
        let mut matrix = [[0.0f32; 3]; 2];
        let mut scale_bits = 0u32;
        let mut enabled = false;
        for (i, col) in (0..3).enumerate() {
            let (reg, data) = unpack_bp(reader)?;
            if reg != 0 {
                enabled = true;
            }
            scale_bits |= (data >> 22 & 3) << (2 * i);
            matrix[0][col] = decode_11bit_float(data & 0x7ff);
            matrix[1][col] = decode_11bit_float(data >> 11 & 0x7ff);
        }
        Ok(Self {
            enabled,
            scale: if enabled {
                scale_bits as i8 - 17
            } else {
                0
            },
            matrix: if enabled { matrix } else { [[0.0; 3]; 2] },
        })
    }
}

/// The alpha compare test, BP register 0xf3.
#[bitfield(bits = 24)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlphaFunction {
    pub ref0: u8,
    pub ref1: u8,
    pub comp0: B3,
    pub comp1: B3,
    pub logic: B2,
}

/// Depth buffer control, BP register 0x40.
#[bitfield(bits = 24)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZMode {
    pub depth_test: bool,
    pub depth_function: B3,
    pub depth_update: bool,
    #[skip]
    __: B19,
}

/// Blend control, BP register 0x41.
#[bitfield(bits = 24)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlendMode {
    pub enabled: bool,
    pub logic_enabled: bool,
    pub dither: bool,
    pub update_color: bool,
    pub update_alpha: bool,
    pub dest: B3,
    pub source: B3,
    pub subtract: bool,
    pub logic: B4,
    #[skip]
    __: B8,
}

/// Constant alpha override, BP register 0x42.
#[bitfield(bits = 24)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantAlpha {
    pub alpha: u8,
    pub enabled: bool,
    #[skip]
    __: B15,
}

// bitfield bytes are least significant first, BP payloads are u32
fn bp_payload(bytes: [u8; 3]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0])
}

fn bp_fields(data: u32) -> [u8; 3] {
    let b = data.to_le_bytes();
    [b[0], b[1], b[2]]
}

pub fn pack_alpha_function(writer: &mut BinWriter, function: AlphaFunction) {
    pack_bp(writer, BP_ALPHACOMPARE, bp_payload(function.into_bytes()));
}

pub fn unpack_alpha_function(reader: &mut BinReader) -> Result<AlphaFunction, BrresError> {
    let (_, data) = unpack_bp(reader)?;
    Ok(AlphaFunction::from_bytes(bp_fields(data)))
}

pub fn pack_zmode(writer: &mut BinWriter, zmode: ZMode) {
    pack_bp(writer, BP_ZMODE, bp_payload(zmode.into_bytes()));
}

pub fn unpack_zmode(reader: &mut BinReader) -> Result<ZMode, BrresError> {
    let (_, data) = unpack_bp(reader)?;
    Ok(ZMode::from_bytes(bp_fields(data)))
}

pub fn pack_blend_mode(writer: &mut BinWriter, blend: BlendMode) {
    pack_bp(writer, BP_BLENDMODE, bp_payload(blend.into_bytes()));
}

pub fn unpack_blend_mode(reader: &mut BinReader) -> Result<BlendMode, BrresError> {
    let (_, data) = unpack_bp(reader)?;
    Ok(BlendMode::from_bytes(bp_fields(data)))
}

pub fn pack_constant_alpha(writer: &mut BinWriter, calpha: ConstantAlpha) {
    pack_bp(writer, BP_CONSTANTALPHA, bp_payload(calpha.into_bytes()));
}

pub fn unpack_constant_alpha(reader: &mut BinReader) -> Result<ConstantAlpha, BrresError> {
    let (_, data) = unpack_bp(reader)?;
    Ok(ConstantAlpha::from_bytes(bp_fields(data)))
}

fn pack_color_reg(writer: &mut BinWriter, reg: u8, left: u16, right: u16) {
    pack_bp(
        writer,
        reg,
        (left as u32 & 0x7ff) << 12 | right as u32 & 0xfff,
    );
}

/// Packs a TEV color register pair. Non-constant registers repeat the GB
/// write three times so the hardware latch settles.
pub fn pack_color(writer: &mut BinWriter, index: usize, color: [u16; 4], is_constant: bool) {
    let reg = BP_TEV_REGISTER_L0 + (2 * index) as u8;
    pack_color_reg(writer, reg, color[3], color[0]);
    let n = if is_constant { 1 } else { 3 };
    for _ in 0..n {
        pack_color_reg(writer, reg + 1, color[1], color[2]);
    }
}

pub fn unpack_color(reader: &mut BinReader, is_constant: bool) -> Result<[u16; 4], BrresError> {
    let (_, ar) = unpack_bp(reader)?;
    let (_, gb) = unpack_bp(reader)?;
    if !is_constant {
        reader.skip(10)?;
    }
    Ok([
        (ar & 0xfff) as u16,
        (gb >> 12 & 0x7ff) as u16,
        (gb & 0xfff) as u16,
        (ar >> 12 & 0x7ff) as u16,
    ])
}

pub fn pack_ras1_ss(writer: &mut BinWriter, data: u32, index: usize) {
    pack_bp(writer, BP_RAS1_SS0 + index as u8, data);
}

pub fn pack_ras1_iref(writer: &mut BinWriter, ind_maps: &[u8; 4], ind_coords: &[u8; 4]) {
    let mut data = 0u32;
    for i in (0..4).rev() {
        data <<= 3;
        data |= ind_coords[i] as u32 & 7;
        data <<= 3;
        data |= ind_maps[i] as u32 & 7;
    }
    pack_bp(writer, BP_IREF, data);
}

pub fn unpack_ras1_iref(reader: &mut BinReader) -> Result<([u8; 4], [u8; 4]), BrresError> {
    let (_, mut data) = unpack_bp(reader)?;
    let mut maps = [0u8; 4];
    let mut coords = [0u8; 4];
    for i in 0..4 {
        maps[i] = (data & 7) as u8;
        data >>= 3;
        coords[i] = (data & 7) as u8;
        data >>= 3;
    }
    Ok((maps, coords))
}

pub fn pack_tex_matrix_xf(
    writer: &mut BinWriter,
    index: usize,
    projection: u8,
    inputform: u8,
    kind: u8,
    coordinates: u8,
    emboss_source: u8,
    emboss_light: u16,
) {
    let data = (projection as u32 & 1) << 1
        | (inputform as u32 & 3) << 2
        | (kind as u32 & 7) << 4
        | (coordinates as u32 & 0x1f) << 7
        | (emboss_source as u32 & 7) << 0xc
        | (emboss_light as u32) << 0xf;
    pack_xf(writer, XF_TEX0_ID | index as u16, data);
}

pub fn pack_dual_tex_xf(writer: &mut BinWriter, index: usize, normalize: bool) {
    let data = ((index * 3) as u32 & 0xff) | (normalize as u32) << 8;
    pack_xf(writer, XF_DUALTEX0_ID | index as u16, data);
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn bp_command_masks_to_24_bits() {
        let mut writer = BinWriter::new();
        pack_bp(&mut writer, 0x41, 0xffff_ffff);
        let file = writer.finish().unwrap();
        assert_eq!(file[0], 0x61);
        assert_eq!(&file[1..5], &[0x41, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn blend_mode_register_layout() {
        let blend = BlendMode::new()
            .with_enabled(true)
            .with_dither(true)
            .with_dest(5)
            .with_source(1)
            .with_subtract(true)
            .with_logic(0xa);
        let expected = 1 | 1 << 2 | 5 << 5 | 1 << 8 | 1 << 11 | 0xa << 12;
        assert_eq!(bp_payload(blend.into_bytes()), expected);
        assert_eq!(BlendMode::from_bytes(bp_fields(expected)), blend);
    }

    #[test]
    fn alpha_function_register_layout() {
        let alpha = AlphaFunction::new()
            .with_ref0(0x80)
            .with_ref1(0xff)
            .with_comp0(4)
            .with_comp1(7)
            .with_logic(1);
        assert_eq!(
            bp_payload(alpha.into_bytes()),
            0x80 | 0xff << 8 | 4 << 16 | 7 << 19 | 1 << 22
        );
    }

    #[test]
    fn eleven_bit_float_halves() {
        assert_eq!(encode_11bit_float(0.5), 0b10_0000_0000);
        assert_eq!(encode_11bit_float(0.75), 0b11_0000_0000);
        assert_eq!(encode_11bit_float(-0.5), 0b110_0000_0000);
        assert_relative_eq!(decode_11bit_float(encode_11bit_float(0.625)), 0.625);
    }

    #[test]
    fn ind_matrix_round_trip() {
        let mtx = IndMatrix {
            enabled: true,
            scale: -2,
            matrix: [[0.5, 0.25, 0.0], [0.0, 0.5, 0.75]],
        };
        let mut writer = BinWriter::new();
        mtx.pack(&mut writer, 0);
        let mut reader = BinReader::new(writer.finish().unwrap());
        let read = IndMatrix::unpack(&mut reader).unwrap();
        assert_eq!(read, mtx);
    }

    #[test]
    fn iref_round_trip() {
        let maps = [1, 2, 3, 7];
        let coords = [7, 6, 5, 4];
        let mut writer = BinWriter::new();
        pack_ras1_iref(&mut writer, &maps, &coords);
        let mut reader = BinReader::new(writer.finish().unwrap());
        let (m, c) = unpack_ras1_iref(&mut reader).unwrap();
        assert_eq!(m, maps);
        assert_eq!(c, coords);
    }
}
