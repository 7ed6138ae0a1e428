//! # brres_lib
//!
//! brres_lib is a library for reading, editing, and writing the BRRES
//! resource containers used by Mario Kart Wii and other Wii games.
//!
//! A container ([Brres](crate::brres::Brres)) is a name-indexed tree of
//! sub-files: [Mdl0](crate::formats::mdl0::Mdl0) models,
//! [Tex0](crate::formats::tex0::Tex0) textures, and the SRT0/PAT0/CLR0/CHR0
//! animation formats. Every sub-file is parsed into an editable data model;
//! types the editor does not interpret (SCN0, SHP0) are framed and carried
//! opaquely so files holding them still survive a load and save.
//!
//! Cross-references inside a file are relative offsets into shared pools;
//! the data model replaces them with list indices (a polygon stores the
//! index of its material, a bone the index of its parent) and rebuilds the
//! derived structures at pack time: draw order lists, shared shader
//! records, texture link tables, and the sorted name pool. This means an
//! edit only ever touches one list, and the writer takes care of keeping
//! the file consistent.
//!
//! ## Example
//! ```rust
//! use brres_lib::prelude::*;
//!
//! # fn main() -> Result<(), BrresError> {
//! let mut brres = Brres::new("course_model.brres");
//! let mut tex = Tex0::new("road");
//! tex.width = 16;
//! tex.height = 16;
//! tex.data = vec![0; 128];
//! brres.add_texture(tex);
//!
//! let bytes = brres.write()?;
//! let reloaded = Brres::read(bytes)?;
//! assert!(reloaded.has_texture("road"));
//! # Ok(())
//! # }
//! ```
//!
//! Pixel data and interchange mesh formats are out of scope; converters
//! plug in through the traits in [convert](crate::convert).

use std::fs;
use std::path::Path;

pub mod binstream;
pub mod brres;
pub mod config;
pub mod convert;
pub mod error;
pub mod formats;
pub mod index_group;
pub mod registry;
pub mod subfile;

use binstream::{BinReader, BinWriter};
use brres::Brres;
use error::BrresError;

/// Whole-file read and write for container types.
///
/// `write_to_file` is atomic: the packed image is written to a sibling
/// temporary file which is renamed over the destination, so a failed pack
/// never truncates an existing file.
pub trait BrresFile: Sized {
    fn read(data: Vec<u8>) -> Result<Self, BrresError>;

    fn write(&self) -> Result<Vec<u8>, BrresError>;

    fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, BrresError> {
        Self::read(fs::read(path)?)
    }

    fn write_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), BrresError> {
        let path = path.as_ref();
        let data = self.write()?;
        let mut temp = path.as_os_str().to_owned();
        temp.push(".tmp");
        fs::write(&temp, data)?;
        fs::rename(&temp, path)?;
        Ok(())
    }
}

impl BrresFile for Brres {
    fn read(data: Vec<u8>) -> Result<Self, BrresError> {
        let mut reader = BinReader::new(data);
        Self::unpack(&mut reader)
    }

    fn write(&self) -> Result<Vec<u8>, BrresError> {
        let mut writer = BinWriter::new();
        self.pack(&mut writer)?;
        writer.finish()
    }
}

pub mod prelude {
    pub use crate::brres::Brres;
    pub use crate::config::Config;
    pub use crate::error::BrresError;
    pub use crate::formats::chr0::Chr0;
    pub use crate::formats::clr0::Clr0;
    pub use crate::formats::mdl0::Mdl0;
    pub use crate::formats::pat0::Pat0;
    pub use crate::formats::srt0::Srt0;
    pub use crate::formats::tex0::Tex0;
    pub use crate::registry::Registry;
    pub use crate::BrresFile;
}

#[cfg(test)]
pub(crate) fn group_hex(a: &str, words_per_line: usize) -> String {
    use itertools::Itertools;

    // ex: "FFFFFFFF FFFFFFFF FFFFFFFF FFFFFFFF..."
    let words = a
        .chars()
        .collect::<Vec<char>>()
        .chunks(8)
        .map(|c| c.iter().collect::<String>())
        .collect::<Vec<String>>();

    words.chunks(words_per_line).map(|c| c.join(" ")).join("\n")
}

#[cfg(test)]
macro_rules! assert_hex_eq {
    ($a:expr, $b:expr) => {
        assert!(
            $a == $b,
            "\n{} !=\n{}",
            crate::group_hex(&hex::encode($a), 8),
            crate::group_hex(&hex::encode($b), 8)
        )
    };
}

#[cfg(test)]
pub(crate) use assert_hex_eq;
