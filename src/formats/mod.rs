//! The sub-file formats stored in a container.

pub mod chr0;
pub mod clr0;
pub mod mdl0;
pub mod pat0;
pub mod srt0;
pub mod tex0;
