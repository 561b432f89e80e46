//! Low-level input and output shared by the CDF and CEL decoders.

pub mod binary;
pub mod calvin;
pub mod compression;
pub mod glob;
pub mod source;
pub mod text;
