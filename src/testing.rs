//! Testing utilities for ingestion code.
//!
//! This module lets tests describe a chip once and encode it into every wire
//! format the decoders accept. It includes:
//!
//! - **Fixtures**: [`ChipLayout`], [`sample_layout`] and the scratch [`FixtureDir`]
//! - **Encoders**: text, XDA and Calvin writers for chip descriptions and
//!   intensity files, compressed when the path asks for it
//! - **Assertions**: compare decoded indices and intensity columns with what
//!   was encoded
//!
//! # Quick Start
//!
//! ```no_run
//! use affyingest::cdf::load_chip_description;
//! use affyingest::progress::NoProgress;
//! use affyingest::testing::*;
//! use affyingest::IngestConfig;
//!
//! #[test]
//! fn test_text_cdf_round_trip() -> anyhow::Result<()> {
//!     let dir = FixtureDir::new()?;
//!     let layout = sample_layout();
//!     let path = dir.join("Test3.cdf");
//!     write_text_cdf(&path, &layout)?;
//!
//!     let chip = load_chip_description(&path, &IngestConfig::default(), &NoProgress)?;
//!     assert_chip_matches_layout(&chip, &layout);
//!     Ok(())
//! }
//! ```
//!
//! # Encoders
//!
//! - [`write_text_cdf`], [`write_xda_cdf`], [`write_calvin_cdf`]
//! - [`write_text_cel`], [`write_xda_cel`], [`write_calvin_cel`]
//! - [`text_cdf_string`], [`xda_cdf_bytes`], [`text_cel_string`] and
//!   [`xda_cel_bytes`] return the raw encoding so tests can corrupt it
//!
//! RME caches are written with [`crate::cdf::write_rme_cdf`] and
//! [`crate::cel::write_rme_cel`].

pub mod assertions;
pub mod encoders;
pub mod fixtures;

pub use assertions::*;
pub use encoders::*;
pub use fixtures::*;
