//! # prasc-adapters
//!
//! Process-backed engines for the prasc pipeline.
//!
//! This crate provides:
//! - [`RscriptCorrector`], fix_align drift correction through `Rscript`
//! - [`SideEyeExtractor`], reading measures through the SideEye Python package
//!
//! Both implement the engine traits from `prasc-proto`, so the pipeline
//! never sees the child processes directly.
//!
//! ## Detection
//!
//! [`find_program`] checks that an engine's program is on `PATH` before a
//! run starts.

mod detect;
mod fix_align;
mod sideeye;

pub use detect::{ProgramNotFound, find_program, is_program_available};
pub use fix_align::{CONTROL_FILE, RscriptCorrector, prepare_source, render_call};
pub use sideeye::{SIDEEYE_SHIM, SideEyeExtractor, default_command};
