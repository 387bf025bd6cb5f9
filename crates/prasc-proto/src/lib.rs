//! # prasc-proto
//!
//! Shared types and traits for the prasc pipeline.
//!
//! This crate provides:
//! - [`RecordIdentity`], the directory-independent key of a recording
//! - [`Table`], the in-memory form of every result file
//! - Question scoring records and their column layout
//! - The [`AlignmentCorrector`] and [`MeasureExtractor`] engine traits

mod engine;
mod identity;
pub mod question;
mod table;

pub use engine::{
    AlignmentCorrector, AlignmentOptions, AlignmentRequest, EngineError, MeasureExtractor,
    MeasureRequest, StartFlag, StartPoint, XyBounds,
};
pub use identity::{RecordIdentity, identity};
pub use question::{QuestionRecord, RecordingSummary};
pub use table::{NA, ShapeError, Table, is_null};
