//! Flashcard spaced repetition system
//!
//! This module provides:
//! - SM-2 spaced repetition algorithm (pure, no I/O)
//! - Per-card review schedule state
//!
//! Schedule persistence lives in the storage layer.

pub mod algorithm;
pub mod models;

pub use algorithm::{next_review, preview_intervals, ui_rating_to_quality, ReviewOutcome};
pub use models::*;
