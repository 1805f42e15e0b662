//! Review text mining
//!
//! This module extracts self-identifying persona phrases from raw review
//! text using lexical pattern matching, prior to LLM normalization into
//! named user segments.

pub mod personas;

pub use personas::{PersonaExtraction, PersonaExtractor, PersonaPhrase};
