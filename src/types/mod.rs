//! This module defines the core, strongly-typed data representations used
//! throughout the timbang scoring pipeline.
//!
//! It currently includes the canonical `ElementType` enum, the closed set of
//! vector-column element types the scorer understands. Replacing runtime
//! reflection with a small enum means schema checks are exhaustive matches
//! rather than string comparisons.

pub mod element_type;

// Re-export the main type(s) for easier access.
pub use element_type::ElementType;
