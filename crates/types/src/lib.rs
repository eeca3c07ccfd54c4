//! Core types, errors, and configuration for segmentd.
//!
//! This crate provides the foundational types used throughout the service:
//! - Identifier newtypes (`UserId`, `SegmentId`) and the validated `Slug`
//! - Membership change structures
//! - The shared error taxonomy using snafu
//! - Configuration section types

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{ErrorCode, Result, SegmentError};
pub use types::{MembershipAdd, SegmentId, Slug, UserId, MAX_SLUG_LEN};
