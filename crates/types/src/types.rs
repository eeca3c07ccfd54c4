//! Core type definitions for segmentd.
//!
//! Provides:
//! - Identifier newtypes (`UserId`, `SegmentId`)
//! - The validated `Slug` segment identifier
//! - Membership change structures used by the transaction engine

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{InvalidRequestSnafu, SegmentError};

/// Maximum length of a segment slug, matching the `VARCHAR(64)` column.
pub const MAX_SLUG_LEN: usize = 64;

/// Generates a newtype wrapper around a numeric type for type-safe identifiers.
///
/// Each generated type provides:
/// - Standard derives: Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord
/// - Serde with `#[serde(transparent)]` for wire format compatibility
/// - `From<inner>` and `Into<inner>` conversions
/// - `Display` with a semantic prefix (e.g., `user:42`)
/// - `new()` constructor and `value()` accessor
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident, $inner:ty, $prefix:expr
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name($inner);

        impl $name {
            /// Creates a new identifier from a raw value.
            #[inline]
            pub const fn new(value: $inner) -> Self {
                Self(value)
            }

            /// Returns the raw numeric value.
            #[inline]
            pub const fn value(self) -> $inner {
                self.0
            }
        }

        impl From<$inner> for $name {
            #[inline]
            fn from(value: $inner) -> Self {
                Self(value)
            }
        }

        impl From<$name> for $inner {
            #[inline]
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}:{}", $prefix, self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = <$inner as std::str::FromStr>::Err;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                s.parse::<$inner>().map(Self)
            }
        }
    };
}

define_id!(
    /// Unique identifier for a user.
    ///
    /// Wraps an `i64` with compile-time type safety to prevent mixing with
    /// other identifier types.
    ///
    /// # Display
    ///
    /// Formats with `user:` prefix: `user:42`.
    UserId, i64, "user"
);

define_id!(
    /// Database-assigned identifier for a segment row.
    ///
    /// Segments are addressed by [`Slug`] everywhere outside the store; the
    /// numeric id exists because the registry returns it on creation.
    ///
    /// # Display
    ///
    /// Formats with `segment:` prefix: `segment:7`.
    SegmentId, i64, "segment"
);

/// A validated segment slug.
///
/// Slugs are non-empty and at most [`MAX_SLUG_LEN`] bytes. Validation happens
/// at construction, so every `Slug` in the system is known to fit the
/// `segments.slug` column. Deserialization goes through the same check via
/// `TryFrom<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Slug(String);

impl Slug {
    /// Validates and wraps a raw string as a slug.
    ///
    /// Fails with [`SegmentError::InvalidRequest`] when the value is empty or
    /// longer than [`MAX_SLUG_LEN`] bytes.
    pub fn parse(raw: impl Into<String>) -> Result<Self, SegmentError> {
        let raw = raw.into();
        if raw.is_empty() {
            return InvalidRequestSnafu { message: "slug must not be empty" }.fail();
        }
        if raw.len() > MAX_SLUG_LEN {
            return InvalidRequestSnafu {
                message: format!("slug exceeds {MAX_SLUG_LEN} bytes: {} bytes", raw.len()),
            }
            .fail();
        }
        Ok(Self(raw))
    }

    /// Returns the slug as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Slug {
    type Error = SegmentError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(raw)
    }
}

impl From<Slug> for String {
    fn from(slug: Slug) -> Self {
        slug.0
    }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Slug {
    type Err = SegmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for Slug {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One entry of the `segments_to_add` list in a membership batch.
///
/// A missing `expiration_date` means the membership never expires
/// automatically; a set one makes the row eligible for the TTL sweeper once
/// `now >= expiration_date`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipAdd {
    /// Segment to add the user to.
    pub slug: Slug,
    /// Optional expiration after which the sweeper removes the membership.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<DateTime<Utc>>,
}

impl MembershipAdd {
    /// Creates a non-expiring membership entry.
    pub fn permanent(slug: Slug) -> Self {
        Self { slug, expiration_date: None }
    }

    /// Creates a membership entry expiring at the given instant.
    pub fn expiring(slug: Slug, expiration_date: DateTime<Utc>) -> Self {
        Self { slug, expiration_date: Some(expiration_date) }
    }
}
