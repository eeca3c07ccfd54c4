//! Error types for segmentd using snafu.
//!
//! Defines the shared error taxonomy surfaced by the registry, the membership
//! transaction engine, and the sweeper. Errors are compared by kind, never by
//! identity; each variant maps to an [`ErrorCode`] with a unique numeric
//! identifier and a retryability classification.

use core::fmt;

use snafu::{Location, Snafu};

use crate::types::{Slug, UserId};

/// Unified result type for segmentd operations.
pub type Result<T, E = SegmentError> = std::result::Result<T, E>;

/// Machine-readable error codes for programmatic error handling.
///
/// Each [`SegmentError`] variant maps to a unique numeric code. Codes are
/// organized into ranges:
///
/// | Range       | Domain      | Examples                                  |
/// |-------------|-------------|-------------------------------------------|
/// | 1000–1099   | Storage     | Pool, query, and transaction failures     |
/// | 3000–3099   | Application | Domain conflicts and missing segments     |
/// | 3100–3199   | Application | Request validation, configuration         |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    /// Any database failure, including connectivity loss mid-transaction.
    StorageFailure = 1000,

    /// Segment slug is already registered.
    AppSegmentExists = 3000,
    /// Segment slug is not registered.
    AppSegmentNotFound = 3001,
    /// User already holds a membership in the segment.
    AppAlreadyMember = 3002,

    /// Malformed or incomplete request.
    AppInvalidRequest = 3100,
    /// Configuration error.
    AppConfig = 3101,
}

impl ErrorCode {
    /// Returns the numeric code value.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Converts a numeric code to an `ErrorCode`, returning `None` for unknown values.
    #[must_use]
    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            1000 => Some(Self::StorageFailure),
            3000 => Some(Self::AppSegmentExists),
            3001 => Some(Self::AppSegmentNotFound),
            3002 => Some(Self::AppAlreadyMember),
            3100 => Some(Self::AppInvalidRequest),
            3101 => Some(Self::AppConfig),
            _ => None,
        }
    }

    /// Whether this error is retryable.
    ///
    /// Retryable errors may succeed on a subsequent attempt. Domain conflicts
    /// and validation failures require corrective action first.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::StorageFailure)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

/// Top-level error type for segmentd operations.
///
/// Domain errors (`SegmentExists`, `SegmentNotFound`, `AlreadyMember`) carry
/// their full message to the caller; `Storage` is surfaced opaquely with the
/// detail reaching only the log.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SegmentError {
    /// Segment slug is already registered.
    #[snafu(display("segment exists: {slug}"))]
    SegmentExists {
        /// The conflicting slug.
        slug: Slug,
    },

    /// Segment slug is not registered.
    #[snafu(display("segment does not exist: {slug}"))]
    SegmentNotFound {
        /// The missing slug.
        slug: Slug,
    },

    /// User already holds a membership in the segment.
    #[snafu(display("{user_id} is already in segment {slug}"))]
    AlreadyMember {
        /// The user whose batch conflicted.
        user_id: UserId,
        /// The segment already joined.
        slug: Slug,
    },

    /// Malformed or incomplete request (missing fields, invalid slug).
    #[snafu(display("invalid request: {message}"))]
    InvalidRequest {
        /// Description of the validation failure.
        message: String,
    },

    /// Database failure, including connectivity loss mid-transaction.
    #[snafu(display("storage error at {location}: {message}"))]
    Storage {
        /// Error description.
        message: String,
        /// Source location.
        #[snafu(implicit)]
        location: Location,
    },

    /// Configuration error (invalid value or constraint violation).
    #[snafu(display("configuration error: {message}"))]
    Config {
        /// Description of the violated constraint.
        message: String,
    },
}

impl SegmentError {
    /// Returns the machine-readable error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::SegmentExists { .. } => ErrorCode::AppSegmentExists,
            Self::SegmentNotFound { .. } => ErrorCode::AppSegmentNotFound,
            Self::AlreadyMember { .. } => ErrorCode::AppAlreadyMember,
            Self::InvalidRequest { .. } => ErrorCode::AppInvalidRequest,
            Self::Storage { .. } => ErrorCode::StorageFailure,
            Self::Config { .. } => ErrorCode::AppConfig,
        }
    }

    /// Whether this error is retryable. Delegates to [`ErrorCode::is_retryable`].
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }

    /// Whether this error is a domain condition safe to surface verbatim to
    /// the caller (as opposed to storage detail, which stays in the log).
    #[must_use]
    pub const fn is_domain(&self) -> bool {
        matches!(
            self,
            Self::SegmentExists { .. } | Self::SegmentNotFound { .. } | Self::AlreadyMember { .. }
        )
    }
}
