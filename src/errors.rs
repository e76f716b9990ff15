//! Error Types
//!
//! This module defines the error types used throughout the engine.
//!
//! # Overview
//!
//! The main error type [`GraphError`] covers all failure modes including:
//! - Graph construction and validation failures
//! - Compilation (update) failures
//! - Memory scheduling failures
//! - Runtime backend and command recording errors
//!
//! Every error maps to a stable negative integer code via
//! [`GraphError::code`], so applications and backends can exchange results
//! across an FFI boundary without depending on the Rust enum layout.
//! `0` is reserved for success and is represented by `Ok(())`.
//!
//! # Usage
//!
//! All public APIs return [`Result<T>`] which is an alias for
//! `std::result::Result<T, GraphError>`.

use thiserror::Error;

/// The main error type for the render graph engine.
///
/// Each variant corresponds to one stable error code. Variants carry extra
/// context only where a failure is ambiguous without it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    // ========================================================================
    // Generic failures
    // ========================================================================
    /// Failure due to an unspecified error.
    #[error("Unspecified error")]
    Unspecified,

    /// Failure due to an unrecognized command.
    #[error("Unrecognized command")]
    UnrecognizedCommand,

    /// Failure due to invalid arguments.
    #[error("Invalid arguments: {0}")]
    InvalidArguments(&'static str),

    /// Failure due to invalid data.
    #[error("Invalid data")]
    InvalidData,

    /// Failure due to an invalid operation.
    #[error("Invalid operation")]
    InvalidOperation,

    /// Failure due to running out of memory.
    #[error("Out of memory")]
    OutOfMemory,

    // ========================================================================
    // Module loading failures
    // ========================================================================
    /// Failure due to not being able to find the specified file.
    #[error("File not found")]
    FileNotFound,

    /// Failure due to an invalid file format.
    #[error("Invalid file format")]
    InvalidFileFormat,

    /// Failure due to the file format version being too old.
    #[error("Unsupported version: too old")]
    UnsupportedVersionTooOld,

    /// Failure due to the file format version being too new.
    #[error("Unsupported version: too new")]
    UnsupportedVersionTooNew,

    // ========================================================================
    // Graph construction and validation failures
    // ========================================================================
    /// Failure due to an unknown node.
    #[error("Unknown node")]
    UnknownNode,

    /// Failure due to an index being out of its valid bounds.
    #[error("Index out of bounds: {context} (index: {index})")]
    IndexOutOfBounds {
        /// Description of what was being accessed
        context: &'static str,
        /// The invalid index
        index: usize,
    },

    /// Failure due to a command being already finalized.
    #[error("Command already finalized")]
    CommandAlreadyFinal,

    /// Failure due to a data layout mismatch between runtime and program.
    #[error("Interop data layout mismatch")]
    InteropDataLayoutMismatch,

    /// Failure due to a key not being found.
    #[error("Key not found")]
    KeyNotFound,

    /// Failure due to a key value being duplicated where it must be unique.
    #[error("Key duplicated")]
    KeyDuplicated,

    /// Failure due to a feature not being implemented yet.
    #[error("Not implemented")]
    NotImplemented,

    /// Failure due to an integer overflow.
    #[error("Integer overflow")]
    IntegerOverflow,

    /// Failure due to exclusive ranges overlapping.
    #[error("Ranges overlapping")]
    RangeOverlapping,

    /// Failure due to validation finding an invalid graph configuration.
    #[error("Validation failed")]
    ValidationFailed,

    /// Failure due to an ill-formed node program.
    #[error("Invalid program")]
    InvalidProgram,

    /// Failure due to a module being incompatible with the current runtime.
    #[error("Unsupported module version")]
    UnsupportedModuleVersion,

    /// Failure due to a failed type safety check.
    #[error("Type mismatch")]
    TypeMismatch,

    /// Failure due to a feature not being supported.
    #[error("Not supported")]
    NotSupported,

    // ========================================================================
    // Runtime failures
    // ========================================================================
    /// Failure of a runtime API without a direct mapping of its error code.
    #[error("Runtime API error")]
    RuntimeApiError,

    /// Failure due to an engine internal error.
    #[error("Internal error")]
    InternalError,
}

impl GraphError {
    /// Returns the stable integer code of this error.
    ///
    /// Codes are negative; `0` means success and is never produced here.
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            Self::Unspecified => -1,
            Self::UnrecognizedCommand => -2,
            Self::InvalidArguments(_) => -3,
            Self::InvalidData => -4,
            Self::InvalidOperation => -5,
            Self::OutOfMemory => -6,
            Self::FileNotFound => -7,
            Self::InvalidFileFormat => -8,
            Self::UnsupportedVersionTooOld => -9,
            Self::UnsupportedVersionTooNew => -10,
            Self::UnknownNode => -11,
            Self::IndexOutOfBounds { .. } => -12,
            Self::CommandAlreadyFinal => -13,
            Self::InteropDataLayoutMismatch => -14,
            Self::KeyNotFound => -15,
            Self::KeyDuplicated => -16,
            Self::NotImplemented => -17,
            Self::IntegerOverflow => -18,
            Self::RangeOverlapping => -19,
            Self::ValidationFailed => -20,
            Self::InvalidProgram => -21,
            Self::UnsupportedModuleVersion => -22,
            Self::TypeMismatch => -23,
            Self::NotSupported => -24,
            Self::RuntimeApiError => -25,
            Self::InternalError => -26,
        }
    }
}

/// Alias for `Result<T, GraphError>`.
pub type Result<T> = std::result::Result<T, GraphError>;
