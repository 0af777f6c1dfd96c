//! Diagnostics
//!
//! Every failure the crate can report, as `miette` diagnostics with stable
//! codes. Resolution itself never fails; these cover malformed operation
//! descriptions, a store built without its global defaults, and bad
//! configuration files.

use crate::device::{DeviceClass, NumericType};
use crate::ops::OperationKind;
use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration error raised while generating a kernel
#[derive(Error, Debug, Diagnostic, Clone, PartialEq)]
pub enum GenError {
    #[error("Operation has no statements")]
    #[diagnostic(code(generate::empty_operation))]
    EmptyOperation,

    #[error("Cannot classify operation: {reason}")]
    #[diagnostic(code(generate::unclassifiable))]
    Unclassifiable { reason: String },

    #[error("Operation element type `{operation}` differs from device descriptor type `{device}`")]
    #[diagnostic(
        code(generate::numeric_type_mismatch),
        help("resolve the profile with the operation's element type")
    )]
    NumericTypeMismatch {
        operation: NumericType,
        device: NumericType,
    },

    #[error("Statement {statement}: {kind} kernels assign to a {expected}, found a {found}")]
    #[diagnostic(code(generate::target_role))]
    TargetRole {
        kind: OperationKind,
        statement: usize,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Statement {statement}: expected exactly one product, found {found}")]
    #[diagnostic(
        code(generate::product_count),
        help("split the statement so each one carries a single product")
    )]
    ProductCount {
        kind: OperationKind,
        statement: usize,
        found: usize,
    },

    #[error("Statement {statement}: {kind} kernels cannot evaluate a product")]
    #[diagnostic(code(generate::unexpected_product))]
    UnexpectedProduct {
        kind: OperationKind,
        statement: usize,
    },

    #[error("Statement {statement}: product operands do not fit a {kind} kernel: {reason}")]
    #[diagnostic(code(generate::product_shape))]
    ProductShape {
        kind: OperationKind,
        statement: usize,
        reason: String,
    },

    #[error("Operand `{name}` cannot be addressed here: {reason}")]
    #[diagnostic(code(generate::unaddressable_operand))]
    UnaddressableOperand { name: String, reason: String },

    #[error("Operand `{name}` is used with conflicting roles")]
    #[diagnostic(
        code(generate::conflicting_operand),
        help("every name must refer to one scalar, vector, matrix or size")
    )]
    ConflictingOperand { name: String },

    #[error("Batched statements disagree on {what}")]
    #[diagnostic(
        code(generate::inconsistent_batch),
        help("generate statements with different shapes as separate operations")
    )]
    InconsistentBatch { what: String },

    #[error("Vectorization width {width} is not supported by {kind} kernels")]
    #[diagnostic(code(generate::unsupported_vectorization))]
    UnsupportedVectorization { kind: OperationKind, width: u32 },

    #[error("Extent {extent} is not a multiple of the vectorization width {width} of {kind} kernels")]
    #[diagnostic(
        code(generate::extent_not_multiple),
        help("pad the operands or pick a profile with a width that divides the extent")
    )]
    ExtentNotMultiple {
        kind: OperationKind,
        extent: u64,
        width: u32,
    },

    #[error("Kernel `{entry}` exceeds device limits: {reason}")]
    #[diagnostic(
        code(generate::device_limits),
        help("register a profile with a smaller work-group or tile for this device")
    )]
    ExceedsDeviceLimits { entry: String, reason: String },
}

/// Store integrity violation, reported when a store is built
#[derive(Error, Debug, Diagnostic, Clone, PartialEq)]
pub enum StoreError {
    #[error("Table `{table}` has no global default for {class}/{numeric_type}")]
    #[diagnostic(
        code(store::missing_global_default),
        help("register an entry under the unknown vendor, unknown architecture and empty name")
    )]
    MissingGlobalDefault {
        table: &'static str,
        class: DeviceClass,
        numeric_type: NumericType,
    },
}

/// Failure loading profile overrides or operation files
#[derive(Error, Debug, Diagnostic)]
pub enum ConfigError {
    #[error("Failed to read `{}`", path.display())]
    #[diagnostic(code(config::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML")]
    #[diagnostic(code(config::toml))]
    Toml(#[from] toml::de::Error),

    #[error("Invalid JSON")]
    #[diagnostic(code(config::json))]
    Json(#[from] serde_json::Error),

    #[error("Invalid parameters in table `{table}` for {key}: {reason}")]
    #[diagnostic(code(config::invalid_params))]
    InvalidParams {
        table: &'static str,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),
}
