//! devkern: device-aware OpenCL kernel generation
//!
//! Picks tuned launch parameters for the device a computation runs on and
//! emits OpenCL C for it:
//! - Hierarchical profile store keyed by vendor, device class,
//!   architecture, device name and element type, with a total fallback
//!   chain
//! - Generators for element-wise vector and matrix statements, full
//!   reductions, row-wise reductions, matrix-vector and matrix-matrix
//!   products
//! - TOML profile overrides
//!
//! # Architecture
//!
//! ```text
//! Operation → classify → Profiles::resolve → KernelGenerator → GeneratedProgram
//! ```
//!
//! # Example
//!
//! ```no_run
//! use devkern::device::{DeviceClass, DeviceDescriptor, NumericType, VendorId};
//! use devkern::ops::{Expr, Operation, ScalarArg, Statement, VectorArg};
//! use devkern::profiles::Profiles;
//!
//! let profiles = Profiles::builtin()?;
//! let device = DeviceDescriptor::new(VendorId::NVIDIA, DeviceClass::Gpu, NumericType::Float);
//! let x = || Expr::Vector(VectorArg::new("x", "N"));
//! let op = Operation::new(NumericType::Float).with(Statement::assign(
//!     x(),
//!     Expr::mul(Expr::Scalar(ScalarArg::host("alpha")), x()),
//! ));
//! let program = devkern::generate(&profiles, &device, &op)?;
//! println!("{}", program.source);
//! # Ok::<(), miette::Report>(())
//! ```

pub mod codegen;
pub mod device;
pub mod diagnostics;
pub mod ops;
pub mod profiles;

pub use codegen::{generate, GeneratedProgram, KernelEntry, KernelGenerator, LaunchGeometry};
pub use device::{Architecture, DeviceClass, DeviceDescriptor, NumericType, VendorId};
pub use diagnostics::{ConfigError, GenError, StoreError};
pub use ops::{Operation, OperationKind};
pub use profiles::{Profiles, ProfilesConfig, ResolvedFrom};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Builtin profiles with the overrides of `config` applied on top
pub fn load_profiles(config: Option<ProfilesConfig>) -> Result<Profiles, StoreError> {
    let builder = Profiles::builder();
    match config {
        Some(config) => builder.apply(config).build(),
        None => builder.build(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_load_profiles_without_overrides() {
        let profiles = load_profiles(None).expect("builtin database is complete");
        assert_eq!(profiles.vector_axpy.table(), "vector_axpy");
    }
}
