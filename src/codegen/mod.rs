//! OpenCL kernel generation
//!
//! Architecture:
//! ```text
//! Operation -> classify -> resolve profile -> generator -> GeneratedProgram
//! ```
//!
//! A generator is a pure function of its tuned parameters and the
//! operation. It returns the kernel source together with everything the
//! host needs to launch it: entry names, argument order and geometry.

pub mod matrix_axpy;
pub mod matrix_product;
pub mod matrix_vector;
pub mod primitives;
pub mod reduction;
pub mod render;
pub mod row_wise;
pub mod stream;
pub mod vector_axpy;

pub use matrix_axpy::MatrixAxpyGenerator;
pub use matrix_product::MatrixProductGenerator;
pub use matrix_vector::MatrixVectorGenerator;
pub use reduction::ReductionGenerator;
pub use row_wise::RowWiseReductionGenerator;
pub use stream::KernelStream;
pub use vector_axpy::VectorAxpyGenerator;

use crate::device::{DeviceDescriptor, DeviceLimits, NumericType};
use crate::diagnostics::GenError;
use crate::ops::{role_of, Dim, Expr, Operation, OperationKind, Product, ScalarArg, Statement};
use crate::profiles::Profiles;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// A kernel template bound to one tuned parameter record
pub trait KernelGenerator {
    fn kind(&self) -> OperationKind;

    /// Tag of the parameter record in use
    fn profile(&self) -> String;

    fn generate(&self, operation: &Operation) -> Result<GeneratedProgram, GenError>;
}

/// How an argument is passed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArgKind {
    /// `__global element*`
    Buffer { element: String },
    /// Passed by value
    Value { ty: String },
    /// `unsigned int` extent
    Size,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KernelArg {
    pub name: String,
    #[serde(flatten)]
    pub kind: ArgKind,
}

impl KernelArg {
    /// Parameter declaration in the kernel signature
    pub fn declaration(&self) -> String {
        match &self.kind {
            ArgKind::Buffer { element } => format!("__global {}* {}", element, self.name),
            ArgKind::Value { ty } => format!("{} {}", ty, self.name),
            ArgKind::Size => format!("unsigned int {}", self.name),
        }
    }
}

/// Number of work-groups along one dimension
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupCount {
    Fixed(u32),
    /// `ceil(extent / tile)`
    Cover { extent: Dim, tile: u32 },
}

impl GroupCount {
    /// Group count once the size symbols are known
    pub fn count(&self, bindings: &BTreeMap<String, u64>) -> Option<u64> {
        match self {
            GroupCount::Fixed(n) => Some(*n as u64),
            GroupCount::Cover { extent, tile } => {
                let extent = match extent {
                    Dim::Const(n) => *n,
                    Dim::Symbol(name) => *bindings.get(name)?,
                };
                Some(extent.div_ceil((*tile).max(1) as u64))
            }
        }
    }
}

impl fmt::Display for GroupCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupCount::Fixed(n) => write!(f, "{}", n),
            GroupCount::Cover { extent, tile } => write!(f, "ceil({}/{})", extent, tile),
        }
    }
}

/// Work-group shape and count of one entry point
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchGeometry {
    pub work_dim: u32,
    pub local: [u32; 3],
    pub groups: [GroupCount; 3],
}

impl LaunchGeometry {
    pub fn new_1d(local: u32, groups: GroupCount) -> Self {
        Self {
            work_dim: 1,
            local: [local, 1, 1],
            groups: [groups, GroupCount::Fixed(1), GroupCount::Fixed(1)],
        }
    }

    pub fn new_2d(local: (u32, u32), groups: (GroupCount, GroupCount)) -> Self {
        Self {
            work_dim: 2,
            local: [local.0, local.1, 1],
            groups: [groups.0, groups.1, GroupCount::Fixed(1)],
        }
    }

    pub fn workers_per_group(&self) -> u64 {
        self.local.iter().map(|&l| l as u64).product()
    }

    /// Global work size per dimension, `None` while a symbol is unbound
    pub fn global_size(&self, bindings: &BTreeMap<String, u64>) -> Option<[u64; 3]> {
        let mut global = [0u64; 3];
        for (d, slot) in global.iter_mut().enumerate() {
            *slot = self.local[d] as u64 * self.groups[d].count(bindings)?;
        }
        Some(global)
    }

    /// `__attribute__((reqd_work_group_size(...)))`
    pub fn attribute(&self) -> String {
        format!(
            "__attribute__((reqd_work_group_size({}, {}, {})))",
            self.local[0], self.local[1], self.local[2]
        )
    }
}

impl fmt::Display for LaunchGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}D local ({}, {}, {}) groups ({}, {}, {})",
            self.work_dim,
            self.local[0],
            self.local[1],
            self.local[2],
            self.groups[0],
            self.groups[1],
            self.groups[2]
        )
    }
}

/// One `__kernel` in a generated program
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KernelEntry {
    pub name: String,
    pub args: Vec<KernelArg>,
    pub geometry: LaunchGeometry,
    /// Static `__local` usage
    pub local_mem_bytes: u64,
    /// Elements the host allocates for the `temp` argument, 0 without one
    pub scratch_elements: u64,
}

impl KernelEntry {
    /// Validate against device limits
    pub fn check_limits(&self, limits: &DeviceLimits) -> Result<(), GenError> {
        let workers = self.geometry.workers_per_group();
        if workers > limits.max_work_group_size as u64 {
            return Err(GenError::ExceedsDeviceLimits {
                entry: self.name.clone(),
                reason: format!(
                    "work-group size ({}) exceeds maximum ({})",
                    workers, limits.max_work_group_size
                ),
            });
        }
        if self.local_mem_bytes > limits.local_mem_bytes {
            return Err(GenError::ExceedsDeviceLimits {
                entry: self.name.clone(),
                reason: format!(
                    "local memory ({} bytes) exceeds maximum ({} bytes)",
                    self.local_mem_bytes, limits.local_mem_bytes
                ),
            });
        }
        Ok(())
    }
}

/// Generated source plus launch metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedProgram {
    pub source: String,
    pub entries: Vec<KernelEntry>,
    /// Tag of the parameter record used
    pub profile: String,
}

impl GeneratedProgram {
    pub fn entry(&self, name: &str) -> Option<&KernelEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn check_limits(&self, limits: &DeviceLimits) -> Result<(), GenError> {
        self.entries.iter().try_for_each(|e| e.check_limits(limits))
    }
}

/// Kernel entry name for `kind`
pub(crate) fn entry_name(kind: OperationKind) -> String {
    kind.to_string().replace('-', "_")
}

/// Open the body of `__kernel void name(args)`.
pub(crate) fn open_kernel(
    stream: &mut KernelStream,
    name: &str,
    geometry: &LaunchGeometry,
    args: &[KernelArg],
) {
    let params: Vec<String> = args.iter().map(KernelArg::declaration).collect();
    stream.line(format!("__kernel {}", geometry.attribute()));
    stream.open(format!("void {}({})", name, params.join(", ")));
}

pub(crate) fn require_statements(operation: &Operation) -> Result<(), GenError> {
    if operation.statements.is_empty() {
        Err(GenError::EmptyOperation)
    } else {
        Ok(())
    }
}

pub(crate) fn require_scalar_width(kind: OperationKind, width: u32) -> Result<(), GenError> {
    if width == 1 {
        Ok(())
    } else {
        Err(GenError::UnsupportedVectorization { kind, width })
    }
}

/// Element type of packed buffers, refusing widths without a vector type
pub(crate) fn packed_element(
    kind: OperationKind,
    numeric_type: NumericType,
    width: u32,
) -> Result<String, GenError> {
    numeric_type
        .vector_name(width)
        .ok_or(GenError::UnsupportedVectorization { kind, width })
}

/// Role name of a statement target, distinguishing scalar storage
pub(crate) fn target_role(target: &Expr) -> &'static str {
    match target {
        Expr::Scalar(ScalarArg::Host { .. }) => "host scalar",
        Expr::Scalar(ScalarArg::Device { .. }) => "device scalar",
        Expr::Scalar(ScalarArg::Literal { .. }) => "literal",
        other => role_of(other),
    }
}

pub(crate) fn wrong_target(
    kind: OperationKind,
    statement: usize,
    expected: &'static str,
    target: &Expr,
) -> GenError {
    GenError::TargetRole {
        kind,
        statement,
        expected,
        found: target_role(target),
    }
}

/// The single product of `statement`
pub(crate) fn single_product(
    kind: OperationKind,
    index: usize,
    statement: &Statement,
) -> Result<&Product, GenError> {
    let products = statement.value.products();
    match products.as_slice() {
        [product] => Ok(*product),
        found => Err(GenError::ProductCount {
            kind,
            statement: index,
            found: found.len(),
        }),
    }
}

pub(crate) fn forbid_products(
    kind: OperationKind,
    index: usize,
    statement: &Statement,
) -> Result<(), GenError> {
    if statement.value.products().is_empty() {
        Ok(())
    } else {
        Err(GenError::UnexpectedProduct {
            kind,
            statement: index,
        })
    }
}

/// Bind `kind` to the record `profiles` holds for `device`.
pub fn generator_for(
    profiles: &Profiles,
    device: &DeviceDescriptor,
    kind: OperationKind,
) -> Box<dyn KernelGenerator> {
    match kind {
        OperationKind::VectorAxpy => {
            Box::new(VectorAxpyGenerator::new(*profiles.vector_axpy.resolve(device)))
        }
        OperationKind::MatrixAxpy => {
            Box::new(MatrixAxpyGenerator::new(*profiles.matrix_axpy.resolve(device)))
        }
        OperationKind::Reduction => {
            Box::new(ReductionGenerator::new(*profiles.reduction.resolve(device)))
        }
        OperationKind::RowWiseReduction { transposed } => {
            let store = if transposed {
                &profiles.trans_row_wise_reduction
            } else {
                &profiles.row_wise_reduction
            };
            Box::new(RowWiseReductionGenerator::new(*store.resolve(device), transposed))
        }
        OperationKind::MatrixVector { transposed } => Box::new(MatrixVectorGenerator::new(
            *profiles.matrix_vector.resolve(device),
            transposed,
        )),
        OperationKind::MatrixProduct {
            lhs_transposed,
            rhs_transposed,
        } => Box::new(MatrixProductGenerator::new(
            *profiles
                .matrix_product(lhs_transposed, rhs_transposed)
                .resolve(device),
            lhs_transposed,
            rhs_transposed,
        )),
    }
}

/// Generate the program computing `operation` on `device`.
pub fn generate(
    profiles: &Profiles,
    device: &DeviceDescriptor,
    operation: &Operation,
) -> Result<GeneratedProgram, GenError> {
    if operation.numeric_type != device.numeric_type {
        return Err(GenError::NumericTypeMismatch {
            operation: operation.numeric_type,
            device: device.numeric_type,
        });
    }

    let kind = OperationKind::classify(operation)?;
    let generator = generator_for(profiles, device, kind);
    tracing::debug!("{}: {} with profile {}", device, kind, generator.profile());

    let program = generator.generate(operation)?;
    for entry in &program.entries {
        tracing::debug!(
            "generated `{}` ({} args, {}, {} bytes local)",
            entry.name,
            entry.args.len(),
            entry.geometry,
            entry.local_mem_bytes
        );
    }
    Ok(program)
}
