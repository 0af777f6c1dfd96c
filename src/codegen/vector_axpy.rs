//! Element-wise vector statements

use super::primitives::{chunked_loop, grid_stride_loop};
use super::render::{collect_args, render, AccessCtx};
use super::{
    forbid_products, open_kernel, packed_element, require_statements, wrong_target,
    GeneratedProgram, GroupCount, KernelEntry, KernelGenerator, KernelStream, LaunchGeometry,
};
use crate::diagnostics::GenError;
use crate::ops::{Dim, Expr, Operation, OperationKind};
use crate::profiles::VectorAxpyParams;

pub const ENTRY: &str = "vector_axpy";

/// Loop bound over `size` elements read `width` at a time.
///
/// A symbolic extent must be a multiple of `width` at launch; the packed
/// loop has no scalar tail.
pub(crate) fn packed_bound(
    kind: OperationKind,
    size: &Dim,
    width: u32,
) -> Result<String, GenError> {
    match (size, width) {
        (_, 1) => Ok(size.to_string()),
        (Dim::Const(n), w) if n % w as u64 != 0 => Err(GenError::ExtentNotMultiple {
            kind,
            extent: *n,
            width: w,
        }),
        (Dim::Const(n), w) => Ok(format!("{}u", n / w as u64)),
        (Dim::Symbol(name), w) => Ok(format!("({} / {}u)", name, w)),
    }
}

pub struct VectorAxpyGenerator {
    params: VectorAxpyParams,
}

impl VectorAxpyGenerator {
    pub fn new(params: VectorAxpyParams) -> Self {
        Self { params }
    }
}

impl KernelGenerator for VectorAxpyGenerator {
    fn kind(&self) -> OperationKind {
        OperationKind::VectorAxpy
    }

    fn profile(&self) -> String {
        self.params.to_string()
    }

    fn generate(&self, operation: &Operation) -> Result<GeneratedProgram, GenError> {
        require_statements(operation)?;
        let kind = self.kind();

        let mut size = None;
        for (index, statement) in operation.statements.iter().enumerate() {
            let Expr::Vector(target) = &statement.target else {
                return Err(wrong_target(kind, index, "vector", &statement.target));
            };
            forbid_products(kind, index, statement)?;
            match &size {
                None => size = Some(target.size.clone()),
                Some(first) if *first != target.size => {
                    return Err(GenError::InconsistentBatch {
                        what: format!("vector size (`{}` against `{}`)", first, target.size),
                    });
                }
                Some(_) => {}
            }
        }
        let Some(size) = size else {
            return Err(GenError::EmptyOperation);
        };

        let p = &self.params;
        packed_element(kind, operation.numeric_type, p.simd_width)?;
        let args = collect_args(operation, p.simd_width)?;
        let geometry = LaunchGeometry::new_1d(p.local_size_0, GroupCount::Fixed(p.num_groups));
        let bound = packed_bound(kind, &size, p.simd_width)?;

        let mut stream = KernelStream::new();
        open_kernel(&mut stream, ENTRY, &geometry, &args);
        if p.strided {
            grid_stride_loop(&mut stream, "i", 0, &bound);
        } else {
            chunked_loop(&mut stream, "i", 0, &bound);
        }
        let ctx = AccessCtx::new(operation.numeric_type).with_index("i");
        for statement in &operation.statements {
            stream.line(format!(
                "{} {} {};",
                render(&statement.target, &ctx)?,
                statement.assign.token(),
                render(&statement.value, &ctx)?
            ));
        }
        stream.close();
        stream.close();

        Ok(GeneratedProgram {
            source: stream.finish(),
            entries: vec![KernelEntry {
                name: ENTRY.to_string(),
                args,
                geometry,
                local_mem_bytes: 0,
                scratch_elements: 0,
            }],
            profile: self.profile(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_bound() {
        let kind = OperationKind::VectorAxpy;
        assert_eq!(packed_bound(kind, &Dim::symbol("N"), 1), Ok("N".to_string()));
        assert_eq!(packed_bound(kind, &Dim::symbol("N"), 4), Ok("(N / 4u)".to_string()));
        assert_eq!(packed_bound(kind, &Dim::Const(1024), 4), Ok("256u".to_string()));
        assert_eq!(packed_bound(kind, &Dim::Const(1023), 1), Ok("1023u".to_string()));
        assert_eq!(
            packed_bound(kind, &Dim::Const(1023), 4),
            Err(GenError::ExtentNotMultiple {
                kind,
                extent: 1023,
                width: 4
            })
        );
    }
}
