//! Element-wise matrix statements

use super::primitives::{chunked_loop, grid_stride_loop};
use super::render::{collect_args, render, AccessCtx};
use super::{
    forbid_products, open_kernel, require_scalar_width, require_statements, wrong_target,
    GeneratedProgram, GroupCount, KernelEntry, KernelGenerator, KernelStream, LaunchGeometry,
};
use crate::diagnostics::GenError;
use crate::ops::{Dim, Expr, Operation, OperationKind};
use crate::profiles::MatrixAxpyParams;

pub const ENTRY: &str = "matrix_axpy";

pub struct MatrixAxpyGenerator {
    params: MatrixAxpyParams,
}

impl MatrixAxpyGenerator {
    pub fn new(params: MatrixAxpyParams) -> Self {
        Self { params }
    }
}

impl KernelGenerator for MatrixAxpyGenerator {
    fn kind(&self) -> OperationKind {
        OperationKind::MatrixAxpy
    }

    fn profile(&self) -> String {
        self.params.to_string()
    }

    fn generate(&self, operation: &Operation) -> Result<GeneratedProgram, GenError> {
        require_statements(operation)?;
        let kind = self.kind();
        let p = &self.params;
        require_scalar_width(kind, p.simd_width)?;

        let mut shape: Option<(Dim, Dim)> = None;
        for (index, statement) in operation.statements.iter().enumerate() {
            let Expr::Matrix(target) = &statement.target else {
                return Err(wrong_target(kind, index, "matrix", &statement.target));
            };
            forbid_products(kind, index, statement)?;
            let this = (target.logical_rows().clone(), target.logical_cols().clone());
            match &shape {
                None => shape = Some(this),
                Some(first) if *first != this => {
                    return Err(GenError::InconsistentBatch {
                        what: format!(
                            "matrix shape ({} x {} against {} x {})",
                            first.0, first.1, this.0, this.1
                        ),
                    });
                }
                Some(_) => {}
            }
        }
        let Some((rows, cols)) = shape else {
            return Err(GenError::EmptyOperation);
        };

        let args = collect_args(operation, 1)?;
        let geometry = LaunchGeometry::new_2d(
            (p.local_size_0, p.local_size_1),
            (GroupCount::Fixed(p.num_groups_0), GroupCount::Fixed(p.num_groups_1)),
        );

        let mut stream = KernelStream::new();
        open_kernel(&mut stream, ENTRY, &geometry, &args);
        let loop_over: fn(&mut KernelStream, &str, u32, &str) = if p.strided { grid_stride_loop } else { chunked_loop };
        loop_over(&mut stream, "row", 0, &rows.to_string());
        loop_over(&mut stream, "col", 1, &cols.to_string());

        let ctx = AccessCtx::new(operation.numeric_type).with_element("row", "col");
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
