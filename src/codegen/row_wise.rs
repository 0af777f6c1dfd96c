//! Row-wise reductions of matrix expressions
//!
//! `y[r] = f(reduce_c combine(op(A)[r, c], x[c]))`, one output element per
//! row of `op(A)`. Dimension 0 of a work-group walks output elements, its
//! dimension 1 splits each row and folds the pieces in local memory.

use super::primitives::{
    grid_stride_loop, group_uniform_loop, reduction_tree, tree_result, LocalMemory, TreeOperand,
    LOCAL_BARRIER,
};
use super::render::{collect_args, product_term, render, AccessCtx};
use super::{
    entry_name, open_kernel, require_scalar_width, require_statements, single_product, wrong_target,
    GeneratedProgram, GroupCount, KernelEntry, KernelGenerator, KernelStream, LaunchGeometry,
};
use crate::diagnostics::GenError;
use crate::ops::{Dim, Expr, Operation, OperationKind, Product, Statement};
use crate::profiles::RowWiseParams;

pub struct RowWiseReductionGenerator {
    params: RowWiseParams,
    transposed: bool,
}

impl RowWiseReductionGenerator {
    pub fn new(params: RowWiseParams, transposed: bool) -> Self {
        Self { params, transposed }
    }
}

impl KernelGenerator for RowWiseReductionGenerator {
    fn kind(&self) -> OperationKind {
        OperationKind::RowWiseReduction {
            transposed: self.transposed,
        }
    }

    fn profile(&self) -> String {
        self.params.to_string()
    }

    fn generate(&self, operation: &Operation) -> Result<GeneratedProgram, GenError> {
        emit(self.kind(), &self.params, self.transposed, operation, |_, _| Ok(()))
    }
}

struct RowStatement<'a> {
    statement: &'a Statement,
    product: &'a Product,
}

/// Shared emitter for row-wise reductions and matrix-vector products.
///
/// `accept` may reject a product the caller's kernel cannot evaluate.
pub(crate) fn emit(
    kind: OperationKind,
    p: &RowWiseParams,
    transposed: bool,
    operation: &Operation,
    accept: impl Fn(usize, &Product) -> Result<(), GenError>,
) -> Result<GeneratedProgram, GenError> {
    require_statements(operation)?;
    require_scalar_width(kind, p.simd_width)?;

    let mut rows_of: Vec<RowStatement<'_>> = Vec::with_capacity(operation.statements.len());
    let mut shape: Option<(Dim, Dim)> = None;
    for (index, statement) in operation.statements.iter().enumerate() {
        if !matches!(statement.target, Expr::Vector(_)) {
            return Err(wrong_target(kind, index, "vector", &statement.target));
        }
        let product = single_product(kind, index, statement)?;
        let shape_error = |reason: String| GenError::ProductShape {
            kind,
            statement: index,
            reason,
        };
        let Some(matrix) = product.matrix() else {
            return Err(shape_error("the left operand must be matrix-valued".to_string()));
        };
        if product.rhs.as_deref().and_then(Expr::first_matrix).is_some() {
            return Err(shape_error("the right operand must be a vector expression".to_string()));
        }
        if matrix.transposed != transposed {
            return Err(shape_error(format!(
                "`{}` is {}transposed",
                matrix.name,
                if matrix.transposed { "" } else { "not " }
            )));
        }
        accept(index, product)?;

        let this = (matrix.logical_rows().clone(), matrix.logical_cols().clone());
        match &shape {
            None => shape = Some(this),
            Some(first) if *first != this => {
                return Err(GenError::InconsistentBatch {
                    what: format!(
                        "matrix extent ({} x {} against {} x {})",
                        first.0, first.1, this.0, this.1
                    ),
                });
            }
            Some(_) => {}
        }
        rows_of.push(RowStatement { statement, product });
    }
    let Some((rows, cols)) = shape else {
        return Err(GenError::EmptyOperation);
    };

    let numeric_type = operation.numeric_type;
    let scalar = numeric_type.cl_name();
    let args = collect_args(operation, 1)?;
    let geometry = LaunchGeometry::new_2d(
        (p.local_size_0, p.local_size_1),
        (GroupCount::Fixed(p.num_groups_0), GroupCount::Fixed(1)),
    );
    let buffers: Vec<LocalMemory> = (0..rows_of.len())
        .map(|s| LocalMemory::new(format!("buf{}", s), scalar, &[p.local_size_0, p.local_size_1 + 1]))
        .collect();
    let tree: Vec<TreeOperand<'_>> = buffers
        .iter()
        .zip(&rows_of)
        .map(|(buffer, r)| TreeOperand {
            buffer,
            op: r.product.reduce,
        })
        .collect();
    let local_mem_bytes: u64 = buffers.iter().map(|b| b.size_bytes(numeric_type.size_of())).sum();

    // Output elements follow the stored axis they index
    let (out, inner) = if transposed { ("c", "r") } else { ("r", "c") };
    let rows_bound = rows.to_string();
    let cols_bound = cols.to_string();
    let name = entry_name(kind);

    let mut stream = KernelStream::new();
    open_kernel(&mut stream, &name, &geometry, &args);
    for buffer in &buffers {
        stream.line(buffer.declare());
    }
    stream.line("unsigned int lid0 = get_local_id(0);");
    stream.line("unsigned int lid1 = get_local_id(1);");

    group_uniform_loop(&mut stream, out, 0, &rows_bound);
    for (s, r) in rows_of.iter().enumerate() {
        stream.line(format!("{} sum{} = {};", scalar, s, r.product.reduce.neutral(numeric_type)));
    }
    stream.open(format!("if ({} < {})", out, rows_bound));
    grid_stride_loop(&mut stream, inner, 1, &cols_bound);
    let ctx = AccessCtx::new(numeric_type)
        .with_index(inner)
        .with_element(out, inner);
    for (s, r) in rows_of.iter().enumerate() {
        let sum = format!("sum{}", s);
        let term = product_term(r.product, &ctx)?;
        stream.line(format!("{} = {};", sum, r.product.reduce.combine(&sum, &term)));
    }
    stream.close();
    stream.close();

    for (s, buffer) in buffers.iter().enumerate() {
        stream.line(format!("{} = sum{};", buffer.access(&["lid0", "lid1"]), s));
    }
    reduction_tree(&mut stream, &tree, &["lid0"], "lid1", p.local_size_1);

    stream.open(format!("if (lid1 == 0u && {} < {})", out, rows_bound));
    for (r, buffer) in rows_of.iter().zip(&buffers) {
        let result = tree_result(buffer, &["lid0"]);
        let ctx = AccessCtx::new(numeric_type).with_index(out).with_product(&result);
        stream.line(format!(
            "{} {} {};",
            render(&r.statement.target, &ctx)?,
            r.statement.assign.token(),
            render(&r.statement.value, &ctx)?
        ));
    }
    stream.close();
    // Slot 0 is rewritten by the next trip
    stream.line(LOCAL_BARRIER);
    stream.close();
    stream.close();

    Ok(GeneratedProgram {
        source: stream.finish(),
        entries: vec![KernelEntry {
            name,
            args,
            geometry,
            local_mem_bytes,
            scratch_elements: 0,
        }],
        profile: p.to_string(),
    })
}
