//! Full reductions to device scalars
//!
//! Two passes: `reduction_partial` leaves one value per work-group in
//! `temp`, `reduction_final` folds them in a single group and applies the
//! rest of each statement.

use super::primitives::{
    chunked_loop, component, grid_stride_loop, reduction_tree, tree_result, LocalMemory,
    TreeOperand,
};
use super::render::{collect_args, product_term, push_buffer, render, AccessCtx};
use super::vector_axpy::packed_bound;
use super::{
    open_kernel, packed_element, require_statements, single_product, wrong_target,
    GeneratedProgram, GroupCount, KernelEntry, KernelGenerator, KernelStream, LaunchGeometry,
};
use crate::diagnostics::GenError;
use crate::ops::{Dim, Expr, Operation, OperationKind, Product, ScalarArg, Statement};
use crate::profiles::ReductionParams;

pub const PARTIAL_ENTRY: &str = "reduction_partial";
pub const FINAL_ENTRY: &str = "reduction_final";
/// Scratch argument holding the per-group partials
pub const TEMP: &str = "temp";

pub struct ReductionGenerator {
    params: ReductionParams,
}

struct Reduced<'a> {
    statement: &'a Statement,
    product: &'a Product,
}

impl ReductionGenerator {
    pub fn new(params: ReductionParams) -> Self {
        Self { params }
    }

    fn check<'a>(&self, operation: &'a Operation) -> Result<(Vec<Reduced<'a>>, Dim), GenError> {
        let kind = self.kind();
        let mut reduced = Vec::with_capacity(operation.statements.len());
        let mut extent: Option<Dim> = None;

        for (index, statement) in operation.statements.iter().enumerate() {
            if !matches!(statement.target, Expr::Scalar(ScalarArg::Device { .. })) {
                return Err(wrong_target(kind, index, "device scalar", &statement.target));
            }
            let product = single_product(kind, index, statement)?;
            let shape_error = |reason: &str| GenError::ProductShape {
                kind,
                statement: index,
                reason: reason.to_string(),
            };
            if product.lhs.first_matrix().is_some()
                || product.rhs.as_deref().and_then(Expr::first_matrix).is_some()
            {
                return Err(shape_error("reductions take vector operands only"));
            }
            let Some(vector) = product
                .lhs
                .first_vector()
                .or_else(|| product.rhs.as_deref().and_then(Expr::first_vector))
            else {
                return Err(shape_error("the product has no vector operand"));
            };

            match &extent {
                None => extent = Some(vector.size.clone()),
                Some(first) if *first != vector.size => {
                    return Err(GenError::InconsistentBatch {
                        what: format!("reduction extent (`{}` against `{}`)", first, vector.size),
                    });
                }
                Some(_) => {}
            }
            reduced.push(Reduced { statement, product });
        }

        let extent = extent.ok_or(GenError::EmptyOperation)?;
        Ok((reduced, extent))
    }
}

impl KernelGenerator for ReductionGenerator {
    fn kind(&self) -> OperationKind {
        OperationKind::Reduction
    }

    fn profile(&self) -> String {
        self.params.to_string()
    }

    fn generate(&self, operation: &Operation) -> Result<GeneratedProgram, GenError> {
        require_statements(operation)?;
        let (reduced, extent) = self.check(operation)?;

        let p = &self.params;
        let numeric_type = operation.numeric_type;
        let scalar = numeric_type.cl_name();
        let packed = packed_element(self.kind(), numeric_type, p.simd_width)?;

        let mut args = collect_args(operation, p.simd_width)?;
        push_buffer(&mut args, TEMP, scalar)?;

        let buffers: Vec<LocalMemory> = (0..reduced.len())
            .map(|s| LocalMemory::new(format!("buf{}", s), scalar, &[p.local_size_0]))
            .collect();
        let tree: Vec<TreeOperand<'_>> = buffers
            .iter()
            .zip(&reduced)
            .map(|(buffer, r)| TreeOperand {
                buffer,
                op: r.product.reduce,
            })
            .collect();
        let local_mem_bytes: u64 = buffers.iter().map(|b| b.size_bytes(numeric_type.size_of())).sum();
        let groups = format!("{}u", p.num_groups);
        // One partial per statement and group
        let scratch_elements = reduced.len() as u64 * p.num_groups as u64;

        // First pass
        let partial = LaunchGeometry::new_1d(p.local_size_0, GroupCount::Fixed(p.num_groups));
        let mut stream = KernelStream::new();
        open_kernel(&mut stream, PARTIAL_ENTRY, &partial, &args);
        for buffer in &buffers {
            stream.line(buffer.declare());
        }
        stream.line("unsigned int lid = get_local_id(0);");
        for (s, r) in reduced.iter().enumerate() {
            let neutral = r.product.reduce.neutral(numeric_type);
            if p.simd_width > 1 {
                stream.line(format!("{packed} acc{s} = ({packed})({neutral});"));
            } else {
                stream.line(format!("{scalar} sum{s} = {neutral};"));
            }
        }

        let bound = packed_bound(self.kind(), &extent, p.simd_width)?;
        if p.strided {
            grid_stride_loop(&mut stream, "i", 0, &bound);
        } else {
            chunked_loop(&mut stream, "i", 0, &bound);
        }
        let ctx = AccessCtx::new(numeric_type).with_index("i");
        for (s, r) in reduced.iter().enumerate() {
            let acc = if p.simd_width > 1 { format!("acc{s}") } else { format!("sum{s}") };
            let term = product_term(r.product, &ctx)?;
            stream.line(format!("{} = {};", acc, r.product.reduce.combine(&acc, &term)));
        }
        stream.close();

        if p.simd_width > 1 {
            for (s, r) in reduced.iter().enumerate() {
                let sum = format!("sum{s}");
                stream.line(format!("{scalar} {sum} = acc{s}.{};", component(0)));
                for lane in 1..p.simd_width {
                    let value = format!("acc{s}.{}", component(lane));
                    stream.line(format!("{} = {};", sum, r.product.reduce.combine(&sum, &value)));
                }
            }
        }
        for (s, buffer) in buffers.iter().enumerate() {
            stream.line(format!("{} = sum{s};", buffer.access(&["lid"])));
        }
        reduction_tree(&mut stream, &tree, &[], "lid", p.local_size_0);
        stream.open("if (lid == 0)");
        for (s, buffer) in buffers.iter().enumerate() {
            stream.line(format!(
                "{TEMP}[{s} * {groups} + get_group_id(0)] = {};",
                tree_result(buffer, &[])
            ));
        }
        stream.close();
        stream.close();
        stream.blank();

        // Second pass
        let last = LaunchGeometry::new_1d(p.local_size_0, GroupCount::Fixed(1));
        open_kernel(&mut stream, FINAL_ENTRY, &last, &args);
        for buffer in &buffers {
            stream.line(buffer.declare());
        }
        stream.line("unsigned int lid = get_local_id(0);");
        for (s, r) in reduced.iter().enumerate() {
            stream.line(format!("{scalar} sum{s} = {};", r.product.reduce.neutral(numeric_type)));
        }
        stream.open(format!(
            "for (unsigned int i = lid; i < {groups}; i += get_local_size(0))"
        ));
        for (s, r) in reduced.iter().enumerate() {
            let sum = format!("sum{s}");
            let partial_value = format!("{TEMP}[{s} * {groups} + i]");
            stream.line(format!("{} = {};", sum, r.product.reduce.combine(&sum, &partial_value)));
        }
        stream.close();
        for (s, buffer) in buffers.iter().enumerate() {
            stream.line(format!("{} = sum{s};", buffer.access(&["lid"])));
        }
        reduction_tree(&mut stream, &tree, &[], "lid", p.local_size_0);
        stream.open("if (lid == 0)");
        for (r, buffer) in reduced.iter().zip(&buffers) {
            let result = tree_result(buffer, &[]);
            let ctx = AccessCtx::new(numeric_type).with_product(&result);
            stream.line(format!(
                "{} {} {};",
                render(&r.statement.target, &ctx)?,
                r.statement.assign.token(),
                render(&r.statement.value, &ctx)?
            ));
        }
        stream.close();
        stream.close();

        Ok(GeneratedProgram {
            source: stream.finish(),
            entries: vec![
                KernelEntry {
                    name: PARTIAL_ENTRY.to_string(),
                    args: args.clone(),
                    geometry: partial,
                    local_mem_bytes,
                    scratch_elements,
                },
                KernelEntry {
                    name: FINAL_ENTRY.to_string(),
                    args,
                    geometry: last,
                    local_mem_bytes,
                    scratch_elements,
                },
            ],
            profile: self.profile(),
        })
    }
}
