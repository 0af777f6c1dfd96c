//! Blocked matrix-matrix products, `C = f(op(A) * op(B))`
//!
//! A work-group owns an `ML x NL` tile of the result with
//! `ML = local_size_0 * ms` and `NL = local_size_1 * ns`. Each worker
//! accumulates an `ms x ns` register block whose rows are strided by
//! `local_size_0` and columns by `local_size_1`. Operand extents must be
//! multiples of the tile and of `kl`.

use super::primitives::{LocalMemory, LOCAL_BARRIER};
use super::render::{collect_args, matrix_element, render, AccessCtx};
use super::{
    entry_name, open_kernel, require_scalar_width, require_statements, single_product,
    wrong_target, GeneratedProgram, GroupCount, KernelEntry, KernelGenerator, KernelStream,
    LaunchGeometry,
};
use crate::diagnostics::GenError;
use crate::ops::{Expr, Operation, OperationKind};
use crate::profiles::MatrixProductParams;

pub struct MatrixProductGenerator {
    params: MatrixProductParams,
    lhs_transposed: bool,
    rhs_transposed: bool,
}

impl MatrixProductGenerator {
    pub fn new(params: MatrixProductParams, lhs_transposed: bool, rhs_transposed: bool) -> Self {
        Self {
            params,
            lhs_transposed,
            rhs_transposed,
        }
    }
}

/// `#pragma unroll` loop over `[0, bound)`
fn unrolled(stream: &mut KernelStream, var: &str, bound: u32) {
    stream.line("#pragma unroll");
    stream.open(format!("for (unsigned int {var} = 0; {var} < {bound}u; ++{var})"));
}

fn cooperative(stream: &mut KernelStream, var: &str, first: &str, bound: u32, step: u32) {
    stream.open(format!(
        "for (unsigned int {var} = {first}; {var} < {bound}u; {var} += {step}u)"
    ));
}

impl KernelGenerator for MatrixProductGenerator {
    fn kind(&self) -> OperationKind {
        OperationKind::MatrixProduct {
            lhs_transposed: self.lhs_transposed,
            rhs_transposed: self.rhs_transposed,
        }
    }

    fn profile(&self) -> String {
        self.params.to_string()
    }

    fn generate(&self, operation: &Operation) -> Result<GeneratedProgram, GenError> {
        require_statements(operation)?;
        let kind = self.kind();
        let p = &self.params;
        require_scalar_width(kind, p.simd_width)?;

        if operation.statements.len() != 1 {
            return Err(GenError::InconsistentBatch {
                what: format!(
                    "a matrix product per program, found {} statements",
                    operation.statements.len()
                ),
            });
        }
        let statement = &operation.statements[0];
        let Expr::Matrix(target) = &statement.target else {
            return Err(wrong_target(kind, 0, "matrix", &statement.target));
        };
        let product = single_product(kind, 0, statement)?;
        let shape_error = |reason: String| GenError::ProductShape {
            kind,
            statement: 0,
            reason,
        };
        let (Expr::Matrix(lhs), Some(Expr::Matrix(rhs))) =
            (product.lhs.as_ref(), product.rhs.as_deref())
        else {
            return Err(shape_error("both operands must be matrices".to_string()));
        };
        if lhs.transposed != self.lhs_transposed || rhs.transposed != self.rhs_transposed {
            return Err(shape_error(format!(
                "operand transposition does not match a {} kernel",
                kind
            )));
        }
        if lhs.logical_cols() != rhs.logical_rows() {
            return Err(shape_error(format!(
                "inner extents differ (`{}` against `{}`)",
                lhs.logical_cols(),
                rhs.logical_rows()
            )));
        }
        if target.logical_rows() != lhs.logical_rows() || target.logical_cols() != rhs.logical_cols() {
            return Err(shape_error(format!(
                "`{}` is not {} x {}",
                target.name,
                lhs.logical_rows(),
                rhs.logical_cols()
            )));
        }

        let numeric_type = operation.numeric_type;
        let scalar = numeric_type.cl_name();
        let (ml, nl) = (p.tile_rows(), p.tile_cols());
        let (ls0, ls1) = (p.local_size_0, p.local_size_1);
        let (ms, ns, ks, kl) = (p.ms, p.ns, p.ks, p.kl);
        let (lf0, lf1) = (p.local_fetch_0, p.local_fetch_1);
        let staged = p.use_lhs_local || p.use_rhs_local;

        let args = collect_args(operation, 1)?;
        let geometry = LaunchGeometry::new_2d(
            (ls0, ls1),
            (
                GroupCount::Cover {
                    extent: lhs.logical_rows().clone(),
                    tile: ml,
                },
                GroupCount::Cover {
                    extent: rhs.logical_cols().clone(),
                    tile: nl,
                },
            ),
        );
        let local_a = LocalMemory::new("lA", scalar, &[kl, ml + 1]);
        let local_b = LocalMemory::new("lB", scalar, &[kl, nl + 1]);
        let mut local_mem_bytes = 0;
        if p.use_lhs_local {
            local_mem_bytes += local_a.size_bytes(numeric_type.size_of());
        }
        if p.use_rhs_local {
            local_mem_bytes += local_b.size_bytes(numeric_type.size_of());
        }

        let name = entry_name(kind);
        let mut stream = KernelStream::new();
        open_kernel(&mut stream, &name, &geometry, &args);
        if p.use_lhs_local {
            stream.line(local_a.declare());
        }
        if p.use_rhs_local {
            stream.line(local_b.declare());
        }
        stream.line("unsigned int lid0 = get_local_id(0);");
        stream.line("unsigned int lid1 = get_local_id(1);");
        stream.line(format!("unsigned int gm = get_group_id(0) * {ml}u;"));
        stream.line(format!("unsigned int gn = get_group_id(1) * {nl}u;"));
        if staged {
            stream.line(format!("unsigned int flat = lid0 + lid1 * {ls0}u;"));
            stream.line(format!("unsigned int fid0 = flat % {lf0}u;"));
            stream.line(format!("unsigned int fid1 = flat / {lf0}u;"));
        }
        stream.line(format!("{scalar} rC[{ms}][{ns}];"));
        stream.line(format!("{scalar} rA[{ks}][{ms}];"));
        stream.line(format!("{scalar} rB[{ks}][{ns}];"));

        let neutral = product.reduce.neutral(numeric_type);
        unrolled(&mut stream, "m", ms);
        unrolled(&mut stream, "n", ns);
        stream.line(format!("rC[m][n] = {neutral};"));
        stream.close();
        stream.close();

        let shared = lhs.logical_cols().to_string();
        stream.open(format!(
            "for (unsigned int k0 = 0; k0 < {shared}; k0 += {kl}u)"
        ));

        let ctx = AccessCtx::new(numeric_type);
        if p.use_lhs_local {
            // Consecutive fetch workers read adjacent addresses
            if lhs.contiguous_along_rows() {
                cooperative(&mut stream, "a", "fid1", kl, lf1);
                cooperative(&mut stream, "b", "fid0", ml, lf0);
                let src = matrix_element(lhs, &ctx.with_element("gm + b", "k0 + a"))?;
                stream.line(format!("{} = {};", local_a.access(&["a", "b"]), src));
            } else {
                cooperative(&mut stream, "a", "fid1", ml, lf1);
                cooperative(&mut stream, "b", "fid0", kl, lf0);
                let src = matrix_element(lhs, &ctx.with_element("gm + a", "k0 + b"))?;
                stream.line(format!("{} = {};", local_a.access(&["b", "a"]), src));
            }
            stream.close();
            stream.close();
        }
        if p.use_rhs_local {
            if rhs.contiguous_along_rows() {
                cooperative(&mut stream, "a", "fid1", nl, lf1);
                cooperative(&mut stream, "b", "fid0", kl, lf0);
                let src = matrix_element(rhs, &ctx.with_element("k0 + b", "gn + a"))?;
                stream.line(format!("{} = {};", local_b.access(&["b", "a"]), src));
            } else {
                cooperative(&mut stream, "a", "fid1", kl, lf1);
                cooperative(&mut stream, "b", "fid0", nl, lf0);
                let src = matrix_element(rhs, &ctx.with_element("k0 + a", "gn + b"))?;
                stream.line(format!("{} = {};", local_b.access(&["a", "b"]), src));
            }
            stream.close();
            stream.close();
        }
        if staged {
            stream.line(LOCAL_BARRIER);
        }

        stream.open(format!("for (unsigned int k = 0; k < {kl}u; k += {ks}u)"));
        let a_row = format!("lid0 + m * {ls0}u");
        let b_col = format!("lid1 + n * {ls1}u");

        unrolled(&mut stream, "kk", ks);
        unrolled(&mut stream, "m", ms);
        let a_src = if p.use_lhs_local {
            local_a.access(&["k + kk", a_row.as_str()])
        } else {
            matrix_element(lhs, &ctx.with_element(&format!("gm + {a_row}"), "k0 + k + kk"))?
        };
        stream.line(format!("rA[kk][m] = {a_src};"));
        stream.close();
        stream.close();

        unrolled(&mut stream, "kk", ks);
        unrolled(&mut stream, "n", ns);
        let b_src = if p.use_rhs_local {
            local_b.access(&["k + kk", b_col.as_str()])
        } else {
            matrix_element(rhs, &ctx.with_element("k0 + k + kk", &format!("gn + {b_col}")))?
        };
        stream.line(format!("rB[kk][n] = {b_src};"));
        stream.close();
        stream.close();

        unrolled(&mut stream, "kk", ks);
        unrolled(&mut stream, "m", ms);
        unrolled(&mut stream, "n", ns);
        let term = product.combine.apply("rA[kk][m]", "rB[kk][n]");
        stream.line(format!("rC[m][n] = {};", product.reduce.combine("rC[m][n]", &term)));
        stream.close();
        stream.close();
        stream.close();

        stream.close();
        if staged {
            // Tiles are refilled by the next trip
            stream.line(LOCAL_BARRIER);
        }
        stream.close();

        unrolled(&mut stream, "m", ms);
        unrolled(&mut stream, "n", ns);
        stream.line(format!("unsigned int row = gm + {a_row};"));
        stream.line(format!("unsigned int col = gn + {b_col};"));
        let out = AccessCtx::new(numeric_type)
            .with_element("row", "col")
            .with_product("rC[m][n]");
        stream.line(format!(
            "{} {} {};",
            render(&statement.target, &out)?,
            statement.assign.token(),
            render(&statement.value, &out)?
        ));
        stream.close();
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
            profile: self.profile(),
        })
    }
}
