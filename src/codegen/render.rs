//! Expression rendering and kernel argument collection

use super::{ArgKind, KernelArg};
use crate::device::NumericType;
use crate::diagnostics::GenError;
use crate::ops::{Dim, Expr, MatrixArg, Operation, Product, ScalarArg};
use indexmap::IndexMap;
use indexmap::map::Entry;

/// What the enclosing loop nest makes addressable
#[derive(Debug, Clone, Copy)]
pub struct AccessCtx<'a> {
    pub numeric_type: NumericType,
    /// Index of vector elements
    pub index: Option<&'a str>,
    /// Logical row of matrix elements
    pub row: Option<&'a str>,
    /// Logical column of matrix elements
    pub col: Option<&'a str>,
    /// Text standing in for the statement's product
    pub product: Option<&'a str>,
}

impl<'a> AccessCtx<'a> {
    pub fn new(numeric_type: NumericType) -> Self {
        Self {
            numeric_type,
            index: None,
            row: None,
            col: None,
            product: None,
        }
    }

    pub fn with_index(mut self, index: &'a str) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_element(mut self, row: &'a str, col: &'a str) -> Self {
        self.row = Some(row);
        self.col = Some(col);
        self
    }

    pub fn with_product(mut self, product: &'a str) -> Self {
        self.product = Some(product);
        self
    }
}

/// Read of one matrix element under `ctx`
pub fn matrix_element(matrix: &MatrixArg, ctx: &AccessCtx<'_>) -> Result<String, GenError> {
    match (ctx.row, ctx.col) {
        (Some(row), Some(col)) => Ok(format!("{}[{}]", matrix.name, matrix.offset(row, col))),
        _ => Err(GenError::UnaddressableOperand {
            name: matrix.name.clone(),
            reason: "no matrix element is in scope".to_string(),
        }),
    }
}

/// Render `expr` as a kernel-language expression.
pub fn render(expr: &Expr, ctx: &AccessCtx<'_>) -> Result<String, GenError> {
    match expr {
        Expr::Scalar(ScalarArg::Host { name }) => Ok(name.clone()),
        Expr::Scalar(ScalarArg::Device { name }) => Ok(format!("{}[0]", name)),
        Expr::Scalar(ScalarArg::Literal { value }) => Ok(value.clone()),
        Expr::Vector(vector) => match ctx.index {
            Some(index) => Ok(format!("{}[{}]", vector.name, index)),
            None => Err(GenError::UnaddressableOperand {
                name: vector.name.clone(),
                reason: "no vector element is in scope".to_string(),
            }),
        },
        Expr::Matrix(matrix) => matrix_element(matrix, ctx),
        Expr::Binary { op, lhs, rhs } => Ok(op.apply(&render(lhs, ctx)?, &render(rhs, ctx)?)),
        Expr::Unary { func, operand } => Ok(func.apply(&render(operand, ctx)?, ctx.numeric_type)),
        Expr::Product(product) => match ctx.product {
            Some(text) => Ok(text.to_string()),
            None => Err(GenError::UnaddressableOperand {
                name: product_label(product),
                reason: "products cannot be nested".to_string(),
            }),
        },
    }
}

/// One term of `product` before reduction, `combine(lhs, rhs)`
pub fn product_term(product: &Product, ctx: &AccessCtx<'_>) -> Result<String, GenError> {
    let lhs = render(&product.lhs, ctx)?;
    match &product.rhs {
        Some(rhs) => Ok(product.combine.apply(&lhs, &render(rhs, ctx)?)),
        None => Ok(lhs),
    }
}

fn product_label(product: &Product) -> String {
    product
        .lhs
        .first_matrix()
        .map(|m| m.name.clone())
        .or_else(|| product.lhs.first_vector().map(|v| v.name.clone()))
        .unwrap_or_else(|| "product".to_string())
}

/// Role a name is bound to in the argument list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    HostScalar,
    DeviceScalar,
    Vector,
    Matrix,
    Size,
}

struct ArgCollector {
    numeric_type: NumericType,
    vector_element: String,
    args: IndexMap<String, (Role, KernelArg)>,
    sizes: Vec<String>,
}

impl ArgCollector {
    fn bind(&mut self, name: &str, role: Role, kind: ArgKind) -> Result<(), GenError> {
        match self.args.entry(name.to_string()) {
            Entry::Occupied(existing) if existing.get().0 == role => Ok(()),
            Entry::Occupied(_) => Err(GenError::ConflictingOperand {
                name: name.to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert((
                    role,
                    KernelArg {
                        name: name.to_string(),
                        kind,
                    },
                ));
                Ok(())
            }
        }
    }

    fn size(&mut self, dim: &Dim) {
        if let Some(name) = dim.as_symbol() {
            if !self.sizes.iter().any(|s| s == name) {
                self.sizes.push(name.to_string());
            }
        }
    }

    fn leaf(&mut self, expr: &Expr) -> Result<(), GenError> {
        let element = self.numeric_type.cl_name().to_string();
        match expr {
            Expr::Scalar(ScalarArg::Host { name }) => {
                self.bind(name, Role::HostScalar, ArgKind::Value { ty: element })
            }
            Expr::Scalar(ScalarArg::Device { name }) => {
                self.bind(name, Role::DeviceScalar, ArgKind::Buffer { element })
            }
            Expr::Scalar(ScalarArg::Literal { .. }) => Ok(()),
            Expr::Vector(vector) => {
                self.size(&vector.size);
                let element = self.vector_element.clone();
                self.bind(&vector.name, Role::Vector, ArgKind::Buffer { element })
            }
            Expr::Matrix(matrix) => {
                for dim in [&matrix.rows, &matrix.cols, &matrix.internal_rows, &matrix.internal_cols] {
                    self.size(dim);
                }
                self.bind(&matrix.name, Role::Matrix, ArgKind::Buffer { element })
            }
            Expr::Binary { .. } | Expr::Unary { .. } | Expr::Product(_) => Ok(()),
        }
    }

    fn expr(&mut self, expr: &Expr) -> Result<(), GenError> {
        let mut result = Ok(());
        expr.visit(&mut |node| {
            if result.is_ok() {
                result = self.leaf(node);
            }
        });
        result
    }
}

/// Kernel arguments of `operation` in first-use order.
///
/// Targets come first, then the remaining operands, then the size
/// symbols. Vector buffers use the `simd_width`-wide element type.
pub fn collect_args(operation: &Operation, simd_width: u32) -> Result<Vec<KernelArg>, GenError> {
    let numeric_type = operation.numeric_type;
    let vector_element = numeric_type
        .vector_name(simd_width)
        .unwrap_or_else(|| numeric_type.cl_name().to_string());
    let mut collector = ArgCollector {
        numeric_type,
        vector_element,
        args: IndexMap::new(),
        sizes: Vec::new(),
    };

    for statement in &operation.statements {
        collector.expr(&statement.target)?;
    }
    for statement in &operation.statements {
        collector.expr(&statement.value)?;
    }

    let sizes = std::mem::take(&mut collector.sizes);
    for name in &sizes {
        collector.bind(name, Role::Size, ArgKind::Size)?;
    }

    Ok(collector.args.into_values().map(|(_, arg)| arg).collect())
}

/// Append a scratch buffer argument, refusing to shadow an operand.
pub fn push_buffer(args: &mut Vec<KernelArg>, name: &str, element: &str) -> Result<(), GenError> {
    if args.iter().any(|arg| arg.name == name) {
        return Err(GenError::ConflictingOperand {
            name: name.to_string(),
        });
    }
    args.push(KernelArg {
        name: name.to_string(),
        kind: ArgKind::Buffer {
            element: element.to_string(),
        },
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{BinaryOp, Statement, UnaryFn, VectorArg};

    #[test]
    fn test_render_leaves() {
        let ctx = AccessCtx::new(NumericType::Float).with_index("i");
        let e = Expr::add(
            Expr::mul(Expr::Scalar(ScalarArg::host("alpha")), Expr::Vector(VectorArg::new("x", "N"))),
            Expr::Scalar(ScalarArg::device("beta")),
        );
        assert_eq!(render(&e, &ctx).unwrap(), "((alpha * x[i]) + beta[0])");
    }

    #[test]
    fn test_render_abs_picks_fabs() {
        let x = Expr::unary(UnaryFn::Abs, Expr::Vector(VectorArg::new("x", "N")));
        let float = AccessCtx::new(NumericType::Float).with_index("i");
        let int = AccessCtx::new(NumericType::Int).with_index("i");
        assert_eq!(render(&x, &float).unwrap(), "fabs(x[i])");
        assert_eq!(render(&x, &int).unwrap(), "abs(x[i])");
    }

    #[test]
    fn test_render_matrix_without_element_fails() {
        let a = Expr::Matrix(MatrixArg::new("A", "M", "N"));
        let ctx = AccessCtx::new(NumericType::Float).with_index("i");
        assert!(matches!(
            render(&a, &ctx),
            Err(GenError::UnaddressableOperand { name, .. }) if name == "A"
        ));
    }

    #[test]
    fn test_product_term() {
        let ctx = AccessCtx::new(NumericType::Float)
            .with_index("c")
            .with_element("r", "c");
        let Expr::Product(product) = Expr::reduce_with(
            crate::ops::ReduceOp::Max,
            BinaryOp::Sub,
            Expr::Matrix(MatrixArg::new("A", "M", "N")),
            Expr::Vector(VectorArg::new("x", "N")),
        ) else {
            unreachable!()
        };
        assert_eq!(product_term(&product, &ctx).unwrap(), "(A[(r) * N + (c)] - x[c])");
    }

    #[test]
    fn test_collect_args_order() {
        let op = Operation::new(NumericType::Float).with(Statement::assign(
            Expr::Vector(VectorArg::new("y", "N")),
            Expr::add(
                Expr::Vector(VectorArg::new("x", "N")),
                Expr::Scalar(ScalarArg::literal("1.0f")),
            ),
        ));
        let names: Vec<_> = collect_args(&op, 1)
            .unwrap()
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(names, ["y", "x", "N"]);
    }

    #[test]
    fn test_collect_args_conflict() {
        let op = Operation::new(NumericType::Float).with(Statement::assign(
            Expr::Vector(VectorArg::new("x", "N")),
            Expr::Scalar(ScalarArg::host("x")),
        ));
        assert_eq!(
            collect_args(&op, 1),
            Err(GenError::ConflictingOperand { name: "x".to_string() })
        );
    }
}
