//! Symbolic operation descriptions
//!
//! An [`Operation`] is what the expression front end hands to the
//! generator: a batch of statements over scalars, vectors and matrices
//! whose extents may only be known at launch time. The operand roles form
//! a closed set and every consumer matches on them exhaustively.

use crate::device::NumericType;
use crate::diagnostics::GenError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Extent of an operand
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Dim {
    /// Known when the kernel is generated
    Const(u64),
    /// Passed as an `unsigned int` kernel argument of this name
    Symbol(String),
}

impl Dim {
    pub fn symbol(name: impl Into<String>) -> Self {
        Dim::Symbol(name.into())
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Dim::Const(_) => None,
            Dim::Symbol(name) => Some(name),
        }
    }
}

impl From<u64> for Dim {
    fn from(n: u64) -> Self {
        Dim::Const(n)
    }
}

impl From<&str> for Dim {
    fn from(name: &str) -> Self {
        Dim::Symbol(name.to_string())
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dim::Const(n) => write!(f, "{}u", n),
            Dim::Symbol(name) => f.write_str(name),
        }
    }
}

/// Scalar operand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "storage", rename_all = "snake_case")]
pub enum ScalarArg {
    /// Passed by value
    Host { name: String },
    /// One-element device buffer
    Device { name: String },
    /// Inline constant, emitted verbatim
    Literal { value: String },
}

impl ScalarArg {
    pub fn host(name: impl Into<String>) -> Self {
        ScalarArg::Host { name: name.into() }
    }

    pub fn device(name: impl Into<String>) -> Self {
        ScalarArg::Device { name: name.into() }
    }

    pub fn literal(value: impl fmt::Display) -> Self {
        ScalarArg::Literal {
            value: value.to_string(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            ScalarArg::Host { name } | ScalarArg::Device { name } => Some(name),
            ScalarArg::Literal { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorArg {
    pub name: String,
    pub size: Dim,
}

impl VectorArg {
    pub fn new(name: impl Into<String>, size: impl Into<Dim>) -> Self {
        Self {
            name: name.into(),
            size: size.into(),
        }
    }
}

/// Storage order of a matrix
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    #[default]
    RowMajor,
    ColumnMajor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixArg {
    pub name: String,
    /// Stored rows
    pub rows: Dim,
    /// Stored columns
    pub cols: Dim,
    /// Allocated rows, at least `rows`
    pub internal_rows: Dim,
    /// Allocated columns, at least `cols`
    pub internal_cols: Dim,
    #[serde(default)]
    pub layout: Layout,
    /// The operation reads `Mᵀ`
    #[serde(default)]
    pub transposed: bool,
}

impl MatrixArg {
    pub fn new(name: impl Into<String>, rows: impl Into<Dim>, cols: impl Into<Dim>) -> Self {
        let rows = rows.into();
        let cols = cols.into();
        Self {
            name: name.into(),
            internal_rows: rows.clone(),
            internal_cols: cols.clone(),
            rows,
            cols,
            layout: Layout::RowMajor,
            transposed: false,
        }
    }

    pub fn padded(mut self, internal_rows: impl Into<Dim>, internal_cols: impl Into<Dim>) -> Self {
        self.internal_rows = internal_rows.into();
        self.internal_cols = internal_cols.into();
        self
    }

    pub fn column_major(mut self) -> Self {
        self.layout = Layout::ColumnMajor;
        self
    }

    pub fn transposed(mut self) -> Self {
        self.transposed = !self.transposed;
        self
    }

    /// Rows of `op(M)`
    pub fn logical_rows(&self) -> &Dim {
        if self.transposed { &self.cols } else { &self.rows }
    }

    /// Columns of `op(M)`
    pub fn logical_cols(&self) -> &Dim {
        if self.transposed { &self.rows } else { &self.cols }
    }

    /// Linear offset of logical element `(row, col)` of `op(M)`
    pub fn offset(&self, row: &str, col: &str) -> String {
        let (r, c) = if self.transposed { (col, row) } else { (row, col) };
        match self.layout {
            Layout::RowMajor => format!("({}) * {} + ({})", r, self.internal_cols, c),
            Layout::ColumnMajor => format!("({}) + ({}) * {}", r, c, self.internal_rows),
        }
    }

    /// Whether consecutive logical rows of `op(M)` are adjacent in memory
    pub fn contiguous_along_rows(&self) -> bool {
        matches!(
            (self.layout, self.transposed),
            (Layout::ColumnMajor, false) | (Layout::RowMajor, true)
        )
    }
}

/// Element-wise binary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Max,
    Min,
}

impl BinaryOp {
    pub fn apply(self, lhs: &str, rhs: &str) -> String {
        match self {
            BinaryOp::Add => format!("({} + {})", lhs, rhs),
            BinaryOp::Sub => format!("({} - {})", lhs, rhs),
            BinaryOp::Mul => format!("({} * {})", lhs, rhs),
            BinaryOp::Div => format!("({} / {})", lhs, rhs),
            BinaryOp::Max => format!("max({}, {})", lhs, rhs),
            BinaryOp::Min => format!("min({}, {})", lhs, rhs),
        }
    }
}

/// Element-wise function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryFn {
    Neg,
    Abs,
    Sqrt,
    Exp,
    Log,
}

impl UnaryFn {
    pub fn apply(self, operand: &str, numeric_type: NumericType) -> String {
        match self {
            UnaryFn::Neg => format!("(-{})", operand),
            UnaryFn::Abs if numeric_type.is_float() => format!("fabs({})", operand),
            UnaryFn::Abs => format!("abs({})", operand),
            UnaryFn::Sqrt => format!("sqrt({})", operand),
            UnaryFn::Exp => format!("exp({})", operand),
            UnaryFn::Log => format!("log({})", operand),
        }
    }
}

/// Operator folding partial results of a product
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReduceOp {
    #[default]
    Add,
    Mul,
    Max,
    Min,
}

impl ReduceOp {
    pub fn combine(self, acc: &str, value: &str) -> String {
        match self {
            ReduceOp::Add => format!("{} + {}", acc, value),
            ReduceOp::Mul => format!("{} * {}", acc, value),
            ReduceOp::Max => format!("max({}, {})", acc, value),
            ReduceOp::Min => format!("min({}, {})", acc, value),
        }
    }

    /// Identity element for `numeric_type`
    pub fn neutral(self, numeric_type: NumericType) -> &'static str {
        match self {
            ReduceOp::Add => "0",
            ReduceOp::Mul => "1",
            ReduceOp::Max => numeric_type.lowest(),
            ReduceOp::Min => numeric_type.highest(),
        }
    }
}

fn default_combine() -> BinaryOp {
    BinaryOp::Mul
}

/// A reduction over the shared dimension of its operands
///
/// `Σ_k combine(lhs[.., k], rhs[k, ..])` with `Σ` standing for `reduce`.
/// Without `rhs` the elements of `lhs` are reduced directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub lhs: Box<Expr>,
    #[serde(default)]
    pub rhs: Option<Box<Expr>>,
    #[serde(default = "default_combine")]
    pub combine: BinaryOp,
    #[serde(default)]
    pub reduce: ReduceOp,
}

/// Expression tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Expr {
    Scalar(ScalarArg),
    Vector(VectorArg),
    Matrix(MatrixArg),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        func: UnaryFn,
        operand: Box<Expr>,
    },
    Product(Product),
}

impl Expr {
    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn add(lhs: Expr, rhs: Expr) -> Expr {
        Expr::binary(BinaryOp::Add, lhs, rhs)
    }

    pub fn mul(lhs: Expr, rhs: Expr) -> Expr {
        Expr::binary(BinaryOp::Mul, lhs, rhs)
    }

    pub fn unary(func: UnaryFn, operand: Expr) -> Expr {
        Expr::Unary {
            func,
            operand: Box::new(operand),
        }
    }

    /// `Σ lhs * rhs`
    pub fn prod(lhs: Expr, rhs: Expr) -> Expr {
        Expr::reduce_with(ReduceOp::Add, BinaryOp::Mul, lhs, rhs)
    }

    /// `reduce_k combine(lhs, rhs)`
    pub fn reduce_with(reduce: ReduceOp, combine: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Product(Product {
            lhs: Box::new(lhs),
            rhs: Some(Box::new(rhs)),
            combine,
            reduce,
        })
    }

    /// Reduce all elements of `operand`
    pub fn reduce(reduce: ReduceOp, operand: Expr) -> Expr {
        Expr::Product(Product {
            lhs: Box::new(operand),
            rhs: None,
            combine: BinaryOp::Mul,
            reduce,
        })
    }

    /// Pre-order walk
    pub fn visit<'a>(&'a self, f: &mut dyn FnMut(&'a Expr)) {
        f(self);
        match self {
            Expr::Scalar(_) | Expr::Vector(_) | Expr::Matrix(_) => {}
            Expr::Binary { lhs, rhs, .. } => {
                lhs.visit(f);
                rhs.visit(f);
            }
            Expr::Unary { operand, .. } => operand.visit(f),
            Expr::Product(product) => {
                product.lhs.visit(f);
                if let Some(rhs) = &product.rhs {
                    rhs.visit(f);
                }
            }
        }
    }

    /// Products in pre-order, not descending into products
    pub fn products(&self) -> Vec<&Product> {
        let mut found = Vec::new();
        collect_products(self, &mut found);
        found
    }

    /// First matrix leaf in pre-order
    pub fn first_matrix(&self) -> Option<&MatrixArg> {
        let mut found = None;
        self.visit(&mut |e| {
            if let Expr::Matrix(m) = e {
                found.get_or_insert(m);
            }
        });
        found
    }

    /// First vector leaf in pre-order
    pub fn first_vector(&self) -> Option<&VectorArg> {
        let mut found = None;
        self.visit(&mut |e| {
            if let Expr::Vector(v) = e {
                found.get_or_insert(v);
            }
        });
        found
    }
}

fn collect_products<'a>(expr: &'a Expr, found: &mut Vec<&'a Product>) {
    match expr {
        Expr::Scalar(_) | Expr::Vector(_) | Expr::Matrix(_) => {}
        Expr::Binary { lhs, rhs, .. } => {
            collect_products(lhs, found);
            collect_products(rhs, found);
        }
        Expr::Unary { operand, .. } => collect_products(operand, found),
        Expr::Product(product) => found.push(product),
    }
}

impl Product {
    /// Matrix-valued left operand, if any
    pub fn matrix(&self) -> Option<&MatrixArg> {
        self.lhs.first_matrix()
    }

    pub fn is_plain_product(&self) -> bool {
        self.combine == BinaryOp::Mul && self.reduce == ReduceOp::Add
    }
}

/// How a statement stores into its target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignOp {
    #[default]
    Assign,
    AddAssign,
    SubAssign,
}

impl AssignOp {
    pub fn token(self) -> &'static str {
        match self {
            AssignOp::Assign => "=",
            AssignOp::AddAssign => "+=",
            AssignOp::SubAssign => "-=",
        }
    }
}

/// `target <assign> value`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    /// Scalar, vector or matrix leaf
    pub target: Expr,
    #[serde(default)]
    pub assign: AssignOp,
    pub value: Expr,
}

impl Statement {
    pub fn assign(target: Expr, value: Expr) -> Self {
        Self {
            target,
            assign: AssignOp::Assign,
            value,
        }
    }

    pub fn with_op(mut self, assign: AssignOp) -> Self {
        self.assign = assign;
        self
    }
}

/// A batch of statements generated into one program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub numeric_type: NumericType,
    pub statements: Vec<Statement>,
}

impl Operation {
    pub fn new(numeric_type: NumericType) -> Self {
        Self {
            numeric_type,
            statements: Vec::new(),
        }
    }

    pub fn with(mut self, statement: Statement) -> Self {
        self.statements.push(statement);
        self
    }

    /// Parse a JSON description
    pub fn from_json(source: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(source)
    }

    /// Parse a TOML description
    pub fn from_toml(source: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(source)
    }
}

/// Which generator an operation needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    VectorAxpy,
    MatrixAxpy,
    Reduction,
    RowWiseReduction { transposed: bool },
    MatrixVector { transposed: bool },
    MatrixProduct { lhs_transposed: bool, rhs_transposed: bool },
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::VectorAxpy => write!(f, "vector-axpy"),
            OperationKind::MatrixAxpy => write!(f, "matrix-axpy"),
            OperationKind::Reduction => write!(f, "reduction"),
            OperationKind::RowWiseReduction { transposed: false } => write!(f, "row-wise-reduction"),
            OperationKind::RowWiseReduction { transposed: true } => {
                write!(f, "transposed-row-wise-reduction")
            }
            OperationKind::MatrixVector { transposed: false } => write!(f, "matrix-vector"),
            OperationKind::MatrixVector { transposed: true } => write!(f, "transposed-matrix-vector"),
            OperationKind::MatrixProduct {
                lhs_transposed,
                rhs_transposed,
            } => write!(
                f,
                "matrix-product-{}{}",
                if *lhs_transposed { 't' } else { 'n' },
                if *rhs_transposed { 't' } else { 'n' }
            ),
        }
    }
}

/// Role of a leaf, used in diagnostics
pub fn role_of(expr: &Expr) -> &'static str {
    match expr {
        Expr::Scalar(_) => "scalar",
        Expr::Vector(_) => "vector",
        Expr::Matrix(_) => "matrix",
        Expr::Binary { .. } | Expr::Unary { .. } => "expression",
        Expr::Product(_) => "product",
    }
}

impl OperationKind {
    /// Pick the generator for `operation` from its first statement.
    pub fn classify(operation: &Operation) -> Result<OperationKind, GenError> {
        let Some(first) = operation.statements.first() else {
            return Err(GenError::EmptyOperation);
        };
        let products = first.value.products();
        let product = products.first();

        match (&first.target, product) {
            (Expr::Scalar(_), Some(_)) => Ok(OperationKind::Reduction),
            (Expr::Vector(_), None) => Ok(OperationKind::VectorAxpy),
            (Expr::Matrix(_), None) => Ok(OperationKind::MatrixAxpy),
            (Expr::Vector(_), Some(product)) => {
                let Some(matrix) = product.matrix() else {
                    return Err(GenError::Unclassifiable {
                        reason: "a vector target needs a matrix-valued product".to_string(),
                    });
                };
                let transposed = matrix.transposed;
                // A row-sum has no vector operand to multiply against
                if product.is_plain_product() && product.rhs.is_some() {
                    Ok(OperationKind::MatrixVector { transposed })
                } else {
                    Ok(OperationKind::RowWiseReduction { transposed })
                }
            }
            (Expr::Matrix(_), Some(product)) => {
                let lhs = product.lhs.first_matrix();
                let rhs = product.rhs.as_deref().and_then(Expr::first_matrix);
                match (lhs, rhs) {
                    (Some(lhs), Some(rhs)) => Ok(OperationKind::MatrixProduct {
                        lhs_transposed: lhs.transposed,
                        rhs_transposed: rhs.transposed,
                    }),
                    _ => Err(GenError::Unclassifiable {
                        reason: "a matrix target needs a product of two matrices".to_string(),
                    }),
                }
            }
            (target, _) => Err(GenError::Unclassifiable {
                reason: format!("cannot assign to a {}", role_of(target)),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(name: &str) -> Expr {
        Expr::Vector(VectorArg::new(name, "N"))
    }

    fn matrix(name: &str) -> MatrixArg {
        MatrixArg::new(name, "M", "N")
    }

    #[test]
    fn test_offset_row_major() {
        let a = matrix("A");
        assert_eq!(a.offset("r", "c"), "(r) * N + (c)");
        let at = matrix("A").transposed();
        assert_eq!(at.offset("r", "c"), "(c) * N + (r)");
    }

    #[test]
    fn test_offset_column_major_padded() {
        let a = matrix("A").padded(64u64, 64u64).column_major();
        assert_eq!(a.offset("r", "c"), "(r) + (c) * 64u");
    }

    #[test]
    fn test_logical_shape() {
        let at = matrix("A").transposed();
        assert_eq!(at.logical_rows(), &Dim::symbol("N"));
        assert_eq!(at.logical_cols(), &Dim::symbol("M"));
    }

    #[test]
    fn test_classify() {
        let axpy = Operation::new(NumericType::Float)
            .with(Statement::assign(vector("x"), vector("y")));
        assert_eq!(OperationKind::classify(&axpy), Ok(OperationKind::VectorAxpy));

        let dot = Operation::new(NumericType::Float).with(Statement::assign(
            Expr::Scalar(ScalarArg::device("s")),
            Expr::prod(vector("x"), vector("y")),
        ));
        assert_eq!(OperationKind::classify(&dot), Ok(OperationKind::Reduction));

        let gemv = Operation::new(NumericType::Float).with(Statement::assign(
            vector("y"),
            Expr::prod(Expr::Matrix(matrix("A").transposed()), vector("x")),
        ));
        assert_eq!(
            OperationKind::classify(&gemv),
            Ok(OperationKind::MatrixVector { transposed: true })
        );

        let row_max = Operation::new(NumericType::Float).with(Statement::assign(
            vector("y"),
            Expr::reduce_with(ReduceOp::Max, BinaryOp::Add, Expr::Matrix(matrix("A")), vector("x")),
        ));
        assert_eq!(
            OperationKind::classify(&row_max),
            Ok(OperationKind::RowWiseReduction { transposed: false })
        );

        let row_sum = Operation::new(NumericType::Float).with(Statement::assign(
            vector("y"),
            Expr::reduce(ReduceOp::Add, Expr::Matrix(matrix("A"))),
        ));
        assert_eq!(
            OperationKind::classify(&row_sum),
            Ok(OperationKind::RowWiseReduction { transposed: false })
        );

        let gemm = Operation::new(NumericType::Float).with(Statement::assign(
            Expr::Matrix(matrix("C")),
            Expr::prod(Expr::Matrix(matrix("A")), Expr::Matrix(matrix("B").transposed())),
        ));
        assert_eq!(
            OperationKind::classify(&gemm),
            Ok(OperationKind::MatrixProduct {
                lhs_transposed: false,
                rhs_transposed: true
            })
        );
    }

    #[test]
    fn test_classify_rejects() {
        assert_eq!(
            OperationKind::classify(&Operation::new(NumericType::Float)),
            Err(GenError::EmptyOperation)
        );
        let bad = Operation::new(NumericType::Float).with(Statement::assign(
            vector("y"),
            Expr::prod(vector("x"), vector("z")),
        ));
        assert!(matches!(
            OperationKind::classify(&bad),
            Err(GenError::Unclassifiable { .. })
        ));
    }

    #[test]
    fn test_products_do_not_nest() {
        let inner = Expr::prod(vector("x"), vector("y"));
        let outer = Expr::add(Expr::reduce(ReduceOp::Add, inner.clone()), inner);
        assert_eq!(outer.products().len(), 2);
    }

    #[test]
    fn test_operation_json() {
        let json = r#"{
            "numeric_type": "float",
            "statements": [{
                "target": { "node": "vector", "name": "y", "size": "N" },
                "value": {
                    "node": "product",
                    "lhs": { "node": "matrix", "name": "A", "rows": "M", "cols": "N",
                             "internal_rows": "M", "internal_cols": 64 },
                    "rhs": { "node": "vector", "name": "x", "size": "N" }
                }
            }]
        }"#;
        let op = Operation::from_json(json).expect("valid operation");
        assert_eq!(op.statements.len(), 1);
        let products = op.statements[0].value.products();
        assert_eq!(products.len(), 1);
        assert!(products[0].is_plain_product());
        let a = products[0].matrix().expect("matrix operand");
        assert_eq!(a.internal_cols, Dim::Const(64));
    }
}
