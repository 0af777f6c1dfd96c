//! Matrix-vector products, `y = f(op(A) * x)`

use super::row_wise::emit;
use super::{GeneratedProgram, KernelGenerator};
use crate::diagnostics::GenError;
use crate::ops::{Operation, OperationKind};
use crate::profiles::RowWiseParams;

pub struct MatrixVectorGenerator {
    params: RowWiseParams,
    transposed: bool,
}

impl MatrixVectorGenerator {
    pub fn new(params: RowWiseParams, transposed: bool) -> Self {
        Self { params, transposed }
    }
}

impl KernelGenerator for MatrixVectorGenerator {
    fn kind(&self) -> OperationKind {
        OperationKind::MatrixVector {
            transposed: self.transposed,
        }
    }

    fn profile(&self) -> String {
        self.params.to_string()
    }

    fn generate(&self, operation: &Operation) -> Result<GeneratedProgram, GenError> {
        let kind = self.kind();
        emit(kind, &self.params, self.transposed, operation, |index, product| {
            if !product.is_plain_product() {
                return Err(GenError::ProductShape {
                    kind,
                    statement: index,
                    reason: "matrix-vector kernels need `combine = mul` and `reduce = add`"
                        .to_string(),
                });
            }
            if product.rhs.is_none() {
                return Err(GenError::ProductShape {
                    kind,
                    statement: index,
                    reason: "the product has no vector operand".to_string(),
                });
            }
            Ok(())
        })
    }
}
