//! Builtin tuning database
//!
//! Global defaults cover every device class and element type. Tuned
//! entries exist for single precision on NVIDIA Fermi and AMD Volcanic
//! Islands GPUs.

use super::params::{
    MatrixAxpyParams, MatrixProductParams, ReductionParams, RowWiseParams, VectorAxpyParams,
};
use super::store::{ProfileKey, ProfileStoreBuilder};
use super::ProfilesBuilder;
use crate::device::{Architecture, DeviceClass, NumericType, VendorId};

fn gpu(vendor: VendorId, architecture: Architecture) -> ProfileKey {
    ProfileKey::new(vendor, DeviceClass::Gpu, architecture, "", NumericType::Float)
}

fn fermi() -> ProfileKey {
    gpu(VendorId::NVIDIA, Architecture::Fermi)
}

fn volcanic_islands() -> ProfileKey {
    gpu(VendorId::AMD, Architecture::VolcanicIslands)
}

const GEMM_DEFAULT: MatrixProductParams =
    MatrixProductParams::new(1, 8, 8, 8, 4, 4, 4, true, false, 8, 8);

fn vector_axpy() -> ProfileStoreBuilder<VectorAxpyParams> {
    ProfileStoreBuilder::new()
        .defaults(VectorAxpyParams::new(1, 128, 128, true))
        .entry(fermi(), VectorAxpyParams::new(1, 1024, 2048, true))
        .entry(volcanic_islands(), VectorAxpyParams::new(1, 128, 512, false))
}

fn matrix_axpy() -> ProfileStoreBuilder<MatrixAxpyParams> {
    ProfileStoreBuilder::new().defaults(MatrixAxpyParams::new(1, 8, 8, 8, 8, true))
}

fn reduction() -> ProfileStoreBuilder<ReductionParams> {
    ProfileStoreBuilder::new().defaults(ReductionParams::new(1, 128, 128, true))
}

fn row_wise_reduction() -> ProfileStoreBuilder<RowWiseParams> {
    ProfileStoreBuilder::new()
        .defaults(RowWiseParams::new(1, 8, 8, 1))
        .entry(fermi(), RowWiseParams::new(1, 1, 256, 2048))
        .entry(volcanic_islands(), RowWiseParams::new(1, 2, 128, 256))
}

fn trans_row_wise_reduction() -> ProfileStoreBuilder<RowWiseParams> {
    ProfileStoreBuilder::new()
        .defaults(RowWiseParams::new(1, 8, 8, 1))
        .entry(fermi(), RowWiseParams::new(1, 1, 256, 2048))
        .entry(volcanic_islands(), RowWiseParams::new(1, 1, 64, 1024))
}

fn matrix_vector() -> ProfileStoreBuilder<RowWiseParams> {
    ProfileStoreBuilder::new().defaults(RowWiseParams::new(1, 32, 32, 1024))
}

fn matrix_product_nn() -> ProfileStoreBuilder<MatrixProductParams> {
    ProfileStoreBuilder::new()
        .defaults(GEMM_DEFAULT)
        .entry(
            fermi(),
            MatrixProductParams::new(1, 16, 16, 8, 4, 1, 8, true, true, 16, 8),
        )
        .entry(
            volcanic_islands(),
            MatrixProductParams::new(1, 8, 16, 16, 8, 1, 4, true, true, 16, 8),
        )
}

fn matrix_product_nt() -> ProfileStoreBuilder<MatrixProductParams> {
    ProfileStoreBuilder::new()
        .defaults(GEMM_DEFAULT)
        .entry(
            ProfileKey::global_default(DeviceClass::Gpu, NumericType::Float),
            MatrixProductParams::new(1, 8, 8, 8, 4, 4, 4, true, true, 8, 8),
        )
        .entry(
            fermi(),
            MatrixProductParams::new(1, 16, 16, 8, 4, 1, 8, true, true, 32, 4),
        )
}

fn matrix_product_tn() -> ProfileStoreBuilder<MatrixProductParams> {
    ProfileStoreBuilder::new()
        .defaults(GEMM_DEFAULT)
        .entry(
            fermi(),
            MatrixProductParams::new(1, 16, 16, 8, 4, 1, 8, true, true, 16, 8),
        )
        .entry(
            volcanic_islands(),
            MatrixProductParams::new(1, 16, 16, 16, 8, 1, 4, true, true, 16, 16),
        )
}

fn matrix_product_tt() -> ProfileStoreBuilder<MatrixProductParams> {
    ProfileStoreBuilder::new()
        .defaults(GEMM_DEFAULT)
        .entry(
            fermi(),
            MatrixProductParams::new(1, 16, 16, 16, 4, 1, 8, true, true, 16, 16),
        )
        .entry(
            volcanic_islands(),
            MatrixProductParams::new(1, 16, 16, 16, 4, 1, 8, true, true, 16, 16),
        )
}

/// Builders for every table, populated with the builtin entries
pub fn builtin() -> ProfilesBuilder {
    ProfilesBuilder {
        vector_axpy: vector_axpy(),
        matrix_axpy: matrix_axpy(),
        reduction: reduction(),
        row_wise_reduction: row_wise_reduction(),
        trans_row_wise_reduction: trans_row_wise_reduction(),
        matrix_vector: matrix_vector(),
        matrix_product_nn: matrix_product_nn(),
        matrix_product_nt: matrix_product_nt(),
        matrix_product_tn: matrix_product_tn(),
        matrix_product_tt: matrix_product_tt(),
    }
}
