//! Profile store
//!
//! One immutable table per operation kind, built once at startup and
//! passed by reference to every resolution.
//!
//! ```text
//! builtin() → ProfilesBuilder → apply(overrides) → build() → Profiles
//! ```

pub mod builtin;
pub mod config;
pub mod params;
pub mod store;

pub use config::{ProfileEntry, ProfilesConfig};
pub use params::{
    MatrixAxpyParams, MatrixProductParams, ParameterRecord, ReductionParams, RowWiseParams,
    VectorAxpyParams,
};
pub use store::{ProfileKey, ProfileStore, ProfileStoreBuilder, ResolvedFrom};

use crate::device::DeviceDescriptor;
use crate::diagnostics::StoreError;
use crate::ops::OperationKind;
use std::fmt;
use std::str::FromStr;

/// Name of a profile table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileTable {
    VectorAxpy,
    MatrixAxpy,
    Reduction,
    RowWiseReduction,
    TransRowWiseReduction,
    MatrixVector,
    MatrixProductNN,
    MatrixProductNT,
    MatrixProductTN,
    MatrixProductTT,
}

impl ProfileTable {
    pub const ALL: [ProfileTable; 10] = [
        ProfileTable::VectorAxpy,
        ProfileTable::MatrixAxpy,
        ProfileTable::Reduction,
        ProfileTable::RowWiseReduction,
        ProfileTable::TransRowWiseReduction,
        ProfileTable::MatrixVector,
        ProfileTable::MatrixProductNN,
        ProfileTable::MatrixProductNT,
        ProfileTable::MatrixProductTN,
        ProfileTable::MatrixProductTT,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ProfileTable::VectorAxpy => "vector_axpy",
            ProfileTable::MatrixAxpy => "matrix_axpy",
            ProfileTable::Reduction => "reduction",
            ProfileTable::RowWiseReduction => "row_wise_reduction",
            ProfileTable::TransRowWiseReduction => "trans_row_wise_reduction",
            ProfileTable::MatrixVector => "matrix_vector",
            ProfileTable::MatrixProductNN => "matrix_product_nn",
            ProfileTable::MatrixProductNT => "matrix_product_nt",
            ProfileTable::MatrixProductTN => "matrix_product_tn",
            ProfileTable::MatrixProductTT => "matrix_product_tt",
        }
    }

    /// Table holding the records for `kind`
    pub fn for_kind(kind: OperationKind) -> ProfileTable {
        match kind {
            OperationKind::VectorAxpy => ProfileTable::VectorAxpy,
            OperationKind::MatrixAxpy => ProfileTable::MatrixAxpy,
            OperationKind::Reduction => ProfileTable::Reduction,
            OperationKind::RowWiseReduction { transposed: false } => ProfileTable::RowWiseReduction,
            OperationKind::RowWiseReduction { transposed: true } => {
                ProfileTable::TransRowWiseReduction
            }
            OperationKind::MatrixVector { .. } => ProfileTable::MatrixVector,
            OperationKind::MatrixProduct {
                lhs_transposed,
                rhs_transposed,
            } => match (lhs_transposed, rhs_transposed) {
                (false, false) => ProfileTable::MatrixProductNN,
                (false, true) => ProfileTable::MatrixProductNT,
                (true, false) => ProfileTable::MatrixProductTN,
                (true, true) => ProfileTable::MatrixProductTT,
            },
        }
    }
}

impl fmt::Display for ProfileTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProfileTable {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        ProfileTable::ALL
            .into_iter()
            .find(|table| table.name() == normalized)
            .ok_or_else(|| format!("unknown profile table `{}`", s))
    }
}

/// A resolved record of any table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnyParams {
    VectorAxpy(VectorAxpyParams),
    MatrixAxpy(MatrixAxpyParams),
    Reduction(ReductionParams),
    RowWise(RowWiseParams),
    MatrixProduct(MatrixProductParams),
}

impl fmt::Display for AnyParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnyParams::VectorAxpy(p) => write!(f, "{} {:?}", p, p),
            AnyParams::MatrixAxpy(p) => write!(f, "{} {:?}", p, p),
            AnyParams::Reduction(p) => write!(f, "{} {:?}", p, p),
            AnyParams::RowWise(p) => write!(f, "{} {:?}", p, p),
            AnyParams::MatrixProduct(p) => write!(f, "{} {:?}", p, p),
        }
    }
}

/// Builders for every table
#[derive(Debug, Clone)]
pub struct ProfilesBuilder {
    pub vector_axpy: ProfileStoreBuilder<VectorAxpyParams>,
    pub matrix_axpy: ProfileStoreBuilder<MatrixAxpyParams>,
    pub reduction: ProfileStoreBuilder<ReductionParams>,
    pub row_wise_reduction: ProfileStoreBuilder<RowWiseParams>,
    pub trans_row_wise_reduction: ProfileStoreBuilder<RowWiseParams>,
    pub matrix_vector: ProfileStoreBuilder<RowWiseParams>,
    pub matrix_product_nn: ProfileStoreBuilder<MatrixProductParams>,
    pub matrix_product_nt: ProfileStoreBuilder<MatrixProductParams>,
    pub matrix_product_tn: ProfileStoreBuilder<MatrixProductParams>,
    pub matrix_product_tt: ProfileStoreBuilder<MatrixProductParams>,
}

impl ProfilesBuilder {
    /// Register every entry of `config` on top of what is already present.
    pub fn apply(mut self, config: ProfilesConfig) -> Self {
        fn extend<P: ParameterRecord>(builder: &mut ProfileStoreBuilder<P>, entries: Vec<ProfileEntry<P>>) {
            for entry in entries {
                let key = entry.key();
                builder.insert(key, entry.params);
            }
        }

        extend(&mut self.vector_axpy, config.vector_axpy);
        extend(&mut self.matrix_axpy, config.matrix_axpy);
        extend(&mut self.reduction, config.reduction);
        extend(&mut self.row_wise_reduction, config.row_wise_reduction);
        extend(&mut self.trans_row_wise_reduction, config.trans_row_wise_reduction);
        extend(&mut self.matrix_vector, config.matrix_vector);
        extend(&mut self.matrix_product_nn, config.matrix_product_nn);
        extend(&mut self.matrix_product_nt, config.matrix_product_nt);
        extend(&mut self.matrix_product_tn, config.matrix_product_tn);
        extend(&mut self.matrix_product_tt, config.matrix_product_tt);
        self
    }

    /// Freeze every table, failing on the first incomplete one.
    pub fn build(self) -> Result<Profiles, StoreError> {
        Ok(Profiles {
            vector_axpy: self.vector_axpy.build(ProfileTable::VectorAxpy.name())?,
            matrix_axpy: self.matrix_axpy.build(ProfileTable::MatrixAxpy.name())?,
            reduction: self.reduction.build(ProfileTable::Reduction.name())?,
            row_wise_reduction: self
                .row_wise_reduction
                .build(ProfileTable::RowWiseReduction.name())?,
            trans_row_wise_reduction: self
                .trans_row_wise_reduction
                .build(ProfileTable::TransRowWiseReduction.name())?,
            matrix_vector: self.matrix_vector.build(ProfileTable::MatrixVector.name())?,
            matrix_product_nn: self
                .matrix_product_nn
                .build(ProfileTable::MatrixProductNN.name())?,
            matrix_product_nt: self
                .matrix_product_nt
                .build(ProfileTable::MatrixProductNT.name())?,
            matrix_product_tn: self
                .matrix_product_tn
                .build(ProfileTable::MatrixProductTN.name())?,
            matrix_product_tt: self
                .matrix_product_tt
                .build(ProfileTable::MatrixProductTT.name())?,
        })
    }
}

/// Every profile table, read-only
#[derive(Debug, Clone)]
pub struct Profiles {
    pub vector_axpy: ProfileStore<VectorAxpyParams>,
    pub matrix_axpy: ProfileStore<MatrixAxpyParams>,
    pub reduction: ProfileStore<ReductionParams>,
    pub row_wise_reduction: ProfileStore<RowWiseParams>,
    pub trans_row_wise_reduction: ProfileStore<RowWiseParams>,
    pub matrix_vector: ProfileStore<RowWiseParams>,
    pub matrix_product_nn: ProfileStore<MatrixProductParams>,
    pub matrix_product_nt: ProfileStore<MatrixProductParams>,
    pub matrix_product_tn: ProfileStore<MatrixProductParams>,
    pub matrix_product_tt: ProfileStore<MatrixProductParams>,
}

impl Profiles {
    /// Builder preloaded with the builtin database
    pub fn builder() -> ProfilesBuilder {
        builtin::builtin()
    }

    /// The builtin database
    pub fn builtin() -> Result<Profiles, StoreError> {
        Self::builder().build()
    }

    /// Matrix-product table for the given operand transpositions
    pub fn matrix_product(&self, lhs_transposed: bool, rhs_transposed: bool) -> &ProfileStore<MatrixProductParams> {
        match (lhs_transposed, rhs_transposed) {
            (false, false) => &self.matrix_product_nn,
            (false, true) => &self.matrix_product_nt,
            (true, false) => &self.matrix_product_tn,
            (true, true) => &self.matrix_product_tt,
        }
    }

    /// Resolve `device` in any table
    pub fn resolve_table(&self, table: ProfileTable, device: &DeviceDescriptor) -> (AnyParams, ResolvedFrom) {
        match table {
            ProfileTable::VectorAxpy => {
                let (p, from) = self.vector_axpy.resolve_with_source(device);
                (AnyParams::VectorAxpy(*p), from)
            }
            ProfileTable::MatrixAxpy => {
                let (p, from) = self.matrix_axpy.resolve_with_source(device);
                (AnyParams::MatrixAxpy(*p), from)
            }
            ProfileTable::Reduction => {
                let (p, from) = self.reduction.resolve_with_source(device);
                (AnyParams::Reduction(*p), from)
            }
            ProfileTable::RowWiseReduction => {
                let (p, from) = self.row_wise_reduction.resolve_with_source(device);
                (AnyParams::RowWise(*p), from)
            }
            ProfileTable::TransRowWiseReduction => {
                let (p, from) = self.trans_row_wise_reduction.resolve_with_source(device);
                (AnyParams::RowWise(*p), from)
            }
            ProfileTable::MatrixVector => {
                let (p, from) = self.matrix_vector.resolve_with_source(device);
                (AnyParams::RowWise(*p), from)
            }
            ProfileTable::MatrixProductNN => {
                let (p, from) = self.matrix_product_nn.resolve_with_source(device);
                (AnyParams::MatrixProduct(*p), from)
            }
            ProfileTable::MatrixProductNT => {
                let (p, from) = self.matrix_product_nt.resolve_with_source(device);
                (AnyParams::MatrixProduct(*p), from)
            }
            ProfileTable::MatrixProductTN => {
                let (p, from) = self.matrix_product_tn.resolve_with_source(device);
                (AnyParams::MatrixProduct(*p), from)
            }
            ProfileTable::MatrixProductTT => {
                let (p, from) = self.matrix_product_tt.resolve_with_source(device);
                (AnyParams::MatrixProduct(*p), from)
            }
        }
    }

    /// Resolve the record an operation of `kind` would use
    pub fn resolve_for(&self, kind: OperationKind, device: &DeviceDescriptor) -> AnyParams {
        self.resolve_table(ProfileTable::for_kind(kind), device).0
    }

    /// `(key, record)` pairs of one table, rendered for listing
    pub fn listing(&self, table: ProfileTable) -> Vec<(ProfileKey, String)> {
        fn render<P: ParameterRecord>(store: &ProfileStore<P>) -> Vec<(ProfileKey, String)> {
            store
                .entries()
                .map(|(key, params)| (key, format!("{} {:?}", params, params)))
                .collect()
        }

        match table {
            ProfileTable::VectorAxpy => render(&self.vector_axpy),
            ProfileTable::MatrixAxpy => render(&self.matrix_axpy),
            ProfileTable::Reduction => render(&self.reduction),
            ProfileTable::RowWiseReduction => render(&self.row_wise_reduction),
            ProfileTable::TransRowWiseReduction => render(&self.trans_row_wise_reduction),
            ProfileTable::MatrixVector => render(&self.matrix_vector),
            ProfileTable::MatrixProductNN => render(&self.matrix_product_nn),
            ProfileTable::MatrixProductNT => render(&self.matrix_product_nt),
            ProfileTable::MatrixProductTN => render(&self.matrix_product_tn),
            ProfileTable::MatrixProductTT => render(&self.matrix_product_tt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Architecture, DeviceClass, NumericType, VendorId};

    #[test]
    fn test_builtin_builds() {
        let profiles = Profiles::builtin().expect("builtin database is complete");
        let device = DeviceDescriptor::unknown(DeviceClass::Gpu, NumericType::Float);
        assert_eq!(
            profiles.vector_axpy.resolve(&device),
            &VectorAxpyParams::new(1, 128, 128, true)
        );
        assert!(profiles.matrix_product(false, true).resolve(&device).use_rhs_local);
        assert!(!profiles.matrix_product(false, false).resolve(&device).use_rhs_local);
    }

    #[test]
    fn test_table_names_parse() {
        for table in ProfileTable::ALL {
            assert_eq!(table.name().parse::<ProfileTable>(), Ok(table));
        }
        assert_eq!("matrix-product-tn".parse(), Ok(ProfileTable::MatrixProductTN));
        assert!("gemm".parse::<ProfileTable>().is_err());
    }

    #[test]
    fn test_resolve_for_kind() {
        let profiles = Profiles::builtin().expect("builtin database is complete");
        let fermi = DeviceDescriptor::new(VendorId::NVIDIA, DeviceClass::Gpu, NumericType::Float)
            .with_architecture(Architecture::Fermi);
        assert_eq!(
            profiles.resolve_for(OperationKind::RowWiseReduction { transposed: true }, &fermi),
            AnyParams::RowWise(RowWiseParams::new(1, 1, 256, 2048))
        );
        assert_eq!(
            profiles.resolve_for(OperationKind::MatrixVector { transposed: true }, &fermi),
            AnyParams::RowWise(RowWiseParams::new(1, 32, 32, 1024))
        );
    }

    #[test]
    fn test_profiles_are_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Profiles>();
    }
}
