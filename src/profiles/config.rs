//! Profile overrides loaded from TOML
//!
//! ```toml
//! [[vector_axpy]]
//! vendor = "nvidia"
//! class = "gpu"
//! architecture = "kepler"
//! numeric_type = "float"
//! params = { simd_width = 4, local_size_0 = 256, num_groups = 512, strided = true }
//! ```

use super::params::{
    MatrixAxpyParams, MatrixProductParams, ParameterRecord, ReductionParams, RowWiseParams,
    VectorAxpyParams,
};
use super::store::ProfileKey;
use super::ProfileTable;
use crate::device::{Architecture, DeviceClass, NumericType, VendorId};
use crate::diagnostics::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One override row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileEntry<P> {
    pub vendor: VendorId,
    pub class: DeviceClass,
    #[serde(default)]
    pub architecture: Architecture,
    #[serde(default)]
    pub name: String,
    pub numeric_type: NumericType,
    pub params: P,
}

impl<P> ProfileEntry<P> {
    pub fn key(&self) -> ProfileKey {
        ProfileKey::new(
            self.vendor,
            self.class,
            self.architecture,
            self.name.clone(),
            self.numeric_type,
        )
    }
}

/// Override rows for every table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProfilesConfig {
    pub vector_axpy: Vec<ProfileEntry<VectorAxpyParams>>,
    pub matrix_axpy: Vec<ProfileEntry<MatrixAxpyParams>>,
    pub reduction: Vec<ProfileEntry<ReductionParams>>,
    pub row_wise_reduction: Vec<ProfileEntry<RowWiseParams>>,
    pub trans_row_wise_reduction: Vec<ProfileEntry<RowWiseParams>>,
    pub matrix_vector: Vec<ProfileEntry<RowWiseParams>>,
    pub matrix_product_nn: Vec<ProfileEntry<MatrixProductParams>>,
    pub matrix_product_nt: Vec<ProfileEntry<MatrixProductParams>>,
    pub matrix_product_tn: Vec<ProfileEntry<MatrixProductParams>>,
    pub matrix_product_tt: Vec<ProfileEntry<MatrixProductParams>>,
}

fn check<P: ParameterRecord>(table: ProfileTable, entries: &[ProfileEntry<P>]) -> Result<(), ConfigError> {
    for entry in entries {
        entry.params.validate().map_err(|reason| ConfigError::InvalidParams {
            table: table.name(),
            key: entry.key().to_string(),
            reason,
        })?;
    }
    Ok(())
}

impl ProfilesConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: ProfilesConfig = toml::from_str(source)?;
        config.validate()?;
        tracing::debug!("loaded {} profile overrides", config.len());
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Check every record's internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check(ProfileTable::VectorAxpy, &self.vector_axpy)?;
        check(ProfileTable::MatrixAxpy, &self.matrix_axpy)?;
        check(ProfileTable::Reduction, &self.reduction)?;
        check(ProfileTable::RowWiseReduction, &self.row_wise_reduction)?;
        check(ProfileTable::TransRowWiseReduction, &self.trans_row_wise_reduction)?;
        check(ProfileTable::MatrixVector, &self.matrix_vector)?;
        check(ProfileTable::MatrixProductNN, &self.matrix_product_nn)?;
        check(ProfileTable::MatrixProductNT, &self.matrix_product_nt)?;
        check(ProfileTable::MatrixProductTN, &self.matrix_product_tn)?;
        check(ProfileTable::MatrixProductTT, &self.matrix_product_tt)
    }

    /// Number of rows across all tables
    pub fn len(&self) -> usize {
        self.vector_axpy.len()
            + self.matrix_axpy.len()
            + self.reduction.len()
            + self.row_wise_reduction.len()
            + self.trans_row_wise_reduction.len()
            + self.matrix_vector.len()
            + self.matrix_product_nn.len()
            + self.matrix_product_nt.len()
            + self.matrix_product_tn.len()
            + self.matrix_product_tt.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_defaults() {
        let config = ProfilesConfig::from_toml_str(
            r#"
            [[reduction]]
            vendor = 4318
            class = "gpu"
            numeric_type = "double"
            params = { simd_width = 2, local_size_0 = 256, num_groups = 64, strided = false }
            "#,
        )
        .expect("valid config");
        let entry = &config.reduction[0];
        assert_eq!(entry.vendor, VendorId::NVIDIA);
        assert_eq!(entry.architecture, Architecture::Unknown);
        assert_eq!(entry.name, "");
        assert_eq!(config.len(), 1);
    }

    #[test]
    fn test_empty_document() {
        assert!(ProfilesConfig::from_toml_str("").expect("empty is valid").is_empty());
    }
}
