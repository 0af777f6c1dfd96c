//! Tuned parameter records, one per operation kind

use serde::{Deserialize, Serialize};
use std::fmt;

/// A tuned record stored in a profile table
pub trait ParameterRecord: Copy + PartialEq + fmt::Debug + fmt::Display + Send + Sync {
    /// Check internal consistency. Called when records are loaded from
    /// configuration; generators assume it holds.
    fn validate(&self) -> Result<(), String>;
}

fn positive(fields: &[(&str, u32)]) -> Result<(), String> {
    match fields.iter().find(|(_, value)| *value == 0) {
        Some((name, _)) => Err(format!("`{}` must be positive", name)),
        None => Ok(()),
    }
}

fn simd(width: u32) -> Result<(), String> {
    match width {
        1 | 2 | 4 | 8 | 16 => Ok(()),
        _ => Err(format!("`simd_width` {} is not a vector width", width)),
    }
}

fn decomposition(strided: bool) -> char {
    if strided { 'S' } else { 'C' }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VectorAxpyParams {
    pub simd_width: u32,
    pub local_size_0: u32,
    pub num_groups: u32,
    /// Grid-stride loop instead of contiguous chunks
    pub strided: bool,
}

impl VectorAxpyParams {
    pub const fn new(simd_width: u32, local_size_0: u32, num_groups: u32, strided: bool) -> Self {
        Self {
            simd_width,
            local_size_0,
            num_groups,
            strided,
        }
    }
}

impl fmt::Display for VectorAxpyParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "V{}L{}G{}{}",
            self.simd_width,
            self.local_size_0,
            self.num_groups,
            decomposition(self.strided)
        )
    }
}

impl ParameterRecord for VectorAxpyParams {
    fn validate(&self) -> Result<(), String> {
        simd(self.simd_width)?;
        positive(&[
            ("local_size_0", self.local_size_0),
            ("num_groups", self.num_groups),
        ])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatrixAxpyParams {
    pub simd_width: u32,
    pub local_size_0: u32,
    pub local_size_1: u32,
    pub num_groups_0: u32,
    pub num_groups_1: u32,
    pub strided: bool,
}

impl MatrixAxpyParams {
    pub const fn new(
        simd_width: u32,
        local_size_0: u32,
        local_size_1: u32,
        num_groups_0: u32,
        num_groups_1: u32,
        strided: bool,
    ) -> Self {
        Self {
            simd_width,
            local_size_0,
            local_size_1,
            num_groups_0,
            num_groups_1,
            strided,
        }
    }
}

impl fmt::Display for MatrixAxpyParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "V{}L{}x{}G{}x{}{}",
            self.simd_width,
            self.local_size_0,
            self.local_size_1,
            self.num_groups_0,
            self.num_groups_1,
            decomposition(self.strided)
        )
    }
}

impl ParameterRecord for MatrixAxpyParams {
    fn validate(&self) -> Result<(), String> {
        simd(self.simd_width)?;
        positive(&[
            ("local_size_0", self.local_size_0),
            ("local_size_1", self.local_size_1),
            ("num_groups_0", self.num_groups_0),
            ("num_groups_1", self.num_groups_1),
        ])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReductionParams {
    pub simd_width: u32,
    pub local_size_0: u32,
    pub num_groups: u32,
    pub strided: bool,
}

impl ReductionParams {
    pub const fn new(simd_width: u32, local_size_0: u32, num_groups: u32, strided: bool) -> Self {
        Self {
            simd_width,
            local_size_0,
            num_groups,
            strided,
        }
    }
}

impl fmt::Display for ReductionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "V{}L{}G{}{}",
            self.simd_width,
            self.local_size_0,
            self.num_groups,
            decomposition(self.strided)
        )
    }
}

impl ParameterRecord for ReductionParams {
    fn validate(&self) -> Result<(), String> {
        simd(self.simd_width)?;
        positive(&[
            ("local_size_0", self.local_size_0),
            ("num_groups", self.num_groups),
        ])
    }
}

/// Row-wise reductions and matrix-vector products
///
/// Dimension 0 of the work-group spans output elements, dimension 1
/// splits each inner reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RowWiseParams {
    pub simd_width: u32,
    pub local_size_0: u32,
    pub local_size_1: u32,
    pub num_groups_0: u32,
}

impl RowWiseParams {
    pub const fn new(simd_width: u32, local_size_0: u32, local_size_1: u32, num_groups_0: u32) -> Self {
        Self {
            simd_width,
            local_size_0,
            local_size_1,
            num_groups_0,
        }
    }
}

impl fmt::Display for RowWiseParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "V{}M{}K{}NG0{}",
            self.simd_width, self.local_size_0, self.local_size_1, self.num_groups_0
        )
    }
}

impl ParameterRecord for RowWiseParams {
    fn validate(&self) -> Result<(), String> {
        simd(self.simd_width)?;
        positive(&[
            ("local_size_0", self.local_size_0),
            ("local_size_1", self.local_size_1),
            ("num_groups_0", self.num_groups_0),
        ])
    }
}

/// Blocked matrix-matrix product
///
/// A work-group computes a `(local_size_0 * ms) x (local_size_1 * ns)`
/// tile of the result, walking the shared dimension `kl` at a time. Each
/// worker owns an `ms x ns` register block and advances `ks` per step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatrixProductParams {
    pub simd_width: u32,
    pub local_size_0: u32,
    pub kl: u32,
    pub local_size_1: u32,
    pub ms: u32,
    pub ks: u32,
    pub ns: u32,
    /// Stage lhs tiles through local memory
    pub use_lhs_local: bool,
    /// Stage rhs tiles through local memory
    pub use_rhs_local: bool,
    pub local_fetch_0: u32,
    pub local_fetch_1: u32,
}

impl MatrixProductParams {
    #[allow(clippy::too_many_arguments)]
    pub const fn new(
        simd_width: u32,
        local_size_0: u32,
        kl: u32,
        local_size_1: u32,
        ms: u32,
        ks: u32,
        ns: u32,
        use_lhs_local: bool,
        use_rhs_local: bool,
        local_fetch_0: u32,
        local_fetch_1: u32,
    ) -> Self {
        Self {
            simd_width,
            local_size_0,
            kl,
            local_size_1,
            ms,
            ks,
            ns,
            use_lhs_local,
            use_rhs_local,
            local_fetch_0,
            local_fetch_1,
        }
    }

    /// Rows of the result tile owned by a work-group
    pub fn tile_rows(&self) -> u32 {
        self.local_size_0 * self.ms
    }

    /// Columns of the result tile owned by a work-group
    pub fn tile_cols(&self) -> u32 {
        self.local_size_1 * self.ns
    }
}

impl fmt::Display for MatrixProductParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "V{}L{}x{}KL{}M{}K{}N{}{}{}F{}x{}",
            self.simd_width,
            self.local_size_0,
            self.local_size_1,
            self.kl,
            self.ms,
            self.ks,
            self.ns,
            if self.use_lhs_local { "A" } else { "" },
            if self.use_rhs_local { "B" } else { "" },
            self.local_fetch_0,
            self.local_fetch_1
        )
    }
}

impl ParameterRecord for MatrixProductParams {
    fn validate(&self) -> Result<(), String> {
        simd(self.simd_width)?;
        positive(&[
            ("local_size_0", self.local_size_0),
            ("local_size_1", self.local_size_1),
            ("kl", self.kl),
            ("ms", self.ms),
            ("ks", self.ks),
            ("ns", self.ns),
            ("local_fetch_0", self.local_fetch_0),
            ("local_fetch_1", self.local_fetch_1),
        ])?;
        if self.kl % self.ks != 0 {
            return Err(format!("`ks` {} must divide `kl` {}", self.ks, self.kl));
        }
        let workers = self.local_size_0 * self.local_size_1;
        if (self.use_lhs_local || self.use_rhs_local)
            && self.local_fetch_0 * self.local_fetch_1 != workers
        {
            return Err(format!(
                "fetch shape {}x{} must cover the {} workers of a group",
                self.local_fetch_0, self.local_fetch_1, workers
            ));
        }
        Ok(())
    }
}
