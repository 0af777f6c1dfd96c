//! Building blocks shared by the generators
//!
//! Loops open a brace block and leave it to the caller to close.

use super::stream::KernelStream;
use crate::ops::ReduceOp;

pub const LOCAL_BARRIER: &str = "barrier(CLK_LOCAL_MEM_FENCE);";

/// Work-group scratch buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalMemory {
    pub name: String,
    pub element: String,
    pub dims: Vec<u32>,
}

impl LocalMemory {
    pub fn new(name: impl Into<String>, element: impl Into<String>, dims: &[u32]) -> Self {
        Self {
            name: name.into(),
            element: element.into(),
            dims: dims.to_vec(),
        }
    }

    /// `__local float buf[16][17];`
    pub fn declare(&self) -> String {
        let extents: String = self.dims.iter().map(|d| format!("[{}]", d)).collect();
        format!("__local {} {}{};", self.element, self.name, extents)
    }

    pub fn access(&self, indices: &[&str]) -> String {
        let subscripts: String = indices.iter().map(|i| format!("[{}]", i)).collect();
        format!("{}{}", self.name, subscripts)
    }

    pub fn elements(&self) -> u64 {
        self.dims.iter().map(|&d| d as u64).product()
    }

    pub fn size_bytes(&self, element_size: u64) -> u64 {
        self.elements() * element_size
    }
}

/// `for (i = get_global_id(d); i < bound; i += get_global_size(d))`
pub fn grid_stride_loop(stream: &mut KernelStream, var: &str, dim: u32, bound: &str) {
    stream.open(format!(
        "for (unsigned int {var} = get_global_id({dim}); {var} < {bound}; {var} += get_global_size({dim}))"
    ));
}

/// Each worker walks one contiguous chunk of `[0, bound)`.
pub fn chunked_loop(stream: &mut KernelStream, var: &str, dim: u32, bound: &str) {
    stream.line(format!(
        "unsigned int {var}_chunk = ({bound} + get_global_size({dim}) - 1) / get_global_size({dim});"
    ));
    stream.line(format!(
        "unsigned int {var}_start = get_global_id({dim}) * {var}_chunk;"
    ));
    stream.line(format!(
        "unsigned int {var}_stop = min({var}_start + {var}_chunk, (unsigned int)({bound}));"
    ));
    stream.open(format!(
        "for (unsigned int {var} = {var}_start; {var} < {var}_stop; ++{var})"
    ));
}

/// Loop whose trip count is the same for every worker of a group.
///
/// Declares `var = base + get_local_id(dim)`, which may exceed `bound`
/// on the last trip; the body must guard its accesses.
pub fn group_uniform_loop(stream: &mut KernelStream, var: &str, dim: u32, bound: &str) {
    stream.open(format!(
        "for (unsigned int {var}_base = get_group_id({dim}) * get_local_size({dim}); {var}_base < {bound}; {var}_base += get_global_size({dim}))"
    ));
    stream.line(format!(
        "unsigned int {var} = {var}_base + get_local_id({dim});"
    ));
}

/// Strides of a tree reduction over `extent` slots, largest first
pub fn reduction_strides(extent: u32) -> Vec<u32> {
    let mut strides = Vec::new();
    let mut stride = extent.max(1).next_power_of_two() / 2;
    while stride > 0 {
        strides.push(stride);
        stride /= 2;
    }
    strides
}

/// One scratch buffer folded by [`reduction_tree`]
#[derive(Debug, Clone, Copy)]
pub struct TreeOperand<'a> {
    pub buffer: &'a LocalMemory,
    pub op: ReduceOp,
}

/// Fold `extent` slots of every buffer into slot 0.
///
/// `prefix` selects the row of a multi-dimensional buffer, `lane` is the
/// worker's slot. Buffers share the barriers of each stage. Returns the
/// number of stages emitted.
pub fn reduction_tree(
    stream: &mut KernelStream,
    operands: &[TreeOperand<'_>],
    prefix: &[&str],
    lane: &str,
    extent: u32,
) -> usize {
    let strides = reduction_strides(extent);
    let exact = extent.is_power_of_two();

    for &stride in &strides {
        let partner = format!("{} + {}", lane, stride);
        stream.line(LOCAL_BARRIER);
        if exact {
            stream.open(format!("if ({} < {})", lane, stride));
        } else {
            stream.open(format!(
                "if ({} < {} && {} < {})",
                lane, stride, partner, extent
            ));
        }
        for operand in operands {
            let mut own: Vec<&str> = prefix.to_vec();
            own.push(lane);
            let mut other: Vec<&str> = prefix.to_vec();
            other.push(&partner);
            let slot = operand.buffer.access(&own);
            let value = operand.op.combine(&slot, &operand.buffer.access(&other));
            stream.line(format!("{} = {};", slot, value));
        }
        stream.close();
    }

    strides.len()
}

/// Slot holding the result of [`reduction_tree`]
pub fn tree_result(buffer: &LocalMemory, prefix: &[&str]) -> String {
    let mut indices: Vec<&str> = prefix.to_vec();
    indices.push("0");
    buffer.access(&indices)
}

/// OpenCL component selector for lane `index` of a vector value
pub fn component(index: u32) -> String {
    format!("s{:x}", index)
}
