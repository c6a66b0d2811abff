// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::math::{Mat4, UVec3};
use crate::renderer::api::ParamValue;
use bytemuck::Pod;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Identifies one work group of a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelInvocation {
    /// The group's coordinates within the dispatch grid.
    pub group_id: UVec3,
    /// The size of the dispatch grid.
    pub num_groups: UVec3,
}

impl KernelInvocation {
    /// Row-major linear index of the group within the grid.
    #[inline]
    pub fn linear_index(&self) -> u32 {
        self.group_id.x
            + self.group_id.y * self.num_groups.x
            + self.group_id.z * self.num_groups.x * self.num_groups.y
    }
}

/// An error raised by a kernel while it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    /// Nothing is bound at the storage binding point.
    MissingBinding(u32),
    /// The active program has no parameter with this name.
    MissingParam(String),
    /// A parameter exists but has a different type.
    ParamType {
        /// Parameter name.
        name: String,
        /// The type the kernel expected.
        expected: &'static str,
    },
    /// An access fell outside the bound buffer.
    OutOfBounds {
        /// The storage binding point.
        binding: u32,
        /// Byte offset of the access.
        offset: usize,
        /// Length of the access in bytes.
        len: usize,
        /// Size of the bound buffer in bytes.
        size: usize,
    },
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::MissingBinding(binding) => {
                write!(f, "No storage buffer bound at binding {binding}")
            }
            KernelError::MissingParam(name) => write!(f, "Missing shader parameter '{name}'"),
            KernelError::ParamType { name, expected } => {
                write!(f, "Shader parameter '{name}' is not a {expected}")
            }
            KernelError::OutOfBounds {
                binding,
                offset,
                len,
                size,
            } => write!(
                f,
                "Access of {len} bytes at offset {offset} overruns binding {binding} ({size} bytes)"
            ),
        }
    }
}

impl std::error::Error for KernelError {}

/// The state a kernel sees while executing one work group: the active program's
/// parameters and the storage buffers bound at dispatch time.
pub struct KernelContext<'a> {
    params: &'a HashMap<String, ParamValue>,
    storage: &'a mut BTreeMap<u32, Vec<u8>>,
}

impl<'a> KernelContext<'a> {
    /// Wraps the parameters and the bound storage, keyed by binding point.
    pub fn new(
        params: &'a HashMap<String, ParamValue>,
        storage: &'a mut BTreeMap<u32, Vec<u8>>,
    ) -> Self {
        Self { params, storage }
    }

    /// Looks up a parameter by name.
    pub fn param(&self, name: &str) -> Result<ParamValue, KernelError> {
        self.params
            .get(name)
            .copied()
            .ok_or_else(|| KernelError::MissingParam(name.to_owned()))
    }

    /// Looks up a matrix parameter by name.
    pub fn param_mat4(&self, name: &str) -> Result<Mat4, KernelError> {
        self.param(name)?
            .as_mat4()
            .ok_or_else(|| KernelError::ParamType {
                name: name.to_owned(),
                expected: "mat4",
            })
    }

    /// Raw bytes of the buffer bound at `binding`.
    pub fn storage(&self, binding: u32) -> Result<&[u8], KernelError> {
        self.storage
            .get(&binding)
            .map(Vec::as_slice)
            .ok_or(KernelError::MissingBinding(binding))
    }

    /// Mutable raw bytes of the buffer bound at `binding`.
    pub fn storage_mut(&mut self, binding: u32) -> Result<&mut [u8], KernelError> {
        self.storage
            .get_mut(&binding)
            .map(Vec::as_mut_slice)
            .ok_or(KernelError::MissingBinding(binding))
    }

    /// Reads `count` elements of type `T` starting at element `first`.
    pub fn read_slice<T: Pod>(
        &self,
        binding: u32,
        first: usize,
        count: usize,
    ) -> Result<Vec<T>, KernelError> {
        let bytes = self.storage(binding)?;
        let stride = std::mem::size_of::<T>();
        let range = checked_range(binding, first * stride, count * stride, bytes.len())?;
        Ok(bytes[range]
            .chunks_exact(stride)
            .map(bytemuck::pod_read_unaligned)
            .collect())
    }

    /// Reads the element of type `T` at element index `index`.
    pub fn read<T: Pod>(&self, binding: u32, index: usize) -> Result<T, KernelError> {
        let bytes = self.storage(binding)?;
        let stride = std::mem::size_of::<T>();
        let range = checked_range(binding, index * stride, stride, bytes.len())?;
        Ok(bytemuck::pod_read_unaligned(&bytes[range]))
    }

    /// Writes `values` starting at element index `first`.
    pub fn write_slice<T: Pod>(
        &mut self,
        binding: u32,
        first: usize,
        values: &[T],
    ) -> Result<(), KernelError> {
        let src: &[u8] = bytemuck::cast_slice(values);
        let bytes = self.storage_mut(binding)?;
        let offset = first * std::mem::size_of::<T>();
        let range = checked_range(binding, offset, src.len(), bytes.len())?;
        bytes[range].copy_from_slice(src);
        Ok(())
    }

    /// Adds `value` to the `u32` at `byte_offset` and returns the previous value.
    ///
    /// Work groups of a dispatch execute one at a time on CPU backends, so a
    /// plain read-modify-write has the semantics of a device atomic add.
    pub fn atomic_add_u32(
        &mut self,
        binding: u32,
        byte_offset: usize,
        value: u32,
    ) -> Result<u32, KernelError> {
        let bytes = self.storage_mut(binding)?;
        let range = checked_range(binding, byte_offset, 4, bytes.len())?;
        let previous: u32 = bytemuck::pod_read_unaligned(&bytes[range.clone()]);
        bytes[range].copy_from_slice(&previous.wrapping_add(value).to_ne_bytes());
        Ok(previous)
    }
}

fn checked_range(
    binding: u32,
    offset: usize,
    len: usize,
    size: usize,
) -> Result<std::ops::Range<usize>, KernelError> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(offset..end),
        _ => Err(KernelError::OutOfBounds {
            binding,
            offset,
            len,
            size,
        }),
    }
}

/// The per-group body of a compute program, for backends that run dispatches on
/// the CPU.
///
/// GPU backends compile the program's shader source instead; a CPU kernel must
/// produce the same buffer contents the shader would, given in-order group
/// execution.
pub trait ComputeKernel: Send + Sync {
    /// A human-readable name used in logs.
    fn label(&self) -> &str;

    /// Executes one work group.
    fn invoke(
        &self,
        invocation: KernelInvocation,
        ctx: &mut KernelContext<'_>,
    ) -> Result<(), KernelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_index() {
        let invocation = KernelInvocation {
            group_id: UVec3::new(2, 1, 0),
            num_groups: UVec3::new(4, 3, 1),
        };
        assert_eq!(invocation.linear_index(), 6);
    }

    #[test]
    fn test_context_reads_writes_and_atomics() {
        let params = HashMap::from([("count".to_owned(), ParamValue::Uint(3))]);
        let mut storage = BTreeMap::new();
        storage.insert(0, bytemuck::cast_slice::<u32, u8>(&[10, 20, 30]).to_vec());
        storage.insert(1, vec![0u8; 16]);
        let mut ctx = KernelContext::new(&params, &mut storage);

        assert_eq!(ctx.param("count").unwrap().as_uint(), Some(3));
        assert!(matches!(
            ctx.param_mat4("count"),
            Err(KernelError::ParamType { .. })
        ));
        assert_eq!(ctx.read::<u32>(0, 1).unwrap(), 20);
        assert_eq!(ctx.read_slice::<u32>(0, 1, 2).unwrap(), vec![20, 30]);

        assert_eq!(ctx.atomic_add_u32(1, 0, 5).unwrap(), 0);
        assert_eq!(ctx.atomic_add_u32(1, 0, 7).unwrap(), 5);
        ctx.write_slice(1, 2, &[99u32]).unwrap();
        assert_eq!(ctx.read_slice::<u32>(1, 0, 4).unwrap(), vec![12, 0, 99, 0]);
    }

    #[test]
    fn test_context_bounds_and_bindings() {
        let params = HashMap::new();
        let mut storage = BTreeMap::new();
        storage.insert(0, vec![0u8; 8]);
        let mut ctx = KernelContext::new(&params, &mut storage);

        assert_eq!(ctx.storage(5).unwrap_err(), KernelError::MissingBinding(5));
        assert!(matches!(
            ctx.read_slice::<u32>(0, 1, 2),
            Err(KernelError::OutOfBounds { binding: 0, .. })
        ));
        assert!(ctx.write_slice(0, 2, &[1u32]).is_err());
        assert!(matches!(
            ctx.param("viewProjectMatrix"),
            Err(KernelError::MissingParam(_))
        ));
    }
}
