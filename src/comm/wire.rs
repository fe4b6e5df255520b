//! Pod casting helpers for distributor and collective payloads.
//!
//! Everything that crosses a rank boundary in this crate is a slice of
//! `bytemuck::Pod` records cast to bytes. Multi-byte integers are native
//! endian; homogeneous clusters are assumed (matching the MPI model the
//! crate targets).

use bytemuck::Pod;

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

pub fn cast_slice_mut<T: Pod>(v: &mut [T]) -> &mut [u8] {
    bytemuck::cast_slice_mut(v)
}

pub fn cast_slice_from<T: Pod>(v: &[u8]) -> &[T] {
    bytemuck::cast_slice(v)
}
