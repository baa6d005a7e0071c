//! Zero-copy typed views over array payload frames

use bytemuck::checked::{self, CheckedCastError};
use bytemuck::{CheckedBitPattern, PodCastError};
use bytes::Bytes;
use std::collections::VecDeque;

use super::{ContainerType, Dtype};
use crate::{BridgeError, Result};

mod sealed {
    pub trait Sealed {}
}

/// Element types an [`ArrayView`] can be read as.
///
/// Sealed: the set matches the numeric and boolean dtypes the bridge can
/// declare, each tied to exactly one canonical [`Dtype`].
pub trait Element: CheckedBitPattern + Copy + sealed::Sealed {
    /// Canonical dtype this element type reads.
    const DTYPE: Dtype;
}

macro_rules! impl_element {
    ($($ty:ty => $dtype:expr),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}
            impl Element for $ty {
                const DTYPE: Dtype = $dtype;
            }
        )*
    };
}

impl_element! {
    bool => Dtype::Bool,
    u8 => Dtype::UInt8,
    i8 => Dtype::Int8,
    u16 => Dtype::UInt16,
    i16 => Dtype::Int16,
    u32 => Dtype::UInt32,
    i32 => Dtype::Int32,
    u64 => Dtype::UInt64,
    i64 => Dtype::Int64,
    f32 => Dtype::Float32,
    f64 => Dtype::Float64,
}

/// Checked product of all dimensions.
pub fn element_count(shape: &[usize]) -> Result<usize> {
    shape
        .iter()
        .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
        .ok_or_else(|| BridgeError::ShapeOverflow { shape: shape.to_vec() })
}

/// Typed overlay on the bytes of one payload frame.
///
/// The view shares the frame buffer (reference counted), so it stays valid for
/// as long as it is alive; no element is copied until a container cast.
/// Multi-byte elements are read in host byte order, which matches the
/// little-endian payloads bridge servers produce.
#[derive(Debug, Clone)]
pub struct ArrayView {
    data: Bytes,
    shape: Vec<usize>,
    dtype: Dtype,
    size: usize,
}

impl ArrayView {
    /// Build a view from a payload frame, a shape and a wire dtype name.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::ShapeOverflow`] if the element or byte count overflows
    /// - [`BridgeError::Protocol`] if the frame is shorter than the shape requires
    pub fn new(data: Bytes, shape: Vec<usize>, dtype: &str) -> Result<Self> {
        Self::with_dtype(data, shape, Dtype::from_wire(dtype))
    }

    /// Build a view with an already canonical dtype.
    pub fn with_dtype(data: Bytes, shape: Vec<usize>, dtype: Dtype) -> Result<Self> {
        let size = element_count(&shape)?;

        let data = match dtype.item_size() {
            Some(item_size) => {
                let needed = size
                    .checked_mul(item_size)
                    .ok_or_else(|| BridgeError::ShapeOverflow { shape: shape.clone() })?;
                if data.len() < needed {
                    return Err(BridgeError::protocol(format!(
                        "array payload holds {} bytes but shape {:?} of {} needs {}",
                        data.len(),
                        shape,
                        dtype,
                        needed
                    )));
                }
                data.slice(..needed)
            }
            // Unknown layout: keep the whole frame
            None => data,
        };

        Ok(Self { data, shape, dtype, size })
    }

    /// Product of the shape.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn dtype(&self) -> &Dtype {
        &self.dtype
    }

    pub fn container_type(&self) -> ContainerType {
        ContainerType::ArrayLike
    }

    /// Number of payload bytes covered by the view.
    pub fn nbytes(&self) -> usize {
        self.data.len()
    }

    /// Copy the elements into a fresh container.
    ///
    /// # Errors
    ///
    /// [`BridgeError::TypeMismatch`] unless the element type's dtype equals
    /// [`ArrayView::dtype`]; [`BridgeError::SizeMismatch`] for fixed-length
    /// arrays whose length differs from [`ArrayView::size`].
    pub fn cast<C: FromArray>(&self) -> Result<C> {
        C::from_array(self)
    }

    /// Typed, zero-copy slice over the payload.
    ///
    /// # Errors
    ///
    /// [`BridgeError::TypeMismatch`] on dtype mismatch, [`BridgeError::Misaligned`]
    /// when the frame address is not aligned for `T`.
    pub fn data<T: Element>(&self) -> Result<&[T]> {
        self.check::<T>()?;
        checked::try_cast_slice::<u8, T>(&self.data).map_err(|e| self.cast_failure::<T>(e))
    }

    /// Untyped payload bytes.
    pub fn raw(&self) -> &[u8] {
        &self.data
    }

    /// Shared handle to the payload bytes.
    pub fn bytes(&self) -> Bytes {
        self.data.clone()
    }

    fn check<T: Element>(&self) -> Result<()> {
        if self.dtype == T::DTYPE {
            Ok(())
        } else {
            Err(BridgeError::TypeMismatch { requested: T::DTYPE, found: self.dtype.clone() })
        }
    }

    fn collect<T: Element>(&self) -> Result<Vec<T>> {
        self.check::<T>()?;
        match checked::try_cast_slice::<u8, T>(&self.data) {
            Ok(slice) => Ok(slice.to_vec()),
            Err(CheckedCastError::PodCastError(
                PodCastError::TargetAlignmentGreaterAndInputNotAligned,
            )) => self
                .data
                .chunks_exact(std::mem::size_of::<T>())
                .map(|chunk| {
                    checked::try_pod_read_unaligned::<T>(chunk)
                        .map_err(|e| self.cast_failure::<T>(e))
                })
                .collect(),
            Err(e) => Err(self.cast_failure::<T>(e)),
        }
    }

    fn cast_failure<T: Element>(&self, err: CheckedCastError) -> BridgeError {
        match err {
            CheckedCastError::PodCastError(
                PodCastError::TargetAlignmentGreaterAndInputNotAligned,
            ) => BridgeError::Misaligned { dtype: self.dtype.clone() },
            CheckedCastError::InvalidBitPattern => BridgeError::CastMismatch {
                requested: std::any::type_name::<T>(),
                found: format!("{} array with invalid element bytes", self.dtype),
            },
            CheckedCastError::PodCastError(other) => BridgeError::CastMismatch {
                requested: std::any::type_name::<T>(),
                found: format!("{} array ({other:?})", self.dtype),
            },
        }
    }
}

/// Containers an [`ArrayView`] can be copied into.
pub trait FromArray: Sized {
    fn from_array(view: &ArrayView) -> Result<Self>;
}

impl<T: Element> FromArray for Vec<T> {
    fn from_array(view: &ArrayView) -> Result<Self> {
        view.collect()
    }
}

impl<T: Element> FromArray for VecDeque<T> {
    fn from_array(view: &ArrayView) -> Result<Self> {
        view.collect().map(VecDeque::from)
    }
}

impl<T: Element> FromArray for Box<[T]> {
    fn from_array(view: &ArrayView) -> Result<Self> {
        view.collect().map(Vec::into_boxed_slice)
    }
}

impl<T: Element, const N: usize> FromArray for [T; N] {
    fn from_array(view: &ArrayView) -> Result<Self> {
        view.check::<T>()?;
        if view.size() != N {
            return Err(BridgeError::SizeMismatch { requested: N, actual: view.size() });
        }
        let elements = view.collect::<T>()?;
        <[T; N]>::try_from(elements)
            .map_err(|rest| BridgeError::SizeMismatch { requested: N, actual: rest.len() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u16_view() -> ArrayView {
        let data: Vec<u8> = (1u16..=12).flat_map(|v| v.to_le_bytes()).collect();
        ArrayView::new(Bytes::from(data), vec![2, 2, 3], "uint16").unwrap()
    }

    #[test]
    fn view_metadata() {
        let view = u16_view();
        assert_eq!(view.dtype(), &Dtype::UInt16);
        assert_eq!(view.shape(), &[2, 2, 3]);
        assert_eq!(view.size(), 12);
        assert_eq!(view.nbytes(), 24);
        assert_eq!(view.container_type().as_str(), "array-like");
    }

    #[test]
    fn container_casts() {
        let view = u16_view();
        let expected: Vec<u16> = (1..=12).collect();
        assert_eq!(view.cast::<Vec<u16>>().unwrap(), expected);
        assert_eq!(view.cast::<VecDeque<u16>>().unwrap(), VecDeque::from(expected.clone()));
        assert_eq!(view.cast::<Box<[u16]>>().unwrap().as_ref(), expected.as_slice());
        let fixed: [u16; 12] = view.cast().unwrap();
        assert_eq!(fixed.to_vec(), expected);
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let view = u16_view();
        assert!(matches!(view.cast::<Vec<i32>>(), Err(BridgeError::TypeMismatch { .. })));
        assert!(matches!(view.cast::<Vec<u32>>(), Err(BridgeError::TypeMismatch { .. })));
        assert!(matches!(view.data::<i16>(), Err(BridgeError::TypeMismatch { .. })));
    }

    #[test]
    fn fixed_length_mismatch() {
        let view = u16_view();
        assert!(matches!(
            view.cast::<[u16; 13]>(),
            Err(BridgeError::SizeMismatch { requested: 13, actual: 12 })
        ));
        // dtype is checked before length
        assert!(matches!(view.cast::<[u8; 13]>(), Err(BridgeError::TypeMismatch { .. })));
    }

    #[test]
    fn zero_copy_slice_shares_frame() {
        let frame = Bytes::from(vec![7u8, 0, 0, 1]);
        let view = ArrayView::new(frame.clone(), vec![4], "uint8").unwrap();
        assert_eq!(view.raw().as_ptr(), frame.as_ptr());
        assert_eq!(view.data::<u8>().unwrap(), &[7, 0, 0, 1]);
    }

    #[test]
    fn unaligned_payload_still_copies() {
        let mut raw = vec![0u8];
        raw.extend((1u32..=4).flat_map(|v| v.to_le_bytes()));
        let frame = Bytes::from(raw).slice(1..);
        let view = ArrayView::new(frame, vec![2, 2], "uint32").unwrap();
        assert_eq!(view.cast::<Vec<u32>>().unwrap(), vec![1, 2, 3, 4]);
        match view.data::<u32>() {
            Ok(slice) => assert_eq!(slice, &[1, 2, 3, 4]),
            Err(err) => assert!(matches!(err, BridgeError::Misaligned { .. })),
        }
    }

    #[test]
    fn bool_arrays_validate_bytes() {
        let ok = ArrayView::new(Bytes::from_static(&[1, 0, 1]), vec![3], "bool").unwrap();
        assert_eq!(ok.cast::<Vec<bool>>().unwrap(), vec![true, false, true]);

        let bad = ArrayView::new(Bytes::from_static(&[1, 2]), vec![2], "bool").unwrap();
        assert!(matches!(bad.cast::<Vec<bool>>(), Err(BridgeError::CastMismatch { .. })));
    }

    #[test]
    fn short_payload_is_a_protocol_error() {
        let err = ArrayView::new(Bytes::from_static(&[0; 15]), vec![2, 2], "uint32").unwrap_err();
        assert!(matches!(err, BridgeError::Protocol { .. }));
    }

    #[test]
    fn longer_payload_is_trimmed_to_shape() {
        let view = ArrayView::new(Bytes::from_static(&[1, 2, 3, 4, 5]), vec![4], "uint8").unwrap();
        assert_eq!(view.nbytes(), 4);
        assert_eq!(view.cast::<Vec<u8>>().unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn shape_overflow_fails_fast() {
        let err = ArrayView::new(Bytes::new(), vec![usize::MAX, 2], "uint8").unwrap_err();
        assert!(matches!(err, BridgeError::ShapeOverflow { .. }));

        // element count fits, byte count does not
        let err = ArrayView::new(Bytes::new(), vec![usize::MAX / 2 + 1], "uint16").unwrap_err();
        assert!(matches!(err, BridgeError::ShapeOverflow { .. }));
    }

    #[test]
    fn unknown_dtype_passes_through() {
        let view = ArrayView::new(Bytes::from_static(b"abcd"), vec![4], "|S1").unwrap();
        assert_eq!(view.dtype(), &Dtype::Other("|S1".to_string()));
        assert_eq!(view.raw(), b"abcd");
        assert!(view.cast::<Vec<u8>>().is_err());
    }

    #[test]
    fn empty_shape_is_a_single_element() {
        let view = ArrayView::new(Bytes::from_static(&[0, 0, 128, 63]), vec![], "float32").unwrap();
        assert_eq!(view.size(), 1);
        assert_eq!(view.cast::<[f32; 1]>().unwrap(), [1.0]);
    }
}
