//! Spatial reshaping kernels behind convolution and pooling.
//!
//! Every function here works on a single example stored channel-major: an
//! image with `C` channels of `H x W` pixels is a `(C, H*W)` matrix whose row
//! `c` holds channel `c` in row-major order. Batching is left to the caller.

mod padding;
mod patches;
mod reduce;

pub use padding::{pad, unpad};
pub use patches::{col2im, im2col, ScatterMode};
pub use reduce::channel_sums;

use crate::{Error, Result};
use ndarray::ArrayView2;

/// Number of patch placements along height and width.
///
/// Fails with [`Error::InvalidGeometry`] when the filter or stride is zero,
/// or when the filter does not fit inside the (already padded) input.
pub fn output_dims(
    in_h: usize,
    in_w: usize,
    filter_h: usize,
    filter_w: usize,
    stride_h: usize,
    stride_w: usize,
) -> Result<(usize, usize)> {
    if filter_h == 0 || filter_w == 0 {
        return Err(Error::InvalidGeometry(format!(
            "filter must be non-empty, got {}x{}",
            filter_h, filter_w
        )));
    }

    if stride_h == 0 || stride_w == 0 {
        return Err(Error::InvalidGeometry(format!(
            "strides must be positive, got ({}, {})",
            stride_h, stride_w
        )));
    }

    if filter_h > in_h || filter_w > in_w {
        return Err(Error::InvalidGeometry(format!(
            "filter {}x{} does not fit input {}x{}",
            filter_h, filter_w, in_h, in_w
        )));
    }

    Ok((
        (in_h - filter_h) / stride_h + 1,
        (in_w - filter_w) / stride_w + 1,
    ))
}

pub(crate) fn check_padding(pad_h: isize, pad_w: isize) -> Result<(usize, usize)> {
    if pad_h < 0 || pad_w < 0 {
        return Err(Error::NegativePadding {
            height: pad_h,
            width: pad_w,
        });
    }
    Ok((pad_h as usize, pad_w as usize))
}

/// `len + 2 * pad`, rejecting extents that do not fit in `usize`.
pub(crate) fn padded_len(len: usize, pad: usize) -> Result<usize> {
    pad.checked_mul(2)
        .and_then(|border| border.checked_add(len))
        .ok_or_else(|| {
            Error::InvalidGeometry(format!(
                "padding {} around extent {} overflows",
                pad, len
            ))
        })
}

pub(crate) fn check_columns(img: &ArrayView2<'_, f32>, expected: usize) -> Result<()> {
    if img.ncols() != expected {
        return Err(Error::ShapeMismatch {
            expected: vec![img.nrows(), expected],
            actual: vec![img.nrows(), img.ncols()],
        });
    }
    Ok(())
}
