//! im2col / col2im.
//!
//! The patch matrix of an image is `(C*Hf*Wf, Hout*Wout)`. Column `j` is the
//! window anchored at `((j / Wout) * stride_h, (j % Wout) * stride_w)`, laid
//! out channel by channel, each channel's `Hf x Wf` block in row-major order.
//! [`col2im`] walks exactly the same order, which is what makes it the adjoint
//! of [`im2col`].

use super::{check_columns, output_dims};
use crate::{Error, Result};
use log::trace;
use ndarray::{s, Array2, Array3, ArrayView2, Axis};
use rayon::prelude::*;

/// How overlapping windows combine when scattering patches back into an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScatterMode {
    /// Sum every window's contribution. Used for gradients.
    Add,
    /// Write each window over whatever is there. Only well-defined when the
    /// windows tile the image without overlap; with overlap the window with
    /// the largest column index wins, and callers should not rely on that.
    Overwrite,
}

/// Rearrange a `(C, in_h*in_w)` image into its patch matrix.
///
/// Padding must already be applied; every window lies inside the image once
/// [`output_dims`] accepts the geometry. Columns are filled in parallel.
pub fn im2col(
    img: ArrayView2<'_, f32>,
    in_h: usize,
    in_w: usize,
    filter_h: usize,
    filter_w: usize,
    stride_h: usize,
    stride_w: usize,
) -> Result<Array2<f32>> {
    let (out_h, out_w) = output_dims(in_h, in_w, filter_h, filter_w, stride_h, stride_w)?;
    check_columns(&img, in_h * in_w)?;

    let channels = img.nrows();
    trace!(
        "im2col: {} channels {}x{}, filter {}x{}, stride ({}, {}) -> {}x{} positions",
        channels,
        in_h,
        in_w,
        filter_h,
        filter_w,
        stride_h,
        stride_w,
        out_h,
        out_w
    );

    let planes = img.to_shape((channels, in_h, in_w))?;
    let mut cols = Array2::<f32>::zeros((channels * filter_h * filter_w, out_h * out_w));

    // Each output column is written by exactly one task.
    cols.axis_iter_mut(Axis(1))
        .into_par_iter()
        .enumerate()
        .for_each(|(pos, mut col)| {
            let h0 = (pos / out_w) * stride_h;
            let w0 = (pos % out_w) * stride_w;
            let window = planes.slice(s![.., h0..h0 + filter_h, w0..w0 + filter_w]);
            for (dst, &v) in col.iter_mut().zip(window.iter()) {
                *dst = v;
            }
        });

    Ok(cols)
}

/// Rebuild a `(C, in_h*in_w)` image from a patch matrix produced with the
/// same geometry.
///
/// Positions are visited serially in column order; channels run in parallel
/// since no two channels share output cells.
#[allow(clippy::too_many_arguments)]
pub fn col2im(
    patches: ArrayView2<'_, f32>,
    channels: usize,
    in_h: usize,
    in_w: usize,
    filter_h: usize,
    filter_w: usize,
    stride_h: usize,
    stride_w: usize,
    mode: ScatterMode,
) -> Result<Array2<f32>> {
    let (out_h, out_w) = output_dims(in_h, in_w, filter_h, filter_w, stride_h, stride_w)?;
    let window = filter_h * filter_w;
    let positions = out_h * out_w;

    let expected = [channels * window, positions];
    if patches.shape() != expected {
        return Err(Error::ShapeMismatch {
            expected: expected.to_vec(),
            actual: patches.shape().to_vec(),
        });
    }

    trace!(
        "col2im ({:?}): {} channels {}x{}, filter {}x{}, stride ({}, {})",
        mode,
        channels,
        in_h,
        in_w,
        filter_h,
        filter_w,
        stride_h,
        stride_w
    );

    let slots = patches.to_shape((channels, window, positions))?;
    let mut planes = Array3::<f32>::zeros((channels, in_h, in_w));

    planes
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .zip(slots.axis_iter(Axis(0)).into_par_iter())
        .for_each(|(mut plane, slot)| {
            for pos in 0..positions {
                let h0 = (pos / out_w) * stride_h;
                let w0 = (pos % out_w) * stride_w;
                let mut target = plane.slice_mut(s![h0..h0 + filter_h, w0..w0 + filter_w]);
                let values = slot.column(pos);
                match mode {
                    ScatterMode::Add => {
                        for (dst, &v) in target.iter_mut().zip(values.iter()) {
                            *dst += v;
                        }
                    }
                    ScatterMode::Overwrite => {
                        for (dst, &v) in target.iter_mut().zip(values.iter()) {
                            *dst = v;
                        }
                    }
                }
            }
        });

    Ok(planes.into_shape_with_order((channels, in_h * in_w))?)
}
