use super::check_columns;
use crate::Result;
use log::trace;
use ndarray::{Array2, ArrayView2, Axis};

/// Sum a batch of flattened images into one value per channel, shape `(C, 1)`.
///
/// Columns are summed first so the per-channel step only touches one
/// contiguous `H*W` block per channel.
pub fn channel_sums(
    x: ArrayView2<'_, f32>,
    channels: usize,
    height: usize,
    width: usize,
) -> Result<Array2<f32>> {
    check_columns(&x, channels * height * width)?;
    trace!(
        "channel_sums: {} rows, {} channels {}x{}",
        x.nrows(),
        channels,
        height,
        width
    );

    let column_sums = x.sum_axis(Axis(0));
    let per_channel = column_sums.into_shape_with_order((channels, height * width))?;

    Ok(per_channel.sum_axis(Axis(1)).insert_axis(Axis(1)))
}
