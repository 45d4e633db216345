pub mod conv2d;
pub mod pooling;

use crate::spatial::padded_len;
use crate::{Error, ImageBatch, ImageShape, Result};
use std::str::FromStr;

/// A spatial layer driven over a batch of channel-major images.
pub trait Layer: std::fmt::Debug + Send + Sync {
    fn forward(&self, input: &ImageBatch) -> Result<ImageBatch>;

    /// Gradient of the loss with respect to `input`, given the gradient with
    /// respect to this layer's output.
    fn backward(&self, input: &ImageBatch, grad_output: &ImageBatch) -> Result<ImageBatch>;

    fn name(&self) -> &str;

    fn output_shape(&self, input_shape: ImageShape) -> Result<ImageShape>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Padding {
    #[default]
    Valid,
    /// Symmetric `((Hf-1)/2, (Wf-1)/2)` on each side. Only odd filters at
    /// stride 1 come out the same size as the input.
    Half,
    Explicit {
        height: usize,
        width: usize,
    },
}

impl Padding {
    /// Rows and columns added on each side for a `filter_h x filter_w` window.
    pub fn resolve(&self, filter_h: usize, filter_w: usize) -> (usize, usize) {
        match *self {
            Padding::Valid => (0, 0),
            Padding::Half => (
                filter_h.saturating_sub(1) / 2,
                filter_w.saturating_sub(1) / 2,
            ),
            Padding::Explicit { height, width } => (height, width),
        }
    }
}

impl FromStr for Padding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "valid" => Ok(Padding::Valid),
            "half" => Ok(Padding::Half),
            _ => Err(Error::Layer(format!("Unknown padding type: {}", s))),
        }
    }
}

/// Height and width of an input plane after padding.
pub(crate) fn padded_extent(input: ImageShape, padding: (usize, usize)) -> Result<(usize, usize)> {
    Ok((
        padded_len(input.height, padding.0)?,
        padded_len(input.width, padding.1)?,
    ))
}

/// Spatial output size of a padded window sweep.
pub(crate) fn padded_output_dims(
    input: ImageShape,
    filter: (usize, usize),
    strides: (usize, usize),
    padding: (usize, usize),
) -> Result<(usize, usize)> {
    let (padded_h, padded_w) = padded_extent(input, padding)?;
    crate::spatial::output_dims(
        padded_h,
        padded_w,
        filter.0,
        filter.1,
        strides.0,
        strides.1,
    )
}

pub(crate) fn check_input_shape(
    layer: &str,
    expected: ImageShape,
    actual: ImageShape,
) -> Result<()> {
    if expected != actual {
        return Err(Error::Layer(format!(
            "{} expected images of shape {:?}, got {:?}",
            layer, expected, actual
        )));
    }
    Ok(())
}

pub use conv2d::{Conv2D, Conv2DConfig, Conv2DGradients};
pub use pooling::{AveragePooling2D, MaxPooling2D};
