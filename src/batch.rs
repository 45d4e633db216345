use crate::{Error, Result};
use ndarray::{Array2, ArrayView2, ArrayViewMut2};

/// Per-example image geometry: `channels` planes of `height x width` pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageShape {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl ImageShape {
    pub fn new(channels: usize, height: usize, width: usize) -> Self {
        Self {
            channels,
            height,
            width,
        }
    }

    /// Pixels in one channel plane.
    pub fn plane_len(&self) -> usize {
        self.height * self.width
    }

    /// Length of one flattened example row.
    pub fn len(&self) -> usize {
        self.channels * self.plane_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A batch of `N` images stored as an `N x (C*H*W)` matrix, one
/// channel-major example per row.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageBatch {
    data: Array2<f32>,
    shape: ImageShape,
}

impl ImageBatch {
    pub fn new(data: Array2<f32>, shape: ImageShape) -> Result<Self> {
        if data.ncols() != shape.len() {
            return Err(Error::ShapeMismatch {
                expected: vec![data.nrows(), shape.len()],
                actual: vec![data.nrows(), data.ncols()],
            });
        }

        // Rows must be contiguous so examples can be viewed without copying.
        let data = if data.is_standard_layout() {
            data
        } else {
            data.as_standard_layout().into_owned()
        };

        Ok(Self { data, shape })
    }

    pub fn from_vec(vec: Vec<f32>, num_examples: usize, shape: ImageShape) -> Result<Self> {
        if vec.len() != num_examples * shape.len() {
            return Err(Error::ShapeMismatch {
                expected: vec![num_examples, shape.len()],
                actual: vec![vec.len()],
            });
        }

        let data = Array2::from_shape_vec((num_examples, shape.len()), vec)?;
        Ok(Self { data, shape })
    }

    pub fn zeros(num_examples: usize, shape: ImageShape) -> Self {
        Self {
            data: Array2::zeros((num_examples, shape.len())),
            shape,
        }
    }

    pub fn shape(&self) -> ImageShape {
        self.shape
    }

    pub fn num_examples(&self) -> usize {
        self.data.nrows()
    }

    pub fn data(&self) -> &Array2<f32> {
        &self.data
    }

    /// Mutable view of the values. The shape and row layout stay fixed.
    pub fn data_mut(&mut self) -> ArrayViewMut2<'_, f32> {
        self.data.view_mut()
    }

    /// One example as a `(C, H*W)` view into the batch.
    pub fn example(&self, n: usize) -> Result<ArrayView2<'_, f32>> {
        if n >= self.num_examples() {
            return Err(Error::Layer(format!(
                "Example {} out of range for batch of {}",
                n,
                self.num_examples()
            )));
        }

        let row = self.data.row(n);
        Ok(row.into_shape_with_order((self.shape.channels, self.shape.plane_len()))?)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.data.iter().copied().collect()
    }
}
