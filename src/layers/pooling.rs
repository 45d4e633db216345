use super::{check_input_shape, padded_extent, padded_output_dims, Padding};
use crate::spatial::{col2im, im2col, pad, unpad, ScatterMode};
use crate::{Error, ImageBatch, ImageShape, Result};
use log::debug;
use ndarray::{s, Array1, Array2, Array3, ArrayView2, Axis};
use rayon::prelude::*;

/// Window sweep shared by the pooling layers.
#[derive(Debug, Clone, Copy)]
struct PoolWindow {
    pool_size: (usize, usize),
    strides: (usize, usize),
    padding: Padding,
}

impl PoolWindow {
    fn new(pool_size: (usize, usize), strides: Option<(usize, usize)>, padding: Padding) -> Self {
        Self {
            pool_size,
            strides: strides.unwrap_or(pool_size),
            padding,
        }
    }

    fn pads(&self) -> (usize, usize) {
        self.padding.resolve(self.pool_size.0, self.pool_size.1)
    }

    fn output_shape(&self, input: ImageShape) -> Result<ImageShape> {
        let (out_h, out_w) =
            padded_output_dims(input, self.pool_size, self.strides, self.pads())?;
        Ok(ImageShape::new(input.channels, out_h, out_w))
    }

    /// Padded patches of one example as `(C, Hf*Wf, Hout*Wout)`.
    fn slots(
        &self,
        example: ArrayView2<'_, f32>,
        shape: ImageShape,
        fill: f32,
    ) -> Result<Array3<f32>> {
        let (ph, pw) = self.pads();
        let (padded_h, padded_w) = padded_extent(shape, (ph, pw))?;
        let padded = pad(
            example,
            shape.height,
            shape.width,
            ph as isize,
            pw as isize,
            fill,
        )?;
        let cols = im2col(
            padded.view(),
            padded_h,
            padded_w,
            self.pool_size.0,
            self.pool_size.1,
            self.strides.0,
            self.strides.1,
        )?;
        let positions = cols.ncols();
        Ok(cols.into_shape_with_order((
            shape.channels,
            self.pool_size.0 * self.pool_size.1,
            positions,
        ))?)
    }

    /// Accumulate per-window gradients back onto one flattened input example.
    fn scatter(&self, d_slots: Array3<f32>, shape: ImageShape) -> Result<Array1<f32>> {
        let (ph, pw) = self.pads();
        let (padded_h, padded_w) = padded_extent(shape, (ph, pw))?;
        let (channels, window, positions) = d_slots.dim();
        let d_cols = d_slots.into_shape_with_order((channels * window, positions))?;

        let d_padded = col2im(
            d_cols.view(),
            channels,
            padded_h,
            padded_w,
            self.pool_size.0,
            self.pool_size.1,
            self.strides.0,
            self.strides.1,
            ScatterMode::Add,
        )?;
        let d_img = unpad(d_padded.view(), shape.height, shape.width, ph as isize, pw as isize)?;

        Ok(d_img.into_shape_with_order(shape.len())?)
    }

    fn forward<F>(&self, input: &ImageBatch, fill: f32, reduce: F) -> Result<ImageBatch>
    where
        F: Fn(&Array3<f32>) -> Array2<f32> + Sync,
    {
        let in_shape = input.shape();
        let out_shape = self.output_shape(in_shape)?;
        let mut output = Array2::<f32>::zeros((input.num_examples(), out_shape.len()));

        output
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .try_for_each(|(n, mut row)| -> Result<()> {
                let slots = self.slots(input.example(n)?, in_shape, fill)?;
                let pooled = reduce(&slots);
                row.assign(&pooled.into_shape_with_order(out_shape.len())?);
                Ok(())
            })?;

        ImageBatch::new(output, out_shape)
    }

    fn backward<F>(
        &self,
        name: &str,
        input: &ImageBatch,
        grad_output: &ImageBatch,
        fill: f32,
        route: F,
    ) -> Result<ImageBatch>
    where
        F: Fn(&Array3<f32>, ArrayView2<'_, f32>) -> Array3<f32>,
    {
        let in_shape = input.shape();
        let out_shape = self.output_shape(in_shape)?;
        check_input_shape(name, out_shape, grad_output.shape())?;

        if grad_output.num_examples() != input.num_examples() {
            return Err(Error::ShapeMismatch {
                expected: vec![input.num_examples()],
                actual: vec![grad_output.num_examples()],
            });
        }

        let mut d_input = Array2::<f32>::zeros((input.num_examples(), in_shape.len()));
        for (n, mut d_row) in d_input.axis_iter_mut(Axis(0)).enumerate() {
            let slots = self.slots(input.example(n)?, in_shape, fill)?;
            let d_slots = route(&slots, grad_output.example(n)?);
            d_row.assign(&self.scatter(d_slots, in_shape)?);
        }

        ImageBatch::new(d_input, in_shape)
    }
}

#[derive(Debug, Clone)]
pub struct MaxPooling2D {
    name: String,
    window: PoolWindow,
}

#[derive(Debug, Clone)]
pub struct AveragePooling2D {
    name: String,
    window: PoolWindow,
}

impl MaxPooling2D {
    pub fn new(
        name: String,
        pool_size: (usize, usize),
        strides: Option<(usize, usize)>,
        padding: Padding,
    ) -> Self {
        let window = PoolWindow::new(pool_size, strides, padding);
        debug!("MaxPooling2D {}: {:?}", name, window);
        Self { name, window }
    }
}

impl super::Layer for MaxPooling2D {
    fn forward(&self, input: &ImageBatch) -> Result<ImageBatch> {
        debug!(
            "MaxPooling2D {} forward: {} examples {:?}",
            self.name,
            input.num_examples(),
            input.shape()
        );
        // Padding never wins a max.
        self.window.forward(input, f32::NEG_INFINITY, |slots| {
            slots.fold_axis(Axis(1), f32::NEG_INFINITY, |&m, &v| m.max(v))
        })
    }

    /// Each window's gradient goes to its first maximal element.
    fn backward(&self, input: &ImageBatch, grad_output: &ImageBatch) -> Result<ImageBatch> {
        debug!(
            "MaxPooling2D {} backward: {} examples {:?}",
            self.name,
            input.num_examples(),
            input.shape()
        );
        self.window.backward(
            &self.name,
            input,
            grad_output,
            f32::NEG_INFINITY,
            |slots, dout| {
                let (channels, _, positions) = slots.dim();
                let mut d_slots = Array3::<f32>::zeros(slots.raw_dim());
                for c in 0..channels {
                    for p in 0..positions {
                        let mut best = 0;
                        let mut best_val = f32::NEG_INFINITY;
                        for (k, &v) in slots.slice(s![c, .., p]).iter().enumerate() {
                            if v > best_val {
                                best = k;
                                best_val = v;
                            }
                        }
                        d_slots[[c, best, p]] = dout[[c, p]];
                    }
                }
                d_slots
            },
        )
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn output_shape(&self, input_shape: ImageShape) -> Result<ImageShape> {
        self.window.output_shape(input_shape)
    }
}

impl AveragePooling2D {
    pub fn new(
        name: String,
        pool_size: (usize, usize),
        strides: Option<(usize, usize)>,
        padding: Padding,
    ) -> Self {
        let window = PoolWindow::new(pool_size, strides, padding);
        debug!("AveragePooling2D {}: {:?}", name, window);
        Self { name, window }
    }

    fn window_len(&self) -> f32 {
        (self.window.pool_size.0 * self.window.pool_size.1) as f32
    }
}

impl super::Layer for AveragePooling2D {
    /// Zero padding counts towards the average.
    fn forward(&self, input: &ImageBatch) -> Result<ImageBatch> {
        debug!(
            "AveragePooling2D {} forward: {} examples {:?}",
            self.name,
            input.num_examples(),
            input.shape()
        );
        let window_len = self.window_len();
        self.window
            .forward(input, 0.0, |slots| slots.sum_axis(Axis(1)) / window_len)
    }

    fn backward(&self, input: &ImageBatch, grad_output: &ImageBatch) -> Result<ImageBatch> {
        debug!(
            "AveragePooling2D {} backward: {} examples {:?}",
            self.name,
            input.num_examples(),
            input.shape()
        );
        let window_len = self.window_len();
        self.window
            .backward(&self.name, input, grad_output, 0.0, |slots, dout| {
                Array3::from_shape_fn(slots.raw_dim(), |(c, _, p)| dout[[c, p]] / window_len)
            })
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn output_shape(&self, input_shape: ImageShape) -> Result<ImageShape> {
        self.window.output_shape(input_shape)
    }
}
