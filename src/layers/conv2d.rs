use super::{check_input_shape, padded_extent, padded_output_dims, Padding};
use crate::spatial::{channel_sums, col2im, im2col, pad, unpad, ScatterMode};
use crate::{Error, ImageBatch, ImageShape, Result};
use log::debug;
use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use rayon::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conv2DConfig {
    pub filters: usize,
    pub kernel_size: (usize, usize),
    pub strides: (usize, usize),
    pub padding: Padding,
}

impl Conv2DConfig {
    pub fn new(filters: usize, kernel_size: (usize, usize)) -> Self {
        Self {
            filters,
            kernel_size,
            strides: (1, 1),
            padding: Padding::Valid,
        }
    }

    pub fn with_strides(mut self, strides: (usize, usize)) -> Self {
        self.strides = strides;
        self
    }

    pub fn with_padding(mut self, padding: Padding) -> Self {
        self.padding = padding;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.filters == 0 {
            return Err(Error::InvalidGeometry(
                "Conv2D needs at least one filter".to_string(),
            ));
        }
        if self.kernel_size.0 == 0 || self.kernel_size.1 == 0 {
            return Err(Error::InvalidGeometry(format!(
                "Conv2D kernel must be non-empty, got {:?}",
                self.kernel_size
            )));
        }
        if self.strides.0 == 0 || self.strides.1 == 0 {
            return Err(Error::InvalidGeometry(format!(
                "Conv2D strides must be positive, got {:?}",
                self.strides
            )));
        }
        Ok(())
    }

    fn patch_len(&self, in_channels: usize) -> usize {
        in_channels * self.kernel_size.0 * self.kernel_size.1
    }
}

/// Gradients produced by [`Conv2D::gradients`].
#[derive(Debug, Clone)]
pub struct Conv2DGradients {
    pub input: ImageBatch,
    /// `(F, C*Hf*Wf)`, summed over the batch.
    pub weights: Array2<f32>,
    /// `(F, 1)`, summed over the batch and all output positions.
    pub bias: Array2<f32>,
}

/// 2D convolution computed as `W · im2col(pad(x)) + b` per example.
///
/// Weights are `(F, C*Hf*Wf)`, one flattened filter per row in the same
/// channel-major order as the patch columns.
#[derive(Debug, Clone)]
pub struct Conv2D {
    name: String,
    config: Conv2DConfig,
    in_channels: usize,
    weights: Array2<f32>,
    bias: Array2<f32>,
}

impl Conv2D {
    pub fn new(
        name: String,
        config: Conv2DConfig,
        in_channels: usize,
        weights: Array2<f32>,
        bias: Array2<f32>,
    ) -> Result<Self> {
        config.validate()?;

        let expected = [config.filters, config.patch_len(in_channels)];
        if weights.shape() != expected {
            return Err(Error::ShapeMismatch {
                expected: expected.to_vec(),
                actual: weights.shape().to_vec(),
            });
        }

        if bias.shape() != [config.filters, 1] {
            return Err(Error::ShapeMismatch {
                expected: vec![config.filters, 1],
                actual: bias.shape().to_vec(),
            });
        }

        debug!(
            "Conv2D {}: {} -> {} channels, kernel {:?}, strides {:?}, padding {:?}",
            name, in_channels, config.filters, config.kernel_size, config.strides, config.padding
        );

        Ok(Self {
            name,
            config,
            in_channels,
            weights,
            bias,
        })
    }

    /// He initialization: weights drawn from `N(0, 2 / (C*Hf*Wf))`, zero bias.
    ///
    /// A fixed `seed` makes the draw reproducible.
    pub fn init(
        name: String,
        config: Conv2DConfig,
        in_channels: usize,
        seed: Option<u64>,
    ) -> Result<Self> {
        config.validate()?;

        let fan_in = config.patch_len(in_channels);
        if fan_in == 0 {
            return Err(Error::Layer(format!(
                "Conv2D {} needs at least one input channel",
                name
            )));
        }

        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let scale = (2.0 / fan_in as f64).sqrt();

        let weights = Array2::from_shape_simple_fn((config.filters, fan_in), || {
            let sample: f64 = StandardNormal.sample(&mut rng);
            (sample * scale) as f32
        });
        let bias = Array2::zeros((config.filters, 1));

        debug!("Conv2D {}: He init over fan-in {}", name, fan_in);
        Self::new(name, config, in_channels, weights, bias)
    }

    pub fn config(&self) -> &Conv2DConfig {
        &self.config
    }

    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    pub fn weights(&self) -> &Array2<f32> {
        &self.weights
    }

    pub fn bias(&self) -> &Array2<f32> {
        &self.bias
    }

    fn padding(&self) -> (usize, usize) {
        let (kh, kw) = self.config.kernel_size;
        self.config.padding.resolve(kh, kw)
    }

    fn check_channels(&self, shape: ImageShape) -> Result<()> {
        if shape.channels != self.in_channels {
            return Err(Error::ShapeMismatch {
                expected: vec![self.in_channels],
                actual: vec![shape.channels],
            });
        }
        Ok(())
    }

    /// Patch matrix of one padded example, `(C*Hf*Wf, Hout*Wout)`.
    fn example_columns(&self, input: &ImageBatch, n: usize) -> Result<Array2<f32>> {
        let shape = input.shape();
        let (ph, pw) = self.padding();
        let (padded_h, padded_w) = padded_extent(shape, (ph, pw))?;
        let (kh, kw) = self.config.kernel_size;
        let (sh, sw) = self.config.strides;

        let padded = pad(
            input.example(n)?,
            shape.height,
            shape.width,
            ph as isize,
            pw as isize,
            0.0,
        )?;
        im2col(
            padded.view(),
            padded_h,
            padded_w,
            kh,
            kw,
            sh,
            sw,
        )
    }

    /// Input, weight and bias gradients for one batch.
    pub fn gradients(
        &self,
        input: &ImageBatch,
        grad_output: &ImageBatch,
    ) -> Result<Conv2DGradients> {
        let in_shape = input.shape();
        let out_shape = super::Layer::output_shape(self, in_shape)?;
        check_input_shape(&self.name, out_shape, grad_output.shape())?;

        if grad_output.num_examples() != input.num_examples() {
            return Err(Error::ShapeMismatch {
                expected: vec![input.num_examples()],
                actual: vec![grad_output.num_examples()],
            });
        }

        debug!(
            "Conv2D {} backward: {} examples {:?} <- {:?}",
            self.name,
            input.num_examples(),
            in_shape,
            out_shape
        );

        let (ph, pw) = self.padding();
        let (padded_h, padded_w) = padded_extent(in_shape, (ph, pw))?;
        let (kh, kw) = self.config.kernel_size;
        let (sh, sw) = self.config.strides;

        let mut d_weights = Array2::<f32>::zeros(self.weights.raw_dim());
        let mut d_input = Array2::<f32>::zeros((input.num_examples(), in_shape.len()));

        for (n, mut d_row) in d_input.axis_iter_mut(Axis(0)).enumerate() {
            let dout = grad_output.example(n)?;
            let cols = self.example_columns(input, n)?;

            d_weights += &dout.dot(&cols.t());

            let d_cols = self.weights.t().dot(&dout);
            let d_padded = col2im(
                d_cols.view(),
                in_shape.channels,
                padded_h,
                padded_w,
                kh,
                kw,
                sh,
                sw,
                ScatterMode::Add,
            )?;
            let d_img = unpad(
                d_padded.view(),
                in_shape.height,
                in_shape.width,
                ph as isize,
                pw as isize,
            )?;
            d_row.assign(&d_img.into_shape_with_order(in_shape.len())?);
        }

        let d_bias = channel_sums(
            grad_output.data().view(),
            out_shape.channels,
            out_shape.height,
            out_shape.width,
        )?;

        Ok(Conv2DGradients {
            input: ImageBatch::new(d_input, in_shape)?,
            weights: d_weights,
            bias: d_bias,
        })
    }
}

impl super::Layer for Conv2D {
    fn forward(&self, input: &ImageBatch) -> Result<ImageBatch> {
        let out_shape = self.output_shape(input.shape())?;
        debug!(
            "Conv2D {} forward: {} examples {:?} -> {:?}",
            self.name,
            input.num_examples(),
            input.shape(),
            out_shape
        );

        let mut output = Array2::<f32>::zeros((input.num_examples(), out_shape.len()));

        output
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .try_for_each(|(n, mut row)| -> Result<()> {
                let cols = self.example_columns(input, n)?;
                let mut out = self.weights.dot(&cols);
                out += &self.bias;
                row.assign(&out.into_shape_with_order(out_shape.len())?);
                Ok(())
            })?;

        ImageBatch::new(output, out_shape)
    }

    fn backward(&self, input: &ImageBatch, grad_output: &ImageBatch) -> Result<ImageBatch> {
        Ok(self.gradients(input, grad_output)?.input)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn output_shape(&self, input_shape: ImageShape) -> Result<ImageShape> {
        self.check_channels(input_shape)?;
        let (out_h, out_w) = padded_output_dims(
            input_shape,
            self.config.kernel_size,
            self.config.strides,
            self.padding(),
        )?;
        Ok(ImageShape::new(self.config.filters, out_h, out_w))
    }
}
