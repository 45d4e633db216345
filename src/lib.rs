//! # Patchwork
//!
//! Spatial reshaping kernels for convolution and pooling layers, over dense
//! `ndarray` matrices.
//!
//! Images are stored channel-major: an example with `C` channels of `H x W`
//! pixels is one row of length `C*H*W`, and a batch is an `N x (C*H*W)`
//! matrix. The [`spatial`] primitives (padding, im2col, col2im, per-channel
//! sums) work on one `(C, H*W)` example at a time; the [`layers`] drive them
//! over a batch.
//!
//! ## Example
//!
//! ```rust
//! use patchwork::spatial::{col2im, im2col, ScatterMode};
//! use ndarray::Array;
//!
//! let img = Array::range(1.0, 17.0, 1.0).into_shape_with_order((1, 16)).unwrap();
//! let cols = im2col(img.view(), 4, 4, 2, 2, 2, 2)?;
//! assert_eq!(cols.column(0).to_vec(), vec![1.0, 2.0, 5.0, 6.0]);
//!
//! let back = col2im(cols.view(), 1, 4, 4, 2, 2, 2, 2, ScatterMode::Overwrite)?;
//! assert_eq!(back, img);
//! # Ok::<(), patchwork::Error>(())
//! ```

pub mod batch;
pub mod error;
pub mod layers;
pub mod spatial;

pub use batch::{ImageBatch, ImageShape};
pub use error::{Error, Result};
pub use layers::Layer;
