use super::{check_columns, check_padding, padded_len};
use crate::{Error, Result};
use log::trace;
use ndarray::{s, Array2, Array3, ArrayView2, Axis};
use rayon::prelude::*;

fn padded_dims(in_h: usize, in_w: usize, ph: usize, pw: usize) -> Result<(usize, usize)> {
    let (padded_h, padded_w) = (padded_len(in_h, ph)?, padded_len(in_w, pw)?);
    if padded_h.checked_mul(padded_w).is_none() {
        return Err(Error::InvalidGeometry(format!(
            "padded plane {}x{} overflows",
            padded_h, padded_w
        )));
    }
    Ok((padded_h, padded_w))
}

/// Surround every channel plane with `pad_h` rows and `pad_w` columns of `fill`.
///
/// `img` is `(C, in_h*in_w)`; the result is `(C, (in_h+2*pad_h)*(in_w+2*pad_w))`.
pub fn pad(
    img: ArrayView2<'_, f32>,
    in_h: usize,
    in_w: usize,
    pad_h: isize,
    pad_w: isize,
    fill: f32,
) -> Result<Array2<f32>> {
    let (ph, pw) = check_padding(pad_h, pad_w)?;
    check_columns(&img, in_h * in_w)?;

    let channels = img.nrows();
    let (padded_h, padded_w) = padded_dims(in_h, in_w, ph, pw)?;
    trace!(
        "pad: {} channels {}x{} -> {}x{} (fill {})",
        channels,
        in_h,
        in_w,
        padded_h,
        padded_w,
        fill
    );

    let planes = img.to_shape((channels, in_h, in_w))?;
    let mut padded = Array3::from_elem((channels, padded_h, padded_w), fill);

    padded
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .zip(planes.axis_iter(Axis(0)).into_par_iter())
        .for_each(|(mut dst, src)| {
            dst.slice_mut(s![ph..ph + in_h, pw..pw + in_w]).assign(&src);
        });

    Ok(padded.into_shape_with_order((channels, padded_h * padded_w))?)
}

/// Strip the border added by [`pad`], recovering the `(C, in_h*in_w)` image.
pub fn unpad(
    img: ArrayView2<'_, f32>,
    in_h: usize,
    in_w: usize,
    pad_h: isize,
    pad_w: isize,
) -> Result<Array2<f32>> {
    let (ph, pw) = check_padding(pad_h, pad_w)?;
    let (padded_h, padded_w) = padded_dims(in_h, in_w, ph, pw)?;
    check_columns(&img, padded_h * padded_w)?;

    let channels = img.nrows();
    trace!(
        "unpad: {} channels {}x{} -> {}x{}",
        channels,
        padded_h,
        padded_w,
        in_h,
        in_w
    );

    let planes = img.to_shape((channels, padded_h, padded_w))?;
    let mut inner = Array3::<f32>::zeros((channels, in_h, in_w));

    inner
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .zip(planes.axis_iter(Axis(0)).into_par_iter())
        .for_each(|(mut dst, src)| {
            dst.assign(&src.slice(s![ph..ph + in_h, pw..pw + in_w]));
        });

    Ok(inner.into_shape_with_order((channels, in_h * in_w))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_pad_single_channel() {
        let img = array![[1.0, 2.0, 3.0, 4.0]];
        let padded = pad(img.view(), 2, 2, 1, 1, 0.0).unwrap();

        assert_eq!(padded.shape(), &[1, 16]);
        assert_eq!(
            padded.row(0).to_vec(),
            vec![
                0.0, 0.0, 0.0, 0.0, //
                0.0, 1.0, 2.0, 0.0, //
                0.0, 3.0, 4.0, 0.0, //
                0.0, 0.0, 0.0, 0.0,
            ]
        );
    }

    #[test]
    fn test_pad_asymmetric_fill() {
        let img = array![[1.0, 2.0], [3.0, 4.0]];
        let padded = pad(img.view(), 1, 2, 0, 1, -1.0).unwrap();

        assert_eq!(padded.shape(), &[2, 4]);
        assert_eq!(padded.row(0).to_vec(), vec![-1.0, 1.0, 2.0, -1.0]);
        assert_eq!(padded.row(1).to_vec(), vec![-1.0, 3.0, 4.0, -1.0]);
    }

    #[test]
    fn test_pad_zero_is_identity() {
        let img = array![[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]];
        let padded = pad(img.view(), 2, 3, 0, 0, 9.0).unwrap();
        assert_eq!(padded, img);
    }

    #[test]
    fn test_unpad_inverts_pad() {
        let img = array![[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], [7.0, 8.0, 9.0, 10.0, 11.0, 12.0]];
        let padded = pad(img.view(), 2, 3, 2, 1, 7.5).unwrap();
        let restored = unpad(padded.view(), 2, 3, 2, 1).unwrap();
        assert_eq!(restored, img);
    }

    #[test]
    fn test_negative_padding() {
        let img = array![[1.0, 2.0, 3.0, 4.0]];
        assert!(matches!(
            pad(img.view(), 2, 2, -1, 0, 0.0),
            Err(Error::NegativePadding { .. })
        ));
        assert!(matches!(
            unpad(img.view(), 2, 2, 0, -2),
            Err(Error::NegativePadding { .. })
        ));
    }

    #[test]
    fn test_huge_padding_is_rejected() {
        let img = array![[1.0, 2.0, 3.0, 4.0]];
        assert!(matches!(
            pad(img.view(), 2, 2, isize::MAX, 0, 0.0),
            Err(Error::InvalidGeometry(_))
        ));
        assert!(matches!(
            unpad(img.view(), 2, 2, 0, isize::MAX),
            Err(Error::InvalidGeometry(_))
        ));
    }

    #[test]
    fn test_pad_shape_mismatch() {
        let img = array![[1.0, 2.0, 3.0]];
        let result = pad(img.view(), 2, 2, 1, 1, 0.0);
        assert!(matches!(result, Err(Error::ShapeMismatch { .. })));

        let result = unpad(img.view(), 1, 1, 1, 1);
        assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
    }
}
