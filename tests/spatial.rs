use ndarray::{array, Array, Array2};
use patchwork::spatial::{channel_sums, col2im, im2col, output_dims, pad, unpad, ScatterMode};
use patchwork::Error;
use proptest::prelude::*;

/// Small integer-valued entries keep every sum exact in f32.
fn matrix(rows: usize, cols: usize) -> impl Strategy<Value = Array2<f32>> {
    prop::collection::vec((-8i32..8).prop_map(|v| v as f32), rows * cols)
        .prop_map(move |v| Array2::from_shape_vec((rows, cols), v).unwrap())
}

#[derive(Debug, Clone, Copy)]
struct Geometry {
    channels: usize,
    in_h: usize,
    in_w: usize,
    filter_h: usize,
    filter_w: usize,
    stride_h: usize,
    stride_w: usize,
}

impl Geometry {
    fn output_dims(&self) -> (usize, usize) {
        output_dims(
            self.in_h,
            self.in_w,
            self.filter_h,
            self.filter_w,
            self.stride_h,
            self.stride_w,
        )
        .unwrap()
    }

    fn im2col(&self, img: &Array2<f32>) -> Array2<f32> {
        im2col(
            img.view(),
            self.in_h,
            self.in_w,
            self.filter_h,
            self.filter_w,
            self.stride_h,
            self.stride_w,
        )
        .unwrap()
    }
}

fn geometry() -> impl Strategy<Value = Geometry> {
    (1usize..4, 1usize..9, 1usize..9)
        .prop_flat_map(|(channels, in_h, in_w)| {
            (
                Just((channels, in_h, in_w)),
                1..=in_h,
                1..=in_w,
                1usize..4,
                1usize..4,
            )
        })
        .prop_map(
            |((channels, in_h, in_w), filter_h, filter_w, stride_h, stride_w)| Geometry {
                channels,
                in_h,
                in_w,
                filter_h,
                filter_w,
                stride_h,
                stride_w,
            },
        )
}

/// Enumerates every window covering each cell independently of `col2im`.
fn reference_scatter_add(patches: &Array2<f32>, g: Geometry) -> Array2<f32> {
    let (out_h, out_w) = g.output_dims();
    let window = g.filter_h * g.filter_w;
    let mut img = Array2::<f32>::zeros((g.channels, g.in_h * g.in_w));

    for c in 0..g.channels {
        for i in 0..g.in_h {
            for j in 0..g.in_w {
                let mut total = 0.0;
                for oh in 0..out_h {
                    for ow in 0..out_w {
                        let (h0, w0) = (oh * g.stride_h, ow * g.stride_w);
                        let covers = (h0..h0 + g.filter_h).contains(&i)
                            && (w0..w0 + g.filter_w).contains(&j);
                        if covers {
                            let row = c * window + (i - h0) * g.filter_w + (j - w0);
                            total += patches[[row, oh * out_w + ow]];
                        }
                    }
                }
                img[[c, i * g.in_w + j]] = total;
            }
        }
    }
    img
}

#[test]
fn test_extract_concrete_example() {
    let img = Array::range(1.0, 17.0, 1.0)
        .into_shape_with_order((1, 16))
        .unwrap();
    let cols = im2col(img.view(), 4, 4, 2, 2, 2, 2).unwrap();

    assert_eq!(cols.shape(), &[4, 4]);
    assert_eq!(cols.column(0).to_vec(), vec![1.0, 2.0, 5.0, 6.0]);
    assert_eq!(cols.column(3).to_vec(), vec![11.0, 12.0, 15.0, 16.0]);
}

#[test]
fn test_channel_sums_all_ones() {
    let x = Array2::<f32>::ones((2, 8));
    let sums = channel_sums(x.view(), 2, 2, 2).unwrap();
    assert_eq!(sums, array![[8.0], [8.0]]);
}

#[test]
fn test_padded_extraction_pipeline() {
    let img = array![[1.0, 2.0, 3.0, 4.0]];
    let padded = pad(img.view(), 2, 2, 1, 1, 0.0).unwrap();
    let cols = im2col(padded.view(), 4, 4, 3, 3, 1, 1).unwrap();

    assert_eq!(cols.shape(), &[9, 4]);
    // Centre of the first window is the first real pixel.
    assert_eq!(cols[[4, 0]], 1.0);
    assert_eq!(
        cols.column(3).to_vec(),
        vec![1.0, 2.0, 0.0, 3.0, 4.0, 0.0, 0.0, 0.0, 0.0]
    );

    let grads = col2im(cols.view(), 1, 4, 4, 3, 3, 1, 1, ScatterMode::Add).unwrap();
    let grads = unpad(grads.view(), 2, 2, 1, 1).unwrap();
    // Every interior pixel of a 2x2 image sits in all four 3x3 windows.
    assert_eq!(grads, array![[4.0, 8.0, 12.0, 16.0]]);
}

#[test]
fn test_errors_surface_at_call_boundary() {
    let img = Array2::<f32>::zeros((2, 9));
    assert!(matches!(
        im2col(img.view(), 3, 3, 1, 4, 1, 1),
        Err(Error::InvalidGeometry(_))
    ));
    assert!(matches!(
        pad(img.view(), 3, 3, 0, -1, 0.0),
        Err(Error::NegativePadding { .. })
    ));
    assert!(matches!(
        col2im(img.view(), 2, 3, 3, 2, 2, 1, 1, ScatterMode::Add),
        Err(Error::ShapeMismatch { .. })
    ));
}

proptest! {
    #[test]
    fn prop_tiling_round_trip(
        (channels, filter_h, filter_w, tiles_h, tiles_w, img) in
            (1usize..4, 1usize..4, 1usize..4, 1usize..4, 1usize..4)
                .prop_flat_map(|(c, fh, fw, th, tw)| {
                    (Just(c), Just(fh), Just(fw), Just(th), Just(tw), matrix(c, fh * th * fw * tw))
                })
    ) {
        let (in_h, in_w) = (filter_h * tiles_h, filter_w * tiles_w);
        let cols = im2col(img.view(), in_h, in_w, filter_h, filter_w, filter_h, filter_w).unwrap();
        let back = col2im(
            cols.view(), channels, in_h, in_w, filter_h, filter_w, filter_h, filter_w,
            ScatterMode::Overwrite,
        ).unwrap();
        prop_assert_eq!(back, img);
    }

    #[test]
    fn prop_unpad_inverts_pad(
        (in_h, in_w, img) in (1usize..4, 1usize..6, 1usize..6)
            .prop_flat_map(|(c, h, w)| (Just(h), Just(w), matrix(c, h * w))),
        pad_h in 0isize..4,
        pad_w in 0isize..4,
        fill in -10.0f32..10.0,
    ) {
        let padded = pad(img.view(), in_h, in_w, pad_h, pad_w, fill).unwrap();
        let expected_cols = (in_h + 2 * pad_h as usize) * (in_w + 2 * pad_w as usize);
        prop_assert_eq!(padded.shape(), &[img.nrows(), expected_cols]);

        let border = padded.len() - img.len();
        prop_assert!(padded.iter().filter(|&&v| v == fill).count() >= border);

        let restored = unpad(padded.view(), in_h, in_w, pad_h, pad_w).unwrap();
        prop_assert_eq!(restored, img);
    }

    #[test]
    fn prop_patch_count(g in geometry()) {
        let img = Array2::<f32>::zeros((g.channels, g.in_h * g.in_w));
        let cols = g.im2col(&img);

        let out_h = (g.in_h - g.filter_h) / g.stride_h + 1;
        let out_w = (g.in_w - g.filter_w) / g.stride_w + 1;
        prop_assert_eq!(cols.shape(), &[g.channels * g.filter_h * g.filter_w, out_h * out_w]);
    }

    #[test]
    fn prop_add_scatter_matches_reference(
        (g, patches) in geometry().prop_flat_map(|g| {
            let (out_h, out_w) = g.output_dims();
            (Just(g), matrix(g.channels * g.filter_h * g.filter_w, out_h * out_w))
        })
    ) {
        let img = col2im(
            patches.view(), g.channels, g.in_h, g.in_w, g.filter_h, g.filter_w,
            g.stride_h, g.stride_w, ScatterMode::Add,
        ).unwrap();
        prop_assert_eq!(img, reference_scatter_add(&patches, g));
    }

    #[test]
    fn prop_scatter_add_is_adjoint_of_extract(
        (g, img, patches) in geometry().prop_flat_map(|g| {
            let (out_h, out_w) = g.output_dims();
            (
                Just(g),
                matrix(g.channels, g.in_h * g.in_w),
                matrix(g.channels * g.filter_h * g.filter_w, out_h * out_w),
            )
        })
    ) {
        let cols = g.im2col(&img);
        let back = col2im(
            patches.view(), g.channels, g.in_h, g.in_w, g.filter_h, g.filter_w,
            g.stride_h, g.stride_w, ScatterMode::Add,
        ).unwrap();

        let lhs: f32 = (&cols * &patches).sum();
        let rhs: f32 = (&img * &back).sum();
        prop_assert_eq!(lhs, rhs);
    }

    #[test]
    fn prop_extract_is_deterministic(
        (g, img) in geometry().prop_flat_map(|g| (Just(g), matrix(g.channels, g.in_h * g.in_w)))
    ) {
        let a = g.im2col(&img);
        let b = g.im2col(&img);
        prop_assert_eq!(
            a.iter().map(|v| v.to_bits()).collect::<Vec<_>>(),
            b.iter().map(|v| v.to_bits()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn prop_channel_sums_match_brute_force(
        (channels, plane, x) in (1usize..5, 1usize..4, 1usize..10)
            .prop_flat_map(|(n, c, p)| (Just(c), Just(p), matrix(n, c * p)))
    ) {
        let sums = channel_sums(x.view(), channels, plane, 1).unwrap();
        prop_assert_eq!(sums.shape(), &[channels, 1]);
        for c in 0..channels {
            let expected: f32 = x
                .rows()
                .into_iter()
                .map(|row| row.iter().skip(c * plane).take(plane).sum::<f32>())
                .sum();
            prop_assert_eq!(sums[[c, 0]], expected);
        }
    }
}
