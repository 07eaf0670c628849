use crate::{
    error::Error,
    pose::{self, Keypoint, KeypointKind, Point, Pose},
};
use ndarray::{s, ArrayView2, ArrayView3};
use num_traits::cast::{FromPrimitive, ToPrimitive};
use ordered_float::NotNan;
use std::str::FromStr;

const DEFAULT_OUTPUT_STRIDE: &str = "16";
const DEFAULT_LAYOUT: &str = "nchw";

/// Memory layout of a model output tensor.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Layout {
    Nchw,
    Nhwc,
}

impl FromStr for Layout {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nchw" => Ok(Self::Nchw),
            "nhwc" => Ok(Self::Nhwc),
            _ => Err(Error::ParseLayout(s.to_owned())),
        }
    }
}

/// Single-pose PoseNet decoder.
#[derive(Debug, Clone, Copy, structopt::StructOpt)]
pub(crate) struct Decoder {
    /// Stride between heatmap cells, in model input pixels.
    #[structopt(long, default_value = DEFAULT_OUTPUT_STRIDE)]
    pub(crate) output_stride: u8,

    /// Memory layout of the model's output tensors: nchw or nhwc.
    #[structopt(long, default_value = DEFAULT_LAYOUT)]
    pub(crate) layout: Layout,

    /// The model's heatmaps already hold probabilities, so skip the sigmoid.
    #[structopt(long)]
    pub(crate) probabilities: bool,
}

impl Default for Decoder {
    fn default() -> Self {
        Self {
            output_stride: 16,
            layout: Layout::Nchw,
            probabilities: false,
        }
    }
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Position and value of the largest score; the first one wins ties.
fn argmax(scores: ArrayView2<f32>) -> Result<Option<((usize, usize), f32)>, Error> {
    let best = scores.indexed_iter().try_fold(
        None,
        |best: Option<((usize, usize), NotNan<f32>)>, (index, &value)| {
            let value = NotNan::new(value).map_err(|e| Error::ConstructNotNan(e, value))?;
            Ok::<_, Error>(match best {
                Some((_, best_value)) if best_value >= value => best,
                _ => Some((index, value)),
            })
        },
    )?;
    Ok(best.map(|(index, value)| (index, value.into_inner())))
}

impl Decoder {
    /// Heatmap grid dimensions for a model input of `height` x `width` pixels.
    pub(crate) fn grid(&self, height: u16, width: u16) -> Result<(usize, usize), Error> {
        let stride = u16::from(self.output_stride);
        if stride == 0 {
            return Err(Error::ZeroOutputStride);
        }
        Ok((
            usize::from(1 + height.saturating_sub(1) / stride),
            usize::from(1 + width.saturating_sub(1) / stride),
        ))
    }

    /// View a flat output tensor on a `grid` as height x width x channels.
    pub(crate) fn view<'a>(
        &self,
        data: &'a [f32],
        (height, width): (usize, usize),
    ) -> Result<ArrayView3<'a, f32>, Error> {
        let cells = height * width;
        if cells == 0 || data.len() % cells != 0 {
            return Err(Error::RaggedTensor {
                len: data.len(),
                grid: (height, width),
            });
        }
        let channels = data.len() / cells;
        match self.layout {
            Layout::Nhwc => ArrayView3::from_shape((height, width, channels), data),
            Layout::Nchw => ArrayView3::from_shape((channels, height, width), data)
                .map(|view| view.permuted_axes([1, 2, 0])),
        }
        .map_err(Error::ConstructArrayView)
    }

    /// Decode the most likely pose from height x width x channel views of the heatmaps
    /// and short-range offsets.
    ///
    /// Offsets hold the y displacement of keypoint `k` in channel `k` and the x
    /// displacement in channel `k + 17`. `(scale_y, scale_x)` maps model input pixels
    /// to frame pixels.
    pub(crate) fn decode(
        &self,
        heatmaps: ArrayView3<f32>,
        offsets: ArrayView3<f32>,
        (scale_y, scale_x): (f32, f32),
    ) -> Result<Pose, Error> {
        let (height, width, num_keypoints) = heatmaps.dim();
        if num_keypoints != pose::NUM_KEYPOINTS {
            return Err(Error::UnexpectedChannels {
                expected: pose::NUM_KEYPOINTS,
                got: num_keypoints,
            });
        }
        let (offsets_height, offsets_width, num_offsets) = offsets.dim();
        if (offsets_height, offsets_width) != (height, width) {
            return Err(Error::MismatchedGrid {
                heatmaps: (height, width),
                offsets: (offsets_height, offsets_width),
            });
        }
        if num_offsets != 2 * num_keypoints {
            return Err(Error::UnexpectedChannels {
                expected: 2 * num_keypoints,
                got: num_offsets,
            });
        }

        let output_stride = f32::from(self.output_stride);
        let mut keypoints = Vec::with_capacity(num_keypoints);

        for keypoint_id in 0..num_keypoints {
            let ((row, col), score) = argmax(heatmaps.slice(s![.., .., keypoint_id]))?
                .ok_or(Error::EmptyHeatmap)?;
            let y = row.to_f32().ok_or(Error::ConvertToF32)? * output_stride
                + offsets[(row, col, keypoint_id)];
            let x = col.to_f32().ok_or(Error::ConvertToF32)? * output_stride
                + offsets[(row, col, keypoint_id + num_keypoints)];

            keypoints.push(Keypoint {
                kind: KeypointKind::from_usize(keypoint_id)
                    .ok_or(Error::ConvertUSizeToKeypointKind(keypoint_id))?,
                point: Point::new(x * scale_x, y * scale_y),
                score: if self.probabilities { score } else { sigmoid(score) },
            });
        }

        let score = keypoints.iter().map(|keypoint| keypoint.score).sum::<f32>()
            / num_keypoints.to_f32().ok_or(Error::ConvertToF32)?;

        Ok(Pose { score, keypoints })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use ndarray::Array3;

    const HEIGHT: usize = 3;
    const WIDTH: usize = 4;

    fn tensors() -> (Array3<f32>, Array3<f32>) {
        (
            Array3::zeros((HEIGHT, WIDTH, pose::NUM_KEYPOINTS)),
            Array3::zeros((HEIGHT, WIDTH, 2 * pose::NUM_KEYPOINTS)),
        )
    }

    #[test]
    fn sigmoid_zero() {
        assert_approx_eq!(sigmoid(0.0), 0.5);
    }

    #[test]
    fn sigmoid_negative_five() {
        assert_approx_eq!(sigmoid(-5.0), 0.006692851);
    }

    #[test]
    fn argmax_prefers_first_of_equal_scores() {
        let scores = ndarray::arr2(&[[0.1, 0.7], [0.7, 0.2]]);
        assert_eq!(argmax(scores.view()).unwrap(), Some(((0, 1), 0.7)));
    }

    #[test]
    fn argmax_rejects_nan() {
        let scores = ndarray::arr2(&[[0.1, f32::NAN]]);
        assert!(matches!(
            argmax(scores.view()),
            Err(Error::ConstructNotNan(..))
        ));
    }

    #[test]
    fn grid_for_default_input() {
        let decoder = Decoder::default();
        assert_eq!(decoder.grid(481, 641).unwrap(), (31, 41));
        assert_eq!(decoder.grid(480, 640).unwrap(), (30, 40));
    }

    #[test]
    fn zero_stride_is_an_error() {
        let decoder = Decoder {
            output_stride: 0,
            ..Decoder::default()
        };
        assert!(decoder.grid(481, 641).is_err());
    }

    #[test]
    fn decodes_peak_with_offsets() {
        let (mut heatmaps, mut offsets) = tensors();
        let elbow = KeypointKind::RightElbow.to_usize().unwrap();
        heatmaps[(2, 1, elbow)] = 0.9;
        offsets[(2, 1, elbow)] = 3.0;
        offsets[(2, 1, elbow + pose::NUM_KEYPOINTS)] = -2.0;

        let decoder = Decoder {
            probabilities: true,
            ..Decoder::default()
        };
        let pose = decoder
            .decode(heatmaps.view(), offsets.view(), (1.0, 2.0))
            .unwrap();

        assert_eq!(pose.keypoints.len(), pose::NUM_KEYPOINTS);
        let keypoint = pose.joint(KeypointKind::RightElbow).unwrap();
        assert_approx_eq!(keypoint.score, 0.9);
        assert_approx_eq!(keypoint.point.y, 2.0 * 16.0 + 3.0);
        assert_approx_eq!(keypoint.point.x, (1.0 * 16.0 - 2.0) * 2.0);
        assert_approx_eq!(pose.score, 0.9 / 17.0);
    }

    #[test]
    fn logits_are_squashed_by_default() {
        let (mut heatmaps, offsets) = tensors();
        heatmaps.fill(-4.0);
        let elbow = KeypointKind::RightElbow.to_usize().unwrap();
        heatmaps[(1, 3, elbow)] = 3.0;

        let pose = Decoder::default()
            .decode(heatmaps.view(), offsets.view(), (1.0, 1.0))
            .unwrap();

        assert!(pose
            .keypoints
            .iter()
            .all(|keypoint| (0.0..=1.0).contains(&keypoint.score)));
        assert_approx_eq!(pose.joint(KeypointKind::RightElbow).unwrap().score, sigmoid(3.0));
        assert_approx_eq!(pose.joint(KeypointKind::Nose).unwrap().score, sigmoid(-4.0));
    }

    #[test]
    fn probabilities_pass_through() {
        let (mut heatmaps, offsets) = tensors();
        heatmaps.fill(0.25);
        let decoder = Decoder {
            probabilities: true,
            ..Decoder::default()
        };
        let pose = decoder
            .decode(heatmaps.view(), offsets.view(), (1.0, 1.0))
            .unwrap();
        assert!(pose
            .keypoints
            .iter()
            .all(|keypoint| (keypoint.score - 0.25).abs() < 1e-6));
    }

    #[test]
    fn nchw_view_is_transposed() {
        let channels = pose::NUM_KEYPOINTS;
        let mut data = vec![0.0; channels * HEIGHT * WIDTH];
        // channel 5, row 1, column 2
        data[5 * HEIGHT * WIDTH + WIDTH + 2] = 1.0;

        let view = Decoder::default().view(&data, (HEIGHT, WIDTH)).unwrap();
        assert_eq!(view.dim(), (HEIGHT, WIDTH, channels));
        assert_approx_eq!(view[(1, 2, 5)], 1.0);
    }

    #[test]
    fn nhwc_view_is_not_transposed() {
        let channels = pose::NUM_KEYPOINTS;
        let mut data = vec![0.0; channels * HEIGHT * WIDTH];
        data[(WIDTH + 2) * channels + 5] = 1.0;

        let decoder = Decoder {
            layout: Layout::Nhwc,
            ..Decoder::default()
        };
        let view = decoder.view(&data, (HEIGHT, WIDTH)).unwrap();
        assert_approx_eq!(view[(1, 2, 5)], 1.0);
    }

    #[test]
    fn view_rejects_ragged_data() {
        let data = vec![0.0; HEIGHT * WIDTH + 1];
        match Decoder::default().view(&data, (HEIGHT, WIDTH)) {
            Err(Error::RaggedTensor { len, grid }) => {
                assert_eq!(len, 13);
                assert_eq!(grid, (HEIGHT, WIDTH));
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn view_rejects_empty_grid() {
        assert!(Decoder::default().view(&[0.0; 4], (0, WIDTH)).is_err());
    }

    #[test]
    fn wrong_channel_count_is_rejected() {
        let heatmaps = Array3::<f32>::zeros((HEIGHT, WIDTH, 16));
        let offsets = Array3::<f32>::zeros((HEIGHT, WIDTH, 32));
        match Decoder::default().decode(heatmaps.view(), offsets.view(), (1.0, 1.0)) {
            Err(Error::UnexpectedChannels { expected, got }) => {
                assert_eq!(expected, 17);
                assert_eq!(got, 16);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn parse_layout() {
        assert_eq!("NHWC".parse::<Layout>().unwrap(), Layout::Nhwc);
        assert!("chw".parse::<Layout>().is_err());
    }
}
