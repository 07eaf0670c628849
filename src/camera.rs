use crate::{
    decode::Decoder,
    error::Error,
    pose::Pose,
    sampler::{Frame, FrameSource, PoseEstimator},
};
use ndarray::ArrayView3;
use num_traits::cast::ToPrimitive;
use opencv::{
    core::{Mat, Scalar, Size, Vector, CV_32F, CV_8UC3},
    dnn,
    imgproc::{resize, INTER_LINEAR},
    prelude::*,
    videoio::{VideoCapture, CAP_ANY, CAP_PROP_FRAME_HEIGHT, CAP_PROP_FRAME_WIDTH, CAP_V4L2},
};
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

/// Width of the drawing surface frames are resized to.
pub(crate) const SURFACE_WIDTH: i32 = 640;
/// Height of the drawing surface frames are resized to.
pub(crate) const SURFACE_HEIGHT: i32 = 480;

fn blank_frame() -> Result<Mat, Error> {
    Mat::zeros(SURFACE_HEIGHT, SURFACE_WIDTH, CV_8UC3)
        .and_then(|zeros| zeros.to_mat())
        .map_err(Error::AllocateFrame)
}

/// Frames from a V4L2 device or a video file, resized to the drawing surface.
pub(crate) struct Camera {
    capture: VideoCapture,
    raw: Mat,
    /// A device that fails a read may still deliver later; a file is done.
    live: bool,
}

impl Camera {
    #[instrument(name = "Camera::open_device")]
    pub(crate) fn open_device(
        device: i32,
        frame_width: Option<u16>,
        frame_height: Option<u16>,
    ) -> Result<Self, Error> {
        let mut capture = VideoCapture::new(device, CAP_V4L2).map_err(Error::OpenCapture)?;

        if let Some(width) = frame_width.map(f64::from) {
            capture
                .set(CAP_PROP_FRAME_WIDTH, width)
                .map_err(Error::SetCaptureProperty)?;
        }

        if let Some(height) = frame_height.map(f64::from) {
            capture
                .set(CAP_PROP_FRAME_HEIGHT, height)
                .map_err(Error::SetCaptureProperty)?;
        }

        Self::new(capture, format!("/dev/video{}", device), true)
    }

    #[instrument(name = "Camera::open_file")]
    pub(crate) fn open_file(path: &Path) -> Result<Self, Error> {
        let path_str = path
            .to_str()
            .ok_or_else(|| Error::GetPathAsStr(path.to_owned()))?;
        let capture = VideoCapture::from_file(path_str, CAP_ANY).map_err(Error::OpenCapture)?;
        Self::new(capture, path.display().to_string(), false)
    }

    fn new(capture: VideoCapture, name: String, live: bool) -> Result<Self, Error> {
        if !capture.is_opened().map_err(Error::OpenCapture)? {
            return Err(Error::CaptureNotOpened(name));
        }

        info!(
            message = "opened video capture",
            name = name.as_str(),
            width = capture.get(CAP_PROP_FRAME_WIDTH).unwrap_or_default(),
            height = capture.get(CAP_PROP_FRAME_HEIGHT).unwrap_or_default()
        );

        Ok(Self {
            capture,
            raw: blank_frame()?,
            live,
        })
    }
}

impl FrameSource for Camera {
    type Frame = Mat;

    fn next_frame(&mut self) -> Result<Frame<Mat>, Error> {
        let read = self.capture.read(&mut self.raw).map_err(Error::ReadFrame)?;
        if !read || self.raw.rows() == 0 || self.raw.cols() == 0 {
            return Ok(if self.live {
                Frame::NotReady
            } else {
                Frame::Exhausted
            });
        }

        let mut frame = blank_frame()?;
        resize(
            &self.raw,
            &mut frame,
            Size::new(SURFACE_WIDTH, SURFACE_HEIGHT),
            0.0,
            0.0,
            INTER_LINEAR,
        )
        .map_err(Error::ResizeFrame)?;

        Ok(Frame::Ready(frame))
    }
}

/// A single-pose PoseNet network run through OpenCV's dnn module.
pub(crate) struct PoseNet {
    net: dnn::Net,
    output_names: Vector<String>,
    decoder: Decoder,
    input_width: u16,
    input_height: u16,
}

impl PoseNet {
    #[instrument(name = "PoseNet::new")]
    pub(crate) fn new(
        model_path: &Path,
        decoder: Decoder,
        input_width: u16,
        input_height: u16,
    ) -> Result<Self, Error> {
        let path = model_path
            .to_str()
            .ok_or_else(|| Error::GetPathAsStr(PathBuf::from(model_path)))?;
        let mut net = dnn::read_net(path, "", "").map_err(|e| Error::ReadNet(e, model_path.into()))?;
        let output_names = net
            .get_unconnected_out_layers_names()
            .map_err(Error::GetOutputNames)?;

        info!(
            message = "loaded pose network",
            outputs = ?output_names.to_vec(),
            input_width,
            input_height
        );

        Ok(Self {
            net,
            output_names,
            decoder,
            input_width,
            input_height,
        })
    }

    /// The output whose channel count on the heatmap grid is `channels`.
    fn output<'a>(
        &self,
        outputs: &'a [Mat],
        grid: (usize, usize),
        channels: usize,
    ) -> Result<ArrayView3<'a, f32>, Error> {
        for output in outputs {
            let data = output.data_typed::<f32>().map_err(Error::GetTypedData)?;
            if data.len() == grid.0 * grid.1 * channels {
                return self.decoder.view(data, grid);
            }
        }
        Err(Error::MissingOutput(channels))
    }
}

impl PoseEstimator<Mat> for PoseNet {
    fn estimate_pose(&mut self, frame: &Mat) -> Result<Pose, Error> {
        // PoseNet expects RGB scaled to [-1, 1]
        let blob = dnn::blob_from_image(
            frame,
            1.0 / 127.5,
            Size::new(i32::from(self.input_width), i32::from(self.input_height)),
            Scalar::all(127.5),
            true,
            false,
            CV_32F,
        )
        .map_err(Error::BlobFromImage)?;
        self.net
            .set_input(&blob, "", 1.0, Scalar::default())
            .map_err(Error::SetInput)?;

        let mut outputs = Vector::<Mat>::new();
        self.net
            .forward(&mut outputs, &self.output_names)
            .map_err(Error::Forward)?;
        let outputs = outputs.to_vec();

        let grid = self.decoder.grid(self.input_height, self.input_width)?;
        let num_keypoints = crate::pose::NUM_KEYPOINTS;
        let heatmaps = self.output(&outputs, grid, num_keypoints)?;
        let offsets = self.output(&outputs, grid, 2 * num_keypoints)?;

        let scale_y = frame.rows().to_f32().ok_or(Error::ConvertToF32)? / f32::from(self.input_height);
        let scale_x = frame.cols().to_f32().ok_or(Error::ConvertToF32)? / f32::from(self.input_width);

        self.decoder.decode(heatmaps, offsets, (scale_y, scale_x))
    }
}
