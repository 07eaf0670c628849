use crate::{
    error::Error,
    pose::Point,
    render::{self, KEYPOINT_THRESHOLD, SKELETON_THRESHOLD},
    sampler::{Observation, Renderer},
};
use num_traits::cast::ToPrimitive;
use opencv::{
    core::{Mat, Scalar},
    imgproc::{FONT_HERSHEY_SIMPLEX, LINE_8, LINE_AA},
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

const GREEN: (f64, f64, f64) = (0.0, 255.0, 0.0);
const YELLOW: (f64, f64, f64) = (0.0, 255.0, 255.0);
const WHITE: (f64, f64, f64) = (255.0, 255.0, 255.0);

fn pixel(point: Point) -> Result<opencv::core::Point, Error> {
    Ok(opencv::core::Point::new(
        point.x.round().to_i32().ok_or(Error::ConvertPointToPixel(point))?,
        point.y.round().to_i32().ok_or(Error::ConvertPointToPixel(point))?,
    ))
}

/// Draws keypoints, the skeleton and the rep count over each frame and shows it in a
/// window. Pressing `q` in the window clears `running`.
pub(crate) struct Overlay {
    running: Arc<AtomicBool>,
    wait_key_ms: i32,
}

impl Overlay {
    pub(crate) fn new(running: Arc<AtomicBool>, wait_key_ms: i32) -> Self {
        Self {
            running,
            wait_key_ms,
        }
    }

    fn show(&self, frame: &Mat) -> Result<(), Error> {
        const Q_KEY: u8 = b'q';

        opencv::highgui::imshow("curl-counter", frame).map_err(Error::ImShow)?;
        if opencv::highgui::wait_key(self.wait_key_ms).map_err(Error::WaitKey)? == i32::from(Q_KEY)
        {
            self.running.store(false, Ordering::SeqCst);
        }
        Ok(())
    }
}

impl Renderer<Mat> for Overlay {
    fn render(&mut self, frame: &mut Mat, observation: &Observation<'_>) -> Result<(), Error> {
        let pose = observation.pose;

        for keypoint in pose.visible_keypoints(KEYPOINT_THRESHOLD) {
            opencv::imgproc::circle(
                frame,
                pixel(keypoint.point)?,
                3,
                Scalar::from(GREEN),
                -1,     // thickness
                LINE_8, // line_type
                0,      // shift
            )
            .map_err(Error::DrawCircle)?;
        }

        for (a, b) in pose.skeleton(SKELETON_THRESHOLD) {
            opencv::imgproc::line(
                frame,
                pixel(a.point)?,
                pixel(b.point)?,
                Scalar::from(YELLOW),
                2,      // thickness
                LINE_8, // line_type
                0,      // shift
            )
            .map_err(Error::DrawLine)?;
        }

        let baselines = [30, 65];
        for (text, &baseline) in render::overlay_text(&observation.state)
            .iter()
            .zip(&baselines)
        {
            opencv::imgproc::put_text(
                frame,
                text,
                opencv::core::Point::new(10, baseline),
                FONT_HERSHEY_SIMPLEX,
                1.0,
                Scalar::from(WHITE),
                2,       // thickness
                LINE_AA, // line_type
                false,   // bottom_left_origin
            )
            .map_err(Error::PutText)?;
        }

        self.show(frame)
    }
}
