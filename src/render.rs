use crate::{
    counter::{RepState, Stage},
    error::Error,
    sampler::{Observation, Renderer},
};
use indicatif::{ProgressBar, ProgressStyle};
use num_traits::cast::ToPrimitive;
use serde::Serialize;
use std::io::Write;

/// Minimum score for a keypoint to be drawn.
#[cfg_attr(not(feature = "gui"), allow(dead_code))]
pub(crate) const KEYPOINT_THRESHOLD: f32 = 0.6;

/// Minimum score of both ends for a skeleton edge to be drawn.
#[cfg_attr(not(feature = "gui"), allow(dead_code))]
pub(crate) const SKELETON_THRESHOLD: f32 = 0.7;

/// The text shown over the video.
#[cfg_attr(not(feature = "gui"), allow(dead_code))]
pub(crate) fn overlay_text(state: &RepState) -> [String; 2] {
    [
        format!("Reps: {}", state.count),
        format!("Stage: {}", state.stage),
    ]
}

fn status_line(observation: &Observation<'_>) -> Result<String, Error> {
    let inference_secs = observation.timing.inference.as_secs_f64();
    let fps = if inference_secs > 0.0 {
        observation
            .timing
            .frames
            .to_f64()
            .ok_or(Error::ConvertToF64)?
            / inference_secs
    } else {
        0.0
    };
    let angle = observation
        .angle
        .map_or_else(|| "-".to_owned(), |angle| format!("{:.0}", angle));

    Ok(format!(
        "reps: {} | stage: {} | angle: {} | model FPS: {:.1}",
        observation.state.count, observation.state.stage, angle, fps
    ))
}

/// A terminal spinner with the current count and stage.
pub(crate) struct Progress {
    bar: ProgressBar,
}

impl Progress {
    pub(crate) fn new() -> Self {
        Self {
            bar: ProgressBar::new_spinner().with_style(
                ProgressStyle::default_spinner()
                    .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
                    .template("{prefix:.bold.dim} {spinner} {wide_msg}"),
            ),
        }
    }
}

impl<F> Renderer<F> for Progress {
    fn render(&mut self, _frame: &mut F, observation: &Observation<'_>) -> Result<(), Error> {
        self.bar.set_message(status_line(observation)?);
        self.bar.inc(1);
        Ok(())
    }
}

impl Drop for Progress {
    fn drop(&mut self) {
        self.bar.finish();
    }
}

#[derive(Debug, Serialize)]
struct Report {
    counter: u32,
    stage: Stage,
}

/// Writes `{"counter": N, "stage": "up"}` whenever the count or stage changes.
pub(crate) struct StateReporter<W> {
    writer: W,
    last: Option<(u32, Stage)>,
}

impl<W> StateReporter<W>
where
    W: Write,
{
    pub(crate) fn new(writer: W) -> Self {
        Self { writer, last: None }
    }
}

impl<F, W> Renderer<F> for StateReporter<W>
where
    W: Write,
{
    fn render(&mut self, _frame: &mut F, observation: &Observation<'_>) -> Result<(), Error> {
        let RepState { count, stage, .. } = observation.state;
        if self.last == Some((count, stage)) {
            return Ok(());
        }
        self.last = Some((count, stage));

        let report = Report {
            counter: count,
            stage,
        };
        serde_json::to_writer(&mut self.writer, &report).map_err(Error::SerializeRecord)?;
        writeln!(self.writer).map_err(Error::WriteRecord)?;
        self.writer.flush().map_err(Error::WriteRecord)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{pose::Pose, sampler::Timing};
    use std::time::Duration;

    fn observation(pose: &Pose, count: u32, stage: Stage) -> Observation<'_> {
        Observation {
            pose,
            angle: Some(42.4),
            state: RepState {
                stage,
                count,
                has_counted: stage == Stage::Up,
            },
            timing: Timing {
                inference: Duration::from_secs(2),
                frames: 20,
                skipped: 0,
            },
        }
    }

    #[test]
    fn overlay_shows_count_and_stage() {
        let state = RepState {
            stage: Stage::Up,
            count: 7,
            has_counted: true,
        };
        assert_eq!(overlay_text(&state), ["Reps: 7".to_owned(), "Stage: up".to_owned()]);
    }

    #[test]
    fn status_line_contents() {
        let pose = Pose::default();
        assert_eq!(
            status_line(&observation(&pose, 3, Stage::Down)).unwrap(),
            "reps: 3 | stage: down | angle: 42 | model FPS: 10.0"
        );
    }

    #[test]
    fn status_line_before_any_inference() {
        let pose = Pose::default();
        let mut observation = observation(&pose, 0, Stage::Down);
        observation.angle = None;
        observation.timing = Timing::default();
        assert_eq!(
            status_line(&observation).unwrap(),
            "reps: 0 | stage: down | angle: - | model FPS: 0.0"
        );
    }

    #[test]
    fn reports_only_changes() {
        let pose = Pose::default();
        let mut reporter = StateReporter::new(Vec::new());
        for &(count, stage) in &[
            (0, Stage::Down),
            (0, Stage::Down),
            (1, Stage::Up),
            (1, Stage::Up),
            (1, Stage::Down),
        ] {
            reporter
                .render(&mut (), &observation(&pose, count, stage))
                .unwrap();
        }

        assert_eq!(
            String::from_utf8(reporter.writer).unwrap(),
            concat!(
                "{\"counter\":0,\"stage\":\"down\"}\n",
                "{\"counter\":1,\"stage\":\"up\"}\n",
                "{\"counter\":1,\"stage\":\"down\"}\n",
            )
        );
    }
}
