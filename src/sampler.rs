use crate::{
    counter::{RepCounter, RepState, Transition},
    error::Error,
    pose::{KeypointKind, Pose, Side},
};
use std::{
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::{Duration, Instant},
};
use tracing::{debug, info, instrument, trace};

pub(crate) const DEFAULT_INTERVAL_MS: &str = "100";

/// The result of polling a frame source.
#[derive(Debug)]
pub(crate) enum Frame<F> {
    Ready(F),
    /// No frame yet; try again next tick.
    NotReady,
    /// The source has nothing more to give.
    Exhausted,
}

pub(crate) trait FrameSource {
    type Frame;

    fn next_frame(&mut self) -> Result<Frame<Self::Frame>, Error>;
}

pub(crate) trait PoseEstimator<F> {
    /// Estimate the single most likely pose in `frame`.
    fn estimate_pose(&mut self, frame: &F) -> Result<Pose, Error>;
}

/// What renderers get to see after each processed frame.
#[derive(Debug)]
pub(crate) struct Observation<'a> {
    pub(crate) pose: &'a Pose,
    /// Elbow angle, if the frame was counted.
    pub(crate) angle: Option<f32>,
    pub(crate) state: RepState,
    pub(crate) timing: Timing,
}

pub(crate) trait Renderer<F> {
    fn render(&mut self, frame: &mut F, observation: &Observation<'_>) -> Result<(), Error>;
}

#[derive(Debug, Copy, Clone, Default)]
pub(crate) struct Timing {
    pub(crate) inference: Duration,
    pub(crate) frames: usize,
    pub(crate) skipped: usize,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) enum Tick {
    NotReady,
    Exhausted,
    NoKeypoints,
    MissingJoint(KeypointKind),
    LowConfidence { kind: KeypointKind, score: f32 },
    Counted { angle: f32, transition: Transition },
}

/// Drives frames from a source through pose estimation, rep counting and rendering.
pub(crate) struct Sampler<S, E>
where
    S: FrameSource,
{
    source: S,
    estimator: E,
    renderers: Vec<Box<dyn Renderer<S::Frame>>>,
    counter: RepCounter,
    side: Side,
    min_joint_score: f32,
    timing: Timing,
}

impl<S, E> Sampler<S, E>
where
    S: FrameSource,
    E: PoseEstimator<S::Frame>,
{
    pub(crate) fn new(
        source: S,
        estimator: E,
        counter: RepCounter,
        side: Side,
        min_joint_score: f32,
    ) -> Self {
        Self {
            source,
            estimator,
            renderers: Vec::new(),
            counter,
            side,
            min_joint_score,
            timing: Default::default(),
        }
    }

    pub(crate) fn with_renderer<R>(mut self, renderer: R) -> Self
    where
        R: Renderer<S::Frame> + 'static,
    {
        self.renderers.push(Box::new(renderer));
        self
    }

    pub(crate) fn state(&self) -> RepState {
        self.counter.state()
    }

    pub(crate) fn timing(&self) -> Timing {
        self.timing
    }

    /// Run one sample, infer, count, render cycle.
    pub(crate) fn tick(&mut self) -> Result<Tick, Error> {
        let mut frame = match self.source.next_frame()? {
            Frame::Ready(frame) => frame,
            Frame::NotReady => {
                trace!("frame not ready, skipping tick");
                self.timing.skipped += 1;
                return Ok(Tick::NotReady);
            }
            Frame::Exhausted => return Ok(Tick::Exhausted),
        };

        let start_inference = Instant::now();
        let pose = self.estimator.estimate_pose(&frame)?;
        self.timing.inference += start_inference.elapsed();
        self.timing.frames += 1;

        let tick = self.count(&pose)?;
        let angle = match tick {
            Tick::Counted { angle, .. } => Some(angle),
            _ => None,
        };

        let observation = Observation {
            pose: &pose,
            angle,
            state: self.counter.state(),
            timing: self.timing,
        };
        for renderer in &mut self.renderers {
            renderer.render(&mut frame, &observation)?;
        }

        Ok(tick)
    }

    fn count(&mut self, pose: &Pose) -> Result<Tick, Error> {
        if pose.is_empty() {
            trace!("pose has no keypoints, not counting");
            return Ok(Tick::NoKeypoints);
        }

        let arm = match pose.arm(self.side) {
            Ok(arm) => arm,
            Err(Error::MissingJoint(kind)) => {
                debug!(message = "joint missing from pose, not counting", ?kind);
                return Ok(Tick::MissingJoint(kind));
            }
            Err(e) => return Err(e),
        };

        let weakest = arm.weakest();
        if weakest.score < self.min_joint_score {
            debug!(
                message = "joint below confidence threshold, not counting",
                kind = ?weakest.kind,
                score = weakest.score
            );
            return Ok(Tick::LowConfidence {
                kind: weakest.kind,
                score: weakest.score,
            });
        }

        let angle = arm.elbow_angle();
        let transition = self.counter.update(angle);
        match transition {
            Transition::Rep(count) => info!(message = "rep", count, angle),
            Transition::Lowered | Transition::Hold => trace!(message = "no rep", angle, ?transition),
        }

        Ok(Tick::Counted { angle, transition })
    }

    /// Tick every `interval` until `running` is cleared, the source is exhausted or
    /// `max_ticks` ticks have run. Ticks with no frame ready count towards `max_ticks`.
    ///
    /// Ticks never overlap: a tick that takes longer than `interval` delays the next one.
    #[instrument(name = "Sampler::run", skip(self, running))]
    pub(crate) fn run(
        &mut self,
        running: &AtomicBool,
        interval: Duration,
        max_ticks: Option<usize>,
    ) -> Result<RepState, Error> {
        let mut ticks = 0;

        while running.load(Ordering::SeqCst) && max_ticks.map_or(true, |max| ticks < max) {
            let tick_start = Instant::now();
            if self.tick()? == Tick::Exhausted {
                info!("frame source exhausted");
                break;
            }
            ticks += 1;

            if interval > Duration::default() {
                match interval.checked_sub(tick_start.elapsed()) {
                    Some(remaining) => thread::sleep(remaining),
                    None => debug!(
                        message = "tick overran interval",
                        elapsed = ?tick_start.elapsed(),
                        ?interval
                    ),
                }
            }
        }

        Ok(self.counter.state())
    }
}
