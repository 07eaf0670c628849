use anyhow::{Context, Result};
use counter::{RepCounter, RepState, Thresholds};
use pose::Side;
use render::{Progress, StateReporter};
use replay::{Recorded, Replay};
use sampler::{FrameSource, PoseEstimator, Sampler};
use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use structopt::StructOpt;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;

mod angle;
#[cfg(feature = "camera")]
mod camera;
mod counter;
#[cfg_attr(not(feature = "camera"), allow(dead_code))]
mod decode;
mod error;
#[cfg(feature = "gui")]
mod overlay;
mod pose;
mod render;
mod replay;
mod sampler;

/// Count biceps curls from the elbow angle of a tracked arm.
#[derive(Debug, StructOpt)]
struct Opt {
    #[structopt(flatten)]
    session: Session,

    #[structopt(short, long, default_value = "info", env = "RUST_LOG")]
    log_level: tracing_subscriber::filter::EnvFilter,

    #[structopt(subcommand)]
    source: Source,
}

#[derive(Debug, StructOpt)]
struct Session {
    /// Milliseconds between pose samples.
    #[structopt(long, default_value = sampler::DEFAULT_INTERVAL_MS)]
    interval_ms: u64,

    /// The arm to track: left or right.
    #[structopt(long, default_value = "right")]
    side: Side,

    /// Elbow angle in degrees above which the arm is extended.
    #[structopt(long, default_value = counter::DEFAULT_DOWN_ABOVE)]
    down_above: f32,

    /// Elbow angle in degrees below which the arm is curled.
    #[structopt(long, default_value = counter::DEFAULT_UP_BELOW)]
    up_below: f32,

    /// Minimum score of shoulder, elbow and wrist for a sample to count.
    #[structopt(long, default_value = "0.0")]
    min_joint_score: f32,

    /// Stop after this many ticks, counting ticks on which no frame was ready.
    #[structopt(long)]
    max_ticks: Option<usize>,

    #[structopt(short, long)]
    show_progress: bool,

    /// Print `{"counter": N, "stage": "..."}` to stdout whenever either changes.
    #[structopt(long)]
    json: bool,
}

#[derive(Debug, StructOpt)]
enum Source {
    /// Count reps in poses recorded one JSON object per line.
    Replay {
        /// Recording to read, or `-` for stdin.
        #[structopt(parse(from_os_str))]
        path: PathBuf,
    },

    /// Count reps live from a camera or a video file.
    Camera(CameraOpt),
}

#[cfg_attr(not(feature = "gui"), allow(dead_code))]
#[derive(Debug, StructOpt)]
struct CameraOpt {
    /// Path to a single-pose PoseNet model OpenCV's dnn module can read.
    #[structopt(parse(from_os_str))]
    model: PathBuf,

    /// A v4l2 compatible device: /dev/videoDEVICE
    #[structopt(short, long, default_value = "0")]
    device: i32,

    /// Read frames from a video file instead of a device.
    #[structopt(long, parse(from_os_str))]
    video: Option<PathBuf>,

    /// The width of the image the model expects.
    #[structopt(short, long, default_value = "641")]
    width: u16,

    /// The height of the image the model expects.
    #[structopt(short = "-H", long, default_value = "481")]
    height: u16,

    /// The width of the input frame.
    #[structopt(long)]
    frame_width: Option<u16>,

    /// The height of the input frame.
    #[structopt(long)]
    frame_height: Option<u16>,

    #[structopt(flatten)]
    decoder: decode::Decoder,

    /// Append every estimated pose to this file in the replay format.
    #[structopt(long, parse(from_os_str))]
    record: Option<PathBuf>,

    #[structopt(short = "-W", long, default_value = "1")]
    wait_key_ms: i32,
}

impl Session {
    fn counter(&self) -> Result<RepCounter, error::Error> {
        Thresholds::new(self.down_above, self.up_below).map(RepCounter::new)
    }

    fn run<S, E>(&self, mut sampler: Sampler<S, E>, running: &AtomicBool) -> Result<RepState>
    where
        S: FrameSource,
        S::Frame: 'static,
        E: PoseEstimator<S::Frame>,
    {
        if self.show_progress {
            sampler = sampler.with_renderer(Progress::new());
        }
        if self.json {
            sampler = sampler.with_renderer(StateReporter::new(io::stdout()));
        }

        let state = sampler
            .run(
                running,
                Duration::from_millis(self.interval_ms),
                self.max_ticks,
            )
            .context("sampling poses failed")?;

        let timing = sampler.timing();
        info!(
            message = "session finished",
            count = state.count,
            stage = %state.stage,
            frames = timing.frames,
            skipped = timing.skipped,
            inference = ?timing.inference
        );
        Ok(state)
    }
}

fn replay(session: &Session, path: &Path, running: &AtomicBool) -> Result<RepState> {
    let reader: Box<dyn BufRead> = if path == Path::new("-") {
        Box::new(BufReader::new(io::stdin()))
    } else {
        Box::new(BufReader::new(File::open(path).with_context(|| {
            format!("failed to open recording {}", path.display())
        })?))
    };

    let sampler = Sampler::new(
        Replay::new(reader),
        Recorded,
        session.counter()?,
        session.side,
        session.min_joint_score,
    );
    session.run(sampler, running)
}

#[cfg(feature = "camera")]
fn camera(session: &Session, opt: &CameraOpt, running: Arc<AtomicBool>) -> Result<RepState> {
    use camera::{Camera, PoseNet};

    let source = match &opt.video {
        Some(path) => Camera::open_file(path),
        None => Camera::open_device(opt.device, opt.frame_width, opt.frame_height),
    }
    .context("failed opening video source")?;
    let estimator = PoseNet::new(&opt.model, opt.decoder, opt.width, opt.height)
        .context("failed constructing pose network")?;

    let mut sampler = Sampler::new(
        source,
        estimator,
        session.counter()?,
        session.side,
        session.min_joint_score,
    );

    #[cfg(feature = "gui")]
    {
        sampler = sampler.with_renderer(overlay::Overlay::new(running.clone(), opt.wait_key_ms));
    }

    if let Some(path) = &opt.record {
        let file = File::create(path)
            .with_context(|| format!("failed to create recording {}", path.display()))?;
        sampler = sampler.with_renderer(replay::Recorder::new(io::BufWriter::new(file)));
    }

    session.run(sampler, &running)
}

#[cfg(not(feature = "camera"))]
fn camera(_session: &Session, _opt: &CameraOpt, _running: Arc<AtomicBool>) -> Result<RepState> {
    Err(anyhow::anyhow!(
        "camera support requires building with the `camera` feature"
    ))
}

fn main() -> Result<()> {
    let Opt {
        session,
        log_level,
        source,
    } = Opt::from_args();

    tracing::subscriber::set_global_default(
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
            .with(log_level),
    )?;

    let running = Arc::new(AtomicBool::new(true));
    let running_ctrl_c = running.clone();

    ctrlc::set_handler(move || {
        running_ctrl_c.store(false, Ordering::SeqCst);
    })
    .context("failed setting Ctrl-C handler")?;

    let state = match &source {
        Source::Replay { path } => replay(&session, path, &running)?,
        Source::Camera(opt) => camera(&session, opt, running)?,
    };

    if !session.json {
        println!("Reps: {}", state.count);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Opt {
        Opt::from_iter_safe(std::iter::once("curl-counter").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn replay_defaults() {
        let opt = parse(&["replay", "session.jsonl"]);
        assert_eq!(opt.session.interval_ms, 100);
        assert_eq!(opt.session.side, Side::Right);
        assert_eq!(opt.session.max_ticks, None);
        assert!(!opt.session.json);
        match opt.source {
            Source::Replay { path } => assert_eq!(path, PathBuf::from("session.jsonl")),
            other => panic!("unexpected source {:?}", other),
        }

        let state = opt.session.counter().unwrap().state();
        assert_eq!(state.count, 0);
    }

    #[test]
    fn session_flags() {
        let opt = parse(&[
            "--side",
            "left",
            "--down-above",
            "160",
            "--up-below",
            "30",
            "--interval-ms",
            "0",
            "--max-ticks",
            "5",
            "--json",
            "replay",
            "-",
        ]);
        assert_eq!(opt.session.side, Side::Left);
        assert_eq!(opt.session.interval_ms, 0);
        assert_eq!(opt.session.max_ticks, Some(5));
        assert!(opt.session.json);
        assert!(opt.session.counter().is_ok());
    }

    #[test]
    fn inverted_thresholds_are_rejected() {
        let opt = parse(&["--down-above", "50", "--up-below", "60", "replay", "-"]);
        assert!(opt.session.counter().is_err());
    }

    #[test]
    fn unknown_side_is_rejected() {
        assert!(Opt::from_iter_safe(&["curl-counter", "--side", "middle", "replay", "-"]).is_err());
    }

    #[test]
    fn camera_options() {
        let opt = parse(&[
            "camera",
            "posenet.onnx",
            "-d",
            "2",
            "--output-stride",
            "32",
            "--layout",
            "nhwc",
            "--probabilities",
        ]);
        match opt.source {
            Source::Camera(camera) => {
                assert_eq!(camera.model, PathBuf::from("posenet.onnx"));
                assert_eq!(camera.device, 2);
                assert_eq!((camera.width, camera.height), (641, 481));
                assert_eq!(camera.decoder.output_stride, 32);
                assert_eq!(camera.decoder.layout, decode::Layout::Nhwc);
                assert!(camera.decoder.probabilities);
                assert_eq!(camera.record, None);
            }
            other => panic!("unexpected source {:?}", other),
        }
    }
}
