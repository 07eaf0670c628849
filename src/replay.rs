use crate::{
    error::Error,
    pose::Pose,
    sampler::{Frame, FrameSource, Observation, PoseEstimator, Renderer},
};
use std::io::{BufRead, Lines, Write};

/// Poses recorded one JSON object per line, in the shape PoseNet's JS API reports them.
///
/// A blank line stands for a tick on which no frame was ready.
pub(crate) struct Replay<R> {
    lines: Lines<R>,
    line: usize,
}

impl<R> Replay<R>
where
    R: BufRead,
{
    pub(crate) fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line: 0,
        }
    }
}

impl<R> FrameSource for Replay<R>
where
    R: BufRead,
{
    type Frame = Pose;

    fn next_frame(&mut self) -> Result<Frame<Pose>, Error> {
        let text = match self.lines.next() {
            Some(text) => text.map_err(Error::ReadReplay)?,
            None => return Ok(Frame::Exhausted),
        };
        self.line += 1;

        if text.trim().is_empty() {
            return Ok(Frame::NotReady);
        }

        let line = self.line;
        serde_json::from_str(&text)
            .map(Frame::Ready)
            .map_err(|source| Error::ParseReplay { source, line })
    }
}

/// Recorded frames already are poses.
pub(crate) struct Recorded;

impl PoseEstimator<Pose> for Recorded {
    fn estimate_pose(&mut self, frame: &Pose) -> Result<Pose, Error> {
        Ok(frame.clone())
    }
}

/// Writes every estimated pose as a line `Replay` can read back.
#[cfg_attr(not(feature = "camera"), allow(dead_code))]
pub(crate) struct Recorder<W> {
    writer: W,
}

#[cfg_attr(not(feature = "camera"), allow(dead_code))]
impl<W> Recorder<W>
where
    W: Write,
{
    pub(crate) fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<F, W> Renderer<F> for Recorder<W>
where
    W: Write,
{
    fn render(&mut self, _frame: &mut F, observation: &Observation<'_>) -> Result<(), Error> {
        serde_json::to_writer(&mut self.writer, observation.pose).map_err(Error::SerializeRecord)?;
        writeln!(self.writer).map_err(Error::WriteRecord)?;
        self.writer.flush().map_err(Error::WriteRecord)
    }
}
