use crate::pose::KeypointKind;

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error("pose has no keypoint for joint {0:?}")]
    MissingJoint(KeypointKind),

    #[error("failed to convert usize value to keypoint kind: {0}")]
    ConvertUSizeToKeypointKind(usize),

    #[error("failed to convert value to f32")]
    ConvertToF32,

    #[error("failed to convert value to f64")]
    ConvertToF64,

    #[error("failed to construct NotNan from f32: {1}")]
    ConstructNotNan(#[source] ordered_float::FloatIsNan, f32),

    #[error("up threshold {up_below} must be below down threshold {down_above}")]
    InvertedThresholds { up_below: f32, down_above: f32 },

    #[error("unknown arm side {0:?}, expected `left` or `right`")]
    ParseSide(String),

    #[error("unknown tensor layout {0:?}, expected `nchw` or `nhwc`")]
    ParseLayout(String),

    #[error("output stride must be nonzero")]
    ZeroOutputStride,

    #[error("expected a tensor with {expected} channels, got {got}")]
    UnexpectedChannels { expected: usize, got: usize },

    #[error("heatmap grid {heatmaps:?} does not match offset grid {offsets:?}")]
    MismatchedGrid {
        heatmaps: (usize, usize),
        offsets: (usize, usize),
    },

    #[error("tensor of {len} values does not fill a whole number of channels on a {grid:?} grid")]
    RaggedTensor { len: usize, grid: (usize, usize) },

    #[error("failed to construct array view from tensor data")]
    ConstructArrayView(#[source] ndarray::ShapeError),

    #[error("heatmap tensor is empty")]
    EmptyHeatmap,

    #[error("failed to read replay input")]
    ReadReplay(#[source] std::io::Error),

    #[error("failed to parse pose on replay line {line}")]
    ParseReplay {
        #[source]
        source: serde_json::Error,
        line: usize,
    },

    #[error("failed to serialize record")]
    SerializeRecord(#[source] serde_json::Error),

    #[error("failed to write record")]
    WriteRecord(#[source] std::io::Error),

    #[cfg(feature = "camera")]
    #[error("failed to open video capture")]
    OpenCapture(#[source] opencv::Error),

    #[cfg(feature = "camera")]
    #[error("video capture {0} could not be opened")]
    CaptureNotOpened(String),

    #[cfg(feature = "camera")]
    #[error("failed to set video capture property")]
    SetCaptureProperty(#[source] opencv::Error),

    #[cfg(feature = "camera")]
    #[error("failed to read frame")]
    ReadFrame(#[source] opencv::Error),

    #[cfg(feature = "camera")]
    #[error("failed to allocate frame")]
    AllocateFrame(#[source] opencv::Error),

    #[cfg(feature = "camera")]
    #[error("failed to resize frame")]
    ResizeFrame(#[source] opencv::Error),

    #[cfg(feature = "camera")]
    #[error("failed to get path as &str: {0:?}")]
    GetPathAsStr(std::path::PathBuf),

    #[cfg(feature = "camera")]
    #[error("failed to load network from {1:?}")]
    ReadNet(#[source] opencv::Error, std::path::PathBuf),

    #[cfg(feature = "camera")]
    #[error("failed to get network output names")]
    GetOutputNames(#[source] opencv::Error),

    #[cfg(feature = "camera")]
    #[error("failed to build input blob")]
    BlobFromImage(#[source] opencv::Error),

    #[cfg(feature = "camera")]
    #[error("failed to set network input")]
    SetInput(#[source] opencv::Error),

    #[cfg(feature = "camera")]
    #[error("network forward pass failed")]
    Forward(#[source] opencv::Error),

    #[cfg(feature = "camera")]
    #[error("failed to get typed data from OpenCV Mat")]
    GetTypedData(#[source] opencv::Error),

    #[cfg(feature = "camera")]
    #[error("network produced no output with {0} channels")]
    MissingOutput(usize),

    #[cfg(feature = "gui")]
    #[error("failed to draw line")]
    DrawLine(#[source] opencv::Error),

    #[cfg(feature = "gui")]
    #[error("failed to draw circle")]
    DrawCircle(#[source] opencv::Error),

    #[cfg(feature = "gui")]
    #[error("failed to draw text")]
    PutText(#[source] opencv::Error),

    #[cfg(feature = "gui")]
    #[error("failed to convert point {0:?} to pixel coordinates")]
    ConvertPointToPixel(crate::pose::Point),

    #[cfg(feature = "gui")]
    #[error("failed to show image")]
    ImShow(#[source] opencv::Error),

    #[cfg(feature = "gui")]
    #[error("failed waiting for key press")]
    WaitKey(#[source] opencv::Error),
}
