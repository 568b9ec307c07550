use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

/// One face reported by a [`FaceOracle`].
#[derive(Clone, Debug, PartialEq)]
pub struct FaceDetection {
    pub bbox: BoundingBox,
    pub score: f64,
    /// Identity embedding, L2-normalized by the oracle.
    pub embedding: Vec<f32>,
}

/// Black-box face detector + embedder.
///
/// Given one frame of arbitrary resolution, returns every candidate face in
/// the oracle's own order. Embedding dimensionality is opaque to callers.
pub trait FaceOracle: Send {
    fn analyze(&mut self, frame: &Frame) -> Result<Vec<FaceDetection>, Box<dyn std::error::Error>>;
}
