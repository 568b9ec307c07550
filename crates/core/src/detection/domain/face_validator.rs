use crate::detection::domain::face_oracle::{FaceDetection, FaceOracle};
use crate::identity::domain::embedding::{cosine_similarity, l2_norm, video_descriptor};
use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;
use crate::shared::frame_position::FramePosition;
use crate::shared::rejection::Rejection;

/// Below this length the three summed embeddings point nowhere.
const CANCELLED_SUM_NORM: f64 = 1e-3;

/// Dominant face of one sampled frame.
#[derive(Clone, Debug, PartialEq)]
pub enum FaceSelection {
    Found(FaceDetection),
    TooSmall {
        face: FaceDetection,
        size: f64,
        threshold: f64,
    },
    NotFound,
}

impl FaceSelection {
    pub fn bbox(&self) -> Option<BoundingBox> {
        match self {
            FaceSelection::Found(face) | FaceSelection::TooSmall { face, .. } => Some(face.bbox),
            FaceSelection::NotFound => None,
        }
    }

    /// The selected face, or the rejection for the frame at `position`.
    pub fn into_face(self, position: FramePosition) -> Result<FaceDetection, Rejection> {
        match self {
            FaceSelection::Found(face) => Ok(face),
            FaceSelection::NotFound => Err(Rejection::NoFaceFound { position }),
            FaceSelection::TooSmall {
                size, threshold, ..
            } => Err(Rejection::FaceTooSmall {
                position,
                size,
                threshold,
            }),
        }
    }
}

/// Faces of a video that passed every check, plus its identity signature.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedVideo {
    pub faces: [FaceDetection; 3],
    /// `normalize(e_start + e_mid + e_end)`.
    pub descriptor: Vec<f32>,
}

impl ValidatedVideo {
    pub fn boxes(&self) -> [BoundingBox; 3] {
        [self.faces[0].bbox, self.faces[1].bbox, self.faces[2].bbox]
    }
}

/// Per-frame selections (for debug rendering) and the verdict.
#[derive(Clone, Debug)]
pub struct FaceValidation {
    pub boxes: [Option<BoundingBox>; 3],
    pub verdict: Result<ValidatedVideo, Rejection>,
}

/// Selects the dominant face in each sampled frame and checks that the
/// three frames show the same person.
pub struct FaceValidator {
    oracle: Box<dyn FaceOracle>,
    min_face_ratio: f64,
    similarity_threshold: f64,
}

impl FaceValidator {
    pub fn new(oracle: Box<dyn FaceOracle>, min_face_ratio: f64, similarity_threshold: f64) -> Self {
        Self {
            oracle,
            min_face_ratio,
            similarity_threshold,
        }
    }

    /// Queries the oracle on all three frames, then reports the first
    /// failing check in start, mid, end order.
    ///
    /// Oracle failures are returned as `Err`; validation failures are a
    /// `Rejection` inside the returned verdict.
    pub fn validate(
        &mut self,
        frames: [&Frame; 3],
    ) -> Result<FaceValidation, Box<dyn std::error::Error>> {
        let [start, middle, end] = frames;
        let selections = [
            self.select_dominant(start)?,
            self.select_dominant(middle)?,
            self.select_dominant(end)?,
        ];
        let boxes = [
            selections[0].bbox(),
            selections[1].bbox(),
            selections[2].bbox(),
        ];

        let [start, middle, end] = selections;
        let [p0, p1, p2] = FramePosition::ALL;
        let verdict = match (start.into_face(p0), middle.into_face(p1), end.into_face(p2)) {
            (Ok(a), Ok(b), Ok(c)) => self.check_consistency([a, b, c]),
            (Err(rejection), _, _) | (_, Err(rejection), _) | (_, _, Err(rejection)) => {
                Err(rejection)
            }
        };
        Ok(FaceValidation { boxes, verdict })
    }

    /// Picks the largest face by `max(width, height)`.
    ///
    /// Candidates are scanned in oracle order with a strict `>`, so on a
    /// size tie the first-reported face is kept.
    pub fn select_dominant(
        &mut self,
        frame: &Frame,
    ) -> Result<FaceSelection, Box<dyn std::error::Error>> {
        let faces = self.oracle.analyze(frame)?;

        let mut largest: Option<(f64, FaceDetection)> = None;
        for face in faces {
            let size = face.bbox.size();
            if largest.as_ref().map_or(true, |(best, _)| size > *best) {
                largest = Some((size, face));
            }
        }

        let Some((size, face)) = largest else {
            return Ok(FaceSelection::NotFound);
        };

        let threshold = self.min_face_ratio * frame.longest_side() as f64;
        if size < threshold {
            return Ok(FaceSelection::TooSmall {
                face,
                size,
                threshold,
            });
        }
        Ok(FaceSelection::Found(face))
    }

    fn check_consistency(&self, faces: [FaceDetection; 3]) -> Result<ValidatedVideo, Rejection> {
        let pairs = [
            (FramePosition::Start, FramePosition::Middle, 0, 1),
            (FramePosition::Middle, FramePosition::End, 1, 2),
        ];
        for (first, second, a, b) in pairs {
            let score = cosine_similarity(&faces[a].embedding, &faces[b].embedding);
            if score < self.similarity_threshold {
                return Err(Rejection::IdentityMismatch {
                    first,
                    second,
                    score,
                });
            }
        }

        let [a, b, c] = [&faces[0].embedding, &faces[1].embedding, &faces[2].embedding];
        let summed: Vec<f32> = a.iter().zip(b).zip(c).map(|((x, y), z)| x + y + z).collect();
        // Embeddings that cancel out have no direction to store as a centroid.
        if l2_norm(&summed) < CANCELLED_SUM_NORM {
            return Err(Rejection::IdentityMismatch {
                first: FramePosition::Start,
                second: FramePosition::End,
                score: cosine_similarity(a, c),
            });
        }
        let descriptor = video_descriptor(a, b, c);
        Ok(ValidatedVideo { faces, descriptor })
    }
}
