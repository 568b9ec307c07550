use thiserror::Error;

use crate::shared::frame_position::FramePosition;

/// Why a video was routed to the trash instead of an identity folder.
///
/// Rejections never abort a run. The `Display` text is the reason that gets
/// logged and written on the debug composite.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Rejection {
    #[error("video unreadable: {0}")]
    VideoUnreadable(String),

    #[error("too few frames: {found} < {min}")]
    TooFewFrames { found: usize, min: usize },

    #[error("{position} frame face not found")]
    NoFaceFound { position: FramePosition },

    #[error("{position} frame face too small: {size:.0} < {threshold:.0}")]
    FaceTooSmall {
        position: FramePosition,
        size: f64,
        threshold: f64,
    },

    #[error("faces({first}, {second}) are not consistent: score {score:.2}")]
    IdentityMismatch {
        first: FramePosition,
        second: FramePosition,
        score: f64,
    },
}

impl Rejection {
    /// Stable short name, used to aggregate rejections in the run summary.
    pub fn kind(&self) -> &'static str {
        match self {
            Rejection::VideoUnreadable(_) => "video_unreadable",
            Rejection::TooFewFrames { .. } => "too_few_frames",
            Rejection::NoFaceFound { .. } => "no_face_found",
            Rejection::FaceTooSmall { .. } => "face_too_small",
            Rejection::IdentityMismatch { .. } => "identity_mismatch",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_too_few_frames_names_both_counts() {
        let reason = Rejection::TooFewFrames { found: 10, min: 30 }.to_string();
        assert!(reason.contains("10"));
        assert!(reason.contains("30"));
    }

    #[test]
    fn test_face_too_small_reports_sizes() {
        let reason = Rejection::FaceTooSmall {
            position: FramePosition::Middle,
            size: 87.6,
            threshold: 192.0,
        }
        .to_string();
        assert_eq!(reason, "mid frame face too small: 88 < 192");
    }

    #[test]
    fn test_identity_mismatch_names_pair_and_score() {
        let reason = Rejection::IdentityMismatch {
            first: FramePosition::Middle,
            second: FramePosition::End,
            score: 0.4321,
        }
        .to_string();
        assert_eq!(reason, "faces(mid, end) are not consistent: score 0.43");
    }

    #[rstest]
    #[case(Rejection::VideoUnreadable("x".into()), "video_unreadable")]
    #[case(Rejection::TooFewFrames { found: 1, min: 2 }, "too_few_frames")]
    #[case(Rejection::NoFaceFound { position: FramePosition::Start }, "no_face_found")]
    fn test_kind(#[case] rejection: Rejection, #[case] expected: &str) {
        assert_eq!(rejection.kind(), expected);
    }
}
