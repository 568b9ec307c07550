use std::fmt;

/// Which of the three sampled frames a check refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FramePosition {
    Start,
    Middle,
    End,
}

impl FramePosition {
    pub const ALL: [FramePosition; 3] = [
        FramePosition::Start,
        FramePosition::Middle,
        FramePosition::End,
    ];

    /// Frame index sampled for this position in a clip of `total_frames`.
    pub fn frame_index(self, total_frames: usize) -> usize {
        match self {
            FramePosition::Start => 0,
            FramePosition::Middle => total_frames / 2,
            FramePosition::End => total_frames.saturating_sub(1),
        }
    }
}

impl fmt::Display for FramePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FramePosition::Start => write!(f, "start"),
            FramePosition::Middle => write!(f, "mid"),
            FramePosition::End => write!(f, "end"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(100, [0, 50, 99])]
    #[case(31, [0, 15, 30])]
    #[case(1, [0, 0, 0])]
    #[case(0, [0, 0, 0])]
    fn test_frame_index(#[case] total: usize, #[case] expected: [usize; 3]) {
        let indices = FramePosition::ALL.map(|p| p.frame_index(total));
        assert_eq!(indices, expected);
    }

    #[test]
    fn test_display_names() {
        assert_eq!(FramePosition::Start.to_string(), "start");
        assert_eq!(FramePosition::Middle.to_string(), "mid");
        assert_eq!(FramePosition::End.to_string(), "end");
    }
}
