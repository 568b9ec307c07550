//! Curates a folder of short videos into per-identity folders.
//!
//! Each video is sampled at its first, middle and last frame, the dominant
//! face of each frame is checked for size and cross-frame consistency, and
//! the video is matched against (or added to) a persistent database of
//! identity centroids. Rejected videos go to a trash folder with an
//! annotated debug composite.

pub mod shared {
    pub mod bounding_box;
    pub mod constants;
    pub mod frame;
    pub mod frame_position;
    pub mod rejection;
    pub mod video_metadata;
}

pub mod video {
    pub mod domain {
        pub mod frame_sampler;
        pub mod image_writer;
        pub mod video_reader;
    }
    pub mod infrastructure {
        pub mod ffmpeg_reader;
        pub mod image_file_writer;
    }
}

pub mod detection {
    pub mod domain {
        pub mod face_oracle;
        pub mod face_validator;
    }
    pub mod infrastructure;
}

pub mod identity {
    pub mod domain {
        pub mod embedding;
        pub mod identity_database;
        pub mod match_strategy;
    }
    pub mod infrastructure {
        pub mod database_file;
    }
}

pub mod commit {
    pub mod commit_gate;
    pub mod curation_session;
    pub mod debug_renderer;
    pub mod metadata_log;
    pub mod output_layout;
    pub mod router;
}

pub mod pipeline {
    pub mod curate_videos_use_case;
    pub mod curation_config;
    pub mod curation_error;
    pub mod curation_logger;
    pub mod curation_summary;
    pub mod video_source;
}
