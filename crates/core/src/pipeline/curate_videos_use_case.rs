use std::path::{Path, PathBuf};

use crate::commit::commit_gate::CommitGate;
use crate::commit::curation_session::CurationSession;
use crate::commit::debug_renderer::DebugRenderer;
use crate::commit::metadata_log::MetadataLog;
use crate::commit::output_layout::OutputLayout;
use crate::commit::router::Router;
use crate::detection::domain::face_oracle::FaceOracle;
use crate::detection::domain::face_validator::FaceValidator;
use crate::identity::domain::identity_database::Assignment;
use crate::identity::infrastructure::database_file::DatabaseFile;
use crate::pipeline::curation_config::CurationConfig;
use crate::pipeline::curation_error::CurationError;
use crate::pipeline::curation_logger::CurationLogger;
use crate::pipeline::curation_summary::CurationSummary;
use crate::pipeline::video_source::list_videos;
use crate::shared::bounding_box::BoundingBox;
use crate::shared::constants::TIMESTAMP_FORMAT;
use crate::shared::frame::Frame;
use crate::shared::rejection::Rejection;
use crate::video::domain::frame_sampler::FrameSampler;
use crate::video::domain::image_writer::ImageWriter;
use crate::video::domain::video_reader::VideoReader;

/// What happened to one source video.
#[derive(Clone, Debug, PartialEq)]
pub enum VideoOutcome {
    Accepted {
        identity_id: String,
        created: bool,
        destination: PathBuf,
    },
    Rejected {
        rejection: Rejection,
        destination: PathBuf,
    },
}

/// Sorts every video of the source folder into an identity folder or the
/// trash, one video at a time.
///
/// Videos are processed sequentially: each assignment depends on the
/// database state left by all earlier videos.
pub struct CurateVideosUseCase {
    config: CurationConfig,
    sampler: FrameSampler,
    validator: FaceValidator,
    renderer: DebugRenderer,
    router: Router,
    logger: Box<dyn CurationLogger>,
}

impl CurateVideosUseCase {
    pub fn new(
        config: CurationConfig,
        reader: Box<dyn VideoReader>,
        oracle: Box<dyn FaceOracle>,
        image_writer: Box<dyn ImageWriter>,
        gate: CommitGate,
        logger: Box<dyn CurationLogger>,
    ) -> Self {
        let validator =
            FaceValidator::new(oracle, config.min_face_ratio, config.similarity_threshold);
        let router = Router::new(OutputLayout::new(&config.output), gate);
        Self {
            config,
            sampler: FrameSampler::new(reader),
            validator,
            renderer: DebugRenderer::new(image_writer),
            router,
            logger,
        }
    }

    /// Processes every video in the source folder.
    ///
    /// `timestamp` names the database backup and the configuration dump.
    pub fn execute(&mut self, timestamp: &str) -> Result<CurationSummary, CurationError> {
        let videos = list_videos(&self.config.source).map_err(|e| CurationError::Source {
            path: self.config.source.clone(),
            source: e,
        })?;
        let mut session = self.open_session(timestamp)?;
        self.logger.info(&format!(
            "Found {} videos in {}, {} identities known",
            videos.len(),
            self.config.source.display(),
            session.database().len()
        ));

        let mut summary = CurationSummary::default();
        let total = videos.len();
        for (i, video) in videos.iter().enumerate() {
            self.logger.progress(i + 1, total);
            match self.process(&mut session, video)? {
                VideoOutcome::Accepted { created, .. } => summary.record_accepted(created),
                VideoOutcome::Rejected { rejection, .. } => summary.record_rejected(&rejection),
            }
        }

        summary.identities = session.database().len();
        let log_path = self.router.layout().metadata_log();
        session
            .close()
            .map_err(|e| CurationError::MetadataLog {
                path: log_path,
                source: e,
            })?;
        self.logger.summary(&summary);
        Ok(summary)
    }

    /// Prepares the output folder and loads the run state: backs up and
    /// loads the identity database, dumps the configuration and opens the
    /// metadata log.
    pub fn open_session(&mut self, timestamp: &str) -> Result<CurationSession, CurationError> {
        let layout = self.router.layout().clone();
        layout.prepare().map_err(|e| CurationError::Output {
            path: layout.root().to_path_buf(),
            source: e,
        })?;

        let database_file = DatabaseFile::new(layout.database());
        if let Some(backup) = database_file.backup(timestamp)? {
            self.logger
                .info(&format!("Backed up identity database to {}", backup.display()));
        }
        let database = database_file.load()?;

        let dump = layout.config_dump(timestamp);
        self.config
            .dump(&dump)
            .map_err(|e| CurationError::ConfigDump {
                path: dump,
                source: e,
            })?;

        let log_path = layout.metadata_log();
        let log = MetadataLog::open(&log_path).map_err(|e| CurationError::MetadataLog {
            path: log_path,
            source: e,
        })?;
        Ok(CurationSession::new(database, database_file, log))
    }

    /// Samples, validates and routes one video.
    ///
    /// Problems with the video itself come back as
    /// [`VideoOutcome::Rejected`]; `Err` means the run must stop.
    pub fn process(
        &mut self,
        session: &mut CurationSession,
        video: &Path,
    ) -> Result<VideoOutcome, CurationError> {
        let triple = match self.sampler.sample(video) {
            Ok(triple) => triple,
            Err(e) => return self.reject(video, Rejection::VideoUnreadable(e.to_string()), None),
        };

        if triple.total_frames < self.config.min_frames {
            let rejection = Rejection::TooFewFrames {
                found: triple.total_frames,
                min: self.config.min_frames,
            };
            return self.reject(video, rejection, Some((triple.frames(), [None; 3])));
        }

        let validation =
            self.validator
                .validate(triple.frames())
                .map_err(|e| CurationError::Oracle {
                    video: video.to_path_buf(),
                    message: e.to_string(),
                })?;
        let validated = match validation.verdict {
            Ok(validated) => validated,
            Err(rejection) => {
                return self.reject(video, rejection, Some((triple.frames(), validation.boxes)))
            }
        };

        let assignment = session
            .database()
            .assign(
                &validated.descriptor,
                self.config.similarity_threshold,
                self.config.id_offset,
                self.config.match_strategy,
            )
            .map_err(|e| CurationError::identity(video.to_path_buf(), e))?;

        let committed = self
            .router
            .commit(session, video, &assignment, validated.boxes())
            .map_err(|e| CurationError::Commit {
                video: video.to_path_buf(),
                source: e,
            })?;

        if self.config.debug_accepted {
            let boxes = validated.boxes().map(Some);
            self.write_debug(
                &committed.record.video_stem,
                triple.frames(),
                boxes,
                &accepted_caption(&assignment),
            );
        }

        self.logger
            .accepted(video, assignment.id(), assignment.is_new());
        Ok(VideoOutcome::Accepted {
            identity_id: assignment.id().to_string(),
            created: assignment.is_new(),
            destination: committed.destination,
        })
    }

    fn reject(
        &mut self,
        video: &Path,
        rejection: Rejection,
        debug: Option<([&Frame; 3], [Option<BoundingBox>; 3])>,
    ) -> Result<VideoOutcome, CurationError> {
        log::warn!("{rejection}: {}", video.display());
        self.logger.rejected(video, &rejection);

        if let Some((frames, boxes)) = debug {
            self.write_debug(&file_stem(video), frames, boxes, &rejection.to_string());
        }

        let destination = self
            .router
            .discard(video)
            .map_err(|e| CurationError::Trash {
                video: video.to_path_buf(),
                source: e,
            })?;
        Ok(VideoOutcome::Rejected {
            rejection,
            destination,
        })
    }

    /// Debug composites are best effort: a failed write is logged only.
    fn write_debug(
        &self,
        stem: &str,
        frames: [&Frame; 3],
        boxes: [Option<BoundingBox>; 3],
        caption: &str,
    ) {
        let path = self.router.layout().debug_image(stem);
        if let Err(e) = self.renderer.render(&path, frames, boxes, caption) {
            log::warn!("Failed to write debug image {}: {e}", path.display());
        }
    }
}

/// Local time formatted for backup and config dump file names.
pub fn run_timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

fn accepted_caption(assignment: &Assignment) -> String {
    match assignment {
        Assignment::Created { id, .. } => format!("{id} (new)"),
        Assignment::Matched { id, similarity, .. } => {
            format!("{id} (matched, score {similarity:.2})")
        }
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::face_oracle::FaceDetection;
    use crate::detection::domain::face_validator::tests::{face, StubOracle};
    use crate::identity::domain::embedding::{blend_centroid, video_descriptor};
    use crate::identity::domain::identity_database::{IdentityDatabase, IdentityRecord};
    use crate::pipeline::curation_logger::NullCurationLogger;
    use crate::shared::frame_position::FramePosition;
    use crate::video::domain::frame_sampler::tests::StubReader;
    use crate::video::infrastructure::image_file_writer::ImageFileWriter;
    use approx::assert_relative_eq;
    use std::collections::HashMap;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    const TS: &str = "20240101_120000";
    const START: [f32; 3] = [0.8, 0.6, 0.0];
    const MID: [f32; 3] = [1.0, 0.0, 0.0];
    const END: [f32; 3] = [0.75, 0.661_437_8, 0.0];

    struct Fixture {
        _tmp: TempDir,
        config: CurationConfig,
        layout: OutputLayout,
    }

    impl Fixture {
        fn new(videos: &[&str]) -> Self {
            let tmp = TempDir::new().unwrap();
            let source = tmp.path().join("videos");
            fs::create_dir_all(&source).unwrap();
            for name in videos {
                fs::write(source.join(name), b"mp4").unwrap();
            }
            let output = tmp.path().join("out");
            Self {
                config: CurationConfig::new(&source, &output),
                layout: OutputLayout::new(&output),
                _tmp: tmp,
            }
        }

        fn source(&self, name: &str) -> PathBuf {
            self.config.source.join(name)
        }

        fn use_case(
            &self,
            reader: StubReader,
            faces: HashMap<usize, Vec<FaceDetection>>,
        ) -> (CurateVideosUseCase, Arc<AtomicUsize>) {
            let oracle = StubOracle::new(faces);
            let calls = Arc::clone(&oracle.calls);
            let use_case = CurateVideosUseCase::new(
                self.config.clone(),
                Box::new(reader),
                Box::new(oracle),
                Box::new(ImageFileWriter::new()),
                CommitGate::new(),
                Box::new(NullCurationLogger),
            );
            (use_case, calls)
        }

        fn run(
            &self,
            reader: StubReader,
            faces: HashMap<usize, Vec<FaceDetection>>,
        ) -> (CurationSummary, usize) {
            let (mut use_case, calls) = self.use_case(reader, faces);
            let summary = use_case.execute(TS).unwrap();
            (summary, calls.load(Ordering::SeqCst))
        }

        fn database(&self) -> IdentityDatabase {
            DatabaseFile::new(self.layout.database()).load().unwrap()
        }

        fn metadata(&self) -> String {
            fs::read_to_string(self.layout.metadata_log()).unwrap_or_default()
        }
    }

    /// One 30px face per sampled frame of a 40-frame, 64x48 video.
    fn consistent_faces() -> HashMap<usize, Vec<FaceDetection>> {
        HashMap::from([
            (0, vec![face(4.0, 4.0, 30.0, &START)]),
            (20, vec![face(6.0, 5.0, 30.0, &MID)]),
            (39, vec![face(8.0, 6.0, 30.0, &END)]),
        ])
    }

    fn forty_frames() -> StubReader {
        StubReader::with_frames(40, 64, 48)
    }

    #[test]
    fn test_short_video_is_trashed_without_face_detection() {
        let fx = Fixture::new(&["short.mp4"]);
        let (mut use_case, calls) = fx.use_case(StubReader::with_frames(10, 64, 48), HashMap::new());
        let mut session = use_case.open_session(TS).unwrap();

        let outcome = use_case.process(&mut session, &fx.source("short.mp4")).unwrap();

        let (rejection, destination) = match outcome {
            VideoOutcome::Rejected {
                rejection,
                destination,
            } => (rejection, destination),
            other => panic!("expected rejection, got {other:?}"),
        };
        let reason = rejection.to_string();
        assert!(reason.contains("10") && reason.contains("30"), "{reason}");
        assert_eq!(destination, fx.layout.trash_dir().join("short.mp4"));
        assert!(destination.exists());
        assert!(!fx.source("short.mp4").exists());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(session.database().is_empty());
        assert!(fx.layout.debug_image("short").exists());
    }

    #[test]
    fn test_consistent_video_creates_identity_at_offset() {
        let mut fx = Fixture::new(&["clip.mp4"]);
        fx.config.id_offset = 5;

        let (summary, calls) = fx.run(forty_frames(), consistent_faces());

        assert_eq!(calls, 3);
        assert_eq!(summary.created, 1);
        assert_eq!(summary.identities, 1);
        assert!(fx.layout.identity_dir("id_000005").join("clip.mp4").exists());

        let db = fx.database();
        let expected = video_descriptor(&START, &MID, &END);
        assert_eq!(db.records()[0].id, "id_000005");
        for (a, b) in db.records()[0].centroid.iter().zip(&expected) {
            assert_relative_eq!(*a, *b, epsilon = 1e-6);
        }

        let lines: Vec<String> = fx.metadata().lines().map(String::from).collect();
        assert_eq!(lines, ["clip,id_000005,4,4,34,34,6,5,36,35,8,6,38,36"]);
    }

    #[test]
    fn test_similar_video_joins_existing_identity() {
        let fx = Fixture::new(&["clip.mp4"]);
        let v = video_descriptor(&START, &MID, &END);
        let centroid = vec![0.65 * v[0], 0.65 * v[1], (1.0f32 - 0.65 * 0.65).sqrt()];
        fs::create_dir_all(fx.layout.root()).unwrap();
        let existing = IdentityDatabase::from_records(vec![IdentityRecord {
            id: "id_000000".into(),
            centroid: centroid.clone(),
        }])
        .unwrap();
        DatabaseFile::new(fx.layout.database()).save(&existing).unwrap();

        let (summary, _) = fx.run(forty_frames(), consistent_faces());

        assert_eq!(summary.matched, 1);
        assert_eq!(summary.created, 0);
        assert!(fx.layout.identity_dir("id_000000").join("clip.mp4").exists());
        let db = fx.database();
        assert_eq!(db.len(), 1);
        for (a, b) in db.records()[0].centroid.iter().zip(blend_centroid(&centroid, &v)) {
            assert_relative_eq!(*a, b, epsilon = 1e-6);
        }
        assert!(fx.metadata().starts_with("clip,id_000000,"));
        // the pre-existing snapshot was backed up first
        assert!(fx
            .layout
            .root()
            .join(format!("id_database_{TS}.json"))
            .exists());
    }

    #[test]
    fn test_empty_source_leaves_state_unchanged() {
        let fx = Fixture::new(&[]);
        fs::create_dir_all(fx.layout.root()).unwrap();
        let mut db = IdentityDatabase::new();
        db.match_or_create(&MID, 0.6, 0, Default::default()).unwrap();
        DatabaseFile::new(fx.layout.database()).save(&db).unwrap();
        fs::write(fx.layout.metadata_log(), "old,id_000000,0,0,1,1,0,0,1,1,0,0,1,1\n").unwrap();
        let db_before = fs::read(fx.layout.database()).unwrap();
        let meta_before = fx.metadata();

        for _ in 0..2 {
            let (summary, calls) = fx.run(forty_frames(), consistent_faces());
            assert_eq!(summary.processed(), 0);
            assert_eq!(calls, 0);
        }

        assert_eq!(fs::read(fx.layout.database()).unwrap(), db_before);
        assert_eq!(fx.metadata(), meta_before);
    }

    #[test]
    fn test_mismatched_faces_are_rejected_with_debug_image() {
        let fx = Fixture::new(&["cut.mp4"]);
        let mut faces = consistent_faces();
        faces.insert(39, vec![face(8.0, 6.0, 30.0, &[0.0, 0.0, 1.0])]);

        let (summary, _) = fx.run(forty_frames(), faces);

        assert_eq!(summary.rejected_of("identity_mismatch"), 1);
        assert!(fx.layout.trash_dir().join("cut.mp4").exists());
        assert!(fx.layout.debug_image("cut").exists());
        assert!(fx.database().is_empty());
        assert_eq!(fx.metadata(), "");
    }

    #[test]
    fn test_missing_face_reports_frame() {
        let fx = Fixture::new(&["empty.mp4"]);
        let (mut use_case, _) = fx.use_case(forty_frames(), HashMap::new());
        let mut session = use_case.open_session(TS).unwrap();

        let outcome = use_case.process(&mut session, &fx.source("empty.mp4")).unwrap();

        assert!(matches!(
            outcome,
            VideoOutcome::Rejected {
                rejection: Rejection::NoFaceFound {
                    position: FramePosition::Start
                },
                ..
            }
        ));
    }

    #[test]
    fn test_unreadable_video_gets_no_debug_image() {
        let fx = Fixture::new(&["broken.mp4"]);
        let mut reader = forty_frames();
        reader.fail_open = true;

        let (summary, calls) = fx.run(reader, consistent_faces());

        assert_eq!(summary.rejected_of("video_unreadable"), 1);
        assert_eq!(calls, 0);
        assert!(fx.layout.trash_dir().join("broken.mp4").exists());
        assert!(!fx.layout.debug_image("broken").exists());
    }

    #[test]
    fn test_second_video_matches_first() {
        let fx = Fixture::new(&["a.mp4", "b.mp4"]);

        let (summary, _) = fx.run(forty_frames(), consistent_faces());

        assert_eq!((summary.created, summary.matched), (1, 1));
        let dir = fx.layout.identity_dir("id_000000");
        assert!(dir.join("a.mp4").exists());
        assert!(dir.join("b.mp4").exists());
        assert_eq!(fx.metadata().lines().count(), 2);
    }

    #[test]
    fn test_debug_accepted_writes_composite() {
        let mut fx = Fixture::new(&["clip.mp4"]);
        fx.config.debug_accepted = true;

        fx.run(forty_frames(), consistent_faces());

        assert!(fx.layout.debug_image("clip").exists());
    }

    #[test]
    fn test_config_dump_written() {
        let fx = Fixture::new(&[]);
        fx.run(forty_frames(), HashMap::new());
        let dump = fs::read_to_string(fx.layout.config_dump(TS)).unwrap();
        let parsed: CurationConfig = serde_json::from_str(&dump).unwrap();
        assert_eq!(parsed, fx.config);
    }

    #[test]
    fn test_id_collision_aborts_run() {
        let mut fx = Fixture::new(&["clip.mp4"]);
        fx.config.id_offset = 0;
        fs::create_dir_all(fx.layout.root()).unwrap();
        // one identity named id_000001: the next id with offset 0 is id_000001
        let existing = IdentityDatabase::from_records(vec![IdentityRecord {
            id: "id_000001".into(),
            centroid: vec![0.0, 0.0, 1.0],
        }])
        .unwrap();
        DatabaseFile::new(fx.layout.database()).save(&existing).unwrap();

        let (mut use_case, _) = fx.use_case(forty_frames(), consistent_faces());
        let result = use_case.execute(TS);

        assert!(matches!(result, Err(CurationError::IdCollision(ref id)) if id == "id_000001"));
        assert!(fx.source("clip.mp4").exists());
    }
}
