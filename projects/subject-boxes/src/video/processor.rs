use crate::pipeline::frame::{draw_region_boxes, Frame};
use crate::pipeline::orchestrator::DetectionPipeline;
use crate::pipeline::types::Thresholds;
use crate::video::{open_reader, open_writer, FrameWriter, MediaKind, VideoReader};
use anyhow::{Context, Result};
use indicatif::ProgressBar;
use opencv::core::Mat;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};

/// Throughput is logged every this many frames.
const FPS_LOG_INTERVAL: usize = 5;

/// Which stages run on each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMode {
    /// Subjects, then one region search per subject.
    #[default]
    Full,
    /// Subjects only; regions are all `Absent`.
    SubjectsOnly,
    /// Region detector over the whole frame, no subjects.
    RegionsOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Opening,
    Streaming,
    Draining,
    Closed,
}

#[derive(Debug, Clone, Serialize)]
pub struct StreamStats {
    pub processed_frames: usize,
    pub elapsed: Duration,
    pub fps: f64,
}

/// Drives the detection pipeline over one input stream, one frame at a time.
///
/// A processor handles exactly one stream: `Opening -> Streaming -> Draining
/// -> Closed`. Only the frame currently being processed is held in memory.
pub struct StreamProcessor<'a> {
    pipeline: &'a mut DetectionPipeline,
    thresholds: Thresholds,
    mode: DetectionMode,
    state: StreamState,
    pb: ProgressBar,
}

impl<'a> StreamProcessor<'a> {
    pub fn new(pipeline: &'a mut DetectionPipeline, thresholds: Thresholds) -> Self {
        Self {
            pipeline,
            thresholds,
            mode: DetectionMode::Full,
            state: StreamState::Opening,
            pb: ProgressBar::hidden(),
        }
    }

    pub fn with_mode(mut self, mode: DetectionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_progress(mut self, pb: ProgressBar) -> Self {
        self.pb = pb;
        self
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Open `input`, annotate every frame and write the result to `output`
    /// in the same container type.
    pub fn process_file(
        &mut self,
        input: &Path,
        output: &Path,
        kind: MediaKind,
    ) -> Result<StreamStats> {
        self.ensure_state(StreamState::Opening)?;
        tracing::info!(
            "Processing {:?} from {} to {}",
            kind,
            input.display(),
            output.display()
        );

        let opened = open_reader(input, kind).and_then(|reader| {
            let writer = open_writer(output, kind, reader.properties())?;
            Ok((reader, writer))
        });
        let (mut reader, mut writer) = match opened {
            Ok(pair) => pair,
            Err(e) => {
                self.transition(StreamState::Closed);
                return Err(e);
            }
        };

        self.run(reader.as_mut(), writer.as_mut())
    }

    pub fn run(
        &mut self,
        reader: &mut dyn VideoReader,
        writer: &mut dyn FrameWriter,
    ) -> Result<StreamStats> {
        self.ensure_state(StreamState::Opening)?;
        self.transition(StreamState::Streaming);
        tracing::info!(
            "Streaming {:?} mode, subject threshold {}, region threshold {}",
            self.mode,
            self.thresholds.subject,
            self.thresholds.region
        );

        let start = Instant::now();
        let mut processed = 0usize;
        let mut failure = None;

        loop {
            let image = match reader.next_frame() {
                Ok(image) => image,
                Err(e) => {
                    tracing::debug!("Stream ended after {} frames: {}", processed, e);
                    break;
                }
            };

            let frame_start = Instant::now();
            tracing::debug!("Analysing frame {}", processed);

            let annotated = self.annotate(image);
            if let Err(e) = writer.write_frame(&annotated) {
                failure = Some(e.context(format!("Failed to write frame {}", processed)));
                break;
            }

            processed += 1;
            self.pb.inc(1);
            if processed % FPS_LOG_INTERVAL == 0 {
                let fps = processed as f64 / start.elapsed().as_secs_f64();
                tracing::info!("{:.3} FPS", fps);
            }
            tracing::debug!(
                "Frame analysed in {:.3}s",
                frame_start.elapsed().as_secs_f64()
            );
        }

        self.transition(StreamState::Draining);
        let writer_closed = writer.release();
        let reader_closed = reader.release();
        self.transition(StreamState::Closed);
        self.pb.finish_with_message("Done");

        if let Some(e) = failure {
            return Err(e);
        }
        writer_closed.context("Failed to close output")?;
        reader_closed.context("Failed to close input")?;

        let duration = start.elapsed();
        let secs = duration.as_secs_f64();
        let stats = StreamStats {
            processed_frames: processed,
            elapsed: duration,
            fps: if secs > 0.0 {
                processed as f64 / secs
            } else {
                0.0
            },
        };
        tracing::info!(
            "Processed {} frames in {:.2}s ({:.3} FPS)",
            stats.processed_frames,
            secs,
            stats.fps
        );
        Ok(stats)
    }

    /// Run detection and rendering on one image. Never fails: a frame that
    /// cannot be processed is passed through without annotations.
    fn annotate(&mut self, image: Mat) -> Mat {
        if self.mode == DetectionMode::RegionsOnly {
            let mut image = image;
            let regions = self
                .pipeline
                .detect_all_regions(&image, self.thresholds.region);
            if let Err(e) = draw_region_boxes(&mut image, &regions) {
                tracing::warn!("Region rendering incomplete: {}", e);
            }
            return image;
        }

        let mut frame = Frame::new(image);
        let populated = match self.mode {
            DetectionMode::SubjectsOnly => self
                .pipeline
                .run_subjects_only(&mut frame, self.thresholds.subject),
            _ => self.pipeline.run(&mut frame, self.thresholds),
        };

        match populated {
            Ok(()) => {
                if let Err(e) = frame.render_annotations() {
                    tracing::warn!("Annotation rendering incomplete: {}", e);
                }
            }
            Err(violation) => {
                tracing::error!("Frame left unannotated: {}", violation);
            }
        }

        frame.into_image()
    }

    fn ensure_state(&self, expected: StreamState) -> Result<()> {
        if self.state != expected {
            anyhow::bail!(
                "Stream processor is {:?}, expected {:?}",
                self.state,
                expected
            );
        }
        Ok(())
    }

    fn transition(&mut self, next: StreamState) {
        tracing::debug!("Stream state {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}
