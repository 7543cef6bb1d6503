use crate::pipeline::orchestrator::DetectionPipeline;
use crate::pipeline::types::Thresholds;
use crate::video::processor::{DetectionMode, StreamProcessor, StreamStats};
use crate::video::MediaKind;
use anyhow::{anyhow, Context, Result};
use crossbeam::channel::{self, Sender};
use std::path::PathBuf;
use tokio::sync::oneshot;

/// One file to annotate.
#[derive(Debug, Clone)]
pub struct Job {
    pub input: PathBuf,
    pub output: PathBuf,
    pub kind: MediaKind,
    pub thresholds: Thresholds,
    pub mode: DetectionMode,
}

type Envelope = (Job, oneshot::Sender<Result<StreamStats>>);

/// Hands jobs to a single worker thread that owns the detection pipeline.
///
/// Models are loaded once, inside the worker, and reused for every job.
/// Jobs run one at a time in submission order.
#[derive(Clone)]
pub struct JobQueue {
    tx: Sender<Envelope>,
}

impl JobQueue {
    /// Start the worker and wait until `factory` has built the pipeline.
    /// Blocks; call from a blocking context.
    pub fn start<F>(factory: F) -> Result<Self>
    where
        F: FnOnce() -> Result<DetectionPipeline> + Send + 'static,
    {
        let (tx, rx) = channel::unbounded::<Envelope>();
        let (ready_tx, ready_rx) = channel::bounded::<Result<()>>(1);

        std::thread::Builder::new()
            .name("detection-worker".to_string())
            .spawn(move || {
                let mut pipeline = match factory() {
                    Ok(p) => {
                        let _ = ready_tx.send(Ok(()));
                        p
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                for (job, reply) in rx {
                    let result = run_job(&mut pipeline, &job);
                    if let Err(e) = &result {
                        tracing::error!("Job for {} failed: {:#}", job.input.display(), e);
                    }
                    if reply.send(result).is_err() {
                        tracing::warn!(
                            "Requester for {} went away before the job finished",
                            job.input.display()
                        );
                    }
                }
                tracing::info!("Detection worker stopped");
            })
            .context("Failed to spawn detection worker")?;

        ready_rx
            .recv()
            .context("Detection worker exited during startup")??;
        tracing::info!("Detection worker ready");
        Ok(Self { tx })
    }

    pub async fn submit(&self, job: Job) -> Result<StreamStats> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send((job, reply_tx))
            .map_err(|_| anyhow!("Detection worker is not running"))?;
        reply_rx.await.context("Detection worker dropped the job")?
    }
}

fn run_job(pipeline: &mut DetectionPipeline, job: &Job) -> Result<StreamStats> {
    StreamProcessor::new(pipeline, job.thresholds)
        .with_mode(job.mode)
        .process_file(&job.input, &job.output, job.kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::detector::testing::{ScriptedRegionDetector, ScriptedSubjectDetector};
    use crate::pipeline::frame::black_image;
    use crate::pipeline::types::DetectionConfig;

    fn empty_pipeline() -> Result<DetectionPipeline> {
        Ok(DetectionPipeline::new(
            Box::new(ScriptedSubjectDetector::new(vec![])),
            Box::new(ScriptedRegionDetector::always(vec![])),
            DetectionConfig::default(),
        ))
    }

    #[test]
    fn test_factory_failure_is_reported() {
        let result = JobQueue::start(|| Err(anyhow!("model file missing")));
        let err = result.err().unwrap();
        assert!(format!("{:#}", err).contains("model file missing"));
    }

    #[tokio::test]
    async fn test_submitted_jobs_run_in_order() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("in.png");
        opencv::imgcodecs::imwrite(
            input.to_str().unwrap(),
            &black_image(20, 10),
            &opencv::core::Vector::new(),
        )
        .unwrap();

        let queue = tokio::task::spawn_blocking(|| JobQueue::start(empty_pipeline))
            .await
            .unwrap()
            .unwrap();

        for i in 0..2 {
            let output = dir.path().join(format!("out_{}.png", i));
            let stats = queue
                .submit(Job {
                    input: input.clone(),
                    output: output.clone(),
                    kind: MediaKind::Image,
                    thresholds: Thresholds::default(),
                    mode: DetectionMode::Full,
                })
                .await
                .unwrap();
            assert_eq!(stats.processed_frames, 1);
            assert!(output.exists());
        }
    }

    #[tokio::test]
    async fn test_missing_input_surfaces_as_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let queue = tokio::task::spawn_blocking(|| JobQueue::start(empty_pipeline))
            .await
            .unwrap()
            .unwrap();

        let result = queue
            .submit(Job {
                input: dir.path().join("gone.mp4"),
                output: dir.path().join("processed_gone.mp4"),
                kind: MediaKind::Video,
                thresholds: Thresholds::default(),
                mode: DetectionMode::Full,
            })
            .await;
        assert!(result.is_err());
    }
}
