use std::time::Instant;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use scene::{
    DirectorySink, ExportRequest, SceneError, SceneRenderer, SceneState, SceneTuning,
    SystemTimeSource, TimeSource, UniformSynchronizer,
};
use scheduler::{
    drive, first_unused_run, ExportContext, ExportError, ExportMode, ExportOutcome, ExportScheduler,
};
use tracing::{debug, info, warn};

use crate::types::RendererConfig;

/// Scene state plus the export machinery, shared by the preview window and
/// the headless exporter.
pub(crate) struct Session {
    pub state: SceneState,
    pub synchronizer: UniformSynchronizer,
    pub scheduler: ExportScheduler,
    pub sink: DirectorySink,
    pub rng: StdRng,
    clock: SystemTimeSource,
}

impl Session {
    pub fn new(config: &RendererConfig) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let state = SceneState::from_config(&config.scene, &mut rng)
            .context("invalid initial scene state")?;
        let sink = DirectorySink::new(&config.export_dir).with_context(|| {
            format!("failed to prepare export directory {}", config.export_dir.display())
        })?;
        let first_run = first_unused_run(sink.root());
        debug!(
            stops = state.ramp.len(),
            time_offset = state.time_offset,
            export_dir = %config.export_dir.display(),
            first_run,
            "scene session ready"
        );
        Ok(Self {
            state,
            synchronizer: UniformSynchronizer::new(SceneTuning::from_config(&config.scene.materials)),
            scheduler: ExportScheduler::new(&config.scene.export, config.seed.wrapping_add(1))
                .with_first_run(first_run),
            sink,
            rng,
            clock: SystemTimeSource::new(),
        })
    }

    /// Scene time for the frame about to be drawn.
    pub fn live_time(&mut self) -> f32 {
        let sample = self.clock.sample();
        self.state.scene_time(sample.seconds)
    }

    /// Pushes the live state into the materials; false while they are not attached.
    pub fn sync_live<R: SceneRenderer + ?Sized>(&mut self, renderer: &mut R, time: f32) -> bool {
        match self.synchronizer.synchronize(renderer, time, &self.state) {
            Ok(()) => true,
            Err(SceneError::BindingNotReady(role)) => {
                debug!(%role, "material not attached yet; skipping uniform sync");
                false
            }
            Err(err) => {
                warn!(error = %err, "uniform sync failed");
                false
            }
        }
    }

    pub fn request_export<R: SceneRenderer + ?Sized>(
        &mut self,
        request: ExportRequest,
        renderer: &R,
    ) -> Result<(), ExportError> {
        let mode = match request {
            ExportRequest::Burst => ExportMode::Burst,
            ExportRequest::Sequence => ExportMode::Sequence,
            ExportRequest::Cancel => {
                if self.scheduler.cancel() {
                    info!("export cancelled");
                }
                return Ok(());
            }
        };
        self.scheduler.request(mode, Some(renderer), Instant::now())
    }

    /// Runs the export step that is due, if any. A failed step has already
    /// aborted the job when the error comes back.
    pub fn drive_exports<R: SceneRenderer + ?Sized>(
        &mut self,
        renderer: &mut R,
        live_time: f32,
    ) -> Result<Option<ExportOutcome>, ExportError> {
        let outcome = drive(
            &mut self.scheduler,
            Instant::now(),
            ExportContext {
                renderer,
                synchronizer: &mut self.synchronizer,
                state: &mut self.state,
                sink: &mut self.sink,
                live_time,
            },
        )?;
        if let Some(done) = &outcome {
            info!(
                file = %done.path.display(),
                mode = %done.step.mode(),
                "export frame written"
            );
        }
        Ok(outcome)
    }
}
