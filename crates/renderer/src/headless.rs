use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use scene::ExportRequest;
use scheduler::{until, ExportMode};
use tracing::info;

use crate::camera::OrbitCamera;
use crate::gpu::{GpuContext, GpuScene};
use crate::session::Session;
use crate::types::RendererConfig;

/// Files written by a headless export.
#[derive(Debug, Clone, Default)]
pub struct HeadlessSummary {
    pub adapter: String,
    pub files: Vec<PathBuf>,
}

/// Runs one export job without a window, honouring the scheduler's timing,
/// and returns once the job has finished. A failed capture ends the run with
/// an error; files already written stay on disk.
pub fn run_headless_export(config: RendererConfig, mode: ExportMode) -> Result<HeadlessSummary> {
    let context = GpuContext::headless().context("failed to initialise headless renderer")?;
    let camera = OrbitCamera::from_config(&config.scene.camera);
    let mut scene = GpuScene::new(context, config.surface_size, camera.position())?;
    scene.attach_materials();

    let mut session = Session::new(&config)?;
    let request = match mode {
        ExportMode::Burst => ExportRequest::Burst,
        ExportMode::Sequence => ExportRequest::Sequence,
    };
    session.request_export(request, &scene)?;
    info!(
        %mode,
        adapter = %scene.adapter().name,
        width = config.surface_size.0,
        height = config.surface_size.1,
        export_dir = %config.export_dir.display(),
        "headless export started"
    );

    let mut summary = HeadlessSummary {
        adapter: scene.adapter().name.clone(),
        files: Vec::new(),
    };
    while session.scheduler.is_running() {
        let Some(deadline) = session.scheduler.next_deadline() else {
            break;
        };
        let wait = until(deadline, Instant::now());
        if !wait.is_zero() {
            std::thread::sleep(wait);
        }
        let live_time = session.live_time();
        let outcome = session
            .drive_exports(&mut scene, live_time)
            .with_context(|| format!("{mode} export aborted"))?;
        if let Some(outcome) = outcome {
            summary.files.push(outcome.path);
        }
    }

    info!(%mode, files = summary.files.len(), "headless export finished");
    Ok(summary)
}
