//! Export job pacing.
//!
//! The scheduler is a passive state machine: the render loop calls
//! [`ExportScheduler::tick`] on every redraw and receives at most one
//! [`ExportStep`] to execute. Delays are deadlines compared against the
//! supplied `now`, so nothing here sleeps or spawns timers.

pub mod driver;

use std::fmt;
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use rand::prelude::*;
use scene::{CaptureError, MaterialRole, SceneBindings, SceneError, SceneState, VirtualTimeSource};
use sceneconfig::{ClockMode, ExportConfig};
use tracing::{debug, error, info, warn};

pub use driver::{drive, ExportContext, ExportOutcome};

/// Name every burst still is emitted under; the sink disambiguates repeats.
pub const STILL_FILENAME: &str = "scene-4k.jpg";

pub fn sequence_frame_filename(run: u32, index: u32) -> String {
    format!("video{run:02}_frame_{index:03}.png")
}

/// Run number after the highest `videoNN_frame_*` already in `dir`, so a new
/// session never mixes its frames into an earlier sequence.
pub fn first_unused_run(dir: &Path) -> u32 {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            debug!(dir = %dir.display(), error = %err, "export directory not readable; runs start at 0");
            return 0;
        }
    };
    entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| sequence_run_of(&entry.file_name().to_string_lossy()))
        .map(|run| run.saturating_add(1))
        .max()
        .unwrap_or(0)
}

fn sequence_run_of(filename: &str) -> Option<u32> {
    let (run, _) = filename.strip_prefix("video")?.split_once("_frame_")?;
    if run.is_empty() || !run.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    run.parse().ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportMode {
    Burst,
    Sequence,
}

impl fmt::Display for ExportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportMode::Burst => f.write_str("burst"),
            ExportMode::Sequence => f.write_str("sequence"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("a {0} export is already running")]
    CaptureInFlight(ExportMode),
    #[error("no renderer is available for export")]
    RendererUnavailable,
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Scene(#[from] SceneError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportState {
    Idle,
    BurstRunning,
    SequenceRunning,
    /// Last job was cancelled; behaves like `Idle` for new requests.
    Cancelled,
}

/// One capture the caller must perform now.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportStep {
    Still {
        index: u32,
        scale: f32,
        jpeg_quality: u8,
    },
    SequenceFrame {
        run: u32,
        index: u32,
        scale: f32,
        /// Scene time for the frame; `None` follows the live clock.
        time: Option<f32>,
    },
}

impl ExportStep {
    pub fn filename(&self) -> String {
        match self {
            ExportStep::Still { .. } => STILL_FILENAME.to_string(),
            ExportStep::SequenceFrame { run, index, .. } => sequence_frame_filename(*run, *index),
        }
    }

    pub fn scale(&self) -> f32 {
        match self {
            ExportStep::Still { scale, .. } | ExportStep::SequenceFrame { scale, .. } => *scale,
        }
    }

    pub fn mode(&self) -> ExportMode {
        match self {
            ExportStep::Still { .. } => ExportMode::Burst,
            ExportStep::SequenceFrame { .. } => ExportMode::Sequence,
        }
    }
}

#[derive(Debug, Clone)]
enum Job {
    Burst(BurstJob),
    Sequence(SequenceJob),
}

impl Job {
    fn mode(&self) -> ExportMode {
        match self {
            Job::Burst(_) => ExportMode::Burst,
            Job::Sequence(_) => ExportMode::Sequence,
        }
    }
}

#[derive(Debug, Clone)]
struct BurstJob {
    total: u32,
    /// Captures whose settle delay has been armed.
    scheduled: u32,
    completed: u32,
    next_arm: Instant,
    fire_at: Option<Instant>,
    in_flight: bool,
}

#[derive(Debug, Clone)]
struct SequenceJob {
    run: u32,
    total: u32,
    next_index: u32,
    /// `None` when frames follow the live wall clock.
    clock: Option<VirtualTimeSource>,
    ready_at: Instant,
    in_flight: bool,
}

pub struct ExportScheduler {
    config: ExportConfig,
    rng: StdRng,
    job: Option<Job>,
    state: ExportState,
    next_run: u32,
}

impl ExportScheduler {
    pub fn new(config: &ExportConfig, seed: u64) -> Self {
        Self {
            config: config.clone(),
            rng: StdRng::seed_from_u64(seed),
            job: None,
            state: ExportState::Idle,
            next_run: 0,
        }
    }

    /// Numbers sequence runs from `run` instead of 0.
    pub fn with_first_run(mut self, run: u32) -> Self {
        self.next_run = run;
        self
    }

    pub fn state(&self) -> ExportState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.job.is_some()
    }

    /// True while an image-sequence export is in progress.
    pub fn is_sequence_active(&self) -> bool {
        matches!(self.job, Some(Job::Sequence(_)))
    }

    /// Run number the next sequence export will use.
    pub fn next_run(&self) -> u32 {
        self.next_run
    }

    /// Starts a job after checking that a scene with all materials exists.
    pub fn request<S>(&mut self, mode: ExportMode, scene: Option<&S>, now: Instant) -> Result<(), ExportError>
    where
        S: SceneBindings + ?Sized,
    {
        let ready = scene.is_some_and(|scene| MaterialRole::ALL.iter().all(|role| scene.attached(*role)));
        if !ready {
            warn!(%mode, "export requested without a ready renderer");
            return Err(ExportError::RendererUnavailable);
        }
        match mode {
            ExportMode::Burst => self.start_burst(now),
            ExportMode::Sequence => self.start_sequence(now).map(|_| ()),
        }
    }

    pub fn start_burst(&mut self, now: Instant) -> Result<(), ExportError> {
        self.ensure_idle()?;
        let burst = &self.config.burst;
        info!(
            count = burst.count,
            interval_ms = burst.interval.as_millis() as u64,
            scale = burst.scale,
            "starting burst export"
        );
        self.job = Some(Job::Burst(BurstJob {
            total: burst.count,
            scheduled: 0,
            completed: 0,
            next_arm: now + burst.interval,
            fire_at: None,
            in_flight: false,
        }));
        self.state = ExportState::BurstRunning;
        Ok(())
    }

    /// Returns the run number assigned to the new sequence.
    pub fn start_sequence(&mut self, now: Instant) -> Result<u32, ExportError> {
        self.ensure_idle()?;
        let sequence = &self.config.sequence;
        let run = self.next_run;
        self.next_run = self.next_run.saturating_add(1);
        let clock = match sequence.clock {
            ClockMode::Virtual => {
                let base = if sequence.base_time_max > 0.0 {
                    self.rng.gen_range(0.0..sequence.base_time_max)
                } else {
                    0.0
                };
                Some(VirtualTimeSource::new(base, sequence.frame_rate))
            }
            ClockMode::Wall => None,
        };
        info!(
            run,
            frames = sequence.frame_count(),
            frame_rate = sequence.frame_rate,
            scale = sequence.scale,
            clock = ?sequence.clock,
            "starting sequence export"
        );
        self.job = Some(Job::Sequence(SequenceJob {
            run,
            total: sequence.frame_count(),
            next_index: 0,
            clock,
            ready_at: now,
            in_flight: false,
        }));
        self.state = ExportState::SequenceRunning;
        Ok(run)
    }

    /// Drops the running job and every pending deadline.
    pub fn cancel(&mut self) -> bool {
        match self.job.take() {
            Some(job) => {
                info!(mode = %job.mode(), "export cancelled");
                self.state = ExportState::Cancelled;
                true
            }
            None => false,
        }
    }

    /// Advances timers and returns the capture that is due, if any.
    pub fn tick(&mut self, now: Instant) -> Option<ExportStep> {
        let interval = self.config.burst.interval;
        let settle = self.config.burst.settle_delay;
        match self.job.as_mut()? {
            Job::Burst(job) => {
                if job.in_flight {
                    return None;
                }
                if job.fire_at.is_none() && job.scheduled < job.total && now >= job.next_arm {
                    job.fire_at = Some(job.next_arm + settle);
                    job.scheduled += 1;
                    job.next_arm += interval;
                    if job.next_arm <= now {
                        job.next_arm = now + interval;
                    }
                }
                match job.fire_at {
                    Some(fire_at) if now >= fire_at => {
                        job.fire_at = None;
                        job.in_flight = true;
                        Some(ExportStep::Still {
                            index: job.scheduled - 1,
                            scale: self.config.burst.scale,
                            jpeg_quality: self.config.burst.jpeg_quality,
                        })
                    }
                    _ => None,
                }
            }
            Job::Sequence(job) => {
                if job.in_flight || now < job.ready_at || job.next_index >= job.total {
                    return None;
                }
                job.in_flight = true;
                let time = job
                    .clock
                    .map(|clock| clock.at(u64::from(job.next_index)).seconds);
                Some(ExportStep::SequenceFrame {
                    run: job.run,
                    index: job.next_index,
                    scale: self.config.sequence.scale,
                    time,
                })
            }
        }
    }

    /// Records a successful capture and schedules what follows it.
    pub fn complete(&mut self, step: &ExportStep, now: Instant) {
        let cooldown = self.config.sequence.cooldown;
        let frame_rate = self.config.sequence.frame_rate;
        let finished = match (self.job.as_mut(), step) {
            (Some(Job::Burst(job)), ExportStep::Still { .. }) => {
                job.in_flight = false;
                job.completed += 1;
                if job.completed >= job.total {
                    info!(count = job.completed, "burst export finished");
                    true
                } else {
                    false
                }
            }
            (Some(Job::Sequence(job)), ExportStep::SequenceFrame { index, .. })
                if *index == job.next_index =>
            {
                job.in_flight = false;
                job.next_index += 1;
                if job.next_index >= job.total {
                    let pattern = format!("video{:02}_frame_%03d.png", job.run);
                    info!(
                        run = job.run,
                        frames = job.total,
                        "sequence export finished; assemble with: ffmpeg -framerate {frame_rate} -i {pattern} -c:v libx264 -pix_fmt yuv420p output.mp4"
                    );
                    true
                } else {
                    job.ready_at = now + cooldown;
                    false
                }
            }
            _ => {
                warn!(?step, "completion does not match the running export");
                false
            }
        };
        if finished {
            self.job = None;
            self.state = ExportState::Idle;
        }
    }

    /// Aborts the running job after a failed capture.
    pub fn fail(&mut self, step: &ExportStep, err: &ExportError) {
        if let Some(job) = self.job.take() {
            error!(mode = %job.mode(), file = %step.filename(), error = %err, "export aborted");
            self.state = ExportState::Idle;
        }
    }

    /// Applies the between-stills mutation: fresh free colors and a time jump.
    pub fn randomize(&mut self, state: &mut SceneState) {
        state.ramp = state.ramp.randomize_free(&mut self.rng);
        state.jump_time(&mut self.rng, self.config.burst.time_jump_max);
    }

    /// Earliest instant at which [`tick`](Self::tick) may return a step.
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.job.as_ref()? {
            Job::Burst(job) if job.in_flight => None,
            Job::Burst(job) => match job.fire_at {
                Some(fire_at) => Some(fire_at),
                None if job.scheduled < job.total => Some(job.next_arm),
                None => None,
            },
            Job::Sequence(job) if job.in_flight || job.next_index >= job.total => None,
            Job::Sequence(job) => Some(job.ready_at),
        }
    }

    fn ensure_idle(&self) -> Result<(), ExportError> {
        match &self.job {
            Some(job) => {
                warn!(mode = %job.mode(), "export already running");
                Err(ExportError::CaptureInFlight(job.mode()))
            }
            None => Ok(()),
        }
    }
}

/// Duration until `deadline`, saturating at zero.
pub fn until(deadline: Instant, now: Instant) -> Duration {
    deadline.saturating_duration_since(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sceneconfig::SceneConfig;

    fn config(toml: &str) -> ExportConfig {
        SceneConfig::from_toml_str(toml).unwrap().export
    }

    #[test]
    fn burst_arms_after_interval_then_settle_delay() {
        let mut scheduler = ExportScheduler::new(&config("version = 1"), 1);
        let start = Instant::now();
        scheduler.start_burst(start).unwrap();
        assert_eq!(scheduler.state(), ExportState::BurstRunning);
        assert_eq!(scheduler.tick(start), None);
        assert_eq!(scheduler.next_deadline(), Some(start + Duration::from_secs(10)));

        let armed = start + Duration::from_secs(10);
        assert_eq!(scheduler.tick(armed), None);
        assert_eq!(scheduler.next_deadline(), Some(armed + Duration::from_secs(1)));

        let step = scheduler.tick(armed + Duration::from_secs(1)).unwrap();
        assert_eq!(
            step,
            ExportStep::Still {
                index: 0,
                scale: 20.0,
                jpeg_quality: 100
            }
        );
        assert_eq!(step.filename(), "scene-4k.jpg");
        assert_eq!(scheduler.next_deadline(), None);
    }

    #[test]
    fn second_export_is_rejected_while_running() {
        let mut scheduler = ExportScheduler::new(&config("version = 1"), 1);
        let now = Instant::now();
        scheduler.start_burst(now).unwrap();
        assert!(matches!(
            scheduler.start_sequence(now),
            Err(ExportError::CaptureInFlight(ExportMode::Burst))
        ));
        assert!(matches!(
            scheduler.start_burst(now),
            Err(ExportError::CaptureInFlight(ExportMode::Burst))
        ));
    }

    #[test]
    fn cancel_clears_pending_deadlines() {
        let mut scheduler = ExportScheduler::new(&config("version = 1"), 1);
        let start = Instant::now();
        scheduler.start_burst(start).unwrap();
        scheduler.tick(start + Duration::from_secs(10));
        assert!(scheduler.next_deadline().is_some());
        assert!(scheduler.cancel());
        assert_eq!(scheduler.state(), ExportState::Cancelled);
        assert_eq!(scheduler.next_deadline(), None);
        assert_eq!(scheduler.tick(start + Duration::from_secs(60)), None);
        assert!(!scheduler.cancel());
        scheduler.start_sequence(start).unwrap();
        assert!(scheduler.is_sequence_active());
    }

    #[test]
    fn sequence_uses_virtual_clock_and_cooldown() {
        let mut scheduler = ExportScheduler::new(&config("version = 1"), 3);
        let start = Instant::now();
        let run = scheduler.start_sequence(start).unwrap();
        assert_eq!(run, 0);

        let first = scheduler.tick(start).unwrap();
        let ExportStep::SequenceFrame { time: Some(base), index: 0, .. } = first.clone() else {
            panic!("unexpected step {first:?}");
        };
        assert!((0.0..100.0).contains(&base));
        assert_eq!(first.filename(), "video00_frame_000.png");
        assert_eq!(scheduler.tick(start), None);

        scheduler.complete(&first, start);
        assert_eq!(scheduler.next_deadline(), Some(start + Duration::from_secs(5)));
        assert_eq!(scheduler.tick(start + Duration::from_secs(4)), None);

        let second = scheduler.tick(start + Duration::from_secs(5)).unwrap();
        let ExportStep::SequenceFrame { time: Some(t), index: 1, .. } = second.clone() else {
            panic!("unexpected step {second:?}");
        };
        assert!((t - (base + 1.0 / 60.0)).abs() < 1e-4);
    }

    #[test]
    fn wall_clock_sequence_leaves_time_to_caller() {
        let mut scheduler = ExportScheduler::new(
            &config("version = 1\n[export.sequence]\nclock = \"wall\"\n"),
            3,
        );
        let now = Instant::now();
        scheduler.start_sequence(now).unwrap();
        assert!(matches!(
            scheduler.tick(now),
            Some(ExportStep::SequenceFrame { time: None, .. })
        ));
    }

    #[test]
    fn runs_continue_after_existing_sequences() {
        let dir = tempfile::TempDir::new().unwrap();
        assert_eq!(first_unused_run(dir.path()), 0);
        for name in [
            "video00_frame_000.png",
            "video03_frame_299.png",
            "video03_frame_000 (1).png",
            "scene-4k.jpg",
            "videoXY_frame_000.png",
            "video_frame_001.png",
        ] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        assert_eq!(first_unused_run(dir.path()), 4);
        assert_eq!(first_unused_run(&dir.path().join("missing")), 0);

        let mut scheduler = ExportScheduler::new(&config("version = 1"), 1)
            .with_first_run(first_unused_run(dir.path()));
        let run = scheduler.start_sequence(Instant::now()).unwrap();
        assert_eq!(run, 4);
        let step = scheduler.tick(Instant::now()).unwrap();
        assert_eq!(step.filename(), "video04_frame_000.png");
    }

    #[test]
    fn failure_returns_to_idle() {
        let mut scheduler = ExportScheduler::new(&config("version = 1"), 1);
        let now = Instant::now();
        scheduler.start_sequence(now).unwrap();
        let step = scheduler.tick(now).unwrap();
        scheduler.fail(&step, &ExportError::RendererUnavailable);
        assert_eq!(scheduler.state(), ExportState::Idle);
        assert!(!scheduler.is_running());
        assert_eq!(scheduler.next_run(), 1);
    }
}
