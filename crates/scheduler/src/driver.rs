//! Executes scheduled export steps against the scene collaborators.

use std::path::PathBuf;
use std::time::Instant;

use scene::{capture, encode, FrameSink, ImageFormat, SceneError, SceneRenderer, SceneState, UniformSynchronizer};
use tracing::info;

use crate::{ExportError, ExportScheduler, ExportStep};

/// Borrowed collaborators for one pass of [`drive`].
pub struct ExportContext<'a, R: ?Sized, K: ?Sized> {
    pub renderer: &'a mut R,
    pub synchronizer: &'a mut UniformSynchronizer,
    pub state: &'a mut SceneState,
    pub sink: &'a mut K,
    /// Scene time the live view would use right now.
    pub live_time: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportOutcome {
    pub step: ExportStep,
    pub path: PathBuf,
}

/// Runs the step that is due at `now`, if any.
///
/// A failed capture aborts the job; nothing is emitted for it and the renderer
/// is already back in its live configuration when the error is returned.
pub fn drive<R, K>(
    scheduler: &mut ExportScheduler,
    now: Instant,
    ctx: ExportContext<'_, R, K>,
) -> Result<Option<ExportOutcome>, ExportError>
where
    R: SceneRenderer + ?Sized,
    K: FrameSink + ?Sized,
{
    let Some(step) = scheduler.tick(now) else {
        return Ok(None);
    };

    match execute(&step, ctx.renderer, ctx.synchronizer, ctx.state, ctx.sink, ctx.live_time) {
        Ok(path) => {
            scheduler.complete(&step, now);
            if matches!(step, ExportStep::Still { .. }) {
                scheduler.randomize(ctx.state);
            }
            Ok(Some(ExportOutcome { step, path }))
        }
        Err(err) => {
            scheduler.fail(&step, &err);
            Err(err)
        }
    }
}

fn execute<R, K>(
    step: &ExportStep,
    renderer: &mut R,
    synchronizer: &mut UniformSynchronizer,
    state: &SceneState,
    sink: &mut K,
    live_time: f32,
) -> Result<PathBuf, ExportError>
where
    R: SceneRenderer + ?Sized,
    K: FrameSink + ?Sized,
{
    let (time, format) = match step {
        ExportStep::Still { jpeg_quality, .. } => (live_time, ImageFormat::Jpeg { quality: *jpeg_quality }),
        ExportStep::SequenceFrame { time, .. } => (time.unwrap_or(live_time), ImageFormat::Png),
    };

    synchronizer
        .synchronize(renderer, time, state)
        .map_err(|err| match err {
            SceneError::BindingNotReady(_) => ExportError::RendererUnavailable,
            other => ExportError::Scene(other),
        })?;

    let image = capture(renderer, step.scale())?;
    let bytes = encode(&image, format)?;
    let filename = step.filename();
    let path = sink.emit(&filename, &bytes)?;
    info!(
        file = %path.display(),
        width = image.width(),
        height = image.height(),
        "exported frame"
    );
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;

    use scene::capture::{CaptureLimits, Readback, RenderOwner, RowOrder, TargetHandle};
    use scene::{
        AnimationState, CaptureError, ColorRamp, MaterialBinding, MaterialRole, RenderBackend, Rgb,
        SceneBindings, SceneTuning, UniformSet,
    };
    use sceneconfig::SceneConfig;

    use crate::ExportState;

    struct Binding {
        last: Option<UniformSet>,
    }

    impl MaterialBinding for Binding {
        fn role(&self) -> MaterialRole {
            MaterialRole::Background
        }

        fn write_uniforms(&mut self, uniforms: &UniformSet) {
            self.last = Some(*uniforms);
        }
    }

    struct Renderer {
        bindings: Vec<Option<Binding>>,
        size: (u32, u32),
        target: Option<TargetHandle>,
        owner: RenderOwner,
        fail_on_render: Option<usize>,
        renders: usize,
        times: Vec<f32>,
    }

    impl Renderer {
        fn new() -> Self {
            Self {
                bindings: (0..3).map(|_| Some(Binding { last: None })).collect(),
                size: (4, 2),
                target: None,
                owner: RenderOwner::Live,
                fail_on_render: None,
                renders: 0,
                times: Vec::new(),
            }
        }
    }

    impl RenderBackend for Renderer {
        fn output_size(&self) -> (u32, u32) {
            self.size
        }

        fn set_output_size(&mut self, width: u32, height: u32) {
            self.size = (width, height);
        }

        fn create_target(&mut self, _width: u32, _height: u32) -> Result<TargetHandle, CaptureError> {
            Ok(TargetHandle(1))
        }

        fn active_target(&self) -> Option<TargetHandle> {
            self.target
        }

        fn set_render_target(&mut self, target: Option<TargetHandle>) {
            self.target = target;
        }

        fn render_once(&mut self) -> Result<(), CaptureError> {
            self.renders += 1;
            if self.fail_on_render == Some(self.renders) {
                return Err(CaptureError::Render("lost device".into()));
            }
            if let Some(Some(binding)) = self.bindings.first() {
                self.times.extend(binding.last.map(|set| set.time));
            }
            Ok(())
        }

        fn read_pixels(&mut self, _target: TargetHandle) -> Result<Readback, CaptureError> {
            let (width, height) = self.size;
            Ok(Readback {
                width,
                height,
                rows: RowOrder::BottomUp,
                bytes: vec![200; (width * height * 4) as usize],
            })
        }

        fn release_target(&mut self, _target: TargetHandle) {}

        fn ownership(&self) -> RenderOwner {
            self.owner
        }

        fn set_ownership(&mut self, owner: RenderOwner) {
            self.owner = owner;
        }

        fn limits(&self) -> CaptureLimits {
            CaptureLimits {
                max_dimension: 64,
                max_buffer_bytes: 1 << 20,
            }
        }
    }

    impl SceneBindings for Renderer {
        fn attached(&self, role: MaterialRole) -> bool {
            self.bindings[role.index()].is_some()
        }

        fn binding_mut(&mut self, role: MaterialRole) -> Option<&mut dyn MaterialBinding> {
            self.bindings[role.index()]
                .as_mut()
                .map(|binding| binding as &mut dyn MaterialBinding)
        }

        fn viewport_size(&self) -> (u32, u32) {
            self.size
        }

        fn camera_position(&self) -> [f32; 3] {
            [0.0, 0.0, -2.0]
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        names: Vec<String>,
        ramps_at_emit: Vec<Vec<Rgb>>,
        pending_ramp: Vec<Rgb>,
    }

    impl FrameSink for RecordingSink {
        fn emit(&mut self, filename: &str, bytes: &[u8]) -> Result<PathBuf, SceneError> {
            assert!(!bytes.is_empty());
            self.names.push(filename.to_string());
            self.ramps_at_emit.push(self.pending_ramp.clone());
            Ok(PathBuf::from(filename))
        }
    }

    fn scene_state() -> SceneState {
        let ramp = ColorRamp::new([
            (Rgb::BLACK, 2.0),
            (Rgb::BLACK, 2.0),
            (Rgb::new(0x80, 0x80, 0x80), 2.0),
            (Rgb::new(0x80, 0x80, 0x80), 2.0),
        ])
        .unwrap();
        SceneState::new(AnimationState::default(), ramp)
    }

    fn colors(state: &SceneState) -> Vec<Rgb> {
        state.ramp.stops().iter().map(|stop| stop.color).collect()
    }

    struct Harness {
        scheduler: ExportScheduler,
        renderer: Renderer,
        synchronizer: UniformSynchronizer,
        state: SceneState,
        sink: RecordingSink,
        now: Instant,
    }

    impl Harness {
        fn new(config: &str) -> Self {
            let config = SceneConfig::from_toml_str(config).unwrap();
            Self {
                scheduler: ExportScheduler::new(&config.export, 17),
                renderer: Renderer::new(),
                synchronizer: UniformSynchronizer::new(SceneTuning::default()),
                state: scene_state(),
                sink: RecordingSink::default(),
                now: Instant::now(),
            }
        }

        fn step(&mut self) -> Result<Option<ExportOutcome>, ExportError> {
            self.sink.pending_ramp = colors(&self.state);
            drive(
                &mut self.scheduler,
                self.now,
                ExportContext {
                    renderer: &mut self.renderer,
                    synchronizer: &mut self.synchronizer,
                    state: &mut self.state,
                    sink: &mut self.sink,
                    live_time: 42.0,
                },
            )
        }

        /// Jumps to each deadline until the job ends, returning all outcomes.
        fn run_to_completion(&mut self) -> Vec<ExportOutcome> {
            let mut outcomes = Vec::new();
            while self.scheduler.is_running() {
                if let Some(deadline) = self.scheduler.next_deadline() {
                    self.now = self.now.max(deadline);
                }
                if let Some(outcome) = self.step().unwrap() {
                    outcomes.push(outcome);
                }
            }
            outcomes
        }
    }

    #[test]
    fn burst_emits_exactly_count_stills_alternating_with_randomization() {
        let mut harness = Harness::new("version = 1");
        let start = harness.now;
        harness.scheduler.start_burst(start).unwrap();

        let mut previous_colors = colors(&harness.state);
        let mut previous_offset = harness.state.time_offset;
        let mut captures = 0;
        let mut randomizations = 0;
        while harness.scheduler.is_running() {
            if let Some(deadline) = harness.scheduler.next_deadline() {
                harness.now = harness.now.max(deadline);
            }
            if harness.step().unwrap().is_some() {
                captures += 1;
                // capture saw the ramp from before this step's randomization
                assert_eq!(harness.sink.ramps_at_emit.last(), Some(&previous_colors));
                let current = colors(&harness.state);
                assert_ne!(current, previous_colors);
                assert!(harness.state.time_offset >= previous_offset);
                randomizations += 1;
                previous_colors = current;
                previous_offset = harness.state.time_offset;
            }
        }

        assert_eq!(captures, 100);
        assert_eq!(randomizations, 100);
        assert_eq!(harness.sink.names.len(), 100);
        assert!(harness.sink.names.iter().all(|name| name == "scene-4k.jpg"));
        assert_eq!(harness.scheduler.state(), ExportState::Idle);
        assert_eq!(harness.scheduler.next_deadline(), None);
        assert_eq!(harness.now, start + Duration::from_secs(100 * 10 + 1));
        assert_eq!(harness.renderer.owner, RenderOwner::Live);
        assert_eq!(harness.renderer.size, (4, 2));
    }

    #[test]
    fn burst_cancelled_mid_run_stops_emitting() {
        let mut harness = Harness::new("version = 1");
        harness.scheduler.start_burst(harness.now).unwrap();
        let mut emitted = 0;
        while emitted < 3 {
            if let Some(deadline) = harness.scheduler.next_deadline() {
                harness.now = deadline;
            }
            if harness.step().unwrap().is_some() {
                emitted += 1;
            }
        }
        harness.scheduler.cancel();
        assert_eq!(harness.scheduler.next_deadline(), None);
        harness.now += Duration::from_secs(3600);
        assert!(harness.step().unwrap().is_none());
        assert_eq!(harness.sink.names.len(), 3);
        assert_eq!(harness.scheduler.state(), ExportState::Cancelled);
    }

    #[test]
    fn sequence_runs_emit_unique_increasing_names() {
        let mut harness = Harness::new("version = 1");
        let mut all = HashSet::new();
        for expected_run in 0..2u32 {
            let run = harness.scheduler.start_sequence(harness.now).unwrap();
            assert_eq!(run, expected_run);
            assert!(harness.scheduler.is_sequence_active());
            let outcomes = harness.run_to_completion();
            assert_eq!(outcomes.len(), 300);
            let names: Vec<String> = outcomes.iter().map(|o| o.step.filename()).collect();
            assert_eq!(names[0], format!("video{run:02}_frame_000.png"));
            assert_eq!(names[299], format!("video{run:02}_frame_299.png"));
            assert!(names.windows(2).all(|pair| pair[0] < pair[1]));
            for name in names {
                assert!(all.insert(name));
            }
            assert!(!harness.scheduler.is_sequence_active());
        }
        assert_eq!(all.len(), 600);
    }

    #[test]
    fn sequence_frames_use_virtual_clock() {
        let mut harness = Harness::new("version = 1\n[export.sequence]\nduration = \"100ms\"\n");
        harness.scheduler.start_sequence(harness.now).unwrap();
        let outcomes = harness.run_to_completion();
        assert_eq!(outcomes.len(), 6);
        let times = &harness.renderer.times;
        assert_eq!(times.len(), 6);
        for (index, pair) in times.windows(2).enumerate() {
            let delta = pair[1] - pair[0];
            assert!((delta - 1.0 / 60.0).abs() < 1e-3, "frame {index} delta {delta}");
        }
        assert!(times.iter().all(|t| *t != 42.0));
    }

    #[test]
    fn sequence_cancelled_during_cooldown_stops_emitting() {
        let mut harness = Harness::new("version = 1");
        assert_eq!(harness.scheduler.start_sequence(harness.now).unwrap(), 0);
        let mut emitted = 0;
        while emitted < 4 {
            if let Some(deadline) = harness.scheduler.next_deadline() {
                harness.now = deadline;
            }
            if harness.step().unwrap().is_some() {
                emitted += 1;
            }
        }

        let resume_at = harness.scheduler.next_deadline().unwrap();
        assert_eq!(resume_at, harness.now + Duration::from_secs(5));
        assert!(harness.scheduler.cancel());
        assert!(!harness.scheduler.is_sequence_active());
        assert_eq!(harness.scheduler.next_deadline(), None);

        harness.now = resume_at + Duration::from_secs(60);
        assert!(harness.step().unwrap().is_none());
        assert_eq!(harness.sink.names.len(), 4);
        assert_eq!(harness.sink.names.last().map(String::as_str), Some("video00_frame_003.png"));
        assert_eq!(harness.scheduler.state(), ExportState::Cancelled);
        assert_eq!(harness.renderer.owner, RenderOwner::Live);
        assert_eq!(harness.renderer.target, None);
        assert_eq!(harness.renderer.size, (4, 2));

        assert_eq!(harness.scheduler.start_sequence(harness.now).unwrap(), 1);
        assert!(harness.scheduler.is_sequence_active());
    }

    #[test]
    fn failed_capture_aborts_without_emitting() {
        let mut harness = Harness::new("version = 1");
        harness.renderer.fail_on_render = Some(2);
        harness.scheduler.start_sequence(harness.now).unwrap();
        assert!(harness.step().unwrap().is_some());
        harness.now = harness.scheduler.next_deadline().unwrap();
        let err = harness.step().unwrap_err();
        assert!(matches!(err, ExportError::Capture(CaptureError::Render(_))));
        assert_eq!(harness.sink.names.len(), 1);
        assert!(!harness.scheduler.is_running());
        assert_eq!(harness.renderer.owner, RenderOwner::Live);
        assert_eq!(harness.renderer.target, None);
    }

    #[test]
    fn unattached_scene_rejects_request() {
        let mut harness = Harness::new("version = 1");
        harness.renderer.bindings[1] = None;
        let err = harness
            .scheduler
            .request(crate::ExportMode::Burst, Some(&harness.renderer), harness.now)
            .unwrap_err();
        assert!(matches!(err, ExportError::RendererUnavailable));
        let err = harness
            .scheduler
            .request::<Renderer>(crate::ExportMode::Sequence, None, harness.now)
            .unwrap_err();
        assert!(matches!(err, ExportError::RendererUnavailable));
        assert!(!harness.scheduler.is_running());
    }
}
