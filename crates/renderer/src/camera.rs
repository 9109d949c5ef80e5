use sceneconfig::CameraConfig;

const PITCH_LIMIT: f32 = 1.5;

/// Mouse-drag orbit around the origin.
///
/// Yaw 0 / pitch 0 places the camera on the negative z axis looking at the
/// models, which is where the default configuration puts it.
#[derive(Debug, Clone)]
pub(crate) struct OrbitCamera {
    radius: f32,
    yaw: f32,
    pitch: f32,
    sensitivity: f32,
    dragging: bool,
    last_cursor: Option<(f64, f64)>,
}

impl OrbitCamera {
    pub fn from_config(config: &CameraConfig) -> Self {
        let [x, y, z] = config.position;
        let radius = (x * x + y * y + z * z).sqrt().max(0.1);
        Self {
            radius,
            yaw: x.atan2(-z),
            pitch: (y / radius).clamp(-1.0, 1.0).asin().clamp(-PITCH_LIMIT, PITCH_LIMIT),
            sensitivity: config.orbit_sensitivity,
            dragging: false,
            last_cursor: None,
        }
    }

    pub fn position(&self) -> [f32; 3] {
        let (sin_yaw, cos_yaw) = self.yaw.sin_cos();
        let (sin_pitch, cos_pitch) = self.pitch.sin_cos();
        [
            self.radius * cos_pitch * sin_yaw,
            self.radius * sin_pitch,
            -self.radius * cos_pitch * cos_yaw,
        ]
    }

    pub fn begin_drag(&mut self) {
        self.dragging = true;
    }

    pub fn end_drag(&mut self) {
        self.dragging = false;
    }

    /// Tracks the cursor; returns true when the camera moved.
    pub fn cursor_moved(&mut self, x: f64, y: f64) -> bool {
        let previous = self.last_cursor.replace((x, y));
        let Some((last_x, last_y)) = previous else {
            return false;
        };
        if !self.dragging {
            return false;
        }
        let dx = (x - last_x) as f32;
        let dy = (y - last_y) as f32;
        if dx == 0.0 && dy == 0.0 {
            return false;
        }
        self.yaw += dx * self.sensitivity;
        self.pitch = (self.pitch + dy * self.sensitivity).clamp(-PITCH_LIMIT, PITCH_LIMIT);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: [f32; 3], b: [f32; 3]) -> bool {
        a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < 1e-4)
    }

    #[test]
    fn default_config_round_trips_position() {
        let camera = OrbitCamera::from_config(&CameraConfig::default());
        assert!(close(camera.position(), CameraConfig::default().position));
    }

    #[test]
    fn moves_only_while_dragging() {
        let mut camera = OrbitCamera::from_config(&CameraConfig::default());
        let start = camera.position();
        assert!(!camera.cursor_moved(10.0, 10.0));
        assert!(!camera.cursor_moved(60.0, 10.0));
        assert!(close(camera.position(), start));

        camera.begin_drag();
        assert!(camera.cursor_moved(160.0, 10.0));
        let moved = camera.position();
        assert!(!close(moved, start));
        let radius = moved.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((radius - 2.0).abs() < 1e-4);

        camera.end_drag();
        assert!(!camera.cursor_moved(400.0, 400.0));
    }

    #[test]
    fn pitch_is_clamped() {
        let mut camera = OrbitCamera::from_config(&CameraConfig::default());
        camera.begin_drag();
        camera.cursor_moved(0.0, 0.0);
        camera.cursor_moved(0.0, 1.0e6);
        let [_, y, _] = camera.position();
        assert!(y < 2.0);
        assert!((y - 2.0 * PITCH_LIMIT.sin()).abs() < 1e-3);
    }
}
