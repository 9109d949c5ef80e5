//! Ordered color ramp shared by every material in the scene.
//!
//! Every mutator takes `&self` and returns the next ramp so callers can keep
//! the previous value around (undo, change detection) without cloning up front.
//! Edits that would break the size bounds leave the ramp untouched.

use std::fmt;

use rand::Rng;
use sceneconfig::{ColorSpec, RampConfig};
use tracing::debug;

use crate::error::{RampBoundary, SceneError};

/// Maximum number of stops the material programs can consume.
pub const MAX_STOPS: usize = 5;
/// Leading stops kept fixed by [`ColorRamp::randomize_free`].
pub const ANCHOR_COUNT: usize = 2;
/// Upper bound for stop intensity, matching the editing range.
pub const MAX_INTENSITY: f32 = 2.0;
/// Color given to stops created through the add control.
pub const NEW_STOP_COLOR: Rgb = Rgb::WHITE;
pub const NEW_STOP_INTENSITY: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn from_hex(raw: &str) -> Result<Self, SceneError> {
        let [r, g, b] = sceneconfig::parse_hex_color(raw)?;
        Ok(Self::new(r, g, b))
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Channels normalised to `[0, 1]` for shader consumption.
    pub fn to_unit(self) -> [f32; 3] {
        [
            f32::from(self.r) / 255.0,
            f32::from(self.g) / 255.0,
            f32::from(self.b) / 255.0,
        ]
    }

    /// Converts HSL (hue in degrees, saturation and lightness in `[0, 1]`) and
    /// quantises to 8 bits per channel.
    pub fn from_hsl(hue: f32, saturation: f32, lightness: f32) -> Self {
        let hue = hue.rem_euclid(360.0);
        let chroma = (1.0 - (2.0 * lightness - 1.0).abs()) * saturation;
        let sector = hue / 60.0;
        let x = chroma * (1.0 - (sector % 2.0 - 1.0).abs());
        let (r, g, b) = match sector as u32 {
            0 => (chroma, x, 0.0),
            1 => (x, chroma, 0.0),
            2 => (0.0, chroma, x),
            3 => (0.0, x, chroma),
            4 => (x, 0.0, chroma),
            _ => (chroma, 0.0, x),
        };
        let m = lightness - chroma / 2.0;
        let quantise = |v: f32| ((v + m).clamp(0.0, 1.0) * 255.0).round() as u8;
        Self::new(quantise(r), quantise(g), quantise(b))
    }

    /// Fully saturated color at a uniformly drawn integer hue.
    pub fn random_hue<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let hue = rng.gen_range(0..360) as f32;
        Self::from_hsl(hue, 1.0, 0.5)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StopId(u32);

impl StopId {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for StopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColorStop {
    pub id: StopId,
    pub color: Rgb,
    pub intensity: f32,
}

/// Which ramp editing controls are currently meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RampAvailability {
    pub can_add: bool,
    pub can_remove: bool,
    pub len: usize,
}

impl RampAvailability {
    pub fn can_move_up(&self, index: usize) -> bool {
        index > 0 && index < self.len
    }

    pub fn can_move_down(&self, index: usize) -> bool {
        index + 1 < self.len
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColorRamp {
    stops: Vec<ColorStop>,
    next_id: u32,
}

impl ColorRamp {
    /// Builds a ramp from `(color, intensity)` pairs; ids are assigned in order.
    pub fn new<I>(entries: I) -> Result<Self, SceneError>
    where
        I: IntoIterator<Item = (Rgb, f32)>,
    {
        let mut ramp = Self {
            stops: Vec::new(),
            next_id: 1,
        };
        for (color, intensity) in entries {
            if ramp.stops.len() == MAX_STOPS {
                return Err(SceneError::InvalidRamp(format!(
                    "more than {MAX_STOPS} stops"
                )));
            }
            let id = ramp.allocate_id();
            ramp.stops.push(ColorStop {
                id,
                color,
                intensity: clamp_intensity(intensity),
            });
        }
        if ramp.stops.is_empty() {
            return Err(SceneError::InvalidRamp("a ramp needs at least one stop".into()));
        }
        Ok(ramp)
    }

    /// Resolves `random` entries with `rng`.
    pub fn from_config<R: Rng + ?Sized>(config: &RampConfig, rng: &mut R) -> Result<Self, SceneError> {
        let entries: Vec<(Rgb, f32)> = config
            .stops
            .iter()
            .map(|stop| {
                let color = match stop.color {
                    ColorSpec::Random => Rgb::random_hue(rng),
                    ColorSpec::Rgb([r, g, b]) => Rgb::new(r, g, b),
                };
                (color, stop.intensity)
            })
            .collect();
        Self::new(entries)
    }

    pub fn stops(&self) -> &[ColorStop] {
        &self.stops
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    /// Always false; a ramp holds at least one stop.
    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    pub fn get(&self, id: StopId) -> Option<&ColorStop> {
        self.stops.iter().find(|stop| stop.id == id)
    }

    pub fn index_of(&self, id: StopId) -> Option<usize> {
        self.stops.iter().position(|stop| stop.id == id)
    }

    pub fn availability(&self) -> RampAvailability {
        RampAvailability {
            can_add: self.stops.len() < MAX_STOPS,
            can_remove: self.stops.len() > 1,
            len: self.stops.len(),
        }
    }

    pub fn try_add(&self, color: Rgb, intensity: f32) -> Result<Self, SceneError> {
        if self.stops.len() >= MAX_STOPS {
            return Err(SceneError::RampBoundaryViolation(RampBoundary::Full));
        }
        let mut next = self.clone();
        let id = next.allocate_id();
        next.stops.push(ColorStop {
            id,
            color,
            intensity: clamp_intensity(intensity),
        });
        Ok(next)
    }

    #[must_use]
    pub fn add(&self, color: Rgb, intensity: f32) -> Self {
        self.try_add(color, intensity)
            .unwrap_or_else(|err| self.ignore(err))
    }

    pub fn try_remove(&self, id: StopId) -> Result<Self, SceneError> {
        let index = self
            .index_of(id)
            .ok_or(SceneError::RampBoundaryViolation(RampBoundary::UnknownStop(id)))?;
        if self.stops.len() <= 1 {
            return Err(SceneError::RampBoundaryViolation(RampBoundary::LastStop));
        }
        let mut next = self.clone();
        next.stops.remove(index);
        Ok(next)
    }

    #[must_use]
    pub fn remove(&self, id: StopId) -> Self {
        self.try_remove(id).unwrap_or_else(|err| self.ignore(err))
    }

    #[must_use]
    pub fn set_color(&self, id: StopId, color: Rgb) -> Self {
        let mut next = self.clone();
        match next.stops.iter_mut().find(|stop| stop.id == id) {
            Some(stop) => stop.color = color,
            None => debug!(%id, "ignoring color edit for unknown stop"),
        }
        next
    }

    /// Non-finite values are ignored; everything else is clamped to `[0, 2]`.
    #[must_use]
    pub fn set_intensity(&self, id: StopId, intensity: f32) -> Self {
        if !intensity.is_finite() {
            return self.clone();
        }
        let mut next = self.clone();
        match next.stops.iter_mut().find(|stop| stop.id == id) {
            Some(stop) => stop.intensity = clamp_intensity(intensity),
            None => debug!(%id, "ignoring intensity edit for unknown stop"),
        }
        next
    }

    #[must_use]
    pub fn move_up(&self, index: usize) -> Self {
        let mut next = self.clone();
        if index > 0 && index < next.stops.len() {
            next.stops.swap(index - 1, index);
        }
        next
    }

    #[must_use]
    pub fn move_down(&self, index: usize) -> Self {
        let mut next = self.clone();
        if index + 1 < next.stops.len() {
            next.stops.swap(index, index + 1);
        }
        next
    }

    /// Gives every stop past the anchors a fresh hue. A stop never keeps its
    /// previous color unless the generator refuses to produce another one.
    #[must_use]
    pub fn randomize_free<R: Rng + ?Sized>(&self, rng: &mut R) -> Self {
        const MAX_REDRAWS: usize = 16;
        let mut next = self.clone();
        for stop in next.stops.iter_mut().skip(ANCHOR_COUNT) {
            let mut color = Rgb::random_hue(rng);
            for _ in 0..MAX_REDRAWS {
                if color != stop.color {
                    break;
                }
                color = Rgb::random_hue(rng);
            }
            stop.color = color;
        }
        next
    }

    fn allocate_id(&mut self) -> StopId {
        let id = StopId(self.next_id);
        self.next_id += 1;
        id
    }

    fn ignore(&self, err: SceneError) -> Self {
        debug!(error = %err, len = self.stops.len(), "ramp edit ignored");
        self.clone()
    }
}

fn clamp_intensity(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, MAX_INTENSITY)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn gray() -> Rgb {
        Rgb::new(0x80, 0x80, 0x80)
    }

    fn ramp_of(len: usize) -> ColorRamp {
        let entries = (0..len).map(|i| {
            if i < ANCHOR_COUNT {
                (Rgb::BLACK, 2.0)
            } else {
                (gray(), 1.0)
            }
        });
        ColorRamp::new(entries).unwrap()
    }

    fn ids(ramp: &ColorRamp) -> Vec<StopId> {
        ramp.stops().iter().map(|stop| stop.id).collect()
    }

    #[test]
    fn add_then_remove_restores_stops() {
        let ramp = ramp_of(3);
        let grown = ramp.add(Rgb::WHITE, 1.0);
        assert_eq!(grown.len(), 4);
        let added = grown.stops().last().unwrap().id;
        let shrunk = grown.remove(added);
        assert_eq!(shrunk.stops(), ramp.stops());
    }

    #[test]
    fn size_stays_within_bounds() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut ramp = ramp_of(1);
        for _ in 0..200 {
            if rng.gen_bool(0.5) {
                ramp = ramp.add(Rgb::WHITE, 1.0);
            } else {
                let victim = ramp.stops()[rng.gen_range(0..ramp.len())].id;
                ramp = ramp.remove(victim);
            }
            assert!((1..=MAX_STOPS).contains(&ramp.len()));
        }
    }

    #[test]
    fn boundary_edits_report_violation() {
        let full = ramp_of(MAX_STOPS);
        assert!(matches!(
            full.try_add(Rgb::WHITE, 1.0),
            Err(SceneError::RampBoundaryViolation(RampBoundary::Full))
        ));
        assert_eq!(full.add(Rgb::WHITE, 1.0), full);

        let single = ramp_of(1);
        let only = single.stops()[0].id;
        assert!(matches!(
            single.try_remove(only),
            Err(SceneError::RampBoundaryViolation(RampBoundary::LastStop))
        ));
        assert_eq!(single.remove(only), single);
    }

    #[test]
    fn ids_are_never_reused() {
        let ramp = ramp_of(3);
        let first = ramp.stops()[2].id;
        let ramp = ramp.remove(first).add(Rgb::WHITE, 1.0);
        let fresh = ramp.stops().last().unwrap().id;
        assert_ne!(fresh, first);
        assert!(fresh > first);
    }

    #[test]
    fn moves_are_noops_at_bounds() {
        let ramp = ramp_of(4);
        assert_eq!(ids(&ramp.move_up(0)), ids(&ramp));
        assert_eq!(ids(&ramp.move_down(3)), ids(&ramp));
        assert_eq!(ids(&ramp.move_down(10)), ids(&ramp));

        let moved = ramp.move_up(2);
        let original = ids(&ramp);
        assert_eq!(ids(&moved), vec![original[0], original[2], original[1], original[3]]);
    }

    #[test]
    fn edits_preserve_order_and_clamp_intensity() {
        let ramp = ramp_of(3);
        let target = ramp.stops()[1].id;
        let edited = ramp.set_intensity(target, 7.5).set_color(target, Rgb::WHITE);
        assert_eq!(ids(&edited), ids(&ramp));
        let stop = edited.get(target).unwrap();
        assert_eq!(stop.intensity, MAX_INTENSITY);
        assert_eq!(stop.color, Rgb::WHITE);
        assert_eq!(edited.set_intensity(target, -1.0).get(target).unwrap().intensity, 0.0);
        assert_eq!(edited.set_intensity(target, f32::NAN), edited);
    }

    #[test]
    fn randomize_preserves_anchors_and_changes_free_stops() {
        let mut rng = StdRng::seed_from_u64(11);
        for len in 1..=MAX_STOPS {
            let ramp = ramp_of(len);
            let next = ramp.randomize_free(&mut rng);
            assert_eq!(ids(&next), ids(&ramp));
            for (index, (before, after)) in ramp.stops().iter().zip(next.stops()).enumerate() {
                if index < ANCHOR_COUNT {
                    assert_eq!(before, after);
                } else {
                    assert_ne!(before.color, after.color);
                    assert_eq!(before.intensity, after.intensity);
                }
            }
        }
    }

    #[test]
    fn hsl_conversion_hits_primaries() {
        assert_eq!(Rgb::from_hsl(0.0, 1.0, 0.5), Rgb::new(255, 0, 0));
        assert_eq!(Rgb::from_hsl(120.0, 1.0, 0.5), Rgb::new(0, 255, 0));
        assert_eq!(Rgb::from_hsl(240.0, 1.0, 0.5), Rgb::new(0, 0, 255));
        assert_eq!(Rgb::from_hsl(60.0, 1.0, 0.5), Rgb::new(255, 255, 0));
    }

    #[test]
    fn hex_round_trip() {
        let color = Rgb::from_hex("#1a2B3c").unwrap();
        assert_eq!(color, Rgb::new(0x1a, 0x2b, 0x3c));
        assert_eq!(color.to_hex(), "#1a2b3c");
        assert!(Rgb::from_hex("nope").is_err());
    }

    #[test]
    fn availability_tracks_size() {
        let single = ramp_of(1).availability();
        assert!(single.can_add);
        assert!(!single.can_remove);
        assert!(!single.can_move_up(0));
        assert!(!single.can_move_down(0));

        let full = ramp_of(MAX_STOPS).availability();
        assert!(!full.can_add);
        assert!(full.can_remove);
        assert!(full.can_move_up(4));
        assert!(!full.can_move_down(4));
    }

    #[test]
    fn default_config_resolves_random_stops() {
        let mut rng = StdRng::seed_from_u64(5);
        let ramp = ColorRamp::from_config(&RampConfig::default(), &mut rng).unwrap();
        assert_eq!(ramp.len(), 5);
        assert_eq!(ramp.stops()[0].color, Rgb::BLACK);
        assert_eq!(ramp.stops()[1].color, Rgb::BLACK);
        assert!(ramp.stops().iter().all(|stop| stop.intensity == 2.0));
    }
}
