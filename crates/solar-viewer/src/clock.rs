//! Scene clock driving the sun direction and shadows.
//!
//! Each viewport camera owns its [`ViewerClock`] as a component, so two
//! viewports never share time state. The clock is paused by default and holds
//! noon of the summer solstice, which is when the radiation data was captured.

use bevy::prelude::*;
use web_time::Instant;

use crate::ui::ViewportOptions;

/// Earth's axial tilt in degrees.
const AXIAL_TILT_DEG: f64 = 23.44;

/// Seconds in an hour.
const SECONDS_PER_HOUR: f64 = 3600.0;

/// Seconds in a day.
const SECONDS_PER_DAY: f64 = 86400.0;

/// Plugin for the clock-driven sun.
pub struct ClockPlugin;

impl Plugin for ClockPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Update, (tick_clocks, update_sun).chain());
    }
}

/// Marker component for the sun directional light.
#[derive(Component)]
pub struct Sun;

/// A UTC instant, in seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct UtcTime(pub f64);

/// A simple date representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimpleDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl SimpleDate {
    /// Returns the day of year (1-366).
    pub fn day_of_year(&self) -> u32 {
        let days_before_month = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334];
        let mut day = days_before_month[self.month.saturating_sub(1) as usize] + self.day;
        if self.is_leap_year() && self.month > 2 {
            day += 1;
        }
        day
    }

    /// Returns whether this is a leap year.
    pub fn is_leap_year(&self) -> bool {
        (self.year % 4 == 0 && self.year % 100 != 0) || self.year % 400 == 0
    }

    /// Days since 1970-01-01.
    fn days_since_epoch(&self) -> i64 {
        // Howard Hinnant's days_from_civil.
        let y = i64::from(self.year) - i64::from(self.month <= 2);
        let era = if y >= 0 { y } else { y - 399 } / 400;
        let yoe = y - era * 400;
        let m = i64::from(self.month);
        let doy = (153 * (if m > 2 { m - 3 } else { m + 9 }) + 2) / 5 + i64::from(self.day) - 1;
        let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
        era * 146_097 + doe - 719_468
    }

    /// Inverse of [`SimpleDate::days_since_epoch`].
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn from_days_since_epoch(days: i64) -> Self {
        let z = days + 719_468;
        let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
        let doe = z - era * 146_097;
        let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
        let y = yoe + era * 400;
        let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
        let mp = (5 * doy + 2) / 153;
        let d = doy - (153 * mp + 2) / 5 + 1;
        let m = if mp < 10 { mp + 3 } else { mp - 9 };
        Self {
            year: (if m <= 2 { y + 1 } else { y }) as i32,
            month: m as u32,
            day: d as u32,
        }
    }
}

impl UtcTime {
    /// Parse `YYYY-MM-DD` or `YYYY-MM-DDTHH:MM:SS[Z]`.
    pub fn parse_iso8601(s: &str) -> Result<Self, String> {
        let s = s.trim().trim_end_matches('Z');
        let (date, time) = s.split_once('T').unwrap_or((s, "00:00:00"));

        let date_parts: Vec<&str> = date.split('-').collect();
        let time_parts: Vec<&str> = time.split(':').collect();
        if date_parts.len() != 3 || time_parts.len() != 3 {
            return Err(format!("expected YYYY-MM-DD[THH:MM:SS], got '{s}'"));
        }

        let year = date_parts[0]
            .parse::<i32>()
            .map_err(|e| format!("invalid year: {e}"))?;
        let month = date_parts[1]
            .parse::<u32>()
            .map_err(|e| format!("invalid month: {e}"))?;
        let day = date_parts[2]
            .parse::<u32>()
            .map_err(|e| format!("invalid day: {e}"))?;
        let hour = time_parts[0]
            .parse::<u32>()
            .map_err(|e| format!("invalid hour: {e}"))?;
        let minute = time_parts[1]
            .parse::<u32>()
            .map_err(|e| format!("invalid minute: {e}"))?;
        let second = time_parts[2]
            .parse::<f64>()
            .map_err(|e| format!("invalid second: {e}"))?;

        if !(1..=12).contains(&month) {
            return Err(format!("month out of range: {month}"));
        }
        if !(1..=31).contains(&day) {
            return Err(format!("day out of range: {day}"));
        }
        if hour >= 24 || minute >= 60 || !(0.0..60.0).contains(&second) {
            return Err(format!("time out of range: {time}"));
        }

        let date = SimpleDate { year, month, day };
        #[allow(clippy::cast_precision_loss)]
        let days = date.days_since_epoch() as f64;
        let seconds = f64::from(hour) * SECONDS_PER_HOUR + f64::from(minute) * 60.0 + second;
        Ok(Self(days * SECONDS_PER_DAY + seconds))
    }

    /// The calendar date of this instant.
    #[allow(clippy::cast_possible_truncation)]
    pub fn date(self) -> SimpleDate {
        SimpleDate::from_days_since_epoch((self.0 / SECONDS_PER_DAY).floor() as i64)
    }

    /// Seconds since midnight UTC.
    pub fn seconds_of_day(self) -> f64 {
        self.0.rem_euclid(SECONDS_PER_DAY)
    }
}

/// What happens when the clock reaches the end of its range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockRange {
    /// Time runs without bounds.
    Unbounded,
    /// Time stops at the start or stop time.
    Clamped,
    /// Time jumps back to the start when it passes the stop time.
    LoopStop,
}

/// How the clock advances each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockStep {
    /// `multiplier` seconds per frame.
    TickDependent,
    /// Real elapsed time scaled by `multiplier`.
    SystemClockMultiplier,
    /// Real elapsed time.
    SystemClock,
}

/// Simulation time for one viewport.
#[derive(Component, Debug, Clone)]
pub struct ViewerClock {
    pub start: UtcTime,
    pub current: UtcTime,
    pub stop: UtcTime,
    pub range: ClockRange,
    pub step: ClockStep,
    pub multiplier: f64,
    /// The clock only advances while animating.
    pub should_animate: bool,
    last_tick: Option<Instant>,
}

impl ViewerClock {
    /// Create a paused clock.
    #[must_use]
    pub fn new(start: UtcTime, current: UtcTime, stop: UtcTime) -> Self {
        Self {
            start,
            current,
            stop,
            range: ClockRange::LoopStop,
            step: ClockStep::SystemClockMultiplier,
            multiplier: 1.0,
            should_animate: false,
            last_tick: None,
        }
    }

    /// The solstice week the radiation datasets were computed for.
    pub fn solstice() -> Result<Self, String> {
        Ok(Self::new(
            UtcTime::parse_iso8601("2023-06-21")?,
            UtcTime::parse_iso8601("2023-06-21T12:00:00Z")?,
            UtcTime::parse_iso8601("2023-06-30")?,
        ))
    }

    /// Advance by `real_elapsed` seconds of wall-clock time.
    pub fn advance(&mut self, real_elapsed: f64) {
        if !self.should_animate {
            return;
        }

        let delta = match self.step {
            ClockStep::TickDependent => self.multiplier,
            ClockStep::SystemClockMultiplier => real_elapsed * self.multiplier,
            ClockStep::SystemClock => real_elapsed,
        };
        let mut next = self.current.0 + delta;

        match self.range {
            ClockRange::Unbounded => {}
            ClockRange::Clamped => {
                if next <= self.start.0 || next >= self.stop.0 {
                    next = next.clamp(self.start.0, self.stop.0);
                    self.should_animate = false;
                }
            }
            ClockRange::LoopStop => {
                if next < self.start.0 || next > self.stop.0 {
                    next = self.start.0;
                }
            }
        }

        self.current = UtcTime(next);
    }

    /// Advance using the wall clock since the previous tick.
    pub fn tick(&mut self, now: Instant) {
        let elapsed = self
            .last_tick
            .map_or(0.0, |last| now.duration_since(last).as_secs_f64());
        self.last_tick = Some(now);
        self.advance(elapsed);
    }

    /// The sun's declination in degrees for the current date.
    ///
    /// Ranges from -23.44° (winter solstice) to +23.44° (summer solstice).
    pub fn sun_declination_deg(&self) -> f64 {
        let day = f64::from(self.current.date().day_of_year());
        // The +10 shifts the minimum to the winter solstice (~day 355).
        let angle_rad = (360.0 / 365.0 * (day + 10.0)).to_radians();
        -AXIAL_TILT_DEG * angle_rad.cos()
    }

    /// Direction towards the sun in ECEF coordinates.
    ///
    /// At UTC 12:00 the subsolar point is over the prime meridian; it moves
    /// westward at 15°/hour.
    #[allow(clippy::cast_possible_truncation)]
    pub fn sun_direction(&self) -> Vec3 {
        let utc_hours = self.current.seconds_of_day() / SECONDS_PER_HOUR;
        let subsolar_lon_rad = ((12.0 - utc_hours) * 15.0).to_radians();
        let subsolar_lat_rad = self.sun_declination_deg().to_radians();

        Vec3::new(
            (subsolar_lat_rad.cos() * subsolar_lon_rad.cos()) as f32,
            (subsolar_lat_rad.cos() * subsolar_lon_rad.sin()) as f32,
            subsolar_lat_rad.sin() as f32,
        )
    }
}

/// Advance every viewport clock.
fn tick_clocks(mut clocks: Query<&mut ViewerClock>) {
    let now = Instant::now();
    for mut clock in &mut clocks {
        clock.tick(now);
    }
}

/// Point the sun along the viewport clock and apply the shadow option.
#[allow(clippy::needless_pass_by_value)]
fn update_sun(
    clocks: Query<&ViewerClock>,
    options: Res<ViewportOptions>,
    mut sun_query: Query<(&mut Transform, &mut DirectionalLight), With<Sun>>,
) {
    let Ok(clock) = clocks.single() else {
        return;
    };
    let Ok((mut transform, mut light)) = sun_query.single_mut() else {
        return;
    };

    // DirectionalLight shines along -Z, so look away from the sun.
    *transform = Transform::default().looking_to(-clock.sun_direction(), Vec3::Z);

    if light.shadows_enabled != options.shadows {
        light.shadows_enabled = options.shadows;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_and_time() {
        let noon = UtcTime::parse_iso8601("2023-06-21T12:00:00Z").unwrap();
        let midnight = UtcTime::parse_iso8601("2023-06-21").unwrap();
        assert_eq!(noon.0 - midnight.0, 12.0 * SECONDS_PER_HOUR);
        assert_eq!(noon.date(), SimpleDate { year: 2023, month: 6, day: 21 });
        assert_eq!(UtcTime::parse_iso8601("1970-01-01").unwrap().0, 0.0);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(UtcTime::parse_iso8601("2023-13-01").is_err());
        assert!(UtcTime::parse_iso8601("2023-06").is_err());
        assert!(UtcTime::parse_iso8601("2023-06-21T25:00:00").is_err());
    }

    #[test]
    fn test_solstice_clock_is_paused_at_noon() {
        let mut clock = ViewerClock::solstice().unwrap();
        let before = clock.current;
        clock.advance(60.0);
        assert_eq!(clock.current, before);
        assert!((clock.current.seconds_of_day() - 12.0 * SECONDS_PER_HOUR).abs() < 1e-6);
    }

    #[test]
    fn test_loop_stop_wraps_to_start() {
        let mut clock = ViewerClock::solstice().unwrap();
        clock.should_animate = true;
        clock.multiplier = SECONDS_PER_DAY * 10.0;
        clock.advance(1.0);
        assert_eq!(clock.current, clock.start);
    }

    #[test]
    fn test_clamped_stops_animating() {
        let mut clock = ViewerClock::solstice().unwrap();
        clock.range = ClockRange::Clamped;
        clock.should_animate = true;
        clock.multiplier = SECONDS_PER_DAY * 10.0;
        clock.advance(1.0);
        assert_eq!(clock.current, clock.stop);
        assert!(!clock.should_animate);
    }

    #[test]
    fn test_sun_overhead_at_solstice_noon() {
        let clock = ViewerClock::solstice().unwrap();
        let sun = clock.sun_direction();
        // Over the prime meridian, near the tropic of cancer.
        assert!(sun.y.abs() < 1e-3);
        let lat = sun.z.asin().to_degrees();
        assert!((lat - 23.44).abs() < 0.1, "declination was {lat}");
    }

    #[test]
    fn test_clocks_are_independent() {
        let mut a = ViewerClock::solstice().unwrap();
        let b = a.clone();
        a.should_animate = true;
        a.advance(3600.0);
        assert!(a.current.0 > b.current.0);
    }
}
