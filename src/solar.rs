//! Sunrise and sunset calculation for a location and calendar date.
//!
//! The calculation itself is delegated to the `sunrise` crate. Results are
//! absolute UTC instants; callers convert them into whatever zone their clock
//! runs in.

use anyhow::Result;
use chrono::NaiveDate;
use sunrise::{Coordinates, SolarDay, SolarEvent};

use crate::constants::{MAXIMUM_LATITUDE, MAXIMUM_LONGITUDE, MINIMUM_LATITUDE, MINIMUM_LONGITUDE};
use crate::daylight::{Location, SunWindow};

/// Source of sunrise/sunset times.
#[cfg_attr(test, mockall::automock)]
pub trait SunCalculator {
    /// Sunrise and sunset at `location` on `date`.
    fn sun_window(&self, location: &Location, date: NaiveDate) -> Result<SunWindow>;
}

/// Offline solar calculator backed by the `sunrise` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct SolarCalculator;

impl SunCalculator for SolarCalculator {
    fn sun_window(&self, location: &Location, date: NaiveDate) -> Result<SunWindow> {
        validate_coordinates(location.latitude, location.longitude)?;

        let coord = Coordinates::new(location.latitude, location.longitude)
            .ok_or_else(|| anyhow::anyhow!("Failed to create coordinates"))?;
        let solar_day = SolarDay::new(coord, date);

        Ok(SunWindow::new(
            solar_day.event_time(SolarEvent::Sunrise),
            solar_day.event_time(SolarEvent::Sunset),
        ))
    }
}

/// Reject coordinates outside the valid geographic range.
pub fn validate_coordinates(latitude: f64, longitude: f64) -> Result<()> {
    if !(MINIMUM_LATITUDE..=MAXIMUM_LATITUDE).contains(&latitude) {
        anyhow::bail!(
            "Invalid latitude: {}. Must be between {} and {} degrees",
            latitude,
            MINIMUM_LATITUDE,
            MAXIMUM_LATITUDE
        );
    }
    if !(MINIMUM_LONGITUDE..=MAXIMUM_LONGITUDE).contains(&longitude) {
        anyhow::bail!(
            "Invalid longitude: {}. Must be between {} and {} degrees",
            longitude,
            MINIMUM_LONGITUDE,
            MAXIMUM_LONGITUDE
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Timelike};
    use chrono_tz::America::Denver;

    #[test]
    fn test_coordinate_validation() {
        assert!(validate_coordinates(40.7128, -74.0060).is_ok());
        assert!(validate_coordinates(90.0, 180.0).is_ok());
        assert!(validate_coordinates(91.0, -74.0060).is_err());
        assert!(validate_coordinates(-91.0, -74.0060).is_err());
        assert!(validate_coordinates(40.7128, 181.0).is_err());
        assert!(validate_coordinates(40.7128, -181.0).is_err());
        assert!(validate_coordinates(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn test_invalid_location_is_rejected() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 21).unwrap();
        assert!(SolarCalculator.sun_window(&Location::new(95.0, 0.0), date).is_err());
    }

    #[test]
    fn test_boulder_summer_solstice() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 21).unwrap();
        let window = SolarCalculator
            .sun_window(&Location::new(40.0, -105.0), date)
            .unwrap();

        assert!(window.sunrise < window.sunset);
        let day_length = window.sunset - window.sunrise;
        assert!(day_length > Duration::hours(14) && day_length < Duration::hours(16));

        // Roughly 05:30 and 20:30 local time
        let sunrise = window.sunrise.with_timezone(&Denver);
        let sunset = window.sunset.with_timezone(&Denver);
        assert_eq!(sunrise.date_naive(), date);
        assert_eq!(sunset.date_naive(), date);
        assert!((4..=6).contains(&sunrise.hour()));
        assert!((19..=21).contains(&sunset.hour()));
    }

    #[test]
    fn test_winter_days_are_shorter() {
        let boulder = Location::new(40.0, -105.0);
        let summer = SolarCalculator
            .sun_window(&boulder, NaiveDate::from_ymd_opt(2024, 6, 21).unwrap())
            .unwrap();
        let winter = SolarCalculator
            .sun_window(&boulder, NaiveDate::from_ymd_opt(2024, 12, 21).unwrap())
            .unwrap();
        assert!(winter.sunset - winter.sunrise < summer.sunset - summer.sunrise);
    }

    #[test]
    fn test_consecutive_days_advance() {
        let boulder = Location::new(40.0, -105.0);
        let day = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let first = SolarCalculator.sun_window(&boulder, day).unwrap();
        let second = SolarCalculator.sun_window(&boulder, day.succ_opt().unwrap()).unwrap();
        let gap = second.sunrise - first.sunrise;
        assert!(gap > Duration::hours(23) && gap < Duration::hours(25));

        // Instants are absolute, DST in Denver does not shift them by an hour
        let noon = Denver
            .with_ymd_and_hms(2024, 3, 11, 12, 0, 0)
            .single()
            .unwrap()
            .with_timezone(&chrono::Utc);
        assert!(second.sunrise < noon && noon < second.sunset);
    }
}
