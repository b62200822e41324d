//! Daylight state: the cached sun window and the daylight evaluator.
//!
//! The poll loop owns exactly one [`DaylightCache`]. It holds the sunrise/sunset
//! pair for the current calendar day and replaces it once the day rolls over.
//! Day boundaries are always judged on calendar dates in the time zone of the
//! `now` timestamp handed in by the caller, never on elapsed seconds, so the
//! rollover stays correct across daylight-saving transitions.

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

use crate::solar::SunCalculator;

/// Geographic position the daylight state is computed for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    /// Latitude in degrees, positive north
    pub latitude: f64,
    /// Longitude in degrees, positive east
    pub longitude: f64,
}

impl Location {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Sunrise and sunset instants for one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SunWindow {
    pub sunrise: DateTime<Utc>,
    pub sunset: DateTime<Utc>,
}

impl SunWindow {
    pub fn new(sunrise: DateTime<Utc>, sunset: DateTime<Utc>) -> Self {
        Self { sunrise, sunset }
    }

    /// The daylight interval after trimming `offset` from both ends.
    ///
    /// Returns `None` when the offset pushes either bound outside the
    /// representable range. The interval may be empty (start after end).
    pub fn effective(&self, offset: Duration) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let start = self.sunrise.checked_add_signed(offset)?;
        let end = self.sunset.checked_sub_signed(offset)?;
        Some((start, end))
    }

    /// Calendar dates of sunrise and sunset as seen from `tz`.
    pub fn local_dates<Tz: TimeZone>(&self, tz: &Tz) -> (NaiveDate, NaiveDate) {
        (
            self.sunrise.with_timezone(tz).date_naive(),
            self.sunset.with_timezone(tz).date_naive(),
        )
    }
}

/// One evaluated daylight state, handed to the sink and then discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaylightSample {
    pub timestamp: DateTime<Utc>,
    pub is_daylight: bool,
}

/// Whether `now` falls inside the daylight interval of `window`.
///
/// Daylight starts `offset` after sunrise and ends `offset` before sunset.
/// Both bounds are inclusive. A negative offset widens the interval, and an
/// offset large enough to cross the two bounds yields `false` for every `now`.
pub fn is_daylight<Tz: TimeZone>(window: &SunWindow, now: &DateTime<Tz>, offset: Duration) -> bool {
    let Some((start, end)) = window.effective(offset) else {
        return false;
    };
    let now = now.with_timezone(&Utc);
    !(now < start || now > end)
}

/// Whether `window`, computed for `computed_for`, belongs to a day that has ended.
///
/// The trigger is the date of `now - 24h`: the window is stale once that date
/// has caught up with `computed_for` or with the local date of its sunrise or
/// sunset. A window is never stale on the date it was computed for. That date
/// is tracked separately from the sunrise date because a location east of the
/// clock's zone rises on the previous clock date, and because the last hour of
/// a 25-hour day is still within 24h of its start.
pub fn is_stale<Tz: TimeZone>(
    window: &SunWindow,
    computed_for: NaiveDate,
    now: &DateTime<Tz>,
) -> bool {
    if computed_for >= now.date_naive() {
        return false;
    }
    let yesterday = (now.clone() - Duration::hours(24)).date_naive();
    let (sunrise_day, sunset_day) = window.local_dates(&now.timezone());
    computed_for <= yesterday || sunrise_day <= yesterday || sunset_day <= yesterday
}

/// Holds the sun window of the current day for a fixed location.
#[derive(Debug, Clone)]
pub struct DaylightCache {
    location: Location,
    date: NaiveDate,
    window: SunWindow,
}

impl DaylightCache {
    /// Compute the initial window for the calendar day containing `now`.
    pub fn new<C, Tz>(calculator: &C, location: Location, now: &DateTime<Tz>) -> Result<Self>
    where
        C: SunCalculator + ?Sized,
        Tz: TimeZone,
    {
        let date = now.date_naive();
        let window = calculator.sun_window(&location, date)?;
        Ok(Self {
            location,
            date,
            window,
        })
    }

    /// Build a cache around a window already computed for `date`.
    pub fn with_window(location: Location, date: NaiveDate, window: SunWindow) -> Self {
        Self {
            location,
            date,
            window,
        }
    }

    pub fn location(&self) -> Location {
        self.location
    }

    /// The calendar date the cached window was computed for.
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn window(&self) -> &SunWindow {
        &self.window
    }

    /// Recompute the window for today's date if the cached one is stale.
    ///
    /// Returns `Ok(true)` when the window was replaced. On error the cached
    /// window is left untouched.
    pub fn refresh_if_stale<C, Tz>(&mut self, calculator: &C, now: &DateTime<Tz>) -> Result<bool>
    where
        C: SunCalculator + ?Sized,
        Tz: TimeZone,
    {
        if !is_stale(&self.window, self.date, now) {
            return Ok(false);
        }
        let date = now.date_naive();
        self.window = calculator.sun_window(&self.location, date)?;
        self.date = date;
        Ok(true)
    }
}
