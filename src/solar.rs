use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime};
use chrono_tz::Tz;
use solar_positioning::{spa, Horizon, SunriseResult};

use crate::error::{Error, Result};

/// Delta T (TT − UT) in seconds, fixed at the current decade's value.
const DELTA_T: f64 = 69.0;

/// Sun elevations bounding the golden hour, in degrees above the horizon.
const GOLDEN_HOUR_UPPER_DEG: f64 = 6.0;
const GOLDEN_HOUR_LOWER_DEG: f64 = -4.0;

/// Geographic site the camera shoots from. Passed explicitly to every
/// calculation rather than living in a module constant.
#[derive(Debug, Clone)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: Tz,
}

impl Location {
    /// The original camera site.
    pub fn san_francisco() -> Self {
        Location {
            latitude: 37.754444,
            longitude: -122.4425,
            timezone: chrono_tz::America::Los_Angeles,
        }
    }
}

/// The sun events of one calendar date at one location, in local time.
#[derive(Debug, Clone)]
pub struct SolarEvents {
    pub dawn: DateTime<Tz>,
    pub sunrise: DateTime<Tz>,
    pub noon: DateTime<Tz>,
    pub sunset: DateTime<Tz>,
    pub dusk: DateTime<Tz>,
}

/// Which side of solar noon a golden hour is requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SunDirection {
    Rising,
    Setting,
}

/// Golden-hour interval: sun between 6° above and 4° below the horizon.
#[derive(Debug, Clone)]
pub struct GoldenHour {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

impl GoldenHour {
    pub fn midpoint(&self) -> DateTime<Tz> {
        self.start + (self.end - self.start) / 2
    }
}

/// Compute dawn, sunrise, noon, sunset and dusk for one date.
///
/// Polar day and polar night surface as `Error::Calculation`; at the
/// latitudes this tool is pointed at they should never occur, but they are
/// reported rather than swallowed.
pub fn compute_events(date: NaiveDate, location: &Location) -> Result<SolarEvents> {
    let (sunrise, noon, sunset) = horizon_crossings(date, location, Horizon::SunriseSunset)?;
    let (dawn, _, dusk) = horizon_crossings(date, location, Horizon::CivilTwilight)?;
    Ok(SolarEvents {
        dawn,
        sunrise,
        noon,
        sunset,
        dusk,
    })
}

/// Compute the golden-hour interval for one date.
pub fn compute_golden_hour(
    date: NaiveDate,
    location: &Location,
    direction: SunDirection,
) -> Result<GoldenHour> {
    let (rise_upper, set_upper) = elevation_crossings(date, location, GOLDEN_HOUR_UPPER_DEG)?;
    let (rise_lower, set_lower) = elevation_crossings(date, location, GOLDEN_HOUR_LOWER_DEG)?;

    let (start, end) = match direction {
        SunDirection::Rising => (rise_lower, rise_upper),
        SunDirection::Setting => (set_upper, set_lower),
    };

    if end <= start {
        return Err(calc_err(date, "golden hour interval is empty"));
    }
    Ok(GoldenHour { start, end })
}

/// Sunrise, transit and sunset for a standard horizon definition.
fn horizon_crossings(
    date: NaiveDate,
    location: &Location,
    horizon: Horizon,
) -> Result<(DateTime<Tz>, DateTime<Tz>, DateTime<Tz>)> {
    let result = spa::sunrise_sunset_utc_for_horizon(
        date.year(),
        date.month(),
        date.day(),
        location.latitude,
        location.longitude,
        DELTA_T,
        horizon,
    )
    .map_err(|e| calc_err(date, e.to_string()))?;

    match result {
        SunriseResult::RegularDay {
            sunrise,
            transit,
            sunset,
        } => {
            let (rd, rh) = sunrise.day_and_hours();
            let (td, th) = transit.day_and_hours();
            let (sd, sh) = sunset.day_and_hours();
            Ok((
                local_time(date, rd as i64, rh, location.timezone),
                local_time(date, td as i64, th, location.timezone),
                local_time(date, sd as i64, sh, location.timezone),
            ))
        }
        SunriseResult::AllDay { .. } => {
            Err(calc_err(date, "polar day, sun never crosses the horizon"))
        }
        SunriseResult::AllNight { .. } => Err(calc_err(date, "polar night, sun never rises")),
    }
}

/// The two times the sun crosses a given elevation angle (rising, setting).
fn elevation_crossings(
    date: NaiveDate,
    location: &Location,
    elevation: f64,
) -> Result<(DateTime<Tz>, DateTime<Tz>)> {
    let result = spa::sunrise_sunset_utc(
        date.year(),
        date.month(),
        date.day(),
        location.latitude,
        location.longitude,
        DELTA_T,
        elevation,
    )
    .map_err(|e| calc_err(date, e.to_string()))?;

    match result {
        SunriseResult::RegularDay {
            sunrise, sunset, ..
        } => {
            let (rd, rh) = sunrise.day_and_hours();
            let (sd, sh) = sunset.day_and_hours();
            Ok((
                local_time(date, rd as i64, rh, location.timezone),
                local_time(date, sd as i64, sh, location.timezone),
            ))
        }
        SunriseResult::AllDay { .. } | SunriseResult::AllNight { .. } => Err(calc_err(
            date,
            format!("sun never crosses {elevation}° on this date"),
        )),
    }
}

/// Convert a UTC (day offset, fractional hours) pair into local time.
fn local_time(date: NaiveDate, day_offset: i64, hours: f64, tz: Tz) -> DateTime<Tz> {
    let utc = date.and_time(NaiveTime::MIN).and_utc()
        + Duration::days(day_offset)
        + Duration::milliseconds((hours * 3_600_000.0).round() as i64);
    utc.with_timezone(&tz)
}

fn calc_err(date: NaiveDate, reason: impl Into<String>) -> Error {
    Error::Calculation {
        date,
        reason: reason.into(),
    }
}
