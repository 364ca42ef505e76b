use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Duration, NaiveDate};
use chrono_tz::Tz;
use regex::{Captures, Regex};

use crate::error::{Error, Result};
use crate::solar::{self, GoldenHour, Location, SolarEvents, SunDirection};

/// The camera writes one frame every 10 seconds. The wildcard scheme below
/// bakes this cadence in; an archive captured at a different interval needs
/// a new pattern scheme, not a bigger window.
pub const CAPTURE_INTERVAL_SECS: i64 = 10;

/// Channel token the camera embeds between its id and the timestamp.
pub const CAMERA_CHANNEL: &str = "01";

/// Window widths used when the caller does not give one: the full hour for
/// the golden hour, one minute around the instantaneous events.
const GOLDEN_HOUR_DEFAULT_MINUTES: u32 = 60;
const DEFAULT_WINDOW_MINUTES: u32 = 1;

// Archive folders are named like "2022_03_05-2022_03_05"; the trailing
// segment is the calendar date.
static DIR_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}_\d{2}_\d{2}-(?P<year>\d{4})_(?P<month>\d{2})_(?P<day>\d{2})$").unwrap()
});

/// Sun event an archive subset is selected around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    Sunrise,
    Sunset,
    GoldenHour,
}

impl Event {
    pub fn as_str(self) -> &'static str {
        match self {
            Event::Sunrise => "sunrise",
            Event::Sunset => "sunset",
            Event::GoldenHour => "goldenhour",
        }
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Event {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sunrise" => Ok(Event::Sunrise),
            "sunset" => Ok(Event::Sunset),
            "goldenhour" => Ok(Event::GoldenHour),
            other => Err(Error::UnknownEvent(other.to_string())),
        }
    }
}

/// One archived day of timelapse frames.
///
/// The calendar date comes from the directory name; sun events and the
/// golden hour are computed once at construction. Expected-filename
/// patterns are built on first request and cached per (event, width).
#[derive(Debug, Clone)]
pub struct ArchiveDirectory {
    path: PathBuf,
    name: String,
    date: NaiveDate,
    events: SolarEvents,
    golden_hour: GoldenHour,
    golden_hour_midpoint: DateTime<Tz>,
    patterns: HashMap<(Event, u32), Vec<String>>,
}

impl ArchiveDirectory {
    pub fn new(path: impl Into<PathBuf>, location: &Location) -> Result<Self> {
        let path = path.into();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let date = parse_directory_date(&name)?;
        let events = solar::compute_events(date, location)?;
        let golden_hour = solar::compute_golden_hour(date, location, SunDirection::Setting)?;
        let golden_hour_midpoint = golden_hour.midpoint();

        Ok(ArchiveDirectory {
            path,
            name,
            date,
            events,
            golden_hour,
            golden_hour_midpoint,
            patterns: HashMap::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn events(&self) -> &SolarEvents {
        &self.events
    }

    pub fn golden_hour(&self) -> &GoldenHour {
        &self.golden_hour
    }

    /// Timestamp the event window is centered on: the golden-hour midpoint
    /// for `GoldenHour`, the event instant otherwise.
    pub fn event_time(&self, event: Event) -> DateTime<Tz> {
        match event {
            Event::Sunrise => self.events.sunrise,
            Event::Sunset => self.events.sunset,
            Event::GoldenHour => self.golden_hour_midpoint,
        }
    }

    /// `YYYYMMDD` of the event timestamp, used as a substring key against
    /// filenames already present in the destination.
    pub fn day_key(&self, event: Event) -> String {
        self.event_time(event).format("%Y%m%d").to_string()
    }

    /// Glob patterns for every frame expected inside the event window,
    /// oldest tick first.
    ///
    /// `window` is the total width in minutes; `None` selects the event's
    /// default. The window spans exactly `window` minutes centered on the
    /// event, both endpoints included, one pattern per 10-second tick, so a
    /// W-minute request yields `W*6 + 1` patterns.
    pub fn expected_filenames(&mut self, event: Event, window: Option<u32>) -> Result<&[String]> {
        let minutes = match window {
            Some(0) => return Err(Error::InvalidWindow),
            Some(m) => m,
            None if event == Event::GoldenHour => GOLDEN_HOUR_DEFAULT_MINUTES,
            None => DEFAULT_WINDOW_MINUTES,
        };

        let center = self.event_time(event);
        let dir = self.path.clone();
        let patterns = self
            .patterns
            .entry((event, minutes))
            .or_insert_with(|| window_patterns(&dir, center, minutes));
        Ok(patterns.as_slice())
    }
}

/// Build one wildcard per 10-second tick of a window centered on `center`.
///
/// Frame names look like `192.168.1.99_01_20220305235955789_TIMING.jpg`;
/// the pattern keeps the timestamp down to the tens-of-seconds digit and
/// wildcards the rest, so each tick matches exactly one capture slot.
fn window_patterns(dir: &Path, center: DateTime<Tz>, minutes: u32) -> Vec<String> {
    let half = Duration::seconds(i64::from(minutes) * 60 / 2);
    let end = center + half;
    let mut tick = center - half;
    let mut patterns = Vec::new();

    while tick <= end {
        let stamp = tick.format("%Y%m%d%H%M%S").to_string();
        let name = format!("*_{}_{}*.jpg", CAMERA_CHANNEL, &stamp[..stamp.len() - 1]);
        patterns.push(dir.join(name).display().to_string());
        tick += Duration::seconds(CAPTURE_INTERVAL_SECS);
    }
    patterns
}

fn parse_directory_date(name: &str) -> Result<NaiveDate> {
    let caps = DIR_NAME
        .captures(name)
        .ok_or_else(|| Error::ParseDirectoryName(name.to_string()))?;
    NaiveDate::from_ymd_opt(group(&caps, "year") as i32, group(&caps, "month"), group(&caps, "day"))
        .ok_or_else(|| Error::ParseDirectoryName(name.to_string()))
}

fn group(caps: &Captures<'_>, name: &str) -> u32 {
    // The named groups are all \d{2} or \d{4}, so this cannot fail.
    caps[name].parse().unwrap_or(0)
}
