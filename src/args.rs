use std::path::PathBuf;

use chrono::NaiveDate;
use chrono_tz::Tz;
use clap::{Parser, Subcommand};

use crate::archive::Event;
use crate::solar::Location;

#[derive(Parser)]
#[command(
    name = "timelapse_tools",
    version,
    about = "Select sun-event frames out of a timelapse archive and build daily videos"
)]
pub struct Cli {
    /// Camera site latitude in degrees.
    #[arg(long, global = true, default_value_t = 37.754444, allow_hyphen_values = true)]
    pub latitude: f64,

    /// Camera site longitude in degrees, west negative.
    #[arg(long, global = true, default_value_t = -122.4425, allow_hyphen_values = true)]
    pub longitude: f64,

    /// IANA timezone of the camera site.
    #[arg(long, global = true, default_value = "America/Los_Angeles")]
    pub timezone: Tz,

    #[command(subcommand)]
    pub command: CliCommand,
}

impl Cli {
    pub fn location(&self) -> Location {
        Location {
            latitude: self.latitude,
            longitude: self.longitude,
            timezone: self.timezone,
        }
    }
}

#[derive(Subcommand)]
pub enum CliCommand {
    /// Copy the frames around a sun event out of every archive day.
    Copy {
        /// Archive root holding one directory per day.
        source_root: PathBuf,

        /// Flat directory the selected frames are copied into.
        #[arg(short, long)]
        dest: PathBuf,

        /// Sun event to select around: sunrise, sunset or goldenhour.
        #[arg(long, default_value_t = Event::Sunset)]
        event: Event,

        /// Total window width in minutes. Defaults to the full hour for
        /// goldenhour and one minute for the other events.
        #[arg(long)]
        minutes: Option<u32>,

        /// Only look at the most recent N archive days (0 = all).
        #[arg(long, default_value_t = 0)]
        last_days: usize,

        /// Year to skip entirely; repeatable.
        #[arg(long = "skip-year", value_name = "YEAR")]
        skip_years: Vec<i32>,

        /// Write the run report as JSON to this path.
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Build one timelapse video per day from already-copied frames.
    Video {
        /// Directory of frames whose names start with YYYYMMDD.
        source_dir: PathBuf,

        /// Directory the <YYYYMMDD>.mp4 files are written into.
        #[arg(short, long)]
        output: PathBuf,

        /// First day of the range (YYYY-MM-DD).
        #[arg(long)]
        first_day: NaiveDate,

        /// Last day of the range, inclusive (YYYY-MM-DD).
        #[arg(long)]
        last_day: NaiveDate,

        /// Replace existing videos instead of skipping them.
        #[arg(long)]
        overwrite: bool,

        /// Output frame rate.
        #[arg(long, default_value_t = 30)]
        framerate: u32,

        /// Constant rate factor, lower is higher quality.
        #[arg(long, default_value_t = 23)]
        crf: u32,

        /// Encoder preset.
        #[arg(long, default_value = "medium")]
        preset: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_a_copy_invocation() {
        let cli = Cli::parse_from([
            "timelapse_tools",
            "copy",
            "/archive",
            "--dest",
            "/work",
            "--event",
            "goldenhour",
            "--skip-year",
            "2020",
            "--skip-year",
            "2021",
        ]);

        assert_eq!(cli.latitude, 37.754444);
        match cli.command {
            CliCommand::Copy {
                event,
                skip_years,
                minutes,
                ..
            } => {
                assert_eq!(event, Event::GoldenHour);
                assert_eq!(skip_years, vec![2020, 2021]);
                assert_eq!(minutes, None);
            }
            CliCommand::Video { .. } => panic!("expected the copy subcommand"),
        }
    }

    #[test]
    fn rejects_unknown_events() {
        let result = Cli::try_parse_from([
            "timelapse_tools",
            "copy",
            "/archive",
            "--dest",
            "/work",
            "--event",
            "midnight",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn parses_a_video_invocation_with_dates() {
        let cli = Cli::parse_from([
            "timelapse_tools",
            "video",
            "/work",
            "--output",
            "/videos",
            "--first-day",
            "2022-01-01",
            "--last-day",
            "2022-01-31",
            "--overwrite",
        ]);

        match cli.command {
            CliCommand::Video {
                first_day,
                last_day,
                overwrite,
                ..
            } => {
                assert_eq!(first_day, NaiveDate::from_ymd_opt(2022, 1, 1).unwrap());
                assert_eq!(last_day, NaiveDate::from_ymd_opt(2022, 1, 31).unwrap());
                assert!(overwrite);
            }
            CliCommand::Copy { .. } => panic!("expected the video subcommand"),
        }
    }
}
