use std::collections::HashSet;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::thread;

use anyhow::{Context, Result};
use chrono::Datelike;
use crossbeam_channel::{bounded, Receiver, Sender};
use regex::Regex;
use serde::Serialize;
use walkdir::WalkDir;

use crate::archive::{ArchiveDirectory, Event};
use crate::error::Error;
use crate::solar::Location;

/// Suffix for in-flight copies. Renamed away once the copy completes and
/// ignored when the destination snapshot is taken.
const PART_SUFFIX: &str = ".part";

// Frame names: <camera-id>_<channel>_<17-digit timestamp>_<suffix>.jpg.
// The camera id changed over the years (192.168.1.99, then 192.168.1.208
// before it), so the prefix is stripped by shape rather than by literal.
static FRAME_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<camera>.+?)_(?P<channel>\d{2})_(?P<rest>\d{17}.*)$").unwrap()
});

/// What to select and how much of it.
#[derive(Debug, Clone)]
pub struct SelectOptions {
    pub event: Event,
    /// Total window width in minutes; `None` uses the event's default.
    pub window_minutes: Option<u32>,
    /// Keep only the most recent N archive days; 0 keeps all.
    pub last_n_days: usize,
    /// Years excluded from the run entirely.
    pub skip_years: HashSet<i32>,
}

/// Result of scanning the archive root.
pub struct Discovery {
    pub directories: Vec<ArchiveDirectory>,
    /// Entries that are directories but not archive days, with the reason.
    pub rejected: Vec<(String, Error)>,
}

/// Summary of one selection run, printed at the end and optionally written
/// as JSON.
#[derive(Debug, Default, Serialize)]
pub struct RunReport {
    pub directories_total: usize,
    pub directories_processed: usize,
    pub days_skipped_by_year: usize,
    pub days_already_complete: usize,
    pub files_copied: usize,
    pub files_already_present: usize,
    /// Glob patterns that matched no source file. Informational.
    pub missing_patterns: Vec<String>,
    pub rejected_directories: Vec<RejectedDirectory>,
    pub failed_directories: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct RejectedDirectory {
    pub name: String,
    pub reason: String,
}

type WorkItem = (usize, ArchiveDirectory);

struct DayResult {
    index: usize,
    name: String,
    outcome: Result<DayOutcome>,
}

struct DayOutcome {
    expected: usize,
    found_in_dest: usize,
    satisfied: bool,
    copied: usize,
    already_present: usize,
    missing: Vec<String>,
}

/// Scan one level of `root` for archive-day directories.
///
/// Non-directories are skipped silently. Names are naturally sorted
/// ascending, so date-named folders come out chronological; when
/// `last_n_days > 0` only the most recent N entries are kept, matching the
/// original tool which truncated the listing before parsing it.
pub fn discover_directories(
    root: &Path,
    last_n_days: usize,
    location: &Location,
) -> Result<Discovery> {
    let mut entries: Vec<(String, PathBuf)> = Vec::new();

    for entry_result in WalkDir::new(root).min_depth(1).max_depth(1) {
        let entry = match entry_result {
            Ok(e) => e,
            Err(err) => {
                // An unreadable root is fatal; anything below it is not.
                if err.path() == Some(root) {
                    return Err(err).with_context(|| {
                        format!("Failed to read source root {}", root.display())
                    });
                }
                eprintln!("Warning: failed to access an entry under {}: {}", root.display(), err);
                continue;
            }
        };

        if !entry.file_type().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        entries.push((name, entry.into_path()));
    }

    entries.sort_by(|a, b| natord::compare(&a.0, &b.0));
    if last_n_days > 0 && entries.len() > last_n_days {
        entries.drain(..entries.len() - last_n_days);
    }

    let mut directories = Vec::new();
    let mut rejected = Vec::new();
    for (name, path) in entries {
        match ArchiveDirectory::new(path, location) {
            Ok(dir) => directories.push(dir),
            Err(e) => rejected.push((name, e)),
        }
    }

    Ok(Discovery {
        directories,
        rejected,
    })
}

/// Copies event windows out of an archive into one flat destination
/// directory.
pub struct Selector {
    dest_dir: PathBuf,
    location: Location,
}

impl Selector {
    pub fn new(dest_dir: PathBuf, location: Location) -> Result<Self> {
        fs::create_dir_all(&dest_dir).with_context(|| {
            format!("Failed to create destination directory {}", dest_dir.display())
        })?;
        Ok(Selector { dest_dir, location })
    }

    /// Select and copy the configured event window out of every archive day
    /// under `source_root`.
    ///
    /// Copies never overwrite: a frame already present in the destination is
    /// left untouched, which is what makes re-running the whole selection
    /// cheap and safe. The destination listing is snapshotted once up front;
    /// files added by another process during the run are not seen.
    pub fn select_and_copy(&self, source_root: &Path, opts: &SelectOptions) -> Result<RunReport> {
        let discovery = discover_directories(source_root, opts.last_n_days, &self.location)?;

        let mut report = RunReport {
            directories_total: discovery.directories.len() + discovery.rejected.len(),
            ..RunReport::default()
        };
        for (name, err) in discovery.rejected {
            eprintln!("Warning: {name} is not an archive day: {err}");
            report.rejected_directories.push(RejectedDirectory {
                name,
                reason: err.to_string(),
            });
        }

        let downloaded = Arc::new(self.destination_snapshot()?);

        let mut work: Vec<ArchiveDirectory> = Vec::new();
        for dir in discovery.directories {
            if opts.skip_years.contains(&dir.date().year()) {
                println!("Skipping {} (year {} excluded)", dir.name(), dir.date().year());
                report.days_skipped_by_year += 1;
                continue;
            }
            work.push(dir);
        }

        let total = work.len();
        if total > 0 {
            self.run_workers(work, downloaded, opts, &mut report);
        }

        report.missing_patterns.sort();
        self.print_summary(&report);
        Ok(report)
    }

    /// Fan the per-day work out over a small worker pool. Days are fully
    /// independent of each other and every copy goes through a temp-name
    /// rename, so concurrent days cannot trample one another.
    fn run_workers(
        &self,
        work: Vec<ArchiveDirectory>,
        downloaded: Arc<HashSet<String>>,
        opts: &SelectOptions,
        report: &mut RunReport,
    ) {
        let total = work.len();
        let num_workers = (num_cpus::get() / 2).clamp(1, total);
        println!("Processing {total} archive days with {num_workers} workers");

        let (work_tx, work_rx) = bounded::<WorkItem>(num_workers * 2);
        let (result_tx, result_rx) = bounded::<DayResult>(num_workers * 2);

        let mut handles = Vec::new();
        for _ in 0..num_workers {
            let work_rx = work_rx.clone();
            let result_tx = result_tx.clone();
            let dest_dir = self.dest_dir.clone();
            let downloaded = Arc::clone(&downloaded);
            let event = opts.event;
            let window = opts.window_minutes;
            handles.push(thread::spawn(move || {
                worker(work_rx, result_tx, dest_dir, downloaded, event, window);
            }));
        }
        drop(work_rx);
        drop(result_tx);

        // Feed in chronological order; completion order may differ.
        thread::spawn(move || {
            for item in work.into_iter().enumerate() {
                if work_tx.send(item).is_err() {
                    break;
                }
            }
        });

        let mut outcomes: Vec<(usize, DayOutcome)> = Vec::new();
        let mut done = 0;
        for result in result_rx {
            done += 1;
            match result.outcome {
                Ok(outcome) => {
                    if outcome.satisfied {
                        println!(
                            "[{done}/{total}] {}: {}/{} frames already downloaded, skipping",
                            result.name, outcome.found_in_dest, outcome.expected
                        );
                    } else if outcome.missing.is_empty() {
                        println!(
                            "[{done}/{total}] {}: copied {} of {} expected frames",
                            result.name, outcome.copied, outcome.expected
                        );
                    } else {
                        println!(
                            "[{done}/{total}] {}: copied {} of {} expected frames, {} patterns matched nothing",
                            result.name,
                            outcome.copied,
                            outcome.expected,
                            outcome.missing.len()
                        );
                    }
                    outcomes.push((result.index, outcome));
                }
                Err(e) => {
                    eprintln!("[{done}/{total}] {}: {:#}", result.name, e);
                    report.failed_directories.push(result.name);
                }
            }
        }

        for handle in handles {
            let _ = handle.join();
        }

        outcomes.sort_by_key(|(index, _)| *index);
        for (_, outcome) in outcomes {
            report.directories_processed += 1;
            if outcome.satisfied {
                report.days_already_complete += 1;
            }
            report.files_copied += outcome.copied;
            report.files_already_present += outcome.already_present;
            report.missing_patterns.extend(outcome.missing);
        }
    }

    /// One up-front listing of the destination. In-flight `.part` files are
    /// not counted as downloaded.
    fn destination_snapshot(&self) -> Result<HashSet<String>> {
        let mut names = HashSet::new();
        let entries = fs::read_dir(&self.dest_dir).with_context(|| {
            format!("Failed to list destination {}", self.dest_dir.display())
        })?;
        for entry in entries {
            let entry = entry.with_context(|| {
                format!("Failed to list destination {}", self.dest_dir.display())
            })?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.ends_with(PART_SUFFIX) {
                names.insert(name);
            }
        }
        Ok(names)
    }

    fn print_summary(&self, report: &RunReport) {
        println!();
        println!("=== SELECTION COMPLETE ===");
        println!("Archive entries found: {}", report.directories_total);
        println!("Days processed: {}", report.directories_processed);
        println!("Days already complete: {}", report.days_already_complete);
        if report.days_skipped_by_year > 0 {
            println!("Days skipped by year filter: {}", report.days_skipped_by_year);
        }
        println!("Frames copied: {}", report.files_copied);
        println!("Frames already present: {}", report.files_already_present);

        if !report.failed_directories.is_empty() {
            println!();
            println!("Days that failed:");
            for name in &report.failed_directories {
                println!("  {name}");
            }
        }

        if !report.rejected_directories.is_empty() {
            println!();
            println!("Entries that are not archive days:");
            for rejected in &report.rejected_directories {
                println!("  {} ({})", rejected.name, rejected.reason);
            }
        }

        if !report.missing_patterns.is_empty() {
            println!();
            println!("Not all expected frames were found. Missing:");
            for pattern in &report.missing_patterns {
                println!("  {pattern}");
            }
        }
    }
}

/// Write the run report as pretty JSON.
pub fn write_report(report: &RunReport, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create report file {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), report)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;
    Ok(())
}

fn worker(
    work: Receiver<WorkItem>,
    results: Sender<DayResult>,
    dest_dir: PathBuf,
    downloaded: Arc<HashSet<String>>,
    event: Event,
    window: Option<u32>,
) {
    for (index, mut dir) in work {
        let name = dir.name().to_string();
        let outcome = process_day(&mut dir, &dest_dir, &downloaded, event, window);
        if results.send(DayResult { index, name, outcome }).is_err() {
            break;
        }
    }
}

fn process_day(
    dir: &mut ArchiveDirectory,
    dest_dir: &Path,
    downloaded: &HashSet<String>,
    event: Event,
    window: Option<u32>,
) -> Result<DayOutcome> {
    let patterns = dir.expected_filenames(event, window)?.to_vec();
    let key = dir.day_key(event);

    // Completeness heuristic carried over from the original tool: count
    // destination names containing the event date. Substring matching can
    // over- or under-count when unrelated filenames share the digits.
    let found_in_dest = downloaded.iter().filter(|n| n.contains(&key)).count();
    if found_in_dest >= patterns.len() {
        return Ok(DayOutcome {
            expected: patterns.len(),
            found_in_dest,
            satisfied: true,
            copied: 0,
            already_present: 0,
            missing: Vec::new(),
        });
    }

    let mut copied = 0;
    let mut already_present = 0;
    let mut missing = Vec::new();

    for pattern in &patterns {
        let first_match = glob::glob(pattern)
            .with_context(|| format!("Invalid glob pattern {pattern}"))?
            .filter_map(std::result::Result::ok)
            .next();

        let Some(source) = first_match else {
            missing.push(pattern.clone());
            continue;
        };
        let Some(file_name) = source.file_name().map(|n| n.to_string_lossy().into_owned())
        else {
            continue;
        };

        let dest_name = strip_camera_prefix(&file_name);
        let dest_path = dest_dir.join(dest_name);
        if dest_path.exists() {
            already_present += 1;
            continue;
        }

        copy_atomic(&source, dest_dir, dest_name)?;
        copied += 1;
    }

    Ok(DayOutcome {
        expected: patterns.len(),
        found_in_dest,
        satisfied: false,
        copied,
        already_present,
        missing,
    })
}

/// Drop the camera id and channel token from a frame name.
fn strip_camera_prefix(name: &str) -> &str {
    FRAME_PREFIX
        .captures(name)
        .and_then(|caps| caps.name("rest"))
        .map_or(name, |m| m.as_str())
}

/// Copy through a `.part` temp name, then rename into place, so a crashed
/// run never leaves a half-written frame under its final name.
fn copy_atomic(source: &Path, dest_dir: &Path, dest_name: &str) -> Result<()> {
    let tmp = dest_dir.join(format!("{dest_name}{PART_SUFFIX}"));
    let dest = dest_dir.join(dest_name);
    fs::copy(source, &tmp)
        .with_context(|| format!("Failed to copy {} to {}", source.display(), tmp.display()))?;
    fs::rename(&tmp, &dest)
        .with_context(|| format!("Failed to move {} into place", tmp.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration};
    use chrono_tz::Tz;
    use tempfile::tempdir;

    fn site() -> Location {
        Location::san_francisco()
    }

    fn frame_name(ts: &DateTime<Tz>) -> String {
        format!("192.168.1.99_01_{}000_TIMING.jpg", ts.format("%Y%m%d%H%M%S"))
    }

    fn options(event: Event, window: Option<u32>) -> SelectOptions {
        SelectOptions {
            event,
            window_minutes: window,
            last_n_days: 0,
            skip_years: HashSet::new(),
        }
    }

    /// Create an archive day populated with one frame per 10-second tick of
    /// the 1-minute window around the given event.
    fn populate_window(root: &Path, name: &str, event: Event) -> Vec<String> {
        let day = root.join(name);
        fs::create_dir(&day).unwrap();
        let dir = ArchiveDirectory::new(&day, &site()).unwrap();
        let start = dir.event_time(event) - Duration::seconds(30);

        let mut names = Vec::new();
        for i in 0..7 {
            let ts = start + Duration::seconds(10 * i);
            let name = frame_name(&ts);
            fs::write(day.join(&name), name.as_bytes()).unwrap();
            names.push(name);
        }
        names
    }

    fn dest_listing(dest: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dest)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn strips_known_camera_prefixes() {
        assert_eq!(
            strip_camera_prefix("192.168.1.99_01_20220305235955789_TIMING.jpg"),
            "20220305235955789_TIMING.jpg"
        );
        assert_eq!(
            strip_camera_prefix("192.168.1.208_01_20200101080000123_TIMING.jpg"),
            "20200101080000123_TIMING.jpg"
        );
        // Names that do not look like camera frames pass through unchanged.
        assert_eq!(strip_camera_prefix("notes.txt"), "notes.txt");
    }

    #[test]
    fn discovery_skips_files_and_reports_odd_directories() {
        let root = tempdir().unwrap();
        fs::create_dir(root.path().join("2022_03_06-2022_03_06")).unwrap();
        fs::create_dir(root.path().join("2022_03_05-2022_03_05")).unwrap();
        fs::create_dir(root.path().join("System Volume Information")).unwrap();
        fs::write(root.path().join("notes.txt"), b"not a dir").unwrap();

        let discovery = discover_directories(root.path(), 0, &site()).unwrap();

        let names: Vec<&str> = discovery.directories.iter().map(|d| d.name()).collect();
        assert_eq!(names, ["2022_03_05-2022_03_05", "2022_03_06-2022_03_06"]);
        assert_eq!(discovery.rejected.len(), 1);
        assert_eq!(discovery.rejected[0].0, "System Volume Information");
    }

    #[test]
    fn discovery_keeps_only_the_most_recent_days() {
        let root = tempdir().unwrap();
        for name in [
            "2021_12_31-2021_12_31",
            "2022_03_05-2022_03_05",
            "2022_03_06-2022_03_06",
        ] {
            fs::create_dir(root.path().join(name)).unwrap();
        }

        let discovery = discover_directories(root.path(), 2, &site()).unwrap();
        let names: Vec<&str> = discovery.directories.iter().map(|d| d.name()).collect();
        assert_eq!(names, ["2022_03_05-2022_03_05", "2022_03_06-2022_03_06"]);
    }

    #[test]
    fn discovery_fails_on_a_missing_root() {
        let root = tempdir().unwrap();
        let missing = root.path().join("nope");
        assert!(discover_directories(&missing, 0, &site()).is_err());
    }

    #[test]
    fn copies_the_sunset_window_and_strips_the_camera_prefix() {
        let root = tempdir().unwrap();
        let dest = tempdir().unwrap();
        let sources = populate_window(root.path(), "2022_06_21-2022_06_21", Event::Sunset);

        // A frame well outside the window must not be picked up.
        let day = root.path().join("2022_06_21-2022_06_21");
        let dir = ArchiveDirectory::new(&day, &site()).unwrap();
        let stray = frame_name(&(dir.event_time(Event::Sunset) + Duration::minutes(5)));
        fs::write(day.join(&stray), b"stray").unwrap();

        let selector = Selector::new(dest.path().to_path_buf(), site()).unwrap();
        let report = selector
            .select_and_copy(root.path(), &options(Event::Sunset, Some(1)))
            .unwrap();

        assert_eq!(report.files_copied, 7);
        assert!(report.missing_patterns.is_empty());
        assert!(report.failed_directories.is_empty());

        let copied = dest_listing(dest.path());
        assert_eq!(copied.len(), 7);
        for (copied_name, source_name) in copied.iter().zip(&sources) {
            assert_eq!(copied_name, &source_name["192.168.1.99_01_".len()..]);
            assert!(copied_name.starts_with("20220621"), "{copied_name}");
        }
    }

    #[test]
    fn rerun_copies_nothing_and_short_circuits_the_day() {
        let root = tempdir().unwrap();
        let dest = tempdir().unwrap();
        populate_window(root.path(), "2022_06_21-2022_06_21", Event::Sunset);

        let selector = Selector::new(dest.path().to_path_buf(), site()).unwrap();
        let opts = options(Event::Sunset, Some(1));
        selector.select_and_copy(root.path(), &opts).unwrap();

        // Tamper with one copied frame; a rerun must not touch it.
        let copied = dest_listing(dest.path());
        let marker = dest.path().join(&copied[0]);
        fs::write(&marker, b"locally edited").unwrap();

        let report = selector.select_and_copy(root.path(), &opts).unwrap();
        assert_eq!(report.files_copied, 0);
        assert_eq!(report.days_already_complete, 1);
        assert_eq!(fs::read(&marker).unwrap(), b"locally edited");
    }

    #[test]
    fn missing_frames_are_collected_not_fatal() {
        let root = tempdir().unwrap();
        let dest = tempdir().unwrap();
        let sources = populate_window(root.path(), "2022_06_21-2022_06_21", Event::Sunset);

        // Remove one frame from the middle of the window.
        let day = root.path().join("2022_06_21-2022_06_21");
        fs::remove_file(day.join(&sources[3])).unwrap();

        let selector = Selector::new(dest.path().to_path_buf(), site()).unwrap();
        let report = selector
            .select_and_copy(root.path(), &options(Event::Sunset, Some(1)))
            .unwrap();

        assert_eq!(report.files_copied, 6);
        assert_eq!(report.missing_patterns.len(), 1);
        assert!(report.missing_patterns[0].contains("*_01_2022"));
    }

    #[test]
    fn skip_years_excludes_whole_days() {
        let root = tempdir().unwrap();
        let dest = tempdir().unwrap();
        populate_window(root.path(), "2021_06_21-2021_06_21", Event::Sunset);
        populate_window(root.path(), "2022_06_21-2022_06_21", Event::Sunset);

        let mut opts = options(Event::Sunset, Some(1));
        opts.skip_years.insert(2021);

        let selector = Selector::new(dest.path().to_path_buf(), site()).unwrap();
        let report = selector.select_and_copy(root.path(), &opts).unwrap();

        assert_eq!(report.days_skipped_by_year, 1);
        assert_eq!(report.directories_processed, 1);
        assert_eq!(report.files_copied, 7);
        assert!(dest_listing(dest.path()).iter().all(|n| n.starts_with("2022")));
    }

    #[test]
    fn report_serializes_to_json() {
        let dest = tempdir().unwrap();
        let report = RunReport {
            directories_total: 1,
            files_copied: 7,
            missing_patterns: vec!["/archive/x/*_01_2022062120001*.jpg".to_string()],
            ..RunReport::default()
        };

        let path = dest.path().join("report.json");
        write_report(&report, &path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"files_copied\": 7"));
        assert!(text.contains("missing_patterns"));
    }
}
