use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;

/// Encoder parameters for the daily timelapses. The defaults are the
/// H.265 settings the archive has always been encoded with.
#[derive(Debug, Clone)]
pub struct EncoderSettings {
    pub framerate: u32,
    pub crf: u32,
    pub codec: String,
    pub preset: String,
    /// Re-encode over an existing output instead of skipping it.
    pub overwrite: bool,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        EncoderSettings {
            framerate: 30,
            crf: 23,
            codec: "libx265".to_string(),
            preset: "medium".to_string(),
            overwrite: false,
        }
    }
}

/// ffmpeg argument list for one timelapse: glob input, one video out,
/// tagged hvc1 so QuickTime recognizes the H.265 stream.
pub fn ffmpeg_args(input_glob: &str, output: &Path, settings: &EncoderSettings) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();
    args.push(if settings.overwrite { "-y" } else { "-n" }.to_string());
    for s in ["-pattern_type", "glob", "-i"] {
        args.push(s.to_string());
    }
    args.push(input_glob.to_string());
    args.push("-framerate".to_string());
    args.push(settings.framerate.to_string());
    args.push("-crf".to_string());
    args.push(settings.crf.to_string());
    args.push("-c:v".to_string());
    args.push(settings.codec.clone());
    args.push("-preset".to_string());
    args.push(settings.preset.clone());
    args.push("-tag:v".to_string());
    args.push("hvc1".to_string());
    args.push(output.display().to_string());
    args
}

/// Encode one day's frames out of `source_dir` into `output_file`,
/// selecting frames by the `YYYYMMDD` filename prefix.
pub fn encode_day(
    date: NaiveDate,
    source_dir: &Path,
    output_file: &Path,
    settings: &EncoderSettings,
) -> Result<()> {
    let mask = format!("{}*.jpg", date.format("%Y%m%d"));
    let input_glob = source_dir.join(mask).display().to_string();
    println!("Encoding {} -> {}", input_glob, output_file.display());

    let output = Command::new("ffmpeg")
        .args(ffmpeg_args(&input_glob, output_file, settings))
        .output()
        .context("Failed to run ffmpeg; is it installed?")?;

    if !output.status.success() {
        bail!(
            "ffmpeg failed for {}: {}",
            date,
            String::from_utf8_lossy(&output.stderr).trim_end()
        );
    }
    Ok(())
}

/// Encode one `<YYYYMMDD>.mp4` per day of the inclusive date range.
///
/// A day that fails to encode is reported and does not stop the rest of
/// the range; rerunning is cheap because finished outputs are skipped
/// unless `overwrite` is set.
pub fn encode_range(
    source_dir: &Path,
    output_dir: &Path,
    first_day: NaiveDate,
    last_day: NaiveDate,
    settings: &EncoderSettings,
) -> Result<()> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;

    let mut failed: Vec<NaiveDate> = Vec::new();
    let mut date = first_day;
    while date <= last_day {
        let output_file = output_dir.join(format!("{}.mp4", date.format("%Y%m%d")));
        if output_file.exists() && !settings.overwrite {
            println!("Skipping {} (already encoded)", output_file.display());
        } else if let Err(e) = encode_day(date, source_dir, &output_file, settings) {
            eprintln!("Warning: {e:#}");
            failed.push(date);
        }

        match date.succ_opt() {
            Some(next) => date = next,
            None => break,
        }
    }

    if !failed.is_empty() {
        println!();
        println!("{} day(s) failed to encode:", failed.len());
        for date in &failed {
            println!("  {date}");
        }
    }
    Ok(())
}
