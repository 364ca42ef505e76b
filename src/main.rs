use clap::Parser;

use timelapse_tools::args::{Cli, CliCommand};
use timelapse_tools::selector::{self, SelectOptions, Selector};
use timelapse_tools::video::{self, EncoderSettings};

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let location = cli.location();

    match cli.command {
        CliCommand::Copy {
            source_root,
            dest,
            event,
            minutes,
            last_days,
            skip_years,
            report,
        } => {
            let selector = Selector::new(dest, location)?;
            let opts = SelectOptions {
                event,
                window_minutes: minutes,
                last_n_days: last_days,
                skip_years: skip_years.into_iter().collect(),
            };

            let run_report = selector.select_and_copy(&source_root, &opts)?;
            if let Some(path) = report {
                selector::write_report(&run_report, &path)?;
                println!("Report written to {}", path.display());
            }
        }

        CliCommand::Video {
            source_dir,
            output,
            first_day,
            last_day,
            overwrite,
            framerate,
            crf,
            preset,
        } => {
            let settings = EncoderSettings {
                framerate,
                crf,
                preset,
                overwrite,
                ..EncoderSettings::default()
            };
            video::encode_range(&source_dir, &output, first_day, last_day, &settings)?;
        }
    }

    Ok(())
}
