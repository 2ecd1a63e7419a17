use std::path::PathBuf;
use std::process;

use anyhow::Context;
use clap::Parser;
use log::{error, info};

use slime_sim::{constants::PRESETS_DIR, framework, Settings};

#[derive(Parser, Debug)]
#[command(name = "slime-sim", version, about = "GPU slime mould simulation")]
struct Cli {
    /// Preset name, loaded from `<presets-dir>/<PRESET>.json`.
    preset: String,

    /// Directory holding the preset files.
    #[arg(long, default_value = PRESETS_DIR)]
    presets_dir: PathBuf,
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let settings = Settings::load_preset(&cli.presets_dir, &cli.preset)
        .with_context(|| format!("could not load preset `{}`", cli.preset))?;
    info!(
        "loaded preset `{}`: {}x{} field, {} agents",
        cli.preset, settings.map_width, settings.map_height, settings.agent_number
    );
    framework::run(settings)?;
    Ok(())
}

/// Exit status for any failure, startup or runtime.
const FAILURE: i32 = -1;

fn main() {
    use env_logger::Env;
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // --help and --version also arrive here.
            process::exit(if e.use_stderr() { FAILURE } else { 0 });
        }
    };

    if let Err(e) = run(&cli) {
        error!("{e:#}");
        process::exit(FAILURE);
    }
}
