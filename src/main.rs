use anyhow::{Context, Result};
use clap::Parser;
use fast_core::color::color_set;
use fast_experiment::{DesignConfig, DesignPreset, JsonFileStore, ParticipantId, ResultStore};
use log::info;
use std::path::PathBuf;

mod app;
mod simulate;

use app::App;

#[derive(Parser)]
#[command(name = "fast-search")]
#[command(version)]
#[command(about = "Conjunction visual search with counterbalanced target assignment")]
struct Cli {
    /// Participant number (1-based); read from <results-dir>/participant_id when omitted
    #[arg(short, long)]
    participant: Option<u32>,

    /// Built-in design: fast-3r-10b, fast-2r-15b-cc or fast-2r-15b-tc
    #[arg(short, long, default_value_t = DesignPreset::Fast)]
    design: DesignPreset,

    /// JSON design file, overrides --design
    #[arg(long)]
    design_file: Option<PathBuf>,

    /// Where result files are written
    #[arg(long, default_value = "results")]
    results_dir: PathBuf,

    /// TrueType/OpenType font for countdown and feedback text
    #[arg(long)]
    font: Option<PathBuf>,

    /// Seed for schedule shuffling and layouts (random when omitted)
    #[arg(long)]
    seed: Option<u64>,

    /// Run the whole session headless with a scripted responder and export it
    #[arg(long)]
    simulate: bool,

    /// Print palette colors for these hues (comma-separated degrees) and exit
    #[arg(long, value_delimiter = ',')]
    tune_palette: Option<Vec<f64>>,

    /// Target contrast ratio against the background for --tune-palette
    #[arg(long, default_value_t = 1.0)]
    contrast: f64,

    /// HSL saturation in percent for --tune-palette
    #[arg(long, default_value_t = 50.0)]
    saturation: f64,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn load_design(cli: &Cli) -> Result<DesignConfig> {
    let design = match &cli.design_file {
        Some(path) => DesignConfig::from_json_file(path)
            .with_context(|| format!("loading design from {}", path.display()))?,
        None => cli.design.design(),
    };
    design.validate()?;
    Ok(design)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    let design = load_design(&cli)?;

    if let Some(hues) = &cli.tune_palette {
        for (hue, rgb) in hues.iter().zip(color_set(hues, cli.saturation, cli.contrast, design.background)) {
            let contrast = rgb.contrast_with(&design.background);
            println!("{hue:>6.1}  {rgb}  contrast {contrast:.3}");
        }
        return Ok(());
    }

    let mut store = JsonFileStore::new(&cli.results_dir);
    let id = match cli.participant {
        Some(id) => id,
        None => store
            .participant_id()
            .context("no --participant given and no stored participant id")?,
    };
    let participant = ParticipantId::new(id, &design)?;
    let seed = cli.seed.unwrap_or_else(rand::random);

    info!(
        "design {} ({} trials), participant {}, seed {}",
        design.version,
        design.total_trials(),
        participant,
        seed
    );

    if cli.simulate {
        let path = simulate::run(design, participant, seed, &mut store)?;
        println!("{}", path.display());
        return Ok(());
    }

    let font = cli
        .font
        .as_deref()
        .map(fast_render::load_font)
        .transpose()?;
    App::new(design, participant, seed, font, store).run()
}
