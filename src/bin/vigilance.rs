use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ndarray::{Array2, Array3};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use vigilance::{
    config::parse_override,
    io::{ScoringFile, SignalData},
    AnalysisConfig, Band, BandMode, PowerMode, Recording, TagFilter,
};

#[derive(Parser)]
#[command(name = "vigilance", about = "Hypnogram statistics and state-resolved EEG/EMG spectra")]
struct Args {
    /// Signal file (safetensors with `signal` and `srate` tensors)
    #[arg(long)]
    signal: PathBuf,

    /// Scoring file (JSON with `hypnogram` and `markers`)
    #[arg(long)]
    scoring: PathBuf,

    /// JSON configuration file layered over the defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override one configuration key, e.g. `--set block=900` (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    overrides: Vec<String>,

    /// Tags of interest for marker queries (default: all tags)
    #[arg(long, value_delimiter = ',')]
    toi: Vec<String>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Per-state, per-block epoch counts, durations, proportions and episodes
    Stats,
    /// State transition counts per block
    Transitions,
    /// Tag totals, TOI timing, event states and hourly histogram
    Events,
    /// Aggregated power spectra
    Power {
        /// Mode keywords: bin, normstate, normtot, all (none = raw)
        #[arg(long, num_args = 0.., value_delimiter = ',')]
        mode: Vec<String>,
    },
    /// Band-power table
    Bands {
        /// delta, theta, alpha, sigma, beta, gamma or all
        #[arg(long)]
        band: String,
        /// Mode keywords: bin, state (none = total)
        #[arg(long, num_args = 0.., value_delimiter = ',')]
        mode: Vec<String>,
    },
    /// Welch spectrum and RMS of every TOI marker
    Markers {
        /// Write the scoring back with the computed RMS values attached
        #[arg(long, value_name = "PATH")]
        write_scoring: Option<PathBuf>,
    },
}

fn rows<T: Clone + Serialize>(a: &Array2<T>) -> Vec<Vec<T>> {
    a.rows().into_iter().map(|r| r.to_vec()).collect()
}

fn cube(a: &Array3<f64>) -> Vec<Vec<Vec<f64>>> {
    a.outer_iter().map(|m| rows(&m.to_owned())).collect()
}

fn run(rec: &mut Recording, command: &Command) -> Result<Value> {
    let state_list = rec.config().state_list();
    let states: Vec<&str> = state_list.iter().map(|s| s.name.as_str()).collect();
    let name = |code: u8| state_list.iter().find(|s| s.code == code).map(|s| s.name.clone());
    let out = match command {
        Command::Stats => {
            let s = rec.hypnogram_stats();
            json!({
                "states": states,
                "block": rec.hypnogram().block(),
                "nblocks": rec.hypnogram().nblocks(),
                "epoch_counts": rows(&s.epoch_counts),
                "durations_sec": rows(&s.durations),
                "proportions": rows(&s.proportions),
                "episode_counts": rows(&s.episode_counts),
                "episode_duration_mean_sec": rows(&s.episode_duration_mean),
                "episode_duration_std_sec": rows(&s.episode_duration_std),
            })
        }
        Command::Transitions => {
            let t = rec.hypnogram().state_transitions();
            json!({
                "pairs": t.pairs.iter().map(|&(b, a)| format!("{}->{}", name(b).unwrap_or_default(), name(a).unwrap_or_default())).collect::<Vec<_>>(),
                "counts": rows(&t.counts),
                "totals": t.totals(),
            })
        }
        Command::Events => {
            let ev = rec.events();
            let es = rec.event_states()?;
            json!({
                "tags": ev.totals(),
                "toi": ev.toi_indices(),
                "start_sec": ev.start_times(),
                "duration_sec": ev.durations(),
                "epochs": es.epochs,
                "states": es.states.iter().map(|s| s.and_then(name)).collect::<Vec<_>>(),
                "double_check": es.double_check,
                "per_bin": rec.events_per_bin()?,
                "bin_hours": rec.config().bin_hours,
            })
        }
        Command::Power { mode } => {
            let table = rec.power(PowerMode::from_keywords(mode)?)?;
            json!({
                "mode": format!("{:?}", table.mode),
                "states": states,
                "freqs": table.freqs,
                "values": cube(&table.values),
                "empty_groups": table.empty_groups,
            })
        }
        Command::Bands { band, mode } => {
            let band: Band = band.parse()?;
            let mode = BandMode::from_keywords(mode)?;
            let table = rec.band_power_table(band, mode)?;
            json!({
                "band": band.as_str(),
                "range_hz": rec.config().bands.range(band),
                "mode": format!("{mode:?}"),
                "values": rows(&table),
            })
        }
        Command::Markers { write_scoring } => {
            let rms = rec.marker_rms()?;
            if let Some(path) = write_scoring {
                let scoring = ScoringFile {
                    hypnogram: rec.hypnogram().labels().to_vec(),
                    markers: rec.markers().to_vec(),
                };
                scoring.save(path).with_context(|| format!("writing scoring {}", path.display()))?;
                log::info!("wrote {} markers to {}", scoring.markers.len(), path.display());
            }
            let ms = rec.marker_spectra()?;
            json!({
                "markers": ms.markers,
                "rms": ms.markers.iter().map(|&i| rms[i]).collect::<Vec<_>>(),
                "fragments": ms.fragments.iter().map(|r| [r.start, r.end]).collect::<Vec<_>>(),
                "freqs": ms.freqs,
                "spectra": rows(&ms.values.t().to_owned()),
            })
        }
    };
    Ok(out)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    env_logger::Builder::new().filter_level(level).parse_default_env().init();

    let overrides = args
        .overrides
        .iter()
        .map(|s| parse_override(s))
        .collect::<vigilance::Result<Vec<_>>>()?;
    let cfg = AnalysisConfig::layered(args.config.as_deref(), &overrides).context("resolving configuration")?;

    let sig = SignalData::load(&args.signal)
        .with_context(|| format!("reading signal {}", args.signal.display()))?;
    let scoring = ScoringFile::load(&args.scoring)
        .with_context(|| format!("reading scoring {}", args.scoring.display()))?;

    let mut rec = Recording::new(sig.signal, sig.srate, scoring.hypnogram, scoring.markers, cfg)?;
    rec.set_toi(TagFilter::tags(args.toi.iter().cloned()));

    let out = run(&mut rec, &args.command)?;
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
