use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use std::{env, path::Path};
use synbio::{
    about,
    config::SynbioParameters,
    experiment::{EchoExperiment, ExperimentSpec},
    overhangs::find_overhangs,
    plate::{Plate, PlatePreset},
    plate_map::PlateMap,
    reagent::ReagentRegistry,
};
use tracing_subscriber::EnvFilter;

const DEFAULT_PARAMS_PATH: &str = ".synbio_params.json";
const LOG_ENV: &str = "SYNBIO_LOG";

#[derive(Serialize)]
struct PresetSummary {
    preset: PlatePreset,
    name: &'static str,
    rows: usize,
    cols: usize,
    max_vol: f64,
    dead_vol: f64,
    working_vol: f64,
}

#[derive(Serialize)]
struct SourceWellSummary {
    reagent: String,
    wells: usize,
    volume_per_well: f64,
    locations: Vec<String>,
}

#[derive(Serialize)]
struct PlanSummary {
    output: String,
    unit: String,
    transfers: usize,
    total_volume: f64,
    source_wells: Vec<SourceWellSummary>,
}

fn usage() {
    eprintln!(
        "Usage:\n  \
  synbio_cli --version\n  \
  synbio_cli [--params PATH] presets\n  \
  synbio_cli [--params PATH] plate PRESET\n  \
  synbio_cli [--params PATH] set-param NAME VALUE_JSON\n  \
  synbio_cli [--params PATH] plan EXPERIMENT.json SRC_MAP.csv DEST_MAP.csv OUTPUT.csv\n  \
  synbio_cli [--params PATH] size EXPERIMENT.json DEST_MAP.csv\n  \
  synbio_cli [--params PATH] overhangs L MIN_SOLUTIONS SEQ[,SEQ...]\n\n  \
  Set {LOG_ENV}=debug to trace individual transfers"
    );
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact()
        .try_init();
}

fn load_params(path: &str) -> Result<SynbioParameters> {
    if Path::new(path).exists() {
        SynbioParameters::load_from_path(path)
            .with_context(|| format!("Could not load parameters from '{path}'"))
    } else {
        Ok(SynbioParameters::default())
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Could not serialize JSON output")?;
    println!("{text}");
    Ok(())
}

fn parse_global_params_arg(args: &[String]) -> (String, usize) {
    if args.len() >= 3 && args[1] == "--params" {
        return (args[2].clone(), 3);
    }
    (DEFAULT_PARAMS_PATH.to_string(), 1)
}

fn require_args(args: &[String], cmd_idx: usize, count: usize, what: &str) -> Result<()> {
    if args.len() <= cmd_idx + count {
        usage();
        return Err(anyhow!("{} requires: {what}", args[cmd_idx]));
    }
    Ok(())
}

fn load_spec(path: &str) -> Result<ExperimentSpec> {
    ExperimentSpec::from_path(path).with_context(|| format!("Could not load experiment '{path}'"))
}

fn load_map(path: &str) -> Result<PlateMap> {
    PlateMap::from_path(path).with_context(|| format!("Could not load plate map '{path}'"))
}

fn source_wells(exp: &EchoExperiment) -> Vec<SourceWellSummary> {
    let locations = exp.source.locations_by_content();
    exp.allocations
        .iter()
        .map(|(reagent, allocation)| SourceWellSummary {
            reagent: reagent.name().to_string(),
            wells: allocation.wells,
            volume_per_well: allocation.volume_per_well,
            locations: locations.get(reagent).cloned().unwrap_or_default(),
        })
        .collect()
}

fn main() {
    init_logging();
    if let Err(e) = run() {
        eprintln!("{e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() <= 1 {
        usage();
        return Err(anyhow!("Missing command"));
    }
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("{}", about::version_cli_text());
        return Ok(());
    }

    let (params_path, cmd_idx) = parse_global_params_arg(&args);
    if args.len() <= cmd_idx {
        usage();
        return Err(anyhow!("Missing command"));
    }
    let params = load_params(&params_path)?;
    // The one registry for this process.
    let mut registry = ReagentRegistry::new();

    let command = &args[cmd_idx];
    match command.as_str() {
        "presets" => {
            let presets = PlatePreset::all()
                .into_iter()
                .map(|preset| {
                    let (rows, cols) = preset.shape();
                    PresetSummary {
                        preset,
                        name: preset.default_name(),
                        rows,
                        cols,
                        max_vol: preset.max_vol(),
                        dead_vol: preset.dead_vol(),
                        working_vol: preset.max_vol() - preset.dead_vol(),
                    }
                })
                .collect::<Vec<_>>();
            print_json(&presets)
        }
        "set-param" => {
            require_args(&args, cmd_idx, 2, "NAME VALUE_JSON")?;
            let name = &args[cmd_idx + 1];
            let raw = &args[cmd_idx + 2];
            // Bare words such as `uL` are accepted as strings.
            let value = serde_json::from_str(raw)
                .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
            let mut params = params;
            let message = params.set_parameter(name, &value)?;
            params
                .save_to_path(&params_path)
                .with_context(|| format!("Could not write parameters to '{params_path}'"))?;
            println!("{message}");
            Ok(())
        }
        "plan" => {
            require_args(
                &args,
                cmd_idx,
                4,
                "EXPERIMENT.json SRC_MAP.csv DEST_MAP.csv OUTPUT.csv",
            )?;
            let spec = load_spec(&args[cmd_idx + 1])?;
            let source_map = load_map(&args[cmd_idx + 2])?;
            let destination_map = load_map(&args[cmd_idx + 3])?;
            let output = &args[cmd_idx + 4];

            let exp = EchoExperiment::from_plate_maps(
                &spec,
                &source_map,
                &destination_map,
                &mut registry,
                &params,
            )?;
            exp.protocol
                .write_csv_path(output)
                .with_context(|| format!("Could not write protocol to '{output}'"))?;
            print_json(&PlanSummary {
                output: output.to_string(),
                unit: exp.protocol.unit().symbol().to_string(),
                transfers: exp.protocol.len(),
                total_volume: exp.protocol.total_volume(),
                source_wells: source_wells(&exp),
            })
        }
        "size" => {
            require_args(&args, cmd_idx, 2, "EXPERIMENT.json DEST_MAP.csv")?;
            let spec = load_spec(&args[cmd_idx + 1])?;
            let destination_map = load_map(&args[cmd_idx + 2])?;
            let exp = EchoExperiment::from_destination_map(
                &spec,
                &destination_map,
                &mut registry,
                &params,
            )?;
            print_json(&source_wells(&exp))
        }
        "overhangs" => {
            require_args(&args, cmd_idx, 3, "L MIN_SOLUTIONS SEQ[,SEQ...]")?;
            let len = args[cmd_idx + 1]
                .parse::<usize>()
                .with_context(|| format!("Invalid overhang length '{}'", args[cmd_idx + 1]))?;
            let min_solutions = args[cmd_idx + 2]
                .parse::<usize>()
                .with_context(|| format!("Invalid solution count '{}'", args[cmd_idx + 2]))?;
            let seqs = args[cmd_idx + 3]
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>();
            let solutions = find_overhangs(&seqs, len, min_solutions)?;
            print_json(&solutions)
        }
        "plate" => {
            require_args(&args, cmd_idx, 1, "PRESET")?;
            let preset = PlatePreset::parse(&args[cmd_idx + 1])
                .ok_or_else(|| anyhow!("Unknown plate preset '{}'", args[cmd_idx + 1]))?;
            println!("{}", Plate::from_preset(preset, None));
            Ok(())
        }
        _ => {
            usage();
            Err(anyhow!("Unknown command '{command}'"))
        }
    }
}
