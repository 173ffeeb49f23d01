use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dae_scene::scene::ObjectData;
use dae_scene::{export_scene_to_dae, import_dae_file, ExportConfig, ExportMode, ImportConfig, Scene};

/// Environment variable holding the log filter, for example `warn` or `dae_scene=debug`.
const LOG_ENV: &str = "DAE_SCENE_LOG";

const HELP: &str = "\
dae_scene

USAGE:
  dae_scene import <file.dae> [--config cfg.json] [--transparent-shadows]
                   [--raytrace-transparency] [--json out.json]
  dae_scene convert <in.dae> <out.dae> [--export-as dae_only|bundle]

FLAGS:
  -h, --help       Print this help
  -v, --verbose    Log debug messages
  -q, --quiet      Only log errors

The DAE_SCENE_LOG environment variable sets the log filter (for example `info` or
`dae_scene=debug`) when neither --verbose nor --quiet is given.
";

fn main() {
    if let Err(e) = run() {
        log::error!("{:?}", e);
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let mut args = pico_args::Arguments::from_env();
    if args.contains(["-h", "--help"]) {
        print!("{}", HELP);
        return Ok(());
    }

    let verbose = args.contains(["-v", "--verbose"]);
    let quiet = args.contains(["-q", "--quiet"]);
    let filter = log_filter(verbose, quiet, std::env::var(LOG_ENV).ok());
    // The library logs through `log`; the subscriber picks those records up too.
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| anyhow!("Failed to install logger: {}", e))?;

    match args.subcommand()?.as_deref() {
        Some("import") => {
            let config_path: Option<PathBuf> = args.opt_value_from_str("--config")?;
            let json_path: Option<PathBuf> = args.opt_value_from_str("--json")?;
            let transparent_shadows = args.contains("--transparent-shadows");
            let raytrace_transparency = args.contains("--raytrace-transparency");
            let input: PathBuf = args.free_from_str()?;
            reject_unused(args)?;

            let mut config = match config_path {
                Some(path) => ImportConfig::from_json_file(&path)?,
                None => ImportConfig::default(),
            };
            config.transparent_shadows |= transparent_shadows;
            config.raytrace_transparency |= raytrace_transparency;

            let scene = import(&input, &config)?;
            print_summary(&input, &scene);
            if let Some(json_path) = json_path {
                let json = serde_json::to_string_pretty(&scene)?;
                std::fs::write(&json_path, json)
                    .with_context(|| format!("Failed to write {}", json_path.display()))?;
            }
            Ok(())
        }
        Some("convert") => {
            let export_mode: ExportMode = args
                .opt_value_from_str("--export-as")?
                .unwrap_or_default();
            let input: PathBuf = args.free_from_str()?;
            let output: PathBuf = args.free_from_str()?;
            reject_unused(args)?;

            let scene = import(&input, &ImportConfig::default())?;
            let config = ExportConfig {
                export_mode,
                up_axis: scene.up_axis,
            };
            export_scene_to_dae(&scene, &output, &config)?;
            println!("Wrote {}", output.display());
            Ok(())
        }
        Some(other) => bail!("Unknown command '{}'\n\n{}", other, HELP),
        None => {
            print!("{}", HELP);
            Ok(())
        }
    }
}

/// `--verbose` and `--quiet` win over the environment, which wins over `warn`.
fn log_filter(verbose: bool, quiet: bool, env: Option<String>) -> EnvFilter {
    if verbose {
        EnvFilter::new("debug")
    } else if quiet {
        EnvFilter::new("error")
    } else {
        env.and_then(|directives| EnvFilter::try_new(directives).ok())
            .unwrap_or_else(|| EnvFilter::new("warn"))
    }
}

fn import(path: &Path, config: &ImportConfig) -> Result<Scene> {
    import_dae_file(path, config).with_context(|| format!("Failed to import {}", path.display()))
}

fn reject_unused(args: pico_args::Arguments) -> Result<()> {
    let rest = args.finish();
    if rest.is_empty() {
        Ok(())
    } else {
        bail!("Unexpected arguments: {:?}", rest)
    }
}

fn print_summary(path: &Path, scene: &Scene) {
    let cameras = scene
        .objects
        .iter()
        .filter(|o| matches!(o.data, ObjectData::Camera(_)))
        .count();
    println!("{}", path.display());
    println!("  dialect:   {}", scene.dialect.as_deref().unwrap_or("standard"));
    println!("  up axis:   {}", scene.up_axis.as_str());
    println!("  objects:   {}", scene.objects.len());
    println!(
        "  meshes:    {} ({} mesh objects)",
        scene.meshes.len(),
        scene.mesh_objects().count()
    );
    println!("  materials: {}", scene.materials.len());
    println!("  images:    {}", scene.images.len());
    println!("  cameras:   {} ({} camera objects)", scene.cameras.len(), cameras);
}
