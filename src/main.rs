use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use iiif_scene_bridge::asset_pipeline::GltfAssetLoader;
use iiif_scene_bridge::manifest::{parse_manifest, ParsedManifest};
use iiif_scene_bridge::scene_graph::Scene;
use iiif_scene_bridge::{Diagnostic, SceneHost, TranscodeConfig, TranscodeError, TranscodeSession};

#[derive(Parser)]
#[command(name = "iiif-scene")]
#[command(about = "Transcode IIIF 3D manifests to and from a scene graph", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a manifest and report what a transcode would do with it
    Check {
        /// Manifest JSON file
        manifest: PathBuf,
    },
    /// Import a manifest into a scene and print the resulting nodes
    Import {
        /// Manifest JSON file
        manifest: PathBuf,

        /// Directory relative model URIs are resolved against (defaults to
        /// the manifest's directory)
        #[arg(long)]
        assets: Option<PathBuf>,
    },
    /// Import a manifest and write the manifest exported back from the scene
    Export {
        /// Manifest JSON file
        manifest: PathBuf,

        /// Output JSON file
        #[arg(short, long)]
        output: PathBuf,

        /// Also export scene nodes that did not come from the manifest
        #[arg(long)]
        include_untracked: bool,

        /// Write compact JSON
        #[arg(long)]
        compact: bool,

        #[arg(long)]
        assets: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    pretty_env_logger::init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Check { manifest } => {
            let parsed = read_manifest(&manifest)?;
            let manifest = &parsed.manifest;
            println!(
                "{}: {} nodes, {} unsupported items",
                manifest.id,
                manifest.nodes.len(),
                manifest.unsupported_items().count()
            );
            for node in &manifest.nodes {
                println!("  {} ({})", node.id, node.kind());
            }
            print_diagnostics(&parsed.diagnostics);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Import { manifest, assets } => {
            let parsed = read_manifest(&manifest)?;
            let mut scene = Scene::new();
            let mut session = TranscodeSession::new(TranscodeConfig::default());

            preload(&manifest, assets, &mut scene, &parsed);
            let mut diagnostics = parsed.diagnostics;
            let report = session.import(&mut scene, parsed.manifest)?;
            diagnostics.extend(report.diagnostics.iter().cloned());

            for id in report.created.iter().chain(&report.updated) {
                let Some(node) = scene.node(*id) else {
                    continue;
                };
                let position = scene.world_position(*id).unwrap_or_default();
                println!(
                    "{} -> {} ({}) at [{:.6}, {:.6}, {:.6}]",
                    session.lookup(*id).unwrap_or("?"),
                    node.name,
                    node.content.describe(),
                    position.x,
                    position.y,
                    position.z
                );
            }
            print_diagnostics(&diagnostics);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Export {
            manifest,
            output,
            include_untracked,
            compact,
            assets,
        } => {
            let parsed = read_manifest(&manifest)?;
            let config = TranscodeConfig {
                include_untracked,
                pretty: !compact,
                ..TranscodeConfig::default()
            };
            let mut scene = Scene::new();
            let mut session = TranscodeSession::new(config);

            preload(&manifest, assets, &mut scene, &parsed);
            let mut diagnostics = parsed.diagnostics;
            let import = session.import(&mut scene, parsed.manifest)?;
            diagnostics.extend(import.diagnostics);

            let (json, report) = session.export_json(&mut scene)?;
            std::fs::write(&output, json).with_context(|| format!("failed to write {}", output.display()))?;
            diagnostics.extend(report.diagnostics.iter().cloned());

            println!(
                "wrote {} nodes to {} ({} excluded)",
                report.manifest.nodes.len(),
                output.display(),
                report.excluded.len()
            );
            print_diagnostics(&diagnostics);

            if report.has_errors() {
                let code = report
                    .diagnostics
                    .iter()
                    .filter(|diagnostic| diagnostic.is_error())
                    .find_map(|diagnostic| diagnostic.clone().into_error())
                    .map(|err| err.exit_code())
                    .unwrap_or(1);
                return Ok(ExitCode::from(code));
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn read_manifest(path: &Path) -> Result<ParsedManifest> {
    let json = std::fs::read_to_string(path)
        .map_err(TranscodeError::Io)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let parsed = parse_manifest(&json).with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(parsed)
}

fn preload(manifest_path: &Path, assets: Option<PathBuf>, scene: &mut Scene, parsed: &ParsedManifest) {
    let base_dir = match assets {
        Some(dir) => dir,
        None => manifest_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
    };
    let report = GltfAssetLoader::new(base_dir).preload(scene, &parsed.manifest);
    log::info!(
        "{} assets loaded, {} unavailable",
        report.loaded.len(),
        report.failed.len()
    );
}

fn print_diagnostics(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        let level = if diagnostic.is_error() { "error" } else { "warning" };
        eprintln!("{level}: {diagnostic}");
    }
}

fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<TranscodeError>() {
        Some(err) => err.exit_code(),
        None if err.downcast_ref::<std::io::Error>().is_some() => 5,
        None => 1,
    }
}
