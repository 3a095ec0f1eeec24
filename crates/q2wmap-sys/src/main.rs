// main.rs — q2wmap: inspect and convert BSP files

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use q2wmap_common::bspfile::BspFile;
use q2wmap_common::entities::{parse_entities, worldspawn_subdivide};
use q2wmap_common::qfiles::BspVersion;
use q2wmap_qbsp::{Winding, WindingStats};

#[derive(Parser)]
#[command(name = "q2wmap", version, about = "Inspect and convert Quake2World BSP files")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print lump sizes, entity and cluster counts
    Info {
        file: PathBuf,
    },
    /// Rewrite a BSP file, optionally in the legacy format
    Convert {
        input: PathBuf,
        output: PathBuf,
        /// Write version 38 without vertex normals
        #[arg(long)]
        legacy: bool,
    },
    /// Dump entity key/value pairs
    Entities {
        file: PathBuf,
    },
    /// Print the decompressed PVS and PHS rows of one cluster
    Pvs {
        file: PathBuf,
        cluster: usize,
    },
}

fn load(path: &Path) -> anyhow::Result<BspFile> {
    BspFile::load(path).with_context(|| format!("loading {}", path.display()))
}

fn info(path: &Path) -> anyhow::Result<()> {
    let bsp = load(path)?;
    bsp.print_file_sizes();

    let entities = parse_entities(&bsp.entity_string)?;
    let vis = bsp.vis_header()?;

    let stats = Arc::new(WindingStats::new());
    let mut area = 0.0f64;
    for face in &bsp.faces {
        let w = Winding::for_face(&bsp, face)?.tracked(stats.clone());
        area += w.area() as f64;
    }
    stats.report();

    println!("{}: version {}", path.display(), bsp.version.as_i32());
    println!("entities: {}", entities.len());
    println!("clusters: {}", vis.num_clusters);
    println!("faces: {} (area {:.1})", bsp.faces.len(), area);
    if let Some(subdivide) = worldspawn_subdivide(&entities) {
        println!("subdivide: {subdivide}");
    }
    Ok(())
}

fn convert(input: &Path, output: &Path, legacy: bool) -> anyhow::Result<()> {
    let mut bsp = load(input)?;
    let version = if legacy {
        BspVersion::Legacy
    } else {
        BspVersion::Extended
    };

    if version.has_normals() && bsp.normals.is_empty() && !bsp.vertexes.is_empty() {
        tracing::warn!("{} has no vertex normals", input.display());
    }
    bsp.version = version;
    if !version.has_normals() {
        bsp.normals.clear();
    }

    bsp.write(output)
        .with_context(|| format!("writing {}", output.display()))?;
    println!(
        "{} -> {} (version {})",
        input.display(),
        output.display(),
        version.as_i32()
    );
    Ok(())
}

fn entities(path: &Path) -> anyhow::Result<()> {
    let bsp = load(path)?;
    for (i, ent) in parse_entities(&bsp.entity_string)?.iter().enumerate() {
        println!("// entity {i}");
        println!("{{");
        for ep in &ent.epairs {
            println!("\"{}\" \"{}\"", ep.key, ep.value);
        }
        println!("}}");
    }
    Ok(())
}

fn format_row(row: &[u8], num_clusters: usize) -> String {
    (0..num_clusters)
        .filter(|&c| row.get(c >> 3).is_some_and(|b| b & (1 << (c & 7)) != 0))
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn pvs(path: &Path, cluster: usize) -> anyhow::Result<()> {
    let bsp = load(path)?;
    let vis = bsp.vis_header()?;
    if vis.num_clusters == 0 {
        anyhow::bail!("{} has no visibility data", path.display());
    }

    let pvs = vis.pvs(&bsp.vis_data, cluster)?;
    let phs = vis.phs(&bsp.vis_data, cluster)?;
    println!("cluster {cluster} of {}", vis.num_clusters);
    println!("pvs: {}", format_row(&pvs, vis.num_clusters));
    println!("phs: {}", format_row(&phs, vis.num_clusters));
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Info { file } => info(&file),
        Commands::Convert {
            input,
            output,
            legacy,
        } => convert(&input, &output, legacy),
        Commands::Entities { file } => entities(&file),
        Commands::Pvs { file, cluster } => pvs(&file, cluster),
    }
}
