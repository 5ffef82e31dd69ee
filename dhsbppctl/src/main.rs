use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use directories::BaseDirs;
use dhsbpp_packing::{BinReport, PackingPolicy, SeparationPolicy};
use dhsbpp_rebalance::{Migration, RetieMode};
use tracing::Level;

mod config;
mod loader;
mod pipeline;

use crate::config::EngineConfig;
use crate::pipeline::{PackOutput, RebalanceOutput};

/// Hierarchical bin packing and rebalancing of tenant workloads.
#[derive(Parser)]
#[command(name = "dhsbppctl", author, version, about = "DHSBPP CLI Tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    opts: Options,
}

#[derive(Args)]
struct Options {
    /// Path to configuration file (default: $HOME/.dhsbpprc).
    #[arg(long = "config", global = true)]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is unset.
    #[arg(long, global = true, default_value_t = Level::INFO)]
    log_level: Level,

    /// Also write JSON logs to this directory.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Print reports as JSON.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a hierarchy file.
    Validate {
        /// CSV of `child,parent` rows.
        hierarchy: PathBuf,
    },

    /// Pack the initial window into bins.
    Pack(RunArgs),

    /// Pack, then replay the rest of the workload and repack violating bins.
    Rebalance(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// CSV of `child,parent` rows.
    hierarchy: PathBuf,
    /// CSV of `entity,epoch,delta` rows.
    workload: PathBuf,

    #[arg(long)]
    max_capacity: Option<f64>,
    #[arg(long)]
    allocation_factor: Option<f64>,
    #[arg(long)]
    reallocation_delta: Option<f64>,
    #[arg(long)]
    window: Option<usize>,
    #[arg(long, value_enum)]
    separation: Option<Separation>,
    #[arg(long, value_enum)]
    packing: Option<Packing>,
    #[arg(long, value_enum)]
    retie: Option<Retie>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Separation {
    Root,
    MaxChild,
}

#[derive(Clone, Copy, ValueEnum)]
enum Packing {
    Ffd,
    Greedy,
}

#[derive(Clone, Copy, ValueEnum)]
enum Retie {
    Exact,
    Recompute,
}

impl RunArgs {
    fn apply(&self, config: &mut EngineConfig) {
        if let Some(v) = self.max_capacity {
            config.max_capacity = v;
        }
        if let Some(v) = self.allocation_factor {
            config.allocation_factor = v;
        }
        if let Some(v) = self.reallocation_delta {
            config.reallocation_delta = v;
        }
        if let Some(v) = self.window {
            config.initial_window = v;
        }
        if let Some(v) = self.separation {
            config.separation_policy = match v {
                Separation::Root => SeparationPolicy::Root,
                Separation::MaxChild => SeparationPolicy::MaxChild,
            };
        }
        if let Some(v) = self.packing {
            config.packing_policy = match v {
                Packing::Ffd => PackingPolicy::FirstFitDecreasing,
                Packing::Greedy => PackingPolicy::GreedyDecreasing,
            };
        }
        if let Some(v) = self.retie {
            config.retie_mode = match v {
                Retie::Exact => RetieMode::Exact,
                Retie::Recompute => RetieMode::Recompute,
            };
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log = dhsbpp_log::init(cli.opts.log_dir.as_deref(), cli.opts.log_level)?;

    let config_path = cli
        .opts
        .config
        .clone()
        .or_else(|| BaseDirs::new().map(|b| b.home_dir().join(".dhsbpprc")));
    let mut config = load_config(config_path.as_deref(), cli.opts.config.is_some())?;

    match cli.command {
        Commands::Validate { hierarchy } => {
            let pairs = loader::read_hierarchy(&hierarchy)?;
            let tree = pipeline::build_tree(&pairs)?;
            println!("hierarchy ok: {} nodes, root {}", tree.len(), tree.node(tree.root()).name());
        }

        Commands::Pack(args) => {
            args.apply(&mut config);
            config.validate()?;
            let pairs = loader::read_hierarchy(&args.hierarchy)?;
            let series = loader::read_workload(&args.workload)?;
            let packed = pipeline::pack(&config, &pairs, &series)?;
            if cli.opts.json {
                let out = PackOutput { report: packed.report(), forest: packed.forest() };
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                print_report(&packed.report());
            }
        }

        Commands::Rebalance(args) => {
            args.apply(&mut config);
            config.validate()?;
            let pairs = loader::read_hierarchy(&args.hierarchy)?;
            let series = loader::read_workload(&args.workload)?;
            let mut packed = pipeline::pack(&config, &pairs, &series)?;
            let initial = packed.report();
            let migrations = pipeline::rebalance(&config, &mut packed, &series)?;
            if cli.opts.json {
                let out = RebalanceOutput { initial, migrations, final_report: packed.report() };
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                print_migrations(&migrations);
                print_report(&packed.report());
            }
        }
    }
    Ok(())
}

/// An explicit `--config` must exist; the default location is optional.
fn load_config(path: Option<&Path>, explicit: bool) -> Result<EngineConfig> {
    match path {
        Some(path) if explicit || path.exists() => {
            let config = EngineConfig::load(path)?;
            tracing::info!(path = %path.display(), "config loaded");
            Ok(config)
        }
        _ => Ok(EngineConfig::default()),
    }
}

fn print_report(report: &BinReport) {
    for bin in &report.bins {
        let names: Vec<&str> = bin.members.iter().map(|m| m.name.as_str()).collect();
        println!("bin {:>3}  size={:<10} volume={:<10} [{}]", bin.index, bin.size, bin.volume, names.join(", "));
    }
    println!("{} bins, total size {}", report.bins.len(), report.total_size());
}

fn print_migrations(migrations: &[Migration]) {
    for m in migrations {
        println!(
            "epoch {:>4}  bin {:>3}  {:?}  {} -> {}  moved={}  opened={:?}",
            m.epoch, m.bin, m.kind, m.old_size, m.new_size, m.migration_size, m.opened
        );
    }
    let moved: f64 = migrations.iter().map(|m| m.migration_size).sum();
    println!("{} migrations, total moved {}", migrations.len(), moved);
}
