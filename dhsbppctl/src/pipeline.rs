//! Glue between the loaders, the packing engine and the rebalancer.

use anyhow::{Context, Result};
use dhsbpp_packing::{BinForest, BinReport, Bins};
use dhsbpp_rebalance::{Migration, Rebalancer};
use dhsbpp_tree::{Hierarchy, PartitionTree, WorkloadSeries};
use serde::Serialize;
use tracing::{info, instrument};

use crate::config::EngineConfig;

/// Tree and bins after the initial packing.
#[derive(Debug)]
pub struct Packed {
    pub tree: PartitionTree,
    pub bins: Bins,
}

impl Packed {
    pub fn report(&self) -> BinReport {
        BinReport::capture(&self.tree, &self.bins)
    }

    pub fn forest(&self) -> BinForest {
        BinForest::build(&self.tree, &self.bins)
    }
}

#[derive(Debug, Serialize)]
pub struct PackOutput {
    pub report: BinReport,
    pub forest: BinForest,
}

#[derive(Debug, Serialize)]
pub struct RebalanceOutput {
    pub initial: BinReport,
    pub migrations: Vec<Migration>,
    #[serde(rename = "final")]
    pub final_report: BinReport,
}

pub fn build_tree(pairs: &[(String, String)]) -> Result<PartitionTree> {
    let hierarchy = Hierarchy::from_pairs(pairs.iter().map(|(c, p)| (c.as_str(), p.as_str())))
        .context("invalid hierarchy")?;
    info!(nodes = hierarchy.len(), root = hierarchy.root_name(), "hierarchy validated");
    Ok(PartitionTree::from_hierarchy(&hierarchy))
}

/// Seed the tree with the initial window and pack it into fresh bins.
#[instrument(skip_all, fields(window = config.initial_window))]
pub fn pack(config: &EngineConfig, pairs: &[(String, String)], series: &WorkloadSeries) -> Result<Packed> {
    let mut tree = build_tree(pairs)?;
    tree.set_initial_size(series, config.initial_window).context("initial sizing")?;
    let mut bins = Bins::new(config.bin_params()?);
    config.packer().pack_tree(&mut tree, &mut bins).context("initial packing")?;
    info!(bins = bins.len(), total = tree.node(tree.root()).subtree_size(), "tree packed");
    Ok(Packed { tree, bins })
}

/// Replay the epochs after the initial window, repacking on every violation.
#[instrument(skip_all)]
pub fn rebalance(config: &EngineConfig, packed: &mut Packed, series: &WorkloadSeries) -> Result<Vec<Migration>> {
    let mut rebalancer =
        Rebalancer::new(&packed.bins, series, config.initial_window, config.packer(), config.retie_mode)?;
    let migrations = rebalancer.run(&mut packed.tree, &mut packed.bins, series).context("rebalancing")?;
    let moved: f64 = migrations.iter().map(|m| m.migration_size).sum();
    info!(migrations = migrations.len(), moved, bins = packed.bins.len(), "rebalancing finished");
    Ok(migrations)
}
