//! CSV readers for the hierarchy and the workload series.
//!
//! Hierarchy rows are `child,parent` (the root lists itself as parent).
//! Workload rows are `entity,epoch,delta`; consecutive rows sharing an epoch
//! label are merged into one epoch. Both files carry a header row.

use std::io::Read;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use dhsbpp_tree::{Epoch, WorkloadSeries};

pub fn read_hierarchy(path: &Path) -> Result<Vec<(String, String)>> {
    let reader = csv::Reader::from_path(path).with_context(|| format!("opening {}", path.display()))?;
    hierarchy_from_csv(reader).with_context(|| format!("reading hierarchy {}", path.display()))
}

pub fn read_workload(path: &Path) -> Result<WorkloadSeries> {
    let reader = csv::Reader::from_path(path).with_context(|| format!("opening {}", path.display()))?;
    workload_from_csv(reader).with_context(|| format!("reading workload {}", path.display()))
}

fn hierarchy_from_csv<R: Read>(mut reader: csv::Reader<R>) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let child = field(&record, 0, line)?;
        let parent = field(&record, 1, line)?;
        pairs.push((child.to_string(), parent.to_string()));
    }
    Ok(pairs)
}

fn workload_from_csv<R: Read>(mut reader: csv::Reader<R>) -> Result<WorkloadSeries> {
    let mut series = WorkloadSeries::new();
    let mut last_label: Option<String> = None;
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let entity = field(&record, 0, line)?;
        let label = field(&record, 1, line)?;
        let delta: f64 = field(&record, 2, line)?
            .trim()
            .parse()
            .with_context(|| format!("row {}: bad delta", line + 1))?;
        if !delta.is_finite() {
            bail!("row {}: delta must be finite, got {delta}", line + 1);
        }

        if last_label.as_deref() != Some(label) {
            series.push(Epoch::new());
            last_label = Some(label.to_string());
        }
        series.record(entity, delta);
    }
    Ok(series)
}

fn field<'r>(record: &'r csv::StringRecord, idx: usize, line: usize) -> Result<&'r str> {
    record.get(idx).ok_or_else(|| anyhow!("row {}: missing column {}", line + 1, idx + 1))
}
