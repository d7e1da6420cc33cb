// SPDX-License-Identifier: MIT OR Apache-2.0
//! Readers/writers for the pipeline's CSV artifacts.
//!
//! Column layouts follow the external interface contract exactly: callers
//! that reload these files (the Planner's missing-file check, `from_step`
//! resumption) must see byte-for-byte the same shape a fresh run would
//! produce.
use crate::model::{Argument, Cluster};
use bl_error::{PipelineError, Result};
use std::collections::BTreeMap;
use std::path::Path;

fn wrap(err: csv::Error) -> PipelineError {
    PipelineError::internal(format!("csv error: {err}")).with_source(err)
}

#[derive(serde::Serialize, serde::Deserialize)]
struct ArgRow {
    #[serde(rename = "arg-id")]
    arg_id: String,
    argument: String,
}

/// Write `args.csv`: columns `arg-id,argument`.
pub fn write_args_csv(path: impl AsRef<Path>, arguments: &[Argument]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path.as_ref()).map_err(wrap)?;
    for arg in arguments {
        wtr.serialize(ArgRow {
            arg_id: arg.arg_id.clone(),
            argument: arg.argument.clone(),
        })
        .map_err(wrap)?;
    }
    wtr.flush()
        .map_err(|e| PipelineError::internal(e.to_string()).with_source(e))
}

/// Read `args.csv` back into `(arg_id, argument)` pairs, in file order.
pub fn read_args_csv(path: impl AsRef<Path>) -> Result<Vec<(String, String)>> {
    let mut rdr = csv::Reader::from_path(path.as_ref()).map_err(wrap)?;
    let mut out = Vec::new();
    for row in rdr.deserialize::<ArgRow>() {
        let row = row.map_err(wrap)?;
        out.push((row.arg_id, row.argument));
    }
    Ok(out)
}

#[derive(serde::Serialize, serde::Deserialize)]
struct RelationRow {
    #[serde(rename = "arg-id")]
    arg_id: String,
    #[serde(rename = "comment-id")]
    comment_id: String,
}

/// Write `relations.csv`: columns `arg-id,comment-id`.
pub fn write_relations_csv(path: impl AsRef<Path>, arguments: &[Argument]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path.as_ref()).map_err(wrap)?;
    for arg in arguments {
        wtr.serialize(RelationRow {
            arg_id: arg.arg_id.clone(),
            comment_id: arg.comment_id.clone(),
        })
        .map_err(wrap)?;
    }
    wtr.flush()
        .map_err(|e| PipelineError::internal(e.to_string()).with_source(e))
}

/// Read `relations.csv` back into `(arg_id, comment_id)` pairs.
pub fn read_relations_csv(path: impl AsRef<Path>) -> Result<Vec<(String, String)>> {
    let mut rdr = csv::Reader::from_path(path.as_ref()).map_err(wrap)?;
    let mut out = Vec::new();
    for row in rdr.deserialize::<RelationRow>() {
        let row = row.map_err(wrap)?;
        out.push((row.arg_id, row.comment_id));
    }
    Ok(out)
}

fn level_id_header(level: usize) -> String {
    format!("cluster-level-{level}-id")
}

/// Write `clustering.csv`: columns `arg-id,argument,x,y,cluster-level-1-id,...`.
///
/// `num_levels` is the number of non-root levels present in
/// `arg.cluster_ids` (i.e. `cluster_ids.len() - 1` for a fully assigned
/// argument).
pub fn write_clustering_csv(
    path: impl AsRef<Path>,
    arguments: &[Argument],
    num_levels: usize,
) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path.as_ref()).map_err(wrap)?;
    let mut header = vec![
        "arg-id".to_string(),
        "argument".to_string(),
        "x".to_string(),
        "y".to_string(),
    ];
    for level in 1..=num_levels {
        header.push(level_id_header(level));
    }
    wtr.write_record(&header).map_err(wrap)?;

    for arg in arguments {
        let mut row = vec![
            arg.arg_id.clone(),
            arg.argument.clone(),
            arg.x.unwrap_or_default().to_string(),
            arg.y.unwrap_or_default().to_string(),
        ];
        for level in 1..=num_levels {
            row.push(arg.cluster_ids.get(level).cloned().unwrap_or_default());
        }
        wtr.write_record(&row).map_err(wrap)?;
    }
    wtr.flush()
        .map_err(|e| PipelineError::internal(e.to_string()).with_source(e))
}

/// One row decoded from `clustering.csv`.
pub struct ClusteringRow {
    /// The argument's id.
    pub arg_id: String,
    /// Extracted opinion text.
    pub argument: String,
    /// 2D projection x-coordinate.
    pub x: f64,
    /// 2D projection y-coordinate.
    pub y: f64,
    /// Root-to-leaf cluster path, including the synthetic root `"0"`.
    pub cluster_ids: Vec<String>,
}

/// Read `clustering.csv` back into [`ClusteringRow`]s.
pub fn read_clustering_csv(path: impl AsRef<Path>) -> Result<Vec<ClusteringRow>> {
    let mut rdr = csv::Reader::from_path(path.as_ref()).map_err(wrap)?;
    let headers = rdr.headers().map_err(wrap)?.clone();
    let num_levels = headers
        .iter()
        .filter(|h| h.starts_with("cluster-level-") && h.ends_with("-id"))
        .count();

    let mut out = Vec::new();
    for record in rdr.records() {
        let record = record.map_err(wrap)?;
        let arg_id = record.get(0).unwrap_or_default().to_string();
        let argument = record.get(1).unwrap_or_default().to_string();
        let x: f64 = record.get(2).unwrap_or_default().parse().unwrap_or(0.0);
        let y: f64 = record.get(3).unwrap_or_default().parse().unwrap_or(0.0);
        let mut cluster_ids = vec!["0".to_string()];
        for level in 0..num_levels {
            cluster_ids.push(record.get(4 + level).unwrap_or_default().to_string());
        }
        out.push(ClusteringRow {
            arg_id,
            argument,
            x,
            y,
            cluster_ids,
        });
    }
    Ok(out)
}

/// Write `initial_labels.csv`: the clustering columns plus, per level, a
/// `...-label` and `...-description` pair. Levels with no entry in `labels`
/// yet (all but the deepest, at this stage of the pipeline) are left blank.
pub fn write_initial_labels_csv(
    path: impl AsRef<Path>,
    arguments: &[Argument],
    num_levels: usize,
    labels: &BTreeMap<String, (String, String)>,
) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path.as_ref()).map_err(wrap)?;
    let mut header = vec![
        "arg-id".to_string(),
        "argument".to_string(),
        "x".to_string(),
        "y".to_string(),
    ];
    for level in 1..=num_levels {
        header.push(level_id_header(level));
        header.push(format!("cluster-level-{level}-label"));
        header.push(format!("cluster-level-{level}-description"));
    }
    wtr.write_record(&header).map_err(wrap)?;

    for arg in arguments {
        let mut row = vec![
            arg.arg_id.clone(),
            arg.argument.clone(),
            arg.x.unwrap_or_default().to_string(),
            arg.y.unwrap_or_default().to_string(),
        ];
        for level in 1..=num_levels {
            let id = arg.cluster_ids.get(level).cloned().unwrap_or_default();
            let (label, description) = labels
                .get(&id)
                .cloned()
                .unwrap_or_else(|| (String::new(), String::new()));
            row.push(id);
            row.push(label);
            row.push(description);
        }
        wtr.write_record(&row).map_err(wrap)?;
    }
    wtr.flush()
        .map_err(|e| PipelineError::internal(e.to_string()).with_source(e))
}

/// Read `initial_labels.csv` back into a `cluster_id -> (label, description)`
/// map, covering every level column present in the file (only the deepest
/// level carries non-blank entries at this stage of the pipeline, but
/// blanks round-trip harmlessly since ids are unique across levels).
pub fn read_initial_labels_csv(
    path: impl AsRef<Path>,
) -> Result<BTreeMap<String, (String, String)>> {
    let mut rdr = csv::Reader::from_path(path.as_ref()).map_err(wrap)?;
    let headers = rdr.headers().map_err(wrap)?.clone();
    let id_columns: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| h.starts_with("cluster-level-") && h.ends_with("-id"))
        .map(|(i, _)| i)
        .collect();

    let mut out = BTreeMap::new();
    for record in rdr.records() {
        let record = record.map_err(wrap)?;
        for &col in &id_columns {
            let id = record.get(col).unwrap_or_default().to_string();
            if id.is_empty() {
                continue;
            }
            let label = record.get(col + 1).unwrap_or_default().to_string();
            let description = record.get(col + 2).unwrap_or_default().to_string();
            out.insert(id, (label, description));
        }
    }
    Ok(out)
}

#[derive(serde::Serialize, serde::Deserialize)]
struct MergeLabelRow {
    level: usize,
    id: String,
    label: String,
    description: String,
    value: usize,
    parent: String,
    density: f64,
    density_rank: usize,
    density_rank_percentile: Option<f64>,
}

/// Write `merge_labels.csv`: columns
/// `level,id,label,description,value,parent,density,density_rank,density_rank_percentile`.
pub fn write_merge_labels_csv(path: impl AsRef<Path>, clusters: &[Cluster]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path.as_ref()).map_err(wrap)?;
    for cluster in clusters {
        wtr.serialize(MergeLabelRow {
            level: cluster.level,
            id: cluster.id.clone(),
            label: cluster.label.clone(),
            description: cluster.takeaway.clone(),
            value: cluster.value,
            parent: cluster.parent.clone(),
            density: cluster.density,
            density_rank: cluster.density_rank,
            density_rank_percentile: cluster.density_rank_percentile,
        })
        .map_err(wrap)?;
    }
    wtr.flush()
        .map_err(|e| PipelineError::internal(e.to_string()).with_source(e))
}

/// Read `merge_labels.csv` back into [`Cluster`] rows.
pub fn read_merge_labels_csv(path: impl AsRef<Path>) -> Result<Vec<Cluster>> {
    let mut rdr = csv::Reader::from_path(path.as_ref()).map_err(wrap)?;
    let mut out = Vec::new();
    for row in rdr.deserialize::<MergeLabelRow>() {
        let row = row.map_err(wrap)?;
        out.push(Cluster {
            level: row.level,
            id: row.id,
            label: row.label,
            takeaway: row.description,
            value: row.value,
            parent: row.parent,
            density: row.density,
            density_rank: row.density_rank,
            density_rank_percentile: row.density_rank_percentile,
        });
    }
    Ok(out)
}

/// Write `overview.txt`.
pub fn write_overview_txt(path: impl AsRef<Path>, overview: &str) -> Result<()> {
    std::fs::write(path, overview).map_err(|e| PipelineError::internal(e.to_string()).with_source(e))
}

/// Read `overview.txt`, ignoring trailing whitespace.
pub fn read_overview_txt(path: impl AsRef<Path>) -> Result<String> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| PipelineError::internal(e.to_string()).with_source(e))?;
    Ok(raw.trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Argument;

    fn sample_arguments() -> Vec<Argument> {
        let mut a0 = Argument::new("1", 0, "parks");
        a0.x = Some(0.0);
        a0.y = Some(0.0);
        a0.cluster_ids = vec!["0".into(), "1_0".into(), "2_0".into()];
        let mut a1 = Argument::new("2", 0, "buses");
        a1.x = Some(10.0);
        a1.y = Some(0.0);
        a1.cluster_ids = vec!["0".into(), "1_1".into(), "2_1".into()];
        vec![a0, a1]
    }

    #[test]
    fn args_csv_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("args.csv");
        let arguments = sample_arguments();
        write_args_csv(&path, &arguments).unwrap();
        let rows = read_args_csv(&path).unwrap();
        assert_eq!(rows, vec![
            ("A1_0".to_string(), "parks".to_string()),
            ("A2_0".to_string(), "buses".to_string()),
        ]);
    }

    #[test]
    fn relations_csv_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relations.csv");
        let arguments = sample_arguments();
        write_relations_csv(&path, &arguments).unwrap();
        let rows = read_relations_csv(&path).unwrap();
        assert_eq!(rows, vec![
            ("A1_0".to_string(), "1".to_string()),
            ("A2_0".to_string(), "2".to_string()),
        ]);
    }

    #[test]
    fn clustering_csv_roundtrip_preserves_cluster_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clustering.csv");
        let arguments = sample_arguments();
        write_clustering_csv(&path, &arguments, 2).unwrap();
        let rows = read_clustering_csv(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].cluster_ids, vec!["0", "1_0", "2_0"]);
        assert_eq!(rows[1].cluster_ids, vec!["0", "1_1", "2_1"]);
        assert_eq!(rows[1].x, 10.0);
    }

    #[test]
    fn initial_labels_csv_roundtrip_keeps_only_non_blank_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("initial_labels.csv");
        let arguments = sample_arguments();
        let mut labels = BTreeMap::new();
        labels.insert("2_0".to_string(), ("parks".to_string(), "people like parks".to_string()));
        labels.insert("2_1".to_string(), ("buses".to_string(), "buses are slow".to_string()));
        write_initial_labels_csv(&path, &arguments, 2, &labels).unwrap();

        let back = read_initial_labels_csv(&path).unwrap();
        assert_eq!(back.get("2_0").unwrap(), &("parks".to_string(), "people like parks".to_string()));
        assert_eq!(back.get("2_1").unwrap(), &("buses".to_string(), "buses are slow".to_string()));
        // Level-1 ids had no entry in `labels`, so they round-trip as blank
        // and are not mistaken for a real (label, description) pair.
        assert_eq!(back.get("1_0").unwrap(), &(String::new(), String::new()));
    }

    #[test]
    fn overview_txt_trims_trailing_whitespace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overview.txt");
        write_overview_txt(&path, "a summary\n\n").unwrap();
        assert_eq!(read_overview_txt(&path).unwrap(), "a summary");
    }

    #[test]
    fn merge_labels_csv_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("merge_labels.csv");
        let clusters = vec![Cluster {
            level: 1,
            id: "1_0".into(),
            label: "parks".into(),
            takeaway: "people like parks".into(),
            value: 2,
            parent: "0".into(),
            density: 1e10,
            density_rank: 1,
            density_rank_percentile: Some(0.0),
        }];
        write_merge_labels_csv(&path, &clusters).unwrap();
        let back = read_merge_labels_csv(&path).unwrap();
        assert_eq!(back, clusters);
    }
}
