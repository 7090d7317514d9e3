//! Writing and reading sweep artifacts
//!
//! - CSV tables: a `# `-prefixed header line followed by one row per case in
//!   `%.6e` notation.
//! - The structured artifact `<name>.json`, mirroring [`OutputSkeleton`].
//! - A text summary `<name>.txt` of the artifact.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::error::{PersistError, Result, ShapeError};
use crate::matrix::Matrix;
use crate::skeleton::{ComponentRecord, OutputSkeleton};
use crate::status::TerminationCondition;

/// Delimiter of the global results tables
pub const TABLE_DELIMITER: &str = ",";
/// Delimiter of the per-worker debug dumps
pub const DEBUG_DELIMITER: &str = ", ";

/// How much of the artifact goes into the text summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextSummary {
    /// Component names only
    #[default]
    Keys,
    /// Bounds and units, no values
    Metadata,
    Full,
}

/// Format a number like C's `%.6e`: `2.500000e+00`, `-1.000000e-07`, `nan`
pub fn format_sci(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let formatted = format!("{value:.6e}");
    let Some((mantissa, exponent)) = formatted.split_once('e') else {
        return formatted;
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let sign = if exponent < 0 { '-' } else { '+' };
    format!("{mantissa}e{sign}{:02}", exponent.abs())
}

/// Write `data` as a delimited table with a comment header
pub fn write_table(path: &Path, header: &[String], data: &Matrix, delimiter: &str) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "# {}", header.join(","))?;
    for row in data.iter_rows() {
        let line: Vec<String> = row.iter().map(|&v| format_sci(v)).collect();
        writeln!(out, "{}", line.join(delimiter))?;
    }
    out.flush()?;
    Ok(())
}

/// Read a table written by [`write_table`]. Either delimiter is accepted.
pub fn read_table(path: &Path) -> Result<(Vec<String>, Matrix)> {
    let reader = BufReader::new(File::open(path)?);
    let mut header = Vec::new();
    let mut rows: Vec<Vec<f64>> = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(names) = trimmed.strip_prefix('#') {
            if header.is_empty() {
                header = names.split(',').map(|s| s.trim().to_string()).collect();
            }
            continue;
        }
        let row = trimmed
            .split(',')
            .map(|field| {
                field.trim().parse::<f64>().map_err(|e| PersistError::Malformed {
                    line: idx + 1,
                    reason: format!("'{}': {e}", field.trim()),
                })
            })
            .collect::<std::result::Result<Vec<f64>, _>>()?;
        rows.push(row);
    }

    let cols = rows.first().map_or(header.len(), Vec::len);
    let matrix = Matrix::from_rows(&rows, cols)?;
    if !header.is_empty() && header.len() != cols {
        return Err(ShapeError::RaggedRow {
            row: 0,
            expected: header.len(),
            actual: cols,
        }
        .into());
    }
    Ok((header, matrix))
}

/// `dir/interpolated_<file name>` next to the results table
pub fn interpolated_path(csv_results_file: &Path) -> PathBuf {
    let name = csv_results_file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    csv_results_file.with_file_name(format!("interpolated_{name}"))
}

/// Debug dump file of one worker
pub fn debug_dump_path(dir: &Path, rank: usize) -> PathBuf {
    dir.join(format!("local_results_{rank:03}.csv"))
}

// ============================================================================
// Structured artifact
// ============================================================================

/// Artifact number. JSON has no non-finite literals, so NaN is written as
/// `null` and infinities as the strings `"inf"` and `"-inf"`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ArtifactFloat(f64);

impl Serialize for ArtifactFloat {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.0 {
            v if v.is_nan() => serializer.serialize_none(),
            f64::INFINITY => serializer.serialize_str("inf"),
            f64::NEG_INFINITY => serializer.serialize_str("-inf"),
            v => serializer.serialize_f64(v),
        }
    }
}

struct ArtifactFloatVisitor;

impl<'de> serde::de::Visitor<'de> for ArtifactFloatVisitor {
    type Value = ArtifactFloat;

    fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("a number, null, \"inf\" or \"-inf\"")
    }

    fn visit_f64<E: serde::de::Error>(self, v: f64) -> std::result::Result<ArtifactFloat, E> {
        Ok(ArtifactFloat(v))
    }

    fn visit_i64<E: serde::de::Error>(self, v: i64) -> std::result::Result<ArtifactFloat, E> {
        Ok(ArtifactFloat(v as f64))
    }

    fn visit_u64<E: serde::de::Error>(self, v: u64) -> std::result::Result<ArtifactFloat, E> {
        Ok(ArtifactFloat(v as f64))
    }

    fn visit_str<E: serde::de::Error>(self, v: &str) -> std::result::Result<ArtifactFloat, E> {
        match v {
            "inf" => Ok(ArtifactFloat(f64::INFINITY)),
            "-inf" => Ok(ArtifactFloat(f64::NEG_INFINITY)),
            "nan" => Ok(ArtifactFloat(f64::NAN)),
            other => Err(E::invalid_value(serde::de::Unexpected::Str(other), &self)),
        }
    }

    fn visit_none<E: serde::de::Error>(self) -> std::result::Result<ArtifactFloat, E> {
        Ok(ArtifactFloat(f64::NAN))
    }

    fn visit_unit<E: serde::de::Error>(self) -> std::result::Result<ArtifactFloat, E> {
        Ok(ArtifactFloat(f64::NAN))
    }
}

impl<'de> Deserialize<'de> for ArtifactFloat {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(ArtifactFloatVisitor)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LeafFile {
    value: Vec<ArtifactFloat>,
    #[serde(rename = "lower bound")]
    lower_bound: ArtifactFloat,
    #[serde(rename = "upper bound")]
    upper_bound: ArtifactFloat,
    units: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ArtifactFile {
    sweep_params: BTreeMap<String, LeafFile>,
    outputs: BTreeMap<String, LeafFile>,
    solve_status: Vec<String>,
}

impl From<&ComponentRecord> for LeafFile {
    fn from(record: &ComponentRecord) -> Self {
        Self {
            value: record.value.iter().copied().map(ArtifactFloat).collect(),
            lower_bound: ArtifactFloat(record.lower_bound.unwrap_or(f64::MIN)),
            upper_bound: ArtifactFloat(record.upper_bound.unwrap_or(f64::MAX)),
            units: record.units.clone(),
        }
    }
}

impl From<LeafFile> for ComponentRecord {
    fn from(leaf: LeafFile) -> Self {
        let ArtifactFloat(lower) = leaf.lower_bound;
        let ArtifactFloat(upper) = leaf.upper_bound;
        Self {
            value: leaf.value.into_iter().map(|v| v.0).collect(),
            lower_bound: (lower != f64::MIN).then_some(lower),
            upper_bound: (upper != f64::MAX).then_some(upper),
            units: leaf.units,
        }
    }
}

fn to_file(skeleton: &OutputSkeleton) -> ArtifactFile {
    let leaves = |map: &BTreeMap<String, ComponentRecord>| -> BTreeMap<String, LeafFile> {
        map.iter()
            .map(|(name, record)| (name.clone(), LeafFile::from(record)))
            .collect()
    };
    ArtifactFile {
        sweep_params: leaves(&skeleton.sweep_params),
        outputs: leaves(&skeleton.outputs),
        solve_status: skeleton
            .solve_status
            .iter()
            .map(|s| s.as_str().to_string())
            .collect(),
    }
}

/// Write `<dir>/<name>.json` and return its path
pub fn write_artifact(dir: &Path, name: &str, skeleton: &OutputSkeleton) -> Result<PathBuf> {
    let path = dir.join(format!("{name}.json"));
    let mut out = BufWriter::new(File::create(&path)?);
    serde_json::to_writer(&mut out, &to_file(skeleton)).map_err(PersistError::from)?;
    out.flush()?;
    debug!(path = %path.display(), "wrote artifact");
    Ok(path)
}

/// Read an artifact written by [`write_artifact`]
pub fn read_artifact(path: &Path) -> Result<OutputSkeleton> {
    let reader = BufReader::new(File::open(path)?);
    let file: ArtifactFile = serde_json::from_reader(reader).map_err(PersistError::from)?;
    let solve_status = file
        .solve_status
        .iter()
        .map(|s| s.parse::<TerminationCondition>())
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let leaves = |map: BTreeMap<String, LeafFile>| -> BTreeMap<String, ComponentRecord> {
        map.into_iter()
            .map(|(name, leaf)| (name, ComponentRecord::from(leaf)))
            .collect()
    };
    Ok(OutputSkeleton {
        sweep_params: leaves(file.sweep_params),
        outputs: leaves(file.outputs),
        solve_status,
    })
}

fn summary_value(skeleton: &OutputSkeleton, mode: TextSummary) -> Value {
    let group = |map: &BTreeMap<String, ComponentRecord>| -> Value {
        match mode {
            TextSummary::Keys => json!(map.keys().collect::<Vec<_>>()),
            TextSummary::Metadata | TextSummary::Full => {
                let mut entries = serde_json::Map::new();
                for (name, record) in map {
                    let leaf = LeafFile::from(record);
                    let mut entry = json!({
                        "lower bound": leaf.lower_bound,
                        "upper bound": leaf.upper_bound,
                        "units": leaf.units,
                    });
                    if mode == TextSummary::Full {
                        entry["value"] = json!(leaf.value);
                    }
                    entries.insert(name.clone(), entry);
                }
                Value::Object(entries)
            }
        }
    };
    json!({
        "sweep_params": group(&skeleton.sweep_params),
        "outputs": group(&skeleton.outputs),
    })
}

/// Write `<dir>/<name>.txt`. Statuses are not part of the summary.
pub fn write_text_summary(
    dir: &Path,
    name: &str,
    skeleton: &OutputSkeleton,
    mode: TextSummary,
) -> Result<PathBuf> {
    let path = dir.join(format!("{name}.txt"));
    let text = serde_json::to_string_pretty(&summary_value(skeleton, mode)).map_err(PersistError::from)?;
    fs::write(&path, text + "\n")?;
    Ok(path)
}

/// Create `dir` and its parents unless it is empty (the current directory)
pub fn ensure_dir(dir: &Path) -> Result<()> {
    if !dir.as_os_str().is_empty() {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

/// Everything the coordinator writes once the sweep has been aggregated
#[derive(Debug)]
pub struct GlobalArtifacts<'a> {
    pub csv_results_file: &'a Path,
    pub results_fname: &'a str,
    pub header: &'a [String],
    pub table: &'a Matrix,
    pub interpolated: Option<&'a Matrix>,
    pub skeleton: &'a OutputSkeleton,
    pub write_artifact: bool,
    pub text_summary: Option<TextSummary>,
}

/// Write the results table and its companions. Returns every path written.
pub fn write_global_artifacts(artifacts: &GlobalArtifacts<'_>) -> Result<Vec<PathBuf>> {
    let csv = artifacts.csv_results_file;
    let dir = csv.parent().unwrap_or_else(|| Path::new(""));
    let mut written = Vec::new();

    write_table(csv, artifacts.header, artifacts.table, TABLE_DELIMITER)?;
    written.push(csv.to_path_buf());

    if artifacts.write_artifact {
        written.push(write_artifact(dir, artifacts.results_fname, artifacts.skeleton)?);
    }
    if let Some(mode) = artifacts.text_summary {
        written.push(write_text_summary(
            dir,
            artifacts.results_fname,
            artifacts.skeleton,
            mode,
        )?);
    }
    if let Some(interpolated) = artifacts.interpolated {
        let path = interpolated_path(csv);
        write_table(&path, artifacts.header, interpolated, TABLE_DELIMITER)?;
        written.push(path);
    }

    info!(files = written.len(), table = %csv.display(), "saved sweep results");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_sci_matches_printf() {
        assert_eq!(format_sci(2.5), "2.500000e+00");
        assert_eq!(format_sci(0.0), "0.000000e+00");
        assert_eq!(format_sci(-1.0e-7), "-1.000000e-07");
        assert_eq!(format_sci(123456789.0), "1.234568e+08");
        assert_eq!(format_sci(1.0e300), "1.000000e+300");
        assert_eq!(format_sci(f64::NAN), "nan");
        assert_eq!(format_sci(f64::NEG_INFINITY), "-inf");
    }

    #[test]
    fn test_table_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        let header = vec!["a".to_string(), "b".to_string()];
        let data = Matrix::from_rows(&[vec![1.0, f64::NAN], vec![-2.5, 1e-3]], 2).unwrap();
        write_table(&path, &header, &data, TABLE_DELIMITER).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "# a,b\n1.000000e+00,nan\n-2.500000e+00,1.000000e-03\n"
        );

        let (read_header, read) = read_table(&path).unwrap();
        assert_eq!(read_header, header);
        assert_eq!(read.get(1, 0), Some(-2.5));
        assert!(read.get(0, 1).unwrap().is_nan());
    }

    #[test]
    fn test_debug_delimiter_readable() {
        let dir = tempfile::tempdir().unwrap();
        let path = debug_dump_path(dir.path(), 7);
        assert!(path.ends_with("local_results_007.csv"));
        let data = Matrix::from_rows(&[vec![1.0, 2.0]], 2).unwrap();
        write_table(&path, &["x".into(), "y".into()], &data, DEBUG_DELIMITER).unwrap();
        assert!(fs::read_to_string(&path).unwrap().contains("1.000000e+00, 2.000000e+00"));
        assert_eq!(read_table(&path).unwrap().1, data);
    }

    #[test]
    fn test_malformed_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        fs::write(&path, "# a\n1.0\nfoo\n").unwrap();
        assert!(matches!(
            read_table(&path),
            Err(crate::error::SweepError::Persist(PersistError::Malformed { line: 3, .. }))
        ));
    }

    #[test]
    fn test_interpolated_path() {
        assert_eq!(
            interpolated_path(Path::new("out/sweep.csv")),
            PathBuf::from("out/interpolated_sweep.csv")
        );
        assert_eq!(
            interpolated_path(Path::new("sweep.csv")),
            PathBuf::from("interpolated_sweep.csv")
        );
    }

    #[test]
    fn test_bound_sentinels() {
        let record = ComponentRecord {
            value: vec![1.0, f64::NAN],
            lower_bound: None,
            upper_bound: Some(3.0),
            units: "m".into(),
        };
        let leaf = LeafFile::from(&record);
        assert_eq!(leaf.lower_bound, ArtifactFloat(f64::MIN));
        assert_eq!(leaf.upper_bound, ArtifactFloat(3.0));
        assert_eq!(leaf.value[0], ArtifactFloat(1.0));
        assert!(leaf.value[1].0.is_nan());
        let back = ComponentRecord::from(leaf);
        assert_eq!(back.lower_bound, None);
        assert_eq!(back.upper_bound, Some(3.0));
    }

    #[test]
    fn test_non_finite_values_encoded() {
        let record = ComponentRecord {
            value: vec![f64::INFINITY, 1.0, f64::NAN, f64::NEG_INFINITY],
            lower_bound: Some(f64::NEG_INFINITY),
            upper_bound: Some(f64::INFINITY),
            units: "".into(),
        };
        let encoded = serde_json::to_value(LeafFile::from(&record)).unwrap();
        assert_eq!(encoded["value"], json!(["inf", 1.0, null, "-inf"]));
        assert_eq!(encoded["lower bound"], json!("-inf"));
        assert_eq!(encoded["upper bound"], json!("inf"));

        let back = ComponentRecord::from(serde_json::from_value::<LeafFile>(encoded).unwrap());
        assert_eq!(back.value[0], f64::INFINITY);
        assert_eq!(back.value[1], 1.0);
        assert!(back.value[2].is_nan());
        assert_eq!(back.value[3], f64::NEG_INFINITY);
        assert_eq!(back.lower_bound, Some(f64::NEG_INFINITY));
        assert_eq!(back.upper_bound, Some(f64::INFINITY));
    }

    #[test]
    fn test_artifact_file_keeps_infinite_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let mut skeleton = OutputSkeleton::default();
        skeleton.outputs.insert(
            "slack".into(),
            ComponentRecord {
                value: vec![f64::INFINITY, 1.0],
                lower_bound: Some(f64::NEG_INFINITY),
                upper_bound: Some(f64::INFINITY),
                units: "kW".into(),
            },
        );
        skeleton.solve_status = vec![TerminationCondition::Unbounded, TerminationCondition::Optimal];

        let path = write_artifact(dir.path(), "artifact", &skeleton).unwrap();
        let restored = read_artifact(&path).unwrap();
        assert_eq!(restored, skeleton);
    }

    #[test]
    fn test_unknown_number_tag_rejected() {
        let leaf = json!({"value": ["huge"], "lower bound": 0.0, "upper bound": 1.0, "units": ""});
        assert!(serde_json::from_value::<LeafFile>(leaf).is_err());
    }

    #[test]
    fn test_text_summary_modes() {
        let mut skeleton = OutputSkeleton::default();
        skeleton.outputs.insert(
            "cost".into(),
            ComponentRecord {
                value: vec![4.0],
                lower_bound: Some(0.0),
                upper_bound: None,
                units: "USD".into(),
            },
        );
        skeleton.solve_status.push(TerminationCondition::Optimal);

        let keys = summary_value(&skeleton, TextSummary::Keys);
        assert_eq!(keys["outputs"], json!(["cost"]));
        assert!(keys.get("solve_status").is_none());

        let meta = summary_value(&skeleton, TextSummary::Metadata);
        assert_eq!(meta["outputs"]["cost"]["units"], json!("USD"));
        assert!(meta["outputs"]["cost"].get("value").is_none());

        let full = summary_value(&skeleton, TextSummary::Full);
        assert_eq!(full["outputs"]["cost"]["value"], json!([4.0]));
    }
}
