use crate::types::{ClassLabel, ConfusionMatrix, FusionError, FusionResult, LabelMap};
use regex::Regex;
use std::collections::BTreeSet;
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

const REFERENCE_HEADER: &str = "#Reference labels (rows):";
const PRODUCED_HEADER: &str = "#Produced labels (columns):";

/// Confusion matrix CSV reader/writer.
///
/// Layout: two comment headers listing the reference (row) and produced
/// (column) labels, then one comma-separated line of counts per reference
/// label. The two label lists may differ; parsing yields a square matrix
/// over their sorted union, with zero counts for missing pairs.
pub struct ConfusionMatrixFile;

impl ConfusionMatrixFile {
    /// Read a confusion matrix and its label map from a CSV file
    pub fn read<L, P>(path: P) -> FusionResult<(ConfusionMatrix, LabelMap<L>)>
    where
        L: ClassLabel + FromStr,
        P: AsRef<Path>,
    {
        log::info!("Reading confusion matrix: {}", path.as_ref().display());
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&text)
    }

    /// Parse the CSV text of a confusion matrix
    pub fn parse<L>(text: &str) -> FusionResult<(ConfusionMatrix, LabelMap<L>)>
    where
        L: ClassLabel + FromStr,
    {
        let header_re = Regex::new(r"^#\s*(Reference|Produced) labels \((rows|columns)\)\s*:(.*)$")
            .map_err(|e| FusionError::InvalidFormat(format!("Header pattern: {}", e)))?;

        let mut reference_labels: Option<Vec<L>> = None;
        let mut produced_labels: Option<Vec<L>> = None;
        let mut rows: Vec<Vec<u64>> = Vec::new();

        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if line.starts_with('#') {
                let caps = match header_re.captures(line) {
                    Some(caps) => caps,
                    None => {
                        log::debug!("Skipping comment line {}: {}", line_no + 1, line);
                        continue;
                    }
                };
                let labels = parse_labels::<L>(&caps[3], line_no)?;
                if &caps[1] == "Reference" {
                    reference_labels = Some(labels);
                } else {
                    produced_labels = Some(labels);
                }
                continue;
            }

            let row = line
                .split(',')
                .map(|token| parse_count(token, line_no))
                .collect::<FusionResult<Vec<u64>>>()?;
            rows.push(row);
        }

        let reference_labels = reference_labels.ok_or_else(|| {
            FusionError::InvalidFormat(format!("Missing '{}' header", REFERENCE_HEADER))
        })?;
        let produced_labels = produced_labels.ok_or_else(|| {
            FusionError::InvalidFormat(format!("Missing '{}' header", PRODUCED_HEADER))
        })?;

        check_unique(&reference_labels, REFERENCE_HEADER)?;
        check_unique(&produced_labels, PRODUCED_HEADER)?;

        if rows.len() != reference_labels.len() {
            return Err(FusionError::InvalidFormat(format!(
                "Expected {} matrix rows, found {}",
                reference_labels.len(),
                rows.len()
            )));
        }

        // rows and columns may list different classes; both land on their union
        let classes: BTreeSet<L> = reference_labels
            .iter()
            .chain(produced_labels.iter())
            .cloned()
            .collect();
        let label_map = LabelMap::from_labels(classes)?;
        let n = label_map.len();

        let column_index = produced_labels
            .iter()
            .map(|label| label_map.index_of(label))
            .collect::<Option<Vec<usize>>>()
            .ok_or_else(|| FusionError::InvalidFormat("Unmapped produced label".to_string()))?;

        let mut matrix = ConfusionMatrix::zeros((n, n));
        for (row_no, (label, row)) in reference_labels.iter().zip(&rows).enumerate() {
            if row.len() != produced_labels.len() {
                return Err(FusionError::InvalidFormat(format!(
                    "Matrix row {} has {} values, expected {}",
                    row_no,
                    row.len(),
                    produced_labels.len()
                )));
            }
            let i = label_map.index_of(label).ok_or_else(|| {
                FusionError::InvalidFormat(format!("Unmapped reference label {:?}", label))
            })?;
            for (&j, &count) in column_index.iter().zip(row) {
                matrix[[i, j]] = count;
            }
        }

        log::debug!(
            "Parsed {}x{} confusion matrix into {} classes",
            reference_labels.len(),
            produced_labels.len(),
            n
        );
        Ok((matrix, label_map))
    }

    /// Write a confusion matrix and its label map as CSV
    pub fn write<L, P>(path: P, matrix: &ConfusionMatrix, label_map: &LabelMap<L>) -> FusionResult<()>
    where
        L: ClassLabel + Display,
        P: AsRef<Path>,
    {
        log::info!("Writing confusion matrix: {}", path.as_ref().display());
        let text = Self::to_csv_string(matrix, label_map)?;
        std::fs::write(path.as_ref(), text)?;
        Ok(())
    }

    /// CSV text of a confusion matrix
    pub fn to_csv_string<L>(matrix: &ConfusionMatrix, label_map: &LabelMap<L>) -> FusionResult<String>
    where
        L: ClassLabel + Display,
    {
        check_dimensions(matrix, label_map)?;

        let labels = label_map
            .labels()
            .iter()
            .map(|l| l.to_string())
            .collect::<Vec<_>>()
            .join(",");

        let mut out = String::new();
        out.push_str(REFERENCE_HEADER);
        out.push_str(&labels);
        out.push('\n');
        out.push_str(PRODUCED_HEADER);
        out.push_str(&labels);
        out.push('\n');

        for row in matrix.rows() {
            let line = row.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(",");
            out.push_str(&line);
            out.push('\n');
        }

        Ok(out)
    }

    /// Aligned text rendering (rows = reference labels, columns = produced labels)
    pub fn render<L>(matrix: &ConfusionMatrix, label_map: &LabelMap<L>) -> FusionResult<String>
    where
        L: ClassLabel + Display,
    {
        check_dimensions(matrix, label_map)?;

        let width = matrix
            .iter()
            .map(|c| c.to_string().len())
            .chain(label_map.labels().iter().map(|l| l.to_string().len() + 2))
            .max()
            .unwrap_or(3);
        let inner = width.saturating_sub(2);

        let mut out = format!("{:width$} ", "", width = width);
        for label in label_map.labels() {
            out.push_str(&format!("[{:>inner$}] ", label.to_string(), inner = inner));
        }
        out.push('\n');

        for (label, row) in label_map.labels().iter().zip(matrix.rows()) {
            out.push_str(&format!("[{:>inner$}] ", label.to_string(), inner = inner));
            for count in row.iter() {
                out.push_str(&format!("{:>width$} ", count, width = width));
            }
            out.push('\n');
        }

        Ok(out)
    }
}

fn check_dimensions<L: ClassLabel>(matrix: &ConfusionMatrix, label_map: &LabelMap<L>) -> FusionResult<()> {
    let n = label_map.len();
    if matrix.dim() != (n, n) {
        return Err(FusionError::ConfigurationMismatch(format!(
            "Confusion matrix is {:?} but label map holds {} classes",
            matrix.dim(),
            n
        )));
    }
    Ok(())
}

fn check_unique<L: ClassLabel>(labels: &[L], header: &str) -> FusionResult<()> {
    let mut seen = BTreeSet::new();
    for label in labels {
        if !seen.insert(label) {
            return Err(FusionError::InvalidFormat(format!(
                "Label {:?} listed twice in '{}'",
                label, header
            )));
        }
    }
    Ok(())
}

fn parse_labels<L: FromStr>(list: &str, line_no: usize) -> FusionResult<Vec<L>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<L>().map_err(|_| {
                FusionError::InvalidFormat(format!("Line {}: invalid label '{}'", line_no + 1, s))
            })
        })
        .collect()
}

fn parse_count(token: &str, line_no: usize) -> FusionResult<u64> {
    let token = token.trim();
    if let Ok(count) = token.parse::<u64>() {
        return Ok(count);
    }

    // fixed-point output of integer counts, e.g. "12.0000000000"
    match token.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 && value.fract() == 0.0 => Ok(value as u64),
        _ => Err(FusionError::InvalidFormat(format!(
            "Line {}: invalid count '{}'",
            line_no + 1,
            token
        ))),
    }
}
