//! Gene body coverage reduction.
//!
//! Gene body coverage is reported as a centile curve (`pos_0` .. `pos_100`),
//! with neighbouring positions highly correlated. For machine learning the curve
//! is collapsed into tertiles: five prime, middle and three prime.

use std::ops::Range;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array};
use tracing::{debug, warn};

use crate::error::FeatureError;
use crate::table::IndexedTable;

/// Number of centile positions in a coverage curve
pub const COVERAGE_POSITIONS: usize = 101;

/// A contiguous slice of the coverage curve summed into one feature
#[derive(Debug, Clone)]
pub struct Tertile {
    pub name: &'static str,
    pub positions: Range<usize>,
}

pub const TERTILES: [Tertile; 3] = [
    Tertile {
        name: "gene_body_five_prime",
        positions: 0..33,
    },
    Tertile {
        name: "gene_body_middle",
        positions: 33..68,
    },
    Tertile {
        name: "gene_body_three_prime",
        positions: 68..COVERAGE_POSITIONS,
    },
];

pub fn coverage_column(position: usize) -> String {
    format!("pos_{position}")
}

/// Whether `column` is one of the tertile features this reducer produces
pub fn is_tertile(column: &str) -> bool {
    TERTILES.iter().any(|tertile| tertile.name == column)
}

/// Whether the table carries at least one coverage position column
pub fn has_coverage(table: &IndexedTable) -> bool {
    (0..COVERAGE_POSITIONS).any(|position| table.has_column(&coverage_column(position)))
}

/// Replace the coverage curve with its three tertile sums
///
/// Each tertile is the row-wise sum of the present values in its range. A row
/// with no present value in a range gets a null tertile. Partially present
/// curves are summed over the columns that exist. A table without any position
/// column is an error, so applying the reducer to its own output fails.
pub fn reduce_gene_body_coverage(table: &IndexedTable) -> Result<IndexedTable, FeatureError> {
    let (present, missing): (Vec<usize>, Vec<usize>) = (0..COVERAGE_POSITIONS)
        .partition(|&position| table.has_column(&coverage_column(position)));

    if present.is_empty() {
        return Err(FeatureError::MissingColumns {
            context: "gene body coverage".to_string(),
            columns: (0..COVERAGE_POSITIONS).map(coverage_column).collect(),
        });
    }

    if !missing.is_empty() {
        warn!(
            "Gene body coverage is missing {} of {} positions ({}); summing the rest",
            missing.len(),
            COVERAGE_POSITIONS,
            missing
                .iter()
                .map(|&position| coverage_column(position))
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    let mut reduced = table.clone();
    for tertile in &TERTILES {
        let columns = tertile
            .positions
            .clone()
            .filter(|position| present.contains(position))
            .map(|position| table.float_column(&coverage_column(position)))
            .collect::<Result<Vec<_>, _>>()?;

        let sums: Float64Array = (0..table.num_rows())
            .map(|row| {
                columns
                    .iter()
                    .filter(|column| column.is_valid(row))
                    .map(|column| column.value(row))
                    .fold(None, |acc: Option<f64>, value| Some(acc.unwrap_or(0.0) + value))
            })
            .collect();

        reduced = reduced.with_column(tertile.name, Arc::new(sums) as ArrayRef)?;
    }

    let originals: Vec<String> = present.iter().map(|&p| coverage_column(p)).collect();
    debug!("Reduced {} coverage columns into tertiles", originals.len());
    reduced.drop_columns(&originals)
}
