//! Text rendering of a [`VerificationReport`] as psql-style tables.
//!
//! ```text
//! +-------------------+---------+
//! | Metric            | Value   |
//! |-------------------+---------|
//! | min_trans_id      | 1       |
//! +-------------------+---------+
//! ```

use std::fmt::Write as _;

use crate::verifier::VerificationReport;

/// A simple table: a header row and string cells. Numeric-looking cells are
/// right-aligned.
#[derive(Debug, Clone, Default)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Appends a row. Short rows are padded with empty cells.
    pub fn row<I, S>(&mut self, cells: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut row: Vec<String> = cells.into_iter().map(Into::into).collect();
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
        self
    }

    pub fn render(&self) -> String {
        let widths: Vec<usize> = (0..self.headers.len())
            .map(|col| {
                self.rows
                    .iter()
                    .map(|r| r[col].chars().count())
                    .chain(std::iter::once(self.headers[col].chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let rule = |left: char, mid: char, right: char| {
            let mut line = String::new();
            line.push(left);
            for (i, w) in widths.iter().enumerate() {
                if i > 0 {
                    line.push(mid);
                }
                line.push_str(&"-".repeat(w + 2));
            }
            line.push(right);
            line.push('\n');
            line
        };

        let line = |cells: &[String], numeric_right: bool| {
            let mut out = String::from("|");
            for (cell, &w) in cells.iter().zip(&widths) {
                if numeric_right && is_numeric(cell) {
                    let _ = write!(out, " {cell:>w$} |");
                } else {
                    let _ = write!(out, " {cell:<w$} |");
                }
            }
            out.push('\n');
            out
        };

        let mut out = rule('+', '+', '+');
        out.push_str(&line(&self.headers, false));
        out.push_str(&rule('|', '+', '|'));
        for row in &self.rows {
            out.push_str(&line(row, true));
        }
        out.push_str(&rule('+', '+', '+'));
        out
    }
}

fn is_numeric(cell: &str) -> bool {
    !cell.is_empty() && cell.parse::<f64>().is_ok()
}

/// Renders every section of the report, in the order the checks ran.
pub fn render_report(report: &VerificationReport) -> String {
    let mut out = String::new();

    out.push_str("\n=== Sample Data ===\n");
    let mut sample = Table::new([
        "transaction_id",
        "user_id",
        "product_name",
        "quantity",
        "unit_price",
        "transaction_timestamp",
    ]);
    for r in &report.sample {
        sample.row([
            r.transaction_id.to_string(),
            r.user_id.to_string(),
            r.product_name.to_string(),
            r.quantity.to_string(),
            r.unit_price.to_string(),
            r.transaction_timestamp.to_string(),
        ]);
    }
    out.push_str(&sample.render());

    out.push_str("\n=== Checking for Duplicate Transaction IDs ===\n");
    let mut dupes = Table::new(["duplicate_count"]);
    dupes.row([report.duplicate_count.to_string()]);
    out.push_str(&dupes.render());
    if report.duplicate_count == 0 {
        out.push_str("No duplicates found. PRIMARY KEY constraint is working properly.\n");
    } else {
        let _ = writeln!(
            out,
            "Found {} duplicate transaction_ids! This violates the PRIMARY KEY constraint.",
            report.duplicate_count
        );
    }

    out.push_str("\n=== Value Ranges and Basic Statistics ===\n");
    let mut ranges = Table::new(["Metric", "Value"]);
    ranges.row(["total_rows".to_string(), report.row_count.to_string()]);
    if let Some(r) = &report.ranges {
        let metrics: [(&str, String); 13] = [
            ("min_trans_id", r.min_transaction_id.to_string()),
            ("max_trans_id", r.max_transaction_id.to_string()),
            ("min_user_id", r.min_user_id.to_string()),
            ("max_user_id", r.max_user_id.to_string()),
            ("min_quantity", r.min_quantity.to_string()),
            ("max_quantity", r.max_quantity.to_string()),
            ("min_price", format!("{:.2}", r.min_unit_price)),
            ("max_price", format!("{:.2}", r.max_unit_price)),
            ("earliest_date", r.earliest_timestamp.to_string()),
            ("latest_date", r.latest_timestamp.to_string()),
            ("avg_quantity", format!("{:.2}", r.avg_quantity)),
            ("avg_price", format!("{:.2}", r.avg_unit_price)),
            ("unique_products", r.distinct_products.to_string()),
        ];
        for (name, value) in metrics {
            ranges.row([name.to_string(), value]);
        }
    }
    out.push_str(&ranges.render());

    out.push_str("\n=== Product Distribution ===\n");
    let mut products = Table::new([
        "product_name",
        "total_sales",
        "avg_quantity",
        "avg_price",
        "percentage (%)",
    ]);
    for p in &report.products {
        products.row([
            p.stats.product_name.clone(),
            p.stats.sales_count.to_string(),
            format!("{:.2}", p.stats.avg_quantity),
            format!("{:.2}", p.stats.avg_unit_price),
            format!("{:.2}", p.percentage),
        ]);
    }
    out.push_str(&products.render());

    if report.is_clean() {
        out.push_str("\nAll checks passed.\n");
    } else {
        out.push_str("\n=== Mismatches ===\n");
        for m in &report.mismatches {
            let _ = writeln!(out, "- {m}");
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verifier::Mismatch;

    #[test]
    fn test_psql_layout() {
        let mut t = Table::new(["name", "n"]);
        t.row(["abc", "7"]).row(["z", "12"]);

        let expected = "\
+------+----+
| name | n  |
|------+----|
| abc  |  7 |
| z    | 12 |
+------+----+
";
        assert_eq!(t.render(), expected);
    }

    #[test]
    fn test_short_rows_are_padded() {
        let mut t = Table::new(["a", "b"]);
        t.row(["only"]);
        assert!(t.render().contains("| only |   |"));
    }

    #[test]
    fn test_report_lists_mismatches() {
        let report = VerificationReport {
            row_count: 0,
            duplicate_count: 2,
            ranges: None,
            products: Vec::new(),
            sample: Vec::new(),
            mismatches: vec![Mismatch::DuplicateIds { count: 2 }],
        };
        let text = render_report(&report);
        assert!(text.contains("Found 2 duplicate transaction_ids"));
        assert!(text.contains("- 2 duplicate transaction_id values"));
    }
}
