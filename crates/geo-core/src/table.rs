//! Row/column listing of a result, every cell stringified for display.

use serde::Serialize;

use crate::model::ColumnarResult;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TableView {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TableView {
    pub fn from_result(result: &ColumnarResult) -> Self {
        let headers = result
            .columns()
            .iter()
            .map(|column| column.name.clone())
            .collect();
        let rows = result
            .rows()
            .map(|row| row.values().iter().map(ToString::to_string).collect())
            .collect();
        Self { headers, rows }
    }

    /// Plain-text grid for terminals, columns padded to their widest cell.
    pub fn render_text(&self) -> String {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
        for row in &self.rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let format_line = |cells: &[String]| {
            let padded: Vec<String> = cells
                .iter()
                .zip(&widths)
                .map(|(cell, width)| format!("{cell:<width$}"))
                .collect();
            padded.join(" | ").trim_end().to_string()
        };

        let mut out = String::new();
        out.push_str(&format_line(&self.headers));
        out.push('\n');
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        out.push_str(&rule.join("-+-"));
        out.push('\n');
        for row in &self.rows {
            out.push_str(&format_line(row));
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ColumnDescriptor, ColumnType, ScalarValue};

    fn sample() -> ColumnarResult {
        ColumnarResult::new(
            vec![
                ColumnDescriptor::new("name", ColumnType::Text),
                ColumnDescriptor::new("officers", ColumnType::Integer),
                ColumnDescriptor::new("open", ColumnType::Boolean),
            ],
            vec![
                vec![
                    ScalarValue::Text("Kojimachi".into()),
                    ScalarValue::Integer(42),
                    ScalarValue::Boolean(true),
                ],
                vec![ScalarValue::Text("Ueno".into()), ScalarValue::Null, ScalarValue::Null],
            ],
        )
        .unwrap()
    }

    #[test]
    fn stringifies_cells_in_schema_order() {
        let table = TableView::from_result(&sample());
        assert_eq!(table.headers, ["name", "officers", "open"]);
        assert_eq!(table.rows[0], ["Kojimachi", "42", "true"]);
        assert_eq!(table.rows[1], ["Ueno", "null", "null"]);
    }

    #[test]
    fn text_rendering_pads_columns() {
        let text = TableView::from_result(&sample()).render_text();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "name      | officers | open");
        assert_eq!(lines[1], "----------+----------+-----");
        assert_eq!(lines[3], "Ueno      | null     | null");
    }
}
