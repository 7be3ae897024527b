//! In-memory tabular dataset and its delimited-text encoding.

use serde::Serialize;

use crate::errors::TableError;

/// A single value in a [`Table`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Json(serde_json::Value),
}

impl Cell {
    fn render(&self) -> String {
        match self {
            Cell::Null => String::new(),
            Cell::Bool(true) => "True".to_string(),
            Cell::Bool(false) => "False".to_string(),
            Cell::Int(i) => i.to_string(),
            // Debug keeps the decimal point ("1.0", not "1")
            Cell::Float(f) if f.is_finite() => format!("{:?}", f),
            Cell::Float(f) if f.is_nan() => String::new(),
            Cell::Float(f) if *f > 0.0 => "inf".to_string(),
            Cell::Float(_) => "-inf".to_string(),
            Cell::Text(s) => s.clone(),
            Cell::Json(v) => v.to_string(),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

impl From<i64> for Cell {
    fn from(i: i64) -> Self {
        Cell::Int(i)
    }
}

impl From<f64> for Cell {
    fn from(f: f64) -> Self {
        Cell::Float(f)
    }
}

impl From<bool> for Cell {
    fn from(b: bool) -> Self {
        Cell::Bool(b)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Cell::Null)
    }
}

/// Named columns plus rows. Every row has exactly `columns.len()` cells.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<(), TableError> {
        if row.len() != self.columns.len() {
            return Err(TableError::RowWidth {
                expected: self.columns.len(),
                actual: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Look up a cell by row index and column name.
    pub fn get(&self, row: usize, column: &str) -> Option<&Cell> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// Encode as comma-delimited text: header line, then one line per row,
    /// each terminated by `\n`. No index column.
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        write_record(&mut out, self.columns.iter().map(String::as_str));
        for row in &self.rows {
            let rendered: Vec<String> = row.iter().map(Cell::render).collect();
            write_record(&mut out, rendered.iter().map(String::as_str));
        }
        out
    }
}

fn write_record<'a>(out: &mut String, fields: impl Iterator<Item = &'a str>) {
    for (i, field) in fields.enumerate() {
        if i > 0 {
            out.push(',');
        }
        if field.contains(&[',', '"', '\n', '\r'][..]) {
            out.push('"');
            out.push_str(&field.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(field);
        }
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_row_rejects_wrong_width() {
        let mut table = Table::new(["a", "b"]);
        let err = table.push_row(vec![Cell::Int(1)]).unwrap_err();
        assert_eq!(err, TableError::RowWidth { expected: 2, actual: 1 });
        assert!(table.is_empty());
    }

    #[test]
    fn test_to_csv_header_and_rows() {
        let mut table = Table::new(["id", "name", "score", "active"]);
        table
            .push_row(vec![1i64.into(), "alice".into(), 9.5f64.into(), true.into()])
            .unwrap();
        table
            .push_row(vec![2i64.into(), Cell::Null, 7.0f64.into(), false.into()])
            .unwrap();

        assert_eq!(
            table.to_csv(),
            "id,name,score,active\n1,alice,9.5,True\n2,,7.0,False\n"
        );
    }

    #[test]
    fn test_to_csv_quotes_special_characters() {
        let mut table = Table::new(["note"]);
        table.push_row(vec!["hello, world".into()]).unwrap();
        table.push_row(vec!["say \"hi\"".into()]).unwrap();
        table.push_row(vec!["two\nlines".into()]).unwrap();

        assert_eq!(
            table.to_csv(),
            "note\n\"hello, world\"\n\"say \"\"hi\"\"\"\n\"two\nlines\"\n"
        );
    }

    #[test]
    fn test_to_csv_empty_table_has_header_only() {
        let table = Table::new(["a", "b"]);
        assert_eq!(table.to_csv(), "a,b\n");
    }

    #[test]
    fn test_json_cell_renders_compact_and_quoted() {
        let mut table = Table::new(["tags"]);
        table
            .push_row(vec![Cell::Json(serde_json::json!(["x", "y"]))])
            .unwrap();
        assert_eq!(table.to_csv(), "tags\n\"[\"\"x\"\",\"\"y\"\"]\"\n");
    }

    #[test]
    fn test_get_by_column_name() {
        let mut table = Table::new(["k", "v"]);
        table.push_row(vec!["a".into(), 1i64.into()]).unwrap();
        assert_eq!(table.get(0, "v"), Some(&Cell::Int(1)));
        assert_eq!(table.get(0, "missing"), None);
        assert_eq!(table.get(1, "k"), None);
    }
}
