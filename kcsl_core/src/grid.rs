//! The text grid of a single PDF page and its CSV cache.

use std::{fs::File, path::Path};

use anyhow::{Context, Result};

/// Row-major table of cell texts.
///
/// Cells may hold several sub-lines separated by `\n`. Rows are not required to have the
/// same number of columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grid {
    rows: Vec<Vec<String>>,
}

impl Grid {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(column))
            .map(String::as_str)
    }

    /// Read a grid previously written with [`Grid::write_csv`].
    pub fn read_csv(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("opening table cache {}", path.display()))?;
        let mut rows = vec![];
        for record in reader.records() {
            let record = record.with_context(|| format!("reading {}", path.display()))?;
            rows.push(record.iter().map(String::from).collect());
        }
        Ok(Self { rows })
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let file =
            File::create(path).with_context(|| format!("creating table cache {}", path.display()))?;
        let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(file);
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl From<Vec<Vec<&str>>> for Grid {
    fn from(rows: Vec<Vec<&str>>) -> Self {
        Self::new(
            rows.into_iter()
                .map(|row| row.into_iter().map(String::from).collect())
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::grid::Grid;

    #[test]
    fn test_csv_keeps_multiline_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2019-01-higashinada.csv");
        let grid = Grid::from(vec![
            vec!["日\nこんだて", "ごはん\nぎゅうにゅう", ""],
            vec!["おかず", "さばのみそに, だいこん"],
        ]);
        grid.write_csv(&path).unwrap();
        let read = Grid::read_csv(&path).unwrap();
        assert_eq!(read, grid);
        assert_eq!(read.column_count(), 3);
        assert_eq!(read.cell(1, 1), Some("さばのみそに, だいこん"));
        assert_eq!(read.cell(1, 2), None);
    }
}
