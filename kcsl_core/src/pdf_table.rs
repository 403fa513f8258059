//! Turns the first page of a menu PDF into a [`Grid`].
//!
//! Glyph positions are collected through `pdf_extract`'s output device. Glyphs on the same
//! baseline form lines, lines are cut into runs at wide horizontal gaps, overlapping runs
//! define the columns and wide vertical gaps separate the rows.

use std::path::Path;

use pdf_extract::{Document, MediaBox, OutputDev, OutputError, Transform};

use crate::{error::MenuError, grid::Grid};

/// Anything that can produce a grid from a PDF file.
pub trait TableExtractor {
    fn extract(&self, pdf: &Path) -> Result<Grid, MenuError>;
}

/// Grid extraction based on glyph geometry.
#[derive(Debug, Clone)]
pub struct PdfTableExtractor {
    page: u32,
    /// Horizontal gap, in font sizes, which separates two runs on one line.
    column_gap: f64,
    /// Vertical gap, in font sizes, which separates two table rows.
    row_gap: f64,
}

impl Default for PdfTableExtractor {
    fn default() -> Self {
        Self {
            page: 1,
            column_gap: 0.8,
            row_gap: 1.6,
        }
    }
}

impl TableExtractor for PdfTableExtractor {
    fn extract(&self, pdf: &Path) -> Result<Grid, MenuError> {
        let extraction_error = |message: String| MenuError::Extraction {
            path: pdf.to_path_buf(),
            message,
        };
        let document = Document::load(pdf).map_err(|err| extraction_error(err.to_string()))?;
        let mut collector = GlyphCollector::new(self.page);
        pdf_extract::output_doc(&document, &mut collector)
            .map_err(|err| extraction_error(err.to_string()))?;
        if collector.glyphs.is_empty() {
            return Err(extraction_error(format!("no text on page {}", self.page)));
        }
        Ok(self.layout(collector.glyphs))
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Glyph {
    x0: f64,
    x1: f64,
    /// Baseline, measured downwards from the top of the page.
    y: f64,
    size: f64,
    text: String,
}

#[derive(Debug, Clone)]
struct Run {
    x0: f64,
    x1: f64,
    text: String,
}

#[derive(Debug, Clone)]
struct Line {
    y: f64,
    size: f64,
    runs: Vec<Run>,
}

struct GlyphCollector {
    page: u32,
    current_page: u32,
    page_top: f64,
    glyphs: Vec<Glyph>,
}

impl GlyphCollector {
    fn new(page: u32) -> Self {
        Self {
            page,
            current_page: 0,
            page_top: 0.,
            glyphs: vec![],
        }
    }
}

impl OutputDev for GlyphCollector {
    fn begin_page(
        &mut self,
        page_num: u32,
        media_box: &MediaBox,
        _art_box: Option<(f64, f64, f64, f64)>,
    ) -> Result<(), OutputError> {
        self.current_page = page_num;
        self.page_top = media_box.ury;
        Ok(())
    }

    fn end_page(&mut self) -> Result<(), OutputError> {
        Ok(())
    }

    fn output_character(
        &mut self,
        trm: &Transform,
        width: f64,
        _spacing: f64,
        font_size: f64,
        char: &str,
    ) -> Result<(), OutputError> {
        if self.current_page != self.page || char.trim().is_empty() {
            return Ok(());
        }
        let size = font_size * (trm.m11 * trm.m22).abs().sqrt();
        if size <= 0. {
            return Ok(());
        }
        self.glyphs.push(Glyph {
            x0: trm.m31,
            x1: trm.m31 + width * size,
            y: self.page_top - trm.m32,
            size,
            text: char.to_string(),
        });
        Ok(())
    }

    fn begin_word(&mut self) -> Result<(), OutputError> {
        Ok(())
    }

    fn end_word(&mut self) -> Result<(), OutputError> {
        Ok(())
    }

    fn end_line(&mut self) -> Result<(), OutputError> {
        Ok(())
    }
}

impl PdfTableExtractor {
    fn layout(&self, mut glyphs: Vec<Glyph>) -> Grid {
        glyphs.sort_by(|a, b| a.y.total_cmp(&b.y).then(a.x0.total_cmp(&b.x0)));
        let lines = self.lines(glyphs);
        let columns = columns(&lines);

        let mut rows: Vec<Vec<Vec<String>>> = vec![];
        let mut last_line: Option<(f64, f64)> = None;
        for line in &lines {
            let starts_row = match last_line {
                Some((y, size)) => line.y - y > self.row_gap * size.max(line.size),
                None => true,
            };
            if starts_row {
                rows.push(vec![vec![]; columns.len()]);
            }
            last_line = Some((line.y, line.size));
            let Some(row) = rows.last_mut() else {
                continue;
            };
            let mut texts: Vec<Option<String>> = vec![None; columns.len()];
            for run in &line.runs {
                let center = (run.x0 + run.x1) / 2.;
                let Some(column) = columns
                    .iter()
                    .position(|(x0, x1)| *x0 <= center && center <= *x1)
                else {
                    continue;
                };
                let text = texts[column].get_or_insert_with(String::new);
                if !text.is_empty() {
                    text.push(' ');
                }
                text.push_str(&run.text);
            }
            for (cell, text) in row.iter_mut().zip(texts) {
                if let Some(text) = text {
                    cell.push(text);
                }
            }
        }
        Grid::new(
            rows.into_iter()
                .map(|row| row.into_iter().map(|lines| lines.join("\n")).collect())
                .collect(),
        )
    }

    fn lines(&self, glyphs: Vec<Glyph>) -> Vec<Line> {
        let mut grouped: Vec<Vec<Glyph>> = vec![];
        for glyph in glyphs {
            match grouped.last_mut() {
                Some(line) if (glyph.y - line[0].y).abs() <= 0.4 * line[0].size => line.push(glyph),
                _ => grouped.push(vec![glyph]),
            }
        }
        grouped
            .into_iter()
            .map(|mut glyphs| {
                glyphs.sort_by(|a, b| a.x0.total_cmp(&b.x0));
                let y = glyphs[0].y;
                let size = glyphs.iter().map(|glyph| glyph.size).fold(0., f64::max);
                let mut runs: Vec<Run> = vec![];
                for glyph in glyphs {
                    match runs.last_mut() {
                        Some(run) if glyph.x0 - run.x1 <= self.column_gap * glyph.size => {
                            run.x1 = run.x1.max(glyph.x1);
                            run.text.push_str(&glyph.text);
                        }
                        _ => runs.push(Run {
                            x0: glyph.x0,
                            x1: glyph.x1,
                            text: glyph.text,
                        }),
                    }
                }
                Line { y, size, runs }
            })
            .collect()
    }
}

/// Merge the horizontal extents of all runs into disjoint column bands.
fn columns(lines: &[Line]) -> Vec<(f64, f64)> {
    let mut extents: Vec<(f64, f64)> = lines
        .iter()
        .flat_map(|line| line.runs.iter().map(|run| (run.x0, run.x1)))
        .collect();
    extents.sort_by(|a, b| a.0.total_cmp(&b.0));
    let mut bands: Vec<(f64, f64)> = vec![];
    for (x0, x1) in extents {
        match bands.last_mut() {
            Some(band) if x0 <= band.1 => band.1 = band.1.max(x1),
            _ => bands.push((x0, x1)),
        }
    }
    bands
}
