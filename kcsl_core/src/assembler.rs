//! Recovers the per-day menus from the grid of a menu table.
//!
//! Two layouts are understood. In the block layout the grid is scanned row by row: a cell
//! starting with `こんだて` opens a block, every later cell adds its items to the slot of its
//! column, and a `おかず` cell closes the block and emits the slots in column order. In the
//! marker-row layout each day is a single cell of the two rows marked with `こんだて`.

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;
use tracing::debug;

use crate::{
    error::MenuError,
    grid::Grid,
    tokenizer::{collapse_whitespace, normalize_cell, CellTokenizer},
};

/// Items of one school day.
pub type MenuEntry = Vec<String>;
/// Entries of one document, in day order.
pub type MenuList = Vec<MenuEntry>;

static MENU_MARKER: &str = "こんだて";
static DISH_MARKER: &str = "おかず";
static DIVIDER_MARKER: &str = "冷凍食品";

/// Columns containing one of these hold notes, not menus.
static ANNOTATIONS: [&str; 3] = ["エネルギー", "お知らせ", "特別支援学校"];
static SENTENCE_END: &str = "です。";
static FORMAT_CONTROLS: [char; 5] = ['\u{202a}', '\u{202b}', '\u{202c}', '\u{202d}', '\u{202e}'];
/// Notes which only show up in a single document, keyed by (year, month).
static DOCUMENT_ANNOTATIONS: [(i32, u32, &str); 1] = [(2016, 12, "地区１２月１４日")];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Layout {
    #[default]
    Blocks,
    MarkerRows,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Block {
    slots: BTreeMap<usize, Vec<String>>,
    mask: BTreeSet<usize>,
    header_row: usize,
    /// Sub-lines in front of the marker; the other header row cells are aligned with them.
    skip_lines: usize,
}

impl Block {
    fn emit(self, menus: &mut MenuList) {
        let Block { slots, mask, .. } = self;
        menus.extend(
            slots
                .into_iter()
                .filter(|(column, _)| !mask.contains(column))
                .map(|(_, items)| items),
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Outside,
    Inside(Block),
    /// A divider row closed the block; nothing is collected until the next marker.
    Suppressed,
}

#[derive(Debug, Clone, Copy)]
pub struct Assembler<'l> {
    tokenizer: CellTokenizer<'l>,
    year: i32,
    month: u32,
}

impl<'l> Assembler<'l> {
    pub fn new(tokenizer: CellTokenizer<'l>, year: i32, month: u32) -> Self {
        Self {
            tokenizer,
            year,
            month,
        }
    }

    pub fn assemble(
        &self,
        layout: Layout,
        grid: &Grid,
        document: &str,
    ) -> Result<MenuList, MenuError> {
        match layout {
            Layout::Blocks => Ok(self.assemble_blocks(grid)),
            Layout::MarkerRows => self.assemble_marker_rows(grid, document),
        }
    }

    pub fn assemble_blocks(&self, grid: &Grid) -> MenuList {
        let dividers = divider_rows(grid);
        let mut menus = vec![];
        let mut state = State::Outside;
        for (index, row) in grid.rows().iter().enumerate() {
            state = self.scan_row(state, index, row, dividers.contains(&index), &mut menus);
        }
        if let State::Inside(block) = state {
            block.emit(&mut menus);
        }
        drop_parentheses(menus)
    }

    pub fn assemble_marker_rows(&self, grid: &Grid, document: &str) -> Result<MenuList, MenuError> {
        let column = (0..grid.column_count())
            .find(|&column| {
                (0..grid.row_count()).any(|row| {
                    grid.cell(row, column)
                        .is_some_and(|cell| cell.contains(MENU_MARKER))
                })
            })
            .ok_or_else(|| MenuError::structure(document, "no column contains こんだて"))?;
        let marker_rows: Vec<&Vec<String>> = grid
            .rows()
            .iter()
            .filter(|row| row.get(column).is_some_and(|cell| cell.contains(MENU_MARKER)))
            .collect();
        if marker_rows.len() != 2 {
            return Err(MenuError::structure(
                document,
                format!(
                    "expected 2 こんだて rows in column {column}, found {}",
                    marker_rows.len()
                ),
            ));
        }
        let menus = marker_rows
            .into_iter()
            .flat_map(|row| row.iter().skip(column + 1))
            .filter(|cell| !cell.trim().is_empty())
            .map(|cell| self.tokenizer.tokenize(cell, 0))
            .collect();
        Ok(drop_parentheses(menus))
    }

    fn scan_row(
        &self,
        state: State,
        index: usize,
        row: &[String],
        divider: bool,
        menus: &mut MenuList,
    ) -> State {
        if divider {
            return match state {
                State::Inside(_) => {
                    debug!(row = index, "divider row drops the open block");
                    State::Suppressed
                }
                other => other,
            };
        }
        row.iter().enumerate().fold(state, |state, (column, cell)| {
            self.scan_cell(state, index, column, cell, menus)
        })
    }

    fn scan_cell(
        &self,
        state: State,
        row: usize,
        column: usize,
        raw: &str,
        menus: &mut MenuList,
    ) -> State {
        let normalized = normalize_cell(raw);
        let marker_line = normalized
            .split('\n')
            .position(|line| line.trim().starts_with(MENU_MARKER));
        if let Some(skip_lines) = marker_line {
            if let State::Inside(block) = state {
                block.emit(menus);
            }
            return State::Inside(Block {
                header_row: row,
                skip_lines,
                ..Block::default()
            });
        }
        let content = collapse_whitespace(&normalized);
        if content == DISH_MARKER {
            if let State::Inside(block) = state {
                block.emit(menus);
            }
            return State::Outside;
        }
        match state {
            State::Inside(mut block) => {
                if self.is_annotation(raw, &normalized, &content) {
                    block.mask.insert(column);
                }
                if !content.is_empty() {
                    let skip_lines = if row == block.header_row {
                        block.skip_lines
                    } else {
                        0
                    };
                    let items = self
                        .tokenizer
                        .tokenize(raw, skip_lines)
                        .into_iter()
                        .filter(|item| !is_footnote(item));
                    block.slots.entry(column).or_default().extend(items);
                }
                State::Inside(block)
            }
            other => other,
        }
    }

    fn is_annotation(&self, raw: &str, normalized: &str, content: &str) -> bool {
        ANNOTATIONS.iter().any(|annotation| content.contains(annotation))
            || DOCUMENT_ANNOTATIONS.iter().any(|(year, month, annotation)| {
                *year == self.year && *month == self.month && content.contains(annotation)
            })
            || normalized.contains(SENTENCE_END)
            || raw.contains(FORMAT_CONTROLS.as_slice())
    }
}

/// Rows whose first non-empty cell announces the frozen food list.
fn divider_rows(grid: &Grid) -> BTreeSet<usize> {
    grid.rows()
        .iter()
        .enumerate()
        .filter(|(_, row)| {
            row.iter()
                .map(|cell| collapse_whitespace(&normalize_cell(cell)))
                .find(|content| !content.is_empty())
                .is_some_and(|content| content.starts_with(DIVIDER_MARKER))
        })
        .map(|(index, _)| index)
        .collect()
}

/// Single capital letters mark footnotes.
fn is_footnote(item: &str) -> bool {
    let mut chars = item.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if c.is_ascii_uppercase())
}

fn drop_parentheses(menus: MenuList) -> MenuList {
    menus
        .into_iter()
        .filter(|entry| {
            let joined = entry.concat();
            joined.is_empty() || !joined.chars().all(|c| matches!(c, '(' | ')' | '（' | '）'))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use crate::{
        assembler::{Assembler, Layout},
        error::MenuError,
        grid::Grid,
        lexicon::Lexicon,
        tokenizer::CellTokenizer,
    };

    fn assemble(grid: &Grid) -> Vec<Vec<String>> {
        let lexicon = Lexicon::builtin().unwrap();
        Assembler::new(CellTokenizer::new(&lexicon), 2019, 1).assemble_blocks(grid)
    }

    fn menus(entries: &[&[&str]]) -> Vec<Vec<String>> {
        entries
            .iter()
            .map(|entry| entry.iter().map(|item| item.to_string()).collect())
            .collect()
    }

    fn energy_grid() -> Grid {
        Grid::from(vec![
            vec!["こんだてA\nこんだてB", "", ""],
            vec!["ごはん\nさばのみそに", "パン\nシチュー", "エネルギー\n650kcal"],
            vec!["ぎゅうにゅう", "ぎゅうにゅう", "エネルギー"],
            vec!["りんご", "みかん", "たんぱく質エネルギー"],
            vec!["おかず", "", ""],
        ])
    }

    #[test]
    fn test_masked_column_is_left_out() {
        let menus_found = assemble(&energy_grid());
        assert_eq!(
            menus_found,
            menus(&[
                &["ごはん", "さばのみそに", "ぎゅうにゅう", "りんご"],
                &["パン", "シチュー", "ぎゅうにゅう", "みかん"],
            ])
        );
    }

    #[test]
    fn test_assembly_is_repeatable() {
        let grid = energy_grid();
        assert_eq!(assemble(&grid), assemble(&grid));
    }

    #[test]
    fn test_header_row_skips_label_lines() {
        let grid = Grid::from(vec![
            vec!["曜日\nこんだて", "月曜\nごはん\nぎゅうにゅう"],
            vec!["", "月曜\nりんご"],
            vec!["お　か　ず", "さばのみそに"],
            vec!["", "だいこんのにもの"],
        ]);
        assert_eq!(
            assemble(&grid),
            menus(&[&["ごはん", "ぎゅうにゅう", "月曜", "りんご"]])
        );
    }

    #[test]
    fn test_footnotes_and_parentheses_are_dropped() {
        let grid = Grid::from(vec![
            vec!["こんだて", "", "", ""],
            vec!["", "A\nカレーライス\nB", "（\n）", "パン"],
        ]);
        assert_eq!(
            assemble(&grid),
            menus(&[&["カレーライス"], &["パン"]])
        );
    }

    #[test]
    fn test_annotations_mask_their_column() {
        let grid = Grid::from(vec![
            vec!["こんだて", "", "", "", ""],
            vec!["", "パン", "給食はお休みです。", "特別支援学校", "ごはん\u{202c}"],
            vec!["", "", "", "", "ぎゅうにゅう"],
        ]);
        assert_eq!(assemble(&grid), menus(&[&["パン"]]));
    }

    #[test]
    fn test_document_specific_annotation() {
        let lexicon = Lexicon::builtin().unwrap();
        let grid = Grid::from(vec![
            vec!["こんだて", "", ""],
            vec!["", "パン", "地区１２月１４日"],
        ]);
        let december = Assembler::new(CellTokenizer::new(&lexicon), 2016, 12);
        assert_eq!(december.assemble_blocks(&grid), menus(&[&["パン"]]));
        let january = Assembler::new(CellTokenizer::new(&lexicon), 2017, 1);
        assert_eq!(january.assemble_blocks(&grid).len(), 2);
    }

    #[test]
    fn test_marker_starts_next_block() {
        let grid = Grid::from(vec![
            vec!["こんだて", "パン"],
            vec!["こんだて", "ごはん"],
            vec!["", "ぎゅうにゅう"],
        ]);
        assert_eq!(
            assemble(&grid),
            menus(&[&["パン"], &["ごはん", "ぎゅうにゅう"]])
        );
    }

    #[test]
    fn test_divider_drops_open_block() {
        let grid = Grid::from(vec![
            vec!["こんだて", "パン"],
            vec!["", "ぎゅうにゅう"],
            vec!["", "冷凍食品のおしらせ", "ぎょうざ"],
            vec!["", "からあげ"],
            vec!["こんだて", "ごはん"],
            vec!["", "みそしる"],
        ]);
        assert_eq!(assemble(&grid), menus(&[&["ごはん", "みそしる"]]));
    }

    #[test]
    fn test_marker_rows() {
        let lexicon = Lexicon::builtin().unwrap();
        let assembler = Assembler::new(CellTokenizer::new(&lexicon), 2019, 1);
        let grid = Grid::from(vec![
            vec!["日", "", "1", "2"],
            vec!["", "こんだて", "ごはんさばのみそに", "パン\nシチュー"],
            vec!["", "おかず", "さば", "とりにく"],
            vec!["", "こんだて", "", "ご\nは\nん"],
        ]);
        assert_eq!(
            assembler.assemble(Layout::MarkerRows, &grid, "1-a.pdf").unwrap(),
            menus(&[&["ごはん", "さばのみそに"], &["パン", "シチュー"], &["ごはん"]])
        );
    }

    #[test]
    fn test_marker_rows_structure_errors() {
        let lexicon = Lexicon::builtin().unwrap();
        let assembler = Assembler::new(CellTokenizer::new(&lexicon), 2019, 1);
        let one_row = Grid::from(vec![vec!["こんだて", "パン"], vec!["", "ごはん"]]);
        assert!(matches!(
            assembler.assemble_marker_rows(&one_row, "1-a.pdf"),
            Err(MenuError::Structure { .. })
        ));
        let no_marker = Grid::from(vec![vec!["パン", "ごはん"]]);
        assert!(matches!(
            assembler.assemble_marker_rows(&no_marker, "1-a.pdf"),
            Err(MenuError::Structure { .. })
        ));
    }
}
