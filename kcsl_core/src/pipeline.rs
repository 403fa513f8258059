//! Runs one document at a time from the listing to its group calendar.

use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context as _, Result};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, Utc};
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};

use crate::{
    assembler::{Assembler, MenuList},
    business_days::business_days,
    calendar::{GroupCalendar, MenuMonth, MergeStats},
    config::Config,
    error::MenuError,
    grid::Grid,
    holidays::HolidaySet,
    lexicon::Lexicon,
    menu_client::{download, FetchOutcome, ListedDocument},
    pdf_table::{PdfTableExtractor, TableExtractor},
    store::{read_menus, write_menus, DocumentRecord, PdfStore, Record},
    tokenizer::CellTokenizer,
};

/// Everything a run shares between documents. Read only once built.
pub struct Context {
    pub config: Config,
    pub holidays: HolidaySet,
    pub lexicon: Lexicon,
    pub extractor: Box<dyn TableExtractor>,
}

impl Context {
    pub fn new(config: Config, holidays: HolidaySet, lexicon: Lexicon) -> Self {
        Self {
            config,
            holidays,
            lexicon,
            extractor: Box::new(PdfTableExtractor::default()),
        }
    }

    /// Use the configured lexicon file, or the built-in one.
    pub fn from_config(config: Config, holidays: HolidaySet) -> Result<Self> {
        let lexicon = match &config.lexicon {
            Some(path) => Lexicon::load(path)?,
            None => Lexicon::builtin()?,
        };
        Ok(Self::new(config, holidays, lexicon))
    }

    pub fn with_extractor(mut self, extractor: Box<dyn TableExtractor>) -> Self {
        self.extractor = extractor;
        self
    }
}

/// Every distinct item of the menus assembled during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MenuCatalog {
    items: BTreeSet<String>,
}

impl MenuCatalog {
    pub fn extend(&mut self, menus: &MenuList) {
        self.items.extend(menus.iter().flatten().cloned());
    }

    /// Items in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentOutcome {
    NotModified,
    Failed(StatusCode),
    Merged(MenuMonth, MergeStats),
}

/// Download a listed document and merge its menus into the calendar of its group.
pub async fn process(
    ctx: &Context,
    client: &Client,
    document: &ListedDocument,
    catalog: &mut MenuCatalog,
) -> Result<DocumentOutcome> {
    let config = &ctx.config;
    let url = document.url.as_str();
    let record_path = config.record_path();
    let mut record = Record::load(&record_path)?;
    let known = record.get(url).cloned().unwrap_or_default();

    let store = PdfStore::from_url(url, reference_date(&known))?;
    if store.menu_month().month != document.month {
        warn!(
            url,
            listed = document.month,
            named = store.menu_month().month,
            "listed month differs from file name, using the file name"
        );
    }
    let pdf = store.local(&config.docs_dir, "pdf");
    let last_modified =
        match download(client, url, &pdf, known.last_modified.as_deref()).await? {
            FetchOutcome::NotModified => {
                debug!(url, "not modified");
                return Ok(DocumentOutcome::NotModified);
            }
            FetchOutcome::Failed(status) => {
                warn!(url, %status, "download failed, skipping");
                return Ok(DocumentOutcome::Failed(status));
            }
            FetchOutcome::Downloaded { last_modified } => last_modified,
        };

    let entry = record.entry(url);
    if last_modified.is_some() {
        entry.last_modified = last_modified;
    }
    let modified = entry.last_modified_at();
    // the server timestamp decides the year once it is known
    let store = PdfStore::from_url(url, reference_date(entry))?;
    let pdf = relocate(&pdf, &store.local(&config.docs_dir, "pdf"))?;
    entry.mirror = Some(store.remote(&config.mirror_base, "pdf"));
    record.save(&record_path)?;

    let menu_month = store.menu_month();
    let menu_file = store.local(&config.docs_dir, "yml");
    let menus = match read_menus(&menu_file)? {
        Some(menus) => {
            info!(path = %menu_file.display(), "using menu file");
            menus
        }
        None => {
            let table = store.local(&config.docs_dir, "csv");
            let grid = if table.exists() {
                debug!(path = %table.display(), "using cached table");
                Grid::read_csv(&table)?
            } else {
                info!(path = %pdf.display(), "extracting table");
                let grid = ctx.extractor.extract(&pdf)?;
                grid.write_csv(&table)?;
                record.entry(url).table = Some(store.remote(&config.mirror_base, "csv"));
                record.save(&record_path)?;
                grid
            };
            let assembler = Assembler::new(
                CellTokenizer::new(&ctx.lexicon),
                menu_month.year,
                menu_month.month,
            );
            let menus = assembler.assemble(config.layout, &grid, url)?;
            write_menus(&menu_file, &menus)?;
            catalog.extend(&menus);
            menus
        }
    };

    let calendar_path = config.calendar_path(store.group());
    let mut calendar = GroupCalendar::load(&calendar_path, store.group())?;
    let stamp = modified.unwrap_or_else(|| Utc::now().naive_utc());
    let stats = merge_month(ctx, &mut calendar, menu_month, &menus, stamp)?;
    calendar.write(&calendar_path)?;
    Ok(DocumentOutcome::Merged(menu_month.clone(), stats))
}

/// Merge the menu files behind the events of a calendar file into it again.
///
/// Events are stamped with the modification time of their menu file.
pub fn reapply_calendar(ctx: &Context, ics_path: &Path) -> Result<Vec<(MenuMonth, MergeStats)>> {
    let group = ics_path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .with_context(|| format!("no group in calendar name {}", ics_path.display()))?;
    let mut calendar = GroupCalendar::load(ics_path, group)?;
    let mut applied = vec![];
    for menu_month in calendar.menu_months()? {
        let menu_file = PdfStore::from(menu_month.clone()).local(&ctx.config.docs_dir, "yml");
        let menus = read_menus(&menu_file)?
            .with_context(|| format!("missing menu file {}", menu_file.display()))?;
        let modified: DateTime<Utc> = fs::metadata(&menu_file)?.modified()?.into();
        info!(path = %menu_file.display(), "re-applying menu file");
        let stats = merge_month(ctx, &mut calendar, &menu_month, &menus, modified.naive_utc())?;
        applied.push((menu_month, stats));
    }
    calendar.write(ics_path)?;
    Ok(applied)
}

/// Every menu needs exactly one business day.
pub fn ensure_day_count(document: &str, days: usize, menus: usize) -> Result<(), MenuError> {
    if days != menus {
        return Err(MenuError::LayoutMismatch {
            document: document.to_string(),
            days,
            menus,
        });
    }
    Ok(())
}

fn merge_month(
    ctx: &Context,
    calendar: &mut GroupCalendar,
    menu_month: &MenuMonth,
    menus: &MenuList,
    stamp: NaiveDateTime,
) -> Result<MergeStats, MenuError> {
    let days = business_days(menu_month.year, menu_month.month, &ctx.holidays);
    ensure_day_count(&menu_month.to_string(), days.len(), menus.len())?;
    let stats = calendar.merge(menu_month, &days, menus, stamp);
    info!(
        document = %menu_month,
        created = stats.created,
        updated = stats.updated,
        unchanged = stats.unchanged,
        skipped = stats.skipped,
        "merged menus"
    );
    Ok(stats)
}

fn reference_date(record: &DocumentRecord) -> NaiveDate {
    record
        .last_modified_at()
        .map(|modified| modified.date())
        .unwrap_or_else(|| Local::now().date_naive())
}

/// Move a download whose year changed with the server timestamp.
fn relocate(from: &Path, to: &Path) -> Result<PathBuf> {
    if from != to {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(from, to)
            .with_context(|| format!("moving {} to {}", from.display(), to.display()))?;
    }
    Ok(to.to_path_buf())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use crate::{
        calendar::{MenuMonth, MergeStats},
        config::Config,
        error::MenuError,
        grid::Grid,
        holidays::HolidaySet,
        lexicon::Lexicon,
        menu_client::ListedDocument,
        pdf_table::TableExtractor,
        pipeline::{
            ensure_day_count, process, reapply_calendar, Context, DocumentOutcome, MenuCatalog,
        },
        store::{read_menus, write_menus, Record},
    };

    static LAST_MODIFIED: &str = "Thu, 20 Dec 2018 01:02:03 GMT";

    /// Hands out the same grid for every document.
    struct FixedGrid(Grid);

    impl TableExtractor for FixedGrid {
        fn extract(&self, _pdf: &Path) -> Result<Grid, MenuError> {
            Ok(self.0.clone())
        }
    }

    /// A January 2019 table with one column per business day.
    fn january_grid(columns: usize) -> Grid {
        let mut header = vec![String::new(); columns];
        header[0] = String::from("こんだて");
        let items = (1..=columns)
            .map(|day| format!("ごはん\nおかず{day}"))
            .collect();
        Grid::new(vec![header, items])
    }

    fn context(docs_dir: &Path, grid: Grid) -> Context {
        let config = Config {
            docs_dir: docs_dir.to_path_buf(),
            ..Config::default()
        };
        Context::new(
            config,
            HolidaySet::supplementary(),
            Lexicon::builtin().unwrap(),
        )
        .with_extractor(Box::new(FixedGrid(grid)))
    }

    async fn serve_pdf(server: &MockServer) -> ListedDocument {
        Mock::given(method("GET"))
            .and(path("/documents/1234/1-a.pdf"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Last-Modified", LAST_MODIFIED)
                    .set_body_bytes(b"%PDF-1.4".to_vec()),
            )
            .mount(server)
            .await;
        ListedDocument {
            url: format!("{}/documents/1234/1-a.pdf", server.uri()),
            month: 1,
            title: String::from("A区"),
        }
    }

    #[test]
    fn test_ensure_day_count() {
        assert!(ensure_day_count("2019-01-a", 17, 17).is_ok());
        assert!(matches!(
            ensure_day_count("2019-01-a", 17, 16),
            Err(MenuError::LayoutMismatch {
                days: 17,
                menus: 16,
                ..
            })
        ));
    }

    #[test]
    fn test_catalog() {
        let mut catalog = MenuCatalog::default();
        catalog.extend(&vec![
            vec![String::from("パン"), String::from("ぎゅうにゅう")],
            vec![String::from("ごはん"), String::from("ぎゅうにゅう")],
        ]);
        assert_eq!(catalog.len(), 3);
        assert_eq!(
            catalog.iter().collect::<Vec<_>>(),
            vec!["ぎゅうにゅう", "ごはん", "パン"]
        );
    }

    #[tokio::test]
    async fn test_process_document() {
        let server = MockServer::start().await;
        let document = serve_pdf(&server).await;
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), january_grid(17));
        let mut catalog = MenuCatalog::default();

        let outcome = process(&ctx, &reqwest::Client::new(), &document, &mut catalog)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            DocumentOutcome::Merged(
                MenuMonth::new(2019, 1, "a"),
                MergeStats {
                    created: 17,
                    ..MergeStats::default()
                }
            )
        );
        assert_eq!(catalog.len(), 18);

        let data = dir.path().join("data");
        assert!(data.join("2019-01-a.pdf").exists());
        assert!(data.join("2019-01-a.csv").exists());
        let menus = read_menus(&data.join("2019-01-a.yml")).unwrap().unwrap();
        assert_eq!(menus[0], vec!["ごはん", "おかず1"]);

        let record = Record::load(&dir.path().join("record.yml")).unwrap();
        let entry = record.get(&document.url).unwrap();
        assert_eq!(entry.last_modified.as_deref(), Some(LAST_MODIFIED));
        assert_eq!(
            entry.mirror.as_deref(),
            Some("http://hkwi.github.com/kcsl/data/2019-01-a.pdf")
        );

        let ics = std::fs::read_to_string(dir.path().join("a.ics")).unwrap();
        assert!(ics.contains("UID:2019-01-08@a\r\n"));
        assert!(ics.contains("DTSTAMP:20181220T010203Z\r\n"));
        assert!(ics.contains("SUMMARY:ごはん\\,おかず17\r\n"));
    }

    #[tokio::test]
    async fn test_process_layout_mismatch() {
        let server = MockServer::start().await;
        let document = serve_pdf(&server).await;
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), january_grid(16));

        let err = process(
            &ctx,
            &reqwest::Client::new(),
            &document,
            &mut MenuCatalog::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MenuError>(),
            Some(MenuError::LayoutMismatch {
                days: 17,
                menus: 16,
                ..
            })
        ));
        // the menu file is left behind for correction by hand
        assert!(dir.path().join("data/2019-01-a.yml").exists());
        assert!(!dir.path().join("a.ics").exists());
    }

    #[tokio::test]
    async fn test_reapply_calendar() {
        let server = MockServer::start().await;
        let document = serve_pdf(&server).await;
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), january_grid(17));
        process(
            &ctx,
            &reqwest::Client::new(),
            &document,
            &mut MenuCatalog::default(),
        )
        .await
        .unwrap();

        let menu_file = dir.path().join("data/2019-01-a.yml");
        let mut menus = read_menus(&menu_file).unwrap().unwrap();
        menus[0] = vec![String::from("パン"), String::from("シチュー")];
        write_menus(&menu_file, &menus).unwrap();

        let ics_path = dir.path().join("a.ics");
        let applied = reapply_calendar(&ctx, &ics_path).unwrap();
        assert_eq!(
            applied,
            vec![(
                MenuMonth::new(2019, 1, "a"),
                MergeStats {
                    updated: 1,
                    unchanged: 16,
                    ..MergeStats::default()
                }
            )]
        );
        let ics = std::fs::read_to_string(&ics_path).unwrap();
        assert!(ics.contains("SUMMARY:パン\\,シチュー\r\n"));
    }
}
