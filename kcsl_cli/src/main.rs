use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use kcsl_core::{
    config::Config,
    holidays::HolidaySet,
    menu_client,
    pipeline::{self, Context, DocumentOutcome, MenuCatalog},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
pub struct Arguments {
    /// re-apply the menu files behind these calendars instead of crawling
    pub calendars: Vec<PathBuf>,
    /// TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// output directory, overrides the configuration
    #[arg(long)]
    pub docs_dir: Option<PathBuf>,
    /// do not fetch the public holiday list
    #[arg(long)]
    pub offline_holidays: bool,
}

impl Arguments {
    fn config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        if let Some(docs_dir) = &self.docs_dir {
            config.docs_dir = docs_dir.clone();
        }
        if self.offline_holidays {
            config.holiday_csv_url = None;
        }
        Ok(config)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Arguments::parse();
    let config = args.config()?;
    let client = menu_client::build_client(&config.user_agent)?;
    let holidays = HolidaySet::load(&client, config.holiday_csv_url.as_deref()).await?;
    let ctx = Context::from_config(config, holidays)?;
    let mut catalog = MenuCatalog::default();

    if args.calendars.is_empty() {
        let documents = menu_client::discover(&client, &ctx.config.listing_url).await?;
        for document in &documents {
            if let DocumentOutcome::Merged(menu_month, _) =
                pipeline::process(&ctx, &client, document, &mut catalog).await?
            {
                info!(document = %menu_month, "calendar updated");
            }
        }
    } else {
        for calendar in &args.calendars {
            pipeline::reapply_calendar(&ctx, calendar)?;
        }
    }

    for item in catalog.iter() {
        println!("{item}");
    }
    Ok(())
}
