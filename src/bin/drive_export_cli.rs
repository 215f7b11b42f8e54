//! drive-export CLI - browse Google Drive / OneDrive and export selections as zip
//!
//! Usage:
//!   drive-export ls [--section recent] [--drive ID] [--path A/B]   List a location
//!   drive-export drives                                           List shared drives
//!   drive-export export --path A --select x.txt --select B        Export a selection
//!
//! The access token comes from `--token` or `DRIVE_EXPORT_TOKEN`.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use drive_export::config::{load_config, load_config_from};
use drive_export::file_model::format_size;
use drive_export::navigation::{Navigator, Section};
use drive_export::providers::{DriveProvider, ProviderType};
use drive_export::session::Session;

#[derive(Parser)]
#[command(
    name = "drive-export",
    about = "Browse Google Drive and OneDrive, export selections as zip archives",
    version
)]
struct Cli {
    /// Provider: google or microsoft
    #[arg(long, short, global = true, default_value = "google", value_parser = parse_provider)]
    provider: ProviderType,

    /// OAuth access token
    #[arg(long, global = true, env = "DRIVE_EXPORT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Config file (default: <config dir>/drive-export/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the files at a location
    Ls {
        #[command(flatten)]
        location: Location,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// List shared drives (Google only)
    Drives,
    /// Export selected entries of a location as <label>.zip
    Export {
        #[command(flatten)]
        location: Location,
        /// Name of an entry to include (repeatable)
        #[arg(long = "select")]
        select: Vec<String>,
        /// Include every entry of the location
        #[arg(long)]
        all: bool,
        /// Archive name (default: current folder name)
        #[arg(long)]
        label: Option<String>,
        /// Output directory
        #[arg(long, default_value = ".")]
        out: PathBuf,
        /// Concurrent downloads (1-8)
        #[arg(long)]
        parallel: Option<usize>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SectionArg {
    MyDrive,
    SharedWithMe,
    Recent,
}

impl From<SectionArg> for Section {
    fn from(section: SectionArg) -> Self {
        match section {
            SectionArg::MyDrive => Section::MyDrive,
            SectionArg::SharedWithMe => Section::SharedWithMe,
            SectionArg::Recent => Section::Recent,
        }
    }
}

#[derive(Args)]
struct Location {
    /// Section to start from
    #[arg(long, value_enum, default_value = "my-drive")]
    section: SectionArg,
    /// Shared drive id or name (overrides --section)
    #[arg(long)]
    drive: Option<String>,
    /// Folder path below the section root, by names (A/B/C)
    #[arg(long)]
    path: Option<String>,
}

fn parse_provider(value: &str) -> Result<ProviderType, String> {
    value.parse().map_err(|e: drive_export::providers::ProviderError| e.to_string())
}

/// Walk to `location` and load its listing
async fn navigate(provider: &dyn DriveProvider, location: &Location) -> Result<Navigator> {
    let mut nav = Navigator::new();

    match &location.drive {
        Some(wanted) => {
            let drives = provider
                .list_shared_drives()
                .await
                .context("Failed to list shared drives")?;
            match drives.iter().find(|d| &d.id == wanted || &d.name == wanted) {
                Some(drive) => nav.navigate_to_shared_drive(drive),
                None => nav.navigate_to_section(Section::SharedDrive(wanted.clone())),
            }
        }
        None => nav.navigate_to_section(location.section.into()),
    }
    nav.refresh(provider).await?;

    if let Some(path) = &location.path {
        for name in path.split('/').filter(|part| !part.is_empty()) {
            nav.navigate_into_named(name)?;
            nav.refresh(provider).await?;
        }
    }
    Ok(nav)
}

fn print_listing(nav: &Navigator) {
    let trail: Vec<&str> = nav.breadcrumb().iter().map(|c| c.name.as_str()).collect();
    println!("{}", trail.join(" / "));
    println!();

    for entry in nav.selection().listing() {
        let kind = if entry.is_folder() { "dir " } else { "file" };
        let modified = entry
            .modified_time()
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{} {:>10}  {:16}  {}", kind, format_size(entry.size()), modified, entry.name());
    }
}

fn progress_bar() -> Result<ProgressBar> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg} [{bar:30.cyan/blue}] {pos}/{len} files")
            .context("Invalid progress template")?
            .progress_chars("=> "),
    );
    pb.set_message("Downloading");
    Ok(pb)
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => load_config_from(path),
        None => load_config(),
    };
    if let Commands::Export { parallel: Some(parallel), .. } = &cli.command {
        config.max_parallel_downloads = *parallel;
    }

    let token = cli
        .token
        .context("No access token: pass --token or set DRIVE_EXPORT_TOKEN")?;
    let session = Session::new(cli.provider, token, config)?;
    let provider = session.provider();

    match cli.command {
        Commands::Ls { location, json } => {
            let nav = navigate(provider.as_ref(), &location).await?;
            if json {
                let summaries: Vec<_> = nav.selection().listing().iter().map(|e| e.summary()).collect();
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            } else {
                print_listing(&nav);
            }
        }
        Commands::Drives => {
            if !provider.supports_shared_drives() {
                bail!("{} has no shared drives", provider.display_name());
            }
            for drive in provider.list_shared_drives().await? {
                println!("{}  {}", drive.id, drive.name);
            }
        }
        Commands::Export {
            location,
            select,
            all,
            label,
            out,
            ..
        } => {
            let mut nav = navigate(provider.as_ref(), &location).await?;

            if all {
                nav.selection_mut().select_all();
            }
            for name in &select {
                let id = nav
                    .selection()
                    .listing()
                    .iter()
                    .find(|e| e.name() == name.as_str())
                    .map(|e| e.id().to_string())
                    .with_context(|| format!("No entry named {} here", name))?;
                if !nav.selection().is_selected(&id) {
                    nav.selection_mut().toggle(&id);
                }
            }
            if nav.selection().is_empty() {
                bail!("Nothing selected: use --select NAME or --all");
            }

            let label = label.unwrap_or_else(|| nav.state().folder_name.clone());
            let cancel = CancellationToken::new();
            let on_ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_ctrl_c.cancel();
                }
            });

            let pb = progress_bar()?;
            let bar = pb.clone();
            let selected = nav.selection().selected_entries();
            let result = session
                .export(&selected, &label, nav.drive_scope(), cancel, move |progress| {
                    bar.set_length(progress.total as u64);
                    bar.set_position(progress.current as u64);
                })
                .await;
            pb.finish_and_clear();
            let archive = result?;

            tokio::fs::create_dir_all(&out)
                .await
                .with_context(|| format!("Failed to create {}", out.display()))?;
            let target = out.join(&archive.file_name);
            tokio::fs::write(&target, &archive.bytes)
                .await
                .with_context(|| format!("Failed to write {}", target.display()))?;

            let report = &archive.report;
            println!(
                "Wrote {} ({}, {}/{} files)",
                target.display(),
                format_size(Some(archive.bytes.len() as u64)),
                report.completed,
                report.total
            );
            for skipped in &report.skipped {
                println!("  skipped {}: {}", skipped.path, skipped.reason);
            }
            for folder in &report.empty_folders {
                println!("  empty folder {}", folder);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    run(Cli::parse()).await
}
