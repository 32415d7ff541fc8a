use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use colored::Colorize;
use flawless_format::{FileMapEncoding, FileStorage};
use flawless_path::from_host_path;
use flawless_repo::{
    FlawlessConfig, GcReport, LocalRepository, ReadonlyRepository, Repository, RepositoryLayout,
};
use flawless_store::MARKER_DIR;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let start = match cli.repo {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    match cli.command {
        Command::Init(args) => cmd_init(&start, args),
        Command::Status(_) => cmd_status(&open(&start, false)?),
        Command::Commit(args) => cmd_commit(&open(&start, false)?, args).await,
        Command::Log(args) => cmd_log(&open(&start, true)?, args),
        Command::Show(args) => cmd_show(&open(&start, true)?, args).await,
        Command::Cat(args) => cmd_cat(&open(&start, true)?, args).await,
        Command::Gc(args) => cmd_gc(&open(&start, false)?, args),
        Command::Verify(_) => cmd_verify(&open(&start, true)?),
    }
}

fn open(start: &Path, readonly: bool) -> anyhow::Result<LocalRepository> {
    let start = start
        .canonicalize()
        .with_context(|| format!("cannot access {}", start.display()))?;
    let layout = RepositoryLayout::discover(&start)
        .with_context(|| format!("not a flawless repository: {}", start.display()))?;
    let config = FlawlessConfig::load(&layout.config_file())?;
    let repo = if readonly {
        LocalRepository::open_readonly(layout, config)?
    } else {
        LocalRepository::open(layout, config)?
    };
    let head = repo.latest_commit_id()?;
    debug!(root = %start.display(), readonly, head, "opened repository");
    Ok(repo)
}

fn repo_root(repo: &LocalRepository) -> anyhow::Result<PathBuf> {
    let layout = repo.layout().context("repository has no working directory")?;
    Ok(layout.root().canonicalize()?)
}

/// Work Path of `host` inside `root`.
fn work_path(root: &Path, host: &Path) -> anyhow::Result<String> {
    let host_str = host
        .to_str()
        .with_context(|| format!("{} is not valid UTF-8", host.display()))?;
    let root_str = root
        .to_str()
        .with_context(|| format!("{} is not valid UTF-8", root.display()))?;
    Ok(from_host_path(host_str, root_str)?)
}

/// Every regular file under `path`, skipping the marker directory.
fn files_under(path: &Path) -> impl Iterator<Item = walkdir::Result<walkdir::DirEntry>> {
    WalkDir::new(path)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.file_name() != MARKER_DIR)
        .filter(|e| e.as_ref().map_or(true, |e| e.file_type().is_file()))
}

fn cmd_init(start: &Path, args: InitArgs) -> anyhow::Result<()> {
    let path = args.path.unwrap_or_else(|| start.to_path_buf());
    std::fs::create_dir_all(&path)?;
    let mut config = FlawlessConfig::default();
    if args.json_file_map {
        config.repository.file_map_encoding = FileMapEncoding::Json;
    }
    LocalRepository::init(RepositoryLayout::new(&path), config)?;
    println!(
        "{} Initialized empty Flawless repository in {}",
        "✓".green().bold(),
        path.display().to_string().bold()
    );
    Ok(())
}

fn cmd_status(repo: &LocalRepository) -> anyhow::Result<()> {
    let root = repo_root(repo)?;
    let ws = repo.workspace()?;
    let mut on_disk = BTreeSet::new();
    for entry in files_under(&root) {
        let entry = entry?;
        let path = work_path(&root, entry.path())?;
        ws.stage(&path, std::fs::read(entry.path())?)?;
        on_disk.insert(path);
    }

    let head = repo.latest_commit_id()?;
    if head == 0 {
        println!("No commits yet.");
    } else {
        println!("On commit {}", format!("#{head}").yellow().bold());
        for info in repo.read_manifest(head)?.iter() {
            if !on_disk.contains(info.path.as_str()) {
                ws.remove(info.path.as_str())?;
            }
        }
    }

    let status = repo.status()?;
    if status.is_clean() {
        println!("\nWorking directory clean.");
        return Ok(());
    }
    println!();
    for path in &status.added {
        println!("  {} {}", "added:   ".green(), path);
    }
    for path in &status.modified {
        println!("  {} {}", "modified:".yellow(), path);
    }
    for path in &status.removed {
        println!("  {} {}", "removed: ".red(), path);
    }
    Ok(())
}

async fn cmd_commit(repo: &LocalRepository, args: CommitArgs) -> anyhow::Result<()> {
    let root = repo_root(repo)?;
    let ws = repo.workspace()?;
    for path in &args.paths {
        let host = path
            .canonicalize()
            .with_context(|| format!("cannot read {}", path.display()))?;
        for entry in files_under(&host) {
            let entry = entry?;
            let work = work_path(&root, entry.path())?;
            ws.stage(&work, std::fs::read(entry.path())?)?;
            println!("  {} {}", "staged:".green(), work);
        }
    }
    for path in &args.remove {
        ws.remove(path)?;
        println!("  {} {}", "removed:".red(), path);
    }
    if let Some(message) = args.message {
        ws.set_message(message)?;
    }
    if ws.message()?.trim().is_empty() {
        bail!("a commit message is required (-m)");
    }

    let commit = tokio::select! {
        result = repo.submit_workspace_async() => result?,
        _ = tokio::signal::ctrl_c() => bail!("interrupted; nothing was committed"),
    };
    info!(commit = commit.id, depot = %commit.depot(), "committed workspace");
    println!(
        "{} Committed {} {}",
        "✓".green().bold(),
        format!("#{}", commit.id).yellow(),
        commit.depot().short_hex().dimmed()
    );
    println!("  {}", commit.summary());
    Ok(())
}

fn cmd_log(repo: &LocalRepository, args: LogArgs) -> anyhow::Result<()> {
    let commits: Vec<_> = repo.commits()?.collect();
    if commits.is_empty() {
        println!("No commits yet.");
        return Ok(());
    }
    for commit in commits.iter().rev().take(args.limit.unwrap_or(usize::MAX)) {
        if args.oneline {
            println!(
                "{} {} {}",
                format!("#{}", commit.id).yellow(),
                commit.depot().short_hex().dimmed(),
                commit.summary()
            );
            continue;
        }
        println!(
            "{}  {}",
            format!("commit #{}", commit.id).yellow().bold(),
            commit.depot().to_string().dimmed()
        );
        println!("Author: {}", commit.author);
        println!("Date:   {}", commit.time.format("%Y-%m-%d %H:%M:%S%.3f UTC"));
        if !commit.label.is_standalone() {
            let deps: Vec<String> = commit
                .label
                .dependencies
                .iter()
                .map(|d| d.short_hex())
                .collect();
            println!("Uses:   {}", deps.join(", ").dimmed());
        }
        println!();
        for line in commit.message.lines() {
            println!("    {line}");
        }
        println!();
    }
    Ok(())
}

async fn cmd_show(repo: &LocalRepository, args: ShowArgs) -> anyhow::Result<()> {
    let commit = repo.require_commit(args.id)?;
    let manifest = repo.read_manifest_async(args.id).await?;
    println!(
        "{}  {}",
        format!("commit #{}", commit.id).yellow().bold(),
        commit.depot().to_string().dimmed()
    );
    if let Some(parent) = commit.parent_id() {
        println!("Parent: #{parent}");
    }
    println!("Author: {}", commit.author);
    println!("\n    {}\n", commit.summary());
    println!("{} files, {} bytes", manifest.len(), manifest.total_size());
    for info in manifest.iter() {
        let location = match info.storage {
            FileStorage::Inline { .. } => "inline".green().to_string(),
            FileStorage::Dependency { depot } => format!("in {}", depot.short_hex()).dimmed().to_string(),
        };
        println!(
            "  {:>10}  {}  {}  {}",
            info.size,
            info.hash.short_hex().dimmed(),
            info.path,
            location
        );
    }
    Ok(())
}

async fn cmd_cat(repo: &LocalRepository, args: CatArgs) -> anyhow::Result<()> {
    let bytes = repo.read_file_async(args.id, &args.path).await?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&bytes)?;
    stdout.flush()?;
    Ok(())
}

fn cmd_gc(repo: &LocalRepository, args: GcArgs) -> anyhow::Result<()> {
    let chart = repo.occupation_chart()?;
    // Each pass is one chart recomputation; a depot must miss all of them.
    let passes = chart.grace_syncs();
    if args.dry_run {
        for _ in 0..passes {
            repo.sync_occupation_chart()?;
        }
        let collectable = chart.collectable()?;
        if collectable.is_empty() {
            println!("Nothing to collect.");
        }
        for hash in collectable {
            println!("  {} {}", "would remove".yellow(), hash);
        }
        return Ok(());
    }

    let mut total = GcReport::default();
    for _ in 0..passes {
        let report = repo.collect_garbage()?;
        total.objects_removed += report.objects_removed;
        total.bytes_freed += report.bytes_freed;
        total.objects_retained = report.objects_retained;
    }
    info!(
        passes,
        removed = total.objects_removed,
        retained = total.objects_retained,
        bytes_freed = total.bytes_freed,
        "garbage collection finished"
    );
    println!(
        "{} GC: {} depots removed, {} bytes freed, {} retained",
        "✓".green(),
        total.objects_removed.to_string().bold(),
        total.bytes_freed,
        total.objects_retained
    );
    Ok(())
}

fn cmd_verify(repo: &LocalRepository) -> anyhow::Result<()> {
    let report = repo.verify()?;
    if report.is_ok() {
        println!(
            "{} {} commits and {} depots verified",
            "✓".green().bold(),
            report.commits_checked,
            report.depots_checked
        );
        return Ok(());
    }
    for problem in &report.problems {
        println!(
            "  {} commit #{} depot {}: {}",
            "✗".red().bold(),
            problem.commit,
            problem.depot.short_hex(),
            problem.message
        );
    }
    bail!("{} problems found", report.problems.len())
}
