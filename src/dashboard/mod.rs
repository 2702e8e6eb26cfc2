//! Static dashboard page generation.
//!
//! The rendered page is self-contained: it polls the status document, draws
//! the per-profile table, counts down to the next scheduled run, shows the
//! screenshot evidence gallery, and can request a manual run. It has no view
//! of in-progress runs -- only of the last published status document and the
//! artifacts already on disk.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use askama::Template;
use tracing::info;

use crate::config::DashboardSettings;

/// One screenshot in the gallery: the profile it documents and its
/// page-relative location.
#[derive(Debug)]
pub struct GalleryShot {
    pub user: String,
    pub href: String,
    source: PathBuf,
}

/// One run's screenshots within a day.
#[derive(Debug)]
pub struct GalleryRun {
    pub label: String,
    pub shots: Vec<GalleryShot>,
}

/// One day of the artifact tree, newest runs first.
#[derive(Debug)]
pub struct GalleryDay {
    pub date: String,
    pub runs: Vec<GalleryRun>,
}

#[derive(Template)]
#[template(path = "dashboard.html")]
struct DashboardPage<'a> {
    status_url: &'a str,
    poll_interval_secs: u64,
    trigger_time: &'a str,
    dispatch_url: &'a str,
    dispatch_event: &'a str,
    gallery: &'a [GalleryDay],
}

/// Walk the screenshot artifact tree (`<date>/run_<seq>/<profile>.png`) into
/// gallery entries, newest day first and newest run first within a day. A
/// missing tree is an empty gallery, not an error.
pub fn collect_gallery(screenshots_dir: &Path) -> Result<Vec<GalleryDay>> {
    let mut days = Vec::new();
    if !screenshots_dir.is_dir() {
        return Ok(days);
    }

    for day_entry in sorted_dirs(screenshots_dir)? {
        let date = day_entry
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let mut runs = Vec::new();
        for run_entry in sorted_dirs(&day_entry)? {
            let run_name = run_entry
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            let mut shots = Vec::new();
            for shot in read_entries(&run_entry)? {
                if shot.extension().and_then(|e| e.to_str()) != Some("png") {
                    continue;
                }
                let user = shot
                    .file_stem()
                    .and_then(|n| n.to_str())
                    .unwrap_or_default()
                    .to_string();
                shots.push(GalleryShot {
                    href: format!("screenshots/{date}/{run_name}/{user}.png"),
                    user,
                    source: shot,
                });
            }
            shots.sort_by(|a, b| a.user.cmp(&b.user));
            if !shots.is_empty() {
                runs.push(GalleryRun {
                    label: run_name.replace('_', " "),
                    shots,
                });
            }
        }
        // Newest run of the day on top.
        runs.reverse();
        if !runs.is_empty() {
            days.push(GalleryDay { date, runs });
        }
    }
    // Newest day on top; ISO dates order lexically.
    days.reverse();
    Ok(days)
}

fn read_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read {}", dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .collect();
    entries.sort();
    Ok(entries)
}

fn sorted_dirs(dir: &Path) -> Result<Vec<PathBuf>> {
    Ok(read_entries(dir)?.into_iter().filter(|p| p.is_dir()).collect())
}

/// Render the dashboard page to a string.
pub fn render(settings: &DashboardSettings, gallery: &[GalleryDay]) -> Result<String> {
    let page = DashboardPage {
        status_url: &settings.status_url,
        poll_interval_secs: settings.poll_interval_secs,
        trigger_time: &settings.trigger_time,
        dispatch_url: &settings.dispatch_url,
        dispatch_event: &settings.dispatch_event,
        gallery,
    };
    page.render().context("failed to render dashboard template")
}

/// Render and write `index.html` under the configured output directory,
/// copying the screenshot tree alongside it so the gallery links resolve.
pub fn generate(settings: &DashboardSettings, screenshots_dir: &Path) -> Result<PathBuf> {
    let gallery = collect_gallery(screenshots_dir)?;
    let html = render(settings, &gallery)?;

    std::fs::create_dir_all(&settings.out_dir).with_context(|| {
        format!(
            "failed to create dashboard directory {}",
            settings.out_dir.display()
        )
    })?;

    let mut copied = 0usize;
    for day in &gallery {
        for run in &day.runs {
            for shot in &run.shots {
                let dest = settings.out_dir.join(&shot.href);
                if let Some(parent) = dest.parent() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("failed to create {}", parent.display()))?;
                }
                std::fs::copy(&shot.source, &dest)
                    .with_context(|| format!("failed to copy {}", shot.source.display()))?;
                copied += 1;
            }
        }
    }

    let path = Path::new(&settings.out_dir).join("index.html");
    std::fs::write(&path, html)
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), screenshots = copied, "dashboard page generated");
    Ok(path)
}
