use colored::*;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use civhelp::civitai::CivitaiClient;
use civhelp::download::DownloadOutcome;
use civhelp::duplicates::DuplicateReport;
use civhelp::versions::NewVersionInfo;

fn header(names: &[&str]) -> Vec<Cell> {
    names
        .iter()
        .map(|name| Cell::new(name).fg(Color::Cyan).add_attribute(Attribute::Bold))
        .collect()
}

fn new_table(names: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .set_header(header(names))
        .load_preset(comfy_table::presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// First ten characters of a digest; sidecar digests are not guaranteed ASCII
fn short_hash(hash: &str) -> String {
    hash.chars().take(10).collect()
}

pub fn display_outcome(outcome: &DownloadOutcome) {
    if outcome.success {
        println!("{}", outcome.message.bright_green());
    } else {
        println!("{}", outcome.message.red());
    }
    if let Some(warning) = &outcome.warning {
        println!("{}", warning.yellow());
    }
}

/// Prints one table per model type with duplicate groups
pub fn display_duplicates(report: &DuplicateReport) {
    if report.is_empty() {
        println!("{}", "No duplicate models found".yellow());
        return;
    }

    for (model_type, groups) in &report.groups {
        if groups.is_empty() {
            continue;
        }

        let mut table = new_table(&["#", "Hash", "File", "Remote Name", "Preview"]);
        for (i, group) in groups.iter().enumerate() {
            for entry in &group.entries {
                table.add_row(vec![
                    Cell::new(i + 1).set_alignment(CellAlignment::Center),
                    Cell::new(short_hash(&group.hash)).fg(Color::Magenta),
                    Cell::new(&entry.subpath).fg(Color::Green),
                    Cell::new(&entry.civitai_name).fg(Color::Yellow),
                    Cell::new(
                        entry
                            .preview
                            .as_ref()
                            .map(|p| p.display().to_string())
                            .unwrap_or_default(),
                    )
                    .fg(Color::DarkGrey),
                ]);
            }
        }

        println!("\n{}", model_type.to_string().bold());
        println!("{}", table);
    }

    println!("{}", "=".repeat(100).bright_black());
    println!(
        "{}",
        format!("Duplicate groups: {}", report.group_count()).bright_green()
    );
}

pub fn display_new_versions(found: &[NewVersionInfo], civitai: &CivitaiClient) {
    if found.is_empty() {
        println!("{}", "All models are up to date".bright_green());
        return;
    }

    let mut table = new_table(&["Type", "Model", "New Version", "Local File", "Download"]);
    for info in found {
        let page = civitai.model_page_url(&info.model_id);
        let download = info
            .download_url
            .clone()
            .unwrap_or_else(|| "no direct download".to_string());
        table.add_row(vec![
            Cell::new(info.model_type).set_alignment(CellAlignment::Center),
            Cell::new(format!("{}\n{}", info.model_name, page)).fg(Color::Green),
            Cell::new(format!("{} ({})", info.version_name, info.version_id)).fg(Color::Yellow),
            Cell::new(info.model_path.display()).fg(Color::DarkGrey),
            Cell::new(download).fg(Color::Blue),
        ]);
    }

    println!("\n{}", table);
    println!("{}", "=".repeat(100).bright_black());
    println!(
        "{}",
        format!("New versions: {}", found.len()).bright_green()
    );
}
