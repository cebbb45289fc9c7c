use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Cell, CellAlignment, ContentArrangement, Table};
use is_terminal::IsTerminal;
use owo_colors::OwoColorize;

use crate::lifecycle::{InstanceInfo, InstanceState, PortRange};
use crate::projects::Project;

fn base_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn print_indented(table: &Table) {
    for line in table.to_string().lines() {
        println!("  {}", line);
    }
}

fn state_text(state: InstanceState, use_color: bool) -> String {
    if !use_color {
        return format!("\u{25cf} {}", state);
    }
    match state {
        InstanceState::Running => format!("{} {}", "\u{25cf}".green(), "running".green()),
        InstanceState::Allocating | InstanceState::Spawning => {
            format!("{} {}", "\u{25cf}".yellow(), state.as_str().yellow())
        }
        InstanceState::Stopping => format!("{} {}", "\u{25cf}".yellow(), "stopping".yellow()),
        InstanceState::Terminated => format!("{} {}", "\u{25cf}".red(), "terminated".red()),
        InstanceState::Idle => format!("{} {}", "\u{25cf}".dimmed(), "idle".dimmed()),
    }
}

/// Table of projects, their paths and (when known) their instance state.
pub fn projects_table(projects: &[(Project, InstanceState)], use_color: bool) -> Table {
    let mut table = base_table();
    table.set_header(vec![
        Cell::new("Project").set_alignment(CellAlignment::Left),
        Cell::new("Name").set_alignment(CellAlignment::Left),
        Cell::new("Path").set_alignment(CellAlignment::Left),
        Cell::new("State").set_alignment(CellAlignment::Center),
    ]);
    for (project, state) in projects {
        table.add_row(vec![
            Cell::new(&project.id),
            Cell::new(&project.name),
            Cell::new(project.path.display()),
            Cell::new(state_text(*state, use_color)),
        ]);
    }
    table
}

pub fn print_projects(projects: &[(Project, InstanceState)]) {
    if projects.is_empty() {
        println!("No projects configured.");
        println!("Add a [projects.<id>] table to projdeck.toml.");
        return;
    }
    let use_color = std::io::stdout().is_terminal();
    println!();
    print_indented(&projects_table(projects, use_color));
    println!();
}

/// Banner printed when `serve` is up.
pub fn print_launcher_summary(url: &str, projects: &[Project], ports: &PortRange) {
    let use_color = std::io::stdout().is_terminal();

    println!();
    if use_color {
        println!("  {} {}", "projdeck".bold(), url.cyan());
    } else {
        println!("  projdeck {}", url);
    }
    println!(
        "    Instances: up to {} (backend ports from {}, frontend ports from {})",
        ports.max_instances, ports.backend_start, ports.frontend_start
    );
    println!("    Events:    {}/ws", url.replacen("http", "ws", 1));

    let rows: Vec<(Project, InstanceState)> = projects
        .iter()
        .cloned()
        .map(|p| (p, InstanceState::Idle))
        .collect();
    if !rows.is_empty() {
        println!();
        print_indented(&projects_table(&rows, use_color));
    }

    print_stop_hint(use_color);
}

/// Banner printed when `open` has a running instance.
pub fn print_instance_summary(project: &Project, info: &InstanceInfo) {
    let use_color = std::io::stdout().is_terminal();

    println!();
    if use_color {
        println!(
            "  {} {} ({})",
            "projdeck".bold(),
            project.name.cyan(),
            project.id.dimmed()
        );
    } else {
        println!("  projdeck {} ({})", project.name, project.id);
    }
    println!();

    let mut table = base_table();
    table.set_header(vec!["Backend", "Frontend", "PID", "State"]);
    table.add_row(vec![
        Cell::new(info.backend_url()),
        Cell::new(format!("http://localhost:{}", info.frontend_port)),
        Cell::new(info.pid),
        Cell::new(state_text(info.state, use_color)),
    ]);
    print_indented(&table);

    print_stop_hint(use_color);
}

fn print_stop_hint(use_color: bool) {
    println!();
    if use_color {
        println!("  Press {} to stop", "Ctrl+C".bold());
    } else {
        println!("  Press Ctrl+C to stop");
    }
    println!();
}
