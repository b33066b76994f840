use sqlledger_db::{MigrationState, RunReport, StatusReport};

const WIDTH: usize = 70;

fn frame(title: &str, lines: &[String]) -> String {
    let inner = WIDTH - 4; // "│ " + " │"
    let title_dashes = WIDTH.saturating_sub(title.chars().count() + 7); // "╭─── " + " " + "╮"
    let mut out = format!("╭─── {title} {}╮\n", "─".repeat(title_dashes));
    for line in lines {
        out.push_str(&format!("│ {:<inner$} │\n", truncate(line, inner)));
    }
    out.push_str(&format!("╰{}╯", "─".repeat(WIDTH - 2)));
    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut cut: String = s.chars().take(max.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

pub fn render_run_report(report: &RunReport) -> String {
    let mut lines = vec![
        format!("Migrations  {}", report.migrations.len()),
        format!("Applied     {}", report.applied.len()),
        format!("Rolled back {}", report.rolled_back.len()),
        format!("Unchanged   {}", report.unchanged.len()),
    ];
    if !report.rolled_back.is_empty() || !report.applied.is_empty() {
        lines.push("─".repeat(WIDTH - 4));
    }
    lines.extend(report.rolled_back.iter().map(|id| format!("  down  {id}")));
    lines.extend(report.applied.iter().map(|id| format!("  up    {id}")));
    frame("sqlledger up", &lines)
}

pub fn render_status(status: &StatusReport) -> String {
    let mut lines = vec![format!("Schema      {}", status.schema)];
    if status.migrations.is_empty() {
        lines.push("no migrations".to_string());
    }
    for entry in &status.migrations {
        let applied_at = entry
            .applied_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        lines.push(format!(
            "{:<12} {:<34} {applied_at}",
            state_label(entry.state),
            entry.id
        ));
    }
    frame("sqlledger status", &lines)
}

fn state_label(state: MigrationState) -> &'static str {
    match state {
        MigrationState::Pending => "pending",
        MigrationState::Applied => "applied",
        MigrationState::Drifted => "DRIFTED",
        MigrationState::OutOfOrder => "OUT OF ORDER",
        MigrationState::Orphaned => "orphaned",
        MigrationState::Corrupt => "CORRUPT",
    }
}

pub fn print_run_report(report: &RunReport) {
    println!("{}", render_run_report(report));
}

pub fn print_status(status: &StatusReport) {
    println!("{}", render_status(status));
}
