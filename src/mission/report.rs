//! 最终任务报告（纯文本）

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::core::AgentError;
use crate::mission::History;
use crate::tools::FINISH_MISSION;

pub const REPORTS_DIR_NAME: &str = "Reports";

/// 渲染报告正文；`generated_at` 为 `YYYY-mm-dd HH:MM:SS`
pub fn render_report(goal: &str, history: &History, generated_at: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "--- MISSION REPORT ---");
    let _ = writeln!(out, "{}\n", "=".repeat(35));
    let _ = writeln!(out, "Mission Goal: {goal}");
    let _ = writeln!(out, "Report Generated: {generated_at}\n");
    let _ = writeln!(out, "--- EXECUTION LOG ---");
    let _ = writeln!(out, "{}\n", "=".repeat(21));

    if history.is_empty() {
        let _ = writeln!(out, "No actions were executed during this mission.");
    }
    for (i, entry) in history.entries().iter().enumerate() {
        let _ = writeln!(out, "Step {}:", i + 1);
        let _ = writeln!(out, "{}", "-".repeat(10));
        let _ = writeln!(out, "  Action Command:\n    `{}`\n", entry.command);
        let _ = writeln!(out, "  Observation:");
        let _ = write!(out, "    {}", entry.observation.replace('\n', "\n    "));
        out.push_str("\n\n");
    }

    let _ = writeln!(out, "--- FINAL SUMMARY ---");
    let _ = writeln!(out, "{}\n", "=".repeat(21));
    let _ = writeln!(out, "{}", final_finding(history));
    out
}

/// 以 finish_mission 结束时取其观察文本，否则给出固定提示
pub fn final_finding(history: &History) -> &str {
    match history.last() {
        Some(entry) if entry.command == FINISH_MISSION => &entry.observation,
        _ => "Mission did not conclude with a `finish_mission` command.",
    }
}

/// 写入 `<results_root>/Reports/report_<YYYYmmdd_HHMMSS>.txt`；历史为空时不写，返回 None
pub fn write_report(
    results_root: &Path,
    goal: &str,
    history: &History,
) -> Result<Option<PathBuf>, AgentError> {
    if history.is_empty() {
        tracing::warn!("No actions were taken, cannot generate a report.");
        return Ok(None);
    }

    let dir = results_root.join(REPORTS_DIR_NAME);
    std::fs::create_dir_all(&dir)?;

    let now = Local::now();
    let path = dir.join(format!("report_{}.txt", now.format("%Y%m%d_%H%M%S")));
    let body = render_report(goal, history, &now.format("%Y-%m-%d %H:%M:%S").to_string());
    std::fs::write(&path, body)?;

    tracing::info!("Report generated at: {}", path.display());
    Ok(Some(path))
}
