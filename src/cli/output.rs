use crate::core::config::{AppRule, RuleRepository};
use crate::daemon::report::Report;
use std::fmt::Write;

pub fn render_status(report: &Report) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "   hwsched status");

    match (report.daemon.running, report.daemon.pid) {
        (true, Some(pid)) => {
            let _ = writeln!(out, "Daemon: Running (pid {})\n", pid);
        }
        (true, None) => {
            let _ = writeln!(out, "Daemon: Running\n");
        }
        (false, _) => {
            let _ = writeln!(out, "Daemon: Not running\n");
        }
    }

    let _ = writeln!(
        out,
        "    Profile:    {}",
        report.last_applied_profile().unwrap_or("none")
    );
    if let Some(state) = &report.persisted {
        let _ = writeln!(out, "    Switches:   {}", state.switch_count);
        if let Some(decision) = &state.last_decision {
            let _ = writeln!(out, "    Last:       {}", decision);
        }
        if let Some(err) = &state.last_error {
            let _ = writeln!(out, "  ✗ Error:      {}", err);
        }
    }
    let _ = writeln!(out, "    Decision:   {}", report.decision);

    let s = &report.state;
    let _ = writeln!(out, "\nTelemetry");
    let _ = writeln!(out, "    Battery:    {}% ({})", s.battery_level, s.battery_status);
    let _ = writeln!(out, "    CPU:        {}°C, {:.1}% busy", s.cpu_temp_c, s.cpu_usage_pct);
    let _ = writeln!(out, "    GPU:        {}°C", s.gpu_temp_c);
    let _ = writeln!(out, "    Memory:     {:.1}%", s.memory_usage_pct);
    let _ = writeln!(out, "    Load:       {:.2}", s.load_average);
    let _ = writeln!(out, "    Clock:      {}", s.clock_time);
    if s.is_degraded() {
        let names: Vec<&str> = s.unavailable.iter().map(|u| u.as_str()).collect();
        let _ = writeln!(out, "  ✗ Defaults:   {}", names.join(", "));
    }

    let _ = writeln!(out, "\nMatched rules ({} processes)", report.running_apps.len());
    if report.matched.is_empty() {
        let _ = writeln!(out, "    none");
    }
    for rule in &report.matched {
        let _ = writeln!(out, "    {}", rule_line(rule));
    }
    out
}

pub fn render_test(report: &Report) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Decision: {}", report.decision);
    if report.would_switch() {
        let _ = writeln!(
            out,
            "Would apply {} (currently {})",
            report.decision.profile,
            report.last_applied_profile().unwrap_or("none")
        );
    } else {
        let _ = writeln!(out, "No change, {} already applied", report.decision.profile);
    }
    for rule in &report.matched {
        let _ = writeln!(out, "    {}", rule_line(rule));
    }
    out
}

fn rule_line(rule: &AppRule) -> String {
    match &rule.category {
        Some(category) => format!(
            "{:<16} priority {:>4} -> {} [{}]",
            rule.process_name, rule.priority, rule.profile, category
        ),
        None => format!(
            "{:<16} priority {:>4} -> {}",
            rule.process_name, rule.priority, rule.profile
        ),
    }
}

pub fn render_rules(rules: &RuleRepository) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Applications:");
    for rule in rules.apps() {
        let _ = writeln!(out, "    {}", rule_line(rule));
    }
    let _ = writeln!(out, "\nCategories:");
    for category in rules.categories() {
        let _ = writeln!(
            out,
            "    {:<16} -> {}",
            category.category, category.default_profile
        );
    }
    let windows = rules.schedule_windows();
    let _ = writeln!(out, "\nSchedule:");
    let _ = writeln!(out, "    sleep {}", windows.sleep);
    let _ = writeln!(out, "    work  {}", windows.work);
    out
}

pub fn render_rule(rule: &AppRule) -> String {
    rule_line(rule)
}

pub fn tail_lines(text: &str, n: usize) -> Vec<&str> {
    let lines: Vec<&str> = text.lines().collect();
    let skip = lines.len().saturating_sub(n);
    lines[skip..].to_vec()
}

pub fn print_success(message: &str) {
    println!(" ✓ {}", message);
}

pub fn print_error(message: &str) {
    eprintln!(" ✗ Error: {}", message);
}
