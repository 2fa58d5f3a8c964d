// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Storage markup for the report page.
//!
//! The page is XHTML in the document platform's storage format. Charts are
//! referenced as attachments by file name; a chart without an uploaded image
//! is replaced by a warning panel so the gap is visible on the page.

use std::{collections::BTreeMap, fmt::Write as _};

use chrono::NaiveDate;

use crate::{
    chart::escape_xml,
    model::Status,
    report::{ActionRow, ChartDataset, ChartKind, IssueRow, ReportModel}
};

/// Colour of a status lozenge.
pub fn status_color(status: Status) -> &'static str {
    match status {
        Status::Done => "#006644",
        Status::InProgress => "#FF8B00",
        Status::ToDo => "#42526E",
        Status::Reviewing => "#0052CC",
        Status::NotNeeded => "#57D9A3"
    }
}

/// Colour band of the completion percentage.
pub fn percent_color(percent: f64) -> &'static str {
    if percent >= 90.0 {
        "#1f7a1f"
    } else if percent >= 75.0 {
        "#d47500"
    } else {
        "#c62828"
    }
}

/// Shortens `text` to at most `max_chars` characters at a word boundary and
/// appends an ellipsis when anything was cut.
pub fn truncate_summary(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_owned();
    }
    let budget = max_chars.saturating_sub(1);
    let cut: String = text.chars().take(budget).collect();
    let next_is_space = text.chars().nth(budget).is_some_and(char::is_whitespace);
    let kept = if next_is_space {
        cut.as_str()
    } else {
        match cut.rfind(char::is_whitespace) {
            Some(boundary) if boundary > 0 => &cut[..boundary],
            _ => cut.as_str()
        }
    };
    format!("{}…", kept.trim_end())
}

/// Renders the page body.
///
/// `images` maps a chart file stem to the attachment holding its image;
/// charts missing from it get a placeholder.
pub fn render_page(model: &ReportModel, summary_max_chars: usize, images: &BTreeMap<&str, String>) -> String {
    let page = Page {
        model,
        summary_max_chars,
        images
    };
    let mut out = String::with_capacity(16 * 1024);
    page.overview(&mut out);
    page.progress_charts(&mut out);
    page.team(&mut out);
    page.top_completed(&mut out);
    page.tech_debt(&mut out);
    page.quality(&mut out);
    page.engineering(&mut out);
    page.action_items(&mut out);
    out
}

struct Page<'a> {
    model:             &'a ReportModel,
    summary_max_chars: usize,
    images:            &'a BTreeMap<&'a str, String>
}

impl Page<'_> {
    fn issue_link(&self, key: &str) -> String {
        format!(
            "<a href=\"{}/browse/{key}\">{key}</a>",
            escape_xml(&self.model.links.tracker_base),
            key = escape_xml(key)
        )
    }

    fn summary(&self, text: &str) -> String {
        escape_xml(&truncate_summary(text, self.summary_max_chars)).into_owned()
    }

    fn overview(&self, out: &mut String) {
        let sprint = &self.model.sprint;
        let overview = &self.model.overview;
        let board = format!(
            "<a href=\"{}/secure/RapidBoard.jspa?rapidView={}\">{}</a>",
            escape_xml(&self.model.links.tracker_base),
            self.model.links.board_id,
            escape_xml(&sprint.board)
        );
        out.push_str("<h1>Sprint Overview</h1>\n<table><tbody>\n");
        row(out, "Sprint", &escape_xml(&sprint.name));
        row(out, "Board", &board);
        row(
            out,
            "Planned",
            &format!(
                "{} to {} ({} working days)",
                date(sprint.planned_start),
                date(sprint.planned_end),
                sprint.planned_working_days
            )
        );
        row(
            out,
            "Actual",
            &format!(
                "{} to {} ({} working days)",
                date(sprint.actual_start),
                date(sprint.actual_end),
                sprint.actual_working_days
            )
        );
        row(out, "Committed SP", &points(overview.committed));
        row(out, "Completed SP", &points(overview.completed));
        row(
            out,
            "% Complete",
            &format!(
                "<span style=\"color: {}\"><strong>{:.0}%</strong></span>",
                percent_color(overview.percent_complete),
                overview.percent_complete
            )
        );
        row(out, "Scope change", &format!("{} issue(s) added", overview.scope_change));
        row(out, "Not completed", &overview.not_completed.to_string());
        row(out, "Carry-over", &overview.carry_over.to_string());
        out.push_str("</tbody></table>\n");
    }

    fn progress_charts(&self, out: &mut String) {
        out.push_str("<h2>Burndown &amp; Velocity</h2>\n");
        let burndown = self
            .model
            .charts
            .iter()
            .find(|chart| chart.kind == ChartKind::Burndown);
        match burndown {
            Some(chart) => self.chart(out, chart),
            None => placeholder(out, "Burndown is not available: the sprint has no working days.")
        }
        for chart in self.model.charts.iter().filter(|chart| chart.kind == ChartKind::Velocity) {
            self.chart(out, chart);
        }
    }

    fn chart(&self, out: &mut String, chart: &ChartDataset) {
        match self.images.get(chart.file_stem()) {
            Some(file_name) => {
                let _ = writeln!(
                    out,
                    "<p><ac:image ac:alt=\"{}\"><ri:attachment ri:filename=\"{}\" /></ac:image></p>",
                    escape_xml(&chart.title),
                    escape_xml(file_name)
                );
            }
            None => placeholder(out, &format!("The {} chart could not be attached.", chart.title))
        }
    }

    fn team(&self, out: &mut String) {
        let overview = &self.model.overview;
        out.push_str("<h2>Team</h2>\n");
        let members = if self.model.team_members.is_empty() {
            "No assignees".to_owned()
        } else {
            self.model
                .team_members
                .iter()
                .map(|name| escape_xml(name).into_owned())
                .collect::<Vec<_>>()
                .join(", ")
        };
        let _ = writeln!(
            out,
            "<p>{members}</p>\n<p>Committed SP per member: <strong>{}</strong>, completed SP per member: <strong>{}</strong></p>",
            points(overview.committed_per_member),
            points(overview.completed_per_member)
        );
        if self.model.per_person.is_empty() {
            out.push_str("<p><em>No completed work by team members.</em></p>\n");
            return;
        }
        out.push_str("<table><tbody>\n<tr><th>Assignee</th><th>Completed issues</th><th>Completed SP</th><th>Average SP</th></tr>\n");
        for person in &self.model.per_person {
            let _ = writeln!(
                out,
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape_xml(&person.name),
                person.completed_issues,
                points(person.completed_points),
                points(person.average)
            );
        }
        out.push_str("</tbody></table>\n");
    }

    fn top_completed(&self, out: &mut String) {
        out.push_str("<h2>Top Completed</h2>\n");
        self.issue_table(out, &self.model.top_completed, "No issues were completed.");
    }

    fn tech_debt(&self, out: &mut String) {
        let _ = writeln!(out, "<h2>Tech Debt ({})</h2>", self.issue_link(&self.model.links.tech_debt_epic));
        self.issue_table(out, &self.model.tech_debt, "No tech-debt work was completed.");
    }

    fn quality(&self, out: &mut String) {
        let quality = &self.model.quality;
        out.push_str("<h2>Quality Checks</h2>\n<h3>Carry-over</h3>\n");
        self.issue_table(out, &quality.carry_over, "No carry-over issues.");
        out.push_str("<h3>Without epic</h3>\n");
        self.issue_table(out, &quality.without_epic, "Every issue has an epic.");
        out.push_str("<h3>Without story points</h3>\n");
        self.issue_table(out, &quality.without_points, "Every issue is estimated.");
    }

    fn engineering(&self, out: &mut String) {
        out.push_str("<h2>Engineering Metrics</h2>\n");
        let metrics: Vec<&ChartDataset> = self
            .model
            .charts
            .iter()
            .filter(|chart| matches!(chart.kind, ChartKind::Metric(_)))
            .collect();
        if metrics.is_empty() {
            placeholder(out, "Engineering metrics are not available for this sprint.");
            return;
        }
        for chart in metrics {
            let _ = writeln!(out, "<h3>{}</h3>", escape_xml(&chart.title));
            self.chart(out, chart);
        }
    }

    fn action_items(&self, out: &mut String) {
        let items = &self.model.action_items;
        let _ = writeln!(
            out,
            "<h2>Retro Action Items ({})</h2>\n<h3>Open</h3>",
            self.issue_link(&self.model.links.retro_epic)
        );
        self.action_table(out, &items.open, "No open action items.");
        out.push_str("<h3>Done</h3>\n");
        self.action_table(out, &items.done, "No completed action items.");
    }

    fn issue_table(&self, out: &mut String, rows: &[IssueRow], empty: &str) {
        if rows.is_empty() {
            let _ = writeln!(out, "<p><em>{}</em></p>", escape_xml(empty));
            return;
        }
        out.push_str(
            "<table><tbody>\n<tr><th>Key</th><th>Summary</th><th>Status</th><th>Assignee</th><th>SP</th></tr>\n"
        );
        for issue in rows {
            let _ = writeln!(
                out,
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                self.issue_link(&issue.key),
                self.summary(&issue.summary),
                lozenge(issue.status, &issue.status_name),
                assignee(issue.assignee.as_deref()),
                issue.points.map_or_else(|| "-".to_owned(), points)
            );
        }
        out.push_str("</tbody></table>\n");
    }

    fn action_table(&self, out: &mut String, rows: &[ActionRow], empty: &str) {
        if rows.is_empty() {
            let _ = writeln!(out, "<p><em>{}</em></p>", escape_xml(empty));
            return;
        }
        out.push_str(
            "<table><tbody>\n<tr><th>Key</th><th>Summary</th><th>Status</th><th>Assignee</th><th>Age (days)</th></tr>\n"
        );
        for item in rows {
            let _ = writeln!(
                out,
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                self.issue_link(&item.key),
                self.summary(&item.summary),
                lozenge(item.status, &item.status_name),
                assignee(item.assignee.as_deref()),
                item.age_days
            );
        }
        out.push_str("</tbody></table>\n");
    }
}

fn row(out: &mut String, label: &str, value: &str) {
    let _ = writeln!(out, "<tr><th>{label}</th><td>{value}</td></tr>");
}

fn placeholder(out: &mut String, message: &str) {
    let _ = writeln!(
        out,
        "<ac:structured-macro ac:name=\"warning\"><ac:rich-text-body><p>{}</p></ac:rich-text-body></ac:structured-macro>",
        escape_xml(message)
    );
}

fn lozenge(status: Status, name: &str) -> String {
    let label = if name.is_empty() { status.label() } else { name };
    format!(
        "<span style=\"color: {}\"><strong>{}</strong></span>",
        status_color(status),
        escape_xml(label)
    )
}

fn assignee(name: Option<&str>) -> String {
    name.map_or_else(|| "Unassigned".to_owned(), |name| escape_xml(name).into_owned())
}

fn date(value: Option<NaiveDate>) -> String {
    value.map_or_else(|| "n/a".to_owned(), |day| day.format("%d %b %Y").to_string())
}

fn points(value: f64) -> String {
    if (value - value.round()).abs() < 1e-9 {
        format!("{value:.0}")
    } else {
        format!("{value:.1}")
    }
}
