// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
//
// SPDX-License-Identifier: MIT

use std::collections::BTreeMap;

use chrono::{Duration, TimeZone, Utc};
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use sprint_retro::{
    Assignee, Board, Collection, EngineSettings, Issue, IssueKey, IssueType, Sprint, SprintRef, SprintState, Status,
    SvgChartRenderer, compute, parse_config, render
};

const CONFIG: &str = r"
tracker:
  base_url: https://tracker.example
documents:
  base_url: https://docs.example/wiki
  space_key: ENG
board_name: GVRE Board
sprint_prefix: GVRE
tech_debt_epic: GV-100
retro_epic: GV-200
time_zone: UTC
";

fn collection(issue_count: usize) -> Collection {
    let start = Utc.with_ymd_and_hms(2025, 9, 1, 9, 0, 0).single().unwrap_or_else(Utc::now);
    let end = start + Duration::days(11);
    let statuses = [Status::Done, Status::InProgress, Status::ToDo, Status::Reviewing, Status::NotNeeded];
    let issues = (0..issue_count)
        .map(|index| {
            let status = statuses[index % statuses.len()];
            Issue {
                key: IssueKey::new(format!("GV-{}", 1000 + index)),
                summary: format!("Implement feature number {index} with a reasonably long summary text"),
                issue_type: if index % 7 == 0 { IssueType::Bug } else { IssueType::Story },
                status,
                status_name: status.label().to_owned(),
                assignee: Some(Assignee {
                    account_id:   format!("user-{}", index % 9),
                    display_name: format!("Engineer {}", index % 9),
                    email:        None
                }),
                story_points: (index % 4 != 0).then(|| (index % 8) as f64),
                epic: (index % 5 != 0).then(|| if index % 3 == 0 { "GV-100" } else { "GV-1" }.to_owned()),
                sprint_history: (0..=(index % 3) as u64)
                    .map(|offset| SprintRef {
                        id:    12 - offset,
                        name:  format!("GVRE-{}", 12 - offset),
                        start: Some(start - Duration::days(14 * offset as i64))
                    })
                    .collect(),
                created: Some(start - Duration::days(3)),
                resolved: (status == Status::Done).then(|| start + Duration::days((index % 11) as i64)),
                added_during_sprint: index % 10 == 0
            }
        })
        .collect();
    Collection {
        board: Board {
            id:   3,
            name: "GVRE Board".to_owned()
        },
        sprint: Sprint {
            id:        12,
            name:      "GVRE-12".to_owned(),
            state:     SprintState::Closed,
            start:     Some(start),
            end:       Some(end),
            completed: Some(end),
            activated: None
        },
        issues,
        metrics: BTreeMap::new(),
        committed_override: None,
        velocity_history: Vec::new(),
        action_items: Vec::new(),
        failures: Vec::new()
    }
}

fn benchmark_compute(c: &mut Criterion) {
    let config = parse_config(CONFIG).expect("parse failed");
    let settings = EngineSettings::from_config(&config).expect("settings");
    let now = Utc.with_ymd_and_hms(2025, 9, 15, 9, 0, 0).single().expect("valid date");

    let small = collection(40);
    c.bench_function("compute_40_issues", |b| {
        b.iter(|| compute(black_box(&small), &settings, now))
    });

    let large = collection(1000);
    c.bench_function("compute_1000_issues", |b| {
        b.iter(|| compute(black_box(&large), &settings, now))
    });
}

fn benchmark_render(c: &mut Criterion) {
    let config = parse_config(CONFIG).expect("parse failed");
    let settings = EngineSettings::from_config(&config).expect("settings");
    let now = Utc.with_ymd_and_hms(2025, 9, 15, 9, 0, 0).single().expect("valid date");
    let model = compute(&collection(200), &settings, now);
    let renderer = SvgChartRenderer::default();

    c.bench_function("render_page_and_charts", |b| {
        b.iter(|| render(black_box(&model), &renderer, 120))
    });
}

fn benchmark_config_parse(c: &mut Criterion) {
    c.bench_function("parse_config", |b| {
        b.iter(|| parse_config(black_box(CONFIG)).expect("parse failed"))
    });
}

criterion_group!(benches, benchmark_compute, benchmark_render, benchmark_config_parse);
criterion_main!(benches);
