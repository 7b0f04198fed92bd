use std::fmt::Write;

use chrono::NaiveDate;

use crate::handoff::RankingFilters;
use crate::models::RankingSnapshot;
use crate::ranking;

pub fn build_report(
    filters: &RankingFilters,
    generated_on: NaiveDate,
    snapshot: Option<&RankingSnapshot>,
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Activity Ranking Report");
    let _ = writeln!(
        output,
        "{} / {} / {} (generated {})",
        filters.course_name, filters.class_name, filters.trail_name, generated_on
    );
    let _ = writeln!(output);

    let snapshot = match snapshot {
        Some(snapshot) if !snapshot.students_ranking.is_empty() => snapshot,
        _ => {
            let _ = writeln!(output, "No ranking data recorded for this trail yet.");
            return output;
        }
    };

    let stats = ranking::aggregate(snapshot);
    let _ = writeln!(output, "## Summary");
    let _ = writeln!(output, "- Students ranked: {}", stats.total_students);
    let _ = writeln!(output, "- Average completion: {}%", stats.average_completion);
    let _ = writeln!(output, "- Average grade: {:.1}", stats.average_grade);
    let _ = writeln!(output, "- Top performer: {}", stats.top_performer);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Leaderboard");
    let _ = writeln!(
        output,
        "| Place | Student | Tasks | Completion | Grade | Points | Last response |"
    );
    let _ = writeln!(output, "|---|---|---|---|---|---|---|");

    for entry in snapshot.students_ranking.iter() {
        let row = ranking::present(entry);
        let grade = row
            .medium_grade
            .map(|grade| format!("{grade:.1} ({})", row.grade))
            .unwrap_or_else(|| row.grade.to_string());
        let last_response = entry
            .last_response_date
            .map(|date| date.to_string())
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            output,
            "| {} | {} | {}/{} | {:.0}% ({}) | {} | {} | {} |",
            row.glyph,
            row.name,
            row.tasks_sent,
            row.total_tasks,
            row.conclusion_percent,
            row.completion,
            grade,
            row.points_earned,
            last_response
        );
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StudentRankingEntry;

    fn filters() -> RankingFilters {
        RankingFilters {
            course_id: 1,
            course_name: "ADS".to_string(),
            class_id: 10,
            class_name: "Turma A".to_string(),
            trail_id: 100,
            trail_name: "Trilha X".to_string(),
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 2).unwrap()
    }

    #[test]
    fn report_lists_summary_and_rows() {
        let snapshot = RankingSnapshot {
            trail_id: 100,
            trail_name: "Trilha X".to_string(),
            students_ranking: vec![
                StudentRankingEntry {
                    place: 1,
                    name: "Maria Silva".to_string(),
                    tasks_sent: 9,
                    tasks_reviewed: 9,
                    total_tasks: 10,
                    conclusion_percent: 90.0,
                    medium_grade: Some(9.5),
                    points_earned: 140,
                    last_response_date: Some(date()),
                },
                StudentRankingEntry {
                    place: 4,
                    name: "Pedro Oliveira".to_string(),
                    tasks_sent: 5,
                    tasks_reviewed: 0,
                    total_tasks: 10,
                    conclusion_percent: 50.0,
                    medium_grade: None,
                    points_earned: 0,
                    last_response_date: None,
                },
            ],
        };

        let report = build_report(&filters(), date(), Some(&snapshot));
        assert!(report.contains("ADS / Turma A / Trilha X (generated 2026-02-02)"));
        assert!(report.contains("- Students ranked: 2"));
        assert!(report.contains("- Average grade: 9.5"));
        assert!(report.contains("| [gold] | Maria Silva | 9/10 | 90% (excellent) | 9.5 (high) | 140 | 2026-02-02 |"));
        assert!(report.contains("| #4 | Pedro Oliveira | 5/10 | 50% (needs-improvement) | ungraded | 0 | - |"));
    }

    #[test]
    fn empty_snapshot_reports_no_data() {
        let report = build_report(&filters(), date(), None);
        assert!(report.contains("No ranking data recorded"));
        assert!(!report.contains("## Summary"));
    }
}
