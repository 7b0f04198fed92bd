use serde::Serialize;

use crate::classify::{self, CompletionBucket, GradeBucket, RankGlyph};
use crate::models::{RankingSnapshot, StudentRankingEntry};

pub const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingStats {
    pub total_students: usize,
    pub average_completion: i64,
    pub average_grade: f64,
    pub top_performer: String,
}

/// One leaderboard line with its presentation values resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedRow {
    pub place: i32,
    pub glyph: RankGlyph,
    pub name: String,
    pub tasks_sent: i32,
    pub total_tasks: i32,
    pub conclusion_percent: f64,
    pub completion: CompletionBucket,
    pub medium_grade: Option<f64>,
    pub grade: GradeBucket,
    pub points_earned: i64,
}

/// Summary over the whole snapshot. Order is taken as delivered.
pub fn aggregate(snapshot: &RankingSnapshot) -> RankingStats {
    let entries = &snapshot.students_ranking;
    let total_students = entries.len();

    let average_completion = if total_students == 0 {
        0
    } else {
        let sum: f64 = entries.iter().map(|entry| entry.conclusion_percent).sum();
        (sum / total_students as f64).round() as i64
    };

    let (grade_sum, graded) = entries
        .iter()
        .filter_map(|entry| entry.medium_grade)
        .fold((0.0, 0usize), |(sum, count), grade| (sum + grade, count + 1));
    let average_grade = if graded == 0 {
        0.0
    } else {
        round_to_tenth(grade_sum / graded as f64)
    };

    let top_performer = entries
        .first()
        .map(|entry| entry.name.clone())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string());

    RankingStats {
        total_students,
        average_completion,
        average_grade,
        top_performer,
    }
}

/// Case-insensitive substring match on the student name. A blank term keeps everything.
pub fn filter_by_name<'a>(
    entries: &'a [StudentRankingEntry],
    term: &str,
) -> Vec<&'a StudentRankingEntry> {
    let needle = term.trim().to_lowercase();
    entries
        .iter()
        .filter(|entry| needle.is_empty() || entry.name.to_lowercase().contains(&needle))
        .collect()
}

pub fn present(entry: &StudentRankingEntry) -> RankedRow {
    RankedRow {
        place: entry.place,
        glyph: classify::rank_glyph(entry.place),
        name: entry.name.clone(),
        tasks_sent: entry.tasks_sent,
        total_tasks: entry.total_tasks,
        conclusion_percent: entry.conclusion_percent,
        completion: classify::completion_bucket(entry.conclusion_percent),
        medium_grade: entry.medium_grade,
        grade: classify::grade_bucket(entry.medium_grade),
        points_earned: entry.points_earned,
    }
}

fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(place: i32, name: &str, conclusion: f64, grade: Option<f64>) -> StudentRankingEntry {
        StudentRankingEntry {
            place,
            name: name.to_string(),
            tasks_sent: 9,
            tasks_reviewed: 8,
            total_tasks: 10,
            conclusion_percent: conclusion,
            medium_grade: grade,
            points_earned: 100 - place as i64,
            last_response_date: None,
        }
    }

    fn snapshot(entries: Vec<StudentRankingEntry>) -> RankingSnapshot {
        RankingSnapshot {
            trail_id: 100,
            trail_name: "Trilha X".to_string(),
            students_ranking: entries,
        }
    }

    #[test]
    fn null_grades_are_excluded_not_zeroed() {
        let stats = aggregate(&snapshot(vec![
            entry(1, "Maria Silva", 90.0, Some(9.5)),
            entry(2, "Ana Costa", 70.0, None),
            entry(3, "Joao Santos", 84.0, Some(7.5)),
        ]));
        assert_eq!(stats.average_grade, 8.5);
        assert_eq!(stats.total_students, 3);
    }

    #[test]
    fn all_null_grades_average_to_zero() {
        let stats = aggregate(&snapshot(vec![entry(1, "Maria Silva", 50.0, None)]));
        assert_eq!(stats.average_grade, 0.0);
    }

    #[test]
    fn completion_average_is_rounded() {
        let stats = aggregate(&snapshot(vec![
            entry(1, "Maria Silva", 90.0, Some(9.5)),
            entry(2, "Joao Santos", 84.0, Some(7.5)),
        ]));
        assert_eq!(stats.average_completion, 87);
        assert_eq!(stats.top_performer, "Maria Silva");

        let stats = aggregate(&snapshot(vec![
            entry(1, "Maria Silva", 66.6, None),
            entry(2, "Joao Santos", 66.7, None),
        ]));
        assert_eq!(stats.average_completion, 67);
    }

    #[test]
    fn grade_average_rounds_to_one_decimal() {
        let stats = aggregate(&snapshot(vec![
            entry(1, "A", 10.0, Some(9.0)),
            entry(2, "B", 10.0, Some(8.0)),
            entry(3, "C", 10.0, Some(8.0)),
        ]));
        assert_eq!(stats.average_grade, 8.3);
    }

    #[test]
    fn empty_snapshot_uses_sentinels() {
        let stats = aggregate(&snapshot(Vec::new()));
        assert_eq!(stats.total_students, 0);
        assert_eq!(stats.average_completion, 0);
        assert_eq!(stats.average_grade, 0.0);
        assert_eq!(stats.top_performer, NOT_AVAILABLE);
    }

    #[test]
    fn top_performer_trusts_delivered_order() {
        let stats = aggregate(&snapshot(vec![
            entry(1, "Rafael Lima", 40.0, Some(5.0)),
            entry(2, "Maria Silva", 95.0, Some(9.9)),
        ]));
        assert_eq!(stats.top_performer, "Rafael Lima");
    }

    #[test]
    fn name_filter_is_case_insensitive_and_leaves_stats_alone() {
        let data = snapshot(vec![
            entry(1, "Maria Silva", 90.0, Some(9.5)),
            entry(2, "Joao Santos", 84.0, Some(7.5)),
            entry(3, "Mariana Alves", 60.0, None),
        ]);
        let matches = filter_by_name(&data.students_ranking, "MARI");
        let names: Vec<&str> = matches.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Maria Silva", "Mariana Alves"]);
        assert_eq!(filter_by_name(&data.students_ranking, "  ").len(), 3);
        assert!(filter_by_name(&data.students_ranking, "zz").is_empty());

        assert_eq!(aggregate(&data).total_students, 3);
    }

    #[test]
    fn rows_carry_presentation_buckets() {
        let row = present(&entry(4, "Pedro Oliveira", 76.0, Some(5.5)));
        assert_eq!(row.glyph, RankGlyph::Badge(4));
        assert_eq!(row.completion, CompletionBucket::Good);
        assert_eq!(row.grade, GradeBucket::Low);
    }
}
