use serde::Serialize;

use crate::models::record::GradingRecord;

/// 整轮评分的统计信息
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryStats {
    pub total_submissions: usize,
    pub average_score: f64,
    pub average_percentage: f64,
    pub highest_score: u32,
    pub lowest_score: u32,
    /// 得分率 ≥ 50%
    pub passed_count: usize,
    pub failed_count: usize,
    pub perfect_scores: usize,
    pub server_start_failures: usize,
}

impl SummaryStats {
    pub fn from_records(records: &[GradingRecord]) -> Self {
        if records.is_empty() {
            return Self::default();
        }

        let count = records.len();
        let total: u32 = records.iter().map(|r| r.total_score).sum();
        let percentages: f64 = records.iter().map(|r| r.percentage).sum();
        let passed_count = records
            .iter()
            .filter(|r| r.total_score * 2 >= r.max_score)
            .count();

        Self {
            total_submissions: count,
            average_score: round2(total as f64 / count as f64),
            average_percentage: round2(percentages / count as f64),
            highest_score: records.iter().map(|r| r.total_score).max().unwrap_or(0),
            lowest_score: records.iter().map(|r| r.total_score).min().unwrap_or(0),
            passed_count,
            failed_count: count - passed_count,
            perfect_scores: records
                .iter()
                .filter(|r| r.max_score > 0 && r.total_score == r.max_score)
                .count(),
            server_start_failures: records.iter().filter(|r| !r.server_started).count(),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Submission;

    fn record(id: &str, score: u32, started: bool) -> GradingRecord {
        let mut r = GradingRecord::new(Submission::new(id, id, "/tmp"), 100);
        r.total_score = score;
        r.percentage = score as f64;
        r.server_started = started;
        r
    }

    #[test]
    fn test_summary_counts() {
        let records = vec![
            record("a", 100, true),
            record("b", 50, true),
            record("c", 0, false),
        ];
        let stats = SummaryStats::from_records(&records);

        assert_eq!(stats.total_submissions, 3);
        assert_eq!(stats.average_score, 50.0);
        assert_eq!(stats.highest_score, 100);
        assert_eq!(stats.lowest_score, 0);
        assert_eq!(stats.passed_count, 2);
        assert_eq!(stats.failed_count, 1);
        assert_eq!(stats.perfect_scores, 1);
        assert_eq!(stats.server_start_failures, 1);
    }

    #[test]
    fn test_empty_summary() {
        assert_eq!(SummaryStats::from_records(&[]), SummaryStats::default());
    }
}
