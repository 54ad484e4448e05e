//! Result shapes returned by the resume analyzer/reranker once a trace completes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::null_as_default;

/// Per-job ranking entry for one candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeFeedback {
    #[serde(default, deserialize_with = "null_as_default")]
    pub candidate_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub analysis: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub scores: BTreeMap<String, i64>,
    #[serde(default)]
    pub total_score: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub key_strengths: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub areas_for_improvement: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResumeMatch {
    #[serde(default, deserialize_with = "null_as_default")]
    pub job_description_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub candidate_name: String,
    #[serde(default)]
    pub match_score: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub match_explanation: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrossJobMatchResult {
    #[serde(default, deserialize_with = "null_as_default")]
    pub job_resume_matches: Vec<JobResumeMatch>,
    /// job name → best resume name
    #[serde(default, deserialize_with = "null_as_default")]
    pub best_matches_per_job: BTreeMap<String, String>,
    /// resume name → best job name
    #[serde(default, deserialize_with = "null_as_default")]
    pub best_matches_per_resume: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub overall_recommendation: String,
}

/// The subset of the analyzer's final graph state the panel displays.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisReport {
    #[serde(default, deserialize_with = "null_as_default")]
    pub all_rankings: BTreeMap<String, Vec<ResumeFeedback>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub final_recommendations: CrossJobMatchResult,
}

impl AnalysisReport {
    /// Parses a completed trace's results and orders matches best-first.
    pub fn from_results(results: &Value) -> Result<Self, serde_json::Error> {
        if results.is_null() {
            return Ok(Self::default());
        }
        let mut report: AnalysisReport = serde_json::from_value(results.clone())?;
        report
            .final_recommendations
            .job_resume_matches
            .sort_by(|a, b| b.match_score.total_cmp(&a.match_score));
        for rankings in report.all_rankings.values_mut() {
            rankings.sort_by(|a, b| b.total_score.cmp(&a.total_score));
        }
        Ok(report)
    }

    pub fn ranked_matches(&self) -> &[JobResumeMatch] {
        &self.final_recommendations.job_resume_matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_matches_sorted_by_score_descending() {
        let results = json!({
            "job_openings": [],
            "resumes": [],
            "final_recommendations": {
                "job_resume_matches": [
                    {"job_description_name": "Engineer", "candidate_name": "Ben", "match_score": 61.5, "match_explanation": "ok"},
                    {"job_description_name": "Engineer", "candidate_name": "Ana", "match_score": 88.0, "match_explanation": "strong"}
                ],
                "best_matches_per_job": {"Engineer": "Ana"},
                "best_matches_per_resume": {"Ana": "Engineer", "Ben": "Engineer"},
                "overall_recommendation": "Hire Ana"
            }
        });
        let report = AnalysisReport::from_results(&results).unwrap();
        let names: Vec<_> = report
            .ranked_matches()
            .iter()
            .map(|m| m.candidate_name.as_str())
            .collect();
        assert_eq!(names, vec!["Ana", "Ben"]);
        assert_eq!(report.final_recommendations.best_matches_per_job["Engineer"], "Ana");
    }

    #[test]
    fn test_rankings_sorted_by_total_score() {
        let results = json!({
            "all_rankings": {
                "Engineer": [
                    {"candidate_name": "Ben", "total_score": 40},
                    {"candidate_name": "Ana", "total_score": 75, "key_strengths": ["Rust"]}
                ]
            }
        });
        let report = AnalysisReport::from_results(&results).unwrap();
        let ranking = &report.all_rankings["Engineer"];
        assert_eq!(ranking[0].candidate_name, "Ana");
        assert_eq!(ranking[0].key_strengths, vec!["Rust".to_string()]);
        assert!(report.ranked_matches().is_empty());
    }

    #[test]
    fn test_null_results_yield_empty_report() {
        let report = AnalysisReport::from_results(&Value::Null).unwrap();
        assert!(report.ranked_matches().is_empty());
        assert!(report.all_rankings.is_empty());
    }
}
