use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use super::user::bson_datetime_as_chrono;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QuizStatus {
    InProgress,
    Completed,
    Abandoned,
}

impl QuizStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuizStatus::InProgress => "in_progress",
            QuizStatus::Completed => "completed",
            QuizStatus::Abandoned => "abandoned",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, QuizStatus::Completed | QuizStatus::Abandoned)
    }
}

/// Per-(user, topic) quiz run stored in "quiz_progress". Created on quiz
/// start, mutated on each submission, terminal on completion or
/// abandonment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizProgressRecord {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    #[serde(rename = "userId")]
    pub user_id: ObjectId,

    pub topic_id: ObjectId,

    pub score: i32,
    pub completed_count: u32,
    pub total_count: u32,
    pub status: QuizStatus,
    pub time_spent_seconds: u64,

    #[serde(rename = "startedAt", with = "bson_datetime_as_chrono")]
    pub started_at: DateTime<Utc>,

    #[serde(rename = "updatedAt", with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

impl QuizProgressRecord {
    /// Applies one graded submission. Completion flips the status once
    /// every question in the run has been answered.
    pub fn record_submission(&mut self, is_correct: bool, now: DateTime<Utc>) {
        self.completed_count += 1;
        if is_correct {
            self.score += 1;
        }
        if self.total_count > 0 && self.completed_count >= self.total_count {
            self.status = QuizStatus::Completed;
        }
        self.time_spent_seconds = (now - self.started_at).num_seconds().max(0) as u64;
        self.updated_at = now;
    }
}

#[derive(Debug, Serialize)]
pub struct QuizProgressView {
    pub id: String,
    pub topic_id: String,
    pub score: i32,
    pub completed_count: u32,
    pub total_count: u32,
    pub status: QuizStatus,
    pub time_spent_seconds: u64,
}

impl From<QuizProgressRecord> for QuizProgressView {
    fn from(record: QuizProgressRecord) -> Self {
        QuizProgressView {
            id: record.id.map(|id| id.to_hex()).unwrap_or_default(),
            topic_id: record.topic_id.to_hex(),
            score: record.score,
            completed_count: record.completed_count,
            total_count: record.total_count,
            status: record.status,
            time_spent_seconds: record.time_spent_seconds,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StartQuizRequest {
    /// Number of questions in the run; defaults to every question of the
    /// topic when omitted.
    #[serde(default)]
    pub total_count: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn in_progress(total: u32) -> QuizProgressRecord {
        let now = Utc::now();
        QuizProgressRecord {
            id: Some(ObjectId::new()),
            user_id: ObjectId::new(),
            topic_id: ObjectId::new(),
            score: 0,
            completed_count: 0,
            total_count: total,
            status: QuizStatus::InProgress,
            time_spent_seconds: 0,
            started_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn submission_updates_counts_and_score() {
        let mut progress = in_progress(3);
        progress.record_submission(true, progress.started_at + Duration::seconds(30));
        assert_eq!(progress.completed_count, 1);
        assert_eq!(progress.score, 1);
        assert_eq!(progress.status, QuizStatus::InProgress);

        progress.record_submission(false, progress.started_at + Duration::seconds(70));
        assert_eq!(progress.completed_count, 2);
        assert_eq!(progress.score, 1);
        assert_eq!(progress.time_spent_seconds, 70);
    }

    #[test]
    fn final_submission_completes_the_run() {
        let mut progress = in_progress(2);
        progress.record_submission(true, progress.started_at + Duration::seconds(10));
        progress.record_submission(true, progress.started_at + Duration::seconds(20));
        assert_eq!(progress.status, QuizStatus::Completed);
        assert!(progress.status.is_terminal());
    }

    #[test]
    fn unbounded_runs_never_autocomplete() {
        let mut progress = in_progress(0);
        for i in 1..10 {
            progress.record_submission(true, progress.started_at + Duration::seconds(i));
        }
        assert_eq!(progress.status, QuizStatus::InProgress);
    }
}
