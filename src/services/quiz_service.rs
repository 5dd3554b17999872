use anyhow::Context;
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId},
    Collection, Database,
};
use redis::aio::ConnectionManager;

use crate::error::ApiError;
use crate::metrics::{record_cache_hit, record_cache_miss, ANSWERS_GRADED_TOTAL, QUIZZES_TOTAL};
use crate::models::progress::{QuizProgressRecord, QuizStatus};
use crate::models::question::{QuestionRecord, SubmitAnswerRequest, SubmitAnswerResponse};
use crate::services::grader::grade_answer;
use crate::utils::retry::{retry_async_with_config, RetryConfig};

const IDEMPOTENCY_TTL_SECONDS: u64 = 86400; // 24 hours

pub struct QuizService {
    mongo: Database,
    redis: ConnectionManager,
}

impl QuizService {
    pub fn new(mongo: Database, redis: ConnectionManager) -> Self {
        Self { mongo, redis }
    }

    fn questions(&self) -> Collection<QuestionRecord> {
        self.mongo.collection("questions")
    }

    fn progress(&self) -> Collection<QuizProgressRecord> {
        self.mongo.collection("quiz_progress")
    }

    /// Grades one submission and folds the verdict into the learner's
    /// progress for the question's topic. Resubmitting the same question
    /// within the idempotency window returns the cached verdict without
    /// touching progress again.
    pub async fn submit_answer(
        &self,
        user_id: ObjectId,
        req: &SubmitAnswerRequest,
    ) -> Result<SubmitAnswerResponse, ApiError> {
        let question_id = ObjectId::parse_str(&req.question_id)
            .map_err(|_| ApiError::bad_request("Invalid question_id"))?;

        let retry_cfg = RetryConfig::default();
        let idempotency_key = format!("idempotency:answer:{}:{}", user_id.to_hex(), question_id.to_hex());

        if let Some(cached) = retry_async_with_config(retry_cfg.clone(), || async {
            self.check_idempotency(&idempotency_key).await
        })
        .await
        .context("Failed to check idempotency cache")?
        {
            record_cache_hit();
            tracing::info!(key = %idempotency_key, "Returning cached grading verdict");
            return Ok(cached);
        }
        record_cache_miss();

        let question = self
            .questions()
            .find_one(doc! { "_id": question_id })
            .await
            .context("Failed to query question")?
            .ok_or(ApiError::QuestionNotFound)?;

        let is_correct = grade_answer(
            question.question_type,
            question.correct_answer.as_deref(),
            req.answer.as_deref(),
        )?;

        let correct_label = if is_correct { "true" } else { "false" };
        ANSWERS_GRADED_TOTAL.with_label_values(&[correct_label]).inc();

        self.apply_submission(user_id, question.topic_id, is_correct)
            .await?;

        tracing::info!(
            user_id = %user_id.to_hex(),
            question_id = %question_id.to_hex(),
            correct = is_correct,
            "Answer graded"
        );

        let response = SubmitAnswerResponse {
            is_correct,
            correct_answer: question.correct_answer.clone(),
            explanation: question.explanation.clone(),
        };

        retry_async_with_config(retry_cfg, || async {
            self.cache_response(&idempotency_key, &response).await
        })
        .await
        .context("Failed to cache grading verdict")?;

        Ok(response)
    }

    /// Starts (or resumes) a quiz run for a topic. An existing
    /// in-progress record is returned as-is.
    pub async fn start_quiz(
        &self,
        user_id: ObjectId,
        topic_id: ObjectId,
        requested_total: Option<u32>,
    ) -> Result<QuizProgressRecord, ApiError> {
        if let Some(existing) = self.in_progress_record(user_id, topic_id).await? {
            return Ok(existing);
        }

        let total_count = match requested_total {
            Some(total) => total,
            None => self
                .questions()
                .count_documents(doc! { "topic_id": topic_id })
                .await
                .context("Failed to count topic questions")? as u32,
        };

        let now = Utc::now();
        let mut record = QuizProgressRecord {
            id: None,
            user_id,
            topic_id,
            score: 0,
            completed_count: 0,
            total_count,
            status: QuizStatus::InProgress,
            time_spent_seconds: 0,
            started_at: now,
            updated_at: now,
        };

        let inserted = self
            .progress()
            .insert_one(&record)
            .await
            .context("Failed to insert quiz progress")?;
        record.id = inserted.inserted_id.as_object_id();

        tracing::info!(
            user_id = %user_id.to_hex(),
            topic_id = %topic_id.to_hex(),
            total = total_count,
            "Quiz started"
        );

        Ok(record)
    }

    /// Marks the learner's in-progress run on the topic as abandoned.
    pub async fn abandon_quiz(
        &self,
        user_id: ObjectId,
        topic_id: ObjectId,
    ) -> Result<QuizProgressRecord, ApiError> {
        let mut record = self
            .in_progress_record(user_id, topic_id)
            .await?
            .ok_or_else(|| ApiError::not_found("No quiz in progress for this topic"))?;

        let now = Utc::now();
        record.status = QuizStatus::Abandoned;
        record.time_spent_seconds = (now - record.started_at).num_seconds().max(0) as u64;
        record.updated_at = now;

        self.progress()
            .replace_one(doc! { "_id": record.id }, &record)
            .await
            .context("Failed to abandon quiz")?;

        QUIZZES_TOTAL.with_label_values(&["abandoned"]).inc();

        Ok(record)
    }

    pub async fn progress_for_user(
        &self,
        user_id: ObjectId,
    ) -> Result<Vec<QuizProgressRecord>, ApiError> {
        let cursor = self
            .progress()
            .find(doc! { "userId": user_id })
            .sort(doc! { "updatedAt": -1 })
            .await
            .context("Failed to query quiz progress")?;

        let records = cursor
            .try_collect()
            .await
            .context("Failed to collect quiz progress")?;
        Ok(records)
    }

    async fn in_progress_record(
        &self,
        user_id: ObjectId,
        topic_id: ObjectId,
    ) -> Result<Option<QuizProgressRecord>, ApiError> {
        let record = self
            .progress()
            .find_one(doc! {
                "userId": user_id,
                "topic_id": topic_id,
                "status": QuizStatus::InProgress.as_str(),
            })
            .await
            .context("Failed to query in-progress quiz")?;
        Ok(record)
    }

    /// Folds one verdict into the topic's run, creating the record if the
    /// learner answered without an explicit start.
    async fn apply_submission(
        &self,
        user_id: ObjectId,
        topic_id: ObjectId,
        is_correct: bool,
    ) -> Result<(), ApiError> {
        let mut record = match self.in_progress_record(user_id, topic_id).await? {
            Some(record) => record,
            None => self.start_quiz(user_id, topic_id, None).await?,
        };

        if record.status.is_terminal() {
            return Ok(());
        }

        record.record_submission(is_correct, Utc::now());

        self.progress()
            .replace_one(doc! { "_id": record.id }, &record)
            .await
            .context("Failed to update quiz progress")?;

        if record.status == QuizStatus::Completed {
            QUIZZES_TOTAL.with_label_values(&["completed"]).inc();
            tracing::info!(
                user_id = %user_id.to_hex(),
                topic_id = %topic_id.to_hex(),
                score = record.score,
                "Quiz completed"
            );
        }

        Ok(())
    }

    // Check if this submission was already graded (idempotency)
    async fn check_idempotency(
        &self,
        idempotency_key: &str,
    ) -> anyhow::Result<Option<SubmitAnswerResponse>> {
        let mut conn = self.redis.clone();

        let cached: Option<String> = redis::cmd("GET")
            .arg(idempotency_key)
            .query_async(&mut conn)
            .await
            .context("Failed to check idempotency cache")?;

        if let Some(json) = cached {
            let response: SubmitAnswerResponse =
                serde_json::from_str(&json).context("Failed to deserialize cached verdict")?;
            return Ok(Some(response));
        }

        Ok(None)
    }

    async fn cache_response(
        &self,
        idempotency_key: &str,
        response: &SubmitAnswerResponse,
    ) -> anyhow::Result<()> {
        let mut conn = self.redis.clone();
        let json = serde_json::to_string(response).context("Failed to serialize verdict")?;

        redis::cmd("SETEX")
            .arg(idempotency_key)
            .arg(IDEMPOTENCY_TTL_SECONDS)
            .arg(&json)
            .query_async::<()>(&mut conn)
            .await
            .context("Failed to cache verdict")?;

        Ok(())
    }
}
