use anyhow::Context;
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, Document},
    Collection, Database,
};

use crate::error::ApiError;
use crate::models::content::{
    GradeCreateRequest, GradeRecord, NodeSummary, NodeUpdateRequest, SectionCreateRequest,
    SectionRecord, SubjectCreateRequest, SubjectRecord, TopicCreateRequest, TopicRecord,
};
use crate::models::question::{
    AnswerKey, QuestionCreateRequest, QuestionDetail, QuestionRecord, QuestionUpdateRequest,
    QuestionView,
};

const MAX_LIST_LIMIT: i64 = 200;

/// CRUD over the Grade → Subject → Topic → Section → Question tree.
/// Parents with children refuse deletion; the check runs against the
/// child collection right before the delete.
pub struct ContentService {
    mongo: Database,
}

impl ContentService {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    fn grades(&self) -> Collection<GradeRecord> {
        self.mongo.collection("grades")
    }

    fn subjects(&self) -> Collection<SubjectRecord> {
        self.mongo.collection("subjects")
    }

    fn topics(&self) -> Collection<TopicRecord> {
        self.mongo.collection("topics")
    }

    fn sections(&self) -> Collection<SectionRecord> {
        self.mongo.collection("sections")
    }

    fn questions(&self) -> Collection<QuestionRecord> {
        self.mongo.collection("questions")
    }

    // ---- grades ----

    pub async fn list_grades(&self) -> Result<Vec<NodeSummary>, ApiError> {
        let cursor = self
            .grades()
            .find(doc! {})
            .sort(doc! { "sort_order": 1 })
            .limit(MAX_LIST_LIMIT)
            .await
            .context("Failed to list grades")?;
        let grades: Vec<GradeRecord> = cursor.try_collect().await.context("Failed to collect grades")?;
        Ok(grades
            .iter()
            .map(|g| NodeSummary::new(g.id, &g.name, g.sort_order))
            .collect())
    }

    pub async fn create_grade(&self, req: GradeCreateRequest) -> Result<NodeSummary, ApiError> {
        let now = Utc::now();
        let record = GradeRecord {
            id: None,
            name: req.name,
            sort_order: req.sort_order.unwrap_or(0),
            created_at: now,
            updated_at: now,
        };
        let inserted = self
            .grades()
            .insert_one(&record)
            .await
            .context("Failed to insert grade")?;
        Ok(NodeSummary::new(
            inserted.inserted_id.as_object_id(),
            &record.name,
            record.sort_order,
        ))
    }

    pub async fn delete_grade(&self, id: ObjectId) -> Result<(), ApiError> {
        self.ensure_no_children(self.subjects(), doc! { "grade_id": id }, "subjects")
            .await?;
        let deleted = self
            .grades()
            .delete_one(doc! { "_id": id })
            .await
            .context("Failed to delete grade")?;
        if deleted.deleted_count == 0 {
            return Err(ApiError::not_found("Grade not found"));
        }
        Ok(())
    }

    // ---- subjects ----

    pub async fn list_subjects(&self, grade_id: ObjectId) -> Result<Vec<NodeSummary>, ApiError> {
        let cursor = self
            .subjects()
            .find(doc! { "grade_id": grade_id })
            .sort(doc! { "sort_order": 1 })
            .limit(MAX_LIST_LIMIT)
            .await
            .context("Failed to list subjects")?;
        let subjects: Vec<SubjectRecord> =
            cursor.try_collect().await.context("Failed to collect subjects")?;
        Ok(subjects
            .iter()
            .map(|s| NodeSummary::new(s.id, &s.name, s.sort_order))
            .collect())
    }

    pub async fn create_subject(&self, req: SubjectCreateRequest) -> Result<NodeSummary, ApiError> {
        let grade_id = parse_object_id(&req.grade_id, "grade_id")?;
        self.ensure_exists(self.grades(), grade_id, "Grade").await?;

        let now = Utc::now();
        let record = SubjectRecord {
            id: None,
            grade_id,
            name: req.name,
            icon_url: req.icon_url,
            sort_order: req.sort_order.unwrap_or(0),
            created_at: now,
            updated_at: now,
        };
        let inserted = self
            .subjects()
            .insert_one(&record)
            .await
            .context("Failed to insert subject")?;
        Ok(NodeSummary::new(
            inserted.inserted_id.as_object_id(),
            &record.name,
            record.sort_order,
        ))
    }

    pub async fn delete_subject(&self, id: ObjectId) -> Result<(), ApiError> {
        self.ensure_no_children(self.topics(), doc! { "subject_id": id }, "topics")
            .await?;
        let deleted = self
            .subjects()
            .delete_one(doc! { "_id": id })
            .await
            .context("Failed to delete subject")?;
        if deleted.deleted_count == 0 {
            return Err(ApiError::not_found("Subject not found"));
        }
        Ok(())
    }

    // ---- topics ----

    pub async fn list_topics(&self, subject_id: ObjectId) -> Result<Vec<NodeSummary>, ApiError> {
        let cursor = self
            .topics()
            .find(doc! { "subject_id": subject_id })
            .sort(doc! { "sort_order": 1 })
            .limit(MAX_LIST_LIMIT)
            .await
            .context("Failed to list topics")?;
        let topics: Vec<TopicRecord> = cursor.try_collect().await.context("Failed to collect topics")?;
        Ok(topics
            .iter()
            .map(|t| NodeSummary::new(t.id, &t.name, t.sort_order))
            .collect())
    }

    pub async fn create_topic(&self, req: TopicCreateRequest) -> Result<NodeSummary, ApiError> {
        let subject_id = parse_object_id(&req.subject_id, "subject_id")?;
        self.ensure_exists(self.subjects(), subject_id, "Subject")
            .await?;

        let now = Utc::now();
        let record = TopicRecord {
            id: None,
            subject_id,
            name: req.name,
            description: req.description,
            sort_order: req.sort_order.unwrap_or(0),
            created_at: now,
            updated_at: now,
        };
        let inserted = self
            .topics()
            .insert_one(&record)
            .await
            .context("Failed to insert topic")?;
        Ok(NodeSummary::new(
            inserted.inserted_id.as_object_id(),
            &record.name,
            record.sort_order,
        ))
    }

    pub async fn delete_topic(&self, id: ObjectId) -> Result<(), ApiError> {
        self.ensure_no_children(self.sections(), doc! { "topic_id": id }, "sections")
            .await?;
        self.ensure_no_children(self.questions(), doc! { "topic_id": id }, "questions")
            .await?;
        let deleted = self
            .topics()
            .delete_one(doc! { "_id": id })
            .await
            .context("Failed to delete topic")?;
        if deleted.deleted_count == 0 {
            return Err(ApiError::not_found("Topic not found"));
        }
        Ok(())
    }

    // ---- sections ----

    pub async fn list_sections(&self, topic_id: ObjectId) -> Result<Vec<NodeSummary>, ApiError> {
        let cursor = self
            .sections()
            .find(doc! { "topic_id": topic_id })
            .sort(doc! { "sort_order": 1 })
            .limit(MAX_LIST_LIMIT)
            .await
            .context("Failed to list sections")?;
        let sections: Vec<SectionRecord> =
            cursor.try_collect().await.context("Failed to collect sections")?;
        Ok(sections
            .iter()
            .map(|s| NodeSummary::new(s.id, &s.name, s.sort_order))
            .collect())
    }

    pub async fn create_section(&self, req: SectionCreateRequest) -> Result<NodeSummary, ApiError> {
        let topic_id = parse_object_id(&req.topic_id, "topic_id")?;
        self.ensure_exists(self.topics(), topic_id, "Topic").await?;

        let now = Utc::now();
        let record = SectionRecord {
            id: None,
            topic_id,
            name: req.name,
            sort_order: req.sort_order.unwrap_or(0),
            created_at: now,
            updated_at: now,
        };
        let inserted = self
            .sections()
            .insert_one(&record)
            .await
            .context("Failed to insert section")?;
        Ok(NodeSummary::new(
            inserted.inserted_id.as_object_id(),
            &record.name,
            record.sort_order,
        ))
    }

    pub async fn delete_section(&self, id: ObjectId) -> Result<(), ApiError> {
        self.ensure_no_children(self.questions(), doc! { "section_id": id }, "questions")
            .await?;
        let deleted = self
            .sections()
            .delete_one(doc! { "_id": id })
            .await
            .context("Failed to delete section")?;
        if deleted.deleted_count == 0 {
            return Err(ApiError::not_found("Section not found"));
        }
        Ok(())
    }

    // ---- questions ----

    pub async fn list_questions(&self, topic_id: ObjectId) -> Result<Vec<QuestionView>, ApiError> {
        let cursor = self
            .questions()
            .find(doc! { "topic_id": topic_id })
            .limit(MAX_LIST_LIMIT)
            .await
            .context("Failed to list questions")?;
        let questions: Vec<QuestionRecord> =
            cursor.try_collect().await.context("Failed to collect questions")?;
        Ok(questions.into_iter().map(QuestionView::from).collect())
    }

    pub async fn get_question_detail(&self, id: ObjectId) -> Result<QuestionDetail, ApiError> {
        let question = self
            .questions()
            .find_one(doc! { "_id": id })
            .await
            .context("Failed to query question")?
            .ok_or(ApiError::QuestionNotFound)?;
        Ok(QuestionDetail::from(question))
    }

    /// Creates a question after checking the answer key parses under the
    /// declared type, so grading never meets a malformed key.
    pub async fn create_question(
        &self,
        req: QuestionCreateRequest,
    ) -> Result<QuestionDetail, ApiError> {
        let topic_id = parse_object_id(&req.topic_id, "topic_id")?;
        self.ensure_exists(self.topics(), topic_id, "Topic").await?;

        let section_id = match req.section_id.as_deref() {
            Some(raw) => {
                let id = parse_object_id(raw, "section_id")?;
                self.ensure_exists(self.sections(), id, "Section").await?;
                Some(id)
            }
            None => None,
        };

        AnswerKey::parse(req.question_type, req.correct_answer.as_deref())
            .map_err(ApiError::bad_request)?;

        let now = Utc::now();
        let mut record = QuestionRecord {
            id: None,
            topic_id,
            section_id,
            question_type: req.question_type,
            content: req.content,
            options: req.options,
            correct_answer: req.correct_answer,
            explanation: req.explanation,
            images: req.images,
            created_at: now,
            updated_at: now,
        };

        let inserted = self
            .questions()
            .insert_one(&record)
            .await
            .context("Failed to insert question")?;
        record.id = inserted.inserted_id.as_object_id();

        Ok(QuestionDetail::from(record))
    }

    pub async fn update_question(
        &self,
        id: ObjectId,
        req: QuestionUpdateRequest,
    ) -> Result<QuestionDetail, ApiError> {
        let mut question = self
            .questions()
            .find_one(doc! { "_id": id })
            .await
            .context("Failed to query question")?
            .ok_or(ApiError::QuestionNotFound)?;

        if let Some(content) = req.content {
            question.content = content;
        }
        if let Some(question_type) = req.question_type {
            question.question_type = question_type;
        }
        if let Some(options) = req.options {
            question.options = options;
        }
        if let Some(correct_answer) = req.correct_answer {
            question.correct_answer = Some(correct_answer);
        }
        if let Some(explanation) = req.explanation {
            question.explanation = Some(explanation);
        }
        if let Some(images) = req.images {
            question.images = images;
        }
        if let Some(raw) = req.section_id.as_deref() {
            let section_id = parse_object_id(raw, "section_id")?;
            self.ensure_exists(self.sections(), section_id, "Section")
                .await?;
            question.section_id = Some(section_id);
        }

        // Re-check the key against the (possibly changed) type.
        AnswerKey::parse(question.question_type, question.correct_answer.as_deref())
            .map_err(ApiError::bad_request)?;

        question.updated_at = Utc::now();

        self.questions()
            .replace_one(doc! { "_id": id }, &question)
            .await
            .context("Failed to update question")?;

        Ok(QuestionDetail::from(question))
    }

    pub async fn delete_question(&self, id: ObjectId) -> Result<(), ApiError> {
        let deleted = self
            .questions()
            .delete_one(doc! { "_id": id })
            .await
            .context("Failed to delete question")?;
        if deleted.deleted_count == 0 {
            return Err(ApiError::QuestionNotFound);
        }
        Ok(())
    }

    // ---- node updates (shared shape) ----

    pub async fn update_node(
        &self,
        collection_name: &str,
        id: ObjectId,
        req: NodeUpdateRequest,
    ) -> Result<(), ApiError> {
        let mut set = Document::new();
        if let Some(name) = req.name {
            if name.trim().is_empty() {
                return Err(ApiError::bad_request("Name must not be empty"));
            }
            set.insert("name", name);
        }
        if let Some(description) = req.description {
            set.insert("description", description);
        }
        if let Some(icon_url) = req.icon_url {
            set.insert("icon_url", icon_url);
        }
        if let Some(sort_order) = req.sort_order {
            set.insert("sort_order", sort_order);
        }
        if set.is_empty() {
            return Err(ApiError::bad_request("No fields to update"));
        }
        set.insert("updatedAt", crate::utils::time::chrono_to_bson(Utc::now()));

        let updated = self
            .mongo
            .collection::<Document>(collection_name)
            .update_one(doc! { "_id": id }, doc! { "$set": set })
            .await
            .context("Failed to update content node")?;

        if updated.matched_count == 0 {
            return Err(ApiError::not_found("Content node not found"));
        }
        Ok(())
    }

    async fn ensure_exists<T: Send + Sync>(
        &self,
        collection: Collection<T>,
        id: ObjectId,
        label: &str,
    ) -> Result<(), ApiError> {
        let count = collection
            .count_documents(doc! { "_id": id })
            .await
            .context("Failed to check parent existence")?;
        if count == 0 {
            return Err(ApiError::not_found(format!("{} not found", label)));
        }
        Ok(())
    }

    async fn ensure_no_children<T: Send + Sync>(
        &self,
        collection: Collection<T>,
        filter: Document,
        label: &str,
    ) -> Result<(), ApiError> {
        let count = collection
            .count_documents(filter)
            .await
            .context("Failed to count children")?;
        if count > 0 {
            return Err(ApiError::conflict(format!(
                "Cannot delete: {} {} still reference this node",
                count, label
            )));
        }
        Ok(())
    }
}

pub fn parse_object_id(value: &str, field: &str) -> Result<ObjectId, ApiError> {
    ObjectId::parse_str(value)
        .map_err(|_| ApiError::bad_request(format!("Invalid {}: must be an ObjectId", field)))
}
