use anyhow::{Result, anyhow};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::log_db_operation;
use crate::models::*;

/// How long a connection waits on another writer's lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");

        let mut options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // An in-memory database lives as long as its connections; keep exactly
        // one open so data survives and writers are serialized.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options.connect_with(options).await?;
        let db = Database { pool };
        db.migrate().await?;
        log_db_operation!(info, "migrate", "schema ready");
        Ok(db)
    }

    /// Opens a transaction holding the write lock from its first statement,
    /// so reads inside it never need a lock upgrade that could fail busy.
    async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS contests (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                name TEXT NOT NULL,
                role TEXT NOT NULL,
                contest_date TEXT NOT NULL,
                edital_text TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS subjects (
                id TEXT PRIMARY KEY,
                contest_id TEXT NOT NULL,
                name TEXT NOT NULL,
                sort_order INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (contest_id) REFERENCES contests(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS topics (
                id TEXT PRIMARY KEY,
                subject_id TEXT NOT NULL,
                name TEXT NOT NULL,
                sort_order INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (subject_id) REFERENCES subjects(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS subtopics (
                id TEXT PRIMARY KEY,
                topic_id TEXT NOT NULL,
                name TEXT NOT NULL,
                sort_order INTEGER NOT NULL,
                estimated_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (topic_id) REFERENCES topics(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS flashcards (
                id TEXT PRIMARY KEY,
                subtopic_id TEXT NOT NULL,
                question TEXT NOT NULL,
                answer TEXT NOT NULL,
                importance_rank INTEGER NOT NULL,
                is_approved INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (subtopic_id) REFERENCES subtopics(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        // next_review_date is epoch milliseconds so the due filter is a
        // numeric comparison.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_progress (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                contest_id TEXT NOT NULL,
                flashcard_id TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'NOT_SEEN',
                repetitions INTEGER NOT NULL DEFAULT 0,
                ease_factor REAL NOT NULL DEFAULT 2.5,
                interval_days INTEGER NOT NULL DEFAULT 0,
                next_review_date INTEGER,
                last_reviewed_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (user_id, flashcard_id),
                FOREIGN KEY (contest_id) REFERENCES contests(id) ON DELETE CASCADE,
                FOREIGN KEY (flashcard_id) REFERENCES flashcards(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_user_progress_queue
                ON user_progress (user_id, contest_id, next_review_date);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // Contest operations
    pub async fn create_contest(
        &self,
        user_id: &str,
        request: &CreateContestRequest,
        now: DateTime<Utc>,
    ) -> Result<Contest> {
        let contest = Contest {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            name: request.name.clone(),
            role: request.role.clone(),
            contest_date: request.contest_date,
            edital_text: request.edital_text.clone(),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO contests
                (id, user_id, name, role, contest_date, edital_text, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(contest.id.to_string())
        .bind(&contest.user_id)
        .bind(&contest.name)
        .bind(&contest.role)
        .bind(encode_ts(&contest.contest_date))
        .bind(&contest.edital_text)
        .bind(encode_ts(&contest.created_at))
        .bind(encode_ts(&contest.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(contest)
    }

    pub async fn list_contests(&self, user_id: &str) -> Result<Vec<Contest>> {
        let rows = sqlx::query(
            "SELECT * FROM contests WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(contest_from_row).collect()
    }

    pub async fn get_contest(&self, user_id: &str, contest_id: Uuid) -> Result<Option<Contest>> {
        let row = sqlx::query("SELECT * FROM contests WHERE id = ?1 AND user_id = ?2")
            .bind(contest_id.to_string())
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(contest_from_row).transpose()
    }

    /// Removes a contest with its whole plan and every progress record under it.
    pub async fn delete_contest(&self, user_id: &str, contest_id: Uuid) -> Result<bool> {
        let id = contest_id.to_string();
        let mut tx = self.begin_write().await?;

        let owned = sqlx::query("SELECT id FROM contests WHERE id = ?1 AND user_id = ?2")
            .bind(&id)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
        if owned.is_none() {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("DELETE FROM user_progress WHERE contest_id = ?1")
            .bind(&id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            DELETE FROM flashcards WHERE subtopic_id IN (
                SELECT st.id FROM subtopics st
                JOIN topics t ON st.topic_id = t.id
                JOIN subjects s ON t.subject_id = s.id
                WHERE s.contest_id = ?1
            )
            "#,
        )
        .bind(&id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            DELETE FROM subtopics WHERE topic_id IN (
                SELECT t.id FROM topics t
                JOIN subjects s ON t.subject_id = s.id
                WHERE s.contest_id = ?1
            )
            "#,
        )
        .bind(&id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            DELETE FROM topics
            WHERE subject_id IN (SELECT id FROM subjects WHERE contest_id = ?1)
            "#,
        )
        .bind(&id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM subjects WHERE contest_id = ?1")
            .bind(&id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM contests WHERE id = ?1 AND user_id = ?2")
            .bind(&id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    // Study plan operations
    pub async fn create_plan(
        &self,
        contest_id: Uuid,
        subjects: &[PlanSubjectInput],
        now: DateTime<Utc>,
    ) -> Result<StudyPlan> {
        let start = Instant::now();
        let mut tx = self.begin_write().await?;
        let mut created_subjects = Vec::with_capacity(subjects.len());

        for subject_input in subjects {
            let subject = Subject {
                id: Uuid::new_v4(),
                contest_id,
                name: subject_input.name.clone(),
                order: subject_input.order,
                created_at: now,
                updated_at: now,
            };

            sqlx::query(
                r#"
                INSERT INTO subjects (id, contest_id, name, sort_order, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(subject.id.to_string())
            .bind(subject.contest_id.to_string())
            .bind(&subject.name)
            .bind(subject.order)
            .bind(encode_ts(&now))
            .bind(encode_ts(&now))
            .execute(&mut *tx)
            .await?;

            let mut created_topics = Vec::with_capacity(subject_input.topics.len());
            for topic_input in &subject_input.topics {
                let topic = Topic {
                    id: Uuid::new_v4(),
                    subject_id: subject.id,
                    name: topic_input.name.clone(),
                    order: topic_input.order,
                    created_at: now,
                    updated_at: now,
                };

                sqlx::query(
                    r#"
                    INSERT INTO topics (id, subject_id, name, sort_order, created_at, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    "#,
                )
                .bind(topic.id.to_string())
                .bind(topic.subject_id.to_string())
                .bind(&topic.name)
                .bind(topic.order)
                .bind(encode_ts(&now))
                .bind(encode_ts(&now))
                .execute(&mut *tx)
                .await?;

                let mut created_subtopics = Vec::with_capacity(topic_input.subtopics.len());
                for subtopic_input in &topic_input.subtopics {
                    let subtopic = Subtopic {
                        id: Uuid::new_v4(),
                        topic_id: topic.id,
                        name: subtopic_input.name.clone(),
                        order: subtopic_input.order,
                        estimated_count: subtopic_input.estimated_count.unwrap_or(0),
                        created_at: now,
                        updated_at: now,
                    };

                    sqlx::query(
                        r#"
                        INSERT INTO subtopics
                            (id, topic_id, name, sort_order, estimated_count,
                             created_at, updated_at)
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                        "#,
                    )
                    .bind(subtopic.id.to_string())
                    .bind(subtopic.topic_id.to_string())
                    .bind(&subtopic.name)
                    .bind(subtopic.order)
                    .bind(subtopic.estimated_count)
                    .bind(encode_ts(&now))
                    .bind(encode_ts(&now))
                    .execute(&mut *tx)
                    .await?;

                    created_subtopics.push(subtopic);
                }

                created_topics.push(TopicWithSubtopics {
                    topic,
                    subtopics: created_subtopics,
                });
            }

            created_subjects.push(SubjectWithTopics {
                subject,
                topics: created_topics,
            });
        }

        tx.commit().await?;
        log_db_operation!(
            debug,
            "create_plan",
            count = created_subjects.len(),
            duration_ms = start.elapsed().as_millis() as u64
        );

        Ok(StudyPlan {
            subjects: created_subjects,
        })
    }

    pub async fn get_plan(&self, contest_id: Uuid) -> Result<StudyPlan> {
        let id = contest_id.to_string();

        let subject_rows = sqlx::query(
            "SELECT * FROM subjects WHERE contest_id = ?1 ORDER BY sort_order, rowid",
        )
        .bind(&id)
        .fetch_all(&self.pool)
        .await?;

        let topic_rows = sqlx::query(
            r#"
            SELECT t.* FROM topics t
            JOIN subjects s ON t.subject_id = s.id
            WHERE s.contest_id = ?1
            ORDER BY t.sort_order, t.rowid
            "#,
        )
        .bind(&id)
        .fetch_all(&self.pool)
        .await?;

        let subtopic_rows = sqlx::query(
            r#"
            SELECT st.* FROM subtopics st
            JOIN topics t ON st.topic_id = t.id
            JOIN subjects s ON t.subject_id = s.id
            WHERE s.contest_id = ?1
            ORDER BY st.sort_order, st.rowid
            "#,
        )
        .bind(&id)
        .fetch_all(&self.pool)
        .await?;

        let mut subtopics_by_topic: HashMap<Uuid, Vec<Subtopic>> = HashMap::new();
        for row in &subtopic_rows {
            let subtopic = subtopic_from_row(row)?;
            subtopics_by_topic.entry(subtopic.topic_id).or_default().push(subtopic);
        }

        let mut topics_by_subject: HashMap<Uuid, Vec<TopicWithSubtopics>> = HashMap::new();
        for row in &topic_rows {
            let topic = topic_from_row(row)?;
            let subtopics = subtopics_by_topic.remove(&topic.id).unwrap_or_default();
            topics_by_subject
                .entry(topic.subject_id)
                .or_default()
                .push(TopicWithSubtopics { topic, subtopics });
        }

        let mut subjects = Vec::with_capacity(subject_rows.len());
        for row in &subject_rows {
            let subject = subject_from_row(row)?;
            let topics = topics_by_subject.remove(&subject.id).unwrap_or_default();
            subjects.push(SubjectWithTopics { subject, topics });
        }

        Ok(StudyPlan { subjects })
    }

    /// Applies estimates to subtopics of the given contest, ignoring any
    /// subtopic that belongs elsewhere. Returns the number of rows changed.
    pub async fn update_estimates(
        &self,
        contest_id: Uuid,
        estimates: &[SubtopicEstimate],
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let mut tx = self.begin_write().await?;
        let mut updated = 0;

        for estimate in estimates {
            let result = sqlx::query(
                r#"
                UPDATE subtopics
                SET estimated_count = ?1, updated_at = ?2
                WHERE id = ?3
                AND topic_id IN (
                    SELECT t.id FROM topics t
                    JOIN subjects s ON t.subject_id = s.id
                    WHERE s.contest_id = ?4
                )
                "#,
            )
            .bind(estimate.estimated_count)
            .bind(encode_ts(&now))
            .bind(estimate.subtopic_id.to_string())
            .bind(contest_id.to_string())
            .execute(&mut *tx)
            .await?;

            updated += result.rows_affected();
        }

        tx.commit().await?;
        Ok(updated)
    }

    /// Contest owning `subtopic_id`, provided that contest belongs to `user_id`.
    pub async fn find_subtopic_contest(
        &self,
        user_id: &str,
        subtopic_id: Uuid,
    ) -> Result<Option<Uuid>> {
        let row = sqlx::query(
            r#"
            SELECT s.contest_id FROM subtopics st
            JOIN topics t ON st.topic_id = t.id
            JOIN subjects s ON t.subject_id = s.id
            JOIN contests c ON s.contest_id = c.id
            WHERE st.id = ?1 AND c.user_id = ?2
            "#,
        )
        .bind(subtopic_id.to_string())
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| uuid_column(&row, "contest_id")).transpose()
    }

    // Flashcard operations

    /// Stores flashcards under a subtopic and materializes an unseen progress
    /// record for each one, atomically.
    pub async fn add_flashcards(
        &self,
        user_id: &str,
        contest_id: Uuid,
        subtopic_id: Uuid,
        flashcards: &[NewFlashcard],
        now: DateTime<Utc>,
    ) -> Result<Vec<Flashcard>> {
        let start = Instant::now();
        let mut tx = self.begin_write().await?;
        let mut created = Vec::with_capacity(flashcards.len());

        for input in flashcards {
            let flashcard = Flashcard {
                id: Uuid::new_v4(),
                subtopic_id,
                question: input.question.clone(),
                answer: input.answer.clone(),
                importance_rank: input.importance_rank,
                is_approved: true,
                created_at: now,
                updated_at: now,
            };

            sqlx::query(
                r#"
                INSERT INTO flashcards
                    (id, subtopic_id, question, answer, importance_rank, is_approved,
                     created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(flashcard.id.to_string())
            .bind(flashcard.subtopic_id.to_string())
            .bind(&flashcard.question)
            .bind(&flashcard.answer)
            .bind(flashcard.importance_rank)
            .bind(flashcard.is_approved)
            .bind(encode_ts(&now))
            .bind(encode_ts(&now))
            .execute(&mut *tx)
            .await?;

            let progress = ReviewProgress::new(user_id, contest_id, flashcard.id, now);
            sqlx::query(
                r#"
                INSERT INTO user_progress
                    (id, user_id, contest_id, flashcard_id, status, repetitions, ease_factor,
                     interval_days, next_review_date, last_reviewed_at, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                "#,
            )
            .bind(progress.id.to_string())
            .bind(&progress.user_id)
            .bind(progress.contest_id.to_string())
            .bind(progress.flashcard_id.to_string())
            .bind(progress.status.as_str())
            .bind(progress.repetitions)
            .bind(progress.ease_factor)
            .bind(progress.interval)
            .bind(progress.next_review_date.map(|d| d.timestamp_millis()))
            .bind(progress.last_reviewed_at.map(|d| encode_ts(&d)))
            .bind(encode_ts(&progress.created_at))
            .bind(encode_ts(&progress.updated_at))
            .execute(&mut *tx)
            .await?;

            created.push(flashcard);
        }

        tx.commit().await?;
        log_db_operation!(
            debug,
            "add_flashcards",
            count = created.len(),
            duration_ms = start.elapsed().as_millis() as u64
        );

        Ok(created)
    }

    // Progress operations
    pub async fn get_progress(
        &self,
        user_id: &str,
        flashcard_id: Uuid,
    ) -> Result<Option<ReviewProgress>> {
        let row = sqlx::query(OWNED_PROGRESS_QUERY)
            .bind(flashcard_id.to_string())
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(progress_from_row).transpose()
    }

    /// Reads, transforms and writes back one progress record inside a single
    /// transaction. Returns `None` without writing when the user has no
    /// record for the flashcard.
    pub async fn apply_review<F>(
        &self,
        user_id: &str,
        flashcard_id: Uuid,
        update: F,
    ) -> Result<Option<ReviewProgress>>
    where
        F: FnOnce(&ReviewProgress) -> ReviewProgress,
    {
        let start = Instant::now();
        let mut tx = self.begin_write().await?;

        let row = sqlx::query(OWNED_PROGRESS_QUERY)
            .bind(flashcard_id.to_string())
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;

        let current = match row.as_ref().map(progress_from_row).transpose()? {
            Some(progress) => progress,
            None => {
                tx.rollback().await?;
                return Ok(None);
            }
        };

        let updated = update(&current);

        let result = sqlx::query(
            r#"
            UPDATE user_progress
            SET status = ?1, repetitions = ?2, ease_factor = ?3, interval_days = ?4,
                next_review_date = ?5, last_reviewed_at = ?6, updated_at = ?7
            WHERE id = ?8
            "#,
        )
        .bind(updated.status.as_str())
        .bind(updated.repetitions)
        .bind(updated.ease_factor)
        .bind(updated.interval)
        .bind(updated.next_review_date.map(|d| d.timestamp_millis()))
        .bind(updated.last_reviewed_at.map(|d| encode_ts(&d)))
        .bind(encode_ts(&updated.updated_at))
        .bind(current.id.to_string())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() != 1 {
            tx.rollback().await?;
            return Err(anyhow!("Progress record '{}' was not updated", current.id));
        }

        tx.commit().await?;
        log_db_operation!(
            debug,
            "apply_review",
            flashcard_id = flashcard_id,
            duration_ms = start.elapsed().as_millis() as u64
        );

        Ok(Some(updated))
    }

    /// Progress records of a contest that are due at `as_of`, joined with their
    /// flashcards, oldest record first.
    pub async fn get_due_cards(
        &self,
        user_id: &str,
        contest_id: Uuid,
        as_of: DateTime<Utc>,
        subtopic_id: Option<Uuid>,
    ) -> Result<Vec<DueCard>> {
        let start = Instant::now();
        let mut sql = String::from(
            r#"
            SELECT up.*,
                   f.id AS f_id, f.subtopic_id AS f_subtopic_id, f.question AS f_question,
                   f.answer AS f_answer, f.importance_rank AS f_importance_rank,
                   f.is_approved AS f_is_approved, f.created_at AS f_created_at,
                   f.updated_at AS f_updated_at
            FROM user_progress up
            JOIN flashcards f ON up.flashcard_id = f.id
            WHERE up.user_id = ?1 AND up.contest_id = ?2
            AND (up.next_review_date IS NULL OR up.next_review_date <= ?3)
            "#,
        );
        if subtopic_id.is_some() {
            sql.push_str(" AND f.subtopic_id = ?4");
        }
        sql.push_str(" ORDER BY up.created_at ASC, up.rowid ASC");

        let mut query = sqlx::query(&sql)
            .bind(user_id)
            .bind(contest_id.to_string())
            .bind(as_of.timestamp_millis());
        if let Some(subtopic_id) = subtopic_id {
            query = query.bind(subtopic_id.to_string());
        }

        let rows = query.fetch_all(&self.pool).await?;

        let mut cards = Vec::with_capacity(rows.len());
        for row in &rows {
            cards.push(DueCard {
                progress: progress_from_row(row)?,
                flashcard: flashcard_from_row(row, "f_")?,
            });
        }

        log_db_operation!(
            debug,
            "get_due_cards",
            count = cards.len(),
            duration_ms = start.elapsed().as_millis() as u64
        );

        Ok(cards)
    }
}

/// Progress record for (flashcard, user) whose contest is also owned by the user.
const OWNED_PROGRESS_QUERY: &str = r#"
    SELECT up.* FROM user_progress up
    JOIN contests c ON up.contest_id = c.id
    WHERE up.flashcard_id = ?1 AND up.user_id = ?2 AND c.user_id = ?2
"#;

// Timestamps are stored as fixed-width UTC RFC 3339 so text order matches time order.
fn encode_ts(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_ts(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

fn decode_millis(value: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(value)
        .ok_or_else(|| anyhow!("Timestamp out of range: {} ms", value))
}

fn uuid_column(row: &SqliteRow, column: &str) -> Result<Uuid> {
    Ok(Uuid::parse_str(&row.try_get::<String, _>(column)?)?)
}

fn ts_column(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>> {
    decode_ts(&row.try_get::<String, _>(column)?)
}

fn contest_from_row(row: &SqliteRow) -> Result<Contest> {
    Ok(Contest {
        id: uuid_column(row, "id")?,
        user_id: row.try_get("user_id")?,
        name: row.try_get("name")?,
        role: row.try_get("role")?,
        contest_date: ts_column(row, "contest_date")?,
        edital_text: row.try_get("edital_text")?,
        created_at: ts_column(row, "created_at")?,
        updated_at: ts_column(row, "updated_at")?,
    })
}

fn subject_from_row(row: &SqliteRow) -> Result<Subject> {
    Ok(Subject {
        id: uuid_column(row, "id")?,
        contest_id: uuid_column(row, "contest_id")?,
        name: row.try_get("name")?,
        order: row.try_get("sort_order")?,
        created_at: ts_column(row, "created_at")?,
        updated_at: ts_column(row, "updated_at")?,
    })
}

fn topic_from_row(row: &SqliteRow) -> Result<Topic> {
    Ok(Topic {
        id: uuid_column(row, "id")?,
        subject_id: uuid_column(row, "subject_id")?,
        name: row.try_get("name")?,
        order: row.try_get("sort_order")?,
        created_at: ts_column(row, "created_at")?,
        updated_at: ts_column(row, "updated_at")?,
    })
}

fn subtopic_from_row(row: &SqliteRow) -> Result<Subtopic> {
    Ok(Subtopic {
        id: uuid_column(row, "id")?,
        topic_id: uuid_column(row, "topic_id")?,
        name: row.try_get("name")?,
        order: row.try_get("sort_order")?,
        estimated_count: row.try_get("estimated_count")?,
        created_at: ts_column(row, "created_at")?,
        updated_at: ts_column(row, "updated_at")?,
    })
}

fn flashcard_from_row(row: &SqliteRow, prefix: &str) -> Result<Flashcard> {
    let column = |name: &str| format!("{}{}", prefix, name);
    Ok(Flashcard {
        id: uuid_column(row, &column("id"))?,
        subtopic_id: uuid_column(row, &column("subtopic_id"))?,
        question: row.try_get(column("question").as_str())?,
        answer: row.try_get(column("answer").as_str())?,
        importance_rank: row.try_get(column("importance_rank").as_str())?,
        is_approved: row.try_get(column("is_approved").as_str())?,
        created_at: ts_column(row, &column("created_at"))?,
        updated_at: ts_column(row, &column("updated_at"))?,
    })
}

fn progress_from_row(row: &SqliteRow) -> Result<ReviewProgress> {
    Ok(ReviewProgress {
        id: uuid_column(row, "id")?,
        user_id: row.try_get("user_id")?,
        contest_id: uuid_column(row, "contest_id")?,
        flashcard_id: uuid_column(row, "flashcard_id")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        repetitions: row.try_get("repetitions")?,
        ease_factor: row.try_get("ease_factor")?,
        interval: row.try_get("interval_days")?,
        next_review_date: row
            .try_get::<Option<i64>, _>("next_review_date")?
            .map(decode_millis)
            .transpose()?,
        last_reviewed_at: row
            .try_get::<Option<String>, _>("last_reviewed_at")?
            .map(|value| decode_ts(&value))
            .transpose()?,
        created_at: ts_column(row, "created_at")?,
        updated_at: ts_column(row, "updated_at")?,
    })
}
