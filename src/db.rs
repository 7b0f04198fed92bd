use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::ServiceError;
use crate::models::{
    Actor, ActorRecord, ClassGroup, Course, KnowledgeTrail, RankingSnapshot, Role,
    StudentRankingEntry,
};
use crate::service::CatalogService;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Catalog and ranking records stored in the `ranking_board` schema.
#[derive(Clone)]
pub struct PgCatalogService {
    pool: PgPool,
}

impl PgCatalogService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_role(raw: &str) -> Result<Role, ServiceError> {
    raw.parse::<Role>().map_err(ServiceError::Decode)
}

fn class_from_row(row: &PgRow) -> ClassGroup {
    let course_id: Option<i64> = row.get("course_id");
    let course_name: Option<String> = row.get("course_name");
    let course = match (course_id, course_name) {
        (Some(id), Some(name)) => Some(Course { id, name }),
        _ => None,
    };

    ClassGroup {
        id: row.get("id"),
        name: row.get("name"),
        code: row.get("code"),
        course_id,
        course,
    }
}

fn entry_from_row(row: &PgRow) -> StudentRankingEntry {
    StudentRankingEntry {
        place: row.get("place"),
        name: row.get("student_name"),
        tasks_sent: row.get("tasks_sent"),
        tasks_reviewed: row.get("tasks_reviewed"),
        total_tasks: row.get("total_tasks"),
        conclusion_percent: row.get("conclusion_percent"),
        medium_grade: row.get("medium_grade"),
        points_earned: row.get("points_earned"),
        last_response_date: row.get("last_response_date"),
    }
}

#[async_trait]
impl CatalogService for PgCatalogService {
    async fn get_actor(&self, actor_id: i64) -> Result<Actor, ServiceError> {
        let row = sqlx::query("SELECT id, role FROM ranking_board.users WHERE id = $1")
            .bind(actor_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServiceError::NotFound {
                entity: "actor",
                id: actor_id,
            })?;

        let role: String = row.get("role");
        Ok(Actor {
            id: row.get("id"),
            role: parse_role(&role)?,
        })
    }

    async fn list_courses(&self) -> Result<Vec<Course>, ServiceError> {
        let rows = sqlx::query("SELECT id, name FROM ranking_board.courses ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| Course {
                id: row.get("id"),
                name: row.get("name"),
            })
            .collect())
    }

    async fn list_classes(&self) -> Result<Vec<ClassGroup>, ServiceError> {
        let rows = sqlx::query(
            "SELECT c.id, c.name, c.code, c.course_id, co.name AS course_name \
             FROM ranking_board.classes c \
             LEFT JOIN ranking_board.courses co ON co.id = c.course_id \
             ORDER BY c.name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(class_from_row).collect())
    }

    async fn get_actor_record(&self, actor_id: i64) -> Result<ActorRecord, ServiceError> {
        let user = sqlx::query("SELECT id, full_name, role FROM ranking_board.users WHERE id = $1")
            .bind(actor_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServiceError::NotFound {
                entity: "actor",
                id: actor_id,
            })?;

        let rows = sqlx::query(
            "SELECT c.id, c.name, c.code, c.course_id, co.name AS course_name \
             FROM ranking_board.enrollments e \
             JOIN ranking_board.classes c ON c.id = e.class_id \
             LEFT JOIN ranking_board.courses co ON co.id = c.course_id \
             WHERE e.user_id = $1 \
             ORDER BY c.name",
        )
        .bind(actor_id)
        .fetch_all(&self.pool)
        .await?;

        let role: String = user.get("role");
        Ok(ActorRecord {
            id: user.get("id"),
            name: user.get("full_name"),
            role: parse_role(&role)?,
            classes: rows.iter().map(class_from_row).collect(),
        })
    }

    async fn list_ranked_trails(&self, class_id: i64) -> Result<Vec<KnowledgeTrail>, ServiceError> {
        let rows = sqlx::query(
            "SELECT t.id, t.name FROM ranking_board.knowledge_trails t \
             WHERE t.class_id = $1 AND EXISTS ( \
                 SELECT 1 FROM ranking_board.ranking_entries r \
                 WHERE r.trail_id = t.id AND r.class_id = t.class_id) \
             ORDER BY t.name",
        )
        .bind(class_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| KnowledgeTrail {
                id: row.get("id"),
                name: row.get("name"),
            })
            .collect())
    }

    async fn get_ranking(
        &self,
        class_id: i64,
        trail_ids: &[i64],
    ) -> Result<Vec<RankingSnapshot>, ServiceError> {
        let mut snapshots = Vec::with_capacity(trail_ids.len());

        for &trail_id in trail_ids {
            let trail = sqlx::query(
                "SELECT name FROM ranking_board.knowledge_trails WHERE id = $1 AND class_id = $2",
            )
            .bind(trail_id)
            .bind(class_id)
            .fetch_optional(&self.pool)
            .await?;

            let Some(trail) = trail else {
                tracing::debug!(class_id, trail_id, "trail not found, skipping");
                continue;
            };

            let rows = sqlx::query(
                "SELECT place, student_name, tasks_sent, tasks_reviewed, total_tasks, \
                 conclusion_percent, medium_grade, points_earned, last_response_date \
                 FROM ranking_board.ranking_entries \
                 WHERE class_id = $1 AND trail_id = $2 \
                 ORDER BY place, student_name",
            )
            .bind(class_id)
            .bind(trail_id)
            .fetch_all(&self.pool)
            .await?;

            snapshots.push(RankingSnapshot {
                trail_id,
                trail_name: trail.get("name"),
                students_ranking: rows.iter().map(entry_from_row).collect(),
            });
        }

        Ok(snapshots)
    }
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let users = vec![
        (1_i64, "Rita Carvalho", "privileged"),
        (2, "Marcos Prado", "instructor"),
        (3, "Maria Silva", "learner"),
        (4, "Bruno Teixeira", "learner"),
    ];
    for (id, name, role) in users {
        sqlx::query(
            r#"
            INSERT INTO ranking_board.users (id, full_name, role)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE
            SET full_name = EXCLUDED.full_name, role = EXCLUDED.role
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(role)
        .execute(pool)
        .await?;
    }

    let courses = vec![(1_i64, "ADS"), (2, "Desenvolvimento Web")];
    for (id, name) in courses {
        sqlx::query(
            r#"
            INSERT INTO ranking_board.courses (id, name) VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name
            "#,
        )
        .bind(id)
        .bind(name)
        .execute(pool)
        .await?;
    }

    let classes = vec![
        (10_i64, "Turma A", "ADS-2A", 1_i64),
        (11, "Turma B", "ADS-3B", 1),
        (20, "Backend Avancado", "WEB-BA", 2),
    ];
    for (id, name, code, course_id) in classes {
        sqlx::query(
            r#"
            INSERT INTO ranking_board.classes (id, name, code, course_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name, code = EXCLUDED.code, course_id = EXCLUDED.course_id
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(code)
        .bind(course_id)
        .execute(pool)
        .await?;
    }

    // user 4 stays without enrollments
    let enrollments = vec![(2_i64, 10_i64), (2, 11), (3, 10), (3, 20)];
    for (user_id, class_id) in enrollments {
        sqlx::query(
            r#"
            INSERT INTO ranking_board.enrollments (user_id, class_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(class_id)
        .execute(pool)
        .await?;
    }

    let trails = vec![
        (100_i64, "Trilha X", 10_i64),
        (101, "Fundamentos de SQL", 10),
        (110, "Logica de Programacao", 11),
        (200, "APIs REST", 20),
    ];
    for (id, name, class_id) in trails {
        upsert_trail(pool, id, name, class_id)
            .await?
            .with_context(|| format!("trail {id} already belongs to another class"))?;
    }

    let date = |month, day| NaiveDate::from_ymd_opt(2026, month, day).context("invalid date");
    let entries = vec![
        (
            "seed-001",
            10_i64,
            100_i64,
            1,
            "Maria Silva",
            9,
            9,
            10,
            90.0,
            Some(9.5),
            142_i64,
            Some(date(2, 2)?),
        ),
        (
            "seed-002",
            10,
            100,
            2,
            "Joao Santos",
            8,
            7,
            10,
            84.0,
            Some(7.5),
            118,
            Some(date(1, 30)?),
        ),
        (
            "seed-003",
            10,
            100,
            3,
            "Ana Costa",
            8,
            0,
            10,
            80.0,
            None,
            64,
            Some(date(1, 28)?),
        ),
        (
            "seed-004",
            10,
            100,
            4,
            "Rafael Lima",
            5,
            5,
            10,
            56.0,
            Some(6.8),
            51,
            None,
        ),
        (
            "seed-005",
            20,
            200,
            1,
            "Maria Silva",
            6,
            6,
            6,
            100.0,
            Some(8.8),
            130,
            Some(date(2, 1)?),
        ),
    ];
    for (
        source_key,
        class_id,
        trail_id,
        place,
        name,
        sent,
        reviewed,
        total,
        conclusion,
        grade,
        points,
        last,
    ) in entries
    {
        sqlx::query(
            r#"
            INSERT INTO ranking_board.ranking_entries
            (id, class_id, trail_id, place, student_name, tasks_sent, tasks_reviewed,
             total_tasks, conclusion_percent, medium_grade, points_earned, last_response_date, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(class_id)
        .bind(trail_id)
        .bind(place)
        .bind(name)
        .bind(sent)
        .bind(reviewed)
        .bind(total)
        .bind(conclusion)
        .bind(grade)
        .bind(points)
        .bind(last)
        .bind(source_key)
        .execute(pool)
        .await?;
    }

    Ok(())
}

const UPSERT_TRAIL: &str = r#"
    INSERT INTO ranking_board.knowledge_trails (id, name, class_id)
    VALUES ($1, $2, $3)
    ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name
    WHERE knowledge_trails.class_id = EXCLUDED.class_id
    RETURNING id
"#;

/// Inserts or renames a trail. Returns `None` when the id already belongs to
/// another class, since ranking rows are only read back through their trail's class.
async fn upsert_trail(
    pool: &PgPool,
    id: i64,
    name: &str,
    class_id: i64,
) -> anyhow::Result<Option<i64>> {
    let row = sqlx::query(UPSERT_TRAIL)
        .bind(id)
        .bind(name)
        .bind(class_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|row| row.get("id")))
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        class_id: i64,
        trail_id: i64,
        trail_name: String,
        place: i32,
        student_name: String,
        tasks_sent: i32,
        #[serde(default)]
        tasks_reviewed: Option<i32>,
        total_tasks: i32,
        conclusion_percent: f64,
        medium_grade: Option<f64>,
        points_earned: i64,
        last_response_date: Option<NaiveDate>,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("invalid ranking row {}", line + 1))?;
        upsert_trail(pool, row.trail_id, &row.trail_name, row.class_id)
            .await?
            .with_context(|| {
                format!(
                    "ranking row {}: trail {} already belongs to another class than {}",
                    line + 1,
                    row.trail_id,
                    row.class_id
                )
            })?;

        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        let result = sqlx::query(
            r#"
            INSERT INTO ranking_board.ranking_entries
            (id, class_id, trail_id, place, student_name, tasks_sent, tasks_reviewed,
             total_tasks, conclusion_percent, medium_grade, points_earned, last_response_date, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(row.class_id)
        .bind(row.trail_id)
        .bind(row.place)
        .bind(&row.student_name)
        .bind(row.tasks_sent)
        .bind(row.tasks_reviewed.unwrap_or(0))
        .bind(row.total_tasks)
        .bind(row.conclusion_percent)
        .bind(row.medium_grade)
        .bind(row.points_earned)
        .bind(row.last_response_date)
        .bind(source_key)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        } else {
            tracing::debug!(line = line + 1, "ranking row already imported");
        }
    }

    Ok(inserted)
}
