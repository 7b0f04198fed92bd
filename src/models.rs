use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Privileged,
    Instructor,
    Learner,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Privileged => "privileged",
            Role::Instructor => "instructor",
            Role::Learner => "learner",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "privileged" | "admin" => Ok(Role::Privileged),
            "instructor" | "teacher" => Ok(Role::Instructor),
            "learner" | "student" => Ok(Role::Learner),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: i64,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    pub name: String,
}

/// A class as delivered by the catalog service. Records embedded in an
/// actor's enrollment carry `course` and may omit `course_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassGroup {
    pub id: i64,
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub course_id: Option<i64>,
    #[serde(default)]
    pub course: Option<Course>,
}

impl ClassGroup {
    /// Fills `course_id` from the embedded course when the raw field is absent.
    pub fn normalized(mut self) -> Self {
        if self.course_id.is_none() {
            self.course_id = self.course.as_ref().map(|course| course.id);
        }
        self
    }

    pub fn belongs_to(&self, course_id: i64) -> bool {
        self.course_id == Some(course_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeTrail {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRankingEntry {
    pub place: i32,
    pub name: String,
    pub tasks_sent: i32,
    #[serde(default)]
    pub tasks_reviewed: i32,
    pub total_tasks: i32,
    pub conclusion_percent: f64,
    pub medium_grade: Option<f64>,
    pub points_earned: i64,
    #[serde(default)]
    pub last_response_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingSnapshot {
    pub trail_id: i64,
    pub trail_name: String,
    pub students_ranking: Vec<StudentRankingEntry>,
}

/// The actor's own record, with the classes it is enrolled in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorRecord {
    pub id: i64,
    pub name: String,
    pub role: Role,
    #[serde(default)]
    pub classes: Vec<ClassGroup>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub courses: Vec<Course>,
    pub classes: Vec<ClassGroup>,
}

impl Catalog {
    pub fn is_empty(&self) -> bool {
        self.courses.is_empty() && self.classes.is_empty()
    }

    pub fn course(&self, id: i64) -> Option<&Course> {
        self.courses.iter().find(|course| course.id == id)
    }

    pub fn classes_for_course(&self, course_id: i64) -> Vec<&ClassGroup> {
        self.classes
            .iter()
            .filter(|class| class.belongs_to(course_id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_service_aliases() {
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Privileged);
        assert_eq!("instructor".parse::<Role>().unwrap(), Role::Instructor);
        assert_eq!(" Student ".parse::<Role>().unwrap(), Role::Learner);
        assert!("janitor".parse::<Role>().is_err());
    }

    #[test]
    fn normalization_prefers_raw_course_id() {
        let class = ClassGroup {
            id: 10,
            name: "Turma A".to_string(),
            code: "TA".to_string(),
            course_id: Some(2),
            course: Some(Course {
                id: 1,
                name: "ADS".to_string(),
            }),
        };
        assert_eq!(class.normalized().course_id, Some(2));
    }

    #[test]
    fn embedded_class_deserializes_without_course_id() {
        let raw = r#"{"id":10,"name":"Turma A","code":"TA","course":{"id":1,"name":"ADS"}}"#;
        let class: ClassGroup = serde_json::from_str(raw).unwrap();
        assert_eq!(class.course_id, None);
        assert_eq!(class.normalized().course_id, Some(1));
    }
}
