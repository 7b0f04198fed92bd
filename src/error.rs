use thiserror::Error;

use crate::cascade::Level;

/// Failure of a call into the catalog service.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("database request failed: {0}")]
    Database(#[source] sqlx::Error),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error("failed to decode service data: {0}")]
    Decode(String),
    #[error("catalog service unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                ServiceError::Unavailable(err.to_string())
            }
            other => ServiceError::Database(other),
        }
    }
}

/// Level-local load failure. Every variant is retryable by replaying the
/// request that produced it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("could not load the course and class catalog: {message}")]
    Catalog { message: String },
    #[error("could not load trails for class {class_id}: {message}")]
    Trails { class_id: i64, message: String },
    #[error("could not load ranking for class {class_id}, trail {trail_id}: {message}")]
    Ranking {
        class_id: i64,
        trail_id: i64,
        message: String,
    },
}

/// Cascade input that was refused. State is untouched when one of these is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("cannot select a {0} before its parent level is selected")]
    ParentUnset(Level),
    #[error("the {0} selector is disabled until its options are loaded")]
    SelectorDisabled(Level),
    #[error("course {0} is not in the visible catalog")]
    UnknownCourse(i64),
    #[error("class {class_id} is not offered under course {course_id}")]
    UnknownClass { course_id: i64, class_id: i64 },
    #[error("trail {trail_id} is not ranked for class {class_id}")]
    UnknownTrail { class_id: i64, trail_id: i64 },
    #[error("nothing to retry at the {0} level")]
    NothingToRetry(Level),
}
