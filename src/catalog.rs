use std::collections::HashSet;

use crate::error::ServiceError;
use crate::models::{Actor, ActorRecord, Catalog, ClassGroup, Course, Role};
use crate::service::CatalogService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogScope {
    Unrestricted,
    OwnEnrollmentOnly,
}

pub fn catalog_scope_for(role: Role) -> CatalogScope {
    match role {
        Role::Privileged => CatalogScope::Unrestricted,
        Role::Instructor | Role::Learner => CatalogScope::OwnEnrollmentOnly,
    }
}

/// Course and class catalog visible to `actor`. An actor without
/// enrollments gets an empty catalog, not an error.
pub async fn resolve_catalog<S>(service: &S, actor: &Actor) -> Result<Catalog, ServiceError>
where
    S: CatalogService + ?Sized,
{
    match catalog_scope_for(actor.role) {
        CatalogScope::Unrestricted => {
            let (courses, classes) =
                tokio::try_join!(service.list_courses(), service.list_classes())?;
            tracing::debug!(
                actor = actor.id,
                courses = courses.len(),
                classes = classes.len(),
                "loaded unrestricted catalog"
            );
            Ok(Catalog { courses, classes })
        }
        CatalogScope::OwnEnrollmentOnly => {
            let record = service.get_actor_record(actor.id).await?;
            if record.classes.is_empty() {
                tracing::info!(actor = actor.id, "actor has no enrollments");
            }
            Ok(catalog_from_enrollment(record))
        }
    }
}

pub fn catalog_from_enrollment(record: ActorRecord) -> Catalog {
    // first occurrence wins, enrollment order is kept
    let mut seen = HashSet::new();
    let mut courses: Vec<Course> = Vec::new();

    for class in &record.classes {
        if let Some(course) = &class.course {
            if seen.insert(course.id) {
                courses.push(course.clone());
            }
        }
    }

    let classes: Vec<ClassGroup> = record
        .classes
        .into_iter()
        .map(ClassGroup::normalized)
        .collect();

    tracing::debug!(
        actor = record.id,
        courses = courses.len(),
        classes = classes.len(),
        "derived catalog from enrollment"
    );

    Catalog { courses, classes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::fake::StaticCatalog;

    fn course(id: i64, name: &str) -> Course {
        Course {
            id,
            name: name.to_string(),
        }
    }

    fn embedded_class(id: i64, course: Option<Course>) -> ClassGroup {
        ClassGroup {
            id,
            name: format!("Turma {id}"),
            code: format!("T{id}"),
            course_id: None,
            course,
        }
    }

    #[test]
    fn scope_follows_role() {
        assert_eq!(catalog_scope_for(Role::Privileged), CatalogScope::Unrestricted);
        assert_eq!(
            catalog_scope_for(Role::Instructor),
            CatalogScope::OwnEnrollmentOnly
        );
        assert_eq!(catalog_scope_for(Role::Learner), CatalogScope::OwnEnrollmentOnly);
    }

    #[tokio::test]
    async fn privileged_actor_gets_full_lists_unmodified() {
        let classes = vec![ClassGroup {
            id: 10,
            name: "Turma A".to_string(),
            code: "TA".to_string(),
            course_id: Some(1),
            course: None,
        }];
        let service = StaticCatalog {
            courses: vec![course(1, "ADS")],
            classes: classes.clone(),
            ..Default::default()
        };
        let actor = Actor {
            id: 1,
            role: Role::Privileged,
        };

        let catalog = resolve_catalog(&service, &actor).await.unwrap();
        assert_eq!(catalog.courses, vec![course(1, "ADS")]);
        assert_eq!(catalog.classes, classes);
    }

    #[tokio::test]
    async fn learner_catalog_dedupes_courses_and_fills_course_ids() {
        let service = StaticCatalog {
            actors: vec![ActorRecord {
                id: 7,
                name: "Avery Lee".to_string(),
                role: Role::Learner,
                classes: vec![
                    embedded_class(10, Some(course(1, "ADS"))),
                    embedded_class(11, Some(course(1, "ADS"))),
                    embedded_class(20, Some(course(2, "Web"))),
                    embedded_class(30, None),
                ],
            }],
            ..Default::default()
        };
        let actor = Actor {
            id: 7,
            role: Role::Learner,
        };

        let catalog = resolve_catalog(&service, &actor).await.unwrap();
        assert_eq!(catalog.courses, vec![course(1, "ADS"), course(2, "Web")]);
        let ids: Vec<Option<i64>> = catalog.classes.iter().map(|c| c.course_id).collect();
        assert_eq!(ids, vec![Some(1), Some(1), Some(2), None]);
        assert_eq!(catalog.classes_for_course(1).len(), 2);
    }

    #[tokio::test]
    async fn zero_enrollments_is_an_empty_catalog() {
        let service = StaticCatalog {
            actors: vec![ActorRecord {
                id: 8,
                name: "Jules Moreno".to_string(),
                role: Role::Instructor,
                classes: Vec::new(),
            }],
            ..Default::default()
        };
        let actor = Actor {
            id: 8,
            role: Role::Instructor,
        };

        let catalog = resolve_catalog(&service, &actor).await.unwrap();
        assert!(catalog.is_empty());
    }

    #[tokio::test]
    async fn service_failure_is_reported() {
        let service = StaticCatalog::default();
        service
            .fail_catalog
            .store(true, std::sync::atomic::Ordering::SeqCst);
        let actor = Actor {
            id: 1,
            role: Role::Privileged,
        };
        assert!(resolve_catalog(&service, &actor).await.is_err());
    }
}
