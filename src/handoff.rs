use std::collections::HashMap;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::cascade::{CascadeSelection, SelectionCascade};

/// Typed key: each name is bound to exactly one payload type.
pub struct HandoffKey<T> {
    name: &'static str,
    _payload: PhantomData<fn() -> T>,
}

impl<T> HandoffKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _payload: PhantomData,
        }
    }
}

/// Filters resolved on the ranking view, handed to the report writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingFilters {
    pub course_id: i64,
    pub course_name: String,
    pub class_id: i64,
    pub class_name: String,
    pub trail_id: i64,
    pub trail_name: String,
}

impl RankingFilters {
    /// Names for a fully selected cascade, looked up in its loaded catalogs.
    pub fn resolve(cascade: &SelectionCascade) -> Option<Self> {
        let CascadeSelection::Trail {
            course_id,
            class_id,
            trail_id,
        } = cascade.selection()
        else {
            return None;
        };
        let course = cascade.catalog().loaded()?.course(course_id)?;
        let class = cascade
            .visible_classes()
            .into_iter()
            .find(|class| class.id == class_id)?;
        let trail = cascade
            .visible_trails()
            .iter()
            .find(|trail| trail.id == trail_id)?;

        Some(Self {
            course_id,
            course_name: course.name.clone(),
            class_id,
            class_name: class.name.clone(),
            trail_id,
            trail_name: trail.name.clone(),
        })
    }

    pub fn matches(&self, selection: CascadeSelection) -> bool {
        selection
            == CascadeSelection::Trail {
                course_id: self.course_id,
                class_id: self.class_id,
                trail_id: self.trail_id,
            }
    }
}

pub const RANKING_FILTERS: HandoffKey<RankingFilters> = HandoffKey::new("ranking-filters");

/// Short-lived scratch space between screens. Reads remove the entry.
#[derive(Debug, Default)]
pub struct HandoffStore {
    slots: HashMap<&'static str, serde_json::Value>,
}

impl HandoffStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put<T: Serialize>(
        &mut self,
        key: &HandoffKey<T>,
        value: &T,
    ) -> Result<(), serde_json::Error> {
        let encoded = serde_json::to_value(value)?;
        if self.slots.insert(key.name, encoded).is_some() {
            tracing::debug!(key = key.name, "replaced unread handoff");
        }
        Ok(())
    }

    /// Removes and decodes the entry. The entry is gone even if decoding fails.
    pub fn take<T: DeserializeOwned>(
        &mut self,
        key: &HandoffKey<T>,
    ) -> Result<Option<T>, serde_json::Error> {
        match self.slots.remove(key.name) {
            Some(value) => serde_json::from_value(value).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filters() -> RankingFilters {
        RankingFilters {
            course_id: 1,
            course_name: "ADS".to_string(),
            class_id: 10,
            class_name: "Turma A".to_string(),
            trail_id: 100,
            trail_name: "Trilha X".to_string(),
        }
    }

    #[test]
    fn take_returns_value_once() {
        let mut store = HandoffStore::new();
        store.put(&RANKING_FILTERS, &filters()).unwrap();
        assert_eq!(store.take(&RANKING_FILTERS).unwrap(), Some(filters()));
        assert_eq!(store.take(&RANKING_FILTERS).unwrap(), None);
        assert!(store.slots.is_empty());
    }

    #[test]
    fn schema_mismatch_errors_and_still_removes() {
        const WRONG: HandoffKey<String> = HandoffKey::new("ranking-filters");
        let mut store = HandoffStore::new();
        store.put(&RANKING_FILTERS, &filters()).unwrap();

        assert!(store.take(&WRONG).is_err());
        assert_eq!(store.take(&RANKING_FILTERS).unwrap(), None);
    }

    #[test]
    fn resolve_needs_a_full_selection() {
        assert_eq!(RankingFilters::resolve(&SelectionCascade::new()), None);
    }

    #[tokio::test]
    async fn resolve_names_every_selected_level() {
        use crate::cascade::execute;
        use crate::models::{Actor, ClassGroup, Course, KnowledgeTrail, Role};
        use crate::service::fake::StaticCatalog;

        let mut service = StaticCatalog {
            courses: vec![Course {
                id: 1,
                name: "ADS".to_string(),
            }],
            classes: vec![ClassGroup {
                id: 10,
                name: "Turma A".to_string(),
                code: "ADS-A".to_string(),
                course_id: Some(1),
                course: None,
            }],
            ..Default::default()
        };
        service.trails.insert(
            10,
            vec![KnowledgeTrail {
                id: 100,
                name: "Trilha X".to_string(),
            }],
        );

        let mut cascade = SelectionCascade::new();
        let request = cascade.load_catalog(Actor {
            id: 1,
            role: Role::Privileged,
        });
        cascade.apply(execute(&service, request).await);
        cascade.select_course(1).unwrap();
        let request = cascade.select_class(10).unwrap();
        cascade.apply(execute(&service, request).await);
        let request = cascade.select_trail(100).unwrap();
        cascade.apply(execute(&service, request).await);

        let resolved = RankingFilters::resolve(&cascade).unwrap();
        assert_eq!(resolved, filters());
        assert!(resolved.matches(cascade.selection()));
    }

    #[test]
    fn filters_match_only_the_full_selection() {
        let resolved = filters();
        assert!(resolved.matches(CascadeSelection::Trail {
            course_id: 1,
            class_id: 10,
            trail_id: 100
        }));
        assert!(!resolved.matches(CascadeSelection::Class {
            course_id: 1,
            class_id: 10
        }));
    }
}
