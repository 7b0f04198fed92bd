//! Course -> class -> trail selection with role-scoped catalogs.
//!
//! Transitions are synchronous and return the fetch they need as a
//! [`FetchRequest`]. The caller runs it with [`execute`] and feeds the
//! [`FetchResponse`] back through [`SelectionCascade::apply`]. Every request
//! carries a sequence number; a response is applied only while its level is
//! still waiting on that exact number, so late answers to superseded
//! selections are dropped.

use std::fmt;

use crate::catalog;
use crate::error::{LoadError, TransitionError};
use crate::models::{Actor, Catalog, ClassGroup, Course, KnowledgeTrail, RankingSnapshot};
use crate::service::CatalogService;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Catalog,
    Class,
    Trail,
    Ranking,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Level::Catalog => "catalog",
            Level::Class => "class",
            Level::Trail => "trail",
            Level::Ranking => "ranking",
        };
        f.write_str(name)
    }
}

/// Selected ids. A child id only exists alongside its parent's.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CascadeSelection {
    #[default]
    Empty,
    Course {
        course_id: i64,
    },
    Class {
        course_id: i64,
        class_id: i64,
    },
    Trail {
        course_id: i64,
        class_id: i64,
        trail_id: i64,
    },
}

impl CascadeSelection {
    pub fn course_id(&self) -> Option<i64> {
        match *self {
            CascadeSelection::Empty => None,
            CascadeSelection::Course { course_id }
            | CascadeSelection::Class { course_id, .. }
            | CascadeSelection::Trail { course_id, .. } => Some(course_id),
        }
    }

    pub fn class_id(&self) -> Option<i64> {
        match *self {
            CascadeSelection::Class { class_id, .. } | CascadeSelection::Trail { class_id, .. } => {
                Some(class_id)
            }
            _ => None,
        }
    }

    pub fn trail_id(&self) -> Option<i64> {
        match *self {
            CascadeSelection::Trail { trail_id, .. } => Some(trail_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Catalog { actor: Actor },
    Trails { class_id: i64 },
    Ranking { class_id: i64, trail_id: i64 },
}

impl Query {
    pub fn level(&self) -> Level {
        match self {
            Query::Catalog { .. } => Level::Catalog,
            Query::Trails { .. } => Level::Trail,
            Query::Ranking { .. } => Level::Ranking,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub seq: u64,
    pub query: Query,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Catalog(Catalog),
    Trails(Vec<KnowledgeTrail>),
    Ranking(Vec<RankingSnapshot>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    pub request: FetchRequest,
    pub outcome: Result<Payload, LoadError>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LevelState<T> {
    Idle,
    Loading(FetchRequest),
    Loaded(T),
    Failed {
        request: FetchRequest,
        error: LoadError,
    },
}

impl<T> Default for LevelState<T> {
    fn default() -> Self {
        LevelState::Idle
    }
}

impl<T> LevelState<T> {
    pub fn loaded(&self) -> Option<&T> {
        match self {
            LevelState::Loaded(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&LoadError> {
        match self {
            LevelState::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, LevelState::Loading(_))
    }

    fn awaits(&self, seq: u64) -> bool {
        matches!(self, LevelState::Loading(pending) if pending.seq == seq)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RankingOutcome {
    Snapshot(RankingSnapshot),
    NoData,
}

/// What a selector control should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Disabled,
    Loading,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Empty,
    CourseSet,
    ClassSet,
    TrailSet,
    Ranked,
    NoData,
}

#[derive(Debug, Default)]
pub struct SelectionCascade {
    last_seq: u64,
    selection: CascadeSelection,
    catalog: LevelState<Catalog>,
    trails: LevelState<Vec<KnowledgeTrail>>,
    ranking: LevelState<RankingOutcome>,
}

impl SelectionCascade {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selection(&self) -> CascadeSelection {
        self.selection
    }

    pub fn catalog(&self) -> &LevelState<Catalog> {
        &self.catalog
    }

    pub fn trails(&self) -> &LevelState<Vec<KnowledgeTrail>> {
        &self.trails
    }

    pub fn ranking(&self) -> &LevelState<RankingOutcome> {
        &self.ranking
    }

    pub fn snapshot(&self) -> Option<&RankingSnapshot> {
        match self.ranking.loaded() {
            Some(RankingOutcome::Snapshot(snapshot)) => Some(snapshot),
            _ => None,
        }
    }

    pub fn phase(&self) -> Phase {
        match self.selection {
            CascadeSelection::Empty => Phase::Empty,
            CascadeSelection::Course { .. } => Phase::CourseSet,
            CascadeSelection::Class { .. } => Phase::ClassSet,
            CascadeSelection::Trail { .. } => match self.ranking.loaded() {
                Some(RankingOutcome::Snapshot(_)) => Phase::Ranked,
                Some(RankingOutcome::NoData) => Phase::NoData,
                None => Phase::TrailSet,
            },
        }
    }

    pub fn visible_courses(&self) -> &[Course] {
        self.catalog
            .loaded()
            .map(|catalog| catalog.courses.as_slice())
            .unwrap_or_default()
    }

    /// Classes of the selected course, filtered locally from the loaded catalog.
    pub fn visible_classes(&self) -> Vec<&ClassGroup> {
        match (self.selection.course_id(), self.catalog.loaded()) {
            (Some(course_id), Some(catalog)) => catalog.classes_for_course(course_id),
            _ => Vec::new(),
        }
    }

    pub fn visible_trails(&self) -> &[KnowledgeTrail] {
        match self.selection.class_id() {
            Some(_) => self.trails.loaded().map(Vec::as_slice).unwrap_or_default(),
            None => &[],
        }
    }

    pub fn course_selector(&self) -> Control {
        match self.catalog {
            LevelState::Loading(_) => Control::Loading,
            LevelState::Loaded(_) => Control::Ready,
            _ => Control::Disabled,
        }
    }

    pub fn class_selector(&self) -> Control {
        if self.selection.course_id().is_none() {
            return Control::Disabled;
        }
        self.course_selector()
    }

    pub fn trail_selector(&self) -> Control {
        if self.selection.class_id().is_none() {
            return Control::Disabled;
        }
        match self.trails {
            LevelState::Loading(_) => Control::Loading,
            LevelState::Loaded(_) => Control::Ready,
            _ => Control::Disabled,
        }
    }

    /// Starts the catalog load for the actor of this view.
    pub fn load_catalog(&mut self, actor: Actor) -> FetchRequest {
        let request = self.issue(Query::Catalog { actor });
        tracing::debug!(seq = request.seq, actor = actor.id, role = %actor.role, "loading catalog");
        self.catalog = LevelState::Loading(request.clone());
        request
    }

    pub fn select_course(&mut self, course_id: i64) -> Result<(), TransitionError> {
        if let Some(catalog) = self.catalog.loaded() {
            if catalog.course(course_id).is_none() {
                return Err(TransitionError::UnknownCourse(course_id));
            }
        }

        tracing::debug!(course_id, "course selected");
        self.selection = CascadeSelection::Course { course_id };
        self.trails = LevelState::Idle;
        self.ranking = LevelState::Idle;
        Ok(())
    }

    pub fn select_class(&mut self, class_id: i64) -> Result<FetchRequest, TransitionError> {
        let course_id = self
            .selection
            .course_id()
            .ok_or(TransitionError::ParentUnset(Level::Class))?;
        let catalog = self
            .catalog
            .loaded()
            .ok_or(TransitionError::SelectorDisabled(Level::Class))?;
        if !catalog
            .classes_for_course(course_id)
            .iter()
            .any(|class| class.id == class_id)
        {
            return Err(TransitionError::UnknownClass {
                course_id,
                class_id,
            });
        }

        self.selection = CascadeSelection::Class {
            course_id,
            class_id,
        };
        self.ranking = LevelState::Idle;
        let request = self.issue(Query::Trails { class_id });
        tracing::debug!(seq = request.seq, class_id, "class selected, loading trails");
        self.trails = LevelState::Loading(request.clone());
        Ok(request)
    }

    pub fn select_trail(&mut self, trail_id: i64) -> Result<FetchRequest, TransitionError> {
        let (course_id, class_id) = match self.selection {
            CascadeSelection::Class {
                course_id,
                class_id,
            }
            | CascadeSelection::Trail {
                course_id,
                class_id,
                ..
            } => (course_id, class_id),
            _ => return Err(TransitionError::ParentUnset(Level::Trail)),
        };
        let trails = self
            .trails
            .loaded()
            .ok_or(TransitionError::SelectorDisabled(Level::Trail))?;
        if !trails.iter().any(|trail| trail.id == trail_id) {
            return Err(TransitionError::UnknownTrail { class_id, trail_id });
        }

        self.selection = CascadeSelection::Trail {
            course_id,
            class_id,
            trail_id,
        };
        let request = self.issue(Query::Ranking { class_id, trail_id });
        tracing::debug!(seq = request.seq, class_id, trail_id, "trail selected, loading ranking");
        self.ranking = LevelState::Loading(request.clone());
        Ok(request)
    }

    /// Replays the failed request of `level` under a fresh sequence number.
    /// Class options come from the catalog, so only `Level::Catalog` retries it.
    pub fn retry(&mut self, level: Level) -> Result<FetchRequest, TransitionError> {
        let slot_request = match level {
            Level::Catalog => failed_request(&self.catalog),
            Level::Class => None,
            Level::Trail => failed_request(&self.trails),
            Level::Ranking => failed_request(&self.ranking),
        };
        let query = slot_request
            .map(|request| request.query.clone())
            .ok_or(TransitionError::NothingToRetry(level))?;

        let request = self.issue(query);
        tracing::info!(seq = request.seq, level = %request.query.level(), "retrying fetch");
        match request.query.level() {
            Level::Trail => self.trails = LevelState::Loading(request.clone()),
            Level::Ranking => self.ranking = LevelState::Loading(request.clone()),
            _ => self.catalog = LevelState::Loading(request.clone()),
        }
        Ok(request)
    }

    /// Applies a fetch result. Returns `false` when the response was stale and dropped.
    pub fn apply(&mut self, response: FetchResponse) -> bool {
        let FetchResponse { request, outcome } = response;
        let seq = request.seq;

        match request.query {
            Query::Catalog { .. } => {
                if !self.catalog.awaits(seq) {
                    return drop_stale(&request);
                }
                self.catalog = match outcome {
                    Ok(Payload::Catalog(catalog)) => {
                        tracing::info!(
                            courses = catalog.courses.len(),
                            classes = catalog.classes.len(),
                            "catalog loaded"
                        );
                        if let Some(course_id) = self.selection.course_id() {
                            if catalog.course(course_id).is_none() {
                                tracing::warn!(
                                    course_id,
                                    "selected course is not in the catalog, clearing selection"
                                );
                                self.selection = CascadeSelection::Empty;
                                self.trails = LevelState::Idle;
                                self.ranking = LevelState::Idle;
                            }
                        }
                        LevelState::Loaded(catalog)
                    }
                    Ok(other) => return drop_mismatched(&request, &other),
                    Err(error) => failed(request, error),
                };
            }
            Query::Trails { class_id } => {
                if !self.trails.awaits(seq) || self.selection.class_id() != Some(class_id) {
                    return drop_stale(&request);
                }
                self.trails = match outcome {
                    Ok(Payload::Trails(trails)) => {
                        tracing::info!(class_id, trails = trails.len(), "trails loaded");
                        LevelState::Loaded(trails)
                    }
                    Ok(other) => return drop_mismatched(&request, &other),
                    Err(error) => failed(request, error),
                };
            }
            Query::Ranking { class_id, trail_id } => {
                if !self.ranking.awaits(seq) || self.selection.trail_id() != Some(trail_id) {
                    return drop_stale(&request);
                }
                self.ranking = match outcome {
                    Ok(Payload::Ranking(snapshots)) => {
                        let outcome = match snapshots.into_iter().next() {
                            Some(snapshot) if !snapshot.students_ranking.is_empty() => {
                                RankingOutcome::Snapshot(snapshot)
                            }
                            _ => RankingOutcome::NoData,
                        };
                        tracing::info!(
                            class_id,
                            trail_id,
                            no_data = matches!(outcome, RankingOutcome::NoData),
                            "ranking loaded"
                        );
                        LevelState::Loaded(outcome)
                    }
                    Ok(other) => return drop_mismatched(&request, &other),
                    Err(error) => failed(request, error),
                };
            }
        }

        true
    }

    fn issue(&mut self, query: Query) -> FetchRequest {
        self.last_seq += 1;
        FetchRequest {
            seq: self.last_seq,
            query,
        }
    }
}

fn failed_request<T>(state: &LevelState<T>) -> Option<&FetchRequest> {
    match state {
        LevelState::Failed { request, .. } => Some(request),
        _ => None,
    }
}

fn failed<T>(request: FetchRequest, error: LoadError) -> LevelState<T> {
    tracing::warn!(seq = request.seq, %error, "fetch failed");
    LevelState::Failed { request, error }
}

fn drop_stale(request: &FetchRequest) -> bool {
    tracing::debug!(seq = request.seq, level = %request.query.level(), "dropping stale response");
    false
}

fn drop_mismatched(request: &FetchRequest, payload: &Payload) -> bool {
    tracing::warn!(seq = request.seq, ?payload, "response payload does not match its query");
    false
}

/// Runs `request` against the service and converts failures into the
/// error of the level that asked.
pub async fn execute<S>(service: &S, request: FetchRequest) -> FetchResponse
where
    S: CatalogService + ?Sized,
{
    let outcome = match &request.query {
        Query::Catalog { actor } => catalog::resolve_catalog(service, actor)
            .await
            .map(Payload::Catalog)
            .map_err(|err| LoadError::Catalog {
                message: err.to_string(),
            }),
        Query::Trails { class_id } => service
            .list_ranked_trails(*class_id)
            .await
            .map(Payload::Trails)
            .map_err(|err| LoadError::Trails {
                class_id: *class_id,
                message: err.to_string(),
            }),
        Query::Ranking { class_id, trail_id } => service
            .get_ranking(*class_id, &[*trail_id])
            .await
            .map(Payload::Ranking)
            .map_err(|err| LoadError::Ranking {
                class_id: *class_id,
                trail_id: *trail_id,
                message: err.to_string(),
            }),
    };

    FetchResponse { request, outcome }
}
