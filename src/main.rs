use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cascade;
mod catalog;
mod classify;
mod db;
mod error;
mod handoff;
mod models;
mod ranking;
mod report;
mod service;

use cascade::{Control, FetchRequest, Level, Phase, SelectionCascade};
use db::PgCatalogService;
use handoff::{HandoffStore, RankingFilters, RANKING_FILTERS};
use ranking::{RankedRow, RankingStats};
use service::CatalogService;

#[derive(Parser)]
#[command(name = "ranking-board")]
#[command(about = "Class activity leaderboard with role-scoped course, class and trail filters", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SelectionArgs {
    /// Id of the user whose view is being rendered
    #[arg(long)]
    actor: i64,
    #[arg(long)]
    course: Option<i64>,
    #[arg(long)]
    class: Option<i64>,
    #[arg(long)]
    trail: Option<i64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import ranking rows from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Show the courses and classes visible to an actor
    Catalog {
        #[arg(long)]
        actor: i64,
    },
    /// Walk course, class and trail filters and print the leaderboard
    Rank {
        #[command(flatten)]
        selection: SelectionArgs,
        /// Case-insensitive student name filter
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown leaderboard report
    Report {
        #[command(flatten)]
        selection: SelectionArgs,
        #[arg(long, default_value = "ranking.md")]
        out: PathBuf,
    },
}

#[derive(Serialize)]
struct RankOutput<'a> {
    trail: &'a str,
    stats: RankingStats,
    rows: Vec<RankedRow>,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "ranking_board=info".into()),
    );

    // stdout carries command output only
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;
    let service = PgCatalogService::new(pool.clone());

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} ranking rows from {}.", csv.display());
        }
        Commands::Catalog { actor } => {
            let actor = service
                .get_actor(actor)
                .await
                .context("failed to resolve actor")?;
            let catalog = catalog::resolve_catalog(&service, &actor).await?;

            if catalog.is_empty() {
                println!(
                    "Nothing to rank: no courses or classes are visible to this {}.",
                    actor.role
                );
                return Ok(());
            }

            println!("Catalog for {} {}:", actor.role, actor.id);
            for course in catalog.courses.iter() {
                println!("- course {} {}", course.id, course.name);
                for class in catalog.classes_for_course(course.id) {
                    println!("  - class {} {} ({})", class.id, class.name, class.code);
                }
            }
            let orphans: Vec<_> = catalog
                .classes
                .iter()
                .filter(|class| class.course_id.is_none())
                .collect();
            for class in orphans {
                println!("- class {} {} ({}) without course", class.id, class.name, class.code);
            }
        }
        Commands::Rank {
            selection,
            search,
            limit,
            json,
        } => {
            let cascade = drive(&service, &selection).await?;
            print_level(&cascade, search.as_deref().unwrap_or(""), limit, json)?;
        }
        Commands::Report { selection, out } => {
            let cascade = drive(&service, &selection).await?;
            let mut handoff = HandoffStore::new();
            let filters = RankingFilters::resolve(&cascade)
                .context("a report needs --course, --class and --trail")?;
            handoff.put(&RANKING_FILTERS, &filters)?;

            write_report(&mut handoff, &cascade, &out)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

/// Applies the cascade transitions requested on the command line, stopping at
/// the first level left unset.
async fn drive<S>(service: &S, args: &SelectionArgs) -> anyhow::Result<SelectionCascade>
where
    S: CatalogService,
{
    let actor = service
        .get_actor(args.actor)
        .await
        .context("failed to resolve actor")?;
    let mut cascade = SelectionCascade::new();

    let request = cascade.load_catalog(actor);
    fetch_with_retry(service, &mut cascade, request).await?;

    let Some(course) = args.course else {
        return Ok(cascade);
    };
    cascade.select_course(course)?;

    let Some(class) = args.class else {
        return Ok(cascade);
    };
    let request = cascade.select_class(class)?;
    fetch_with_retry(service, &mut cascade, request).await?;

    let Some(trail) = args.trail else {
        return Ok(cascade);
    };
    let request = cascade.select_trail(trail)?;
    fetch_with_retry(service, &mut cascade, request).await?;

    Ok(cascade)
}

async fn fetch_with_retry<S>(
    service: &S,
    cascade: &mut SelectionCascade,
    request: FetchRequest,
) -> anyhow::Result<()>
where
    S: CatalogService,
{
    let level = request.query.level();
    cascade.apply(cascade::execute(service, request).await);

    if let Some(error) = level_error(cascade, level) {
        eprintln!("{error}. Retrying once.");
        let retry = cascade.retry(level)?;
        cascade.apply(cascade::execute(service, retry).await);
    }

    match level_error(cascade, level) {
        Some(error) => Err(error.into()),
        None => Ok(()),
    }
}

fn level_error(cascade: &SelectionCascade, level: Level) -> Option<error::LoadError> {
    let error = match level {
        Level::Trail => cascade.trails().error(),
        Level::Ranking => cascade.ranking().error(),
        _ => cascade.catalog().error(),
    };
    error.cloned()
}

fn print_level(
    cascade: &SelectionCascade,
    search: &str,
    limit: usize,
    json: bool,
) -> anyhow::Result<()> {
    if cascade.visible_courses().is_empty() {
        println!("Nothing to rank: no courses or classes are visible to this actor.");
        return Ok(());
    }

    match cascade.phase() {
        Phase::Empty => {
            println!("Select a course with --course:");
            for course in cascade.visible_courses() {
                println!("- {} {}", course.id, course.name);
            }
        }
        Phase::CourseSet => {
            let classes = cascade.visible_classes();
            if cascade.class_selector() != Control::Ready {
                println!("Classes are not available yet.");
            } else if classes.is_empty() {
                println!("No classes are offered under this course.");
            } else {
                println!("Select a class with --class:");
                for class in classes {
                    println!("- {} {} ({})", class.id, class.name, class.code);
                }
            }
        }
        Phase::ClassSet => {
            let trails = cascade.visible_trails();
            if cascade.trail_selector() != Control::Ready {
                println!("Trails are not available yet.");
            } else if trails.is_empty() {
                println!("No ranked trails for this class yet.");
            } else {
                println!("Select a trail with --trail:");
                for trail in trails {
                    println!("- {} {}", trail.id, trail.name);
                }
            }
        }
        Phase::TrailSet if cascade.ranking().is_loading() => println!("Ranking is still loading."),
        Phase::TrailSet => println!("Ranking is unavailable."),
        Phase::NoData => println!("No ranking data for this trail yet."),
        Phase::Ranked => {
            let Some(snapshot) = cascade.snapshot() else {
                return Ok(());
            };
            let stats = ranking::aggregate(snapshot);
            let rows: Vec<RankedRow> = ranking::filter_by_name(&snapshot.students_ranking, search)
                .into_iter()
                .take(limit)
                .map(ranking::present)
                .collect();

            if json {
                let output = RankOutput {
                    trail: &snapshot.trail_name,
                    stats,
                    rows,
                };
                println!("{}", serde_json::to_string_pretty(&output)?);
                return Ok(());
            }

            println!("Ranking for {}:", snapshot.trail_name);
            println!(
                "{} students, average completion {}%, average grade {:.1}, top performer {}",
                stats.total_students,
                stats.average_completion,
                stats.average_grade,
                stats.top_performer
            );
            if rows.is_empty() {
                println!("No students match '{search}'.");
            }
            for row in rows.iter() {
                let grade = row
                    .medium_grade
                    .map(|grade| format!("{grade:.1}"))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:>9} {} {}/{} tasks, {:.0}% [{}], grade {} [{}], {} pts",
                    row.glyph.to_string(),
                    row.name,
                    row.tasks_sent,
                    row.total_tasks,
                    row.conclusion_percent,
                    row.completion,
                    grade,
                    row.grade,
                    row.points_earned
                );
            }
        }
    }

    Ok(())
}

fn write_report(
    handoff: &mut HandoffStore,
    cascade: &SelectionCascade,
    out: &std::path::Path,
) -> anyhow::Result<()> {
    let filters = handoff
        .take(&RANKING_FILTERS)?
        .context("no ranking selection was handed to the report writer")?;
    if !filters.matches(cascade.selection()) {
        anyhow::bail!("handed-off filters no longer match the current selection");
    }

    let generated_on = chrono::Utc::now().date_naive();
    let report = report::build_report(&filters, generated_on, cascade.snapshot());
    std::fs::write(out, report).with_context(|| format!("failed to write {}", out.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::error::LoadError;
    use crate::models::{ActorRecord, ClassGroup, Course, KnowledgeTrail, Role};
    use crate::service::fake::StaticCatalog;

    fn service() -> StaticCatalog {
        let mut service = StaticCatalog {
            actors: vec![ActorRecord {
                id: 1,
                name: "Coordenacao".to_string(),
                role: Role::Privileged,
                classes: Vec::new(),
            }],
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
        service
    }

    fn args(course: Option<i64>, class: Option<i64>) -> SelectionArgs {
        SelectionArgs {
            actor: 1,
            course,
            class,
            trail: None,
        }
    }

    #[tokio::test]
    async fn drive_stops_at_the_first_unset_level() {
        let service = service();
        let cascade = drive(&service, &args(Some(1), None)).await.unwrap();

        assert_eq!(cascade.phase(), Phase::CourseSet);
        assert_eq!(cascade.class_selector(), Control::Ready);
        assert_eq!(service.trail_calls(), 0);
    }

    #[tokio::test]
    async fn single_failure_is_recovered_by_replaying_the_request() {
        let service = service();
        service.trail_failures.store(1, Ordering::SeqCst);

        let cascade = drive(&service, &args(Some(1), Some(10))).await.unwrap();
        assert_eq!(cascade.phase(), Phase::ClassSet);
        assert_eq!(cascade.visible_trails().len(), 1);
        assert_eq!(service.trail_calls(), 2);
    }

    #[tokio::test]
    async fn second_failure_surfaces_the_level_error() {
        let service = service();
        service.trail_failures.store(2, Ordering::SeqCst);

        let err = drive(&service, &args(Some(1), Some(10))).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LoadError>(),
            Some(LoadError::Trails { class_id: 10, .. })
        ));
        assert_eq!(service.trail_calls(), 2);
    }
}
