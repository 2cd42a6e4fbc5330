use manga_verse::bypass::BypassResolver;
use manga_verse::config::Config;
use manga_verse::crawler::CrawlOrchestrator;
use manga_verse::db::Db;
use manga_verse::error::Result;
use manga_verse::media::{MediaPipeline, MediaStore};
use std::process::ExitCode;

fn usage() -> ExitCode {
    eprintln!("Usage:");
    eprintln!("  manga-verse search <keyword>");
    eprintln!("  manga-verse crawl <url-or-slug>");
    eprintln!("  manga-verse crawl-chapter <titleId> <chapterId>");
    eprintln!("  manga-verse crawl-range <titleId> <fromPos> <toPos>");
    eprintln!("  manga-verse delete <titleId>");
    ExitCode::FAILURE
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        return usage();
    };

    match run(command, &args[1..]).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: &str, args: &[String]) -> Result<ExitCode> {
    let config = Config::load();
    let db = Db::open(&config.database_path)?;
    let store = MediaStore::from_config(&config.store)?;
    let pipeline = MediaPipeline::new(store.clone(), config.pipeline.clone())?;
    let resolver = BypassResolver::new(config.bypass.clone(), config.browser.clone())?;
    let orchestrator = CrawlOrchestrator::new(db, resolver, pipeline, store);

    match (command, args) {
        ("search", [keyword]) => {
            let results = orchestrator.search(keyword).await?;
            println!("{}", serde_json::to_string_pretty(&results)?);
            Ok(ExitCode::SUCCESS)
        }
        ("crawl", [identifier]) => {
            let title = orchestrator.crawl_title(identifier).await?;
            println!(
                "crawled {} ({} chapters)",
                title.title,
                title.chapters.len()
            );
            Ok(ExitCode::SUCCESS)
        }
        ("crawl-chapter", [title_id, chapter_id]) => {
            let content = orchestrator.crawl_chapter(title_id, chapter_id).await?;
            println!(
                "chapter {}/{}: {} images",
                title_id,
                chapter_id,
                content.images.len()
            );
            Ok(ExitCode::SUCCESS)
        }
        ("crawl-range", [title_id, from, to]) => {
            let (Ok(from), Ok(to)) = (from.parse::<usize>(), to.parse::<usize>()) else {
                return Ok(usage());
            };
            let report = orchestrator.crawl_range(title_id, from, to).await?;
            println!(
                "attempted {} | ok {} | failed {} | skipped {}",
                report.attempted, report.succeeded, report.failed, report.skipped_existing
            );
            Ok(if report.failed == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        ("delete", [title_id]) => {
            orchestrator.delete_title(title_id).await?;
            println!("deleted {}", title_id);
            Ok(ExitCode::SUCCESS)
        }
        _ => Ok(usage()),
    }
}
