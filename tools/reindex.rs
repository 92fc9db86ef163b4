use std::env;
use std::path::PathBuf;

use library::{IndexOutcome, Library, RootRegistry};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut args = env::args().skip(1);
    let audio_dir = args
        .next()
        .or_else(|| env::var("AUDIO_DIR").ok())
        .unwrap_or_default();
    let db_path = args
        .next()
        .or_else(|| env::var("DB_PATH").ok())
        .unwrap_or_else(|| "./audio-share.db".to_string());

    let roots = RootRegistry::parse(&audio_dir);
    let library = Library::open(&PathBuf::from(&db_path), roots)?;

    match library.rebuild_index()? {
        IndexOutcome::Completed(report) => {
            println!(
                "Indexed: {} folders, {} audio files ({} removed folders, {} tombstoned files) in {} ms",
                report.folders,
                report.audio_files,
                report.removed_folders,
                report.deleted_audio_files,
                report.elapsed_ms
            );
            if report.failed_writes > 0 || report.failed_subtrees > 0 {
                println!(
                    "Warnings: {} failed writes, {} unreadable directories",
                    report.failed_writes, report.failed_subtrees
                );
            }
        }
        IndexOutcome::Skipped { holder } => {
            let pid = holder.map(|holder| holder.pid.to_string());
            println!(
                "Skipped: reindex already running (pid {})",
                pid.as_deref().unwrap_or("unknown")
            );
        }
    }

    Ok(())
}
