use std::path::Path;
use std::sync::Arc;

use clap::{Arg, ArgAction};
use godoc_i18n::{Config, CorpusName, IngestionScheduler, LanguageRegistry};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse()?),
        )
        .init();

    let matches = Config::command("godoc-i18n")
        .about("Keep translated mirrors of Go sources in sync with a bilingual corpus")
        .arg(
            Arg::new("once")
                .long("once")
                .help("Ingest the corpus directories once and exit instead of watching")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("file")
                .long("file")
                .short('f')
                .help("Ingest a single corpus file, convert its package and exit"),
        )
        .get_matches();

    let config = Config::from_matches(&matches)?;
    info!("goroot: {}", config.primary_root.display());
    info!("gopath: {}", config.secondary_root.display());
    info!("workdir: {}", config.workdir.display());
    info!("langs: {:?}", config.languages);

    let registry = Arc::new(LanguageRegistry::open(&config)?);
    let scheduler = IngestionScheduler::new(registry, &config);

    if let Some(file) = matches.get_one::<String>("file") {
        let path = Path::new(file);
        return match scheduler.process_file(path).await? {
            Some(CorpusName { package, language }) => {
                info!("converted {} for {}", package, language);
                Ok(())
            }
            None => {
                error!("{} is not named <package>.<lang>.<suffix>", path.display());
                Err("not a corpus file".into())
            }
        };
    }

    if matches.get_flag("once") {
        scheduler.initial_scan().await;
        return Ok(());
    }

    let handle = scheduler.spawn();
    let cancel = handle.cancellation_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupted, shutting down");
                cancel.cancel();
            }
            Err(e) => warn!("cannot listen for Ctrl-C: {}", e),
        }
    });
    handle.join().await;
    Ok(())
}
