use std::sync::Arc;

use clap::{Arg, ArgAction, ArgMatches, Command};
use tracing::info;

use tms_sync::provider::{CrowdinClient, TranslationProvider};
use tms_sync::storage::MemoryStore;
use tms_sync::sync::{SyncFilter, SyncMode, TranslationSyncEngine};
use tms_sync::upsert::TranslationUpserter;
use tms_sync::{EntityRef, SyncConfig};

fn cli() -> Command {
    Command::new("tms-sync")
        .version("0.1.0")
        .about("Inspect and maintain the translation service side of tms-sync")
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .help("Path to the TOML configuration")
                .default_value("tms-sync.toml"),
        )
        .subcommand_required(true)
        .subcommand(Command::new("files").about("List remote files"))
        .subcommand(
            Command::new("status")
                .about("Show approval progress of a file")
                .arg(Arg::new("file-id").required(true).index(1)),
        )
        .subcommand(
            Command::new("export")
                .about("Export a file for a locale and print the resolved translations")
                .arg(Arg::new("file-id").required(true).index(1))
                .arg(Arg::new("locale").required(true).index(2)),
        )
        .subcommand(
            Command::new("preview")
                .about("Print the translations a sync pass would write, without writing")
                .arg(
                    Arg::new("locale")
                        .long("locale")
                        .short('l')
                        .help("Locale to preview (default: every target locale)")
                        .action(ArgAction::Append),
                )
                .arg(
                    Arg::new("approved")
                        .long("approved")
                        .help("Only fully approved files")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("namespace")
                        .long("namespace")
                        .help("Directory path, segments separated by '/'"),
                ),
        )
        .subcommand(
            Command::new("resolve")
                .about("Resolve a translation unit to the entity attribute it translates")
                .arg(Arg::new("translation-id").required(true).index(1))
                .arg(Arg::new("source-string-id").required(true).index(2)),
        )
        .subcommand(
            Command::new("delete")
                .about("Delete the remote file of an entity")
                .arg(Arg::new("entity-type").required(true).index(1))
                .arg(Arg::new("entity-id").required(true).index(2)),
        )
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str, Box<dyn std::error::Error>> {
    matches
        .get_one::<String>(name)
        .map(String::as_str)
        .ok_or_else(|| format!("missing argument <{}>", name).into())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();
    let config_path = required(&matches, "config")?;
    let config = SyncConfig::from_file(config_path)?;
    let client = Arc::new(CrowdinClient::from_config(&config.provider)?);
    info!(provider = client.provider_name(), project = %config.provider.project_id, "loaded configuration");

    let engine = TranslationSyncEngine::new(
        client.clone(),
        Arc::new(MemoryStore::new()),
        config.target_locales(),
    )
    .with_batch_size(config.batch_size);

    match matches.subcommand() {
        Some(("files", _)) => {
            for file in client.list_files().await? {
                println!(
                    "{}\t{}\t{}",
                    file.id,
                    file.name,
                    file.directory_id.as_deref().unwrap_or("-")
                );
            }
        }
        Some(("status", sub)) => {
            for info in client.file_progress(required(sub, "file-id")?).await? {
                println!(
                    "{}\ttranslated {}%\tapproved {}%",
                    info.language_id, info.translation_progress, info.approval_progress
                );
            }
        }
        Some(("export", sub)) => {
            let translations = engine
                .translations_for_file(required(sub, "file-id")?, required(sub, "locale")?)
                .await?;
            println!("{}", serde_json::to_string_pretty(&translations)?);
        }
        Some(("preview", sub)) => {
            let locales: Vec<String> = match sub.get_many::<String>("locale") {
                Some(values) => values.cloned().collect(),
                None => config.target_locales(),
            };
            let mode = if sub.get_flag("approved") {
                SyncMode::ApprovedOnly
            } else {
                SyncMode::All
            };
            let filter = match sub.get_one::<String>("namespace") {
                Some(path) => SyncFilter::namespace(
                    path.split('/')
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect(),
                ),
                None => SyncFilter::default(),
            };

            for locale in &locales {
                let preview = engine.preview(locale, &filter, mode).await?;
                println!("# {}", locale);
                println!("{}", serde_json::to_string_pretty(&preview.translations)?);
                if let Some(failures) = preview.failures {
                    eprintln!("{}", failures);
                }
            }
        }
        Some(("resolve", sub)) => {
            let upserter = TranslationUpserter::new(client.clone(), Arc::new(MemoryStore::new()));
            let resolved = upserter
                .resolve(
                    Some(required(sub, "translation-id")?),
                    Some(required(sub, "source-string-id")?),
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&resolved.translation)?);
        }
        Some(("delete", sub)) => {
            let entity = EntityRef::new(required(sub, "entity-type")?, required(sub, "entity-id")?);
            match engine.delete_source_files_for_entity(&entity).await? {
                Some(file_id) => println!("deleted file {}", file_id),
                None => println!("no remote file for {}", entity),
            }
        }
        _ => unreachable!("subcommand_required"),
    }

    Ok(())
}
