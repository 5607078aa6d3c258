use anyhow::Context;
use drive_core::DriveClient;
use drive_migrate::config::MigrateConfig;
use drive_migrate::migrate::catalog::CatalogStore;
use drive_migrate::migrate::examine::parent_chain;
use drive_migrate::migrate::ingest::ingest;
use drive_migrate::migrate::mirror::FolderMirror;
use drive_migrate::migrate::remote::{DriveStore, Retrying};
use drive_migrate::migrate::transfer::{TransferEngine, TransferOptions};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq, Eq)]
enum CliMode {
    Ingest,
    Mirror,
    Transfer,
    Examine(Vec<String>),
    Help,
}

fn parse_cli_mode<I>(args: I) -> anyhow::Result<CliMode>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter().skip(1);
    let Some(command) = args.next() else {
        return Ok(CliMode::Help);
    };
    let mode = match command.as_str() {
        "ingest" => CliMode::Ingest,
        "mirror" => CliMode::Mirror,
        "transfer" => CliMode::Transfer,
        "examine" => {
            let ids: Vec<String> = args.collect();
            if ids.is_empty() {
                anyhow::bail!("examine needs at least one file id");
            }
            return Ok(CliMode::Examine(ids));
        }
        "--help" | "-h" => CliMode::Help,
        other => anyhow::bail!("unknown command: {other}"),
    };
    if let Some(extra) = args.next() {
        anyhow::bail!("unexpected argument: {extra}");
    }
    Ok(mode)
}

fn remote_store(config: &MigrateConfig, token: &str) -> anyhow::Result<Retrying<DriveStore>> {
    let client =
        DriveClient::with_base_url(&config.api_base, token).context("invalid Drive API base url")?;
    Ok(Retrying::new(
        DriveStore::new(client, config.page_size),
        config.retry_policy(),
    ))
}

async fn open_catalog(config: &MigrateConfig) -> anyhow::Result<CatalogStore> {
    CatalogStore::open_path(&config.db_path)
        .await
        .with_context(|| format!("failed to open catalog {}", config.db_path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mode = parse_cli_mode(std::env::args())?;
    if mode == CliMode::Help {
        println!("Usage: drive-migrate <command>");
        println!("  ingest          List the source account into the catalog");
        println!("  mirror          Recreate the folder tree in the destination account");
        println!("  transfer        Copy cataloged files into the mirrored folders");
        println!("  examine ID...   Show a source object and its parent folders");
        return Ok(());
    }
    let config = MigrateConfig::from_env();

    match mode {
        CliMode::Ingest => {
            let source = remote_store(&config, config.require_source_token()?)?;
            let catalog = open_catalog(&config).await?;
            let report = ingest(&source, &catalog).await?;
            println!(
                "{} objects in {} pages, {} folders, {} dups",
                report.objects, report.pages, report.folders, report.duplicates
            );
        }
        CliMode::Mirror => {
            let root = config.require_destination_root()?;
            let destination = remote_store(&config, config.require_destination_token()?)?;
            let catalog = open_catalog(&config).await?;
            let report = FolderMirror::new(&catalog, &destination, root).run().await?;
            println!(
                "{} dups, {} roots, {} missing",
                report.duplicates, report.roots, report.missing
            );
            println!(
                "{} created, {} reused, {} unreachable",
                report.created, report.reused, report.unreachable
            );
        }
        CliMode::Transfer => {
            let options = TransferOptions {
                destination_root: config.require_destination_root()?.to_string(),
                identity: config.require_destination_user()?.to_string(),
                require_can_copy: config.require_can_copy,
            };
            let source = remote_store(&config, config.require_source_token()?)?;
            let destination = remote_store(&config, config.require_destination_token()?)?;
            let catalog = open_catalog(&config).await?;
            let report = TransferEngine::new(&catalog, &source, &destination, &options)
                .run()
                .await?;
            println!(
                "processed {} files: {} copied, {} copy failures, {} share failures",
                report.total, report.copied, report.copy_failed, report.share_failed
            );
        }
        CliMode::Examine(ids) => {
            let source = remote_store(&config, config.require_source_token()?)?;
            for id in ids {
                for line in parent_chain(&source, &id).await? {
                    println!("{line}");
                }
            }
        }
        CliMode::Help => {}
    }
    Ok(())
}
