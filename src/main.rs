// ABOUTME: CLI entrypoint for the drivesync command
// ABOUTME: Handles error exit codes and command dispatch

use clap::Parser;
use drivesync::{
    api::ApiClient,
    auth::{self, ConsolePrompt},
    cli::{Cli, Commands},
    config::SyncConfig,
    logging::init_tracing,
    storage::Paths,
    sync::Reconciler,
    Result,
};

fn main() {
    if let Err(e) = run() {
        eprintln!("drivesync: [E{}] {}", e.exit_code(), e);
        std::process::exit(e.exit_code());
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let paths = Paths::new(cli.config_dir.clone())?
        .with_credentials(cli.credentials.clone())
        .with_token(cli.token_file.clone());
    let mut prompt = ConsolePrompt {
        open_browser: !cli.no_browser,
    };

    match cli.command() {
        Commands::Auth { force } => {
            let secrets = auth::load_secrets(&paths.credentials)?;
            if force {
                auth::discard_token(&paths.token)?;
                auth::login(secrets, &paths.token, &mut prompt)?;
            } else {
                let session = auth::authorize(secrets, &paths.token, &mut prompt)?;
                session.access_token()?;
                println!("Authorized; token at {}", session.token_path().display());
            }
        }
        Commands::Sync(args) => {
            let paths = paths.with_sync_config(args.config.clone());
            let config = SyncConfig::load(&paths.sync_config)?.with_overrides(
                args.files,
                args.folder,
                args.mime_type,
            );
            config.validate()?;

            let secrets = auth::load_secrets(&paths.credentials)?;
            let session = auth::authorize(secrets, &paths.token, &mut prompt)?;
            let client = ApiClient::new(session, Some(cli.api_base.clone()))?;

            Reconciler::new(&client, &config).with_jobs(args.jobs).run()?;
        }
    }

    Ok(())
}
