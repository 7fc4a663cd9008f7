//! Form migrator - copies ticket forms between helpdesk accounts

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use form_migrator::{
    config::{Args, Command},
    summary, AccountSide, FormReconciler,
};
use helpdesk_client::HelpdeskClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let source_account = args.source_account();
    let target_account = args.target_account();
    info!(
        source_account = %source_account.subdomain,
        target_account = %target_account.subdomain,
        write_interval_ms = args.write_interval_ms,
        "Form migrator starting"
    );

    let source = HelpdeskClient::new(source_account)?;
    let target = HelpdeskClient::new(target_account)?;
    let reconciler =
        FormReconciler::with_config(Arc::new(source), Arc::new(target), args.migrator_config());

    match args.command {
        Command::ListForms { target } => {
            let (side, account) = if target {
                (AccountSide::Target, args.target_subdomain.clone())
            } else {
                (AccountSide::Source, args.source_subdomain.clone())
            };
            let forms = reconciler.list_forms(side).await?;
            print!("{}", summary::render_forms(&account.unwrap_or_default(), &forms));
        }
        Command::Migrate { form_id, json } => {
            let outcome = reconciler.migrate_form(form_id).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print!("{}", summary::render_outcome(&outcome));
            }
            if !outcome.is_success() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
