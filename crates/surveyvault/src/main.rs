//! `svault` - CLI for surveyvault
//!
//! This binary runs the submission service and provides read-only tooling
//! over the anonymized record store.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use anyhow::{bail, Context};
use clap::Parser;

use surveyvault::cli::{Cli, Command, ConfigCommand, RecordCommand, ServeCommand};
use surveyvault::server::{self, Shutdown};
use surveyvault::store::open_store;
use surveyvault::{init_logging, ledger, Config, SubmissionIdentity, SubmissionPipeline};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    let config = Config::load_from(cli.config.clone()).context("loading configuration")?;

    match cli.command {
        Command::Serve(serve_cmd) => handle_serve(config, serve_cmd).await,
        Command::Record(record_cmd) => handle_record(&config, record_cmd).await,
        Command::Stats(stats_cmd) => handle_stats(&config, stats_cmd.json).await,
        Command::Config(config_cmd) => handle_config(&config, config_cmd),
    }
}

async fn handle_serve(mut config: Config, cmd: ServeCommand) -> anyhow::Result<()> {
    if let Some(port) = cmd.port {
        config.server.port = port;
    }
    if let Some(host) = cmd.host {
        config.server.host = host;
    }
    config.validate()?;

    let pipeline = SubmissionPipeline::open(&config)
        .await
        .context("opening record store and ledger")?;

    match server::run(&config, pipeline).await? {
        Shutdown::Interrupted => Ok(()),
        Shutdown::Fatal => bail!("service stopped after a fatal identity generation failure"),
    }
}

async fn handle_record(config: &Config, cmd: RecordCommand) -> anyhow::Result<()> {
    match cmd {
        RecordCommand::Show { identity, json } => {
            let identity = SubmissionIdentity::parse(&identity)?;
            let store = open_store(config)?;
            let Some(record) = store.get(&identity).await? else {
                bail!("no record stored under {identity}");
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                println!("Record {identity}");
                println!("{}", "=".repeat(39));
                println!("  Age:               {}", record.age);
                println!("  Gender:            {}", record.gender);
                println!("  Marital status:    {}", record.marital_status);
                println!("  Opinion:           {}", record.opinion);
                println!("  Religious view:    {}", record.religious_view);
                println!("  Cultural factors:  {}", record.cultural_factors);
                println!("  Challenges:        {}", record.challenges);
                println!("  Benefits:          {}", record.benefits);
                println!("  Guidance:          {}", record.guidance);
                println!("  Societal changes:  {}", record.societal_changes);
            }
        }
    }
    Ok(())
}

async fn handle_stats(config: &Config, json: bool) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let records = store.count().await?;
    let ledger_path = config.ledger_path();
    let ledger_entries = ledger::read_entries(&ledger_path).await?.len();

    if json {
        let stats = serde_json::json!({
            "backend": store.backend_name(),
            "records": records,
            "ledger_entries": ledger_entries,
            "ledger_path": ledger_path,
        });
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("svault stats");
        println!("------------");
        println!("Backend:         {}", store.backend_name());
        println!("Records:         {records}");
        println!("Ledger entries:  {ledger_entries}");
        println!("Ledger:          {}", ledger_path.display());
        if u64::try_from(ledger_entries).map_or(true, |n| n != records) {
            println!();
            println!("Record and ledger counts differ; some records may be unattributable.");
        }
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Server]");
                println!("  Bind address:       {}", config.bind_addr());
                println!("  Environment:        {}", config.server.environment);
                println!();
                println!("[Storage]");
                println!("  Backend:            {}", config.storage.backend);
                println!("  Records directory:  {}", config.records_dir().display());
                println!("  Database path:      {}", config.database_path().display());
                println!("  Ledger path:        {}", config.ledger_path().display());
                println!();
                println!("[Submission]");
                println!(
                    "  Max text length:    {}",
                    config.submission.max_text_length
                );
                println!();
                println!("[Admission]");
                println!("  Enabled:            {}", config.admission.enabled);
                println!("  Max requests:       {}", config.admission.max_requests);
                println!("  Window (seconds):   {}", config.admission.window_secs);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => bail!("configuration error: {e}"),
            }
        }
    }
    Ok(())
}
