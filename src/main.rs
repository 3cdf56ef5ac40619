use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use regsync::cli::{Cli, Command};
use regsync::config::RegsyncConfig;
use regsync::joblog;
use regsync::registry::{Credential, HttpConnector};
use regsync::replication::Operation;
use regsync::state_machine::FORCED_STATES;
use regsync::store::{JobStore, MemoryStore, NewJob, RepPolicy, RepTarget, Seed};
use regsync::ui::RunProgress;
use regsync::{Services, StateMachine, WorkerPool};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "regsync=debug"
    } else {
        "regsync=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = RegsyncConfig::load(&cli.config)?;
    if let Some(workers) = cli.workers {
        config.workers = workers.max(1);
    }

    match cli.command {
        Command::Run { file } => run(&config, &file).await,
        Command::Graph { operation } => graph(&config, operation.into()).await,
        Command::Log { job_id } => show_log(&config, job_id).await,
    }
}

fn services(config: &RegsyncConfig, store: Arc<dyn JobStore>) -> Result<Services> {
    let secret = (!config.local_secret.is_empty())
        .then(|| Credential::Secret(config.local_secret.clone()));
    let mut services = Services::new(store, Arc::new(HttpConnector))
        .with_source(config.local_registry_url.clone(), secret);
    if let Some(dir) = &config.log_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create log dir {}", dir.display()))?;
        services = services.with_log_dir(dir);
    }
    Ok(services)
}

async fn run(config: &RegsyncConfig, file: &Path) -> Result<()> {
    let contents = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let seed = Seed::from_toml(&contents)
        .with_context(|| format!("failed to parse {}", file.display()))?;
    let (store, requests) = MemoryStore::from_seed(seed);
    let store = Arc::new(store);

    let services = services(config, store.clone())?;
    let pool = WorkerPool::start(config.workers, config.queue_capacity, Arc::new(services));
    let progress = RunProgress::start(requests.len(), pool.size());

    for request in requests {
        let operation: Operation = match request.operation.parse() {
            Ok(operation) => operation,
            Err(e) => {
                progress.warn(&format!("policy {}: {e}", request.policy_id));
                continue;
            }
        };
        let submitted = pool
            .submit(
                request.policy_id,
                request.repository.as_deref(),
                operation,
                request.tags,
            )
            .await;
        if let Err(e) = submitted {
            progress.warn(&format!("policy {}: {e}", request.policy_id));
        }
    }
    pool.shutdown().await;

    progress.finish(&store.jobs());
    Ok(())
}

async fn graph(config: &RegsyncConfig, operation: Operation) -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    store.insert_target(RepTarget {
        id: 1,
        name: "example".into(),
        url: "http://target.example".into(),
        username: String::new(),
        password: String::new(),
    });
    store.insert_policy(RepPolicy {
        id: 1,
        name: "example".into(),
        project_id: 1,
        target_id: 1,
        enabled: true,
    });
    let job_id = store
        .add_job(NewJob {
            policy_id: 1,
            repository: "library/example".into(),
            operation: operation.to_string(),
            tags: vec![],
        })
        .await?;

    let mut services = services(config, store)?;
    services.log_dir = None;
    let mut machine = StateMachine::new();
    machine.reset(job_id, &services).await?;
    info!(%operation, "transition table built");

    print!("{}", machine.table());
    let forced: Vec<String> = FORCED_STATES.iter().map(|s| s.to_string()).collect();
    println!("* -> {}", forced.join(" | "));
    Ok(())
}

async fn show_log(config: &RegsyncConfig, job_id: i64) -> Result<()> {
    let Some(dir) = &config.log_dir else {
        bail!("log_dir is not set in the configuration");
    };
    let log = joblog::read_log(dir, job_id)
        .await
        .with_context(|| format!("no log for job {job_id} in {}", dir.display()))?;
    print!("{log}");
    Ok(())
}
