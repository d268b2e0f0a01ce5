mod drivers;

use clap::Parser;
use log::{error, info, warn};
use logtap_core::agent::AgentRuntime;
use logtap_core::config::{
    self, AgentsDocument, BaseDocument, DatabasesDocument, ProducersDocument,
};
use logtap_core::registries::{DatabaseFactory, ProducerFactory, Registries};
use logtap_core::transform::Identity;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "logtap", about = "Runs configured log-tailing enrichment agents")]
struct Cli {
    /// Directory containing base.yaml, agents.yaml, databases.yaml, producers.yaml
    #[arg(long, default_value = "config")]
    config_dir: PathBuf,
}

fn build_factories() -> (HashMap<String, DatabaseFactory>, HashMap<String, ProducerFactory>) {
    let mut database_factories: HashMap<String, DatabaseFactory> = HashMap::new();
    database_factories.insert(
        "console".into(),
        Arc::new(|_| Ok(Arc::new(drivers::ConsoleDatabase) as Arc<dyn logtap_core::traits::Database>)),
    );

    let mut producer_factories: HashMap<String, ProducerFactory> = HashMap::new();
    producer_factories.insert(
        "console".into(),
        Arc::new(|_| Ok(Arc::new(drivers::ConsoleProducer) as Arc<dyn logtap_core::traits::Producer>)),
    );

    (database_factories, producer_factories)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let base: BaseDocument = match config::load_yaml(cli.config_dir.join("base.yaml")) {
        Ok(base) => base,
        Err(err) => {
            eprintln!("failed to load base.yaml: {err}");
            std::process::exit(1);
        }
    };

    env_logger::Builder::new()
        .parse_filters(&base.app.log_level)
        .init();

    info!("starting {} v{}", base.app.name, base.app.version);

    let agents: AgentsDocument = match config::load_yaml(cli.config_dir.join("agents.yaml")) {
        Ok(doc) => doc,
        Err(err) => {
            error!("failed to load agents.yaml: {err}");
            std::process::exit(1);
        }
    };
    let databases: DatabasesDocument = match config::load_yaml(cli.config_dir.join("databases.yaml"))
    {
        Ok(doc) => doc,
        Err(err) => {
            error!("failed to load databases.yaml: {err}");
            std::process::exit(1);
        }
    };
    let producers: ProducersDocument = match config::load_yaml(cli.config_dir.join("producers.yaml"))
    {
        Ok(doc) => doc,
        Err(err) => {
            error!("failed to load producers.yaml: {err}");
            std::process::exit(1);
        }
    };

    for database in &databases.databases {
        if let Err(err) = database.validate() {
            error!("invalid database config `{}`: {err}", database.name);
        }
    }
    for producer in &producers.producers {
        if let Err(err) = producer.validate() {
            error!("invalid producer config `{}`: {err}", producer.name);
        }
    }

    let (database_factories, producer_factories) = build_factories();
    let registries = Arc::new(Registries::new(
        databases.databases,
        producers.producers,
        database_factories,
        producer_factories,
    ));

    let mut running = Vec::new();
    for agent_config in agents.agents {
        let name = agent_config.name.clone();
        match AgentRuntime::new(agent_config, registries.clone(), Arc::new(Identity)) {
            Ok(agent) => {
                agent.start().await;
                running.push(agent);
            }
            Err(err) => {
                error!("could not start agent `{name}`: {err}");
            }
        }
    }

    if running.is_empty() {
        warn!("no agents started, exiting");
        return;
    }

    info!("{} agent(s) running, waiting for shutdown signal", running.len());
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {err}");
    }

    info!("shutting down");
    for agent in running {
        agent.stop().await;
    }
}
