use anyhow::Result;
use task_lifecycle::cli::{
    Args, ConfigDiscovery, ExecutionMode, FactoryConfig, InspectConfig, ReincarnateConfig,
    SnapshotLoader, render_tree,
};
use task_lifecycle::env::logging;
use task_lifecycle::task::TaskFactory;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = Args::parse();
    let mode = match args.mode() {
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(mode.verbose());

    match mode {
        ExecutionMode::Inspect(config) => run_inspect(config),
        ExecutionMode::Reincarnate(config) => run_reincarnate(config),
        ExecutionMode::ShowConfig => {
            ConfigDiscovery::show_discovery_info();
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new(logging::VERBOSE_LOG_FILTER)
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(logging::DEFAULT_LOG_FILTER))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_inspect(config: InspectConfig) -> Result<()> {
    info!("Inspecting snapshot file: {:?}", config.snapshot);

    let snapshots = SnapshotLoader::load(&config.snapshot)?;
    let tasks = SnapshotLoader::rebuild(&TaskFactory::default(), &snapshots);

    if config.json {
        let likes: Vec<_> = tasks.iter().map(|task| task.to_like()).collect();
        println!("{}", serde_json::to_string_pretty(&likes)?);
        return Ok(());
    }

    for task in &tasks {
        for line in render_tree(task) {
            println!("{}", line);
        }
    }
    Ok(())
}

fn run_reincarnate(config: ReincarnateConfig) -> Result<()> {
    let factory_config = match &config.config_override {
        Some(path) => {
            info!("Loading configuration override from: {:?}", path);
            FactoryConfig::from_toml_file(path)?
        }
        None => ConfigDiscovery::discover_config()?,
    };

    let mut options = factory_config.reincarnation;
    if let Some(revert_attempts) = config.revert_attempts {
        options.revert_attempts = revert_attempts;
    }

    let factory = TaskFactory::from_config(&factory_config);
    let snapshots = SnapshotLoader::load(&config.snapshot)?;
    let (tasks, report) =
        SnapshotLoader::reincarnate(&factory, &snapshots, &config.active_defs, options)?;

    if config.verbose {
        for task in &tasks {
            for line in render_tree(task) {
                println!("{}", line);
            }
        }
        println!();
    }

    println!("Will run again ({}):", report.rerun.len());
    for path in &report.rerun {
        println!("  {}", path);
    }
    println!("Keeps its outcome ({}):", report.kept.len());
    for path in &report.kept {
        println!("  {}", path);
    }
    println!("Unusable history ({}):", report.unusable.len());
    for path in &report.unusable {
        println!("  {}", path);
    }
    Ok(())
}
