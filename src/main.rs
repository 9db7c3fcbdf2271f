use anyhow::{bail, Result};
use catalog_ingest::{
    cli::{Cli, Commands, FormulaCommand},
    collect::{CollectOptions, CollectService, HttpTransport, ResponseCache},
    config::ConfigLoader,
    convert::convert,
    formula::{self, Variables},
    integrate::Action,
    pipeline::Pipeline,
    writer::Store,
};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "catalog_ingest=debug"
    } else {
        "catalog_ingest=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn collector(cache_dir: Option<PathBuf>, ttl_secs: u64) -> Result<CollectService<HttpTransport>> {
    let cache = ResponseCache::new(cache_dir)?.with_max_age(Duration::from_secs(ttl_secs));
    Ok(CollectService::new(HttpTransport::new()?).with_cache(cache))
}

fn variables(vars: Vec<(String, f64)>) -> Variables {
    vars.into_iter().collect()
}

fn main() -> Result<()> {
    let cli = Cli::parse_args();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Sync {
            source,
            entity,
            id,
            collect,
            integrate,
        } => {
            let start = Instant::now();
            let mut loader = ConfigLoader::new(&cli.config_dir)?;
            let config = loader.load_source(&source)?;
            let mapping = loader.load_entity(&source, entity)?;
            let store = Store::open(&cli.db)?;
            let mut pipeline = Pipeline::new(collector(cli.cache_dir, cli.cache_ttl)?, store);

            if let Some(id) = id {
                match pipeline.run_one(&config, &mapping, id, &collect.options(), &integrate.options())? {
                    Some(outcome) => print_json(&outcome)?,
                    None => bail!("{} {} not found upstream", entity, id),
                }
                return Ok(());
            }

            let report = pipeline.run(
                &config,
                &mapping,
                &collect.filters(),
                &collect.options(),
                &integrate.options(),
            )?;
            print_json(&report)?;
            info!(
                elapsed_secs = start.elapsed().as_secs_f64(),
                "sync finished"
            );
            if report.has_failures() {
                bail!(
                    "{} of {} records failed",
                    report.count(Action::Failed),
                    report.outcomes.len()
                );
            }
        }

        Commands::Collect {
            source,
            entity,
            collect,
        } => {
            let mut loader = ConfigLoader::new(&cli.config_dir)?;
            let config = loader.load_source(&source)?;
            let mapping = loader.load_entity(&source, entity)?;
            let collection = collector(cli.cache_dir, cli.cache_ttl)?.fetch_many(
                &config,
                &mapping,
                &collect.filters(),
                &collect.options(),
            )?;
            print_json(&collection)?;
        }

        Commands::Show {
            source,
            entity,
            id,
            no_cache,
        } => {
            let mut loader = ConfigLoader::new(&cli.config_dir)?;
            let config = loader.load_source(&source)?;
            let mapping = loader.load_entity(&source, entity)?;
            let options = CollectOptions {
                skip_cache: no_cache,
                ..Default::default()
            };
            let service = collector(cli.cache_dir, cli.cache_ttl)?;
            let Some(record) = service.fetch_one(&config, &mapping, id, &options)? else {
                bail!("{} {} not found upstream", entity, id);
            };
            let converted = convert(&record, &mapping, &config.default_language);
            print_json(&json!({"record": record, "converted": converted}))?;
        }

        Commands::Formula(FormulaCommand::Eval { formula, vars }) => {
            match formula::evaluate(&formula, &variables(vars)) {
                Some(value) => println!("{}", value),
                None => bail!("formula did not evaluate: {}", formula),
            }
        }

        Commands::Formula(FormulaCommand::Validate { formula }) => {
            let problems = formula::validate_formula(&formula);
            if problems.is_empty() {
                println!("ok");
            } else {
                for problem in &problems {
                    println!("  {}", problem);
                }
                bail!("{} problem(s) found", problems.len());
            }
        }

        Commands::Formula(FormulaCommand::Range {
            formula,
            variable,
            min,
            max,
            vars,
        }) => {
            let values = formula::evaluate_for_variable_range(
                &formula,
                &variable,
                min,
                max,
                &variables(vars),
            )?;
            print_json(&values)?;
        }

        Commands::ListEntities { source } => {
            let mut loader = ConfigLoader::new(&cli.config_dir)?;
            let config = loader.load_source(&source)?;
            println!("Entities in {} ({}):\n", source, config.base_url);
            for (kind, mapping) in &config.entities {
                println!("  {:14} {}", kind.as_str(), mapping.endpoint);
            }
        }

        Commands::ClearCache => {
            let cache = ResponseCache::new(cli.cache_dir)?;
            let removed = cache.clear()?;
            println!("Removed {} cached responses from {:?}", removed, cache.cache_dir());
        }
    }

    Ok(())
}
