//! Command-line front end for the FHIRPath engine
//!
//! Evaluates expressions against JSON resources read from a file or stdin,
//! and prints the AST or token stream of an expression.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::Value as JsonValue;

use fhirpath_engine::model::json_to_collection;
use fhirpath_engine::parser::tokenize;
use fhirpath_engine::{EvaluationConfig, FhirPathEngine, FhirPathError, ParseError, parse};

#[derive(Parser)]
#[command(name = "fhirpath-engine")]
#[command(about = "Evaluate FHIRPath expressions against FHIR resources")]
#[command(version)]
#[command(author = "OctoFHIR Team <funyloony@gmail.com>")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Evaluation configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the node-visit budget
    #[arg(long, global = true)]
    max_steps: Option<usize>,

    /// Verbose output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate an expression against a FHIR resource
    Evaluate {
        /// FHIRPath expression to evaluate
        expression: String,
        /// JSON file containing the resource (reads stdin if not provided)
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Environment variable as name=json, e.g. --var limit=5
        #[arg(long = "var", value_name = "NAME=JSON")]
        vars: Vec<String>,
        /// Pretty-print JSON output
        #[arg(short, long)]
        pretty: bool,
    },
    /// Parse an expression and print its AST
    Parse {
        /// FHIRPath expression to parse
        expression: String,
    },
    /// Print the token stream of an expression
    Tokens {
        /// FHIRPath expression to tokenize
        expression: String,
    },
}

fn main() {
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(err) = run(cli) {
        eprintln!("{} {err:#}", "error:".red().bold());
        process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref(), cli.max_steps)?;
    match cli.command {
        Commands::Evaluate {
            expression,
            file,
            vars,
            pretty,
        } => evaluate(&expression, file.as_deref(), &vars, pretty, config),
        Commands::Parse { expression } => {
            let ast = parse(&expression).map_err(|e| diagnostic(&expression, &e))?;
            println!("{ast:#?}");
            Ok(())
        }
        Commands::Tokens { expression } => {
            let tokens = tokenize(&expression).map_err(|e| diagnostic(&expression, &e))?;
            for token in tokens {
                println!("{:>4}..{:<4} {}", token.start, token.end, token.value);
            }
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>, max_steps: Option<usize>) -> Result<EvaluationConfig> {
    let mut config = match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read config file '{}'", path.display()))?;
            EvaluationConfig::from_json(&text)
                .with_context(|| format!("invalid config file '{}'", path.display()))?
        }
        None => EvaluationConfig::default(),
    };
    if max_steps.is_some() {
        config.max_steps = max_steps;
    }
    Ok(config)
}

fn read_resource(file: Option<&Path>) -> Result<JsonValue> {
    let text = match file {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read resource file '{}'", path.display()))?,
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read resource from stdin")?;
            buffer
        }
    };
    serde_json::from_str(&text).context("resource is not valid JSON")
}

fn parse_var(spec: &str) -> Result<(String, JsonValue)> {
    let Some((name, value)) = spec.split_once('=') else {
        bail!("variable '{spec}' must have the form name=json");
    };
    let value = serde_json::from_str(value)
        .with_context(|| format!("value of variable '{name}' is not valid JSON"))?;
    Ok((name.to_string(), value))
}

fn evaluate(
    expression: &str,
    file: Option<&Path>,
    vars: &[String],
    pretty: bool,
    config: EvaluationConfig,
) -> Result<()> {
    let engine = FhirPathEngine::with_config(config);
    let resource = read_resource(file)?;
    let mut env = engine.environment().with_json_resource(&resource);
    for spec in vars {
        let (name, value) = parse_var(spec)?;
        env.set_variable(name, json_to_collection(&value, None));
    }

    let result = engine
        .evaluate_with_env(expression, &env)
        .map_err(|err| match err {
            FhirPathError::Parse(e) => diagnostic(expression, &e),
            FhirPathError::Evaluation(e) => anyhow!(e),
        })?;

    let json = result.to_json();
    let output = if pretty {
        serde_json::to_string_pretty(&json)
    } else {
        serde_json::to_string(&json)
    }
    .context("failed to render result")?;
    println!("{output}");
    Ok(())
}

/// Parse error with the expression and a caret under the offending offset
fn diagnostic(expression: &str, err: &ParseError) -> anyhow::Error {
    let column = expression
        .get(..err.offset())
        .map_or(err.offset(), |prefix| prefix.chars().count());
    anyhow!(
        "{err}\n  {expression}\n  {}{}",
        " ".repeat(column),
        "^".yellow().bold()
    )
}
