//! Ferrule CLI
//!
//! Runs single files, lists the language table and serves JSON execution
//! requests over stdin/stdout or HTTP.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ferrule::{
    Config, EXAMPLE_CONFIG, ExecutionRequest, ExecutionResult, MAX_WALL_TIME_LIMIT, Runner,
    is_valid_wall_time,
};
use tracing::{Level, debug, info};
use tracing_subscriber::EnvFilter;

mod http;
mod protocol;
mod serve;

#[derive(Parser)]
#[command(name = "ferrule")]
#[command(about = "Compile and run code snippets under a deadline")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init {
        /// Output path (default: ferrule.toml)
        #[arg(short, long, default_value = "ferrule.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Run a program (compile if needed, then execute)
    Run {
        /// Source file to run
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Language ID (e.g., python, cpp, java, javascript)
        #[arg(short, long)]
        language: String,

        /// File whose contents are passed as stdin (default: empty)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Wall time limit per stage in seconds
        #[arg(short = 't', long)]
        wall_time_limit: Option<f64>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Serve newline-delimited JSON requests on stdin, one response per line on stdout
    Serve,

    /// Serve execution requests over HTTP
    Http {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:8000")]
        listen: SocketAddr,
    },

    /// List available languages
    Languages,

    /// Show the effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    // stdout carries program output and JSON responses
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Init { output, force } = &cli.command {
        return init_config(output, *force).await;
    }

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Run {
            source,
            language,
            input,
            wall_time_limit,
            json,
        } => {
            run_file(
                config,
                &source,
                &language,
                input.as_deref(),
                wall_time_limit,
                json,
            )
            .await
        }
        Commands::Serve => {
            let runner = Runner::new(config);
            info!(
                languages = ?runner.config().language_ids(),
                max_concurrent = runner.config().max_concurrent,
                "serving requests on stdin"
            );
            serve::serve(runner, tokio::io::stdin(), tokio::io::stdout()).await?;
            Ok(())
        }
        Commands::Http { listen } => {
            let runner = Runner::new(config);
            info!(
                languages = ?runner.config().language_ids(),
                max_concurrent = runner.config().max_concurrent,
                "starting HTTP server"
            );
            http::serve(runner, listen).await
        }
        Commands::Languages => {
            list_languages(&config);
            Ok(())
        }
        Commands::ShowConfig => {
            show_config(&config);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => info!(?path, "loading configuration"),
        None => debug!("using default configuration"),
    }
    Config::load(path).context("failed to load configuration")
}

async fn run_file(
    mut config: Config,
    source: &Path,
    language_id: &str,
    input: Option<&Path>,
    wall_time_limit: Option<f64>,
    json: bool,
) -> Result<()> {
    let code = tokio::fs::read_to_string(source)
        .await
        .with_context(|| format!("failed to read source file '{}'", source.display()))?;

    let input = match input {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read input file '{}'", path.display()))?,
        None => String::new(),
    };

    if let Some(seconds) = wall_time_limit {
        anyhow::ensure!(
            is_valid_wall_time(seconds),
            "wall time limit must be between 0 and {MAX_WALL_TIME_LIMIT} seconds"
        );
        config.limits.wall_time_limit = Some(seconds);
    }

    let runner = Runner::new(config);
    let request = ExecutionRequest::new(language_id, code).with_input(input);

    info!(language = language_id, "running program");
    let result = runner
        .execute(&request)
        .await
        .context("execution could not be prepared")?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("failed to encode result")?
        );
    } else {
        print_result(&result);
    }

    if result.is_success() {
        Ok(())
    } else {
        std::process::exit(exit_status(&result));
    }
}

fn print_result(result: &ExecutionResult) {
    print!("{}", result.output);
    if !result.error.is_empty() {
        eprintln!("{}", result.error);
    }

    // Keep stdout clean for piping
    info!(
        success = result.success,
        exit_code = result.exit_code,
        truncated = result.truncated,
        "execution result"
    );
}

/// Process exit status mirroring the result: the program's own code when it
/// has one, 1 for every classified failure without one
fn exit_status(result: &ExecutionResult) -> i32 {
    match result.exit_code {
        code @ 1..=255 => code,
        _ => 1,
    }
}

fn list_languages(config: &Config) {
    println!("Available languages:\n");

    for id in config.language_ids() {
        let Ok(lang) = config.get_language(id) else {
            continue;
        };
        let lang_type = if lang.is_compiled() {
            "compiled"
        } else {
            "interpreted"
        };
        println!("  {:<15} {} ({})", id, lang.name, lang_type);
    }
}

fn show_config(config: &Config) {
    let limits = config.effective_limits(None);
    println!("Default resource limits:");
    println!("  Wall time limit: {}s per stage", limits.wall_time_seconds());
    println!("  Max output: {:?} KB per stream", limits.max_output);
    println!("  Time limit: {:?}", limits.time_limit);
    println!("  Memory limit: {:?} KB", limits.memory_limit);
    println!("  Max processes: {:?}", limits.max_processes);
    println!("  Max open files: {:?}", limits.max_open_files);
    println!();
    println!("Sandbox policy: {:?}", config.sandbox.policy);
    if config.sandbox.clear_env {
        println!("  Environment cleared, PATH={}", config.sandbox.path);
    }
    println!();
    println!("Scratch root: {}", config.scratch_root().display());
    println!("Max concurrent executions: {}", config.max_concurrent);
    println!("Languages configured: {}", config.languages.len());
}

async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_run() {
        let cli = Cli::try_parse_from([
            "ferrule", "run", "main.py", "--language", "python", "--json", "-t", "2.5",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                source,
                language,
                json,
                wall_time_limit,
                input,
            } => {
                assert_eq!(source, PathBuf::from("main.py"));
                assert_eq!(language, "python");
                assert!(json);
                assert_eq!(wall_time_limit, Some(2.5));
                assert!(input.is_none());
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn cli_global_config_flag() {
        let cli = Cli::try_parse_from(["ferrule", "serve", "--config", "ferrule.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("ferrule.toml")));
        assert!(matches!(cli.command, Commands::Serve));
    }

    #[test]
    fn cli_parses_http_listen_address() {
        let cli = Cli::try_parse_from(["ferrule", "http"]).unwrap();
        match cli.command {
            Commands::Http { listen } => assert_eq!(listen, "127.0.0.1:8000".parse().unwrap()),
            _ => panic!("expected http command"),
        }

        let cli = Cli::try_parse_from(["ferrule", "http", "--listen", "0.0.0.0:9000"]).unwrap();
        assert!(matches!(cli.command, Commands::Http { listen } if listen.port() == 9000));
    }

    #[tokio::test]
    async fn run_rejects_out_of_range_wall_time() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("main.py");
        std::fs::write(&source, "print(1)").unwrap();

        for seconds in [1e300, f64::INFINITY, 0.0, -1.0] {
            let error = run_file(
                Config::default(),
                &source,
                "python",
                None,
                Some(seconds),
                false,
            )
            .await
            .unwrap_err();
            assert!(error.to_string().contains("wall time limit"), "{seconds}");
        }
    }

    #[test]
    fn exit_status_mirrors_result() {
        assert_eq!(exit_status(&ExecutionResult::failure("x", 3)), 3);
        assert_eq!(exit_status(&ExecutionResult::failure("timeout", -1)), 1);
        assert_eq!(exit_status(&ExecutionResult::failure("signal", -9)), 1);
        assert_eq!(exit_status(&ExecutionResult::failure("odd", 0)), 1);
    }

    #[tokio::test]
    async fn init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ferrule.toml");

        init_config(&path, false).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), EXAMPLE_CONFIG);

        assert!(init_config(&path, false).await.is_err());
        init_config(&path, true).await.unwrap();
    }
}
