use std::{error::Error as _, fs, process, sync::Arc};

use clap::{Parser, Subcommand};
use log::info;
use tank_engine::{
    compiler::CompilerEnvironmentStatus,
    config::EngineConfig,
    error::Result,
    problem::ProblemConfig,
    vfs::RamFs,
    Phase, Test,
};

#[derive(Parser)]
#[command(
    name = "tank",
    version,
    author = "Kanari",
    about = "Compile a submission and judge it against a problem on a pool of environments."
)]
struct Cli {
    /// Engine configuration: pool and compiler
    #[arg(short, long, global = true, default_value = "engine.yaml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Judge a source file against every case of a problem
    Judge {
        /// Problem configuration
        #[arg(short, long)]
        problem: String,

        /// Path of the source file
        source: String,
    },

    /// Compile a source file and print the diagnostics
    Compile {
        /// Path of the source file
        source: String,
    },

    /// Check that the configured toolchain is installed
    Check,
}

const SOURCE: &str = "source";

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("error: {}", e);
        let mut cause = e.source();
        while let Some(inner) = cause {
            eprintln!("  caused by: {}", inner);
            cause = inner.source();
        }
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = EngineConfig::from_file(&cli.config)?;

    match cli.command {
        Commands::Judge { problem, source } => {
            let problem = ProblemConfig::from_file(&problem)?;
            let pool = Arc::new(config.pool.build()?);
            let compiler = Arc::new(config.compiler.build());
            let mut test = Test::new(
                problem.is_spj(),
                pool,
                compiler,
                Arc::new(load_source(&source)?),
                SOURCE,
            );
            problem.queue(&mut test)?;
            info!("judging {} against `{}`", source, problem.name);

            loop {
                let step = test.step()?;
                if step.phase == Phase::NoMore {
                    break;
                }
                let result = &step.result;
                println!(
                    "[{} {}] {}, time = {}ms, mem = {}kb",
                    step.phase,
                    step.index,
                    result.flag,
                    result.time_usage_ms,
                    result.memory_usage_kb
                );
                if !result.judge_output.is_empty() && step.phase != Phase::Summary {
                    println!("{}", result.judge_output.trim_end());
                }
            }
        }
        Commands::Compile { source } => {
            let pool = config.pool.build()?;
            let compiler = config.compiler.build();
            let result = compiler.compile_normal(&pool, &load_source(&source)?, SOURCE)?;
            println!(
                "{}, exit code {}, time = {}ms, mem = {}kb",
                result.verdict(),
                result.exit_code,
                result.time_usage_ms,
                result.memory_usage_kb
            );
            if !result.std_output.is_empty() {
                println!("{}", result.std_output.trim_end());
            }
        }
        Commands::Check => match config.compiler.build().check_environment() {
            CompilerEnvironmentStatus::OK { path } => println!("{}: ok", path),
            CompilerEnvironmentStatus::Missing => {
                println!("{}: missing", config.compiler.executable);
                process::exit(2);
            }
        },
    }

    Ok(())
}

fn load_source(path: &str) -> Result<RamFs> {
    let store = RamFs::new();
    store.set(SOURCE, fs::read(path)?);
    Ok(store)
}
