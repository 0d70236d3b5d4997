use std::fs::File;
use std::fs::read_to_string;
use std::io::Read;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;
use clap::Parser;
use log::LevelFilter;
use log::info;
use thiserror::Error;

use peso_game::Player;
use peso_instantiate::Optimisation;
use peso_instantiate::SearchStrategy;
use peso_instantiate::SolveError;
use peso_instantiate::SolveOptions;
use peso_instantiate::evidence_report;
use peso_instantiate::solve_pbes;
use peso_pbes::ParseError;
use peso_pbes::parse_pbes;

#[derive(Parser, Debug)]
#[command(
    name = "pbessolve",
    about = "Generate a parity game from a PBES and solve it",
    long_about = "Solves a PBES from INFILE. If INFILE is not present, stdin is used. The PBES is \
                  first instantiated into a parity game, which is then solved using Zielonka's \
                  algorithm. It supports the generation of a witness or counter example for the \
                  property encoded by the PBES."
)]
struct Cli {
    /// The input PBES; stdin is used when omitted.
    infile: Option<PathBuf>,

    #[command(flatten)]
    verbosity: VerbosityFlag,

    /// The search strategy for exploring the todo list.
    #[arg(long, short = 'z', value_enum, default_value_t = SearchStrategy::BreadthFirst)]
    search_strategy: SearchStrategy,

    /// The partial solving strategy: 0) propagate solved equations using
    /// substitution, 1) propagate solved equations using an attractor,
    /// 2) detect winning loops, 3) solve subgames using a fatal attractor,
    /// 4) solve subgames using the solver.
    #[arg(long, short = 's', default_value_t = 0, value_parser = clap::value_parser!(u32).range(0..=4))]
    solve_strategy: u32,

    /// Developer option that overrides --solve-strategy with a raw
    /// optimisation level between 0 and 8.
    #[arg(long, short = 'l')]
    long_strategy: Option<u32>,

    /// The file to which the evidence (the minimal proof graph) is written.
    #[arg(long)]
    evidence_file: Option<PathBuf>,

    /// Prune the todo list periodically.
    #[arg(long, default_value_t = false)]
    prune_todo_list: bool,

    /// Apply the partial solvers at every iteration.
    #[arg(long, default_value_t = false)]
    aggressive: bool,

    /// Do not move constant expressions to a substitution.
    #[arg(long, default_value_t = false)]
    no_replace_constants_by_variables: bool,

    /// Do a sanity check on the computed strategy.
    #[arg(long, short = 'c', default_value_t = false)]
    check_strategy: bool,

    /// Run the naive instantiation algorithm for a PBES with counter example
    /// information.
    #[arg(long, default_value_t = false)]
    naive_counter_example_instantiation: bool,

    /// Abort when more BES equations are generated.
    #[arg(long)]
    equation_limit: Option<usize>,

    /// The number of worker threads.
    #[arg(long, default_value_t = 1)]
    threads: usize,
}

#[derive(Args, Debug)]
struct VerbosityFlag {
    #[arg(short, long, global = true, default_value_t = false, help = "Set the verbosity to quiet")]
    quiet: bool,

    #[arg(
        short,
        long,
        global = true,
        default_value_t = false,
        help = "Set the verbosity to verbose"
    )]
    verbose: bool,

    #[arg(short, long, global = true, default_value_t = false, help = "Set the verbosity to debug")]
    debug: bool,

    #[arg(long, global = true, default_value_t = false, help = "Set the verbosity to trace")]
    trace: bool,
}

impl VerbosityFlag {
    fn log_level_filter(&self) -> LevelFilter {
        if self.quiet {
            LevelFilter::Error
        } else if self.trace {
            LevelFilter::Trace
        } else if self.debug {
            LevelFilter::Debug
        } else if self.verbose {
            LevelFilter::Info
        } else {
            LevelFilter::Warn
        }
    }
}

#[derive(Error, Debug)]
enum ToolError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Solve(#[from] SolveError),
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(error) => {
            eprintln!("pbessolve: {error}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode, ToolError> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.verbosity.log_level_filter())
        .parse_default_env()
        .init();

    let text = match &cli.infile {
        Some(path) => read_to_string(path)?,
        None => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text)?;
            text
        }
    };
    let pbes = parse_pbes(&text)?;

    let optimisation = match cli.long_strategy {
        Some(level) => Optimisation::try_from(level)?,
        None => match cli.solve_strategy {
            0 => Optimisation::PropagateSolvedUsingSubstitution,
            1 => Optimisation::PropagateSolvedUsingAttractor,
            2 => Optimisation::DetectWinningLoops,
            3 => Optimisation::SolveSubgamesUsingFatalAttractorOriginal,
            _ => Optimisation::SolveSubgamesUsingSolver,
        },
    };
    info!("Using optimisation {optimisation}");

    let options = SolveOptions {
        search_strategy: cli.search_strategy,
        optimisation,
        replace_constants_by_variables: !cli.no_replace_constants_by_variables,
        prune_todo_list: cli.prune_todo_list,
        aggressive: cli.aggressive,
        naive_counter_example_instantiation: cli.naive_counter_example_instantiation,
        check_strategy: cli.check_strategy,
        number_of_threads: cli.threads,
        equation_limit: cli.equation_limit,
    };

    let outcome = solve_pbes(&pbes, &options)?;

    let winner = if outcome.result { Player::Even } else { Player::Odd };
    println!("{}", winner.solution());

    if let Some(path) = &cli.evidence_file {
        let mut file = File::create(path)?;
        write!(file, "{}", evidence_report(&outcome))?;
        info!(
            "Saved {} in {}",
            if outcome.result { "witness" } else { "counter example" },
            path.display()
        );
    }

    Ok(ExitCode::SUCCESS)
}
