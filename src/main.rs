use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{error, info, LevelFilter};

use dtsynth::error::SynthResult;
use dtsynth::expr::ExprVal;
use dtsynth::grammar::Grammar;
use dtsynth::oracle::Specification;
use dtsynth::search::{SynthConfig, Synthesizer, DEFAULT_TERM_BUDGET, DEFAULT_VERIFICATION_CHECKS};

#[derive(Parser)]
#[command(author, version, about = "Decision-tree program synthesis from a grammar and a relation")]
struct Cli {
    /// More output: -v info, -vv debug, -vvv trace
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synthesize a function from a user grammar and relation
    Run {
        /// Term rules, comma-separated. `T` marks a term slot
        /// Example: "0,1,x,y,T + T"
        #[arg(long)]
        terms: String,

        /// Condition rules, comma-separated. `C` marks a predicate slot
        /// Example: "T <= T,C and C,not C"
        #[arg(long)]
        conditions: String,

        /// Relation between the inputs and `out` the result must satisfy
        #[arg(long)]
        spec: String,

        /// Known inputs to start from, as "1 0;0 2"
        #[arg(long)]
        points: Option<String>,

        #[command(flatten)]
        opts: SynthOpts,
    },

    /// Run one of the bundled problems
    Demo {
        problem: Demo,

        #[command(flatten)]
        opts: SynthOpts,
    },
}

#[derive(Args)]
struct SynthOpts {
    /// Name of the rendered function
    #[arg(long, default_value = "my_func")]
    name: String,

    #[arg(long)]
    max_iterations: Option<usize>,

    /// Random points tried against each candidate
    #[arg(long, default_value_t = DEFAULT_VERIFICATION_CHECKS)]
    max_checks: usize,

    /// Terms tried within one iteration before giving up
    #[arg(long, default_value_t = DEFAULT_TERM_BUDGET)]
    max_terms: usize,

    /// Seed for the test point generator
    #[arg(long)]
    seed: Option<u64>,
}

impl From<SynthOpts> for SynthConfig {
    fn from(opts: SynthOpts) -> Self {
        SynthConfig {
            name: opts.name,
            max_iterations: opts.max_iterations,
            max_verification_checks: opts.max_checks,
            max_terms_per_iteration: opts.max_terms,
            seed: opts.seed,
            ..SynthConfig::default()
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Demo {
    Max,
    Min,
    Abs,
}

struct Problem {
    terms: Vec<String>,
    conditions: Vec<String>,
    spec: String,
    points: Vec<Vec<ExprVal>>,
}

impl Problem {
    fn new(terms: &[&str], spec: &str, points: &[[ExprVal; 2]]) -> Self {
        Problem {
            terms: terms.iter().map(|t| t.to_string()).collect(),
            conditions: ["T <= T", "C and C", "not C"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            spec: spec.to_string(),
            points: points.iter().map(|p| p.to_vec()).collect(),
        }
    }
}

impl Demo {
    fn problem(self) -> Problem {
        match self {
            Demo::Max => Problem::new(
                &["0", "1", "x", "y", "T + T"],
                "out >= x and out >= y and (out == x or out == y)",
                &[[1, 0], [0, 2]],
            ),
            Demo::Min => Problem::new(
                &["0", "1", "x", "y", "T + T"],
                "out <= x and out <= y and (out == x or out == y)",
                &[[1, 0], [0, 2]],
            ),
            Demo::Abs => Problem::new(
                &["0", "1", "x", "T + T", "-T"],
                "(x >= 0 and out == x) or (x < 0 and out == -x)",
                &[],
            ),
        }
    }
}

/// Splits on commas outside parentheses, so `max(x, y)` stays whole.
fn split_rules(list: &str) -> Vec<String> {
    let mut rules = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();

    for c in list.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                rules.push(std::mem::take(&mut current));
                continue;
            }
            _ => (),
        }
        current.push(c);
    }
    rules.push(current);

    rules
        .into_iter()
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .collect()
}

fn parse_points(list: &str) -> Result<Vec<Vec<ExprVal>>, String> {
    list.split(';')
        .filter(|p| !p.trim().is_empty())
        .map(|p| {
            p.split_whitespace()
                .map(|v| v.parse::<ExprVal>().map_err(|e| format!("bad point `{p}`: {e}")))
                .collect::<Result<Vec<_>, _>>()
        })
        .collect()
}

fn solve(problem: Problem, config: SynthConfig) -> SynthResult<String> {
    let grammar = Grammar::new(problem.terms, problem.conditions)?;
    let spec = Specification::parse(&problem.spec, grammar.identifiers())?;
    let mut synth = Synthesizer::new(grammar, spec, config)?;

    for point in problem.points {
        synth.add_point(point)?;
    }

    let candidate = synth.synthesize()?;
    info!("Done after {} iterations", synth.iteration());

    Ok(candidate.source())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    colog::default_builder().filter_level(level).init();

    let (problem, opts) = match cli.command {
        Commands::Run {
            terms,
            conditions,
            spec,
            points,
            opts,
        } => {
            let points = match points.as_deref().map(parse_points).transpose() {
                Ok(points) => points.unwrap_or_default(),
                Err(e) => {
                    error!("{e}");
                    return ExitCode::FAILURE;
                }
            };
            let problem = Problem {
                terms: split_rules(&terms),
                conditions: split_rules(&conditions),
                spec,
                points,
            };
            (problem, opts)
        }
        Commands::Demo { problem, opts } => (problem.problem(), opts),
    };

    match solve(problem, opts.into()) {
        Ok(source) => {
            println!("{source}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
