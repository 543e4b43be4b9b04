use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use log::info;

use lazy_cpa::algorithm::{CpaAlgorithm, Verdict};
use lazy_cpa::cfa::{Cfa, CfaBuilder};
use lazy_cpa::config::Config;
use lazy_cpa::expr::Expr;
use lazy_cpa::predicate::PredicateScope;

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Program {
    /// `x := true; if (!x) error;`
    Guarded,
    /// A lock acquired and released in a loop.
    Lock,
    /// Two calls to a function negating `x`, checked after each call.
    Flip,
    /// `a := *; if (a) error;`
    Unsafe,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Scope {
    Location,
    Function,
    Global,
}

impl From<Scope> for PredicateScope {
    fn from(scope: Scope) -> Self {
        match scope {
            Scope::Location => PredicateScope::Location,
            Scope::Function => PredicateScope::Function,
            Scope::Global => PredicateScope::Global,
        }
    }
}

#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Program to verify.
    #[arg(value_enum, default_value = "lock")]
    program: Program,

    /// Explore breadth-first.
    #[clap(long)]
    bfs: bool,

    /// Disable refinement.
    #[clap(long)]
    no_refinement: bool,

    /// Where refined predicates are attached.
    #[clap(long, value_enum, default_value = "location")]
    scope: Scope,

    /// File with fixed predicates.
    #[clap(long, value_name = "FILE")]
    predicates: Option<PathBuf>,

    /// Bound on the number of refinements.
    #[clap(long, value_name = "INT")]
    max_refinements: Option<usize>,

    /// Write the final ART to this file in DOT format.
    #[clap(long, value_name = "FILE")]
    dot: Option<PathBuf>,
}

fn guarded() -> color_eyre::Result<Cfa> {
    let mut builder = CfaBuilder::new();
    let main = builder.function("main")?;
    let l1 = builder.node("main");
    let err = builder.error_node("main");
    builder.assign(main.entry, l1, "x", Expr::Lit(true));
    builder.branch(l1, Expr::var("x").not(), err, main.exit);
    Ok(builder.build()?)
}

fn lock() -> color_eyre::Result<Cfa> {
    let mut builder = CfaBuilder::new();
    let main = builder.function("main")?;
    let head = builder.node("main");
    let h1 = builder.node("main");
    let acq = builder.node("main");
    let a2 = builder.node("main");
    let rel = builder.node("main");
    let err = builder.error_node("main");
    builder.assign(main.entry, head, "lock", Expr::Lit(false));
    builder.havoc(head, h1, "req");
    builder.branch(h1, Expr::var("req"), acq, head);
    builder.branch(acq, Expr::var("lock"), err, a2);
    builder.assign(a2, rel, "lock", Expr::Lit(true));
    builder.assign(rel, head, "lock", Expr::Lit(false));
    builder.blank(head, main.exit);
    Ok(builder.build()?)
}

fn flip() -> color_eyre::Result<Cfa> {
    let mut builder = CfaBuilder::new();
    let main = builder.function("main")?;
    let c1 = builder.node("main");
    let r1 = builder.node("main");
    let c2 = builder.node("main");
    let r2 = builder.node("main");
    let err = builder.error_node("main");
    builder.assign(main.entry, c1, "x", Expr::Lit(false));
    builder.call(c1, "flip", r1);
    builder.branch(r1, Expr::var("x").not(), err, c2);
    builder.call(c2, "flip", r2);
    builder.branch(r2, Expr::var("x"), err, main.exit);
    let flip = builder.function("flip")?;
    builder.assign(flip.entry, flip.exit, "x", Expr::var("x").not());
    Ok(builder.build()?)
}

fn unsafe_program() -> color_eyre::Result<Cfa> {
    let mut builder = CfaBuilder::new();
    let main = builder.function("main")?;
    let l1 = builder.node("main");
    let err = builder.error_node("main");
    builder.havoc(main.entry, l1, "a");
    builder.branch(l1, Expr::var("a"), err, main.exit);
    Ok(builder.build()?)
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let time_total = std::time::Instant::now();

    let args = Cli::parse();
    println!("args = {:?}", args);

    let cfa = match args.program {
        Program::Guarded => guarded()?,
        Program::Lock => lock()?,
        Program::Flip => flip()?,
        Program::Unsafe => unsafe_program()?,
    };
    info!("CFA has {} locations and {} edges", cfa.num_nodes(), cfa.edges().count());

    let mut config = Config::default()
        .with_breadth_first(args.bfs)
        .with_refinement(!args.no_refinement)
        .with_predicate_scope(args.scope.into());
    if let Some(path) = &args.predicates {
        config = config.with_predicate_file(path);
    }
    if let Some(limit) = args.max_refinements {
        config = config.with_max_refinements(limit);
    }

    let mut algorithm = CpaAlgorithm::for_boolean_program(&cfa, &config)?;
    let verdict = algorithm.run()?;
    match &verdict {
        Verdict::Safe => println!("SAFE"),
        Verdict::Unsafe(trace) => {
            println!("UNSAFE");
            println!("{}", trace);
        }
    }
    println!("{}", algorithm.statistics());
    println!("BDD nodes: {}", algorithm.transfer().manager().bdd().num_nodes());

    if let Some(path) = &args.dot {
        let dot = algorithm.transfer().to_dot()?;
        std::fs::write(path, dot)?;
        println!("ART written to {}", path.display());
    }

    let time_total = time_total.elapsed();
    println!("Done in {:.1} s", time_total.as_secs_f64());

    Ok(())
}
