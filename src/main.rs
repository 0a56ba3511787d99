// SPDX-License-Identifier: Apache-2.0

//! Command line front end of the TalisMan verifier.

use clap::Parser;

use talisman::config::{Config, LinMethod, SpecMode};
use talisman::engine::Engine;
use talisman::error::EngineError;
use talisman::poly::poly_to_string;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Algebraic equivalence checker for And-Inverter Graphs.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// File containing the AIG (ASCII AIGER).
    input: String,

    /// Specification polynomial file (when no built-in spec is selected).
    spec_file: Option<String>,

    /// Use the miter specification.
    #[arg(long, conflicts_with_all = ["mult_spec", "assert_spec", "spec_file"])]
    miter_spec: bool,

    /// Use the unsigned-multiplier specification.
    #[arg(long, conflicts_with_all = ["assert_spec", "spec_file"])]
    mult_spec: bool,

    /// Use the assertion specification.
    #[arg(long, conflicts_with = "spec_file")]
    assert_spec: bool,

    /// Enable proof logging; takes the axiom, step and spec output paths.
    #[arg(long, num_args = 3, value_names = ["POLYS", "STEPS", "SPEC"])]
    proofs: Option<Vec<String>>,

    /// Verbosity 0..=4.
    #[arg(short, default_value_t = 1)]
    v: u32,

    /// Sub-circuit fan-out bound; 0 turns the limit off.
    #[arg(short, default_value_t = 4)]
    f: usize,

    /// Sub-circuit depth.
    #[arg(short, default_value_t = 2)]
    d: usize,

    /// Disable witness generation for incorrect circuits.
    #[arg(long = "no-counter-examples", alias = "nce")]
    no_counter_examples: bool,

    /// Disable vanishing-constraint discovery.
    #[arg(long = "no-vanishing", alias = "nvc")]
    no_vanishing: bool,

    /// Disable the sub-circuit cache.
    #[arg(long = "no-caching", alias = "nch")]
    no_caching: bool,

    /// Verify guessed candidates by algebraic reduction instead of SAT.
    #[arg(long = "algebraic-reduction", alias = "alg")]
    algebraic_reduction: bool,

    /// Skip the preprocessing phase.
    #[arg(long = "no-preprocessing", alias = "npp")]
    no_preprocessing: bool,

    /// Replace XOR roots by their linear encoding at construction.
    #[arg(long = "do-local-linearization", alias = "dll")]
    do_local_linearization: bool,

    /// Force the FGLM linearization path.
    #[arg(long = "force-fglm", alias = "fglm", conflicts_with = "force_guessing")]
    force_fglm: bool,

    /// Force the guess-and-prove path (implies depth 4).
    #[arg(long = "force-guessing", alias = "gap")]
    force_guessing: bool,

    /// Use the external Groebner tool (msolve) for linearization.
    #[arg(long = "msolve", alias = "m")]
    msolve: bool,

    /// Seed for the sampling rng (0 = from the clock).
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

fn die(err: &EngineError) -> ! {
    eprintln!("*** [talisman] error code {}", err.exit_code());
    eprintln!("*** [talisman] {}", err);
    std::process::exit(err.exit_code());
}

fn banner(cfg: &Config, args: &Args) {
    println!("[talisman] TalisMan Version {}", VERSION);
    println!("[talisman]");
    println!("[talisman] SETTINGS");
    println!("[talisman] seed: {}", cfg.seed);
    println!(
        "[talisman] preprocessing: {}",
        if cfg.do_preprocessing { "enabled" } else { "disabled" }
    );
    println!(
        "[talisman] vanishing constraints: {}",
        if cfg.do_vanishing_constraints {
            "enabled"
        } else if cfg.force_vanishing_off {
            "disabled"
        } else {
            "partially enabled"
        }
    );
    println!(
        "[talisman] local linearization: {}",
        if cfg.do_local_lin { "enabled" } else { "disabled" }
    );
    println!(
        "[talisman] caching: {}",
        if cfg.do_caching { "enabled" } else { "disabled" }
    );
    if cfg.sc_fanout > 0 {
        println!("[talisman] subcircuit fanout: {}", cfg.sc_fanout);
    } else {
        println!("[talisman] fanout limitation: disabled");
    }
    println!("[talisman] subcircuit depth: {}", cfg.sc_depth);
    println!(
        "[talisman] linearization: {}",
        match cfg.lin_method {
            LinMethod::ExternalGb => "Groebner basis using msolve",
            _ => "Matrix-based using normal forms",
        }
    );
    println!(
        "[talisman] reduction: {}",
        if cfg.use_algebra_reduction {
            "Ideal membership"
        } else {
            "SAT"
        }
    );
    match cfg.spec_mode {
        SpecMode::FromFile => println!(
            "[talisman] spec from file {} will be used",
            args.spec_file.as_deref().unwrap_or("<none>")
        ),
        SpecMode::Miter => println!("[talisman] specification: miter"),
        SpecMode::Mult => println!("[talisman] specification: unsigned multiplier"),
        SpecMode::Assert => println!("[talisman] specification: assertion"),
    }
    if cfg.proof_logging {
        println!("[talisman] proof logging: enabled");
    }
    println!("[talisman]");
}

fn run() -> Result<bool, EngineError> {
    let args = Args::parse();

    let level = match args.v {
        0 => log::LevelFilter::Error,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_target(false)
        .init();

    let spec_mode = if args.miter_spec {
        SpecMode::Miter
    } else if args.mult_spec {
        SpecMode::Mult
    } else if args.assert_spec {
        SpecMode::Assert
    } else {
        SpecMode::FromFile
    };
    if spec_mode == SpecMode::FromFile && args.spec_file.is_none() {
        return Err(EngineError::Input(
            "no spec file given and no built-in specification selected".to_string(),
        ));
    }

    let lin_method = if args.msolve {
        LinMethod::ExternalGb
    } else if args.force_fglm {
        LinMethod::ForceFglm
    } else if args.force_guessing {
        LinMethod::ForceGuess
    } else {
        LinMethod::FglmOrGuess
    };

    if args.proofs.is_some() && args.msolve {
        return Err(EngineError::ProofSetup(
            "proof logging is not supported with msolve".to_string(),
        ));
    }
    if args.force_fglm && args.algebraic_reduction {
        return Err(EngineError::Input(
            "algebraic reduction can only be used while guessing".to_string(),
        ));
    }

    let cfg = Config {
        spec_mode,
        lin_method,
        sc_depth: if args.force_guessing { 4 } else { args.d },
        sc_fanout: args.f,
        do_preprocessing: !args.no_preprocessing,
        do_vanishing_constraints: false,
        force_vanishing_off: args.no_vanishing,
        do_caching: !args.no_caching,
        do_local_lin: args.do_local_linearization,
        use_algebra_reduction: args.algebraic_reduction,
        proof_logging: args.proofs.is_some(),
        gen_witness: !args.no_counter_examples,
        verbosity: args.v,
        seed: args.seed,
    };

    banner(&cfg, &args);

    let aig = talisman::aiger::load_aiger_file(&args.input).map_err(EngineError::Parse)?;
    let mut engine = Engine::new(aig, cfg);

    if let Some(paths) = &args.proofs {
        engine.init_proof(&paths[0], &paths[1], &paths[2])?;
    }

    let spec = match engine.cfg.spec_mode {
        SpecMode::Mult => engine.mult_spec_poly(),
        SpecMode::Miter => engine.miter_spec_poly()?,
        SpecMode::Assert => engine.assertion_spec_poly(),
        SpecMode::FromFile => {
            engine.parse_spec_polynomial_file(args.spec_file.as_deref().unwrap())?
        }
    };
    log::debug!(
        "generated spec poly: {}",
        poly_to_string(&engine.alg.pool, &spec)
    );

    let verdict = engine.verify(spec)?;

    println!("[talisman]");
    if verdict.correct {
        println!("[talisman] RESULT: CORRECT MULTIPLIER");
        if let Some(paths) = &args.proofs {
            println!("[talisman] writing gate constraints to '{}'", paths[0]);
            println!("[talisman] writing proof certificate to '{}'", paths[1]);
            println!("[talisman] writing specification to '{}'", paths[2]);
        }
    } else {
        println!("[talisman] RESULT: INCORRECT MULTIPLIER");
        if engine.cfg.gen_witness {
            if let Some(rem) = &verdict.remainder {
                println!(
                    "[talisman] REMAINDER IS {}",
                    poly_to_string(&engine.alg.pool, rem)
                );
            }
        }
    }

    engine.stats.print();
    Ok(verdict.correct)
}

fn main() {
    match run() {
        Ok(_) => std::process::exit(0),
        Err(e) => die(&e),
    }
}
