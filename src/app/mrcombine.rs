use anyhow::{bail, Result};
use clap::Parser;
use mrcombine::report::Report;
use mrcombine::standalone::{engine::Dataset, source, Args, Job};
use mrcombine::strategy::run_all;
use mrcombine::workload::{Tokenizer, Workload};
use mrcombine::{workload, Document};
use tracing::{debug, info_span, trace};
use uuid::Uuid;

fn init_tracing(verbose: u8) {
    let log_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(verbose >= 2)
        .with_thread_ids(verbose >= 2)
        .with_writer(std::io::stderr)
        .init();
    debug!("mrcombine started with verbosity level: {}", verbose);
    trace!("Full CLI args: {:?}", std::env::args().collect::<Vec<_>>());
}

fn run_combine_job<T: Tokenizer>(
    job: &Job,
    run_id: Uuid,
    tokenizer: &T,
    docs: &Dataset<Document>,
) -> Result<Report> {
    let random = job.random_source();
    let config = job.pipeline_config(random);
    let outcomes = run_all(&job.strategies, docs, tokenizer, &config)?;
    Ok(Report::new(run_id, &job.workload, random.seed(), &outcomes, job.top))
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);
    // parameters are checked before any input is read
    let job = Job::from_args(&args)?;
    let engine = workload::named(&job.workload, &job.filter)?;

    let run_id = Uuid::new_v4();
    let span = info_span!("run", %run_id, workload = engine.name());
    let _guard = span.enter();

    let docs = source::load(&job.input, job.layout, job.partitions.get() as usize)?;
    let report = match &engine {
        Workload::WordCount(wc) => run_combine_job(&job, run_id, wc, &docs)?,
        Workload::ProductCustomer(customers) => run_combine_job(&job, run_id, customers, &docs)?,
    };
    if !report.consistent {
        bail!("strategies produced different mappings for run {}", run_id);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{report}");
    }
    Ok(())
}
