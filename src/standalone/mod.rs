use crate::bucket::{FanOut, RandomSource};
use crate::strategy::{PipelineConfig, Strategy};
use crate::utils::parse_digits;
use crate::workload::customers::CustomerFilter;
use crate::{AggError, Result};
use clap::Parser;
use std::num::NonZeroU32;
use std::path::PathBuf;

pub mod engine;
pub mod source;

use source::Layout;

/// A `--strategy` value: one pipeline, or `all` of them.
#[derive(Copy, Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum StrategyChoice {
    /// Every pipeline, in order
    All,
    /// Reduce every occurrence by key
    Direct,
    /// Combine per random bucket tag, then reduce
    Bucketed,
    /// Group by a random bucket function, then reduce
    Grouped,
    /// Combine per partition, then reduce
    Partition,
}

impl StrategyChoice {
    fn strategies(self) -> &'static [Strategy] {
        match self {
            StrategyChoice::All => &Strategy::ALL,
            StrategyChoice::Direct => &[Strategy::Direct],
            StrategyChoice::Bucketed => &[Strategy::Bucketed],
            StrategyChoice::Grouped => &[Strategy::Grouped],
            StrategyChoice::Partition => &[Strategy::Partition],
        }
    }
}

/// Expand `--strategy` values in order, dropping repeats. No values means all.
pub fn expand_strategies(choices: &[StrategyChoice]) -> Vec<Strategy> {
    if choices.is_empty() {
        return Strategy::ALL.to_vec();
    }
    let mut strategies = Vec::new();
    for strategy in choices.iter().flat_map(|c| c.strategies()) {
        if !strategies.contains(strategy) {
            strategies.push(*strategy);
        }
    }
    strategies
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None, allow_negative_numbers = true)]
pub struct Args {
    /// Number of partitions, random buckets and reducers
    #[arg(value_name = "K")]
    pub k: String,

    /// Number of top keys to print
    #[arg(value_name = "H")]
    pub h: String,

    /// Country to keep in the customers workload, or `all`
    #[arg(value_name = "S")]
    pub s: String,

    /// Input file, or a directory of input files
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Name of the workload
    #[arg(short, long, default_value = "wc")]
    pub workload: String,

    /// Pipelines to run (repeatable). Runs all four when omitted.
    #[arg(long = "strategy", value_enum)]
    pub strategies: Vec<StrategyChoice>,

    /// Random buckets per pipeline; -1 disables tagging. Defaults to K.
    #[arg(long)]
    pub fan_out: Option<i64>,

    /// Seed for bucket assignment. Drawn from the OS when omitted.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Whether a document is a line or a whole file
    #[arg(long, value_enum, default_value_t = Layout::Lines)]
    pub layout: Layout,

    /// Smallest quantity a customers record needs to count
    #[arg(long, default_value_t = 1)]
    pub min_quantity: i64,

    /// Malformed records one partition may skip before the run fails
    #[arg(long)]
    pub max_malformed: Option<usize>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Increase logging verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// A validated aggregation job.
#[derive(Debug, Clone)]
pub struct Job {
    /// `K`: partitions, buckets and reducers.
    pub partitions: NonZeroU32,
    /// `H`: how many top keys to report.
    pub top: usize,
    pub filter: CustomerFilter,
    pub input: PathBuf,
    pub workload: String,
    pub strategies: Vec<Strategy>,
    pub fan_out: FanOut,
    pub layout: Layout,
    pub seed: Option<u64>,
    pub max_malformed: Option<usize>,
}

impl Job {
    /// Validate the four positional parameters `K H S INPUT`.
    ///
    /// Fails before any input is read if `K` or `H` is not a non-negative
    /// integer, if `K` is zero, or if `INPUT` does not exist.
    pub fn new(k: &str, h: &str, s: &str, input: impl Into<PathBuf>) -> Result<Self> {
        let k = parse_digits("K", k)?;
        let partitions = u32::try_from(k)
            .ok()
            .and_then(NonZeroU32::new)
            .ok_or_else(|| AggError::invalid("K", format!("must be between 1 and {}, got {k}", u32::MAX)))?;
        let top = parse_digits("H", h)?;
        let top = usize::try_from(top).map_err(|e| AggError::invalid("H", e.to_string()))?;
        let input = input.into();
        if !input.exists() {
            return Err(AggError::invalid(
                "INPUT",
                format!("{} does not exist", input.display()),
            ));
        }
        Ok(Self {
            partitions,
            top,
            filter: CustomerFilter::new(s),
            input,
            workload: "wc".to_string(),
            strategies: Strategy::ALL.to_vec(),
            fan_out: FanOut::Buckets(partitions),
            layout: Layout::default(),
            seed: None,
            max_malformed: None,
        })
    }

    pub fn from_args(args: &Args) -> Result<Self> {
        let mut job = Self::new(&args.k, &args.h, &args.s, &args.input)?;
        job.filter = job.filter.with_min_quantity(args.min_quantity);
        job.workload = args.workload.clone();
        job.strategies = expand_strategies(&args.strategies);
        if let Some(fan_out) = args.fan_out {
            job.fan_out = FanOut::from_raw(fan_out)?;
        }
        job.layout = args.layout;
        job.seed = args.seed;
        job.max_malformed = args.max_malformed;
        Ok(job)
    }

    pub fn random_source(&self) -> RandomSource {
        self.seed
            .map(RandomSource::seeded)
            .unwrap_or_else(RandomSource::from_entropy)
    }

    pub fn pipeline_config(&self, random: RandomSource) -> PipelineConfig {
        PipelineConfig::new(self.partitions, random)
            .with_fan_out(self.fan_out)
            .with_max_malformed(self.max_malformed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_parameters_are_validated_up_front() {
        let here = env!("CARGO_MANIFEST_DIR");
        let job = Job::new("4", "10", "US", here).unwrap();
        assert_eq!(job.partitions.get(), 4);
        assert_eq!(job.top, 10);
        assert_eq!(job.filter, CustomerFilter::new("US"));
        assert_eq!(job.strategies, Strategy::ALL.to_vec());

        for (k, h) in [("x", "1"), ("-1", "1"), ("0", "1"), ("2", "-3"), ("2", "1.5")] {
            assert!(
                matches!(Job::new(k, h, "all", here), Err(AggError::InvalidParameter { .. })),
                "K={k} H={h} should be rejected"
            );
        }
        assert!(matches!(
            Job::new("2", "0", "all", "/no/such/input"),
            Err(AggError::InvalidParameter { name: "INPUT", .. })
        ));
    }

    #[test]
    fn options_override_job_defaults() {
        let here = env!("CARGO_MANIFEST_DIR");
        let args = Args::try_parse_from([
            "mrcombine",
            "3",
            "0",
            "France",
            here,
            "--workload",
            "customers",
            "--strategy",
            "partition",
            "--strategy",
            "direct",
            "--seed",
            "5",
            "--layout",
            "files",
            "--min-quantity",
            "-2",
            "--max-malformed",
            "7",
        ])
        .unwrap();
        let job = Job::from_args(&args).unwrap();
        assert_eq!(job.workload, "customers");
        assert_eq!(job.strategies, vec![Strategy::Partition, Strategy::Direct]);
        assert_eq!(job.layout, Layout::Files);
        assert_eq!(job.filter.min_quantity, -2);
        assert_eq!(job.random_source(), RandomSource::seeded(5));
        assert_eq!(job.pipeline_config(job.random_source()).max_malformed, Some(7));
        assert_eq!(job.fan_out, FanOut::Buckets(NonZeroU32::new(3).unwrap()));
    }

    #[test]
    fn strategy_all_expands_to_every_pipeline() {
        fn parse(extra: &[&str]) -> Job {
            let mut argv = vec!["mrcombine", "2", "0", "all", env!("CARGO_MANIFEST_DIR")];
            argv.extend_from_slice(extra);
            Job::from_args(&Args::try_parse_from(argv).unwrap()).unwrap()
        }
        assert_eq!(parse(&["--strategy", "all"]).strategies, Strategy::ALL.to_vec());
        assert_eq!(parse(&[]).strategies, Strategy::ALL.to_vec());
        assert_eq!(
            parse(&["--strategy", "grouped", "--strategy", "all"]).strategies,
            vec![
                Strategy::Grouped,
                Strategy::Direct,
                Strategy::Bucketed,
                Strategy::Partition
            ]
        );
        let here = env!("CARGO_MANIFEST_DIR");
        assert!(Args::try_parse_from(["mrcombine", "2", "0", "all", here, "--strategy", "some"]).is_err());
    }

    #[test]
    fn fan_out_can_be_disabled() {
        let here = env!("CARGO_MANIFEST_DIR");
        let args = Args::try_parse_from(["mrcombine", "4", "0", "all", here, "--fan-out", "-1"]).unwrap();
        let job = Job::from_args(&args).unwrap();
        assert_eq!(job.fan_out, FanOut::Disabled);
        let config = job.pipeline_config(RandomSource::seeded(1));
        assert_eq!(config.fan_out, FanOut::Disabled);
        assert_eq!(config.reducers, 4);

        let args = Args::try_parse_from(["mrcombine", "4", "0", "all", here, "--fan-out", "0"]).unwrap();
        assert!(matches!(Job::from_args(&args), Err(AggError::InvalidParameter { .. })));
    }

    #[test]
    fn negative_k_reaches_validation() {
        let here = env!("CARGO_MANIFEST_DIR");
        let args = Args::try_parse_from(["mrcombine", "-1", "0", "all", here]).unwrap();
        assert!(matches!(
            Job::from_args(&args),
            Err(AggError::InvalidParameter { name: "K", .. })
        ));
    }
}
