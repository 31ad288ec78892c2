use std::time::Duration;

use clap::{Args, Parser};

/// Upper bound on each participant count; every participant gets its own thread.
const MAX_PER_ROLE: i64 = 65_536;

/// Hammers fresh flags with racing setters, pollers and waiters and reports any broken guarantee.
#[derive(Parser, Debug)]
#[command(name = "flag-torture")]
pub struct Cli {
    /// The 8-byte seed to use for the random number generator.
    ///
    /// If not provided, a random seed will be generated.
    pub seed: Option<u64>,

    /// The maximum number of failed iterations before stopping.
    ///
    /// If not provided, the run stops after the first failure.
    #[arg(short, long, default_value_t = 1)]
    pub failure_limit: usize,

    #[clap(flatten)]
    pub workload_params: WorkloadParams,
}

#[derive(Clone, Debug, Args)]
pub struct WorkloadParams {
    /// The number of flags exercised, one per iteration.
    #[clap(default_value = "100")]
    #[arg(long = "iterations", short = 'i')]
    pub iterations: usize,

    /// The number of threads racing to set each flag.
    #[clap(default_value = "64")]
    #[clap(value_parser=clap::value_parser!(u32).range(1..=MAX_PER_ROLE))]
    #[arg(long = "setters", short = 's')]
    pub setters: u32,

    /// The number of threads polling each flag until they see it set.
    #[clap(default_value = "16")]
    #[clap(value_parser=clap::value_parser!(u32).range(0..=MAX_PER_ROLE))]
    #[arg(long = "pollers", short = 'p')]
    pub pollers: u32,

    /// The number of threads blocked on the done handle of each flag.
    ///
    /// Half of them obtain their handle before the race starts, the other half during it.
    #[clap(default_value = "32")]
    #[clap(value_parser=clap::value_parser!(u32).range(0..=MAX_PER_ROLE))]
    #[arg(long = "waiters", short = 'w')]
    pub waiters: u32,

    /// How long a poller or waiter may go without observing the flag before it is reported as a
    /// missed notification.
    #[clap(default_value = "5s")]
    #[arg(long = "wait-timeout", value_parser = humantime::parse_duration)]
    pub wait_timeout: Duration,
}

impl WorkloadParams {
    pub fn participants(&self) -> usize {
        self.setters as usize + self.pollers as usize + self.waiters as usize
    }
}

#[cfg(test)]
mod tests {
    use super::{Cli, WorkloadParams, MAX_PER_ROLE};
    use clap::{CommandFactory, Parser};
    use std::time::Duration;

    #[test]
    fn cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["flag-torture"]).unwrap();
        assert_eq!(cli.seed, None);
        assert_eq!(cli.failure_limit, 1);
        assert_eq!(cli.workload_params.iterations, 100);
        assert_eq!(cli.workload_params.participants(), 64 + 16 + 32);
        assert_eq!(cli.workload_params.wait_timeout, Duration::from_secs(5));
    }

    #[test]
    fn overrides() {
        let cli = Cli::try_parse_from([
            "flag-torture",
            "42",
            "-f",
            "3",
            "-i",
            "7",
            "--setters",
            "1000",
            "-p",
            "0",
            "-w",
            "8",
            "--wait-timeout",
            "250ms",
        ])
        .unwrap();
        assert_eq!(cli.seed, Some(42));
        assert_eq!(cli.failure_limit, 3);
        assert_eq!(cli.workload_params.iterations, 7);
        assert_eq!(cli.workload_params.setters, 1000);
        assert_eq!(cli.workload_params.pollers, 0);
        assert_eq!(cli.workload_params.waiters, 8);
        assert_eq!(
            cli.workload_params.wait_timeout,
            Duration::from_millis(250)
        );
    }

    #[test]
    fn largest_counts_do_not_overflow() {
        let max = MAX_PER_ROLE.to_string();
        let max = max.as_str();
        let cli = Cli::try_parse_from(["flag-torture", "-s", max, "-p", max, "-w", max]).unwrap();
        assert_eq!(
            cli.workload_params.participants(),
            3 * MAX_PER_ROLE as usize
        );
    }

    #[test]
    fn participants_sum_in_usize() {
        let params = WorkloadParams {
            iterations: 1,
            setters: u32::MAX,
            pollers: 1,
            waiters: 0,
            wait_timeout: Duration::from_secs(1),
        };
        assert_eq!(params.participants(), u32::MAX as usize + 1);
    }

    #[test]
    fn rejects_counts_above_limit() {
        let over = (MAX_PER_ROLE + 1).to_string();
        for flag in ["-s", "-p", "-w"] {
            assert!(Cli::try_parse_from(["flag-torture", flag, over.as_str()]).is_err());
        }
        assert!(Cli::try_parse_from(["flag-torture", "-s", "4294967295", "-p", "1"]).is_err());
    }

    #[test]
    fn rejects_zero_setters() {
        assert!(Cli::try_parse_from(["flag-torture", "--setters", "0"]).is_err());
    }
}
