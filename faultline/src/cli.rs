//! CLI surface: one subcommand per built-in fault policy.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use faultline_core::codec::body::AmqpError;
use faultline_core::injector::Injector;
use faultline_core::injectors::{
    DetachAfterDelay, DetachAfterTransfer, MultiTransfer, Passthrough, SlowTransfers,
};

/// Faultline: man-in-the-middle AMQP 1.0 fault-injection proxy.
#[derive(Debug, Parser)]
#[command(name = "faultline", version)]
pub struct Cli {
    /// Hostname of the service being proxied (ex: <ns>.servicebus.windows.net).
    #[arg(long)]
    pub host: String,

    /// Directory for the traffic trace and TLS key-log files.
    #[arg(long, default_value = ".")]
    pub logs: PathBuf,

    /// Write the bound listen address to this file and listen on a random
    /// port instead of 5671.
    #[arg(long)]
    pub address_file: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Mirror all traffic unchanged, recording the trace.
    Passthrough,

    /// Detach each link a fixed delay after the client attaches it.
    DetachAfterDelay {
        /// How long to wait after the ATTACH before injecting the DETACH.
        #[arg(long, default_value_t = 2000)]
        delay_ms: u64,

        /// Error condition carried by the DETACH the client sees.
        #[arg(long, default_value = "amqp:link:detach-forced")]
        condition: String,

        /// Error description carried by the DETACH the client sees.
        #[arg(long, default_value = "faultline: link detached by fault injection")]
        description: String,
    },

    /// Replace the first N outbound transfers with a link detach.
    DetachAfterTransfer {
        /// How many transfers to replace before passing traffic through.
        #[arg(long, default_value_t = 1)]
        times: i64,

        /// Error condition carried by the DETACH the client sees.
        #[arg(long, default_value = "amqp:link:detach-forced")]
        condition: String,

        /// Error description carried by the DETACH the client sees.
        #[arg(long, default_value = "faultline: link detached by fault injection")]
        description: String,
    },

    /// Hold every inbound transfer before delivering it to the client.
    SlowTransfers {
        /// How long to hold each transfer.
        #[arg(long, default_value_t = 10_000)]
        delay_ms: u64,
    },

    /// Split every inbound transfer into single-byte fragments.
    MultiTransfer,
}

impl Command {
    /// Build the injector this subcommand selects.
    pub fn injector(&self) -> Arc<dyn Injector> {
        match self {
            Command::Passthrough => Arc::new(Passthrough),
            Command::DetachAfterDelay {
                delay_ms,
                condition,
                description,
            } => Arc::new(DetachAfterDelay::new(
                Duration::from_millis(*delay_ms),
                Some(AmqpError::new(condition.clone(), description.clone())),
            )),
            Command::DetachAfterTransfer {
                times,
                condition,
                description,
            } => Arc::new(DetachAfterTransfer::new(
                *times,
                AmqpError::new(condition.clone(), description.clone()),
            )),
            Command::SlowTransfers { delay_ms } => {
                Arc::new(SlowTransfers::new(Duration::from_millis(*delay_ms)))
            }
            Command::MultiTransfer => Arc::new(MultiTransfer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_args_parse() {
        let cli = Cli::try_parse_from(["faultline", "--host", "ns.example.net", "passthrough"])
            .unwrap();
        assert_eq!(cli.host, "ns.example.net");
        assert_eq!(cli.logs, PathBuf::from("."));
        assert!(matches!(cli.command, Command::Passthrough));
    }

    #[test]
    fn test_host_is_required() {
        assert!(Cli::try_parse_from(["faultline", "passthrough"]).is_err());
    }

    #[test]
    fn test_detach_after_delay_flags() {
        let cli = Cli::try_parse_from([
            "faultline",
            "--host",
            "h",
            "detach-after-delay",
            "--delay-ms",
            "500",
            "--condition",
            "amqp:internal-error",
        ])
        .unwrap();
        let Command::DetachAfterDelay {
            delay_ms,
            condition,
            ..
        } = &cli.command
        else {
            panic!("wrong subcommand");
        };
        assert_eq!(*delay_ms, 500);
        assert_eq!(condition, "amqp:internal-error");
    }

    #[test]
    fn test_detach_after_transfer_defaults() {
        let cli =
            Cli::try_parse_from(["faultline", "--host", "h", "detach-after-transfer"]).unwrap();
        let Command::DetachAfterTransfer { times, .. } = &cli.command else {
            panic!("wrong subcommand");
        };
        assert_eq!(*times, 1);
    }

    #[test]
    fn test_every_subcommand_builds_an_injector() {
        for args in [
            vec!["faultline", "--host", "h", "passthrough"],
            vec!["faultline", "--host", "h", "detach-after-delay"],
            vec!["faultline", "--host", "h", "detach-after-transfer"],
            vec!["faultline", "--host", "h", "slow-transfers"],
            vec!["faultline", "--host", "h", "multi-transfer"],
        ] {
            let cli = Cli::try_parse_from(args).unwrap();
            let _ = cli.command.injector();
        }
    }
}
