//! antidote: passive monitor for ARP cache poisoning.

use std::path::PathBuf;
use std::process;

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use antidote::alert::{AlertSink, Dispatcher, Severity};
use antidote::audit::Auditor;
use antidote::capture::CaptureDriver;
use antidote::config::{DEFAULT_OPTS_FILE, Options};
use antidote::error::Error;

#[derive(Parser, Debug)]
#[command(
    name = "antidote",
    about = "Passive monitor for ARP cache poisoning",
    disable_help_flag = true
)]
struct Args {
    /// Select a different configuration file.
    #[arg(short = 'f', value_name = "FILE", default_value = DEFAULT_OPTS_FILE)]
    config_file: PathBuf,

    /// Print this help.
    #[arg(short = 'h', long = "help", action = clap::ArgAction::SetTrue)]
    help: bool,
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            process::exit(Error::InvalidOptions("invalid command line".to_string()).exit_code());
        }
    };
    if args.help {
        let _ = Args::command().print_help();
        process::exit(Error::InvalidOptions("help requested".to_string()).exit_code());
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let opts = match Options::load(&args.config_file) {
        Ok(opts) => opts,
        Err(err @ Error::NoOptsFile(_)) => {
            tracing::debug!(error = %err, config = %args.config_file.display(), "falling back to defaults");
            let mut bootstrap = Dispatcher::new(Options::default());
            bootstrap.alert(
                Severity::Medium,
                "No options file detected - using defaults. This is probably not what you want!",
            );
            Options::default()
        }
        Err(err) => {
            let mut bootstrap = Dispatcher::new(Options::default());
            bootstrap.alert(Severity::Medium, &err.to_string());
            process::exit(err.exit_code());
        }
    };

    let mut dispatcher = Dispatcher::new(opts.clone());
    let mut auditor = Auditor::new();

    // The capture loop is infinite; reaching the alert below means
    // initialization failed or the capture stream died.
    let result = CaptureDriver::open(&opts)
        .and_then(|driver| driver.run(&mut auditor, &opts, &mut dispatcher));
    if let Err(err) = result {
        dispatcher.alert(Severity::Medium, &err.to_string());
        process::exit(err.exit_code());
    }
}
