// Copyright 2019 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::ffi::{OsStr, OsString};
use std::str::FromStr;
use std::time::Duration;

use clap::{App, Arg, ArgMatches, SubCommand};
use futures::future::FutureExt;
use futures::{pin_mut, select};
use log::{error, info};
use tokio::runtime;

use vermilion_runtime::launcher::{DEFAULT_ADDRESS, DEFAULT_SETTLE_DELAY};
use vermilion_runtime::{
    AckPolicy, Error, LaunchConfig, Launcher, RetryPolicy, ServiceCatalog, SupervisorHost,
    TcpDialer,
};

const LAUNCH: &str = "launch";
const CATALOG: &str = "catalog";

const ADDRESS: &str = "address";
const MAX_ATTEMPTS: &str = "max-attempts";
const BACKOFF_MS: &str = "backoff-ms";
const SETTLE_MS: &str = "settle-ms";
const STRICT_ACK: &str = "strict-ack";
const SKIP_DEPENDENTS: &str = "skip-dependents";
const SUPERVISOR: &str = "supervisor";
const SUPERVISOR_ARGS: &str = "supervisor-args";

trait SetupClapApp {
    fn setup_clap_app(self) -> Self;
}

impl<'a, 'b> SetupClapApp for App<'a, 'b> {
    fn setup_clap_app(self) -> Self {
        self.version(env!("CARGO_PKG_VERSION"))
            .author(env!("CARGO_PKG_AUTHORS"))
    }
}

fn number_validator(i: &OsStr) -> Result<(), OsString> {
    u64::from_str(&i.to_string_lossy())
        .map(|_| ())
        .map_err(|_| OsString::from("number was expected"))
}

fn launch_sub_command() -> App<'static, 'static> {
    SubCommand::with_name(LAUNCH)
        .about("Connect to the supervisor and start all services, tier by tier")
        .arg(
            Arg::with_name(ADDRESS)
                .short("a")
                .long(ADDRESS)
                .value_name("HOST:PORT")
                .env("VERMILION_SUPERVISOR_ADDR")
                .default_value(DEFAULT_ADDRESS)
                .help("address of the supervisor runtime")
                .takes_value(true),
        )
        .arg(
            Arg::with_name(MAX_ATTEMPTS)
                .long(MAX_ATTEMPTS)
                .value_name("NUMBER")
                .validator_os(number_validator)
                .help("connection attempts before giving up [default: 10]")
                .takes_value(true),
        )
        .arg(
            Arg::with_name(BACKOFF_MS)
                .long(BACKOFF_MS)
                .value_name("MILLIS")
                .validator_os(number_validator)
                .help("pause between connection attempts [default: 1000]")
                .takes_value(true),
        )
        .arg(
            Arg::with_name(SETTLE_MS)
                .long(SETTLE_MS)
                .value_name("MILLIS")
                .validator_os(number_validator)
                .help("pause before starting the dependents tier [default: 2000]")
                .takes_value(true),
        )
        .arg(
            Arg::with_name(STRICT_ACK)
                .long(STRICT_ACK)
                .help("treat a non-zero acknowledgement from the supervisor as a failure"),
        )
        .arg(
            Arg::with_name(SKIP_DEPENDENTS)
                .long(SKIP_DEPENDENTS)
                .help("do not start the dependents tier"),
        )
        .arg(
            Arg::with_name(SUPERVISOR)
                .long(SUPERVISOR)
                .value_name("PROGRAM")
                .help("start the supervisor runtime as a child process and wait on it")
                .takes_value(true),
        )
        .arg(
            Arg::with_name(SUPERVISOR_ARGS)
                .value_name("ARGS")
                .requires(SUPERVISOR)
                .help("arguments for the supervisor program, after --")
                .multiple(true)
                .last(true),
        )
}

fn catalog_sub_command() -> App<'static, 'static> {
    SubCommand::with_name(CATALOG).about("print the services in start order")
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = App::new(env!("CARGO_PKG_NAME"))
        .setup_clap_app()
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .subcommand(launch_sub_command().setup_clap_app())
        .subcommand(catalog_sub_command().setup_clap_app())
        .get_matches();

    let result = match args.subcommand() {
        (LAUNCH, Some(args)) => launch(args),
        (CATALOG, Some(_)) => {
            print_catalog(&ServiceCatalog::default());
            Ok(())
        }
        ("", None) => {
            println!("command required");
            println!("{}", args.usage());
            std::process::exit(1);
        }
        (arg, _) => {
            println!("unexpected argument: {}", arg);
            println!("{}", args.usage());
            std::process::exit(2);
        }
    };

    if let Err(err) = result {
        error!("{}", err);
        std::process::exit(1);
    }
}

fn parse_number<T: FromStr>(args: &ArgMatches<'_>, name: &str) -> Result<Option<T>, Error> {
    args.value_of(name)
        .map(|value| {
            T::from_str(value).map_err(|_| Error::from(format!("{} is not a valid number: {}", name, value)))
        })
        .transpose()
}

fn launch_config(args: &ArgMatches<'_>) -> Result<LaunchConfig, Error> {
    let defaults = RetryPolicy::default();
    let retry = RetryPolicy::new(
        parse_number(args, MAX_ATTEMPTS)?.unwrap_or_else(|| defaults.max_attempts()),
        parse_number(args, BACKOFF_MS)?
            .map(Duration::from_millis)
            .unwrap_or_else(|| defaults.backoff()),
    )?;

    let settle_delay = parse_number(args, SETTLE_MS)?
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_SETTLE_DELAY);

    let ack = if args.is_present(STRICT_ACK) {
        AckPolicy::RequireZero
    } else {
        AckPolicy::Accept
    };

    Ok(LaunchConfig {
        address: args.value_of(ADDRESS).unwrap_or(DEFAULT_ADDRESS).to_string(),
        retry,
        settle_delay,
        ack,
    })
}

fn launch(args: &ArgMatches<'_>) -> Result<(), Error> {
    let config = launch_config(args)?;

    let mut catalog = ServiceCatalog::default();
    if args.is_present(SKIP_DEPENDENTS) {
        catalog = catalog.without_dependents();
    }

    let supervisor: Option<(String, Vec<String>)> = args.value_of(SUPERVISOR).map(|program| {
        let program_args = args
            .values_of(SUPERVISOR_ARGS)
            .map(|values| values.map(str::to_string).collect())
            .unwrap_or_default();
        (program.to_string(), program_args)
    });

    let mut runtime = runtime::Builder::new()
        .basic_scheduler()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let host = match supervisor {
            Some((program, program_args)) => Some(SupervisorHost::spawn(program, program_args)?),
            None => None,
        };

        run(Launcher::new(catalog, config), host).await
    })
}

/// The launcher runs on its own task so it never holds up the supervisor
async fn run(mut launcher: Launcher, host: Option<SupervisorHost>) -> Result<(), Error> {
    let dialer = TcpDialer::new(launcher.config().ack);
    let launch = tokio::spawn(async move { launcher.run(dialer).await });

    let host = match host {
        Some(host) => host,
        None => {
            return launch
                .await
                .map_err(|err| Error::from(format!("launcher task failed: {}", err)))?
        }
    };

    let launch = launch.fuse();
    let supervisor = host.wait().fuse();
    pin_mut!(launch, supervisor);

    // ensure the supervisor keeps running while the services are launched
    select! {
        result = launch => {
            result.map_err(|err| Error::from(format!("launcher task failed: {}", err)))??;
            info!("all services launched");
        }
        status = supervisor => {
            return Err(Error::from(format!("supervisor unexpectedly exited: {:?}", status)));
        }
    };

    let status = supervisor.await?;
    Err(Error::from(format!("supervisor exited: {}", status)))
}

fn print_catalog(catalog: &ServiceCatalog) {
    for tier in catalog.iter() {
        println!("{}:", tier.kind());
        for service in tier.services() {
            println!("  {}", service);
        }
    }
}
