//! lamblayer CLI entrypoint.
//!
//! This binary publishes a new Lambda layer version from a local directory or
//! a remotely built dependency bundle, and prints the new version's ARN.

use clap::Parser;
use lamblayer::archive::Archiver;
use lamblayer::cli::{Cli, Command, CreateArgs};
use lamblayer::create::{CreateRequest, LayerCreator, plan};
use lamblayer::error::{LamblayerError, Result};
use lamblayer::fetch::{HttpBuildService, PackageFetcher};
use lamblayer::logging;
use lamblayer::output::{DryRunInfo, success_message};
use lamblayer::poll::ThreadSleeper;
use lamblayer::publish::LambdaPublisher;
use lamblayer::session::CloudSession;
use log::info;
use std::io::Write;

fn main() {
    let cli = Cli::parse();
    let mut stderr = std::io::stderr();
    if let Err(err) = logging::init(cli.log_level) {
        write_stderr_line(&mut stderr, format!("failed to initialise logging: {err}"));
    }

    let mut stdout = std::io::stdout();
    let run_result = run(&cli, &mut stdout);
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn run(cli: &Cli, stdout: &mut dyn Write) -> Result<()> {
    match &cli.command {
        Command::Create(args) => run_create(cli, args, stdout),
    }
}

fn run_create(cli: &Cli, args: &CreateArgs, stdout: &mut dyn Write) -> Result<()> {
    // Option conflicts are reported before anything touches disk or network
    let request = create_request(args)?;

    if args.dry_run {
        return run_dry(cli, args, &request, stdout);
    }

    let session = CloudSession::connect(&cli.session_options())?;
    let publisher = LambdaPublisher::new(&session);
    let service = HttpBuildService;
    let sleeper = ThreadSleeper;
    let fetcher = PackageFetcher::new(
        &service,
        &sleeper,
        args.build_service_url.clone(),
        args.poll_policy(),
    );
    let archiver = Archiver::in_temp_dir();

    let published = LayerCreator::new(&archiver, &fetcher, &publisher).create(&request)?;
    info!("{}", success_message(&published));
    write_line(stdout, &published.layer_version_arn)
}

/// Shows the resolved plan without building or publishing.
fn run_dry(
    cli: &Cli,
    args: &CreateArgs,
    request: &CreateRequest,
    stdout: &mut dyn Write,
) -> Result<()> {
    let plan = plan(request, &args.build_service_url)?;
    let info = DryRunInfo {
        layer_config: &request.layer_config,
        region: cli.region.as_deref(),
        plan: &plan,
    };
    write_line(stdout, info.display_text())
}

fn create_request(args: &CreateArgs) -> Result<CreateRequest> {
    Ok(CreateRequest {
        layer_config: args.layer_config.clone(),
        source: args.content_source()?,
    })
}

fn write_line(out: &mut dyn Write, message: impl std::fmt::Display) -> Result<()> {
    writeln!(out, "{message}").map_err(|source| LamblayerError::WriteFailed { source })
}

fn exit_code_for_run_result(result: Result<()>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            write_stderr_line(stderr, err);
            1
        }
    }
}

fn write_stderr_line(stderr: &mut dyn Write, message: impl std::fmt::Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort logging; ignore write failures.
    }
}
