use std::process;

use anyhow::{Context, Result};
use log::{debug, error};

use plughost::cli::{self, args, report::Palette};
use plughost::logging;

fn main() {
    if let Err(e) = run() {
        error!("Application error: {:#}", e);
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = args::parse_args();
    args::validate_args(&args)?;

    let config_manager = args::load_configuration(&args)?;
    logging::init_logger(args::configure_logging(&args, &config_manager)?)?;

    let host = config_manager.get_plugin_host_config().context("Invalid [plugins] configuration")?;
    debug!("Plugin host configuration: {:?}", host);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create async runtime")?;

    let palette = Palette::new(args.no_color);
    let output = runtime.block_on(cli::execute(&args.command, &host, &palette))?;
    print!("{}", output);
    Ok(())
}
