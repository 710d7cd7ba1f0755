use clap::Parser;
use fedquery::cli::{run, run_with_config, CliArgs, Command};
use fedquery::config::Config;

fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    // No config exists before init
    if let Command::Init { .. } = args.command {
        fedquery::logging::init("info");
        return run(&args, &mut out);
    }

    let config = Config::load(&args.config)?;
    fedquery::logging::init(&config.log_level);
    run_with_config(&config, &args.command, &mut out)
}
