use bshell::config::Options;
use bshell::shell;
use log::LevelFilter;
use std::env;
use std::process;

fn init_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn main() {
    // Parse command-line arguments.
    let args: Vec<String> = env::args().skip(1).collect();
    let options = Options::from_args(&args);

    init_logging(options.verbose);

    // Run the main shell loop with the options.
    let code = shell::run_shell(&options);
    process::exit(code);
}
