use log::error;
use mmw_migrate::cli::Cli;

fn main() {
    // Logging is configured through config.toml or MMW_LOGGING__LEVEL:
    // error → warn → info → debug → trace
    if let Err(err) = Cli::handle_command_line() {
        error!("{:?}", err);
        eprintln!("{}", err);
        std::process::exit(1);
    }
}
