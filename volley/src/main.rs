mod cli;
mod exit_codes;
mod logging;
mod run;
mod run_error;

use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = match cli::Cli::try_parse() {
        Ok(v) => v,
        Err(err) => {
            use clap::error::ErrorKind;
            let _ = err.print();
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                    exit_codes::ExitCode::Success.as_i32()
                }
                _ => exit_codes::ExitCode::InvalidInput.as_i32(),
            };
            std::process::exit(code);
        }
    };

    if let Err(err) = logging::init(cli.log_level.as_deref()) {
        eprintln!("{err:#}");
        std::process::exit(exit_codes::ExitCode::InvalidInput.as_i32());
    }

    let code = match cli.command {
        cli::Command::Run(args) => match run::run(args).await {
            Ok(()) => exit_codes::ExitCode::Success.as_i32(),
            Err(err) => {
                eprintln!("{err}");
                err.exit_code().as_i32()
            }
        },
    };

    std::process::exit(code);
}
