use crate::demo::{run_demo, DemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use exam_registration::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Exam Registration",
    about = "Serve or demonstrate the exam registration wizard from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Walk a scripted candidate through every wizard step and print the progress
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Demo(args) => run_demo(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_serving() {
        let cli = Cli::try_parse_from(["exam-registration"]).expect("parses");
        assert!(cli.command.is_none());
    }

    #[test]
    fn parses_demo_options() {
        let cli = Cli::try_parse_from([
            "exam-registration",
            "demo",
            "--category",
            "general",
            "--phone",
            "9123456780",
        ])
        .expect("parses");
        match cli.command {
            Some(Command::Demo(args)) => {
                assert_eq!(args.category, "general");
                assert_eq!(args.phone, "9123456780");
            }
            other => panic!("expected demo command, got {other:?}"),
        }
    }
}
