use batch_mailer::{
    cli::{self, Cli},
    configuration::get_configuration,
    telemetry::{get_subscriber, init_subscriber},
};
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the progress report, so logs go to stderr.
    let subscriber = get_subscriber("batch-mailer".into(), "info".into(), std::io::stderr);
    init_subscriber(subscriber);

    let cli = Cli::parse();
    let configuration = get_configuration()?;

    cli::run(cli, configuration).await
}
