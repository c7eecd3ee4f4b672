use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    gogrepo_hub::run(gogrepo_hub::cli::Cli::parse()).await
}
