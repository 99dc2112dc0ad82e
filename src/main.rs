use std::error::Error;
use std::process::ExitCode;

use greeter::config::ServerConfig;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("failed to serve: {}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    let cfg = ServerConfig::load()?;
    log::debug!("{:?}", cfg);

    greeter::server::run(&cfg, async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            log::error!("failed to listen for ctrl-c: {}", err);
            std::future::pending::<()>().await;
        }
        log::info!("shutting down");
    })
    .await?;

    Ok(())
}
