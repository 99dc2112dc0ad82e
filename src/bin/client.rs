use std::env;
use std::process::ExitCode;

use tokio_util::sync::CancellationToken;
use tonic::Status;

use greeter::client::{CallOptions, GreeterClientBuilder};
use greeter::config::ClientConfig;
use greeter::constants::TIMESTAMP_KEY;
use greeter::details::{error_details, ErrorDetail};
use greeter::metadata;
use greeter::Error;

const EXIT_RPC_FAILURE: u8 = 1;

const EXIT_FATAL: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Some(name) = env::args().nth(1) else {
        log::error!("usage: client <name>");
        return ExitCode::from(EXIT_FATAL);
    };

    let cfg = match ClientConfig::load() {
        Ok(cfg) => cfg,
        Err(err) => {
            log::error!("{}", err);
            return ExitCode::from(EXIT_FATAL);
        }
    };

    let client = match GreeterClientBuilder::from_config(&cfg).and_then(|b| b.build()) {
        Ok(client) => client,
        Err(err) => {
            log::error!("did not connect: {}", err);
            return ExitCode::from(EXIT_FATAL);
        }
    };

    let mut opts = CallOptions::new().with_metadata(metadata::timestamp());
    if let Some(deadline) = cfg.deadline() {
        opts = opts.with_deadline(deadline);
    }

    // Demonstration timer: cancels the call after a fixed delay.
    let timer = cfg.cancel_after().map(|after| {
        let token = CancellationToken::new();
        opts.cancel = Some(token.clone());
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            token.cancel();
        })
    });

    let code = match client.say_hello(name, opts).await {
        Ok(outcome) => {
            if let Some(ts) = metadata::get_str(&outcome.metadata, TIMESTAMP_KEY) {
                log::debug!("echoed {}: {}", TIMESTAMP_KEY, ts);
            }
            log::info!("Greeting: {}", outcome.reply.message);
            ExitCode::SUCCESS
        }
        Err(Error::Status(status)) => {
            report(&status);
            ExitCode::from(EXIT_RPC_FAILURE)
        }
        Err(err) => {
            log::error!("could not greet: {}", err);
            ExitCode::from(EXIT_FATAL)
        }
    };

    if let Some(timer) = timer {
        timer.abort();
    }
    client.close();
    code
}

fn report(status: &Status) {
    log::error!("gRPC Error (message: {})", status.message());
    for detail in error_details(status) {
        match detail {
            ErrorDetail::RetryInfo(info) => match info.delay() {
                Some(delay) => log::info!(" RetryInfo: retry_delay={:?}", delay),
                None => log::info!(" RetryInfo: no delay"),
            },
            ErrorDetail::Other(any) => log::debug!(" detail: {}", any.type_url),
        }
    }
}
