use std::time::Duration;

use clap::{Parser, ValueEnum};
use geofix_logic::{FailureCode, LocationCoordinator};
use geofix_test_shared::*;
use interprocess::local_socket::{
    ListenerOptions,
    tokio::{Stream, prelude::*},
    traits::tokio::Stream as _,
};
use log::{error, info, warn};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader},
    sync::mpsc,
};

type Coordinator = LocationCoordinator<SimulatedProvider>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum BehaviorValue {
    Respond,
    Silent,
    Unavailable,
}

#[derive(Parser)]
/// Hosts a location coordinator backed by a simulated provider
struct Cli {
    /// Name of the local socket to listen on
    socket: String,
    /// Latitude the simulated provider reports
    #[arg(long, default_value_t = 37.0, allow_negative_numbers = true)]
    lat: f64,
    /// Longitude the simulated provider reports
    #[arg(long, default_value_t = -122.0, allow_negative_numbers = true)]
    lon: f64,
    /// Altitude the simulated provider reports, if any
    #[arg(long, allow_negative_numbers = true)]
    altitude: Option<f64>,
    /// Milliseconds between a provider start and its delivery
    #[arg(long, default_value_t = 1000)]
    delay_ms: u64,
    /// How the provider answers
    #[arg(long, value_enum, default_value_t = BehaviorValue::Respond)]
    behavior: BehaviorValue,
    /// Answer every session with this failure instead, overrides --behavior
    #[arg(long, value_enum)]
    fail_with: Option<FailureCodeValue>,
}

impl Cli {
    fn initial_behavior(&self) -> ProviderBehavior {
        match (self.fail_with, self.behavior) {
            (Some(code), _) => ProviderBehavior::Fail(FailureCode::from(code)),
            (None, BehaviorValue::Respond) => ProviderBehavior::Respond,
            (None, BehaviorValue::Silent) => ProviderBehavior::Silent,
            (None, BehaviorValue::Unavailable) => ProviderBehavior::Unavailable,
        }
    }

    fn provider_settings(&self) -> SimulatedSettings {
        SimulatedSettings {
            lat: self.lat,
            long: self.lon,
            altitude: self.altitude,
            delay: Duration::from_millis(self.delay_ms),
            behavior: self.initial_behavior(),
        }
    }
}

/// Handle a request, fetches are answered later through `responses` so they can wait on the
/// coordinator without blocking the connection.
fn process_req(
    coordinator: &Coordinator,
    req: TestingRequest,
    responses: &mpsc::Sender<TestingResponse>,
) -> Option<TestingResponse> {
    match req {
        TestingRequest::Fetch(opts) => {
            let coordinator = coordinator.clone();
            let responses = responses.clone();
            tokio::spawn(async move {
                let res = coordinator.fetch(opts.into()).await;
                responses.send(res.into()).await.ok();
            });
            None
        }
        TestingRequest::SetBehavior(behavior) => {
            info!("Simulated provider now answers with {behavior:?}");
            coordinator.provider().set_behavior(behavior);
            Some(TestingResponse::Complete)
        }
        TestingRequest::Stop => {
            coordinator.stop();
            Some(TestingResponse::Complete)
        }
        TestingRequest::ClearCache => {
            coordinator.clear_cache();
            Some(TestingResponse::Complete)
        }
        TestingRequest::Status => Some(coordinator.status().into()),
    }
}

/// Read request lines on their own task so the connection loop only ever waits on channels,
/// a half read line is never lost to the other `select!` branch.
async fn read_requests(recv: impl AsyncRead + Unpin, lines: mpsc::Sender<String>) -> Result {
    let mut recv = BufReader::new(recv);
    loop {
        let mut line = String::with_capacity(256);
        if recv
            .read_line(&mut line)
            .await
            .context("Failed to read from connection")?
            == 0
        {
            return Ok(());
        }
        if lines.send(line).await.is_err() {
            return Ok(());
        }
    }
}

async fn serve_connection(coordinator: Coordinator, stream: Stream) -> Result {
    let (recv, mut send) = stream.split();
    let (req_tx, mut req_rx) = mpsc::channel::<String>(40);
    let (resp_tx, mut resp_rx) = mpsc::channel::<TestingResponse>(40);

    let reader = tokio::spawn(read_requests(recv, req_tx));

    loop {
        tokio::select! {
            line = req_rx.recv() => {
                let Some(line) = line else {
                    break;
                };
                let resp = match decode_line::<TestingRequest>(&line) {
                    Ok(req) => process_req(&coordinator, req, &resp_tx),
                    Err(why) => Some(why.into()),
                };
                if let Some(resp) = resp {
                    send.write_all(&encode_line(&resp)?).await.context("Failed to send")?;
                }
            }
            Some(resp) = resp_rx.recv() => {
                send.write_all(&encode_line(&resp)?).await.context("Failed to send")?;
            }
        }
    }

    reader.await.context("Request reader panicked")?
}

#[tokio::main(flavor = "current_thread")]
pub async fn main() -> Result {
    colog::init();

    let cli = Cli::parse();
    let socket_name = get_socket_name(cli.socket.clone())?;
    let opts = ListenerOptions::new().name(socket_name);
    let listener = opts.create_tokio().context("Failed to bind to socket")?;

    let provider = SimulatedProvider::new(cli.provider_settings());
    let coordinator = LocationCoordinator::new(provider);

    info!("Testing daemon ready on {}", cli.socket);

    loop {
        let res = tokio::select! {
            res = listener.accept() => res,
            Ok(_) = tokio::signal::ctrl_c() => {
                break;
            }
        };

        match res {
            Ok(stream) => {
                let coordinator = coordinator.clone();
                tokio::spawn(async move {
                    if let Err(why) = serve_connection(coordinator, stream).await {
                        warn!("Connection closed: {why:?}");
                    }
                });
            }
            Err(why) => error!("Error from connection: {why:?}"),
        }
    }

    if coordinator.stop() {
        info!("Stopped in-flight location session");
    }

    Ok(())
}
