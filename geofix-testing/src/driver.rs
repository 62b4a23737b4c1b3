use clap::{Parser, Subcommand};
use geofix_logic::{FailureCode, PositionOptions, RequestConfig};
use geofix_test_shared::*;
use interprocess::local_socket::{tokio::Stream, traits::tokio::Stream as _};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[derive(Parser)]
struct Cli {
    /// Name of the local socket the test daemon is listening on
    socket: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum BehaviorCommand {
    /// Deliver a fix after the daemon's delay
    Respond,
    /// Deliver the given failure after the daemon's delay
    Fail {
        #[arg(value_enum)]
        code: FailureCodeValue,
    },
    /// Never deliver anything
    Silent,
    /// Refuse to start
    Unavailable,
}

impl From<BehaviorCommand> for ProviderBehavior {
    fn from(value: BehaviorCommand) -> Self {
        match value {
            BehaviorCommand::Respond => ProviderBehavior::Respond,
            BehaviorCommand::Fail { code } => ProviderBehavior::Fail(FailureCode::from(code)),
            BehaviorCommand::Silent => ProviderBehavior::Silent,
            BehaviorCommand::Unavailable => ProviderBehavior::Unavailable,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Get the current position
    Fetch {
        /// Accept a cached fix up to this many milliseconds old
        #[arg(long, default_value_t = RequestConfig::DEFAULT_MAXIMUM_AGE.as_millis() as u64)]
        maximum_age: u64,
        /// Give up on a fresh fix after this many milliseconds
        #[arg(long, default_value_t = RequestConfig::DEFAULT_TIMEOUT.as_millis() as u64)]
        timeout: u64,
        /// Don't ask for high accuracy
        #[arg(long)]
        low_accuracy: bool,
    },
    /// Change how the simulated provider answers
    #[command(subcommand)]
    Behave(BehaviorCommand),
    /// Tear down the running session, if any
    Stop,
    /// Forget the cached fix and failure
    ClearCache,
    /// Print the coordinator's state
    Status,
}

impl From<Commands> for TestingRequest {
    fn from(value: Commands) -> Self {
        match value {
            Commands::Fetch {
                maximum_age,
                timeout,
                low_accuracy,
            } => PositionOptions {
                maximum_age,
                timeout,
                enable_high_accuracy: !low_accuracy,
            }
            .into(),
            Commands::Behave(behavior) => ProviderBehavior::from(behavior).into(),
            Commands::Stop => TestingRequest::Stop,
            Commands::ClearCache => TestingRequest::ClearCache,
            Commands::Status => TestingRequest::Status,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result {
    let cli = Cli::parse();

    let socket_name = get_socket_name(cli.socket.clone()).context("Failed to get socket name")?;

    let stream = Stream::connect(socket_name)
        .await
        .context("Failed to connect to socket")?;

    let req = TestingRequest::from(cli.command);
    let mut send = &stream;
    send.write_all(&encode_line(&req)?)
        .await
        .context("Failed to send request")?;

    let mut recv = BufReader::new(&stream);
    let mut line = String::with_capacity(256);
    if recv
        .read_line(&mut line)
        .await
        .context("Failed to read response")?
        == 0
    {
        bail!("Daemon closed the connection without answering");
    }

    let resp: TestingResponse = decode_line(&line)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&resp).context("Failed to format response")?
    );

    if let TestingResponse::Error(why) = resp {
        bail!("Daemon reported an error: {why}");
    }

    Ok(())
}
