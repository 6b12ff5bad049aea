use argh::FromArgs;
use std::{path::PathBuf, time::Duration};

mod messages;

use messages::DetectionStatus;

// defaults for the client
const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 3000;
const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(FromArgs)]
/// Client for a running bag brand detector
struct ClientArgs {
    /// the host to connect to
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to connect to
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,

    /// command to execute: "detect" or "results"
    #[argh(subcommand)]
    command: ClientCommands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum ClientCommands {
    Detect(DetectCommand),
    Results(ResultsCommand),
}

#[derive(FromArgs)]
/// Upload a bag photo for detection
#[argh(subcommand, name = "detect")]
struct DetectCommand {
    /// the path to the image
    #[argh(option, short = 'i')]
    image_path: PathBuf,

    /// keep polling until the detection finishes
    #[argh(switch, short = 'w')]
    wait: bool,
}

#[derive(FromArgs)]
/// Check the detection result
#[argh(subcommand, name = "results")]
struct ResultsCommand {}

fn print_status(status: &DetectionStatus) {
    match status {
        DetectionStatus::Scheduled { id } => println!("Scheduled detection #{id}"),
        DetectionStatus::Idle => println!("Status: idle"),
        DetectionStatus::Processing => println!("Status: processing"),
        DetectionStatus::Success {
            brand, duration_ms, ..
        } => println!("Brand: {brand} ({duration_ms} ms)"),
        DetectionStatus::Error { message, .. } => println!("Error: {message}"),
    }
}

async fn fetch_status(
    request: reqwest::RequestBuilder,
) -> Result<DetectionStatus, Box<dyn std::error::Error>> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;

    // Anything that is not one of our replies (a proxy page, a 413) is shown as is.
    Ok(serde_json::from_str(&body)
        .unwrap_or_else(|_| DetectionStatus::error(format!("{status}: {body}"))))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: ClientArgs = argh::from_env();

    let client = reqwest::Client::new();

    // format the host and port
    let addr = format!("{}:{}", args.host, args.port);

    match args.command {
        ClientCommands::Detect(detect_command) => {
            let bytes = tokio::fs::read(&detect_command.image_path).await?;
            let file_name = detect_command
                .image_path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or_default()
                .to_string();

            let form = reqwest::multipart::Form::new().part(
                "image",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            );

            let status =
                fetch_status(client.post(format!("http://{}/detect", addr)).multipart(form))
                    .await?;
            print_status(&status);

            if !detect_command.wait || !matches!(status, DetectionStatus::Scheduled { .. }) {
                return Ok(());
            }

            loop {
                tokio::time::sleep(POLL_INTERVAL).await;
                let status = fetch_status(client.get(format!("http://{}/results", addr))).await?;
                if !matches!(status, DetectionStatus::Processing) {
                    print_status(&status);
                    break;
                }
            }
        }
        ClientCommands::Results(_) => {
            let status = fetch_status(client.get(format!("http://{}/results", addr))).await?;
            print_status(&status);
        }
    }

    Ok(())
}
