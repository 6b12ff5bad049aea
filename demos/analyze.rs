use argh::FromArgs;
use bagbrand::{
    ClientConfig, DEFAULT_ENDPOINT, DEFAULT_SECRETS_PATH, GroqClient, ImagePayload,
    resolve_api_key,
};
use std::{path::PathBuf, time::Duration};

#[derive(FromArgs)]
/// Guess the brand of the bag in a local photo with a single API call.
struct AnalyzeArgs {
    /// the path to the image (jpg, jpeg or png)
    #[argh(option, short = 'i')]
    image_path: PathBuf,

    /// secrets file read when GROQ_API_KEY is not set in the environment
    #[argh(option, short = 's', default = "PathBuf::from(DEFAULT_SECRETS_PATH)")]
    secrets: PathBuf,

    /// the chat-completion endpoint to send the image to
    #[argh(option, default = "DEFAULT_ENDPOINT.to_string()")]
    endpoint: String,

    /// request timeout in seconds, the HTTP client default when unset
    #[argh(option)]
    timeout: Option<u64>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: AnalyzeArgs = argh::from_env();

    let file_name = args
        .image_path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default()
        .to_string();
    let payload = ImagePayload::from_upload(file_name, std::fs::read(&args.image_path)?)?;

    let mut config = ClientConfig::default().with_endpoint(args.endpoint);
    if let Some(secs) = args.timeout {
        config = config.with_timeout(Duration::from_secs(secs));
    }
    let secrets = args.secrets;
    let client = match GroqClient::from_credentials(|| resolve_api_key(&secrets), config) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    match client.analyze_image(&payload.bytes) {
        Ok(brand) => println!("Brand: {brand}"),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }

    Ok(())
}
