use copilot_gateway::{init_tracing, serve, Error, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = ServerConfig::from_env_and_dotenv()?;
    init_tracing(&config.log_level)?;
    serve(config).await
}
