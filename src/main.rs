use std::path::PathBuf;

use anyhow::{anyhow, Context as _};
use apicheck::schemas::load_schema_file;
use apicheck::sessions::{self, Identity};
use apicheck::telemetry::{init_logging, LoggingConfig};
use apicheck::{ApiError, ApiResponse, RequestOptions, Settings};
use clap::{Parser, Subcommand};
use reqwest::Method;

#[derive(Parser)]
#[command(name = "apicheck")]
#[command(about = "Validating HTTP API test client", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sends one request and validates the response
    Request {
        /// HTTP method (GET, POST, ...)
        method: String,

        /// Path relative to BASE_URL and ENDPOINT_PREFIX
        path: String,

        /// admin, user or anonymous
        #[arg(short, long, default_value = "anonymous")]
        identity: Identity,

        /// Extra header as `name: value` (repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Query parameter as `name=value` (repeatable)
        #[arg(short, long)]
        query: Vec<String>,

        /// JSON request body
        #[arg(long)]
        json: Option<String>,

        /// JSON Schema file the body must match
        #[arg(long)]
        schema: Option<PathBuf>,

        /// Expected status code
        #[arg(short, long)]
        expect: Option<u16>,

        /// Skip the status assertion
        #[arg(long)]
        no_assert_status: bool,

        /// Skip content-type and schema validation
        #[arg(long)]
        no_validate: bool,

        /// Skip the response-time assertion
        #[arg(long)]
        no_assert_time: bool,

        /// Stream the body into this file instead of printing it
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Lists the status codes that have a default error schema
    Schemas,
}

#[tokio::main]
async fn main() {
    if let Err(e) = init_logging(LoggingConfig::from_env()) {
        eprintln!("❌ Failed to initialize logging: {e}");
    }

    let cli = Cli::parse();
    let outcome = match cli.command {
        Commands::Request {
            method,
            path,
            identity,
            headers,
            query,
            json,
            schema,
            expect,
            no_assert_status,
            no_validate,
            no_assert_time,
            output,
        } => {
            let options = build_options(
                &headers,
                &query,
                json,
                schema,
                expect,
                no_assert_status,
                no_validate,
                no_assert_time,
            );
            match options {
                Ok(options) => run_request(&method, &path, identity, options, output).await,
                Err(e) => Err(e),
            }
        }
        Commands::Schemas => list_schemas(),
    };

    if let Err(e) = outcome {
        match e.downcast_ref::<ApiError>() {
            Some(api) => eprintln!("❌ {}", api.user_message()),
            None => eprintln!("❌ {e:#}"),
        }
        std::process::exit(1);
    }
}

#[allow(clippy::too_many_arguments)]
fn build_options(
    headers: &[String],
    query: &[String],
    json: Option<String>,
    schema: Option<PathBuf>,
    expect: Option<u16>,
    no_assert_status: bool,
    no_validate: bool,
    no_assert_time: bool,
) -> anyhow::Result<RequestOptions> {
    let mut options = RequestOptions::new();

    for raw in headers {
        let (name, value) = raw
            .split_once(':')
            .ok_or_else(|| anyhow!("Header must look like 'name: value', got '{raw}'"))?;
        options = options.header(name.trim(), value.trim());
    }
    for raw in query {
        let (name, value) = raw
            .split_once('=')
            .ok_or_else(|| anyhow!("Query parameter must look like 'name=value', got '{raw}'"))?;
        options = options.query(name, value);
    }
    if let Some(body) = json {
        options = options.json(serde_json::from_str(&body).context("--json is not valid JSON")?);
    }
    if let Some(path) = schema {
        options = options.schema(load_schema_file(path)?);
    }
    if let Some(status) = expect {
        options = options.expect_status(status);
    }
    if no_assert_status {
        options = options.assert_status(false);
    }
    if no_validate {
        options = options.validate(false);
    }
    if no_assert_time {
        options = options.assert_time(false);
    }
    Ok(options)
}

async fn run_request(
    method: &str,
    path: &str,
    identity: Identity,
    options: RequestOptions,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let method: Method = method
        .to_ascii_uppercase()
        .parse()
        .map_err(|_| anyhow!("Unknown HTTP method '{method}'"))?;
    let settings = Settings::from_env()?;
    let client = sessions::open_async(&settings, identity).await?;

    let response = match &output {
        Some(save_to) => client.download_file(path, save_to, options).await?,
        None => client.request(method, path, options).await?,
    };
    print_response(&response, output.is_some());
    client.close();
    Ok(())
}

fn print_response(response: &ApiResponse, downloaded: bool) {
    println!(
        "✅ {} {} -> {} ({:.3}s)",
        response.method(),
        response.final_url(),
        response.status(),
        response.elapsed().as_secs_f64()
    );
    for hop in response.history() {
        println!("   ↪ via {hop}");
    }
    if downloaded {
        return;
    }
    let body = match response.json::<serde_json::Value>() {
        Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| response.text().into_owned()),
        Err(_) => response.text().into_owned(),
    };
    if !body.is_empty() {
        println!("{body}");
    }
}

fn list_schemas() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;
    let config = settings.client_config()?;
    println!("📋 Default error schemas:");
    for status in config.schemas.statuses() {
        println!("   {status}");
    }
    Ok(())
}
