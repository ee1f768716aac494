use clap::{Parser, Subcommand};
use modport::server::{self, ServerConfig};
use modport::{AgentClient, ClientConfig, QueryMethod, StreamCallbacks};
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "modport", about = "Agent client for the modernization console backend")]
struct Cli {
    /// Backend base URL.
    #[arg(long, global = true, env = "MODPORT_BASE_URL")]
    base_url: Option<String>,

    /// Bearer token, with or without the `Bearer ` prefix.
    #[arg(long, global = true, env = "MODPORT_TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Stream a natural-language query.
    Query {
        text: String,
        /// Extra context as a JSON object.
        #[arg(long)]
        context: Option<String>,
        /// Send the query as GET parameters instead of a JSON POST body.
        #[arg(long)]
        get: bool,
    },
    /// Upload a file together with a query and stream the answer.
    Upload {
        path: PathBuf,
        text: String,
        /// Send as multipart form data instead of a base64 JSON body.
        #[arg(long)]
        multipart: bool,
    },
    /// List the backend tool catalog.
    Tools,
    /// Execute one named tool.
    Exec {
        name: String,
        /// Tool parameters as a JSON object.
        #[arg(long, default_value = "{}")]
        params: String,
    },
    /// Check backend liveness.
    Health,
    /// Run the development stub backend.
    Serve {
        #[arg(long, default_value = "127.0.0.1:8600")]
        listen: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = ClientConfig::resolve(cli.base_url, cli.token);

    match cli.command {
        Command::Query { text, context, get } => {
            let context = match context {
                Some(raw) => Some(serde_json::from_str(&raw)?),
                None => None,
            };
            let method = if get { QueryMethod::Get } else { QueryMethod::Post };
            let client = AgentClient::new(config);
            client
                .query_stream(&text, context, method, &mut print_callbacks())
                .await?;
        }
        Command::Upload {
            path,
            text,
            multipart,
        } => {
            let client = AgentClient::new(config);
            client
                .upload_path_with_query(&path, &text, multipart, &mut print_callbacks())
                .await?;
        }
        Command::Tools => {
            let client = AgentClient::new(config);
            let tools = client.get_tools().await?;
            println!("{}", serde_json::to_string_pretty(&tools)?);
        }
        Command::Exec { name, params } => {
            let params = serde_json::from_str(&params)?;
            let client = AgentClient::new(config);
            let result = client.execute_tool(&name, params).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Health => {
            let client = AgentClient::new(config);
            let health = client.health_check().await?;
            println!("{}", serde_json::to_string_pretty(&health)?);
        }
        Command::Serve { listen } => {
            // Persist the token so client invocations on this machine pick
            // it up without flags.
            if let Err(err) = modport::config::write_token_file(&config.token) {
                eprintln!("warning: could not persist token file: {err}");
            }
            server::run(ServerConfig {
                listen,
                token: config.token,
            })
            .await?;
        }
    }

    Ok(())
}

fn print_callbacks() -> StreamCallbacks {
    StreamCallbacks::new()
        .on_status(|phase, message| eprintln!("[{phase}] {message}"))
        .on_chunk(|content| {
            print!("{content}");
            let _ = std::io::stdout().flush();
        })
        .on_done(|success, message| {
            println!();
            if !success {
                eprintln!("done with failure: {}", message.unwrap_or("no message"));
            }
        })
        .on_error(|message| eprintln!("error: {message}"))
}
