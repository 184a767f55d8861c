use std::io::{self, Write};

use clap::Parser;
use serde::Deserialize;

use gustdb_common::DEFAULT_URL;

#[derive(Parser, Debug)]
#[command(name = "gustdb-cli", about = "GustDB CLI client")]
struct Args {
    /// Endereço HTTP do servidor
    #[arg(long, default_value = DEFAULT_URL)]
    url: String,

    /// Comando para executar diretamente (modo não interativo)
    #[arg(trailing_var_arg = true)]
    command: Vec<String>,
}

/// Resposta do servidor: `{}`, `{"value": ...}` ou `{"error": ...}`.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
struct Response {
    value: Option<String>,
    error: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let client = reqwest::Client::new();

    // Modo comando único (via argumentos)
    if !args.command.is_empty() {
        let line = args.command.join(" ");
        let response = execute_request(&client, &args.url, &line).await?;
        println!("{}", format_response(&response));
        return Ok(());
    }

    println!("Conectado a {}", args.url);

    let stdin = io::stdin();
    let mut input = String::new();

    loop {
        print!("gustdb> ");
        io::stdout().flush()?;

        input.clear();
        if stdin.read_line(&mut input)? == 0 {
            break; // EOF
        }

        let line = input.trim();
        if line.is_empty() {
            continue;
        }

        if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
            break;
        }

        match execute_request(&client, &args.url, line).await {
            Ok(response) => println!("{}", format_response(&response)),
            Err(e) => println!("(error) {e}"),
        }
    }

    Ok(())
}

async fn execute_request(
    client: &reqwest::Client,
    url: &str,
    command: &str,
) -> anyhow::Result<Response> {
    let response = client
        .post(url)
        .json(&serde_json::json!({ "command": command }))
        .send()
        .await?;

    let status = response.status();
    let body = response.text().await?;
    if body.trim().is_empty() {
        if status.is_success() {
            return Ok(Response::default());
        }
        anyhow::bail!("servidor respondeu {status}");
    }
    Ok(serde_json::from_str(&body)?)
}

/// Formata uma resposta para exibição humana.
fn format_response(response: &Response) -> String {
    match (&response.value, &response.error) {
        (_, Some(error)) => format!("(error) {error}"),
        (Some(value), None) => format!("\"{value}\""),
        (None, None) => "OK".to_string(),
    }
}
