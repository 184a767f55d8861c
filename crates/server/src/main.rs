use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

use gustdb_common::{DEFAULT_HOST, DEFAULT_PORT};
use gustdb_server::router;
use gustdb_storage::Db;

#[derive(Parser, Debug)]
#[command(name = "gustdb-server", about = "GustDB — in-memory key-value and queue store")]
struct Args {
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Desativa a purga de chaves expiradas em background (expiração só na leitura)
    #[arg(long)]
    no_sweep: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gustdb_server=info".into()),
        )
        .init();

    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);

    let db = Db::with_sweeper(!args.no_sweep);
    let app = router(db.clone());

    let listener = TcpListener::bind(&addr).await?;
    info!("GustDB escutando em http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("servidor encerrado com {} chaves em memória", db.len());
    Ok(())
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal recebido"),
        Err(e) => {
            // Sem o handler de sinal o servidor segue até ser morto
            error!("falha ao escutar ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    }
}
