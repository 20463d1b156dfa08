use schemahost_server::{SchemaServer, ServerConfig};

use crate::cmd::{runtime, ServeArgs};
use crate::exit::{server_error, CliError, CliResult, NOT_FOUND, SUCCESS};

pub fn run(args: ServeArgs) -> CliResult<i32> {
    if !args.dir.is_dir() {
        return Err(CliError::new(
            NOT_FOUND,
            format!("schema directory not found: {}", args.dir.display()),
        ));
    }

    let server = SchemaServer::new(ServerConfig {
        bind_addr: args.addr,
        schema_dir: args.dir,
        public_url: args.public_url,
    });

    let rt = runtime()?;
    rt.block_on(server.serve(shutdown_signal()))
        .map_err(|err| server_error("serve failed", err))?;

    Ok(SUCCESS)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for ctrl-c; serving until killed");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
