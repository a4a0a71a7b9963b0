use std::sync::Arc;

use anvil::config::Config;
use anvil::handlers::{basic, cpu, io, jobs as job_api};
use anvil::jobs::HandlerExecutor;
use anvil::server::Server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = Config::load();
    let server = Server::new(config.clone());

    register_routes(&server, &config);
    install_executor(&server, &config);

    server.start().await?;

    wait_for_signal().await;
    tracing::info!("Shutdown signal received");

    server.shutdown(config.shutdown_timeout).await?;
    Ok(())
}

fn register_routes(server: &Server, config: &Config) {
    let files_dir = config.files_dir.clone();
    let stats = server.stats_handle();
    let manager = server.job_manager();

    server.register("GET", "/", Arc::new(basic::hello));
    server.register("GET", "/ping", Arc::new(basic::ping));
    server.register("GET", "/echo", Arc::new(basic::echo));
    server.register("POST", "/echo", Arc::new(basic::echo));
    server.register("GET", "/time", Arc::new(basic::time));
    server.register("GET", "/help", Arc::new(basic::help));
    server.register("GET", "/favicon.ico", Arc::new(basic::favicon));
    server.register("GET", "/status", basic::status_handler(stats.clone()));
    server.register(
        "GET",
        "/metrics",
        basic::metrics_handler(stats, Arc::clone(&manager)),
    );

    server.register("GET", "/fibonacci", Arc::new(basic::fibonacci));
    server.register("GET", "/reverse", Arc::new(basic::reverse));
    server.register("GET", "/toupper", Arc::new(basic::toupper));
    server.register("GET", "/random", Arc::new(basic::random));
    server.register("GET", "/hash", Arc::new(basic::hash));
    server.register("GET", "/sleep", Arc::new(basic::sleep));
    server.register(
        "GET",
        "/createfile",
        basic::createfile_handler(files_dir.clone()),
    );
    server.register(
        "GET",
        "/deletefile",
        basic::deletefile_handler(files_dir.clone()),
    );

    server.register("GET", "/isprime", Arc::new(cpu::isprime));
    server.register("GET", "/factor", Arc::new(cpu::factor));
    server.register("GET", "/pi", Arc::new(cpu::pi));
    server.register(
        "GET",
        "/mandelbrot",
        cpu::mandelbrot_handler(files_dir.clone()),
    );
    server.register("GET", "/matrixmul", Arc::new(cpu::matrixmul));

    server.register("GET", "/sortfile", io::sortfile_handler(files_dir.clone()));
    server.register(
        "GET",
        "/wordcount",
        io::wordcount_handler(files_dir.clone()),
    );
    server.register("GET", "/grep", io::grep_handler(files_dir.clone()));
    server.register("GET", "/compress", io::compress_handler(files_dir.clone()));
    server.register("GET", "/hashfile", io::hashfile_handler(files_dir));

    server.register("POST", "/jobs/submit", job_api::submit_handler(manager.clone()));
    server.register("GET", "/jobs/status", job_api::status_handler(manager.clone()));
    server.register("GET", "/jobs/result", job_api::result_handler(manager.clone()));
    server.register("POST", "/jobs/cancel", job_api::cancel_handler(manager));
}

/// Wires the job manager to the same handlers the router serves, so a
/// submitted task behaves exactly like its synchronous endpoint.
fn install_executor(server: &Server, config: &Config) {
    let files_dir = config.files_dir.clone();
    let mut executor = HandlerExecutor::new();

    executor.register("fibonacci", Arc::new(basic::fibonacci));
    executor.register("isprime", Arc::new(cpu::isprime));
    executor.register("factor", Arc::new(cpu::factor));
    executor.register("pi", Arc::new(cpu::pi));
    executor.register("mandelbrot", cpu::mandelbrot_handler(files_dir.clone()));
    executor.register("matrixmul", Arc::new(cpu::matrixmul));

    executor.register("sortfile", io::sortfile_handler(files_dir.clone()));
    executor.register("wordcount", io::wordcount_handler(files_dir.clone()));
    executor.register("grep", io::grep_handler(files_dir.clone()));
    executor.register("compress", io::compress_handler(files_dir.clone()));
    executor.register("hashfile", io::hashfile_handler(files_dir));

    server.job_manager().set_executor(executor.into_shared());
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sig) => sig,
        Err(err) => {
            tracing::warn!(error = %err, "Failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
