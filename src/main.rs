use doc2vec_trainer::Pipeline;
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

// expects a single argument, the path to a json config, e.g.
// ... args.json
fn main() -> ExitCode {

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("doc2vec_trainer=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("entering program...");
    let args: Vec<String> = env::args().collect();

    let stop = Arc::new(AtomicBool::new(false));
    watch_interrupt(Arc::clone(&stop));

    match Pipeline::run(&args, Some(&stop)) {
        Ok(Some(report)) => {
            info!("{} of {} documents ranked themselves first", report.distribution.count_at(0), report.distribution.total());
            ExitCode::SUCCESS
        },
        Ok(None) => {
            info!("stopped before validation, continue with resume_from pointing at the checkpoint");
            ExitCode::SUCCESS
        },
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

// ctrl+c raises `stop`, training then halts once the running epoch is done
fn watch_interrupt(stop: Arc<AtomicBool>) {
    thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!("could not listen for ctrl+c: {}", e);
                return
            }
        };
        runtime.block_on(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("received ctrl+c, stopping after the current epoch");
                    stop.store(true, Ordering::Relaxed);
                },
                Err(e) => warn!("could not listen for ctrl+c: {}", e),
            }
        });
    });
}
