use std::{process::ExitCode, sync::Arc};

use colored::Colorize;
use domain_upload::model::vo::UploadEvent;
use infrastructure_backend::LocalMultipartBackend;
use service_upload::{reader_stream, UploadSession, FILE_READ_CHUNK_SIZE};
use tracing::info;

use crate::{
    config::{build_config, source_arg, UploaderConfig},
    telemetry::initialize_telemetry,
};

pub fn run() -> ExitCode {
    match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime.block_on(async_run()),
        Err(e) => {
            eprintln!("{}: {}", "Cannot build runtime".red(), e);
            ExitCode::FAILURE
        }
    }
}

pub async fn async_run() -> ExitCode {
    let config: UploaderConfig = match build_config().and_then(|x| Ok(x.try_deserialize()?)) {
        Ok(x) => x,
        Err(e) => {
            eprintln!("{}: {}", "Cannot build config".red(), e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = initialize_telemetry(&config.telemetry) {
        eprintln!("{}: {}", "Cannot build logger".red(), e);
        return ExitCode::FAILURE;
    }

    let backend = Arc::new(
        LocalMultipartBackend::builder()
            .root(config.backend.root.as_str())
            .progress_step(config.backend.progress_step)
            .build(),
    );
    let options = match source_arg(std::env::args().skip(1)) {
        Some(file) => config.upload.options(Some(file), None),
        None => {
            info!("Reading upload source from stdin.");
            let stdin = reader_stream(tokio::io::stdin(), FILE_READ_CHUNK_SIZE);
            config.upload.options(None, Some(stdin))
        }
    };
    let mut session = match UploadSession::new(options, backend) {
        Ok(x) => x,
        Err(e) => {
            eprintln!("{}: {}", "Invalid upload options".red(), e);
            return ExitCode::FAILURE;
        }
    };
    let printer = tokio::spawn(print_events(session.subscribe()));
    let controller = session.controller();

    let result = {
        let upload = session.run();
        tokio::pin!(upload);
        tokio::select! {
            result = &mut upload => result,
            _ = tokio::signal::ctrl_c() => {
                info!("Aborting upload (ctrl-c handling).");
                controller.abort();
                upload.await
            }
        }
    };
    // The event channel closes with the session.
    let _ = printer.await;

    match result {
        Ok(completed) => {
            println!(
                "{} {} bytes in {} parts, upload id: {}",
                "Uploaded".green().bold(),
                completed.total_written,
                completed.parts.len(),
                completed.upload_id
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {}", "Upload failed".red(), e);
            ExitCode::FAILURE
        }
    }
}

async fn print_events(events: flume::Receiver<UploadEvent>) {
    while let Ok(event) = events.recv_async().await {
        match event {
            UploadEvent::UploadIdAcquired { upload_id } => {
                println!("{} {}", "Upload id:".cyan(), upload_id)
            }
            UploadEvent::PartRetried { part_number, retry } => {
                println!("{} part {} (retry {})", "Retrying".yellow(), part_number, retry)
            }
            UploadEvent::Progress(progress) => println!(
                "{} part {} ({} bytes), {}/{} bytes {:.1}%",
                "Uploaded".green(),
                progress.part,
                progress.part_size,
                progress.total_written,
                progress.total_size,
                progress.total_percent
            ),
            UploadEvent::TotalSizeExceeded {
                total_size,
                max_total_size,
            } => println!(
                "{} {} bytes over the limit of {} bytes",
                "Too large:".red(),
                total_size,
                max_total_size
            ),
            UploadEvent::Completing { upload_id } => {
                println!("{} {}", "Completing".cyan(), upload_id)
            }
            UploadEvent::Aborting { .. } => println!("{}", "Aborting".yellow()),
            UploadEvent::Aborted { .. } => println!("{}", "Aborted".red()),
            UploadEvent::Error { message } => println!("{} {}", "Error:".red(), message),
            event => tracing::trace!("{event:?}"),
        }
    }
}
