//! Writes the OpenAPI document of the HTTP API.
//!
//! Usage:
//!   cargo run --bin generate_openapi > openapi.json
//!   cargo run --bin generate_openapi -- --output openapi.json

use std::{
    env, fs,
    io::{self, Write},
    path::PathBuf,
    process::ExitCode,
};

use greenhouse_service::api::handlers::ApiDoc;
use utoipa::OpenApi;

fn main() -> ExitCode {
    let json = match ApiDoc::openapi().to_pretty_json() {
        Ok(json) => json,
        Err(e) => {
            eprintln!("Failed to serialise OpenAPI document: {e}");
            return ExitCode::FAILURE;
        }
    };

    let args: Vec<String> = env::args().collect();
    let output_path: Option<PathBuf> = args
        .windows(2)
        .find(|w| w[0] == "--output")
        .map(|w| PathBuf::from(&w[1]));

    let written = match &output_path {
        Some(path) => fs::write(path, &json),
        None => io::stdout().write_all(json.as_bytes()),
    };

    match (written, output_path) {
        (Err(e), _) => {
            eprintln!("Failed to write OpenAPI document: {e}");
            ExitCode::FAILURE
        }
        (Ok(()), Some(path)) => {
            eprintln!("OpenAPI document written to {}", path.display());
            ExitCode::SUCCESS
        }
        (Ok(()), None) => ExitCode::SUCCESS,
    }
}
