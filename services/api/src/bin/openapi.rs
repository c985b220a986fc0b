//! services/api/src/bin/openapi.rs
//!
//! Writes the TuteSkillz OpenAPI document. Usage: `openapi [OUTPUT]`, defaulting to
//! `openapi.json` in the current directory.

use api_lib::web::rest::ApiDoc;
use utoipa::OpenApi;

const DEFAULT_OUTPUT: &str = "openapi.json";

fn write_document(path: &str) -> Result<usize, Box<dyn std::error::Error>> {
    let doc = ApiDoc::openapi();
    std::fs::write(path, doc.to_pretty_json()?)?;
    for route in doc.paths.paths.keys() {
        println!("  {route}");
    }
    Ok(doc.paths.paths.len())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_OUTPUT.to_string());
    let documented = write_document(&path)?;
    println!("{documented} routes documented in {path}");
    Ok(())
}
