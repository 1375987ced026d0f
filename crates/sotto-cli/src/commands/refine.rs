use std::io::Read;
use std::path::PathBuf;

use sotto_core::refine::{
    DEFAULT_OLLAMA_MODEL, DEFAULT_OLLAMA_URL, OllamaRefiner, RefinementMode, Refiner,
};
use sotto_core::Result;

pub fn run(
    input: Option<PathBuf>,
    mode: String,
    instructions: Option<String>,
    model: Option<String>,
    server_url: Option<String>,
) -> Result<()> {
    let mode: RefinementMode = mode.parse()?;

    let text = match input {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    let refiner = OllamaRefiner::new(
        server_url.unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
        model.unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.to_string()),
    );
    let prompt = instructions.unwrap_or_else(|| mode.prompt().to_string());
    let refined = refiner.refine(text.trim(), Some(&prompt))?;

    println!("{}", refined);
    Ok(())
}
