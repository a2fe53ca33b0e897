use anyhow::Result;
use console::style;

use crate::detect::Format;
use crate::samples::{binary_hint, sample};

pub fn run(format: Format) -> Result<()> {
    match sample(format) {
        Some(text) => print!("{}", text),
        None => {
            println!("{}", style(format!("No text sample for {}", format)).bold());
            println!("{}", binary_hint(format));
        }
    }
    Ok(())
}
