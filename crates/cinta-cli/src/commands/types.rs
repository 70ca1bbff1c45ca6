//! List the registered soundfile formats.

use clap::Args;

use cinta_core::registry;

/// List the registered soundfile formats.
#[derive(Args)]
pub struct TypesArgs {}

/// Run the types command.
pub fn run(_args: TypesArgs) -> anyhow::Result<()> {
    for t in registry().types() {
        let exts: Vec<String> = t.extensions().iter().map(|e| format!(".{e}")).collect();
        println!("{:<8}{}", t.name(), exts.join(" "));
    }
    println!("flags: {}", registry().type_flags());
    Ok(())
}
