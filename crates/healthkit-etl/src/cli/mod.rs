pub mod commands;

/// How command results are printed to stdout
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

/// Print `value` as pretty JSON
pub fn print_json<T: serde::Serialize>(value: &T) -> crate::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
