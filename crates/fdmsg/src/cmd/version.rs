use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::OutputFormat;

pub fn run(_args: VersionArgs, format: OutputFormat) -> CliResult<i32> {
    let name = env!("CARGO_PKG_NAME");
    let version = env!("CARGO_PKG_VERSION");
    match format {
        OutputFormat::Json => {
            println!("{{\"name\":\"{name}\",\"version\":\"{version}\"}}");
        }
        OutputFormat::Table | OutputFormat::Raw => {
            println!("{name} {version}");
        }
    }
    Ok(SUCCESS)
}
