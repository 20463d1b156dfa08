use schemahost_registry::{RegistryConfig, SchemaRegistry};

use crate::cmd::CheckArgs;
use crate::exit::{schema_error, CliResult, SUCCESS};
use crate::output::{print_schema_names, OutputFormat};

pub fn run(args: CheckArgs, format: OutputFormat) -> CliResult<i32> {
    let config = RegistryConfig {
        strict_mode: args.strict,
        ..RegistryConfig::default()
    };
    let directory = args.dir.display().to_string();
    let registry = SchemaRegistry::from_directory_with_config(&args.dir, config)
        .map_err(|err| schema_error(&format!("failed loading {directory}"), err))?;

    print_schema_names(&directory, &registry.names(), format);
    Ok(SUCCESS)
}
