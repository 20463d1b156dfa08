use std::io::Read;

use schemahost_registry::{RegistryConfig, SchemaError, SchemaRegistry};
use serde_json::Value;

use crate::cmd::{parse_duration, runtime, ValidateArgs};
use crate::exit::{io_error, schema_error, CliError, CliResult, DATA_INVALID, SUCCESS, USAGE};
use crate::output::{print_accepted, print_rejected, OutputFormat};

pub fn run(args: ValidateArgs, format: OutputFormat) -> CliResult<i32> {
    let config = registry_config(&args)?;
    let registry = build_registry(&args, config)?;
    let data = resolve_data(&args)?;

    match registry.validate(&args.name, data) {
        Ok(validated) => {
            print_accepted(&args.name, &validated, format);
            Ok(SUCCESS)
        }
        Err(SchemaError::ValidationFailed { name, violations }) => {
            tracing::debug!(schema = %name, count = violations.len(), "data rejected");
            print_rejected(&name, &violations, format);
            Ok(DATA_INVALID)
        }
        Err(err) => Err(schema_error("validate failed", err)),
    }
}

fn registry_config(args: &ValidateArgs) -> CliResult<RegistryConfig> {
    let fetch_timeout = args
        .fetch_timeout
        .as_deref()
        .map(parse_duration)
        .transpose()?;

    Ok(RegistryConfig {
        coerce_types: !args.no_coerce,
        use_defaults: !args.no_defaults,
        strict_mode: args.strict,
        fetch_timeout,
        ..RegistryConfig::default()
    })
}

fn build_registry(args: &ValidateArgs, config: RegistryConfig) -> CliResult<SchemaRegistry> {
    let mut registry = match &args.schema_dir {
        Some(dir) => SchemaRegistry::from_directory_with_config(dir, config).map_err(|err| {
            schema_error(&format!("failed loading {}", dir.display()), err)
        })?,
        None => SchemaRegistry::with_config(config),
    };

    for source in &args.schemas {
        let text = std::fs::read_to_string(&source.value)
            .map_err(|err| io_error(&format!("failed reading {}", source.value), err))?;
        registry
            .add_json(source.name.clone(), &text)
            .map_err(|err| schema_error(&format!("failed adding {}", source.name), err))?;
    }

    if !args.urls.is_empty() {
        let rt = runtime()?;
        for source in &args.urls {
            rt.block_on(registry.add_from_url(source.name.clone(), &source.value))
                .map_err(|err| schema_error(&format!("failed adding {}", source.name), err))?;
        }
    }

    if !registry.has_schema(&args.name) {
        return Err(schema_error(
            "validate failed",
            SchemaError::NotFound(args.name.clone()),
        ));
    }

    Ok(registry)
}

fn resolve_data(args: &ValidateArgs) -> CliResult<Value> {
    let text = if let Some(json) = &args.json {
        json.clone()
    } else if let Some(path) = &args.file {
        std::fs::read_to_string(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?
    } else {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .map_err(|err| io_error("failed reading stdin", err))?;
        buffer
    };

    serde_json::from_str(&text)
        .map_err(|err| CliError::new(USAGE, format!("data is not valid JSON: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::NamedSource;

    fn args(name: &str) -> ValidateArgs {
        ValidateArgs {
            name: name.to_string(),
            schema_dir: None,
            schemas: Vec::new(),
            urls: Vec::new(),
            json: None,
            file: None,
            strict: false,
            no_coerce: false,
            no_defaults: false,
            fetch_timeout: None,
        }
    }

    #[test]
    fn config_follows_flags() {
        let mut validate_args = args("user");
        validate_args.no_coerce = true;
        validate_args.strict = true;
        validate_args.fetch_timeout = Some("250ms".to_string());

        let config = registry_config(&validate_args).unwrap();
        assert!(!config.coerce_types);
        assert!(config.use_defaults);
        assert!(config.strict_mode);
        assert_eq!(
            config.fetch_timeout,
            Some(std::time::Duration::from_millis(250))
        );
    }

    #[test]
    fn unknown_schema_name_is_not_found() {
        let err = build_registry(&args("ghost"), RegistryConfig::default()).unwrap_err();
        assert_eq!(err.code, crate::exit::NOT_FOUND);
    }

    #[test]
    fn missing_schema_file_is_reported() {
        let mut validate_args = args("user");
        validate_args.schemas.push(NamedSource {
            name: "user".to_string(),
            value: "/definitely/not/here.json".to_string(),
        });

        let err = build_registry(&validate_args, RegistryConfig::default()).unwrap_err();
        assert_eq!(err.code, crate::exit::NOT_FOUND);
    }

    #[test]
    fn inline_json_is_parsed() {
        let mut validate_args = args("user");
        validate_args.json = Some(r#"{"age":"20"}"#.to_string());
        assert_eq!(
            resolve_data(&validate_args).unwrap(),
            serde_json::json!({ "age": "20" })
        );

        validate_args.json = Some("{".to_string());
        assert_eq!(resolve_data(&validate_args).unwrap_err().code, USAGE);
    }
}
