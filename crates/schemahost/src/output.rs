use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use schemahost_registry::Violation;
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct ValidationOutput<'a> {
    schema: &'a str,
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a Value>,
    #[serde(skip_serializing_if = "no_violations")]
    violations: &'a [Violation],
}

fn no_violations(violations: &&[Violation]) -> bool {
    violations.is_empty()
}

pub fn print_accepted(schema: &str, data: &Value, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = ValidationOutput {
                schema,
                valid: true,
                data: Some(data),
                violations: &[],
            };
            print_json(&out);
        }
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("{schema}: valid");
            println!(
                "{}",
                serde_json::to_string_pretty(data).unwrap_or_else(|_| "null".to_string())
            );
        }
        OutputFormat::Raw => print_json(data),
    }
}

pub fn print_rejected(schema: &str, violations: &[Violation], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = ValidationOutput {
                schema,
                valid: false,
                data: None,
                violations,
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PATH", "KEYWORD", "MESSAGE"]);
            for violation in violations {
                table.add_row(vec![
                    display_path(&violation.instance_path).to_string(),
                    violation.keyword.clone(),
                    violation.message.clone(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("{schema}: {} violation(s)", violations.len());
            for violation in violations {
                println!("  {violation} [{}]", violation.keyword);
            }
        }
        OutputFormat::Raw => {
            for violation in violations {
                println!("{violation}");
            }
        }
    }
}

#[derive(Serialize)]
struct SchemaListOutput<'a> {
    directory: &'a str,
    schemas: &'a [&'a str],
}

pub fn print_schema_names(directory: &str, names: &[&str], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&SchemaListOutput {
            directory,
            schemas: names,
        }),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SCHEMA"]);
            for name in names {
                table.add_row(vec![name.to_string()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("{directory}: {} schema(s) compiled", names.len());
            for name in names {
                println!("  {name}");
            }
        }
        OutputFormat::Raw => {
            for name in names {
                println!("{name}");
            }
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn display_path(path: &str) -> &str {
    if path.is_empty() {
        "/"
    } else {
        path
    }
}
