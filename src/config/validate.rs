// The miette/thiserror derive macros generate code that triggers false
// positive unused_assignments warnings on enum variant fields.
#![allow(unused_assignments)]

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use crate::config::model::ProjdeckConfig;

// ---------------------------------------------------------------------------
// ConfigDiagnostic — miette-powered validation error
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigDiagnostic {
    #[error("spawn.command is empty")]
    #[diagnostic(code(projdeck::empty_command))]
    EmptyCommand {
        #[source_code]
        src: NamedSource<String>,
        #[label("command is empty")]
        span: SourceSpan,
    },

    #[error("ports.max_instances must be at least 1")]
    #[diagnostic(code(projdeck::zero_capacity))]
    ZeroCapacity {
        #[source_code]
        src: NamedSource<String>,
        #[label("no instance could ever be started")]
        span: SourceSpan,
    },

    #[error("{range} port range {start}..{start}+{count} does not fit in 1..=65535")]
    #[diagnostic(code(projdeck::port_range_overflow))]
    PortRangeOverflow {
        #[source_code]
        src: NamedSource<String>,
        #[label("range overflows")]
        span: SourceSpan,
        range: String,
        start: u16,
        count: u16,
    },

    #[error("backend and frontend port ranges overlap")]
    #[diagnostic(
        code(projdeck::overlapping_port_ranges),
        help("move frontend_start at least max_instances ports away from backend_start")
    )]
    OverlappingRanges {
        #[source_code]
        src: NamedSource<String>,
        #[label("overlaps the backend range")]
        span: SourceSpan,
    },

    #[error("invalid duration `{value}` for `{field}`")]
    #[diagnostic(
        code(projdeck::invalid_duration),
        help("use a humantime duration such as \"45s\" or \"500ms\"")
    )]
    InvalidDuration {
        #[source_code]
        src: NamedSource<String>,
        #[label("not a duration")]
        span: SourceSpan,
        field: String,
        value: String,
    },

    #[error("readiness.health_path `{value}` must start with `/`")]
    #[diagnostic(code(projdeck::invalid_health_path))]
    InvalidHealthPath {
        #[source_code]
        src: NamedSource<String>,
        #[label("relative path")]
        span: SourceSpan,
        value: String,
    },

    #[error("readiness has no signal: health_probe is off and patterns is empty")]
    #[diagnostic(
        code(projdeck::no_readiness_signal),
        help("enable health_probe or add at least one log pattern")
    )]
    NoReadinessSignal {
        #[source_code]
        src: NamedSource<String>,
        #[label("every spawn would time out")]
        span: SourceSpan,
    },

    #[error("project `{project}` has an empty path")]
    #[diagnostic(code(projdeck::empty_project_path))]
    EmptyProjectPath {
        #[source_code]
        src: NamedSource<String>,
        #[label("path is empty")]
        span: SourceSpan,
        project: String,
    },
}

// ---------------------------------------------------------------------------
// Source span helpers
// ---------------------------------------------------------------------------

/// Find the byte offset of a TOML table header such as `[spawn]` or
/// `[projects.web]`, pointing at the table name.
fn find_table_span(source: &str, table: &str) -> SourceSpan {
    let header = format!("[{}]", table);
    if let Some(pos) = source.find(&header) {
        return (pos + 1, table.len()).into();
    }
    (0, 0).into()
}

/// Find the byte offset of a field's value inside a table, falling back to
/// the table header when the field is not written out (default value).
fn find_field_span(source: &str, table: &str, field: &str) -> SourceSpan {
    let header = format!("[{}]", table);
    let Some(search_start) = source.find(&header) else {
        return (0, 0).into();
    };
    let after_header = &source[search_start..];
    // Stop at the next table header.
    let section_end = after_header[header.len()..]
        .find("\n[")
        .map(|p| p + header.len())
        .unwrap_or(after_header.len());
    let section = &after_header[..section_end];

    let mut line_start = 0;
    for line in section.split_inclusive('\n') {
        let offset = search_start + line_start;
        line_start += line.len();

        let Some(rest) = line.trim_start().strip_prefix(field) else {
            continue;
        };
        let Some(after_eq) = rest.trim_start().strip_prefix('=') else {
            continue;
        };
        let value = after_eq.trim();
        // Everything in the line before the value.
        let value_pos = line.len() - after_eq.trim_start().len();
        return (offset + value_pos, value.len()).into();
    }

    find_table_span(source, table)
}

// ---------------------------------------------------------------------------
// Main validation function
// ---------------------------------------------------------------------------

pub fn validate(
    config: &ProjdeckConfig,
    source: &str,
    filename: &str,
) -> Result<(), Vec<ConfigDiagnostic>> {
    let mut errors = Vec::new();
    let src = NamedSource::new(filename, source.to_string());

    if config.spawn.command.trim().is_empty() {
        errors.push(ConfigDiagnostic::EmptyCommand {
            src: src.clone(),
            span: find_field_span(source, "spawn", "command"),
        });
    }

    let ports = &config.ports;
    if ports.max_instances == 0 {
        errors.push(ConfigDiagnostic::ZeroCapacity {
            src: src.clone(),
            span: find_field_span(source, "ports", "max_instances"),
        });
    } else {
        let ranges = [
            ("backend", "backend_start", ports.backend_start),
            ("frontend", "frontend_start", ports.frontend_start),
        ];
        let mut overflow = false;
        for (range, field, start) in ranges {
            let end = start as u32 + ports.max_instances as u32 - 1;
            if start == 0 || end > u16::MAX as u32 {
                overflow = true;
                errors.push(ConfigDiagnostic::PortRangeOverflow {
                    src: src.clone(),
                    span: find_field_span(source, "ports", field),
                    range: range.to_string(),
                    start,
                    count: ports.max_instances,
                });
            }
        }

        if !overflow {
            let backend = ports.backend_start as u32
                ..ports.backend_start as u32 + ports.max_instances as u32;
            let frontend = ports.frontend_start as u32
                ..ports.frontend_start as u32 + ports.max_instances as u32;
            if backend.start < frontend.end && frontend.start < backend.end {
                errors.push(ConfigDiagnostic::OverlappingRanges {
                    src: src.clone(),
                    span: find_field_span(source, "ports", "frontend_start"),
                });
            }
        }
    }

    let durations = [
        ("readiness", "timeout", &config.readiness.timeout),
        ("readiness", "health_grace", &config.readiness.health_grace),
        ("readiness", "health_interval", &config.readiness.health_interval),
        ("termination", "grace", &config.termination.grace),
    ];
    for (table, field, value) in durations {
        if humantime::parse_duration(value).is_err() {
            errors.push(ConfigDiagnostic::InvalidDuration {
                src: src.clone(),
                span: find_field_span(source, table, field),
                field: format!("{}.{}", table, field),
                value: value.clone(),
            });
        }
    }

    if config.readiness.health_probe && !config.readiness.health_path.starts_with('/') {
        errors.push(ConfigDiagnostic::InvalidHealthPath {
            src: src.clone(),
            span: find_field_span(source, "readiness", "health_path"),
            value: config.readiness.health_path.clone(),
        });
    }

    if !config.readiness.health_probe && config.readiness.patterns.is_empty() {
        errors.push(ConfigDiagnostic::NoReadinessSignal {
            src: src.clone(),
            span: find_table_span(source, "readiness"),
        });
    }

    for (name, project) in &config.projects {
        if project.path.trim().is_empty() {
            errors.push(ConfigDiagnostic::EmptyProjectPath {
                src: src.clone(),
                span: find_field_span(source, &format!("projects.{}", name), "path"),
                project: name.clone(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(toml_src: &str) -> Result<(), Vec<ConfigDiagnostic>> {
        let config: ProjdeckConfig = toml::from_str(toml_src).unwrap();
        validate(&config, toml_src, "projdeck.toml")
    }

    #[test]
    fn valid_config_passes() {
        let src = r#"
[spawn]
command = "node server.js"

[projects.web]
path = "/srv/web"
"#;
        assert!(check(src).is_ok());
    }

    #[test]
    fn empty_command_reported() {
        let src = "[spawn]\ncommand = \"  \"\n";
        let errors = check(src).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], ConfigDiagnostic::EmptyCommand { .. }));
    }

    #[test]
    fn overlapping_ranges_reported() {
        let src = r#"
[spawn]
command = "run"

[ports]
backend_start = 4000
frontend_start = 4010
max_instances = 20
"#;
        let errors = check(src).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigDiagnostic::OverlappingRanges { .. })));
    }

    #[test]
    fn adjacent_ranges_are_fine() {
        let src = r#"
[spawn]
command = "run"

[ports]
backend_start = 4000
frontend_start = 4020
max_instances = 20
"#;
        assert!(check(src).is_ok());
    }

    #[test]
    fn overflowing_range_reported() {
        let src = r#"
[spawn]
command = "run"

[ports]
backend_start = 65530
frontend_start = 5000
max_instances = 20
"#;
        let errors = check(src).unwrap_err();
        assert!(errors.iter().any(|e| matches!(
            e,
            ConfigDiagnostic::PortRangeOverflow { range, .. } if range == "backend"
        )));
    }

    #[test]
    fn zero_capacity_reported() {
        let src = "[spawn]\ncommand = \"run\"\n\n[ports]\nmax_instances = 0\n";
        let errors = check(src).unwrap_err();
        assert!(matches!(errors[0], ConfigDiagnostic::ZeroCapacity { .. }));
    }

    #[test]
    fn bad_duration_points_at_value() {
        let src = "[spawn]\ncommand = \"run\"\n\n[readiness]\ntimeout = \"forever\"\n";
        let errors = check(src).unwrap_err();
        assert_eq!(errors.len(), 1);
        match &errors[0] {
            ConfigDiagnostic::InvalidDuration { field, value, span, .. } => {
                assert_eq!(field, "readiness.timeout");
                assert_eq!(value, "forever");
                let offset = span.offset();
                assert_eq!(&src[offset..offset + span.len()], "\"forever\"");
            }
            other => panic!("unexpected diagnostic: {:?}", other),
        }
    }

    #[test]
    fn relative_health_path_reported() {
        let src = "[spawn]\ncommand = \"run\"\n\n[readiness]\nhealth_path = \"status\"\n";
        let errors = check(src).unwrap_err();
        assert!(matches!(errors[0], ConfigDiagnostic::InvalidHealthPath { .. }));
    }

    #[test]
    fn no_readiness_signal_reported() {
        let src = "[spawn]\ncommand = \"run\"\n\n[readiness]\nhealth_probe = false\npatterns = []\n";
        let errors = check(src).unwrap_err();
        assert!(matches!(errors[0], ConfigDiagnostic::NoReadinessSignal { .. }));
    }

    #[test]
    fn empty_project_path_reported() {
        let src = "[spawn]\ncommand = \"run\"\n\n[projects.docs]\npath = \"\"\n";
        let errors = check(src).unwrap_err();
        match &errors[0] {
            ConfigDiagnostic::EmptyProjectPath { project, .. } => assert_eq!(project, "docs"),
            other => panic!("unexpected diagnostic: {:?}", other),
        }
    }
}
