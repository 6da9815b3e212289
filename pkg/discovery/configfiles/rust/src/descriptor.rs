// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use serde::{Deserialize, Serialize};

use crate::errors::Error;

const BUILTIN_SERVICES: &str = include_str!("services.yaml");

/// Static description of a supported service type. Adding a service is a
/// matter of adding one of these, either to `services.yaml` or to the
/// `services` section of the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceDescriptor {
    /// Tag stamped as `serviceName` on manifests.
    pub service_name: String,
    /// Parser/rule-set tag for downstream analysis. Defaults to the service name.
    #[serde(default)]
    pub config_file_type: Option<String>,
    /// Canonical name of the primary configuration file.
    pub default_file_name: String,
    /// Well-known absolute locations of the primary file, probed in order.
    #[serde(default)]
    pub standard_locations: Vec<String>,
    /// File names looked for when searching the whole snapshot.
    #[serde(default)]
    pub file_names: Vec<String>,
    /// Regex applied to process command lines; group 1 is the config path.
    #[serde(default)]
    pub process_pattern: Option<String>,
    /// Regexes applied to file contents; group 1 is the referenced path.
    #[serde(default)]
    pub include_patterns: Vec<String>,
    #[serde(default)]
    pub include_relative_to: RelativeTo,
    /// Lines starting with this prefix are ignored when looking for includes.
    #[serde(default)]
    pub comment_prefix: Option<String>,
}

/// Base directory for relative include references.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelativeTo {
    /// Directory of the file containing the directive.
    #[default]
    IncludingFile,
    /// Directory of the primary configuration file, whichever file contains
    /// the directive.
    PrimaryFile,
}

impl ServiceDescriptor {
    pub fn config_file_type(&self) -> &str {
        self.config_file_type
            .as_deref()
            .unwrap_or(&self.service_name)
    }

    pub(crate) fn invalid(&self, reason: impl Into<String>) -> Error {
        Error::Descriptor {
            service: self.service_name.clone(),
            reason: reason.into(),
        }
    }
}

/// Descriptors for the services supported out of the box.
pub fn builtin() -> Result<Vec<ServiceDescriptor>, Error> {
    parse(BUILTIN_SERVICES).map_err(|e| Error::Descriptor {
        service: "<builtin>".to_string(),
        reason: e.to_string(),
    })
}

/// Parses a YAML list of descriptors.
pub fn parse(yaml: &str) -> Result<Vec<ServiceDescriptor>, serde_yaml::Error> {
    serde_yaml::from_str(yaml)
}

/// Merges `overrides` into `base`: a descriptor with an existing service name
/// replaces it in place, new ones are appended.
pub fn merge(
    mut base: Vec<ServiceDescriptor>,
    overrides: Vec<ServiceDescriptor>,
) -> Vec<ServiceDescriptor> {
    for descriptor in overrides {
        match base
            .iter_mut()
            .find(|d| d.service_name == descriptor.service_name)
        {
            Some(existing) => *existing = descriptor,
            None => base.push(descriptor),
        }
    }
    base
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_builtin_descriptors_parse() {
        let descriptors = builtin().unwrap();
        let names: Vec<&str> = descriptors
            .iter()
            .map(|d| d.service_name.as_str())
            .collect();
        assert_eq!(
            names,
            vec!["nginx", "apache", "redis", "postgres", "mysql", "haproxy"]
        );

        let nginx = descriptors.first().unwrap();
        assert_eq!(nginx.standard_locations, vec!["/etc/nginx/nginx.conf"]);
        assert_eq!(nginx.include_relative_to, RelativeTo::IncludingFile);
        assert_eq!(nginx.config_file_type(), "nginx");
    }

    #[test]
    fn test_builtin_file_names_do_not_overlap() {
        let descriptors = builtin().unwrap();
        let mut seen = HashSet::new();
        for descriptor in &descriptors {
            for name in &descriptor.file_names {
                assert!(
                    seen.insert(name.clone()),
                    "{name} is claimed by more than one service"
                );
            }
        }
    }

    #[test]
    fn test_postgres_pattern_unescaped() {
        let descriptors = builtin().unwrap();
        let postgres = descriptors
            .iter()
            .find(|d| d.service_name == "postgres")
            .unwrap();
        assert_eq!(
            postgres.include_patterns,
            vec![r"^\s*include(?:_if_exists|_dir)?\s*=?\s*'([^']+)'".to_string()]
        );
    }

    #[test]
    fn test_parse_minimal_and_defaults() {
        let descriptors = parse(
            r#"
- service_name: kafka
  default_file_name: server.properties
  file_names: [server.properties]
"#,
        )
        .unwrap();

        let kafka = descriptors.first().unwrap();
        assert_eq!(kafka.config_file_type(), "kafka");
        assert!(kafka.standard_locations.is_empty());
        assert!(kafka.process_pattern.is_none());
        assert_eq!(kafka.include_relative_to, RelativeTo::IncludingFile);
    }

    #[test]
    fn test_parse_rejects_unknown_fields() {
        let result = parse(
            r#"
- service_name: kafka
  default_file_name: server.properties
  filenames: [server.properties]
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_merge() {
        let base = builtin().unwrap();
        let overrides = parse(
            r#"
- service_name: nginx
  default_file_name: nginx.conf
  standard_locations: [/opt/nginx/conf/nginx.conf]
- service_name: kafka
  default_file_name: server.properties
"#,
        )
        .unwrap();

        let merged = merge(base, overrides);
        assert_eq!(merged.len(), 7);
        let nginx = merged.first().unwrap();
        assert_eq!(nginx.standard_locations, vec!["/opt/nginx/conf/nginx.conf"]);
        assert_eq!(merged.last().unwrap().service_name, "kafka");
    }
}
