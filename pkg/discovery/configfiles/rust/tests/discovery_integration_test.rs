// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use dd_config_discovery::{
    DiscoveredInstance, DiscoveryReport, FinderOptions, FinderRegistry, StaticContainer,
    Workspaces, descriptor,
};
use tempfile::TempDir;

const CONFIG_DISCOVERY_BIN: &str = env!("CARGO_BIN_EXE_config-discovery");

fn write(root: &Path, path: &str, contents: &str) {
    let path = root.join(path);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn symlink(root: &Path, path: &str, target: &str) {
    let path = root.join(path);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::os::unix::fs::symlink(target, path).unwrap();
}

fn registry(workspaces: &Path) -> FinderRegistry {
    let options = FinderOptions {
        workspaces: Workspaces::new(workspaces),
        ..FinderOptions::default()
    };
    FinderRegistry::from_descriptors(descriptor::builtin().unwrap(), options).max_workers(4)
}

/// Every descriptor points at a file in the workspace and no bundle path is
/// listed twice.
fn assert_bundle_complete(instance: &DiscoveredInstance) {
    let mut seen = HashSet::new();
    for file in instance.manifest.files() {
        let path = file.bundle_path();
        assert!(
            instance.workspace.join(&path).is_file(),
            "{} is listed but not in {}",
            path.display(),
            instance.workspace.display()
        );
        assert!(seen.insert(path.clone()), "{} listed twice", path.display());
    }
}

fn complimentary(instance: &DiscoveredInstance) -> Vec<PathBuf> {
    instance
        .manifest
        .complimentary_file_list
        .iter()
        .map(|file| file.bundle_path())
        .collect()
}

#[tokio::test]
async fn test_nginx_bundle() {
    let snapshot = TempDir::new().unwrap();
    let workspaces = TempDir::new().unwrap();
    let root = snapshot.path();

    write(
        root,
        "etc/nginx/nginx.conf",
        r#"
user nginx;
# include disabled.conf;
events {}
http {
    include mime.types;
    include "sites-enabled/*.conf";
    include conf.d/missing.conf;
}
"#,
    );
    write(root, "etc/nginx/mime.types", "types {}\n");
    // Relative includes are resolved against the including file's directory,
    // as referenced (sites-enabled/).
    let site = "server { include ../snippets/common.conf; }\n";
    write(root, "etc/nginx/sites-available/app.conf", site);
    write(root, "etc/nginx/sites-available/api.conf", site);
    symlink(root, "etc/nginx/sites-enabled/app.conf", "../sites-available/app.conf");
    symlink(root, "etc/nginx/sites-enabled/api.conf", "/etc/nginx/sites-available/api.conf");
    // Cycle back to the primary file.
    write(root, "etc/nginx/snippets/common.conf", "include ../nginx.conf;\n");

    let report = registry(workspaces.path()).discover_all(root, None).await.unwrap();

    assert_eq!(report.instances.len(), 1);
    let instance = report.instances.first().unwrap();
    assert_bundle_complete(instance);
    assert_eq!(
        complimentary(instance),
        vec![
            PathBuf::from("etc/nginx/mime.types"),
            PathBuf::from("etc/nginx/sites-enabled/api.conf"),
            PathBuf::from("etc/nginx/sites-enabled/app.conf"),
            PathBuf::from("etc/nginx/snippets/common.conf"),
        ]
    );
    assert_eq!(
        fs::read_to_string(instance.workspace.join("etc/nginx/sites-enabled/app.conf")).unwrap(),
        "server { include ../snippets/common.conf; }\n"
    );

    // The missing include is recorded but did not stop anything.
    assert_eq!(report.skipped_count(), 1);
    assert_eq!(
        report.skipped.first().unwrap().path,
        Some(PathBuf::from("/etc/nginx/conf.d/missing.conf"))
    );
}

#[tokio::test]
async fn test_two_instances_from_search() {
    let snapshot = TempDir::new().unwrap();
    let workspaces = TempDir::new().unwrap();
    let root = snapshot.path();

    write(root, "srv/blue/redis.conf", "include /srv/blue/extra.conf\n");
    write(root, "srv/blue/extra.conf", "maxmemory 1gb\n");
    write(root, "srv/green/redis.conf", "include extra.conf\n");
    write(root, "srv/green/extra.conf", "maxmemory 2gb\n");

    let report = registry(workspaces.path()).discover_all(root, None).await.unwrap();
    let redis: Vec<&DiscoveredInstance> = report.for_service("redis").collect();

    assert_eq!(redis.len(), 2);
    let (blue, green) = (redis.first().unwrap(), redis.get(1).unwrap());
    assert_ne!(blue.workspace, green.workspace);
    assert_bundle_complete(blue);
    assert_bundle_complete(green);
    assert_eq!(complimentary(blue), vec![PathBuf::from("srv/blue/extra.conf")]);
    assert_eq!(complimentary(green), vec![PathBuf::from("srv/green/extra.conf")]);
    assert_eq!(
        fs::read_to_string(green.workspace.join("srv/green/extra.conf")).unwrap(),
        "maxmemory 2gb\n"
    );
}

#[tokio::test]
async fn test_symlink_resolves_against_link_directory() {
    let snapshot = TempDir::new().unwrap();
    let workspaces = TempDir::new().unwrap();
    let root = snapshot.path();

    write(root, "etc/data/real.conf", "real\n");
    write(root, "data/real.conf", "decoy\n");
    symlink(root, "etc/svc/conf", "../data/real.conf");

    let descriptors = descriptor::parse(
        r#"
- service_name: svc
  default_file_name: conf
  standard_locations: [/etc/svc/conf]
"#,
    )
    .unwrap();
    let options = FinderOptions {
        workspaces: Workspaces::new(workspaces.path()),
        ..FinderOptions::default()
    };
    let report = FinderRegistry::from_descriptors(descriptors, options)
        .discover_all(root, None)
        .await
        .unwrap();

    assert_eq!(report.instances.len(), 1);
    let instance = report.instances.first().unwrap();
    assert_bundle_complete(instance);
    assert_eq!(
        fs::read_to_string(instance.workspace.join("etc/svc/conf")).unwrap(),
        "real\n"
    );
}

#[tokio::test]
async fn test_symlink_escape_is_refused() {
    let snapshot = TempDir::new().unwrap();
    let workspaces = TempDir::new().unwrap();
    let root = snapshot.path();

    symlink(root, "etc/nginx/nginx.conf", "../../../../../etc/passwd");

    let report = registry(workspaces.path()).discover_all(root, None).await.unwrap();
    assert!(report.instances.is_empty());
    assert!(report.skipped_count() >= 1);
    assert_eq!(fs::read_dir(workspaces.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_image_entrypoint_inspection() {
    let snapshot = TempDir::new().unwrap();
    let workspaces = TempDir::new().unwrap();
    let root = snapshot.path();

    write(root, "app/conf/pg.conf", "include_if_exists = 'tuning.conf'\n");
    write(root, "app/conf/tuning.conf", "shared_buffers = 1GB\n");
    let container = StaticContainer::from_image_config(
        root,
        r#"{"Config": {"Entrypoint": ["docker-entrypoint.sh"], "Cmd": ["postgres", "-c", "config_file=/app/conf/pg.conf"]}}"#,
    )
    .unwrap();

    let report = registry(workspaces.path())
        .discover_all(root, Some(Arc::new(container)))
        .await
        .unwrap();

    assert_eq!(report.instances.len(), 1);
    let instance = report.instances.first().unwrap();
    assert_eq!(instance.manifest.service_name, "postgres");
    assert_bundle_complete(instance);
    assert_eq!(complimentary(instance), vec![PathBuf::from("app/conf/tuning.conf")]);
}

#[tokio::test]
async fn test_default_workspaces_are_left_for_the_caller() {
    let snapshot = TempDir::new().unwrap();
    let root = snapshot.path();
    write(root, "etc/haproxy/haproxy.cfg", "global\n");

    let registry =
        FinderRegistry::from_descriptors(descriptor::builtin().unwrap(), FinderOptions::default());
    let report = registry.discover_all(root, None).await.unwrap();

    let workspaces: Vec<PathBuf> = report.instances.iter().map(|i| i.workspace.clone()).collect();
    let _guard = scopeguard::guard(workspaces, |paths| {
        for path in paths {
            let _ = fs::remove_dir_all(path);
        }
    });

    assert_eq!(report.instances.len(), 1);
    let instance = report.instances.first().unwrap();
    assert!(instance.workspace.starts_with(std::env::temp_dir()));
    assert_bundle_complete(instance);
}

fn run_binary(args: &[&str], workspaces: &Path) -> serde_json::Value {
    let output = Command::new(CONFIG_DISCOVERY_BIN)
        .args(args)
        .arg("--config")
        .arg("/nonexistent/config-discovery.yaml")
        .env("DD_CONFIG_DISCOVERY_WORKSPACE_DIR", workspaces)
        .env("DD_CONFIG_DISCOVERY_LOG_LEVEL", "debug")
        .output()
        .expect("Failed to execute config-discovery");

    assert!(
        output.status.success(),
        "config-discovery failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_binary_prints_report() {
    let snapshot = TempDir::new().unwrap();
    let workspaces = TempDir::new().unwrap();
    write(snapshot.path(), "etc/mysql/my.cnf", "!includedir /etc/mysql/conf.d/\n");
    write(snapshot.path(), "etc/mysql/conf.d/mysqld.cnf", "[mysqld]\n");

    let report = run_binary(&["--root", snapshot.path().to_str().unwrap()], workspaces.path());

    let instances = report["instances"].as_array().unwrap();
    assert_eq!(instances.len(), 1);
    let manifest = &instances[0]["manifest"];
    assert_eq!(manifest["version"], "1.0");
    assert_eq!(manifest["serviceName"], "mysql");
    assert_eq!(manifest["configFileList"][0]["fileName"], "my.cnf");
    assert_eq!(manifest["configFileList"][0]["subPath"], "etc/mysql");
    assert_eq!(manifest["complimentaryFileList"][0]["fileName"], "mysqld.cnf");
    assert_eq!(manifest["complimentaryFileList"][0]["configFileType"], "mysql");

    let workspace = PathBuf::from(instances[0]["workspace"].as_str().unwrap());
    assert!(workspace.starts_with(workspaces.path()));
    assert!(workspace.join("etc/mysql/conf.d/mysqld.cnf").is_file());
}

#[test]
fn test_binary_image_config() {
    let snapshot = TempDir::new().unwrap();
    let workspaces = TempDir::new().unwrap();
    write(snapshot.path(), "opt/web/site.conf", "events {}\n");
    let image_config = snapshot.path().join("image.json");
    fs::write(
        &image_config,
        r#"[{"Id": "sha256:feed", "Config": {"Cmd": ["nginx", "-g", "daemon off;", "-c", "/opt/web/site.conf"]}}]"#,
    )
    .unwrap();

    let report = run_binary(
        &[
            "--root",
            snapshot.path().to_str().unwrap(),
            "--image-config",
            image_config.to_str().unwrap(),
        ],
        workspaces.path(),
    );

    let instances = report["instances"].as_array().unwrap();
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0]["manifest"]["serviceName"], "nginx");
    assert_eq!(instances[0]["manifest"]["configFileList"][0]["fileName"], "site.conf");
    assert_eq!(instances[0]["manifest"]["configFileList"][0]["defaultFileName"], "nginx.conf");
}

#[test]
fn test_report_serialization_omits_empty_skipped() {
    let json = serde_json::to_value(DiscoveryReport::default()).unwrap();
    assert_eq!(json, serde_json::json!({ "instances": [] }));
}
