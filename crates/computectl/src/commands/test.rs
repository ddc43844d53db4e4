use std::{fs, path::PathBuf, time::Duration};

use clap::Parser;
use libcompute::{RestartMode, StopMode, SuspendMode};
use libvm::{Association, LibvirtConfig, Registry, VmManager};
use signal_hook::{consts::SIGINT, low_level::raise};
use tempfile::TempDir;

use crate::config::DEFAULT_REGISTRY;

use super::{cancel_on_signals, load_config, run_verb, save_registry, ComputeCmd, GlobalOpts};

#[derive(Parser)]
struct TestOpts {
    #[clap(flatten)]
    global: GlobalOpts,

    #[clap(subcommand)]
    cmd: ComputeCmd,
}

const COMPUTE_YAML: &str = "id: 9f6c5d36-7a4e-4a36-9d33-0c5f7d2f1b11
cores: 2
hostname: TestCase
memory: 2
disk_format: qcow2
";

#[test]
fn test_parse_modes() {
    let opts = TestOpts::try_parse_from(["computectl", "stop", "-f", "c.yaml"]).unwrap();
    let ComputeCmd::Stop(stop) = opts.cmd else {
        panic!("not a stop command")
    };
    assert_eq!(stop.mode, StopMode::Graceful);
    assert_eq!(stop.file, PathBuf::from("c.yaml"));
    assert_eq!(opts.global.registry, PathBuf::from(DEFAULT_REGISTRY));
    assert!(!opts.global.dry_run);

    let opts = TestOpts::try_parse_from([
        "computectl",
        "suspend",
        "-f",
        "c.yaml",
        "--mode",
        "hibernate",
        "--dry-run",
    ])
    .unwrap();
    let ComputeCmd::Suspend(suspend) = opts.cmd else {
        panic!("not a suspend command")
    };
    assert_eq!(suspend.mode, SuspendMode::Hibernate);
    assert!(opts.global.dry_run);

    let opts =
        TestOpts::try_parse_from(["computectl", "restart", "-f", "c.yaml", "-m", "cold"]).unwrap();
    let ComputeCmd::Restart(restart) = opts.cmd else {
        panic!("not a restart command")
    };
    assert_eq!(restart.mode, RestartMode::Cold);

    assert!(
        TestOpts::try_parse_from(["computectl", "stop", "-f", "c.yaml", "-m", "halt"]).is_err()
    );
    assert!(TestOpts::try_parse_from(["computectl", "start"]).is_err());
}

#[test]
fn test_load_config() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("libvirt.yaml");
    fs::write(
        &file,
        "storage_directory: /srv/images
prefer_system_connection: true
shutdown_timeout_ms: 1500
",
    )
    .unwrap();

    let opts = TestOpts::try_parse_from([
        "computectl",
        "--config",
        file.to_str().unwrap(),
        "uri",
        "qemu",
    ])
    .unwrap();
    let config = load_config(&opts.global).unwrap();
    assert_eq!(config.storage_directory, PathBuf::from("/srv/images"));
    assert!(config.prefer_system_connection);
    assert_eq!(config.shutdown_timeout_ms, 1500);
    assert_eq!(config.destroy_grace_ms, 500);

    let opts = TestOpts::try_parse_from([
        "computectl",
        "--config",
        dir.path().join("missing.yaml").to_str().unwrap(),
        "uri",
        "qemu",
    ])
    .unwrap();
    assert!(load_config(&opts.global).is_err());
}

#[test]
fn test_dry_run_leaves_compute_alone() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("compute.yaml");
    fs::write(&file, COMPUTE_YAML).unwrap();

    let global = GlobalOpts {
        config: None,
        registry: dir.path().join("registry.yaml"),
        dry_run: true,
    };
    run_verb(&file, &global, true, |_, _| panic!("verb must not run on dry run")).unwrap();

    assert_eq!(fs::read_to_string(&file).unwrap(), COMPUTE_YAML);
    assert!(!dir.path().join("registry.yaml").exists());
}

fn association(uri: &str) -> Association {
    Association {
        hypervisor: String::from("qemu"),
        uri: String::from(uri),
    }
}

#[test]
fn test_save_registry_keeps_other_computes() {
    let dir = TempDir::new().unwrap();
    let global = GlobalOpts {
        config: None,
        registry: dir.path().join("state").join("registry.yaml"),
        dry_run: false,
    };

    // written by another invocation after this one loaded the snapshot
    let manager = VmManager::new(LibvirtConfig::default());
    let other = Registry::new();
    other.insert("other", association("qemu:///system"));
    other.insert("gone", association("qemu:///system"));
    fs::create_dir_all(dir.path().join("state")).unwrap();
    other.save(&global.registry).unwrap();

    manager.registry().insert("mine", association("qemu://remote/system"));
    save_registry(&manager, &global, "mine").unwrap();
    save_registry(&manager, &global, "gone").unwrap();

    let saved = Registry::load(&global.registry).unwrap();
    assert_eq!(saved.len(), 2);
    assert_eq!(saved.get("other"), Some(association("qemu:///system")));
    assert_eq!(saved.get("mine"), Some(association("qemu://remote/system")));
    assert!(!saved.contains("gone"));
    assert_eq!(fs::read_dir(dir.path().join("state")).unwrap().count(), 1);
}

#[test]
fn test_first_signal_cancels_waits() {
    let manager = VmManager::new(LibvirtConfig::default());
    let waiting = manager.canceller().renew();
    cancel_on_signals(&manager).unwrap();

    raise(SIGINT).unwrap();
    assert!(waiting.wait_timeout(Duration::from_secs(10)));
}
