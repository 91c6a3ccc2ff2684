use burrow_core::*;
use std::path::PathBuf;

#[test]
fn test_container_id_validation() {
    // Valid IDs
    assert!(ContainerId::new("test").is_ok());
    assert!(ContainerId::new("test-123").is_ok());
    assert!(ContainerId::new("test_456").is_ok());
    assert!(ContainerId::new("a").is_ok());
    assert!(ContainerId::new("ABC-123_xyz").is_ok());

    // Invalid IDs - empty
    assert!(ContainerId::new("").is_err());

    // Invalid IDs - too long
    assert!(ContainerId::new("a".repeat(65)).is_err());

    // Invalid IDs - bad characters
    assert!(ContainerId::new("test@123").is_err());
    assert!(ContainerId::new("test space").is_err());
    assert!(ContainerId::new("test/path").is_err());
    assert!(ContainerId::new("../escape").is_err());
    assert!(ContainerId::new("test.dot").is_err());
    assert!(ContainerId::new("contäiner").is_err());
}

#[test]
fn test_container_id_serialization() {
    let id = ContainerId::new("test-123").unwrap();

    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"test-123\"");

    let deserialized: ContainerId = serde_json::from_str(&json).unwrap();
    assert_eq!(id, deserialized);

    // Validation also runs on deserialization
    assert!(serde_json::from_str::<ContainerId>("\"bad/id\"").is_err());
}

#[test]
fn test_process_id() {
    let pid = ProcessId::from_raw(4242);
    assert_eq!(pid.as_raw(), 4242);
    assert_eq!(format!("{pid}"), "4242");
    assert!(ProcessId::current().as_raw() > 0);
}

#[test]
fn test_default_config_matches_fixed_layout() {
    let config = ContainerConfig::default();

    assert_eq!(config.id.as_str(), "container");
    assert_eq!(config.rootfs(), PathBuf::from("/root/container"));
    assert_eq!(config.netns_handle(), PathBuf::from("/root/container/net"));
    assert_eq!(config.veth.host, "veth0_container");
    assert_eq!(config.veth.container, "veth1_container");
}

#[test]
fn test_distinct_instances_do_not_share_resources() {
    let a = ContainerConfig::new(ContainerId::new("alpha").unwrap())
        .with_host_addr("10.0.1.1/24".parse().unwrap())
        .with_container_addr("10.0.1.2/24".parse().unwrap());
    let b = ContainerConfig::new(ContainerId::new("beta").unwrap())
        .with_host_addr("10.0.2.1/24".parse().unwrap())
        .with_container_addr("10.0.2.2/24".parse().unwrap());

    assert!(a.validate().is_ok());
    assert!(b.validate().is_ok());
    assert_ne!(a.rootfs(), b.rootfs());
    assert_ne!(a.netns_handle(), b.netns_handle());
    assert_ne!(a.veth.host, b.veth.host);
    assert_ne!(a.veth.container, b.veth.container);
}

#[test]
fn test_config_round_trip_through_argv() {
    let config = ContainerConfig::new(ContainerId::generate())
        .with_base_dir("/srv/containers")
        .with_netns_strategy(NetnsStrategy::Helper);

    let parsed = ContainerConfig::from_json(&config.to_json().unwrap()).unwrap();
    assert_eq!(parsed, config);
}

#[test]
fn test_launch_stage_argv() {
    for stage in LaunchStage::ALL {
        let parsed: LaunchStage = stage.as_arg().parse().unwrap();
        assert_eq!(parsed, stage);
    }
}

#[test]
fn test_error_messages() {
    let err = Error::PermissionDenied {
        operation: "mount proc".to_string(),
    };
    assert_eq!(err.to_string(), "Permission denied: mount proc");

    let io: Error = std::io::Error::from(std::io::ErrorKind::NotFound).into();
    assert!(matches!(io, Error::Io(_)));
}
