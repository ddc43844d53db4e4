pub const DEFAULT_CONFIG: &str = "/etc/occi/libvirt.yaml";
pub const DEFAULT_REGISTRY: &str = "/var/lib/occi/registry.yaml";
