//! Docker-awareness for bridge-host selection, per §6.

/// Hostname upstream tool servers should use to reach back out to the
/// host's loopback interface. Inside a container, `localhost` refers to
/// the container itself, so Docker Desktop's `host.docker.internal`
/// alias is used instead. `docker_container_flag` is the CLI's own
/// `DOCKER_CONTAINER`-bound field, so the decision doesn't depend on a
/// second, independent read of the environment.
pub fn bridge_host(docker_container_flag: Option<&str>) -> &'static str {
    if running_in_docker(docker_container_flag) {
        "host.docker.internal"
    } else {
        "localhost"
    }
}

fn running_in_docker(docker_container_flag: Option<&str>) -> bool {
    std::path::Path::new("/.dockerenv").exists() || is_truthy(docker_container_flag)
}

fn is_truthy(value: Option<&str>) -> bool {
    value.map(|v| matches!(v.trim(), "true" | "1")).unwrap_or(false)
}
