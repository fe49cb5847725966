//! Host checks: connectivity and free disk space

use std::path::Path;
use std::time::Duration;
use sysinfo::Disks;
use tokio::net::TcpStream;
use tracing::debug;

/// Endpoints probed for connectivity, any one answering is enough
const PROBE_HOSTS: &[&str] = &["8.8.8.8:53", "github.com:443"];

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

const GIB: u64 = 1024 * 1024 * 1024;

/// True if any probe host accepts a TCP connection within the timeout
pub async fn is_online() -> bool {
    probe(PROBE_HOSTS).await
}

async fn probe(hosts: &[&str]) -> bool {
    for host in hosts {
        match tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect(*host)).await {
            Ok(Ok(_)) => return true,
            Ok(Err(e)) => debug!("Connectivity probe {} failed: {}", host, e),
            Err(_) => debug!("Connectivity probe {} timed out", host),
        }
    }
    false
}

/// Available bytes on the disk holding `path` (longest matching mount point)
pub fn free_space_bytes(path: &Path) -> Option<u64> {
    let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let disks = Disks::new_with_refreshed_list();

    disks
        .list()
        .iter()
        .filter(|disk| path.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| disk.available_space())
}

/// Free space in GiB, if the disk could be identified
pub fn free_space_gb(path: &Path) -> Option<f64> {
    free_space_bytes(path).map(|bytes| bytes as f64 / GIB as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_space_is_plausible() {
        let dir = tempfile::tempdir().unwrap();
        // Containers may hide their mounts; only check the value when one is found
        if let Some(gb) = free_space_gb(dir.path()) {
            assert!(gb >= 0.0);
        }
    }

    #[tokio::test]
    async fn test_probe() {
        let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let closed_addr = closed.local_addr().unwrap().to_string();
        drop(closed);
        assert!(!probe(&[closed_addr.as_str()]).await);

        let open = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open_addr = open.local_addr().unwrap().to_string();
        assert!(probe(&[closed_addr.as_str(), open_addr.as_str()]).await);
    }
}
