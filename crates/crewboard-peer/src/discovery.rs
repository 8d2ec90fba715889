//! Local-server discovery through a workspace-relative JSON file, so a peer
//! started in the same project finds the running hub without flags.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const SERVER_INFO_PATH: &str = ".crewboard/server.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerInfo {
    pub addr: String,
}

pub fn write_server_info(addr: &str) -> std::io::Result<()> {
    write_server_info_in(Path::new("."), addr)
}

/// Atomic write: temp file in the same directory, then rename over the
/// target. Readers never observe a half-written file.
pub fn write_server_info_in(base: &Path, addr: &str) -> std::io::Result<()> {
    let path = base.join(SERVER_INFO_PATH);
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }

    let info = ServerInfo {
        addr: addr.to_string(),
    };
    let data = serde_json::to_vec_pretty(&info)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;

    let tmp = tmp_path(&path);
    std::fs::write(&tmp, data)?;
    restrict_mode(&tmp)?;
    std::fs::rename(&tmp, &path)
}

pub fn read_server_info() -> std::io::Result<ServerInfo> {
    read_server_info_in(Path::new("."))
}

pub fn read_server_info_in(base: &Path) -> std::io::Result<ServerInfo> {
    let data = std::fs::read(base.join(SERVER_INFO_PATH))?;
    serde_json::from_slice(&data)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))
}

/// Removed on clean shutdown so peers stop dialing a dead hub.
pub fn remove_server_info() -> std::io::Result<()> {
    remove_server_info_in(Path::new("."))
}

pub fn remove_server_info_in(base: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(base.join(SERVER_INFO_PATH)) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

#[cfg(unix)]
fn restrict_mode(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_mode(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
