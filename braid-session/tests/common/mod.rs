use std::path::Path;

/// The braid CLI binary, ready to run against a scratch project.
///
/// BRAID_DAEMON_BIN points at /bin/false so scheduling commands never spawn
/// a real control plane during tests.
pub fn braid_cmd(project: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::cargo_bin("braid").expect("braid binary");
    cmd.arg("--project").arg(project);
    cmd.env("BRAID_DAEMON_BIN", "/bin/false");
    cmd
}

/// Write an executable fixture script and return its path.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}
