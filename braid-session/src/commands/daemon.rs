use std::path::Path;

use braid_session::scheduler::ControlPlane;

pub fn start(project: &Path) -> anyhow::Result<u8> {
    let plane = ControlPlane::new(project);
    if plane.ensure()? {
        println!("Daemon started");
    } else {
        println!("Daemon already running (pid {})", plane.status().unwrap_or(0));
    }
    Ok(0)
}

pub fn stop(project: &Path) -> anyhow::Result<u8> {
    ControlPlane::new(project).stop()?;
    println!("Daemon stopped");
    Ok(0)
}

pub fn status(project: &Path) -> anyhow::Result<u8> {
    match ControlPlane::new(project).status() {
        Some(pid) => {
            println!("Daemon is running (pid {})", pid);
            Ok(0)
        }
        None => {
            println!("Daemon is not running");
            Ok(1)
        }
    }
}
