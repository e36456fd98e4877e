use std::path::Path;

use braid_session::beads::tree::{build_tree, is_visible};
use braid_session::beads::{Bead, BeadClient, ExecBeadClient};

/// Render the bead dependency forest.
pub fn run(project: &Path, all: bool, json: bool) -> anyhow::Result<u8> {
    let client = ExecBeadClient::new(project);
    let beads = client.get_beads_with_deps()?;

    let visible: Vec<Bead> = if all {
        beads
    } else {
        beads.into_iter().filter(is_visible).collect()
    };

    let fetch = |id: &str| -> Option<Bead> { client.get_bead(id).ok().flatten() };
    let rows = build_tree(&visible, Some(&fetch));

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(0);
    }

    if rows.is_empty() {
        println!("No beads");
        return Ok(0);
    }

    for row in rows {
        let marker = if row.placeholder { " (closed parent)" } else { "" };
        println!(
            "{}{}  {} [{}]{}",
            row.prefix, row.bead.id, row.bead.title, row.bead.status, marker
        );
    }
    Ok(0)
}
