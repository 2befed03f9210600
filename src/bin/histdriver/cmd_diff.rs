use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use histdriver::{new_record_refs, Snapshot};

fn load(path: &Path) -> Result<Snapshot> {
    let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    Snapshot::from_json(&bytes).with_context(|| format!("decode {}", path.display()))
}

/// Without --previous every record of CURRENT counts as new (first-cycle semantics).
pub fn exec(previous: Option<PathBuf>, current: PathBuf, json: bool) -> Result<()> {
    let prev = match previous {
        Some(p) => Some(load(&p)?),
        None => None,
    };
    let cur = load(&current)?;
    let fresh = new_record_refs(prev.as_ref(), &cur);

    if json {
        for r in &fresh {
            println!("{}", serde_json::to_string(r)?);
        }
        return Ok(());
    }

    println!("new records: {} of {}", fresh.len(), cur.len());
    for r in &fresh {
        println!("  {:<16} {}", r.id, r.label());
    }
    Ok(())
}
