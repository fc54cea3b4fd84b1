//! Diagnostic JSON dump of the feed state.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use qf_core::{IngestionStats, Quote};
use serde::Serialize;

#[derive(Serialize)]
struct Dump<'a> {
    stats: &'a IngestionStats,
    snapshot: BTreeMap<&'a str, &'a Quote>,
}

/// Write `{"stats": .., "snapshot": {code: quote}}` to `path`, codes sorted.
pub fn write_dump(
    path: &Path,
    stats: &IngestionStats,
    snapshot: &HashMap<String, Arc<Quote>>,
) -> anyhow::Result<()> {
    let dump = Dump {
        stats,
        snapshot: snapshot.iter().map(|(k, v)| (k.as_str(), v.as_ref())).collect(),
    };

    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut out, &dump)?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use qf_core::{ConnectionState, Market};

    #[test]
    fn dump_contains_stats_and_sorted_snapshot() {
        let dir = std::env::temp_dir().join(format!("qf-export-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("dump.json");

        let mut snapshot = HashMap::new();
        for code in ["SZ000002", "SH600000"] {
            let mut q = Quote::empty(code, Market::MainA);
            q.last_price = 10.0;
            snapshot.insert(code.to_string(), Arc::new(q));
        }
        let stats = IngestionStats {
            frames_received: 7,
            connection_state: ConnectionState::Connected,
            ..Default::default()
        };

        write_dump(&path, &stats, &snapshot).unwrap();

        let v: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(v["stats"]["frames_received"], 7);
        let codes: Vec<_> = v["snapshot"].as_object().unwrap().keys().cloned().collect();
        assert_eq!(codes, ["SH600000", "SZ000002"]);
        assert_eq!(v["snapshot"]["SH600000"]["last_price"], 10.0);

        std::fs::remove_dir_all(&dir).ok();
    }
}
