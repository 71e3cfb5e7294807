//! Common helpers for gwcli tests
//!
//! Every run gets its own state directory so remembered defaults never leak
//! between tests or into the user's home.

use assert_cmd::Command;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const NODE_TYPE: &str = "PipeWire:Interface:Node";
pub const METADATA_TYPE: &str = "PipeWire:Interface:Metadata";

/// A scratch directory holding a script and the policy state.
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("tempdir"),
        }
    }

    pub fn state_dir(&self) -> PathBuf {
        self.dir.path().join("state")
    }

    pub fn state_file(&self) -> PathBuf {
        self.state_dir().join("default-nodes")
    }

    /// Write `lines` as a JSON-lines script and return its path.
    pub fn script(&self, lines: &[Value]) -> PathBuf {
        let path = self.dir.path().join("script.jsonl");
        let text: String = lines.iter().map(|line| format!("{}\n", line)).collect();
        fs::write(&path, text).expect("write script");
        path
    }

    /// `gwcli` with a private state dir and no ambient remote name.
    pub fn gwcli(&self) -> Command {
        let mut cmd = Command::cargo_bin("gwcli").expect("gwcli binary");
        cmd.env("GRAPHWATCH_STATE_DIR", self.state_dir())
            .env("GRAPHWATCH_LOG_LEVEL", "warn")
            .env_remove("GRAPHWATCH_REMOTE")
            .env_remove("GRAPHWATCH_CONFIG")
            .env_remove("GRAPHWATCH_SAVE_INTERVAL_MS")
            .env_remove("RUST_LOG");
        cmd
    }

    pub fn replay(&self, script: &Path) -> Command {
        let mut cmd = self.gwcli();
        cmd.arg("replay").arg(script);
        cmd
    }
}

pub fn command(line: &str) -> Value {
    json!({ "command": line })
}

pub fn deliver(event: Value) -> Value {
    json!({ "deliver": event })
}

/// Initial sync reply; the first sync of a connection is seq 0.
pub fn done(seq: u32) -> Value {
    deliver(json!({ "event": "done", "id": 0, "seq": seq }))
}

pub fn global(id: u32, type_tag: &str, props: Value) -> Value {
    deliver(json!({
        "event": "global",
        "id": id,
        "permissions": 0o700,
        "type": type_tag,
        "version": 3,
        "props": props,
    }))
}

pub fn node(id: u32, name: &str) -> Value {
    global(id, NODE_TYPE, json!({ "node.name": name, "media.class": "Audio/Sink" }))
}

pub fn default_metadata(id: u32) -> Value {
    global(id, METADATA_TYPE, json!({ "metadata.name": "default" }))
}
