use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use monitor_ingest::default_monitor_dir;

const LAST_USED_FILE_NAME: &str = "last_used.json";

/// Flags remembered between runs. Every field is optional so a file written
/// by an older build still loads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LastUsed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_rate: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_hour: Option<u8>,
}

pub fn last_used_path() -> PathBuf {
    default_monitor_dir().join(LAST_USED_FILE_NAME)
}

/// Absence or corruption of the file is never an error; defaults win.
pub fn load_last_used() -> LastUsed {
    match fs::read_to_string(last_used_path()) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
        Err(_) => LastUsed::default(),
    }
}

pub fn save_last_used(last_used: &LastUsed) -> Result<(), String> {
    let path = last_used_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| format!("create config dir {}: {}", parent.display(), err))?;
    }
    let contents = serde_json::to_string_pretty(last_used)
        .map_err(|err| format!("serialize last used flags: {}", err))?;
    fs::write(&path, contents).map_err(|err| format!("write {}: {}", path.display(), err))
}
