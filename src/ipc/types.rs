use std::collections::HashMap;
use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::autosave::SaveScheduler;
use crate::grid::{RoutineGrid, SlotKey};

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Open routine-editor session: one class's grid held in memory between
/// requests, with its debounced-save state and the drag-hover availability
/// cache (keyed by source and target cell, cleared on any mutation).
pub struct EditorSession {
    pub room_no: Option<String>,
    pub grid: RoutineGrid,
    pub scheduler: SaveScheduler,
    pub drop_cache: HashMap<(SlotKey, SlotKey), bool>,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub editor: Option<EditorSession>,
}
