use crate::markers::poi::PoiId;
use fxhash::{FxHashMap, FxHashSet};
use std::path::PathBuf;

/// Per-map persistence for which markers the user has checked off.
///
/// Visited state is local-only; the backend never sees it.
pub trait VisitedStore {
    fn load(&self, map: &str) -> FxHashSet<PoiId>;
    fn save(&mut self, map: &str, visited: &FxHashSet<PoiId>);
}

/// In-memory store for tests and embedders with their own persistence
#[derive(Debug, Default)]
pub struct MemoryVisitedStore {
    maps: FxHashMap<String, FxHashSet<PoiId>>,
}

impl MemoryVisitedStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VisitedStore for MemoryVisitedStore {
    fn load(&self, map: &str) -> FxHashSet<PoiId> {
        self.maps.get(map).cloned().unwrap_or_default()
    }

    fn save(&mut self, map: &str, visited: &FxHashSet<PoiId>) {
        self.maps.insert(map.to_string(), visited.clone());
    }
}

/// JSON file store: `{ "<map>": ["<id>", ...], ... }`.
///
/// I/O failures are logged and otherwise ignored; losing visited flags must
/// never take the viewer down.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_all(&self) -> FxHashMap<String, Vec<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|err| {
                log::warn!("visited store {} is corrupt: {err}", self.path.display());
                FxHashMap::default()
            }),
            Err(_) => FxHashMap::default(),
        }
    }
}

impl VisitedStore for JsonFileStore {
    fn load(&self, map: &str) -> FxHashSet<PoiId> {
        self.read_all()
            .remove(map)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|raw| PoiId::try_from(raw).ok())
            .collect()
    }

    fn save(&mut self, map: &str, visited: &FxHashSet<PoiId>) {
        let mut all = self.read_all();
        let mut ids: Vec<String> = visited.iter().map(|id| id.to_string()).collect();
        ids.sort();
        all.insert(map.to_string(), ids);

        let result = serde_json::to_string_pretty(&all)
            .map_err(std::io::Error::other)
            .and_then(|text| std::fs::write(&self.path, text));
        if let Err(err) = result {
            log::warn!("failed to persist visited store {}: {err}", self.path.display());
        }
    }
}
