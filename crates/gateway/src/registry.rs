//! Agent registry: name → compiled schema, with a TTL cache.
//!
//! Resolution order on a cache miss: store row (`kind = "agent"`), then
//! code-defined built-ins, then (lazily, once) the on-disk schema
//! directory. Whatever non-store source resolves is upserted into the
//! store, so precedence stays stable: store rows win, built-ins are never
//! overwritten by disk files.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use uuid::Uuid;

use lucid_domain::config::RegistryConfig;
use lucid_domain::{Error, Result};
use lucid_schema::{builtin, AgentDocument, AgentSchema};
use lucid_store::{SchemaRow, Store};

/// Catalogue entry handed to routing classifiers.
#[derive(Debug, Clone)]
pub struct AgentCatalogueEntry {
    pub name: String,
    pub description: String,
}

type CacheKey = (String, Option<String>);

struct CacheEntry {
    schema: Arc<AgentSchema>,
    cached_at: Instant,
}

pub struct AgentRegistry {
    store: Arc<dyn Store>,
    config: RegistryConfig,
    cache: RwLock<HashMap<CacheKey, CacheEntry>>,
    /// Agent documents discovered in the schema directory. Scanned once,
    /// lazily, on the first cache miss that reaches the disk source.
    disk: OnceLock<HashMap<String, AgentDocument>>,
}

impl AgentRegistry {
    pub fn new(config: RegistryConfig, store: Arc<dyn Store>) -> Self {
        Self {
            store,
            config,
            cache: RwLock::new(HashMap::new()),
            disk: OnceLock::new(),
        }
    }

    fn ttl(&self) -> Duration {
        Duration::from_secs(self.config.cache_ttl_secs)
    }

    /// Resolve an agent by `(name, scope)`.
    ///
    /// Duplicate compiles under concurrent misses are tolerated; last
    /// insert wins.
    pub async fn resolve(&self, name: &str, scope: Option<&str>) -> Result<Arc<AgentSchema>> {
        let key: CacheKey = (name.to_owned(), scope.map(str::to_owned));

        // Lazy eviction on read.
        {
            let mut cache = self.cache.write();
            if let Some(entry) = cache.get(&key) {
                if entry.cached_at.elapsed() < self.ttl() {
                    return Ok(entry.schema.clone());
                }
                cache.remove(&key);
            }
        }

        let schema = Arc::new(self.load(name).await?);
        self.cache.write().insert(
            key,
            CacheEntry {
                schema: schema.clone(),
                cached_at: Instant::now(),
            },
        );
        Ok(schema)
    }

    /// Drop a cache entry so the next resolve reloads from the sources.
    pub fn invalidate(&self, name: &str, scope: Option<&str>) {
        self.cache
            .write()
            .remove(&(name.to_owned(), scope.map(str::to_owned)));
    }

    pub fn invalidate_all(&self) {
        self.cache.write().clear();
    }

    /// Agents known to the non-store sources, for routing catalogues.
    pub fn known_agents(&self) -> Vec<AgentCatalogueEntry> {
        let mut entries: Vec<AgentCatalogueEntry> = builtin::builtin_names()
            .into_iter()
            .filter_map(builtin::builtin)
            .map(|doc| AgentCatalogueEntry {
                name: doc.name,
                description: doc.description,
            })
            .collect();
        for doc in self.disk_agents().values() {
            if !entries.iter().any(|e| e.name == doc.name) {
                entries.push(AgentCatalogueEntry {
                    name: doc.name.clone(),
                    description: doc.description.clone(),
                });
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    async fn load(&self, name: &str) -> Result<AgentSchema> {
        if let Some(row) = self.store.fetch_schema(name, "agent").await? {
            return document_from_row(row).and_then(AgentSchema::build);
        }

        // Built-ins, then on-disk documents; register the winner so the
        // store becomes authoritative from here on.
        let document = builtin::builtin(name).or_else(|| self.disk_agents().get(name).cloned());
        let Some(document) = document else {
            return Err(Error::AgentNotFound(name.to_owned()));
        };

        let row = row_from_document(&document);
        self.store.upsert_schema(row).await?;
        tracing::info!(agent_name = name, "registered agent from non-store source");
        AgentSchema::build(document)
    }

    fn disk_agents(&self) -> &HashMap<String, AgentDocument> {
        self.disk
            .get_or_init(|| scan_schema_dir(Path::new(&self.config.schema_dir)))
    }
}

/// Rebuild the flat document from a store row. The `json_schema` column
/// holds the document verbatim; `content` and `description` fill in when
/// the document omits them.
pub fn document_from_row(row: SchemaRow) -> Result<AgentDocument> {
    let mut doc = AgentDocument::from_value(row.json_schema)?;
    if doc.system_prompt.is_empty() {
        doc.system_prompt = row.content;
    }
    if doc.description.is_empty() {
        doc.description = row.description;
    }
    Ok(doc)
}

pub fn row_from_document(doc: &AgentDocument) -> SchemaRow {
    SchemaRow {
        id: Uuid::new_v4(),
        name: doc.name.clone(),
        kind: "agent".into(),
        description: doc.description.clone(),
        content: doc.system_prompt.clone(),
        json_schema: doc.to_value(),
        tags: Vec::new(),
    }
}

/// Scan a directory for `*.yaml` / `*.yml` agent documents. Unparseable
/// files are logged and skipped; built-in names are never overridden.
fn scan_schema_dir(dir: &Path) -> HashMap<String, AgentDocument> {
    let mut agents = HashMap::new();
    if !dir.is_dir() {
        return agents;
    }
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "cannot read schema directory");
            return agents;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        if !path.is_file() || !is_yaml {
            continue;
        }
        match AgentDocument::from_path(&path) {
            Ok(doc) => {
                if builtin::builtin(&doc.name).is_some() {
                    tracing::warn!(
                        file = %path.display(),
                        agent_name = %doc.name,
                        "schema file shadows a built-in agent, skipping"
                    );
                    continue;
                }
                agents.insert(doc.name.clone(), doc);
            }
            Err(e) => {
                tracing::warn!(
                    file = %path.display(),
                    error = %e,
                    "skipping unparseable schema file"
                );
            }
        }
    }
    tracing::debug!(dir = %dir.display(), count = agents.len(), "schema directory scanned");
    agents
}
