use std::collections::HashSet;
use std::path::Path;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::{
    embedding::Embedding,
    error::{MatchError, Result},
};

const FORMAT_VERSION: u32 = 1;

/// A known child: identifier, embedding and the image the boundary serves for it.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildRecord {
    pub id: String,
    pub image: String,
    pub embedding: Embedding,
}

/// Read-only collection of child records sharing one embedding dimension.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingDatabase {
    records: Vec<ChildRecord>,
    dimension: Option<usize>,
}

/// On-disk binary layout: parallel metadata plus one embedding per row.
#[derive(Debug, Serialize, Deserialize)]
struct StoredDatabase {
    version: u32,
    ids: Vec<String>,
    images: Vec<String>,
    vectors: Array2<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct JsonDatabase {
    children: Vec<JsonChild>,
}

#[derive(Debug, Serialize, Deserialize)]
struct JsonChild {
    id: String,
    image: String,
    embedding: Vec<f32>,
}

impl EmbeddingDatabase {
    pub fn new(records: Vec<ChildRecord>) -> Result<Self> {
        let dimension =
            check_records(&records).map_err(|reason| MatchError::InvalidRecords { reason })?;
        Ok(Self { records, dimension })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Load from `path`; `.json` files use the JSON layout, anything else the binary one.
    pub fn load(path: &Path) -> Result<Self> {
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MatchError::DatabaseNotFound {
                    path: path.to_path_buf(),
                })
            }
            Err(source) => {
                return Err(MatchError::DatabaseRead {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let records = if is_json(path) {
            decode_json(path, &data)?
        } else {
            decode_binary(path, &data)?
        };
        let dimension =
            check_records(&records).map_err(|reason| MatchError::corrupt(path, reason))?;
        Ok(Self { records, dimension })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let write_err = |reason: String| MatchError::DatabaseWrite {
            path: path.to_path_buf(),
            reason,
        };

        let data = if is_json(path) {
            let doc = JsonDatabase {
                children: self
                    .records
                    .iter()
                    .map(|r| JsonChild {
                        id: r.id.clone(),
                        image: r.image.clone(),
                        embedding: r.embedding.to_vec(),
                    })
                    .collect(),
            };
            serde_json::to_vec_pretty(&doc).map_err(|e| write_err(e.to_string()))?
        } else {
            let dim = self.dimension.unwrap_or(0);
            let flat: Vec<f32> = self
                .records
                .iter()
                .flat_map(|r| r.embedding.vector().iter().copied())
                .collect();
            let vectors = Array2::from_shape_vec((self.records.len(), dim), flat)
                .map_err(|e| write_err(e.to_string()))?;
            let stored = StoredDatabase {
                version: FORMAT_VERSION,
                ids: self.records.iter().map(|r| r.id.clone()).collect(),
                images: self.records.iter().map(|r| r.image.clone()).collect(),
                vectors,
            };
            postcard::to_allocvec(&stored).map_err(|e| write_err(e.to_string()))?
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
        }
        std::fs::write(path, data).map_err(|e| write_err(e.to_string()))
    }

    /// All records, in stored order.
    pub fn all(&self) -> &[ChildRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Shared embedding dimension, `None` for an empty database.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }
}

/// Source of database snapshots for the matching service.
pub trait DatabaseLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<EmbeddingDatabase>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FileDatabaseLoader;

impl DatabaseLoader for FileDatabaseLoader {
    fn load(&self, path: &Path) -> Result<EmbeddingDatabase> {
        EmbeddingDatabase::load(path)
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("json"))
}

fn decode_binary(path: &Path, data: &[u8]) -> Result<Vec<ChildRecord>> {
    let stored: StoredDatabase = postcard::from_bytes(data)
        .map_err(|e| MatchError::corrupt(path, format!("undecodable payload: {e}")))?;
    if stored.version != FORMAT_VERSION {
        return Err(MatchError::corrupt(
            path,
            format!("unsupported format version {}", stored.version),
        ));
    }
    let rows = stored.vectors.nrows();
    if stored.ids.len() != rows || stored.images.len() != rows {
        return Err(MatchError::corrupt(
            path,
            format!(
                "{} ids and {} images for {} embeddings",
                stored.ids.len(),
                stored.images.len(),
                rows
            ),
        ));
    }

    stored
        .ids
        .into_iter()
        .zip(stored.images)
        .zip(stored.vectors.outer_iter())
        .map(|((id, image), row)| {
            let embedding = Embedding::from_array(row.to_owned())
                .map_err(|e| MatchError::corrupt(path, format!("child {id}: {e}")))?;
            Ok(ChildRecord {
                id,
                image,
                embedding,
            })
        })
        .collect()
}

fn decode_json(path: &Path, data: &[u8]) -> Result<Vec<ChildRecord>> {
    let doc: JsonDatabase = serde_json::from_slice(data)
        .map_err(|e| MatchError::corrupt(path, format!("malformed json: {e}")))?;
    doc.children
        .into_iter()
        .map(|child| {
            let embedding = Embedding::new(child.embedding)
                .map_err(|e| MatchError::corrupt(path, format!("child {}: {e}", child.id)))?;
            Ok(ChildRecord {
                id: child.id,
                image: child.image,
                embedding,
            })
        })
        .collect()
}

fn check_records(records: &[ChildRecord]) -> std::result::Result<Option<usize>, String> {
    let dimension = records.first().map(|r| r.embedding.dim());
    let mut seen = HashSet::with_capacity(records.len());
    for r in records {
        if Some(r.embedding.dim()) != dimension {
            return Err(format!(
                "child {} has dimension {}, expected {}",
                r.id,
                r.embedding.dim(),
                dimension.unwrap_or_default()
            ));
        }
        if !seen.insert(r.id.as_str()) {
            return Err(format!("duplicate child id {}", r.id));
        }
    }
    Ok(dimension)
}
