use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::errors::{RipenessError, Result};

/// Label used for detections whose class index has no entry in the mapping.
pub const UNKNOWN_LABEL: &str = "Unknown";

#[derive(Debug, Deserialize)]
struct MappingFile {
    names: Option<Names>,
    nc: Option<usize>,
}

/// Dataset files list names either as a sequence or as an index-keyed map.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Names {
    List(Vec<String>),
    Indexed(BTreeMap<usize, String>),
}

/// Class index to ripeness label, indices contiguous from 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMapping {
    labels: Vec<String>,
}

impl ClassMapping {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| RipenessError::ClassMapping {
            path: path.to_path_buf(),
            reason: "could not read mapping file".to_string(),
            source: Some(Box::new(e)),
        })?;
        let mapping = Self::parse(&text, path)?;
        debug!(path = %path.display(), classes = mapping.len(), "loaded class mapping");
        Ok(mapping)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Self::parse(text, Path::new("<inline>"))
    }

    fn parse(text: &str, path: &Path) -> Result<Self> {
        let error = |reason: String| RipenessError::ClassMapping {
            path: PathBuf::from(path),
            reason,
            source: None,
        };

        let file: MappingFile =
            serde_yaml::from_str(text).map_err(|e| RipenessError::ClassMapping {
                path: path.to_path_buf(),
                reason: "malformed YAML".to_string(),
                source: Some(Box::new(e)),
            })?;

        let labels = match file.names {
            None => return Err(error("missing `names` key".to_string())),
            Some(Names::List(labels)) => labels,
            Some(Names::Indexed(indexed)) => {
                if let Some((position, index)) = indexed
                    .keys()
                    .enumerate()
                    .find(|(position, index)| position != *index)
                {
                    return Err(error(format!(
                        "`names` indices must be contiguous from 0, expected {position} but found {index}"
                    )));
                }
                indexed.into_values().collect()
            }
        };

        if let Some(nc) = file.nc {
            if nc != labels.len() {
                return Err(error(format!(
                    "`nc` is {nc} but `names` has {} entries",
                    labels.len()
                )));
            }
        }

        Ok(Self { labels })
    }

    pub fn label(&self, class_index: usize) -> Option<&str> {
        self.labels.get(class_index).map(String::as_str)
    }

    /// Label for `class_index`, or `"Unknown"` when the mapping has no entry.
    pub fn resolve(&self, class_index: usize) -> &str {
        self.label(class_index).unwrap_or(UNKNOWN_LABEL)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.labels.iter().map(String::as_str).enumerate()
    }
}
