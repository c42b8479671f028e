//! Frames: named, persisted projections over a collection.
//!
//! A frame pairs an ordered key list with extraction rules (a dot path and
//! an output label per column) and caches the derived objects, one per key,
//! in key order. The cache is never refreshed implicitly; call
//! [`Collection::frame_refresh`] or [`Collection::frame_reframe`] after the
//! underlying objects change.
//!
//! Frames are stored as `_frames/<name>.json` and listed in the collection
//! metadata.

use crate::collection::Collection;
use crate::dotpath::DotPath;
use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use shelfdb_storage::{normalize_key, write_atomic, ErrorKind};
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// A derived object: label to extracted value.
pub type FrameObject = Map<String, Value>;

/// A frame definition together with its materialized objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Name of the frame.
    pub frame_name: String,
    /// Name of the collection it was built from.
    pub collection_name: String,
    /// One dot path per column.
    pub dot_paths: Vec<String>,
    /// One label per column.
    pub labels: Vec<String>,
    /// Keys in frame order.
    pub keys: Vec<String>,
    /// Derived objects, parallel to `keys`.
    pub objects: Vec<FrameObject>,
    /// When the frame was defined.
    pub created: DateTime<Utc>,
    /// When the frame was last materialized.
    pub updated: DateTime<Utc>,
}

/// A frame definition without its objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameDef {
    /// Name of the frame.
    pub frame_name: String,
    /// Name of the collection it was built from.
    pub collection_name: String,
    /// One dot path per column.
    pub dot_paths: Vec<String>,
    /// One label per column.
    pub labels: Vec<String>,
    /// When the frame was defined.
    pub created: DateTime<Utc>,
    /// When the frame was last materialized.
    pub updated: DateTime<Utc>,
}

impl Frame {
    /// Returns the definition part of the frame.
    #[must_use]
    pub fn definition(&self) -> FrameDef {
        FrameDef {
            frame_name: self.frame_name.clone(),
            collection_name: self.collection_name.clone(),
            dot_paths: self.dot_paths.clone(),
            labels: self.labels.clone(),
            created: self.created,
            updated: self.updated,
        }
    }

    /// Flattens the objects into rows of values, one column per label.
    ///
    /// A label missing from an object renders as `""`.
    #[must_use]
    pub fn grid(&self, include_header: bool) -> Vec<Vec<Value>> {
        let mut rows = Vec::with_capacity(self.objects.len() + usize::from(include_header));
        if include_header {
            rows.push(self.labels.iter().cloned().map(Value::String).collect());
        }
        for object in &self.objects {
            rows.push(
                self.labels
                    .iter()
                    .map(|label| {
                        object
                            .get(label)
                            .cloned()
                            .unwrap_or_else(|| Value::String(String::new()))
                    })
                    .collect(),
            );
        }
        rows
    }
}

fn validate_frame_name(name: &str) -> CoreResult<()> {
    let invalid = name.trim().is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\', ':'])
        || name.chars().any(char::is_control);
    if invalid {
        return Err(CoreError::invalid_input(format!("invalid frame name {name:?}")));
    }
    Ok(())
}

struct Rules {
    paths: Vec<DotPath>,
    labels: Vec<String>,
}

impl Rules {
    fn new(dot_paths: &[String], labels: &[String]) -> CoreResult<Self> {
        let paths = dot_paths
            .iter()
            .map(|p| DotPath::parse(p))
            .collect::<CoreResult<Vec<_>>>()?;
        let labels = if labels.is_empty() {
            paths.iter().map(DotPath::label).collect()
        } else if labels.len() == paths.len() {
            labels.to_vec()
        } else {
            return Err(CoreError::invalid_input(format!(
                "{} dot paths but {} labels",
                paths.len(),
                labels.len()
            )));
        };
        let mut seen = BTreeSet::new();
        if let Some(duplicate) = labels.iter().find(|label| !seen.insert(label.as_str())) {
            return Err(CoreError::invalid_input(format!(
                "label {duplicate:?} is used more than once"
            )));
        }
        Ok(Self { paths, labels })
    }

    fn apply(&self, key: &str, document: &Value, verbose: bool) -> FrameObject {
        let mut object = FrameObject::new();
        for (path, label) in self.paths.iter().zip(&self.labels) {
            match path.eval(document) {
                Some(value) => {
                    object.insert(label.clone(), value);
                }
                None if verbose => warn!(key, path = %path, "dot path not found"),
                None => debug!(key, path = %path, "dot path not found"),
            }
        }
        object
    }
}

impl Collection {
    fn frame_path(&self, name: &str) -> PathBuf {
        self.dir.frames_dir().join(format!("{name}.json"))
    }

    fn write_frame(&self, frame: &Frame) -> CoreResult<()> {
        fs::create_dir_all(self.dir.frames_dir())?;
        let data = serde_json::to_vec_pretty(frame)?;
        write_atomic(&self.frame_path(&frame.frame_name), &data)?;
        Ok(())
    }

    /// Reads each key and derives its frame object; missing keys are skipped.
    fn materialize(
        &self,
        rules: &Rules,
        keys: &[String],
        verbose: bool,
    ) -> CoreResult<(Vec<String>, Vec<FrameObject>)> {
        let mut kept = Vec::with_capacity(keys.len());
        let mut objects = Vec::with_capacity(keys.len());
        for key in keys {
            let key = normalize_key(key);
            let document = match self.read(&key) {
                Ok(document) => document,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    if verbose {
                        warn!(key = %key, collection = %self.name(), "skipping missing key");
                    } else {
                        debug!(key = %key, collection = %self.name(), "skipping missing key");
                    }
                    continue;
                }
                Err(e) => return Err(e),
            };
            objects.push(rules.apply(&key, &document, verbose));
            kept.push(key);
        }
        Ok((kept, objects))
    }

    /// Defines and materializes a new frame.
    ///
    /// `labels` may be empty, in which case labels are derived from the
    /// dot paths. Keys not in the collection are skipped.
    ///
    /// # Errors
    ///
    /// Returns `FrameExists` if the name is taken, or an invalid input
    /// error for an empty key list, a bad dot path or a label count that
    /// does not match the dot paths.
    pub fn frame_create(
        &mut self,
        name: &str,
        keys: &[String],
        dot_paths: &[String],
        labels: &[String],
        verbose: bool,
    ) -> CoreResult<Frame> {
        validate_frame_name(name)?;
        if self.has_frame(name) {
            return Err(CoreError::frame_exists(name));
        }
        if keys.is_empty() {
            return Err(CoreError::invalid_input(format!("frame {name} needs at least one key")));
        }
        let rules = Rules::new(dot_paths, labels)?;
        let (keys, objects) = self.materialize(&rules, keys, verbose)?;

        let now = Utc::now();
        let frame = Frame {
            frame_name: name.to_string(),
            collection_name: self.name().to_string(),
            dot_paths: dot_paths.to_vec(),
            labels: rules.labels,
            keys,
            objects,
            created: now,
            updated: now,
        };
        self.write_frame(&frame)?;
        self.meta.frames.insert(name.to_string());
        self.dir.save_meta(&self.meta)?;
        info!(frame = name, keys = frame.keys.len(), "created frame");
        Ok(frame)
    }

    /// Returns true if a frame with this name is stored.
    #[must_use]
    pub fn has_frame(&self, name: &str) -> bool {
        validate_frame_name(name).is_ok() && self.frame_path(name).is_file()
    }

    /// Lists the frame names recorded in the metadata, sorted.
    #[must_use]
    pub fn frame_names(&self) -> Vec<String> {
        self.meta.frames.iter().cloned().collect()
    }

    /// Reads a frame.
    ///
    /// # Errors
    ///
    /// Returns `FrameNotFound` if no such frame is stored.
    pub fn frame(&self, name: &str) -> CoreResult<Frame> {
        if !self.has_frame(name) {
            return Err(CoreError::frame_not_found(name));
        }
        let data = fs::read(self.frame_path(name))?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Returns the definition of a frame.
    ///
    /// # Errors
    ///
    /// Returns `FrameNotFound` if no such frame is stored.
    pub fn frame_def(&self, name: &str) -> CoreResult<FrameDef> {
        Ok(self.frame(name)?.definition())
    }

    /// Returns the keys of a frame, in frame order.
    ///
    /// # Errors
    ///
    /// Returns `FrameNotFound` if no such frame is stored.
    pub fn frame_keys(&self, name: &str) -> CoreResult<Vec<String>> {
        Ok(self.frame(name)?.keys)
    }

    /// Returns the cached objects of a frame, in frame order.
    ///
    /// # Errors
    ///
    /// Returns `FrameNotFound` if no such frame is stored.
    pub fn frame_objects(&self, name: &str) -> CoreResult<Vec<FrameObject>> {
        Ok(self.frame(name)?.objects)
    }

    /// Returns the cached objects of a frame as rows, see [`Frame::grid`].
    ///
    /// # Errors
    ///
    /// Returns `FrameNotFound` if no such frame is stored.
    pub fn frame_grid(&self, name: &str, include_header: bool) -> CoreResult<Vec<Vec<Value>>> {
        Ok(self.frame(name)?.grid(include_header))
    }

    /// Overwrites a stored frame with caller-edited content.
    ///
    /// # Errors
    ///
    /// Returns `FrameNotFound` if the frame does not exist, or an invalid
    /// input error if keys and objects are not parallel.
    pub fn save_frame(&mut self, frame: &Frame) -> CoreResult<()> {
        if !self.has_frame(&frame.frame_name) {
            return Err(CoreError::frame_not_found(&frame.frame_name));
        }
        if frame.keys.len() != frame.objects.len() {
            return Err(CoreError::invalid_input(format!(
                "frame {} has {} keys but {} objects",
                frame.frame_name,
                frame.keys.len(),
                frame.objects.len()
            )));
        }
        self.write_frame(frame)
    }

    /// Re-derives every object of a frame from current collection state.
    ///
    /// Keys that are no longer in the collection drop out of the frame.
    /// O(n) reads in the frame's key count.
    ///
    /// # Errors
    ///
    /// Returns `FrameNotFound`, or a storage error other than a missing key.
    pub fn frame_refresh(&mut self, name: &str, verbose: bool) -> CoreResult<()> {
        let mut frame = self.frame(name)?;
        let rules = Rules::new(&frame.dot_paths, &frame.labels)?;
        let before = frame.keys.len();
        let (keys, objects) = self.materialize(&rules, &frame.keys, verbose)?;
        frame.keys = keys;
        frame.objects = objects;
        frame.updated = Utc::now();
        self.write_frame(&frame)?;
        debug!(frame = name, dropped = before - frame.keys.len(), "refreshed frame");
        Ok(())
    }

    /// Replaces the key list of a frame and rebuilds its objects.
    ///
    /// Keys not in the collection are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns `FrameNotFound`, or a storage error other than a missing key.
    pub fn frame_reframe(&mut self, name: &str, keys: &[String], verbose: bool) -> CoreResult<()> {
        let mut frame = self.frame(name)?;
        let rules = Rules::new(&frame.dot_paths, &frame.labels)?;
        let (keys, objects) = self.materialize(&rules, keys, verbose)?;
        frame.keys = keys;
        frame.objects = objects;
        frame.updated = Utc::now();
        self.write_frame(&frame)?;
        debug!(frame = name, keys = frame.keys.len(), "reframed");
        Ok(())
    }

    /// Empties the key list and objects of a frame, keeping its definition.
    ///
    /// # Errors
    ///
    /// Returns `FrameNotFound` if no such frame is stored.
    pub fn frame_clear(&mut self, name: &str) -> CoreResult<()> {
        let mut frame = self.frame(name)?;
        frame.keys.clear();
        frame.objects.clear();
        frame.updated = Utc::now();
        self.write_frame(&frame)
    }

    /// Removes a frame.
    ///
    /// # Errors
    ///
    /// Returns `FrameNotFound` if no such frame is stored.
    pub fn frame_delete(&mut self, name: &str) -> CoreResult<()> {
        if !self.has_frame(name) {
            return Err(CoreError::frame_not_found(name));
        }
        fs::remove_file(self.frame_path(name))?;
        self.meta.frames.remove(name);
        self.dir.save_meta(&self.meta)?;
        info!(frame = name, "deleted frame");
        Ok(())
    }
}
