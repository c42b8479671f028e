//! Consistency checking and repair.
//!
//! [`analyze`] and [`check`] never write. [`repair`] is the only operation
//! allowed to change a collection in response to what the walk found, and
//! is best effort: it rebuilds indexes from what is on disk, it does not
//! recover lost objects.

use crate::collection::resolve_dsn;
use crate::config::DSN_ENV_VAR;
use crate::dir::{CollectionDir, FRAMES_DIR, METADATA_FILE};
use crate::error::{CoreError, CoreResult};
use crate::metadata::CollectionMeta;
use shelfdb_storage::{
    classify_file_name, is_normalized, object_file_name, pairtree, read_keymap, write_keymap,
    Dsn, KeyMap, SqlEngine, StorageEngine, StorageType, TreeFile, KEYMAP_FILE, PAIRTREE_DIR,
    SQLITE_SCHEME,
};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Findings of a consistency walk.
///
/// Errors are problems the collection cannot be used with; warnings are
/// recoverable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    /// Unrecoverable problems.
    pub errors: Vec<String>,
    /// Recoverable problems.
    pub warnings: Vec<String>,
}

impl CheckReport {
    /// Returns true if no errors were found.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, message: String) {
        self.errors.push(message);
    }

    fn warning(&mut self, message: String) {
        self.warnings.push(message);
    }

    fn log(&self, path: &Path) {
        for error in &self.errors {
            warn!(path = %path.display(), "{error}");
        }
        for warning in &self.warnings {
            info!(path = %path.display(), "{warning}");
        }
    }
}

/// An object file found while walking the pairtree.
#[derive(Debug, Clone)]
struct FoundObject {
    key: String,
    /// Relative pairtree path, `/` separated with a trailing `/`.
    rel: String,
    modified: SystemTime,
}

fn walk_pairtree(root: &Path) -> CoreResult<Vec<FoundObject>> {
    let mut found = Vec::new();
    if root.is_dir() {
        walk_dir(root, String::new(), &mut found)?;
    }
    Ok(found)
}

fn walk_dir(dir: &Path, rel: String, found: &mut Vec<FoundObject>) -> CoreResult<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk_dir(&entry.path(), format!("{rel}{name}/"), found)?;
        } else if let Some(TreeFile::Object { key }) = classify_file_name(&name) {
            found.push(FoundObject {
                key,
                rel: rel.clone(),
                modified: entry.metadata()?.modified()?,
            });
        }
    }
    Ok(())
}

fn same_rel(a: &str, b: &str) -> bool {
    a.trim_end_matches('/') == b.trim_end_matches('/')
}

/// Reports keys that are not lowercase and keys that differ only by case.
fn check_keys<'a>(keys: impl IntoIterator<Item = &'a String>, report: &mut CheckReport) {
    let mut folded: BTreeMap<String, Vec<&str>> = BTreeMap::new();
    for key in keys {
        if !is_normalized(key) {
            report.warning(format!("key {key:?} is not normalized"));
        }
        folded.entry(key.to_lowercase()).or_default().push(key);
    }
    for (normal, variants) in folded {
        if variants.len() > 1 {
            report.warning(format!("keys {variants:?} collide as {normal:?}"));
        }
    }
}

/// Guesses the metadata of a collection whose `collection.json` is unusable.
///
/// A `pairtree/` directory or a key map means a tree collection. Otherwise
/// the first SQLite file in the directory, then `SHELFDB_DSN_URI`, mean a
/// relational one. Returns `None` when nothing points to either backend.
fn infer_meta(dir: &CollectionDir) -> CoreResult<Option<CollectionMeta>> {
    let path = dir.path();
    if path.join(PAIRTREE_DIR).is_dir() || path.join(KEYMAP_FILE).is_file() {
        return Ok(Some(CollectionMeta::new(dir.name(), StorageType::Tree)));
    }
    let mut databases = Vec::new();
    for entry in fs::read_dir(path)? {
        let path = entry?.path();
        let is_db = path
            .extension()
            .is_some_and(|ext| ext == "sqlite" || ext == "db");
        if is_db && path.is_file() {
            databases.push(path);
        }
    }
    databases.sort();
    let dsn_uri = match databases.first().and_then(|p| p.file_name()) {
        Some(file) => format!("{SQLITE_SCHEME}://{}", file.to_string_lossy()),
        None if std::env::var(DSN_ENV_VAR).is_ok_and(|uri| !uri.trim().is_empty()) => {
            String::new()
        }
        None => return Ok(None),
    };
    let mut meta = CollectionMeta::new(dir.name(), StorageType::Relational);
    meta.dsn_uri = dsn_uri;
    Ok(Some(meta))
}

fn check_tree(dir: &Path, report: &mut CheckReport) -> CoreResult<()> {
    let keymap_path = dir.join(KEYMAP_FILE);
    let keymap = if keymap_path.is_file() {
        match read_keymap(&keymap_path) {
            Ok(keymap) => Some(keymap),
            Err(e) => {
                report.error(format!("{KEYMAP_FILE} does not parse: {e}"));
                None
            }
        }
    } else {
        report.error(format!("{KEYMAP_FILE} is missing"));
        None
    };

    let root = dir.join(PAIRTREE_DIR);
    if !root.is_dir() {
        report.error(format!("{PAIRTREE_DIR}/ is missing"));
    }
    let found = walk_pairtree(&root)?;

    let Some(keymap) = keymap else {
        return Ok(());
    };
    for (key, rel) in &keymap {
        if !same_rel(rel, &pairtree::encode(key)) {
            report.warning(format!(
                "key {key:?} is indexed at {rel:?}, expected {:?}",
                pairtree::encode(key)
            ));
        }
        let object = root.join(rel).join(object_file_name(key));
        if !object.is_file() {
            report.error(format!("key {key:?} has no object file at {}", object.display()));
        }
    }
    for object in &found {
        let indexed = keymap
            .get(&object.key)
            .is_some_and(|rel| same_rel(rel, &object.rel));
        if !indexed {
            report.error(format!(
                "object file for {:?} at {:?} is not in the key map",
                object.key, object.rel
            ));
        }
    }
    check_keys(keymap.keys(), report);
    Ok(())
}

fn check_relational(dir: &Path, dsn: &Dsn, report: &mut CheckReport) {
    let engine = match SqlEngine::open_read_only(dir, dsn) {
        Ok(engine) => engine,
        Err(e) => {
            report.error(format!("cannot open {dsn}: {e}"));
            return;
        }
    };
    match engine.keys() {
        Ok(keys) => check_keys(&keys, report),
        Err(e) => report.error(format!("cannot list keys of {}: {e}", engine.table())),
    }
}

fn frame_files(dir: &Path) -> CoreResult<BTreeSet<String>> {
    let frames_dir = dir.join(FRAMES_DIR);
    let mut names = BTreeSet::new();
    if !frames_dir.is_dir() {
        return Ok(names);
    }
    for entry in fs::read_dir(&frames_dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            if let Some(stem) = path.file_stem() {
                names.insert(stem.to_string_lossy().into_owned());
            }
        }
    }
    Ok(names)
}

fn check_frames(dir: &Path, meta: &CollectionMeta, report: &mut CheckReport) -> CoreResult<()> {
    let on_disk = frame_files(dir)?;
    for name in meta.frames.difference(&on_disk) {
        report.warning(format!("frame {name:?} is listed but has no file"));
    }
    for name in on_disk.difference(&meta.frames) {
        report.warning(format!("frame file {name:?} is not listed in {METADATA_FILE}"));
    }
    Ok(())
}

/// Walks a collection and reports what is wrong with it. Never writes.
///
/// O(n) in the number of objects, plus a full pairtree walk for the tree
/// backend.
///
/// # Errors
///
/// Returns `CollectionNotFound` if the directory does not exist, or an I/O
/// error if the walk itself fails. Problems with the collection are
/// reported in the returned [`CheckReport`].
pub fn analyze(path: impl AsRef<Path>) -> CoreResult<CheckReport> {
    let dir = CollectionDir::existing(path.as_ref())?;
    let mut report = CheckReport::default();

    let meta = if dir.metadata_path().is_file() {
        match dir.load_meta() {
            Ok(meta) => Some(meta),
            Err(e) => {
                report.error(format!("{METADATA_FILE} does not parse: {e}"));
                None
            }
        }
    } else {
        report.error(format!("{METADATA_FILE} is missing"));
        None
    };

    let effective = match &meta {
        Some(meta) => Some(meta.clone()),
        None => infer_meta(&dir)?,
    };
    match effective {
        None => report.error(format!(
            "cannot infer storage type: no {PAIRTREE_DIR}/, {KEYMAP_FILE} or database file, \
             and {DSN_ENV_VAR} is not set"
        )),
        Some(effective) => match effective.storage_type {
            StorageType::Tree => check_tree(dir.path(), &mut report)?,
            StorageType::Relational => match resolve_dsn(&effective) {
                Ok(dsn) => check_relational(dir.path(), &dsn, &mut report),
                Err(e) => report.error(format!("no usable DSN: {e}")),
            },
        },
    }

    if let Some(meta) = &meta {
        check_frames(dir.path(), meta, &mut report)?;
    }
    debug!(
        path = %dir.path().display(),
        errors = report.errors.len(),
        warnings = report.warnings.len(),
        "analyzed collection"
    );
    Ok(report)
}

/// Checks a collection, failing if any error was found.
///
/// With `verbose` set every finding is logged.
///
/// # Errors
///
/// Returns `Inconsistent` with the error and warning counts when the walk
/// found errors, or any error of [`analyze`].
pub fn check(path: impl AsRef<Path>, verbose: bool) -> CoreResult<CheckReport> {
    let path = path.as_ref();
    let report = analyze(path)?;
    if verbose {
        report.log(path);
    }
    if !report.is_ok() {
        return Err(CoreError::Inconsistent {
            path: path.display().to_string(),
            errors: report.errors.len(),
            warnings: report.warnings.len(),
        });
    }
    Ok(report)
}

/// Rebuilds the key map of a tree collection from its pairtree.
///
/// When a key is found in more than one place, the most recently modified
/// object file wins.
fn rebuild_keymap(dir: &Path, verbose: bool) -> CoreResult<usize> {
    let root = dir.join(PAIRTREE_DIR);
    fs::create_dir_all(&root)?;

    let mut newest: BTreeMap<String, FoundObject> = BTreeMap::new();
    for object in walk_pairtree(&root)? {
        match newest.get(&object.key) {
            Some(seen) if seen.modified >= object.modified => {
                if verbose {
                    warn!(key = %object.key, ignored = %object.rel, "duplicate object file");
                }
            }
            _ => {
                newest.insert(object.key.clone(), object);
            }
        }
    }

    let keymap: KeyMap = newest
        .into_iter()
        .map(|(key, object)| (key, object.rel))
        .collect();
    write_keymap(dir, &keymap)?;
    Ok(keymap.len())
}

/// Repairs what can be repaired, then checks the collection again.
///
/// Regenerates `collection.json` when it is missing or unparseable,
/// inferring the backend from the directory contents. When the backend
/// cannot be inferred nothing is written and the check fails. Rebuilds the key map
/// of a tree collection from the pairtree, and reconciles the frame list
/// in the metadata with the frame files on disk.
///
/// # Errors
///
/// Returns `CollectionNotFound` if the directory does not exist, an I/O or
/// database error if a repair step fails, or `Inconsistent` if errors
/// remain afterwards.
pub fn repair(path: impl AsRef<Path>, verbose: bool) -> CoreResult<CheckReport> {
    let dir = CollectionDir::existing(path.as_ref())?;

    let mut meta = match dir.load_meta() {
        Ok(meta) => meta,
        Err(e) => match infer_meta(&dir)? {
            Some(meta) => {
                warn!(
                    path = %dir.path().display(),
                    error = %e,
                    storage = %meta.storage_type,
                    "regenerating collection metadata"
                );
                meta
            }
            None => {
                warn!(
                    path = %dir.path().display(),
                    error = %e,
                    "cannot infer storage type, leaving collection untouched"
                );
                return check(dir.path(), verbose);
            }
        },
    };

    match meta.storage_type {
        StorageType::Tree => {
            let keys = rebuild_keymap(dir.path(), verbose)?;
            info!(path = %dir.path().display(), keys, "rebuilt key map");
        }
        StorageType::Relational => {
            let dsn = resolve_dsn(&meta)?;
            drop(SqlEngine::open(dir.path(), &dsn)?);
        }
    }

    let frames = frame_files(dir.path())?;
    if frames != meta.frames {
        info!(path = %dir.path().display(), frames = frames.len(), "reconciled frame list");
        meta.frames = frames;
    }
    dir.save_meta(&meta)?;

    check(dir.path(), verbose)
}
