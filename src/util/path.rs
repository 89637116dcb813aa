//! Path conventions for collections and resources
//!
//! Every resource lives at `<root>/<collection>/<resource>.json`. Lookups go
//! through [`locate`], which tries a path as given and then with the `.json`
//! suffix, so callers may name a resource with or without its extension.

use std::ffi::OsString;
use std::fs::{self, Metadata};
use std::io;
use std::path::{Component, Path, PathBuf};

/// Suffix carried by every resource file
pub const JSON_SUFFIX: &str = ".json";

/// Suffix of the scratch file a write goes through before the rename
pub const TEMP_SUFFIX: &str = ".tmp";

/// Lexically normalize `path`: drop `.` segments and redundant separators,
/// fold `dir/..` pairs. The filesystem is not consulted.
pub fn clean(path: &Path) -> PathBuf {
  let mut out = PathBuf::new();
  for component in path.components() {
    match component {
      Component::CurDir => {}
      Component::ParentDir => match out.components().next_back() {
        Some(Component::Normal(_)) => {
          out.pop();
        }
        Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
        _ => out.push(".."),
      },
      other => out.push(other.as_os_str()),
    }
  }
  if out.as_os_str().is_empty() {
    PathBuf::from(".")
  } else {
    out
  }
}

/// Append `suffix` to the final component of `path` without touching any
/// existing extension (`john.json` + `.json` is `john.json.json`).
pub fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
  let mut raw: OsString = path.as_os_str().to_owned();
  raw.push(suffix);
  PathBuf::from(raw)
}

/// Resource name with one trailing `.json` removed
pub fn strip_json_suffix(resource: &str) -> &str {
  match resource.strip_suffix(JSON_SUFFIX) {
    Some(stem) if !stem.is_empty() => stem,
    _ => resource,
  }
}

/// Final on-disk location of `resource` inside `collection_dir`
pub fn resource_file(collection_dir: &Path, resource: &str) -> PathBuf {
  append_suffix(&collection_dir.join(strip_json_suffix(resource)), JSON_SUFFIX)
}

/// Sibling scratch file used while replacing `target`
pub fn temp_file(target: &Path) -> PathBuf {
  append_suffix(target, TEMP_SUFFIX)
}

/// Whether `path` names a leftover scratch file (`*.json.tmp`)
pub fn is_temp_file(path: &Path) -> bool {
  path
    .file_name()
    .and_then(|name| name.to_str())
    .is_some_and(|name| name.ends_with(".json.tmp"))
}

/// Lookup order for `base`: as given, then with `.json` appended
pub fn candidates(base: &Path) -> [PathBuf; 2] {
  [base.to_path_buf(), append_suffix(base, JSON_SUFFIX)]
}

/// Resolve `base` to the first existing candidate whose metadata passes
/// `accept`.
///
/// Returns `Ok(None)` when no candidate matches. Any stat failure other than
/// "not found" is returned as is and stops the search.
pub fn locate<F>(base: &Path, accept: F) -> io::Result<Option<(PathBuf, Metadata)>>
where
  F: Fn(&Metadata) -> bool,
{
  for candidate in candidates(base) {
    match fs::metadata(&candidate) {
      Ok(meta) if accept(&meta) => return Ok(Some((candidate, meta))),
      Ok(_) => continue,
      Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
      Err(e) => return Err(e),
    }
  }
  Ok(None)
}
