use std::collections::HashMap;
use std::fs::{self, Metadata};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{Dispatch, Level, debug, dispatcher, trace};

use crate::encoding;
use crate::error::{Result, StoreError};
use crate::util::path;

/// Store format version
pub const VERSION: &str = "1.0.0";

/// Options for [`Store::open`]
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Sink for the store's own log events. A console logger at `INFO` is
    /// used when unset.
    pub logger: Option<Dispatch>,
    /// Remove stray `*.json.tmp` files left by interrupted writes on open
    pub sweep_temp_files: bool,
}

impl Options {
    pub fn with_logger(mut self, logger: Dispatch) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn sweep_temp_files(mut self, enabled: bool) -> Self {
        self.sweep_temp_files = enabled;
        self
    }
}

/// Directory-backed JSON document store.
///
/// Every resource is a file at `<root>/<collection>/<resource>.json`. Writes
/// and deletes are serialized per collection; reads take no lock and rely on
/// writes replacing files with an atomic rename.
pub struct Store {
    root: PathBuf,
    /// One lock per collection name, created on first touch and never removed
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    logger: Dispatch,
}

impl Store {
    /// Open the store rooted at `root`, creating the directory if needed
    pub fn open(root: impl AsRef<Path>, options: Options) -> Result<Self> {
        let root = path::clean(root.as_ref());
        let logger = options.logger.unwrap_or_else(console_logger);

        let store = Self {
            root,
            locks: Mutex::new(HashMap::new()),
            logger,
        };

        match fs::metadata(&store.root) {
            Ok(meta) if meta.is_dir() => {
                store.log(|| debug!("Using '{}' (database already exists)", store.root.display()));
            }
            _ => {
                store.log(|| debug!("Creating the database at '{}'...", store.root.display()));
                create_dir_all(&store.root)?;
            }
        }

        if options.sweep_temp_files {
            let removed = store.sweep_temp_files()?;
            store.log(|| debug!(removed, "swept leftover temp files"));
        }

        Ok(store)
    }

    /// Normalized root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist `value` as `<collection>/<resource>.json`, replacing any
    /// previous version atomically
    pub fn write<T: Serialize + ?Sized>(
        &self,
        collection: &str,
        resource: &str,
        value: &T,
    ) -> Result<()> {
        if collection.is_empty() {
            return Err(StoreError::InvalidArgument(
                "missing collection - no place to save record",
            ));
        }
        if resource.is_empty() {
            return Err(StoreError::InvalidArgument(
                "missing resource - unable to save record (no name)",
            ));
        }

        let bytes = encoding::encode(value)?;

        let lock = self.collection_lock(collection);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let dir = self.root.join(collection);
        create_dir_all(&dir)?;

        let target = path::resource_file(&dir, resource);
        let tmp = path::temp_file(&target);
        write_file(&tmp, &bytes)?;
        fs::rename(&tmp, &target).map_err(|e| StoreError::io(&target, e))?;

        self.log(|| trace!(collection, resource, bytes = bytes.len(), "write"));
        Ok(())
    }

    /// Read and decode a single resource
    pub fn read<T: DeserializeOwned>(&self, collection: &str, resource: &str) -> Result<T> {
        if collection.is_empty() {
            return Err(StoreError::InvalidArgument("missing collection - unable to read"));
        }
        if resource.is_empty() {
            return Err(StoreError::InvalidArgument(
                "missing resource - unable to read record (no name)",
            ));
        }

        let base = self.root.join(collection).join(resource);
        let (file, _) = resolve(&base, Metadata::is_file)?
            .ok_or_else(|| not_found(collection, resource))?;

        // deleted since it was resolved
        let bytes = read_file(&file)?.ok_or_else(|| not_found(collection, resource))?;
        self.log(|| trace!(collection, resource, path = %file.display(), "read"));
        encoding::decode(&bytes)
    }

    /// Raw text of every resource in `collection`, in directory order
    pub fn read_all(&self, collection: &str) -> Result<Vec<String>> {
        if collection.is_empty() {
            return Err(StoreError::InvalidArgument("missing collection - unable to read"));
        }

        let base = self.root.join(collection);
        let (dir, _) = resolve(&base, Metadata::is_dir)?
            .ok_or_else(|| StoreError::NotFound(collection.to_string()))?;

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(collection.to_string()));
            }
            Err(e) => return Err(StoreError::io(&dir, e)),
        };
        let mut records = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&dir, e))?;
            let file = entry.path();
            if path::is_temp_file(&file) {
                continue;
            }
            // a resource deleted mid-listing is no longer part of the collection
            let Some(bytes) = read_file(&file)? else {
                continue;
            };
            let text = String::from_utf8(bytes)
                .map_err(|e| StoreError::io(&file, io::Error::new(io::ErrorKind::InvalidData, e)))?;
            records.push(text);
        }

        self.log(|| trace!(collection, count = records.len(), "read all"));
        Ok(records)
    }

    /// [`Store::read_all`] followed by decoding each record as `T`
    pub fn read_all_as<T: DeserializeOwned>(&self, collection: &str) -> Result<Vec<T>> {
        self.read_all(collection)?
            .iter()
            .map(|text| encoding::decode(text.as_bytes()))
            .collect()
    }

    /// Delete one resource, or the whole collection when `resource` is empty
    pub fn delete(&self, collection: &str, resource: &str) -> Result<()> {
        if collection.is_empty() {
            return Err(StoreError::InvalidArgument("missing collection - unable to delete"));
        }

        let lock = self.collection_lock(collection);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let base = if resource.is_empty() {
            self.root.join(collection)
        } else {
            self.root.join(collection).join(resource)
        };

        let (target, meta) = resolve(&base, |_| true)?
            .ok_or_else(|| not_found(collection, resource))?;

        if meta.is_dir() {
            fs::remove_dir_all(&target).map_err(|e| StoreError::io(&target, e))?;
        } else {
            fs::remove_file(&target).map_err(|e| StoreError::io(&target, e))?;
        }

        self.log(|| trace!(collection, resource, path = %target.display(), "delete"));
        Ok(())
    }

    /// Remove `*.json.tmp` files directly inside each collection directory,
    /// returning how many were removed
    pub fn sweep_temp_files(&self) -> Result<usize> {
        let mut removed = 0;
        let collections = fs::read_dir(&self.root).map_err(|e| StoreError::io(&self.root, e))?;
        for collection in collections {
            let collection = collection.map_err(|e| StoreError::io(&self.root, e))?;
            let dir = collection.path();
            if !dir.is_dir() {
                continue;
            }

            let lock = self.collection_lock(&collection.file_name().to_string_lossy());
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

            let entries = fs::read_dir(&dir).map_err(|e| StoreError::io(&dir, e))?;
            for entry in entries {
                let file = entry.map_err(|e| StoreError::io(&dir, e))?.path();
                if path::is_temp_file(&file) && file.is_file() {
                    fs::remove_file(&file).map_err(|e| StoreError::io(&file, e))?;
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    fn collection_lock(&self, collection: &str) -> Arc<Mutex<()>> {
        // guarded data is unit, a poisoned lock carries no broken state
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(collection.to_string()).or_default())
    }

    fn log<F: FnOnce()>(&self, f: F) {
        dispatcher::with_default(&self.logger, f)
    }

    #[cfg(test)]
    fn lock_count(&self) -> usize {
        self.locks.lock().unwrap().len()
    }
}

fn console_logger() -> Dispatch {
    Dispatch::new(tracing_subscriber::fmt().with_max_level(Level::INFO).finish())
}

fn not_found(collection: &str, resource: &str) -> StoreError {
    StoreError::NotFound(Path::new(collection).join(resource).display().to_string())
}

fn resolve<F>(base: &Path, accept: F) -> Result<Option<(PathBuf, Metadata)>>
where
    F: Fn(&Metadata) -> bool,
{
    path::locate(base, accept).map_err(|e| StoreError::io(base, e))
}

/// Contents of `file`, or `None` if it no longer exists
fn read_file(file: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(file) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::io(file, e)),
    }
}

fn create_dir_all(dir: &Path) -> Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o755);
    }
    builder.create(dir).map_err(|e| StoreError::io(dir, e))
}

fn write_file(file: &Path, bytes: &[u8]) -> Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o644);
    }
    let mut handle = options.open(file).map_err(|e| StoreError::io(file, e))?;
    handle.write_all(bytes).map_err(|e| StoreError::io(file, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde::Deserialize;
    use serde_json::{Value, json};
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct User {
        name: String,
        age: u32,
    }

    fn open_store() -> (TempDir, Store) {
        let tmp = TempDir::new().unwrap();
        let store = Store::open(tmp.path().join("db"), Options::default()).unwrap();
        (tmp, store)
    }

    #[test]
    fn test_open_creates_and_reuses_root() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("a").join("b");

        let store = Store::open(&root, Options::default()).unwrap();
        assert!(root.is_dir());
        store.write("users", "john", &json!({"name": "John"})).unwrap();

        let reopened = Store::open(&root, Options::default()).unwrap();
        let value: Value = reopened.read("users", "john").unwrap();
        assert_eq!(value["name"], "John");
    }

    #[test]
    fn test_open_normalizes_root() {
        let tmp = TempDir::new().unwrap();
        let messy = tmp.path().join("x").join("..").join("db").join(".");
        let store = Store::open(&messy, Options::default()).unwrap();
        assert_eq!(store.root(), tmp.path().join("db"));
    }

    #[test]
    fn test_open_fails_when_root_is_a_file() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("db");
        fs::write(&file, b"x").unwrap();

        let err = Store::open(&file, Options::default()).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::IoFailure);
    }

    #[test]
    fn test_write_then_read() {
        let (_tmp, store) = open_store();
        let john = User {
            name: "John".into(),
            age: 23,
        };
        store.write("users", "john", &john).unwrap();

        let read: User = store.read("users", "john").unwrap();
        assert_eq!(read, john);
    }

    #[test]
    fn test_write_layout_on_disk() {
        let (_tmp, store) = open_store();
        store.write("users", "john", &json!({"age": 23})).unwrap();

        let file = store.root().join("users").join("john.json");
        let text = fs::read_to_string(&file).unwrap();
        assert_eq!(text, "{\n  \"age\": 23\n}\n");
        assert!(!store.root().join("users").join("john.json.tmp").exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&file).unwrap().permissions().mode();
            assert_eq!(mode & 0o777 & !0o022, 0o644 & !0o022);
        }
    }

    #[test]
    fn test_write_overwrites() {
        let (_tmp, store) = open_store();
        store.write("users", "john", &json!({"age": 23})).unwrap();
        store.write("users", "john", &json!({"age": 24})).unwrap();

        let value: Value = store.read("users", "john").unwrap();
        assert_eq!(value, json!({"age": 24}));
        assert_eq!(store.read_all("users").unwrap().len(), 1);
    }

    #[test]
    fn test_write_missing_names() {
        let (_tmp, store) = open_store();

        let err = store.write("", "john", &json!({})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(err.to_string().contains("collection"));

        let err = store.write("users", "", &json!({})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(err.to_string().contains("resource"));

        // nothing touched disk
        assert_eq!(fs::read_dir(store.root()).unwrap().count(), 0);
        assert_eq!(store.lock_count(), 0);
    }

    #[test]
    fn test_write_unencodable_value_leaves_no_trace() {
        let (_tmp, store) = open_store();
        let mut bad = HashMap::new();
        bad.insert((1, 2), "tuple keys have no JSON form");

        let err = store.write("users", "john", &bad).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EncodingFailure);
        assert!(!store.root().join("users").exists());
    }

    #[test]
    fn test_read_missing() {
        let (_tmp, store) = open_store();
        let err = store.read::<Value>("users", "john").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        store.write("users", "paul", &json!({})).unwrap();
        let err = store.read::<Value>("users", "john").unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("users/john"));
    }

    #[test]
    fn test_read_file_vanished() {
        let (tmp, _store) = open_store();
        let file = tmp.path().join("users").join("john.json");
        assert!(read_file(&file).unwrap().is_none());

        let err = read_file(tmp.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoFailure);

        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, b"{}\n").unwrap();
        assert_eq!(read_file(&file).unwrap().unwrap(), b"{}\n");
    }

    #[test]
    fn test_read_all_non_utf8_is_io_failure() {
        let (_tmp, store) = open_store();
        store.write("users", "john", &json!({})).unwrap();
        fs::write(store.root().join("users").join("bad.json"), [0xff, 0xfe]).unwrap();

        let err = store.read_all("users").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoFailure);
    }

    #[test]
    fn test_read_missing_names() {
        let (_tmp, store) = open_store();
        assert_eq!(
            store.read::<Value>("", "john").unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            store.read::<Value>("users", "").unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn test_read_decode_failure_is_not_not_found() {
        let (_tmp, store) = open_store();
        store.write("users", "john", &json!({"name": 5})).unwrap();

        let err = store.read::<User>("users", "john").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EncodingFailure);

        fs::write(store.root().join("users").join("broken.json"), b"{nope").unwrap();
        let err = store.read::<Value>("users", "broken").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EncodingFailure);
    }

    #[test]
    fn test_names_with_and_without_extension() {
        let (_tmp, store) = open_store();
        store.write("users", "john.json", &json!({"v": 1})).unwrap();
        assert!(store.root().join("users").join("john.json").is_file());

        let a: Value = store.read("users", "john").unwrap();
        let b: Value = store.read("users", "john.json").unwrap();
        assert_eq!(a, b);

        store.delete("users", "john.json").unwrap();
        assert!(store.read::<Value>("users", "john").unwrap_err().is_not_found());
    }

    #[test]
    fn test_read_all() {
        let (_tmp, store) = open_store();
        store.write("users", "john", &User { name: "John".into(), age: 23 }).unwrap();
        store.write("users", "paul", &User { name: "Paul".into(), age: 25 }).unwrap();
        store.write("other", "x", &json!(1)).unwrap();

        let raw = store.read_all("users").unwrap();
        assert_eq!(raw.len(), 2);
        assert!(raw.iter().all(|text| text.ends_with('\n')));

        let mut users: Vec<User> = store.read_all_as("users").unwrap();
        users.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(users[0].name, "John");
        assert_eq!(users[1].age, 25);
    }

    #[test]
    fn test_read_all_errors() {
        let (_tmp, store) = open_store();
        assert_eq!(
            store.read_all("").unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(store.read_all("ghosts").unwrap_err().kind(), ErrorKind::NotFound);

        // a stray subdirectory is a fault, not skipped
        store.write("users", "john", &json!({})).unwrap();
        fs::create_dir(store.root().join("users").join("nested")).unwrap();
        assert_eq!(store.read_all("users").unwrap_err().kind(), ErrorKind::IoFailure);
    }

    #[test]
    fn test_read_all_skips_temp_files() {
        let (_tmp, store) = open_store();
        store.write("users", "john", &json!({"v": 1})).unwrap();
        fs::write(store.root().join("users").join("paul.json.tmp"), b"{\"v\":").unwrap();

        assert_eq!(store.read_all("users").unwrap().len(), 1);
    }

    #[test]
    fn test_delete_resource() {
        let (_tmp, store) = open_store();
        store.write("users", "john", &json!({})).unwrap();
        store.write("users", "paul", &json!({})).unwrap();

        store.delete("users", "john").unwrap();
        assert!(store.read::<Value>("users", "john").unwrap_err().is_not_found());
        assert!(store.read::<Value>("users", "paul").is_ok());
    }

    #[test]
    fn test_delete_collection() {
        let (_tmp, store) = open_store();
        store.write("users", "john", &json!({})).unwrap();
        store.write("users", "paul", &json!({})).unwrap();

        store.delete("users", "").unwrap();
        assert!(!store.root().join("users").exists());
        assert_eq!(store.read_all("users").unwrap_err().kind(), ErrorKind::NotFound);

        // the collection comes back on the next write
        store.write("users", "john", &json!({})).unwrap();
        assert_eq!(store.read_all("users").unwrap().len(), 1);
    }

    #[test]
    fn test_delete_missing() {
        let (_tmp, store) = open_store();
        assert!(store.delete("users", "john").unwrap_err().is_not_found());
        assert!(store.delete("users", "").unwrap_err().is_not_found());
        assert_eq!(
            store.delete("", "").unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        assert!(store.root().is_dir());
    }

    #[test]
    fn test_one_lock_per_collection() {
        let (_tmp, store) = open_store();
        store.write("users", "john", &json!({})).unwrap();
        store.write("users", "paul", &json!({})).unwrap();
        store.delete("users", "paul").unwrap();
        store.write("teams", "a", &json!({})).unwrap();
        assert_eq!(store.lock_count(), 2);

        let a = store.collection_lock("users");
        let b = store.collection_lock("users");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_sweep_temp_files() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("db");
        let store = Store::open(&root, Options::default()).unwrap();
        store.write("users", "john", &json!({})).unwrap();
        fs::write(root.join("users").join("paul.json.tmp"), b"{").unwrap();
        fs::write(root.join("stray.json.tmp"), b"{").unwrap();
        drop(store);

        let store = Store::open(&root, Options::default().sweep_temp_files(true)).unwrap();
        assert!(!root.join("users").join("paul.json.tmp").exists());
        // only collection directories are swept
        assert!(root.join("stray.json.tmp").exists());
        assert_eq!(store.sweep_temp_files().unwrap(), 0);
        assert_eq!(store.read_all("users").unwrap().len(), 1);
    }

    #[test]
    fn test_custom_logger_receives_events() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use tracing::subscriber::Subscriber;
        use tracing::span;

        struct Counting(Arc<AtomicUsize>);

        impl Subscriber for Counting {
            fn enabled(&self, _: &tracing::Metadata<'_>) -> bool {
                true
            }
            fn new_span(&self, _: &span::Attributes<'_>) -> span::Id {
                span::Id::from_u64(1)
            }
            fn record(&self, _: &span::Id, _: &span::Record<'_>) {}
            fn record_follows_from(&self, _: &span::Id, _: &span::Id) {}
            fn event(&self, _: &tracing::Event<'_>) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
            fn enter(&self, _: &span::Id) {}
            fn exit(&self, _: &span::Id) {}
        }

        let events = Arc::new(AtomicUsize::new(0));
        let logger = Dispatch::new(Counting(Arc::clone(&events)));
        let tmp = TempDir::new().unwrap();

        let store = Store::open(tmp.path(), Options::default().with_logger(logger)).unwrap();
        let after_open = events.load(Ordering::SeqCst);
        assert!(after_open >= 1);

        store.write("users", "john", &json!({})).unwrap();
        assert!(events.load(Ordering::SeqCst) > after_open);
    }
}
